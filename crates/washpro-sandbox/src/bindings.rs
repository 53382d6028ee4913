//! Host-bound builtins exposed to scripts.

use std::sync::Arc;
use std::time::Duration;

use mlua::{Lua, Value, Variadic};
use washpro_protocols::{HostCapabilities, TaskControl, TaskId};

/// Builtins available to every script, in the order editors list them.
pub const BUILTINS: &[&str] = &["log", "setOutput", "delay", "startTask", "stopTask"];

/// Name the first firmware generation used for `setOutput`.
const SET_OUTPUT_ALIAS: &str = "setLED";

/// Register the builtins as globals of `lua`.
pub(crate) fn install(
    lua: &Lua,
    task_id: &TaskId,
    host: Arc<dyn HostCapabilities>,
    control: Arc<dyn TaskControl>,
) -> mlua::Result<()> {
    let globals = lua.globals();

    let log = {
        let host = host.clone();
        let task_id = task_id.clone();
        lua.create_function(move |lua, message: Value| {
            host.log(&task_id, &display_value(lua, message));
            Ok(())
        })?
    };
    globals.set("log", log)?;

    let print = {
        let host = host.clone();
        let task_id = task_id.clone();
        lua.create_function(move |lua, values: Variadic<Value>| {
            let line = values
                .into_iter()
                .map(|v| display_value(lua, v))
                .collect::<Vec<_>>()
                .join("\t");
            host.log(&task_id, &line);
            Ok(())
        })?
    };
    globals.set("print", print)?;

    let set_output = {
        let host = host.clone();
        let task_id = task_id.clone();
        lua.create_function(move |_, value: Value| {
            host.set_output(&task_id, output_level(&value)?);
            Ok(())
        })?
    };
    globals.set("setOutput", set_output.clone())?;
    globals.set(SET_OUTPUT_ALIAS, set_output)?;

    let delay = {
        let host = host.clone();
        let task_id = task_id.clone();
        lua.create_async_function(move |_, millis: f64| {
            let host = host.clone();
            let task_id = task_id.clone();
            async move {
                host.delay(&task_id, delay_duration(millis)).await;
                Ok(())
            }
        })?
    };
    globals.set("delay", delay)?;

    let start_task = {
        let control = control.clone();
        let task_id = task_id.clone();
        lua.create_function(move |_, target: String| {
            control.start_task(&task_id, &target);
            Ok(())
        })?
    };
    globals.set("startTask", start_task)?;

    let stop_task = {
        let task_id = task_id.clone();
        lua.create_function(move |_, target: String| {
            control.stop_task(&task_id, &target);
            Ok(())
        })?
    };
    globals.set("stopTask", stop_task)?;

    Ok(())
}

/// Render a Lua value the way `tostring` would for scalars.
fn display_value(lua: &Lua, value: Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        other => {
            let type_name = other.type_name();
            match lua.coerce_string(other) {
                Ok(Some(s)) => s.to_string_lossy().to_string(),
                _ => type_name.to_string(),
            }
        }
    }
}

/// Booleans drive the output directly; numbers are on when non-zero.
fn output_level(value: &Value) -> mlua::Result<bool> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::Nil => Ok(false),
        Value::Integer(i) => Ok(*i != 0),
        Value::Number(n) => Ok(*n != 0.0),
        other => Err(mlua::Error::RuntimeError(format!(
            "setOutput expects a boolean or number, got {}",
            other.type_name()
        ))),
    }
}

/// Negative and non-finite delays collapse to zero.
fn delay_duration(millis: f64) -> Duration {
    if millis.is_finite() && millis > 0.0 {
        Duration::from_millis(millis as u64)
    } else {
        Duration::ZERO
    }
}
