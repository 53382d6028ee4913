//! Disposable interpreter instance bound to a single execution.

use std::future::poll_fn;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Poll;

use mlua::{HookTriggers, Lua, LuaOptions, StdLib, Thread, Value, VmState};
use tracing::{debug, trace};
use washpro_config::SandboxConfig;
use washpro_protocols::{HostCapabilities, TaskControl, TaskId};

use crate::bindings;
use crate::error::SandboxError;

/// Globals removed from the standard library after loading.
const REMOVED_GLOBALS: &[&str] = &["dofile", "loadfile", "load", "require", "collectgarbage"];

/// Cooperative cancellation signal observed by the instruction hook.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A fresh Lua state that exposes only the host builtins.
///
/// The state is created for one execution and dropped with it, so globals
/// set by a previous run are never visible. The script runs on its own Lua
/// thread carrying an instruction hook. Once the [`CancelFlag`] is set the
/// hook yields the thread, which `pcall` cannot intercept, and
/// [`ScriptSandbox::run`] returns [`SandboxError::Cancelled`] instead of
/// resuming it. Scripts suspended in `delay` are interrupted by dropping the
/// future returned from `run`.
pub struct ScriptSandbox {
    lua: Lua,
    task_id: TaskId,
    cancel: CancelFlag,
    hook_interval: u32,
}

impl ScriptSandbox {
    pub fn new(
        task_id: TaskId,
        host: Arc<dyn HostCapabilities>,
        control: Arc<dyn TaskControl>,
        config: &SandboxConfig,
        cancel: CancelFlag,
    ) -> Result<Self, SandboxError> {
        // No coroutine library: the cancellation hook only covers the script thread.
        let libs = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8;
        let lua = Lua::new_with(libs, LuaOptions::default()).map_err(init_error)?;

        if config.memory_limit_bytes > 0 {
            lua.set_memory_limit(config.memory_limit_bytes)
                .map_err(init_error)?;
        }

        let globals = lua.globals();
        for name in REMOVED_GLOBALS {
            globals.set(*name, Value::Nil).map_err(init_error)?;
        }
        bindings::install(&lua, &task_id, host, control).map_err(init_error)?;

        trace!("Sandbox prepared for task '{}'", task_id);
        Ok(Self {
            lua,
            task_id,
            cancel,
            hook_interval: config.hook_instruction_interval.max(1),
        })
    }

    /// Attach the cancellation hook to the thread running the script.
    ///
    /// The first cancelled check yields. Hooks cannot yield while a C
    /// function such as `table.sort` is on the stack, so a hook that fires
    /// again after cancellation raises an error instead.
    fn arm_hook(&self, thread: &Thread) {
        let flag = self.cancel.clone();
        let yielded = AtomicBool::new(false);
        thread.set_hook(
            HookTriggers::new().every_nth_instruction(self.hook_interval),
            move |_, _| {
                if !flag.is_cancelled() {
                    Ok(VmState::Continue)
                } else if !yielded.swap(true, Ordering::SeqCst) {
                    Ok(VmState::Yield)
                } else {
                    Err(mlua::Error::RuntimeError("execution cancelled".to_string()))
                }
            },
        );
    }

    /// Task whose script this sandbox executes.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Execute `source` to completion.
    pub async fn run(&self, source: &str) -> Result<(), SandboxError> {
        if self.cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }

        let chunk = self
            .lua
            .load(source)
            .set_name(format!("task:{}", self.task_id))
            .into_function()
            .map_err(|e| SandboxError::Script(e.to_string()))?;
        let thread = self
            .lua
            .create_thread(chunk)
            .map_err(|e| SandboxError::Script(e.to_string()))?;
        self.arm_hook(&thread);

        let mut execution = pin!(thread.into_async::<()>(()));
        let result = poll_fn(|cx| {
            // A yielded thread is never resumed once cancellation is requested.
            if self.cancel.is_cancelled() {
                return Poll::Ready(Err(mlua::Error::RuntimeError(
                    "execution cancelled".to_string(),
                )));
            }
            execution.as_mut().poll(cx)
        })
        .await;

        match result {
            Ok(()) => {
                debug!("Script for task '{}' ran to completion", self.task_id);
                Ok(())
            }
            Err(_) if self.cancel.is_cancelled() => Err(SandboxError::Cancelled),
            Err(e) => Err(SandboxError::Script(e.to_string())),
        }
    }
}

fn init_error(e: mlua::Error) -> SandboxError {
    SandboxError::Init(e.to_string())
}

#[cfg(test)]
#[path = "sandbox_tests.rs"]
mod tests;
