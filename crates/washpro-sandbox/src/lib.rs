//! # washpro Sandbox
//!
//! Disposable Lua interpreter instances for task scripts.
//!
//! Every execution gets a fresh interpreter that can only reach the
//! builtins in [`BUILTINS`]; nothing survives between runs.

pub mod bindings;
pub mod error;
pub mod sandbox;

pub use bindings::BUILTINS;
pub use error::SandboxError;
pub use sandbox::{CancelFlag, ScriptSandbox};
