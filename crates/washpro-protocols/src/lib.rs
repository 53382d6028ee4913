//! # washpro Protocols
//!
//! Shared definitions for the washpro task controller.
//! Contains the task data model, the error taxonomy and the traits that
//! decouple the scheduler from script hosts - no storage or execution logic.
//!
//! ## Core Traits
//!
//! - [`HostCapabilities`] - Concrete effects behind the script builtins
//! - [`TaskControl`] - Task-to-task control exposed to running scripts

pub mod control;
pub mod error;
pub mod host;
pub mod types;

pub use control::TaskControl;
pub use error::TaskError;
pub use host::HostCapabilities;
pub use types::*;
