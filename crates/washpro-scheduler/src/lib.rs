//! # washpro Scheduler
//!
//! Task lifecycle manager for the washpro controller.
//!
//! The [`Scheduler`] owns the stopped/running state machine, the
//! [`ExecutionRegistry`] of live executions and the [`EventNotifier`].
//! Scripts reach back into the scheduler only through the queued
//! [`ControlQueue`], never by calling it on their own stack.

pub mod control;
pub mod notifier;
pub mod registry;
pub mod scheduler;
mod scheduler_execution;
mod scheduler_reconcile;

pub use control::{ControlCommand, ControlQueue};
pub use notifier::EventNotifier;
pub use registry::{ExecutionHandle, ExecutionRegistry};
pub use scheduler::Scheduler;
