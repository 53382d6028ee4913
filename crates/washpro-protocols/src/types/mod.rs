//! Task data model.

mod event;
mod id;
mod task;

pub use event::{TaskEvent, TaskEventKind};
pub use id::IdGenerator;
pub use task::{ScriptUpdate, TaskDetail, TaskId, TaskList, TaskRecord, TaskState, TaskSummary};
