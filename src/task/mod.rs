// src/task/mod.rs

pub mod future;
pub mod process;
pub mod supervisor;

pub use future::{TaskFuture, TaskOutcome, TaskSnapshot, TaskState};
pub use process::ProcessTask;
pub use supervisor::{ChildControl, PAUSE_POLL_INTERVAL, ProcessSupervisor, SignalControl};
