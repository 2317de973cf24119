//! Priority task scheduler
//!
//! Decides what the agent works on next: a priority queue of live tasks,
//! a bounded history of finished ones and the default daily routine.

pub mod daily;
pub mod models;
pub mod queue;

pub use models::{Task, TaskOrigin, TaskSpec, TaskStatus, TaskType};
pub use queue::TaskScheduler;
