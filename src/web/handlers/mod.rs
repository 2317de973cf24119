pub mod agent;
pub mod tasks;
pub mod wakeup;
