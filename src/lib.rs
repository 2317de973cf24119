//! Proactive background agent
//!
//! A single agent that sleeps until a wakeup trigger fires, works through a
//! priority queue of tasks one at a time and goes back to sleep when idle.

pub mod core;
pub mod executor;
pub mod scheduler;
pub mod storage;
pub mod wakeup;
pub mod web;
