pub mod agent;
pub mod config;
pub mod error;
pub mod metrics;
pub mod state;
