//! Agent configuration
//!
//! Loaded from an optional TOML file. Every field has a default so a missing
//! file, or a file that only sets a handful of keys, is fine.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::core::error::{AgentError, AgentResult};
use crate::wakeup::models::WakeupSchedule;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "PROACTIVE_AGENT_CONFIG";
/// Environment override for the database path
pub const DB_PATH_ENV: &str = "PROACTIVE_AGENT_DB";
/// Environment override for the HTTP bind address
pub const BIND_ENV: &str = "PROACTIVE_AGENT_BIND";
/// Config file used when `PROACTIVE_AGENT_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "proactive_agent.toml";

/// External worker program that runs the non-builtin task types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerCommandConfig {
    /// Program to spawn
    pub program: String,
    /// Arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,
}

/// Configuration for the proactive agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Main loop cadence in seconds
    pub tick_interval_secs: u64,
    /// Idle time after which an awake agent goes back to sleep
    pub idle_timeout_secs: u64,
    /// Maximum time a single task may run
    pub max_working_duration_secs: u64,
    /// Maximum number of live (pending/scheduled/in-progress) tasks
    pub max_tasks_in_queue: usize,
    /// Maximum number of finished tasks kept in history
    pub max_history_size: usize,
    /// Number of state transitions kept for status reporting
    pub transition_log_size: usize,
    /// SQLite database file
    pub database_path: PathBuf,
    /// HTTP bind address
    pub bind_address: String,
    /// Start the main loop as soon as the process starts
    pub auto_start: bool,
    /// Directory holding the user profile markdown files
    pub profile_dir: PathBuf,
    /// Morning/evening wakeup schedule
    pub schedule: WakeupSchedule,
    /// Interval of the default periodic health check trigger
    pub health_check_interval_secs: u64,
    /// Optional external worker for the LLM-backed task types
    pub worker_command: Option<WorkerCommandConfig>,
    /// Seed the default daily tasks on wake-up
    pub daily_tasks: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 1,
            idle_timeout_secs: 300,
            max_working_duration_secs: 1800,
            max_tasks_in_queue: 100,
            max_history_size: 500,
            transition_log_size: 50,
            database_path: PathBuf::from("proactive_agent.db"),
            bind_address: "127.0.0.1:8080".to_string(),
            auto_start: true,
            profile_dir: PathBuf::from("profile"),
            schedule: WakeupSchedule::default(),
            health_check_interval_secs: 7200,
            worker_command: None,
            daily_tasks: true,
        }
    }
}

impl AgentConfig {
    /// Load the config file named by `PROACTIVE_AGENT_CONFIG` and apply env overrides
    pub fn from_env() -> AgentResult<Self> {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let mut config = Self::from_file(Path::new(&path))?;

        if let Ok(db) = env::var(DB_PATH_ENV) {
            config.database_path = PathBuf::from(db);
        }
        if let Ok(bind) = env::var(BIND_ENV) {
            config.bind_address = bind;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file; a missing file yields the defaults
    pub fn from_file(path: &Path) -> AgentResult<Self> {
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            AgentError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&raw)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> AgentResult<Self> {
        let config: AgentConfig =
            toml::from_str(raw).map_err(|e| AgentError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AgentResult<()> {
        let zero = [
            ("tick_interval_secs", self.tick_interval_secs as usize),
            ("idle_timeout_secs", self.idle_timeout_secs as usize),
            ("max_working_duration_secs", self.max_working_duration_secs as usize),
            ("health_check_interval_secs", self.health_check_interval_secs as usize),
            ("max_tasks_in_queue", self.max_tasks_in_queue),
            ("max_history_size", self.max_history_size),
            ("transition_log_size", self.transition_log_size),
        ];
        if let Some((name, _)) = zero.iter().find(|(_, value)| *value == 0) {
            return Err(AgentError::ConfigError(format!("{} must be greater than zero", name)));
        }

        if let Some(worker) = &self.worker_command {
            if worker.program.trim().is_empty() {
                return Err(AgentError::ConfigError("worker_command.program is empty".to_string()));
            }
        }

        self.schedule
            .validate()
            .map_err(|e| AgentError::ConfigError(format!("schedule: {}", e)))?;

        if self.idle_timeout_secs < self.tick_interval_secs {
            warn!("idle_timeout_secs is shorter than one tick, the agent will sleep right after waking");
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.idle_timeout_secs as i64)
    }

    pub fn max_working_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_working_duration_secs as i64)
    }
}
