//! Agent lifecycle state machine
//!
//! The agent is always in exactly one `AgentState`. Moves between states are
//! table lookups: anything not listed in `AgentState::allowed_next` is rejected
//! and leaves the state untouched.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Local};
use log::info;
use serde::{Deserialize, Serialize};

use crate::core::error::{AgentError, AgentResult};

/// Lifecycle states of the agent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Dormant, only wakeup triggers are evaluated
    Sleeping,
    /// Running wake-up initialisation
    WakingUp,
    /// Idle and allowed to pick up tasks
    Awake,
    /// Exactly one task is in flight
    Working,
    /// Winding down before sleeping
    GoingToSleep,
}

impl AgentState {
    /// States reachable from this one in a single step
    pub fn allowed_next(&self) -> &'static [AgentState] {
        match self {
            AgentState::Sleeping => &[AgentState::WakingUp],
            AgentState::WakingUp => &[AgentState::Awake],
            AgentState::Awake => &[AgentState::Working, AgentState::GoingToSleep],
            AgentState::Working => &[AgentState::Awake],
            AgentState::GoingToSleep => &[AgentState::Sleeping],
        }
    }

    pub fn can_transition_to(&self, to: AgentState) -> bool {
        self.allowed_next().contains(&to)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Sleeping => "sleeping",
            AgentState::WakingUp => "waking_up",
            AgentState::Awake => "awake",
            AgentState::Working => "working",
            AgentState::GoingToSleep => "going_to_sleep",
        }
    }

    pub fn parse(value: &str) -> Option<AgentState> {
        match value {
            "sleeping" => Some(AgentState::Sleeping),
            "waking_up" => Some(AgentState::WakingUp),
            "awake" => Some(AgentState::Awake),
            "working" => Some(AgentState::Working),
            "going_to_sleep" => Some(AgentState::GoingToSleep),
            _ => None,
        }
    }

    /// Awake in the broad sense: anything but sleeping
    pub fn is_awake(&self) -> bool {
        !matches!(self, AgentState::Sleeping)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of a single state change, kept for observability only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTransition {
    pub from: AgentState,
    pub to: AgentState,
    pub timestamp: DateTime<Local>,
    pub reason: String,
}

/// Current state plus a bounded log of recent transitions
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: AgentState,
    history: VecDeque<StateTransition>,
    history_limit: usize,
}

impl StateMachine {
    pub fn new(history_limit: usize) -> Self {
        Self {
            state: AgentState::Sleeping,
            history: VecDeque::with_capacity(history_limit),
            history_limit: history_limit.max(1),
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Apply a transition if the table allows it
    pub fn transition(
        &mut self,
        to: AgentState,
        reason: &str,
        now: DateTime<Local>,
    ) -> AgentResult<StateTransition> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(AgentError::StateTransitionError(format!(
                "cannot move from {} to {}",
                from, to
            )));
        }

        self.state = to;
        let record = StateTransition {
            from,
            to,
            timestamp: now,
            reason: reason.to_string(),
        };

        if self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(record.clone());

        info!("Agent state {} -> {} ({})", from, to, reason);
        Ok(record)
    }

    /// Most recent transitions, newest first
    pub fn recent(&self, limit: usize) -> Vec<StateTransition> {
        self.history.iter().rev().take(limit).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [AgentState; 5] = [
        AgentState::Sleeping,
        AgentState::WakingUp,
        AgentState::Awake,
        AgentState::Working,
        AgentState::GoingToSleep,
    ];

    #[test]
    fn test_only_table_edges_are_accepted() {
        for from in ALL {
            for to in ALL {
                let mut machine = StateMachine::new(10);
                machine.state = from;
                let result = machine.transition(to, "test", Local::now());
                if from.can_transition_to(to) {
                    assert!(result.is_ok(), "{} -> {} should be allowed", from, to);
                    assert_eq!(machine.state(), to);
                } else {
                    assert!(matches!(result, Err(AgentError::StateTransitionError(_))));
                    assert_eq!(machine.state(), from);
                }
            }
        }
    }

    #[test]
    fn test_working_cannot_go_to_sleep_directly() {
        assert!(!AgentState::Working.can_transition_to(AgentState::GoingToSleep));
        assert!(!AgentState::Working.can_transition_to(AgentState::Sleeping));
    }

    #[test]
    fn test_transition_log_is_bounded() {
        let mut machine = StateMachine::new(3);
        let now = Local::now();
        for _ in 0..4 {
            machine.transition(AgentState::WakingUp, "wake", now).unwrap();
            machine.transition(AgentState::Awake, "ready", now).unwrap();
            machine.transition(AgentState::GoingToSleep, "idle", now).unwrap();
            machine.transition(AgentState::Sleeping, "asleep", now).unwrap();
        }

        assert_eq!(machine.history_len(), 3);
        let recent = machine.recent(10);
        assert_eq!(recent[0].to, AgentState::Sleeping);
        assert_eq!(recent[2].to, AgentState::Awake);
    }

    #[test]
    fn test_state_strings_round_trip() {
        for state in ALL {
            assert_eq!(AgentState::parse(state.as_str()), Some(state));
        }
        assert_eq!(AgentState::parse("dreaming"), None);
    }
}
