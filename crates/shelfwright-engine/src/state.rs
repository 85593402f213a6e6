//! Run state machine.

use serde::{Deserialize, Serialize};
use strum::Display;

/// States a sort run moves through. No state is ever re-entered; a new run
/// is a fresh instance.
///
/// `Failed` is reachable from `BackingUp` only: once scanning begins,
/// per-item failures are recorded in the report rather than aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "title_case")]
pub enum RunState {
    Idle,
    BackingUp,
    Scanning,
    Deduplicating,
    Categorizing,
    Executing,
    Completed,
    Failed,
}

impl RunState {
    /// Check if the run is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check whether moving to `next` is a legal transition.
    pub fn can_transition(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, BackingUp)
                | (BackingUp, Scanning)
                | (BackingUp, Failed)
                | (Scanning, Deduplicating)
                | (Deduplicating, Categorizing)
                | (Categorizing, Executing)
                | (Executing, Completed)
                // A cancelled or empty run completes early
                | (Scanning | Deduplicating | Categorizing, Completed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            RunState::Idle,
            RunState::BackingUp,
            RunState::Scanning,
            RunState::Deduplicating,
            RunState::Categorizing,
            RunState::Executing,
            RunState::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_failed_only_reachable_from_backing_up() {
        assert!(RunState::BackingUp.can_transition(RunState::Failed));
        for state in [
            RunState::Idle,
            RunState::Scanning,
            RunState::Deduplicating,
            RunState::Categorizing,
            RunState::Executing,
        ] {
            assert!(!state.can_transition(RunState::Failed), "{state} -> Failed");
        }
    }

    #[test]
    fn test_no_state_reentry() {
        for state in [
            RunState::Idle,
            RunState::BackingUp,
            RunState::Scanning,
            RunState::Completed,
            RunState::Failed,
        ] {
            assert!(!state.can_transition(state));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Executing.is_terminal());
        assert!(!RunState::Completed.can_transition(RunState::Idle));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(RunState::BackingUp.to_string(), "Backing Up");
        assert_eq!(RunState::Deduplicating.to_string(), "Deduplicating");
    }
}
