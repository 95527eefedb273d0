use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a [`Job`](crate::jobs::Job).
///
/// ```text
/// NotStarted ──start──► Running ──success──► Completed
///     │                   │ └────fault─────► Failed
///     │                   └──stop──► Stopping ──ack──► Stopped
///     └─────────────stop before start───────────────► Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    NotStarted,
    Running,
    Stopping,
    Completed,
    Failed,
    Stopped,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (NotStarted, Running)
                | (NotStarted, Stopped)
                | (Running, Stopping)
                | (Running, Completed)
                | (Running, Failed)
                | (Stopping, Stopped)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "NotStarted",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [JobState; 6] = [
        JobState::NotStarted,
        JobState::Running,
        JobState::Stopping,
        JobState::Completed,
        JobState::Failed,
        JobState::Stopped,
    ];

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_stopping_only_from_running() {
        for from in ALL {
            assert_eq!(
                from.can_transition_to(JobState::Stopping),
                from == JobState::Running
            );
        }
        assert!(JobState::Stopping.can_transition_to(JobState::Stopped));
        assert!(!JobState::Stopping.can_transition_to(JobState::Completed));
    }

    proptest! {
        #[test]
        fn prop_walk_reaches_at_most_one_terminal(
            steps in prop::collection::vec(0usize..6, 0..32)
        ) {
            let mut state = JobState::NotStarted;
            let mut terminal = None;
            for step in steps {
                let next = ALL[step];
                if state.can_transition_to(next) {
                    state = next;
                    if state.is_terminal() {
                        prop_assert!(terminal.is_none());
                        terminal = Some(state);
                    }
                }
            }
            if let Some(t) = terminal {
                prop_assert_eq!(state, t);
            }
        }
    }
}
