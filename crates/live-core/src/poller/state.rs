use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Sweeping,
    Waiting,
    Stopped,
}

impl PollState {
    pub fn can_transition_to(self, target: PollState) -> bool {
        matches!(
            (self, target),
            (PollState::Idle, PollState::Sweeping)
                | (PollState::Sweeping, PollState::Waiting)
                | (PollState::Waiting, PollState::Sweeping)
                | (PollState::Idle, PollState::Stopped)
                | (PollState::Sweeping, PollState::Stopped)
                | (PollState::Waiting, PollState::Stopped)
        )
    }
}

impl std::fmt::Display for PollState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Sweeping => write!(f, "sweeping"),
            Self::Waiting => write!(f, "waiting"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
