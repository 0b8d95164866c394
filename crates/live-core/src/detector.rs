//! Edge detection between the recorded live flag and a fresh verdict.
//!
//! Notifications are edge-triggered: a channel that stays live across many
//! sweeps fires [`Edge::BecameLive`] once. `Unknown` and `TransientFailure`
//! carry no information and never move the recorded state, so a flaky
//! lookup cannot produce a false "went offline".

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::probe::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    BecameLive,
    BecameOffline,
}

impl Edge {
    /// The state word used in notification text.
    pub fn status_word(self) -> &'static str {
        match self {
            Self::BecameLive => "live",
            Self::BecameOffline => "offline",
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BecameLive => write!(f, "LIVE"),
            Self::BecameOffline => write!(f, "OFFLINE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub new_live: bool,
    pub transition: Option<Edge>,
}

pub fn evaluate(previous_live: bool, verdict: Verdict) -> Evaluation {
    match (previous_live, verdict) {
        (false, Verdict::Live) => Evaluation {
            new_live: true,
            transition: Some(Edge::BecameLive),
        },
        (true, Verdict::Offline) => Evaluation {
            new_live: false,
            transition: Some(Edge::BecameOffline),
        },
        (prev, _) => Evaluation {
            new_live: prev,
            transition: None,
        },
    }
}

/// Evaluates `verdict` against `channel` and applies any transition through
/// the channel's own mutators.
pub fn apply(channel: &mut Channel, verdict: Verdict) -> Option<Edge> {
    let eval = evaluate(channel.is_live(), verdict);
    match eval.transition {
        Some(Edge::BecameLive) => channel.set_live(),
        Some(Edge::BecameOffline) => channel.set_offline(),
        None => {}
    }
    debug_assert_eq!(channel.is_live(), eval.new_live);
    eval.transition
}
