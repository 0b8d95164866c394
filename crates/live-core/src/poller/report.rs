use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::detector::Edge;

/// A transition detected during a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub id: String,
    pub channel: String,
    pub edge: Edge,
    pub detected_at: DateTime<Utc>,
    /// Whether the notification sink accepted the message.
    pub delivered: bool,
}

impl TransitionEvent {
    pub fn new(channel: impl Into<String>, edge: Edge, detected_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel: channel.into(),
            edge,
            detected_at,
            delivered: false,
        }
    }
}

/// Summary of one pass over the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub sweep: u64,
    /// Channels whose verdict was applied.
    pub probed: usize,
    /// Live channels once the sweep ended.
    pub live: usize,
    pub total: usize,
    pub unknown: usize,
    pub failed: usize,
    pub transitions: Vec<TransitionEvent>,
    pub persisted: bool,
    /// False when a shutdown cut the sweep short.
    pub completed: bool,
}

impl SweepReport {
    pub fn became_live(&self) -> impl Iterator<Item = &TransitionEvent> {
        self.transitions
            .iter()
            .filter(|t| t.edge == Edge::BecameLive)
    }

    pub fn became_offline(&self) -> impl Iterator<Item = &TransitionEvent> {
        self.transitions
            .iter()
            .filter(|t| t.edge == Edge::BecameOffline)
    }
}
