mod helix;

pub use helix::{HelixCredentials, HelixProbe};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result of a single status lookup for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Live,
    Offline,
    /// No matching record, or a match without a live flag.
    Unknown,
    /// The lookup itself failed after retries.
    TransientFailure,
}

impl Verdict {
    /// Whether the verdict says anything about the channel's state.
    pub fn is_conclusive(self) -> bool {
        matches!(self, Self::Live | Self::Offline)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Offline => write!(f, "offline"),
            Self::Unknown => write!(f, "unknown"),
            Self::TransientFailure => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("HTTP error {status} looking up {channel}: {message}")]
    Http {
        channel: String,
        status: u16,
        message: String,
    },
    #[error("Network error looking up {channel}: {reason}")]
    Network { channel: String, reason: String },
    #[error("Timeout looking up {channel}")]
    Timeout { channel: String },
    #[error("Undecodable status response for {channel}: {message}")]
    Decode { channel: String, message: String },
}

impl ProbeError {
    pub(crate) fn from_reqwest(channel: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout {
                channel: channel.to_string(),
            }
        } else {
            Self::Network {
                channel: channel.to_string(),
                reason: e.to_string(),
            }
        }
    }

    /// Timeouts, connection errors, 5xx and 429 are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Decode { .. } => false,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Looks up the live state of one channel against the remote status API.
///
/// Implementations own their retry and timeout handling and never touch the
/// registry. A failed lookup is reported as [`Verdict::TransientFailure`],
/// which callers treat exactly like [`Verdict::Unknown`].
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn probe(&self, name: &str) -> Verdict;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> ProbeError {
        ProbeError::Http {
            channel: "alice".into(),
            status,
            message: String::new(),
        }
    }

    #[test]
    fn transient_classification() {
        assert!(ProbeError::Timeout { channel: "a".into() }.is_transient());
        assert!(ProbeError::Network {
            channel: "a".into(),
            reason: "refused".into()
        }
        .is_transient());
        assert!(http(503).is_transient());
        assert!(http(429).is_transient());
        assert!(!http(401).is_transient());
        assert!(!http(404).is_transient());
        assert!(!ProbeError::Decode {
            channel: "a".into(),
            message: "eof".into()
        }
        .is_transient());
    }

    #[test]
    fn status_code_only_for_http() {
        assert_eq!(http(500).status_code(), Some(500));
        assert_eq!(ProbeError::Timeout { channel: "a".into() }.status_code(), None);
    }

    #[test]
    fn only_live_and_offline_are_conclusive() {
        assert!(Verdict::Live.is_conclusive());
        assert!(Verdict::Offline.is_conclusive());
        assert!(!Verdict::Unknown.is_conclusive());
        assert!(!Verdict::TransientFailure.is_conclusive());
    }
}
