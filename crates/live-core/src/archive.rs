//! Best-effort dump of anomalous status records for offline inspection.
//!
//! Files land at `{root}/status-responses/{channel}/{channel}[{time}]({status}).json`
//! and are never read back.

use std::path::PathBuf;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct DiagnosticArchive {
    root: PathBuf,
}

impl DiagnosticArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, channel: &str, at: NaiveDateTime, status: &str) -> PathBuf {
        let channel = sanitize(channel);
        let file = format!(
            "{}[{}]({}).json",
            channel,
            at.format("%Y.%m.%dT%H.%M.%S"),
            status
        );
        self.root.join("status-responses").join(&channel).join(file)
    }

    /// Writes `content` as pretty JSON. Failures are logged and swallowed.
    pub async fn record(
        &self,
        channel: &str,
        status: &str,
        content: &serde_json::Value,
    ) -> Option<PathBuf> {
        let path = self.path_for(channel, Local::now().naive_local(), status);

        let body = match serde_json::to_vec_pretty(content) {
            Ok(b) => b,
            Err(e) => {
                error!(channel, error = %e, "Failed to serialize diagnostic record");
                return None;
            }
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                error!(path = %parent.display(), error = %e, "Failed to create archive directory");
                return None;
            }
        }

        match tokio::fs::write(&path, body).await {
            Ok(()) => {
                debug!(channel, path = %path.display(), "Archived anomalous status record");
                Some(path)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to write diagnostic record");
                None
            }
        }
    }
}

/// Keeps a channel name usable as a single path component.
fn sanitize(channel: &str) -> String {
    let cleaned: String = channel
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
