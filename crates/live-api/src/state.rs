use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use live_core::{read_snapshot, Channel, NotificationSink};

use crate::error::ApiError;

/// Shared handler state. Channel data is never held here: every request reads
/// the snapshot the poller last wrote.
#[derive(Clone)]
pub struct AppState {
    pub snapshot_path: Arc<PathBuf>,
    pub sink: Option<Arc<dyn NotificationSink>>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: Arc::new(snapshot_path.into()),
            sink: None,
            started_at: Utc::now(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub async fn load_channels(&self) -> Result<Vec<Channel>, ApiError> {
        let path = Arc::clone(&self.snapshot_path);
        tokio::task::spawn_blocking(move || read_snapshot(&path))
            .await
            .map_err(|e| ApiError::Internal(format!("Snapshot read task failed: {}", e)))?
            .map_err(ApiError::from)
    }
}
