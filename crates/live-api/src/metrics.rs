use std::fmt::Write;
use std::time::SystemTime;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use chrono::Utc;

use live_core::Channel;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    // An unreadable snapshot still yields a scrape so the outage is visible.
    let channels = match state.load_channels().await {
        Ok(channels) => Some(channels),
        Err(e) => {
            tracing::warn!(error = ?e, "Snapshot unavailable for metrics");
            None
        }
    };
    let modified = tokio::fs::metadata(state.snapshot_path())
        .await
        .and_then(|m| m.modified())
        .ok();
    let uptime = (Utc::now() - state.started_at).num_milliseconds() as f64 / 1000.0;

    let out = render(channels.as_deref(), modified, uptime)
        .map_err(|e| ApiError::Internal(format!("Failed to render metrics: {}", e)))?;

    Ok((
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        out,
    ))
}

fn render(
    channels: Option<&[Channel]>,
    modified: Option<SystemTime>,
    uptime_secs: f64,
) -> Result<String, std::fmt::Error> {
    let mut out = String::with_capacity(2048);

    writeln!(out, "# TYPE live_alert_info info")?;
    writeln!(out, "# HELP live_alert_info Information about the live-alert service")?;
    writeln!(
        out,
        "live_alert_info{{version=\"{}\"}} 1",
        env!("CARGO_PKG_VERSION")
    )?;

    writeln!(out, "# TYPE live_alert_snapshot_readable gauge")?;
    writeln!(out, "# HELP live_alert_snapshot_readable Whether the channel snapshot could be read")?;
    writeln!(out, "live_alert_snapshot_readable {}", u8::from(channels.is_some()))?;

    if let Some(channels) = channels {
        writeln!(out, "# TYPE live_alert_channels gauge")?;
        writeln!(out, "# HELP live_alert_channels Number of channels being watched")?;
        writeln!(out, "live_alert_channels {}", channels.len())?;

        writeln!(out, "# TYPE live_alert_channels_live gauge")?;
        writeln!(out, "# HELP live_alert_channels_live Number of channels currently live")?;
        writeln!(
            out,
            "live_alert_channels_live {}",
            channels.iter().filter(|c| c.is_live()).count()
        )?;

        writeln!(out, "# TYPE live_alert_channel_live gauge")?;
        writeln!(out, "# HELP live_alert_channel_live Last known live status per channel")?;
        for c in channels {
            writeln!(
                out,
                "live_alert_channel_live{{channel=\"{}\"}} {}",
                escape_label(c.name()),
                u8::from(c.is_live())
            )?;
        }
    }

    if let Some(age) = modified.and_then(|m| m.elapsed().ok()) {
        writeln!(out, "# TYPE live_alert_snapshot_age_seconds gauge")?;
        writeln!(out, "# HELP live_alert_snapshot_age_seconds Time since the snapshot was last written")?;
        writeln!(out, "live_alert_snapshot_age_seconds {:.3}", age.as_secs_f64())?;
    }

    writeln!(out, "# TYPE live_alert_uptime_seconds gauge")?;
    writeln!(out, "# HELP live_alert_uptime_seconds Time since the API server started")?;
    writeln!(out, "live_alert_uptime_seconds {:.3}", uptime_secs)?;

    writeln!(out, "# EOF")?;
    Ok(out)
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
