mod channels;

use axum::Router;

use crate::state::AppState;

pub use channels::{ChannelsResponse, MessageResponse, TriggerParams};

pub fn router() -> Router<AppState> {
    channels::router()
}
