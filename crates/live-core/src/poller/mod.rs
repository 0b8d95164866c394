pub mod engine;
pub mod report;
pub mod state;

pub use engine::Poller;
pub use report::{SweepReport, TransitionEvent};
pub use state::PollState;
