#![forbid(unsafe_code)]

pub mod archive;
pub mod channel;
pub mod config;
pub mod detector;
pub mod notify;
pub mod poller;
pub mod probe;
pub mod registry;
pub mod retry;

pub use archive::DiagnosticArchive;
pub use channel::Channel;
pub use config::PollConfig;
pub use detector::{evaluate, Edge, Evaluation};
pub use notify::{NotificationSink, NotifyError, WebhookConfig, WebhookPayload, WebhookSink};
pub use poller::{PollState, Poller, SweepReport, TransitionEvent};
pub use probe::{HelixCredentials, HelixProbe, ProbeError, StatusProbe, Verdict};
pub use registry::{add_channels, read_snapshot, AddOutcome, ChannelRegistry, RegistryError};
pub use retry::RetryPolicy;
