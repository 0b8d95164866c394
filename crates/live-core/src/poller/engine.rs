use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use rand::Rng;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PollConfig;
use crate::detector;
use crate::notify::NotificationSink;
use crate::poller::report::{SweepReport, TransitionEvent};
use crate::poller::state::PollState;
use crate::probe::{StatusProbe, Verdict};
use crate::registry::ChannelRegistry;

/// The sweep loop. Owns the registry outright: verdicts are applied and the
/// snapshot written only from here.
pub struct Poller {
    config: PollConfig,
    registry: ChannelRegistry,
    probe: Arc<dyn StatusProbe>,
    sink: Arc<dyn NotificationSink>,
    state_tx: watch::Sender<PollState>,
    sweeps: u64,
}

impl Poller {
    pub fn new(
        registry: ChannelRegistry,
        config: PollConfig,
        probe: Arc<dyn StatusProbe>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let (state_tx, _) = watch::channel(PollState::Idle);
        Self {
            config,
            registry,
            probe,
            sink,
            state_tx,
            sweeps: 0,
        }
    }

    /// Builds the registry from the configured snapshot, falling back to the
    /// seed list.
    pub fn open(
        config: PollConfig,
        probe: Arc<dyn StatusProbe>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let registry =
            ChannelRegistry::open(&config.snapshot_path, config.seed_path.as_deref());
        Self::new(registry, config, probe, sink)
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn state(&self) -> PollState {
        *self.state_tx.borrow()
    }

    /// Follows state changes, including after the poller has moved into [`Poller::run`].
    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state_tx.subscribe()
    }

    pub fn sweeps(&self) -> u64 {
        self.sweeps
    }

    fn set_state(&self, next: PollState) {
        let current = self.state();
        if !current.can_transition_to(next) {
            debug!(from = %current, to = %next, "Unexpected poller state change");
        }
        self.state_tx.send_replace(next);
    }

    /// Runs exactly one sweep and persists the result.
    pub async fn sweep(&mut self) -> SweepReport {
        self.sweep_until(&CancellationToken::new()).await
    }

    async fn sweep_until(&mut self, shutdown: &CancellationToken) -> SweepReport {
        self.sweeps += 1;
        let mut report = SweepReport {
            sweep: self.sweeps,
            total: self.registry.len(),
            completed: true,
            ..Default::default()
        };

        let probe = Arc::clone(&self.probe);
        let mut verdicts = stream::iter(self.registry.names().into_iter().enumerate())
            .map(|(idx, name)| {
                let probe = Arc::clone(&probe);
                async move {
                    let verdict = probe.probe(&name).await;
                    (idx, name, verdict)
                }
            })
            // `buffered` yields in registry order, so transitions are applied
            // and notified in the same order as a serial sweep.
            .buffered(self.config.max_concurrent_probes.max(1));

        while let Some((idx, name, verdict)) = verdicts.next().await {
            let Some(channel) = self.registry.channels_mut().get_mut(idx) else {
                continue;
            };
            report.probed += 1;
            match verdict {
                Verdict::Unknown => report.unknown += 1,
                Verdict::TransientFailure => report.failed += 1,
                Verdict::Live | Verdict::Offline => {}
            }

            let edge = detector::apply(channel, verdict);
            debug!(channel = %name, %verdict, live = channel.is_live(), "Channel probed");

            if let Some(edge) = edge {
                info!(channel = %name, %edge, "Channel transition");
                let mut event = TransitionEvent::new(name.as_str(), edge, Utc::now());
                match self.sink.notify(&name, edge, event.detected_at).await {
                    Ok(()) => event.delivered = true,
                    Err(e) => warn!(channel = %name, %edge, error = %e, "Notification delivery failed"),
                }
                report.transitions.push(event);
            }

            if shutdown.is_cancelled() {
                report.completed = false;
                info!(sweep = report.sweep, probed = report.probed, "Shutdown requested, cutting sweep short");
                break;
            }
        }
        drop(verdicts);

        report.live = self.registry.live_count();
        report.persisted = self.persist();

        info!(
            sweep = report.sweep,
            live = report.live,
            total = report.total,
            transitions = report.transitions.len(),
            unknown = report.unknown,
            failed = report.failed,
            "Status: {} of {} channels live",
            report.live,
            report.total,
        );
        report
    }

    fn persist(&self) -> bool {
        match self.registry.save_to(&self.config.snapshot_path) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to persist snapshot, will retry after the next sweep");
                false
            }
        }
    }

    fn next_wait(&self) -> Duration {
        if !self.config.jitter {
            return self.config.poll_interval;
        }
        let base_ms = u64::try_from(self.config.poll_interval.as_millis()).unwrap_or(u64::MAX);
        let jitter_range = base_ms / 7;
        if jitter_range == 0 {
            return self.config.poll_interval;
        }
        let offset = rand::thread_rng().gen_range(0..jitter_range * 2);
        let ms = (base_ms - jitter_range).saturating_add(offset);
        Duration::from_millis(ms.max(1))
    }

    /// Sweeps until `shutdown` fires, then persists and returns the final
    /// registry.
    ///
    /// A shutdown during a sweep lets the channel being applied finish; a
    /// shutdown during the wait interrupts the sleep.
    pub async fn run(mut self, shutdown: CancellationToken) -> ChannelRegistry {
        info!(
            channels = self.registry.len(),
            interval_ms = self.config.poll_interval.as_millis() as u64,
            concurrency = self.config.max_concurrent_probes,
            "Starting poller"
        );

        let mut needs_persist = true;
        while !shutdown.is_cancelled() {
            self.set_state(PollState::Sweeping);
            let report = self.sweep_until(&shutdown).await;
            needs_persist = !report.persisted;
            if !report.completed {
                break;
            }

            self.set_state(PollState::Waiting);
            let wait = self.next_wait();
            info!(wait_ms = wait.as_millis() as u64, "Waiting before the next sweep");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        if needs_persist {
            self.persist();
        }
        self.set_state(PollState::Stopped);
        info!(sweeps = self.sweeps, "Poller stopped");
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono::DateTime;

    use crate::detector::Edge;
    use crate::notify::NotifyError;

    struct Fixed(Verdict);

    #[async_trait]
    impl StatusProbe for Fixed {
        async fn probe(&self, _name: &str) -> Verdict {
            self.0
        }
    }

    struct Silent;

    #[async_trait]
    impl NotificationSink for Silent {
        async fn notify(&self, _: &str, _: Edge, _: DateTime<Utc>) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn poller(verdict: Verdict, jitter: bool) -> Poller {
        let config = PollConfig::default()
            .with_poll_interval(Duration::from_millis(700))
            .with_jitter(jitter);
        Poller::new(
            ChannelRegistry::default(),
            config,
            Arc::new(Fixed(verdict)),
            Arc::new(Silent),
        )
    }

    #[test]
    fn wait_without_jitter_is_exact() {
        assert_eq!(poller(Verdict::Live, false).next_wait(), Duration::from_millis(700));
    }

    #[test]
    fn jittered_wait_stays_within_a_seventh() {
        let p = poller(Verdict::Live, true);
        for _ in 0..50 {
            let w = p.next_wait();
            assert!(w >= Duration::from_millis(600) && w < Duration::from_millis(800), "{w:?}");
        }
    }

    #[test]
    fn jittered_wait_saturates_for_huge_intervals() {
        let config = PollConfig::default().with_poll_interval(Duration::MAX);
        let p = Poller::new(
            ChannelRegistry::default(),
            config,
            Arc::new(Fixed(Verdict::Live)),
            Arc::new(Silent),
        );
        let floor = Duration::from_millis(u64::MAX / 7 * 6 - 7);
        for _ in 0..50 {
            assert!(p.next_wait() >= floor);
        }
    }

    #[test]
    fn new_poller_is_idle() {
        let p = poller(Verdict::Offline, false);
        assert_eq!(p.state(), PollState::Idle);
        assert_eq!(p.sweeps(), 0);
    }
}
