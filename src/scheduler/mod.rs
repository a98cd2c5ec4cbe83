//! Scheduler - heartbeat control loop
//!
//! Three independently timed ticks, each on its own tokio task:
//!
//! | tick     | default  | work                                            |
//! |----------|----------|-------------------------------------------------|
//! | registry | 60 min   | force a registry refresh                        |
//! | drain    | 5 min    | replay the delayed queue (`live=false`)         |
//! | sample   | 15 min   | probe host/cameras, deliver live or queue       |
//!
//! Each tick is time-boxed to its own interval so a hung probe or request
//! cannot hold a loop forever, and a slow tick never blocks the other two.
//! The sample tick boxes only probing and live delivery: a batch whose
//! delivery failed or ran out of time is always appended to the delayed
//! queue outside the box. There is no retry backoff: the next scheduled tick
//! is the retry.

use crate::delayed_slot_store::{DelayedSlotStore, SlotBatch};
use crate::delivery_client::SlotSink;
use crate::liveness_prober::LivenessProbe;
use crate::registry_cache::{RegistryCache, RegistrySnapshot};
use crate::state::ScheduleConfig;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Result of one sampling tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Nothing online / reportable, nothing sent
    NoSlots,
    /// Collector acknowledged the live batch
    Delivered { slots: usize },
    /// Live delivery failed; batch appended to the delayed queue
    Queued { slots: usize },
    /// Live delivery failed and the delayed queue could not be written
    Dropped { slots: usize },
}

/// Heartbeat scheduler
pub struct Scheduler {
    /// Host entity id (the site id)
    site_id: String,
    config: ScheduleConfig,
    registry: Arc<RegistryCache>,
    prober: Arc<dyn LivenessProbe>,
    store: Arc<DelayedSlotStore>,
    sink: Arc<dyn SlotSink>,
    probe_timeout: Duration,
    probe_cameras: bool,
    /// Probed for host liveness; `None` means the running agent vouches for the host
    host_endpoint: Option<String>,
    started_at: DateTime<Utc>,
}

impl Scheduler {
    pub fn new(
        site_id: impl Into<String>,
        config: ScheduleConfig,
        registry: Arc<RegistryCache>,
        prober: Arc<dyn LivenessProbe>,
        store: Arc<DelayedSlotStore>,
        sink: Arc<dyn SlotSink>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            site_id: site_id.into(),
            config,
            registry,
            prober,
            store,
            sink,
            probe_timeout,
            probe_cameras: false,
            host_endpoint: None,
            started_at: Utc::now(),
        }
    }

    /// Probe every registry camera on each sample tick
    pub fn with_camera_probing(mut self, enabled: bool) -> Self {
        self.probe_cameras = enabled;
        self
    }

    /// Probe this endpoint for host liveness
    pub fn with_host_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.host_endpoint = endpoint;
        self
    }

    /// Override the process start used by the dwell rule (tests)
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Load the registry (TTL-gated) and spawn the three tick loops
    ///
    /// The registry loop's first forced refresh waits one full interval; the
    /// startup `get` already fetched if the persisted snapshot was stale.
    pub async fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        match self.registry.get().await {
            Ok(snapshot) => info!(
                entities = snapshot.entities.len(),
                fetched_at = %snapshot.fetched_at,
                "Scheduler: Registry ready"
            ),
            Err(e) => warn!(error = %e, "Scheduler: Registry unavailable at startup"),
        }

        info!(
            site_id = %self.site_id,
            registry_interval_secs = self.config.registry_interval.as_secs(),
            drain_interval_secs = self.config.drain_interval.as_secs(),
            sample_interval_secs = self.config.sample_interval.as_secs(),
            dwell_threshold_secs = self.config.dwell_threshold.as_secs(),
            probe_cameras = self.probe_cameras,
            "Scheduler started"
        );

        let registry = {
            let this = self.clone();
            let period = self.config.registry_interval;
            spawn_tick("registry", period, Some(period), true, move || {
                let this = this.clone();
                async move { this.registry_tick().await }
            })
        };
        let drain = {
            let this = self.clone();
            let period = self.config.drain_interval;
            spawn_tick("drain", period, Some(period), false, move || {
                let this = this.clone();
                async move { this.drain_tick().await }
            })
        };
        let sample = {
            let this = self.clone();
            // Bounded inside sample_tick_at
            spawn_tick("sample", self.config.sample_interval, None, false, move || {
                let this = this.clone();
                async move {
                    this.sample_tick().await;
                }
            })
        };

        vec![registry, drain, sample]
    }

    /// Registry tick: forced refresh, stale snapshot kept on failure
    pub async fn registry_tick(&self) {
        match self.registry.refresh().await {
            Ok(snapshot) => debug!(
                entities = snapshot.entities.len(),
                "Scheduler: Registry refreshed"
            ),
            Err(e) => warn!(error = %e, "Scheduler: Registry refresh failed, retrying next tick"),
        }
    }

    /// Drain tick: replay the delayed queue
    pub async fn drain_tick(&self) {
        match self.store.drain_and_deliver(self.sink.as_ref()).await {
            Ok(outcome) => debug!(outcome = ?outcome, "Scheduler: Drain tick finished"),
            Err(e) => error!(error = %e, "Scheduler: Drain tick failed"),
        }
    }

    /// Sample tick at the current time
    pub async fn sample_tick(&self) -> SampleOutcome {
        self.sample_tick_at(Utc::now()).await
    }

    /// Sample tick stamped with `now`
    ///
    /// Probing and live delivery share one `sample_interval` budget. A batch
    /// that was not acknowledged within it is queued.
    pub async fn sample_tick_at(&self, now: DateTime<Utc>) -> SampleOutcome {
        let budget = self.config.sample_interval;
        let started = Instant::now();

        let batch = match timeout(budget, self.collect_slots(now)).await {
            Ok(batch) => batch,
            Err(_) => {
                warn!(
                    budget_secs = budget.as_secs(),
                    "Scheduler: Probing exceeded the sample interval, no slots collected"
                );
                return SampleOutcome::NoSlots;
            }
        };

        if batch.is_empty() {
            debug!("Scheduler: No slot found to push");
            return SampleOutcome::NoSlots;
        }

        let slots = batch.slot_count();
        let remaining = budget.saturating_sub(started.elapsed());
        let delivered = match timeout(remaining, self.sink.deliver(&batch, true)).await {
            Ok(delivered) => delivered,
            Err(_) => {
                warn!(
                    slots = slots,
                    budget_secs = budget.as_secs(),
                    "Scheduler: Live delivery exceeded the sample interval, abandoned"
                );
                false
            }
        };

        if delivered {
            info!(slots = slots, "Scheduler: Live slots pushed");
            return SampleOutcome::Delivered { slots };
        }

        warn!(batch = ?batch, "Scheduler: Unable to push live slots, queueing");
        match self.store.append(batch.clone()).await {
            Ok(()) => SampleOutcome::Queued { slots },
            Err(e) => {
                error!(
                    batch = ?batch,
                    observed_at = now.timestamp(),
                    error = %e,
                    "Scheduler: Slots lost, delayed queue not writable"
                );
                SampleOutcome::Dropped { slots }
            }
        }
    }

    /// Positive observations of this tick, all stamped with `now`
    async fn collect_slots(&self, now: DateTime<Utc>) -> SlotBatch {
        let observed_at = now.timestamp();
        let mut batch = SlotBatch::new();

        if self.host_dwell_elapsed(now) {
            if self.host_online().await {
                batch.push(self.site_id.clone(), observed_at);
                info!(
                    site_id = %self.site_id,
                    "Scheduler: Host online for longer than dwell threshold"
                );
            } else {
                warn!(site_id = %self.site_id, "Scheduler: Host probe failed");
            }
        } else {
            debug!(
                uptime_secs = (now - self.started_at).num_seconds(),
                dwell_threshold_secs = self.config.dwell_threshold.as_secs(),
                "Scheduler: Dwell threshold not reached, no host slot"
            );
        }

        if self.probe_cameras {
            if let Some(snapshot) = self.current_snapshot(now).await {
                self.probe_cameras_into(&snapshot, observed_at, &mut batch).await;
            }
        }

        batch
    }

    /// Literal dwell-from-start rule: uptime since process start must exceed
    /// the threshold. Not a rolling window.
    fn host_dwell_elapsed(&self, now: DateTime<Utc>) -> bool {
        (now - self.started_at)
            .to_std()
            .map(|uptime| uptime > self.config.dwell_threshold)
            .unwrap_or(false)
    }

    async fn host_online(&self) -> bool {
        match &self.host_endpoint {
            Some(endpoint) => self.prober.probe(endpoint, self.probe_timeout).await,
            None => true,
        }
    }

    /// Fresh snapshot, else the last known one, else nothing to probe
    async fn current_snapshot(&self, now: DateTime<Utc>) -> Option<RegistrySnapshot> {
        match self.registry.get_at(now).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                let last_known = self.registry.last_known().await;
                warn!(
                    error = %e,
                    using_stale_snapshot = last_known.is_some(),
                    "Scheduler: Registry unavailable for sampling"
                );
                last_known
            }
        }
    }

    async fn probe_cameras_into(
        &self,
        snapshot: &RegistrySnapshot,
        observed_at: i64,
        batch: &mut SlotBatch,
    ) {
        let probes = snapshot.entities.iter().map(|(entity_id, endpoint)| async move {
            let online = self.prober.probe(endpoint, self.probe_timeout).await;
            (entity_id, online)
        });

        for (entity_id, online) in join_all(probes).await {
            if online {
                batch.push(entity_id.clone(), observed_at);
            } else {
                debug!(entity_id = %entity_id, "Scheduler: Camera offline");
            }
        }
    }
}

/// Run `tick` every `period`, each run abandoned after `budget` if set
fn spawn_tick<F, Fut>(
    name: &'static str,
    period: Duration,
    budget: Option<Duration>,
    delay_first: bool,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let first = if delay_first {
            Instant::now() + period
        } else {
            Instant::now()
        };
        let mut ticker = interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(budget) = budget else {
                tick().await;
                continue;
            };
            if timeout(budget, tick()).await.is_err() {
                warn!(
                    tick = name,
                    budget_secs = budget.as_secs(),
                    "Scheduler: Tick exceeded its interval and was abandoned"
                );
            }
        }
    })
}
