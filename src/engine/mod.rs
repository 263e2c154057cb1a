//! Collection scheduling and aggregation engine.
//!
//! An [`Engine`] owns one collector: its scheduling loop, fan-out/fan-in,
//! cache-skip logic and backoff. Two shapes exist:
//!
//! - [`Engine::fan_out`] runs a [`Processor`] once per unit in parallel.
//! - [`Engine::custom`] runs a [`CustomProcessor`] once per pass.
//!
//! A pass never mutates the exposed gauges directly. Producers send samples
//! over a channel, one aggregator drains it, and only after every producer
//! is done does the engine reset the collector's series and apply the new
//! snapshot, under the [`PublishGate`](crate::metrics::PublishGate).
//!
//! ```no_run
//! # use cloud_exporter::engine::{Engine, CustomProcessor};
//! # use cloud_exporter::metrics::{MetricsHub, MetricSet, MetricSink};
//! # use futures::future::BoxFuture;
//! # use std::time::Duration;
//! struct Uptime;
//!
//! impl CustomProcessor for Uptime {
//!     fn setup(&mut self, metrics: &mut MetricSet) -> anyhow::Result<()> {
//!         metrics.gauge("uptime_seconds", "Uptime", &[])?;
//!         Ok(())
//!     }
//!
//!     fn collect(&self, sink: MetricSink) -> BoxFuture<'_, anyhow::Result<()>> {
//!         Box::pin(async move {
//!             sink.add("uptime_seconds", Default::default(), 42.0);
//!             Ok(())
//!         })
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let hub = MetricsHub::new();
//! let engine = Engine::custom("uptime", Uptime, &hub)?
//!     .with_panic_backoff(vec![Duration::from_secs(60), Duration::from_secs(300)])?;
//! let _handle = engine.start(Duration::from_secs(30));
//! # Ok(())
//! # }
//! ```

mod error;
mod pass;
mod processor;
mod registry;
mod state;

pub use error::{EngineError, PassError};
pub use pass::PassReport;
pub use processor::{CustomProcessor, Processor, UnitSource};
pub use registry::EngineRegistry;
pub use state::{BackoffLadder, CollectorState, PassStatus, SharedState};

use crate::cache::{CacheEntry, CacheStore};
use crate::metrics::{MetricSet, MetricSink, MetricSnapshot, MetricsHub, aggregate};
use chrono::{DateTime, TimeDelta, Utc};
use pass::{Custom, FanOut, Pass};
use state::{read_state, write_state};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Added to a cache entry's expiry to get the wake-up time after a cache hit.
pub const CACHE_WAKE_MARGIN: Duration = Duration::from_secs(5);

/// Interval used until `start()` or `with_interval()` sets the real one.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

struct CacheSettings {
    store: CacheStore,
    tag: String,
}

/// Result of one pass.
#[derive(Debug)]
pub struct PassOutcome {
    pub status: PassStatus,
    pub report: PassReport,
    /// Rows applied to the gauges (0 when the pass failed).
    pub samples: usize,
    pub error: Option<PassError>,
    pub next_wake: DateTime<Utc>,
    /// How long the loop sleeps before the next pass.
    pub sleep: Duration,
}

/// Intermediate result before the schedule is decided.
struct Attempt {
    status: PassStatus,
    report: PassReport,
    samples: usize,
    error: Option<PassError>,
    /// `None` lets `record()` choose (interval or backoff).
    wake_override: Option<DateTime<Utc>>,
}

pub struct Engine {
    name: String,
    metrics: MetricSet,
    pass: Arc<dyn Pass>,
    state: SharedState,
    cache: Option<CacheSettings>,
    cache_ttl: Option<Duration>,
}

impl Engine {
    /// Build a fan-out engine; runs `processor.setup()` immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the processor fails to set up.
    pub fn fan_out<P: Processor>(
        name: &str,
        mut processor: P,
        units: Arc<dyn UnitSource<P::Unit>>,
        hub: &MetricsHub,
    ) -> Result<Self, EngineError> {
        let mut metrics = MetricSet::new(name, hub);
        processor
            .setup(&mut metrics)
            .map_err(|error| EngineError::Setup {
                collector: name.to_string(),
                error,
            })?;

        let pass = FanOut {
            processor: Arc::new(processor),
            units,
        };

        Ok(Self::assemble(name, metrics, Arc::new(pass), hub))
    }

    /// Build a single-run engine; runs `processor.setup()` immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the processor fails to set up.
    pub fn custom<P: CustomProcessor>(
        name: &str,
        mut processor: P,
        hub: &MetricsHub,
    ) -> Result<Self, EngineError> {
        let mut metrics = MetricSet::new(name, hub);
        processor
            .setup(&mut metrics)
            .map_err(|error| EngineError::Setup {
                collector: name.to_string(),
                error,
            })?;

        Ok(Self::assemble(
            name,
            metrics,
            Arc::new(Custom { processor }),
            hub,
        ))
    }

    fn assemble(name: &str, metrics: MetricSet, pass: Arc<dyn Pass>, hub: &MetricsHub) -> Self {
        let state = Arc::new(RwLock::new(CollectorState::new(name, DEFAULT_INTERVAL)));
        hub.engines().register(Arc::clone(&state));

        Self {
            name: name.to_string(),
            metrics,
            pass,
            state,
            cache: None,
            cache_ttl: None,
        }
    }

    /// Opt into cache-skip behaviour. `location` is a path or `file://` URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the location is not a supported cache location.
    pub fn with_cache(mut self, location: &str, tag: &str) -> Result<Self, EngineError> {
        let store = CacheStore::new(location)?;

        debug!(collector = %self.name, path = %store.path().display(), tag, "cache enabled");

        self.cache = Some(CacheSettings {
            store,
            tag: tag.to_string(),
        });

        Ok(self)
    }

    /// Validity of freshly written cache entries; defaults to the interval.
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Opt into escalating delays after pass failures.
    ///
    /// # Errors
    ///
    /// Returns an error if `tiers` is empty or decreasing.
    pub fn with_panic_backoff(self, tiers: Vec<Duration>) -> Result<Self, EngineError> {
        let ladder = BackoffLadder::new(tiers)?;
        write_state(&self.state).backoff = ladder;
        Ok(self)
    }

    #[must_use]
    pub fn with_interval(self, interval: Duration) -> Self {
        write_state(&self.state).interval = interval;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copy of the current scheduling state.
    #[must_use]
    pub fn state(&self) -> CollectorState {
        read_state(&self.state).clone()
    }

    /// Run passes forever: the first immediately, each following one after
    /// the sleep chosen by its predecessor.
    pub fn start(self, interval: Duration) -> JoinHandle<()> {
        let engine = self.with_interval(interval);

        info!(collector = %engine.name, interval = ?interval, "starting collector");

        tokio::spawn(async move {
            loop {
                let outcome = engine.run_pass().await;
                tokio::time::sleep(outcome.sleep).await;
            }
        })
    }

    /// Run exactly one pass and decide when the next one happens.
    #[instrument(skip(self), level = "info", fields(collector = %self.name))]
    pub async fn run_pass(&self) -> PassOutcome {
        let started_at = Utc::now();
        let timer = Instant::now();

        let attempt = match self.restore_from_cache(started_at).await {
            Some(attempt) => attempt,
            None => self.collect().await,
        };

        self.record(started_at, timer.elapsed(), attempt)
    }

    async fn restore_from_cache(&self, now: DateTime<Utc>) -> Option<Attempt> {
        let cache = self.cache.as_ref()?;
        let entry = cache.store.load().await?;

        if !entry.is_fresh(&cache.tag, now) {
            debug!(
                collector = %self.name,
                cached_tag = %entry.tag,
                expiry = ?entry.expiry,
                "cache stale or from another configuration"
            );
            return None;
        }

        let expiry = entry.expiry?;

        let snapshot: MetricSnapshot = match serde_json::from_value(entry.payload) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(collector = %self.name, error = %e, "cached payload is not a snapshot");
                return None;
            }
        };

        let samples = self.metrics.swap(&snapshot, |metrics| self.pass.reset(metrics));
        let wake = after(expiry, CACHE_WAKE_MARGIN);

        info!(collector = %self.name, samples, next_wake = %wake, "restored snapshot from cache");

        Some(Attempt {
            status: PassStatus::Cached,
            report: PassReport::default(),
            samples,
            error: None,
            wake_override: Some(wake),
        })
    }

    async fn collect(&self) -> Attempt {
        let (sink, rx) = MetricSink::channel();
        let aggregator = tokio::spawn(aggregate(rx));

        let pass = Arc::clone(&self.pass);
        let executed = tokio::spawn(async move { pass.execute(sink).await })
            .await
            .unwrap_or_else(|e| Err(PassError::from_join(e)));

        let snapshot = aggregator
            .await
            .map_err(|e| PassError::Aggregation(e.to_string()));

        match (executed, snapshot) {
            (Ok(report), Ok(snapshot)) => {
                let samples = self.metrics.swap(&snapshot, |metrics| self.pass.reset(metrics));

                if report.failed_units > 0 {
                    warn!(
                        collector = %self.name,
                        units = report.units,
                        failed_units = report.failed_units,
                        "some units failed, published the rest"
                    );
                }

                self.persist(&snapshot).await;

                Attempt {
                    status: PassStatus::Collected,
                    report,
                    samples,
                    error: None,
                    wake_override: None,
                }
            }
            (Err(e), _) | (_, Err(e)) => Attempt {
                status: PassStatus::Failed,
                report: PassReport::default(),
                samples: 0,
                error: Some(e),
                wake_override: None,
            },
        }
    }

    async fn persist(&self, snapshot: &MetricSnapshot) {
        let Some(cache) = &self.cache else {
            return;
        };

        let payload = match serde_json::to_value(snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(collector = %self.name, error = %e, "failed to encode snapshot for cache");
                return;
            }
        };

        let ttl = self
            .cache_ttl
            .unwrap_or_else(|| read_state(&self.state).interval);
        let entry = CacheEntry::new(cache.tag.clone(), payload, Some(after(Utc::now(), ttl)));

        if let Err(e) = cache.store.save(&entry).await {
            warn!(collector = %self.name, error = %e, "failed to write cache");
        }
    }

    fn record(&self, started_at: DateTime<Utc>, elapsed: Duration, attempt: Attempt) -> PassOutcome {
        let mut state = write_state(&self.state);
        let now = Utc::now();

        state.last_start = Some(started_at);
        state.last_duration = Some(elapsed);
        state.last_status = Some(attempt.status);
        state.passes_total += 1;

        let next_wake = if let Some(error) = &attempt.error {
            let delay = state.backoff.on_failure().unwrap_or(state.interval);

            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.failures_total += 1;
            state.last_error = Some(error.to_string());

            error!(
                collector = %self.name,
                kind = error.kind(),
                error = %error,
                consecutive_failures = state.consecutive_failures,
                retry_in = ?delay,
                "pass failed, keeping previous snapshot"
            );

            after(now, delay)
        } else {
            state.backoff.reset();
            state.consecutive_failures = 0;
            state.last_error = None;
            state.last_samples = attempt.samples;
            state.ready = true;

            debug!(
                collector = %self.name,
                status = ?attempt.status,
                samples = attempt.samples,
                elapsed = ?elapsed,
                "pass finished"
            );

            attempt
                .wake_override
                .unwrap_or_else(|| after(now, state.interval))
        };

        state.next_wake = Some(next_wake);

        PassOutcome {
            status: attempt.status,
            report: attempt.report,
            samples: attempt.samples,
            error: attempt.error,
            next_wake,
            sleep: (next_wake - now).to_std().unwrap_or(Duration::ZERO),
        }
    }
}

/// `at + duration`, saturating instead of overflowing.
fn after(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
