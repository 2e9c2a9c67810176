use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::callbacks::Callbacks;
use crate::client::DeviceClient;
use crate::store::ZoneStateStore;
use crate::types::*;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A previous poll was still in flight.
    Skipped,
    /// The device could not be read; the store was left untouched.
    Unavailable { consecutive_failures: u32 },
    Updated {
        changed: Vec<ZoneIndex>,
        /// Configured zones the device did not report this tick.
        missing: Vec<ZoneIndex>,
    },
}

/// Clears the in-flight flag when the poll finishes, however it finishes.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn try_enter(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Fetch-and-merge cycle run once per poll tick.
pub struct Reconciler {
    client: Arc<dyn DeviceClient>,
    store: Arc<ZoneStateStore>,
    callbacks: Arc<Callbacks>,
    failure_threshold: u32,
    in_flight: AtomicBool,
    failures: AtomicU32,
}

impl Reconciler {
    pub(crate) fn new(
        client: Arc<dyn DeviceClient>,
        store: Arc<ZoneStateStore>,
        callbacks: Arc<Callbacks>,
        failure_threshold: u32,
    ) -> Self {
        Self {
            client,
            store,
            callbacks,
            failure_threshold,
            in_flight: AtomicBool::new(false),
            failures: AtomicU32::new(0),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    pub fn availability(&self) -> Availability {
        match self.consecutive_failures() {
            0 => Availability::Available,
            n => Availability::Unavailable {
                consecutive_failures: n,
            },
        }
    }

    /// Run one tick. Device errors are absorbed here and never reach the
    /// caller; they only show up as [`PollOutcome::Unavailable`] and the
    /// availability callback.
    pub async fn poll(&self) -> PollOutcome {
        let Some(_guard) = InFlight::try_enter(&self.in_flight) else {
            debug!("previous poll still in flight, skipping tick");
            return PollOutcome::Skipped;
        };

        let indices = self.store.indices();
        let started = self.store.sequence();
        let readings = match self.client.fetch_zones(&indices).await {
            Ok(readings) => readings,
            Err(e) => return self.record_failure(&e),
        };

        let recovered_after = self.failures.swap(0, Ordering::AcqRel);
        if recovered_after > 0 {
            info!(failures = recovered_after, "device reachable again");
            self.callbacks.availability_changed(Availability::Available);
        }

        let mut changed = Vec::new();
        let mut missing = Vec::new();
        for index in indices {
            let Some(reading) = readings.get(&index) else {
                warn!(zone = index, "zone missing from device response");
                missing.push(index);
                continue;
            };

            let Ok(mut entry) = self.store.lock(index).await else {
                continue;
            };
            if entry.written_since(started) {
                debug!(zone = index, "zone written during fetch, skipping stale reading");
                continue;
            }
            let outcome = entry.merge(reading);
            for field in &outcome.rejected_fields {
                warn!(zone = index, field = *field, "malformed field ignored");
            }
            let snapshot = if outcome.changed {
                entry.state().cloned()
            } else {
                None
            };
            drop(entry);

            if let Some(state) = snapshot {
                self.callbacks.zone_updated(index, &state);
                changed.push(index);
            }
        }

        if !changed.is_empty() {
            debug!(count = changed.len(), "zones changed");
        }
        PollOutcome::Updated { changed, missing }
    }

    fn record_failure(&self, error: &crate::Error) -> PollOutcome {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures == self.failure_threshold {
            warn!(failures, %error, "device unavailable, keeping last known state");
        } else {
            debug!(failures, %error, "poll failed");
        }
        self.callbacks.availability_changed(Availability::Unavailable {
            consecutive_failures: failures,
        });
        PollOutcome::Unavailable {
            consecutive_failures: failures,
        }
    }
}
