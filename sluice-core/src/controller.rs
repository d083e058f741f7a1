//! The adaptive weight controller.
//!
//! Once per period the controller probes every backend, folds the aggregate
//! sample into that backend's latency estimate, normalizes the inverted
//! estimates into target weights, moves each live weight toward its target by
//! a bounded step, and publishes whatever changed to the routing store.

use std::collections::BTreeMap;

use futures::future::join_all;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::ControllerConfig;
use crate::domain::backend::Backend;
use crate::domain::routing::{RoutingStore, WeightMap};
use crate::error::{ConfigError, StoreError};
use crate::load_balancer::ewma::LatencyEstimate;
use crate::load_balancer::sampling::aggregate_samples;
use crate::load_balancer::weights::{rate_limit, target_weights};
use crate::probe::Prober;

/// What a single control cycle did to the routing store.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No live weight changed, so the store was not touched
    Unchanged,
    /// The listed backends were written and published with these weights.
    ///
    /// Besides every changed backend this includes any backend whose last
    /// write failed to publish, rewritten at its current weight.
    Published(WeightMap),
    /// The total score was not usable; nothing was computed or written
    Skipped,
    /// The store refused or could not be reached; live weights were left as
    /// they were
    PublishFailed(StoreError),
}

/// The state of every backend at the end of a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// The smoothed latency estimate of each backend, in milliseconds
    pub estimates: BTreeMap<Backend, f64>,
    /// The target weight of each backend; empty if the cycle was skipped
    pub targets: WeightMap,
    /// The live weight of each backend after the cycle
    pub live: WeightMap,
    /// What happened to the routing store
    pub outcome: CycleOutcome,
}

/// Per-backend controller state, one slot per configured backend.
#[derive(Debug)]
struct BackendSlot {
    backend: Backend,
    estimate: LatencyEstimate,
    /// The weight the routing store is known to be using
    live: u32,
    /// Set when a write touching this backend failed to publish; the store
    /// may hold a staged weight other than `live`
    unconfirmed: bool,
}

/// Re-weights one hostgroup of a routing store from measured backend latency.
///
/// A controller must be the only writer of its hostgroup.
#[derive(Debug)]
pub struct Controller<P, S> {
    config: ControllerConfig,
    prober: P,
    store: S,
    slots: Vec<BackendSlot>,
}

impl<P: Prober, S: RoutingStore> Controller<P, S> {
    /// Create a new controller, rejecting an unusable configuration.
    ///
    /// Every backend starts at the configured initial estimate and at the
    /// midpoint of the weight bounds.
    pub fn new(config: ControllerConfig, prober: P, store: S) -> Result<Self, ConfigError> {
        config.validate()?;

        let start_weight = config.bounds().midpoint();
        let slots = config
            .workers
            .iter()
            .map(|backend| BackendSlot {
                backend: backend.clone(),
                estimate: LatencyEstimate::new(config.initial_estimate_ms, config.alpha),
                live: start_weight,
                unconfirmed: false,
            })
            .collect();

        Ok(Self {
            config,
            prober,
            store,
            slots,
        })
    }

    /// The configuration this controller was built with
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// The routing store this controller writes to
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The current live weight of every backend
    pub fn live_weights(&self) -> WeightMap {
        self.slots.iter().map(|s| (s.backend.clone(), s.live)).collect()
    }

    /// The current latency estimate of every backend, in milliseconds
    pub fn estimates(&self) -> BTreeMap<Backend, f64> {
        self.slots.iter().map(|s| (s.backend.clone(), s.estimate.get())).collect()
    }

    /// Write the starting weights of every backend to the store.
    ///
    /// Brings the store in line with the controller's initial live weights
    /// before the first cycle. Failure is returned, not retried.
    pub async fn seed_store(&self) -> Result<(), StoreError> {
        let weights = self.live_weights();
        self.write(&weights).await?;
        info!(
            hostgroup = %self.config.hostgroup,
            backends = weights.len(),
            "seeded routing store"
        );
        Ok(())
    }

    /// Run one complete control cycle.
    pub async fn tick(&mut self) -> CycleReport {
        // Sampling
        let samples = self.sample_all().await;
        for (slot, sample) in self.slots.iter_mut().zip(samples) {
            match sample {
                Some(rtt) => {
                    slot.estimate.observe(rtt);
                    trace!(
                        backend = %slot.backend,
                        rtt_ms = rtt,
                        estimate_ms = slot.estimate.get(),
                        "updated estimate"
                    );
                }
                None => debug!(backend = %slot.backend, "no sample this cycle, holding estimate"),
            }
        }

        // Scoring and normalization
        let epsilon = self.config.epsilon;
        let scores: Vec<f64> = self.slots.iter().map(|s| s.estimate.score(epsilon)).collect();
        let bounds = self.config.bounds();
        let Some(targets) = target_weights(&scores, bounds) else {
            warn!(hostgroup = %self.config.hostgroup, "total score not positive, skipping cycle");
            return self.report(WeightMap::new(), CycleOutcome::Skipped);
        };

        // Rate limiting. Backends left in doubt by a failed publish are
        // rewritten even if their weight holds, so the store cannot keep a
        // stale staged value.
        let mut writes = WeightMap::new();
        for (slot, target) in self.slots.iter().zip(&targets) {
            let next = rate_limit(slot.live, *target, self.config.delta_max, bounds);
            if next != slot.live || slot.unconfirmed {
                writes.insert(slot.backend.clone(), next);
            }
        }

        let targets: WeightMap =
            self.slots.iter().map(|s| s.backend.clone()).zip(targets).collect();
        if writes.is_empty() {
            return self.report(targets, CycleOutcome::Unchanged);
        }

        // Publish, committing the new weights only once the store has them
        let outcome = match self.write(&writes).await {
            Ok(()) => {
                for slot in self.slots.iter_mut() {
                    let Some(weight) = writes.get(&slot.backend) else {
                        continue;
                    };
                    if *weight != slot.live {
                        info!(
                            hostgroup = %self.config.hostgroup,
                            backend = %slot.backend,
                            from = slot.live,
                            to = *weight,
                            estimate_ms = slot.estimate.get(),
                            "published weight change"
                        );
                    }
                    slot.live = *weight;
                    slot.unconfirmed = false;
                }
                CycleOutcome::Published(writes)
            }
            Err(e) => {
                for slot in self.slots.iter_mut() {
                    if writes.contains_key(&slot.backend) {
                        slot.unconfirmed = true;
                    }
                }
                error!(
                    hostgroup = %self.config.hostgroup,
                    error = %e,
                    "failed to publish weights, keeping previous live weights"
                );
                CycleOutcome::PublishFailed(e)
            }
        };

        self.report(targets, outcome)
    }

    /// Run cycles every period until `cancel` fires.
    ///
    /// Cancellation is only observed between cycles; an in-progress cycle is
    /// always completed. Returns the controller so its final state can be
    /// inspected.
    pub async fn run(mut self, cancel: CancellationToken) -> Self {
        let mut interval = time::interval(self.config.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            hostgroup = %self.config.hostgroup,
            backends = self.slots.len(),
            period_ms = self.config.period.as_millis() as u64,
            "weight controller started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {},
            }

            let report = self.tick().await;
            debug!(outcome = ?report.outcome, live = ?report.live, "cycle complete");
        }

        info!(hostgroup = %self.config.hostgroup, "weight controller stopped");
        self
    }

    /// Probe every backend concurrently, one aggregate per slot, in slot order.
    async fn sample_all(&self) -> Vec<Option<f64>> {
        join_all(self.slots.iter().map(|slot| self.sample_backend(&slot.backend))).await
    }

    /// Take this cycle's probes of one backend, sequentially, and aggregate them.
    async fn sample_backend(&self, backend: &Backend) -> Option<f64> {
        let timeout = self.config.probe_timeout;
        let mut probes = Vec::with_capacity(self.config.samples_per_cycle);

        for _ in 0..self.config.samples_per_cycle {
            // Bound the probe here too, in case a prober ignores its timeout
            let sample = time::timeout(timeout, self.prober.probe(backend, timeout))
                .await
                .ok()
                .flatten();
            if sample.is_none() {
                debug!(backend = %backend, "latency probe failed");
            }
            probes.push(sample);
        }

        aggregate_samples(&probes)
    }

    /// Stage `weights` and publish them as one bulk update.
    async fn write(&self, weights: &WeightMap) -> Result<(), StoreError> {
        self.store.set_weights(self.config.hostgroup, weights).await?;
        self.store.publish().await
    }

    fn report(&self, targets: WeightMap, outcome: CycleOutcome) -> CycleReport {
        CycleReport {
            estimates: self.estimates(),
            targets,
            live: self.live_weights(),
            outcome,
        }
    }
}
