//! Test doubles for the prober and routing store.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sluice_core::domain::routing::WeightMap;
use sluice_core::{
    Backend, ControllerConfig, HostgroupId, Prober, RoutingStore, RoutingTable, StoreError,
};

pub fn fast() -> Backend {
    Backend::new("10.0.1.11", 3306)
}

pub fn slow() -> Backend {
    Backend::new("10.0.1.12", 3306)
}

pub fn third() -> Backend {
    Backend::new("10.0.1.13", 3306)
}

/// Two backends, bounds [1, 100], delta_max 10, epsilon 0.1, alpha 1.
pub fn scenario_config() -> ControllerConfig {
    let mut config = ControllerConfig::new(vec![fast(), slow()]);
    config.alpha = 1.0;
    config.epsilon = 0.1;
    config.weight_min = 1;
    config.weight_max = 100;
    config.delta_max = 10;
    config
}

/// A prober that replays queued outcomes per backend, then a steady outcome.
#[derive(Default)]
pub struct ScriptedProber {
    queued: Mutex<HashMap<Backend, VecDeque<Option<f64>>>>,
    steady: HashMap<Backend, Option<f64>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedProber {
    pub fn steady(outcomes: &[(Backend, Option<f64>)]) -> Self {
        Self {
            steady: outcomes.iter().cloned().collect(),
            ..Default::default()
        }
    }

    pub fn then(self, backend: Backend, outcomes: Vec<Option<f64>>) -> Self {
        self.queued.lock().unwrap().entry(backend).or_default().extend(outcomes);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, backend: &Backend, _timeout: Duration) -> Option<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let queued = self.queued.lock().unwrap().get_mut(backend).and_then(|q| q.pop_front());
        match queued {
            Some(outcome) => outcome,
            None => self.steady.get(backend).copied().flatten(),
        }
    }
}

/// A store that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingStore {
    writes: Mutex<Vec<(HostgroupId, WeightMap)>>,
    publishes: AtomicUsize,
    fail_publish: AtomicBool,
}

impl RecordingStore {
    pub fn writes(&self) -> Vec<(HostgroupId, WeightMap)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn publishes(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_publish.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RoutingStore for RecordingStore {
    async fn set_weights(
        &self,
        hostgroup: HostgroupId,
        weights: &WeightMap,
    ) -> Result<(), StoreError> {
        self.writes.lock().unwrap().push((hostgroup, weights.clone()));
        Ok(())
    }

    async fn publish(&self) -> Result<(), StoreError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(StoreError::unreachable("connection refused"));
        }
        self.publishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// An in-memory routing table whose publish can be told to fail.
///
/// Like ProxySQL's `mysql_servers`, staged writes outlive a failed publish and
/// go live with the next successful one.
pub struct FlakyTable {
    table: RoutingTable,
    fail_publish: AtomicBool,
}

impl FlakyTable {
    pub fn new(table: RoutingTable) -> Self {
        Self {
            table,
            fail_publish: AtomicBool::new(false),
        }
    }

    pub fn runtime_weights(&self, hostgroup: HostgroupId) -> Option<WeightMap> {
        self.table.runtime_weights(hostgroup)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_publish.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RoutingStore for FlakyTable {
    async fn set_weights(
        &self,
        hostgroup: HostgroupId,
        weights: &WeightMap,
    ) -> Result<(), StoreError> {
        self.table.set_weights(hostgroup, weights).await
    }

    async fn publish(&self) -> Result<(), StoreError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(StoreError::unreachable("connection refused"));
        }
        self.table.publish().await
    }
}
