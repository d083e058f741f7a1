//! Routing store contract and an in-memory routing table.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use rand::Rng;

use crate::domain::backend::{Backend, HostgroupId};
use crate::error::StoreError;
use crate::load_balancer::selector::select_weighted;

/// Backend weights within a single hostgroup.
pub type WeightMap = BTreeMap<Backend, u32>;

/// Every hostgroup's weights, as seen by the router.
pub type HostgroupWeights = BTreeMap<HostgroupId, WeightMap>;

/// A mutable backend-weight table that the proxy routes from.
///
/// Writes made with `set_weights` are staged; they only affect routing once
/// `publish` succeeds. Implementations must not require the controller to
/// read back its own writes.
#[async_trait]
pub trait RoutingStore: Send + Sync {
    /// Stage new weights for the given backends of one hostgroup, as one bulk write.
    async fn set_weights(
        &self,
        hostgroup: HostgroupId,
        weights: &WeightMap,
    ) -> Result<(), StoreError>;

    /// Make every staged write effective for subsequent routing decisions.
    async fn publish(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: RoutingStore + ?Sized> RoutingStore for Arc<T> {
    async fn set_weights(
        &self,
        hostgroup: HostgroupId,
        weights: &WeightMap,
    ) -> Result<(), StoreError> {
        (**self).set_weights(hostgroup, weights).await
    }

    async fn publish(&self) -> Result<(), StoreError> {
        (**self).publish().await
    }
}

/// An in-process routing table with a staged copy and a lock-free runtime view.
///
/// The runtime view sits behind an `ArcSwap`, so per-request reads never
/// contend with the controller; `publish` atomically swaps in the staged table.
#[derive(Debug, Default)]
pub struct RoutingTable {
    staged: Mutex<HostgroupWeights>,
    runtime: ArcSwap<HostgroupWeights>,
}

impl RoutingTable {
    /// Create a new routing table whose staged and runtime views both start at `initial`.
    pub fn new(initial: HostgroupWeights) -> Self {
        Self {
            runtime: ArcSwap::from_pointee(initial.clone()),
            staged: Mutex::new(initial),
        }
    }

    /// Create a table holding a single hostgroup in which every backend has the same weight.
    pub fn with_hostgroup<'a>(
        hostgroup: HostgroupId,
        backends: impl IntoIterator<Item = &'a Backend>,
        weight: u32,
    ) -> Self {
        let weights = backends.into_iter().map(|b| (b.clone(), weight)).collect();
        Self::new(BTreeMap::from([(hostgroup, weights)]))
    }

    /// Retrieve a snapshot of the published (runtime) weights.
    pub fn snapshot(&self) -> Arc<HostgroupWeights> {
        self.runtime.load_full()
    }

    /// The published weights of one hostgroup, if it exists.
    pub fn runtime_weights(&self, hostgroup: HostgroupId) -> Option<WeightMap> {
        self.runtime.load().get(&hostgroup).cloned()
    }

    /// Pick a backend of `hostgroup` in proportion to its published weight.
    pub fn select_backend<R: Rng>(&self, hostgroup: HostgroupId, rng: &mut R) -> Option<Backend> {
        let guard = self.runtime.load();
        guard.get(&hostgroup).and_then(|weights| select_weighted(weights, rng)).cloned()
    }
}

#[async_trait]
impl RoutingStore for RoutingTable {
    async fn set_weights(
        &self,
        hostgroup: HostgroupId,
        weights: &WeightMap,
    ) -> Result<(), StoreError> {
        let mut staged = self
            .staged
            .lock()
            .map_err(|_| StoreError::rejected("staged routing table lock poisoned"))?;
        let group = staged.entry(hostgroup).or_default();
        for (backend, weight) in weights {
            group.insert(backend.clone(), *weight);
        }
        Ok(())
    }

    async fn publish(&self) -> Result<(), StoreError> {
        let staged = self
            .staged
            .lock()
            .map_err(|_| StoreError::rejected("staged routing table lock poisoned"))?;
        self.runtime.store(Arc::new(staged.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const READERS: HostgroupId = HostgroupId(20);

    fn backends() -> Vec<Backend> {
        vec![Backend::new("10.0.0.2", 3306), Backend::new("10.0.0.3", 3306)]
    }

    #[tokio::test]
    async fn staged_writes_are_invisible_until_published() {
        let backends = backends();
        let table = RoutingTable::with_hostgroup(READERS, &backends, 50);

        let update = WeightMap::from([(backends[0].clone(), 80)]);
        table.set_weights(READERS, &update).await.unwrap();
        assert_eq!(table.runtime_weights(READERS).unwrap()[&backends[0]], 50);

        table.publish().await.unwrap();
        let live = table.runtime_weights(READERS).unwrap();
        assert_eq!(live[&backends[0]], 80);
        assert_eq!(live[&backends[1]], 50);
    }

    #[tokio::test]
    async fn writes_are_scoped_to_one_hostgroup() {
        let backends = backends();
        let writer = HostgroupId(10);
        let table = RoutingTable::with_hostgroup(READERS, &backends, 50);

        let update = WeightMap::from([(backends[1].clone(), 7)]);
        table.set_weights(writer, &update).await.unwrap();
        table.publish().await.unwrap();

        assert_eq!(table.runtime_weights(READERS).unwrap()[&backends[1]], 50);
        assert_eq!(table.runtime_weights(writer).unwrap()[&backends[1]], 7);
    }

    #[test]
    fn selection_skips_zero_weight_backends() {
        let backends = backends();
        let table = RoutingTable::new(BTreeMap::from([(
            READERS,
            WeightMap::from([(backends[0].clone(), 0), (backends[1].clone(), 3)]),
        )]));

        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            assert_eq!(table.select_backend(READERS, &mut rng), Some(backends[1].clone()));
        }
        assert_eq!(table.select_backend(HostgroupId(99), &mut rng), None);
    }
}
