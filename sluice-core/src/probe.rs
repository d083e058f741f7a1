//! The latency probing contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::backend::Backend;

/// Measures the round-trip time to a backend.
///
/// A probe never fails loudly: an unreachable backend, a refused connection or
/// a probe that outlives `timeout` all yield `None`.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Take one RTT sample, in milliseconds.
    async fn probe(&self, backend: &Backend, timeout: Duration) -> Option<f64>;
}

#[async_trait]
impl<T: Prober + ?Sized> Prober for Arc<T> {
    async fn probe(&self, backend: &Backend, timeout: Duration) -> Option<f64> {
        (**self).probe(backend, timeout).await
    }
}
