//! Active TCP latency prober.

use std::time::Duration;

use async_trait::async_trait;
use sluice_core::{Backend, Prober};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::trace;

/// Measures a backend's round-trip time as the time taken to complete a TCP handshake.
///
/// Hostnames are resolved on every probe, so resolver latency is part of the sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

impl TcpProber {
    /// Create a new TCP prober
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, backend: &Backend, timeout: Duration) -> Option<f64> {
        let started = Instant::now();
        match time::timeout(timeout, TcpStream::connect(backend.connect_addr())).await {
            // The stream is dropped right away, closing the connection
            Ok(Ok(_stream)) => Some(started.elapsed().as_secs_f64() * 1_000.0),
            Ok(Err(e)) => {
                trace!(backend = %backend, error = %e, "tcp connect failed");
                None
            }
            Err(_) => {
                trace!(
                    backend = %backend,
                    timeout_ms = timeout.as_millis() as u64,
                    "tcp connect timed out"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn reachable_backend_yields_a_sample() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let backend = Backend::new("127.0.0.1", port);

        let rtt = TcpProber::new().probe(&backend, Duration::from_secs(1)).await;
        assert!(matches!(rtt, Some(ms) if ms >= 0.0 && ms < 1_000.0));
    }

    #[tokio::test]
    async fn closed_port_yields_no_sample() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let backend = Backend::new("127.0.0.1", port);
        assert_eq!(TcpProber::new().probe(&backend, Duration::from_secs(1)).await, None);
    }
}
