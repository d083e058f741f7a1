//! Exponentially Weighted Moving Average (EWMA) latency estimate
//!
//! Each backend carries one estimate of its round-trip time. New samples pull
//! the estimate toward themselves by a fixed fraction `alpha`, so a single
//! noisy probe moves routing only a little while a sustained shift in latency
//! is tracked within a few cycles.

/// The smallest value an estimate (or an incoming sample) may take, in milliseconds.
///
/// Keeps the estimate strictly positive even if a prober reports a zero RTT.
pub const MIN_LATENCY_MS: f64 = 1e-3;

/// A backend's smoothed round-trip latency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyEstimate {
    /// The current moving average, in milliseconds. Always `> 0`.
    value_ms: f64,

    /// The weight given to each new sample. A higher alpha (e.g. 0.9) reacts
    /// quickly; a lower alpha (e.g. 0.1) smooths more heavily.
    alpha: f64,
}

impl LatencyEstimate {
    /// Create a new estimate starting at `initial_ms` with smoothing factor `alpha`.
    ///
    /// Start from a deliberately large value so that backends which have not
    /// been measured yet are deprioritized rather than favored.
    pub fn new(initial_ms: f64, alpha: f64) -> Self {
        Self {
            value_ms: initial_ms.max(MIN_LATENCY_MS),
            alpha,
        }
    }

    /// Read the current moving average.
    pub fn get(&self) -> f64 {
        self.value_ms
    }

    /// Fold a new aggregate sample into the average.
    ///
    /// `estimate = alpha * sample + (1 - alpha) * estimate`
    pub fn observe(&mut self, sample_ms: f64) {
        let sample = sample_ms.max(MIN_LATENCY_MS);
        let next = self.alpha * sample + (1.0 - self.alpha) * self.value_ms;
        self.value_ms = next.max(MIN_LATENCY_MS);
    }

    /// Calculate the routing preference of this backend. A higher score is better.
    ///
    /// Score = 1 / (EWMA Latency + epsilon)
    pub fn score(&self, epsilon: f64) -> f64 {
        1.0 / (self.value_ms + epsilon)
    }
}
