//! Controller configuration and its validation.

use std::collections::HashSet;
use std::time::Duration;

use crate::domain::backend::{Backend, HostgroupId};
use crate::error::ConfigError;
use crate::load_balancer::weights::WeightBounds;

/// The hostgroup ProxySQL routes read-only traffic to
pub const DEFAULT_READER_HOSTGROUP: HostgroupId = HostgroupId(20);
/// The default interval between control cycles
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(5);
/// The default number of probes per backend per cycle
pub const DEFAULT_SAMPLES_PER_CYCLE: usize = 3;
/// The default EMA smoothing factor
pub const DEFAULT_ALPHA: f64 = 0.3;
/// The default score-denominator floor, in milliseconds
pub const DEFAULT_EPSILON: f64 = 0.1;
/// The default lower weight bound
pub const DEFAULT_WEIGHT_MIN: u32 = 1;
/// The default upper weight bound
pub const DEFAULT_WEIGHT_MAX: u32 = 100;
/// The default largest per-cycle weight change
pub const DEFAULT_DELTA_MAX: u32 = 10;
/// The default bound on a single probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
/// The default starting latency estimate, in milliseconds
pub const DEFAULT_INITIAL_ESTIMATE_MS: f64 = 1_000.0;

/// Everything a controller needs, fixed for its lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// The replicas whose weights are managed
    pub workers: Vec<Backend>,
    /// The routing-store hostgroup the replicas belong to
    pub hostgroup: HostgroupId,
    /// The interval between control cycles
    pub period: Duration,
    /// How many probes to take per backend per cycle
    pub samples_per_cycle: usize,
    /// EMA smoothing factor in `(0, 1]`; larger reacts faster
    pub alpha: f64,
    /// Added to every estimate before inverting it into a score
    pub epsilon: f64,
    /// The smallest weight written to the store
    pub weight_min: u32,
    /// The largest weight written to the store
    pub weight_max: u32,
    /// The largest change applied to one backend's weight in one cycle
    pub delta_max: u32,
    /// The bound on a single probe
    pub probe_timeout: Duration,
    /// The latency every backend is assumed to have before it is measured
    pub initial_estimate_ms: f64,
}

impl ControllerConfig {
    /// A configuration for `workers` with every other setting at its default.
    pub fn new(workers: Vec<Backend>) -> Self {
        Self {
            workers,
            hostgroup: DEFAULT_READER_HOSTGROUP,
            period: DEFAULT_PERIOD,
            samples_per_cycle: DEFAULT_SAMPLES_PER_CYCLE,
            alpha: DEFAULT_ALPHA,
            epsilon: DEFAULT_EPSILON,
            weight_min: DEFAULT_WEIGHT_MIN,
            weight_max: DEFAULT_WEIGHT_MAX,
            delta_max: DEFAULT_DELTA_MAX,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            initial_estimate_ms: DEFAULT_INITIAL_ESTIMATE_MS,
        }
    }

    /// Check every setting, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers.is_empty() {
            return Err(ConfigError::NoBackends);
        }

        let mut seen = HashSet::with_capacity(self.workers.len());
        for worker in &self.workers {
            if !seen.insert(worker) {
                return Err(ConfigError::DuplicateBackend(worker.clone()));
            }
        }

        if self.period.is_zero() {
            return Err(ConfigError::ZeroPeriod);
        }
        if self.probe_timeout.is_zero() {
            return Err(ConfigError::ZeroProbeTimeout);
        }
        if self.samples_per_cycle == 0 {
            return Err(ConfigError::NoSamples);
        }
        // Written so that NaN fails too
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(ConfigError::InvalidAlpha(self.alpha));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(ConfigError::InvalidEpsilon(self.epsilon));
        }
        if !(self.initial_estimate_ms.is_finite() && self.initial_estimate_ms > 0.0) {
            return Err(ConfigError::InvalidInitialEstimate(self.initial_estimate_ms));
        }
        if self.weight_min > self.weight_max {
            return Err(ConfigError::InvertedWeightBounds {
                min: self.weight_min,
                max: self.weight_max,
            });
        }

        Ok(())
    }

    /// The weight bounds as a single value.
    pub fn bounds(&self) -> WeightBounds {
        WeightBounds::new(self.weight_min, self.weight_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ControllerConfig {
        ControllerConfig::new(vec![Backend::new("10.0.0.2", 3306), Backend::new("10.0.0.3", 3306)])
    }

    #[test]
    fn defaults_are_valid() {
        assert_eq!(config().validate(), Ok(()));
        assert_eq!(config().bounds().midpoint(), 50);
    }

    #[test]
    fn rejects_empty_and_duplicate_backends() {
        let mut cfg = config();
        cfg.workers.clear();
        assert_eq!(cfg.validate(), Err(ConfigError::NoBackends));

        let mut cfg = config();
        cfg.workers.push(Backend::new("10.0.0.2", 3306));
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::DuplicateBackend(Backend::new("10.0.0.2", 3306)))
        );
    }

    fn rejected(mutate: impl FnOnce(&mut ControllerConfig)) -> ConfigError {
        let mut cfg = config();
        mutate(&mut cfg);
        cfg.validate().unwrap_err()
    }

    #[test]
    fn rejects_bad_numeric_settings() {
        assert_eq!(rejected(|c| c.period = Duration::ZERO), ConfigError::ZeroPeriod);
        assert_eq!(rejected(|c| c.probe_timeout = Duration::ZERO), ConfigError::ZeroProbeTimeout);
        assert_eq!(rejected(|c| c.samples_per_cycle = 0), ConfigError::NoSamples);
        assert_eq!(rejected(|c| c.alpha = 0.0), ConfigError::InvalidAlpha(0.0));
        assert_eq!(rejected(|c| c.alpha = 1.5), ConfigError::InvalidAlpha(1.5));
        assert!(matches!(
            rejected(|c| c.alpha = f64::NAN),
            ConfigError::InvalidAlpha(a) if a.is_nan()
        ));
        assert_eq!(rejected(|c| c.epsilon = 0.0), ConfigError::InvalidEpsilon(0.0));
        assert_eq!(
            rejected(|c| c.epsilon = f64::INFINITY),
            ConfigError::InvalidEpsilon(f64::INFINITY)
        );
        assert_eq!(
            rejected(|c| c.initial_estimate_ms = -1.0),
            ConfigError::InvalidInitialEstimate(-1.0)
        );
        assert_eq!(
            rejected(|c| {
                c.weight_min = 10;
                c.weight_max = 5;
            }),
            ConfigError::InvertedWeightBounds { min: 10, max: 5 }
        );
    }

    #[test]
    fn alpha_of_one_and_equal_bounds_are_allowed() {
        let mut cfg = config();
        cfg.alpha = 1.0;
        cfg.weight_min = 7;
        cfg.weight_max = 7;
        cfg.delta_max = 0;
        assert_eq!(cfg.validate(), Ok(()));
    }
}
