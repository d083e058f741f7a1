//! Score normalization and the rate-limited weight update law.

/// Inclusive bounds on the weights written to the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightBounds {
    /// The smallest weight a backend may be given
    pub min: u32,
    /// The largest weight a backend may be given
    pub max: u32,
}

impl WeightBounds {
    /// Create new bounds. Callers validate `min <= max` beforehand.
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// The weight every backend starts at.
    pub fn midpoint(&self) -> u32 {
        // Widen so that min + max cannot overflow
        ((u64::from(self.min) + u64::from(self.max)) / 2) as u32
    }

    /// Clip a signed candidate weight into the bounds.
    pub fn clamp(&self, weight: i64) -> u32 {
        weight.clamp(i64::from(self.min), i64::from(self.max)) as u32
    }
}

/// Converts per-backend scores into target weights, in the same order.
///
/// Each backend gets `min + (max - min) * share`, where `share` is its
/// fraction of the total score, rounded half away from zero and clipped.
/// Returns `None` when the total score is not a positive finite number, in
/// which case no weights should change this cycle.
pub fn target_weights(scores: &[f64], bounds: WeightBounds) -> Option<Vec<u32>> {
    let total: f64 = scores.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }

    let span = f64::from(bounds.max) - f64::from(bounds.min);
    let targets = scores
        .iter()
        .map(|score| {
            let raw = f64::from(bounds.min) + span * score / total;
            // `as` saturates on out-of-range floats, and NaN becomes 0
            bounds.clamp(raw.round() as i64)
        })
        .collect();

    Some(targets)
}

/// Moves `live` toward `target` by at most `delta_max`, staying within bounds.
pub fn rate_limit(live: u32, target: u32, delta_max: u32, bounds: WeightBounds) -> u32 {
    let max_step = i64::from(delta_max);
    let delta = (i64::from(target) - i64::from(live)).clamp(-max_step, max_step);
    bounds.clamp(i64::from(live) + delta)
}
