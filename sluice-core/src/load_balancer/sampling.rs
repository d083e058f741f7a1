//! Robust aggregation of the latency probes taken in one cycle.

/// Reduces one cycle's probe outcomes for a backend to a single RTT sample.
///
/// Failed probes (`None`) and values that are not finite non-negative numbers
/// are discarded, never counted as zero. The remaining successes reduce as:
///
/// - none: `None`, the caller keeps its previous estimate
/// - one: that value
/// - two: their arithmetic mean
/// - three or more: the median of the first three
pub fn aggregate_samples(probes: &[Option<f64>]) -> Option<f64> {
    let mut ok = probes.iter().flatten().copied().filter(|rtt| rtt.is_finite() && *rtt >= 0.0);

    let first = ok.next()?;
    let Some(second) = ok.next() else {
        return Some(first);
    };
    let Some(third) = ok.next() else {
        return Some((first + second) / 2.0);
    };

    Some(median_of_three(first, second, third))
}

fn median_of_three(a: f64, b: f64, c: f64) -> f64 {
    a.max(b).min(a.min(b).max(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_failure_averages_the_rest() {
        assert_eq!(aggregate_samples(&[Some(12.0), Some(14.0), None]), Some(13.0));
    }

    #[test]
    fn three_successes_take_the_median() {
        assert_eq!(aggregate_samples(&[Some(10.0), Some(20.0), Some(15.0)]), Some(15.0));
        assert_eq!(aggregate_samples(&[Some(30.0), Some(1.0), Some(2.0)]), Some(2.0));
        assert_eq!(aggregate_samples(&[Some(5.0), Some(5.0), Some(900.0)]), Some(5.0));
    }

    #[test]
    fn all_failures_yield_no_sample() {
        assert_eq!(aggregate_samples(&[None, None, None]), None);
        assert_eq!(aggregate_samples(&[]), None);
    }

    #[test]
    fn single_success_is_used_as_is() {
        assert_eq!(aggregate_samples(&[None, Some(7.5), None]), Some(7.5));
    }

    #[test]
    fn only_the_first_three_successes_count() {
        let probes = [Some(10.0), None, Some(11.0), Some(12.0), Some(1000.0), Some(1000.0)];
        assert_eq!(aggregate_samples(&probes), Some(11.0));
    }

    #[test]
    fn garbage_values_are_discarded() {
        let probes = [Some(f64::NAN), Some(-1.0), Some(f64::INFINITY), Some(8.0)];
        assert_eq!(aggregate_samples(&probes), Some(8.0));
    }
}
