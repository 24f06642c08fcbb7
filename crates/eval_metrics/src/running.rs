//! Streaming weighted mean used for per-epoch loss, accuracy and timings.

/// Tracks the latest value and the weighted running average of a scalar.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStat {
    val: f64,
    sum: f64,
    count: f64,
}

impl RunningStat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record `value` observed over `weight` samples (usually the batch size).
    pub fn update(&mut self, value: f64, weight: f64) {
        self.val = value;
        self.sum += value * weight;
        self.count += weight;
    }

    pub fn update_one(&mut self, value: f64) {
        self.update(value, 1.0);
    }

    /// Most recent value passed to `update`.
    pub fn val(&self) -> f64 {
        self.val
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    /// Weighted average, or `None` until some non-zero weight has been seen.
    pub fn avg(&self) -> Option<f64> {
        if self.count == 0.0 {
            None
        } else {
            Some(self.sum / self.count)
        }
    }

    /// Average for display; 0 when undefined.
    pub fn avg_or_zero(&self) -> f64 {
        self.avg().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_is_undefined_before_first_update() {
        let stat = RunningStat::new();
        assert_eq!(stat.avg(), None);
        assert_eq!(stat.avg_or_zero(), 0.0);
    }

    #[test]
    fn single_update_average_equals_value() {
        let mut stat = RunningStat::new();
        stat.update_one(3.25);
        assert_eq!(stat.avg(), Some(3.25));
        assert_eq!(stat.val(), 3.25);
    }

    #[test]
    fn weighted_updates_combine() {
        let mut stat = RunningStat::new();
        stat.update(2.0, 3.0);
        stat.update(5.0, 1.0);
        let expected = (2.0 * 3.0 + 5.0 * 1.0) / 4.0;
        assert!((stat.avg().unwrap() - expected).abs() < 1e-12);
        assert_eq!(stat.val(), 5.0);
        assert_eq!(stat.count(), 4.0);
    }

    #[test]
    fn reset_clears_everything() {
        let mut stat = RunningStat::new();
        stat.update(9.0, 2.0);
        stat.reset();
        assert_eq!(stat, RunningStat::default());
        assert_eq!(stat.avg(), None);
    }
}
