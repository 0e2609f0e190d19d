use serde::Serialize;

/// Percent reported alongside an error message.
pub const ERROR_PERCENT: f64 = -1.0;

/// Fixed progress points around submission and completion.
pub mod stage {
    pub const VALIDATING: f64 = 0.0;
    pub const PREPARING: f64 = 5.0;
    pub const SENDING: f64 = 10.0;
    pub const GENERATING: f64 = 15.0;
    pub const DONE: f64 = 100.0;
}

/// Share of the overall bar given to polling (15% .. 95%).
const POLL_BAND: f64 = 0.8;

/// Transient progress event; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// `0.0..=100.0`, or [`ERROR_PERCENT`].
    pub percent: f64,
    pub message: String,
}

impl ProgressSnapshot {
    pub fn new(percent: f64, message: impl Into<String>) -> Self {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        Self {
            percent,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            percent: ERROR_PERCENT,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.percent < 0.0
    }

    /// Map a polling-local snapshot into the overall bar: `15 + p * 0.8`.
    pub fn into_overall(self) -> Self {
        if self.is_error() {
            return self;
        }
        Self::new(stage::GENERATING + self.percent * POLL_BAND, self.message)
    }
}

/// `ticks / (max_ticks * 0.8)` as a percentage, clamped to `0..=100`.
///
/// The bar reaches 100% at 80% of the tick budget so a typical job does not
/// appear stalled just short of completion.
pub fn poll_percent(ticks: u32, max_ticks: u32) -> f64 {
    if max_ticks == 0 {
        return 100.0;
    }
    let expected = f64::from(max_ticks) * POLL_BAND;
    (f64::from(ticks) / expected * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_percent_saturates_at_eighty_percent_of_budget() {
        assert_eq!(poll_percent(0, 90), 0.0);
        assert_eq!(poll_percent(36, 90), 50.0);
        assert_eq!(poll_percent(72, 90), 100.0);
        assert_eq!(poll_percent(89, 90), 100.0);
    }

    #[test]
    fn overall_mapping_stays_in_generation_band() {
        assert_eq!(ProgressSnapshot::new(0.0, "x").into_overall().percent, 15.0);
        assert_eq!(ProgressSnapshot::new(100.0, "x").into_overall().percent, 95.0);
        assert!(ProgressSnapshot::error("boom").into_overall().is_error());
    }

    #[test]
    fn snapshot_clamps_out_of_range_values() {
        assert_eq!(ProgressSnapshot::new(140.0, "x").percent, 100.0);
        assert_eq!(ProgressSnapshot::new(-3.0, "x").percent, 0.0);
    }
}
