//! Settlement windows around each funding boundary.
//!
//! With a 60 second period, 5 second pre window and 5 second post window:
//! seconds 55..=59 are pre-settlement, 0..=4 are post-settlement, everything else is outside.

use anyhow::Result;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPhase {
    /// Just before a boundary: the engine may open a position.
    PreSettlement,
    /// Just after a boundary: the engine closes a held position.
    PostSettlement,
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementSchedule {
    period_secs: u32,
    pre_secs: u32,
    post_secs: u32,
}

impl SettlementSchedule {
    /// # Errors
    ///
    /// Returns an error if the period is zero or the windows overlap.
    pub fn new(period_secs: u32, pre_secs: u32, post_secs: u32) -> Result<Self> {
        if period_secs == 0 {
            anyhow::bail!("Settlement period must be positive");
        }
        if pre_secs.saturating_add(post_secs) > period_secs {
            anyhow::bail!(
                "Settlement windows overlap: pre {pre_secs}s + post {post_secs}s > period {period_secs}s"
            );
        }
        Ok(Self {
            period_secs,
            pre_secs,
            post_secs,
        })
    }

    /// Classifies an offset (seconds since the last boundary).
    #[must_use]
    pub const fn phase_at_offset(&self, offset: u32) -> WindowPhase {
        let offset = offset % self.period_secs;
        if offset < self.post_secs {
            WindowPhase::PostSettlement
        } else if offset >= self.period_secs - self.pre_secs {
            WindowPhase::PreSettlement
        } else {
            WindowPhase::Outside
        }
    }

    #[must_use]
    pub fn phase(&self, now: DateTime<Utc>) -> WindowPhase {
        let offset = now.timestamp().rem_euclid(i64::from(self.period_secs));
        // rem_euclid with a positive u32 modulus always fits in u32
        self.phase_at_offset(u32::try_from(offset).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_second(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, second).unwrap()
    }

    #[test]
    fn test_window_boundaries() {
        let schedule = SettlementSchedule::new(60, 5, 5).unwrap();

        assert_eq!(schedule.phase(at_second(0)), WindowPhase::PostSettlement);
        assert_eq!(schedule.phase(at_second(4)), WindowPhase::PostSettlement);
        assert_eq!(schedule.phase(at_second(5)), WindowPhase::Outside);
        assert_eq!(schedule.phase(at_second(54)), WindowPhase::Outside);
        assert_eq!(schedule.phase(at_second(55)), WindowPhase::PreSettlement);
        assert_eq!(schedule.phase(at_second(58)), WindowPhase::PreSettlement);
        assert_eq!(schedule.phase(at_second(59)), WindowPhase::PreSettlement);
    }

    #[test]
    fn test_hourly_period() {
        let schedule = SettlementSchedule::new(3600, 5, 5).unwrap();

        let before_hour = Utc.with_ymd_and_hms(2024, 3, 1, 12, 59, 57).unwrap();
        let after_hour = Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 2).unwrap();
        let minute_boundary = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();

        assert_eq!(schedule.phase(before_hour), WindowPhase::PreSettlement);
        assert_eq!(schedule.phase(after_hour), WindowPhase::PostSettlement);
        assert_eq!(schedule.phase(minute_boundary), WindowPhase::Outside);
    }

    #[test]
    fn test_invalid_schedules_rejected() {
        assert!(SettlementSchedule::new(0, 0, 0).is_err());
        assert!(SettlementSchedule::new(60, 40, 30).is_err());
    }

    #[test]
    fn test_zero_width_windows() {
        let schedule = SettlementSchedule::new(60, 0, 0).unwrap();
        for second in 0..60 {
            assert_eq!(schedule.phase_at_offset(second), WindowPhase::Outside);
        }
    }
}
