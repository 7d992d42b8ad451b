//! Last-access and last-modified inclusion filters.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::datefmt;
use crate::error::{ConnectorError, Result};

/// Source of "now".
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Decides whether a timestamp keeps a file out of the index.
///
/// Timestamps equal to the cutoff are kept; only strictly older ones are
/// excluded.
#[derive(Debug, Clone)]
pub enum TimeFilter {
    AlwaysAllow,
    /// Fixed oldest-allowed instant.
    Absolute { oldest_allowed: DateTime<Utc> },
    /// Oldest allowed instant is `days` before the clock's now.
    Expiring { days: i64, clock: Arc<dyn Clock> },
}

impl TimeFilter {
    /// Absolute cutoff; a cutoff in the future would exclude everything.
    pub fn absolute(oldest_allowed: DateTime<Utc>, clock: &dyn Clock) -> Result<Self> {
        if oldest_allowed > clock.now() {
            return Err(ConnectorError::InvalidTimeFilter {
                reason: format!(
                    "cutoff {} is in the future",
                    datefmt::format_timestamp(oldest_allowed)
                ),
            });
        }
        Ok(TimeFilter::Absolute { oldest_allowed })
    }

    /// Rolling cutoff; the day count must be positive and its cutoff must
    /// be representable from the clock's current time.
    pub fn expiring(days: i64, clock: Arc<dyn Clock>) -> Result<Self> {
        if days <= 0 {
            return Err(ConnectorError::InvalidTimeFilter {
                reason: format!("day count must be positive, got {}", days),
            });
        }
        if cutoff(clock.now(), days).is_none() {
            return Err(ConnectorError::InvalidTimeFilter {
                reason: format!("day count {} is out of range", days),
            });
        }
        Ok(TimeFilter::Expiring { days, clock })
    }

    /// Builds a filter from a mutually exclusive date/days setting pair.
    pub fn from_settings(
        date: Option<&str>,
        days: Option<i64>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        match (date, days) {
            (Some(_), Some(_)) => Err(ConnectorError::InvalidTimeFilter {
                reason: "an absolute date and a day count cannot both be set".to_string(),
            }),
            (Some(date), None) => Self::absolute(datefmt::parse_date(date)?, clock.as_ref()),
            (None, Some(days)) => Self::expiring(days, clock),
            (None, None) => Ok(TimeFilter::AlwaysAllow),
        }
    }

    pub fn excluded(&self, t: DateTime<Utc>) -> bool {
        match self {
            TimeFilter::AlwaysAllow => false,
            TimeFilter::Absolute { oldest_allowed } => t < *oldest_allowed,
            TimeFilter::Expiring { days, clock } => match cutoff(clock.now(), *days) {
                Some(oldest_allowed) => t < oldest_allowed,
                None => false,
            },
        }
    }
}

fn cutoff(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days).and_then(|d| now.checked_sub_signed(d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(now()))
    }

    #[test]
    fn test_always_allow() {
        assert!(!TimeFilter::AlwaysAllow.excluded(DateTime::<Utc>::MIN_UTC));
    }

    #[test]
    fn test_absolute_boundary() {
        let cutoff = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let f = TimeFilter::absolute(cutoff, &FixedClock(now())).unwrap();
        assert!(!f.excluded(cutoff));
        assert!(f.excluded(cutoff - Duration::seconds(1)));
        assert!(!f.excluded(cutoff + Duration::seconds(1)));
    }

    #[test]
    fn test_absolute_future_rejected() {
        let future = now() + Duration::days(1);
        assert!(matches!(
            TimeFilter::absolute(future, &FixedClock(now())),
            Err(ConnectorError::InvalidTimeFilter { .. })
        ));
        assert!(TimeFilter::absolute(now(), &FixedClock(now())).is_ok());
    }

    #[test]
    fn test_expiring_boundary_is_inclusive_and_stable() {
        let f = TimeFilter::expiring(30, clock()).unwrap();
        let boundary = now() - Duration::seconds(30 * 86_400);
        for _ in 0..3 {
            assert!(!f.excluded(boundary));
            assert!(f.excluded(boundary - Duration::seconds(1)));
        }
    }

    #[test]
    fn test_expiring_rejects_non_positive() {
        assert!(TimeFilter::expiring(0, clock()).is_err());
        assert!(TimeFilter::expiring(-3, clock()).is_err());
    }

    #[test]
    fn test_expiring_rejects_unrepresentable_cutoff() {
        assert!(matches!(
            TimeFilter::expiring(1_000_000_000, clock()),
            Err(ConnectorError::InvalidTimeFilter { .. })
        ));
        assert!(TimeFilter::from_settings(None, Some(i64::MAX), clock()).is_err());
    }

    #[test]
    fn test_expiring_keeps_files_when_cutoff_underflows() {
        let f = TimeFilter::Expiring {
            days: 1_000_000_000,
            clock: clock(),
        };
        assert!(!f.excluded(now()));
        assert!(!f.excluded(DateTime::<Utc>::MIN_UTC));
    }

    #[test]
    fn test_from_settings() {
        assert!(matches!(
            TimeFilter::from_settings(None, None, clock()).unwrap(),
            TimeFilter::AlwaysAllow
        ));
        assert!(matches!(
            TimeFilter::from_settings(Some("2020-01-01"), None, clock()).unwrap(),
            TimeFilter::Absolute { .. }
        ));
        assert!(matches!(
            TimeFilter::from_settings(None, Some(7), clock()).unwrap(),
            TimeFilter::Expiring { days: 7, .. }
        ));
        assert!(TimeFilter::from_settings(Some("2020-01-01"), Some(7), clock()).is_err());
        assert!(TimeFilter::from_settings(Some("2099-01-01"), None, clock()).is_err());
        assert!(TimeFilter::from_settings(Some("not a date"), None, clock()).is_err());
    }
}
