use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::constants::IST_UTC_OFFSET_SECS;

/// Source of "today" for all date-keyed rotation state.
///
/// Injected into the scheduler rather than read ambiently so that date keys
/// are deterministic under test and independent of caller-local clocks.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Production clock: the current civil date in IST (UTC+05:30).
#[derive(Clone, Copy, Debug, Default)]
pub struct IstClock;

impl Clock for IstClock {
    fn today(&self) -> NaiveDate {
        civil_date(Utc::now())
    }
}

pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(IST_UTC_OFFSET_SECS).expect("IST offset is within +/-24h")
}

/// Civil date in the fixed service timezone for a UTC instant.
pub fn civil_date(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&ist()).date_naive()
}

/// The UTC timestamp window `[from, to)` covering one civil day in the
/// service timezone. Rows carry UTC timestamps; day-scoped reads go through
/// this.
pub fn civil_day_window(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let offset = Duration::seconds(IST_UTC_OFFSET_SECS as i64);
    let from = date.and_time(NaiveTime::MIN) - offset;
    (from, from + Duration::days(1))
}

#[cfg(test)]
pub mod test_support {
    use std::sync::{Arc, Mutex, PoisonError};

    use chrono::{Days, NaiveDate};

    use super::Clock;

    /// Hand-driven clock for simulating day rollovers in tests.
    #[derive(Clone, Debug)]
    pub struct ManualClock {
        today: Arc<Mutex<NaiveDate>>,
    }

    impl ManualClock {
        pub fn starting_at(date: NaiveDate) -> Self {
            Self {
                today: Arc::new(Mutex::new(date)),
            }
        }

        pub fn advance_days(&self, days: u64) {
            let mut today = self
                .today
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *today = today
                .checked_add_days(Days::new(days))
                .expect("date arithmetic in range");
        }
    }

    impl Clock for ManualClock {
        fn today(&self) -> NaiveDate {
            *self.today.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::civil_date;

    #[test]
    fn ist_day_rolls_over_at_1830_utc() {
        let before = Utc.with_ymd_and_hms(2024, 1, 1, 18, 29, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 18, 30, 0).unwrap();

        assert_eq!(
            civil_date(before),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert_eq!(
            civil_date(after),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
    }

    #[test]
    fn civil_day_window_shifts_back_by_the_offset() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let (from, to) = super::civil_day_window(date);

        assert_eq!(
            from,
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(18, 30, 0)
                .unwrap()
        );
        assert_eq!(to - from, chrono::Duration::days(1));
    }

    #[test]
    fn utc_evening_is_already_tomorrow_in_ist() {
        let evening = Utc.with_ymd_and_hms(2024, 6, 15, 19, 0, 0).unwrap();
        assert_eq!(
            civil_date(evening),
            NaiveDate::from_ymd_opt(2024, 6, 16).unwrap()
        );
    }
}
