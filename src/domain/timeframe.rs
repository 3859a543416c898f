//! Half-open time intervals and calendar/exact trading periods.

use crate::domain::error::{BackflowError, Result};
use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use rand::Rng;
use std::fmt;
use std::str::FromStr;

/// A span of time used to move through a timeline.
///
/// Calendar periods (years, months, days) follow the UTC calendar, so one
/// month added to Jan 31 lands on the last day of February. Exact periods
/// are fixed durations. The two kinds never mix in arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingPeriod {
    Calendar { months: i32, days: i32 },
    Exact(Duration),
}

impl TradingPeriod {
    /// Saturates at the `i32` month range.
    pub fn years(n: i32) -> Self {
        TradingPeriod::Calendar {
            months: n.saturating_mul(12),
            days: 0,
        }
    }

    pub fn months(n: i32) -> Self {
        TradingPeriod::Calendar { months: n, days: 0 }
    }

    pub fn days(n: i32) -> Self {
        TradingPeriod::Calendar { months: 0, days: n }
    }

    /// Exact constructors saturate at the representable duration range; use
    /// [`FromStr`] to reject out-of-range input instead.
    pub fn hours(n: i64) -> Self {
        TradingPeriod::Exact(saturating(Duration::try_hours(n), n < 0))
    }

    pub fn minutes(n: i64) -> Self {
        TradingPeriod::Exact(saturating(Duration::try_minutes(n), n < 0))
    }

    pub fn seconds(n: i64) -> Self {
        TradingPeriod::Exact(saturating(Duration::try_seconds(n), n < 0))
    }

    pub fn millis(n: i64) -> Self {
        TradingPeriod::Exact(saturating(Duration::try_milliseconds(n), n < 0))
    }

    pub fn is_zero(&self) -> bool {
        match self {
            TradingPeriod::Calendar { months, days } => *months == 0 && *days == 0,
            TradingPeriod::Exact(d) => d.is_zero(),
        }
    }

    pub fn checked_add(self, other: TradingPeriod) -> Result<TradingPeriod> {
        match (self, other) {
            (
                TradingPeriod::Calendar { months: m1, days: d1 },
                TradingPeriod::Calendar { months: m2, days: d2 },
            ) => match (m1.checked_add(m2), d1.checked_add(d2)) {
                (Some(months), Some(days)) => Ok(TradingPeriod::Calendar { months, days }),
                _ => Err(self.overflow("+", other)),
            },
            (TradingPeriod::Exact(a), TradingPeriod::Exact(b)) => a
                .checked_add(&b)
                .map(TradingPeriod::Exact)
                .ok_or_else(|| self.overflow("+", other)),
            _ => Err(self.incompatible(other)),
        }
    }

    pub fn checked_sub(self, other: TradingPeriod) -> Result<TradingPeriod> {
        match (self, other) {
            (
                TradingPeriod::Calendar { months: m1, days: d1 },
                TradingPeriod::Calendar { months: m2, days: d2 },
            ) => match (m1.checked_sub(m2), d1.checked_sub(d2)) {
                (Some(months), Some(days)) => Ok(TradingPeriod::Calendar { months, days }),
                _ => Err(self.overflow("-", other)),
            },
            (TradingPeriod::Exact(a), TradingPeriod::Exact(b)) => a
                .checked_sub(&b)
                .map(TradingPeriod::Exact)
                .ok_or_else(|| self.overflow("-", other)),
            _ => Err(self.incompatible(other)),
        }
    }

    /// This period repeated `n` times, saturating on overflow.
    pub fn times(self, n: i32) -> TradingPeriod {
        match self {
            TradingPeriod::Calendar { months, days } => TradingPeriod::Calendar {
                months: months.saturating_mul(n),
                days: days.saturating_mul(n),
            },
            TradingPeriod::Exact(d) => {
                TradingPeriod::Exact(saturating(d.checked_mul(n), (d < Duration::zero()) != (n < 0)))
            }
        }
    }

    /// `instant + self`, saturating at the representable bounds.
    pub fn add_to(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            TradingPeriod::Calendar { months, days } => {
                shift_days(shift_months(instant, months), days)
            }
            TradingPeriod::Exact(d) => instant
                .checked_add_signed(d)
                .unwrap_or(if d < Duration::zero() {
                    DateTime::<Utc>::MIN_UTC
                } else {
                    DateTime::<Utc>::MAX_UTC
                }),
        }
    }

    /// `instant - self`, saturating at the representable bounds.
    pub fn sub_from(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.times(-1).add_to(instant)
    }

    fn overflow(&self, op: &str, other: TradingPeriod) -> BackflowError {
        BackflowError::invalid_argument(format!("period overflow: {self} {op} {other}"))
    }

    fn incompatible(&self, other: TradingPeriod) -> BackflowError {
        BackflowError::IncompatiblePeriodKind {
            left: self.to_string(),
            right: other.to_string(),
        }
    }
}

fn saturating(delta: Option<Duration>, negative: bool) -> Duration {
    delta.unwrap_or(if negative { Duration::MIN } else { Duration::MAX })
}

fn shift_months(instant: DateTime<Utc>, months: i32) -> DateTime<Utc> {
    let shifted = if months >= 0 {
        instant.checked_add_months(Months::new(months.unsigned_abs()))
    } else {
        instant.checked_sub_months(Months::new(months.unsigned_abs()))
    };
    shifted.unwrap_or(if months < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

fn shift_days(instant: DateTime<Utc>, days: i32) -> DateTime<Utc> {
    instant
        .checked_add_signed(Duration::days(days as i64))
        .unwrap_or(if days < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
}

impl fmt::Display for TradingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TradingPeriod::Calendar { months, days } => {
                if months == 0 && days == 0 {
                    return f.write_str("0D");
                }
                if months != 0 {
                    if months % 12 == 0 {
                        write!(f, "{}Y", months / 12)?;
                    } else {
                        write!(f, "{months}M")?;
                    }
                }
                if days != 0 {
                    write!(f, "{days}D")?;
                }
                Ok(())
            }
            TradingPeriod::Exact(d) => {
                let ms = d.num_milliseconds();
                if ms != 0 && ms % 3_600_000 == 0 {
                    write!(f, "{}H", ms / 3_600_000)
                } else if ms != 0 && ms % 60_000 == 0 {
                    write!(f, "{}m", ms / 60_000)
                } else if ms % 1000 == 0 {
                    write!(f, "{}s", ms / 1000)
                } else {
                    write!(f, "{ms}ms")
                }
            }
        }
    }
}

impl FromStr for TradingPeriod {
    type Err = BackflowError;

    /// Parses `2Y`, `6M`, `10D` (calendar) and `4H`, `30m`, `15s`, `500ms` (exact).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '-'))
            .ok_or_else(|| BackflowError::invalid_argument(format!("missing unit in period '{s}'")))?;
        let (number, unit) = s.split_at(split);
        let n: i64 = number
            .parse()
            .map_err(|_| BackflowError::invalid_argument(format!("invalid period '{s}'")))?;
        let out_of_range =
            || BackflowError::invalid_argument(format!("period out of range '{s}'"));
        let calendar = |n: i64| i32::try_from(n).map_err(|_| out_of_range());
        let exact = |d: Option<Duration>| d.map(TradingPeriod::Exact).ok_or_else(out_of_range);
        match unit {
            "Y" | "y" => {
                let months = calendar(n)?.checked_mul(12).ok_or_else(out_of_range)?;
                Ok(TradingPeriod::months(months))
            }
            "M" => Ok(TradingPeriod::months(calendar(n)?)),
            "D" | "d" => Ok(TradingPeriod::days(calendar(n)?)),
            "H" | "h" => exact(Duration::try_hours(n)),
            "m" => exact(Duration::try_minutes(n)),
            "s" | "S" => exact(Duration::try_seconds(n)),
            "ms" => exact(Duration::try_milliseconds(n)),
            _ => Err(BackflowError::invalid_argument(format!(
                "unknown period unit '{unit}' in '{s}'"
            ))),
        }
    }
}

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeframe {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Timeframe {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(BackflowError::invalid_argument(format!(
                "timeframe end {end} is before start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Every representable instant.
    pub const INFINITE: Timeframe = Timeframe {
        start: DateTime::<Utc>::MIN_UTC,
        end: DateTime::<Utc>::MAX_UTC,
    };

    pub fn infinite() -> Self {
        Self::INFINITE
    }

    /// Parse both bounds as `YYYY-MM-DD` or RFC 3339.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_instant(start)?, parse_instant(end)?)
    }

    /// Timeframe starting at `start` and spanning `period`.
    pub fn starting(start: DateTime<Utc>, period: TradingPeriod) -> Result<Self> {
        Self::new(start, period.add_to(start))
    }

    pub fn is_infinite(&self) -> bool {
        self.start == DateTime::<Utc>::MIN_UTC && self.end == DateTime::<Utc>::MAX_UTC
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && time < self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// The `period` directly after this timeframe.
    pub fn next_period(&self, period: TradingPeriod) -> Timeframe {
        Timeframe {
            start: self.end,
            end: period.add_to(self.end).max(self.end),
        }
    }

    /// The `period` directly before this timeframe.
    pub fn previous_period(&self, period: TradingPeriod) -> Timeframe {
        Timeframe {
            start: period.sub_from(self.start).min(self.start),
            end: self.start,
        }
    }

    /// Consecutive windows of length `period`; a trailing remainder shorter
    /// than `period` is dropped.
    pub fn split(&self, period: TradingPeriod) -> Result<Vec<Timeframe>> {
        if period.is_zero() {
            return Err(BackflowError::invalid_argument("cannot split by a zero period"));
        }
        let mut windows = Vec::new();
        let mut cursor = self.start;
        loop {
            let next = period.add_to(cursor);
            if next <= cursor || next > self.end {
                break;
            }
            windows.push(Timeframe {
                start: cursor,
                end: next,
            });
            cursor = next;
        }
        Ok(windows)
    }

    /// Draw `samples` windows of length `period` with uniformly random start
    /// (with replacement). Starts are truncated to midnight when that keeps
    /// them inside the timeframe.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        period: TradingPeriod,
        samples: usize,
        rng: &mut R,
    ) -> Result<Vec<Timeframe>> {
        let last_start = period.sub_from(self.end);
        if last_start < self.start || self.is_infinite() {
            return Err(BackflowError::invalid_argument(format!(
                "cannot sample {period} windows from {self}"
            )));
        }
        let span = (last_start - self.start).num_seconds();
        let mut result = Vec::with_capacity(samples);
        for _ in 0..samples {
            let offset = if span > 0 { rng.gen_range(0..=span) } else { 0 };
            let mut start = self.start + Duration::seconds(offset);
            let midnight = start
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc())
                .unwrap_or(start);
            if midnight >= self.start {
                start = midnight;
            }
            let end = period.add_to(start).min(self.end);
            result.push(Timeframe { start, end });
        }
        Ok(result)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            return f.write_str("[-inf - +inf)");
        }
        write!(
            f,
            "[{} - {})",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

/// Parse `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BackflowError::invalid_argument(format!("invalid timestamp '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn calendar_months_follow_the_calendar() {
        let jan31 = at(2023, 1, 31);
        assert_eq!(TradingPeriod::months(1).add_to(jan31), at(2023, 2, 28));
        assert_eq!(TradingPeriod::years(1).add_to(jan31), at(2024, 1, 31));
        assert_eq!(TradingPeriod::days(-1).add_to(jan31), at(2023, 1, 30));
        assert_eq!(TradingPeriod::months(2).sub_from(at(2023, 3, 15)), at(2023, 1, 15));
    }

    #[test]
    fn exact_periods_are_durations() {
        let t = at(2023, 1, 1);
        assert_eq!(
            TradingPeriod::hours(36).add_to(t),
            Utc.with_ymd_and_hms(2023, 1, 2, 12, 0, 0).unwrap()
        );
        assert_eq!(
            TradingPeriod::millis(1500).add_to(t),
            t + Duration::milliseconds(1500)
        );
    }

    #[test]
    fn same_kind_periods_combine() {
        let p = TradingPeriod::months(6).checked_add(TradingPeriod::days(2)).unwrap();
        assert_eq!(p, TradingPeriod::Calendar { months: 6, days: 2 });
        let q = TradingPeriod::hours(2).checked_sub(TradingPeriod::minutes(30)).unwrap();
        assert_eq!(q, TradingPeriod::minutes(90));
    }

    #[test]
    fn mixed_kinds_are_rejected() {
        let err = TradingPeriod::months(1)
            .checked_add(TradingPeriod::hours(1))
            .unwrap_err();
        assert!(matches!(err, BackflowError::IncompatiblePeriodKind { .. }));
        let err = TradingPeriod::seconds(1)
            .checked_sub(TradingPeriod::days(1))
            .unwrap_err();
        assert!(matches!(err, BackflowError::IncompatiblePeriodKind { .. }));
    }

    #[test]
    fn out_of_range_periods_are_errors() {
        for input in ["9999999999999999H", "200000000Y", "99999999999D", "-9223372036854775808s"] {
            let err = input.parse::<TradingPeriod>().unwrap_err();
            assert!(matches!(err, BackflowError::InvalidArgument { .. }), "{input}");
        }
        assert!(TradingPeriod::months(i32::MAX)
            .checked_add(TradingPeriod::months(1))
            .is_err());
        assert!(TradingPeriod::days(i32::MIN)
            .checked_sub(TradingPeriod::days(1))
            .is_err());
        assert!(TradingPeriod::Exact(Duration::MAX)
            .checked_add(TradingPeriod::millis(1))
            .is_err());
    }

    #[test]
    fn constructors_and_times_saturate() {
        assert_eq!(TradingPeriod::years(i32::MAX), TradingPeriod::months(i32::MAX));
        assert_eq!(TradingPeriod::hours(i64::MAX), TradingPeriod::Exact(Duration::MAX));
        assert_eq!(TradingPeriod::seconds(i64::MIN), TradingPeriod::Exact(Duration::MIN));
        assert_eq!(
            TradingPeriod::months(i32::MAX).times(2),
            TradingPeriod::months(i32::MAX)
        );
        assert_eq!(
            TradingPeriod::Exact(Duration::MAX).times(-2),
            TradingPeriod::Exact(Duration::MIN)
        );
        let t = at(2023, 1, 1);
        assert_eq!(TradingPeriod::years(i32::MAX).add_to(t), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn parse_and_display_periods() {
        assert_eq!("6M".parse::<TradingPeriod>().unwrap(), TradingPeriod::months(6));
        assert_eq!("2Y".parse::<TradingPeriod>().unwrap(), TradingPeriod::months(24));
        assert_eq!("10D".parse::<TradingPeriod>().unwrap(), TradingPeriod::days(10));
        assert_eq!("4H".parse::<TradingPeriod>().unwrap(), TradingPeriod::hours(4));
        assert_eq!("30m".parse::<TradingPeriod>().unwrap(), TradingPeriod::minutes(30));
        assert_eq!("500ms".parse::<TradingPeriod>().unwrap(), TradingPeriod::millis(500));
        assert!("6".parse::<TradingPeriod>().is_err());
        assert!("6W".parse::<TradingPeriod>().is_err());

        assert_eq!(TradingPeriod::years(2).to_string(), "2Y");
        assert_eq!(TradingPeriod::months(7).to_string(), "7M");
        assert_eq!(TradingPeriod::minutes(90).to_string(), "90m");
        assert_eq!(TradingPeriod::hours(3).to_string(), "3H");
    }

    #[test]
    fn timeframe_is_half_open() {
        let tf = Timeframe::new(at(2023, 1, 1), at(2023, 2, 1)).unwrap();
        assert!(tf.contains(at(2023, 1, 1)));
        assert!(tf.contains(at(2023, 1, 31)));
        assert!(!tf.contains(at(2023, 2, 1)));
        assert!(!tf.contains(at(2022, 12, 31)));
    }

    #[test]
    fn timeframe_rejects_reversed_bounds() {
        assert!(Timeframe::new(at(2023, 2, 1), at(2023, 1, 1)).is_err());
    }

    #[test]
    fn adjacent_periods() {
        let tf = Timeframe::new(at(2023, 3, 1), at(2023, 4, 1)).unwrap();
        let next = tf.next_period(TradingPeriod::months(2));
        assert_eq!((next.start, next.end), (at(2023, 4, 1), at(2023, 6, 1)));
        let prev = tf.previous_period(TradingPeriod::days(10));
        assert_eq!((prev.start, prev.end), (at(2023, 2, 19), at(2023, 3, 1)));
    }

    #[test]
    fn split_drops_trailing_remainder() {
        let tf = Timeframe::new(at(2023, 1, 1), at(2023, 1, 11)).unwrap();
        let windows = tf.split(TradingPeriod::days(3)).unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].start, at(2023, 1, 1));
        assert_eq!(windows[2].end, at(2023, 1, 10));
        assert!(tf.split(TradingPeriod::days(0)).is_err());
    }

    #[test]
    fn sample_stays_inside_timeframe() {
        let tf = Timeframe::new(at(2020, 1, 1), at(2023, 1, 1)).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let windows = tf.sample(TradingPeriod::months(9), 50, &mut rng).unwrap();
        assert_eq!(windows.len(), 50);
        for w in windows {
            assert!(w.start >= tf.start);
            assert!(w.end <= tf.end);
            assert_eq!(w.end, TradingPeriod::months(9).add_to(w.start).min(tf.end));
        }
    }

    #[test]
    fn sample_rejects_too_long_period() {
        let tf = Timeframe::new(at(2020, 1, 1), at(2020, 6, 1)).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(tf.sample(TradingPeriod::years(1), 1, &mut rng).is_err());
    }

    #[test]
    fn parse_instant_accepts_dates_and_rfc3339() {
        assert_eq!(parse_instant("2024-03-01").unwrap(), at(2024, 3, 1));
        assert_eq!(
            parse_instant("2024-03-01T12:30:00Z").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
        );
        assert!(parse_instant("yesterday").is_err());
    }
}
