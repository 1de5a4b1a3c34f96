//! Packed date/time
//!
//! Record headers and directories store timestamps as one 32-bit word:
//!
//! ```text
//! ┌────────────┬─────────┬────────┬─────────┬──────────┬──────────┐
//! │ Year-1995  │ Month   │ Day    │ Hour    │ Minute   │ Second   │
//! │ (6 bits)   │ (4)     │ (5)    │ (5)     │ (6)      │ (6)      │
//! └────────────┴─────────┴────────┴─────────┴──────────┴──────────┘
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// First representable year
pub const EPOCH_YEAR: u32 = 1995;

/// A calendar time packed the way record headers store it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Datime(u32);

impl Datime {
    /// Wrap a raw packed word
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw packed word
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Pack calendar components, or `None` if any is out of range
    pub fn new(year: u32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Option<Self> {
        let valid = (EPOCH_YEAR..EPOCH_YEAR + 64).contains(&year)
            && (1..=12).contains(&month)
            && (1..=31).contains(&day)
            && hour < 24
            && minute < 60
            && second < 60;
        if !valid {
            return None;
        }
        Some(Self(
            (year - EPOCH_YEAR) << 26 | month << 22 | day << 17 | hour << 12 | minute << 6 | second,
        ))
    }

    pub fn year(&self) -> u32 {
        (self.0 >> 26) + EPOCH_YEAR
    }

    pub fn month(&self) -> u32 {
        (self.0 << 6) >> 28
    }

    pub fn day(&self) -> u32 {
        (self.0 << 10) >> 27
    }

    pub fn hour(&self) -> u32 {
        (self.0 << 15) >> 27
    }

    pub fn minute(&self) -> u32 {
        (self.0 << 20) >> 26
    }

    pub fn second(&self) -> u32 {
        (self.0 << 26) >> 26
    }

    /// Convert a system time (UTC), clamped to the representable range
    pub fn from_system_time(t: SystemTime) -> Self {
        let secs = match t.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(_) => 0,
        };
        let days = secs.div_euclid(86_400);
        let rem = secs.rem_euclid(86_400) as u32;
        let (year, month, day) = civil_from_days(days);

        if year < i64::from(EPOCH_YEAR) {
            return Self::new(EPOCH_YEAR, 1, 1, 0, 0, 0).unwrap_or_default();
        }
        if year >= i64::from(EPOCH_YEAR + 64) {
            return Self::new(EPOCH_YEAR + 63, 12, 31, 23, 59, 59).unwrap_or_default();
        }
        Self::new(year as u32, month, day, rem / 3600, (rem / 60) % 60, rem % 60)
            .unwrap_or_default()
    }

    /// Current time (UTC)
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }
}

impl fmt::Display for Datime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

/// Days since 1970-01-01 → (year, month, day), proleptic Gregorian
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
