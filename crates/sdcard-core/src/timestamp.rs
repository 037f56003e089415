//! Timestamp bridge between the instrument clock and the medium's packed
//! FAT date/time fields.
//!
//! The medium stores last-write times as two 16-bit words in UTC:
//!
//! ```text
//! date: yyyyyyym mmmddddd   (year - 1980, month 1-12, day 1-31)
//! time: hhhhhmmm mmmsssss   (hour, minute, second / 2)
//! ```
//!
//! Reported times are converted to local time using the configured zone
//! offset and daylight-saving rule.

use std::fmt;
use std::sync::Arc;

use chrono::{
    DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc, Weekday,
};
use serde::{Deserialize, Serialize};

/// First year representable in a packed date.
pub const FAT_EPOCH_YEAR: u16 = 1980;

/// Broken-down calendar time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Timestamp {
    pub fn from_naive(dt: &NaiveDateTime) -> Self {
        Self {
            year: dt.year().clamp(0, u16::MAX as i32) as u16,
            month: dt.month() as u8,
            day: dt.day() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
        }
    }

    /// `None` if the fields do not name a real calendar instant.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)?
            .and_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)
    }

    /// Decompose UTC seconds since the Unix epoch.
    pub fn from_unix(seconds: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp(seconds, 0).map(|dt| Self::from_naive(&dt.naive_utc()))
    }

    /// Interpret the fields as UTC and return seconds since the Unix epoch.
    pub fn to_unix(&self) -> Option<i64> {
        self.to_naive().map(|dt| dt.and_utc().timestamp())
    }

    pub fn date(&self) -> FileDate {
        FileDate {
            year: self.year,
            month: self.month,
            day: self.day,
        }
    }

    pub fn time(&self) -> FileTime {
        FileTime {
            hour: self.hour,
            minute: self.minute,
            second: self.second,
        }
    }
}

/// Date half of a last-write timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl fmt::Display for FileDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Time half of a last-write timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl fmt::Display for FileTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// Native 16-bit date + 16-bit time encoding of a directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackedDateTime {
    pub date: u16,
    pub time: u16,
}

impl PackedDateTime {
    /// Years before 1980 saturate to 1980; odd seconds round down.
    pub fn pack(ts: &Timestamp) -> Self {
        let year = ts.year.saturating_sub(FAT_EPOCH_YEAR).min(0x7f);
        let date = (year << 9) | ((ts.month as u16 & 0x0f) << 5) | (ts.day as u16 & 0x1f);
        let time = ((ts.hour as u16 & 0x1f) << 11)
            | ((ts.minute as u16 & 0x3f) << 5)
            | ((ts.second as u16 / 2) & 0x1f);
        Self { date, time }
    }

    pub fn unpack(&self) -> Timestamp {
        Timestamp {
            year: FAT_EPOCH_YEAR + (self.date >> 9),
            month: ((self.date >> 5) & 0x0f) as u8,
            day: (self.date & 0x1f) as u8,
            hour: (self.time >> 11) as u8,
            minute: ((self.time >> 5) & 0x3f) as u8,
            second: ((self.time & 0x1f) * 2) as u8,
        }
    }
}

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall clock of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Daylight-saving rule applied on top of the zone offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DstRule {
    #[default]
    Off,
    Europe,
    Usa,
    Australia,
}

impl DstRule {
    /// Whether daylight saving is in effect at the given local standard time.
    pub fn is_dst(&self, standard: &NaiveDateTime) -> bool {
        let year = standard.year();
        let window = match self {
            DstRule::Off => return false,
            DstRule::Europe => (
                last_sunday(year, 3).and_then(|d| d.and_hms_opt(2, 0, 0)),
                last_sunday(year, 10).and_then(|d| d.and_hms_opt(2, 0, 0)),
            ),
            DstRule::Usa => (
                nth_sunday(year, 3, 2).and_then(|d| d.and_hms_opt(2, 0, 0)),
                nth_sunday(year, 11, 1).and_then(|d| d.and_hms_opt(1, 0, 0)),
            ),
            DstRule::Australia => {
                // Southern hemisphere: standard time runs April..October.
                let end = nth_sunday(year, 4, 1).and_then(|d| d.and_hms_opt(2, 0, 0));
                let start = nth_sunday(year, 10, 1).and_then(|d| d.and_hms_opt(2, 0, 0));
                return match (end, start) {
                    (Some(end), Some(start)) => !(*standard >= end && *standard < start),
                    _ => false,
                };
            }
        };
        match window {
            (Some(start), Some(end)) => *standard >= start && *standard < end,
            _ => false,
        }
    }
}

fn nth_sunday(year: i32, month: u32, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, Weekday::Sun, n)
}

fn last_sunday(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let last = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
    Some(last - TimeDelta::days(last.weekday().num_days_from_sunday() as i64))
}

/// Zone settings used to localize reported timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ZoneConfig {
    /// Offset from UTC written as signed `hhmm` (130 = +01:30, -500 = -05:00).
    #[serde(default)]
    pub time_zone: i16,
    #[serde(default)]
    pub dst_rule: DstRule,
}

impl ZoneConfig {
    pub fn offset_seconds(&self) -> i64 {
        let tz = self.time_zone as i64;
        ((tz / 100) * 60 + tz % 100) * 60
    }

    pub fn utc_to_local(&self, utc: NaiveDateTime) -> NaiveDateTime {
        let standard = utc + TimeDelta::seconds(self.offset_seconds());
        if self.dst_rule.is_dst(&standard) {
            standard + TimeDelta::hours(1)
        } else {
            standard
        }
    }
}

/// Converts between the instrument clock and packed directory timestamps.
#[derive(Clone)]
pub struct TimestampBridge {
    clock: Arc<dyn Clock>,
    zone: ZoneConfig,
}

impl TimestampBridge {
    pub fn new(clock: Arc<dyn Clock>, zone: ZoneConfig) -> Self {
        Self { clock, zone }
    }

    pub fn zone(&self) -> ZoneConfig {
        self.zone
    }

    /// Current UTC time in the medium's native encoding.
    pub fn now_packed(&self) -> PackedDateTime {
        let now = self.clock.now_utc().naive_utc();
        PackedDateTime::pack(&Timestamp::from_naive(&now))
    }

    /// Localize a packed UTC record.
    ///
    /// Records that do not decode to a real date (zeroed fields on freshly
    /// formatted media) are returned as stored, without zone adjustment.
    pub fn entry_to_local(&self, packed: PackedDateTime) -> Timestamp {
        let utc = packed.unpack();
        match utc.to_naive() {
            Some(naive) => Timestamp::from_naive(&self.zone.utc_to_local(naive)),
            None => utc,
        }
    }
}

impl fmt::Debug for TimestampBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimestampBridge")
            .field("zone", &self.zone)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Timestamp {
        Timestamp {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn test_pack_unpack_even_seconds() {
        let cases = [
            ts(1980, 1, 1, 0, 0, 0),
            ts(2017, 6, 30, 23, 59, 58),
            ts(2024, 2, 29, 12, 34, 56),
            ts(2107, 12, 31, 1, 2, 4),
        ];
        for case in cases {
            assert_eq!(PackedDateTime::pack(&case).unpack(), case);
        }
    }

    #[test]
    fn test_odd_seconds_round_down() {
        let packed = PackedDateTime::pack(&ts(2020, 5, 17, 8, 15, 37));
        assert_eq!(packed.unpack().second, 36);
    }

    #[test]
    fn test_pack_bit_layout() {
        let packed = PackedDateTime::pack(&ts(2000, 3, 4, 5, 6, 8));
        assert_eq!(packed.date, (20 << 9) | (3 << 5) | 4);
        assert_eq!(packed.time, (5 << 11) | (6 << 5) | 4);
    }

    #[test]
    fn test_years_before_epoch_saturate() {
        let packed = PackedDateTime::pack(&ts(1970, 1, 1, 0, 0, 0));
        assert_eq!(packed.unpack().year, 1980);
    }

    #[test]
    fn test_unix_round_trip() {
        let t = ts(2021, 11, 7, 6, 30, 15);
        let secs = t.to_unix().unwrap();
        assert_eq!(Timestamp::from_unix(secs), Some(t));
    }

    #[test]
    fn test_zone_offset_parsing() {
        let plus = ZoneConfig {
            time_zone: 130,
            dst_rule: DstRule::Off,
        };
        assert_eq!(plus.offset_seconds(), 5400);
        let minus = ZoneConfig {
            time_zone: -530,
            dst_rule: DstRule::Off,
        };
        assert_eq!(minus.offset_seconds(), -19800);
    }

    #[test]
    fn test_europe_dst_window() {
        // 2023: last Sunday of March is the 26th, of October the 29th.
        assert!(!DstRule::Europe.is_dst(&naive(2023, 3, 26, 1, 59)));
        assert!(DstRule::Europe.is_dst(&naive(2023, 3, 26, 2, 0)));
        assert!(DstRule::Europe.is_dst(&naive(2023, 7, 1, 12, 0)));
        assert!(!DstRule::Europe.is_dst(&naive(2023, 10, 29, 2, 0)));
        assert!(!DstRule::Europe.is_dst(&naive(2023, 12, 1, 12, 0)));
    }

    #[test]
    fn test_usa_dst_window() {
        // 2023: second Sunday of March is the 12th, first of November the 5th.
        assert!(!DstRule::Usa.is_dst(&naive(2023, 3, 12, 1, 0)));
        assert!(DstRule::Usa.is_dst(&naive(2023, 3, 12, 2, 0)));
        assert!(DstRule::Usa.is_dst(&naive(2023, 11, 5, 0, 59)));
        assert!(!DstRule::Usa.is_dst(&naive(2023, 11, 5, 1, 0)));
    }

    #[test]
    fn test_australia_dst_wraps_year() {
        assert!(DstRule::Australia.is_dst(&naive(2023, 1, 15, 12, 0)));
        assert!(!DstRule::Australia.is_dst(&naive(2023, 6, 15, 12, 0)));
        assert!(DstRule::Australia.is_dst(&naive(2023, 12, 15, 12, 0)));
    }

    #[test]
    fn test_now_packed_uses_clock() {
        let clock = FixedClock(Utc.with_ymd_and_hms(2019, 4, 2, 10, 20, 31).unwrap());
        let bridge = TimestampBridge::new(Arc::new(clock), ZoneConfig::default());
        assert_eq!(bridge.now_packed().unpack(), ts(2019, 4, 2, 10, 20, 30));
    }

    #[test]
    fn test_entry_to_local_applies_zone_and_dst() {
        let zone = ZoneConfig {
            time_zone: 100,
            dst_rule: DstRule::Europe,
        };
        let bridge = TimestampBridge::new(Arc::new(SystemClock), zone);
        let packed = PackedDateTime::pack(&ts(2023, 7, 1, 22, 30, 0));
        assert_eq!(bridge.entry_to_local(packed), ts(2023, 7, 2, 0, 30, 0));
    }

    #[test]
    fn test_entry_to_local_keeps_invalid_records() {
        let bridge = TimestampBridge::new(Arc::new(SystemClock), ZoneConfig::default());
        let raw = PackedDateTime { date: 0, time: 0 };
        assert_eq!(bridge.entry_to_local(raw), raw.unpack());
    }
}
