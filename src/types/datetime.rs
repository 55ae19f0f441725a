//! BCD-encoded DATE_AND_TIME.

use crate::error::{Result, S7Error};

/// Encoded length of a date-time value.
pub const DATE_TIME_LEN: usize = 8;

/// Calendar date and time as stored in the controller.
///
/// ```text
/// +------+-------+-----+------+--------+--------+----------+----------+
/// | Year | Month | Day | Hour | Minute | Second | ms / 10  | ms % 10  |
/// +------+-------+-----+------+--------+--------+----------+----------+
///   each byte BCD; year 90-99 => 1990-1999, 00-89 => 2000-2089
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct S7DateTime {
    /// Year (1990-2089)
    pub year: u16,
    /// Month (1-12)
    pub month: u8,
    /// Day of month (1-31)
    pub day: u8,
    /// Hour (0-23)
    pub hour: u8,
    /// Minute (0-59)
    pub minute: u8,
    /// Second (0-59)
    pub second: u8,
    /// Milliseconds (0-999)
    pub millisecond: u16,
}

impl S7DateTime {
    /// Create a validated date-time.
    pub fn new(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        millisecond: u16,
    ) -> Result<Self> {
        let dt = Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            millisecond,
        };
        dt.validate()?;
        Ok(dt)
    }

    /// Check every field is within its range.
    pub fn validate(&self) -> Result<()> {
        if !(1990..=2089).contains(&self.year) {
            return Err(S7Error::InvalidDateTime(format!(
                "year {} outside 1990-2089",
                self.year
            )));
        }
        if !(1..=12).contains(&self.month) {
            return Err(S7Error::InvalidDateTime(format!("month {}", self.month)));
        }
        let last_day = days_in_month(self.year, self.month);
        if !(1..=last_day).contains(&self.day) {
            return Err(S7Error::InvalidDateTime(format!(
                "day {} of {}-{:02}",
                self.day, self.year, self.month
            )));
        }
        if self.hour > 23 || self.minute > 59 || self.second > 59 {
            return Err(S7Error::InvalidDateTime(format!(
                "time {:02}:{:02}:{:02}",
                self.hour, self.minute, self.second
            )));
        }
        if self.millisecond > 999 {
            return Err(S7Error::InvalidDateTime(format!(
                "millisecond {}",
                self.millisecond
            )));
        }
        Ok(())
    }

    /// Decode from 8 BCD bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DATE_TIME_LEN {
            return Err(S7Error::OutOfRange {
                offset: 0,
                len: DATE_TIME_LEN,
                available: bytes.len(),
            });
        }

        let yy = from_bcd(bytes[0])? as u16;
        let year = if yy < 90 { 2000 + yy } else { 1900 + yy };
        let millisecond = from_bcd(bytes[6])? as u16 * 10 + from_bcd(bytes[7])? as u16;

        Self::new(
            year,
            from_bcd(bytes[1])?,
            from_bcd(bytes[2])?,
            from_bcd(bytes[3])?,
            from_bcd(bytes[4])?,
            from_bcd(bytes[5])?,
            millisecond,
        )
    }

    /// Encode to 8 BCD bytes.
    pub fn to_bytes(&self) -> Result<[u8; DATE_TIME_LEN]> {
        self.validate()?;
        let yy = (self.year % 100) as u8;
        Ok([
            to_bcd(yy),
            to_bcd(self.month),
            to_bcd(self.day),
            to_bcd(self.hour),
            to_bcd(self.minute),
            to_bcd(self.second),
            to_bcd((self.millisecond / 10) as u8),
            to_bcd((self.millisecond % 10) as u8),
        ])
    }
}

impl std::fmt::Display for S7DateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.millisecond
        )
    }
}

/// Number of days in `month` of `year` (Gregorian).
pub const fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Decode one BCD byte (two decimal digits).
#[inline]
pub fn from_bcd(byte: u8) -> Result<u8> {
    let (hi, lo) = (byte >> 4, byte & 0x0F);
    if hi > 9 || lo > 9 {
        return Err(S7Error::InvalidBcd(byte));
    }
    Ok(hi * 10 + lo)
}

/// Encode a value 0-99 as one BCD byte.
#[inline]
pub const fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}
