//! Typed column values ("Field"/"WrapperField" in the original terminology).
//!
//! A [`Field`] is the parsed, comparable, hashable representation of one
//! column value of a declared [`DataType`]. It is what condition operands
//! (`col OP value` entries parsed out of a tablet header) get turned into
//! before they can be compared against row data or column statistics.

use crate::error::StorageError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A column's declared primitive type, including width/precision/scale for
/// the types that need it to parse and validate values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    Decimal { precision: u8, scale: u8 },
    Date,
    Datetime,
    Char(usize),
    Varchar(usize),
}

impl DataType {
    pub fn is_floating_point(&self) -> bool {
        false // no float/double variant exists; kept as an explicit predicate
              // because §4.C's append_condition rejection rule names it.
    }
}

/// A fixed-point decimal value: `unscaled / 10^scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Decimal {
    pub unscaled: i128,
    pub scale: u8,
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.unscaled);
        }
        let negative = self.unscaled < 0;
        let magnitude = self.unscaled.unsigned_abs();
        let divisor = 10u128.pow(self.scale as u32);
        let int_part = magnitude / divisor;
        let frac_part = magnitude % divisor;
        if negative {
            write!(f, "-")?;
        }
        write!(f, "{}.{:0width$}", int_part, frac_part, width = self.scale as usize)
    }
}

/// A parsed, typed column value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Field {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Int128(i128),
    Decimal(Decimal),
    Date(NaiveDate),
    Datetime(NaiveDateTime),
    Char(String),
    Varchar(String),
}

impl Field {
    /// Parse a textual operand against `data_type`'s rules.
    pub fn from_string(s: &str, data_type: &DataType) -> Result<Field, StorageError> {
        match *data_type {
            DataType::Int8 => parse_int(s).map(Field::Int8),
            DataType::Int16 => parse_int(s).map(Field::Int16),
            DataType::Int32 => parse_int(s).map(Field::Int32),
            DataType::Int64 => parse_int(s).map(Field::Int64),
            DataType::Int128 => parse_int(s).map(Field::Int128),
            DataType::Decimal { precision, scale } => {
                parse_decimal(s, precision, scale).map(Field::Decimal)
            }
            DataType::Date => parse_date(s).map(Field::Date),
            DataType::Datetime => parse_datetime(s).map(Field::Datetime),
            DataType::Char(len) => parse_string(s, len).map(Field::Char),
            DataType::Varchar(len) => parse_string(s, len).map(Field::Varchar),
        }
    }

    pub fn to_string_value(&self) -> String {
        match self {
            Field::Int8(v) => v.to_string(),
            Field::Int16(v) => v.to_string(),
            Field::Int32(v) => v.to_string(),
            Field::Int64(v) => v.to_string(),
            Field::Int128(v) => v.to_string(),
            Field::Decimal(d) => d.to_string(),
            Field::Date(d) => d.format("%Y-%m-%d").to_string(),
            Field::Datetime(d) => d.format("%Y-%m-%d %H:%M:%S").to_string(),
            Field::Char(s) | Field::Varchar(s) => s.clone(),
        }
    }

    pub fn cmp_field(&self, other: &Field) -> Option<Ordering> {
        match (self, other) {
            (Field::Int8(a), Field::Int8(b)) => Some(a.cmp(b)),
            (Field::Int16(a), Field::Int16(b)) => Some(a.cmp(b)),
            (Field::Int32(a), Field::Int32(b)) => Some(a.cmp(b)),
            (Field::Int64(a), Field::Int64(b)) => Some(a.cmp(b)),
            (Field::Int128(a), Field::Int128(b)) => Some(a.cmp(b)),
            (Field::Decimal(a), Field::Decimal(b)) => Some(compare_decimals(a, b)),
            (Field::Date(a), Field::Date(b)) => Some(a.cmp(b)),
            (Field::Datetime(a), Field::Datetime(b)) => Some(a.cmp(b)),
            (Field::Char(a), Field::Char(b)) => Some(a.cmp(b)),
            (Field::Varchar(a), Field::Varchar(b)) => Some(a.cmp(b)),
            (Field::Char(a), Field::Varchar(b)) | (Field::Varchar(a), Field::Char(b)) => {
                Some(a.cmp(b))
            }
            _ => None,
        }
    }

    pub fn hash_code(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        match self {
            Field::Int8(v) => v.hash(&mut hasher),
            Field::Int16(v) => v.hash(&mut hasher),
            Field::Int32(v) => v.hash(&mut hasher),
            Field::Int64(v) => v.hash(&mut hasher),
            Field::Int128(v) => v.hash(&mut hasher),
            Field::Decimal(d) => d.hash(&mut hasher),
            Field::Date(d) => d.hash(&mut hasher),
            Field::Datetime(d) => d.hash(&mut hasher),
            Field::Char(s) | Field::Varchar(s) => s.hash(&mut hasher),
        }
        hasher.finish()
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_field(other) == Some(Ordering::Equal)
    }
}

fn compare_decimals(a: &Decimal, b: &Decimal) -> Ordering {
    // rescale to the larger scale before comparing unscaled magnitudes
    if a.scale == b.scale {
        return a.unscaled.cmp(&b.unscaled);
    }
    let (lo, hi) = if a.scale < b.scale { (a, b) } else { (b, a) };
    let factor = 10i128.pow((hi.scale - lo.scale) as u32);
    let rescaled_lo = lo.unscaled * factor;
    let ord = rescaled_lo.cmp(&hi.unscaled);
    if a.scale < b.scale {
        ord
    } else {
        ord.reverse()
    }
}

fn parse_int<T>(s: &str) -> Result<T, StorageError>
where
    T: std::str::FromStr,
{
    s.trim()
        .parse::<T>()
        .map_err(|_| StorageError::InvalidCondition(format!("'{}' is out of range or not an integer", s)))
}

fn parse_decimal(s: &str, precision: u8, scale: u8) -> Result<Decimal, StorageError> {
    let s = s.trim();
    let invalid = || StorageError::InvalidCondition(format!("'{}' is not a valid decimal", s));

    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if rest.is_empty() {
        return Err(invalid());
    }

    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => {
            if f.is_empty() {
                return Err(invalid()); // trailing bare '.'
            }
            (i, f)
        }
        None => (rest, ""),
    };

    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }

    let max_int_digits = (precision as usize).saturating_sub(scale as usize);
    let normalized_int = int_part.trim_start_matches('0');
    if normalized_int.len() > max_int_digits {
        return Err(StorageError::InvalidCondition(format!(
            "'{}' has too many integer digits for decimal({precision},{scale})",
            s
        )));
    }
    if frac_part.len() > scale as usize {
        return Err(StorageError::InvalidCondition(format!(
            "'{}' has too many fractional digits for decimal({precision},{scale})",
            s
        )));
    }

    let padded_frac = format!("{:0<width$}", frac_part, width = scale as usize);
    let digits = format!("{}{}", if int_part.is_empty() { "0" } else { int_part }, padded_frac);
    let magnitude: i128 = digits.parse().map_err(|_| invalid())?;
    let unscaled = if negative { -magnitude } else { magnitude };

    Ok(Decimal { unscaled, scale })
}

fn parse_date(s: &str) -> Result<NaiveDate, StorageError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| StorageError::InvalidCondition(format!("'{}' is not a valid date", s)))
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime, StorageError> {
    NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
        .map_err(|_| StorageError::InvalidCondition(format!("'{}' is not a valid datetime", s)))
}

fn parse_string(s: &str, max_len: usize) -> Result<String, StorageError> {
    if s.len() > max_len {
        return Err(StorageError::InvalidCondition(format!(
            "'{}' exceeds declared length {}",
            s, max_len
        )));
    }
    Ok(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_overflow_both_sides() {
        assert!(Field::from_string("1000", &DataType::Int8).is_err());
        assert!(Field::from_string("-1000", &DataType::Int8).is_err());
        assert!(Field::from_string("127", &DataType::Int8).is_ok());
    }

    #[test]
    fn decimal_digit_limits() {
        let dt = DataType::Decimal { precision: 6, scale: 3 };
        assert!(Field::from_string("123.456", &dt).is_ok());
        assert!(Field::from_string("1234.56", &dt).is_err()); // too many int digits
        assert!(Field::from_string("1.2345", &dt).is_err()); // too many frac digits
        assert!(Field::from_string("1.", &dt).is_err()); // bare trailing dot
        assert!(Field::from_string("123.5", &dt).is_ok());
    }

    #[test]
    fn decimal_round_trip_and_compare() {
        let dt = DataType::Decimal { precision: 6, scale: 3 };
        let a = Field::from_string("-1.500", &dt).unwrap();
        assert_eq!(a.to_string_value(), "-1.500");
        let b = Field::from_string("1.5", &dt).unwrap();
        assert_eq!(a.cmp_field(&b), Some(Ordering::Less));
    }

    #[test]
    fn date_calendar_validation() {
        assert!(Field::from_string("2013-06-01", &DataType::Date).is_ok());
        assert!(Field::from_string("2013-64-01", &DataType::Date).is_err());
        assert!(Field::from_string("2013-02-30", &DataType::Date).is_err());
    }

    #[test]
    fn datetime_range_validation() {
        assert!(Field::from_string("2013-06-01 23:59:59", &DataType::Datetime).is_ok());
        assert!(Field::from_string("2013-06-01 24:00:00", &DataType::Datetime).is_err());
    }

    #[test]
    fn varchar_length_limit() {
        assert!(Field::from_string("hello", &DataType::Varchar(5)).is_ok());
        assert!(Field::from_string("hello!", &DataType::Varchar(5)).is_err());
    }
}
