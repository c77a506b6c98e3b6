//! Type inference for loosely typed input.
//!
//! `StringTypeConverter` turns trimmed strings into the narrowest semantic
//! type that parses: null, boolean, integer, long, double, date, and finally
//! the trimmed string itself. Non-string values pass through unchanged, so
//! converting twice is the same as converting once.

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::value::Value;

static INTEGER_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[0-9]+$").unwrap());
static DOUBLE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-+]?[0-9]*\.?[0-9]*$").unwrap());

/// String length (sign included) below which an integer string fits in i32.
const INTEGER_LENGTH: usize = 10;
/// String length (sign included) below which an integer string fits in i64.
const LONG_LENGTH: usize = 19;

pub trait TypeConverter {
    fn convert(&self, value: Value) -> Value;
}

/// Round half-up to `precision` fractional digits.
pub(crate) fn round_half_up(value: f64, factor: f64) -> f64 {
    (value * factor + 0.5).floor()
}

#[derive(Debug, Clone)]
pub struct StringTypeConverter {
    /// Fractional digits kept on doubles; negative disables rounding.
    precision: i32,
    date_formats: Vec<String>,
}

impl Default for StringTypeConverter {
    fn default() -> Self {
        Self::new(-1, Vec::<String>::new())
    }
}

impl StringTypeConverter {
    pub fn new<I, S>(precision: i32, date_formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let date_formats: Vec<String> = date_formats.into_iter().map(Into::into).collect();
        log::debug!(
            "Initializing string converter with precision {precision} and {} date format(s)",
            date_formats.len()
        );
        Self {
            precision,
            date_formats,
        }
    }

    /// Converter with date formats only and no rounding.
    pub fn with_date_formats<I, S>(date_formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(-1, date_formats)
    }

    pub fn precision(&self) -> i32 {
        self.precision
    }

    pub fn date_formats(&self) -> &[String] {
        &self.date_formats
    }

    fn convert_str(&self, raw: &str) -> Value {
        let s = raw.trim();

        if s.is_empty() {
            return Value::Null;
        }

        if s.eq_ignore_ascii_case("true") {
            return Value::Boolean(true);
        }
        if s.eq_ignore_ascii_case("false") {
            return Value::Boolean(false);
        }

        if INTEGER_PATTERN.is_match(s) {
            if s.len() < INTEGER_LENGTH {
                if let Ok(n) = s.parse::<i32>() {
                    return Value::Integer(n);
                }
            } else if s.len() < LONG_LENGTH {
                if let Ok(n) = s.parse::<i64>() {
                    return Value::Long(n);
                }
            }
        }

        if DOUBLE_PATTERN.is_match(s) {
            if let Ok(n) = s.parse::<f64>() {
                return Value::Double(self.apply_precision(n));
            }
        }

        if let Some(date) = self.parse_date(s) {
            return Value::Date(date);
        }

        Value::String(s.to_string())
    }

    fn apply_precision(&self, n: f64) -> f64 {
        // Beyond the i64 range every double is integral already.
        if self.precision < 0 || !(n > i64::MIN as f64 && n < i64::MAX as f64) {
            return n;
        }
        let factor = 10f64.powi(self.precision);
        round_half_up(n, factor) / factor
    }

    fn parse_date(&self, s: &str) -> Option<NaiveDateTime> {
        self.date_formats.iter().find_map(|format| {
            NaiveDateTime::parse_from_str(s, format).ok().or_else(|| {
                NaiveDate::parse_from_str(s, format)
                    .ok()
                    .map(|d| d.and_time(chrono::NaiveTime::MIN))
            })
        })
    }
}

impl TypeConverter for StringTypeConverter {
    fn convert(&self, value: Value) -> Value {
        match value {
            Value::String(s) => self.convert_str(&s),
            other => other,
        }
    }
}

/// Wraps a closure as a converter.
pub struct FnConverter<F>(pub F);

impl<F> TypeConverter for FnConverter<F>
where
    F: Fn(Value) -> Value,
{
    fn convert(&self, value: Value) -> Value {
        (self.0)(value)
    }
}
