//! Value comparison in two modes.
//!
//! - Key mode orders values for sorting and key alignment. Numbers are
//!   rounded to the configured precision before comparing, whole numbers
//!   compare exactly, nulls sort last. Values of unrelated types order by
//!   type before falling back to display strings.
//! - Value mode decides equality for break detection. Numbers are equal
//!   within `10^-precision`, strings compare trimmed, dates by millisecond.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::converter::round_half_up;
use crate::record::Record;
use crate::value::Value;

pub const DEFAULT_DECIMAL_PRECISION: i32 = 4;

const I64_RANGE: f64 = 9_223_372_036_854_775_808.0;

/// Ordering between values of unrelated types, so mixed key columns still
/// sort consistently: numbers, dates, booleans, strings, then sets.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Integer(_) | Value::Long(_) | Value::Double(_) => 0,
        Value::Date(_) => 1,
        Value::Boolean(_) => 2,
        Value::String(_) => 3,
        Value::Set(_) => 4,
        Value::Null => 5,
    }
}

/// Operand pair classified once for both comparison modes.
enum Operands<'a> {
    BothNull,
    LeftNull,
    RightNull,
    Integers(i64, i64),
    Numbers(f64, f64),
    Strings(&'a str, &'a str),
    Dates(i64, i64),
    Other(&'a Value, &'a Value),
}

fn classify<'a>(a: &'a Value, b: &'a Value) -> Operands<'a> {
    match (a, b) {
        (Value::Null, Value::Null) => Operands::BothNull,
        (Value::Null, _) => Operands::LeftNull,
        (_, Value::Null) => Operands::RightNull,
        (Value::String(x), Value::String(y)) => Operands::Strings(x.trim(), y.trim()),
        (Value::Date(x), Value::Date(y)) => Operands::Dates(
            x.and_utc().timestamp_millis(),
            y.and_utc().timestamp_millis(),
        ),
        _ => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => Operands::Integers(x, y),
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Operands::Numbers(x, y),
                _ => Operands::Other(a, b),
            },
        },
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DataComparator {
    precision: i32,
    /// 10^precision, the key-mode rounding factor.
    scale: f64,
    /// 10^-precision, the value-mode tolerance.
    tolerance: f64,
}

impl Default for DataComparator {
    fn default() -> Self {
        Self::new(DEFAULT_DECIMAL_PRECISION)
    }
}

impl DataComparator {
    pub fn new(decimal_precision: i32) -> Self {
        log::debug!("Initializing data comparator with decimal precision {decimal_precision}");
        Self {
            precision: decimal_precision,
            scale: 10f64.powi(decimal_precision),
            tolerance: 10f64.powi(-decimal_precision),
        }
    }

    pub fn precision(&self) -> i32 {
        self.precision
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Total order used to sort and align records by key.
    pub fn compare_key_values(&self, a: &Value, b: &Value) -> Ordering {
        match classify(a, b) {
            Operands::BothNull => Ordering::Equal,
            Operands::LeftNull => Ordering::Greater,
            Operands::RightNull => Ordering::Less,
            // Whole numbers are unchanged by rounding to p >= 0 digits
            Operands::Integers(x, y) if self.precision >= 0 => x.cmp(&y),
            Operands::Integers(x, y) => self.round(x as f64).total_cmp(&self.round(y as f64)),
            Operands::Numbers(x, y) => self.round(x).total_cmp(&self.round(y)),
            Operands::Strings(x, y) => x.cmp(y),
            Operands::Dates(x, y) => x.cmp(&y),
            Operands::Other(Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
            Operands::Other(x, y) if type_rank(x) != type_rank(y) => {
                type_rank(x).cmp(&type_rank(y))
            }
            Operands::Other(x, y) => {
                log::debug!(
                    "Comparing display strings for value {x} of type {} to value {y} of type {}",
                    x.type_name(),
                    y.type_name()
                );
                x.to_string().cmp(&y.to_string())
            }
        }
    }

    /// Equality with numeric tolerance, used to detect breaks.
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        match classify(a, b) {
            Operands::BothNull => true,
            Operands::LeftNull | Operands::RightNull => false,
            Operands::Integers(x, y) => {
                ((i128::from(x) - i128::from(y)).unsigned_abs() as f64) < self.tolerance
            }
            Operands::Numbers(x, y) => (x - y).abs() < self.tolerance,
            Operands::Strings(x, y) => x == y,
            Operands::Dates(x, y) => x == y,
            Operands::Other(x, y) => {
                if !x.same_type(y) {
                    log::debug!(
                        "Comparing value {x} of type {} to value {y} of different type {}",
                        x.type_name(),
                        y.type_name()
                    );
                    return false;
                }
                x == y
            }
        }
    }

    fn round(&self, n: f64) -> f64 {
        let scaled = n * self.scale;
        // Past 2^63 every double is already integral
        if scaled.abs() >= I64_RANGE {
            scaled
        } else {
            round_half_up(n, self.scale)
        }
    }
}

/// Orders records by their key tuple, field by field, in key mode.
#[derive(Debug, Clone)]
pub struct RecordComparator {
    comparator: DataComparator,
    key_fields: Arc<[String]>,
}

impl RecordComparator {
    pub fn new<I, S>(comparator: DataComparator, key_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            comparator,
            key_fields: key_fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn key_fields(&self) -> &[String] {
        &self.key_fields
    }

    pub fn data_comparator(&self) -> &DataComparator {
        &self.comparator
    }

    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for field in self.key_fields.iter() {
            let ord = self.comparator.compare_key_values(a.get(field), b.get(field));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Compare two group heads; an absent head sorts after any record.
    pub fn compare_heads(&self, a: Option<&Record>, b: Option<&Record>) -> Ordering {
        match (a, b) {
            (Some(a), Some(b)) => self.compare(a, b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}
