//! Derived fields: values computed from another field of the same record.

use std::fmt::Write as _;

use crate::error::{Result, SourceState};
use crate::record::Record;
use crate::source::DataSource;
use crate::value::Value;

/// A field computed from `source` and written under `name`.
///
/// A null source value, or one of a type the derivation does not accept,
/// is copied to `name` unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum DerivedField {
    /// String → upper-case string.
    UpperCase { name: String, source: String },
    /// Date → string rendered with a chrono format pattern.
    DateFormat {
        name: String,
        source: String,
        format: String,
    },
    /// String → the `index`-th trimmed token split on `delimiter`, or null.
    Delimited {
        name: String,
        source: String,
        delimiter: String,
        index: usize,
    },
}

impl DerivedField {
    pub fn upper_case(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self::UpperCase {
            name: name.into(),
            source: source.into(),
        }
    }

    pub fn date_format(
        name: impl Into<String>,
        source: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        Self::DateFormat {
            name: name.into(),
            source: source.into(),
            format: format.into(),
        }
    }

    pub fn delimited(
        name: impl Into<String>,
        source: impl Into<String>,
        delimiter: impl Into<String>,
        index: usize,
    ) -> Self {
        Self::Delimited {
            name: name.into(),
            source: source.into(),
            delimiter: delimiter.into(),
            index,
        }
    }

    /// Target field name.
    pub fn name(&self) -> &str {
        match self {
            Self::UpperCase { name, .. }
            | Self::DateFormat { name, .. }
            | Self::Delimited { name, .. } => name,
        }
    }

    pub fn source_field(&self) -> &str {
        match self {
            Self::UpperCase { source, .. }
            | Self::DateFormat { source, .. }
            | Self::Delimited { source, .. } => source,
        }
    }

    /// Compute the value from `record` without writing it.
    pub fn derive(&self, record: &Record) -> Value {
        let value = record.get(self.source_field());
        match (self, value) {
            (Self::UpperCase { .. }, Value::String(s)) => Value::String(s.to_uppercase()),
            (Self::DateFormat { format, .. }, Value::Date(d)) => {
                let mut out = String::new();
                match write!(out, "{}", d.format(format)) {
                    Ok(()) => Value::String(out),
                    Err(_) => {
                        log::warn!("Invalid date format {format:?} for derived field {}", self.name());
                        value.clone()
                    }
                }
            }
            (
                Self::Delimited {
                    delimiter, index, ..
                },
                Value::String(s),
            ) => s
                .split(delimiter.as_str())
                .nth(*index)
                .map(|token| Value::String(token.trim().to_string()))
                .unwrap_or(Value::Null),
            _ => value.clone(),
        }
    }

    pub fn apply(&self, record: &mut Record) {
        let value = self.derive(record);
        record.set(self.name(), value);
    }
}

// ============================================================================
// Decorator
// ============================================================================

/// Injects derived fields into every record of an inner source.
pub struct DerivedFieldSource<S> {
    inner: S,
    fields: Vec<DerivedField>,
}

impl<S: DataSource> DerivedFieldSource<S> {
    pub fn new(inner: S, fields: Vec<DerivedField>) -> Self {
        Self { inner, fields }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: DataSource> DataSource for DerivedFieldSource<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn short_name(&self) -> &str {
        self.inner.short_name()
    }

    fn state(&self) -> SourceState {
        self.inner.state()
    }

    fn open(&mut self) -> Result<()> {
        self.inner.open()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn has_next(&mut self) -> Result<bool> {
        self.inner.has_next()
    }

    fn next_record(&mut self) -> Result<Record> {
        let mut record = self.inner.next_record()?;
        for field in &self.fields {
            field.apply(&mut record);
        }
        Ok(record)
    }

    fn is_sorted(&self) -> bool {
        self.inner.is_sorted()
    }

    fn set_sorted(&mut self, sorted: bool) -> Result<()> {
        self.inner.set_sorted(sorted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::StringTypeConverter;
    use crate::schema::Schema;
    use crate::source::RecordSource;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn record(pairs: Vec<(&str, Value)>) -> Record {
        Record::from_pairs(Arc::new(Schema::new()), pairs)
    }

    #[test]
    fn upper_case() {
        let mut rec = record(vec![("desc", "Wire In".into()), ("n", 5.into())]);
        DerivedField::upper_case("DESC", "desc").apply(&mut rec);
        assert_eq!(rec.get("DESC"), &Value::from("WIRE IN"));

        // Wrong type passes through under the target name.
        DerivedField::upper_case("N2", "n").apply(&mut rec);
        assert_eq!(rec.get("N2"), &Value::Integer(5));

        DerivedField::upper_case("X", "missing").apply(&mut rec);
        assert_eq!(rec.get("X"), &Value::Null);
    }

    #[test]
    fn date_format() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let mut rec = record(vec![("posted", day.into()), ("text", "2024-01-31".into())]);
        DerivedField::date_format("month", "posted", "%Y-%m").apply(&mut rec);
        assert_eq!(rec.get("month"), &Value::from("2024-01"));

        DerivedField::date_format("t", "text", "%Y").apply(&mut rec);
        assert_eq!(rec.get("t"), &Value::from("2024-01-31"));
    }

    #[test]
    fn delimited_tokens() {
        let mut rec = record(vec![("ref", "ACH | 00123 | batch".into())]);
        DerivedField::delimited("id", "ref", "|", 1).apply(&mut rec);
        assert_eq!(rec.get("id"), &Value::from("00123"));

        DerivedField::delimited("none", "ref", "|", 7).apply(&mut rec);
        assert_eq!(rec.get("none"), &Value::Null);
    }

    #[test]
    fn overwrites_source_of_same_name() {
        let mut rec = record(vec![("code", "abc".into())]);
        DerivedField::upper_case("code", "code").apply(&mut rec);
        assert_eq!(rec.get("code"), &Value::from("ABC"));
        assert_eq!(rec.fields(), vec!["code"]);
    }

    #[test]
    fn registered_fields_see_converted_values() {
        let converter = Arc::new(StringTypeConverter::with_date_formats(["%Y-%m-%d"]));
        let mut src = RecordSource::from_rows("s", vec![vec![("d", "2023-07-04")]])
            .with_converter(converter)
            .with_derived_field(DerivedField::date_format("year", "d", "%Y"));
        src.open().unwrap();
        let rec = src.next_record().unwrap();
        assert_eq!(rec.get("year"), &Value::from("2023"));
    }

    #[test]
    fn decorator_applies_and_forwards_lifecycle() {
        let inner = RecordSource::from_rows("inner src", vec![vec![("k", "a")], vec![("k", "b")]]);
        let mut src = DerivedFieldSource::new(inner, vec![DerivedField::upper_case("K", "k")]);
        assert_eq!(src.short_name(), "inner");

        src.open().unwrap();
        assert_eq!(src.state(), SourceState::Open);
        let first = src.next_record().unwrap();
        assert_eq!(first.get("K"), &Value::from("A"));
        assert!(src.has_next().unwrap());
        src.next_record().unwrap();
        assert!(!src.has_next().unwrap());
        src.close().unwrap();
        assert_eq!(src.state(), SourceState::Closed);
    }
}
