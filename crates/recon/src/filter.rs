//! Record filtering decorator.

use std::collections::HashSet;

use crate::error::{ReconError, Result, SourceState};
use crate::record::Record;
use crate::source::DataSource;

/// Predicate over records. Closures `FnMut(&Record) -> bool` qualify.
pub trait RecordFilter {
    fn accept(&mut self, record: &Record) -> bool;
}

impl<F> RecordFilter for F
where
    F: FnMut(&Record) -> bool,
{
    fn accept(&mut self, record: &Record) -> bool {
        self(record)
    }
}

/// Accepts records whose `field` displays as one of `values`.
#[derive(Debug, Clone)]
pub struct RowFilter {
    field: String,
    values: HashSet<String>,
}

impl RowFilter {
    pub fn new<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.values.contains(&record.get(&self.field).to_string())
    }
}

impl RecordFilter for RowFilter {
    fn accept(&mut self, record: &Record) -> bool {
        self.matches(record)
    }
}

/// Exposes only the inner records a filter accepts.
///
/// The filter runs at most once per inner record: a record that passes is
/// buffered until `next_record` hands it out.
pub struct FilterSource<S, F> {
    inner: S,
    filter: F,
    buffered: Option<Record>,
}

impl<S: DataSource, F: RecordFilter> FilterSource<S, F> {
    pub fn new(inner: S, filter: F) -> Self {
        Self {
            inner,
            filter,
            buffered: None,
        }
    }
}

impl<S: DataSource, F: RecordFilter> DataSource for FilterSource<S, F> {
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
        self.buffered = None;
        self.inner.close()
    }

    fn has_next(&mut self) -> Result<bool> {
        if self.buffered.is_some() {
            return Ok(true);
        }
        while self.inner.has_next()? {
            let record = self.inner.next_record()?;
            if self.filter.accept(&record) {
                self.buffered = Some(record);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn next_record(&mut self) -> Result<Record> {
        if !self.has_next()? {
            return Err(ReconError::Exhausted {
                source_name: self.inner.name().to_string(),
            });
        }
        self.buffered.take().ok_or_else(|| ReconError::Exhausted {
            source_name: self.inner.name().to_string(),
        })
    }

    fn is_sorted(&self) -> bool {
        self.inner.is_sorted()
    }

    fn set_sorted(&mut self, sorted: bool) -> Result<()> {
        self.inner.set_sorted(sorted)
    }
}
