//! Pull-based record sources.
//!
//! Every source follows the same lifecycle: `Unopened -> Open -> Closed`.
//! `open` prefetches the first record, so `has_next` on a plain source never
//! touches the producer. Decorators (`FilterSource`, `DerivedFieldSource`,
//! `AggregateSource`) wrap an inner source and forward lifecycle calls.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::converter::TypeConverter;
use crate::derived::DerivedField;
use crate::error::{ProducerError, ReconError, Result, SourceState};
use crate::record::Record;
use crate::schema::Schema;
use crate::value::Value;

pub trait DataSource {
    /// Full, trimmed name of the source.
    fn name(&self) -> &str;

    /// Short label used in "Only in ..." break types.
    fn short_name(&self) -> &str;

    fn state(&self) -> SourceState;

    fn open(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn has_next(&mut self) -> Result<bool>;

    fn next_record(&mut self) -> Result<Record>;

    /// Whether records already arrive in key order.
    fn is_sorted(&self) -> bool;

    fn set_sorted(&mut self, sorted: bool) -> Result<()>;
}

impl<S: DataSource + ?Sized> DataSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn short_name(&self) -> &str {
        (**self).short_name()
    }
    fn state(&self) -> SourceState {
        (**self).state()
    }
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }
    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
    fn has_next(&mut self) -> Result<bool> {
        (**self).has_next()
    }
    fn next_record(&mut self) -> Result<Record> {
        (**self).next_record()
    }
    fn is_sorted(&self) -> bool {
        (**self).is_sorted()
    }
    fn set_sorted(&mut self, sorted: bool) -> Result<()> {
        (**self).set_sorted(sorted)
    }
}

/// Fail with `InvalidState` unless `state` is `Open`.
pub(crate) fn require_open(name: &str, state: SourceState, operation: &'static str) -> Result<()> {
    if state == SourceState::Open {
        Ok(())
    } else {
        Err(ReconError::InvalidState {
            source_name: name.to_string(),
            operation,
            state,
        })
    }
}

pub(crate) fn require_unopened(name: &str, state: SourceState) -> Result<()> {
    if state == SourceState::Unopened {
        Ok(())
    } else {
        Err(ReconError::InvalidState {
            source_name: name.to_string(),
            operation: "open",
            state,
        })
    }
}

/// First whitespace-delimited word of a trimmed name.
pub(crate) fn default_short_name(name: &str) -> String {
    name.split_whitespace().next().unwrap_or("").to_string()
}

// ============================================================================
// Producer boundary
// ============================================================================

/// The I/O side of a source: yields raw records, usually string valued.
///
/// Producers write into records built from the schema they are handed so
/// every record of one source shares its slot layout.
pub trait RecordProducer {
    fn open(&mut self) -> std::result::Result<(), ProducerError> {
        Ok(())
    }

    fn close(&mut self) -> std::result::Result<(), ProducerError> {
        Ok(())
    }

    /// Next raw record, or `None` when the producer is exhausted.
    fn next_record(
        &mut self,
        schema: &Arc<Schema>,
    ) -> std::result::Result<Option<Record>, ProducerError>;
}

/// Producer over rows held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryProducer {
    rows: VecDeque<Vec<(String, Value)>>,
}

impl MemoryProducer {
    pub fn new<I, R, K, V>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
            .collect();
        Self { rows }
    }

    pub fn push_row<R, K, V>(&mut self, row: R)
    where
        R: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.rows
            .push_back(row.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RecordProducer for MemoryProducer {
    fn next_record(
        &mut self,
        schema: &Arc<Schema>,
    ) -> std::result::Result<Option<Record>, ProducerError> {
        Ok(self
            .rows
            .pop_front()
            .map(|row| Record::from_pairs(Arc::clone(schema), row)))
    }
}

// ============================================================================
// RecordSource: producer + conversion + derived fields
// ============================================================================

pub struct RecordSource<P> {
    name: String,
    short_name: String,
    producer: P,
    schema: Arc<Schema>,
    converter: Option<Arc<dyn TypeConverter>>,
    derived: Vec<DerivedField>,
    state: SourceState,
    sorted: bool,
    buffered: Option<Record>,
    /// Records fetched from the producer so far.
    fetched: usize,
}

impl<P: RecordProducer> RecordSource<P> {
    pub fn new(name: impl Into<String>, producer: P) -> Self {
        let name = name.into().trim().to_string();
        let short_name = default_short_name(&name);
        Self {
            name,
            short_name,
            producer,
            schema: Arc::new(Schema::new()),
            converter: None,
            derived: Vec::new(),
            state: SourceState::Unopened,
            sorted: false,
            buffered: None,
            fetched: 0,
        }
    }

    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = short_name.into();
        self
    }

    /// Share a pre-built schema, e.g. one carrying display renames.
    pub fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn TypeConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn with_derived_field(mut self, field: DerivedField) -> Self {
        self.derived.push(field);
        self
    }

    /// Declare that the producer yields records in key order.
    pub fn sorted(mut self, sorted: bool) -> Self {
        self.sorted = sorted;
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn prefetch(&mut self) -> Result<()> {
        match self.producer.next_record(&self.schema) {
            Ok(Some(record)) => {
                self.fetched += 1;
                self.buffered = Some(record);
                Ok(())
            }
            Ok(None) => {
                self.buffered = None;
                Ok(())
            }
            Err(cause) => Err(ReconError::Fetch {
                source_name: self.name.clone(),
                ordinal: self.fetched,
                cause,
            }),
        }
    }
}

impl RecordSource<MemoryProducer> {
    /// Source over in-memory `(field, value)` rows.
    pub fn from_rows<I, R, K, V>(name: impl Into<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::new(name, MemoryProducer::new(rows))
    }
}

impl<P: RecordProducer> DataSource for RecordSource<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn short_name(&self) -> &str {
        &self.short_name
    }

    fn state(&self) -> SourceState {
        self.state
    }

    fn open(&mut self) -> Result<()> {
        require_unopened(&self.name, self.state)?;
        log::info!("Opening data source {}", self.name);
        self.producer.open().map_err(|cause| ReconError::Open {
            source_name: self.name.clone(),
            cause,
        })?;
        self.state = SourceState::Open;
        self.prefetch()
    }

    fn close(&mut self) -> Result<()> {
        require_open(&self.name, self.state, "close")?;
        log::info!("Closing data source {}", self.name);
        self.state = SourceState::Closed;
        self.buffered = None;
        self.producer.close().map_err(|cause| ReconError::Close {
            source_name: self.name.clone(),
            cause,
        })
    }

    fn has_next(&mut self) -> Result<bool> {
        require_open(&self.name, self.state, "has_next")?;
        Ok(self.buffered.is_some())
    }

    fn next_record(&mut self) -> Result<Record> {
        require_open(&self.name, self.state, "next")?;
        let mut record = self.buffered.take().ok_or_else(|| ReconError::Exhausted {
            source_name: self.name.clone(),
        })?;

        if let Some(converter) = &self.converter {
            record.map_values(|v| converter.convert(v));
        }
        for field in &self.derived {
            field.apply(&mut record);
        }

        self.prefetch()?;
        Ok(record)
    }

    fn is_sorted(&self) -> bool {
        self.sorted
    }

    fn set_sorted(&mut self, sorted: bool) -> Result<()> {
        self.sorted = sorted;
        Ok(())
    }
}

// ============================================================================
// Iterator adapter
// ============================================================================

/// One step of draining a source: `None` once it has no more records.
pub(crate) fn pull<S: DataSource + ?Sized>(source: &mut S) -> Option<Result<Record>> {
    match source.has_next() {
        Ok(false) => None,
        Ok(true) => Some(source.next_record()),
        Err(e) => Some(Err(e)),
    }
}

/// Drains an open source as an iterator. Stops after the first error.
pub struct Records<'a> {
    source: &'a mut dyn DataSource,
    failed: bool,
}

impl<'a> Records<'a> {
    pub fn new(source: &'a mut dyn DataSource) -> Self {
        Self {
            source,
            failed: false,
        }
    }
}

impl Iterator for Records<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = pull(self.source)?;
        self.failed = item.is_err();
        Some(item)
    }
}
