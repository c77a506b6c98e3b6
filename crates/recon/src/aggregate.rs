//! Per-group aggregation.
//!
//! `AggregateSource` sorts its inner source by key (unless it is already
//! sorted), groups key-equal records, and emits one record per group: the
//! key fields of the first member plus one value per `AggregateField`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;
use std::sync::Arc;

use crate::comparator::RecordComparator;
use crate::error::{ReconError, Result, SourceState};
use crate::record::Record;
use crate::schema::Schema;
use crate::sort::{MemorySort, RecordStream, Sort, SortedGroups};
use crate::source::{default_short_name, pull, require_open, require_unopened, DataSource};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Sum,
    Min,
    Max,
    /// Distinct values, nulls included, in first-seen order.
    Group,
}

impl AggregateKind {
    fn required_type(self) -> &'static str {
        match self {
            Self::Sum | Self::Min | Self::Max => "Number",
            Self::Group => "Any",
        }
    }
}

/// Fold of `base_field` over a group, written under `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateField {
    pub name: String,
    pub base_field: String,
    pub kind: AggregateKind,
}

impl AggregateField {
    pub fn named(name: impl Into<String>, base_field: impl Into<String>, kind: AggregateKind) -> Self {
        Self {
            name: name.into(),
            base_field: base_field.into(),
            kind,
        }
    }

    /// Sum of `base_field`, written back under the same name.
    pub fn sum(base_field: impl Into<String>) -> Self {
        let base = base_field.into();
        Self::named(base.clone(), base, AggregateKind::Sum)
    }

    pub fn min(base_field: impl Into<String>) -> Self {
        let base = base_field.into();
        Self::named(base.clone(), base, AggregateKind::Min)
    }

    pub fn max(base_field: impl Into<String>) -> Self {
        let base = base_field.into();
        Self::named(base.clone(), base, AggregateKind::Max)
    }

    pub fn group(base_field: impl Into<String>) -> Self {
        let base = base_field.into();
        Self::named(base.clone(), base, AggregateKind::Group)
    }

    pub fn initial(&self) -> Value {
        match self.kind {
            AggregateKind::Sum => Value::Double(0.0),
            AggregateKind::Min | AggregateKind::Max => Value::Null,
            AggregateKind::Group => Value::Set(Vec::new()),
        }
    }

    /// Whether a value takes part in the fold. Nulls only count for `Group`.
    fn accepts(&self, value: &Value) -> bool {
        match self.kind {
            AggregateKind::Sum | AggregateKind::Min | AggregateKind::Max => value.is_number(),
            AggregateKind::Group => true,
        }
    }

    /// Fold one accepted value into the accumulator.
    pub fn combine(&self, acc: Value, value: &Value) -> Value {
        match self.kind {
            AggregateKind::Group => {
                let mut seen = match acc {
                    Value::Set(values) => values,
                    Value::Null => Vec::new(),
                    other => vec![other],
                };
                if !seen.contains(value) {
                    seen.push(value.clone());
                }
                Value::Set(seen)
            }
            kind => {
                let Some(n) = value.as_f64() else {
                    return acc;
                };
                match (kind, acc.as_f64()) {
                    (AggregateKind::Sum, Some(total)) => Value::Double(total + n),
                    (AggregateKind::Min, Some(cur)) => Value::Double(cur.min(n)),
                    (AggregateKind::Max, Some(cur)) => Value::Double(cur.max(n)),
                    _ => Value::Double(n),
                }
            }
        }
    }

    /// Fold the group. Values of the wrong type are skipped with a warning.
    pub fn reduce(&self, group: &[Record]) -> Value {
        group.iter().fold(self.initial(), |acc, record| {
            let value = record.get(&self.base_field);
            if self.accepts(value) {
                self.combine(acc, value)
            } else {
                if !value.is_null() {
                    log::warn!(
                        "Value {value} skipped - is not of required type {} for record {record:?}",
                        self.kind.required_type()
                    );
                }
                acc
            }
        })
    }
}

// ============================================================================
// AggregateSource
// ============================================================================

type KeyOrder = Box<dyn Fn(&Record, &Record) -> Ordering>;
type RecordGroups = SortedGroups<RecordStream<'static, Record>, KeyOrder>;

/// Pulls records from a shared inner source while the aggregate streams it.
struct SharedRecords {
    source: Rc<RefCell<Box<dyn DataSource>>>,
    failed: bool,
}

impl Iterator for SharedRecords {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = pull(&mut **self.source.borrow_mut())?;
        self.failed = item.is_err();
        Some(item)
    }
}

pub struct AggregateSource {
    name: String,
    short_name: String,
    inner: Rc<RefCell<Box<dyn DataSource>>>,
    keys: RecordComparator,
    fields: Vec<AggregateField>,
    sort: Option<Box<dyn Sort<Record>>>,
    schema: Arc<Schema>,
    groups: Option<RecordGroups>,
    state: SourceState,
}

impl AggregateSource {
    pub fn new<S>(inner: S, keys: RecordComparator, fields: Vec<AggregateField>) -> Self
    where
        S: DataSource + 'static,
    {
        let name = inner.name().to_string();
        let short_name = inner.short_name().to_string();
        let schema = Schema::with_fields(
            keys.key_fields()
                .iter()
                .map(String::as_str)
                .chain(fields.iter().map(|f| f.name.as_str())),
        );
        let inner: Box<dyn DataSource> = Box::new(inner);
        Self {
            name,
            short_name,
            inner: Rc::new(RefCell::new(inner)),
            keys,
            fields,
            sort: None,
            schema: Arc::new(schema),
            groups: None,
            state: SourceState::Unopened,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into().trim().to_string();
        self.short_name = default_short_name(&self.name);
        self
    }

    /// Sort used when the inner source is unsorted. Defaults to `MemorySort`.
    pub fn with_sort(mut self, sort: Box<dyn Sort<Record>>) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn fields(&self) -> &[AggregateField] {
        &self.fields
    }

    fn record_stream(&self) -> Result<RecordStream<'static, Record>> {
        let sorted = self.inner.borrow().is_sorted();
        if sorted {
            return Ok(Box::new(SharedRecords {
                source: Rc::clone(&self.inner),
                failed: false,
            }));
        }

        let mut shared = SharedRecords {
            source: Rc::clone(&self.inner),
            failed: false,
        };
        match &self.sort {
            Some(sort) => sort.sort(&mut shared),
            None => {
                let keys = self.keys.clone();
                MemorySort::new(move |a: &Record, b: &Record| keys.compare(a, b)).sort(&mut shared)
            }
        }
    }

    fn build(&self, group: &[Record]) -> Record {
        let mut out = self.schema.create_record();
        if let Some(first) = group.first() {
            for key in self.keys.key_fields() {
                out.set(key, first.get(key).clone());
            }
        }
        for field in &self.fields {
            out.set(&field.name, field.reduce(group));
        }
        out
    }
}

impl DataSource for AggregateSource {
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
        log::info!("Opening aggregate data source {}", self.name);
        self.inner.borrow_mut().open()?;

        let stream = self.record_stream()?;
        let keys = self.keys.clone();
        let order: KeyOrder = Box::new(move |a: &Record, b: &Record| keys.compare(a, b));
        self.groups = Some(SortedGroups::new(stream, order));
        self.state = SourceState::Open;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        require_open(&self.name, self.state, "close")?;
        log::info!("Closing aggregate data source {}", self.name);
        self.groups = None;
        self.state = SourceState::Closed;
        self.inner.borrow_mut().close()
    }

    fn has_next(&mut self) -> Result<bool> {
        require_open(&self.name, self.state, "has_next")?;
        match self.groups.as_mut() {
            Some(groups) => groups.has_next(),
            None => Ok(false),
        }
    }

    fn next_record(&mut self) -> Result<Record> {
        require_open(&self.name, self.state, "next")?;
        let group = match self.groups.as_mut() {
            Some(groups) => groups.next_group()?,
            None => Vec::new(),
        };
        if group.is_empty() {
            return Err(ReconError::Exhausted {
                source_name: self.name.clone(),
            });
        }
        Ok(self.build(&group))
    }

    fn is_sorted(&self) -> bool {
        true
    }

    fn set_sorted(&mut self, sorted: bool) -> Result<()> {
        if sorted {
            Ok(())
        } else {
            Err(ReconError::AlwaysSorted {
                source_name: self.name.clone(),
            })
        }
    }
}
