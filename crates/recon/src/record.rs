use std::fmt;
use std::sync::Arc;

use crate::schema::Schema;
use crate::value::Value;

static NULL: Value = Value::Null;

/// Dynamic record: one value per schema slot.
///
/// The value array may be shorter than the schema when fields were added to
/// the schema after this record was created; missing slots read as null.
#[derive(Clone)]
pub struct Record {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Record {
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = vec![Value::Null; schema.len()];
        Self { schema, values }
    }

    /// Build a record from `(field, value)` pairs.
    pub fn from_pairs<I, K, V>(schema: Arc<Schema>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = Self::new(schema);
        for (field, value) in pairs {
            record.set(field.as_ref(), value.into());
        }
        record
    }

    /// Value of `field`, or null for unknown or unset fields.
    pub fn get(&self, field: &str) -> &Value {
        match self.schema.index_of(field) {
            Some(idx) => self.values.get(idx).unwrap_or(&NULL),
            None => &NULL,
        }
    }

    pub fn set(&mut self, field: &str, value: Value) {
        let idx = self.schema.index_or_insert(field);
        if self.values.len() <= idx {
            self.values.resize(idx + 1, Value::Null);
        }
        self.values[idx] = value;
    }

    /// Replace every stored value with `f(value)`, in slot order.
    pub fn map_values<F>(&mut self, mut f: F)
    where
        F: FnMut(Value) -> Value,
    {
        for slot in &mut self.values {
            let value = std::mem::take(slot);
            *slot = f(value);
        }
    }

    /// All field names of the schema, in slot order.
    pub fn fields(&self) -> Vec<String> {
        self.schema.fields()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record {{")?;
        for (i, field) in self.fields().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let value = self.get(field);
            write!(f, "{field}={value}")?;
            if !value.is_null() {
                write!(f, " [{}]", value.type_name())?;
            }
        }
        write!(f, "}}")
    }
}
