//! Shared field-name → slot mapping.
//!
//! All records produced by one data source hold the same `Arc<Schema>`, so a
//! field name resolves to the same slot in every record. Slots are allocated
//! lazily on first write of an unknown name and never move afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::record::Record;

#[derive(Debug, Default)]
struct Slots {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

#[derive(Debug, Default)]
pub struct Schema {
    slots: RwLock<Slots>,
    /// Logical name → external name, display only.
    renames: HashMap<String, String>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema whose fields display under different names.
    pub fn with_renames(renames: HashMap<String, String>) -> Self {
        Self {
            slots: RwLock::default(),
            renames,
        }
    }

    /// Pre-declare fields in order. Already known names keep their slot.
    pub fn with_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let schema = Self::new();
        for field in fields {
            schema.index_or_insert(field.as_ref());
        }
        schema
    }

    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.slots.read().index.get(field).copied()
    }

    /// Slot for `field`, allocating the next one if the name is new.
    pub fn index_or_insert(&self, field: &str) -> usize {
        if let Some(idx) = self.index_of(field) {
            return idx;
        }

        let mut slots = self.slots.write();
        // Another writer may have raced us between the read and write lock.
        if let Some(idx) = slots.index.get(field) {
            return *idx;
        }
        let idx = slots.names.len();
        slots.names.push(field.to_string());
        slots.index.insert(field.to_string(), idx);
        idx
    }

    /// Field names in slot order.
    pub fn fields(&self) -> Vec<String> {
        self.slots.read().names.clone()
    }

    pub fn len(&self) -> usize {
        self.slots.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn display_name<'a>(&'a self, field: &'a str) -> &'a str {
        self.renames.get(field).map(String::as_str).unwrap_or(field)
    }

    pub fn create_record(self: &Arc<Self>) -> Record {
        Record::new(Arc::clone(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_dense_and_stable() {
        let schema = Schema::new();
        assert_eq!(schema.index_or_insert("A"), 0);
        assert_eq!(schema.index_or_insert("B"), 1);
        assert_eq!(schema.index_or_insert("A"), 0);
        assert_eq!(schema.index_or_insert("C"), 2);
        assert_eq!(schema.fields(), vec!["A", "B", "C"]);
        assert_eq!(schema.index_of("missing"), None);
    }

    #[test]
    fn renames_are_display_only() {
        let mut renames = HashMap::new();
        renames.insert("acct".to_string(), "ACCOUNT_ID".to_string());
        let schema = Schema::with_renames(renames);
        let idx = schema.index_or_insert("acct");

        assert_eq!(schema.index_of("acct"), Some(idx));
        assert_eq!(schema.index_of("ACCOUNT_ID"), None);
        assert_eq!(schema.display_name("acct"), "ACCOUNT_ID");
        assert_eq!(schema.display_name("other"), "other");
    }

    #[test]
    fn with_fields_preserves_order() {
        let schema = Schema::with_fields(["Key", "Val", "Key"]);
        assert_eq!(schema.fields(), vec!["Key", "Val"]);
        assert_eq!(schema.len(), 2);
    }
}
