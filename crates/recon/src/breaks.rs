//! Break model: the differences a comparison produces.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::record::Record;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// Matched records with differing field values.
    Field,
    /// Key present on one side only.
    Presence,
    /// Leftover member of a duplicate-key run.
    Group,
}

impl BreakKind {
    pub const ALL: [BreakKind; 3] = [BreakKind::Field, BreakKind::Presence, BreakKind::Group];

    pub fn label(self) -> &'static str {
        match self {
            Self::Field => "Field Break",
            Self::Presence => "Data Break",
            Self::Group => "Group Break",
        }
    }
}

/// One differing field. The actual value is read live from the record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiff {
    pub field: String,
    /// Right-side value.
    pub expected: Value,
    pub excluded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BreakDetail {
    Field(Vec<FieldDiff>),
    Presence,
    Group { group_id: u32, fields: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct Break {
    record: Arc<Record>,
    side: Side,
    excluded: bool,
    detail: BreakDetail,
}

impl Break {
    /// Field break on a left record. `diffs` keep the order fields were compared in.
    pub fn field(record: Arc<Record>, diffs: Vec<FieldDiff>) -> Self {
        Self {
            record,
            side: Side::Left,
            excluded: false,
            detail: BreakDetail::Field(diffs),
        }
    }

    pub fn presence(record: Arc<Record>, side: Side) -> Self {
        Self {
            record,
            side,
            excluded: false,
            detail: BreakDetail::Presence,
        }
    }

    pub fn group(record: Arc<Record>, side: Side, group_id: u32, fields: Vec<String>) -> Self {
        Self {
            record,
            side,
            excluded: false,
            detail: BreakDetail::Group { group_id, fields },
        }
    }

    pub fn record(&self) -> &Arc<Record> {
        &self.record
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn kind(&self) -> BreakKind {
        match self.detail {
            BreakDetail::Field(_) => BreakKind::Field,
            BreakDetail::Presence => BreakKind::Presence,
            BreakDetail::Group { .. } => BreakKind::Group,
        }
    }

    pub fn detail(&self) -> &BreakDetail {
        &self.detail
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    pub fn set_excluded(&mut self, excluded: bool) {
        self.excluded = excluded;
    }

    /// Field diffs of a field break; empty for other kinds.
    pub fn diffs(&self) -> &[FieldDiff] {
        match &self.detail {
            BreakDetail::Field(diffs) => diffs,
            _ => &[],
        }
    }

    /// Names of the fields involved, for field and group breaks.
    pub fn fields(&self) -> Vec<&str> {
        match &self.detail {
            BreakDetail::Field(diffs) => diffs.iter().map(|d| d.field.as_str()).collect(),
            BreakDetail::Group { fields, .. } => fields.iter().map(String::as_str).collect(),
            BreakDetail::Presence => Vec::new(),
        }
    }

    fn diff(&self, field: &str) -> Option<&FieldDiff> {
        self.diffs().iter().find(|d| d.field == field)
    }

    pub fn expected(&self, field: &str) -> Option<&Value> {
        self.diff(field).map(|d| &d.expected)
    }

    /// Left-side value of a differing field, read from the record.
    pub fn actual(&self, field: &str) -> Option<&Value> {
        self.diff(field).map(|_| self.record.get(field))
    }

    pub fn is_field_excluded(&self, field: &str) -> bool {
        self.diff(field).map(|d| d.excluded).unwrap_or(false)
    }

    /// Flag one field of a field break. Returns false for unknown fields.
    pub fn set_field_excluded(&mut self, field: &str, excluded: bool) -> bool {
        if let BreakDetail::Field(diffs) = &mut self.detail {
            if let Some(diff) = diffs.iter_mut().find(|d| d.field == field) {
                diff.excluded = excluded;
                return true;
            }
        }
        false
    }

    pub fn group_id(&self) -> Option<u32> {
        match self.detail {
            BreakDetail::Group { group_id, .. } => Some(group_id),
            _ => None,
        }
    }
}
