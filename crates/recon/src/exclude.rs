//! Break exclusion policies.
//!
//! Exclusion flags breaks (or single fields of a field break) without
//! removing them, so reports can show excluded and active counts side by side.

use crate::breaks::Break;
use crate::comparator::DataComparator;
use crate::error::{ReconError, Result};
use crate::record::Record;
use crate::value::Value;

pub trait ExclusionPolicy {
    /// Inspect a break before it is recorded. May flag individual fields;
    /// returns whether the whole break is excluded.
    fn exclude(&self, br: &mut Break) -> bool;
}

/// Excludes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExclusion;

impl ExclusionPolicy for NoExclusion {
    fn exclude(&self, _br: &mut Break) -> bool {
        false
    }
}

impl<F> ExclusionPolicy for F
where
    F: Fn(&Break) -> bool,
{
    fn exclude(&self, br: &mut Break) -> bool {
        self(br)
    }
}

/// One exclusion rule.
///
/// `key` restricts the rule to records whose fields equal the given values.
/// A rule with only a key excludes whole breaks; otherwise it flags differing
/// fields that match `field`, `left` (actual) and `right` (expected).
#[derive(Debug, Clone, PartialEq)]
pub struct BreakExclude {
    key: Vec<(String, Value)>,
    field: Option<String>,
    left: Option<Value>,
    right: Option<Value>,
}

impl BreakExclude {
    pub fn new(
        key: Vec<(String, Value)>,
        field: Option<String>,
        left: Option<Value>,
        right: Option<Value>,
    ) -> Result<Self> {
        if key.is_empty() && field.is_none() && left.is_none() && right.is_none() {
            return Err(ReconError::ConfigValidation(
                "break exclude must set at least one of key, field, left or right".into(),
            ));
        }
        Ok(Self {
            key,
            field,
            left,
            right,
        })
    }

    /// Rule matching every difference on `field`.
    pub fn field(field: impl Into<String>) -> Self {
        Self {
            key: Vec::new(),
            field: Some(field.into()),
            left: None,
            right: None,
        }
    }

    pub fn key(&self) -> &[(String, Value)] {
        &self.key
    }

    pub fn field_name(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn left(&self) -> Option<&Value> {
        self.left.as_ref()
    }

    pub fn right(&self) -> Option<&Value> {
        self.right.as_ref()
    }

    fn is_key_only(&self) -> bool {
        self.field.is_none() && self.left.is_none() && self.right.is_none()
    }

    fn matches_key(&self, cmp: &DataComparator, record: &Record) -> bool {
        self.key
            .iter()
            .all(|(field, value)| cmp.values_equal(value, record.get(field)))
    }

    fn matches_data(&self, cmp: &DataComparator, field: &str, actual: &Value, expected: &Value) -> bool {
        self.field.as_deref().map_or(true, |f| f == field)
            && self.left.as_ref().map_or(true, |v| cmp.values_equal(v, actual))
            && self.right.as_ref().map_or(true, |v| cmp.values_equal(v, expected))
    }
}

/// Applies a list of `BreakExclude` rules.
#[derive(Debug, Clone, Default)]
pub struct RuleExcluder {
    comparator: DataComparator,
    rules: Vec<BreakExclude>,
}

impl RuleExcluder {
    pub fn new(comparator: DataComparator, rules: Vec<BreakExclude>) -> Self {
        Self { comparator, rules }
    }

    pub fn rules(&self) -> &[BreakExclude] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl ExclusionPolicy for RuleExcluder {
    fn exclude(&self, br: &mut Break) -> bool {
        let mut flagged: Vec<String> = Vec::new();

        for rule in &self.rules {
            if !rule.matches_key(&self.comparator, br.record()) {
                continue;
            }
            if rule.is_key_only() {
                return true;
            }

            let hits: Vec<String> = br
                .diffs()
                .iter()
                .filter(|d| {
                    let actual = br.record().get(&d.field);
                    rule.matches_data(&self.comparator, &d.field, actual, &d.expected)
                })
                .map(|d| d.field.clone())
                .collect();
            for field in hits {
                br.set_field_excluded(&field, true);
                if !flagged.contains(&field) {
                    flagged.push(field);
                }
            }
        }

        !br.diffs().is_empty() && flagged.len() == br.diffs().len()
    }
}
