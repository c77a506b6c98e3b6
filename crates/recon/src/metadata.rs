//! Comparison metadata: counts and field sets computed once per result.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::breaks::{BreakKind, Side};
use crate::engine::Comparison;
use crate::record::Record;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BreakCounts {
    pub included: usize,
    pub excluded: usize,
}

impl BreakCounts {
    pub fn total(&self) -> usize {
        self.included + self.excluded
    }

    fn add(&mut self, excluded: bool) {
        if excluded {
            self.excluded += 1;
        } else {
            self.included += 1;
        }
    }
}

/// Break tally for one field, or for one "Only in ..." label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakTypeInfo {
    pub label: String,
    pub break_count: usize,
    pub exclude_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindCount {
    pub kind: BreakKind,
    pub included: usize,
    pub excluded: usize,
}

/// Serialisable view of the metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonSummary {
    pub name: String,
    pub left_name: String,
    pub right_name: String,
    pub left_size: usize,
    pub right_size: usize,
    pub breaks: BreakCounts,
    pub by_kind: Vec<KindCount>,
    pub break_types: Vec<BreakTypeInfo>,
    pub field_break_fields: Vec<String>,
    pub group_break_fields: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ComparisonMetadata {
    name: String,
    left_name: String,
    right_name: String,
    left_short_name: String,
    right_short_name: String,
    left_size: usize,
    right_size: usize,
    counts: BreakCounts,
    field_counts: BreakCounts,
    presence_counts: BreakCounts,
    group_counts: BreakCounts,
    break_types: Vec<BreakTypeInfo>,
    left_fields: Vec<String>,
    right_fields: Vec<String>,
    field_break_fields: Vec<String>,
    included_field_break_fields: Vec<String>,
    excluded_field_break_fields: Vec<String>,
    group_break_fields: Vec<String>,
}

/// Insert-ordered set push.
fn add_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Field names across the distinct schemas of `data`, in slot order.
fn fields_of(data: &[Arc<Record>]) -> Vec<String> {
    let mut seen_schemas = HashSet::new();
    let mut fields = Vec::new();
    for record in data {
        if seen_schemas.insert(Arc::as_ptr(record.schema())) {
            for field in record.fields() {
                add_unique(&mut fields, &field);
            }
        }
    }
    fields
}

impl ComparisonMetadata {
    pub fn compute(comparison: &Comparison) -> Self {
        let left_short = comparison.left_source().short_name().to_string();
        let right_short = comparison.right_source().short_name().to_string();
        let only_left = format!("Only in {left_short}");
        let only_right = format!("Only in {right_short}");

        let mut meta = Self {
            name: comparison.name().to_string(),
            left_name: comparison.left_source().name().to_string(),
            right_name: comparison.right_source().name().to_string(),
            left_short_name: left_short,
            right_short_name: right_short,
            left_size: comparison.left_data().len(),
            right_size: comparison.right_data().len(),
            counts: BreakCounts::default(),
            field_counts: BreakCounts::default(),
            presence_counts: BreakCounts::default(),
            group_counts: BreakCounts::default(),
            break_types: Vec::new(),
            left_fields: fields_of(comparison.left_data()),
            right_fields: fields_of(comparison.right_data()),
            field_break_fields: Vec::new(),
            included_field_break_fields: Vec::new(),
            excluded_field_break_fields: Vec::new(),
            group_break_fields: Vec::new(),
        };

        for br in comparison.breaks() {
            meta.counts.add(br.is_excluded());
            match br.kind() {
                BreakKind::Field => {
                    meta.field_counts.add(br.is_excluded());
                    for diff in br.diffs() {
                        add_unique(&mut meta.field_break_fields, &diff.field);
                        if diff.excluded {
                            add_unique(&mut meta.excluded_field_break_fields, &diff.field);
                        } else {
                            add_unique(&mut meta.included_field_break_fields, &diff.field);
                        }
                        meta.tally(&diff.field, diff.excluded);
                    }
                }
                BreakKind::Presence | BreakKind::Group => {
                    if br.kind() == BreakKind::Group {
                        meta.group_counts.add(br.is_excluded());
                        for field in br.fields() {
                            add_unique(&mut meta.group_break_fields, field);
                        }
                    } else {
                        meta.presence_counts.add(br.is_excluded());
                    }
                    let label = match br.side() {
                        Side::Left => &only_left,
                        Side::Right => &only_right,
                    };
                    meta.tally(label, br.is_excluded());
                }
            }
        }

        // Stable: equal tallies keep first-seen order
        meta.break_types.sort_by(|a, b| {
            b.break_count
                .cmp(&a.break_count)
                .then(b.exclude_count.cmp(&a.exclude_count))
        });
        meta
    }

    fn tally(&mut self, label: &str, excluded: bool) {
        let pos = match self.break_types.iter().position(|t| t.label == label) {
            Some(pos) => pos,
            None => {
                self.break_types.push(BreakTypeInfo {
                    label: label.to_string(),
                    break_count: 0,
                    exclude_count: 0,
                });
                self.break_types.len() - 1
            }
        };
        let info = &mut self.break_types[pos];
        if excluded {
            info.exclude_count += 1;
        } else {
            info.break_count += 1;
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn left_name(&self) -> &str {
        &self.left_name
    }

    pub fn right_name(&self) -> &str {
        &self.right_name
    }

    pub fn left_short_name(&self) -> &str {
        &self.left_short_name
    }

    pub fn right_short_name(&self) -> &str {
        &self.right_short_name
    }

    pub fn left_size(&self) -> usize {
        self.left_size
    }

    pub fn right_size(&self) -> usize {
        self.right_size
    }

    pub fn total_break_count(&self) -> usize {
        self.counts.total()
    }

    pub fn included_break_count(&self) -> usize {
        self.counts.included
    }

    pub fn excluded_break_count(&self) -> usize {
        self.counts.excluded
    }

    pub fn counts_for(&self, kind: BreakKind) -> &BreakCounts {
        match kind {
            BreakKind::Field => &self.field_counts,
            BreakKind::Presence => &self.presence_counts,
            BreakKind::Group => &self.group_counts,
        }
    }

    /// Sorted by break count, then excluded count, both descending.
    pub fn break_types(&self) -> &[BreakTypeInfo] {
        &self.break_types
    }

    pub fn left_fields(&self) -> &[String] {
        &self.left_fields
    }

    pub fn right_fields(&self) -> &[String] {
        &self.right_fields
    }

    pub fn field_break_fields(&self) -> &[String] {
        &self.field_break_fields
    }

    pub fn included_field_break_fields(&self) -> &[String] {
        &self.included_field_break_fields
    }

    pub fn excluded_field_break_fields(&self) -> &[String] {
        &self.excluded_field_break_fields
    }

    pub fn group_break_fields(&self) -> &[String] {
        &self.group_break_fields
    }

    pub fn has_group_breaks(&self) -> bool {
        self.group_counts.total() > 0
    }

    pub fn summary(&self) -> ComparisonSummary {
        ComparisonSummary {
            name: self.name.clone(),
            left_name: self.left_name.clone(),
            right_name: self.right_name.clone(),
            left_size: self.left_size,
            right_size: self.right_size,
            breaks: self.counts.clone(),
            by_kind: BreakKind::ALL
                .iter()
                .map(|&kind| {
                    let c = self.counts_for(kind);
                    KindCount {
                        kind,
                        included: c.included,
                        excluded: c.excluded,
                    }
                })
                .collect(),
            break_types: self.break_types.clone(),
            field_break_fields: self.field_break_fields.clone(),
            group_break_fields: self.group_break_fields.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.summary())
    }
}
