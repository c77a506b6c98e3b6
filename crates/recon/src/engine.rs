//! Sort-merge reconciliation driver.
//!
//! Both sides are sorted by key (unless they already are), grouped into
//! key-equal runs, and merged. Keys on one side only become presence breaks;
//! matched 1×1 keys are compared field by field; duplicate runs first cancel
//! exact matches and report the leftovers as group breaks.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use once_cell::unsync::OnceCell;

use crate::breaks::{Break, FieldDiff, Side};
use crate::comparator::{DataComparator, RecordComparator};
use crate::config::ComparisonConfig;
use crate::error::{Result, SourceState};
use crate::exclude::ExclusionPolicy;
use crate::metadata::ComparisonMetadata;
use crate::record::Record;
use crate::sort::{MemorySort, RecordStream, Sort, SortedGroups};
use crate::source::{DataSource, Records};

/// Duplicate runs above this size get a warning.
const LARGE_GROUP_WARNING: usize = 100;

pub struct Reconciler {
    config: ComparisonConfig,
    comparator: DataComparator,
    keys: RecordComparator,
    excluded: HashSet<String>,
    key_set: HashSet<String>,
    /// Right fields already compared through a mapping.
    mapped_targets: HashSet<String>,
    sort: Option<Box<dyn Sort<Record>>>,
    policy: Box<dyn ExclusionPolicy>,
}

impl Reconciler {
    /// Validates `config` and sets up the rule excluder from its `break_excludes`.
    pub fn new(config: ComparisonConfig) -> Result<Self> {
        config.validate()?;
        let policy = config.exclusion_policy()?;
        Ok(Self {
            comparator: config.data_comparator(),
            keys: config.record_comparator(),
            excluded: config.exclude_fields.iter().cloned().collect(),
            key_set: config.key_fields.iter().cloned().collect(),
            mapped_targets: config.mapped_fields.values().cloned().collect(),
            sort: None,
            policy: Box::new(policy),
            config,
        })
    }

    /// Sort for unsorted sources. Defaults to `MemorySort` on the key tuple.
    pub fn with_sort(mut self, sort: Box<dyn Sort<Record>>) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_exclusion_policy(mut self, policy: impl ExclusionPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn config(&self) -> &ComparisonConfig {
        &self.config
    }

    pub fn record_comparator(&self) -> &RecordComparator {
        &self.keys
    }

    /// Run the comparison. Both sources are opened here and closed before
    /// returning, also when the merge fails.
    pub fn compare<L, R>(&self, left: L, right: R) -> Result<Comparison>
    where
        L: DataSource + 'static,
        R: DataSource + 'static,
    {
        let mut left: Box<dyn DataSource> = Box::new(left);
        let mut right: Box<dyn DataSource> = Box::new(right);

        log::info!(
            "Starting comparison {}: {} vs {}",
            self.config.name,
            left.name(),
            right.name()
        );

        if let Err(e) = left.open() {
            close_after_failure(left.as_mut());
            return Err(e);
        }
        if let Err(e) = right.open() {
            close_after_failure(right.as_mut());
            close_after_failure(left.as_mut());
            return Err(e);
        }

        let merged = self.merge(left.as_mut(), right.as_mut());
        let left_closed = left.close();
        let right_closed = right.close();
        let merged = merged?;
        left_closed?;
        right_closed?;

        log::info!(
            "Finished comparison {}: {} break(s), {} excluded",
            self.config.name,
            merged.breaks.len(),
            merged.breaks.iter().filter(|b| b.is_excluded()).count()
        );

        Ok(Comparison {
            name: self.config.name.clone(),
            config: self.config.clone(),
            breaks: merged.breaks,
            left_source: left,
            right_source: right,
            left_data: merged.left_data,
            right_data: merged.right_data,
            left_out_of_order: merged.left_out_of_order,
            right_out_of_order: merged.right_out_of_order,
            metadata: OnceCell::new(),
        })
    }

    fn stream<'a>(&self, source: &'a mut dyn DataSource) -> Result<RecordStream<'a, Record>> {
        if source.is_sorted() {
            return Ok(Box::new(Records::new(source)));
        }
        log::debug!("Sorting data source {}", source.name());
        let mut records = Records::new(source);
        let sorted = match &self.sort {
            Some(sort) => sort.sort(&mut records)?,
            None => MemorySort::new(|a: &Record, b: &Record| self.keys.compare(a, b))
                .sort(&mut records)?,
        };
        Ok(sorted)
    }

    fn merge(&self, left: &mut dyn DataSource, right: &mut dyn DataSource) -> Result<Merged> {
        let order = |a: &Record, b: &Record| self.keys.compare(a, b);
        let mut left_groups = SortedGroups::new(self.stream(left)?, order);
        let mut right_groups = SortedGroups::new(self.stream(right)?, order);

        let mut out = Merged::default();
        let mut group_id = 0u32;

        let mut lg = shared(left_groups.next_group()?);
        let mut rg = shared(right_groups.next_group()?);

        while !lg.is_empty() || !rg.is_empty() {
            match self
                .keys
                .compare_heads(lg.first().map(|r| &**r), rg.first().map(|r| &**r))
            {
                Ordering::Less => {
                    for record in &lg {
                        self.push(&mut out.breaks, Break::presence(Arc::clone(record), Side::Left));
                    }
                    out.left_data.append(&mut lg);
                    lg = shared(left_groups.next_group()?);
                }
                Ordering::Greater => {
                    for record in &rg {
                        self.push(&mut out.breaks, Break::presence(Arc::clone(record), Side::Right));
                    }
                    out.right_data.append(&mut rg);
                    rg = shared(right_groups.next_group()?);
                }
                Ordering::Equal => {
                    if lg.len() == 1 && rg.len() == 1 {
                        let diffs = self.compare_records(&lg[0], &rg[0]);
                        if !diffs.is_empty() {
                            self.push(&mut out.breaks, Break::field(Arc::clone(&lg[0]), diffs));
                        }
                    } else {
                        self.compare_duplicates(&lg, &rg, &mut group_id, &mut out.breaks);
                    }
                    out.left_data.append(&mut lg);
                    out.right_data.append(&mut rg);
                    lg = shared(left_groups.next_group()?);
                    rg = shared(right_groups.next_group()?);
                }
            }
        }

        out.left_out_of_order = left_groups.out_of_order_count();
        out.right_out_of_order = right_groups.out_of_order_count();
        Ok(out)
    }

    /// Greedy pairing within a duplicate-key run.
    ///
    /// Each left record cancels the first remaining right record it matches
    /// exactly. Leftovers on both sides share one group id and the union of
    /// fields that differ between any leftover pair.
    fn compare_duplicates(
        &self,
        lefts: &[Arc<Record>],
        rights: &[Arc<Record>],
        group_id: &mut u32,
        breaks: &mut Vec<Break>,
    ) {
        let size = lefts.len() + rights.len();
        if size > LARGE_GROUP_WARNING {
            log::warn!(
                "Large duplicate-key group of {size} records starting at {:?}",
                lefts.first().or(rights.first())
            );
        }

        let mut remaining: Vec<&Arc<Record>> = rights.iter().collect();
        let mut unmatched: Vec<&Arc<Record>> = Vec::new();
        for left in lefts {
            let exact = remaining
                .iter()
                .position(|right| self.compare_records(left, right).is_empty());
            match exact {
                Some(pos) => {
                    remaining.remove(pos);
                }
                None => unmatched.push(left),
            }
        }

        if unmatched.is_empty() && remaining.is_empty() {
            return;
        }

        *group_id += 1;
        let mut fields: Vec<String> = Vec::new();
        for left in &unmatched {
            for right in &remaining {
                for diff in self.compare_records(left, right) {
                    if !fields.contains(&diff.field) {
                        fields.push(diff.field);
                    }
                }
            }
        }

        for left in unmatched {
            let br = Break::group(Arc::clone(left), Side::Left, *group_id, fields.clone());
            self.push(breaks, br);
        }
        for right in remaining {
            let br = Break::group(Arc::clone(right), Side::Right, *group_id, fields.clone());
            self.push(breaks, br);
        }
    }

    /// Field differences between two key-matched records, keyed by left field.
    pub fn compare_records(&self, left: &Record, right: &Record) -> Vec<FieldDiff> {
        let mut diffs = Vec::new();
        let mut compared: HashSet<String> = HashSet::new();

        for field in left.fields() {
            if self.key_set.contains(&field) || self.excluded.contains(&field) {
                continue;
            }
            let right_field = self.config.mapped_fields.get(&field).unwrap_or(&field);
            let expected = right.get(right_field);
            if !self.comparator.values_equal(left.get(&field), expected) {
                diffs.push(FieldDiff {
                    field: field.clone(),
                    expected: expected.clone(),
                    excluded: false,
                });
            }
            compared.insert(right_field.clone());
            compared.insert(field);
        }

        for field in right.fields() {
            if self.key_set.contains(&field)
                || self.excluded.contains(&field)
                || self.mapped_targets.contains(&field)
                || compared.contains(&field)
            {
                continue;
            }
            let expected = right.get(&field);
            if !self.comparator.values_equal(left.get(&field), expected) {
                diffs.push(FieldDiff {
                    expected: expected.clone(),
                    field,
                    excluded: false,
                });
            }
        }

        diffs
    }

    fn push(&self, breaks: &mut Vec<Break>, mut br: Break) {
        if self.policy.exclude(&mut br) {
            br.set_excluded(true);
        }
        breaks.push(br);
    }
}

fn shared(group: Vec<Record>) -> Vec<Arc<Record>> {
    group.into_iter().map(Arc::new).collect()
}

#[derive(Default)]
struct Merged {
    breaks: Vec<Break>,
    left_data: Vec<Arc<Record>>,
    right_data: Vec<Arc<Record>>,
    left_out_of_order: usize,
    right_out_of_order: usize,
}

// ============================================================================
// Comparison result
// ============================================================================

/// Outcome of one run: breaks in key order plus both (closed) sources and
/// the records read from them.
pub struct Comparison {
    name: String,
    config: ComparisonConfig,
    breaks: Vec<Break>,
    left_source: Box<dyn DataSource>,
    right_source: Box<dyn DataSource>,
    left_data: Vec<Arc<Record>>,
    right_data: Vec<Arc<Record>>,
    left_out_of_order: usize,
    right_out_of_order: usize,
    metadata: OnceCell<ComparisonMetadata>,
}

impl Comparison {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ComparisonConfig {
        &self.config
    }

    pub fn key_fields(&self) -> &[String] {
        &self.config.key_fields
    }

    pub fn exclude_fields(&self) -> &[String] {
        &self.config.exclude_fields
    }

    pub fn breaks(&self) -> &[Break] {
        &self.breaks
    }

    pub fn left_source(&self) -> &dyn DataSource {
        self.left_source.as_ref()
    }

    pub fn right_source(&self) -> &dyn DataSource {
        self.right_source.as_ref()
    }

    pub fn left_data(&self) -> &[Arc<Record>] {
        &self.left_data
    }

    pub fn right_data(&self) -> &[Arc<Record>] {
        &self.right_data
    }

    /// Records on each side that arrived out of key order.
    pub fn out_of_order_counts(&self) -> (usize, usize) {
        (self.left_out_of_order, self.right_out_of_order)
    }

    /// Summary statistics, computed on first use.
    pub fn metadata(&self) -> &ComparisonMetadata {
        self.metadata.get_or_init(|| ComparisonMetadata::compute(self))
    }
}

/// Close a source left open by a failed step; the original error wins.
fn close_after_failure(source: &mut dyn DataSource) {
    if source.state() != SourceState::Open {
        return;
    }
    if let Err(close_err) = source.close() {
        log::warn!("Failed to close {} after open error: {close_err}", source.name());
    }
}
