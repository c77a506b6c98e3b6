//! Ordering and grouping of record streams.
//!
//! Sources that are not already sorted go through a [`Sort`] before the merge.
//! [`SortedGroups`] then walks a sorted stream and yields runs of records with
//! equal keys, tolerating (and counting) items that arrive out of order.

use std::cmp::Ordering;
use std::fmt::Debug;
use std::iter::Peekable;

use crate::error::Result;

/// Owned stream of fallible items.
pub type RecordStream<'a, T> = Box<dyn Iterator<Item = Result<T>> + 'a>;

/// Strategy that returns the items of a stream in key order.
///
/// The input is drained during the call; the returned stream owns the items.
pub trait Sort<T> {
    fn sort(&self, items: &mut dyn Iterator<Item = Result<T>>) -> Result<RecordStream<'static, T>>;
}

/// Materialize everything, then stable-sort in memory.
pub struct MemorySort<F> {
    compare: F,
}

impl<F> MemorySort<F> {
    pub fn new(compare: F) -> Self {
        Self { compare }
    }
}

impl<T, F> Sort<T> for MemorySort<F>
where
    T: 'static,
    F: Fn(&T, &T) -> Ordering,
{
    fn sort(&self, items: &mut dyn Iterator<Item = Result<T>>) -> Result<RecordStream<'static, T>> {
        let mut buf = items.collect::<Result<Vec<T>>>()?;
        buf.sort_by(&self.compare);
        log::debug!("Sorted {} item(s) in memory", buf.len());
        Ok(Box::new(buf.into_iter().map(Ok)))
    }
}

// ============================================================================
// Grouping
// ============================================================================

/// Groups consecutive items with equal keys from a sorted stream.
///
/// Each item is compared to the last member of the current group. An item
/// that sorts before it breaks ordering: a warning is logged, the item starts
/// a new group, and `out_of_order_count` goes up. Nothing is dropped.
pub struct SortedGroups<I, F>
where
    I: Iterator,
{
    items: Peekable<I>,
    compare: F,
    out_of_order: usize,
}

impl<I, T, E, F> SortedGroups<I, F>
where
    I: Iterator<Item = std::result::Result<T, E>>,
    T: Debug,
    F: Fn(&T, &T) -> Ordering,
{
    pub fn new(items: I, compare: F) -> Self {
        Self {
            items: items.peekable(),
            compare,
            out_of_order: 0,
        }
    }

    /// Whether another group is available. Surfaces a pending error.
    pub fn has_next(&mut self) -> std::result::Result<bool, E> {
        let pending_error = match self.items.peek() {
            None => return Ok(false),
            Some(Ok(_)) => return Ok(true),
            Some(Err(_)) => true,
        };
        match self.items.next() {
            Some(Err(e)) if pending_error => Err(e),
            _ => Ok(false),
        }
    }

    /// Next run of equal-key items. Empty once the stream is exhausted.
    pub fn next_group(&mut self) -> std::result::Result<Vec<T>, E> {
        let mut group = Vec::new();
        match self.items.next() {
            None => return Ok(group),
            Some(item) => group.push(item?),
        }

        loop {
            let ord = match self.items.peek() {
                None => break,
                Some(Err(_)) => {
                    // Deliver the group now; the error surfaces on the next call.
                    break;
                }
                Some(Ok(next)) => {
                    let last = group.last().map(|l| (self.compare)(l, next));
                    last.unwrap_or(Ordering::Less)
                }
            };
            match ord {
                Ordering::Equal => {
                    if let Some(Ok(item)) = self.items.next() {
                        group.push(item);
                    }
                }
                Ordering::Less => break,
                Ordering::Greater => {
                    self.out_of_order += 1;
                    if let (Some(prev), Some(Ok(next))) = (group.last(), self.items.peek()) {
                        log::warn!(
                            "Objects not in sorted order - {prev:?} precedes {next:?} but is greater"
                        );
                    }
                    break;
                }
            }
        }

        Ok(group)
    }

    /// Items seen that sorted before their predecessor.
    pub fn out_of_order_count(&self) -> usize {
        self.out_of_order
    }
}

impl<I, T, E, F> Iterator for SortedGroups<I, F>
where
    I: Iterator<Item = std::result::Result<T, E>>,
    T: Debug,
    F: Fn(&T, &T) -> Ordering,
{
    type Item = std::result::Result<Vec<T>, E>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_group() {
            Ok(group) if group.is_empty() => None,
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconError;

    fn ok_stream(items: &[i32]) -> impl Iterator<Item = Result<i32>> + '_ {
        items.iter().copied().map(Ok)
    }

    #[test]
    fn memory_sort_is_stable() {
        let pairs = vec![(2, 'a'), (1, 'b'), (2, 'c'), (1, 'd')];
        let sorter = MemorySort::new(|a: &(i32, char), b: &(i32, char)| a.0.cmp(&b.0));
        let mut input = pairs.into_iter().map(Ok);
        let sorted: Vec<_> = sorter
            .sort(&mut input)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(sorted, vec![(1, 'b'), (1, 'd'), (2, 'a'), (2, 'c')]);
    }

    #[test]
    fn memory_sort_propagates_errors() {
        let sorter = MemorySort::new(|a: &i32, b: &i32| a.cmp(b));
        let mut input = vec![
            Ok(1),
            Err(ReconError::Exhausted {
                source_name: "s".into(),
            }),
        ]
        .into_iter();
        assert!(sorter.sort(&mut input).is_err());
    }

    #[test]
    fn groups_equal_runs() {
        let input = [1, 1, 1, 2, 2, 3];
        let mut groups = SortedGroups::new(ok_stream(&input), |a: &i32, b: &i32| a.cmp(b));

        assert!(groups.has_next().unwrap());
        assert_eq!(groups.next_group().unwrap(), vec![1, 1, 1]);
        assert_eq!(groups.next_group().unwrap(), vec![2, 2]);
        assert_eq!(groups.next_group().unwrap(), vec![3]);
        assert!(!groups.has_next().unwrap());
        assert!(groups.next_group().unwrap().is_empty());
        assert_eq!(groups.out_of_order_count(), 0);
    }

    #[test]
    fn out_of_order_starts_new_group() {
        let input = [1, 3, 2];
        let groups: Vec<Vec<i32>> = SortedGroups::new(ok_stream(&input), |a: &i32, b: &i32| a.cmp(b))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(groups, vec![vec![1], vec![3], vec![2]]);

        let mut counted = SortedGroups::new(ok_stream(&input), |a: &i32, b: &i32| a.cmp(b));
        while !counted.next_group().unwrap().is_empty() {}
        assert_eq!(counted.out_of_order_count(), 1);
    }

    #[test]
    fn every_item_lands_in_one_group() {
        let input = [5, 5, 1, 1, 4, 2, 2, 2, 9];
        let groups: Vec<Vec<i32>> = SortedGroups::new(ok_stream(&input), |a: &i32, b: &i32| a.cmp(b))
            .collect::<Result<_>>()
            .unwrap();
        let flat: Vec<i32> = groups.into_iter().flatten().collect();
        assert_eq!(flat, input);
    }

    #[test]
    fn error_surfaces_after_pending_group() {
        let input: Vec<std::result::Result<i32, &str>> = vec![Ok(1), Ok(1), Err("boom"), Ok(2)];
        let mut groups = SortedGroups::new(input.into_iter(), |a: &i32, b: &i32| a.cmp(b));
        assert_eq!(groups.next_group().unwrap(), vec![1, 1]);
        assert_eq!(groups.has_next(), Err("boom"));
        assert_eq!(groups.next_group().unwrap(), vec![2]);
    }

    #[test]
    fn empty_stream() {
        let mut groups = SortedGroups::new(ok_stream(&[]), |a: &i32, b: &i32| a.cmp(b));
        assert!(!groups.has_next().unwrap());
        assert!(groups.next().is_none());
    }
}
