//! Inclusive block ranges and coalescing
//!
//! Missed block ranges are reported to clients as maximal, pairwise disjoint
//! intervals in ascending order. Raw failure intervals recorded by ingest may
//! overlap or touch; [`coalesce`] merges them before they leave the service.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Inclusive range of block indices `first_block..=last_block`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockRange {
    pub first_block: u64,
    pub last_block: u64,
}

impl BlockRange {
    /// Create a range, rejecting `first_block > last_block`
    pub fn new(first_block: u64, last_block: u64) -> Result<Self> {
        if first_block > last_block {
            return Err(Error::InvalidBlockRange {
                first: first_block,
                last: last_block,
            });
        }
        Ok(Self {
            first_block,
            last_block,
        })
    }

    /// Range covering a single block
    pub fn single(block: u64) -> Self {
        Self {
            first_block: block,
            last_block: block,
        }
    }

    /// Number of blocks covered (saturates for the full u64 domain)
    pub fn block_count(&self) -> u64 {
        (self.last_block - self.first_block).saturating_add(1)
    }

    pub fn contains(&self, block: u64) -> bool {
        self.first_block <= block && block <= self.last_block
    }

    /// True if any block of this range is at or after `block`
    pub fn reaches(&self, block: u64) -> bool {
        self.last_block >= block
    }

    /// True if `other` overlaps this range or starts right after it ends.
    ///
    /// Assumes `self.first_block <= other.first_block`.
    fn touches(&self, other: &BlockRange) -> bool {
        match self.last_block.checked_add(1) {
            Some(next) => other.first_block <= next,
            None => true,
        }
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.first_block, self.last_block)
    }
}

/// Merge overlapping or adjacent ranges into maximal disjoint ranges,
/// sorted ascending by first block.
pub fn coalesce<I>(ranges: I) -> Vec<BlockRange>
where
    I: IntoIterator<Item = BlockRange>,
{
    let mut sorted: Vec<BlockRange> = ranges.into_iter().collect();
    sorted.sort_unstable();

    let mut merged: Vec<BlockRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(current) if current.touches(&range) => {
                current.last_block = current.last_block.max(range.last_block);
            }
            _ => merged.push(range),
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(first: u64, last: u64) -> BlockRange {
        BlockRange::new(first, last).unwrap()
    }

    #[test]
    fn test_new_rejects_inverted() {
        let result = BlockRange::new(10, 9);
        assert_eq!(
            result,
            Err(Error::InvalidBlockRange { first: 10, last: 9 })
        );
        assert_eq!(BlockRange::new(7, 7).unwrap(), BlockRange::single(7));
    }

    #[test]
    fn test_adjacent_ranges_merge() {
        let merged = coalesce([range(10, 20), range(21, 30)]);
        assert_eq!(merged, vec![range(10, 30)]);
    }

    #[test]
    fn test_disjoint_ranges_stay_separate() {
        let merged = coalesce([range(10, 20), range(25, 30)]);
        assert_eq!(merged, vec![range(10, 20), range(25, 30)]);
    }

    #[test]
    fn test_overlapping_and_unsorted() {
        let merged = coalesce([
            range(50, 60),
            range(12, 18),
            range(10, 15),
            range(55, 70),
            range(40, 40),
        ]);
        assert_eq!(merged, vec![range(10, 18), range(40, 40), range(50, 70)]);
    }

    #[test]
    fn test_contained_range_absorbed() {
        let merged = coalesce([range(0, 100), range(20, 30)]);
        assert_eq!(merged, vec![range(0, 100)]);
    }

    #[test]
    fn test_u64_max_does_not_overflow() {
        let merged = coalesce([range(u64::MAX - 1, u64::MAX), range(u64::MAX, u64::MAX)]);
        assert_eq!(merged, vec![range(u64::MAX - 1, u64::MAX)]);
        assert_eq!(range(0, u64::MAX).block_count(), u64::MAX);
    }

    #[test]
    fn test_empty_input() {
        assert!(coalesce(Vec::new()).is_empty());
    }

    #[test]
    fn test_reaches_and_contains() {
        let r = range(10, 20);
        assert!(r.reaches(20));
        assert!(r.reaches(0));
        assert!(!r.reaches(21));
        assert!(r.contains(10));
        assert!(!r.contains(21));
        assert_eq!(r.block_count(), 11);
        assert_eq!(r.to_string(), "[10, 20]");
    }
}
