//! Scalar values, rows, and partition key ranges.
//!
//! `Datum` is the scalar type used for sort keys and partitioning keys.
//! Floats are intentionally excluded: partition boundaries must compare
//! identically everywhere, and floating-point drift across encoders would
//! break the range invariants.
//!
//! The derived `Ord` gives the total order used throughout:
//! `Null < Int64(..) < String(..)`, with values of the same variant
//! compared by their natural order.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Scalar value for sort and partitioning keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Datum {
    /// Explicit null; sorts before every non-null value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// UTF-8 string.
    String(String),
}

impl Datum {
    /// Returns a short type label for diagnostics.
    #[must_use]
    pub const fn type_label(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int64(_) => "int64",
            Self::String(_) => "string",
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Int64(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// One tuple, projected onto the logical columns of a partition.
///
/// Rows are positional: index `i` holds the value of the `i`-th logical
/// column of the layout being read or written.
pub type Row = Vec<Datum>;

/// A half-open key range `[lower, upper)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRange {
    /// Inclusive lower bound.
    pub lower: Datum,
    /// Exclusive upper bound.
    pub upper: Datum,
}

impl KeyRange {
    /// Creates a new range.
    #[must_use]
    pub const fn new(lower: Datum, upper: Datum) -> Self {
        Self { lower, upper }
    }

    /// Returns true if the datum falls within `[lower, upper)`.
    #[must_use]
    pub fn contains(&self, value: &Datum) -> bool {
        value >= &self.lower && value < &self.upper
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.lower, self.upper)
    }
}

/// Validates that a partition range array is sorted and non-overlapping.
///
/// Every range must be non-empty (`lower < upper`) and each range's lower
/// bound must be at or above the previous range's upper bound.
///
/// # Errors
///
/// Returns [`Error::InvariantViolated`] naming the offending index.
pub fn validate_ranges(ranges: &[KeyRange]) -> Result<()> {
    for (i, range) in ranges.iter().enumerate() {
        if range.lower >= range.upper {
            return Err(Error::invariant(format!(
                "range {i} is empty or inverted: {range}"
            )));
        }
        if i > 0 && ranges[i - 1].upper > range.lower {
            return Err(Error::invariant(format!(
                "range {i} overlaps or precedes range {}: {} then {range}",
                i - 1,
                ranges[i - 1]
            )));
        }
    }
    Ok(())
}

/// Locates the range containing `value` via binary search.
///
/// Returns `None` when the value falls outside every range (including
/// into a gap between ranges). The array must satisfy
/// [`validate_ranges`].
#[must_use]
pub fn range_index_for(ranges: &[KeyRange], value: &Datum) -> Option<usize> {
    let idx = ranges.partition_point(|r| r.upper <= *value);
    (idx < ranges.len() && ranges[idx].contains(value)).then_some(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_ranges(bounds: &[(i64, i64)]) -> Vec<KeyRange> {
        bounds
            .iter()
            .map(|&(lo, hi)| KeyRange::new(Datum::Int64(lo), Datum::Int64(hi)))
            .collect()
    }

    #[test]
    fn datum_total_order() {
        assert!(Datum::Null < Datum::Int64(i64::MIN));
        assert!(Datum::Int64(i64::MAX) < Datum::String(String::new()));
        assert!(Datum::Int64(1) < Datum::Int64(2));
        assert!(Datum::String("a".into()) < Datum::String("b".into()));
    }

    #[test]
    fn range_contains_half_open() {
        let range = KeyRange::new(Datum::Int64(10), Datum::Int64(20));
        assert!(range.contains(&Datum::Int64(10)));
        assert!(range.contains(&Datum::Int64(19)));
        assert!(!range.contains(&Datum::Int64(20)));
        assert!(!range.contains(&Datum::Int64(9)));
    }

    #[test]
    fn validate_accepts_sorted_disjoint() {
        let ranges = int_ranges(&[(0, 10), (10, 20), (30, 40)]);
        assert!(validate_ranges(&ranges).is_ok());
    }

    #[test]
    fn validate_rejects_overlap() {
        let ranges = int_ranges(&[(0, 10), (5, 20)]);
        assert!(validate_ranges(&ranges).is_err());
    }

    #[test]
    fn validate_rejects_empty_range() {
        let ranges = int_ranges(&[(10, 10)]);
        assert!(validate_ranges(&ranges).is_err());
    }

    #[test]
    fn range_index_binary_search() {
        let ranges = int_ranges(&[(0, 10), (10, 20), (30, 40)]);
        assert_eq!(range_index_for(&ranges, &Datum::Int64(0)), Some(0));
        assert_eq!(range_index_for(&ranges, &Datum::Int64(15)), Some(1));
        assert_eq!(range_index_for(&ranges, &Datum::Int64(39)), Some(2));
        // Gap between ranges and out-of-bounds values have no bucket.
        assert_eq!(range_index_for(&ranges, &Datum::Int64(25)), None);
        assert_eq!(range_index_for(&ranges, &Datum::Int64(40)), None);
        assert_eq!(range_index_for(&ranges, &Datum::Int64(-1)), None);
    }
}
