//! Sets of consecutive calendar dates and their algebra.

use std::fmt;

use chrono::{Days, NaiveDate};

use crate::error::{Error, Result};

/// A contiguous, possibly unbounded set of calendar dates.
///
/// Only contiguous sets are representable; operations which would produce
/// a set with holes (e.g. the union of two disjoint bounded ranges) fail
/// with [Error::NonRepresentableRange].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    /// No dates at all.
    Empty,
    /// Every date.
    Infinite,
    /// Every date up to and including the bound.
    UpTo(NaiveDate),
    /// Every date from the bound onwards.
    From(NaiveDate),
    /// Every date between the two bounds, inclusive. The start never
    /// exceeds the end.
    Bounded(NaiveDate, NaiveDate),
}

/// Convenience constructor matching how calendars are truncated:
/// a closed range when the end is known, right-unbounded otherwise.
pub fn date_range(start: NaiveDate, end: Option<NaiveDate>) -> DateRange {
    match end {
        Some(end) => DateRange::bounded(start, end),
        None => DateRange::From(start),
    }
}

impl DateRange {
    /// A range of every date between `start` and `end` inclusive;
    /// empty when `start > end`.
    pub fn bounded(start: NaiveDate, end: NaiveDate) -> Self {
        if start > end {
            Self::Empty
        } else {
            Self::Bounded(start, end)
        }
    }

    /// Decomposes into `(lower, upper)` bounds, None standing for
    /// the respective infinity. Returns None for the empty range.
    fn bounds(self) -> Option<(Option<NaiveDate>, Option<NaiveDate>)> {
        match self {
            Self::Empty => None,
            Self::Infinite => Some((None, None)),
            Self::UpTo(end) => Some((None, Some(end))),
            Self::From(start) => Some((Some(start), None)),
            Self::Bounded(start, end) => Some((Some(start), Some(end))),
        }
    }

    fn from_bounds(lower: Option<NaiveDate>, upper: Option<NaiveDate>) -> Self {
        match (lower, upper) {
            (None, None) => Self::Infinite,
            (None, Some(end)) => Self::UpTo(end),
            (Some(start), None) => Self::From(start),
            (Some(start), Some(end)) => Self::bounded(start, end),
        }
    }

    pub fn is_empty(self) -> bool {
        self == Self::Empty
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        match self.bounds() {
            None => false,
            Some((lower, upper)) => {
                lower.map_or(true, |start| start <= date)
                    && upper.map_or(true, |end| date <= end)
            }
        }
    }

    /// The number of dates in the range; None when infinite.
    pub fn len(self) -> Option<u64> {
        match self {
            Self::Empty => Some(0),
            Self::Bounded(start, end) => {
                Some((end - start).num_days() as u64 + 1)
            }
            Self::Infinite | Self::UpTo(_) | Self::From(_) => None,
        }
    }

    /// The smallest range containing both operands.
    ///
    /// Fails if the operands are disjoint and not adjacent - the result
    /// would have a hole.
    pub fn union(self, other: Self) -> Result<Self> {
        let (a_lower, a_upper) = match self.bounds() {
            None => return Ok(other),
            Some(bounds) => bounds,
        };
        let (b_lower, b_upper) = match other.bounds() {
            None => return Ok(self),
            Some(bounds) => bounds,
        };

        // A hole appears when the later start lies more than one day
        // after the earlier end.
        let later_start = max_lower(a_lower, b_lower);
        let earlier_end = min_upper(a_upper, b_upper);
        if let (Some(start), Some(end)) = (later_start, earlier_end) {
            let adjacent = end
                .checked_add_days(Days::new(1))
                .map_or(true, |next| start <= next);
            if !adjacent {
                return Err(Error::NonRepresentableRange(format!(
                    "union of {self} and {other}"
                )));
            }
        }

        Ok(Self::from_bounds(
            min_lower(a_lower, b_lower),
            max_upper(a_upper, b_upper),
        ))
    }

    /// The dates contained in both operands. Always representable.
    pub fn intersection(self, other: Self) -> Self {
        match (self.bounds(), other.bounds()) {
            (Some((a_lower, a_upper)), Some((b_lower, b_upper))) => {
                let lower = max_lower(a_lower, b_lower);
                let upper = min_upper(a_upper, b_upper);
                match (lower, upper) {
                    (Some(start), Some(end)) if start > end => Self::Empty,
                    _ => Self::from_bounds(lower, upper),
                }
            }
            _ => Self::Empty,
        }
    }

    /// The dates contained in self but not in other.
    ///
    /// Fails if other splits self into two disconnected pieces.
    pub fn difference(self, other: Self) -> Result<Self> {
        let common = self.intersection(other);
        if common.is_empty() {
            return Ok(self);
        }
        if common == self {
            return Ok(Self::Empty);
        }

        let (lower, upper) = match self.bounds() {
            None => return Ok(Self::Empty),
            Some(bounds) => bounds,
        };
        let (common_lower, common_upper) = match common.bounds() {
            None => return Ok(self),
            Some(bounds) => bounds,
        };

        let cuts_lower_side = lower == common_lower;
        let cuts_upper_side = upper == common_upper;
        match (cuts_lower_side, cuts_upper_side) {
            (true, false) => {
                // The overlap starts where self starts: keep the tail.
                let next = common_upper
                    .and_then(|end| end.checked_add_days(Days::new(1)))
                    .ok_or_else(|| {
                        Error::NonRepresentableRange(format!(
                            "difference of {self} and {other}"
                        ))
                    })?;
                Ok(Self::from_bounds(Some(next), upper))
            }
            (false, true) => {
                // The overlap ends where self ends: keep the head.
                let previous = common_lower
                    .and_then(|start| start.checked_sub_days(Days::new(1)))
                    .ok_or_else(|| {
                        Error::NonRepresentableRange(format!(
                            "difference of {self} and {other}"
                        ))
                    })?;
                Ok(Self::from_bounds(lower, Some(previous)))
            }
            _ => Err(Error::NonRepresentableRange(format!(
                "difference of {self} and {other} has a hole"
            ))),
        }
    }

    pub fn is_disjoint(self, other: Self) -> bool {
        self.intersection(other).is_empty()
    }

    pub fn is_subset(self, other: Self) -> bool {
        self.intersection(other) == self
    }

    /// Iterates the dates of the range: ascending for bounded and
    /// right-unbounded ranges, descending for left-unbounded ones.
    /// The infinite range is not iterable.
    pub fn iter(self) -> Result<DateRangeIter> {
        match self {
            Self::Infinite => Err(Error::NonRepresentableRange(
                "iteration over the infinite range".to_string(),
            )),
            Self::Empty => Ok(DateRangeIter::Ascending {
                next: None,
                end: None,
            }),
            Self::UpTo(end) => Ok(DateRangeIter::Descending { next: Some(end) }),
            Self::From(start) => Ok(DateRangeIter::Ascending {
                next: Some(start),
                end: None,
            }),
            Self::Bounded(start, end) => Ok(DateRangeIter::Ascending {
                next: Some(start),
                end: Some(end),
            }),
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "no dates"),
            Self::Infinite => write!(f, "all dates"),
            Self::UpTo(end) => write!(f, "up to {end}"),
            Self::From(start) => write!(f, "from {start}"),
            Self::Bounded(start, end) => write!(f, "{start} to {end}"),
        }
    }
}

pub enum DateRangeIter {
    Ascending {
        next: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
    Descending {
        next: Option<NaiveDate>,
    },
}

impl Iterator for DateRangeIter {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        match self {
            Self::Ascending { next, end } => {
                let current = (*next)?;
                if end.is_some_and(|end| current > end) {
                    *next = None;
                    return None;
                }
                *next = current.checked_add_days(Days::new(1));
                Some(current)
            }
            Self::Descending { next } => {
                let current = (*next)?;
                *next = current.checked_sub_days(Days::new(1));
                Some(current)
            }
        }
    }
}

// Bound comparisons, with None on the lower side meaning -infinity
// and None on the upper side meaning +infinity.

fn min_lower(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (None, _) | (_, None) => None,
        (Some(a), Some(b)) => Some(a.min(b)),
    }
}

fn max_lower(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (None, x) | (x, None) => x,
        (Some(a), Some(b)) => Some(a.max(b)),
    }
}

fn min_upper(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (None, x) | (x, None) => x,
        (Some(a), Some(b)) => Some(a.min(b)),
    }
}

fn max_upper(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (None, _) | (_, None) => None,
        (Some(a), Some(b)) => Some(a.max(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 5, day).unwrap()
    }

    #[test]
    fn lengths() {
        assert_eq!(DateRange::Empty.len(), Some(0));
        assert_eq!(DateRange::Infinite.len(), None);
        assert_eq!(DateRange::From(d(1)).len(), None);
        assert_eq!(DateRange::UpTo(d(1)).len(), None);
        assert_eq!(DateRange::bounded(d(1), d(10)).len(), Some(10));
    }

    #[test]
    fn inverted_bounds_collapse_to_empty() {
        assert_eq!(DateRange::bounded(d(10), d(1)), DateRange::Empty);
    }

    #[test]
    fn containment() {
        let range = DateRange::bounded(d(2), d(9));
        assert!(!range.contains(d(1)));
        assert!(range.contains(d(2)));
        assert!(range.contains(d(9)));
        assert!(!range.contains(d(10)));
        assert!(DateRange::Infinite.contains(d(5)));
        assert!(!DateRange::Empty.contains(d(5)));
        assert!(DateRange::From(d(5)).contains(d(31)));
        assert!(!DateRange::UpTo(d(5)).contains(d(31)));
    }

    #[test]
    fn union_is_commutative() {
        let a = DateRange::bounded(d(1), d(5));
        let b = DateRange::bounded(d(3), d(10));
        assert_eq!(a.union(b).unwrap(), b.union(a).unwrap());
        assert_eq!(a.union(b).unwrap(), DateRange::bounded(d(1), d(10)));
    }

    #[test]
    fn union_of_adjacent_ranges() {
        let a = DateRange::bounded(d(1), d(5));
        let b = DateRange::bounded(d(6), d(10));
        assert_eq!(a.union(b).unwrap(), DateRange::bounded(d(1), d(10)));
    }

    #[test]
    fn union_of_disjoint_ranges_fails() {
        let a = DateRange::bounded(d(1), d(5));
        let b = DateRange::bounded(d(7), d(10));
        assert!(matches!(
            a.union(b),
            Err(Error::NonRepresentableRange(_))
        ));
    }

    #[test]
    fn union_with_empty_is_identity() {
        let a = DateRange::bounded(d(1), d(5));
        assert_eq!(a.union(DateRange::Empty).unwrap(), a);
        assert_eq!(DateRange::Empty.union(a).unwrap(), a);
    }

    #[test]
    fn intersection_distributes_over_union() {
        let a = DateRange::bounded(d(1), d(10));
        let b = DateRange::bounded(d(3), d(6));
        let c = DateRange::bounded(d(5), d(12));

        let left = a.intersection(b.union(c).unwrap());
        let right = a
            .intersection(b)
            .union(a.intersection(c))
            .unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn difference_and_intersection_partition_the_range() {
        // A \ B ∪ (A ∩ B) == A
        let a = DateRange::bounded(d(1), d(10));
        let b = DateRange::bounded(d(6), d(20));
        let reassembled = a
            .difference(b)
            .unwrap()
            .union(a.intersection(b))
            .unwrap();
        assert_eq!(reassembled, a);
    }

    #[test]
    fn difference_with_hole_fails() {
        let a = DateRange::bounded(d(1), d(10));
        let b = DateRange::bounded(d(4), d(6));
        assert!(matches!(
            a.difference(b),
            Err(Error::NonRepresentableRange(_))
        ));
    }

    #[test]
    fn difference_of_unbounded_ranges() {
        let result = DateRange::Infinite
            .difference(DateRange::UpTo(d(5)))
            .unwrap();
        assert_eq!(result, DateRange::From(d(6)));
    }

    #[test]
    fn subset_and_disjoint() {
        let a = DateRange::bounded(d(3), d(6));
        let b = DateRange::bounded(d(1), d(10));
        assert!(a.is_subset(b));
        assert!(!b.is_subset(a));
        assert!(DateRange::Empty.is_subset(a));
        assert!(a.is_disjoint(DateRange::bounded(d(11), d(12))));
        assert!(!a.is_disjoint(b));
    }

    #[test]
    fn bounded_iteration_is_ascending() {
        let dates: Vec<NaiveDate> = DateRange::bounded(d(1), d(4)).iter().unwrap().collect();
        assert_eq!(dates, vec![d(1), d(2), d(3), d(4)]);
    }

    #[test]
    fn left_unbounded_iteration_is_descending() {
        let dates: Vec<NaiveDate> = DateRange::UpTo(d(3)).iter().unwrap().take(3).collect();
        assert_eq!(dates, vec![d(3), d(2), d(1)]);
    }

    #[test]
    fn infinite_range_is_not_iterable() {
        assert!(DateRange::Infinite.iter().is_err());
    }

    #[test]
    fn empty_range_yields_nothing() {
        assert_eq!(DateRange::Empty.iter().unwrap().count(), 0);
    }
}
