//! Insertion-point arithmetic.
//!
//! Every renderer (build time or view time) must place a CTA with this one
//! function so the two can never disagree.
//!
//! ```text
//! elements:   [e0] [e1] [e2] [e3] [e4]
//! index:     0    1    2    3    4    5 (append)
//!
//! forward, position 3  -> target 3 -> before e3 (after the 3rd element)
//! reverse, position 1  -> target 4 -> before e4 (between e3 and the last)
//! reverse, position 9  -> target -4 -> clamped to 0 -> before e0
//! forward, position 9  -> target 9 > 5 -> overflow policy
//! ```
//!
//! Reverse placement counts `position` elements back from the end and inserts
//! *before* that element, so `reverse/1` lands in front of the last element
//! rather than after it.
//!
//! Positions are 1-based. A zero, whether stored on a record or read from a
//! payload, is treated as 1.

use crate::model::{Direction, OverflowPolicy};

/// Where to put the CTA relative to the countable block elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Insert immediately before the element at this index.
    Before(usize),
    /// Append after the last element.
    Append,
    /// Do not insert.
    Skip,
}

impl Placement {
    pub fn is_skip(self) -> bool {
        self == Placement::Skip
    }

    /// Index in the element sequence the CTA will occupy, `None` when skipped.
    pub fn index(self, element_count: usize) -> Option<usize> {
        match self {
            Placement::Before(idx) => Some(idx),
            Placement::Append => Some(element_count),
            Placement::Skip => None,
        }
    }
}

/// Compute where a CTA goes among `element_count` block elements.
pub fn compute(element_count: usize, direction: Direction, position: u32, overflow: OverflowPolicy) -> Placement {
    if element_count == 0 {
        return Placement::Skip;
    }

    let count = i64::try_from(element_count).unwrap_or(i64::MAX);
    let position = i64::from(position.max(1));
    let mut target = match direction {
        Direction::Forward => position,
        Direction::Reverse => count - position,
    };

    if target > count {
        match overflow {
            OverflowPolicy::ClampToEnd => target = count,
            OverflowPolicy::Skip => return Placement::Skip,
        }
    }
    if target < 0 {
        target = 0;
    }

    if target < count { Placement::Before(target as usize) } else { Placement::Append }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Direction::{Forward, Reverse};
    use OverflowPolicy::{ClampToEnd, Skip};

    #[test]
    fn forward_inside_content() {
        let p = compute(5, Forward, 3, Skip);
        assert_eq!(p, Placement::Before(3));
        assert_eq!(p.index(5), Some(3));
    }

    #[test]
    fn forward_overflow() {
        assert_eq!(compute(3, Forward, 10, Skip), Placement::Skip);
        let clamped = compute(3, Forward, 10, ClampToEnd);
        assert_eq!(clamped, Placement::Append);
        assert_eq!(clamped.index(3), Some(3));
    }

    #[test]
    fn exactly_at_end_appends_without_overflow() {
        assert_eq!(compute(3, Forward, 3, Skip), Placement::Append);
    }

    #[test]
    fn empty_content_always_skips() {
        for dir in [Forward, Reverse] {
            for policy in [Skip, ClampToEnd] {
                for pos in [0, 1, 5, u32::MAX] {
                    assert_eq!(compute(0, dir, pos, policy), Placement::Skip, "{dir:?} {pos} {policy:?}");
                }
            }
        }
    }

    #[test]
    fn reverse_counts_back_from_end() {
        assert_eq!(compute(5, Reverse, 1, Skip), Placement::Before(4));
        assert_eq!(compute(5, Reverse, 2, Skip), Placement::Before(3));
        assert_eq!(compute(5, Reverse, 5, Skip), Placement::Before(0));
    }

    #[test]
    fn reverse_past_start_clamps_to_front() {
        assert_eq!(compute(3, Reverse, 10, Skip), Placement::Before(0));
        assert_eq!(compute(3, Reverse, 10, ClampToEnd), Placement::Before(0));
    }

    #[test]
    fn zero_position_reads_as_one() {
        for dir in [Forward, Reverse] {
            for policy in [Skip, ClampToEnd] {
                assert_eq!(compute(4, dir, 0, policy), compute(4, dir, 1, policy), "{dir:?} {policy:?}");
            }
        }
        assert_eq!(compute(4, Forward, 0, Skip), Placement::Before(1));
        assert_eq!(compute(4, Reverse, 0, Skip), Placement::Before(3));
    }

    #[test]
    fn huge_positions_do_not_overflow_arithmetic() {
        assert_eq!(compute(usize::MAX >> 8, Forward, u32::MAX, ClampToEnd), Placement::Before(u32::MAX as usize));
        assert_eq!(compute(2, Reverse, u32::MAX, Skip), Placement::Before(0));
    }
}
