// This module implements the label-space partitioning shared by both block assemblers. Given a
// method-specific max_label, labels in [0, max) belong to original blocks, [max, 2*max) to
// synthesized continuation blocks and [2*max, 2*max+7) to the reserved special blocks.
// Special blocks are addressed by small negative constants whose bitwise complement is added
// to the special floor, so a raw negative constant can never be mistaken for a real label.
// Continuation labels are found by scanning the labels already in use at or above the
// continuation floor and advancing past the largest one; free labels for SSA-only blocks are
// found the same way above the special range.

//! Label-space partitioning.

use crate::core::error::{CompileError, CompileResult};
use std::ops::Range;

/// Number of labels reserved for special blocks.
pub const SPECIAL_LABEL_COUNT: u32 = 7;

/// Reserved blocks addressed through [`LabelSpace::special`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialLabel {
    /// Moves incoming arguments into their registers.
    ParamAssignment,
    /// Exit block of SSA graphs.
    Return,
    /// Entry block ahead of the parameter block in SSA graphs.
    SsaInit,
}

impl SpecialLabel {
    pub fn constant(self) -> i32 {
        match self {
            SpecialLabel::ParamAssignment => -1,
            SpecialLabel::Return => -2,
            SpecialLabel::SsaInit => -3,
        }
    }
}

/// Partition of labels around a method's `max_label`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelSpace {
    max_label: u32,
}

impl LabelSpace {
    pub fn new(max_label: u32) -> Self {
        Self { max_label }
    }

    pub fn max_label(&self) -> u32 {
        self.max_label
    }

    pub fn original_range(&self) -> Range<u32> {
        0..self.max_label
    }

    pub fn extra_range(&self) -> Range<u32> {
        self.max_label..self.max_label * 2
    }

    pub fn special_range(&self) -> Range<u32> {
        self.max_label * 2..self.max_label * 2 + SPECIAL_LABEL_COUNT
    }

    /// Lowest label handed out by [`available`](Self::available).
    pub fn available_floor(&self) -> u32 {
        self.special_range().end
    }

    pub fn special(&self, label: SpecialLabel) -> u32 {
        self.max_label * 2 + !label.constant() as u32
    }

    /// Map a raw reserved constant into the special range.
    pub fn special_from_constant(&self, constant: i32) -> CompileResult<u32> {
        if constant >= 0 || (!constant as u32) >= SPECIAL_LABEL_COUNT {
            return Err(CompileError::InvalidSpecialLabel(constant));
        }
        Ok(self.max_label * 2 + !constant as u32)
    }

    /// Next continuation label above every continuation label in `used`.
    pub fn next_extra(&self, used: impl IntoIterator<Item = u32>) -> CompileResult<u32> {
        let range = self.extra_range();
        let next = used
            .into_iter()
            .filter(|label| range.contains(label))
            .max()
            .map_or(range.start, |highest| highest + 1);
        if next >= range.end {
            return Err(CompileError::LabelSpaceExhausted {
                floor: range.start,
                ceiling: range.end,
            });
        }
        Ok(next)
    }

    /// Unused label above the special range.
    pub fn available(&self, used: impl IntoIterator<Item = u32>) -> u32 {
        let floor = self.available_floor();
        used.into_iter()
            .filter(|label| *label >= floor)
            .max()
            .map_or(floor, |highest| highest + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_labels_land_in_reserved_range() {
        let space = LabelSpace::new(5);
        assert_eq!(space.special(SpecialLabel::ParamAssignment), 10);
        assert_eq!(space.special(SpecialLabel::Return), 11);
        assert_eq!(space.special(SpecialLabel::SsaInit), 12);
        for label in [
            SpecialLabel::ParamAssignment,
            SpecialLabel::Return,
            SpecialLabel::SsaInit,
        ] {
            assert!(space.special_range().contains(&space.special(label)));
        }
    }

    #[test]
    fn test_raw_constants_are_validated() {
        let space = LabelSpace::new(5);
        assert_eq!(space.special_from_constant(-2), Ok(11));
        assert_eq!(
            space.special_from_constant(3),
            Err(CompileError::InvalidSpecialLabel(3))
        );
        assert_eq!(
            space.special_from_constant(-8),
            Err(CompileError::InvalidSpecialLabel(-8))
        );
    }

    #[test]
    fn test_next_extra_skips_used_labels() {
        let space = LabelSpace::new(4);
        assert_eq!(space.next_extra([0, 1, 2, 3]), Ok(4));
        assert_eq!(space.next_extra([1, 4, 6, 9]), Ok(7));
        assert_eq!(
            space.next_extra([7]),
            Err(CompileError::LabelSpaceExhausted { floor: 4, ceiling: 8 })
        );
    }

    #[test]
    fn test_available_starts_above_specials() {
        let space = LabelSpace::new(3);
        assert_eq!(space.available([0, 1, 6]), 13);
        assert_eq!(space.available([14, 13]), 15);
    }
}
