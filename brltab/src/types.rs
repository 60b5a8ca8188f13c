use std::fmt::Display;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Position of an item inside a table blob.
///
/// Tables address their records by offset rather than by pointer so that a
/// blob can be moved, written out and mapped back in unchanged. Offset zero is
/// always occupied by a header, so `DataOffset::NONE` doubles as "empty".
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
#[serde(transparent)]
pub struct DataOffset(pub(crate) u32);

impl DataOffset {
    pub const NONE: Self = DataOffset(0);

    #[inline(always)]
    pub fn new(value: u32) -> Self {
        DataOffset(value)
    }

    #[inline(always)]
    pub fn get(self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// `None` for the empty offset, so chains can be walked with `?`.
    #[inline(always)]
    pub fn non_empty(self) -> Option<Self> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }

    /// Byte range `[self + start, self + start + len)`, or `None` if it does not
    /// fit inside a blob of `limit` bytes.
    #[inline]
    pub(crate) fn span(self, start: usize, len: usize, limit: usize) -> Option<std::ops::Range<usize>> {
        let begin = self.as_usize().checked_add(start)?;
        let end = begin.checked_add(len)?;
        if end > limit {
            None
        } else {
            Some(begin..end)
        }
    }
}

impl Display for DataOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl TryFrom<usize> for DataOffset {
    type Error = std::num::TryFromIntError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        u32::try_from(value).map(DataOffset)
    }
}

bitflags! {
    /// Classes a character belongs to.
    ///
    /// The low six bits are derived from Unicode properties; the remaining bits
    /// are handed out to classes defined by a contraction table.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CharacterAttributes: u32 {
        const SPACE       = 0x0000_0001;
        const LETTER      = 0x0000_0002;
        const DIGIT       = 0x0000_0004;
        const PUNCTUATION = 0x0000_0008;
        const UPPERCASE   = 0x0000_0010;
        const LOWERCASE   = 0x0000_0020;

        const _ = !0;
    }
}

impl CharacterAttributes {
    pub const BUILTIN_CLASSES: [(&'static str, CharacterAttributes); 6] = [
        ("space", CharacterAttributes::SPACE),
        ("letter", CharacterAttributes::LETTER),
        ("digit", CharacterAttributes::DIGIT),
        ("punctuation", CharacterAttributes::PUNCTUATION),
        ("uppercase", CharacterAttributes::UPPERCASE),
        ("lowercase", CharacterAttributes::LOWERCASE),
    ];

    pub const FIRST_USER_CLASS_BIT: u32 = 6;
    pub const USER_CLASS_COUNT: u32 = 32 - Self::FIRST_USER_CLASS_BIT;

    /// Attribute bit for the `index`th table-defined class.
    pub fn user_class(index: u32) -> Option<CharacterAttributes> {
        if index >= Self::USER_CLASS_COUNT {
            return None;
        }

        Some(CharacterAttributes::from_bits_retain(
            1 << (Self::FIRST_USER_CLASS_BIT + index),
        ))
    }

    #[inline(always)]
    pub fn is_word_boundary(self) -> bool {
        self.intersects(CharacterAttributes::SPACE | CharacterAttributes::PUNCTUATION)
    }
}

/// Dot bitmask of one braille cell: bit N is physical dot N+1.
pub type Dots = u8;

pub const BLANK_CELL: Dots = 0;

/// Unicode braille pattern for a cell.
#[inline]
pub fn dots_to_char(dots: Dots) -> char {
    char::from_u32(0x2800 + u32::from(dots)).unwrap_or(' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_span() {
        let offset = DataOffset::new(8);
        assert_eq!(offset.span(4, 4, 16), Some(12..16));
        assert_eq!(offset.span(4, 5, 16), None);
        assert_eq!(DataOffset::new(u32::MAX).span(usize::MAX, 1, usize::MAX), None);
    }

    #[test]
    fn user_classes() {
        assert_eq!(
            CharacterAttributes::user_class(0).map(|a| a.bits()),
            Some(0x40)
        );
        assert_eq!(
            CharacterAttributes::user_class(25).map(|a| a.bits()),
            Some(0x8000_0000)
        );
        assert!(CharacterAttributes::user_class(26).is_none());
    }

    #[test]
    fn unicode_braille() {
        assert_eq!(dots_to_char(0), '\u{2800}');
        assert_eq!(dots_to_char(0b0000_0001), '⠁');
        assert_eq!(dots_to_char(0xff), '⣿');
    }
}
