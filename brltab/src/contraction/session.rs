//! Per-caller translation state and translation results.
use serde::{Deserialize, Serialize};

use crate::config::TableConfig;
use crate::types::{dots_to_char, Dots};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CapitalizationState {
    #[default]
    Off,
    SinglePending,
    BlockOpen,
}

impl CapitalizationState {
    pub fn to_u8(self) -> u8 {
        match self {
            CapitalizationState::Off => 0,
            CapitalizationState::SinglePending => 1,
            CapitalizationState::BlockOpen => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<CapitalizationState> {
        match value {
            0 => Some(CapitalizationState::Off),
            1 => Some(CapitalizationState::SinglePending),
            2 => Some(CapitalizationState::BlockOpen),
            _ => None,
        }
    }
}

/// State that belongs to one caller of a shared table.
///
/// Cursor and capitalization carry over between calls made for the same
/// editing context; call [`reset`](Self::reset) when the context changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationSession {
    /// Character index of the cursor in the text being translated.
    pub cursor: Option<usize>,
    pub expand_current_word: bool,
    pub capitalization: CapitalizationState,
    /// Most cells one translation may produce.
    pub capacity: usize,
}

impl TranslationSession {
    pub fn new(config: &TableConfig) -> TranslationSession {
        TranslationSession {
            cursor: None,
            expand_current_word: config.expand_current_word,
            capitalization: CapitalizationState::Off,
            capacity: config.output_capacity,
        }
    }

    pub fn set_cursor(&mut self, cursor: Option<usize>) {
        self.cursor = cursor;
    }

    pub fn reset(&mut self) {
        self.cursor = None;
        self.capitalization = CapitalizationState::Off;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranslationStatus {
    Complete,
    /// Output capacity ran out before all input was translated.
    BufferFull,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub cells: Vec<Dots>,
    /// For each cell, the index of the input character that produced it.
    pub offsets: Vec<usize>,
    /// Input characters fully translated.
    pub consumed: usize,
    pub status: TranslationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidTranslation {
    #[error("{cells} cells but {offsets} offsets")]
    Mismatch { cells: usize, offsets: usize },
    #[error("offsets decrease at cell {0}")]
    NotMonotonic(usize),
    #[error("offset {offset} outside input of {len} characters")]
    OffsetOutOfRange { offset: usize, len: usize },
    #[error("consumed {consumed} of {len} characters")]
    ConsumedOutOfRange { consumed: usize, len: usize },
}

impl Translation {
    /// Check a translation produced outside this crate and cut it down to
    /// `capacity` cells.
    pub fn validated(
        mut cells: Vec<Dots>,
        mut offsets: Vec<usize>,
        mut consumed: usize,
        input_len: usize,
        capacity: usize,
    ) -> Result<Translation, InvalidTranslation> {
        if cells.len() != offsets.len() {
            return Err(InvalidTranslation::Mismatch {
                cells: cells.len(),
                offsets: offsets.len(),
            });
        }
        if consumed > input_len {
            return Err(InvalidTranslation::ConsumedOutOfRange {
                consumed,
                len: input_len,
            });
        }
        if let Some(index) = offsets.windows(2).position(|w| w[0] > w[1]) {
            return Err(InvalidTranslation::NotMonotonic(index + 1));
        }
        if let Some(&offset) = offsets.last() {
            if offset >= input_len {
                return Err(InvalidTranslation::OffsetOutOfRange {
                    offset,
                    len: input_len,
                });
            }
        }

        if cells.len() > capacity {
            // Never keep part of the cells produced for one character.
            let cut = offsets[capacity];
            let keep = offsets.partition_point(|&offset| offset < cut);
            consumed = consumed.min(cut);
            cells.truncate(keep);
            offsets.truncate(keep);
        }

        let status = if consumed < input_len {
            TranslationStatus::BufferFull
        } else {
            TranslationStatus::Complete
        };

        Ok(Translation {
            cells,
            offsets,
            consumed,
            status,
        })
    }

    /// Cells as Unicode braille patterns.
    pub fn to_unicode(&self) -> String {
        self.cells.iter().map(|&dots| dots_to_char(dots)).collect()
    }

    /// First cell of the output produced for input character `index`.
    pub fn cell_for_text(&self, index: usize) -> Option<usize> {
        if index >= self.consumed {
            return None;
        }

        let end = self.offsets.partition_point(|&offset| offset <= index);
        match end.checked_sub(1) {
            Some(last) => {
                let start = self.offsets[last];
                Some(self.offsets.partition_point(|&offset| offset < start))
            }
            // Leading characters without cells belong to the first cell.
            None if !self.offsets.is_empty() => Some(0),
            None => None,
        }
    }

    /// Input character that produced cell `index`.
    pub fn text_for_cell(&self, index: usize) -> Option<usize> {
        self.offsets.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translation() -> Translation {
        // "the cat": `the` -> one cell, ` ` -> one, `c`,`a`,`t` -> one each
        Translation {
            cells: vec![0b101110, 0, 0b1001, 0b1, 0b11110],
            offsets: vec![0, 3, 4, 5, 6],
            consumed: 7,
            status: TranslationStatus::Complete,
        }
    }

    #[test]
    fn cursor_mapping() {
        let t = translation();
        assert_eq!(t.cell_for_text(0), Some(0));
        assert_eq!(t.cell_for_text(1), Some(0));
        assert_eq!(t.cell_for_text(2), Some(0));
        assert_eq!(t.cell_for_text(3), Some(1));
        assert_eq!(t.cell_for_text(6), Some(4));
        assert_eq!(t.cell_for_text(7), None);
        assert_eq!(t.text_for_cell(0), Some(0));
        assert_eq!(t.text_for_cell(4), Some(6));
        assert_eq!(t.text_for_cell(5), None);
        assert_eq!(t.to_unicode().chars().count(), 5);
    }

    #[test]
    fn grouped_cells_map_to_their_first() {
        let t = Translation {
            cells: vec![0b100000, 0b1, 0b11],
            offsets: vec![0, 0, 1],
            consumed: 2,
            status: TranslationStatus::Complete,
        };
        assert_eq!(t.cell_for_text(0), Some(0));
        assert_eq!(t.cell_for_text(1), Some(2));
    }

    #[test]
    fn leading_characters_without_cells() {
        // A soft hyphen replaced by nothing, then `a`.
        let t = Translation {
            cells: vec![0b1],
            offsets: vec![1],
            consumed: 2,
            status: TranslationStatus::Complete,
        };
        assert_eq!(t.cell_for_text(0), Some(0));
        assert_eq!(t.cell_for_text(1), Some(0));

        let empty = Translation {
            cells: vec![],
            offsets: vec![],
            consumed: 1,
            status: TranslationStatus::Complete,
        };
        assert_eq!(empty.cell_for_text(0), None);
    }

    #[test]
    fn validation() {
        let ok = Translation::validated(vec![1, 2, 3], vec![0, 0, 2], 3, 3, 10).unwrap();
        assert_eq!(ok.status, TranslationStatus::Complete);

        let cut = Translation::validated(vec![1, 2, 3], vec![0, 1, 2], 3, 3, 2).unwrap();
        assert_eq!(cut.cells, vec![1, 2]);
        assert_eq!(cut.consumed, 2);
        assert_eq!(cut.status, TranslationStatus::BufferFull);

        // Two cells for the first character do not fit in one.
        let split = Translation::validated(vec![0x20, 1, 3], vec![0, 0, 1], 2, 2, 1).unwrap();
        assert!(split.cells.is_empty());
        assert!(split.offsets.is_empty());
        assert_eq!(split.consumed, 0);
        assert_eq!(split.status, TranslationStatus::BufferFull);

        let split = Translation::validated(vec![1, 2, 3, 4], vec![0, 1, 1, 2], 3, 3, 2).unwrap();
        assert_eq!(split.cells, vec![1]);
        assert_eq!(split.consumed, 1);
        assert_eq!(split.cell_for_text(0), Some(0));
        assert_eq!(split.cell_for_text(1), None);

        let partial = Translation::validated(vec![1], vec![0], 1, 4, 10).unwrap();
        assert_eq!(partial.status, TranslationStatus::BufferFull);

        assert_eq!(
            Translation::validated(vec![1, 2], vec![0], 1, 1, 10),
            Err(InvalidTranslation::Mismatch { cells: 2, offsets: 1 })
        );
        assert_eq!(
            Translation::validated(vec![1, 2], vec![1, 0], 2, 2, 10),
            Err(InvalidTranslation::NotMonotonic(1))
        );
        assert_eq!(
            Translation::validated(vec![1], vec![5], 1, 2, 10),
            Err(InvalidTranslation::OffsetOutOfRange { offset: 5, len: 2 })
        );
        assert_eq!(
            Translation::validated(vec![], vec![], 3, 2, 10),
            Err(InvalidTranslation::ConsumedOutOfRange { consumed: 3, len: 2 })
        );
    }

    #[test]
    fn session_defaults() {
        let mut config = TableConfig::default();
        config.expand_current_word = true;
        config.output_capacity = 80;

        let mut session = TranslationSession::new(&config);
        assert!(session.expand_current_word);
        assert_eq!(session.capacity, 80);

        session.set_cursor(Some(3));
        session.capitalization = CapitalizationState::BlockOpen;
        session.reset();
        assert_eq!(session.cursor, None);
        assert_eq!(session.capitalization, CapitalizationState::Off);

        for state in [
            CapitalizationState::Off,
            CapitalizationState::SinglePending,
            CapitalizationState::BlockOpen,
        ] {
            assert_eq!(CapitalizationState::from_u8(state.to_u8()), Some(state));
        }
        assert_eq!(CapitalizationState::from_u8(3), None);
    }
}
