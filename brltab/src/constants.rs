/// Number of hash buckets in a contraction table header.
pub const HASH_SIZE: usize = 1087;

/// Every possible value of the live attribute bitmask has an entry.
pub const ATTRIBUTE_TABLE_SIZE: usize = 256;

/// Physical dot positions in a braille cell.
pub const DOT_COUNT: usize = 8;

pub const CONTRACTION_MAGIC: [u8; 4] = *b"BCTB";
pub const CONTRACTION_VERSION: u32 = 1;

/// Sign offsets in header order: capital, begin-capital, end-capital,
/// english-letter, number.
pub const SIGN_COUNT: usize = 5;

pub const OFFSET_SIZE: usize = 4;

pub const HEADER_SIZE: usize =
    CONTRACTION_MAGIC.len() + 4 + SIGN_COUNT * OFFSET_SIZE + 2 * 4 + HASH_SIZE * OFFSET_SIZE;

pub const CHARACTER_ENTRY_SIZE: usize = 20;

pub const RULE_HEADER_SIZE: usize = 3 * 4 + 4;

pub const RULE_UNIT_SIZE: usize = 4;

pub const MAX_FIND_LENGTH: usize = u8::MAX as usize;
pub const MAX_REPLACE_LENGTH: usize = u8::MAX as usize;

pub const DATA_ALIGNMENT: usize = 4;

pub const MAX_INCLUDE_DEPTH: usize = 16;

pub const DEFAULT_TABLES_DIRECTORY: &str = "/etc/brltty";
pub const DEFAULT_OUTPUT_CAPACITY: usize = 0x1000;

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn test_HEADER_SIZE() {
        assert_eq!(HEADER_SIZE, 4384);
        assert_eq!(HEADER_SIZE % DATA_ALIGNMENT, 0);
    }

    #[test]
    fn test_CHARACTER_ENTRY_SIZE() {
        use std::mem;

        let c = mem::size_of::<u32>() * 3
            + mem::size_of::<crate::types::CharacterAttributes>()
            + mem::size_of::<crate::types::DataOffset>();

        assert_eq!(CHARACTER_ENTRY_SIZE, c);
    }

    #[test]
    fn test_RULE_HEADER_SIZE() {
        assert_eq!(RULE_HEADER_SIZE % DATA_ALIGNMENT, 0);
        assert_eq!(RULE_UNIT_SIZE % DATA_ALIGNMENT, 0);
    }
}
