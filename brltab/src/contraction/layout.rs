//! Binary layout of a compiled contraction table.
//!
//! One little-endian blob, every item 4-byte aligned and addressed by its
//! offset from the start of the blob:
//!
//! ```text
//! header      magic "BCTB", version,
//!             5 sign rule offsets, character table offset + count,
//!             HASH_SIZE bucket offsets
//! characters  sorted entries: value, upper, lower, attributes, always rule
//! rules       next, after, before, opcode, find length, replacement length,
//!             then find + replacement units
//! ```
//!
//! Offset zero is the header, so a zero offset means "none".
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;
use serde::Serialize;

use crate::constants::{
    CHARACTER_ENTRY_SIZE, CONTRACTION_MAGIC, CONTRACTION_VERSION, DATA_ALIGNMENT, HEADER_SIZE,
    OFFSET_SIZE, RULE_HEADER_SIZE, RULE_UNIT_SIZE, SIGN_COUNT,
};
use crate::error::TableError;
use crate::types::{CharacterAttributes, DataOffset, Dots};
use crate::vfs::{File, Filesystem};

use super::opcode::Opcode;

pub use crate::constants::HASH_SIZE;

pub(crate) const VERSION_AT: usize = 4;
pub(crate) const SIGNS_AT: usize = 8;
pub(crate) const CHARACTERS_AT: usize = SIGNS_AT + SIGN_COUNT * OFFSET_SIZE;
pub(crate) const CHARACTER_COUNT_AT: usize = CHARACTERS_AT + OFFSET_SIZE;
pub(crate) const BUCKETS_AT: usize = CHARACTER_COUNT_AT + 4;

pub(crate) const ENTRY_VALUE: usize = 0;
pub(crate) const ENTRY_UPPER: usize = 4;
pub(crate) const ENTRY_LOWER: usize = 8;
pub(crate) const ENTRY_ATTRIBUTES: usize = 12;
pub(crate) const ENTRY_ALWAYS: usize = 16;

pub(crate) const RULE_NEXT: usize = 0;
pub(crate) const RULE_AFTER: usize = 4;
pub(crate) const RULE_BEFORE: usize = 8;
pub(crate) const RULE_OPCODE: usize = 12;
pub(crate) const RULE_FIND_LEN: usize = 13;
pub(crate) const RULE_REPLACE_LEN: usize = 14;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("expected {expected} bytes, found {actual}")]
    WrongSize { expected: usize, actual: usize },
    #[error("truncated table: {actual} bytes, header needs {needed}")]
    Truncated { needed: usize, actual: usize },
    #[error("bad magic number")]
    BadMagic,
    #[error("unsupported table version {0}")]
    UnsupportedVersion(u32),
    #[error("{what} at {offset} lies outside the table")]
    OutOfBounds { what: &'static str, offset: DataOffset },
    #[error("misaligned {what} at {offset}")]
    Misaligned { what: &'static str, offset: DataOffset },
    #[error("invalid opcode {value} in rule at {offset}")]
    InvalidOpcode { offset: DataOffset, value: u8 },
    #[error("invalid character {value:#x} at {offset}")]
    InvalidCharacter { offset: DataOffset, value: u32 },
    #[error("character table is not sorted at entry {0}")]
    UnsortedCharacters(usize),
    #[error("rule chain of bucket {0} does not terminate")]
    UnterminatedChain(usize),
}

/// Bucket of a two-character key. Single-character rules use `'\0'` as
/// the second character.
#[inline]
pub fn hash(first: char, second: char) -> usize {
    let key = ((first as u32) << 8) + second as u32;
    key as usize % HASH_SIZE
}

#[inline(always)]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    bytes
        .get(at..at + 4)
        .map(LittleEndian::read_u32)
        .unwrap_or(0)
}

#[inline(always)]
fn read_u8(bytes: &[u8], at: usize) -> u8 {
    bytes.get(at).copied().unwrap_or(0)
}

#[inline(always)]
fn read_char(bytes: &[u8], at: usize) -> char {
    char::from_u32(read_u32(bytes, at)).unwrap_or(char::REPLACEMENT_CHARACTER)
}

/// Storage of a table blob: built in memory, or mapped from a file.
#[derive(Debug, Clone)]
pub enum TableBytes {
    Owned(Vec<u8>),
    Mapped(Arc<Mmap>),
}

impl Deref for TableBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            TableBytes::Owned(v) => v,
            TableBytes::Mapped(map) => &map[..],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterEntry {
    pub value: char,
    pub upper: char,
    pub lower: char,
    pub attributes: CharacterAttributes,
    /// First unconstrained `always` rule for this character.
    pub always: DataOffset,
}

impl CharacterEntry {
    fn read(bytes: &[u8], at: usize) -> CharacterEntry {
        CharacterEntry {
            value: read_char(bytes, at + ENTRY_VALUE),
            upper: read_char(bytes, at + ENTRY_UPPER),
            lower: read_char(bytes, at + ENTRY_LOWER),
            attributes: CharacterAttributes::from_bits_retain(read_u32(bytes, at + ENTRY_ATTRIBUTES)),
            always: DataOffset(read_u32(bytes, at + ENTRY_ALWAYS)),
        }
    }
}

/// A rule record inside a table blob.
#[derive(Clone, Copy)]
pub struct RuleRef<'a> {
    bytes: &'a [u8],
    offset: DataOffset,
}

impl<'a> RuleRef<'a> {
    #[inline(always)]
    fn field(&self, at: usize) -> u32 {
        read_u32(self.bytes, self.offset.as_usize() + at)
    }

    #[inline(always)]
    fn byte(&self, at: usize) -> u8 {
        read_u8(self.bytes, self.offset.as_usize() + at)
    }

    #[inline(always)]
    fn unit(&self, index: usize) -> u32 {
        self.field(RULE_HEADER_SIZE + index * RULE_UNIT_SIZE)
    }

    #[inline(always)]
    pub fn offset(&self) -> DataOffset {
        self.offset
    }

    #[inline(always)]
    pub fn next(&self) -> DataOffset {
        DataOffset(self.field(RULE_NEXT))
    }

    /// Classes the character before a match must belong to; empty for any.
    #[inline(always)]
    pub fn after(&self) -> CharacterAttributes {
        CharacterAttributes::from_bits_retain(self.field(RULE_AFTER))
    }

    /// Classes the character after a match must belong to; empty for any.
    #[inline(always)]
    pub fn before(&self) -> CharacterAttributes {
        CharacterAttributes::from_bits_retain(self.field(RULE_BEFORE))
    }

    #[inline(always)]
    pub fn opcode(&self) -> Opcode {
        Opcode::from_u8(self.byte(RULE_OPCODE)).unwrap_or(Opcode::Class)
    }

    #[inline(always)]
    pub fn find_len(&self) -> usize {
        self.byte(RULE_FIND_LEN) as usize
    }

    #[inline(always)]
    pub fn replacement_len(&self) -> usize {
        self.byte(RULE_REPLACE_LEN) as usize
    }

    /// `index`th character of the find text, lowercase.
    #[inline(always)]
    pub fn find_char(&self, index: usize) -> char {
        char::from_u32(self.unit(index)).unwrap_or(char::REPLACEMENT_CHARACTER)
    }

    pub fn find(&self) -> impl Iterator<Item = char> + 'a {
        let rule = *self;
        (0..rule.find_len()).map(move |i| rule.find_char(i))
    }

    /// Output cells of a dot rule or indicator sign.
    pub fn cells(&self) -> impl Iterator<Item = Dots> + 'a {
        let rule = *self;
        let start = rule.find_len();
        (start..start + rule.replacement_len()).map(move |i| rule.unit(i) as Dots)
    }

    /// Replacement text of a `replace` rule.
    pub fn replacement(&self) -> impl Iterator<Item = char> + 'a {
        let rule = *self;
        let start = rule.find_len();
        (start..start + rule.replacement_len())
            .map(move |i| char::from_u32(rule.unit(i)).unwrap_or(char::REPLACEMENT_CHARACTER))
    }
}

impl std::fmt::Debug for RuleRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRef")
            .field("offset", &self.offset)
            .field("opcode", &self.opcode())
            .field("find", &self.find().collect::<String>())
            .finish()
    }
}

/// Rules of one hash bucket, in priority order.
pub struct Chain<'a> {
    bytes: &'a [u8],
    next: DataOffset,
}

impl<'a> Iterator for Chain<'a> {
    type Item = RuleRef<'a>;

    fn next(&mut self) -> Option<RuleRef<'a>> {
        let offset = self.next.non_empty()?;
        let rule = RuleRef {
            bytes: self.bytes,
            offset,
        };
        self.next = rule.next();
        Some(rule)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableStats {
    pub size: usize,
    pub characters: usize,
    pub rules: usize,
    pub used_buckets: usize,
    pub longest_chain: usize,
    pub signs: Vec<&'static str>,
}

/// A validated contraction table blob.
#[derive(Debug)]
pub struct NativeTable {
    bytes: TableBytes,
    characters: usize,
    character_count: usize,
}

impl NativeTable {
    pub fn from_bytes(bytes: TableBytes) -> Result<NativeTable, LayoutError> {
        let (characters, character_count) = validate(&bytes)?;
        Ok(NativeTable {
            bytes,
            characters,
            character_count,
        })
    }

    /// Map a persisted table.
    pub fn open<FS: Filesystem>(fs: &FS, path: &Path) -> Result<NativeTable, TableError> {
        let file = fs.open_file(path).map_err(|e| TableError::load(path, e))?;
        let len = file.len().map_err(|e| TableError::load(path, e))? as usize;
        if len < HEADER_SIZE {
            return Err(LayoutError::Truncated {
                needed: HEADER_SIZE,
                actual: len,
            }
            .into());
        }

        let map = unsafe { file.memory_map() }.map_err(|e| TableError::load(path, e))?;
        let table = NativeTable::from_bytes(TableBytes::Mapped(Arc::new(map)))?;
        log::debug!("mapped contraction table {} ({} bytes)", path.display(), len);
        Ok(table)
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn write_to<W: std::io::Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_all(self.as_bytes())
    }

    #[inline]
    fn rule(&self, offset: DataOffset) -> Option<RuleRef<'_>> {
        offset.non_empty().map(|offset| RuleRef {
            bytes: &self.bytes,
            offset,
        })
    }

    /// The rule of an indicator sign, if the table defines one.
    pub fn sign(&self, opcode: Opcode) -> Option<RuleRef<'_>> {
        let index = opcode.sign_index()?;
        self.rule(DataOffset(read_u32(&self.bytes, SIGNS_AT + index * OFFSET_SIZE)))
    }

    pub fn chain(&self, bucket: usize) -> Chain<'_> {
        let next = if bucket < HASH_SIZE {
            DataOffset(read_u32(&self.bytes, BUCKETS_AT + bucket * OFFSET_SIZE))
        } else {
            DataOffset::NONE
        };

        Chain {
            bytes: &self.bytes,
            next,
        }
    }

    /// Every rule that can match text, bucket by bucket.
    pub fn rules(&self) -> impl Iterator<Item = RuleRef<'_>> {
        (0..HASH_SIZE).flat_map(move |bucket| self.chain(bucket))
    }

    #[inline(always)]
    pub fn character_count(&self) -> usize {
        self.character_count
    }

    fn entry(&self, index: usize) -> CharacterEntry {
        CharacterEntry::read(&self.bytes, self.characters + index * CHARACTER_ENTRY_SIZE)
    }

    pub fn characters(&self) -> impl Iterator<Item = CharacterEntry> + '_ {
        (0..self.character_count).map(move |i| self.entry(i))
    }

    pub fn character(&self, ch: char) -> Option<CharacterEntry> {
        let (mut low, mut high) = (0, self.character_count);
        while low < high {
            let mid = low + (high - low) / 2;
            let entry = self.entry(mid);
            match entry.value.cmp(&ch) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Some(entry),
            }
        }
        None
    }

    pub fn always(&self, entry: &CharacterEntry) -> Option<RuleRef<'_>> {
        self.rule(entry.always)
    }

    pub fn stats(&self) -> TableStats {
        let chains = (0..HASH_SIZE).map(|b| self.chain(b).count());
        let (rules, used_buckets, longest_chain) =
            chains.fold((0, 0, 0), |(rules, used, longest), len| {
                (rules + len, used + (len > 0) as usize, longest.max(len))
            });

        TableStats {
            size: self.size(),
            characters: self.character_count,
            rules,
            used_buckets,
            longest_chain,
            signs: Opcode::SIGNS
                .iter()
                .filter(|&&sign| self.sign(sign).is_some())
                .map(|sign| sign.keyword())
                .collect(),
        }
    }
}

fn check_rule(bytes: &[u8], offset: DataOffset) -> Result<(), LayoutError> {
    if offset.as_usize() < HEADER_SIZE {
        return Err(LayoutError::OutOfBounds {
            what: "rule",
            offset,
        });
    }
    if offset.as_usize() % DATA_ALIGNMENT != 0 {
        return Err(LayoutError::Misaligned {
            what: "rule",
            offset,
        });
    }
    offset
        .span(0, RULE_HEADER_SIZE, bytes.len())
        .ok_or(LayoutError::OutOfBounds {
            what: "rule",
            offset,
        })?;

    let rule = RuleRef { bytes, offset };
    let value = rule.byte(RULE_OPCODE);
    let opcode = Opcode::from_u8(value).ok_or(LayoutError::InvalidOpcode { offset, value })?;

    let units = rule.find_len() + rule.replacement_len();
    offset
        .span(RULE_HEADER_SIZE, units * RULE_UNIT_SIZE, bytes.len())
        .ok_or(LayoutError::OutOfBounds {
            what: "rule text",
            offset,
        })?;

    let text_units = if opcode == Opcode::Replace {
        units
    } else {
        rule.find_len()
    };
    for i in 0..text_units {
        let value = rule.unit(i);
        if char::from_u32(value).is_none() {
            return Err(LayoutError::InvalidCharacter { offset, value });
        }
    }

    Ok(())
}

/// Check everything the engine will touch. Returns the character table
/// position and entry count.
fn validate(bytes: &[u8]) -> Result<(usize, usize), LayoutError> {
    if bytes.len() < HEADER_SIZE {
        return Err(LayoutError::Truncated {
            needed: HEADER_SIZE,
            actual: bytes.len(),
        });
    }
    if bytes[..CONTRACTION_MAGIC.len()] != CONTRACTION_MAGIC {
        return Err(LayoutError::BadMagic);
    }
    let version = read_u32(bytes, VERSION_AT);
    if version != CONTRACTION_VERSION {
        return Err(LayoutError::UnsupportedVersion(version));
    }

    for index in 0..SIGN_COUNT {
        let offset = DataOffset(read_u32(bytes, SIGNS_AT + index * OFFSET_SIZE));
        if let Some(offset) = offset.non_empty() {
            check_rule(bytes, offset)?;
        }
    }

    let characters = DataOffset(read_u32(bytes, CHARACTERS_AT));
    let count = read_u32(bytes, CHARACTER_COUNT_AT) as usize;
    let span = count
        .checked_mul(CHARACTER_ENTRY_SIZE)
        .and_then(|len| characters.span(0, len, bytes.len()))
        .ok_or(LayoutError::OutOfBounds {
            what: "character table",
            offset: characters,
        })?;
    if count > 0 && (span.start < HEADER_SIZE || span.start % DATA_ALIGNMENT != 0) {
        return Err(LayoutError::Misaligned {
            what: "character table",
            offset: characters,
        });
    }

    let mut previous: Option<u32> = None;
    for index in 0..count {
        let at = span.start + index * CHARACTER_ENTRY_SIZE;
        for field in [ENTRY_VALUE, ENTRY_UPPER, ENTRY_LOWER] {
            let value = read_u32(bytes, at + field);
            if char::from_u32(value).is_none() {
                return Err(LayoutError::InvalidCharacter {
                    offset: DataOffset(at as u32),
                    value,
                });
            }
        }

        let value = read_u32(bytes, at + ENTRY_VALUE);
        if previous.map_or(false, |p| p >= value) {
            return Err(LayoutError::UnsortedCharacters(index));
        }
        previous = Some(value);

        if let Some(always) = DataOffset(read_u32(bytes, at + ENTRY_ALWAYS)).non_empty() {
            check_rule(bytes, always)?;
        }
    }

    let max_steps = bytes.len() / RULE_HEADER_SIZE;
    for bucket in 0..HASH_SIZE {
        let mut next = DataOffset(read_u32(bytes, BUCKETS_AT + bucket * OFFSET_SIZE));
        let mut steps = 0;
        while let Some(offset) = next.non_empty() {
            if steps >= max_steps {
                return Err(LayoutError::UnterminatedChain(bucket));
            }
            check_rule(bytes, offset)?;
            next = RuleRef { bytes, offset }.next();
            steps += 1;
        }
    }

    Ok((span.start, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contraction::compile::compile_source;

    fn table() -> NativeTable {
        compile_source(
            "capsign 6\n\
             always a 1\n\
             always b 12\n\
             always ab 1-12\n\
             word the 2346\n",
        )
        .table
    }

    #[test]
    fn hash_values() {
        assert_eq!(hash('a', 'b'), ((97 << 8) + 98) % 1087);
        assert_eq!(hash('a', '\0'), (97 << 8) % 1087);
        assert!(hash('\u{10ffff}', '\u{10ffff}') < HASH_SIZE);
    }

    #[test]
    fn lookups() {
        let table = table();

        let a = table.character('a').unwrap();
        assert_eq!(a.upper, 'A');
        assert!(a.attributes.contains(CharacterAttributes::LETTER));
        let always = table.always(&a).unwrap();
        assert_eq!(always.opcode(), Opcode::Always);
        assert_eq!(always.cells().collect::<Vec<_>>(), vec![0b1]);

        let upper = table.character('A').unwrap();
        assert_eq!(upper.always, a.always);
        assert!(table.character('z').is_none());

        let sign = table.sign(Opcode::CapitalSign).unwrap();
        assert_eq!(sign.cells().collect::<Vec<_>>(), vec![0b10_0000]);
        assert!(table.sign(Opcode::NumberSign).is_none());

        let the: Vec<_> = table
            .chain(hash('t', 'h'))
            .filter(|r| r.find().eq("the".chars()))
            .collect();
        assert_eq!(the.len(), 1);
        assert_eq!(the[0].opcode(), Opcode::WholeWord);
    }

    #[test]
    fn stats() {
        let stats = table().stats();
        assert_eq!(stats.rules, 4);
        assert_eq!(stats.characters, 10);
        assert_eq!(stats.signs, vec!["capsign"]);
        assert!(stats.used_buckets >= 3);
    }

    #[test]
    fn rejects_damaged_blobs() {
        let bytes = table().as_bytes().to_vec();

        assert!(matches!(
            NativeTable::from_bytes(TableBytes::Owned(bytes[..100].to_vec())),
            Err(LayoutError::Truncated { .. })
        ));

        let mut bad = bytes.clone();
        bad[0] = b'X';
        assert_eq!(
            NativeTable::from_bytes(TableBytes::Owned(bad)).unwrap_err(),
            LayoutError::BadMagic
        );

        let mut bad = bytes.clone();
        bad[VERSION_AT] = 9;
        assert_eq!(
            NativeTable::from_bytes(TableBytes::Owned(bad)).unwrap_err(),
            LayoutError::UnsupportedVersion(9)
        );

        let mut bad = bytes.clone();
        let bucket = BUCKETS_AT + hash('a', '\0') * OFFSET_SIZE;
        LittleEndian::write_u32(&mut bad[bucket..bucket + 4], bytes.len() as u32 + 64);
        assert!(matches!(
            NativeTable::from_bytes(TableBytes::Owned(bad)),
            Err(LayoutError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn rejects_cyclic_chain() {
        let table = table();
        let mut bytes = table.as_bytes().to_vec();
        let rule = table.chain(hash('a', '\0')).next().unwrap().offset();
        let at = rule.as_usize() + RULE_NEXT;
        LittleEndian::write_u32(&mut bytes[at..at + 4], rule.get());

        assert_eq!(
            NativeTable::from_bytes(TableBytes::Owned(bytes)).unwrap_err(),
            LayoutError::UnterminatedChain(hash('a', '\0'))
        );
    }

    #[test]
    fn persisted_table_maps_back() {
        let table = table();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.bctb");
        let mut file = std::fs::File::create(&path).unwrap();
        table.write_to(&mut file).unwrap();
        drop(file);

        let mapped = NativeTable::open(&crate::vfs::Fs, &path).unwrap();
        assert_eq!(mapped.as_bytes(), table.as_bytes());
        assert!(matches!(mapped.bytes, TableBytes::Mapped(_)));
        assert_eq!(mapped.character('b'), table.character('b'));
    }
}
