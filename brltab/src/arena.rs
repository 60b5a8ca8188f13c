//! Growable, offset-addressed region in which compiled tables are built.
use byteorder::{ByteOrder, LittleEndian};

use crate::types::DataOffset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot grow table arena by {requested} bytes")]
pub struct ArenaError {
    pub requested: usize,
}

impl From<ArenaError> for crate::error::TableError {
    fn from(e: ArenaError) -> Self {
        crate::error::TableError::OutOfMemory {
            requested: e.requested,
        }
    }
}

/// Owns the bytes of a table under construction.
///
/// Items are addressed by [`DataOffset`], never by reference, since the
/// backing buffer moves as it grows.
#[derive(Debug, Default)]
pub struct DataArena {
    bytes: Vec<u8>,
    limit: Option<usize>,
}

impl DataArena {
    pub fn with_limit(limit: Option<usize>) -> DataArena {
        DataArena {
            bytes: Vec::new(),
            limit,
        }
    }

    /// Append a zero-filled block of `size` bytes aligned to `align`.
    pub fn allocate(&mut self, size: usize, align: usize) -> Result<DataOffset, ArenaError> {
        let align = align.max(1);
        let start = match self.bytes.len() % align {
            0 => self.bytes.len(),
            rem => self.bytes.len() + (align - rem),
        };
        let end = start.checked_add(size).ok_or(ArenaError { requested: size })?;

        if self.limit.map_or(false, |limit| end > limit) {
            return Err(ArenaError { requested: size });
        }

        let offset = DataOffset::try_from(start).map_err(|_| ArenaError { requested: size })?;
        if u32::try_from(end).is_err() {
            return Err(ArenaError { requested: size });
        }

        self.bytes
            .try_reserve(end - self.bytes.len())
            .map_err(|_| ArenaError { requested: size })?;
        self.bytes.resize(end, 0);

        log::trace!("arena: allocated {} bytes at {}", size, offset);
        Ok(offset)
    }

    #[inline(always)]
    pub fn current_size(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn bytes(&self, offset: DataOffset, len: usize) -> &[u8] {
        &self.bytes[offset.as_usize()..offset.as_usize() + len]
    }

    #[inline]
    pub fn bytes_mut(&mut self, offset: DataOffset, len: usize) -> &mut [u8] {
        &mut self.bytes[offset.as_usize()..offset.as_usize() + len]
    }

    #[inline]
    pub fn read_u32(&self, offset: DataOffset, at: usize) -> u32 {
        let start = offset.as_usize() + at;
        LittleEndian::read_u32(&self.bytes[start..start + 4])
    }

    #[inline]
    pub fn write_u32(&mut self, offset: DataOffset, at: usize, value: u32) {
        let start = offset.as_usize() + at;
        LittleEndian::write_u32(&mut self.bytes[start..start + 4], value);
    }

    #[inline]
    pub fn write_u8(&mut self, offset: DataOffset, at: usize, value: u8) {
        self.bytes[offset.as_usize() + at] = value;
    }

    /// Hand the finished bytes over; the arena is gone afterwards.
    pub fn finish(self) -> Vec<u8> {
        let mut bytes = self.bytes;
        bytes.shrink_to_fit();
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_allocation() {
        let mut arena = DataArena::default();
        assert_eq!(arena.allocate(3, 1).unwrap(), DataOffset::new(0));
        assert_eq!(arena.allocate(8, 4).unwrap(), DataOffset::new(4));
        assert_eq!(arena.current_size(), 12);
        assert!(arena.bytes(DataOffset::new(4), 8).iter().all(|&b| b == 0));
    }

    #[test]
    fn relocation_keeps_offsets() {
        let mut arena = DataArena::default();
        let first = arena.allocate(4, 4).unwrap();
        arena.write_u32(first, 0, 0xdead_beef);
        for _ in 0..1000 {
            arena.allocate(64, 4).unwrap();
        }
        assert_eq!(arena.read_u32(first, 0), 0xdead_beef);
        let bytes = arena.finish();
        assert_eq!(bytes.len(), 4 + 64 * 1000);
        assert_eq!(&bytes[..4], &0xdead_beef_u32.to_le_bytes());
    }

    #[test]
    fn limit() {
        let mut arena = DataArena::with_limit(Some(16));
        arena.allocate(10, 1).unwrap();
        assert_eq!(arena.allocate(8, 4), Err(ArenaError { requested: 8 }));
        assert_eq!(arena.current_size(), 10);
    }
}
