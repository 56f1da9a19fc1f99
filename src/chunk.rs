//! Chunk directory: the 22 known tag types plus a byte-range view of one chunk's payload.

use crate::error::LoadError;

/// The set of chunk tags the loader recognizes, per the object-file layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    Aray,
    Aini,
    Aimp,
    Astr,
    Mstr,
    Load,
    Func,
    Fnam,
    Mini,
    Mimp,
    Mexp,
    Sptr,
    Sflg,
    Svct,
    Strl,
    Stre,
    Jump,
    Alib,
    Sary,
    Fary,
    Atag,
    Snam,
    Unknown,
}

impl ChunkType {
    /// Case-insensitive tag lookup, uppercased to canonical before matching — as the reference's
    /// `get_chunk_type` does.
    pub fn from_tag(tag: &[u8; 4]) -> Self {
        let upper: Vec<u8> = tag.iter().map(u8::to_ascii_uppercase).collect();
        match upper.as_slice() {
            b"ARAY" => ChunkType::Aray,
            b"AINI" => ChunkType::Aini,
            b"AIMP" => ChunkType::Aimp,
            b"ASTR" => ChunkType::Astr,
            b"MSTR" => ChunkType::Mstr,
            b"LOAD" => ChunkType::Load,
            b"FUNC" => ChunkType::Func,
            b"FNAM" => ChunkType::Fnam,
            b"MINI" => ChunkType::Mini,
            b"MIMP" => ChunkType::Mimp,
            b"MEXP" => ChunkType::Mexp,
            b"SPTR" => ChunkType::Sptr,
            b"SFLG" => ChunkType::Sflg,
            b"SVCT" => ChunkType::Svct,
            b"STRL" => ChunkType::Strl,
            b"STRE" => ChunkType::Stre,
            b"JUMP" => ChunkType::Jump,
            b"ALIB" => ChunkType::Alib,
            b"SARY" => ChunkType::Sary,
            b"FARY" => ChunkType::Fary,
            b"ATAG" => ChunkType::Atag,
            b"SNAM" => ChunkType::Snam,
            _ => ChunkType::Unknown,
        }
    }
}

/// One `[tag:4][size:4][payload]` record, as a byte-range view into the object's data.
#[derive(Debug, Clone, Copy)]
pub struct Chunk {
    pub chunk_type: ChunkType,
    pub offset: usize,
    pub size: usize,
}

impl Chunk {
    /// Bounds-checks this chunk's declared `size` against the object's actual length before
    /// handing back a range to index with — a malformed `size` must surface as a load error, not
    /// a slice-indexing panic.
    pub fn payload_range(&self, data_len: usize) -> Result<std::ops::Range<usize>, LoadError> {
        let end = self
            .offset
            .checked_add(8)
            .and_then(|header_end| header_end.checked_add(self.size))
            .ok_or(LoadError::ChunkOverrun {
                offset: self.offset,
                size: self.size,
                data_len,
            })?;
        if end > data_len {
            return Err(LoadError::ChunkOverrun {
                offset: self.offset,
                size: self.size,
                data_len,
            });
        }
        Ok(self.offset + 8..end)
    }
}

/// Walks `[tag:4][size:4][payload:size]` records within `[start, end)`.
pub struct ChunkIter<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> ChunkIter<'a> {
    pub fn new(data: &'a [u8], start: usize, end: usize) -> Self {
        ChunkIter { data, pos: start, end }
    }
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let header_end = self.pos.saturating_add(8);
        if header_end > self.end || header_end > self.data.len() {
            return None;
        }
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&self.data[self.pos..self.pos + 4]);
        let mut size_buf = [0u8; 4];
        size_buf.copy_from_slice(&self.data[self.pos + 4..self.pos + 8]);
        let size = u32::from_le_bytes(size_buf) as usize;

        let chunk = Chunk {
            chunk_type: ChunkType::from_tag(&tag),
            offset: self.pos,
            size,
        };
        self.pos = header_end.saturating_add(size);
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_tag_matching() {
        assert_eq!(ChunkType::from_tag(b"sptr"), ChunkType::Sptr);
        assert_eq!(ChunkType::from_tag(b"SPTR"), ChunkType::Sptr);
        assert_eq!(ChunkType::from_tag(b"zzzz"), ChunkType::Unknown);
    }

    #[test]
    fn iterates_records() {
        let mut data = Vec::new();
        data.extend_from_slice(b"SPTR");
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(&[1, 2, 3, 4]);
        data.extend_from_slice(b"STRL");
        data.extend_from_slice(&0u32.to_le_bytes());

        let chunks: Vec<_> = ChunkIter::new(&data, 0, data.len()).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_type, ChunkType::Sptr);
        assert_eq!(chunks[1].chunk_type, ChunkType::Strl);
    }

    #[test]
    fn overrunning_size_is_a_load_error_not_a_panic() {
        let mut data = Vec::new();
        data.extend_from_slice(b"SPTR");
        data.extend_from_slice(&1_000u32.to_le_bytes());
        data.extend_from_slice(&[1, 2, 3, 4]); // declared size far exceeds what's actually here

        let chunk = ChunkIter::new(&data, 0, data.len()).next().unwrap();
        let err = chunk.payload_range(data.len()).unwrap_err();
        assert!(matches!(err, LoadError::ChunkOverrun { .. }));
    }

    #[test]
    fn size_overflowing_usize_is_a_load_error() {
        let chunk = Chunk {
            chunk_type: ChunkType::Sptr,
            offset: 0,
            size: usize::MAX,
        };
        let err = chunk.payload_range(8).unwrap_err();
        assert!(matches!(err, LoadError::ChunkOverrun { .. }));
    }
}
