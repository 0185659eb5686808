//! Binary patch file: a fixed header followed by one chunk per patchable section.
//!
//! ```text
//! "DXDIFF" | version u16 | patched size u32 | first chunk offset u32 |
//! 15 x patched section offset u32 | old signature [20] | 15 x chunk
//! ```
//!
//! A chunk lists delete, add and replace positions (uleb128 count, sleb128 deltas from the
//! previous position of the same list) followed by the add and replace payloads merged in
//! ascending position order.

use std::fs;
use std::path::Path;

use num_traits::ToPrimitive;

use crate::dex::error::{DexError, ErrorKind};
use crate::dex::items::SectionItem;
use crate::dex::section::{SectionKind, PATCH_ORDER};
use crate::dex::{read_sleb128, read_u2, read_u4, read_uleb128, read_x, write_sleb128, write_u2, write_u4, write_uleb128, write_x};
use crate::patch::operation::{payloads, OperationPositions, PatchOperation};

pub const PATCH_MAGIC: [u8; 6] = *b"DXDIFF";
pub const PATCH_VERSION: u16 = 0x0002;
pub const PATCH_HEADER_SIZE: u32 = 6 + 2 + 4 + 4 + 4 * PATCH_ORDER.len() as u32 + 20;

fn corrupt(e: DexError) -> DexError {
    e.reclassify(ErrorKind::CorruptPatch)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchHeader {
    pub version: u16,
    pub patched_total_size: u32,
    pub first_chunk_offset: u32,
    /// Patched offset of every section in dependency order, 0 for empty sections.
    pub section_offsets: [u32; 15],
    /// SHA-1 of the container the patch was generated against.
    pub old_signature: [u8; 20],
}

impl PatchHeader {
    pub fn new(patched_total_size: u32, section_offsets: [u32; 15], old_signature: [u8; 20]) -> PatchHeader {
        PatchHeader {
            version: PATCH_VERSION,
            patched_total_size,
            first_chunk_offset: PATCH_HEADER_SIZE,
            section_offsets,
            old_signature,
        }
    }

    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<PatchHeader, DexError> {
        let magic = read_x(bytes, ix, PATCH_MAGIC.len()).map_err(corrupt)?;
        if magic != PATCH_MAGIC {
            fail!(CorruptPatch, "Bad patch magic {:02x?}", magic);
        }
        let version = read_u2(bytes, ix).map_err(corrupt)?;
        if version != PATCH_VERSION {
            fail!(CorruptPatch, "Unsupported patch version {:#06x}", version);
        }
        let patched_total_size = read_u4(bytes, ix).map_err(corrupt)?;
        let first_chunk_offset = read_u4(bytes, ix).map_err(corrupt)?;
        let mut section_offsets = [0u32; 15];
        for off in section_offsets.iter_mut() {
            *off = read_u4(bytes, ix).map_err(corrupt)?;
        }
        let mut old_signature = [0u8; 20];
        old_signature.copy_from_slice(&read_x(bytes, ix, 20).map_err(corrupt)?);

        if first_chunk_offset < PATCH_HEADER_SIZE || first_chunk_offset as usize > bytes.len() {
            fail!(CorruptPatch, "First chunk offset {} is out of bounds", first_chunk_offset);
        }
        if let Some(off) = section_offsets.iter().find(|off| **off >= patched_total_size) {
            fail!(CorruptPatch, "Section offset {:#x} lies beyond the patched size {:#x}", off, patched_total_size);
        }

        Ok(PatchHeader { version, patched_total_size, first_chunk_offset, section_offsets, old_signature })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = write_x(bytes, &PATCH_MAGIC);
        c += write_u2(bytes, self.version);
        c += write_u4(bytes, self.patched_total_size);
        c += write_u4(bytes, self.first_chunk_offset);
        for off in &self.section_offsets {
            c += write_u4(bytes, *off);
        }
        c += write_x(bytes, &self.old_signature);
        c
    }

    pub fn section_offset(&self, kind: SectionKind) -> u32 {
        kind.patch_ordinal().map_or(0, |i| self.section_offsets[i])
    }
}


fn write_positions(bytes: &mut Vec<u8>, positions: &[u32]) -> usize {
    let mut c = write_uleb128(bytes, positions.len() as u32);
    let mut prev = 0i64;
    for p in positions {
        c += write_sleb128(bytes, (*p as i64 - prev) as i32);
        prev = *p as i64;
    }
    c
}

fn read_positions(bytes: &[u8], ix: &mut usize, what: &str) -> Result<Vec<u32>, DexError> {
    let count = read_uleb128(bytes, ix).map_err(corrupt)?;
    let mut positions = Vec::new();
    let mut prev = 0i64;
    for i in 0..count {
        let delta = read_sleb128(bytes, ix).map_err(corrupt)?;
        let value = prev + delta as i64;
        let position = match value.to_u32() {
            Some(p) => p,
            None => fail!(CorruptPatch, "{} position {} is out of range", what, value),
        };
        if i > 0 && value <= prev {
            fail!(CorruptPatch, "{} positions are not ascending at {}", what, position);
        }
        positions.push(position);
        prev = value;
    }
    Ok(positions)
}

/// The operations of one section in their serialized shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchChunk<T> {
    pub positions: OperationPositions,
    pub payloads: Vec<T>,
}

impl<T: SectionItem> PatchChunk<T> {
    pub fn from_operations(ops: &[PatchOperation<T>]) -> PatchChunk<T> {
        PatchChunk { positions: OperationPositions::of(ops), payloads: payloads(ops) }
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = write_positions(bytes, &self.positions.deletes);
        c += write_positions(bytes, &self.positions.adds);
        c += write_positions(bytes, &self.positions.replaces);
        for item in &self.payloads {
            c += item.write(bytes);
        }
        c
    }

    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<PatchChunk<T>, DexError> {
        let deletes = read_positions(bytes, ix, "delete")?;
        let adds = read_positions(bytes, ix, "add")?;
        let replaces = read_positions(bytes, ix, "replace")?;

        let expected = adds.len() + replaces.len();
        let mut items = Vec::new();
        for i in 0..expected {
            let start = *ix;
            let item = T::read(bytes, ix)
                .map_err(|e| corrupt(DexError::with_context(e, format!("payload {} at {}", i, start))))?;
            items.push(item);
        }

        Ok(PatchChunk { positions: OperationPositions { deletes, adds, replaces }, payloads: items })
    }
}


/// A parsed patch file. Chunks are decoded on demand, in dependency order.
#[derive(Debug, Clone)]
pub struct DexPatchFile {
    header: PatchHeader,
    data: Vec<u8>,
}

impl DexPatchFile {
    pub fn parse(bytes: &[u8]) -> Result<DexPatchFile, DexError> {
        let mut ix = 0;
        let header = PatchHeader::read(bytes, &mut ix)?;
        Ok(DexPatchFile { header, data: bytes.to_vec() })
    }

    pub fn from_file(path: &Path) -> Result<DexPatchFile, DexError> {
        let bytes = fs::read(path)
            .map_err(|e| DexError::with_context(e.into(), format!("reading {}", path.display())))?;
        DexPatchFile::parse(&bytes)
    }

    pub fn header(&self) -> &PatchHeader {
        &self.header
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn chunks(&self) -> ChunkReader<'_> {
        ChunkReader { data: &self.data, ix: self.header.first_chunk_offset as usize }
    }
}

/// Sequential reader over the chunks of a patch file.
pub(crate) struct ChunkReader<'a> {
    data: &'a [u8],
    ix: usize,
}

impl ChunkReader<'_> {
    pub(crate) fn next<T: SectionItem>(&mut self) -> Result<PatchChunk<T>, DexError> {
        PatchChunk::read(self.data, &mut self.ix).map_err(|e| e.at(T::KIND, None))
    }

    /// All chunks must have been consumed exactly.
    pub(crate) fn finish(&self) -> Result<(), DexError> {
        if self.ix != self.data.len() {
            fail!(CorruptPatch, "{} trailing bytes after the last chunk", self.data.len() - self.ix);
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::items::StringData;
    use PatchOperation::*;

    #[test]
    fn header_is_96_bytes() {
        let header = PatchHeader::new(0x400, [0x100; 15], [7; 20]);
        let mut bytes = vec![];
        assert_eq!(header.write(&mut bytes), 96);
        assert_eq!(PATCH_HEADER_SIZE, 96);
        assert_eq!(&bytes[..6], b"DXDIFF");
        assert_eq!(&bytes[6..8], &[0x02, 0x00]);
        let mut ix = 0;
        assert_eq!(PatchHeader::read(&bytes, &mut ix).unwrap(), header);
        assert_eq!(header.section_offset(SectionKind::TypeIds), 0x100);
        assert_eq!(header.section_offset(SectionKind::MapList), 0);
    }

    #[test]
    fn positions_are_delta_encoded() {
        let mut bytes = vec![];
        write_positions(&mut bytes, &[3, 4, 70]);
        // count 3, +3, +1, +66 (two byte sleb128)
        assert_eq!(bytes, vec![0x03, 0x03, 0x01, 0xc2, 0x00]);
        let mut ix = 0;
        assert_eq!(read_positions(&bytes, &mut ix, "add").unwrap(), vec![3, 4, 70]);
    }

    #[test]
    fn negative_or_repeated_positions_are_corrupt() {
        // count 1, delta -1
        let mut ix = 0;
        let e = read_positions(&[0x01, 0x7f], &mut ix, "delete").unwrap_err();
        assert_eq!(e.kind(), ErrorKind::CorruptPatch);
        // count 2, 5 then +0
        let mut ix = 0;
        assert!(read_positions(&[0x02, 0x05, 0x00], &mut ix, "delete").is_err());
    }

    #[test]
    fn chunk_layout() {
        let ops = vec![Delete(0), Replace(1, StringData::new("x")), Add(2, StringData::new("d"))];
        let chunk = PatchChunk::from_operations(&ops);
        let mut bytes = vec![];
        chunk.write(&mut bytes);
        assert_eq!(bytes, vec![1, 0, 1, 2, 1, 1, 1, b'x', 0, 1, b'd', 0]);
        let mut ix = 0;
        assert_eq!(PatchChunk::<StringData>::read(&bytes, &mut ix).unwrap(), chunk);
        assert_eq!(ix, bytes.len());
    }

    #[test]
    fn bad_header_is_corrupt() {
        let header = PatchHeader::new(0x400, [0; 15], [0; 20]);
        let mut bytes = vec![];
        header.write(&mut bytes);

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert_eq!(DexPatchFile::parse(&bad_magic).unwrap_err().kind(), ErrorKind::CorruptPatch);

        let mut bad_version = bytes.clone();
        bad_version[6] = 3;
        assert_eq!(DexPatchFile::parse(&bad_version).unwrap_err().kind(), ErrorKind::CorruptPatch);

        assert_eq!(DexPatchFile::parse(&bytes[..50]).unwrap_err().kind(), ErrorKind::CorruptPatch);
        assert!(DexPatchFile::parse(&bytes).is_ok());
    }

    #[test]
    fn truncated_chunk_is_corrupt() {
        let ops = vec![Add(0, StringData::new("abc"))];
        let mut bytes = vec![];
        PatchChunk::from_operations(&ops).write(&mut bytes);
        bytes.truncate(bytes.len() - 2);
        let mut ix = 0;
        assert_eq!(PatchChunk::<StringData>::read(&bytes, &mut ix).unwrap_err().kind(), ErrorKind::CorruptPatch);
    }
}
