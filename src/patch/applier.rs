//! Patch application: replay every chunk against the old container and finish the result.

use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::dex::builder::DexImage;
use crate::dex::dex_file::DexFile;
use crate::dex::error::{DexError, ErrorKind};
use crate::dex::items::{visit_sections, SectionItem, SectionVisitor};
use crate::dex::section::{SectionKind, HEADER_SIZE};
use crate::patch::apply::apply_section;
use crate::patch::file::{ChunkReader, DexPatchFile};
use crate::patch::remap::IndexMap;

struct ApplyPass<'a> {
    old: &'a DexFile,
    patch: &'a DexPatchFile,
    chunks: ChunkReader<'a>,
    image: DexImage,
    old_to_patched: IndexMap,
    /// End of the id tables placed so far.
    id_cursor: u32,
    /// Where the next data section must start, once the first one is placed.
    data_cursor: Option<u32>,
    first_data_base: Option<u32>,
}

impl SectionVisitor for ApplyPass<'_> {
    fn visit<T: SectionItem>(&mut self) -> Result<(), DexError> {
        let kind = T::KIND;
        let chunk = self.chunks.next::<T>()?;
        let old_items = self.old.read_items::<T>()?;
        let base = self.patch.header().section_offset(kind);

        let table = std::mem::take(&mut self.old_to_patched);
        let (size, table) = apply_section(&old_items, &chunk, &mut self.image, base, table)?;
        self.old_to_patched = table;
        if size == 0 {
            return Ok(());
        }

        if kind.is_data() {
            match self.data_cursor {
                Some(expected) if expected != base => {
                    fail!(CorruptPatch, "{} starts at {:#x}, expected {:#x}", kind, base, expected)
                }
                None => self.first_data_base = Some(base),
                _ => {}
            }
            self.data_cursor = Some(base + size);
        } else {
            if base != self.id_cursor {
                fail!(CorruptPatch, "{} starts at {:#x}, expected {:#x}", kind, base, self.id_cursor);
            }
            self.id_cursor += size;
        }
        if kind == SectionKind::StringData {
            // string ids come first, one u32 per string
            let count = (chunk.positions.adds.len() + old_items.len() - chunk.positions.deletes.len()) as u32;
            self.id_cursor += 4 * count;
        }
        debug!("{}: {:#x} bytes at {:#x}", kind, size, base);
        Ok(())
    }
}


/// Applies a patch file to the container it was generated against.
pub struct DexPatchApplier<'a> {
    old: &'a DexFile,
    patch: &'a DexPatchFile,
}

impl<'a> DexPatchApplier<'a> {
    pub fn new(old: &'a DexFile, patch: &'a DexPatchFile) -> Self {
        DexPatchApplier { old, patch }
    }

    /// Build the patched container. Nothing is produced unless every section applies.
    pub fn apply(&self) -> Result<Vec<u8>, DexError> {
        let header = self.patch.header();
        let signature = self.old.computed_signature();
        if header.old_signature != signature {
            fail!(
                CorruptPatch,
                "Patch targets a container with signature {}, this one has {}",
                hex(&header.old_signature),
                hex(&signature)
            );
        }
        // every patched byte comes from an old item or a payload, at most a few times over
        let ceiling = 16 * (self.old.bytes().len() as u64 + self.patch.bytes().len() as u64) + 0x1000;
        if header.patched_total_size as u64 > ceiling {
            fail!(
                CorruptPatch,
                "Patched size {:#x} cannot come out of a {} byte container and a {} byte patch",
                header.patched_total_size,
                self.old.bytes().len(),
                self.patch.bytes().len()
            );
        }

        let mut pass = ApplyPass {
            old: self.old,
            patch: self.patch,
            chunks: self.patch.chunks(),
            image: DexImage::with_limit(header.patched_total_size),
            old_to_patched: IndexMap::new(),
            id_cursor: HEADER_SIZE,
            data_cursor: None,
            first_data_base: None,
        };
        visit_sections(&mut pass)?;
        pass.chunks.finish()?;

        if let Some(base) = pass.first_data_base {
            if base != pass.id_cursor {
                fail!(CorruptPatch, "Data starts at {:#x} but the id tables end at {:#x}", base, pass.id_cursor);
            }
        }

        let bytes = pass
            .image
            .finish(self.old.header.magic)
            .map_err(|e| e.reclassify(ErrorKind::CorruptPatch))?;
        if bytes.len() as u32 != header.patched_total_size {
            fail!(
                CorruptPatch,
                "Patched container is {} bytes, the patch promised {}",
                bytes.len(),
                header.patched_total_size
            );
        }
        info!("Patched container is {} bytes", bytes.len());
        Ok(bytes)
    }

    /// Apply and write the result to `path`. The file is left alone when applying fails.
    pub fn apply_to_file(&self, path: &Path) -> Result<(), DexError> {
        let bytes = self.apply()?;
        fs::write(path, bytes).map_err(|e| DexError::with_context(e.into(), format!("writing {}", path.display())))
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
