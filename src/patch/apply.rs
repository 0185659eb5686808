//! Applying one section chunk to the items of the old container.

use log::trace;

use crate::dex::builder::DexImage;
use crate::dex::error::{DexError, ErrorKind};
use crate::dex::items::SectionItem;
use crate::dex::section::SectionKind;
use crate::patch::file::PatchChunk;
use crate::patch::placement::{walk, Step};
use crate::patch::remap::IndexMap;

/// Write the patched form of one section into `image` starting at `base`.
///
/// Inserted payloads are written as they are. Surviving old items are rewritten through
/// `old_to_patched`, which gains an entry for every key that moved and every key that was
/// dropped. Returns the padded section size and the updated table.
pub(crate) fn apply_section<T: SectionItem>(
    old_items: &[(u32, T)],
    chunk: &PatchChunk<T>,
    image: &mut DexImage,
    base: u32,
    mut old_to_patched: IndexMap,
) -> Result<(u32, IndexMap), DexError> {
    let kind = T::KIND;
    let old_count = old_items.len() as u32;
    let positions = &chunk.positions;

    if let Some(p) = positions.deletes.iter().chain(&positions.replaces).find(|p| **p >= old_count) {
        return Err(err!(CorruptPatch, "{} operation at {} but the old section has {} items", kind, p, old_count)
            .at(kind, Some(*p)));
    }
    if chunk.payloads.len() != positions.adds.len() + positions.replaces.len() {
        fail!(CorruptPatch, "{} chunk carries {} payloads", kind, chunk.payloads.len());
    }

    let mut writer = image.writer(kind, base);
    walk(old_count, positions, ErrorKind::CorruptPatch, |step| {
        match step {
            Step::Insert { position, payload } => {
                let item = match chunk.payloads.get(payload) {
                    Some(item) => item,
                    None => fail!(CorruptPatch, "{} payload {} is missing", kind, payload),
                };
                let key = writer.write(item).map_err(|e| overrun(e, kind, position))?;
                trace!("{} insert at {} -> {:#x}", kind, position, key);
            }
            Step::Drop { old } => {
                old_to_patched.mark_deleted(kind, old_items[old as usize].0);
            }
            Step::Keep { old, .. } => {
                let (old_key, item) = &old_items[old as usize];
                // a survivor pointing at a dropped item means the patch does not fit this file
                let adjusted = item.adjust(&old_to_patched).map_err(|e| match e.kind() {
                    ErrorKind::DeletedReference => e.reclassify(ErrorKind::CorruptPatch).at(kind, Some(*old_key)),
                    _ => e.at(kind, Some(*old_key)),
                })?;
                let key = writer.write(&adjusted).map_err(|e| overrun(e, kind, old))?;
                old_to_patched.map(kind, *old_key, key);
            }
        }
        Ok(())
    })
    .map_err(|e| e.at(kind, None))?;

    Ok((writer.finish(), old_to_patched))
}

/// Placement past the promised container size means the patch lied about the layout.
fn overrun(e: DexError, kind: SectionKind, position: u32) -> DexError {
    e.reclassify(ErrorKind::CorruptPatch).at(kind, Some(position))
}
