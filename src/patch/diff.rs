//! Generic section differencing and patched-layout simulation.

use std::collections::{HashMap, HashSet};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::dex::builder::SectionCursor;
use crate::dex::error::{DexError, ErrorKind};
use crate::dex::items::SectionItem;
use crate::dex::section::SectionKind;
use crate::patch::operation::{sort_and_coalesce, OperationPositions, PatchOperation};
use crate::patch::placement::{walk, Step};
use crate::patch::remap::IndexMap;

/// Per-section counters reported by the generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionStats {
    pub added: u32,
    pub deleted: u32,
    pub replaced: u32,
    /// Kept items whose key changed.
    pub moved: u32,
    pub kept: u32,
}

impl SectionStats {
    pub fn is_unchanged(&self) -> bool {
        self.added == 0 && self.deleted == 0 && self.replaced == 0 && self.moved == 0
    }
}

/// Remap tables threaded through generation: old keys to new keys and new keys to the
/// keys they get in the patched container.
#[derive(Debug, Clone, Default)]
pub struct DiffTables {
    pub old_to_new: IndexMap,
    pub new_to_patched: IndexMap,
}

/// Outcome of differencing one section.
#[derive(Debug, Clone)]
pub struct SectionDiff<T> {
    pub kind: SectionKind,
    /// Sorted and coalesced; add and replace payloads are already in patched form.
    pub operations: Vec<PatchOperation<T>>,
    pub patched_offset: u32,
    pub patched_size: u32,
    pub stats: SectionStats,
}

/// Difference one section and simulate where its items land in the patched container.
///
/// `old_items` and `new_items` are in file order with their keys. New items whose key is in
/// `skip` are left out of the patched container. `base` is where the section starts in the
/// patched container.
pub fn diff_section<T: SectionItem>(
    old_items: Vec<(u32, T)>,
    new_items: Vec<(u32, T)>,
    skip: &HashSet<u32>,
    base: u32,
    tables: DiffTables,
) -> Result<(SectionDiff<T>, DiffTables), DexError> {
    let kind = T::KIND;
    let DiffTables { mut old_to_new, mut new_to_patched } = tables;
    let old_count = old_items.len() as u32;
    let mut ops = Vec::new();

    // old items in new-container terms; one that points at something deleted goes too
    let mut old_sorted: Vec<(T, u32)> = Vec::with_capacity(old_items.len());
    for (ordinal, (key, item)) in old_items.iter().enumerate() {
        match item.adjust(&old_to_new) {
            Ok(adjusted) => old_sorted.push((adjusted, ordinal as u32)),
            Err(e) if e.kind() == ErrorKind::DeletedReference => {
                debug!("{} {:#x} dropped: {}", kind, key, e);
                old_to_new.mark_deleted(kind, *key);
                ops.push(PatchOperation::Delete(ordinal as u32));
            }
            Err(e) => return Err(e.at(kind, Some(*key))),
        }
    }

    let new_kept: Vec<(u32, T)> = new_items.into_iter().filter(|(key, _)| !skip.contains(key)).collect();
    let mut new_sorted: Vec<(&T, u32)> = new_kept.iter().enumerate().map(|(i, (_, item))| (item, i as u32)).collect();

    old_sorted.sort();
    new_sorted.sort();

    let mut matched: HashMap<u32, u32> = HashMap::new();
    let (mut i, mut j) = (0, 0);
    loop {
        let order = match (old_sorted.get(i), new_sorted.get(j)) {
            (Some((o, _)), Some((n, _))) => o.cmp(*n),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => break,
        };
        match order {
            std::cmp::Ordering::Less => {
                let ordinal = old_sorted[i].1;
                ops.push(PatchOperation::Delete(ordinal));
                old_to_new.mark_deleted(kind, old_items[ordinal as usize].0);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                let (item, ordinal) = new_sorted[j];
                ops.push(PatchOperation::Add(ordinal, item.clone()));
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                let old_ordinal = old_sorted[i].1;
                let new_ordinal = new_sorted[j].1;
                old_to_new.map(kind, old_items[old_ordinal as usize].0, new_kept[new_ordinal as usize].0);
                matched.insert(old_ordinal, new_ordinal);
                i += 1;
                j += 1;
            }
        }
    }

    let mut ops = sort_and_coalesce(ops);
    let positions = OperationPositions::of(&ops);
    let payload_slots: Vec<usize> =
        ops.iter().enumerate().filter(|(_, op)| op.item().is_some()).map(|(slot, _)| slot).collect();

    let mut stats = SectionStats {
        added: positions.adds.len() as u32,
        deleted: positions.deletes.len() as u32,
        replaced: positions.replaces.len() as u32,
        ..Default::default()
    };
    let mut cursor = SectionCursor::new(kind, base);

    walk(old_count, &positions, ErrorKind::Invariant, |step| {
        match step {
            Step::Insert { position, payload } => {
                let (new_key, op) = match (new_kept.get(position as usize), payload_slots.get(payload)) {
                    (Some((key, _)), Some(slot)) => (*key, &mut ops[*slot]),
                    _ => fail!(Invariant, "{} insert {} at {} has no new item", kind, payload, position),
                };
                if let Some(item) = op.item_mut() {
                    let patched = item.adjust(&new_to_patched).map_err(|e| e.at(kind, Some(new_key)))?;
                    let (key, _) = cursor.place(patched.byte_size() as u32)?;
                    new_to_patched.map(kind, new_key, key);
                    *item = patched;
                }
            }
            Step::Drop { .. } => {}
            Step::Keep { old, .. } => {
                let (new_key, new_item) = match matched.get(&old).and_then(|n| new_kept.get(*n as usize)) {
                    Some((key, item)) => (*key, item),
                    None => fail!(Invariant, "{} old item {} survives without a match", kind, old),
                };
                let patched = new_item.adjust(&new_to_patched).map_err(|e| e.at(kind, Some(new_key)))?;
                let (key, _) = cursor.place(patched.byte_size() as u32)?;
                new_to_patched.map(kind, new_key, key);
                stats.kept += 1;
                if old_items[old as usize].0 != key {
                    stats.moved += 1;
                }
            }
        }
        Ok(())
    })
    .map_err(|e| e.at(kind, None))?;

    if cursor.count() as usize != new_kept.len() {
        fail!(Invariant, "{} simulated {} items for {} new ones", kind, cursor.count(), new_kept.len());
    }

    debug!(
        "{}: {} old, {} new, {} operations, patched at {:#x} size {:#x}",
        kind,
        old_count,
        new_kept.len(),
        ops.len(),
        cursor.patched_offset(),
        cursor.patched_size()
    );

    let diff = SectionDiff {
        kind,
        operations: ops,
        patched_offset: cursor.patched_offset(),
        patched_size: cursor.patched_size(),
        stats,
    };
    Ok((diff, DiffTables { old_to_new, new_to_patched }))
}
