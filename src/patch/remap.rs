//! Old-key to new-key tables used to rewrite cross-section references.
//!
//! Keys are ordinals for index-addressed sections and absolute byte offsets for
//! offset-addressed ones. A key with no entry maps to itself.

use std::collections::HashMap;

use num_traits::ToPrimitive;

use crate::dex::error::{DexError, ErrorKind};
use crate::dex::section::SectionKind;
use crate::dex::NO_INDEX;

/// Fate of one old key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remap {
    Kept(u32),
    Deleted,
}

/// Per section kind, old key -> `Remap`.
#[derive(Debug, Clone, Default)]
pub struct IndexMap {
    tables: HashMap<SectionKind, HashMap<u32, Remap>>,
}

impl IndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `old` now lives at `new`. Identity entries are not stored, except
    /// when they overwrite an earlier entry for the same key.
    pub fn map(&mut self, kind: SectionKind, old: u32, new: u32) {
        let table = self.tables.entry(kind).or_default();
        if old == new {
            table.remove(&old);
        } else {
            table.insert(old, Remap::Kept(new));
        }
    }

    pub fn mark_deleted(&mut self, kind: SectionKind, old: u32) {
        self.tables.entry(kind).or_default().insert(old, Remap::Deleted);
    }

    pub fn get(&self, kind: SectionKind, old: u32) -> Option<Remap> {
        self.tables.get(&kind).and_then(|t| t.get(&old)).copied()
    }

    pub fn is_deleted(&self, kind: SectionKind, old: u32) -> bool {
        self.get(kind, old) == Some(Remap::Deleted)
    }

    /// Number of explicit entries (moves and deletions) recorded for `kind`.
    pub fn len(&self, kind: SectionKind) -> usize {
        self.tables.get(&kind).map_or(0, |t| t.len())
    }

    pub fn is_empty(&self) -> bool {
        self.tables.values().all(|t| t.is_empty())
    }

    /// Resolve a reference into `kind`. Offset 0 and `NO_INDEX` mean "no reference" and
    /// are returned unchanged. A deleted key is an error.
    pub fn adjust(&self, kind: SectionKind, key: u32) -> Result<u32, DexError> {
        if kind.is_offset_addressed() && key == 0 {
            return Ok(0);
        }
        if !kind.is_offset_addressed() && key == NO_INDEX {
            return Ok(NO_INDEX);
        }
        match self.get(kind, key) {
            None => Ok(key),
            Some(Remap::Kept(new)) => Ok(new),
            Some(Remap::Deleted) => Err(DexError::new(
                ErrorKind::DeletedReference,
                &format!("{} key {:#x} refers to a deleted item", kind, key),
            )
            .at(kind, Some(key))),
        }
    }

    /// `adjust` for references stored in a 16-bit field.
    pub fn adjust_u16(&self, kind: SectionKind, key: u16) -> Result<u16, DexError> {
        let new = self.adjust(kind, key as u32)?;
        match new.to_u16() {
            Some(v) => Ok(v),
            None => fail!(Invariant, "{} index {} does not fit in 16 bits", kind, new),
        }
    }

    pub fn string(&self, idx: u32) -> Result<u32, DexError> {
        self.adjust(SectionKind::StringData, idx)
    }

    pub fn type_index(&self, idx: u32) -> Result<u32, DexError> {
        self.adjust(SectionKind::TypeIds, idx)
    }
}
