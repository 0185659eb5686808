//! Patch generation: diff every section of two containers in dependency order.

use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};
use serde::Serialize;

use crate::dex::annotations::{AnnotationItem, AnnotationSetItem, AnnotationSetRefList, AnnotationsDirectoryItem};
use crate::dex::builder::{map_list_size, IdLayout};
use crate::dex::dex_file::DexFile;
use crate::dex::encoded_values::{transform_encoded_annotation, transform_encoded_array};
use crate::dex::error::DexError;
use crate::dex::items::{visit_sections, ClassDef, EncodedArrayItem, SectionItem, SectionVisitor};
use crate::dex::section::{SectionKind, PATCH_ORDER};
use crate::patch::config::DexPatchConfig;
use crate::patch::diff::{diff_section, DiffTables, SectionStats};
use crate::patch::exclude::ClassFilter;
use crate::patch::file::{PatchChunk, PatchHeader, PATCH_HEADER_SIZE};

/// Result of a generation run.
#[derive(Debug, Clone, Serialize)]
pub struct PatchOutput {
    /// The serialized patch file.
    #[serde(skip)]
    pub patch: Vec<u8>,
    /// Size of the container the patch produces.
    pub patched_size: u32,
    /// Per-section statistics in dependency order.
    pub stats: Vec<(SectionKind, SectionStats)>,
    /// Descriptors of the classes left out of the patched container.
    pub excluded_classes: Vec<String>,
}

impl PatchOutput {
    pub fn section_stats(&self, kind: SectionKind) -> Option<&SectionStats> {
        self.stats.iter().find(|(k, _)| *k == kind).map(|(_, s)| s)
    }

    /// True when the patched container equals the old one item for item.
    pub fn is_identity(&self) -> bool {
        self.stats.iter().all(|(_, s)| s.is_unchanged())
    }
}


/// New-container items that do not make it into the patched container.
#[derive(Debug, Default)]
struct Exclusions {
    skip: HashMap<SectionKind, HashSet<u32>>,
    /// Excluded type index -> descriptor.
    types: HashMap<u32, String>,
    /// Class defs that stay.
    retained: Vec<ClassDef>,
}

impl Exclusions {
    fn find(new: &DexFile, filter: &ClassFilter) -> Result<Exclusions, DexError> {
        let mut exclusions = Exclusions::default();
        for (ordinal, class_def) in new.read_items::<ClassDef>()? {
            if filter.is_empty() {
                exclusions.retained.push(class_def);
                continue;
            }
            let descriptor = new.type_descriptor(class_def.class_idx)?;
            match filter.matching(&descriptor) {
                Some(pattern) => {
                    debug!("Excluding {} (pattern {})", descriptor, pattern);
                    exclusions.skip.entry(SectionKind::ClassDefs).or_default().insert(ordinal);
                    if class_def.class_data_off != 0 {
                        exclusions.skip.entry(SectionKind::ClassData).or_default().insert(class_def.class_data_off);
                    }
                    exclusions.types.insert(class_def.class_idx, descriptor);
                }
                None => exclusions.retained.push(class_def),
            }
        }
        Ok(exclusions)
    }

    fn skipped(&self, kind: SectionKind) -> u32 {
        self.skip.get(&kind).map_or(0, |s| s.len() as u32)
    }

    /// Look for type references to excluded classes in the static values and annotations of
    /// the classes that stay.
    fn check_references(&self, new: &DexFile, strict: bool) -> Result<(), DexError> {
        if self.types.is_empty() {
            return Ok(());
        }
        for class_def in &self.retained {
            let mut referenced = Vec::new();
            let mut record = |kind: SectionKind, idx: u32| {
                if kind == SectionKind::TypeIds && self.types.contains_key(&idx) {
                    referenced.push(idx);
                }
                Ok::<u32, DexError>(idx)
            };
            let mut scratch = Vec::new();

            if class_def.static_values_off != 0 {
                let values = new.read_item_at::<EncodedArrayItem>(class_def.static_values_off)?;
                transform_encoded_array(&values.bytes, &mut 0, &mut scratch, &mut record)?;
            }
            for annotation_off in annotation_offsets(new, class_def.annotations_off)? {
                let annotation = new.read_item_at::<AnnotationItem>(annotation_off)?;
                transform_encoded_annotation(&annotation.encoded_annotation, &mut 0, &mut scratch, &mut record)?;
            }

            for idx in referenced {
                let owner = new.type_descriptor(class_def.class_idx)?;
                let excluded = self.types.get(&idx).map_or("?", |s| s.as_str());
                if strict {
                    fail!(Exclusion, "{} still references excluded class {}", owner, excluded);
                }
                warn!("{} still references excluded class {}", owner, excluded);
            }
        }
        Ok(())
    }
}

/// Every annotation reachable from an annotations directory.
fn annotation_offsets(dex: &DexFile, directory_off: u32) -> Result<Vec<u32>, DexError> {
    if directory_off == 0 {
        return Ok(vec![]);
    }
    let directory = dex.read_item_at::<AnnotationsDirectoryItem>(directory_off)?;
    let mut sets = vec![directory.class_annotations_off];
    sets.extend(directory.field_annotations.iter().map(|(_, off)| *off));
    sets.extend(directory.method_annotations.iter().map(|(_, off)| *off));
    for (_, ref_list_off) in &directory.parameter_annotations {
        if *ref_list_off != 0 {
            sets.extend(dex.read_item_at::<AnnotationSetRefList>(*ref_list_off)?.list);
        }
    }

    let mut annotations = Vec::new();
    for set_off in sets.into_iter().filter(|off| *off != 0) {
        annotations.extend(dex.read_item_at::<AnnotationSetItem>(set_off)?.entries);
    }
    Ok(annotations)
}


struct GenerationPass<'a> {
    old: &'a DexFile,
    new: &'a DexFile,
    exclusions: &'a Exclusions,
    layout: IdLayout,
    data_cursor: u32,
    tables: DiffTables,
    section_offsets: [u32; 15],
    map_entries: usize,
    chunks: Vec<u8>,
    stats: Vec<(SectionKind, SectionStats)>,
}

impl SectionVisitor for GenerationPass<'_> {
    fn visit<T: SectionItem>(&mut self) -> Result<(), DexError> {
        let kind = T::KIND;
        let old_items = self.old.read_items::<T>()?;
        let new_items = self.new.read_items::<T>()?;
        let base = if kind.is_data() { self.data_cursor } else { self.layout.offset(kind) };
        let no_skips = HashSet::new();
        let skip = self.exclusions.skip.get(&kind).unwrap_or(&no_skips);

        let tables = std::mem::take(&mut self.tables);
        let (diff, tables) = diff_section(old_items, new_items, skip, base, tables)?;
        self.tables = tables;

        if diff.patched_size > 0 {
            self.map_entries += if kind == SectionKind::StringData { 2 } else { 1 };
        }
        if kind.is_data() {
            self.data_cursor += diff.patched_size;
        }
        if let Some(i) = kind.patch_ordinal() {
            self.section_offsets[i] = diff.patched_offset;
        }
        PatchChunk::from_operations(&diff.operations).write(&mut self.chunks);

        let s = diff.stats;
        if s.is_unchanged() {
            debug!("{}: {} items unchanged", kind, s.kept);
        } else {
            info!(
                "{}: {} added, {} deleted, {} replaced, {} moved, {} kept",
                kind, s.added, s.deleted, s.replaced, s.moved, s.kept
            );
        }
        self.stats.push((kind, s));
        Ok(())
    }
}


/// Produces a patch that turns `old` into `new`.
pub struct DexPatchGenerator<'a> {
    old: &'a DexFile,
    new: &'a DexFile,
    config: DexPatchConfig,
}

impl<'a> DexPatchGenerator<'a> {
    pub fn new(old: &'a DexFile, new: &'a DexFile) -> Self {
        DexPatchGenerator { old, new, config: DexPatchConfig::default() }
    }

    pub fn with_config(mut self, config: DexPatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn generate(&self) -> Result<PatchOutput, DexError> {
        let filter = self.config.class_filter()?;
        let exclusions = Exclusions::find(self.new, &filter)?;
        exclusions.check_references(self.new, self.config.strict_exclusions)?;

        let layout = IdLayout::new(|kind| self.new.count(kind) - exclusions.skipped(kind));
        let data_off = layout.data_off();
        let mut pass = GenerationPass {
            old: self.old,
            new: self.new,
            exclusions: &exclusions,
            layout,
            data_cursor: data_off,
            tables: DiffTables::default(),
            section_offsets: [0; PATCH_ORDER.len()],
            // header and map list
            map_entries: 2,
            chunks: Vec::new(),
            stats: Vec::with_capacity(PATCH_ORDER.len()),
        };
        visit_sections(&mut pass)?;

        let patched_size = pass.data_cursor + map_list_size(pass.map_entries);
        let header = PatchHeader::new(patched_size, pass.section_offsets, self.old.computed_signature());
        let mut patch = Vec::with_capacity(PATCH_HEADER_SIZE as usize + pass.chunks.len());
        header.write(&mut patch);
        patch.extend_from_slice(&pass.chunks);

        let mut excluded_classes: Vec<String> = exclusions.types.values().cloned().collect();
        excluded_classes.sort();
        info!(
            "Patch is {} bytes for a {} byte container, {} classes excluded",
            patch.len(),
            patched_size,
            excluded_classes.len()
        );

        Ok(PatchOutput { patch, patched_size, stats: pass.stats, excluded_classes })
    }
}
