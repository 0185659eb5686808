use crate::dex::encoded_values::{read_encoded_annotation_bytes, transform_encoded_annotation};
use crate::dex::error::DexError;
use crate::dex::items::SectionItem;
use crate::dex::section::SectionKind;
use crate::dex::{read_u1, read_u4, write_u1, write_u4, write_x};
use crate::patch::remap::IndexMap;

/// Represents an `annotation_item` in a DEX file.
///
/// The encoded annotation is kept as raw bytes. It sorts before the visibility so that
/// items differing only in visibility end up next to each other.
///
/// [Android documentation](https://source.android.com/docs/core/runtime/dex-format#annotation-item)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AnnotationItem {
    pub encoded_annotation: Vec<u8>,
    pub visibility: u8,
}

impl SectionItem for AnnotationItem {
    const KIND: SectionKind = SectionKind::Annotations;

    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        let visibility = read_u1(bytes, ix)?;
        let encoded_annotation = read_encoded_annotation_bytes(bytes, ix)?;
        Ok(AnnotationItem { encoded_annotation, visibility })
    }

    fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = write_u1(bytes, self.visibility);
        c += write_x(bytes, &self.encoded_annotation);
        c
    }

    fn byte_size(&self) -> usize {
        1 + self.encoded_annotation.len()
    }

    fn adjust(&self, map: &IndexMap) -> Result<Self, DexError> {
        let mut out = Vec::with_capacity(self.encoded_annotation.len());
        let mut ix = 0;
        transform_encoded_annotation(&self.encoded_annotation, &mut ix, &mut out, &mut |kind, idx| {
            map.adjust(kind, idx)
        })?;
        Ok(AnnotationItem { encoded_annotation: out, visibility: self.visibility })
    }
}

/// Represents an `annotation_set_item`: offsets of the annotations in the set.
///
/// [Android documentation](https://source.android.com/docs/core/runtime/dex-format#annotation-set-item)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AnnotationSetItem {
    pub entries: Vec<u32>,
}

impl SectionItem for AnnotationSetItem {
    const KIND: SectionKind = SectionKind::AnnotationSets;

    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        let size = read_u4(bytes, ix)?;
        let mut entries = Vec::new();
        for _ in 0..size {
            entries.push(read_u4(bytes, ix)?);
        }
        Ok(AnnotationSetItem { entries })
    }

    fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = write_u4(bytes, self.entries.len() as u32);
        for e in &self.entries {
            c += write_u4(bytes, *e);
        }
        c
    }

    fn byte_size(&self) -> usize {
        4 + 4 * self.entries.len()
    }

    fn adjust(&self, map: &IndexMap) -> Result<Self, DexError> {
        let entries = self
            .entries
            .iter()
            .map(|off| map.adjust(SectionKind::Annotations, *off))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AnnotationSetItem { entries })
    }
}

/// Represents an `annotation_set_ref_list`: one annotation set offset per parameter,
/// 0 for parameters without annotations.
///
/// [Android documentation](https://source.android.com/docs/core/runtime/dex-format#set-ref-list)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AnnotationSetRefList {
    pub list: Vec<u32>,
}

impl SectionItem for AnnotationSetRefList {
    const KIND: SectionKind = SectionKind::AnnotationSetRefLists;

    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        let size = read_u4(bytes, ix)?;
        let mut list = Vec::new();
        for _ in 0..size {
            list.push(read_u4(bytes, ix)?);
        }
        Ok(AnnotationSetRefList { list })
    }

    fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = write_u4(bytes, self.list.len() as u32);
        for off in &self.list {
            c += write_u4(bytes, *off);
        }
        c
    }

    fn byte_size(&self) -> usize {
        4 + 4 * self.list.len()
    }

    fn adjust(&self, map: &IndexMap) -> Result<Self, DexError> {
        let list = self
            .list
            .iter()
            .map(|off| map.adjust(SectionKind::AnnotationSets, *off))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AnnotationSetRefList { list })
    }
}

/// Represents an `annotations_directory_item`.
///
/// Field and method entries pair a member index with an annotation set offset; parameter
/// entries pair a method index with an annotation set ref list offset.
///
/// [Android documentation](https://source.android.com/docs/core/runtime/dex-format#annotations-directory)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AnnotationsDirectoryItem {
    pub class_annotations_off: u32,
    pub field_annotations: Vec<(u32, u32)>,
    pub method_annotations: Vec<(u32, u32)>,
    pub parameter_annotations: Vec<(u32, u32)>,
}

fn read_pairs(bytes: &[u8], ix: &mut usize, count: u32) -> Result<Vec<(u32, u32)>, DexError> {
    let mut v = Vec::new();
    for _ in 0..count {
        let idx = read_u4(bytes, ix)?;
        let off = read_u4(bytes, ix)?;
        v.push((idx, off));
    }
    Ok(v)
}

fn write_pairs(bytes: &mut Vec<u8>, pairs: &[(u32, u32)]) -> usize {
    let mut c = 0;
    for (idx, off) in pairs {
        c += write_u4(bytes, *idx);
        c += write_u4(bytes, *off);
    }
    c
}

fn adjust_pairs(
    map: &IndexMap,
    pairs: &[(u32, u32)],
    index_kind: SectionKind,
    offset_kind: SectionKind,
) -> Result<Vec<(u32, u32)>, DexError> {
    pairs
        .iter()
        .map(|(idx, off)| Ok((map.adjust(index_kind, *idx)?, map.adjust(offset_kind, *off)?)))
        .collect()
}

impl SectionItem for AnnotationsDirectoryItem {
    const KIND: SectionKind = SectionKind::AnnotationsDirectories;

    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        let class_annotations_off = read_u4(bytes, ix)?;
        let fields_size = read_u4(bytes, ix)?;
        let methods_size = read_u4(bytes, ix)?;
        let parameters_size = read_u4(bytes, ix)?;

        Ok(AnnotationsDirectoryItem {
            class_annotations_off,
            field_annotations: read_pairs(bytes, ix, fields_size)?,
            method_annotations: read_pairs(bytes, ix, methods_size)?,
            parameter_annotations: read_pairs(bytes, ix, parameters_size)?,
        })
    }

    fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = write_u4(bytes, self.class_annotations_off);
        c += write_u4(bytes, self.field_annotations.len() as u32);
        c += write_u4(bytes, self.method_annotations.len() as u32);
        c += write_u4(bytes, self.parameter_annotations.len() as u32);
        c += write_pairs(bytes, &self.field_annotations);
        c += write_pairs(bytes, &self.method_annotations);
        c += write_pairs(bytes, &self.parameter_annotations);
        c
    }

    fn byte_size(&self) -> usize {
        16 + 8 * (self.field_annotations.len() + self.method_annotations.len() + self.parameter_annotations.len())
    }

    fn adjust(&self, map: &IndexMap) -> Result<Self, DexError> {
        Ok(AnnotationsDirectoryItem {
            class_annotations_off: map.adjust(SectionKind::AnnotationSets, self.class_annotations_off)?,
            field_annotations: adjust_pairs(
                map,
                &self.field_annotations,
                SectionKind::FieldIds,
                SectionKind::AnnotationSets,
            )?,
            method_annotations: adjust_pairs(
                map,
                &self.method_annotations,
                SectionKind::MethodIds,
                SectionKind::AnnotationSets,
            )?,
            parameter_annotations: adjust_pairs(
                map,
                &self.parameter_annotations,
                SectionKind::MethodIds,
                SectionKind::AnnotationSetRefLists,
            )?,
        })
    }
}
