/* Section kinds of a dex container and their layout rules */

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Layout traits of a section.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u8 {
        /// Every item starts on a four byte boundary.
        const ALIGNED = 0x1;
        /// Items are referenced by absolute byte offset rather than by ordinal.
        const OFFSET_ADDRESSED = 0x2;
        /// The section lives in the data area.
        const DATA = 0x4;
        /// Items have a fixed byte size.
        const FIXED_SIZE = 0x8;
    }
}

/// One typed region of a dex container, identified by its map list type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SectionKind {
    Header,
    StringIds,
    TypeIds,
    ProtoIds,
    FieldIds,
    MethodIds,
    ClassDefs,
    MapList,
    TypeLists,
    AnnotationSetRefLists,
    AnnotationSets,
    ClassData,
    Code,
    StringData,
    DebugInfo,
    Annotations,
    EncodedArrays,
    AnnotationsDirectories,
}

/// The fifteen sections that carry patch operations, in dependency order. A section only
/// references sections that appear before it in this list.
pub const PATCH_ORDER: [SectionKind; 15] = [
    SectionKind::StringData,
    SectionKind::TypeIds,
    SectionKind::TypeLists,
    SectionKind::ProtoIds,
    SectionKind::FieldIds,
    SectionKind::MethodIds,
    SectionKind::Annotations,
    SectionKind::AnnotationSets,
    SectionKind::AnnotationSetRefLists,
    SectionKind::AnnotationsDirectories,
    SectionKind::EncodedArrays,
    SectionKind::DebugInfo,
    SectionKind::Code,
    SectionKind::ClassData,
    SectionKind::ClassDefs,
];

/// Id tables in file order, directly after the header.
pub const ID_TABLES: [SectionKind; 6] = [
    SectionKind::StringIds,
    SectionKind::TypeIds,
    SectionKind::ProtoIds,
    SectionKind::FieldIds,
    SectionKind::MethodIds,
    SectionKind::ClassDefs,
];

pub const HEADER_SIZE: u32 = 0x70;

impl SectionKind {
    pub fn type_code(self) -> u16 {
        match self {
            SectionKind::Header => 0x0000,
            SectionKind::StringIds => 0x0001,
            SectionKind::TypeIds => 0x0002,
            SectionKind::ProtoIds => 0x0003,
            SectionKind::FieldIds => 0x0004,
            SectionKind::MethodIds => 0x0005,
            SectionKind::ClassDefs => 0x0006,
            SectionKind::MapList => 0x1000,
            SectionKind::TypeLists => 0x1001,
            SectionKind::AnnotationSetRefLists => 0x1002,
            SectionKind::AnnotationSets => 0x1003,
            SectionKind::ClassData => 0x2000,
            SectionKind::Code => 0x2001,
            SectionKind::StringData => 0x2002,
            SectionKind::DebugInfo => 0x2003,
            SectionKind::Annotations => 0x2004,
            SectionKind::EncodedArrays => 0x2005,
            SectionKind::AnnotationsDirectories => 0x2006,
        }
    }

    /// Map a map list type code back to a kind. `None` for codes the engine does not
    /// handle (call sites, method handles, hidden api data).
    pub fn from_type_code(code: u16) -> Option<SectionKind> {
        Some(match code {
            0x0000 => SectionKind::Header,
            0x0001 => SectionKind::StringIds,
            0x0002 => SectionKind::TypeIds,
            0x0003 => SectionKind::ProtoIds,
            0x0004 => SectionKind::FieldIds,
            0x0005 => SectionKind::MethodIds,
            0x0006 => SectionKind::ClassDefs,
            0x1000 => SectionKind::MapList,
            0x1001 => SectionKind::TypeLists,
            0x1002 => SectionKind::AnnotationSetRefLists,
            0x1003 => SectionKind::AnnotationSets,
            0x2000 => SectionKind::ClassData,
            0x2001 => SectionKind::Code,
            0x2002 => SectionKind::StringData,
            0x2003 => SectionKind::DebugInfo,
            0x2004 => SectionKind::Annotations,
            0x2005 => SectionKind::EncodedArrays,
            0x2006 => SectionKind::AnnotationsDirectories,
            _ => return None,
        })
    }

    pub fn flags(self) -> SectionFlags {
        match self {
            SectionKind::Header => SectionFlags::ALIGNED | SectionFlags::FIXED_SIZE,
            SectionKind::StringIds
            | SectionKind::TypeIds
            | SectionKind::ProtoIds
            | SectionKind::FieldIds
            | SectionKind::MethodIds
            | SectionKind::ClassDefs => SectionFlags::ALIGNED | SectionFlags::FIXED_SIZE,
            SectionKind::MapList => SectionFlags::ALIGNED | SectionFlags::DATA,
            SectionKind::TypeLists
            | SectionKind::AnnotationSetRefLists
            | SectionKind::AnnotationSets
            | SectionKind::Code
            | SectionKind::AnnotationsDirectories => {
                SectionFlags::ALIGNED | SectionFlags::OFFSET_ADDRESSED | SectionFlags::DATA
            }
            SectionKind::ClassData
            | SectionKind::DebugInfo
            | SectionKind::Annotations
            | SectionKind::EncodedArrays => SectionFlags::OFFSET_ADDRESSED | SectionFlags::DATA,
            // Keyed by string id ordinal even though the bytes live in the data area.
            SectionKind::StringData => SectionFlags::DATA,
        }
    }

    pub fn is_aligned(self) -> bool {
        self.flags().contains(SectionFlags::ALIGNED)
    }

    pub fn is_offset_addressed(self) -> bool {
        self.flags().contains(SectionFlags::OFFSET_ADDRESSED)
    }

    pub fn is_data(self) -> bool {
        self.flags().contains(SectionFlags::DATA)
    }

    /// Byte size of one entry of a fixed size id table.
    pub fn fixed_item_size(self) -> Option<u32> {
        match self {
            SectionKind::Header => Some(HEADER_SIZE),
            SectionKind::StringIds | SectionKind::TypeIds => Some(4),
            SectionKind::ProtoIds => Some(12),
            SectionKind::FieldIds | SectionKind::MethodIds => Some(8),
            SectionKind::ClassDefs => Some(32),
            _ => None,
        }
    }

    /// Position of this kind in `PATCH_ORDER`.
    pub fn patch_ordinal(self) -> Option<usize> {
        PATCH_ORDER.iter().position(|k| *k == self)
    }

    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Header => "header",
            SectionKind::StringIds => "string_ids",
            SectionKind::TypeIds => "type_ids",
            SectionKind::ProtoIds => "proto_ids",
            SectionKind::FieldIds => "field_ids",
            SectionKind::MethodIds => "method_ids",
            SectionKind::ClassDefs => "class_defs",
            SectionKind::MapList => "map_list",
            SectionKind::TypeLists => "type_lists",
            SectionKind::AnnotationSetRefLists => "annotation_set_ref_lists",
            SectionKind::AnnotationSets => "annotation_sets",
            SectionKind::ClassData => "class_data",
            SectionKind::Code => "code",
            SectionKind::StringData => "string_data",
            SectionKind::DebugInfo => "debug_info",
            SectionKind::Annotations => "annotations",
            SectionKind::EncodedArrays => "encoded_arrays",
            SectionKind::AnnotationsDirectories => "annotations_directories",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
