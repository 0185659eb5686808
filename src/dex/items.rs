/* Section items: decode, encode, content ordering and reference adjustment */

use std::cmp::Ordering;
use std::fmt;

use cesu8::{from_java_cesu8, to_java_cesu8};

use crate::dex::encoded_values::{read_encoded_array_bytes, transform_encoded_array};
use crate::dex::error::DexError;
use crate::dex::annotations::{AnnotationItem, AnnotationSetItem, AnnotationSetRefList, AnnotationsDirectoryItem};
use crate::dex::code::{ClassDataItem, CodeItem, DebugInfoItem};
use crate::dex::section::{SectionKind, PATCH_ORDER};
use crate::dex::{read_u1, read_u2, read_u4, read_uleb128, write_u1, write_u2, write_u4, write_uleb128, write_x};
use crate::patch::remap::IndexMap;

/// One item kind of the generic diff/patch algorithms.
///
/// Items never hold their own key (ordinal or offset); the algorithms carry that next to
/// them. `Ord` is the content ordering used for sorted set differencing, so two items are
/// interchangeable exactly when they compare equal.
pub trait SectionItem: Sized + Clone + Ord + fmt::Debug {
    const KIND: SectionKind;

    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError>;

    fn write(&self, bytes: &mut Vec<u8>) -> usize;

    fn byte_size(&self) -> usize {
        let mut scratch = Vec::new();
        self.write(&mut scratch)
    }

    /// Rewrite every embedded index or offset through `map`.
    fn adjust(&self, map: &IndexMap) -> Result<Self, DexError>;
}


/// Something to run once per patchable section, with the section's item type.
pub trait SectionVisitor {
    fn visit<T: SectionItem>(&mut self) -> Result<(), DexError>;
}

/// Run `visitor` over all patchable sections in dependency order.
pub fn visit_sections<V: SectionVisitor>(visitor: &mut V) -> Result<(), DexError> {
    for kind in PATCH_ORDER {
        match kind {
            SectionKind::StringData => visitor.visit::<StringData>()?,
            SectionKind::TypeIds => visitor.visit::<TypeId>()?,
            SectionKind::TypeLists => visitor.visit::<TypeList>()?,
            SectionKind::ProtoIds => visitor.visit::<ProtoId>()?,
            SectionKind::FieldIds => visitor.visit::<FieldId>()?,
            SectionKind::MethodIds => visitor.visit::<MethodId>()?,
            SectionKind::Annotations => visitor.visit::<AnnotationItem>()?,
            SectionKind::AnnotationSets => visitor.visit::<AnnotationSetItem>()?,
            SectionKind::AnnotationSetRefLists => visitor.visit::<AnnotationSetRefList>()?,
            SectionKind::AnnotationsDirectories => visitor.visit::<AnnotationsDirectoryItem>()?,
            SectionKind::EncodedArrays => visitor.visit::<EncodedArrayItem>()?,
            SectionKind::DebugInfo => visitor.visit::<DebugInfoItem>()?,
            SectionKind::Code => visitor.visit::<CodeItem>()?,
            SectionKind::ClassData => visitor.visit::<ClassDataItem>()?,
            SectionKind::ClassDefs => visitor.visit::<ClassDef>()?,
            other => fail!(Invariant, "Section {} carries no patch operations", other),
        }
    }
    Ok(())
}


/// `string_data_item`: utf16 length and the MUTF-8 payload without its terminator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StringData {
    pub data: Vec<u8>,
    pub utf16_size: u32,
}

impl StringData {
    pub fn new(s: &str) -> StringData {
        StringData {
            data: to_java_cesu8(s).into_owned(),
            utf16_size: s.encode_utf16().count() as u32,
        }
    }

    pub fn to_string(&self) -> Result<String, DexError> {
        match from_java_cesu8(&self.data) {
            Ok(s) => Ok(s.into_owned()),
            Err(_) => fail!("String data is not valid MUTF-8"),
        }
    }
}

impl SectionItem for StringData {
    const KIND: SectionKind = SectionKind::StringData;

    fn read(bytes: &[u8], ix: &mut usize) -> Result<StringData, DexError> {
        let utf16_size = read_uleb128(bytes, ix)?;
        let mut data = vec![];
        loop {
            let u = read_u1(bytes, ix)?;
            if u == 0 {
                break;
            }
            data.push(u);
        }
        Ok(StringData { data, utf16_size })
    }

    fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = write_uleb128(bytes, self.utf16_size);
        c += write_x(bytes, &self.data);
        c += write_u1(bytes, 0);
        c
    }

    fn adjust(&self, _map: &IndexMap) -> Result<StringData, DexError> {
        Ok(self.clone())
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TypeId {
    pub descriptor_idx: u32,
}

impl SectionItem for TypeId {
    const KIND: SectionKind = SectionKind::TypeIds;

    fn read(bytes: &[u8], ix: &mut usize) -> Result<TypeId, DexError> {
        Ok(TypeId { descriptor_idx: read_u4(bytes, ix)? })
    }

    fn write(&self, bytes: &mut Vec<u8>) -> usize {
        write_u4(bytes, self.descriptor_idx)
    }

    fn byte_size(&self) -> usize {
        4
    }

    fn adjust(&self, map: &IndexMap) -> Result<TypeId, DexError> {
        Ok(TypeId { descriptor_idx: map.string(self.descriptor_idx)? })
    }
}


#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TypeList {
    pub types: Vec<u16>,
}

impl SectionItem for TypeList {
    const KIND: SectionKind = SectionKind::TypeLists;

    fn read(bytes: &[u8], ix: &mut usize) -> Result<TypeList, DexError> {
        let size = read_u4(bytes, ix)?;
        let mut types = Vec::with_capacity(size.min(0x1_0000) as usize);
        for _ in 0..size {
            types.push(read_u2(bytes, ix)?);
        }
        Ok(TypeList { types })
    }

    fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = write_u4(bytes, self.types.len() as u32);
        for t in &self.types {
            c += write_u2(bytes, *t);
        }
        c
    }

    fn byte_size(&self) -> usize {
        4 + 2 * self.types.len()
    }

    fn adjust(&self, map: &IndexMap) -> Result<TypeList, DexError> {
        let types = self
            .types
            .iter()
            .map(|t| map.adjust_u16(SectionKind::TypeIds, *t))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TypeList { types })
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtoId {
    pub shorty_idx: u32,
    pub return_type_idx: u32,
    pub parameters_off: u32,
}

impl SectionItem for ProtoId {
    const KIND: SectionKind = SectionKind::ProtoIds;

    fn read(bytes: &[u8], ix: &mut usize) -> Result<ProtoId, DexError> {
        Ok(ProtoId {
            shorty_idx: read_u4(bytes, ix)?,
            return_type_idx: read_u4(bytes, ix)?,
            parameters_off: read_u4(bytes, ix)?,
        })
    }

    fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = write_u4(bytes, self.shorty_idx);
        c += write_u4(bytes, self.return_type_idx);
        c += write_u4(bytes, self.parameters_off);
        c
    }

    fn byte_size(&self) -> usize {
        12
    }

    fn adjust(&self, map: &IndexMap) -> Result<ProtoId, DexError> {
        Ok(ProtoId {
            shorty_idx: map.string(self.shorty_idx)?,
            return_type_idx: map.type_index(self.return_type_idx)?,
            parameters_off: map.adjust(SectionKind::TypeLists, self.parameters_off)?,
        })
    }
}


/// `field_id_item`. Ordered by class, then name, then type, as dex requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldId {
    pub class_idx: u16,
    pub type_idx: u16,
    pub name_idx: u32,
}

impl Ord for FieldId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.class_idx
            .cmp(&other.class_idx)
            .then(self.name_idx.cmp(&other.name_idx))
            .then(self.type_idx.cmp(&other.type_idx))
    }
}

impl PartialOrd for FieldId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl SectionItem for FieldId {
    const KIND: SectionKind = SectionKind::FieldIds;

    fn read(bytes: &[u8], ix: &mut usize) -> Result<FieldId, DexError> {
        Ok(FieldId {
            class_idx: read_u2(bytes, ix)?,
            type_idx: read_u2(bytes, ix)?,
            name_idx: read_u4(bytes, ix)?,
        })
    }

    fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = write_u2(bytes, self.class_idx);
        c += write_u2(bytes, self.type_idx);
        c += write_u4(bytes, self.name_idx);
        c
    }

    fn byte_size(&self) -> usize {
        8
    }

    fn adjust(&self, map: &IndexMap) -> Result<FieldId, DexError> {
        Ok(FieldId {
            class_idx: map.adjust_u16(SectionKind::TypeIds, self.class_idx)?,
            type_idx: map.adjust_u16(SectionKind::TypeIds, self.type_idx)?,
            name_idx: map.string(self.name_idx)?,
        })
    }
}


/// `method_id_item`. Ordered by class, then name, then prototype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodId {
    pub class_idx: u16,
    pub proto_idx: u16,
    pub name_idx: u32,
}

impl Ord for MethodId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.class_idx
            .cmp(&other.class_idx)
            .then(self.name_idx.cmp(&other.name_idx))
            .then(self.proto_idx.cmp(&other.proto_idx))
    }
}

impl PartialOrd for MethodId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl SectionItem for MethodId {
    const KIND: SectionKind = SectionKind::MethodIds;

    fn read(bytes: &[u8], ix: &mut usize) -> Result<MethodId, DexError> {
        Ok(MethodId {
            class_idx: read_u2(bytes, ix)?,
            proto_idx: read_u2(bytes, ix)?,
            name_idx: read_u4(bytes, ix)?,
        })
    }

    fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = write_u2(bytes, self.class_idx);
        c += write_u2(bytes, self.proto_idx);
        c += write_u4(bytes, self.name_idx);
        c
    }

    fn byte_size(&self) -> usize {
        8
    }

    fn adjust(&self, map: &IndexMap) -> Result<MethodId, DexError> {
        Ok(MethodId {
            class_idx: map.adjust_u16(SectionKind::TypeIds, self.class_idx)?,
            proto_idx: map.adjust_u16(SectionKind::ProtoIds, self.proto_idx)?,
            name_idx: map.string(self.name_idx)?,
        })
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClassDef {
    // The class_def_item struct
    pub class_idx: u32,
    pub access_flags: u32,
    pub superclass_idx: u32,
    pub interfaces_off: u32,
    pub source_file_idx: u32,
    pub annotations_off: u32,
    pub class_data_off: u32,
    pub static_values_off: u32,
}

impl SectionItem for ClassDef {
    const KIND: SectionKind = SectionKind::ClassDefs;

    fn read(bytes: &[u8], ix: &mut usize) -> Result<ClassDef, DexError> {
        Ok(ClassDef {
            class_idx: read_u4(bytes, ix)?,
            access_flags: read_u4(bytes, ix)?,
            superclass_idx: read_u4(bytes, ix)?,
            interfaces_off: read_u4(bytes, ix)?,
            source_file_idx: read_u4(bytes, ix)?,
            annotations_off: read_u4(bytes, ix)?,
            class_data_off: read_u4(bytes, ix)?,
            static_values_off: read_u4(bytes, ix)?,
        })
    }

    fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_u4(bytes, self.class_idx);
        c += write_u4(bytes, self.access_flags);
        c += write_u4(bytes, self.superclass_idx);
        c += write_u4(bytes, self.interfaces_off);
        c += write_u4(bytes, self.source_file_idx);
        c += write_u4(bytes, self.annotations_off);
        c += write_u4(bytes, self.class_data_off);
        c += write_u4(bytes, self.static_values_off);
        c
    }

    fn byte_size(&self) -> usize {
        32
    }

    fn adjust(&self, map: &IndexMap) -> Result<ClassDef, DexError> {
        Ok(ClassDef {
            class_idx: map.type_index(self.class_idx)?,
            access_flags: self.access_flags,
            superclass_idx: map.type_index(self.superclass_idx)?,
            interfaces_off: map.adjust(SectionKind::TypeLists, self.interfaces_off)?,
            source_file_idx: map.string(self.source_file_idx)?,
            annotations_off: map.adjust(SectionKind::AnnotationsDirectories, self.annotations_off)?,
            class_data_off: map.adjust(SectionKind::ClassData, self.class_data_off)?,
            static_values_off: map.adjust(SectionKind::EncodedArrays, self.static_values_off)?,
        })
    }
}


/// `encoded_array_item`, kept as raw bytes. Static field initializers live here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EncodedArrayItem {
    pub bytes: Vec<u8>,
}

impl SectionItem for EncodedArrayItem {
    const KIND: SectionKind = SectionKind::EncodedArrays;

    fn read(bytes: &[u8], ix: &mut usize) -> Result<EncodedArrayItem, DexError> {
        Ok(EncodedArrayItem { bytes: read_encoded_array_bytes(bytes, ix)? })
    }

    fn write(&self, bytes: &mut Vec<u8>) -> usize {
        write_x(bytes, &self.bytes)
    }

    fn byte_size(&self) -> usize {
        self.bytes.len()
    }

    fn adjust(&self, map: &IndexMap) -> Result<EncodedArrayItem, DexError> {
        let mut out = Vec::with_capacity(self.bytes.len());
        let mut ix = 0;
        transform_encoded_array(&self.bytes, &mut ix, &mut out, &mut |kind, idx| map.adjust(kind, idx))?;
        Ok(EncodedArrayItem { bytes: out })
    }
}
