/* Container layout and finishing: section placement, map list, header and hashes */

use adler::adler32_slice;
use sha1::{Digest, Sha1};

use crate::dex::annotations::{AnnotationItem, AnnotationSetItem, AnnotationSetRefList, AnnotationsDirectoryItem};
use crate::dex::code::{ClassDataItem, CodeItem, DebugInfoItem};
use crate::dex::dex_file::{Header, DEX_FILE_MAGIC, ENDIAN_CONSTANT};
use crate::dex::error::DexError;
use crate::dex::items::{ClassDef, EncodedArrayItem, FieldId, MethodId, ProtoId, SectionItem, StringData, TypeId, TypeList};
use crate::dex::section::{SectionKind, HEADER_SIZE, ID_TABLES};
use crate::dex::{align4, write_u2, write_u4};
use crate::patch::remap::IndexMap;

#[derive(Debug, Clone, Copy)]
struct MapItem {
    kind: SectionKind,
    size: u32,
    offset: u32,
}

impl MapItem {
    fn new(kind: SectionKind, size: u32, offset: u32) -> Self {
        MapItem { kind, size, offset }
    }
}

fn write_map_list(entries: &[MapItem]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(4 + entries.len() * 12);
    write_u4(&mut bytes, entries.len() as u32);
    for item in entries {
        write_u2(&mut bytes, item.kind.type_code());
        write_u2(&mut bytes, 0);
        write_u4(&mut bytes, item.size);
        write_u4(&mut bytes, item.offset);
    }
    bytes
}

/// Byte size of a map list with `entries` entries.
pub(crate) fn map_list_size(entries: usize) -> u32 {
    4 + 12 * entries as u32
}

fn overwrite_header(buf: &mut [u8], header: &Header) {
    let mut header_bytes = Vec::with_capacity(HEADER_SIZE as usize);
    header.write(&mut header_bytes);
    buf[..HEADER_SIZE as usize].copy_from_slice(&header_bytes);
}

pub(crate) fn compute_sha1(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}


/// Offsets of the id tables, which sit back to back right after the header.
#[derive(Debug, Clone, Default)]
pub(crate) struct IdLayout {
    offsets: Vec<(SectionKind, u32)>,
    data_off: u32,
}

impl IdLayout {
    pub(crate) fn new(count: impl Fn(SectionKind) -> u32) -> IdLayout {
        let mut offsets = Vec::with_capacity(ID_TABLES.len());
        let mut cursor = HEADER_SIZE;
        for kind in ID_TABLES {
            let n = count(kind);
            let item_size = kind.fixed_item_size().unwrap_or(0);
            offsets.push((kind, if n > 0 { cursor } else { 0 }));
            cursor += n * item_size;
        }
        IdLayout { offsets, data_off: cursor }
    }

    /// Offset of an id table, 0 when it is empty.
    pub(crate) fn offset(&self, kind: SectionKind) -> u32 {
        self.offsets.iter().find(|(k, _)| *k == kind).map_or(0, |(_, off)| *off)
    }

    pub(crate) fn data_off(&self) -> u32 {
        self.data_off
    }
}


/// Placement arithmetic for one section: where the next item goes and what its key is.
#[derive(Debug, Clone)]
pub(crate) struct SectionCursor {
    kind: SectionKind,
    base: u32,
    offset: u32,
    count: u32,
}

impl SectionCursor {
    pub(crate) fn new(kind: SectionKind, base: u32) -> SectionCursor {
        SectionCursor { kind, base, offset: base, count: 0 }
    }

    /// Reserve `size` bytes for the next item, returning its key and byte offset.
    pub(crate) fn place(&mut self, size: u32) -> Result<(u32, u32), DexError> {
        let start = if self.kind.is_aligned() { self.offset.checked_add(3).map(|o| o & !3) } else { Some(self.offset) };
        let (offset, end) = match start.and_then(|o| o.checked_add(size).map(|end| (o, end))) {
            Some(placed) => placed,
            None => fail!(Invariant, "{} item of {} bytes at {:#x} overflows the container", self.kind, size, self.offset),
        };
        let key = if self.kind.is_offset_addressed() { offset } else { self.count };
        self.offset = end;
        self.count += 1;
        Ok((key, offset))
    }

    pub(crate) fn count(&self) -> u32 {
        self.count
    }

    /// Section offset as recorded in headers: 0 for an empty section.
    pub(crate) fn patched_offset(&self) -> u32 {
        if self.count == 0 { 0 } else { self.base }
    }

    /// Footprint of the section, padded so the next one starts four byte aligned.
    pub(crate) fn patched_size(&self) -> u32 {
        if self.count == 0 { 0 } else { align4(self.offset - self.base) }
    }
}


/// A container under construction. Sections are written at absolute offsets in any order;
/// `finish` appends the map list and fills in the header.
#[derive(Debug)]
pub(crate) struct DexImage {
    bytes: Vec<u8>,
    placed: Vec<MapItem>,
    /// No byte is written at or beyond this offset.
    limit: u32,
}

impl DexImage {
    pub(crate) fn new() -> DexImage {
        DexImage::with_limit(u32::MAX)
    }

    pub(crate) fn with_limit(limit: u32) -> DexImage {
        DexImage { bytes: vec![0; HEADER_SIZE as usize], placed: Vec::new(), limit }
    }

    fn write_at(&mut self, offset: u32, data: &[u8]) -> Result<(), DexError> {
        let start = offset as usize;
        let end = match u32::try_from(data.len()).ok().and_then(|len| offset.checked_add(len)) {
            Some(end) if end <= self.limit => end as usize,
            _ => fail!(Invariant, "{} bytes at {:#x} run past the {:#x} byte limit", data.len(), offset, self.limit),
        };
        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }
        self.bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn writer(&mut self, kind: SectionKind, base: u32) -> SectionWriter<'_> {
        SectionWriter { image: self, cursor: SectionCursor::new(kind, base) }
    }

    fn placed(&self, kind: SectionKind) -> Option<&MapItem> {
        self.placed.iter().find(|m| m.kind == kind)
    }

    pub(crate) fn finish(mut self, magic: [u8; 8]) -> Result<Vec<u8>, DexError> {
        let mut data_off = HEADER_SIZE;
        for kind in ID_TABLES {
            if let (Some(m), Some(item_size)) = (self.placed(kind), kind.fixed_item_size()) {
                data_off = data_off.max(m.offset + m.size * item_size);
            }
        }
        if let Some(m) = self.placed.iter().find(|m| m.kind.is_data() && m.offset < data_off) {
            fail!(Invariant, "Section {} at {:#x} overlaps the id tables ending at {:#x}", m.kind, m.offset, data_off);
        }
        if self.bytes.len() < data_off as usize {
            self.bytes.resize(data_off as usize, 0);
        }

        let map_off = align4(self.bytes.len() as u32);
        self.bytes.resize(map_off as usize, 0);

        let mut map_items = vec![MapItem::new(SectionKind::Header, 1, 0)];
        let mut rest = self.placed.clone();
        rest.sort_by_key(|m| m.offset);
        map_items.extend(rest);
        map_items.push(MapItem::new(SectionKind::MapList, 1, map_off));
        let map_bytes = write_map_list(&map_items);
        self.bytes.extend_from_slice(&map_bytes);

        let id = |kind: SectionKind| self.placed(kind).map_or((0, 0), |m| (m.size, m.offset));
        let (string_ids_size, string_ids_off) = id(SectionKind::StringIds);
        let (type_ids_size, type_ids_off) = id(SectionKind::TypeIds);
        let (proto_ids_size, proto_ids_off) = id(SectionKind::ProtoIds);
        let (field_ids_size, field_ids_off) = id(SectionKind::FieldIds);
        let (method_ids_size, method_ids_off) = id(SectionKind::MethodIds);
        let (class_defs_size, class_defs_off) = id(SectionKind::ClassDefs);
        let file_size = self.bytes.len() as u32;

        let mut header = Header {
            magic,
            checksum: 0,
            signature: [0; 20],
            file_size,
            header_size: HEADER_SIZE,
            endian_tag: ENDIAN_CONSTANT,
            link_size: 0,
            link_off: 0,
            map_off,
            string_ids_size,
            string_ids_off,
            type_ids_size,
            type_ids_off,
            proto_ids_size,
            proto_ids_off,
            field_ids_size,
            field_ids_off,
            method_ids_size,
            method_ids_off,
            class_defs_size,
            class_defs_off,
            data_size: file_size - data_off,
            data_off,
        };

        overwrite_header(&mut self.bytes, &header);
        header.signature = compute_sha1(&self.bytes[32..]);
        overwrite_header(&mut self.bytes, &header);
        header.checksum = adler32_slice(&self.bytes[12..]);
        overwrite_header(&mut self.bytes, &header);

        Ok(self.bytes)
    }
}

/// Writes the items of one section into a `DexImage`.
pub(crate) struct SectionWriter<'a> {
    image: &'a mut DexImage,
    cursor: SectionCursor,
}

impl SectionWriter<'_> {
    /// Append an item and return its key. String data also fills in its string id.
    pub(crate) fn write<T: SectionItem>(&mut self, item: &T) -> Result<u32, DexError> {
        let mut buf = Vec::new();
        item.write(&mut buf);
        let (key, offset) = self.cursor.place(buf.len() as u32)?;
        self.image.write_at(offset, &buf)?;
        if T::KIND == SectionKind::StringData {
            self.image.write_at(HEADER_SIZE + 4 * key, &offset.to_le_bytes())?;
        }
        Ok(key)
    }

    /// Record the section in the map list and return its padded size.
    pub(crate) fn finish(self) -> u32 {
        let count = self.cursor.count();
        if count > 0 {
            let kind = self.cursor.kind;
            self.image.placed.push(MapItem::new(kind, count, self.cursor.base));
            if kind == SectionKind::StringData {
                self.image.placed.push(MapItem::new(SectionKind::StringIds, count, HEADER_SIZE));
            }
        }
        self.cursor.patched_size()
    }
}


/// Builds a container in canonical layout from decoded items: header, id tables, data
/// sections in dependency order, map list.
///
/// Index-addressed items are referenced by their ordinal as usual. Offset-addressed items
/// get a handle from their `add_*` call (ordinal + 1) which is turned into the real
/// offset when the container is laid out; 0 still means "no reference".
#[derive(Debug, Clone)]
pub struct DexBuilder {
    magic: [u8; 8],
    string_data: Vec<StringData>,
    type_ids: Vec<TypeId>,
    type_lists: Vec<TypeList>,
    proto_ids: Vec<ProtoId>,
    field_ids: Vec<FieldId>,
    method_ids: Vec<MethodId>,
    annotations: Vec<AnnotationItem>,
    annotation_sets: Vec<AnnotationSetItem>,
    annotation_set_ref_lists: Vec<AnnotationSetRefList>,
    annotations_directories: Vec<AnnotationsDirectoryItem>,
    encoded_arrays: Vec<EncodedArrayItem>,
    debug_info: Vec<DebugInfoItem>,
    code: Vec<CodeItem>,
    class_data: Vec<ClassDataItem>,
    class_defs: Vec<ClassDef>,
}

impl Default for DexBuilder {
    fn default() -> Self {
        DexBuilder {
            magic: DEX_FILE_MAGIC,
            string_data: vec![],
            type_ids: vec![],
            type_lists: vec![],
            proto_ids: vec![],
            field_ids: vec![],
            method_ids: vec![],
            annotations: vec![],
            annotation_sets: vec![],
            annotation_set_ref_lists: vec![],
            annotations_directories: vec![],
            encoded_arrays: vec![],
            debug_info: vec![],
            code: vec![],
            class_data: vec![],
            class_defs: vec![],
        }
    }
}

fn push<T>(items: &mut Vec<T>, item: T) -> u32 {
    items.push(item);
    items.len() as u32 - 1
}

fn push_handle<T>(items: &mut Vec<T>, item: T) -> u32 {
    items.push(item);
    items.len() as u32
}

impl DexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_magic(mut self, magic: [u8; 8]) -> Self {
        self.magic = magic;
        self
    }

    pub fn add_string(&mut self, s: &str) -> u32 {
        push(&mut self.string_data, StringData::new(s))
    }

    pub fn add_type(&mut self, descriptor_idx: u32) -> u32 {
        push(&mut self.type_ids, TypeId { descriptor_idx })
    }

    pub fn add_proto(&mut self, proto: ProtoId) -> u32 {
        push(&mut self.proto_ids, proto)
    }

    pub fn add_field(&mut self, field: FieldId) -> u32 {
        push(&mut self.field_ids, field)
    }

    pub fn add_method(&mut self, method: MethodId) -> u32 {
        push(&mut self.method_ids, method)
    }

    pub fn add_class_def(&mut self, class_def: ClassDef) -> u32 {
        push(&mut self.class_defs, class_def)
    }

    pub fn add_type_list(&mut self, list: TypeList) -> u32 {
        push_handle(&mut self.type_lists, list)
    }

    pub fn add_annotation(&mut self, annotation: AnnotationItem) -> u32 {
        push_handle(&mut self.annotations, annotation)
    }

    pub fn add_annotation_set(&mut self, set: AnnotationSetItem) -> u32 {
        push_handle(&mut self.annotation_sets, set)
    }

    pub fn add_annotation_set_ref_list(&mut self, list: AnnotationSetRefList) -> u32 {
        push_handle(&mut self.annotation_set_ref_lists, list)
    }

    pub fn add_annotations_directory(&mut self, dir: AnnotationsDirectoryItem) -> u32 {
        push_handle(&mut self.annotations_directories, dir)
    }

    pub fn add_encoded_array(&mut self, array: EncodedArrayItem) -> u32 {
        push_handle(&mut self.encoded_arrays, array)
    }

    pub fn add_debug_info(&mut self, info: DebugInfoItem) -> u32 {
        push_handle(&mut self.debug_info, info)
    }

    pub fn add_code(&mut self, code: CodeItem) -> u32 {
        push_handle(&mut self.code, code)
    }

    pub fn add_class_data(&mut self, data: ClassDataItem) -> u32 {
        push_handle(&mut self.class_data, data)
    }

    pub fn build(&self) -> Result<Vec<u8>, DexError> {
        let layout = IdLayout::new(|kind| match kind {
            SectionKind::StringIds => self.string_data.len() as u32,
            SectionKind::TypeIds => self.type_ids.len() as u32,
            SectionKind::ProtoIds => self.proto_ids.len() as u32,
            SectionKind::FieldIds => self.field_ids.len() as u32,
            SectionKind::MethodIds => self.method_ids.len() as u32,
            SectionKind::ClassDefs => self.class_defs.len() as u32,
            _ => 0,
        });

        let mut placement = Placement {
            image: DexImage::new(),
            handles: IndexMap::new(),
            layout,
        };
        let mut cursor = placement.layout.data_off();

        // dependency order, which is also the physical order of the data sections
        placement.place(&self.string_data, &mut cursor)?;
        placement.place(&self.type_ids, &mut cursor)?;
        placement.place(&self.type_lists, &mut cursor)?;
        placement.place(&self.proto_ids, &mut cursor)?;
        placement.place(&self.field_ids, &mut cursor)?;
        placement.place(&self.method_ids, &mut cursor)?;
        placement.place(&self.annotations, &mut cursor)?;
        placement.place(&self.annotation_sets, &mut cursor)?;
        placement.place(&self.annotation_set_ref_lists, &mut cursor)?;
        placement.place(&self.annotations_directories, &mut cursor)?;
        placement.place(&self.encoded_arrays, &mut cursor)?;
        placement.place(&self.debug_info, &mut cursor)?;
        placement.place(&self.code, &mut cursor)?;
        placement.place(&self.class_data, &mut cursor)?;
        placement.place(&self.class_defs, &mut cursor)?;

        placement.image.finish(self.magic)
    }
}

struct Placement {
    image: DexImage,
    handles: IndexMap,
    layout: IdLayout,
}

impl Placement {
    fn place<T: SectionItem>(&mut self, items: &[T], data_cursor: &mut u32) -> Result<(), DexError> {
        let kind = T::KIND;
        let base = if kind.is_data() { *data_cursor } else { self.layout.offset(kind) };
        let mut writer = self.image.writer(kind, base);
        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            keys.push(writer.write(&item.adjust(&self.handles)?)?);
        }
        let size = writer.finish();
        if kind.is_data() {
            *data_cursor += size;
        }
        if kind.is_offset_addressed() {
            for (i, key) in keys.into_iter().enumerate() {
                self.handles.map(kind, i as u32 + 1, key);
            }
        }
        Ok(())
    }
}
