/* Dex container: header, map list and section access */

use std::fs;
use std::path::Path;

use log::debug;

use crate::dex::builder::compute_sha1;
use crate::dex::error::DexError;
use crate::dex::items::{SectionItem, StringData, TypeId};
use crate::dex::section::{SectionKind, HEADER_SIZE};
use crate::dex::{align4, read_u2, read_u4, read_x, write_u4, write_x};

/* Constants */
pub const DEX_FILE_MAGIC: [u8; 8] = [0x64, 0x65, 0x78, 0x0a, 0x30, 0x33, 0x35, 0x00];
pub const ENDIAN_CONSTANT: u32 = 0x12345678;
pub const REVERSE_ENDIAN_CONSTANT: u32 = 0x78563412;

/* Map codes of sections the engine has no remap rules for */
const TYPE_CALL_SITE_ID_ITEM: u16 = 0x0007;
const TYPE_METHOD_HANDLE_ITEM: u16 = 0x0008;
const TYPE_HIDDENAPI_CLASS_DATA_ITEM: u16 = 0xf000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 8],
    pub checksum: u32,
    pub signature: [u8; 20],
    pub file_size: u32,
    pub header_size: u32,
    pub endian_tag: u32,
    pub link_size: u32,
    pub link_off: u32,
    pub map_off: u32,
    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,
    pub data_size: u32,
    pub data_off: u32,
}

impl Header
{
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<Header, DexError>
    {
        if bytes.len() < HEADER_SIZE as usize {
            fail!("Not enough bytes for header ({} < {})", bytes.len(), HEADER_SIZE);
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&read_x(bytes, ix, 8)?);
        if magic[0] != 0x64 || magic[1] != 0x65 || magic[2] != 0x78 || magic[3] != 0x0a {
            fail!("Invalid magic value {:02x?}", magic);
        }
        let checksum = read_u4(bytes, ix)?;
        let mut signature = [0u8; 20];
        signature.copy_from_slice(&read_x(bytes, ix, 20)?);

        Ok(Header {
            magic,
            checksum,
            signature,
            file_size: read_u4(bytes, ix)?,
            header_size: read_u4(bytes, ix)?,
            endian_tag: read_u4(bytes, ix)?,
            link_size: read_u4(bytes, ix)?,
            link_off: read_u4(bytes, ix)?,
            map_off: read_u4(bytes, ix)?,
            string_ids_size: read_u4(bytes, ix)?,
            string_ids_off: read_u4(bytes, ix)?,
            type_ids_size: read_u4(bytes, ix)?,
            type_ids_off: read_u4(bytes, ix)?,
            proto_ids_size: read_u4(bytes, ix)?,
            proto_ids_off: read_u4(bytes, ix)?,
            field_ids_size: read_u4(bytes, ix)?,
            field_ids_off: read_u4(bytes, ix)?,
            method_ids_size: read_u4(bytes, ix)?,
            method_ids_off: read_u4(bytes, ix)?,
            class_defs_size: read_u4(bytes, ix)?,
            class_defs_off: read_u4(bytes, ix)?,
            data_size: read_u4(bytes, ix)?,
            data_off: read_u4(bytes, ix)?,
        })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize
    {
        let mut c = 0;
        c += write_x(bytes, &self.magic);
        c += write_u4(bytes, self.checksum);
        c += write_x(bytes, &self.signature);
        c += write_u4(bytes, self.file_size);
        c += write_u4(bytes, self.header_size);
        c += write_u4(bytes, self.endian_tag);
        c += write_u4(bytes, self.link_size);
        c += write_u4(bytes, self.link_off);
        c += write_u4(bytes, self.map_off);
        c += write_u4(bytes, self.string_ids_size);
        c += write_u4(bytes, self.string_ids_off);
        c += write_u4(bytes, self.type_ids_size);
        c += write_u4(bytes, self.type_ids_off);
        c += write_u4(bytes, self.proto_ids_size);
        c += write_u4(bytes, self.proto_ids_off);
        c += write_u4(bytes, self.field_ids_size);
        c += write_u4(bytes, self.field_ids_off);
        c += write_u4(bytes, self.method_ids_size);
        c += write_u4(bytes, self.method_ids_off);
        c += write_u4(bytes, self.class_defs_size);
        c += write_u4(bytes, self.class_defs_off);
        c += write_u4(bytes, self.data_size);
        c += write_u4(bytes, self.data_off);
        c
    }
}


/// One map list entry with the byte size of its section filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocEntry {
    pub kind: SectionKind,
    pub offset: u32,
    pub count: u32,
    /// Distance to the next section, or to the end of the file for the last one.
    pub byte_count: u32,
}

/// The map list, ordered by offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableOfContents {
    entries: Vec<TocEntry>,
}

impl TableOfContents {
    pub fn read(bytes: &[u8], map_off: u32, file_size: u32) -> Result<TableOfContents, DexError> {
        if map_off == 0 {
            fail!("Container has no map list");
        }
        if map_off % 4 != 0 || map_off >= file_size {
            fail!("Map list offset {:#x} is misaligned or out of bounds", map_off);
        }

        let mut ix = map_off as usize;
        let size = read_u4(bytes, &mut ix)?;
        let mut entries = Vec::new();
        for _ in 0..size {
            let type_code = read_u2(bytes, &mut ix)?;
            read_u2(bytes, &mut ix)?; // unused
            let count = read_u4(bytes, &mut ix)?;
            let offset = read_u4(bytes, &mut ix)?;

            let kind = match SectionKind::from_type_code(type_code) {
                Some(kind) => kind,
                None => match type_code {
                    TYPE_CALL_SITE_ID_ITEM | TYPE_METHOD_HANDLE_ITEM | TYPE_HIDDENAPI_CLASS_DATA_ITEM => {
                        fail!(Unsupported, "Map list carries section type {:#06x} which cannot be remapped", type_code)
                    }
                    _ => fail!(Unsupported, "Unknown map item type {:#06x}", type_code),
                },
            };
            if offset > file_size {
                fail!("Section {} starts past the end of the file ({:#x})", kind, offset);
            }
            if kind.is_aligned() && offset % 4 != 0 {
                fail!("Section {} at {:#x} is not four byte aligned", kind, offset);
            }
            if entries.iter().any(|e: &TocEntry| e.kind == kind) {
                fail!("Section {} appears twice in the map list", kind);
            }
            entries.push(TocEntry { kind, offset, count, byte_count: 0 });
        }

        entries.sort_by_key(|e| (e.offset, e.count));
        for i in 0..entries.len() {
            let end = entries.get(i + 1).map_or(file_size, |next| next.offset);
            entries[i].byte_count = end - entries[i].offset;
        }
        // no item is smaller than one byte
        if let Some(e) = entries.iter().find(|e| e.count > e.byte_count) {
            fail!("Section {} claims {} items in {} bytes", e.kind, e.count, e.byte_count);
        }

        Ok(TableOfContents { entries })
    }

    pub fn get(&self, kind: SectionKind) -> Option<&TocEntry> {
        self.entries.iter().find(|e| e.kind == kind && e.count > 0)
    }

    pub fn count(&self, kind: SectionKind) -> u32 {
        self.get(kind).map_or(0, |e| e.count)
    }

    pub fn entries(&self) -> &[TocEntry] {
        &self.entries
    }
}


#[derive(Debug, Clone)]
pub struct DexFile {
    pub header: Header,
    pub toc: TableOfContents,
    pub data: Vec<u8>,
}

impl DexFile {

    fn read(bytes: &[u8]) -> Result<DexFile, DexError>
    {
        let mut ix = 0;
        let header = Header::read(bytes, &mut ix)?;

        if header.endian_tag == REVERSE_ENDIAN_CONSTANT {
            fail!(Unsupported, "Big endian containers are not supported");
        }
        if header.endian_tag != ENDIAN_CONSTANT {
            fail!("Invalid endian tag {:#x}", header.endian_tag);
        }
        if header.header_size != HEADER_SIZE {
            fail!("Unexpected header size {:#x}", header.header_size);
        }
        if header.file_size as usize > bytes.len() || header.file_size < HEADER_SIZE {
            fail!("Header file size {} does not match the {} bytes available", header.file_size, bytes.len());
        }

        let file_size = header.file_size as usize;
        let toc = TableOfContents::read(bytes, header.map_off, header.file_size)?;
        let dex = DexFile { header, toc, data: bytes[..file_size].to_vec() };

        // id tables must agree with what the header announces
        for (kind, size, off) in [
            (SectionKind::StringIds, dex.header.string_ids_size, dex.header.string_ids_off),
            (SectionKind::TypeIds, dex.header.type_ids_size, dex.header.type_ids_off),
            (SectionKind::ProtoIds, dex.header.proto_ids_size, dex.header.proto_ids_off),
            (SectionKind::FieldIds, dex.header.field_ids_size, dex.header.field_ids_off),
            (SectionKind::MethodIds, dex.header.method_ids_size, dex.header.method_ids_off),
            (SectionKind::ClassDefs, dex.header.class_defs_size, dex.header.class_defs_off),
        ] {
            let entry = dex.toc.get(kind);
            let (count, offset) = entry.map_or((0, 0), |e| (e.count, e.offset));
            if count != size || (size > 0 && offset != off) {
                fail!("Header and map list disagree on {}", kind);
            }
            if let (Some(e), Some(item_size)) = (entry, kind.fixed_item_size()) {
                if e.count as u64 * item_size as u64 > e.byte_count as u64 {
                    fail!("Section {} overruns the next section", kind);
                }
            }
        }

        debug!(
            "Loaded container: {} bytes, {} strings, {} types, {} methods, {} classes",
            dex.data.len(),
            dex.header.string_ids_size,
            dex.header.type_ids_size,
            dex.header.method_ids_size,
            dex.header.class_defs_size
        );
        Ok(dex)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<DexFile, DexError>
    {
        DexFile::read(bytes)
    }

    pub fn from_file(path: &Path) -> Result<DexFile, DexError>
    {
        let bytes = fs::read(path)
            .map_err(|e| DexError::with_context(e.into(), format!("reading {}", path.display())))?;
        DexFile::from_bytes(&bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn section(&self, kind: SectionKind) -> Option<&TocEntry> {
        self.toc.get(kind)
    }

    /// Number of items in a section; string data is counted through the string ids.
    pub fn count(&self, kind: SectionKind) -> u32 {
        match kind {
            SectionKind::StringData => self.toc.count(SectionKind::StringIds),
            _ => self.toc.count(kind),
        }
    }

    /// SHA-1 over everything after the signature field, recomputed from the bytes.
    pub fn computed_signature(&self) -> [u8; 20] {
        compute_sha1(&self.data[32..])
    }

    /// Decode every item of the section for `T`, paired with its key: the ordinal for
    /// index-addressed kinds and the absolute offset for offset-addressed ones.
    pub fn read_items<T: SectionItem>(&self) -> Result<Vec<(u32, T)>, DexError> {
        let kind = T::KIND;
        let located = |e: DexError, key: u32| e.at(kind, Some(key));

        if kind == SectionKind::StringData {
            let entry = match self.toc.get(SectionKind::StringIds) {
                Some(e) => *e,
                None => return Ok(vec![]),
            };
            let mut items = Vec::with_capacity(entry.count as usize);
            let mut ix = entry.offset as usize;
            for i in 0..entry.count {
                let mut data_ix = read_u4(&self.data, &mut ix)? as usize;
                items.push((i, T::read(&self.data, &mut data_ix).map_err(|e| located(e, i))?));
            }
            return Ok(items);
        }

        let entry = match self.toc.get(kind) {
            Some(e) => *e,
            None => return Ok(vec![]),
        };
        let mut items = Vec::with_capacity(entry.count as usize);
        let mut ix = entry.offset as usize;
        for i in 0..entry.count {
            if kind.is_aligned() {
                ix = align4(ix as u32) as usize;
            }
            let key = if kind.is_offset_addressed() { ix as u32 } else { i };
            items.push((key, T::read(&self.data, &mut ix).map_err(|e| located(e, key))?));
        }
        if ix > (entry.offset + entry.byte_count) as usize {
            fail!("Section {} runs {} bytes past its extent", kind, ix - (entry.offset + entry.byte_count) as usize);
        }
        Ok(items)
    }

    /// Decode one offset-addressed item wherever it lives.
    pub fn read_item_at<T: SectionItem>(&self, offset: u32) -> Result<T, DexError> {
        let mut ix = offset as usize;
        T::read(&self.data, &mut ix).map_err(|e| e.at(T::KIND, Some(offset)))
    }

    pub fn string(&self, idx: u32) -> Result<String, DexError> {
        let entry = match self.toc.get(SectionKind::StringIds) {
            Some(e) if idx < e.count => *e,
            _ => fail!("String index {} out of range", idx),
        };
        let mut ix = (entry.offset + idx * 4) as usize;
        let mut data_ix = read_u4(&self.data, &mut ix)? as usize;
        StringData::read(&self.data, &mut data_ix)?.to_string()
    }

    /// Descriptor of a type id, e.g. `Lcom/example/Foo;`.
    pub fn type_descriptor(&self, type_idx: u32) -> Result<String, DexError> {
        let entry = match self.toc.get(SectionKind::TypeIds) {
            Some(e) if type_idx < e.count => *e,
            _ => fail!("Type index {} out of range", type_idx),
        };
        let mut ix = (entry.offset + type_idx * 4) as usize;
        let type_id = TypeId::read(&self.data, &mut ix)?;
        self.string(type_id.descriptor_idx)
            .map_err(|e| DexError::with_context(e, format!("type {}", type_idx)))
    }
}
