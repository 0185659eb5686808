/* Method bodies: code items, debug info and class data */

use crate::dex::error::DexError;
use crate::dex::instructions::transform_instructions;
use crate::dex::items::SectionItem;
use crate::dex::section::SectionKind;
use crate::dex::{
    read_sleb128, read_u1, read_u2, read_u4, read_uleb128, read_uleb128p1, write_sleb128, write_u1, write_u2,
    write_u4, write_uleb128, write_uleb128p1,
};
use crate::patch::remap::IndexMap;

pub const DBG_END_SEQUENCE: u8 = 0x00;
pub const DBG_ADVANCE_PC: u8 = 0x01;
pub const DBG_ADVANCE_LINE: u8 = 0x02;
pub const DBG_START_LOCAL: u8 = 0x03;
pub const DBG_START_LOCAL_EXTENDED: u8 = 0x04;
pub const DBG_END_LOCAL: u8 = 0x05;
pub const DBG_RESTART_LOCAL: u8 = 0x06;
pub const DBG_SET_PROLOGUE_END: u8 = 0x07;
pub const DBG_SET_EPILOGUE_BEGIN: u8 = 0x08;
pub const DBG_SET_FILE: u8 = 0x09;
pub const DBG_FIRST_SPECIAL: u8 = 0x0a;

/// One opcode of the debug info state machine. Optional string and type indexes use
/// `NO_INDEX` when absent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugOp {
    AdvancePc(u32),
    AdvanceLine(i32),
    StartLocal { register: u32, name_idx: u32, type_idx: u32 },
    StartLocalExtended { register: u32, name_idx: u32, type_idx: u32, sig_idx: u32 },
    EndLocal(u32),
    RestartLocal(u32),
    SetPrologueEnd,
    SetEpilogueBegin,
    SetFile(u32),
    Special(u8),
}

fn read_optional_index(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError> {
    Ok(read_uleb128p1(bytes, ix)? as u32)
}

fn write_optional_index(bytes: &mut Vec<u8>, idx: u32) -> usize {
    write_uleb128p1(bytes, idx as i32)
}

impl DebugOp {
    fn read(opcode: u8, bytes: &[u8], ix: &mut usize) -> Result<DebugOp, DexError> {
        Ok(match opcode {
            DBG_ADVANCE_PC => DebugOp::AdvancePc(read_uleb128(bytes, ix)?),
            DBG_ADVANCE_LINE => DebugOp::AdvanceLine(read_sleb128(bytes, ix)?),
            DBG_START_LOCAL => DebugOp::StartLocal {
                register: read_uleb128(bytes, ix)?,
                name_idx: read_optional_index(bytes, ix)?,
                type_idx: read_optional_index(bytes, ix)?,
            },
            DBG_START_LOCAL_EXTENDED => DebugOp::StartLocalExtended {
                register: read_uleb128(bytes, ix)?,
                name_idx: read_optional_index(bytes, ix)?,
                type_idx: read_optional_index(bytes, ix)?,
                sig_idx: read_optional_index(bytes, ix)?,
            },
            DBG_END_LOCAL => DebugOp::EndLocal(read_uleb128(bytes, ix)?),
            DBG_RESTART_LOCAL => DebugOp::RestartLocal(read_uleb128(bytes, ix)?),
            DBG_SET_PROLOGUE_END => DebugOp::SetPrologueEnd,
            DBG_SET_EPILOGUE_BEGIN => DebugOp::SetEpilogueBegin,
            DBG_SET_FILE => DebugOp::SetFile(read_optional_index(bytes, ix)?),
            special => DebugOp::Special(special),
        })
    }

    fn write(&self, bytes: &mut Vec<u8>) -> usize {
        match self {
            DebugOp::AdvancePc(addr) => write_u1(bytes, DBG_ADVANCE_PC) + write_uleb128(bytes, *addr),
            DebugOp::AdvanceLine(line) => write_u1(bytes, DBG_ADVANCE_LINE) + write_sleb128(bytes, *line),
            DebugOp::StartLocal { register, name_idx, type_idx } => {
                write_u1(bytes, DBG_START_LOCAL)
                    + write_uleb128(bytes, *register)
                    + write_optional_index(bytes, *name_idx)
                    + write_optional_index(bytes, *type_idx)
            }
            DebugOp::StartLocalExtended { register, name_idx, type_idx, sig_idx } => {
                write_u1(bytes, DBG_START_LOCAL_EXTENDED)
                    + write_uleb128(bytes, *register)
                    + write_optional_index(bytes, *name_idx)
                    + write_optional_index(bytes, *type_idx)
                    + write_optional_index(bytes, *sig_idx)
            }
            DebugOp::EndLocal(register) => write_u1(bytes, DBG_END_LOCAL) + write_uleb128(bytes, *register),
            DebugOp::RestartLocal(register) => write_u1(bytes, DBG_RESTART_LOCAL) + write_uleb128(bytes, *register),
            DebugOp::SetPrologueEnd => write_u1(bytes, DBG_SET_PROLOGUE_END),
            DebugOp::SetEpilogueBegin => write_u1(bytes, DBG_SET_EPILOGUE_BEGIN),
            DebugOp::SetFile(name_idx) => write_u1(bytes, DBG_SET_FILE) + write_optional_index(bytes, *name_idx),
            DebugOp::Special(opcode) => write_u1(bytes, *opcode),
        }
    }

    fn adjust(&self, map: &IndexMap) -> Result<DebugOp, DexError> {
        Ok(match self {
            DebugOp::StartLocal { register, name_idx, type_idx } => DebugOp::StartLocal {
                register: *register,
                name_idx: map.string(*name_idx)?,
                type_idx: map.type_index(*type_idx)?,
            },
            DebugOp::StartLocalExtended { register, name_idx, type_idx, sig_idx } => DebugOp::StartLocalExtended {
                register: *register,
                name_idx: map.string(*name_idx)?,
                type_idx: map.type_index(*type_idx)?,
                sig_idx: map.string(*sig_idx)?,
            },
            DebugOp::SetFile(name_idx) => DebugOp::SetFile(map.string(*name_idx)?),
            other => other.clone(),
        })
    }
}

/// `debug_info_item`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DebugInfoItem {
    pub line_start: u32,
    pub parameter_names: Vec<u32>,
    pub program: Vec<DebugOp>,
}

impl SectionItem for DebugInfoItem {
    const KIND: SectionKind = SectionKind::DebugInfo;

    fn read(bytes: &[u8], ix: &mut usize) -> Result<DebugInfoItem, DexError> {
        let line_start = read_uleb128(bytes, ix)?;
        let parameters_size = read_uleb128(bytes, ix)?;
        let mut parameter_names = vec![];
        for _ in 0..parameters_size {
            parameter_names.push(read_optional_index(bytes, ix)?);
        }

        let mut program = vec![];
        loop {
            let opcode = read_u1(bytes, ix)?;
            if opcode == DBG_END_SEQUENCE {
                break;
            }
            program.push(DebugOp::read(opcode, bytes, ix)?);
        }

        Ok(DebugInfoItem { line_start, parameter_names, program })
    }

    fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = write_uleb128(bytes, self.line_start);
        c += write_uleb128(bytes, self.parameter_names.len() as u32);
        for name in &self.parameter_names {
            c += write_optional_index(bytes, *name);
        }
        for op in &self.program {
            c += op.write(bytes);
        }
        c += write_u1(bytes, DBG_END_SEQUENCE);
        c
    }

    fn adjust(&self, map: &IndexMap) -> Result<DebugInfoItem, DexError> {
        Ok(DebugInfoItem {
            line_start: self.line_start,
            parameter_names: self
                .parameter_names
                .iter()
                .map(|n| map.string(*n))
                .collect::<Result<Vec<_>, _>>()?,
            program: self.program.iter().map(|op| op.adjust(map)).collect::<Result<Vec<_>, _>>()?,
        })
    }
}


#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TryItem {
    pub start_addr: u32,
    pub insn_count: u16,
    /// Index into the code item's handler list, not a byte offset.
    pub handler_index: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CatchHandler {
    /// (type index, handler address) pairs.
    pub handlers: Vec<(u32, u32)>,
    pub catch_all_addr: Option<u32>,
}

impl CatchHandler {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<CatchHandler, DexError> {
        let size = read_sleb128(bytes, ix)?;
        let mut handlers = Vec::new();
        for _ in 0..size.unsigned_abs() {
            let type_idx = read_uleb128(bytes, ix)?;
            let addr = read_uleb128(bytes, ix)?;
            handlers.push((type_idx, addr));
        }
        // a non-positive size announces a trailing catch-all
        let catch_all_addr = if size <= 0 { Some(read_uleb128(bytes, ix)?) } else { None };
        Ok(CatchHandler { handlers, catch_all_addr })
    }

    fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let count = self.handlers.len() as i32;
        let size = if self.catch_all_addr.is_some() { -count } else { count };
        let mut c = write_sleb128(bytes, size);
        for (type_idx, addr) in &self.handlers {
            c += write_uleb128(bytes, *type_idx);
            c += write_uleb128(bytes, *addr);
        }
        if let Some(addr) = self.catch_all_addr {
            c += write_uleb128(bytes, addr);
        }
        c
    }
}

/// `code_item`. Try blocks point at handlers by index, and the byte offsets are
/// recomputed on write since adjusting type indexes can change handler lengths.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CodeItem {
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub debug_info_off: u32,
    pub insns: Vec<u16>,
    pub tries: Vec<TryItem>,
    pub handlers: Vec<CatchHandler>,
}

impl CodeItem {
    /// Encoded handler list and the byte offset of every handler inside it.
    fn encode_handlers(&self) -> (Vec<u8>, Vec<u16>) {
        let mut list = Vec::new();
        write_uleb128(&mut list, self.handlers.len() as u32);
        let mut offsets = Vec::with_capacity(self.handlers.len());
        for h in &self.handlers {
            offsets.push(list.len() as u16);
            h.write(&mut list);
        }
        (list, offsets)
    }
}

impl SectionItem for CodeItem {
    const KIND: SectionKind = SectionKind::Code;

    fn read(bytes: &[u8], ix: &mut usize) -> Result<CodeItem, DexError> {
        let registers_size = read_u2(bytes, ix)?;
        let ins_size = read_u2(bytes, ix)?;
        let outs_size = read_u2(bytes, ix)?;
        let tries_size = read_u2(bytes, ix)?;
        let debug_info_off = read_u4(bytes, ix)?;
        let insns_size = read_u4(bytes, ix)?;
        let mut insns = Vec::with_capacity(insns_size.min(0x10_0000) as usize);
        for _ in 0..insns_size {
            insns.push(read_u2(bytes, ix)?);
        }

        let mut tries = vec![];
        let mut handlers = vec![];
        if tries_size > 0 {
            if insns_size & 1 != 0 {
                read_u2(bytes, ix)?; // padding
            }
            let mut raw_tries = Vec::with_capacity(tries_size as usize);
            for _ in 0..tries_size {
                let start_addr = read_u4(bytes, ix)?;
                let insn_count = read_u2(bytes, ix)?;
                let handler_off = read_u2(bytes, ix)?;
                raw_tries.push((start_addr, insn_count, handler_off));
            }

            let list_start = *ix;
            let handlers_size = read_uleb128(bytes, ix)?;
            let mut handler_offsets = Vec::new();
            for _ in 0..handlers_size {
                handler_offsets.push((*ix - list_start) as u16);
                handlers.push(CatchHandler::read(bytes, ix)?);
            }

            for (start_addr, insn_count, handler_off) in raw_tries {
                let handler_index = match handler_offsets.iter().position(|o| *o == handler_off) {
                    Some(i) => i as u16,
                    None => fail!("Try block at {:#x} points inside a catch handler ({:#x})", start_addr, handler_off),
                };
                tries.push(TryItem { start_addr, insn_count, handler_index });
            }
        }

        Ok(CodeItem { registers_size, ins_size, outs_size, debug_info_off, insns, tries, handlers })
    }

    fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_u2(bytes, self.registers_size);
        c += write_u2(bytes, self.ins_size);
        c += write_u2(bytes, self.outs_size);
        c += write_u2(bytes, self.tries.len() as u16);
        c += write_u4(bytes, self.debug_info_off);
        c += write_u4(bytes, self.insns.len() as u32);
        for i in &self.insns {
            c += write_u2(bytes, *i);
        }

        if !self.tries.is_empty() {
            if self.insns.len() & 1 != 0 {
                // single 16-bit 0 padding to make tries start on a 4-byte boundary
                c += write_u2(bytes, 0);
            }
            let (list, offsets) = self.encode_handlers();
            for t in &self.tries {
                c += write_u4(bytes, t.start_addr);
                c += write_u2(bytes, t.insn_count);
                c += write_u2(bytes, offsets.get(t.handler_index as usize).copied().unwrap_or(0));
            }
            bytes.extend_from_slice(&list);
            c += list.len();
        }
        c
    }

    fn adjust(&self, map: &IndexMap) -> Result<CodeItem, DexError> {
        let insns = transform_instructions(&self.insns, &mut |kind, idx| map.adjust(kind, idx))?;
        let handlers = self
            .handlers
            .iter()
            .map(|h| {
                Ok(CatchHandler {
                    handlers: h
                        .handlers
                        .iter()
                        .map(|(t, addr)| Ok((map.type_index(*t)?, *addr)))
                        .collect::<Result<Vec<_>, DexError>>()?,
                    catch_all_addr: h.catch_all_addr,
                })
            })
            .collect::<Result<Vec<_>, DexError>>()?;

        Ok(CodeItem {
            registers_size: self.registers_size,
            ins_size: self.ins_size,
            outs_size: self.outs_size,
            debug_info_off: map.adjust(SectionKind::DebugInfo, self.debug_info_off)?,
            insns,
            tries: self.tries.clone(),
            handlers,
        })
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EncodedField {
    pub field_idx: u32,
    pub access_flags: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EncodedMethod {
    pub method_idx: u32,
    pub access_flags: u32,
    pub code_off: u32,
}

/// `class_data_item` with absolute member indexes; deltas only exist on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClassDataItem {
    pub static_fields: Vec<EncodedField>,
    pub instance_fields: Vec<EncodedField>,
    pub direct_methods: Vec<EncodedMethod>,
    pub virtual_methods: Vec<EncodedMethod>,
}

fn read_fields(bytes: &[u8], ix: &mut usize, count: u32) -> Result<Vec<EncodedField>, DexError> {
    let mut fields = Vec::new();
    let mut field_idx = 0u32;
    for _ in 0..count {
        field_idx = field_idx.wrapping_add(read_uleb128(bytes, ix)?);
        fields.push(EncodedField { field_idx, access_flags: read_uleb128(bytes, ix)? });
    }
    Ok(fields)
}

fn read_methods(bytes: &[u8], ix: &mut usize, count: u32) -> Result<Vec<EncodedMethod>, DexError> {
    let mut methods = Vec::new();
    let mut method_idx = 0u32;
    for _ in 0..count {
        method_idx = method_idx.wrapping_add(read_uleb128(bytes, ix)?);
        let access_flags = read_uleb128(bytes, ix)?;
        let code_off = read_uleb128(bytes, ix)?;
        methods.push(EncodedMethod { method_idx, access_flags, code_off });
    }
    Ok(methods)
}

fn write_fields(bytes: &mut Vec<u8>, fields: &[EncodedField]) -> usize {
    let mut c = 0;
    let mut last = 0u32;
    for f in fields {
        c += write_uleb128(bytes, f.field_idx.wrapping_sub(last));
        last = f.field_idx;
        c += write_uleb128(bytes, f.access_flags);
    }
    c
}

fn write_methods(bytes: &mut Vec<u8>, methods: &[EncodedMethod]) -> usize {
    let mut c = 0;
    let mut last = 0u32;
    for m in methods {
        c += write_uleb128(bytes, m.method_idx.wrapping_sub(last));
        last = m.method_idx;
        c += write_uleb128(bytes, m.access_flags);
        c += write_uleb128(bytes, m.code_off);
    }
    c
}

/// Member lists are delta encoded, so remapped indexes must stay strictly ascending.
fn check_ascending(indexes: impl Iterator<Item = u32>, what: &str) -> Result<(), DexError> {
    let mut last: Option<u32> = None;
    for idx in indexes {
        if let Some(prev) = last {
            if idx <= prev {
                fail!(Invariant, "{} index {} follows {} after remapping", what, idx, prev);
            }
        }
        last = Some(idx);
    }
    Ok(())
}

fn adjust_fields(map: &IndexMap, fields: &[EncodedField]) -> Result<Vec<EncodedField>, DexError> {
    let out = fields
        .iter()
        .map(|f| {
            Ok(EncodedField {
                field_idx: map.adjust(SectionKind::FieldIds, f.field_idx)?,
                access_flags: f.access_flags,
            })
        })
        .collect::<Result<Vec<_>, DexError>>()?;
    check_ascending(out.iter().map(|f| f.field_idx), "field")?;
    Ok(out)
}

fn adjust_methods(map: &IndexMap, methods: &[EncodedMethod]) -> Result<Vec<EncodedMethod>, DexError> {
    let out = methods
        .iter()
        .map(|m| {
            Ok(EncodedMethod {
                method_idx: map.adjust(SectionKind::MethodIds, m.method_idx)?,
                access_flags: m.access_flags,
                code_off: map.adjust(SectionKind::Code, m.code_off)?,
            })
        })
        .collect::<Result<Vec<_>, DexError>>()?;
    check_ascending(out.iter().map(|m| m.method_idx), "method")?;
    Ok(out)
}

impl SectionItem for ClassDataItem {
    const KIND: SectionKind = SectionKind::ClassData;

    fn read(bytes: &[u8], ix: &mut usize) -> Result<ClassDataItem, DexError> {
        let static_fields_size = read_uleb128(bytes, ix)?;
        let instance_fields_size = read_uleb128(bytes, ix)?;
        let direct_methods_size = read_uleb128(bytes, ix)?;
        let virtual_methods_size = read_uleb128(bytes, ix)?;

        Ok(ClassDataItem {
            static_fields: read_fields(bytes, ix, static_fields_size)?,
            instance_fields: read_fields(bytes, ix, instance_fields_size)?,
            direct_methods: read_methods(bytes, ix, direct_methods_size)?,
            virtual_methods: read_methods(bytes, ix, virtual_methods_size)?,
        })
    }

    fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_uleb128(bytes, self.static_fields.len() as u32);
        c += write_uleb128(bytes, self.instance_fields.len() as u32);
        c += write_uleb128(bytes, self.direct_methods.len() as u32);
        c += write_uleb128(bytes, self.virtual_methods.len() as u32);
        c += write_fields(bytes, &self.static_fields);
        c += write_fields(bytes, &self.instance_fields);
        c += write_methods(bytes, &self.direct_methods);
        c += write_methods(bytes, &self.virtual_methods);
        c
    }

    fn adjust(&self, map: &IndexMap) -> Result<ClassDataItem, DexError> {
        Ok(ClassDataItem {
            static_fields: adjust_fields(map, &self.static_fields)?,
            instance_fields: adjust_fields(map, &self.instance_fields)?,
            direct_methods: adjust_methods(map, &self.direct_methods)?,
            virtual_methods: adjust_methods(map, &self.virtual_methods)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::NO_INDEX;

    fn roundtrip<T: SectionItem + PartialEq>(item: &T) -> Vec<u8> {
        let mut buf = Vec::new();
        let written = item.write(&mut buf);
        assert_eq!(written, buf.len());
        assert_eq!(item.byte_size(), written);
        let mut ix = 0;
        assert_eq!(&T::read(&buf, &mut ix).unwrap(), item);
        assert_eq!(ix, buf.len());
        buf
    }

    fn sample_code() -> CodeItem {
        CodeItem {
            registers_size: 2,
            ins_size: 1,
            outs_size: 1,
            debug_info_off: 0x400,
            // const-string v0, string@1; invoke-static {v0}, method@0; return-void
            insns: vec![0x001a, 0x0001, 0x1071, 0x0000, 0x0000, 0x000e, 0x0000],
            tries: vec![
                TryItem { start_addr: 0, insn_count: 2, handler_index: 1 },
                TryItem { start_addr: 2, insn_count: 3, handler_index: 0 },
            ],
            handlers: vec![
                CatchHandler { handlers: vec![(3, 5)], catch_all_addr: None },
                CatchHandler { handlers: vec![(4, 5), (200, 6)], catch_all_addr: Some(6) },
            ],
        }
    }

    #[test]
    fn code_item_roundtrip_with_tries() {
        let code = sample_code();
        let bytes = roundtrip(&code);
        // header (16) + 7 units + padding + two tries
        let list_start = 16 + 14 + 2 + 16;
        assert_eq!(bytes[list_start], 2);
        // the second try points at the first handler, right after the list size
        assert_eq!(u16::from_le_bytes([bytes[16 + 14 + 2 + 8 + 6], bytes[16 + 14 + 2 + 8 + 7]]), 1);
    }

    #[test]
    fn catch_all_only_handler() {
        let h = CatchHandler { handlers: vec![], catch_all_addr: Some(9) };
        let mut buf = Vec::new();
        h.write(&mut buf);
        assert_eq!(buf, vec![0x00, 0x09]);
        let mut ix = 0;
        assert_eq!(CatchHandler::read(&buf, &mut ix).unwrap(), h);
    }

    #[test]
    fn code_adjust_rewrites_operands_and_handler_offsets() {
        let mut map = IndexMap::new();
        map.map(SectionKind::StringData, 1, 2);
        map.map(SectionKind::MethodIds, 0, 3);
        map.map(SectionKind::TypeIds, 3, 300);
        map.map(SectionKind::DebugInfo, 0x400, 0x404);

        let adjusted = sample_code().adjust(&map).unwrap();
        assert_eq!(adjusted.insns[1], 2);
        assert_eq!(adjusted.insns[3], 3);
        assert_eq!(adjusted.debug_info_off, 0x404);
        assert_eq!(adjusted.handlers[0].handlers, vec![(300, 5)]);
        // the first handler grew by one byte, so the second one moved
        roundtrip(&adjusted);
        let (_, offsets) = adjusted.encode_handlers();
        assert_eq!(offsets, vec![1, 5]);
    }

    #[test]
    fn debug_info_roundtrip_and_adjust() {
        let info = DebugInfoItem {
            line_start: 12,
            parameter_names: vec![NO_INDEX, 4],
            program: vec![
                DebugOp::SetPrologueEnd,
                DebugOp::StartLocal { register: 0, name_idx: 5, type_idx: 1 },
                DebugOp::AdvanceLine(-3),
                DebugOp::StartLocalExtended { register: 1, name_idx: 5, type_idx: NO_INDEX, sig_idx: 6 },
                DebugOp::SetFile(7),
                DebugOp::AdvancePc(4),
                DebugOp::EndLocal(0),
                DebugOp::RestartLocal(0),
                DebugOp::Special(0x1e),
            ],
        };
        let bytes = roundtrip(&info);
        assert_eq!(*bytes.last().unwrap(), DBG_END_SEQUENCE);

        let mut map = IndexMap::new();
        map.map(SectionKind::StringData, 4, 40);
        map.map(SectionKind::StringData, 5, 50);
        map.map(SectionKind::StringData, 7, 70);
        map.map(SectionKind::TypeIds, 1, 10);
        let adjusted = info.adjust(&map).unwrap();
        assert_eq!(adjusted.parameter_names, vec![NO_INDEX, 40]);
        assert_eq!(adjusted.program[1], DebugOp::StartLocal { register: 0, name_idx: 50, type_idx: 10 });
        assert_eq!(
            adjusted.program[3],
            DebugOp::StartLocalExtended { register: 1, name_idx: 50, type_idx: NO_INDEX, sig_idx: 6 }
        );
        assert_eq!(adjusted.program[4], DebugOp::SetFile(70));
    }

    #[test]
    fn class_data_delta_encoding() {
        let data = ClassDataItem {
            static_fields: vec![EncodedField { field_idx: 3, access_flags: 8 }],
            instance_fields: vec![
                EncodedField { field_idx: 1, access_flags: 2 },
                EncodedField { field_idx: 4, access_flags: 2 },
            ],
            direct_methods: vec![EncodedMethod { method_idx: 0, access_flags: 0x10001, code_off: 0x200 }],
            virtual_methods: vec![EncodedMethod { method_idx: 2, access_flags: 1, code_off: 0 }],
        };
        let bytes = roundtrip(&data);
        assert_eq!(&bytes[..4], &[1, 2, 1, 1]);
        // second instance field is stored as a delta of 3
        assert_eq!(&bytes[6..10], &[1, 2, 3, 2]);
    }

    #[test]
    fn class_data_follows_method_reindex() {
        let data = ClassDataItem {
            direct_methods: vec![
                EncodedMethod { method_idx: 1, access_flags: 1, code_off: 0x100 },
                EncodedMethod { method_idx: 2, access_flags: 1, code_off: 0x120 },
            ],
            ..Default::default()
        };
        let mut map = IndexMap::new();
        map.map(SectionKind::MethodIds, 1, 2);
        map.map(SectionKind::MethodIds, 2, 3);
        map.map(SectionKind::Code, 0x120, 0x124);
        let adjusted = data.adjust(&map).unwrap();
        assert_eq!(adjusted.direct_methods[0].method_idx, 2);
        assert_eq!(adjusted.direct_methods[1].method_idx, 3);
        assert_eq!(adjusted.direct_methods[1].code_off, 0x124);

        let mut swap = IndexMap::new();
        swap.map(SectionKind::MethodIds, 1, 5);
        assert!(data.adjust(&swap).is_err());
    }
}
