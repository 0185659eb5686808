/* Rewriting of pool index operands inside an instruction stream */

use num_traits::ToPrimitive;

use crate::dex::error::DexError;
use crate::dex::opcodes::{
    opcode_shape, ReferenceType, FILL_ARRAY_DATA_PAYLOAD, PACKED_SWITCH_PAYLOAD, SPARSE_SWITCH_PAYLOAD,
};
use crate::dex::section::SectionKind;

/// Section a reference type resolves into. Call sites and method handles have no
/// section of their own in this engine and are carried through unchanged.
fn target_section(reference: ReferenceType) -> Option<SectionKind> {
    match reference {
        ReferenceType::String => Some(SectionKind::StringData),
        ReferenceType::Type => Some(SectionKind::TypeIds),
        ReferenceType::Field => Some(SectionKind::FieldIds),
        ReferenceType::Method => Some(SectionKind::MethodIds),
        ReferenceType::MethodProto => Some(SectionKind::ProtoIds),
        ReferenceType::None | ReferenceType::CallSite | ReferenceType::MethodHandle => None,
    }
}

/// Width in code units of the payload pseudo-instruction starting at `pos`, if any.
fn payload_units(insns: &[u16], pos: usize) -> Result<Option<usize>, DexError> {
    let unit = insns[pos];
    let field = |i: usize| -> Result<u16, DexError> {
        insns
            .get(pos + i)
            .copied()
            .ok_or_else(|| err!("Truncated payload at code unit {}", pos))
    };
    let units = match unit {
        PACKED_SWITCH_PAYLOAD => field(1)? as usize * 2 + 4,
        SPARSE_SWITCH_PAYLOAD => field(1)? as usize * 4 + 2,
        FILL_ARRAY_DATA_PAYLOAD => {
            let width = field(1)? as usize;
            let size = field(2)? as usize | ((field(3)? as usize) << 16);
            (size * width + 1) / 2 + 4
        }
        _ => return Ok(None),
    };
    Ok(Some(units))
}

/// Walk `insns` and pass every pool index operand through `remap`, returning the
/// rewritten stream. Instruction widths never change, so branch offsets stay valid.
pub(crate) fn transform_instructions<F>(insns: &[u16], remap: &mut F) -> Result<Vec<u16>, DexError>
where
    F: FnMut(SectionKind, u32) -> Result<u32, DexError>,
{
    let mut out = insns.to_vec();
    let mut pos = 0;

    while pos < insns.len() {
        if let Some(units) = payload_units(insns, pos)? {
            pos += units;
            continue;
        }

        let opcode = (insns[pos] & 0xff) as u8;
        let shape = match opcode_shape(opcode) {
            Some(s) => s,
            None => fail!("Unused opcode {:#04x} at code unit {}", opcode, pos),
        };
        let units = shape.format.units();
        if pos + units > insns.len() {
            fail!("Instruction {:#04x} at code unit {} runs past the end of the code", opcode, pos);
        }

        if let Some(kind) = target_section(shape.reference) {
            if shape.format.has_wide_index() {
                let old = insns[pos + 1] as u32 | ((insns[pos + 2] as u32) << 16);
                let new = remap(kind, old)?;
                out[pos + 1] = new as u16;
                out[pos + 2] = (new >> 16) as u16;
            } else {
                let old = insns[pos + 1] as u32;
                let new = remap(kind, old)?;
                out[pos + 1] = narrow_index(new, opcode, pos)?;
            }
        }
        if let Some(kind) = target_section(shape.reference2) {
            let old = insns[pos + 3] as u32;
            let new = remap(kind, old)?;
            out[pos + 3] = narrow_index(new, opcode, pos)?;
        }

        pos += units;
    }

    Ok(out)
}

fn narrow_index(value: u32, opcode: u8, pos: usize) -> Result<u16, DexError> {
    match value.to_u16() {
        Some(v) => Ok(v),
        // const-string would have to become const-string/jumbo, which changes the width
        None => fail!(
            Invariant,
            "Index {} no longer fits the 16-bit operand of opcode {:#04x} at code unit {}",
            value,
            opcode,
            pos
        ),
    }
}
