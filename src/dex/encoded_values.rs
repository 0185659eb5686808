//! Walkers over `encoded_value`, `encoded_array` and `encoded_annotation` byte streams.
//!
//! Values are copied byte for byte except pool references, which are passed through a
//! callback and always written back with the minimal number of bytes. An item therefore
//! has the same size whichever way its references were mapped to reach a given value.

use std::cmp::max;

use crate::dex::error::DexError;
use crate::dex::section::SectionKind;
use crate::dex::{read_u1, read_uleb128, write_u1, write_uleb128, write_x};

pub(crate) const VALUE_BYTE: u8 = 0x00;
pub(crate) const VALUE_SHORT: u8 = 0x02;
pub(crate) const VALUE_CHAR: u8 = 0x03;
pub(crate) const VALUE_INT: u8 = 0x04;
pub(crate) const VALUE_LONG: u8 = 0x06;
pub(crate) const VALUE_FLOAT: u8 = 0x10;
pub(crate) const VALUE_DOUBLE: u8 = 0x11;
pub(crate) const VALUE_METHOD_TYPE: u8 = 0x15;
pub(crate) const VALUE_METHOD_HANDLE: u8 = 0x16;
pub(crate) const VALUE_STRING: u8 = 0x17;
pub(crate) const VALUE_TYPE: u8 = 0x18;
pub(crate) const VALUE_FIELD: u8 = 0x19;
pub(crate) const VALUE_METHOD: u8 = 0x1a;
pub(crate) const VALUE_ENUM: u8 = 0x1b;
pub(crate) const VALUE_ARRAY: u8 = 0x1c;
pub(crate) const VALUE_ANNOTATION: u8 = 0x1d;
pub(crate) const VALUE_NULL: u8 = 0x1e;
pub(crate) const VALUE_BOOLEAN: u8 = 0x1f;

/// Callback deciding the new value of one pool reference.
pub(crate) type RefMapper<'a> = dyn FnMut(SectionKind, u32) -> Result<u32, DexError> + 'a;

/// Identity mapper, used to measure and copy a value without changing it.
pub(crate) fn keep(_: SectionKind, idx: u32) -> Result<u32, DexError> {
    Ok(idx)
}

fn reference_section(value_type: u8) -> Option<SectionKind> {
    match value_type {
        VALUE_METHOD_TYPE => Some(SectionKind::ProtoIds),
        VALUE_STRING => Some(SectionKind::StringData),
        VALUE_TYPE => Some(SectionKind::TypeIds),
        VALUE_FIELD | VALUE_ENUM => Some(SectionKind::FieldIds),
        VALUE_METHOD => Some(SectionKind::MethodIds),
        _ => None,
    }
}

pub(crate) fn transform_encoded_array(
    bytes: &[u8],
    ix: &mut usize,
    out: &mut Vec<u8>,
    f: &mut RefMapper<'_>,
) -> Result<(), DexError> {
    let start = *ix;
    let size = read_uleb128(bytes, ix)?;
    write_x(out, &bytes[start..*ix]);
    for _ in 0..size {
        transform_encoded_value(bytes, ix, out, f)?;
    }
    Ok(())
}

pub(crate) fn transform_encoded_annotation(
    bytes: &[u8],
    ix: &mut usize,
    out: &mut Vec<u8>,
    f: &mut RefMapper<'_>,
) -> Result<(), DexError> {
    transform_uleb_ref(bytes, ix, out, SectionKind::TypeIds, f)?;
    let start = *ix;
    let size = read_uleb128(bytes, ix)?;
    write_x(out, &bytes[start..*ix]);
    for _ in 0..size {
        transform_uleb_ref(bytes, ix, out, SectionKind::StringData, f)?;
        transform_encoded_value(bytes, ix, out, f)?;
    }
    Ok(())
}

fn transform_uleb_ref(
    bytes: &[u8],
    ix: &mut usize,
    out: &mut Vec<u8>,
    kind: SectionKind,
    f: &mut RefMapper<'_>,
) -> Result<(), DexError> {
    let old = read_uleb128(bytes, ix)?;
    write_uleb128(out, f(kind, old)?);
    Ok(())
}

pub(crate) fn transform_encoded_value(
    bytes: &[u8],
    ix: &mut usize,
    out: &mut Vec<u8>,
    f: &mut RefMapper<'_>,
) -> Result<(), DexError> {
    let header = read_u1(bytes, ix)?;
    let value_type = header & 0x1f;
    let value_arg = header >> 5;
    let size = value_arg as usize + 1;

    match value_type {
        VALUE_BYTE | VALUE_SHORT | VALUE_CHAR | VALUE_INT | VALUE_LONG | VALUE_FLOAT
        | VALUE_DOUBLE | VALUE_METHOD_HANDLE => {
            if bytes.len() < *ix + size {
                fail!("Encoded value of type {:#04x} truncated at index {}", value_type, *ix);
            }
            write_u1(out, header);
            write_x(out, &bytes[*ix..*ix + size]);
            *ix += size;
        }
        VALUE_METHOD_TYPE | VALUE_STRING | VALUE_TYPE | VALUE_FIELD | VALUE_METHOD | VALUE_ENUM => {
            if size > 4 || bytes.len() < *ix + size {
                fail!("Bad index value of type {:#04x} at index {}", value_type, *ix);
            }
            let raw = &bytes[*ix..*ix + size];
            let old = raw.iter().rev().fold(0u32, |acc, b| (acc << 8) | *b as u32);
            *ix += size;
            let kind = match reference_section(value_type) {
                Some(k) => k,
                None => fail!(Invariant, "No section for value type {:#04x}", value_type),
            };
            write_unsigned_value(out, value_type, f(kind, old)?);
        }
        VALUE_ARRAY => {
            write_u1(out, header);
            transform_encoded_array(bytes, ix, out, f)?;
        }
        VALUE_ANNOTATION => {
            write_u1(out, header);
            transform_encoded_annotation(bytes, ix, out, f)?;
        }
        VALUE_NULL | VALUE_BOOLEAN => {
            write_u1(out, header);
        }
        _ => fail!("Unknown encoded value type {:#04x} at index {}", value_type, *ix - 1),
    }
    Ok(())
}

fn write_unsigned_value(out: &mut Vec<u8>, value_type: u8, value: u32) -> usize {
    let size = byte_size_u32(value);
    let mut c = write_u1(out, ((size - 1) << 5) | value_type);
    c += write_x(out, &value.to_le_bytes()[..size as usize]);
    c
}

fn byte_size_u32(v: u32) -> u8
{
    let s = (v.leading_zeros() / 8) as u8;
    max(1, 4 - s)
}

/// Read one raw `encoded_array` item without interpreting it.
pub(crate) fn read_encoded_array_bytes(bytes: &[u8], ix: &mut usize) -> Result<Vec<u8>, DexError> {
    let mut out = Vec::new();
    transform_encoded_array(bytes, ix, &mut out, &mut keep)?;
    Ok(out)
}

/// Read one raw `encoded_annotation` without interpreting it.
pub(crate) fn read_encoded_annotation_bytes(bytes: &[u8], ix: &mut usize) -> Result<Vec<u8>, DexError> {
    let mut out = Vec::new();
    transform_encoded_annotation(bytes, ix, &mut out, &mut keep)?;
    Ok(out)
}
