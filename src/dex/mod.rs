#[macro_use]
pub mod error;

pub mod section;
pub mod dex_file;
pub mod items;
pub mod annotations;
pub mod code;
pub mod builder;
pub(crate) mod leb;
pub(crate) mod encoded_values;
pub(crate) mod instructions;
pub(crate) mod opcodes;

pub use dex_file::{DexFile, Header, TableOfContents, TocEntry};
pub use section::SectionKind;

use crate::dex::error::DexError;
use crate::dex::leb::{decode_sleb128, decode_uleb128, decode_uleb128p1, encode_sleb128, encode_uleb128, encode_uleb128p1};

/// Marker for an absent index reference.
pub const NO_INDEX: u32 = 0xffff_ffff;

// Basic type reading and writing
pub(crate) fn read_u1(bytes: &[u8], ix: &mut usize) -> Result<u8, DexError>
{
    if bytes.len() < *ix + 1
    {
        fail!("Unexpected end of stream reading u1 at index {}", *ix);
    }
    let result = bytes[*ix];
    *ix += 1;
    Ok(result)
}

pub(crate) fn read_u2(bytes: &[u8], ix: &mut usize) -> Result<u16, DexError>
{
    if bytes.len() < *ix + 2
    {
        fail!("Unexpected end of stream reading u2 at index {}", *ix);
    }
    let result = u16::from_le_bytes([bytes[*ix], bytes[*ix + 1]]);
    *ix += 2;
    Ok(result)
}

pub(crate) fn read_u4(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
{
    if bytes.len() < *ix + 4
    {
        fail!("Unexpected end of stream reading u4 at index {}", *ix);
    }
    let result = u32::from_le_bytes([bytes[*ix], bytes[*ix + 1], bytes[*ix + 2], bytes[*ix + 3]]);
    *ix += 4;
    Ok(result)
}

pub(crate) fn read_uleb128(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
{
    match decode_uleb128(bytes.get(*ix..).unwrap_or(&[]))
    {
        Some((val, size)) => {
            *ix += size;
            Ok(val)
        }
        None => fail!("Truncated uleb128 at index {}", *ix),
    }
}

pub(crate) fn read_sleb128(bytes: &[u8], ix: &mut usize) -> Result<i32, DexError>
{
    match decode_sleb128(bytes.get(*ix..).unwrap_or(&[]))
    {
        Some((val, size)) => {
            *ix += size;
            Ok(val)
        }
        None => fail!("Truncated sleb128 at index {}", *ix),
    }
}

pub(crate) fn read_uleb128p1(bytes: &[u8], ix: &mut usize) -> Result<i32, DexError>
{
    match decode_uleb128p1(bytes.get(*ix..).unwrap_or(&[]))
    {
        Some((val, size)) => {
            *ix += size;
            Ok(val)
        }
        None => fail!("Truncated uleb128p1 at index {}", *ix),
    }
}

pub(crate) fn read_x(bytes: &[u8], ix: &mut usize, length: usize) -> Result<Vec<u8>, DexError>
{
    match bytes.get(*ix..*ix + length)
    {
        Some(slice) => {
            *ix += length;
            Ok(slice.to_vec())
        }
        None => fail!("Buffer too short reading {} bytes at index {}", length, *ix),
    }
}

pub(crate) fn write_u1(buffer: &mut Vec<u8>, val: u8) -> usize
{
    buffer.push(val);
    1
}

pub(crate) fn write_u2(buffer: &mut Vec<u8>, val: u16) -> usize
{
    buffer.extend_from_slice(&val.to_le_bytes());
    2
}

pub(crate) fn write_u4(buffer: &mut Vec<u8>, val: u32) -> usize
{
    buffer.extend_from_slice(&val.to_le_bytes());
    4
}

pub(crate) fn write_uleb128(buffer: &mut Vec<u8>, val: u32) -> usize
{
    let encoded = encode_uleb128(val);
    let c = encoded.len();
    buffer.extend(encoded);
    c
}

pub(crate) fn write_sleb128(buffer: &mut Vec<u8>, val: i32) -> usize
{
    let encoded = encode_sleb128(val);
    let c = encoded.len();
    buffer.extend(encoded);
    c
}

pub(crate) fn write_uleb128p1(buffer: &mut Vec<u8>, val: i32) -> usize
{
    let encoded = encode_uleb128p1(val);
    let c = encoded.len();
    buffer.extend(encoded);
    c
}

pub(crate) fn write_x(buffer: &mut Vec<u8>, val: &[u8]) -> usize
{
    buffer.extend_from_slice(val);
    val.len()
}

/// Round up to the next multiple of four.
pub(crate) fn align4(value: u32) -> u32
{
    (value + 3) & !3
}
