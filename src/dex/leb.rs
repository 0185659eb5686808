/* LEB128 variable length integers as used by dex files and by the patch chunks */

/// Unsigned LEB128, at most five bytes for a 32-bit value.
pub(crate) fn encode_uleb128(value: u32) -> Vec<u8> {
    let mut result = Vec::with_capacity(5);
    let mut remaining = value;

    loop {
        let byte = (remaining & 0x7F) as u8;
        remaining >>= 7;
        if remaining == 0 {
            result.push(byte);
            break;
        }
        result.push(byte | 0x80);
    }

    result
}

/// Returns the value and the number of bytes consumed, or `None` when the input ends
/// before the terminating byte.
pub(crate) fn decode_uleb128(encoded: &[u8]) -> Option<(u32, usize)> {
    let mut value: u32 = 0;

    for (count, &byte) in encoded.iter().take(5).enumerate() {
        value |= ((byte & 0x7F) as u32).wrapping_shl(7 * count as u32);
        if byte & 0x80 == 0 {
            return Some((value, count + 1));
        }
    }

    None
}

pub(crate) fn encode_sleb128(value: i32) -> Vec<u8> {
    let mut result = Vec::with_capacity(5);
    let mut remaining = value;

    loop {
        let byte = (remaining & 0x7F) as u8;
        remaining >>= 7;

        let done = (remaining == 0 && (byte & 0x40) == 0) || (remaining == -1 && (byte & 0x40) != 0);
        if done {
            result.push(byte);
            break;
        }
        result.push(byte | 0x80);
    }

    result
}

pub(crate) fn decode_sleb128(encoded: &[u8]) -> Option<(i32, usize)> {
    let mut value: i32 = 0;
    let mut shift: u32 = 0;

    for (count, &byte) in encoded.iter().take(5).enumerate() {
        value |= ((byte & 0x7F) as i32).wrapping_shl(shift);
        shift += 7;
        if byte & 0x80 == 0 {
            // sign extend from the last payload bit
            if shift < 32 && (byte & 0x40) != 0 {
                value |= (-1i32).wrapping_shl(shift);
            }
            return Some((value, count + 1));
        }
    }

    None
}

/// uleb128p1 stores `value + 1`, so -1 (`NO_INDEX`) becomes a single zero byte.
pub(crate) fn encode_uleb128p1(value: i32) -> Vec<u8> {
    encode_uleb128(value.wrapping_add(1) as u32)
}

pub(crate) fn decode_uleb128p1(encoded: &[u8]) -> Option<(i32, usize)> {
    decode_uleb128(encoded).map(|(v, c)| ((v as i32).wrapping_sub(1), c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uleb128() {
        let cases = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7F]),
            (128, vec![0x80, 0x01]),
            (16256, vec![0x80, 0x7F]),
            (624485, vec![0xE5, 0x8E, 0x26]),
            (0xFFFF_FFFF, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
        ];

        for (value, expected) in cases {
            assert_eq!(encode_uleb128(value), expected);
        }
    }

    #[test]
    fn test_decode_uleb128() {
        let cases = vec![
            (vec![0x00], 0, 1),
            (vec![0x7F], 127, 1),
            (vec![0x80, 0x7F], 16256, 2),
            (vec![0xE5, 0x8E, 0x26, 0x99], 624485, 3),
        ];

        for (encoded, expected, len) in cases {
            assert_eq!(decode_uleb128(&encoded), Some((expected, len)));
        }
    }

    #[test]
    fn truncated_leb_is_rejected() {
        assert_eq!(decode_uleb128(&[0x80, 0x80]), None);
        assert_eq!(decode_sleb128(&[0xFF]), None);
        assert_eq!(decode_uleb128(&[]), None);
    }

    #[test]
    fn test_sleb128() {
        let cases = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (-1, vec![0x7F]),
            (63, vec![0x3F]),
            (64, vec![0xC0, 0x00]),
            (-128, vec![0x80, 0x7F]),
            (-123456, vec![0xC0, 0xBB, 0x78]),
        ];

        for (value, expected) in cases {
            assert_eq!(encode_sleb128(value), expected);
            assert_eq!(decode_sleb128(&expected), Some((value, expected.len())));
        }
        assert_eq!(decode_sleb128(&encode_sleb128(i32::MIN)).map(|v| v.0), Some(i32::MIN));
    }

    #[test]
    fn test_uleb128p1() {
        assert_eq!(encode_uleb128p1(-1), vec![0x00]);
        assert_eq!(encode_uleb128p1(0), vec![0x01]);
        assert_eq!(decode_uleb128p1(&[0x00]), Some((-1, 1)));
        assert_eq!(decode_uleb128p1(&[0x80, 0x01]), Some((127, 2)));
    }
}
