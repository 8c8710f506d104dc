//! Byte-preserving transcoding for the text-safe storage boundary.
//!
//! The outer storage slot only accepts text, so the persistent state buffer
//! has to cross that boundary as a string. The contract is a strict
//! one-to-one mapping: byte value `b` becomes the character with code point
//! `b` (the Latin-1 range), and nothing else. Every byte 0..=255 survives a
//! round trip unchanged, including values >= 0x80 that a variable-width
//! encoding such as UTF-8 would silently multiply into several storage
//! units.
//!
//! This mapping is the load-bearing correctness property of the whole
//! synchronizer: a lossy or multi-byte encoding here corrupts module state
//! on every restart.

use crate::CodecError;

/// Encode raw bytes into their text-safe form.
///
/// Each byte maps to the character with the identical code point, so the
/// resulting string has exactly one `char` per input byte.
pub fn encode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Decode text-safe storage back into the original bytes.
///
/// # Errors
///
/// Returns [`CodecError::UnmappableChar`] if the text contains a character
/// above U+00FF. Such text cannot have been produced by [`encode`] and
/// indicates the slot was written by something else (or through a lossy
/// encoding).
pub fn decode(text: &str) -> Result<Vec<u8>, CodecError> {
    text.chars()
        .enumerate()
        .map(|(index, ch)| {
            u8::try_from(u32::from(ch)).map_err(|_| CodecError::UnmappableChar { index, ch })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_byte_values() {
        let bytes: Vec<u8> = (0..=255).collect();
        let text = encode(&bytes);

        assert_eq!(text.chars().count(), 256);
        assert_eq!(decode(&text).unwrap(), bytes);
    }

    #[test]
    fn test_high_bytes_stay_single_unit() {
        // 0xFF must become exactly one char, not a UTF-8 pair.
        let text = encode(&[0xFF, 0x80, 0xC3]);
        assert_eq!(text.chars().count(), 3);
        assert_eq!(decode(&text).unwrap(), vec![0xFF, 0x80, 0xC3]);
    }

    #[test]
    fn test_empty_round_trip() {
        assert_eq!(encode(&[]), "");
        assert_eq!(decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_rejects_wide_chars() {
        let err = decode("ab\u{0100}").unwrap_err();
        assert_eq!(
            err,
            CodecError::UnmappableChar {
                index: 2,
                ch: '\u{0100}',
            }
        );
    }

    #[test]
    fn test_decode_rejects_emoji() {
        assert!(decode("\u{1F600}").is_err());
    }

    #[test]
    fn test_embedded_nul_survives() {
        let bytes = vec![0x00, 0x01, 0x00];
        assert_eq!(decode(&encode(&bytes)).unwrap(), bytes);
    }
}
