use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Serialize an ordered list of strings into the byte string signatures
/// cover: for each chunk, a 4-byte little-endian count of the chunk's
/// UTF-8 bytes followed by those bytes. No delimiters, no terminator.
///
/// The chunk order must match the signer exactly.
pub(crate) fn to_length_value(chunks: &[&str]) -> Vec<u8> {
    let mut out = Vec::with_capacity(chunks.iter().map(|c| 4 + c.len()).sum());
    for chunk in chunks {
        let bytes = chunk.as_bytes();
        out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(bytes);
    }
    out
}

/// Decode standard (padded) base64.
pub(crate) fn b64_decode(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(value)
}

#[cfg(test)]
pub(crate) fn b64_encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Parse a decimal milliseconds-since-epoch string. `None` when malformed.
pub(crate) fn parse_millis(value: &str) -> Option<i64> {
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_value_layout() {
        assert_eq!(
            to_length_value(&["Google"]),
            [&[6, 0, 0, 0][..], b"Google"].concat()
        );
        assert_eq!(
            to_length_value(&["Google", "ECv1"]),
            [&[6, 0, 0, 0][..], b"Google", &[4, 0, 0, 0], b"ECv1"].concat()
        );
    }

    #[test]
    fn length_value_empty_chunk() {
        assert_eq!(to_length_value(&[""]), [0, 0, 0, 0]);
        assert_eq!(
            to_length_value(&["", "a"]),
            [0, 0, 0, 0, 1, 0, 0, 0, b'a']
        );
    }

    #[test]
    fn length_value_multibyte_chunk_counts_bytes() {
        // '€' is three UTF-8 bytes.
        assert_eq!(to_length_value(&["€"])[..4], [3, 0, 0, 0]);
    }

    #[test]
    fn length_value_is_injective_across_chunk_boundaries() {
        assert_ne!(to_length_value(&["ab", "c"]), to_length_value(&["a", "bc"]));
        assert_ne!(to_length_value(&["a", ""]), to_length_value(&["", "a"]));
        assert_ne!(to_length_value(&["abc"]), to_length_value(&["ab", "c"]));
    }

    #[test]
    fn parse_millis_accepts_decimal_integers() {
        assert_eq!(parse_millis("0"), Some(0));
        assert_eq!(parse_millis("1542323411244"), Some(1_542_323_411_244));
        assert_eq!(parse_millis("-5"), Some(-5));
    }

    #[test]
    fn parse_millis_rejects_malformed_values() {
        assert_eq!(parse_millis(""), None);
        assert_eq!(parse_millis("tomorrow"), None);
        assert_eq!(parse_millis("12.5"), None);
        assert_eq!(parse_millis("99999999999999999999"), None);
    }
}
