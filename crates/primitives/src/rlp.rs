//! RLP helpers for optional fields.
//!
//! An optional value is encoded as a list holding zero or one element, which keeps the encoding
//! canonical when a trailing field is absent.

use alloy_rlp::{BufMut, Decodable, Encodable, Header};

pub(crate) fn optional_length<T: Encodable>(value: &Option<T>) -> usize {
    let payload_length = value.as_ref().map_or(0, Encodable::length);
    payload_length + alloy_rlp::length_of_length(payload_length)
}

pub(crate) fn encode_optional<T: Encodable>(value: &Option<T>, out: &mut dyn BufMut) {
    let payload_length = value.as_ref().map_or(0, Encodable::length);
    Header { list: true, payload_length }.encode(out);
    if let Some(value) = value {
        value.encode(out);
    }
}

pub(crate) fn decode_optional<T: Decodable>(buf: &mut &[u8]) -> alloy_rlp::Result<Option<T>> {
    let header = Header::decode(buf)?;
    if !header.list {
        return Err(alloy_rlp::Error::UnexpectedString);
    }
    if header.payload_length == 0 {
        return Ok(None);
    }
    let started = buf.len();
    let value = T::decode(buf)?;
    let consumed = started - buf.len();
    if consumed != header.payload_length {
        return Err(alloy_rlp::Error::ListLengthMismatch {
            expected: header.payload_length,
            got: consumed,
        });
    }
    Ok(Some(value))
}

/// Decodes a list header and returns the payload length.
pub(crate) fn decode_list_header(buf: &mut &[u8]) -> alloy_rlp::Result<usize> {
    let header = Header::decode(buf)?;
    if !header.list {
        return Err(alloy_rlp::Error::UnexpectedString);
    }
    if buf.len() < header.payload_length {
        return Err(alloy_rlp::Error::InputTooShort);
    }
    Ok(header.payload_length)
}

/// Checks that a list payload was fully consumed.
pub(crate) const fn check_list_consumed(
    payload_length: usize,
    started: usize,
    remaining: usize,
) -> alloy_rlp::Result<()> {
    let consumed = started - remaining;
    if consumed != payload_length {
        return Err(alloy_rlp::Error::ListLengthMismatch { expected: payload_length, got: consumed });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn test_optional_none_is_empty_list() {
        let mut out = Vec::new();
        encode_optional::<u64>(&None, &mut out);
        assert_eq!(out, [0xc0]);
        assert_eq!(optional_length::<u64>(&None), 1);
        assert_eq!(decode_optional::<u64>(&mut out.as_slice()).unwrap(), None);
    }

    #[test]
    fn test_optional_some() {
        let mut out = Vec::new();
        encode_optional(&Some(1024u64), &mut out);
        assert_eq!(out.len(), optional_length(&Some(1024u64)));
        assert_eq!(decode_optional::<u64>(&mut out.as_slice()).unwrap(), Some(1024));
    }

    #[test]
    fn test_optional_rejects_string() {
        let out = alloy_rlp::encode(7u64);
        assert_eq!(
            decode_optional::<u64>(&mut out.as_slice()),
            Err(alloy_rlp::Error::UnexpectedString)
        );
    }
}
