//! Reversible value encoding for hosts that are not raw-UTF-8 safe.
//!
//! Values are stored as lowercase hex of their UTF-8 bytes. Keys are never
//! encoded, so lookups and enumeration work on the plain key text.

use crate::error::StoreError;

pub fn encode(value: &str) -> String {
    hex::encode(value.as_bytes())
}

pub fn decode(table: &str, stored: &str) -> Result<String, StoreError> {
    let bytes = hex::decode(stored).map_err(|e| StoreError::Decode {
        table: table.to_string(),
        reason: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| StoreError::Decode {
        table: table.to_string(),
        reason: e.to_string(),
    })
}

/// Encodes `value` for storage unless the host stores raw content.
pub(crate) fn for_storage(raw_utf8: bool, value: &str) -> String {
    if raw_utf8 {
        value.to_string()
    } else {
        encode(value)
    }
}

/// Inverse of [`for_storage`].
pub(crate) fn from_storage(raw_utf8: bool, table: &str, stored: String) -> Result<String, StoreError> {
    if raw_utf8 {
        Ok(stored)
    } else {
        decode(table, &stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_plain_ascii() {
        let encoded = encode("it's a \"quoted\" -- value ¤");
        assert!(encoded.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(decode("t", &encoded).unwrap(), "it's a \"quoted\" -- value ¤");
    }

    #[test]
    fn test_empty_value() {
        assert_eq!(encode(""), "");
        assert_eq!(decode("t", "").unwrap(), "");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode("users", "not hex").unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref table, .. } if table == "users"));
        // Valid hex, invalid UTF-8.
        assert!(decode("users", "ff").is_err());
    }

    #[test]
    fn test_raw_mode_passthrough() {
        assert_eq!(for_storage(true, "abc"), "abc");
        assert_eq!(for_storage(false, "abc"), "616263");
        assert_eq!(from_storage(false, "t", "616263".into()).unwrap(), "abc");
        assert_eq!(from_storage(true, "t", "616263".into()).unwrap(), "616263");
    }
}
