//! Encoding of the stored titles payload.
//!
//! Titles are kept as a JSON-encoded string inside the record so that a
//! damaged payload is detected on its own, separately from the envelope.

use crate::error::StorageError;

/// Encodes titles as a JSON array string.
pub fn encode_titles(titles: &[String]) -> Result<String, StorageError> {
    Ok(serde_json::to_string(titles)?)
}

/// Decodes a titles payload produced by [`encode_titles`].
pub fn decode_titles(payload: &str) -> Result<Vec<String>, StorageError> {
    serde_json::from_str(payload).map_err(|e| {
        StorageError::Corruption(format!("titles payload is not a JSON string array: {}", e))
    })
}

/// CRC32C of the payload, as stored alongside it.
pub fn checksum(payload: &str) -> String {
    format!("{:08x}", crc32c::crc32c(payload.as_bytes()))
}

/// Checks that every applied migration has a recorded title.
pub fn check_position(position: usize, title_count: usize) -> Result<(), StorageError> {
    if position > title_count {
        return Err(StorageError::Corruption(format!(
            "position {} exceeds the {} recorded titles",
            position, title_count
        )));
    }
    Ok(())
}

/// Checks that a storage key is usable as a record identity and file name.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key != "."
        && key != ".."
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_titles_payload() {
        let titles = vec!["001-init".to_string(), "002-users".to_string()];
        let payload = encode_titles(&titles).unwrap();
        assert_eq!(payload, r#"["001-init","002-users"]"#);
        assert_eq!(decode_titles(&payload).unwrap(), titles);
    }

    #[test]
    fn test_undecodable_payload() {
        assert!(matches!(
            decode_titles("not json"),
            Err(StorageError::Corruption(_))
        ));
        assert!(matches!(
            decode_titles(r#"{"a": 1}"#),
            Err(StorageError::Corruption(_))
        ));
    }

    #[test]
    fn test_checksum_stable() {
        assert_eq!(checksum("[]"), checksum("[]"));
        assert_ne!(checksum("[]"), checksum(r#"["001"]"#));
        assert_eq!(checksum("").len(), 8);
    }

    #[test]
    fn test_check_position() {
        assert!(check_position(0, 0).is_ok());
        assert!(check_position(2, 2).is_ok());
        assert!(matches!(
            check_position(3, 1),
            Err(StorageError::Corruption(_))
        ));
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("default").is_ok());
        assert!(validate_key("project_a.v2-main").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("..").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("with space").is_err());
    }
}
