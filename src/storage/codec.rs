//! Key Codec
//!
//! Text encodings shared by the primary table and the secondary indices.
//!
//! - Keys are comma-joined base-10 integers (`"3,7,12"`).
//! - Values are the shortest decimal text that parses back to the same `f64`.
//! - Secondary entries are `<projection>;<seq>` where `seq` is 16 lowercase hex digits,
//!   so a prefix scan over `<projection>;` yields duplicates in insertion order.

use super::types::{Key, Result, StoreError};

pub const KEY_SEPARATOR: char = ',';
pub const INDEX_SEPARATOR: u8 = b';';
const SEQ_WIDTH: usize = 16;

pub fn encode_key(key: &[i64]) -> Vec<u8> {
    key.iter()
        .map(|dim| dim.to_string())
        .collect::<Vec<_>>()
        .join(",")
        .into_bytes()
}

pub fn decode_key(bytes: &[u8]) -> Result<Key> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| StoreError::Corrupt(format!("key is not utf-8: {}", e)))?;
    parse_key(text).map_err(|e| StoreError::Corrupt(format!("key {:?}: {}", text, e)))
}

/// Parses `"3,7,12"`. Blank input is the empty key.
pub fn parse_key(text: &str) -> std::result::Result<Key, std::num::ParseIntError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    text.split(KEY_SEPARATOR)
        .map(|part| part.trim().parse::<i64>())
        .collect()
}

/// Parses a query key where `*` stands for the wildcard marker.
pub fn parse_partial_key(
    text: &str,
    wildcard: i64,
) -> std::result::Result<Key, std::num::ParseIntError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    text.split(KEY_SEPARATOR)
        .map(|part| match part.trim() {
            "*" => Ok(wildcard),
            dim => dim.parse::<i64>(),
        })
        .collect()
}

pub fn encode_value(value: f64) -> Vec<u8> {
    value.to_string().into_bytes()
}

pub fn decode_value(bytes: &[u8]) -> Result<f64> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| StoreError::Corrupt(format!("value is not utf-8: {}", e)))?;
    text.parse::<f64>()
        .map_err(|e| StoreError::Corrupt(format!("value {:?}: {}", text, e)))
}

/// Prefix shared by every secondary entry under one projection.
pub fn projection_prefix(projection: &[i64]) -> Vec<u8> {
    let mut prefix = encode_key(projection);
    prefix.push(INDEX_SEPARATOR);
    prefix
}

pub fn encode_index_entry(projection: &[i64], seq: u64) -> Vec<u8> {
    let mut entry = projection_prefix(projection);
    entry.extend_from_slice(format!("{:0width$x}", seq, width = SEQ_WIDTH).as_bytes());
    entry
}

pub fn encode_seq(seq: u64) -> Vec<u8> {
    seq.to_string().into_bytes()
}

pub fn decode_seq(bytes: &[u8]) -> Result<u64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.parse::<u64>().ok())
        .ok_or_else(|| StoreError::Corrupt("unreadable index sequence".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_text_format() {
        assert_eq!(encode_key(&[3, 0, 12]), b"3,0,12".to_vec());
        assert_eq!(encode_key(&[-4, 7]), b"-4,7".to_vec());
        assert_eq!(decode_key(b"3,0,12").unwrap(), vec![3, 0, 12]);
    }

    #[test]
    fn test_value_text_format() {
        assert_eq!(encode_value(4.5), b"4.5".to_vec());
        assert_eq!(decode_value(b"4.5").unwrap(), 4.5);

        let awkward = 0.1 + 0.2;
        assert_eq!(
            decode_value(&encode_value(awkward)).unwrap().to_bits(),
            awkward.to_bits()
        );
    }

    #[test]
    fn test_corrupt_bytes_are_reported() {
        assert!(matches!(decode_key(b"1,x"), Err(StoreError::Corrupt(_))));
        assert!(matches!(decode_value(b"abc"), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_partial_key_wildcards() {
        assert_eq!(parse_partial_key("1,*,3", -1).unwrap(), vec![1, -1, 3]);
        assert!(parse_partial_key("1,?,3", -1).is_err());
    }

    #[test]
    fn test_index_entries_group_by_projection() {
        let a = encode_index_entry(&[1, 2], 7);
        let b = encode_index_entry(&[1, 23], 1);

        assert!(a.starts_with(&projection_prefix(&[1, 2])));
        assert!(!b.starts_with(&projection_prefix(&[1, 2])));
        assert_eq!(a, b"1,2;0000000000000007".to_vec());
        // Insertion order survives the lexicographic ordering of the partition.
        assert!(encode_index_entry(&[1, 2], 9) < encode_index_entry(&[1, 2], 10));
    }
}
