//! Byte-stable serialization and content hashing.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{ForestError, Result};

/// Recursively rebuild objects with keys in sorted order
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, sort_keys(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Canonical JSON: sorted keys, compact `,`/`:` separators, no trailing newline
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = sort_keys(serde_json::to_value(value)?);
    Ok(serde_json::to_vec(&value)?)
}

/// Write canonical JSON plus a trailing newline, atomically
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = canonical_json_bytes(value)?;
    bytes.push(b'\n');
    write_bytes_atomic(path, &bytes)
}

/// Write through a temp file in the destination directory, then rename over `path`.
///
/// Readers see either the previous content or the complete new content.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| ForestError::io(parent, e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| ForestError::io(parent, e))?;
    tmp.write_all(bytes).map_err(|e| ForestError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| ForestError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| ForestError::io(path, e.error))?;
    Ok(())
}

/// Lower-case hex SHA-256 of a file's content
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| ForestError::io(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| ForestError::io(path, e))?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorted_compact() {
        let value = json!({"b": 1, "a": {"d": [1, {"z": true, "y": null}], "c": "x"}});
        let bytes = canonical_json_bytes(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"c":"x","d":[1,{"y":null,"z":true}]},"b":1}"#
        );
    }

    #[test]
    fn test_write_json_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");
        write_json(&path, &json!({"k": "v"})).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"k\":\"v\"}\n");
        // Overwrite in place
        write_json(&path, &json!({"k": "w"})).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"k\":\"w\"}\n");
    }

    #[test]
    fn test_sha256_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_missing_file() {
        assert!(matches!(
            sha256_file(Path::new("/nonexistent/file.bin")),
            Err(ForestError::Io { .. })
        ));
    }
}
