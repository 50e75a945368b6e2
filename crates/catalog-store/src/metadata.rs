//! Metadata records persisted next to every stored object.

use catalog_crypto::{split_digest, HashAlgorithm};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{CatalogError, CatalogResult};
use crate::layout::DEFAULT_BLOCK_SIZE;

/// Caller-supplied metadata. Opaque except for the `hash` and `size` hints.
pub type UserMeta = Map<String, Value>;

/// Per-block and prefix digests of a payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunksMeta {
    pub block_size: u64,
    #[serde(default)]
    pub block_hashes: Vec<String>,
    /// `cumulative_hashes[i]` is the digest of the first `i + 1` blocks.
    #[serde(default)]
    pub cumulative_hashes: Vec<String>,
}

impl Default for ChunksMeta {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            block_hashes: Vec::new(),
            cumulative_hashes: Vec::new(),
        }
    }
}

/// Store-computed facts about a payload. Empty until the payload is written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMeta {
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub chunks: ChunksMeta,
}

/// Who holds the write lock of an in-flight record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    pub owner: Uuid,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LockOwner {
    pub fn current() -> Self {
        Self {
            owner: Uuid::now_v7(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }
}

/// The JSON document stored in the meta area.
///
/// Committed records never carry `lock`; it exists only while the record
/// sits in the processing area.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaRecord {
    #[serde(default)]
    pub system: SystemMeta,
    #[serde(default)]
    pub user: UserMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<LockOwner>,
}

impl MetaRecord {
    pub fn new(user: UserMeta) -> Self {
        Self {
            user,
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> CatalogResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CatalogError::Serialization(e.to_string()))
    }

    /// Decode a record read from `path`.
    pub fn from_json(path: &str, bytes: &[u8]) -> CatalogResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| CatalogError::JsonDecode {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Whether the payload has been written.
    pub fn is_written(&self) -> bool {
        self.system.size.is_some() && self.system.hash.is_some()
    }

    /// Algorithm requested through the `hash` hint, or `default`.
    ///
    /// The algorithm is the part of `user.hash` before the first `:`; an
    /// empty prefix or a missing hint selects `default`.
    pub fn hash_algorithm(&self, default: HashAlgorithm) -> CatalogResult<HashAlgorithm> {
        match self.user.get("hash") {
            None | Some(Value::Null) => Ok(default),
            Some(Value::String(hint)) => {
                let (name, _) = split_digest(hint);
                if name.is_empty() {
                    Ok(default)
                } else {
                    Ok(HashAlgorithm::from_name(name)?)
                }
            }
            Some(other) => Err(CatalogError::InvalidUserMeta(format!(
                "hash must be a string, got {other}"
            ))),
        }
    }

    /// Compare the computed size and hash against the caller's hints.
    ///
    /// Absent hints default to the computed values, so a record without
    /// hints always verifies.
    pub fn verify_integrity(&self) -> CatalogResult<()> {
        let (Some(size), Some(hash)) = (self.system.size, self.system.hash.as_deref()) else {
            return Err(CatalogError::InvalidRecord("payload has not been written".into()));
        };

        let size_matches = match self.user.get("size") {
            None | Some(Value::Null) => true,
            Some(expected) => size_hint_matches(expected, size),
        };
        if !size_matches {
            return Err(CatalogError::FileIntegrity("Size mismatch.".into()));
        }

        let expected_hash = match self.user.get("hash") {
            Some(Value::String(h)) if !h.is_empty() => h.as_str(),
            _ => hash,
        };
        if expected_hash != hash {
            return Err(CatalogError::FileIntegrity("Hash mismatch.".into()));
        }
        Ok(())
    }

    /// Check the committed shape: payload facts present, digests well formed,
    /// and block accounting consistent with the size.
    pub fn validate(&self) -> CatalogResult<()> {
        let invalid = |msg: String| Err(CatalogError::InvalidRecord(msg));
        let Some(size) = self.system.size else {
            return invalid("system.size is missing".into());
        };
        let Some(hash) = self.system.hash.as_deref() else {
            return invalid("system.hash is missing".into());
        };
        check_digest(hash)?;

        let chunks = &self.system.chunks;
        if chunks.block_size == 0 {
            return invalid("chunks.block_size must be greater than zero".into());
        }
        let expected_blocks = size.div_ceil(chunks.block_size).max(1);
        if chunks.block_hashes.len() as u64 != expected_blocks
            || chunks.cumulative_hashes.len() as u64 != expected_blocks
        {
            return invalid(format!(
                "expected {expected_blocks} block digests, found {} and {} cumulative",
                chunks.block_hashes.len(),
                chunks.cumulative_hashes.len()
            ));
        }
        for digest in chunks.block_hashes.iter().chain(&chunks.cumulative_hashes) {
            check_digest(digest)?;
        }
        if chunks.cumulative_hashes.last().map(String::as_str) != Some(hash) {
            return invalid("last cumulative digest differs from system.hash".into());
        }
        Ok(())
    }
}

/// Numeric equality between a size hint and the computed size: `6`, `6.0`
/// and `6e0` all match six bytes. Strings, booleans and fractional or
/// negative numbers never match.
fn size_hint_matches(expected: &Value, size: u64) -> bool {
    let Value::Number(n) = expected else {
        return false;
    };
    if let Some(exact) = n.as_u64() {
        return exact == size;
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f >= 0.0 => f == size as f64,
        _ => false,
    }
}

fn check_digest(digest: &str) -> CatalogResult<()> {
    let (name, hex) = split_digest(digest);
    let algorithm = HashAlgorithm::from_name(name)
        .map_err(|_| CatalogError::InvalidRecord(format!("unknown digest algorithm in {digest}")))?;
    if hex.len() != algorithm.output_len() * 2 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CatalogError::InvalidRecord(format!("malformed digest: {digest}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(value: Value) -> UserMeta {
        value.as_object().cloned().unwrap()
    }

    fn written(data: &[u8], user_meta: UserMeta) -> MetaRecord {
        let alg = HashAlgorithm::Sha256;
        let digest = alg.digest_string(data);
        MetaRecord {
            system: SystemMeta {
                size: Some(data.len() as u64),
                hash: Some(digest.clone()),
                chunks: ChunksMeta {
                    block_size: 1024,
                    block_hashes: vec![digest.clone()],
                    cumulative_hashes: vec![digest],
                },
            },
            user: user_meta,
            lock: None,
        }
    }

    // ----------------------------------------------------------------
    // Serialization
    // ----------------------------------------------------------------

    #[test]
    fn fresh_record_json_shape() {
        let record = MetaRecord::new(user(json!({"content-type": "text/plain"})));
        let value: Value = serde_json::from_slice(&record.to_json().unwrap()).unwrap();
        assert_eq!(value["system"]["size"], Value::Null);
        assert_eq!(value["system"]["chunks"]["block_size"], DEFAULT_BLOCK_SIZE);
        assert_eq!(value["user"]["content-type"], "text/plain");
        assert!(value.get("lock").is_none());
    }

    #[test]
    fn lock_owner_roundtrips() {
        let mut record = MetaRecord::default();
        record.lock = Some(LockOwner::current());
        let back = MetaRecord::from_json("m", &record.to_json().unwrap()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn decode_error_names_path() {
        let err = MetaRecord::from_json("completed/meta/k", b"{not json").unwrap_err();
        match err {
            CatalogError::JsonDecode { path, .. } => assert_eq!(path, "completed/meta/k"),
            other => panic!("unexpected {other:?}"),
        }
    }

    // ----------------------------------------------------------------
    // Hints
    // ----------------------------------------------------------------

    #[test]
    fn algorithm_from_hint() {
        let default = HashAlgorithm::Sha256;
        let pick = |v: Value| MetaRecord::new(user(v)).hash_algorithm(default);
        assert_eq!(pick(json!({})).unwrap(), default);
        assert_eq!(pick(json!({"hash": "md5:abc"})).unwrap(), HashAlgorithm::Md5);
        assert_eq!(pick(json!({"hash": "BLAKE3:"})).unwrap(), HashAlgorithm::Blake3);
        assert_eq!(pick(json!({"hash": ":ff"})).unwrap(), default);
        assert!(matches!(pick(json!({"hash": "crc32:00"})), Err(CatalogError::Hasher(_))));
        assert!(matches!(pick(json!({"hash": 7})), Err(CatalogError::InvalidUserMeta(_))));
    }

    #[test]
    fn verify_without_hints() {
        written(b"abcdef", UserMeta::new()).verify_integrity().unwrap();
    }

    #[test]
    fn verify_matching_hints() {
        let hash = HashAlgorithm::Sha256.digest_string(b"abcdef");
        written(b"abcdef", user(json!({"size": 6, "hash": hash})))
            .verify_integrity()
            .unwrap();
    }

    #[test]
    fn verify_size_mismatch() {
        let err = written(b"abcdef", user(json!({"size": 7}))).verify_integrity().unwrap_err();
        assert!(matches!(err, CatalogError::FileIntegrity(ref m) if m == "Size mismatch."));
    }

    #[test]
    fn verify_size_hint_is_numeric() {
        written(b"abcdef", user(json!({"size": 6.0}))).verify_integrity().unwrap();
        written(b"abcdef", user(json!({"size": null}))).verify_integrity().unwrap();
        for hint in [json!("6"), json!(6.5), json!(-6), json!(true), json!([6])] {
            let err = written(b"abcdef", user(json!({"size": hint.clone()})))
                .verify_integrity()
                .unwrap_err();
            assert!(matches!(err, CatalogError::FileIntegrity(_)), "{hint}");
        }
    }

    #[test]
    fn verify_hash_mismatch() {
        let err = written(b"abcdef", user(json!({"hash": "sha256:00"})))
            .verify_integrity()
            .unwrap_err();
        assert!(matches!(err, CatalogError::FileIntegrity(ref m) if m == "Hash mismatch."));
    }

    #[test]
    fn verify_requires_written_payload() {
        let err = MetaRecord::default().verify_integrity().unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRecord(_)));
    }

    // ----------------------------------------------------------------
    // Shape validation
    // ----------------------------------------------------------------

    #[test]
    fn validate_written_record() {
        written(b"abc", UserMeta::new()).validate().unwrap();
    }

    #[test]
    fn validate_rejects_missing_facts() {
        assert!(MetaRecord::default().validate().is_err());
    }

    #[test]
    fn validate_rejects_block_count_mismatch() {
        let mut record = written(b"abc", UserMeta::new());
        record.system.chunks.block_size = 1;
        assert!(record.validate().is_err());
    }

    #[test]
    fn validate_rejects_malformed_digest() {
        let mut record = written(b"abc", UserMeta::new());
        record.system.hash = Some("sha256:xyz".into());
        assert!(record.validate().is_err());
    }
}
