use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::Digest;

/// Supported digest algorithms.
///
/// Names are matched case-insensitively and always rendered in lowercase,
/// so `"SHA256"` and `"sha256"` select the same algorithm and produce the
/// same digest strings. Multi-part names use an underscore, as in
/// `sha3_256` and `sha512_224`.
///
/// `blake2b` and `blake2s` are the unkeyed variants at their full output
/// size (64 and 32 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha512_224,
    Sha512_256,
    Sha3_224,
    Sha3_256,
    Sha3_384,
    Sha3_512,
    Blake2b,
    Blake2s,
    Blake3,
}

impl HashAlgorithm {
    /// The algorithm used when nothing else is configured.
    pub const DEFAULT: Self = Self::Sha256;

    /// Every supported algorithm.
    pub const ALL: [HashAlgorithm; 15] = [
        Self::Md5,
        Self::Sha1,
        Self::Sha224,
        Self::Sha256,
        Self::Sha384,
        Self::Sha512,
        Self::Sha512_224,
        Self::Sha512_256,
        Self::Sha3_224,
        Self::Sha3_256,
        Self::Sha3_384,
        Self::Sha3_512,
        Self::Blake2b,
        Self::Blake2s,
        Self::Blake3,
    ];

    /// Canonical lowercase name, used as the digest string prefix.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
            Self::Sha512_224 => "sha512_224",
            Self::Sha512_256 => "sha512_256",
            Self::Sha3_224 => "sha3_224",
            Self::Sha3_256 => "sha3_256",
            Self::Sha3_384 => "sha3_384",
            Self::Sha3_512 => "sha3_512",
            Self::Blake2b => "blake2b",
            Self::Blake2s => "blake2s",
            Self::Blake3 => "blake3",
        }
    }

    /// Parse an algorithm name.
    pub fn from_name(name: &str) -> Result<Self, HasherError> {
        let lower = name.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|alg| alg.name() == lower)
            .ok_or_else(|| HasherError::UnsupportedAlgorithm(name.to_string()))
    }

    /// Digest length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha224 | Self::Sha512_224 | Self::Sha3_224 => 28,
            Self::Sha256 | Self::Sha512_256 | Self::Sha3_256 | Self::Blake2s | Self::Blake3 => 32,
            Self::Sha384 | Self::Sha3_384 => 48,
            Self::Sha512 | Self::Sha3_512 | Self::Blake2b => 64,
        }
    }

    /// One-shot digest of `data` as `"<algorithm>:<hex>"`.
    pub fn digest_string(&self, data: &[u8]) -> String {
        let mut hasher = RunningHasher::new(*self);
        hasher.update(data);
        hasher.current()
    }

    /// Render raw digest bytes as `"<algorithm>:<hex>"`.
    pub fn format_digest(&self, digest: &[u8]) -> String {
        format!("{}:{}", self.name(), hex::encode(digest))
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HasherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// Split a digest string at the first `:` into `(algorithm, hex)`.
///
/// A string without `:` is treated as a bare algorithm name with an empty
/// digest part.
pub fn split_digest(s: &str) -> (&str, &str) {
    s.split_once(':').unwrap_or((s, ""))
}

enum HashState {
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha224(sha2::Sha224),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
    Sha512_224(sha2::Sha512_224),
    Sha512_256(sha2::Sha512_256),
    Sha3_224(sha3::Sha3_224),
    Sha3_256(sha3::Sha3_256),
    Sha3_384(sha3::Sha3_384),
    Sha3_512(sha3::Sha3_512),
    Blake2b(blake2::Blake2b512),
    Blake2s(blake2::Blake2s256),
    Blake3(Box<blake3::Hasher>),
}

/// Apply `$body` to the RustCrypto hasher inside a [`HashState`], or to
/// the blake3 hasher via `$blake3`.
macro_rules! with_digest {
    ($state:expr, $h:ident => $body:expr, $b3:ident => $blake3:expr) => {
        match $state {
            HashState::Md5($h) => $body,
            HashState::Sha1($h) => $body,
            HashState::Sha224($h) => $body,
            HashState::Sha256($h) => $body,
            HashState::Sha384($h) => $body,
            HashState::Sha512($h) => $body,
            HashState::Sha512_224($h) => $body,
            HashState::Sha512_256($h) => $body,
            HashState::Sha3_224($h) => $body,
            HashState::Sha3_256($h) => $body,
            HashState::Sha3_384($h) => $body,
            HashState::Sha3_512($h) => $body,
            HashState::Blake2b($h) => $body,
            HashState::Blake2s($h) => $body,
            HashState::Blake3($b3) => $blake3,
        }
    };
}

/// Incremental hasher over a byte stream.
///
/// [`current`](Self::current) reports the digest of everything absorbed so
/// far while leaving the state untouched, which yields the running prefix
/// digests recorded per block.
pub struct RunningHasher {
    algorithm: HashAlgorithm,
    state: HashState,
    absorbed: u64,
}

impl RunningHasher {
    /// Fresh hasher for `algorithm`.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Md5 => HashState::Md5(md5::Md5::new()),
            HashAlgorithm::Sha1 => HashState::Sha1(sha1::Sha1::new()),
            HashAlgorithm::Sha224 => HashState::Sha224(sha2::Sha224::new()),
            HashAlgorithm::Sha256 => HashState::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Sha384 => HashState::Sha384(sha2::Sha384::new()),
            HashAlgorithm::Sha512 => HashState::Sha512(sha2::Sha512::new()),
            HashAlgorithm::Sha512_224 => HashState::Sha512_224(sha2::Sha512_224::new()),
            HashAlgorithm::Sha512_256 => HashState::Sha512_256(sha2::Sha512_256::new()),
            HashAlgorithm::Sha3_224 => HashState::Sha3_224(sha3::Sha3_224::new()),
            HashAlgorithm::Sha3_256 => HashState::Sha3_256(sha3::Sha3_256::new()),
            HashAlgorithm::Sha3_384 => HashState::Sha3_384(sha3::Sha3_384::new()),
            HashAlgorithm::Sha3_512 => HashState::Sha3_512(sha3::Sha3_512::new()),
            HashAlgorithm::Blake2b => HashState::Blake2b(blake2::Blake2b512::new()),
            HashAlgorithm::Blake2s => HashState::Blake2s(blake2::Blake2s256::new()),
            HashAlgorithm::Blake3 => HashState::Blake3(Box::new(blake3::Hasher::new())),
        };
        Self {
            algorithm,
            state,
            absorbed: 0,
        }
    }

    /// The algorithm this hasher runs.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Total bytes absorbed.
    pub fn absorbed(&self) -> u64 {
        self.absorbed
    }

    /// Absorb more input.
    pub fn update(&mut self, data: &[u8]) {
        with_digest!(&mut self.state, h => Digest::update(h, data), b3 => {
            b3.update(data);
        });
        self.absorbed += data.len() as u64;
    }

    /// Raw digest of the current state. Does not consume the hasher.
    pub fn current_bytes(&self) -> Vec<u8> {
        with_digest!(&self.state, h => h.clone().finalize().to_vec(), b3 => b3.finalize().as_bytes().to_vec())
    }

    /// Digest string `"<algorithm>:<hex>"` of the current state.
    pub fn current(&self) -> String {
        self.algorithm.format_digest(&self.current_bytes())
    }
}

impl fmt::Debug for RunningHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningHasher")
            .field("algorithm", &self.algorithm)
            .field("absorbed", &self.absorbed)
            .finish()
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("Not supported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SHA256_EMPTY: &str =
        "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const SHA256_ABC: &str =
        "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn known_sha256_vectors() {
        assert_eq!(HashAlgorithm::Sha256.digest_string(b""), SHA256_EMPTY);
        assert_eq!(HashAlgorithm::Sha256.digest_string(b"abc"), SHA256_ABC);
    }

    #[test]
    fn known_md5_vector() {
        assert_eq!(
            HashAlgorithm::Md5.digest_string(b""),
            "md5:d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn known_vectors_for_wider_families() {
        let cases = [
            (HashAlgorithm::Sha1, &b"abc"[..], "a9993e364706816aba3e25717850c26c9cd0d89d"),
            (
                HashAlgorithm::Sha3_256,
                &b""[..],
                "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a",
            ),
            (
                HashAlgorithm::Blake2s,
                &b""[..],
                "69217a3079908094e11121d042354a7c1f55b6482ca1a51e1b250dfd1ed0eef9",
            ),
            (
                HashAlgorithm::Blake2b,
                &b""[..],
                "786a02f742015903c6c6fd852552d272912f4740e15847618a86e217f71f5419\
                 d25e1031afee585313896444934eb04b903a685b1448b755d56f701afe9be2ce",
            ),
        ];
        for (alg, input, hex) in cases {
            assert_eq!(alg.digest_string(input), format!("{}:{hex}", alg.name()));
        }
    }

    #[test]
    fn underscored_names_parse() {
        for name in ["sha1", "sha3_224", "SHA3_512", "sha512_256", "blake2b", "Blake2s"] {
            let alg = HashAlgorithm::from_name(name).unwrap();
            assert_eq!(alg.name(), name.to_ascii_lowercase());
        }
        assert!(HashAlgorithm::from_name("sha3-256").is_err());
    }

    #[test]
    fn fresh_hasher_reports_empty_digest() {
        let h = RunningHasher::new(HashAlgorithm::Sha256);
        assert_eq!(h.current(), SHA256_EMPTY);
        assert_eq!(h.absorbed(), 0);
    }

    #[test]
    fn current_does_not_consume_state() {
        let mut h = RunningHasher::new(HashAlgorithm::Sha256);
        h.update(b"abc");
        assert_eq!(h.current(), SHA256_ABC);
        h.update(b"def");
        assert_eq!(h.current(), HashAlgorithm::Sha256.digest_string(b"abcdef"));
        assert_eq!(h.absorbed(), 6);
    }

    #[test]
    fn names_are_case_insensitive() {
        assert_eq!(HashAlgorithm::from_name("SHA256").unwrap(), HashAlgorithm::Sha256);
        assert_eq!("Blake3".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Blake3);
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let err = HashAlgorithm::from_name("crc32").unwrap_err();
        assert_eq!(err, HasherError::UnsupportedAlgorithm("crc32".into()));
        assert!(err.to_string().contains("crc32"));
    }

    #[test]
    fn output_lengths_match_hex() {
        for alg in HashAlgorithm::ALL {
            let s = alg.digest_string(b"x");
            let (name, hex) = split_digest(&s);
            assert_eq!(name, alg.name());
            assert_eq!(hex.len(), alg.output_len() * 2, "{alg}");
        }
    }

    #[test]
    fn split_digest_forms() {
        assert_eq!(split_digest("sha256:abcd"), ("sha256", "abcd"));
        assert_eq!(split_digest("md5:"), ("md5", ""));
        assert_eq!(split_digest("blake3"), ("blake3", ""));
        assert_eq!(split_digest(":ff"), ("", "ff"));
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&HashAlgorithm::Sha512).unwrap();
        assert_eq!(json, "\"sha512\"");
        for alg in HashAlgorithm::ALL {
            let json = serde_json::to_string(&alg).unwrap();
            assert_eq!(json, format!("\"{}\"", alg.name()));
            assert_eq!(serde_json::from_str::<HashAlgorithm>(&json).unwrap(), alg);
        }
    }

    proptest! {
        #[test]
        fn incremental_matches_one_shot(data in prop::collection::vec(any::<u8>(), 0..512), split in 0usize..512) {
            let split = split.min(data.len());
            for alg in HashAlgorithm::ALL {
                let mut h = RunningHasher::new(alg);
                h.update(&data[..split]);
                h.update(&data[split..]);
                prop_assert_eq!(h.current(), alg.digest_string(&data));
            }
        }
    }
}
