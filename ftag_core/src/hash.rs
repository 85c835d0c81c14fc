//! Content fingerprints using BLAKE3.
//!
//! A fingerprint covers only the first [`HASH_WINDOW`] bytes of a file, so it
//! is cheap on large media files and independent of the file's name or
//! location. It changes whenever a byte inside that window changes.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Fingerprint size in bytes (48 hex characters).
pub const FINGERPRINT_SIZE: usize = 24;

/// Number of leading bytes of a file that contribute to its fingerprint.
pub const HASH_WINDOW: u64 = 128 * 1024;

/// Read size used while hashing.
const CHUNK_SIZE: usize = 8096;

/// A truncated BLAKE3 digest identifying file content.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    /// Create a Fingerprint from raw bytes.
    pub fn from_bytes(bytes: [u8; FINGERPRINT_SIZE]) -> Self {
        Fingerprint(bytes)
    }

    /// Create a Fingerprint from a hex string (48 hex characters).
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != FINGERPRINT_SIZE * 2 {
            return Err(Error::validation(
                "",
                format!(
                    "Expected {} hex characters in fingerprint, got {}",
                    FINGERPRINT_SIZE * 2,
                    hex_str.len()
                ),
            ));
        }

        if hex_str.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(Error::validation(
                "",
                format!("Fingerprint must be lowercase hex: {}", hex_str),
            ));
        }

        let bytes = hex::decode(hex_str)
            .map_err(|e| Error::validation("", format!("Invalid fingerprint hex: {}", e)))?;

        let mut fingerprint = [0u8; FINGERPRINT_SIZE];
        fingerprint.copy_from_slice(&bytes);
        Ok(Fingerprint(fingerprint))
    }

    /// Convert to hex string (48 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }

    /// Fingerprint in-memory data, applying the same window as files.
    pub fn of_bytes(data: &[u8]) -> Self {
        let end = data.len().min(HASH_WINDOW as usize);
        let mut hasher = blake3::Hasher::new();
        for chunk in data[..end].chunks(CHUNK_SIZE) {
            hasher.update(chunk);
        }
        Self::from_hasher(&hasher)
    }

    /// Fingerprint the leading window of a reader.
    pub fn of_reader<R: Read>(reader: R) -> Result<Self> {
        let mut limited = reader.take(HASH_WINDOW);
        let mut hasher = blake3::Hasher::new();
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let n = match limited.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            hasher.update(&buf[..n]);
        }
        Ok(Self::from_hasher(&hasher))
    }

    /// Fingerprint a file.
    ///
    /// Returns `Ok(None)` when the file cannot be stat'd or opened: a file
    /// that vanished between discovery and hashing is an expected condition,
    /// not an error. Read failures after a successful open are propagated.
    pub fn compute(path: &Path) -> Result<Option<Self>> {
        let file = match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => match std::fs::File::open(path) {
                Ok(file) => file,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "cannot open file for hashing");
                    return Ok(None);
                }
            },
            Ok(_) => return Ok(None),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "cannot stat file for hashing");
                return Ok(None);
            }
        };
        Self::of_reader(file).map(Some)
    }

    fn from_hasher(hasher: &blake3::Hasher) -> Self {
        let digest = hasher.finalize();
        let mut fingerprint = [0u8; FINGERPRINT_SIZE];
        fingerprint.copy_from_slice(&digest.as_bytes()[..FINGERPRINT_SIZE]);
        Fingerprint(fingerprint)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Fingerprint::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_length() {
        let fp = Fingerprint::of_bytes(b"");
        assert_eq!(fp.to_hex().len(), 48);
    }

    #[test]
    fn test_fingerprint_is_blake3_prefix() {
        let fp = Fingerprint::of_bytes(b"hello world");

        // BLAKE3 of "hello world", truncated to 192 bits
        assert_eq!(
            fp.to_hex(),
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914"
        );
    }

    #[test]
    fn test_from_hex_roundtrip() {
        let original = Fingerprint::of_bytes(b"test data");
        let parsed = Fingerprint::from_hex(&original.to_hex()).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_from_hex_invalid() {
        assert!(Fingerprint::from_hex("abcd").is_err());
        assert!(Fingerprint::from_hex("").is_err());
        assert!(Fingerprint::from_hex(&"z".repeat(48)).is_err());
        assert!(Fingerprint::from_hex(&"AB".repeat(24)).is_err());
    }

    #[test]
    fn test_compute_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = Fingerprint::compute(&temp_dir.path().join("missing.bin")).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_compute_directory_is_none() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(Fingerprint::compute(temp_dir.path()).unwrap(), None);
    }

    #[test]
    fn test_compute_matches_of_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("song.mp3");
        fs::write(&path, b"not really an mp3").unwrap();

        let fp = Fingerprint::compute(&path).unwrap().unwrap();
        assert_eq!(fp, Fingerprint::of_bytes(b"not really an mp3"));
    }

    #[test]
    fn test_compute_stable_under_rename() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("a.txt");
        fs::write(&original, b"payload").unwrap();
        let before = Fingerprint::compute(&original).unwrap().unwrap();

        fs::create_dir(temp_dir.path().join("moved")).unwrap();
        let moved = temp_dir.path().join("moved").join("b.dat");
        fs::rename(&original, &moved).unwrap();
        let after = Fingerprint::compute(&moved).unwrap().unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn test_bytes_past_window_are_ignored() {
        let mut a = vec![7u8; HASH_WINDOW as usize];
        let mut b = a.clone();
        a.extend_from_slice(b"tail one");
        b.extend_from_slice(b"different tail");

        assert_eq!(Fingerprint::of_bytes(&a), Fingerprint::of_bytes(&b));
        assert_eq!(
            Fingerprint::of_reader(&a[..]).unwrap(),
            Fingerprint::of_reader(&b[..]).unwrap()
        );
    }

    #[test]
    fn test_last_byte_in_window_counts() {
        let a = vec![0u8; HASH_WINDOW as usize];
        let mut b = a.clone();
        b[HASH_WINDOW as usize - 1] = 1;
        assert_ne!(Fingerprint::of_bytes(&a), Fingerprint::of_bytes(&b));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let fp = Fingerprint::of_bytes(b"x");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", fp.to_hex()));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            max_shrink_iters: 10000,
            ..ProptestConfig::default()
        })]

        /// Fingerprinting the same data always produces the same result
        #[test]
        fn prop_fingerprint_deterministic(data: Vec<u8>) {
            prop_assert_eq!(Fingerprint::of_bytes(&data), Fingerprint::of_bytes(&data));
        }

        /// Reader and slice paths agree
        #[test]
        fn prop_reader_matches_slice(data in prop::collection::vec(any::<u8>(), 0..40_000)) {
            prop_assert_eq!(Fingerprint::of_reader(&data[..]).unwrap(), Fingerprint::of_bytes(&data));
        }

        /// Flipping any byte inside the window changes the fingerprint
        #[test]
        fn prop_byte_flip_changes_fingerprint(
            data in prop::collection::vec(any::<u8>(), 1..20_000),
            index: prop::sample::Index,
        ) {
            let mut edited = data.clone();
            let i = index.index(edited.len());
            edited[i] ^= 0xff;
            prop_assert_ne!(Fingerprint::of_bytes(&data), Fingerprint::of_bytes(&edited));
        }
    }
}
