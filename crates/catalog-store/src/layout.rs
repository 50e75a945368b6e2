//! Directory layout and system defaults of a catalog.
//!
//! A [`Layout`] is loaded once (from TOML or [`Layout::default`]),
//! validated, and then shared read-only by every store handle.

use std::collections::HashSet;
use std::path::Path;

use catalog_backend::path;
use catalog_crypto::HashAlgorithm;
use catalog_types::ObjectKey;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// Default block size for chunked hashing: 32 MiB.
pub const DEFAULT_BLOCK_SIZE: u64 = 32 * 1024 * 1024;

/// Storage area an artifact lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Area {
    Processing,
    Completed,
    Chunked,
}

/// Artifact kind within an area.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Data,
    Meta,
    Doc,
}

/// Directories of one area.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaDirs {
    pub data_dir: String,
    pub meta_dir: String,
    #[serde(default)]
    pub doc_dir: String,
}

impl AreaDirs {
    fn new(area: &str) -> Self {
        Self {
            data_dir: format!("{area}/data"),
            meta_dir: format!("{area}/meta"),
            doc_dir: format!("{area}/doc"),
        }
    }

    fn dir(&self, kind: Kind) -> &str {
        match kind {
            Kind::Data => &self.data_dir,
            Kind::Meta => &self.meta_dir,
            Kind::Doc => &self.doc_dir,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirRules {
    pub processing: AreaDirs,
    pub completed: AreaDirs,
    pub chunked: AreaDirs,
}

impl Default for DirRules {
    fn default() -> Self {
        Self {
            processing: AreaDirs::new("processing"),
            completed: AreaDirs::new("completed"),
            chunked: AreaDirs::new("chunked"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemRules {
    pub default_block_size: u64,
    pub default_hash_algorithm: HashAlgorithm,
}

impl Default for SystemRules {
    fn default() -> Self {
        Self {
            default_block_size: DEFAULT_BLOCK_SIZE,
            default_hash_algorithm: HashAlgorithm::DEFAULT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRules {
    /// Path of the token marker file.
    pub token: String,
}

impl Default for FileRules {
    fn default() -> Self {
        Self {
            token: "token.json".to_string(),
        }
    }
}

/// Catalog layout: system defaults, marker files and area directories.
///
/// ```toml
/// [system]
/// default_block_size = 33554432
/// default_hash_algorithm = "sha256"
///
/// [files]
/// token = "token.json"
///
/// [dirs.processing]
/// data_dir = "processing/data"
/// meta_dir = "processing/meta"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub system: SystemRules,
    pub files: FileRules,
    pub dirs: DirRules,
}

impl Layout {
    /// Parse and validate a layout from TOML. Missing sections take defaults.
    pub fn from_toml_str(s: &str) -> CatalogResult<Self> {
        let layout: Self =
            toml::from_str(s).map_err(|e| CatalogError::Config(format!("invalid layout: {e}")))?;
        layout.validate()?;
        Ok(layout)
    }

    /// Load and validate a layout file.
    pub fn load(file: impl AsRef<Path>) -> CatalogResult<Self> {
        let file = file.as_ref();
        let text = std::fs::read_to_string(file)
            .map_err(|e| CatalogError::Config(format!("cannot read {}: {e}", file.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> CatalogResult<String> {
        toml::to_string_pretty(self).map_err(|e| CatalogError::Serialization(e.to_string()))
    }

    /// Check the invariants the store relies on.
    pub fn validate(&self) -> CatalogResult<()> {
        let bad = |msg: String| Err(CatalogError::Config(msg));
        if self.system.default_block_size == 0 {
            return bad("default_block_size must be greater than zero".into());
        }
        if path::normalize(&self.files.token).is_empty() {
            return bad("token path must not be empty".into());
        }
        let required = [
            ("processing.data_dir", &self.dirs.processing.data_dir),
            ("processing.meta_dir", &self.dirs.processing.meta_dir),
            ("completed.data_dir", &self.dirs.completed.data_dir),
            ("completed.meta_dir", &self.dirs.completed.meta_dir),
        ];
        let mut seen = HashSet::new();
        for (name, dir) in required {
            let dir = path::normalize(dir);
            if dir.is_empty() {
                return bad(format!("{name} must not be empty"));
            }
            if !seen.insert(dir) {
                return bad(format!("{name} duplicates another area directory: {dir}"));
            }
            if dir == path::normalize(&self.files.token) {
                return bad(format!("{name} collides with the token file"));
            }
        }
        Ok(())
    }

    pub fn block_size(&self) -> u64 {
        self.system.default_block_size
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.system.default_hash_algorithm
    }

    pub fn token_path(&self) -> &str {
        path::normalize(&self.files.token)
    }

    /// Directory holding `kind` artifacts of `area`.
    pub fn dir(&self, area: Area, kind: Kind) -> &str {
        let dirs = match area {
            Area::Processing => &self.dirs.processing,
            Area::Completed => &self.dirs.completed,
            Area::Chunked => &self.dirs.chunked,
        };
        path::normalize(dirs.dir(kind))
    }

    /// Backend path of the `kind` artifact of `key` in `area`.
    pub fn path(&self, area: Area, kind: Kind, key: &ObjectKey) -> String {
        path::join(self.dir(area, kind), key.as_str())
    }

    /// Every configured directory, in area order. Empty entries are skipped.
    pub fn all_dirs(&self) -> Vec<&str> {
        [Area::Processing, Area::Completed, Area::Chunked]
            .into_iter()
            .flat_map(|area| [Kind::Data, Kind::Meta, Kind::Doc].map(|kind| self.dir(area, kind)))
            .filter(|d| !d.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_valid() {
        let layout = Layout::default();
        layout.validate().unwrap();
        assert_eq!(layout.block_size(), 33_554_432);
        assert_eq!(layout.hash_algorithm(), HashAlgorithm::Sha256);
        assert_eq!(layout.token_path(), "token.json");
    }

    #[test]
    fn paths_per_area_and_kind() {
        let layout = Layout::default();
        let key = ObjectKey::new("dir/a.bin").unwrap();
        assert_eq!(
            layout.path(Area::Processing, Kind::Meta, &key),
            "processing/meta/dir/a.bin"
        );
        assert_eq!(
            layout.path(Area::Completed, Kind::Data, &key),
            "completed/data/dir/a.bin"
        );
        assert_eq!(layout.all_dirs().len(), 9);
    }

    #[test]
    fn partial_toml_takes_defaults() {
        let layout = Layout::from_toml_str(
            r#"
            [system]
            default_block_size = 1024
            default_hash_algorithm = "blake3"

            [dirs.completed]
            data_dir = "objects"
            meta_dir = "records"
            "#,
        )
        .unwrap();
        assert_eq!(layout.block_size(), 1024);
        assert_eq!(layout.hash_algorithm(), HashAlgorithm::Blake3);
        assert_eq!(layout.dir(Area::Completed, Kind::Data), "objects");
        assert_eq!(layout.dir(Area::Completed, Kind::Doc), "");
        assert_eq!(layout.dir(Area::Processing, Kind::Data), "processing/data");
        assert_eq!(layout.token_path(), "token.json");
    }

    #[test]
    fn toml_roundtrip() {
        let layout = Layout::default();
        let text = layout.to_toml_string().unwrap();
        assert_eq!(Layout::from_toml_str(&text).unwrap(), layout);
    }

    #[test]
    fn rejects_zero_block_size() {
        let err = Layout::from_toml_str("[system]\ndefault_block_size = 0\n").unwrap_err();
        assert!(matches!(err, CatalogError::Config(_)));
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let err =
            Layout::from_toml_str("[system]\ndefault_hash_algorithm = \"crc32\"\n").unwrap_err();
        assert!(matches!(err, CatalogError::Config(_)));
    }

    #[test]
    fn rejects_shared_directories() {
        let mut layout = Layout::default();
        layout.dirs.completed.data_dir = "processing/data/".into();
        assert!(layout.validate().is_err());

        let mut layout = Layout::default();
        layout.dirs.processing.meta_dir = String::new();
        assert!(layout.validate().is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("layout.toml");
        std::fs::write(&file, "[files]\ntoken = \"marker.json\"\n").unwrap();
        assert_eq!(Layout::load(&file).unwrap().token_path(), "marker.json");
        assert!(Layout::load(dir.path().join("missing.toml")).is_err());
    }
}
