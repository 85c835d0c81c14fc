//! Metadata file loading, validation and atomic persistence.

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::hash::Fingerprint;
use crate::model::{Database, DatabaseDocument, REQUIRED_FIELDS, TagMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A loaded tag database bound to its metadata file.
///
/// Path-based operations fingerprint the given file and look it up by
/// content. A file that has never been tagged, or that can no longer be
/// read, is reported as untagged rather than as an error.
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    root: PathBuf,
    config: StoreConfig,
    db: Database,
}

impl MetadataStore {
    /// Load and validate the metadata file at `path`.
    ///
    /// `root` is the directory recorded paths are made relative to.
    pub fn load(
        path: impl AsRef<Path>,
        root: impl AsRef<Path>,
        config: StoreConfig,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let content = fs::read_to_string(&path)?;
        let db = Self::parse(&path, &content)?;

        tracing::debug!(path = %path.display(), version = db.version(), "loaded metadata");

        Ok(Self {
            path,
            root: root.as_ref().to_path_buf(),
            config,
            db,
        })
    }

    /// Bind an empty database (version 0) to `path` without touching disk.
    pub fn load_empty(
        path: impl AsRef<Path>,
        root: impl AsRef<Path>,
        config: StoreConfig,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            root: root.as_ref().to_path_buf(),
            config,
            db: Database::empty(),
        }
    }

    /// Parse a metadata document. Every top-level field is required.
    fn parse(path: &Path, content: &str) -> Result<Database> {
        let value: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| Error::validation(path, format!("not valid JSON: {}", e)))?;

        let object = value
            .as_object()
            .ok_or_else(|| Error::validation(path, "top level is not an object"))?;
        for field in REQUIRED_FIELDS {
            if !object.contains_key(field) {
                return Err(Error::validation(
                    path,
                    format!("missing field \"{}\"", field),
                ));
            }
        }

        let doc: DatabaseDocument = serde_json::from_value(value)
            .map_err(|e| Error::validation(path, e.to_string()))?;

        Database::from_document(doc).map_err(|e| match e {
            Error::Validation { reason, .. } => Error::validation(path, reason),
            other => Error::validation(path, other.to_string()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut Database {
        &mut self.db
    }

    /// Persist to the bound metadata file.
    pub fn save(&mut self) -> Result<()> {
        let target = self.path.clone();
        self.save_as(&target)
    }

    /// Persist atomically to `target` and bump the version.
    ///
    /// The version is bumped only once the new file is in place. When the
    /// new version is a multiple of the backup interval the fresh file is
    /// also copied to `<stem>_vNNNN<suffix>`; a failed copy is logged and the
    /// save still counts.
    pub fn save_as(&mut self, target: &Path) -> Result<()> {
        let version = self.db.version() + 1;
        self.write_atomic(target, version)?;
        self.db.set_version(version);

        tracing::info!(path = %target.display(), version, "saved metadata");

        if self.config.backup_interval > 0 && version % self.config.backup_interval == 0 {
            let backup = backup_path(target, version);
            match fs::copy(target, &backup) {
                Ok(_) => tracing::info!(path = %backup.display(), "wrote metadata backup"),
                Err(e) => tracing::warn!(
                    path = %backup.display(),
                    error = %e,
                    "failed to write metadata backup"
                ),
            }
        }

        Ok(())
    }

    /// Write the metadata file for a new database without bumping the version.
    pub fn create(&self) -> Result<()> {
        self.write_atomic(&self.path, self.db.version())?;
        tracing::info!(path = %self.path.display(), "created metadata");
        Ok(())
    }

    /// Write the document stamped with `version` to a temporary file in the
    /// target's directory, then rename it over `target`. Readers see either
    /// the old file or the new one, never a partial write.
    fn write_atomic(&self, target: &Path, version: u64) -> Result<()> {
        let doc = self.db.to_document(version);
        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| Error::serialization(e.to_string()))?;

        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
        temp_file.write_all(json.as_bytes())?;
        temp_file.write_all(b"\n")?;
        temp_file.flush()?;
        temp_file.as_file().sync_all()?;

        temp_file.persist(target)?;
        Ok(())
    }

    /// Path recorded for a newly tagged file: relative to the root when possible.
    fn recorded_path(&self, file: &Path) -> String {
        file.strip_prefix(&self.root)
            .unwrap_or(file)
            .to_string_lossy()
            .into_owned()
    }

    /// Tags of a file, or `None` when it is untagged or unreadable.
    pub fn get_tags_for_file(&self, file: &Path) -> Result<Option<&TagMap>> {
        Ok(Fingerprint::compute(file)?
            .and_then(|fingerprint| self.db.file(&fingerprint))
            .map(|entry| &entry.tags))
    }

    /// Values of one category on a file, or `None` when the file has no entry
    /// or the category was never assigned.
    pub fn get_category_tags_for_file(
        &self,
        file: &Path,
        category: &str,
    ) -> Result<Option<&[String]>> {
        Ok(self
            .get_tags_for_file(file)?
            .and_then(|tags| tags.get(category))
            .map(Vec::as_slice))
    }

    /// Replace a file's tags wholesale.
    pub fn set_tags(&mut self, file: &Path, tags: TagMap) -> Result<Fingerprint> {
        let fingerprint =
            Fingerprint::compute(file)?.ok_or_else(|| Error::file_not_found(file))?;
        let recorded = self.recorded_path(file);
        self.db.set_file_tags(fingerprint, recorded, tags)?;
        Ok(fingerprint)
    }

    /// True if the file has no entry or lacks any of `categories`.
    pub fn is_untagged(&self, file: &Path, categories: &[String]) -> Result<bool> {
        Ok(match self.get_tags_for_file(file)? {
            None => true,
            Some(tags) => categories.iter().any(|c| !tags.contains_key(c)),
        })
    }

    /// Evaluate a named query against a file.
    pub fn matches_query(&self, name: &str, file: &Path) -> Result<bool> {
        match Fingerprint::compute(file)? {
            Some(fingerprint) => self.db.matches_query(name, &fingerprint),
            None => {
                if self.db.query(name).is_none() {
                    return Err(Error::unknown_query(name));
                }
                Ok(false)
            }
        }
    }
}

/// `<stem>_v<version:04><suffix>` beside `target`.
pub fn backup_path(target: &Path, version: u64) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    target.with_file_name(format!("{}_v{:04}{}", stem, version, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tags(pairs: &[(&str, &[&str])]) -> TagMap {
        pairs
            .iter()
            .map(|(c, vs)| (c.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    fn new_store(temp_dir: &TempDir) -> MetadataStore {
        let root = temp_dir.path().to_path_buf();
        let path = root.join(".ftag").join("db.json");
        MetadataStore::load_empty(path, root, StoreConfig::default())
    }

    #[test]
    fn test_load_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = new_store(&temp_dir);
        assert_eq!(store.db().version(), 0);
        assert!(store.db().categories().is_empty());
        assert!(store.db().files().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = new_store(&temp_dir);
        store.db_mut().add_category("mood").unwrap();
        store.db_mut().add_tag("mood", "happy").unwrap();
        store.db_mut().add_path_filter("music/").unwrap();
        store
            .db_mut()
            .add_query("cheerful", tags(&[("mood", &["happy"])]))
            .unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, b"a").unwrap();
        store.set_tags(&file, tags(&[("mood", &["happy"])])).unwrap();

        store.save().unwrap();
        assert_eq!(store.db().version(), 1);

        let loaded =
            MetadataStore::load(store.path(), store.root(), StoreConfig::default()).unwrap();
        assert_eq!(loaded.db(), store.db());
    }

    #[test]
    fn test_create_keeps_version_zero() {
        let temp_dir = TempDir::new().unwrap();
        let store = new_store(&temp_dir);
        store.create().unwrap();

        let loaded =
            MetadataStore::load(store.path(), store.root(), StoreConfig::default()).unwrap();
        assert_eq!(loaded.db().version(), 0);
    }

    #[test]
    fn test_save_writes_expected_layout() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = new_store(&temp_dir);
        store.save().unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        assert!(json["files"].as_object().unwrap().is_empty());
        assert!(json["tags"].as_object().unwrap().is_empty());
        assert!(json["queries"].as_object().unwrap().is_empty());
        assert!(json["filters"]["mime"].as_array().unwrap().is_empty());
        assert!(json["filters"]["path"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = new_store(&temp_dir);
        store.save().unwrap();
        store.save().unwrap();

        let names: Vec<_> = fs::read_dir(temp_dir.path().join(".ftag"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("db.json")]);
    }

    #[test]
    fn test_version_increments_and_backups() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = new_store(&temp_dir);
        let dir = temp_dir.path().join(".ftag");

        for expected in 1..=4 {
            store.save().unwrap();
            assert_eq!(store.db().version(), expected);
        }
        assert!(!dir.join("db_v0005.json").exists());

        store.save().unwrap();
        assert_eq!(store.db().version(), 5);
        let backup = dir.join("db_v0005.json");
        assert_eq!(
            fs::read(&backup).unwrap(),
            fs::read(dir.join("db.json")).unwrap()
        );

        for _ in 0..5 {
            store.save().unwrap();
        }
        assert!(dir.join("db_v0010.json").exists());
    }

    #[test]
    fn test_failed_backup_still_counts_as_saved() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = new_store(&temp_dir);
        store.db_mut().add_category("mood").unwrap();
        let dir = temp_dir.path().join(".ftag");

        // A non-empty directory at the backup path makes the copy fail.
        let backup = dir.join("db_v0005.json");
        fs::create_dir_all(backup.join("inner")).unwrap();

        for _ in 0..5 {
            store.save().unwrap();
        }
        assert_eq!(store.db().version(), 5);
        assert!(backup.is_dir());

        let loaded =
            MetadataStore::load(store.path(), store.root(), StoreConfig::default()).unwrap();
        assert_eq!(loaded.db().version(), 5);
        assert_eq!(loaded.db().category_names(), vec!["mood"]);
    }

    #[test]
    fn test_backup_interval_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let mut store = MetadataStore::load_empty(
            root.join("db.json"),
            root.clone(),
            StoreConfig { backup_interval: 0 },
        );
        for _ in 0..5 {
            store.save().unwrap();
        }
        assert!(!root.join("db_v0005.json").exists());
    }

    #[test]
    fn test_failed_save_keeps_version_and_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = new_store(&temp_dir);
        store.save().unwrap();
        let before = fs::read(store.path()).unwrap();

        // A directory where the target file should go makes the rename fail.
        let blocked = temp_dir.path().join("blocked");
        fs::create_dir_all(blocked.join("inner")).unwrap();
        assert!(store.save_as(&blocked).is_err());

        assert_eq!(store.db().version(), 1);
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("/x/.ftag/db.json"), 5),
            PathBuf::from("/x/.ftag/db_v0005.json")
        );
        assert_eq!(
            backup_path(Path::new("meta"), 12345),
            PathBuf::from("meta_v12345")
        );
    }

    #[test]
    fn test_load_missing_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.json");

        for missing in REQUIRED_FIELDS {
            let mut doc = serde_json::json!({
                "version": 1,
                "filters": {"mime": [], "path": []},
                "tags": {},
                "queries": {},
                "files": {}
            });
            doc.as_object_mut().unwrap().remove(missing);
            fs::write(&path, doc.to_string()).unwrap();

            match MetadataStore::load(&path, temp_dir.path(), StoreConfig::default()) {
                Err(Error::Validation { reason, .. }) => assert!(reason.contains(missing)),
                other => panic!("expected Validation for {}, got {:?}", missing, other),
            }
        }
    }

    #[test]
    fn test_load_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let path = root.join("db.json");

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            MetadataStore::load(&path, &root, StoreConfig::default()),
            Err(Error::Validation { .. })
        ));

        fs::write(&path, "[]").unwrap();
        assert!(matches!(
            MetadataStore::load(&path, &root, StoreConfig::default()),
            Err(Error::Validation { .. })
        ));

        let bad_key = serde_json::json!({
            "version": 1, "filters": {}, "tags": {}, "queries": {},
            "files": {"abc": {"path": "x", "tags": {}}}
        });
        fs::write(&path, bad_key.to_string()).unwrap();
        assert!(matches!(
            MetadataStore::load(&path, &root, StoreConfig::default()),
            Err(Error::Validation { .. })
        ));

        let bad_name = serde_json::json!({
            "version": 1, "filters": {}, "tags": {"9lives": []}, "queries": {},
            "files": {}
        });
        fs::write(&path, bad_name.to_string()).unwrap();
        assert!(matches!(
            MetadataStore::load(&path, &root, StoreConfig::default()),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_get_and_set_tags() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = new_store(&temp_dir);
        store.db_mut().add_category("mood").unwrap();
        store.db_mut().add_tag("mood", "happy").unwrap();
        store.db_mut().add_category("genre").unwrap();

        let file = temp_dir.path().join("sub").join("f.txt");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"content").unwrap();

        assert_eq!(store.get_tags_for_file(&file).unwrap(), None);
        assert!(store.is_untagged(&file, &["mood".to_string()]).unwrap());

        let fp = store.set_tags(&file, tags(&[("mood", &["happy"])])).unwrap();
        assert_eq!(fp, Fingerprint::compute(&file).unwrap().unwrap());
        assert_eq!(store.db().file(&fp).unwrap().path, "sub/f.txt");

        assert_eq!(
            store.get_category_tags_for_file(&file, "mood").unwrap(),
            Some(&["happy".to_string()][..])
        );
        assert_eq!(
            store.get_category_tags_for_file(&file, "genre").unwrap(),
            None
        );
        assert!(!store.is_untagged(&file, &["mood".to_string()]).unwrap());
        assert!(store.is_untagged(&file, &["genre".to_string()]).unwrap());
    }

    #[test]
    fn test_set_tags_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = new_store(&temp_dir);
        let result = store.set_tags(&temp_dir.path().join("gone"), TagMap::new());
        assert!(matches!(result, Err(Error::FileNotFound { .. })));
        assert!(store.db().files().is_empty());
    }

    #[test]
    fn test_tags_follow_content_not_path() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = new_store(&temp_dir);
        store.db_mut().add_category("mood").unwrap();
        store.db_mut().add_tag("mood", "happy").unwrap();

        let file = temp_dir.path().join("a.txt");
        fs::write(&file, b"same bytes").unwrap();
        store.set_tags(&file, tags(&[("mood", &["happy"])])).unwrap();

        let renamed = temp_dir.path().join("b.txt");
        fs::rename(&file, &renamed).unwrap();
        assert!(store.get_tags_for_file(&renamed).unwrap().is_some());
        assert!(store.get_tags_for_file(&file).unwrap().is_none());
    }

    #[test]
    fn test_matches_query_by_path() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = new_store(&temp_dir);
        store.db_mut().add_category("mood").unwrap();
        store.db_mut().add_tag("mood", "happy").unwrap();
        store
            .db_mut()
            .add_query("cheerful", tags(&[("mood", &["happy"])]))
            .unwrap();

        let file = temp_dir.path().join("a.txt");
        fs::write(&file, b"a").unwrap();
        assert!(!store.matches_query("cheerful", &file).unwrap());

        store.set_tags(&file, tags(&[("mood", &["happy"])])).unwrap();
        assert!(store.matches_query("cheerful", &file).unwrap());

        assert!(!store
            .matches_query("cheerful", &temp_dir.path().join("gone"))
            .unwrap());
        assert!(matches!(
            store.matches_query("nope", &file),
            Err(Error::UnknownQuery { .. })
        ));
        assert!(matches!(
            store.matches_query("nope", &temp_dir.path().join("gone")),
            Err(Error::UnknownQuery { .. })
        ));
    }
}
