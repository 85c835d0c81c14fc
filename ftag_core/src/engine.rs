//! Database root discovery and the composite tagging operations.

use crate::config::StoreConfig;
use crate::discovery::FileDiscovery;
use crate::error::{Error, Result};
use crate::hash::Fingerprint;
use crate::model::{FileEntry, TagMap};
use crate::projector::{FileLinks, ProjectionStats, SymlinkProjector};
use crate::store::MetadataStore;
use rand::seq::SliceRandom;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory under the root holding the metadata file.
pub const METADATA_DIR: &str = ".ftag";
/// Metadata file name inside [`METADATA_DIR`].
pub const METADATA_FILE: &str = "db.json";
/// Engine config file name inside [`METADATA_DIR`].
pub const CONFIG_FILE: &str = "config";
/// Projection root directory under the database root.
pub const PROJECTION_DIR: &str = "ftags";

/// Path of the metadata file for a database rooted at `root`.
pub fn metadata_file(root: &Path) -> PathBuf {
    root.join(METADATA_DIR).join(METADATA_FILE)
}

/// Walk up from `start` to the first directory holding a metadata file.
///
/// A relative `start` is resolved against the current directory first, so
/// the returned root is always absolute.
pub fn find_root(start: &Path) -> Option<PathBuf> {
    let start = std::path::absolute(start).ok()?;
    start
        .ancestors()
        .find(|dir| metadata_file(dir).is_file())
        .map(Path::to_path_buf)
}

/// Outcome of looking for a database from some directory.
#[derive(Debug)]
pub enum LoadState {
    /// No metadata file above the starting directory.
    NotLoaded,
    /// A metadata file was found but could not be loaded.
    InvalidData { root: PathBuf, reason: String },
    Loaded(TagEngine),
}

impl LoadState {
    /// Locate and load the database governing `start`.
    pub fn discover(start: &Path) -> Self {
        let Some(root) = find_root(start) else {
            return LoadState::NotLoaded;
        };
        match TagEngine::open(&root) {
            Ok(engine) => LoadState::Loaded(engine),
            Err(e) => LoadState::InvalidData {
                root,
                reason: e.to_string(),
            },
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadState::Loaded(_))
    }
}

/// Counts of taggable and untagged files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UntaggedStats {
    pub taggable: usize,
    pub untagged: usize,
}

/// A loaded database together with its file discovery and projection.
#[derive(Debug)]
pub struct TagEngine {
    root: PathBuf,
    store: MetadataStore,
    discovery: FileDiscovery,
    projector: SymlinkProjector,
}

impl TagEngine {
    /// Open the database rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        let root = fs::canonicalize(root)?;
        let config = StoreConfig::load(&root.join(METADATA_DIR).join(CONFIG_FILE))?;
        let store = MetadataStore::load(metadata_file(&root), &root, config)?;
        Self::assemble(root, store)
    }

    /// Create an empty database rooted at `root`.
    ///
    /// Writes the metadata file at version 0 and a default config.
    pub fn initialize(root: &Path) -> Result<Self> {
        let root = fs::canonicalize(root)?;
        let path = metadata_file(&root);
        if path.exists() {
            return Err(Error::already_initialized(path));
        }

        let meta_dir = root.join(METADATA_DIR);
        fs::create_dir_all(&meta_dir)?;
        let config_path = meta_dir.join(CONFIG_FILE);
        let config = if config_path.exists() {
            StoreConfig::load(&config_path)?
        } else {
            let config = StoreConfig::default();
            config.write(&config_path)?;
            config
        };

        let store = MetadataStore::load_empty(path, &root, config);
        store.create()?;
        tracing::info!(root = %root.display(), "initialized database");
        Self::assemble(root, store)
    }

    fn assemble(root: PathBuf, store: MetadataStore) -> Result<Self> {
        let projector = SymlinkProjector::new(root.join(PROJECTION_DIR));
        let discovery = Self::build_discovery(&root, &store, &projector)?;
        Ok(Self {
            root,
            store,
            discovery,
            projector,
        })
    }

    fn build_discovery(
        root: &Path,
        store: &MetadataStore,
        projector: &SymlinkProjector,
    ) -> Result<FileDiscovery> {
        FileDiscovery::new(
            root,
            &[root.join(METADATA_DIR), projector.root().to_path_buf()],
            store.db().filters(),
        )
    }

    fn refresh_discovery(&mut self) -> Result<()> {
        self.discovery = Self::build_discovery(&self.root, &self.store, &self.projector)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_file(&self) -> &Path {
        self.store.path()
    }

    pub fn projection_root(&self) -> &Path {
        self.projector.root()
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn version(&self) -> u64 {
        self.store.db().version()
    }

    pub fn save(&mut self) -> Result<()> {
        self.store.save()
    }

    pub fn categories(&self) -> Vec<String> {
        self.store.db().category_names()
    }

    pub fn tag_values(&self, category: &str) -> Result<Vec<String>> {
        self.store
            .db()
            .tag_values(category)
            .map(<[String]>::to_vec)
            .ok_or_else(|| Error::unknown_category(category))
    }

    pub fn query_names(&self) -> Vec<String> {
        self.store
            .db()
            .queries()
            .iter()
            .map(|q| q.name.clone())
            .collect()
    }

    pub fn add_category(&mut self, name: &str) -> Result<()> {
        self.store.db_mut().add_category(name)
    }

    pub fn add_tag(&mut self, category: &str, value: &str) -> Result<()> {
        self.store.db_mut().add_tag(category, value)
    }

    pub fn add_mime_filter(&mut self, pattern: &str) -> Result<()> {
        self.store.db_mut().add_mime_filter(pattern)?;
        self.refresh_discovery()
    }

    pub fn add_path_filter(&mut self, pattern: &str) -> Result<()> {
        self.store.db_mut().add_path_filter(pattern)?;
        self.refresh_discovery()
    }

    /// Declare a query and link every taggable file that already satisfies it.
    ///
    /// A file that cannot be hashed or linked is logged and skipped. Returns
    /// the number of query links created.
    pub fn add_query(&mut self, name: &str, rule: TagMap) -> Result<usize> {
        self.store.db_mut().add_query(name, rule)?;

        let mut created = 0;
        for path in self.discovery.files() {
            match self.link_query(name, &path) {
                Ok(n) => created += n,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping file");
                }
            }
        }
        tracing::info!(query = name, links = created, "linked query");
        Ok(created)
    }

    fn link_query(&self, name: &str, path: &Path) -> Result<usize> {
        let fingerprint =
            Fingerprint::compute(path)?.ok_or_else(|| Error::file_not_found(path))?;
        if !self.store.db().matches_query(name, &fingerprint)? {
            return Ok(0);
        }
        self.projector.materialize(&FileLinks {
            path: path.to_path_buf(),
            fingerprint,
            tags: TagMap::new(),
            queries: vec![name.to_string()],
        })
    }

    /// Lazily enumerate the taggable files under the root.
    pub fn taggable_files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.discovery.files()
    }

    /// Tags of a file, or `None` if it has never been tagged.
    pub fn tags_for_file(&self, file: &Path) -> Result<Option<TagMap>> {
        Ok(self.store.get_tags_for_file(file)?.cloned())
    }

    /// Values of one category on a file, or `None` if not assigned.
    pub fn category_tags_for_file(&self, file: &Path, category: &str) -> Result<Option<Vec<String>>> {
        Ok(self
            .store
            .get_category_tags_for_file(file, category)?
            .map(<[String]>::to_vec))
    }

    pub fn matches_query(&self, name: &str, file: &Path) -> Result<bool> {
        self.store.matches_query(name, file)
    }

    /// True if the file lacks a value for any declared category.
    pub fn is_untagged(&self, file: &Path) -> Result<bool> {
        self.store.is_untagged(file, &self.categories())
    }

    /// Links derived from a stored entry for a file at `path`.
    fn links_for(&self, path: &Path, fingerprint: Fingerprint, entry: &FileEntry) -> FileLinks {
        FileLinks {
            path: path.to_path_buf(),
            fingerprint,
            tags: entry.tags.clone(),
            queries: self.store.db().matching_queries(Some(entry)),
        }
    }

    /// Replace a file's tags and bring its links in line, then save.
    ///
    /// Links derived from the previous tags (and the queries they satisfied)
    /// are retracted before the update; links for the new tags are created
    /// after it. The new tags are validated first so a rejected update
    /// leaves both the database and the projection untouched.
    pub fn retag_and_resync(&mut self, file: &Path, tags: TagMap) -> Result<Fingerprint> {
        let file = fs::canonicalize(file).map_err(|_| Error::file_not_found(file))?;
        let fingerprint =
            Fingerprint::compute(&file)?.ok_or_else(|| Error::file_not_found(&file))?;
        self.store.db().validate_tags(&tags)?;

        if let Some(old) = self.store.db().file(&fingerprint) {
            let old_links = self.links_for(&file, fingerprint, old);
            let removed = self.projector.retract(&old_links)?;
            tracing::debug!(path = %file.display(), removed, "retracted previous links");
        }

        let fingerprint = self.store.set_tags(&file, tags)?;

        if let Some(new) = self.store.db().file(&fingerprint) {
            let new_links = self.links_for(&file, fingerprint, new);
            let created = self.projector.materialize(&new_links)?;
            tracing::debug!(path = %file.display(), created, "materialized links");
        }

        self.store.save()?;
        Ok(fingerprint)
    }

    /// Rebuild the whole projection from the database and the files on disk.
    pub fn regenerate_all(&self) -> Result<ProjectionStats> {
        self.projector
            .generate_all(self.discovery.files(), |path| self.plan_links(path))
    }

    fn plan_links(&self, path: &Path) -> Result<Option<FileLinks>> {
        let fingerprint =
            Fingerprint::compute(path)?.ok_or_else(|| Error::file_not_found(path))?;
        Ok(self
            .store
            .db()
            .file(&fingerprint)
            .map(|entry| self.links_for(path, fingerprint, entry)))
    }

    /// Taggable files missing at least one declared category.
    ///
    /// The order is shuffled when `randomize` is set, otherwise it follows
    /// the sorted directory walk.
    pub fn untagged_files(&self, randomize: bool) -> Result<Vec<PathBuf>> {
        Ok(self.scan_untagged(randomize)?.0)
    }

    pub fn untagged_statistics(&self) -> Result<UntaggedStats> {
        Ok(self.scan_untagged(false)?.1)
    }

    /// Untagged files and the counts, from a single walk of the root.
    pub fn untagged_with_statistics(
        &self,
        randomize: bool,
    ) -> Result<(Vec<PathBuf>, UntaggedStats)> {
        self.scan_untagged(randomize)
    }

    fn scan_untagged(&self, randomize: bool) -> Result<(Vec<PathBuf>, UntaggedStats)> {
        let categories = self.categories();
        let mut files: Vec<PathBuf> = self.discovery.files().collect();
        if randomize {
            files.shuffle(&mut rand::thread_rng());
        }

        let taggable = files.len();
        let mut untagged = Vec::new();
        for file in files {
            if self.store.is_untagged(&file, &categories)? {
                untagged.push(file);
            }
        }
        let stats = UntaggedStats {
            taggable,
            untagged: untagged.len(),
        };
        Ok((untagged, stats))
    }
}
