//! Symlink projection of tag and query membership.
//!
//! Layout under the projection root:
//! - `<category>/<value>/<fingerprint><ext>` for every tag on a file
//! - `queries/<query>/<fingerprint><ext>` for every query a file satisfies
//!
//! The tree holds no information of its own: it can always be rebuilt from
//! the database and the files on disk.

use crate::error::{Error, Result};
use crate::hash::Fingerprint;
use crate::model::TagMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Directory under the projection root holding query links.
pub const QUERIES_DIR: &str = "queries";

/// Everything needed to derive the links of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLinks {
    /// Absolute path of the real file; the link target.
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
    pub tags: TagMap,
    pub queries: Vec<String>,
}

impl FileLinks {
    /// `<fingerprint><ext>`, the name shared by all of this file's links.
    pub fn link_name(&self) -> String {
        match self.path.extension() {
            Some(ext) => format!("{}.{}", self.fingerprint, ext.to_string_lossy()),
            None => self.fingerprint.to_hex(),
        }
    }
}

/// Counters from a full rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionStats {
    /// Files offered by discovery.
    pub files_scanned: usize,
    /// Files that received at least one link.
    pub files_linked: usize,
    /// Links created.
    pub links_created: usize,
    /// Files skipped because they vanished or could not be linked.
    pub files_skipped: usize,
}

/// Maintains the symlink tree under a projection root.
#[derive(Debug, Clone)]
pub struct SymlinkProjector {
    root: PathBuf,
}

impl SymlinkProjector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All link paths derived from `links`, tag links first.
    pub fn link_paths(&self, links: &FileLinks) -> Vec<PathBuf> {
        let name = links.link_name();
        let name = &name;
        let tag_links = links.tags.iter().flat_map(move |(category, values)| {
            values
                .iter()
                .map(move |value| self.root.join(category).join(value).join(name))
        });
        let query_links = links
            .queries
            .iter()
            .map(|query| self.root.join(QUERIES_DIR).join(query).join(name));
        tag_links.chain(query_links).collect()
    }

    /// Remove every file and symlink under the projection root.
    ///
    /// Directories are left in place. Returns the number of entries removed.
    pub fn cleanup(&self) -> Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }

        let walker = ignore::WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .build();

        let mut doomed = Vec::new();
        for entry in walker {
            let entry = entry?;
            if entry
                .file_type()
                .is_some_and(|t| t.is_file() || t.is_symlink())
            {
                doomed.push(entry.into_path());
            }
        }

        for path in &doomed {
            remove_if_present(path)?;
        }

        tracing::debug!(root = %self.root.display(), removed = doomed.len(), "cleaned projection");
        Ok(doomed.len())
    }

    /// Create every link derived from `links`, replacing links already at those paths.
    ///
    /// Returns the number of links created.
    pub fn materialize(&self, links: &FileLinks) -> Result<usize> {
        if !links.path.is_absolute() {
            return Err(Error::relative_path(&links.path));
        }

        let paths = self.link_paths(links);
        for link in &paths {
            if let Some(parent) = link.parent() {
                fs::create_dir_all(parent)?;
            }
            remove_if_present(link)?;
            create_symlink(&links.path, link)?;
            tracing::debug!(link = %link.display(), target = %links.path.display(), "linked");
        }
        Ok(paths.len())
    }

    /// Remove exactly the links derived from `links`. Missing links are fine.
    ///
    /// Returns the number of links that existed and were removed.
    pub fn retract(&self, links: &FileLinks) -> Result<usize> {
        let mut removed = 0;
        for link in self.link_paths(links) {
            if remove_if_present(&link)? {
                removed += 1;
                tracing::debug!(link = %link.display(), "unlinked");
            }
        }
        Ok(removed)
    }

    /// Rebuild the whole tree.
    ///
    /// Cleans the projection, then asks `plan` for the links of each file in
    /// `files`. `Ok(None)` means the file has nothing to link. A file whose
    /// plan or materialization fails is logged and skipped; the rebuild
    /// carries on with the next one.
    pub fn generate_all<I, F>(&self, files: I, mut plan: F) -> Result<ProjectionStats>
    where
        I: IntoIterator<Item = PathBuf>,
        F: FnMut(&Path) -> Result<Option<FileLinks>>,
    {
        self.cleanup()?;

        let mut stats = ProjectionStats::default();
        for file in files {
            stats.files_scanned += 1;
            let result = plan(&file).and_then(|links| match links {
                Some(links) => self.materialize(&links),
                None => Ok(0),
            });
            match result {
                Ok(0) => {}
                Ok(created) => {
                    stats.files_linked += 1;
                    stats.links_created += created;
                }
                Err(e) => {
                    stats.files_skipped += 1;
                    tracing::warn!(path = %file.display(), error = %e, "skipping file");
                }
            }
        }

        tracing::info!(
            scanned = stats.files_scanned,
            linked = stats.files_linked,
            links = stats.links_created,
            skipped = stats.files_skipped,
            "regenerated projection"
        );
        Ok(stats)
    }
}

/// Remove a file or symlink. Returns false if nothing was there.
fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
