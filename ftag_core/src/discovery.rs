//! Enumeration of taggable files under a database root.

use crate::error::{Error, Result};
use crate::model::Filters;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Guess a MIME type from the file extension.
pub fn guess_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        // audio
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "wav" => "audio/x-wav",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "wma" => "audio/x-ms-wma",
        "mid" | "midi" => "audio/midi",
        // video
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "wmv" => "video/x-ms-wmv",
        "mpg" | "mpeg" => "video/mpeg",
        "ogv" => "video/ogg",
        // images
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "ico" => "image/vnd.microsoft.icon",
        "heic" => "image/heic",
        // text
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "xml" => "text/xml",
        "py" => "text/x-python",
        "rs" => "text/x-rust",
        "c" | "h" => "text/x-c",
        // documents and archives
        "pdf" => "application/pdf",
        "json" => "application/json",
        "js" => "application/javascript",
        "toml" => "application/toml",
        "yaml" | "yml" => "application/yaml",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "odt" => "application/vnd.oasis.opendocument.text",
        "epub" => "application/epub+zip",
        "zip" => "application/zip",
        "tar" => "application/x-tar",
        "gz" => "application/gzip",
        "7z" => "application/x-7z-compressed",
        _ => return None,
    };
    Some(mime)
}

/// Walks a database root and yields the files that may be tagged.
///
/// Skips the metadata directory, everything under the projection root, and
/// anything rejected by the configured filters. Only regular files are
/// yielded; symlinks are not followed.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    root: PathBuf,
    excluded: Vec<PathBuf>,
    mime_filters: Vec<Regex>,
    path_filters: Vec<Regex>,
}

impl FileDiscovery {
    /// Compile the filters and prepare a walker over `root`.
    pub fn new(root: &Path, excluded: &[PathBuf], filters: &Filters) -> Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            excluded: excluded.to_vec(),
            mime_filters: compile(&filters.mime)?,
            path_filters: compile(&filters.path)?,
        })
    }

    /// Start a fresh, lazy walk. Each call restarts from the root.
    pub fn files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        let excluded = self.excluded.clone();
        let walker = ignore::WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| !excluded.iter().any(|p| entry.path().starts_with(p)))
            .build();

        walker.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry during discovery");
                    return None;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                return None;
            }
            let path = entry.into_path();
            self.accepts(&path).then_some(path)
        })
    }

    /// Apply path and mime filters to a file under the root.
    pub fn accepts(&self, path: &Path) -> bool {
        if self.excluded.iter().any(|p| path.starts_with(p)) {
            return false;
        }
        self.matches_path_filters(path) && self.matches_mime_filters(path)
    }

    fn matches_path_filters(&self, path: &Path) -> bool {
        if self.path_filters.is_empty() {
            return true;
        }
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let relative = relative.to_string_lossy();
        self.path_filters.iter().any(|re| re.is_match(&relative))
    }

    /// A file with no recognizable MIME type passes only when no mime filters exist.
    fn matches_mime_filters(&self, path: &Path) -> bool {
        if self.mime_filters.is_empty() {
            return true;
        }
        let Some(mime) = guess_mime_type(path) else {
            return false;
        };
        self.mime_filters
            .iter()
            .any(|re| re.find(mime).is_some_and(|m| m.start() == 0))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| Error::invalid_filter(p, e.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, relative.as_bytes()).unwrap();
        path
    }

    fn relative_names(discovery: &FileDiscovery, root: &Path) -> Vec<String> {
        discovery
            .files()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().into_owned())
            .collect()
    }

    fn setup() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        touch(&root, ".ftag/db.json");
        touch(&root, "ftags/genre/rock/abc.mp3");
        touch(&root, "music/song.mp3");
        touch(&root, "music/cover.jpg");
        touch(&root, "notes/readme");
        touch(&root, "top.txt");
        (temp_dir, root)
    }

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type(Path::new("a.MP3")), Some("audio/mpeg"));
        assert_eq!(guess_mime_type(Path::new("x/y.jpeg")), Some("image/jpeg"));
        assert_eq!(guess_mime_type(Path::new("noext")), None);
        assert_eq!(guess_mime_type(Path::new("weird.qqq")), None);
    }

    #[test]
    fn test_excludes_metadata_and_projection() {
        let (_temp_dir, root) = setup();
        let discovery = FileDiscovery::new(
            &root,
            &[root.join(".ftag"), root.join("ftags")],
            &Filters::default(),
        )
        .unwrap();

        assert_eq!(
            relative_names(&discovery, &root),
            vec!["music/cover.jpg", "music/song.mp3", "notes/readme", "top.txt"]
        );
    }

    #[test]
    fn test_restartable() {
        let (_temp_dir, root) = setup();
        let discovery =
            FileDiscovery::new(&root, &[root.join(".ftag")], &Filters::default()).unwrap();
        let first: Vec<_> = discovery.files().collect();
        let second: Vec<_> = discovery.files().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_mime_filters_fail_closed() {
        let (_temp_dir, root) = setup();
        let filters = Filters {
            mime: vec!["audio/".to_string(), "text".to_string()],
            path: vec![],
        };
        let discovery = FileDiscovery::new(
            &root,
            &[root.join(".ftag"), root.join("ftags")],
            &filters,
        )
        .unwrap();

        // notes/readme has no detectable type and is excluded.
        assert_eq!(
            relative_names(&discovery, &root),
            vec!["music/song.mp3", "top.txt"]
        );
    }

    #[test]
    fn test_mime_filter_anchored_at_start() {
        let (_temp_dir, root) = setup();
        let filters = Filters {
            mime: vec!["mpeg".to_string()],
            path: vec![],
        };
        let discovery = FileDiscovery::new(&root, &[root.join(".ftag")], &filters).unwrap();
        assert!(!discovery.accepts(&root.join("music/song.mp3")));
    }

    #[test]
    fn test_path_filters_search() {
        let (_temp_dir, root) = setup();
        let filters = Filters {
            mime: vec![],
            path: vec!["usi".to_string(), "^top".to_string()],
        };
        let discovery = FileDiscovery::new(
            &root,
            &[root.join(".ftag"), root.join("ftags")],
            &filters,
        )
        .unwrap();

        assert_eq!(
            relative_names(&discovery, &root),
            vec!["music/cover.jpg", "music/song.mp3", "top.txt"]
        );
    }

    #[test]
    fn test_both_filter_kinds_must_pass() {
        let (_temp_dir, root) = setup();
        let filters = Filters {
            mime: vec!["^image/".to_string()],
            path: vec!["^music/".to_string()],
        };
        let discovery = FileDiscovery::new(
            &root,
            &[root.join(".ftag"), root.join("ftags")],
            &filters,
        )
        .unwrap();

        assert_eq!(relative_names(&discovery, &root), vec!["music/cover.jpg"]);
    }

    #[test]
    fn test_invalid_filter() {
        let temp_dir = TempDir::new().unwrap();
        let filters = Filters {
            mime: vec!["[".to_string()],
            path: vec![],
        };
        assert!(matches!(
            FileDiscovery::new(temp_dir.path(), &[], &filters),
            Err(Error::InvalidFilter { .. })
        ));
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks_not_yielded() {
        let (_temp_dir, root) = setup();
        std::os::unix::fs::symlink(root.join("top.txt"), root.join("link.txt")).unwrap();
        let discovery = FileDiscovery::new(
            &root,
            &[root.join(".ftag"), root.join("ftags")],
            &Filters::default(),
        )
        .unwrap();
        assert!(!relative_names(&discovery, &root).contains(&"link.txt".to_string()));
    }
}
