//! # ftag Core
//!
//! Content-addressed file tagging with a symlink projection.
//!
//! Files under a database root are identified by a BLAKE3 fingerprint of
//! their leading bytes, so tags survive renames and moves. Tags are grouped
//! into declared categories, named queries select files by tag, and the
//! whole tag space is mirrored as a browsable tree of symlinks.
//!
//! ## Features
//!
//! - Content identity: tags follow file contents, not paths
//! - Single JSON metadata file, saved atomically with periodic backups
//! - Mime and path filters restricting which files are taggable
//! - Named conjunctive queries over tags
//! - Symlink projection rebuilt from the database at any time
//!
//! ## Example
//!
//! ```no_run
//! use ftag_core::{TagEngine, TagMap};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Create a database in the current directory
//! let mut engine = TagEngine::initialize(Path::new("."))?;
//!
//! // Declare a category and its values
//! engine.add_category("genre")?;
//! engine.add_tag("genre", "rock")?;
//!
//! // Tag a file; links appear under ./ftags/genre/rock/
//! let mut tags = TagMap::new();
//! tags.insert("genre".to_string(), vec!["rock".to_string()]);
//! engine.retag_and_resync(Path::new("./song.mp3"), tags)?;
//!
//! // Rebuild the whole projection
//! let stats = engine.regenerate_all()?;
//! println!("Created {} links", stats.links_created);
//! # Ok(())
//! # }
//! ```

mod config;
mod discovery;
mod engine;
mod error;
mod hash;
mod model;
mod projector;
mod query;
mod store;

pub use config::{DEFAULT_BACKUP_INTERVAL, StoreConfig};
pub use discovery::{FileDiscovery, guess_mime_type};
pub use engine::{
    CONFIG_FILE, LoadState, METADATA_DIR, METADATA_FILE, PROJECTION_DIR, TagEngine,
    UntaggedStats, find_root, metadata_file,
};
pub use error::{Error, Result};
pub use hash::{FINGERPRINT_SIZE, Fingerprint, HASH_WINDOW};
pub use model::{Category, Database, FileEntry, Filters, RESERVED_CATEGORY, TagMap, is_valid_name};
pub use projector::{FileLinks, ProjectionStats, QUERIES_DIR, SymlinkProjector};
pub use query::{Query, rule_matches};
pub use store::{MetadataStore, backup_path};
