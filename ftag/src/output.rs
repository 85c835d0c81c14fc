//! Output formatting for CLI commands.
//!
//! Every command builds a serializable DTO and a text rendering; the writer
//! picks one according to `--json`.

use anyhow::Result;
use ftag_core::{Fingerprint, ProjectionStats, TagMap};
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Write output using the configured format.
    ///
    /// `data` must carry `success: bool` and `result_code: u8` fields.
    /// `text_fn` is only called in text mode.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Report an error on stderr, as a JSON object with `success=false` in
    /// JSON mode.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `init`.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub root: String,
    pub metadata_file: String,
}

/// Load state reported by `status`.
#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StatusData {
    NotLoaded,
    InvalidData {
        root: String,
        reason: String,
    },
    Loaded {
        root: String,
        version: u64,
        categories: usize,
        queries: usize,
        files: usize,
    },
}

/// Output for `status`.
#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(flatten)]
    pub data: StatusData,
}

/// A category with its declared values.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryInfo {
    pub name: String,
    pub values: Vec<String>,
}

/// Output for `category list`.
#[derive(Debug, Serialize)]
pub struct CategoryListOutput {
    pub success: bool,
    pub result_code: u8,
    pub categories: Vec<CategoryInfo>,
}

/// Output for the declaration commands (`category add`, `tag add`,
/// `filter ...`).
#[derive(Debug, Serialize)]
pub struct DeclareOutput {
    pub success: bool,
    pub result_code: u8,
    pub kind: String,
    pub name: String,
    pub version: u64,
}

/// Output for `query add`.
#[derive(Debug, Serialize)]
pub struct QueryAddOutput {
    pub success: bool,
    pub result_code: u8,
    pub name: String,
    pub rule: TagMap,
    pub links_created: usize,
}

/// Output for `query check`.
#[derive(Debug, Serialize)]
pub struct QueryCheckOutput {
    pub success: bool,
    pub result_code: u8,
    pub name: String,
    pub path: String,
    pub matches: bool,
}

/// Output for `set`.
#[derive(Debug, Serialize)]
pub struct SetOutput {
    pub success: bool,
    pub result_code: u8,
    pub path: String,
    pub fingerprint: Fingerprint,
    pub tags: TagMap,
    pub version: u64,
}

/// Output for `show`.
#[derive(Debug, Serialize)]
pub struct ShowOutput {
    pub success: bool,
    pub result_code: u8,
    pub path: String,
    pub fingerprint: Fingerprint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagMap>,
    pub queries: Vec<String>,
}

/// Output for `untagged`.
#[derive(Debug, Serialize)]
pub struct UntaggedOutput {
    pub success: bool,
    pub result_code: u8,
    pub taggable: usize,
    pub untagged: usize,
    pub files: Vec<String>,
}

/// Output for `generate`.
#[derive(Debug, Serialize)]
pub struct GenerateOutput {
    pub success: bool,
    pub result_code: u8,
    pub files_scanned: usize,
    pub files_linked: usize,
    pub links_created: usize,
    pub files_skipped: usize,
}

impl From<ProjectionStats> for GenerateOutput {
    fn from(stats: ProjectionStats) -> Self {
        Self {
            success: true,
            result_code: 0,
            files_scanned: stats.files_scanned,
            files_linked: stats.files_linked,
            links_created: stats.links_created,
            files_skipped: stats.files_skipped,
        }
    }
}

/// Render a tag map as `category: v1, v2` lines.
pub fn format_tags(tags: &TagMap) -> String {
    let mut out = String::new();
    for (category, values) in tags {
        out.push_str(&format!("  {}: {}\n", category, values.join(", ")));
    }
    out
}
