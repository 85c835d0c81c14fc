//! In-memory tag database and its persisted document form.

use crate::error::{Error, Result};
use crate::hash::Fingerprint;
use crate::query::Query;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Category name -> assigned (or required) tag values.
pub type TagMap = BTreeMap<String, Vec<String>>;

/// Category name reserved for the query projection directory.
pub const RESERVED_CATEGORY: &str = "queries";

/// Check a category, tag or query name against `^[A-Za-z][A-Za-z_0-9]*$`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_name(kind: &'static str, name: &str) -> Result<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(Error::invalid_name(kind, name))
    }
}

/// A tagging dimension and its declared values, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub values: Vec<String>,
}

/// Tags recorded for one piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path the content was first tagged under. Informational only.
    pub path: String,
    pub tags: TagMap,
}

impl FileEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tags: TagMap::new(),
        }
    }
}

/// Discovery filters. Patterns of one kind are OR'd; an empty list passes everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default)]
    pub mime: Vec<String>,
    #[serde(default)]
    pub path: Vec<String>,
}

/// The tag database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Database {
    version: u64,
    filters: Filters,
    // Both kept sorted by name.
    categories: Vec<Category>,
    queries: Vec<Query>,
    files: BTreeMap<Fingerprint, FileEntry>,
}

impl Database {
    /// Empty database at version 0.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.category_index(name)
            .ok()
            .map(|index| &self.categories[index])
    }

    /// Declared values of a category, or `None` if the category does not exist.
    pub fn tag_values(&self, category: &str) -> Option<&[String]> {
        self.category(category).map(|c| c.values.as_slice())
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    pub fn query(&self, name: &str) -> Option<&Query> {
        self.query_index(name).ok().map(|index| &self.queries[index])
    }

    pub fn files(&self) -> &BTreeMap<Fingerprint, FileEntry> {
        &self.files
    }

    pub fn file(&self, fingerprint: &Fingerprint) -> Option<&FileEntry> {
        self.files.get(fingerprint)
    }

    fn category_index(&self, name: &str) -> std::result::Result<usize, usize> {
        self.categories
            .binary_search_by(|c| c.name.as_str().cmp(name))
    }

    fn query_index(&self, name: &str) -> std::result::Result<usize, usize> {
        self.queries.binary_search_by(|q| q.name.as_str().cmp(name))
    }

    /// Declare a new category with no values.
    pub fn add_category(&mut self, name: &str) -> Result<()> {
        validate_name("Category", name)?;
        if name == RESERVED_CATEGORY {
            return Err(Error::reserved_name(name));
        }
        match self.category_index(name) {
            Ok(_) => Err(Error::duplicate_category(name)),
            Err(index) => {
                self.categories.insert(
                    index,
                    Category {
                        name: name.to_string(),
                        values: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    /// Append a value to an existing category.
    pub fn add_tag(&mut self, category: &str, value: &str) -> Result<()> {
        validate_name("Tag", value)?;
        let index = self
            .category_index(category)
            .map_err(|_| Error::unknown_category(category))?;
        let values = &mut self.categories[index].values;
        if values.iter().any(|v| v == value) {
            return Err(Error::duplicate_tag(category, value));
        }
        values.push(value.to_string());
        Ok(())
    }

    /// Add a mime filter. Adding an existing pattern is a no-op.
    pub fn add_mime_filter(&mut self, pattern: &str) -> Result<()> {
        check_pattern(pattern)?;
        if !self.filters.mime.iter().any(|p| p == pattern) {
            self.filters.mime.push(pattern.to_string());
        }
        Ok(())
    }

    /// Add a path filter. Adding an existing pattern is a no-op.
    pub fn add_path_filter(&mut self, pattern: &str) -> Result<()> {
        check_pattern(pattern)?;
        if !self.filters.path.iter().any(|p| p == pattern) {
            self.filters.path.push(pattern.to_string());
        }
        Ok(())
    }

    /// Declare a new query. Its rule may only name declared categories and values.
    pub fn add_query(&mut self, name: &str, rule: TagMap) -> Result<()> {
        validate_name("Query", name)?;
        self.validate_tags(&rule)?;
        match self.query_index(name) {
            Ok(_) => Err(Error::duplicate_query(name)),
            Err(index) => {
                self.queries.insert(index, Query::new(name, rule));
                Ok(())
            }
        }
    }

    /// Evaluate a named query against a fingerprint's stored tags.
    pub fn matches_query(&self, name: &str, fingerprint: &Fingerprint) -> Result<bool> {
        let query = self.query(name).ok_or_else(|| Error::unknown_query(name))?;
        Ok(query.matches(self.file(fingerprint)))
    }

    /// Names of all queries satisfied by a stored entry.
    pub fn matching_queries(&self, entry: Option<&FileEntry>) -> Vec<String> {
        self.queries
            .iter()
            .filter(|q| q.matches(entry))
            .map(|q| q.name.clone())
            .collect()
    }

    /// Replace the tag map of a fingerprint, creating its entry on first use.
    ///
    /// `path` is recorded only when the entry is created.
    pub fn set_file_tags(
        &mut self,
        fingerprint: Fingerprint,
        path: impl Into<String>,
        tags: TagMap,
    ) -> Result<()> {
        self.validate_tags(&tags)?;
        self.files
            .entry(fingerprint)
            .or_insert_with(|| FileEntry::new(path))
            .tags = tags;
        Ok(())
    }

    /// Every category and value must be declared, with no repeated values.
    pub(crate) fn validate_tags(&self, tags: &TagMap) -> Result<()> {
        for (category, values) in tags {
            let declared = self
                .tag_values(category)
                .ok_or_else(|| Error::unknown_category(category))?;
            for (i, value) in values.iter().enumerate() {
                if !declared.contains(value) {
                    return Err(Error::unknown_tag(category, value));
                }
                if values[..i].contains(value) {
                    return Err(Error::duplicate_tag(category, value));
                }
            }
        }
        Ok(())
    }

    /// Build the persisted form, stamped with `version`.
    pub(crate) fn to_document(&self, version: u64) -> DatabaseDocument {
        DatabaseDocument {
            version,
            filters: self.filters.clone(),
            tags: self
                .categories
                .iter()
                .map(|c| (c.name.clone(), c.values.clone()))
                .collect(),
            queries: self
                .queries
                .iter()
                .map(|q| (q.name.clone(), q.rule.clone()))
                .collect(),
            files: self.files.clone(),
        }
    }

    /// Rebuild a database from its persisted form, checking every invariant.
    pub(crate) fn from_document(doc: DatabaseDocument) -> Result<Self> {
        let mut db = Database {
            version: doc.version,
            ..Database::default()
        };

        for (name, values) in doc.tags {
            db.add_category(&name)?;
            for value in values {
                db.add_tag(&name, &value)?;
            }
        }
        for pattern in &doc.filters.mime {
            check_pattern(pattern)?;
        }
        for pattern in &doc.filters.path {
            check_pattern(pattern)?;
        }
        db.filters = doc.filters;
        for (name, rule) in doc.queries {
            db.add_query(&name, rule)?;
        }
        for (fingerprint, entry) in &doc.files {
            db.validate_tags(&entry.tags).map_err(|e| {
                Error::validation("", format!("file {}: {}", fingerprint, e))
            })?;
        }
        db.files = doc.files;

        Ok(db)
    }
}

fn check_pattern(pattern: &str) -> Result<()> {
    regex::Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| Error::invalid_filter(pattern, e.to_string()))
}

/// Field names every metadata document must carry.
pub(crate) const REQUIRED_FIELDS: [&str; 5] = ["files", "filters", "tags", "queries", "version"];

/// Persisted shape of the database (see the metadata file format).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DatabaseDocument {
    pub version: u64,
    pub filters: Filters,
    pub tags: BTreeMap<String, Vec<String>>,
    pub queries: BTreeMap<String, TagMap>,
    pub files: BTreeMap<Fingerprint, FileEntry>,
}
