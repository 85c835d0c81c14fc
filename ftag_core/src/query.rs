//! Named boolean rules over a file's tags.
//!
//! A rule maps categories to required values. A file satisfies it when every
//! category of the rule is present in the file's tags and the file's values
//! for that category are a superset of the required ones. Evaluation is pure;
//! the only cache of results is the query part of the symlink projection.

use crate::model::{FileEntry, TagMap};

/// A named, persisted query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub name: String,
    pub rule: TagMap,
}

impl Query {
    pub fn new(name: impl Into<String>, rule: TagMap) -> Self {
        Self {
            name: name.into(),
            rule,
        }
    }

    /// Evaluate against a file's stored entry.
    ///
    /// A file with no entry, or whose entry has no values assigned, is tagless
    /// and never matches, not even an empty rule.
    pub fn matches(&self, entry: Option<&FileEntry>) -> bool {
        entry.is_some_and(|entry| {
            entry.tags.values().any(|values| !values.is_empty())
                && rule_matches(&self.rule, &entry.tags)
        })
    }
}

/// Conjunction over the rule's categories, each requiring a superset match.
pub fn rule_matches(rule: &TagMap, tags: &TagMap) -> bool {
    rule.iter().all(|(category, required)| {
        tags.get(category)
            .is_some_and(|values| required.iter().all(|value| values.contains(value)))
    })
}
