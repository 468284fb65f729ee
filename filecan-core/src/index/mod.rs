//! Keyword index
//!
//! Inverted mapping `keyword -> set of object ids`, one per collection, plus
//! the reverse mapping `id -> keywords` so an object's postings can be
//! dropped without the caller remembering its previous keywords.
//!
//! Queries are AND queries: an id matches when it is in the posting set of
//! every query term. Results are ascending by id so skip/take pages are
//! stable.

mod snapshot;

pub use snapshot::IndexSnapshot;

use crate::Page;
use std::collections::{BTreeSet, HashMap};

/// Normalize caller keywords: trim, lowercase, split on whitespace.
///
/// Empty tokens are dropped and duplicates collapse.
pub fn normalize_keywords<I, S>(keywords: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keywords
        .into_iter()
        .flat_map(|k| {
            k.as_ref()
                .split_whitespace()
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// In-memory inverted index of a single collection
#[derive(Debug, Clone, Default)]
pub struct KeywordIndex {
    postings: HashMap<String, BTreeSet<String>>,
    keywords_by_id: HashMap<String, BTreeSet<String>>,
}

impl KeywordIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` to the posting set of each keyword
    pub fn add<I, S>(&mut self, id: &str, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = normalize_keywords(keywords);
        for keyword in &keywords {
            self.postings
                .entry(keyword.clone())
                .or_default()
                .insert(id.to_string());
        }
        self.keywords_by_id
            .entry(id.to_string())
            .or_default()
            .extend(keywords);
    }

    /// Drop every posting of `id`, returning the keywords it had
    pub fn remove(&mut self, id: &str) -> BTreeSet<String> {
        let keywords = self.keywords_by_id.remove(id).unwrap_or_default();
        for keyword in &keywords {
            if let Some(ids) = self.postings.get_mut(keyword) {
                ids.remove(id);
                if ids.is_empty() {
                    self.postings.remove(keyword);
                }
            }
        }
        keywords
    }

    /// Replace the keyword set of `id` wholesale
    pub fn replace<I, S>(&mut self, id: &str, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.remove(id);
        self.add(id, keywords);
    }

    /// Whether `id` is tracked by the index
    pub fn contains(&self, id: &str) -> bool {
        self.keywords_by_id.contains_key(id)
    }

    /// Number of tracked objects
    pub fn object_count(&self) -> usize {
        self.keywords_by_id.len()
    }

    /// Number of distinct keywords
    pub fn keyword_count(&self) -> usize {
        self.postings.len()
    }

    /// Ids matching every whitespace-separated term of `query`
    pub fn find(&self, query: &str, page: Page) -> Vec<String> {
        let terms = normalize_keywords([query]);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut sets = Vec::with_capacity(terms.len());
        for term in &terms {
            match self.postings.get(term) {
                Some(ids) => sets.push(ids),
                // A term without postings empties the intersection
                None => return Vec::new(),
            }
        }

        // Walk the smallest set, check membership in the others
        sets.sort_by_key(|ids| ids.len());
        let Some((smallest, rest)) = sets.split_first() else {
            return Vec::new();
        };

        let matches = smallest
            .iter()
            .filter(|id| rest.iter().all(|ids| ids.contains(*id)));

        page.apply(matches).cloned().collect()
    }

    /// Iterate `(id, keywords)` pairs
    pub fn entries(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.keywords_by_id.iter()
    }
}
