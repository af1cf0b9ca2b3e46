//! Deduplication and exclusion of extracted domains.

use std::collections::HashMap;

use crate::tree::BlacklistTree;
use crate::validation::{domain_and_parents, normalize_domain};

/// A set of normalized domains with occurrence counts.
///
/// Keys are lower-cased, trimmed and stripped of a trailing dot; empty or
/// invalid names are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dict {
    entries: HashMap<String, usize>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of `domain`.
    ///
    /// Returns `true` the first time a domain is seen, `false` for repeats
    /// and for names that do not normalize.
    pub fn insert(&mut self, domain: &str) -> bool {
        let Some(key) = normalize_domain(domain) else {
            return false;
        };
        let count = self.entries.entry(key).or_insert(0);
        *count += 1;
        *count == 1
    }

    pub fn contains(&self, domain: &str) -> bool {
        normalize_domain(domain).is_some_and(|key| self.entries.contains_key(&key))
    }

    /// Check whether `domain` or any of its parent domains is present.
    pub fn covers(&self, domain: &str) -> bool {
        let Some(key) = normalize_domain(domain) else {
            return false;
        };
        let covered = domain_and_parents(&key).any(|d| self.entries.contains_key(d));
        covered
    }

    /// Occurrences recorded for `domain`.
    pub fn count(&self, domain: &str) -> usize {
        normalize_domain(domain)
            .and_then(|key| self.entries.get(&key).copied())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl<'a> FromIterator<&'a str> for Dict {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut dict = Dict::new();
        for domain in iter {
            dict.insert(domain);
        }
        dict
    }
}

/// Build the tree-wide exclusion dictionary.
///
/// Root exclusions and every area's exclusions are combined, so a domain
/// excluded under `hosts` is also excluded under `domains`.
pub fn exclusion_dict(tree: &BlacklistTree) -> Dict {
    tree.all_excludes().collect()
}

/// Outcome of merging one work unit's input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Merged {
    pub domains: Vec<String>,
    pub duplicates: usize,
    pub excluded: usize,
    pub covered: usize,
}

/// Merge candidate domains into a deduplicated, exclusion-filtered sequence.
///
/// `seen` is shared by every unit of the same node so duplicates across
/// sources are suppressed; it is updated with each accepted domain.
/// `covering` holds broader entries (the compiled `domains` node) that make
/// a more specific host redundant.
pub fn merge<'a, I>(input: I, excludes: &Dict, seen: &mut Dict, covering: Option<&Dict>) -> Merged
where
    I: IntoIterator<Item = &'a str>,
{
    let mut merged = Merged::default();

    for candidate in input {
        let Some(domain) = normalize_domain(candidate) else {
            continue;
        };
        if seen.contains(&domain) {
            seen.insert(&domain);
            merged.duplicates += 1;
        } else if excludes.contains(&domain) {
            merged.excluded += 1;
        } else if covering.is_some_and(|c| c.covers(&domain)) {
            merged.covered += 1;
        } else {
            seen.insert(&domain);
            merged.domains.push(domain);
        }
    }

    merged
}

/// Merge with a fresh seen-set and no covering dictionary.
pub fn deduplicate<'a, I>(input: I, excludes: &Dict) -> Merged
where
    I: IntoIterator<Item = &'a str>,
{
    merge(input, excludes, &mut Dict::new(), None)
}
