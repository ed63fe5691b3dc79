//! Path → hash listings.

use crate::error::ProtocolResult;
use crate::hash::ContentHash;
use crate::path::LogicalPath;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;

/// A mapping from logical path to content hash.
///
/// Used both for an application's live state and for the listing a client
/// declares in a push. Entries are kept sorted so that everything derived
/// from a manifest is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<LogicalPath, ContentHash>,
}

/// The difference between two manifests, from `current` to `next`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    /// Paths only present in `next`.
    pub added: Vec<LogicalPath>,
    /// Paths present in both with different hashes.
    pub changed: Vec<LogicalPath>,
    /// Paths only present in `current`.
    pub removed: Vec<LogicalPath>,
}

impl ManifestDiff {
    /// Returns true if the manifests are identical.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

impl Manifest {
    /// Creates an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a manifest from unvalidated string pairs, as found in JSON
    /// bodies.
    ///
    /// # Errors
    ///
    /// Every path is checked before any hash, so a listing that escapes its
    /// namespace always fails as a path violation, whatever else is wrong
    /// with it.
    pub fn from_raw(raw: BTreeMap<String, String>) -> ProtocolResult<Self> {
        let paths = raw
            .keys()
            .map(|path| LogicalPath::parse(path))
            .collect::<ProtocolResult<Vec<_>>>()?;
        let mut manifest = Self::new();
        for (path, hash) in paths.into_iter().zip(raw.values()) {
            manifest.insert(path, ContentHash::parse(hash)?);
        }
        Ok(manifest)
    }

    /// Inserts or replaces an entry, returning the previous hash.
    pub fn insert(&mut self, path: LogicalPath, hash: ContentHash) -> Option<ContentHash> {
        self.entries.insert(path, hash)
    }

    /// Returns the hash recorded for `path`.
    pub fn get(&self, path: &LogicalPath) -> Option<&ContentHash> {
        self.entries.get(path)
    }

    /// Returns true if `path` is listed.
    pub fn contains(&self, path: &LogicalPath) -> bool {
        self.entries.contains_key(path)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in path order.
    pub fn iter(&self) -> btree_map::Iter<'_, LogicalPath, ContentHash> {
        self.entries.iter()
    }

    /// Returns the distinct hashes referenced by this manifest.
    pub fn hashes(&self) -> BTreeSet<&ContentHash> {
        self.entries.values().collect()
    }

    /// Computes what changes when `self` is replaced by `next`.
    pub fn diff(&self, next: &Manifest) -> ManifestDiff {
        let mut diff = ManifestDiff::default();
        for (path, hash) in next.iter() {
            match self.get(path) {
                None => diff.added.push(path.clone()),
                Some(current) if current != hash => diff.changed.push(path.clone()),
                Some(_) => {}
            }
        }
        diff.removed = self
            .entries
            .keys()
            .filter(|path| !next.contains(path))
            .cloned()
            .collect();
        diff
    }
}

impl FromIterator<(LogicalPath, ContentHash)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (LogicalPath, ContentHash)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = (&'a LogicalPath, &'a ContentHash);
    type IntoIter = btree_map::Iter<'a, LogicalPath, ContentHash>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(entries: &[(&str, &[u8])]) -> Manifest {
        entries
            .iter()
            .map(|(p, c)| (LogicalPath::parse(p).unwrap(), ContentHash::of(c)))
            .collect()
    }

    fn names(paths: &[LogicalPath]) -> Vec<&str> {
        paths.iter().map(LogicalPath::as_str).collect()
    }

    #[test]
    fn diff_classifies_entries() {
        let current = manifest(&[("keep", b"1"), ("change", b"2"), ("drop", b"3")]);
        let next = manifest(&[("keep", b"1"), ("change", b"X"), ("new", b"4")]);

        let diff = current.diff(&next);
        assert_eq!(names(&diff.added), vec!["new"]);
        assert_eq!(names(&diff.changed), vec!["change"]);
        assert_eq!(names(&diff.removed), vec!["drop"]);
        assert!(!diff.is_empty());
    }

    #[test]
    fn identical_manifests_have_empty_diff() {
        let m = manifest(&[("a", b"1")]);
        assert!(m.diff(&m.clone()).is_empty());
    }

    #[test]
    fn rename_is_add_plus_remove() {
        let before = manifest(&[("valid-file.png", b"some-content")]);
        let after = manifest(&[("valid-file-renamed.png", b"some-content")]);
        let diff = before.diff(&after);
        assert_eq!(names(&diff.added), vec!["valid-file-renamed.png"]);
        assert_eq!(names(&diff.removed), vec!["valid-file.png"]);
        assert_eq!(before.hashes(), after.hashes());
    }

    #[test]
    fn from_raw_validates() {
        let good: BTreeMap<_, _> =
            [("a.js".to_string(), ContentHash::of(b"a").to_string())].into();
        assert_eq!(Manifest::from_raw(good).unwrap().len(), 1);

        let bad_path: BTreeMap<_, _> =
            [("../a".to_string(), ContentHash::of(b"a").to_string())].into();
        assert!(Manifest::from_raw(bad_path).unwrap_err().is_path_violation());

        let bad_hash: BTreeMap<_, _> = [("a".to_string(), String::new())].into();
        assert!(Manifest::from_raw(bad_hash).is_err());
    }

    #[test]
    fn from_raw_reports_paths_before_hashes() {
        // "../x" sorts after "!a" and before "a", so bad hashes sit on
        // both sides of the escaping path.
        let mixed: BTreeMap<_, _> = [
            ("!a".to_string(), "nothex".to_string()),
            ("../x".to_string(), ContentHash::of(b"x").to_string()),
            ("a".to_string(), "nothex".to_string()),
        ]
        .into();
        assert!(Manifest::from_raw(mixed).unwrap_err().is_path_violation());
    }

    #[test]
    fn serializes_as_plain_object() {
        let m = manifest(&[("b", b"2"), ("a", b"1")]);
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.starts_with("{\"a\":"));
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn manifest_strategy() -> impl Strategy<Value = Manifest> {
            prop::collection::btree_map("[a-e]{1,3}", 0u8..4, 0..12).prop_map(|entries| {
                entries
                    .into_iter()
                    .map(|(path, byte)| {
                        (LogicalPath::parse(&path).unwrap(), ContentHash::of(&[byte]))
                    })
                    .collect()
            })
        }

        proptest! {
            #[test]
            fn diff_replays_to_next(current in manifest_strategy(), next in manifest_strategy()) {
                let diff = current.diff(&next);
                let mut replayed = current.clone();
                for path in diff.added.iter().chain(&diff.changed) {
                    replayed.insert(path.clone(), next.get(path).unwrap().clone());
                }
                let replayed: Manifest = replayed
                    .iter()
                    .filter(|(path, _)| !diff.removed.contains(path))
                    .map(|(path, hash)| (path.clone(), hash.clone()))
                    .collect();
                prop_assert_eq!(replayed, next);
                prop_assert!(current.diff(&current).is_empty());
            }
        }
    }
}
