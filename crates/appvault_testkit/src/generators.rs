//! Property-based test generators using proptest.
//!
//! Provides strategies for generating file trees and paths, both valid ones
//! and ones that try to escape an application's namespace.

use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for a single well-formed path segment.
pub fn segment_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[.]?[a-zA-Z0-9_-][a-zA-Z0-9_. -]{0,11}").expect("Invalid regex")
}

/// Strategy for valid logical paths, one to four segments deep.
pub fn logical_path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(segment_strategy(), 1..=4).prop_map(|segments| segments.join("/"))
}

/// Strategy for paths that must be rejected.
pub fn unsafe_path_strategy() -> impl Strategy<Value = String> {
    let path = logical_path_strategy;
    prop_oneof![
        path().prop_map(|p| format!("../{p}")),
        path().prop_map(|p| format!("{p}/..")),
        path().prop_map(|p| format!("/{p}")),
        (path(), path()).prop_map(|(a, b)| format!("{a}/../../{b}")),
        (path(), path()).prop_map(|(a, b)| format!("{a}//{b}")),
        (path(), path()).prop_map(|(a, b)| format!("{a}/./{b}")),
        (path(), path()).prop_map(|(a, b)| format!("{a}\\{b}")),
    ]
}

/// Strategy for file content (arbitrary bytes).
pub fn file_content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

/// Strategy for a file tree of up to `max_files` files.
///
/// A path never doubles as a directory of another path.
pub fn file_tree_strategy(max_files: usize) -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    prop::collection::btree_map(logical_path_strategy(), file_content_strategy(), 0..max_files)
        .prop_map(|tree| {
            let paths: Vec<String> = tree.keys().cloned().collect();
            tree.into_iter()
                .filter(|(path, _)| {
                    let dir = format!("{path}/");
                    !paths.iter().any(|other| other.starts_with(&dir))
                })
                .collect()
        })
}

/// Strategy for asset file names with a known image extension.
pub fn asset_path_strategy() -> impl Strategy<Value = String> {
    (
        logical_path_strategy(),
        prop_oneof![Just("png"), Just("jpg"), Just("jpeg"), Just("gif"), Just("webp")],
    )
        .prop_map(|(stem, ext)| format!("{stem}.{ext}"))
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appvault_protocol::LogicalPath;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn generated_paths_are_valid(path in logical_path_strategy()) {
            prop_assert!(LogicalPath::parse(&path).is_ok(), "{:?}", path);
        }

        #[test]
        fn unsafe_paths_are_rejected(path in unsafe_path_strategy()) {
            let err = LogicalPath::parse(&path).unwrap_err();
            prop_assert!(err.is_path_violation());
        }

        #[test]
        fn asset_paths_have_extensions(path in asset_path_strategy()) {
            let parsed = LogicalPath::parse(&path).unwrap();
            prop_assert!(parsed.extension().is_some());
        }

        #[test]
        fn trees_have_no_file_directory_clashes(tree in file_tree_strategy(16)) {
            for path in tree.keys() {
                let dir = format!("{path}/");
                prop_assert!(!tree.keys().any(|other| other.starts_with(&dir)));
            }
        }
    }
}
