//! Pull bundle assembly.

use crate::blob_store::BlobStore;
use crate::config::{ServerConfig, SourcePolicy};
use crate::error::ServerResult;
use crate::metadata::{AppMetadata, METADATA_FILE};
use appvault_protocol::{
    asset_key, BundleFooter, FooterEntry, LogicalPath, Manifest, PullBundleBuilder, PullRequest,
};
use std::sync::Arc;
use tracing::debug;

/// Builds pull bundles from a manifest.
///
/// Assembly is a pure function of the manifest, the client's hashes and the
/// blobs, so equal inputs give byte-identical bundles.
pub struct PullAssembler {
    blobs: Arc<BlobStore>,
    config: ServerConfig,
}

impl PullAssembler {
    /// Creates an assembler.
    pub fn new(blobs: Arc<BlobStore>, config: ServerConfig) -> Self {
        Self { blobs, config }
    }

    fn is_asset(&self, path: &LogicalPath) -> bool {
        path.extension()
            .is_some_and(|ext| self.config.is_asset_extension(ext))
    }

    /// Assembles the bundle for `source` given what the client holds.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced blob is missing or corrupted, or the
    /// zip writer fails.
    pub fn assemble(&self, source: &Manifest, request: &PullRequest) -> ServerResult<Vec<u8>> {
        let mut builder = PullBundleBuilder::new();
        let mut footer = BundleFooter {
            base_version: self.base_version(source)?,
            entries: Vec::new(),
        };
        let mut shipped = 0usize;
        let mut referenced = 0usize;

        for (path, hash) in source {
            if self.is_asset(path) {
                builder.list_asset(path);
                if request.hash_for(&asset_key(path)) != Some(hash.as_str()) {
                    builder.include_asset(path.clone(), self.blobs.get(hash)?);
                    shipped += 1;
                }
                continue;
            }

            let client_has = self.config.source_policy == SourcePolicy::Incremental
                && request.hash_for(path.as_str()) == Some(hash.as_str());
            if client_has {
                footer.entries.push(FooterEntry::Reference {
                    path: path.clone(),
                    hash: hash.clone(),
                });
                referenced += 1;
            } else {
                footer.entries.push(FooterEntry::File {
                    path: path.clone(),
                    hash: hash.clone(),
                    content: self.blobs.get(hash)?,
                });
            }
        }

        debug!(
            files = source.len(),
            assets_shipped = shipped,
            sources_referenced = referenced,
            "pull bundle assembled"
        );
        Ok(builder.finish(&footer)?)
    }

    /// Reads `base_version` from the source's `Appfile`.
    ///
    /// The metadata was validated when it was pushed; a file that no longer
    /// parses is treated as absent.
    fn base_version(&self, source: &Manifest) -> ServerResult<Option<String>> {
        let path = LogicalPath::parse(METADATA_FILE)?;
        let Some(hash) = source.get(&path) else {
            return Ok(None);
        };
        let bytes = self.blobs.get(hash)?;
        Ok(AppMetadata::parse(&bytes).ok().map(|m| m.base_version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appvault_protocol::{ContentHash, PullBundle};
    use appvault_storage::InMemoryBackend;

    fn setup(policy: SourcePolicy, files: &[(&str, &[u8])]) -> (PullAssembler, Manifest) {
        let blobs = Arc::new(BlobStore::new(Arc::new(InMemoryBackend::new())));
        let mut manifest = Manifest::new();
        for (path, content) in files {
            let hash = blobs.put(content).unwrap();
            manifest.insert(LogicalPath::parse(path).unwrap(), hash);
        }
        let config = ServerConfig::new(b"s".to_vec()).with_source_policy(policy);
        (PullAssembler::new(blobs, config), manifest)
    }

    fn request(pairs: &[(&str, &[u8])]) -> PullRequest {
        PullRequest {
            asset_hashes: pairs
                .iter()
                .map(|(k, c)| (k.to_string(), ContentHash::of(c).to_string()))
                .collect(),
        }
    }

    #[test]
    fn ships_missing_and_changed_assets() {
        let (assembler, manifest) = setup(
            SourcePolicy::Full,
            &[
                ("a.png", b"a"),
                ("b.png", b"b"),
                ("c.jpg", b"c"),
                ("main.js", b"js"),
            ],
        );
        let req = request(&[("images/a.png", b"a"), ("images/b.png", b"old")]);

        let bundle = PullBundle::from_zip(&assembler.assemble(&manifest, &req).unwrap()).unwrap();
        let shipped: Vec<_> = bundle.assets.keys().map(String::as_str).collect();
        assert_eq!(shipped, vec!["images/b.png", "images/c.jpg"]);
        assert_eq!(
            bundle.assets_listing,
            vec!["images/a.png", "images/b.png", "images/c.jpg"]
        );
        assert_eq!(bundle.footer.entries.len(), 1);
        assert_eq!(bundle.footer.entries[0].path().as_str(), "main.js");
    }

    #[test]
    fn asset_extensions_are_case_sensitive() {
        let (assembler, manifest) = setup(
            SourcePolicy::Full,
            &[("icon.png", b"lower"), ("photo.JPG", b"upper")],
        );
        let bundle = PullBundle::from_zip(&assembler.assemble(&manifest, &request(&[])).unwrap())
            .unwrap();
        assert_eq!(bundle.assets_listing, vec!["images/icon.png"]);
        let footer: Vec<_> = bundle
            .footer
            .entries
            .iter()
            .map(|entry| entry.path().as_str())
            .collect();
        assert_eq!(footer, vec!["photo.JPG"]);
    }

    #[test]
    fn full_policy_ignores_client_source_hashes() {
        let (assembler, manifest) = setup(SourcePolicy::Full, &[("main.js", b"js")]);
        let req = request(&[("main.js", b"js")]);
        let bundle = PullBundle::from_zip(&assembler.assemble(&manifest, &req).unwrap()).unwrap();
        assert!(matches!(bundle.footer.entries[0], FooterEntry::File { .. }));
    }

    #[test]
    fn incremental_policy_references_known_sources() {
        let (assembler, manifest) = setup(
            SourcePolicy::Incremental,
            &[("main.js", b"js"), ("other.js", b"new")],
        );
        let req = request(&[("main.js", b"js"), ("other.js", b"old")]);
        let bundle = PullBundle::from_zip(&assembler.assemble(&manifest, &req).unwrap()).unwrap();
        assert!(matches!(
            bundle.footer.entries[0],
            FooterEntry::Reference { .. }
        ));
        assert!(matches!(bundle.footer.entries[1], FooterEntry::File { .. }));
    }

    #[test]
    fn footer_carries_base_version() {
        let (assembler, manifest) = setup(
            SourcePolicy::Full,
            &[(METADATA_FILE, br#"{"base_version": "0.45"}"#)],
        );
        let bytes = assembler.assemble(&manifest, &PullRequest::default()).unwrap();
        let bundle = PullBundle::from_zip(&bytes).unwrap();
        assert_eq!(bundle.footer.base_version.as_deref(), Some("0.45"));
    }

    #[test]
    fn assembly_is_deterministic() {
        let (assembler, manifest) =
            setup(SourcePolicy::Full, &[("a.png", b"a"), ("main.js", b"js")]);
        let req = PullRequest::default();
        assert_eq!(
            assembler.assemble(&manifest, &req).unwrap(),
            assembler.assemble(&manifest, &req).unwrap()
        );
    }
}
