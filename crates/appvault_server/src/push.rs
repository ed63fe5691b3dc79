//! Push ingestion.

use crate::blob_store::BlobStore;
use crate::error::{ServerError, ServerResult};
use crate::icon::AppIcon;
use crate::manifest_store::ManifestStore;
use crate::metadata::{AppMetadata, METADATA_FILE};
use appvault_protocol::{AppId, LogicalPath, ManifestDiff, PushArchive};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Prefix of every progress line.
pub const PROGRESS_PREFIX: &str = "appvault: ";

/// Summary of an accepted push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// What changed relative to the previous manifest.
    pub diff: ManifestDiff,
    /// Number of uploaded files.
    pub uploaded: usize,
    /// Metadata from the pushed `Appfile`, if any.
    pub metadata: Option<AppMetadata>,
    /// Icons found in the platform icon directories.
    pub icons: Vec<AppIcon>,
}

impl PushReport {
    /// Returns the human-readable progress lines, without prefix.
    pub fn lines(&self) -> Vec<String> {
        if self.diff.is_empty() {
            return vec!["No changes detected.".to_string()];
        }
        let mut lines = Vec::new();
        let mut count = |n: usize, verb: &str| {
            if n > 0 {
                let noun = if n == 1 { "file" } else { "files" };
                lines.push(format!("{verb} {n} {noun}."));
            }
        };
        count(self.diff.added.len(), "Added");
        count(self.diff.changed.len(), "Updated");
        count(self.diff.removed.len(), "Removed");
        lines.push("Push complete.".to_string());
        lines
    }

    /// Renders the response body: one prefixed line per progress message.
    pub fn render(&self) -> String {
        self.lines()
            .iter()
            .map(|line| format!("{PROGRESS_PREFIX}{line}\n"))
            .collect()
    }
}

/// Applies push archives to the live manifest.
///
/// Every check runs before anything is written: a push either replaces the
/// manifest completely or leaves storage as it was, apart from blobs that
/// nothing references yet.
pub struct PushIngestor {
    blobs: Arc<BlobStore>,
    manifests: Arc<ManifestStore>,
    gc_gate: Arc<RwLock<()>>,
}

impl PushIngestor {
    /// Creates an ingestor. Pushes hold `gc_gate` shared.
    pub fn new(
        blobs: Arc<BlobStore>,
        manifests: Arc<ManifestStore>,
        gc_gate: Arc<RwLock<()>>,
    ) -> Self {
        Self {
            blobs,
            manifests,
            gc_gate,
        }
    }

    /// Validates and applies a push archive to `app_id`.
    ///
    /// # Errors
    ///
    /// - [`ServerError::PathSecurity`] for any escaping path
    /// - [`ServerError::MalformedPayload`] for an undecodable archive
    /// - [`ServerError::UnlistedUpload`], [`ServerError::HashMismatch`],
    ///   [`ServerError::MissingBlob`] for inconsistent content
    /// - [`ServerError::Metadata`] for an invalid `Appfile`
    /// - [`ServerError::UnsupportedIcon`] for an icon that is not a PNG
    pub fn ingest(&self, app_id: &AppId, body: &[u8]) -> ServerResult<PushReport> {
        let archive = PushArchive::from_zip(body)?;
        debug!(
            app_id = %app_id,
            listed = archive.listing.len(),
            uploaded = archive.uploads.len(),
            "push archive decoded"
        );

        for (path, content) in &archive.uploads {
            let declared = archive
                .listing
                .get(path)
                .ok_or_else(|| ServerError::UnlistedUpload {
                    path: path.to_string(),
                })?;
            if !declared.matches(content) {
                return Err(ServerError::HashMismatch {
                    path: path.to_string(),
                });
            }
        }

        let metadata = self.read_metadata(&archive)?;

        let _gate = self.gc_gate.read();
        let lock = self.manifests.app_lock(app_id);
        let _guard = lock.lock();

        for (path, hash) in archive.listing.iter() {
            if !archive.uploads.contains_key(path) && !self.blobs.exists(hash)? {
                return Err(ServerError::MissingBlob {
                    path: path.to_string(),
                    hash: hash.to_string(),
                });
            }
        }

        let icons = self.read_icons(&archive)?;

        let current = self.manifests.get_hashes(app_id)?;
        let diff = current.diff(&archive.listing);
        let report = PushReport {
            diff,
            uploaded: archive.uploads.len(),
            metadata,
            icons,
        };
        let pushed_before = self.manifests.exists(app_id)?;
        if report.diff.is_empty() && pushed_before {
            info!(app_id = %app_id, "push with no changes");
            return Ok(report);
        }

        for content in archive.uploads.values() {
            self.blobs.put(content)?;
        }
        self.manifests.replace(app_id, archive.listing)?;

        info!(
            app_id = %app_id,
            added = report.diff.added.len(),
            changed = report.diff.changed.len(),
            removed = report.diff.removed.len(),
            uploaded = report.uploaded,
            "push applied"
        );
        Ok(report)
    }

    fn read_metadata(&self, archive: &PushArchive) -> ServerResult<Option<AppMetadata>> {
        let path = LogicalPath::parse(METADATA_FILE)?;
        let Some(hash) = archive.listing.get(&path) else {
            return Ok(None);
        };
        let bytes = match archive.uploads.get(&path) {
            Some(bytes) => bytes.clone(),
            None => self.blobs.get(hash).map_err(|err| match err {
                ServerError::BlobNotFound(_) => ServerError::MissingBlob {
                    path: path.to_string(),
                    hash: hash.to_string(),
                },
                other => other,
            })?,
        };
        AppMetadata::parse(&bytes).map(Some)
    }

    /// Every listed blob is known to exist when this runs.
    fn read_icons(&self, archive: &PushArchive) -> ServerResult<Vec<AppIcon>> {
        let mut icons = Vec::new();
        for (path, hash) in archive.listing.iter() {
            let Some(platform) = AppIcon::platform_of(path) else {
                continue;
            };
            let icon = match archive.uploads.get(path) {
                Some(bytes) => AppIcon::load(platform, path, bytes)?,
                None => AppIcon::load(platform, path, &self.blobs.get(hash)?)?,
            };
            debug!(
                path = %path,
                platform = %icon.platform,
                width = icon.width,
                height = icon.height,
                "icon accepted"
            );
            icons.push(icon);
        }
        Ok(icons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appvault_protocol::{ContentHash, PushArchiveBuilder};
    use appvault_storage::InMemoryBackend;

    struct Fixture {
        ingestor: PushIngestor,
        blobs: Arc<BlobStore>,
        manifests: Arc<ManifestStore>,
        app: AppId,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(InMemoryBackend::new());
        let blobs = Arc::new(BlobStore::new(backend.clone()));
        let manifests = Arc::new(ManifestStore::new(backend));
        Fixture {
            ingestor: PushIngestor::new(
                Arc::clone(&blobs),
                Arc::clone(&manifests),
                Arc::new(RwLock::new(())),
            ),
            blobs,
            manifests,
            app: AppId::parse("push-app").unwrap(),
        }
    }

    #[test]
    fn first_push_adds_everything() {
        let f = fixture();
        let body = PushArchiveBuilder::new()
            .file("a.js", b"a")
            .unwrap()
            .file("img/b.png", b"b")
            .unwrap()
            .build()
            .unwrap();

        let report = f.ingestor.ingest(&f.app, &body).unwrap();
        assert_eq!(report.diff.added.len(), 2);
        assert_eq!(f.manifests.get_hashes(&f.app).unwrap().len(), 2);
        assert!(f.blobs.exists(&ContentHash::of(b"b")).unwrap());
        assert_eq!(
            report.render(),
            "appvault: Added 2 files.\nappvault: Push complete.\n"
        );
    }

    #[test]
    fn repeated_push_reports_no_changes() {
        let f = fixture();
        let body = PushArchiveBuilder::new()
            .file("a.js", b"a")
            .unwrap()
            .build()
            .unwrap();
        f.ingestor.ingest(&f.app, &body).unwrap();

        let report = f.ingestor.ingest(&f.app, &body).unwrap();
        assert_eq!(report.render(), "appvault: No changes detected.\n");
    }

    #[test]
    fn hash_mismatch_changes_nothing() {
        let f = fixture();
        let body = PushArchiveBuilder::new()
            .listed("a.js", ContentHash::of(b"declared"))
            .unwrap()
            .raw_entry("diffs/a.js", b"actual")
            .build()
            .unwrap();

        let err = f.ingestor.ingest(&f.app, &body).unwrap_err();
        assert!(matches!(err, ServerError::HashMismatch { .. }));
        assert!(!f.manifests.exists(&f.app).unwrap());
        assert!(f.blobs.hashes().unwrap().is_empty());
    }

    #[test]
    fn unlisted_upload_is_rejected() {
        let f = fixture();
        let body = PushArchiveBuilder::new()
            .raw_entry("diffs/stray.js", b"stray")
            .build()
            .unwrap();
        assert!(matches!(
            f.ingestor.ingest(&f.app, &body),
            Err(ServerError::UnlistedUpload { .. })
        ));
    }

    #[test]
    fn listed_without_blob_is_rejected() {
        let f = fixture();
        let body = PushArchiveBuilder::new()
            .listed("a.js", ContentHash::of(b"never uploaded"))
            .unwrap()
            .build()
            .unwrap();
        assert!(matches!(
            f.ingestor.ingest(&f.app, &body),
            Err(ServerError::MissingBlob { .. })
        ));
    }

    #[test]
    fn traversal_is_a_security_fault() {
        let f = fixture();
        let body = PushArchiveBuilder::new()
            .raw_entry("diffs/../bad-file", b"evil")
            .build()
            .unwrap();
        let err = f.ingestor.ingest(&f.app, &body).unwrap_err();
        assert!(matches!(err, ServerError::PathSecurity(_)));
        assert!(f.manifests.get_hashes(&f.app).unwrap().is_empty());
    }

    #[test]
    fn invalid_metadata_is_user_facing() {
        let f = fixture();
        let body = PushArchiveBuilder::new()
            .file(METADATA_FILE, br#"{"base_version": "abc"}"#)
            .unwrap()
            .build()
            .unwrap();
        let err = f.ingestor.ingest(&f.app, &body).unwrap_err();
        assert_eq!(err.status(), 400);
        assert!(err.public_message().starts_with("[ERROR] "));
    }

    #[test]
    fn metadata_from_earlier_push() {
        let f = fixture();
        let appfile = br#"{"base_version": "0.4"}"#;
        let first = PushArchiveBuilder::new()
            .file(METADATA_FILE, appfile)
            .unwrap()
            .build()
            .unwrap();
        f.ingestor.ingest(&f.app, &first).unwrap();

        let second = PushArchiveBuilder::new()
            .listed(METADATA_FILE, ContentHash::of(appfile))
            .unwrap()
            .file("new.js", b"n")
            .unwrap()
            .build()
            .unwrap();
        let report = f.ingestor.ingest(&f.app, &second).unwrap();
        assert_eq!(report.metadata.unwrap().base_version, "0.4");
    }

    fn png_icon() -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, 2, 2);
            encoder.set_color(png::ColorType::Grayscale);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[0, 255, 255, 0]).unwrap();
        }
        out
    }

    #[test]
    fn icons_are_reported() {
        let f = fixture();
        let icon = png_icon();
        let body = PushArchiveBuilder::new()
            .file("publish/ios/icons/Icon-60.png", &icon)
            .unwrap()
            .file("index.ios.js", b"app")
            .unwrap()
            .build()
            .unwrap();
        let report = f.ingestor.ingest(&f.app, &body).unwrap();
        assert_eq!(report.icons.len(), 1);
        assert_eq!(report.icons[0].name, "Icon-60");
        assert_eq!((report.icons[0].width, report.icons[0].height), (2, 2));

        // Already stored icons are read back from the blob store.
        let again = PushArchiveBuilder::new()
            .listed("publish/ios/icons/Icon-60.png", ContentHash::of(&icon))
            .unwrap()
            .listed("publish/android/icons/launcher.png", ContentHash::of(&icon))
            .unwrap()
            .build()
            .unwrap();
        let report = f.ingestor.ingest(&f.app, &again).unwrap();
        assert_eq!(report.icons.len(), 2);
    }

    #[test]
    fn bad_icon_rejects_whole_push() {
        let f = fixture();
        for (path, content) in [
            ("publish/android/icons/launcher.jpg", png_icon()),
            ("publish/ios/icons/Icon.png", b"not a png".to_vec()),
        ] {
            let body = PushArchiveBuilder::new()
                .file("index.ios.js", b"app")
                .unwrap()
                .file(path, &content)
                .unwrap()
                .build()
                .unwrap();
            let err = f.ingestor.ingest(&f.app, &body).unwrap_err();
            assert!(matches!(err, ServerError::UnsupportedIcon { .. }), "{path}");
            assert_eq!(err.status(), 400);
            assert!(err.public_message().contains(path));
            assert!(!f.manifests.exists(&f.app).unwrap());
        }
    }

    #[test]
    fn empty_first_push_creates_app() {
        let f = fixture();
        let body = PushArchiveBuilder::new().build().unwrap();
        let report = f.ingestor.ingest(&f.app, &body).unwrap();
        assert!(report.diff.is_empty());
        assert!(f.manifests.exists(&f.app).unwrap());
    }
}
