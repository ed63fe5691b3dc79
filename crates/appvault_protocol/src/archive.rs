//! Push archives.
//!
//! A push body is a zip file holding `listing.json`, the complete path →
//! hash listing of the client's tree, and one `diffs/<path>` entry for each
//! file whose content the server does not already have.

use crate::error::{ProtocolError, ProtocolResult};
use crate::hash::ContentHash;
use crate::manifest::Manifest;
use crate::path::LogicalPath;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Name of the listing entry.
pub const LISTING_FILE: &str = "listing.json";

/// Directory holding uploaded content.
pub const DIFFS_DIR: &str = "diffs";

/// A decoded push archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushArchive {
    /// The full listing the client declared.
    pub listing: Manifest,
    /// Uploaded content keyed by logical path.
    pub uploads: BTreeMap<LogicalPath, Vec<u8>>,
}

impl PushArchive {
    /// Decodes a push archive.
    ///
    /// Every entry name is validated before any content is read, so an
    /// archive containing an escaping name is always reported as an
    /// [`ProtocolError::UnsafePath`], whatever else is wrong with it.
    /// Directory entries and entries outside `listing.json` and `diffs/`
    /// are ignored.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::UnsafePath`] for an escaping entry name or listing
    ///   path
    /// - [`ProtocolError::InvalidHash`] for a malformed listing hash
    /// - [`ProtocolError::MalformedArchive`] for unreadable zips, missing
    ///   listings and duplicate entries
    /// - [`ProtocolError::Json`] if the listing is not a JSON object
    ///
    /// Path checks run over every entry name and every listing key before
    /// any hash or duplicate check, so an escaping path is always reported
    /// as [`ProtocolError::UnsafePath`].
    pub fn from_zip(bytes: &[u8]) -> ProtocolResult<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;

        let mut names = Vec::with_capacity(zip.len());
        for index in 0..zip.len() {
            let entry = zip.by_index_raw(index)?;
            let name = entry.name().to_string();
            if entry.is_dir() {
                let trimmed = name.trim_end_matches('/');
                if !trimmed.is_empty() {
                    LogicalPath::parse(trimmed)?;
                }
                continue;
            }
            LogicalPath::parse(&name)?;
            names.push((index, name));
        }

        let diffs_prefix = format!("{DIFFS_DIR}/");
        let mut listings = Vec::new();
        let mut diffs = Vec::new();
        for (index, name) in names {
            if name == LISTING_FILE {
                listings.push(read_listing(&mut zip, index)?);
            } else if let Some(rest) = name.strip_prefix(&diffs_prefix) {
                diffs.push((index, LogicalPath::parse(rest)?, name.clone()));
            }
        }

        if listings.len() > 1 {
            return Err(ProtocolError::archive("duplicate listing"));
        }
        let listing = match listings.pop() {
            Some(raw) => Some(listing_manifest(raw)?),
            None => None,
        };

        let mut uploads = BTreeMap::new();
        for (index, path, name) in diffs {
            let content = read_entry(&mut zip, index)?;
            if uploads.insert(path, content).is_some() {
                return Err(ProtocolError::archive(format!("duplicate entry {name}")));
            }
        }

        let listing = listing.ok_or_else(|| ProtocolError::archive("missing listing"))?;
        Ok(Self { listing, uploads })
    }
}

/// Reads a listing and checks its paths. Hash values are left untouched so
/// that every listing in the archive is path-checked before anything else
/// can fail.
fn read_listing(
    zip: &mut ZipArchive<Cursor<&[u8]>>,
    index: usize,
) -> ProtocolResult<BTreeMap<String, serde_json::Value>> {
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_slice(&read_entry(zip, index)?)?;
    for path in raw.keys() {
        LogicalPath::parse(path)?;
    }
    Ok(raw)
}

fn listing_manifest(raw: BTreeMap<String, serde_json::Value>) -> ProtocolResult<Manifest> {
    let raw = raw
        .into_iter()
        .map(|(path, hash)| match hash {
            serde_json::Value::String(hash) => Ok((path, hash)),
            other => Err(ProtocolError::archive(format!(
                "listing entry {path} maps to {other}, not a hash string"
            ))),
        })
        .collect::<ProtocolResult<BTreeMap<_, _>>>()?;
    Manifest::from_raw(raw)
}

fn read_entry(zip: &mut ZipArchive<Cursor<&[u8]>>, index: usize) -> ProtocolResult<Vec<u8>> {
    let mut entry = zip.by_index(index)?;
    let mut buf = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
    entry.read_to_end(&mut buf).map_err(ProtocolError::archive)?;
    Ok(buf)
}

/// Options shared by every entry written by this crate: deflate, and a fixed
/// timestamp so that equal inputs give byte-identical archives.
pub(crate) fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
}

/// Builds push archives. Used by clients and tests.
///
/// # Example
///
/// ```rust
/// use appvault_protocol::{PushArchive, PushArchiveBuilder};
///
/// let bytes = PushArchiveBuilder::new()
///     .file("index.js", b"console.log(1)")
///     .unwrap()
///     .build()
///     .unwrap();
/// let archive = PushArchive::from_zip(&bytes).unwrap();
/// assert_eq!(archive.listing.len(), 1);
/// assert_eq!(archive.uploads.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct PushArchiveBuilder {
    listing: Manifest,
    uploads: BTreeMap<LogicalPath, Vec<u8>>,
    raw: Vec<(String, Vec<u8>)>,
    raw_listing: Option<Vec<u8>>,
}

impl PushArchiveBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lists a file and uploads its content.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not a valid logical path.
    pub fn file(mut self, path: &str, content: &[u8]) -> ProtocolResult<Self> {
        let path = LogicalPath::parse(path)?;
        self.listing.insert(path.clone(), ContentHash::of(content));
        self.uploads.insert(path, content.to_vec());
        Ok(self)
    }

    /// Lists a file the server already has, without uploading it.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not a valid logical path.
    pub fn listed(mut self, path: &str, hash: ContentHash) -> ProtocolResult<Self> {
        self.listing.insert(LogicalPath::parse(path)?, hash);
        Ok(self)
    }

    /// Uses `listing` as the declared listing, keeping uploads as they are.
    pub fn with_listing(mut self, listing: Manifest) -> Self {
        self.listing = listing;
        self
    }

    /// Replaces `listing.json` with arbitrary bytes.
    pub fn raw_listing(mut self, bytes: &[u8]) -> Self {
        self.raw_listing = Some(bytes.to_vec());
        self
    }

    /// Adds an entry verbatim, without validating its name.
    ///
    /// Lets tests produce archives a well-behaved client never would.
    pub fn raw_entry(mut self, name: &str, content: &[u8]) -> Self {
        self.raw.push((name.to_string(), content.to_vec()));
        self
    }

    /// Writes the archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the zip writer fails.
    pub fn build(self) -> ProtocolResult<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = entry_options();

        let listing = match self.raw_listing {
            Some(bytes) => bytes,
            None => serde_json::to_vec(&self.listing)?,
        };
        zip.start_file(LISTING_FILE, options)?;
        zip.write_all(&listing).map_err(ProtocolError::archive)?;

        for (path, content) in &self.uploads {
            zip.start_file(format!("{DIFFS_DIR}/{path}"), options)?;
            zip.write_all(content).map_err(ProtocolError::archive)?;
        }
        for (name, content) in &self.raw {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(content).map_err(ProtocolError::archive)?;
        }

        Ok(zip.finish()?.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_listing_and_uploads() {
        let bytes = PushArchiveBuilder::new()
            .file("index.ios.js", b"ios")
            .unwrap()
            .file("img/logo.png", b"png")
            .unwrap()
            .listed("cached.js", ContentHash::of(b"cached"))
            .unwrap()
            .build()
            .unwrap();

        let archive = PushArchive::from_zip(&bytes).unwrap();
        assert_eq!(archive.listing.len(), 3);
        assert_eq!(archive.uploads.len(), 2);
        let logo = LogicalPath::parse("img/logo.png").unwrap();
        assert_eq!(archive.uploads[&logo], b"png");
    }

    #[test]
    fn empty_listing_is_valid() {
        let bytes = PushArchiveBuilder::new().build().unwrap();
        let archive = PushArchive::from_zip(&bytes).unwrap();
        assert!(archive.listing.is_empty());
        assert!(archive.uploads.is_empty());
    }

    #[test]
    fn escaping_entry_name_is_a_path_violation() {
        let bytes = PushArchiveBuilder::new()
            .file("ok.js", b"ok")
            .unwrap()
            .raw_entry("diffs/../bad-file", b"evil")
            .build()
            .unwrap();
        assert!(PushArchive::from_zip(&bytes).unwrap_err().is_path_violation());
    }

    #[test]
    fn escaping_listing_path_is_a_path_violation() {
        let hash = ContentHash::of(b"evil");
        let listing = format!(r#"{{"../bad-file":"{hash}"}}"#);
        let bytes = PushArchiveBuilder::new()
            .raw_listing(listing.as_bytes())
            .build()
            .unwrap();
        assert!(PushArchive::from_zip(&bytes).unwrap_err().is_path_violation());
    }

    #[test]
    fn path_violation_wins_over_bad_listing() {
        let bytes = PushArchiveBuilder::new()
            .raw_listing(b"not json")
            .raw_entry("/etc/passwd", b"x")
            .build()
            .unwrap();
        assert!(PushArchive::from_zip(&bytes).unwrap_err().is_path_violation());
    }

    #[test]
    fn missing_listing() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("diffs/a.js", entry_options()).unwrap();
        zip.write_all(b"a").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        assert!(matches!(
            PushArchive::from_zip(&bytes),
            Err(ProtocolError::MalformedArchive(_))
        ));
    }

    #[test]
    fn not_a_zip() {
        assert!(matches!(
            PushArchive::from_zip(b"definitely not a zip"),
            Err(ProtocolError::MalformedArchive(_))
        ));
    }

    #[test]
    fn bad_listing_hash() {
        let bytes = PushArchiveBuilder::new()
            .raw_listing(br#"{"a.js":"1234"}"#)
            .build()
            .unwrap();
        assert!(matches!(
            PushArchive::from_zip(&bytes),
            Err(ProtocolError::InvalidHash(_))
        ));
    }

    #[test]
    fn escaping_listing_path_wins_over_bad_hashes() {
        let hash = ContentHash::of(b"x");
        for listing in [
            format!(r#"{{"!a":"nothex","../x":"{hash}","z.js":"1234"}}"#),
            format!(r#"{{"a.js":"nothex","../x":"{hash}"}}"#),
            r#"{"a.js":7,"../x":"nothex"}"#.to_string(),
            r#"{"../x":null}"#.to_string(),
        ] {
            let bytes = PushArchiveBuilder::new()
                .raw_listing(listing.as_bytes())
                .build()
                .unwrap();
            let err = PushArchive::from_zip(&bytes).unwrap_err();
            assert!(err.is_path_violation(), "{listing}: {err}");
        }
    }

    #[test]
    fn non_string_listing_hash_is_malformed() {
        let bytes = PushArchiveBuilder::new()
            .raw_listing(br#"{"a.js":7}"#)
            .build()
            .unwrap();
        assert!(matches!(
            PushArchive::from_zip(&bytes),
            Err(ProtocolError::MalformedArchive(_))
        ));
    }

    #[test]
    fn unrelated_entries_are_ignored() {
        let bytes = PushArchiveBuilder::new()
            .file("a.js", b"a")
            .unwrap()
            .raw_entry("README.txt", b"ignored")
            .build()
            .unwrap();
        let archive = PushArchive::from_zip(&bytes).unwrap();
        assert_eq!(archive.uploads.len(), 1);
    }

    #[test]
    fn builder_is_deterministic() {
        let build = || {
            PushArchiveBuilder::new()
                .file("b", b"2")
                .unwrap()
                .file("a", b"1")
                .unwrap()
                .build()
                .unwrap()
        };
        assert_eq!(build(), build());
    }
}
