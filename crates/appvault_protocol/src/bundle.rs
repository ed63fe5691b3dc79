//! Pull bundles.
//!
//! A pull response is a zip file with, in this order: the asset files the
//! client lacks under `__assets/images/<path>`, an `assets-listing` naming
//! every asset in the source, and the `bundle-footer`.

use crate::archive::entry_options;
use crate::error::{ProtocolError, ProtocolResult};
use crate::footer::BundleFooter;
use crate::path::LogicalPath;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use zip::{ZipArchive, ZipWriter};

/// Directory holding asset content.
pub const ASSETS_DIR: &str = "__assets";

/// Prefix of asset keys, both in the listing and in client hash maps.
pub const ASSET_KEY_PREFIX: &str = "images";

/// Name of the asset listing entry.
pub const ASSETS_LISTING_FILE: &str = "assets-listing";

/// Name of the footer entry.
pub const BUNDLE_FOOTER_FILE: &str = "bundle-footer";

/// Returns the key under which clients name the asset at `path`.
pub fn asset_key(path: &LogicalPath) -> String {
    format!("{ASSET_KEY_PREFIX}/{path}")
}

/// Builds a pull bundle.
#[derive(Debug, Default)]
pub struct PullBundleBuilder {
    assets: BTreeMap<LogicalPath, Vec<u8>>,
    listing: Vec<String>,
}

impl PullBundleBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names an asset in the listing without shipping its content.
    pub fn list_asset(&mut self, path: &LogicalPath) -> &mut Self {
        self.listing.push(asset_key(path));
        self
    }

    /// Ships an asset's content. The asset must also be listed.
    pub fn include_asset(&mut self, path: LogicalPath, content: Vec<u8>) -> &mut Self {
        self.assets.insert(path, content);
        self
    }

    /// Writes the bundle.
    ///
    /// # Errors
    ///
    /// Returns an error if the zip writer fails.
    pub fn finish(mut self, footer: &BundleFooter) -> ProtocolResult<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = entry_options();

        for (path, content) in &self.assets {
            zip.start_file(format!("{ASSETS_DIR}/{}", asset_key(path)), options)?;
            zip.write_all(content).map_err(ProtocolError::archive)?;
        }

        self.listing.sort();
        self.listing.dedup();
        let mut listing = String::new();
        for key in &self.listing {
            listing.push_str(key);
            listing.push('\n');
        }
        zip.start_file(ASSETS_LISTING_FILE, options)?;
        zip.write_all(listing.as_bytes())
            .map_err(ProtocolError::archive)?;

        zip.start_file(BUNDLE_FOOTER_FILE, options)?;
        zip.write_all(&footer.encode())
            .map_err(ProtocolError::archive)?;

        Ok(zip.finish()?.into_inner())
    }
}

/// A decoded pull bundle, as a client sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullBundle {
    /// Entry names in archive order.
    pub entry_names: Vec<String>,
    /// Shipped asset content keyed by asset key (`images/<path>`).
    pub assets: BTreeMap<String, Vec<u8>>,
    /// Every asset key in the source.
    pub assets_listing: Vec<String>,
    /// The decoded footer.
    pub footer: BundleFooter,
}

impl PullBundle {
    /// Decodes a bundle and verifies its footer.
    ///
    /// # Errors
    ///
    /// Returns an error if the zip is unreadable, the listing or footer is
    /// missing, or the footer fails verification.
    pub fn from_zip(bytes: &[u8]) -> ProtocolResult<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        let assets_prefix = format!("{ASSETS_DIR}/");

        let mut entry_names = Vec::with_capacity(zip.len());
        let mut assets = BTreeMap::new();
        let mut listing = None;
        let mut footer = None;

        for index in 0..zip.len() {
            let mut entry = zip.by_index(index)?;
            let name = entry.name().to_string();
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .map_err(ProtocolError::archive)?;

            if name == ASSETS_LISTING_FILE {
                let text = String::from_utf8(content).map_err(ProtocolError::archive)?;
                listing = Some(text.lines().map(str::to_string).collect());
            } else if name == BUNDLE_FOOTER_FILE {
                footer = Some(BundleFooter::decode(&content)?);
            } else if let Some(key) = name.strip_prefix(&assets_prefix) {
                assets.insert(key.to_string(), content);
            }
            entry_names.push(name);
        }

        Ok(Self {
            entry_names,
            assets,
            assets_listing: listing.ok_or_else(|| ProtocolError::archive("missing assets listing"))?,
            footer: footer.ok_or_else(|| ProtocolError::archive("missing bundle footer"))?,
        })
    }
}
