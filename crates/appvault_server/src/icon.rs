//! Application icons under `publish/<platform>/icons/`.

use crate::error::{ServerError, ServerResult};
use appvault_protocol::LogicalPath;
use std::fmt;
use std::io::Cursor;

/// A platform with its own icon directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Platform {
    /// `publish/android/icons/`
    Android,
    /// `publish/ios/icons/`
    Ios,
}

impl Platform {
    /// Every platform, in directory order.
    pub const ALL: [Platform; 2] = [Platform::Android, Platform::Ios];

    /// Returns the directory name, `android` or `ios`.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }

    fn icons_prefix(self) -> String {
        format!("publish/{}/icons/", self.as_str())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded icon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIcon {
    /// Path below the icon directory, without the `.png` extension.
    pub name: String,
    /// The platform directory the icon was found in.
    pub platform: Platform,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl AppIcon {
    /// Returns the platform whose icon directory holds `path`.
    pub fn platform_of(path: &LogicalPath) -> Option<Platform> {
        Platform::ALL
            .into_iter()
            .find(|platform| path.as_str().starts_with(&platform.icons_prefix()))
    }

    /// Checks an icon file and reads its dimensions.
    ///
    /// The file must carry a lowercase `.png` extension and start with a
    /// decodable PNG header.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnsupportedIcon`] otherwise.
    pub fn load(platform: Platform, path: &LogicalPath, content: &[u8]) -> ServerResult<Self> {
        let unsupported = || ServerError::UnsupportedIcon {
            path: path.to_string(),
        };
        let relative = path
            .as_str()
            .strip_prefix(&platform.icons_prefix())
            .ok_or_else(unsupported)?;
        let name = relative.strip_suffix(".png").ok_or_else(unsupported)?;

        let reader = png::Decoder::new(Cursor::new(content))
            .read_info()
            .map_err(|_| unsupported())?;
        let info = reader.info();
        Ok(Self {
            name: name.to_string(),
            platform,
            width: info.width,
            height: info.height,
        })
    }
}
