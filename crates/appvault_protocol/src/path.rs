//! Validated names: logical file paths and identifiers.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a logical path, in bytes.
const MAX_PATH_LEN: usize = 1024;

/// Maximum length of an application or submission identifier.
const MAX_ID_LEN: usize = 64;

/// A relative, `/`-separated path inside an application's namespace.
///
/// Parsing rejects anything that could resolve outside the namespace:
/// leading `/`, `..` or `.` segments, empty segments, backslashes, and
/// control characters that would break line-oriented listings. Names that
/// merely start with a dot (`.babelrc`) are ordinary files.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogicalPath(String);

impl LogicalPath {
    /// Parses and validates a path.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnsafePath`] naming the first rule broken.
    pub fn parse(s: &str) -> ProtocolResult<Self> {
        let reject = |reason: &'static str| -> ProtocolResult<Self> {
            Err(ProtocolError::UnsafePath {
                path: s.to_string(),
                reason,
            })
        };

        if s.is_empty() {
            return reject("empty path");
        }
        if s.len() > MAX_PATH_LEN {
            return reject("path too long");
        }
        if s.starts_with('/') {
            return reject("absolute path");
        }
        if s.contains('\\') {
            return reject("backslash separator");
        }
        if s.chars().any(char::is_control) {
            return reject("control character");
        }
        for segment in s.split('/') {
            match segment {
                "" => return reject("empty segment"),
                "." => return reject("current directory segment"),
                ".." => return reject("parent directory segment"),
                _ => {}
            }
        }

        Ok(Self(s.to_string()))
    }

    /// Returns the path as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the extension of the final segment, without the dot.
    ///
    /// A leading dot does not start an extension: `.hidden` has none.
    pub fn extension(&self) -> Option<&str> {
        let name = self.0.rsplit('/').next().unwrap_or(&self.0);
        match name.rfind('.') {
            Some(0) | None => None,
            Some(i) => Some(&name[i + 1..]),
        }
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LogicalPath {
    type Error = ProtocolError;

    fn try_from(value: String) -> ProtocolResult<Self> {
        Self::parse(&value)
    }
}

impl From<LogicalPath> for String {
    fn from(path: LogicalPath) -> Self {
        path.0
    }
}

/// Validates an identifier: 1-64 ASCII letters, digits, `.`, `_`, `-`,
/// starting with a letter or digit.
fn validate_identifier(s: &str) -> ProtocolResult<()> {
    let mut chars = s.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if first_ok && rest_ok && s.len() <= MAX_ID_LEN {
        Ok(())
    } else {
        Err(ProtocolError::InvalidIdentifier(s.to_string()))
    }
}

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parses and validates an identifier.
            ///
            /// # Errors
            ///
            /// Returns [`ProtocolError::InvalidIdentifier`] if malformed.
            pub fn parse(s: &str) -> ProtocolResult<Self> {
                validate_identifier(s)?;
                Ok(Self(s.to_string()))
            }

            /// Returns the identifier as a string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ProtocolError;

            fn try_from(value: String) -> ProtocolResult<Self> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

identifier!(
    /// Identifies an application. Safe to embed in a storage key.
    AppId
);

identifier!(
    /// Identifies a submission, unique across all applications.
    SubmissionId
);
