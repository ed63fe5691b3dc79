//! The `bundle-footer` entry of a pull bundle.
//!
//! The footer carries an application's non-asset files. Its layout is
//! line-oriented so that a client can verify and apply it while streaming:
//!
//! ```text
//! appvault-bundle-footer 1
//! base-version <version or ->
//! file <hash> <len> <path>
//! <len raw bytes>
//! ref <hash> <path>
//! end <sha256 of every preceding byte>
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use crate::hash::ContentHash;
use crate::path::LogicalPath;

/// First line of every footer.
pub const FOOTER_MAGIC: &str = "appvault-bundle-footer 1";

const NO_VERSION: &str = "-";

/// One non-asset file in a footer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FooterEntry {
    /// Full file content.
    File {
        /// Logical path of the file.
        path: LogicalPath,
        /// Hash of `content`.
        hash: ContentHash,
        /// Raw bytes.
        content: Vec<u8>,
    },
    /// A file the client already holds with this hash.
    Reference {
        /// Logical path of the file.
        path: LogicalPath,
        /// Hash the client's copy must have.
        hash: ContentHash,
    },
}

impl FooterEntry {
    /// Returns the entry's path.
    pub fn path(&self) -> &LogicalPath {
        match self {
            FooterEntry::File { path, .. } | FooterEntry::Reference { path, .. } => path,
        }
    }

    /// Returns the entry's hash.
    pub fn hash(&self) -> &ContentHash {
        match self {
            FooterEntry::File { hash, .. } | FooterEntry::Reference { hash, .. } => hash,
        }
    }
}

/// Decoded footer contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleFooter {
    /// The base version declared by the application's metadata, if any.
    pub base_version: Option<String>,
    /// Files in path order.
    pub entries: Vec<FooterEntry>,
}

impl BundleFooter {
    /// Encodes the footer, appending the integrity line.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(FOOTER_MAGIC.as_bytes());
        out.push(b'\n');
        let version = self.base_version.as_deref().unwrap_or(NO_VERSION);
        out.extend_from_slice(format!("base-version {version}\n").as_bytes());

        for entry in &self.entries {
            match entry {
                FooterEntry::File {
                    path,
                    hash,
                    content,
                } => {
                    out.extend_from_slice(
                        format!("file {hash} {} {path}\n", content.len()).as_bytes(),
                    );
                    out.extend_from_slice(content);
                    out.push(b'\n');
                }
                FooterEntry::Reference { path, hash } => {
                    out.extend_from_slice(format!("ref {hash} {path}\n").as_bytes());
                }
            }
        }

        let digest = ContentHash::of(&out);
        out.extend_from_slice(format!("end {digest}\n").as_bytes());
        out
    }

    /// Decodes a footer and checks its integrity line.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedFooter`] on any layout error, a
    /// content hash that does not match its bytes, or a digest mismatch.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let mut reader = Reader { bytes, pos: 0 };

        if reader.line()? != FOOTER_MAGIC {
            return Err(malformed("bad magic"));
        }
        let base_version = match reader.line()?.strip_prefix("base-version ") {
            Some(NO_VERSION) => None,
            Some(v) => Some(v.to_string()),
            None => return Err(malformed("missing base-version")),
        };

        let mut entries = Vec::new();
        loop {
            let line_start = reader.pos;
            let line = reader.line()?;
            let mut fields = line.splitn(2, ' ');
            let kind = fields.next().unwrap_or_default();
            let rest = fields.next().unwrap_or_default();

            match kind {
                "file" => {
                    let mut parts = rest.splitn(3, ' ');
                    let (Some(hash), Some(len), Some(path)) =
                        (parts.next(), parts.next(), parts.next())
                    else {
                        return Err(malformed("short file line"));
                    };
                    let hash = ContentHash::parse(hash)?;
                    let path = LogicalPath::parse(path)?;
                    let len: usize = len.parse().map_err(|_| malformed("bad length"))?;
                    let content = reader.take(len)?.to_vec();
                    if reader.take(1)? != b"\n" {
                        return Err(malformed("missing content terminator"));
                    }
                    if !hash.matches(&content) {
                        return Err(malformed(format!("content of {path} does not match hash")));
                    }
                    entries.push(FooterEntry::File {
                        path,
                        hash,
                        content,
                    });
                }
                "ref" => {
                    let (hash, path) = rest
                        .split_once(' ')
                        .ok_or_else(|| malformed("short ref line"))?;
                    entries.push(FooterEntry::Reference {
                        path: LogicalPath::parse(path)?,
                        hash: ContentHash::parse(hash)?,
                    });
                }
                "end" => {
                    let expected = ContentHash::parse(rest)?;
                    if !expected.matches(&bytes[..line_start]) {
                        return Err(malformed("digest mismatch"));
                    }
                    if reader.pos != bytes.len() {
                        return Err(malformed("trailing bytes after end"));
                    }
                    return Ok(Self {
                        base_version,
                        entries,
                    });
                }
                other => return Err(malformed(format!("unknown line kind {other:?}"))),
            }
        }
    }
}

fn malformed(msg: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedFooter(msg.into())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> ProtocolResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| malformed("unexpected end of footer"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Reads one `\n`-terminated UTF-8 line, without the terminator.
    fn line(&mut self) -> ProtocolResult<&'a str> {
        let rest = &self.bytes[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| malformed("unterminated line"))?;
        let line = std::str::from_utf8(&rest[..len]).map_err(|_| malformed("invalid UTF-8"))?;
        self.pos += len + 1;
        Ok(line)
    }
}
