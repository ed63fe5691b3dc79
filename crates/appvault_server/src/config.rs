//! Server configuration.

use crate::auth::AuthConfig;
use crate::error::{ServerError, ServerResult};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the handshake secret.
pub const ENV_SECRET: &str = "APPVAULT_SECRET";
/// Environment variable holding the token lifetime in seconds.
pub const ENV_TOKEN_TTL: &str = "APPVAULT_TOKEN_TTL_SECS";
/// Environment variable holding the storage directory.
pub const ENV_DATA_DIR: &str = "APPVAULT_DATA_DIR";

/// File extensions treated as assets by default.
pub const DEFAULT_ASSET_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "psd", "svg", "webp"];

/// How non-asset files are delivered in a pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourcePolicy {
    /// Every source file is sent in full.
    #[default]
    Full,
    /// Source files the client reports with a matching hash are sent as
    /// references.
    Incremental,
}

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Handshake settings.
    pub auth: AuthConfig,
    /// Extensions that mark a file as an asset, compared exactly.
    pub asset_extensions: BTreeSet<String>,
    /// Delivery policy for non-asset files.
    pub source_policy: SourcePolicy,
    /// Directory for persistent storage; in-memory when unset.
    pub data_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Creates a configuration with the given handshake secret.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            auth: AuthConfig::new(secret),
            asset_extensions: DEFAULT_ASSET_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            source_policy: SourcePolicy::default(),
            data_dir: None,
        }
    }

    /// Reads the configuration from `APPVAULT_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is missing or empty, or the token
    /// lifetime is not a number.
    pub fn from_env() -> ServerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ServerResult<Self> {
        let secret = lookup(ENV_SECRET)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ServerError::Internal(format!("{ENV_SECRET} is not set")))?;
        let mut config = Self::new(secret.into_bytes());

        if let Some(ttl) = lookup(ENV_TOKEN_TTL) {
            let secs: u64 = ttl.trim().parse().map_err(|_| {
                ServerError::Internal(format!("{ENV_TOKEN_TTL} is not a number: {ttl:?}"))
            })?;
            config = config.with_token_lifetime(Duration::from_secs(secs));
        }
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|d| !d.is_empty()) {
            config = config.with_data_dir(dir);
        }
        Ok(config)
    }

    /// Sets the token lifetime.
    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.auth = self.auth.with_token_lifetime(lifetime);
        self
    }

    /// Sets the tolerated clock skew.
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.auth = self.auth.with_clock_skew(skew);
        self
    }

    /// Replaces the asset extension set.
    pub fn with_asset_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.asset_extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().to_string())
            .collect();
        self
    }

    /// Sets the source delivery policy.
    pub fn with_source_policy(mut self, policy: SourcePolicy) -> Self {
        self.source_policy = policy;
        self
    }

    /// Sets the storage directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Returns true if `extension` marks an asset. Case matters: `PNG`
    /// is not `png`.
    pub fn is_asset_extension(&self, extension: &str) -> bool {
        self.asset_extensions.contains(extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_assets() {
        let config = ServerConfig::new(b"s".to_vec());
        assert!(config.is_asset_extension("png"));
        assert!(config.is_asset_extension("jpeg"));
        assert!(!config.is_asset_extension("JPEG"));
        assert!(!config.is_asset_extension("Png"));
        assert!(!config.is_asset_extension("js"));
        assert_eq!(config.source_policy, SourcePolicy::Full);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new(b"s".to_vec())
            .with_token_lifetime(Duration::from_secs(60))
            .with_asset_extensions(["PNG", "ttf"])
            .with_source_policy(SourcePolicy::Incremental)
            .with_data_dir("/tmp/appvault");

        assert_eq!(config.auth.token_lifetime, Duration::from_secs(60));
        assert!(config.is_asset_extension("ttf"));
        assert!(config.is_asset_extension("PNG"));
        assert!(!config.is_asset_extension("png"));
        assert!(!config.is_asset_extension("jpg"));
        assert_eq!(config.source_policy, SourcePolicy::Incremental);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/appvault")));
    }

    #[test]
    fn from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_SECRET, "hunter2"),
            (ENV_TOKEN_TTL, "120"),
            (ENV_DATA_DIR, "/var/lib/appvault"),
        ]
        .into();
        let config = ServerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.auth.secret, b"hunter2");
        assert_eq!(config.auth.token_lifetime, Duration::from_secs(120));
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/appvault")));
    }

    #[test]
    fn from_lookup_requires_secret() {
        assert!(ServerConfig::from_lookup(|_| None).is_err());

        let bad_ttl = |k: &str| match k {
            ENV_SECRET => Some("s".to_string()),
            ENV_TOKEN_TTL => Some("soon".to_string()),
            _ => None,
        };
        assert!(ServerConfig::from_lookup(bad_ttl).is_err());
    }
}
