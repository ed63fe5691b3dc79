//! The optional `Appfile` carrying application metadata.

use crate::error::{ServerError, ServerResult};
use serde::Deserialize;

/// Name of the metadata file at the root of an application.
pub const METADATA_FILE: &str = "Appfile";

const MAX_DISPLAY_NAME: usize = 32;
const MAX_FACEBOOK_APP_ID: usize = 32;
const MAX_IOS_STORE_NAME: usize = 255;
const MAX_ANDROID_STORE_NAME: usize = 30;
const MAX_LANGUAGE: usize = 7;

/// Store listing details for one platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PlatformMetadata {
    /// Language code of the store listing, such as `"en-GB"`.
    #[serde(default)]
    pub language: Option<String>,
    /// Name of the application in the store.
    #[serde(default)]
    pub store_name: Option<String>,
}

/// Parsed application metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppMetadata {
    /// The runtime version the application targets, such as `"0.45"`.
    #[serde(default)]
    pub base_version: String,
    /// Name shown to users.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Facebook application ID, as shown in the Facebook developer dashboard.
    #[serde(default)]
    pub facebook_app_id: Option<String>,
    /// iOS store details.
    #[serde(default)]
    pub ios: PlatformMetadata,
    /// Android store details.
    #[serde(default)]
    pub android: PlatformMetadata,
}

impl AppMetadata {
    /// Parses and validates an `Appfile`. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Metadata`] with a message meant for the user.
    pub fn parse(bytes: &[u8]) -> ServerResult<Self> {
        let metadata: AppMetadata = serde_json::from_slice(bytes).map_err(|_| {
            ServerError::Metadata(format!(
                "The format of your {METADATA_FILE} is invalid. It must be a JSON object."
            ))
        })?;

        if metadata.base_version.is_empty() {
            return Err(ServerError::Metadata(format!(
                r#"The "base_version" key in your {METADATA_FILE} is missing. Use a string like "0.1"."#
            )));
        }
        if !is_version_number(&metadata.base_version) {
            return Err(ServerError::Metadata(format!(
                r#"The "base_version" key in your {METADATA_FILE} must be a string like "0.1"."#
            )));
        }
        check_length(
            metadata.display_name.as_deref(),
            MAX_DISPLAY_NAME,
            r#"The "display_name" key"#,
        )?;
        if metadata
            .facebook_app_id
            .as_ref()
            .is_some_and(|id| id.chars().count() > MAX_FACEBOOK_APP_ID)
        {
            return Err(ServerError::Metadata(format!(
                r#"The "facebook_app_id" key in your {METADATA_FILE} is too long. You can find the app ID in your app's dashboard at https://developers.facebook.com"#
            )));
        }
        check_length(
            metadata.ios.store_name.as_deref(),
            MAX_IOS_STORE_NAME,
            r#"The iOS "store_name" key"#,
        )?;
        check_length(
            metadata.ios.language.as_deref(),
            MAX_LANGUAGE,
            r#"The iOS "language" key"#,
        )?;
        check_length(
            metadata.android.store_name.as_deref(),
            MAX_ANDROID_STORE_NAME,
            r#"The Android "store_name" key"#,
        )?;
        check_length(
            metadata.android.language.as_deref(),
            MAX_LANGUAGE,
            r#"The Android "language" key"#,
        )?;
        Ok(metadata)
    }
}

fn check_length(value: Option<&str>, max: usize, key: &str) -> ServerResult<()> {
    match value {
        Some(value) if value.chars().count() > max => Err(ServerError::Metadata(format!(
            "{key} in your {METADATA_FILE} is too long. The maximum is {max} characters."
        ))),
        _ => Ok(()),
    }
}

/// Digits with at most one dot, and at least one digit: `1`, `0.45`, `.5`.
fn is_version_number(s: &str) -> bool {
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    digits(whole) && digits(frac) && !(whole.is_empty() && frac.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(bytes: &[u8]) -> String {
        match AppMetadata::parse(bytes) {
            Err(ServerError::Metadata(msg)) => msg,
            other => panic!("expected metadata error, got {other:?}"),
        }
    }

    #[test]
    fn parses_valid_metadata() {
        let metadata =
            AppMetadata::parse(br#"{"base_version": "0.45", "display_name": "Cards", "x": 1}"#)
                .unwrap();
        assert_eq!(metadata.base_version, "0.45");
        assert_eq!(metadata.display_name.as_deref(), Some("Cards"));

        let bare = AppMetadata::parse(br#"{"base_version": "2"}"#).unwrap();
        assert_eq!(bare.display_name, None);
    }

    #[test]
    fn rejects_bad_versions() {
        assert!(message(br#"{}"#).contains("missing"));
        for bad in [r#""0.1.2""#, r#""v1""#, r#""""#, r#"".""#] {
            let body = format!(r#"{{"base_version": {bad}}}"#);
            assert!(AppMetadata::parse(body.as_bytes()).is_err(), "{bad}");
        }
        assert!(AppMetadata::parse(br#"{"base_version": 1}"#).is_err());
    }

    #[test]
    fn rejects_long_display_name() {
        let body = format!(
            r#"{{"base_version": "1", "display_name": "{}"}}"#,
            "x".repeat(33)
        );
        assert!(message(body.as_bytes()).contains("display_name"));
    }

    #[test]
    fn parses_platform_metadata() {
        let metadata = AppMetadata::parse(
            br#"{
                "base_version": "0.45",
                "facebook_app_id": "1234567890",
                "ios": {"store_name": "Cards for iPhone", "language": "en-GB"},
                "android": {"store_name": "Cards"}
            }"#,
        )
        .unwrap();
        assert_eq!(metadata.facebook_app_id.as_deref(), Some("1234567890"));
        assert_eq!(metadata.ios.language.as_deref(), Some("en-GB"));
        assert_eq!(metadata.android.store_name.as_deref(), Some("Cards"));
        assert_eq!(metadata.android.language, None);
    }

    #[test]
    fn enforces_platform_limits() {
        let cases = [
            (r#""facebook_app_id": "XX""#, 33, "facebook_app_id"),
            (r#""ios": {"store_name": "XX"}"#, 256, r#"iOS "store_name""#),
            (r#""ios": {"language": "XX"}"#, 8, r#"iOS "language""#),
            (r#""android": {"store_name": "XX"}"#, 31, r#"Android "store_name""#),
            (r#""android": {"language": "XX"}"#, 8, r#"Android "language""#),
        ];
        for (field, too_long, key) in cases {
            let at_limit = format!(
                r#"{{"base_version": "1", {}}}"#,
                field.replace("XX", &"x".repeat(too_long - 1))
            );
            assert!(AppMetadata::parse(at_limit.as_bytes()).is_ok(), "{key}");

            let over = format!(
                r#"{{"base_version": "1", {}}}"#,
                field.replace("XX", &"x".repeat(too_long))
            );
            assert!(message(over.as_bytes()).contains(key), "{key}");
        }
    }

    #[test]
    fn rejects_non_json() {
        assert!(message(b"base_version = 1").contains("format"));
    }

    #[test]
    fn version_numbers() {
        for ok in ["1", "0.45", ".5", "10."] {
            assert!(is_version_number(ok), "{ok}");
        }
        for bad in ["", ".", "1.2.3", "1e5", "-1", " 1"] {
            assert!(!is_version_number(bad), "{bad}");
        }
    }
}
