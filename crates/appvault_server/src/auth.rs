//! Handshake signing and validation.
//!
//! Every request carries a `handshake_token` (base64 JSON, see
//! [`HandshakeToken`]) and a `handshake_signature`: the lowercase hex
//! HMAC-SHA256 of the encoded token string under a per-environment secret.
//!
//! Two token flavours exist. Development tokens carry a `user_id` and may
//! push and pull the live manifest. Production tokens carry a
//! `submission_id` and may pull that submission or create it.

use crate::error::{AuthFailure, ServerError, ServerResult};
use appvault_protocol::{Action, AppId, HandshakeToken, TokenScope};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// How long a token stays valid after `issued_at`.
    pub token_lifetime: Duration,
    /// How far in the future `issued_at` may be.
    pub clock_skew: Duration,
}

impl AuthConfig {
    /// Creates a new auth configuration.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_lifetime: Duration::from_secs(24 * 60 * 60), // 24 hours
            clock_skew: Duration::from_secs(5 * 60),
        }
    }

    /// Sets the token lifetime.
    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    /// Sets the tolerated clock skew.
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }
}

/// A validated handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// The application the request may act on.
    pub app_id: AppId,
    /// The authorized action.
    pub action: Action,
    /// Who the token was issued to.
    pub scope: TokenScope,
}

/// An encoded token with its signature, ready for a query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHandshake {
    /// Base64 JSON token.
    pub token: String,
    /// Hex HMAC of `token`.
    pub signature: String,
}

impl SignedHandshake {
    /// Renders the `handshake_token` and `handshake_signature` query
    /// parameters, form-urlencoded.
    pub fn query(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("handshake_token", &self.token)
            .append_pair("handshake_signature", &self.signature)
            .finish()
    }
}

/// Returns the current time in seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn mac(secret: &[u8]) -> ServerResult<HmacSha256> {
    HmacSha256::new_from_slice(secret).map_err(|e| ServerError::Internal(e.to_string()))
}

/// Mints signed handshakes. Used by the admin CLI and tests.
#[derive(Clone)]
pub struct HandshakeSigner {
    secret: Vec<u8>,
}

impl HandshakeSigner {
    /// Creates a signer for `secret`.
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Encodes and signs `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be encoded.
    pub fn sign(&self, token: &HandshakeToken) -> ServerResult<SignedHandshake> {
        let encoded = token.encode()?;
        let signature = self.signature_for(&encoded)?;
        Ok(SignedHandshake {
            token: encoded,
            signature,
        })
    }

    /// Computes the hex signature of an encoded token.
    ///
    /// # Errors
    ///
    /// Returns an error if the MAC cannot be keyed.
    pub fn signature_for(&self, encoded: &str) -> ServerResult<String> {
        let mut mac = mac(&self.secret)?;
        mac.update(encoded.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// Validates handshakes against an [`AuthConfig`].
///
/// Validation is pure: it reads the clock but touches no storage.
#[derive(Clone)]
pub struct HandshakeValidator {
    config: AuthConfig,
}

impl HandshakeValidator {
    /// Creates a new validator.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Validates a handshake for `expected_action` on `app_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Unauthorized`] with the first check that
    /// failed.
    pub fn validate(
        &self,
        token: &str,
        signature: &str,
        expected_action: Action,
        app_id: &AppId,
    ) -> ServerResult<AuthContext> {
        self.validate_at(token, signature, expected_action, app_id, unix_now())
    }

    /// Like [`validate`](Self::validate), with an explicit current time.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Unauthorized`] with the first check that
    /// failed.
    pub fn validate_at(
        &self,
        token: &str,
        signature: &str,
        expected_action: Action,
        app_id: &AppId,
        now: u64,
    ) -> ServerResult<AuthContext> {
        self.verify_signature(token, signature)?;

        let decoded =
            HandshakeToken::decode(token).map_err(|_| AuthFailure::MalformedToken)?;
        let scope = decoded
            .scope()
            .map_err(|_| AuthFailure::MalformedToken)?;

        if !decoded.is_for(app_id) {
            return Err(AuthFailure::AppMismatch.into());
        }
        if decoded.action != expected_action {
            return Err(AuthFailure::ActionMismatch.into());
        }
        if !flavour_allows(&scope, decoded.action) {
            return Err(AuthFailure::FlavourMismatch.into());
        }
        self.check_freshness(decoded.issued_at, now)?;

        Ok(AuthContext {
            app_id: app_id.clone(),
            action: decoded.action,
            scope,
        })
    }

    fn verify_signature(&self, token: &str, signature: &str) -> ServerResult<()> {
        let provided = hex::decode(signature).map_err(|_| AuthFailure::InvalidSignature)?;
        let mut mac = mac(&self.config.secret)?;
        mac.update(token.as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| AuthFailure::InvalidSignature.into())
    }

    fn check_freshness(&self, issued_at: u64, now: u64) -> ServerResult<()> {
        let lifetime = self.config.token_lifetime.as_secs();
        let skew = self.config.clock_skew.as_secs();
        if issued_at.saturating_add(lifetime) < now || issued_at > now.saturating_add(skew) {
            return Err(AuthFailure::Expired.into());
        }
        Ok(())
    }
}

fn flavour_allows(scope: &TokenScope, action: Action) -> bool {
    match scope {
        TokenScope::Development { .. } => matches!(action, Action::Push | Action::Pull),
        TokenScope::Production { .. } => matches!(action, Action::Pull | Action::Submit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-key-32-bytes-long!!";
    const NOW: u64 = 1_700_000_000;

    fn setup() -> (HandshakeSigner, HandshakeValidator, AppId) {
        (
            HandshakeSigner::new(SECRET.to_vec()),
            HandshakeValidator::new(AuthConfig::new(SECRET.to_vec())),
            AppId::parse("test-app").unwrap(),
        )
    }

    fn failure(result: ServerResult<AuthContext>) -> AuthFailure {
        match result {
            Err(ServerError::Unauthorized(failure)) => failure,
            other => panic!("expected auth failure, got {other:?}"),
        }
    }

    #[test]
    fn sign_and_validate() {
        let (signer, validator, app) = setup();
        let signed = signer
            .sign(&HandshakeToken::development(Action::Push, "test-app", "dev", NOW))
            .unwrap();

        let ctx = validator
            .validate_at(&signed.token, &signed.signature, Action::Push, &app, NOW)
            .unwrap();
        assert_eq!(ctx.action, Action::Push);
        assert_eq!(
            ctx.scope,
            TokenScope::Development {
                user_id: "dev".into()
            }
        );
    }

    #[test]
    fn reject_tampered_signature() {
        let (signer, validator, app) = setup();
        let signed = signer
            .sign(&HandshakeToken::development(Action::Push, "test-app", "dev", NOW))
            .unwrap();
        let mut bad = signed.signature.clone();
        bad.replace_range(0..2, if bad.starts_with("00") { "11" } else { "00" });

        let result = validator.validate_at(&signed.token, &bad, Action::Push, &app, NOW);
        assert_eq!(failure(result), AuthFailure::InvalidSignature);

        let result = validator.validate_at(&signed.token, "zz", Action::Push, &app, NOW);
        assert_eq!(failure(result), AuthFailure::InvalidSignature);
    }

    #[test]
    fn reject_wrong_secret() {
        let (_, validator, app) = setup();
        let other = HandshakeSigner::new(b"another-secret".to_vec());
        let signed = other
            .sign(&HandshakeToken::development(Action::Pull, "test-app", "dev", NOW))
            .unwrap();
        let result = validator.validate_at(&signed.token, &signed.signature, Action::Pull, &app, NOW);
        assert_eq!(failure(result), AuthFailure::InvalidSignature);
    }

    #[test]
    fn reject_signed_garbage() {
        let (signer, validator, app) = setup();
        let token = "bm90IGpzb24=";
        let signature = signer.signature_for(token).unwrap();
        let result = validator.validate_at(token, &signature, Action::Push, &app, NOW);
        assert_eq!(failure(result), AuthFailure::MalformedToken);
    }

    #[test]
    fn reject_wrong_app_and_action() {
        let (signer, validator, app) = setup();
        let other_app = signer
            .sign(&HandshakeToken::development(Action::Push, "other-app", "dev", NOW))
            .unwrap();
        let result =
            validator.validate_at(&other_app.token, &other_app.signature, Action::Push, &app, NOW);
        assert_eq!(failure(result), AuthFailure::AppMismatch);

        let pull = signer
            .sign(&HandshakeToken::development(Action::Pull, "test-app", "dev", NOW))
            .unwrap();
        let result = validator.validate_at(&pull.token, &pull.signature, Action::Push, &app, NOW);
        assert_eq!(failure(result), AuthFailure::ActionMismatch);
    }

    #[test]
    fn flavour_rules() {
        let (signer, validator, app) = setup();
        let cases = [
            (HandshakeToken::production(Action::Push, "test-app", "s1", NOW), false),
            (HandshakeToken::production(Action::Pull, "test-app", "s1", NOW), true),
            (HandshakeToken::production(Action::Submit, "test-app", "s1", NOW), true),
            (HandshakeToken::development(Action::Submit, "test-app", "u", NOW), false),
            (HandshakeToken::development(Action::Pull, "test-app", "u", NOW), true),
        ];
        for (token, allowed) in cases {
            let signed = signer.sign(&token).unwrap();
            let result =
                validator.validate_at(&signed.token, &signed.signature, token.action, &app, NOW);
            if allowed {
                assert!(result.is_ok(), "{token:?} should be allowed");
            } else {
                assert_eq!(failure(result), AuthFailure::FlavourMismatch);
            }
        }
    }

    #[test]
    fn reject_expired_and_future_tokens() {
        let (signer, _, app) = setup();
        let validator = HandshakeValidator::new(
            AuthConfig::new(SECRET.to_vec())
                .with_token_lifetime(Duration::from_secs(60))
                .with_clock_skew(Duration::from_secs(10)),
        );
        let check = |issued_at: u64| {
            let signed = signer
                .sign(&HandshakeToken::development(Action::Pull, "test-app", "u", issued_at))
                .unwrap();
            validator.validate_at(&signed.token, &signed.signature, Action::Pull, &app, NOW)
        };

        assert!(check(NOW - 60).is_ok());
        assert_eq!(failure(check(NOW - 61)), AuthFailure::Expired);
        assert!(check(NOW + 10).is_ok());
        assert_eq!(failure(check(NOW + 11)), AuthFailure::Expired);
    }

    #[test]
    fn query_escapes_base64() {
        let signed = SignedHandshake {
            token: "ab+/=".into(),
            signature: "ff".into(),
        };
        assert_eq!(
            signed.query(),
            "handshake_token=ab%2B%2F%3D&handshake_signature=ff"
        );
    }

    #[test]
    fn query_parses_back_to_the_signed_pair() {
        let (signer, validator, app) = setup();
        let signed = signer
            .sign(&HandshakeToken::production(Action::Pull, "test-app", "release-1", NOW))
            .unwrap();
        let query = signed.query();

        let parsed: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        assert_eq!(
            parsed,
            vec![
                ("handshake_token".to_string(), signed.token.clone()),
                ("handshake_signature".to_string(), signed.signature.clone()),
            ]
        );
        assert!(validator
            .validate_at(&parsed[0].1, &parsed[1].1, Action::Pull, &app, NOW)
            .is_ok());
    }
}
