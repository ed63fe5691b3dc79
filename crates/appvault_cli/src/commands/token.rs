//! Token command implementation: mints signed handshakes for testing and
//! for scripted clients.

use appvault_protocol::{Action, HandshakeToken};
use appvault_server::{unix_now, HandshakeSigner, ENV_SECRET};
use serde::Serialize;

/// A minted handshake.
#[derive(Debug, Serialize)]
pub struct MintedToken {
    /// The encoded token.
    pub handshake_token: String,
    /// Hex HMAC-SHA256 over the encoded token.
    pub handshake_signature: String,
    /// Ready-to-append query string.
    pub query: String,
}

/// Parses an action name.
pub fn parse_action(name: &str) -> Result<Action, String> {
    match name {
        "push" => Ok(Action::Push),
        "pull" => Ok(Action::Pull),
        "submit" => Ok(Action::Submit),
        other => Err(format!(
            "unknown action {:?} (expected push, pull or submit)",
            other
        )),
    }
}

/// Builds and signs a token.
///
/// Exactly one of `user` and `submission` must be given: a user id mints a
/// development token, a submission id a production token.
pub fn mint(
    secret: &[u8],
    app: &str,
    action: Action,
    user: Option<&str>,
    submission: Option<&str>,
    issued_at: u64,
) -> Result<MintedToken, Box<dyn std::error::Error>> {
    let token = match (user, submission) {
        (Some(user), None) => HandshakeToken::development(action, app, user, issued_at),
        (None, Some(submission)) => HandshakeToken::production(action, app, submission, issued_at),
        _ => return Err("Pass exactly one of --user and --submission".into()),
    };
    let signed = HandshakeSigner::new(secret.to_vec()).sign(&token)?;
    Ok(MintedToken {
        query: signed.query(),
        handshake_token: signed.token,
        handshake_signature: signed.signature,
    })
}

/// Runs the token command.
pub fn run(
    secret: Option<String>,
    app: &str,
    action: &str,
    user: Option<&str>,
    submission: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let secret = secret
        .or_else(|| std::env::var(ENV_SECRET).ok())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Pass --secret or set {}", ENV_SECRET))?;
    let action = parse_action(action)?;

    let minted = mint(secret.as_bytes(), app, action, user, submission, unix_now())?;
    tracing::debug!(app_id = app, action = %action, "minted handshake");

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&minted)?),
        _ => println!("{}", minted.query),
    }
    Ok(())
}
