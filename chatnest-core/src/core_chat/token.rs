//! Invitation token codec
//!
//! A token is the URL-safe base64 (no padding) encoding of
//!
//! ```text
//! version (1) || invitation id (16) || expires_at millis, big endian (8) || mac (32)
//! ```
//!
//! where `mac` is the BLAKE3 keyed hash of the preceding 25 bytes under the
//! server's 32-byte signing secret. Parsing verifies the MAC before any
//! field is trusted, so a token cannot be forged or altered without the
//! secret.

use super::error::CollabError;
use super::invitation::InvitationId;
use crate::core_store::model::types::Timestamp;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Current token layout version
pub const TOKEN_VERSION: u8 = 1;

const ID_LEN: usize = 16;
const EXPIRY_LEN: usize = 8;
const MAC_LEN: usize = 32;
const PAYLOAD_LEN: usize = 1 + ID_LEN + EXPIRY_LEN;

/// Length of a decoded token in bytes
pub const TOKEN_LEN: usize = PAYLOAD_LEN + MAC_LEN;

/// Context string for deriving a signing secret from a passphrase
const DERIVE_CONTEXT: &str = "chatnest 2024-06 invitation token signing key";

/// Token codec errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is not valid base64url")]
    Malformed,

    #[error("token has wrong length: {0} bytes")]
    WrongLength(usize),

    #[error("unsupported token version: {0}")]
    UnsupportedVersion(u8),

    #[error("token signature does not match")]
    SignatureMismatch,

    #[error("invalid signing secret: {0}")]
    InvalidSecret(String),
}

impl TokenError {
    fn reason(&self) -> &'static str {
        match self {
            TokenError::Malformed => "malformed token",
            TokenError::WrongLength(_) => "malformed token",
            TokenError::UnsupportedVersion(_) => "unsupported token version",
            TokenError::SignatureMismatch => "signature mismatch",
            TokenError::InvalidSecret(_) => "signing secret unavailable",
        }
    }
}

impl From<TokenError> for CollabError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::InvalidSecret(msg) => CollabError::Internal(msg),
            other => CollabError::InvalidToken(other.reason()),
        }
    }
}

/// 32-byte server secret used to sign invitation tokens
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TokenSecret([u8; 32]);

impl TokenSecret {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        TokenSecret(bytes)
    }

    /// Generate a fresh random secret
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        TokenSecret(bytes)
    }

    /// Parse a 64-character hex string
    pub fn from_hex(s: &str) -> Result<Self, TokenError> {
        let mut decoded = hex::decode(s.trim())
            .map_err(|e| TokenError::InvalidSecret(format!("not valid hex: {}", e)))?;

        if decoded.len() != 32 {
            let len = decoded.len();
            decoded.zeroize();
            return Err(TokenError::InvalidSecret(format!(
                "expected 32 bytes, got {}",
                len
            )));
        }

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(TokenSecret(bytes))
    }

    /// Derive a secret from an operator-supplied passphrase
    pub fn derive_from_passphrase(passphrase: &str) -> Self {
        TokenSecret(blake3::derive_key(DERIVE_CONTEXT, passphrase.as_bytes()))
    }

    /// Hex encoding, for `gen-secret` output
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenSecret(<redacted>)")
    }
}

/// Opaque bearer token handed to the invitee
///
/// `Debug` is redacted so tokens never end up in logs by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct InvitationToken(String);

impl InvitationToken {
    pub fn new(token: impl Into<String>) -> Self {
        InvitationToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for InvitationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InvitationToken(<redacted>)")
    }
}

/// Fields recovered from a verified token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenClaims {
    pub invitation_id: InvitationId,
    pub expires_at: Timestamp,
}

/// Mints and verifies invitation tokens
#[derive(Clone)]
pub struct TokenCodec {
    secret: TokenSecret,
}

impl TokenCodec {
    pub fn new(secret: TokenSecret) -> Self {
        Self { secret }
    }

    /// Mint a token binding `invitation_id` and `expires_at`
    pub fn mint(&self, invitation_id: &InvitationId, expires_at: Timestamp) -> InvitationToken {
        let mut raw = [0u8; TOKEN_LEN];
        raw[0] = TOKEN_VERSION;
        raw[1..1 + ID_LEN].copy_from_slice(invitation_id.as_bytes());
        raw[1 + ID_LEN..PAYLOAD_LEN].copy_from_slice(&expires_at.as_millis().to_be_bytes());

        let mac = blake3::keyed_hash(&self.secret.0, &raw[..PAYLOAD_LEN]);
        raw[PAYLOAD_LEN..].copy_from_slice(mac.as_bytes());

        InvitationToken(URL_SAFE_NO_PAD.encode(raw))
    }

    /// Verify a token and recover its claims
    ///
    /// Expiry is not checked here. The registry compares `expires_at`
    /// against its clock and the stored invitation status.
    pub fn parse(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| TokenError::Malformed)?;

        if raw.len() != TOKEN_LEN {
            return Err(TokenError::WrongLength(raw.len()));
        }

        if raw[0] != TOKEN_VERSION {
            return Err(TokenError::UnsupportedVersion(raw[0]));
        }

        let mut presented = [0u8; MAC_LEN];
        presented.copy_from_slice(&raw[PAYLOAD_LEN..]);
        let expected = blake3::keyed_hash(&self.secret.0, &raw[..PAYLOAD_LEN]);

        // blake3::Hash equality is constant time
        if expected != blake3::Hash::from_bytes(presented) {
            return Err(TokenError::SignatureMismatch);
        }

        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(&raw[1..1 + ID_LEN]);
        let mut expiry = [0u8; EXPIRY_LEN];
        expiry.copy_from_slice(&raw[1 + ID_LEN..PAYLOAD_LEN]);

        Ok(TokenClaims {
            invitation_id: InvitationId::from_bytes(id),
            expires_at: Timestamp::from_millis(u64::from_be_bytes(expiry)),
        })
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}
