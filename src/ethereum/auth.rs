//! JWT authentication for execution endpoints.
//!
//! Follows the Engine API scheme: an HS256 token carrying an `iat` claim,
//! signed with a shared 256-bit hex secret.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use eyre::Result;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

/// JWT hex encoded 256 bit secret key length.
const JWT_SECRET_LEN: usize = 64;

/// Lifetime of an issued token.
const JWT_TTL: Duration = Duration::from_secs(60);

/// A 256-bit secret used to sign request tokens.
#[derive(Clone)]
pub struct JwtSecret([u8; 32]);

impl JwtSecret {
    /// Creates an instance of [`JwtSecret`].
    /// The provided `secret` must be a valid hexadecimal string of length 64,
    /// optionally `0x` prefixed.
    pub fn from_hex<S: AsRef<str>>(hex: S) -> Result<Self> {
        let hex: &str = hex.as_ref().trim();
        let hex = hex
            .strip_prefix("0x")
            .or_else(|| hex.strip_prefix("0X"))
            .unwrap_or(hex);

        if hex.len() != JWT_SECRET_LEN {
            eyre::bail!(
                "Invalid JWT secret key length. Expected {} characters, got {}.",
                JWT_SECRET_LEN,
                hex.len()
            );
        }

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex, &mut bytes)?;
        Ok(JwtSecret(bytes))
    }

    /// Builds the claims for a token issued at `time`, defaulting to now.
    pub(crate) fn generate_claims(&self, time: Option<SystemTime>) -> Claims {
        let now = time.unwrap_or_else(SystemTime::now);
        let iat = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Claims {
            iat,
            exp: iat + JWT_TTL.as_secs(),
        }
    }

    /// Encodes `claims` into a signed token.
    pub(crate) fn encode(&self, claims: &Claims) -> Result<String> {
        let key = EncodingKey::from_secret(&self.0);
        let header = Header::new(Algorithm::HS256);
        Ok(jsonwebtoken::encode(&header, claims, &key)?)
    }

    /// Issues a fresh bearer token.
    pub fn token(&self) -> Result<String> {
        self.encode(&self.generate_claims(None))
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("JwtSecret").field(&"{{}}").finish()
    }
}

/// Claims carried by a request token.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
    /// The number of seconds since the UNIX_EPOCH.
    pub(crate) iat: u64,
    /// The expiration time of the JWT.
    pub(crate) exp: u64,
}
