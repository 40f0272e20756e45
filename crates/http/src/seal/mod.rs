//! Authenticated sealing of small payloads into a single printable token.
//!
//! [`Sealer`] is the seam the session layer depends on; [`AeadSealer`] is the default
//! implementation:
//!
//! - a 256 bit key is derived with PBKDF2-HMAC-SHA256 from the password and a random salt
//! - the payload is encrypted with AES-256-GCM under a random 96 bit nonce
//! - the expiration timestamp is bound to the ciphertext as associated data
//!
//! The token reads `mes1*<salt>*<nonce>*<ciphertext>*<expiration>`, every binary piece being
//! base64url without padding, the expiration being milliseconds since the unix epoch (empty
//! when the token never expires). Any modification of the token fails to unseal.

use std::fmt::Debug;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use tracing::trace;

use crate::ensure;

const PREFIX: &str = "mes1";
const SEPARATOR: char = '*';
const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum SealError {
    #[error("password must be at least {min} bytes long")]
    PasswordTooShort { min: usize },

    #[error("malformed token: {reason}")]
    Malformed { reason: String },

    #[error("token expired")]
    Expired,

    #[error("token authentication failed")]
    Unauthenticated,

    #[error("seal failed: {reason}")]
    Seal { reason: String },
}

impl SealError {
    pub fn malformed<S: ToString>(str: S) -> Self {
        Self::Malformed { reason: str.to_string() }
    }

    pub fn seal<S: ToString>(str: S) -> Self {
        Self::Seal { reason: str.to_string() }
    }
}

/// Options shared by sealing and unsealing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealOptions {
    /// lifetime of a sealed token, `None` never expires
    pub ttl: Option<Duration>,
    /// tolerated clock difference when checking expiration
    pub timestamp_skew: Duration,
    pub min_password_len: usize,
    /// PBKDF2 rounds
    pub iterations: u32,
}

impl Default for SealOptions {
    fn default() -> Self {
        Self { ttl: None, timestamp_skew: Duration::from_secs(60), min_password_len: 32, iterations: 1 }
    }
}

impl SealOptions {
    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_timestamp_skew(mut self, skew: Duration) -> Self {
        self.timestamp_skew = skew;
        self
    }

    #[must_use]
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }
}

/// Authenticated encryption of a payload into a token, and back.
///
/// Implementations must fail closed: a token that was not produced by `seal` with the same
/// password, or that was modified afterwards, must never unseal.
pub trait Sealer: Send + Sync + Debug {
    fn seal(&self, password: &str, payload: &[u8], options: &SealOptions) -> Result<String, SealError>;

    fn unseal(&self, password: &str, token: &str, options: &SealOptions) -> Result<Vec<u8>, SealError>;
}

/// PBKDF2 + AES-256-GCM sealer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AeadSealer;

impl AeadSealer {
    pub fn new() -> Self {
        Self
    }
}

impl Sealer for AeadSealer {
    fn seal(&self, password: &str, payload: &[u8], options: &SealOptions) -> Result<String, SealError> {
        check_password(password, options)?;

        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce);

        let expiration = match options.ttl {
            Some(ttl) => now_millis().saturating_add(millis(ttl)).to_string(),
            None => String::new(),
        };

        let cipher = cipher(password, &salt, options.iterations)?;
        let aad = associated_data(&expiration);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: payload, aad: aad.as_bytes() })
            .map_err(SealError::seal)?;

        trace!(payload_len = payload.len(), expiration = %expiration, "payload sealed");

        Ok([
            PREFIX.to_string(),
            URL_SAFE_NO_PAD.encode(salt),
            URL_SAFE_NO_PAD.encode(nonce),
            URL_SAFE_NO_PAD.encode(ciphertext),
            expiration,
        ]
        .join(&SEPARATOR.to_string()))
    }

    fn unseal(&self, password: &str, token: &str, options: &SealOptions) -> Result<Vec<u8>, SealError> {
        check_password(password, options)?;

        let pieces = token.split(SEPARATOR).collect::<Vec<_>>();
        let [prefix, salt, nonce, ciphertext, expiration] = pieces.as_slice() else {
            return Err(SealError::malformed(format!("expected 5 pieces, found {}", pieces.len())));
        };

        ensure!(*prefix == PREFIX, SealError::malformed("unknown prefix"));

        if !expiration.is_empty() {
            let expiration = expiration.parse::<u64>().map_err(SealError::malformed)?;
            ensure!(expiration > now_millis().saturating_sub(millis(options.timestamp_skew)), SealError::Expired);
        }

        let salt = decode(salt)?;
        let nonce = decode(nonce)?;
        let ciphertext = decode(ciphertext)?;
        ensure!(salt.len() == SALT_LEN, SealError::malformed("invalid salt length"));
        ensure!(nonce.len() == NONCE_LEN, SealError::malformed("invalid nonce length"));

        let cipher = cipher(password, &salt, options.iterations)?;
        let aad = associated_data(expiration);
        cipher
            .decrypt(Nonce::from_slice(&nonce), Payload { msg: &ciphertext, aad: aad.as_bytes() })
            .map_err(|_: aes_gcm::Error| SealError::Unauthenticated)
    }
}

fn check_password(password: &str, options: &SealOptions) -> Result<(), SealError> {
    ensure!(password.len() >= options.min_password_len, SealError::PasswordTooShort { min: options.min_password_len });
    Ok(())
}

fn cipher(password: &str, salt: &[u8], iterations: u32) -> Result<Aes256Gcm, SealError> {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations.max(1), &mut key);
    Aes256Gcm::new_from_slice(&key).map_err(SealError::seal)
}

fn associated_data(expiration: &str) -> String {
    format!("{PREFIX}{SEPARATOR}{expiration}")
}

fn decode(piece: &str) -> Result<Vec<u8>, SealError> {
    URL_SAFE_NO_PAD.decode(piece).map_err(SealError::malformed)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(millis).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{AeadSealer, SealError, SealOptions, Sealer};
    use std::time::Duration;

    const PASSWORD: &str = "an-adequately-long-password-of-32+-bytes";

    #[test]
    fn test_round_trip() {
        let sealer = AeadSealer::new();
        let options = SealOptions::default().with_ttl(Some(Duration::from_secs(60)));

        let token = sealer.seal(PASSWORD, b"{\"id\":\"1\"}", &options).unwrap();
        assert!(token.starts_with("mes1*"));
        assert_eq!(token.split('*').count(), 5);

        let payload = sealer.unseal(PASSWORD, &token, &options).unwrap();
        assert_eq!(payload, b"{\"id\":\"1\"}");
    }

    #[test]
    fn test_round_trip_without_ttl() {
        let sealer = AeadSealer::new();
        let options = SealOptions::default();

        let token = sealer.seal(PASSWORD, b"payload", &options).unwrap();
        assert!(token.ends_with('*'));
        assert_eq!(sealer.unseal(PASSWORD, &token, &options).unwrap(), b"payload");
    }

    #[test]
    fn test_every_single_byte_change_fails() {
        let sealer = AeadSealer::new();
        let options = SealOptions::default().with_ttl(Some(Duration::from_secs(3600)));
        let token = sealer.seal(PASSWORD, b"tamper me", &options).unwrap();

        for index in 0..token.len() {
            let mut tampered = token.clone().into_bytes();
            tampered[index] = if tampered[index] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(tampered).unwrap();

            assert!(sealer.unseal(PASSWORD, &tampered, &options).is_err(), "byte {index} was changed: {tampered}");
        }
    }

    #[test]
    fn test_wrong_password_fails() {
        let sealer = AeadSealer::new();
        let options = SealOptions::default();
        let token = sealer.seal(PASSWORD, b"secret", &options).unwrap();

        let result = sealer.unseal("another-adequately-long-password-value", &token, &options);
        assert!(matches!(result, Err(SealError::Unauthenticated)));
    }

    #[test]
    fn test_expired_token() {
        let sealer = AeadSealer::new();
        let options = SealOptions::default().with_ttl(Some(Duration::from_millis(1))).with_timestamp_skew(Duration::ZERO);
        let token = sealer.seal(PASSWORD, b"short lived", &options).unwrap();

        std::thread::sleep(Duration::from_millis(20));

        let result = sealer.unseal(PASSWORD, &token, &options);
        assert!(matches!(result, Err(SealError::Expired)));
    }

    #[test]
    fn test_short_password() {
        let result = AeadSealer::new().seal("too short", b"x", &SealOptions::default());
        assert!(matches!(result, Err(SealError::PasswordTooShort { min: 32 })));
    }

    #[test]
    fn test_malformed_token() {
        let sealer = AeadSealer::new();
        let options = SealOptions::default();

        assert!(matches!(sealer.unseal(PASSWORD, "", &options), Err(SealError::Malformed { .. })));
        assert!(matches!(sealer.unseal(PASSWORD, "mes1*a*b*c", &options), Err(SealError::Malformed { .. })));
        assert!(matches!(sealer.unseal(PASSWORD, "iron*a*b*c*", &options), Err(SealError::Malformed { .. })));
    }
}
