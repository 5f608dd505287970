// Session token issuance and verification
//
// Two independent token types are issued per session:
// - an encrypted token (AES-256-GCM) carrying only the subject and expiry
// - a signed token (HS512 JWT) carrying the identity claims used for authorization
//
// Both are produced from one process-wide `TokenKeys`, so every token this
// process issues can be verified by this process.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    models::{Role, User},
};

/// AES-256 key size in bytes
pub const ENCRYPTION_KEY_LEN: usize = 32;

/// HS512 key size in bytes (512 bits)
pub const SIGNING_KEY_LEN: usize = 64;

/// Shortest signing key accepted from configuration
pub const MIN_SIGNING_KEY_LEN: usize = 32;

/// AES-GCM nonce size in bytes
pub const NONCE_LEN: usize = 12;

/// Encrypted tokens always live for 24 hours
pub const ENCRYPTED_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Marks the encrypted token format and is bound as associated data
const ENCRYPTED_TOKEN_PREFIX: &str = "enc.";

/// Fill a fresh key of `len` bytes from the operating system RNG
pub fn generate_key(len: usize) -> Result<Vec<u8>, AuthError> {
    let mut key = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut key)
        .map_err(|e| AuthError::KeyGenerationError(e.to_string()))?;
    Ok(key)
}

/// 256-bit symmetric key for the encrypted token
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; ENCRYPTION_KEY_LEN]);

impl EncryptionKey {
    pub fn generate() -> Result<Self, AuthError> {
        Self::from_slice(&generate_key(ENCRYPTION_KEY_LEN)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, AuthError> {
        let key: [u8; ENCRYPTION_KEY_LEN] = bytes.try_into().map_err(|_| {
            AuthError::ConfigError(format!(
                "encryption key must be {} bytes, got {}",
                ENCRYPTION_KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Process-wide secret material shared by issuer and verifier
#[derive(Clone)]
pub struct TokenKeys {
    encryption: EncryptionKey,
    signing: Vec<u8>,
}

impl TokenKeys {
    pub fn new(encryption: EncryptionKey, signing: Vec<u8>) -> Result<Self, AuthError> {
        if signing.len() < MIN_SIGNING_KEY_LEN {
            return Err(AuthError::ConfigError(format!(
                "signing key must be at least {} bytes, got {}",
                MIN_SIGNING_KEY_LEN,
                signing.len()
            )));
        }
        Ok(Self { encryption, signing })
    }

    /// Generate both keys from the OS RNG
    pub fn generate() -> Result<Self, AuthError> {
        Self::new(EncryptionKey::generate()?, generate_key(SIGNING_KEY_LEN)?)
    }

    /// Build keys from base64 configuration values, generating any that are absent
    ///
    /// Generated keys live only as long as the process, so tokens issued
    /// before a restart stop verifying.
    pub fn from_base64(encryption: Option<&str>, signing: Option<&str>) -> Result<Self, AuthError> {
        let encryption = match encryption {
            Some(encoded) => EncryptionKey::from_slice(&decode_key("TOKEN_ENCRYPTION_KEY", encoded)?)?,
            None => {
                warn!("TOKEN_ENCRYPTION_KEY not set, generating an ephemeral key");
                EncryptionKey::generate()?
            }
        };

        let signing = match signing {
            Some(encoded) => decode_key("TOKEN_SIGNING_KEY", encoded)?,
            None => {
                warn!("TOKEN_SIGNING_KEY not set, generating an ephemeral key");
                generate_key(SIGNING_KEY_LEN)?
            }
        };

        Self::new(encryption, signing)
    }

    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.encryption
    }
}

impl fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenKeys")
            .field("encryption", &self.encryption)
            .field("signing", &"<redacted>")
            .finish()
    }
}

fn decode_key(name: &str, encoded: &str) -> Result<Vec<u8>, AuthError> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| AuthError::ConfigError(format!("{} is not valid base64: {}", name, e)))
}

/// Claims sealed inside the encrypted token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by the signed token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedClaims {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub uid: String,
    pub user_type: Role,
    /// Unique per issuance so two logins within one second still differ
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Decrypt an encrypted token with `key` and check its expiry
pub fn verify_encrypted_token(token: &str, key: &EncryptionKey) -> Result<EncryptedClaims, AuthError> {
    let encoded = token
        .strip_prefix(ENCRYPTED_TOKEN_PREFIX)
        .ok_or(AuthError::DecryptionError)?;
    let raw = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| AuthError::DecryptionError)?;

    if raw.len() <= NONCE_LEN {
        return Err(AuthError::DecryptionError);
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_LEN);

    let plaintext = key
        .cipher()
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: ENCRYPTED_TOKEN_PREFIX.as_bytes(),
            },
        )
        .map_err(|_| AuthError::DecryptionError)?;

    let claims: EncryptedClaims =
        serde_json::from_slice(&plaintext).map_err(|_| AuthError::DecryptionError)?;

    if claims.exp <= Utc::now().timestamp() {
        return Err(AuthError::ExpiredToken);
    }

    Ok(claims)
}

/// Token service issuing and verifying both session token types
#[derive(Debug, Clone)]
pub struct TokenService {
    keys: TokenKeys,
    signed_token_duration: i64, // in seconds
}

impl TokenService {
    pub fn new(keys: TokenKeys, signed_token_duration: i64) -> Self {
        Self {
            keys,
            signed_token_duration,
        }
    }

    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    /// Issue an encrypted token for `subject`, valid for 24 hours
    pub fn issue_encrypted_token(&self, subject: &str) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = EncryptedClaims {
            sub: subject.to_string(),
            iat: now,
            exp: now + ENCRYPTED_TOKEN_TTL_SECS,
        };
        let plaintext =
            serde_json::to_vec(&claims).map_err(|e| AuthError::EncryptionError(e.to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| AuthError::KeyGenerationError(e.to_string()))?;

        let ciphertext = self
            .keys
            .encryption
            .cipher()
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: ENCRYPTED_TOKEN_PREFIX.as_bytes(),
                },
            )
            .map_err(|e| AuthError::EncryptionError(e.to_string()))?;

        let mut raw = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", ENCRYPTED_TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(raw)))
    }

    /// Issue a signed token carrying the identity claims of `user`
    pub fn issue_signed_token(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = SignedClaims {
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            uid: user.user_id.clone(),
            user_type: user.user_type,
            jti: Uuid::new_v4().simple().to_string(),
            iat: now,
            exp: now + self.signed_token_duration,
        };

        encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(&self.keys.signing),
        )
        .map_err(|e| AuthError::SigningError(e.to_string()))
    }

    /// Issue both tokens for `user`, returned as (signed, encrypted)
    pub fn issue_token_pair(&self, user: &User) -> Result<(String, String), AuthError> {
        let signed = self.issue_signed_token(user)?;
        let encrypted = self.issue_encrypted_token(&user.user_id)?;
        Ok((signed, encrypted))
    }

    /// Verify an encrypted token with the process-wide key
    pub fn verify_encrypted_token(&self, token: &str) -> Result<EncryptedClaims, AuthError> {
        verify_encrypted_token(token, &self.keys.encryption)
    }

    /// Verify a signed token and recover its claims
    pub fn verify_signed_token(&self, token: &str) -> Result<SignedClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.leeway = 0;

        decode::<SignedClaims>(
            token,
            &DecodingKey::from_secret(&self.keys.signing),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
            _ => AuthError::MalformedToken,
        })
    }
}
