//! Encrypted in-memory credential storage.
//!
//! [`SecretBox`] holds at most one secret (a bearer token or a login payload)
//! encrypted with AES in CBC mode under a key and IV generated once per
//! instance. The raw secret only exists transiently while it is being stored
//! or after an explicit [`SecretBox::fetch`].
//!
//! # Limitations
//!
//! This guards against incidental exposure such as accidental logging, debug
//! dumps, or serializing the owning client. It is not a security boundary: the
//! key lives in the same process memory as the ciphertext, so anyone able to
//! read process memory can recover the secret.
//!
//! # Example
//!
//! ```
//! use aquarest_common::{Secret, SecretBox};
//! use serde_json::json;
//!
//! # fn example() -> Result<(), aquarest_common::CredentialError> {
//! let mut cell = SecretBox::new();
//! cell.store(json!({"username": "scanner", "password": "hunter2"}))?;
//!
//! match cell.fetch()? {
//!     Secret::Structured(value) => assert_eq!(value["username"], "scanner"),
//!     Secret::PlainText(_) => unreachable!(),
//! }
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use zeroize::Zeroizing;

/// Block size shared by every supported AES variant, which is also the IV length.
const AES_BLOCK_LEN: usize = 16;

/// Errors raised by the credential cell.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CredentialError {
    /// The supplied key does not have the length the algorithm requires.
    #[error("Invalid key format for {algorithm}: expected {expected} bytes, got {actual}")]
    InvalidKeyFormat {
        /// Algorithm the key was supplied for.
        algorithm: CipherAlgorithm,
        /// Required key length in bytes.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// The supplied IV does not have the length the algorithm requires.
    #[error("Invalid IV format for {algorithm}: expected {expected} bytes, got {actual}")]
    InvalidIvFormat {
        /// Algorithm the IV was supplied for.
        algorithm: CipherAlgorithm,
        /// Required IV length in bytes.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// Nothing has been stored, or the ciphertext cannot be decrypted with this key and IV.
    #[error("Decryption error: {0}")]
    DecryptionError(String),

    /// A structured secret could not be serialized for storage.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The algorithm name is not one of the supported ciphers.
    #[error("Unknown cipher algorithm: {0}")]
    UnknownAlgorithm(String),
}

/// Ciphers a [`SecretBox`] can encrypt with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CipherAlgorithm {
    /// AES-128 in CBC mode with PKCS#7 padding.
    Aes128Cbc,
    /// AES-192 in CBC mode with PKCS#7 padding.
    Aes192Cbc,
    /// AES-256 in CBC mode with PKCS#7 padding.
    #[default]
    Aes256Cbc,
}

impl CipherAlgorithm {
    /// Key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc => 16,
            Self::Aes192Cbc => 24,
            Self::Aes256Cbc => 32,
        }
    }

    /// IV length in bytes.
    #[must_use]
    pub const fn iv_len(self) -> usize {
        AES_BLOCK_LEN
    }

    /// Canonical lowercase name, e.g. `aes-256-cbc`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aes128Cbc => "aes-128-cbc",
            Self::Aes192Cbc => "aes-192-cbc",
            Self::Aes256Cbc => "aes-256-cbc",
        }
    }
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CipherAlgorithm {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aes-128-cbc" | "aes128" => Ok(Self::Aes128Cbc),
            "aes-192-cbc" | "aes192" => Ok(Self::Aes192Cbc),
            "aes-256-cbc" | "aes256" => Ok(Self::Aes256Cbc),
            other => Err(CredentialError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// A decrypted secret.
///
/// Decryption first tries to read the plaintext as JSON and falls back to the
/// raw text when that fails, so a token stored as text comes back as
/// [`Secret::PlainText`] while a login payload comes back as
/// [`Secret::Structured`]. Text that happens to be valid JSON (for example
/// `"42"`) is returned structured.
#[derive(Clone, PartialEq, Eq)]
pub enum Secret {
    /// Plaintext that did not parse as JSON.
    PlainText(String),
    /// Any JSON value.
    Structured(Value),
}

impl Secret {
    fn from_decrypted(text: String) -> Self {
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Self::Structured(value),
            Err(_) => Self::PlainText(text),
        }
    }

    fn to_storage_text(&self) -> Result<Zeroizing<String>, CredentialError> {
        match self {
            Self::PlainText(text) => Ok(Zeroizing::new(text.clone())),
            Self::Structured(value) => serde_json::to_string(value)
                .map(Zeroizing::new)
                .map_err(|e| CredentialError::Serialization(e.to_string())),
        }
    }

    /// Text form of the secret, as used in a bearer header.
    ///
    /// JSON strings are returned unquoted; other structured values are
    /// serialized.
    #[must_use]
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::PlainText(text) | Self::Structured(Value::String(text)) => Cow::Borrowed(text),
            Self::Structured(value) => Cow::Owned(value.to_string()),
        }
    }

    /// Converts the secret into a JSON value; plain text becomes a JSON string.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::PlainText(text) => Value::String(text),
            Self::Structured(value) => value,
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlainText(_) => f.write_str("Secret::PlainText([REDACTED])"),
            Self::Structured(_) => f.write_str("Secret::Structured([REDACTED])"),
        }
    }
}

impl From<&str> for Secret {
    fn from(text: &str) -> Self {
        Self::PlainText(text.to_string())
    }
}

impl From<String> for Secret {
    fn from(text: String) -> Self {
        Self::PlainText(text)
    }
}

impl From<Value> for Secret {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

/// Encrypted cell holding at most one secret.
///
/// The key and IV are private and never leave the cell; `SecretBox` is
/// deliberately neither `Clone` nor `Serialize`, and its `Debug` output only
/// shows the algorithm and whether a secret is present. Key material is wiped
/// when the cell is dropped.
pub struct SecretBox {
    algorithm: CipherAlgorithm,
    key: Zeroizing<Vec<u8>>,
    iv: Zeroizing<Vec<u8>>,
    ciphertext: Option<Vec<u8>>,
}

impl fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBox")
            .field("algorithm", &self.algorithm)
            .field("has_data", &self.has_data())
            .finish_non_exhaustive()
    }
}

impl Default for SecretBox {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretBox {
    /// Creates an empty AES-256-CBC cell with a random key and IV.
    #[must_use]
    pub fn new() -> Self {
        Self::with_algorithm(CipherAlgorithm::default())
    }

    /// Creates an empty cell for `algorithm` with a random key and IV.
    #[must_use]
    pub fn with_algorithm(algorithm: CipherAlgorithm) -> Self {
        let mut rng = rand::rng();

        let mut key = Zeroizing::new(vec![0u8; algorithm.key_len()]);
        rng.fill_bytes(&mut key);

        let mut iv = Zeroizing::new(vec![0u8; algorithm.iv_len()]);
        rng.fill_bytes(&mut iv);

        Self {
            algorithm,
            key,
            iv,
            ciphertext: None,
        }
    }

    /// Creates an empty cell from caller-supplied key material.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::InvalidKeyFormat`] or
    /// [`CredentialError::InvalidIvFormat`] if either buffer has the wrong
    /// length for `algorithm`.
    pub fn from_parts(
        algorithm: CipherAlgorithm,
        key: &[u8],
        iv: &[u8],
    ) -> Result<Self, CredentialError> {
        if key.len() != algorithm.key_len() {
            return Err(CredentialError::InvalidKeyFormat {
                algorithm,
                expected: algorithm.key_len(),
                actual: key.len(),
            });
        }
        if iv.len() != algorithm.iv_len() {
            return Err(CredentialError::InvalidIvFormat {
                algorithm,
                expected: algorithm.iv_len(),
                actual: iv.len(),
            });
        }

        Ok(Self {
            algorithm,
            key: Zeroizing::new(key.to_vec()),
            iv: Zeroizing::new(iv.to_vec()),
            ciphertext: None,
        })
    }

    /// Encrypts and stores `secret`, replacing any previous one.
    ///
    /// Returns the cell to allow chaining.
    ///
    /// # Errors
    ///
    /// Returns an error if a structured secret cannot be serialized. The
    /// previous ciphertext is kept in that case.
    pub fn store(&mut self, secret: impl Into<Secret>) -> Result<&mut Self, CredentialError> {
        let plaintext = secret.into().to_storage_text()?;
        let ciphertext = self.encrypt(plaintext.as_bytes())?;
        self.ciphertext = Some(ciphertext);
        Ok(self)
    }

    /// Serializes `value` to JSON and stores it.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Serialization`] if `value` cannot be represented as JSON.
    pub fn store_json<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<&mut Self, CredentialError> {
        let value = serde_json::to_value(value)
            .map_err(|e| CredentialError::Serialization(e.to_string()))?;
        self.store(value)
    }

    /// Decrypts the stored secret.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::DecryptionError`] if nothing was stored or the
    /// ciphertext does not decrypt to UTF-8 under this cell's key and IV.
    pub fn fetch(&self) -> Result<Secret, CredentialError> {
        let ciphertext = self
            .ciphertext
            .as_deref()
            .ok_or_else(|| CredentialError::DecryptionError("no secret stored".to_string()))?;

        let plaintext = Zeroizing::new(self.decrypt(ciphertext)?);
        let text = std::str::from_utf8(&plaintext).map_err(|_| {
            CredentialError::DecryptionError("plaintext is not valid UTF-8".to_string())
        })?;

        Ok(Secret::from_decrypted(text.to_string()))
    }

    /// Whether a secret has been stored.
    #[must_use]
    pub const fn has_data(&self) -> bool {
        self.ciphertext.is_some()
    }

    /// The configured cipher.
    #[must_use]
    pub const fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    /// Length of the stored ciphertext, if any.
    #[must_use]
    pub fn ciphertext_len(&self) -> Option<usize> {
        self.ciphertext.as_ref().map(Vec::len)
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CredentialError> {
        let (key, iv) = (self.key.as_slice(), self.iv.as_slice());

        let ciphertext = match self.algorithm {
            CipherAlgorithm::Aes128Cbc => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
            CipherAlgorithm::Aes192Cbc => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
            CipherAlgorithm::Aes256Cbc => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        };

        // Lengths are checked at construction, so this only fires on a broken invariant.
        ciphertext.map_err(|_| CredentialError::InvalidKeyFormat {
            algorithm: self.algorithm,
            expected: self.algorithm.key_len(),
            actual: key.len(),
        })
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CredentialError> {
        let (key, iv) = (self.key.as_slice(), self.iv.as_slice());
        let bad_material = |_| CredentialError::DecryptionError("invalid key material".to_string());
        let bad_padding =
            |_| CredentialError::DecryptionError("ciphertext does not match key".to_string());

        match self.algorithm {
            CipherAlgorithm::Aes128Cbc => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(bad_material)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(bad_padding),
            CipherAlgorithm::Aes192Cbc => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
                .map_err(bad_material)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(bad_padding),
            CipherAlgorithm::Aes256Cbc => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(bad_material)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(bad_padding),
        }
    }
}

/// Username and password exchanged for a bearer token at login.
#[derive(Clone)]
pub struct LoginCredentials {
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: SecretString,
}

// Custom Debug implementation to avoid exposing the password
impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl LoginCredentials {
    /// Creates login credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Encrypts the credentials into a fresh cell as the login payload
    /// `{"username": ..., "password": ...}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be stored.
    pub fn seal(&self) -> Result<SecretBox, CredentialError> {
        let mut cell = SecretBox::new();
        cell.store(serde_json::json!({
            "username": self.username,
            "password": self.password.expose_secret(),
        }))?;
        Ok(cell)
    }
}
