//! # Stored Credentials
//!
//! Login and password for the remote host, kept in a small JSON file with a
//! `.crd` extension. Each value is sealed with AES-256-GCM under a key that
//! is generated fresh on every save and written next to the ciphertext.
//!
//! Anyone who can read the file can decrypt it. The encryption only keeps the
//! password from showing up in plain text when the file is opened casually.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const EXTENSION: &str = "crd";
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Login and password pair. The password may be empty (key-based auth).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct Sealed {
    nonce: String,
    ciphertext: String,
}

#[derive(Serialize, Deserialize)]
struct Record {
    key: String,
    login: Sealed,
    password: Sealed,
}

impl Credential {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.login.is_empty()
    }

    /// Load a credential file.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let path = with_extension(path);
        if !path.is_file() {
            info!("Credential {} not found", path.display());
            return Ok(None);
        }

        let record: Record = serde_json::from_str(&fs::read_to_string(&path)?)?;
        let key = decode(&record.key, "key")?;
        if key.len() != KEY_LEN {
            return Err(Error::Credential {
                message: format!("key is {} bytes, expected {}", key.len(), KEY_LEN),
            });
        }
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

        let credential = Self {
            login: open(&cipher, &record.login)?,
            password: open(&cipher, &record.password)?,
        };
        info!("Credential {} successfully loaded", path.display());
        Ok(Some(credential))
    }

    /// Encrypt and write the credential, replacing any previous file.
    ///
    /// Returns the path actually written (with the `.crd` extension).
    pub fn save(&self, path: &Path) -> Result<PathBuf> {
        let path = with_extension(path);
        let key = Aes256Gcm::generate_key(OsRng);
        let cipher = Aes256Gcm::new(&key);

        let record = Record {
            key: STANDARD.encode(key),
            login: seal(&cipher, &self.login)?,
            password: seal(&cipher, &self.password)?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&path, serde_json::to_string_pretty(&record)?)?;
        info!("Credential {} saved", path.display());
        Ok(path)
    }
}

/// Append `.crd` unless the path already ends with it.
pub fn with_extension(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == EXTENSION) {
        return path.to_path_buf();
    }
    let mut raw = path.as_os_str().to_owned();
    raw.push(".");
    raw.push(EXTENSION);
    PathBuf::from(raw)
}

fn seal(cipher: &Aes256Gcm, plain: &str) -> Result<Sealed> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plain.as_bytes())
        .map_err(|e| Error::Credential {
            message: format!("encryption failed: {}", e),
        })?;
    Ok(Sealed {
        nonce: STANDARD.encode(nonce),
        ciphertext: STANDARD.encode(ciphertext),
    })
}

fn open(cipher: &Aes256Gcm, sealed: &Sealed) -> Result<String> {
    let nonce = decode(&sealed.nonce, "nonce")?;
    if nonce.len() != NONCE_LEN {
        return Err(Error::Credential {
            message: format!("nonce is {} bytes, expected {}", nonce.len(), NONCE_LEN),
        });
    }
    let ciphertext = decode(&sealed.ciphertext, "ciphertext")?;
    let plain = cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|e| Error::Credential {
            message: format!("decryption failed: {}", e),
        })?;
    String::from_utf8(plain).map_err(|e| Error::Credential {
        message: e.to_string(),
    })
}

fn decode(value: &str, field: &str) -> Result<Vec<u8>> {
    STANDARD.decode(value).map_err(|e| Error::Credential {
        message: format!("invalid {}: {}", field, e),
    })
}
