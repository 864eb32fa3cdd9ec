// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! Operator-provisioned appserver registry.
//!
//! A JSON file maps each appserver id to its ECDSA public key, its base URL
//! for the complaint relay, and the AES key it shares with the provider.
//! Loaded once at process start; registration changes need a restart.
//!
//! ```json
//! {
//!   "appservers": [
//!     {
//!       "id": "AAAAAAAAAAAAAAAAAAAAAA==",
//!       "public_key": "keys/appserver-public-ecc.pem",
//!       "url": "http://appserver:8080",
//!       "aes_key": "keys/appserver-aes.key"
//!     }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64ct::{Base64, Encoding};
use p256::ecdsa::VerifyingKey;
use serde::Deserialize;

use crate::crypto::{load_verifying_key, KeyError, SymmetricKey};
use crate::wire::APPSERVER_ID_BYTES;

pub type AppServerId = [u8; APPSERVER_ID_BYTES];

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid registry file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("invalid appserver id {id:?}: expected {APPSERVER_ID_BYTES} base64 bytes")]
    InvalidId { id: String },

    #[error(transparent)]
    Key(#[from] KeyError),
}

#[derive(Deserialize)]
struct RegistryFile {
    appservers: Vec<RegistryEntry>,
}

#[derive(Deserialize)]
struct RegistryEntry {
    /// Base64-encoded 16-byte appserver id.
    id: String,
    /// Path to the appserver's ECDSA public key (SPKI PEM).
    public_key: PathBuf,
    /// Base URL for the complaint relay.
    url: String,
    /// Path to the shared AES-256 key (raw 32 bytes).
    aes_key: PathBuf,
}

pub struct AppServerInfo {
    pub verifying_key: VerifyingKey,
    pub url: String,
    pub symmetric_key: SymmetricKey,
}

#[derive(Default)]
pub struct AppServerRegistry {
    entries: HashMap<AppServerId, AppServerInfo>,
}

impl AppServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the registry file and every key it references.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: RegistryFile =
            serde_json::from_str(&text).map_err(|source| RegistryError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        let mut registry = Self::new();
        for entry in file.appservers {
            let id = decode_id(&entry.id)?;
            let verifying_key = load_verifying_key(&entry.public_key)?;
            let symmetric_key = SymmetricKey::load(&entry.aes_key)?;
            registry.insert(
                id,
                AppServerInfo {
                    verifying_key,
                    url: entry.url,
                    symmetric_key,
                },
            );
        }
        Ok(registry)
    }

    pub fn insert(&mut self, id: AppServerId, info: AppServerInfo) {
        self.entries.insert(id, info);
    }

    pub fn get(&self, id: &AppServerId) -> Option<&AppServerInfo> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn decode_id(encoded: &str) -> Result<AppServerId, RegistryError> {
    let bytes = Base64::decode_vec(encoded).map_err(|_| RegistryError::InvalidId {
        id: encoded.to_string(),
    })?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| RegistryError::InvalidId {
            id: encoded.to_string(),
        })
}
