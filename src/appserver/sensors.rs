// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! Operator-provisioned sensor registry.
//!
//! A JSON file maps each sensor id to its ECDSA public key. Hash commitments
//! from unregistered sensors are refused.
//!
//! ```json
//! {
//!   "sensors": [
//!     { "id": "//////////////////////8B", "public_key": "keys/sensor-public-ecc.pem" }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64ct::{Base64, Encoding};
use p256::ecdsa::VerifyingKey;
use serde::Deserialize;

use crate::crypto::{load_verifying_key, KeyError};
use crate::wire::SENSOR_ID_BYTES;

pub type SensorId = [u8; SENSOR_ID_BYTES];

#[derive(Debug, thiserror::Error)]
pub enum SensorRegistryError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid sensor registry file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("invalid sensor id {id:?}: expected {SENSOR_ID_BYTES} base64 bytes")]
    InvalidId { id: String },

    #[error(transparent)]
    Key(#[from] KeyError),
}

#[derive(Deserialize)]
struct RegistryFile {
    sensors: Vec<RegistryEntry>,
}

#[derive(Deserialize)]
struct RegistryEntry {
    /// Base64-encoded 16-byte sensor id.
    id: String,
    /// Path to the sensor's ECDSA public key (SPKI PEM).
    public_key: PathBuf,
}

#[derive(Default)]
pub struct SensorRegistry {
    entries: HashMap<SensorId, VerifyingKey>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, SensorRegistryError> {
        let text = std::fs::read_to_string(path).map_err(|source| SensorRegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: RegistryFile =
            serde_json::from_str(&text).map_err(|source| SensorRegistryError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        let mut registry = Self::new();
        for entry in file.sensors {
            let id = decode_id(&entry.id)?;
            registry.insert(id, load_verifying_key(&entry.public_key)?);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, id: SensorId, key: VerifyingKey) {
        self.entries.insert(id, key);
    }

    pub fn get(&self, id: &SensorId) -> Option<&VerifyingKey> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn decode_id(encoded: &str) -> Result<SensorId, SensorRegistryError> {
    let bytes = Base64::decode_vec(encoded).map_err(|_| SensorRegistryError::InvalidId {
        id: encoded.to_string(),
    })?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| SensorRegistryError::InvalidId {
            id: encoded.to_string(),
        })
}
