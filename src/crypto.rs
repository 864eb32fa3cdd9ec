// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! Standard cryptographic primitives used by the protocol.
//!
//! ECDSA is P-256 over SHA-256 with raw 64-byte `r ‖ s` signatures, matching
//! the sensor firmware. AES-256-GCM ciphertexts are framed as
//! `nonce[12] ‖ ciphertext ‖ tag[16]`. Keys are loaded from files at process
//! start; rotation is out of scope.

use std::path::Path;

use aes_gcm::{
    aead::{Aead, Payload},
    Aes256Gcm, KeyInit, Nonce,
};
use p256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::error::ProtocolError;
use crate::wire::SIGNATURE_BYTES;

/// AES-GCM nonce size in bytes.
const AES_NONCE_BYTES: usize = 12;
/// AES-GCM authentication tag size in bytes.
const AES_TAG_BYTES: usize = 16;
/// AES-256 key size in bytes.
pub const AES_KEY_BYTES: usize = 32;

/// Error type for key loading.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid key material in {path}: {reason}")]
    Invalid { path: String, reason: String },
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

// =============================================================================
// ECDSA
// =============================================================================

/// Sign `message` and return the raw 64-byte `r ‖ s` signature.
pub fn sign_payload(key: &SigningKey, message: &[u8]) -> [u8; SIGNATURE_BYTES] {
    let signature: Signature = key.sign(message);
    signature.to_bytes().into()
}

/// Verify a raw 64-byte signature over `message`.
pub fn verify_payload(key: &VerifyingKey, message: &[u8], signature: &[u8; SIGNATURE_BYTES]) -> bool {
    match Signature::from_slice(signature) {
        Ok(signature) => key.verify(message, &signature).is_ok(),
        Err(_) => false,
    }
}

/// Load a PKCS#8 PEM signing key from disk.
pub fn load_signing_key(path: &Path) -> Result<SigningKey, KeyError> {
    let pem = read_text(path)?;
    SigningKey::from_pkcs8_pem(&pem).map_err(|e| KeyError::Invalid {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Load a SubjectPublicKeyInfo PEM verifying key from disk.
pub fn load_verifying_key(path: &Path) -> Result<VerifyingKey, KeyError> {
    let pem = read_text(path)?;
    VerifyingKey::from_public_key_pem(&pem).map_err(|e| KeyError::Invalid {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn read_text(path: &Path) -> Result<String, KeyError> {
    std::fs::read_to_string(path).map_err(|source| KeyError::Io {
        path: path.display().to_string(),
        source,
    })
}

// =============================================================================
// AES-256-GCM
// =============================================================================

/// Symmetric key shared out-of-band between an appserver and the provider.
///
/// The provider holds a copy so it can open the appserver's encrypted token
/// commitments when adjudicating complaints. That sharing is a deployment
/// precondition of the protocol, not something this module decides.
#[derive(Clone)]
pub struct SymmetricKey {
    cipher: Aes256Gcm,
}

impl SymmetricKey {
    pub fn new(key: &[u8; AES_KEY_BYTES]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    /// Load a raw 32-byte key file.
    pub fn load(path: &Path) -> Result<Self, KeyError> {
        let bytes = std::fs::read(path).map_err(|source| KeyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let key: [u8; AES_KEY_BYTES] = bytes.as_slice().try_into().map_err(|_| KeyError::Invalid {
            path: path.display().to_string(),
            reason: format!("expected {AES_KEY_BYTES} bytes, got {}", bytes.len()),
        })?;
        Ok(Self::new(&key))
    }

    /// Encrypt to `nonce[12] ‖ ciphertext ‖ tag[16]` with a fresh nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut nonce = [0u8; AES_NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), Payload::from(plaintext))
            .expect("AES-GCM encryption is infallible for in-memory buffers");
        let mut out = Vec::with_capacity(AES_NONCE_BYTES + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        out
    }

    /// Open a `nonce ‖ ciphertext ‖ tag` frame. Any tampering fails the tag.
    pub fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if payload.len() < AES_NONCE_BYTES + AES_TAG_BYTES {
            return Err(ProtocolError::CiphertextInvalid);
        }
        let (nonce, sealed) = payload.split_at(AES_NONCE_BYTES);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), Payload::from(sealed))
            .map_err(|_| ProtocolError::CiphertextInvalid)
    }
}

/// Base64 rendering of opaque identifiers for log lines.
pub fn b64(data: &[u8]) -> String {
    use base64ct::{Base64, Encoding};
    Base64::encode_string(data)
}
