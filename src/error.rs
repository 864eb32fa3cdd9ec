// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! Protocol error taxonomy.
//!
//! Every failure is scoped to one transaction; nothing here is fatal to the
//! process. Validation failures are rejected with no partial state mutation,
//! so handlers can surface these directly.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::wire::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Sensor or appserver id is not registered.
    #[error("unknown principal: {0}")]
    UnknownPrincipal(String),

    /// An ECDSA signature failed verification.
    #[error("invalid signature over {0}")]
    SignatureInvalid(&'static str),

    /// A data hash or token was already seen.
    #[error("replay detected: {0}")]
    ReplayDetected(&'static str),

    /// Data arrived with no matching pending delivery.
    #[error("no pending delivery for this data hash")]
    CommitmentExpired,

    /// A token failed credential-primitive verification.
    #[error("credential failed verification: {0}")]
    CredentialInvalid(&'static str),

    /// The local token pool is empty and replenishment failed.
    #[error("token pool exhausted: {0}")]
    CredentialExhausted(String),

    /// AES-GCM decryption failed (tag mismatch or malformed ciphertext).
    #[error("ciphertext failed to authenticate")]
    CiphertextInvalid,

    /// A wire payload failed to decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Dedup-store backend failure.
    #[error("dedup store error: {0}")]
    Store(String),

    /// A peer call failed or returned a non-2xx status.
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
}

impl ProtocolError {
    /// Stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            ProtocolError::UnknownPrincipal(_) => "unknown_principal",
            ProtocolError::SignatureInvalid(_) => "signature_invalid",
            ProtocolError::ReplayDetected(_) => "replay_detected",
            ProtocolError::CommitmentExpired => "commitment_expired",
            ProtocolError::CredentialInvalid(_) => "credential_invalid",
            ProtocolError::CredentialExhausted(_) => "credential_exhausted",
            ProtocolError::CiphertextInvalid => "ciphertext_invalid",
            ProtocolError::Codec(_) => "malformed_payload",
            ProtocolError::Store(_) => "store_error",
            ProtocolError::Transport(_) => "transport_error",
        }
    }

    /// HTTP status for this error. Callers treat any non-2xx as failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProtocolError::UnknownPrincipal(_) => StatusCode::NOT_FOUND,
            ProtocolError::SignatureInvalid(_) => StatusCode::UNAUTHORIZED,
            ProtocolError::ReplayDetected(_) => StatusCode::CONFLICT,
            ProtocolError::CommitmentExpired => StatusCode::GONE,
            ProtocolError::CredentialInvalid(_)
            | ProtocolError::CiphertextInvalid
            | ProtocolError::Codec(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ProtocolError::CredentialExhausted(_) | ProtocolError::Transport(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProtocolError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.to_string(),
            error_code: self.error_code(),
        });
        (self.status_code(), body).into_response()
    }
}
