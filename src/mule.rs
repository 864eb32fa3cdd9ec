// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! Mule-side protocol state.
//!
//! A [`MuleSession`] tracks everything one mule accumulates across an epoch:
//! delivery tokens earned from handshakes, the signed evidence backing each
//! of them, and the complaint-token wallet. It builds and checks protocol
//! payloads only; moving bytes between parties is the caller's concern.

use std::collections::HashMap;

use p256::ecdsa::{SigningKey, VerifyingKey};

use crate::credential::{generate_token, PendingToken, PublicParams, Token};
use crate::crypto::{sha256, sign_payload, verify_payload};
use crate::error::ProtocolError;
use crate::provider::registry::AppServerId;
use crate::provider::MuleId;
use crate::wire::{
    ComplaintPayload, ComplaintRecord, HashPayload, IncorrectComplaintRecord,
    MissingComplaintRecord, NewEpochRequest, NewEpochResponse, SignedHashPayload,
    SignedPredeliveryPayload, SignedTokenPayload, TokenList, TokenRedemptionPayload,
    DATA_HASH_BYTES, SENSOR_ID_BYTES,
};

/// Sensor-side commitment over `(sensor_id, SHA256(data))`. The sensor signs
/// this once at capture time; the mule carries it to the appserver verbatim.
pub fn sensor_commitment(
    sensor_key: &SigningKey,
    sensor_id: [u8; SENSOR_ID_BYTES],
    raw_data: &[u8],
) -> SignedHashPayload {
    let payload = HashPayload {
        sensor_id,
        data_hash: sha256(raw_data),
    };
    let signature = sign_payload(sensor_key, &payload.encode());
    SignedHashPayload { payload, signature }
}

/// Everything retained about one delivery, keyed by data hash. The signed
/// predelivery is the proof of commitment; the released payload arrives only
/// if the appserver completes the handshake.
struct DeliveryEvidence {
    predelivery: SignedPredeliveryPayload,
    released: Option<SignedTokenPayload>,
}

pub struct MuleSession {
    mule_id: MuleId,
    appserver_id: AppServerId,
    appserver_key: VerifyingKey,
    delivery_params: PublicParams,
    complaint_params: PublicParams,
    tokens: Vec<Token>,
    complaint_tokens: Vec<Token>,
    evidence: HashMap<[u8; DATA_HASH_BYTES], DeliveryEvidence>,
}

impl MuleSession {
    pub fn new(
        mule_id: MuleId,
        appserver_id: AppServerId,
        appserver_key: VerifyingKey,
        delivery_params: PublicParams,
        complaint_params: PublicParams,
    ) -> Self {
        Self {
            mule_id,
            appserver_id,
            appserver_key,
            delivery_params,
            complaint_params,
            tokens: Vec::new(),
            complaint_tokens: Vec::new(),
            evidence: HashMap::new(),
        }
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn complaint_token_count(&self) -> usize {
        self.complaint_tokens.len()
    }

    // =========================================================================
    // Algorithm 2: delivery handshake, mule side
    // =========================================================================

    /// Check and retain the appserver's commitment for data the mule is
    /// carrying. The predelivery must be kept until the token it promises
    /// has been redeemed; it is the only admissible complaint evidence.
    pub fn accept_predelivery(
        &mut self,
        raw_data: &[u8],
        predelivery: SignedPredeliveryPayload,
    ) -> Result<(), ProtocolError> {
        if !verify_payload(
            &self.appserver_key,
            &predelivery.payload.encode(),
            &predelivery.signature,
        ) {
            return Err(ProtocolError::SignatureInvalid("predelivery payload"));
        }
        if predelivery.payload.data_hash != sha256(raw_data) {
            return Err(ProtocolError::SignatureInvalid("predelivery data hash"));
        }
        self.evidence.insert(
            predelivery.payload.data_hash,
            DeliveryEvidence {
                predelivery,
                released: None,
            },
        );
        Ok(())
    }

    /// Check the released token against the retained commitment and bank it.
    pub fn accept_token(&mut self, released: SignedTokenPayload) -> Result<(), ProtocolError> {
        if !verify_payload(
            &self.appserver_key,
            &released.payload.encode(),
            &released.signature,
        ) {
            return Err(ProtocolError::SignatureInvalid("token payload"));
        }
        let entry = self
            .evidence
            .get_mut(&released.payload.data_hash)
            .ok_or(ProtocolError::CommitmentExpired)?;
        if released.payload.nonce != entry.predelivery.payload.nonce {
            return Err(ProtocolError::SignatureInvalid("token nonce"));
        }
        self.tokens.push(released.payload.token);
        entry.released = Some(released);
        Ok(())
    }

    // =========================================================================
    // Algorithm 3: redemption, mule side
    // =========================================================================

    /// Drain the wallet into a redemption payload.
    pub fn redemption_payload(&mut self) -> TokenRedemptionPayload {
        TokenRedemptionPayload {
            mule_id: self.mule_id,
            tokens: TokenList::from_tokens(std::mem::take(&mut self.tokens)),
        }
    }

    // =========================================================================
    // Algorithm 4: complaints, mule side
    // =========================================================================

    /// Build a Type-0 complaint: the appserver released a record for this
    /// hash, and the mule contends the record is bad. Consumes one complaint
    /// token; the returned [`PendingToken`] unblinds the replacement.
    pub fn incorrect_record_complaint(
        &mut self,
        data_hash: &[u8; DATA_HASH_BYTES],
    ) -> Result<(ComplaintPayload, PendingToken), ProtocolError> {
        let entry = self
            .evidence
            .get(data_hash)
            .ok_or(ProtocolError::CommitmentExpired)?;
        let released = entry
            .released
            .clone()
            .ok_or(ProtocolError::CommitmentExpired)?;
        let record = ComplaintRecord::Incorrect(IncorrectComplaintRecord {
            signed_predelivery: entry.predelivery.clone(),
            signed_token: released,
        });
        self.build_complaint(record)
    }

    /// Build a Type-1 complaint: the mule delivered `raw_data` but the
    /// appserver withheld the promised token.
    pub fn missing_record_complaint(
        &mut self,
        raw_data: &[u8],
    ) -> Result<(ComplaintPayload, PendingToken), ProtocolError> {
        let data_hash = sha256(raw_data);
        let entry = self
            .evidence
            .get(&data_hash)
            .ok_or(ProtocolError::CommitmentExpired)?;
        let record = ComplaintRecord::Missing(MissingComplaintRecord {
            signed_predelivery: entry.predelivery.clone(),
            raw_data: raw_data.to_vec(),
        });
        self.build_complaint(record)
    }

    fn build_complaint(
        &mut self,
        record: ComplaintRecord,
    ) -> Result<(ComplaintPayload, PendingToken), ProtocolError> {
        let complaint_token = self.complaint_tokens.pop().ok_or_else(|| {
            ProtocolError::CredentialExhausted("no complaint tokens left this epoch".into())
        })?;
        let (pending, blinded_token) = generate_token(&self.delivery_params)
            .map_err(|_| ProtocolError::CredentialInvalid("replacement blinding"))?;
        Ok((
            ComplaintPayload {
                complaint_token,
                blinded_token,
                appserver_id: self.appserver_id,
                record,
            },
            pending,
        ))
    }

    /// Unblind a replacement token issued for a complaint and bank it.
    pub fn accept_replacement(
        &mut self,
        pending: PendingToken,
        signed: &[u8],
    ) -> Result<(), ProtocolError> {
        let frame = signed
            .try_into()
            .map_err(|_| ProtocolError::CredentialInvalid("replacement frame"))?;
        let token = pending
            .unblind(&self.delivery_params, frame)
            .map_err(|_| ProtocolError::CredentialInvalid("replacement token"))?;
        self.tokens.push(token);
        Ok(())
    }

    // =========================================================================
    // Algorithm 5: epoch rotation, mule side
    // =========================================================================

    /// Blind a batch of fresh complaint-token seeds for the coming epoch.
    pub fn new_epoch_request(
        &self,
        count: usize,
    ) -> Result<(NewEpochRequest, Vec<PendingToken>), ProtocolError> {
        let mut pendings = Vec::with_capacity(count);
        let mut blinded = Vec::with_capacity(count);
        for _ in 0..count {
            let (pending, frame) = generate_token(&self.complaint_params)
                .map_err(|_| ProtocolError::CredentialInvalid("complaint blinding"))?;
            pendings.push(pending);
            blinded.push(frame);
        }
        Ok((
            NewEpochRequest {
                mule_id: self.mule_id,
                blinded_tokens: TokenList::from_blinded(blinded),
            },
            pendings,
        ))
    }

    /// Unblind the epoch's complaint tokens into the wallet and surface the
    /// duplicate evidence the provider holds against this mule.
    pub fn accept_new_epoch(
        &mut self,
        pendings: Vec<PendingToken>,
        response: &NewEpochResponse,
    ) -> Result<TokenList, ProtocolError> {
        if response.signed_tokens.len() != pendings.len() {
            return Err(ProtocolError::CredentialInvalid("epoch batch size"));
        }
        for (pending, item) in pendings.into_iter().zip(response.signed_tokens.items()) {
            let frame = item
                .as_slice()
                .try_into()
                .map_err(|_| ProtocolError::CredentialInvalid("epoch token frame"))?;
            let token = pending
                .unblind(&self.complaint_params, &frame)
                .map_err(|_| ProtocolError::CredentialInvalid("epoch token"))?;
            self.complaint_tokens.push(token);
        }
        Ok(response.duplicate_tokens.clone())
    }
}

#[cfg(test)]
mod tests;
