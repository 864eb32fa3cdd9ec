// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! Provider: token issuance, at-most-once redemption, complaint
//! adjudication, and epoch rotation.
//!
//! All provider state is owned by the [`Provider`] struct and injected into
//! request handlers; the only members mutated concurrently across requests
//! are the dedup ledgers and the account book, and both are safe for that.

pub mod api;
pub mod registry;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::credential::{Keypair, PublicParams, SignedBlindedToken, Token};
use crate::crypto::{b64, sha256, verify_payload};
use crate::dedup::DedupStore;
use crate::error::ProtocolError;
use crate::transport::ComplaintRelay;
use crate::wire::{
    ComplaintPayload, ComplaintRecord, NewEpochRequest, NewEpochResponse, TokenList,
    TokenRedemptionPayload, BLINDED_TOKEN_BYTES, MULE_ID_BYTES, TOKEN_BYTES,
};

pub use registry::{AppServerInfo, AppServerRegistry};

pub type MuleId = [u8; MULE_ID_BYTES];

/// Ledger value marking a token invalidated through the complaint path,
/// where no redeeming mule exists. Distinguished from redemption entries by
/// length (owner entries are always 16 bytes).
const SPENT_BY_COMPLAINT: &[u8] = b"";

/// Per-mule accounting: redemption credits plus accumulated duplicate-fraud
/// evidence, drained at epoch rotation.
#[derive(Default)]
struct AccountBook {
    credits: HashMap<MuleId, i64>,
    duplicate_evidence: HashMap<MuleId, Vec<Token>>,
}

impl AccountBook {
    fn credit(&mut self, mule_id: MuleId, delta: i64) {
        *self.credits.entry(mule_id).or_insert(0) += delta;
    }

    fn record_duplicate(&mut self, mule_id: MuleId, token: Token) {
        self.duplicate_evidence.entry(mule_id).or_default().push(token);
    }

    fn drain_evidence(&mut self, mule_id: &MuleId) -> Vec<Token> {
        self.duplicate_evidence.remove(mule_id).unwrap_or_default()
    }
}

/// The redemption ledgers, split by namespace. Delivery tokens and
/// complaint tokens never share a store.
pub struct ProviderLedgers {
    /// Redeemed delivery tokens → owning mule id.
    pub tokens: Arc<dyn DedupStore>,
    /// Used complaint tokens (anti-spam, one complaint per token).
    pub complaint_tokens: Arc<dyn DedupStore>,
    /// Delivery tokens with an already-adjudicated Type-0 complaint.
    pub complaint_duplicates: Arc<dyn DedupStore>,
}

pub struct Provider<R: ComplaintRelay> {
    delivery_keys: Keypair,
    complaint_keys: Keypair,
    appservers: AppServerRegistry,
    ledgers: ProviderLedgers,
    accounts: Mutex<AccountBook>,
    relay: R,
}

/// Result of a complaint adjudication: either a blind-signed replacement
/// token, or an intentionally empty (non-error) response for duplicate
/// Type-0 complaints.
pub enum ComplaintOutcome {
    Replacement(SignedBlindedToken),
    AlreadyCompensated,
}

impl<R: ComplaintRelay> Provider<R> {
    pub fn new(
        delivery_keys: Keypair,
        complaint_keys: Keypair,
        appservers: AppServerRegistry,
        ledgers: ProviderLedgers,
        relay: R,
    ) -> Self {
        Self {
            delivery_keys,
            complaint_keys,
            appservers,
            ledgers,
            accounts: Mutex::new(AccountBook::default()),
            relay,
        }
    }

    // =========================================================================
    // Algorithm 1: token purchase
    // =========================================================================

    /// Public parameters of the delivery-token keypair. No side effects.
    pub fn public_params(&self) -> PublicParams {
        self.delivery_keys.public_params()
    }

    /// Public parameters of the complaint-token keypair. No side effects.
    pub fn complaint_public_params(&self) -> PublicParams {
        self.complaint_keys.public_params()
    }

    /// Blind-sign a batch of blinded delivery tokens. Purely a per-element
    /// transform; the provider never sees the unblinded values.
    pub fn sign_tokens(&self, blinded: &TokenList) -> Result<TokenList, ProtocolError> {
        sign_batch(&self.delivery_keys, blinded)
    }

    // =========================================================================
    // Algorithm 3: token redemption
    // =========================================================================

    /// Redeem a batch of tokens for a mule. Returns the tokens that failed
    /// primitive verification (a diagnostic for the caller, not an error).
    ///
    /// Each valid token is inserted into the token ledger exactly once: the
    /// first redeeming mule is credited; any later submission is flagged as
    /// a duplicate, debits the original owner, and credits nobody.
    pub fn redeem_tokens(
        &self,
        payload: &TokenRedemptionPayload,
    ) -> Result<TokenList, ProtocolError> {
        if payload.tokens.width() != TOKEN_BYTES && !payload.tokens.is_empty() {
            return Err(ProtocolError::Codec(crate::wire::CodecError::Length {
                message: "redemption token",
                expected: TOKEN_BYTES,
                actual: payload.tokens.width(),
            }));
        }
        let mule_id = payload.mule_id;

        let mut valid: Vec<Token> = Vec::new();
        let mut invalid: Vec<Token> = Vec::new();
        for item in payload.tokens.items() {
            let token: Token = item.as_slice().try_into().expect("width checked above");
            if self.delivery_keys.verify_token(&token) {
                valid.push(token);
            } else {
                invalid.push(token);
            }
        }

        let keys: Vec<&[u8]> = valid.iter().map(|t| t.as_slice()).collect();
        let priors = self
            .ledgers
            .tokens
            .insert_batch(&keys, &mule_id)
            .map_err(|e| ProtocolError::Store(e.to_string()))?;

        let mut fresh = 0i64;
        let mut accounts = self.accounts.lock().expect("account book poisoned");
        for (token, prior) in valid.iter().zip(priors) {
            match prior.as_deref() {
                None => fresh += 1,
                Some(prior) if prior == mule_id.as_slice() => {
                    // The same mule resubmitted its own token: no credit,
                    // but nobody else to debit.
                    accounts.record_duplicate(mule_id, *token);
                }
                Some(prior) => {
                    accounts.record_duplicate(mule_id, *token);
                    if let Ok(owner) = MuleId::try_from(prior) {
                        accounts.credit(owner, -1);
                        accounts.record_duplicate(owner, *token);
                    }
                    // Entries shorter than a mule id were invalidated via a
                    // complaint; there is no owner to debit.
                }
            }
        }
        accounts.credit(mule_id, fresh);
        drop(accounts);

        info!(
            mule = %b64(&mule_id),
            valid = valid.len(),
            invalid = invalid.len(),
            credited = fresh,
            "redeemed token batch"
        );
        Ok(TokenList::from_tokens(invalid))
    }

    /// Current credit balance for a mule.
    pub fn credit_of(&self, mule_id: &MuleId) -> i64 {
        self.accounts
            .lock()
            .expect("account book poisoned")
            .credits
            .get(mule_id)
            .copied()
            .unwrap_or(0)
    }

    // =========================================================================
    // Algorithm 4: complaints
    // =========================================================================

    /// Adjudicate a complaint without learning which delivery transaction
    /// (or which mule) is involved.
    pub async fn complain(
        &self,
        complaint: &ComplaintPayload,
    ) -> Result<ComplaintOutcome, ProtocolError> {
        // One complaint per complaint token, enforced in its own namespace.
        if !self.complaint_keys.verify_token(&complaint.complaint_token) {
            return Err(ProtocolError::CredentialInvalid("complaint token"));
        }
        let prior = self
            .ledgers
            .complaint_tokens
            .insert_if_absent(&complaint.complaint_token, b"used")
            .map_err(|e| ProtocolError::Store(e.to_string()))?;
        if prior.is_some() {
            return Err(ProtocolError::ReplayDetected("complaint token"));
        }

        let appserver = self.appservers.get(&complaint.appserver_id).ok_or_else(|| {
            ProtocolError::UnknownPrincipal(format!("appserver {}", b64(&complaint.appserver_id)))
        })?;

        let signed_predelivery = match &complaint.record {
            ComplaintRecord::Incorrect(record) => &record.signed_predelivery,
            ComplaintRecord::Missing(record) => &record.signed_predelivery,
        };

        // The signed predelivery is the proof the appserver committed to a
        // token for this hash.
        let predelivery_bytes = signed_predelivery.payload.encode();
        if !verify_payload(
            &appserver.verifying_key,
            &predelivery_bytes,
            &signed_predelivery.signature,
        ) {
            return Err(ProtocolError::SignatureInvalid("predelivery payload"));
        }

        let decrypted = appserver
            .symmetric_key
            .decrypt(&signed_predelivery.payload.encrypted_token)?;
        let committed_token: Option<Token> = decrypted
            .as_slice()
            .try_into()
            .ok()
            .filter(|t| self.delivery_keys.verify_token(t));

        let Some(committed_token) = committed_token else {
            // The appserver committed to a token that does not verify: the
            // appserver is at fault, compensate the mule.
            warn!(
                appserver = %b64(&complaint.appserver_id),
                "complaint: committed token failed verification, issuing replacement"
            );
            return self.issue_replacement(&complaint.blinded_token);
        };

        // Invalidate the committed token so it cannot also be redeemed.
        let spent_prior = self
            .ledgers
            .tokens
            .insert_if_absent(&committed_token, SPENT_BY_COMPLAINT)
            .map_err(|e| ProtocolError::Store(e.to_string()))?;
        if let Some(prior) = spent_prior {
            let redeemed = prior.len() == MULE_ID_BYTES;
            // A token already redeemed by some mule supports no complaint at
            // all. A token already marked through a previous complaint can
            // still reach the Type-0 duplicate ledger below, which is what
            // produces the empty response for the second complainant.
            if redeemed || matches!(complaint.record, ComplaintRecord::Missing(_)) {
                return Err(ProtocolError::ReplayDetected("delivery token"));
            }
        }

        match &complaint.record {
            ComplaintRecord::Incorrect(record) => {
                let token_bytes = record.signed_token.payload.encode();
                if !verify_payload(
                    &appserver.verifying_key,
                    &token_bytes,
                    &record.signed_token.signature,
                ) {
                    return Err(ProtocolError::SignatureInvalid("token payload"));
                }

                let released = record.signed_token.payload.token;
                if released != committed_token || !self.delivery_keys.verify_token(&released) {
                    // The appserver released a token that differs from its
                    // own commitment: at fault.
                    warn!(
                        appserver = %b64(&complaint.appserver_id),
                        "complaint: released token mismatches commitment, issuing replacement"
                    );
                    return self.issue_replacement(&complaint.blinded_token);
                }

                let already = self
                    .ledgers
                    .complaint_duplicates
                    .insert_if_absent(&released, b"complained")
                    .map_err(|e| ProtocolError::Store(e.to_string()))?;
                if already.is_some() {
                    info!("complaint: duplicate token already compensated, empty response");
                    return Ok(ComplaintOutcome::AlreadyCompensated);
                }
            }
            ComplaintRecord::Missing(record) => {
                if sha256(&record.raw_data) != signed_predelivery.payload.data_hash {
                    return Err(ProtocolError::SignatureInvalid("complaint data hash"));
                }
                // Force completion: hand the withheld data to the appserver.
                // The complaint token and the committed token are already
                // burned, so compensation cannot hinge on the relay call; a
                // failed push only means the appserver never gets the data.
                info!(
                    appserver = %b64(&complaint.appserver_id),
                    url = %appserver.url,
                    "complaint: forwarding withheld data to appserver"
                );
                if let Err(e) = self.relay.forward_data(&appserver.url, &record.raw_data).await {
                    warn!(
                        appserver = %b64(&complaint.appserver_id),
                        error = %e,
                        "complaint: data relay failed, issuing replacement anyway"
                    );
                }
            }
        }

        self.issue_replacement(&complaint.blinded_token)
    }

    fn issue_replacement(
        &self,
        blinded: &[u8; BLINDED_TOKEN_BYTES],
    ) -> Result<ComplaintOutcome, ProtocolError> {
        let signed = self
            .delivery_keys
            .sign_token(blinded)
            .map_err(|_| ProtocolError::CredentialInvalid("blinded replacement token"))?;
        Ok(ComplaintOutcome::Replacement(signed))
    }

    // =========================================================================
    // Algorithm 5: epoch rotation
    // =========================================================================

    /// Blind-sign a fresh batch of complaint tokens for a mule and drain its
    /// accumulated duplicate evidence. The evidence is delivered exactly
    /// once, then cleared.
    pub fn new_epoch(&self, request: &NewEpochRequest) -> Result<NewEpochResponse, ProtocolError> {
        let signed_tokens = sign_batch(&self.complaint_keys, &request.blinded_tokens)?;

        let evidence = self
            .accounts
            .lock()
            .expect("account book poisoned")
            .drain_evidence(&request.mule_id);

        info!(
            mule = %b64(&request.mule_id),
            complaint_tokens = signed_tokens.len(),
            duplicates = evidence.len(),
            "rotated epoch"
        );
        Ok(NewEpochResponse {
            signed_tokens,
            duplicate_tokens: TokenList::from_tokens(evidence),
        })
    }
}

fn sign_batch(keys: &Keypair, blinded: &TokenList) -> Result<TokenList, ProtocolError> {
    if blinded.width() != BLINDED_TOKEN_BYTES && !blinded.is_empty() {
        return Err(ProtocolError::Codec(crate::wire::CodecError::Length {
            message: "blinded token",
            expected: BLINDED_TOKEN_BYTES,
            actual: blinded.width(),
        }));
    }
    let mut signed = Vec::with_capacity(blinded.len());
    for item in blinded.items() {
        let frame: [u8; BLINDED_TOKEN_BYTES] =
            item.as_slice().try_into().expect("width checked above");
        signed.push(
            keys.sign_token(&frame)
                .map_err(|_| ProtocolError::CredentialInvalid("blinded token"))?,
        );
    }
    Ok(TokenList::from_blinded(signed))
}
