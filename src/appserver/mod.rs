// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! AppServer: the two-phase commit-then-reveal delivery handshake.
//!
//! State machine per data item: `NoCommit → HashCommitted → Delivered`.
//! A hash commit atomically reserves exactly one token; the matching data
//! delivery consumes the reservation exactly once and releases the token in
//! the clear. Abandoned reservations are evicted after a TTL and their
//! tokens returned to the pool.

pub mod api;
pub mod sensors;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use p256::ecdsa::SigningKey;
use rand::{rngs::OsRng, RngCore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credential::{generate_token, PendingToken, PublicParams, Token};
use crate::crypto::{b64, sha256, sign_payload, verify_payload, SymmetricKey};
use crate::dedup::DedupStore;
use crate::error::ProtocolError;
use crate::transport::ProviderEndpoint;
use crate::wire::{
    PredeliveryPayload, SignedHashPayload, SignedPredeliveryPayload, SignedTokenPayload,
    TokenList, TokenPayload, DATA_HASH_BYTES, NONCE_BYTES,
};

pub use sensors::SensorRegistry;

/// Tunables for one appserver process.
#[derive(Clone)]
pub struct AppServerConfig {
    /// Tokens purchased from the provider per replenishment round.
    pub token_batch_size: usize,
    /// How long an unconsumed hash commitment may hold a token.
    pub pending_ttl: Duration,
}

impl Default for AppServerConfig {
    fn default() -> Self {
        Self {
            token_batch_size: 10,
            pending_ttl: Duration::from_secs(300),
        }
    }
}

/// One reserved-but-undelivered commitment.
struct PendingDelivery {
    nonce: [u8; NONCE_BYTES],
    token: Token,
    created_at: Instant,
}

pub struct AppServer<P: ProviderEndpoint> {
    signing_key: SigningKey,
    symmetric_key: SymmetricKey,
    sensors: SensorRegistry,
    provider: P,
    params: tokio::sync::OnceCell<PublicParams>,
    pool: Mutex<Vec<Token>>,
    seen_hashes: Arc<dyn DedupStore>,
    pending: Mutex<HashMap<[u8; DATA_HASH_BYTES], PendingDelivery>>,
    config: AppServerConfig,
}

impl<P: ProviderEndpoint> AppServer<P> {
    pub fn new(
        signing_key: SigningKey,
        symmetric_key: SymmetricKey,
        sensors: SensorRegistry,
        seen_hashes: Arc<dyn DedupStore>,
        provider: P,
        config: AppServerConfig,
    ) -> Self {
        Self {
            signing_key,
            symmetric_key,
            sensors,
            provider,
            params: tokio::sync::OnceCell::new(),
            pool: Mutex::new(Vec::new()),
            seen_hashes,
            pending: Mutex::new(HashMap::new()),
            config,
        }
    }

    // =========================================================================
    // Algorithm 2(a): hash commit
    // =========================================================================

    /// Accept a signed hash commitment and answer with a signed predelivery
    /// payload carrying an encrypted token.
    ///
    /// The replay check and the reservation are a single atomic
    /// `insert_if_absent` on the seen-hash store, so two concurrent commits
    /// for the same hash reserve exactly one token.
    pub async fn deliver_hash(
        &self,
        signed_hash: &SignedHashPayload,
    ) -> Result<SignedPredeliveryPayload, ProtocolError> {
        let sensor_id = signed_hash.payload.sensor_id;
        let data_hash = signed_hash.payload.data_hash;

        let sensor_key = self.sensors.get(&sensor_id).ok_or_else(|| {
            ProtocolError::UnknownPrincipal(format!("sensor {}", b64(&sensor_id)))
        })?;
        if !verify_payload(sensor_key, &signed_hash.payload.encode(), &signed_hash.signature) {
            return Err(ProtocolError::SignatureInvalid("hash payload"));
        }

        // Draw the token before burning the hash slot, so an exhausted pool
        // leaves no partial state behind.
        let token = self.draw_token().await?;
        let prior = match self.seen_hashes.insert_if_absent(&data_hash, b"") {
            Ok(prior) => prior,
            Err(e) => {
                self.pool.lock().expect("token pool poisoned").push(token);
                return Err(ProtocolError::Store(e.to_string()));
            }
        };
        if prior.is_some() {
            self.pool.lock().expect("token pool poisoned").push(token);
            warn!(data_hash = %b64(&data_hash), "hash commitment replayed");
            return Err(ProtocolError::ReplayDetected("data hash"));
        }

        let mut nonce = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);
        self.pending.lock().expect("pending map poisoned").insert(
            data_hash,
            PendingDelivery {
                nonce,
                token,
                created_at: Instant::now(),
            },
        );

        let payload = PredeliveryPayload {
            nonce,
            data_hash,
            encrypted_token: self.symmetric_key.encrypt(&token),
        };
        let signature = sign_payload(&self.signing_key, &payload.encode());
        info!(data_hash = %b64(&data_hash), "hash commitment accepted, token reserved");
        Ok(SignedPredeliveryPayload { payload, signature })
    }

    // =========================================================================
    // Algorithm 2(b): data delivery
    // =========================================================================

    /// Accept the raw data matching an earlier commitment and release the
    /// reserved token in the clear. The pending entry is consumed exactly
    /// once; a second delivery of the same data finds nothing.
    pub fn deliver_data(&self, raw_data: &[u8]) -> Result<SignedTokenPayload, ProtocolError> {
        let data_hash = sha256(raw_data);
        let entry = self
            .pending
            .lock()
            .expect("pending map poisoned")
            .remove(&data_hash)
            .ok_or(ProtocolError::CommitmentExpired)?;

        // The payload is now ours to use.
        info!(
            data_hash = %b64(&data_hash),
            bytes = raw_data.len(),
            "data delivered, releasing token"
        );

        let payload = TokenPayload {
            nonce: entry.nonce,
            token: entry.token,
            data_hash,
        };
        let signature = sign_payload(&self.signing_key, &payload.encode());
        Ok(SignedTokenPayload { payload, signature })
    }

    // =========================================================================
    // Algorithm 4(c): complaint data
    // =========================================================================

    /// Accept data relayed by the provider while adjudicating a missing-record
    /// complaint. Any matching reservation is consumed without releasing its
    /// token: the provider already compensated the mule with a replacement.
    pub fn deliver_complaint_data(&self, raw_data: &[u8]) {
        let data_hash = sha256(raw_data);
        let consumed = self
            .pending
            .lock()
            .expect("pending map poisoned")
            .remove(&data_hash)
            .is_some();
        info!(
            data_hash = %b64(&data_hash),
            bytes = raw_data.len(),
            consumed_reservation = consumed,
            "complaint data received"
        );
    }

    // =========================================================================
    // Token pool
    // =========================================================================

    async fn draw_token(&self) -> Result<Token, ProtocolError> {
        if let Some(token) = self.pool.lock().expect("token pool poisoned").pop() {
            return Ok(token);
        }

        let fresh = self.purchase_tokens(self.config.token_batch_size).await?;
        debug!(count = fresh.len(), "replenished token pool");
        let mut pool = self.pool.lock().expect("token pool poisoned");
        pool.extend(fresh);
        pool.pop().ok_or_else(|| {
            ProtocolError::CredentialExhausted("replenishment returned no tokens".into())
        })
    }

    /// Algorithm 1, client side: blind, have the provider sign, unblind.
    async fn purchase_tokens(&self, count: usize) -> Result<Vec<Token>, ProtocolError> {
        let params = self
            .params
            .get_or_try_init(|| self.provider.fetch_public_params())
            .await?
            .clone();

        let mut pendings: Vec<PendingToken> = Vec::with_capacity(count);
        let mut blinded = Vec::with_capacity(count);
        for _ in 0..count {
            let (pending, frame) = generate_token(&params).map_err(|e| {
                ProtocolError::CredentialExhausted(format!("token generation failed: {e}"))
            })?;
            pendings.push(pending);
            blinded.push(frame);
        }

        let signed = self
            .provider
            .sign_tokens(TokenList::from_blinded(blinded))
            .await?;
        if signed.len() != pendings.len() {
            return Err(ProtocolError::CredentialExhausted(format!(
                "provider signed {} of {} tokens",
                signed.len(),
                pendings.len()
            )));
        }

        pendings
            .into_iter()
            .zip(signed.items())
            .map(|(pending, frame)| {
                let frame = frame.as_slice().try_into().map_err(|_| {
                    ProtocolError::CredentialExhausted("malformed signed token frame".into())
                })?;
                pending.unblind(&params, &frame).map_err(|e| {
                    ProtocolError::CredentialExhausted(format!("unblinding failed: {e}"))
                })
            })
            .collect()
    }

    pub fn pool_size(&self) -> usize {
        self.pool.lock().expect("token pool poisoned").len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending map poisoned").len()
    }

    // =========================================================================
    // Reservation eviction
    // =========================================================================

    /// Drop reservations older than the TTL and return their tokens to the
    /// pool. The seen-hash entry stays: a replayed commit is still a replay.
    pub fn evict_expired(&self) -> usize {
        let ttl = self.config.pending_ttl;
        let mut reclaimed = Vec::new();
        {
            let mut pending = self.pending.lock().expect("pending map poisoned");
            pending.retain(|data_hash, entry| {
                if entry.created_at.elapsed() <= ttl {
                    return true;
                }
                debug!(data_hash = %b64(data_hash), "evicting expired reservation");
                reclaimed.push(entry.token);
                false
            });
        }
        let evicted = reclaimed.len();
        if evicted > 0 {
            self.pool
                .lock()
                .expect("token pool poisoned")
                .extend(reclaimed);
            info!(evicted, "returned expired reservation tokens to the pool");
        }
        evicted
    }
}

/// Periodic eviction of abandoned reservations until cancelled.
pub fn spawn_eviction_task<P: ProviderEndpoint + 'static>(
    appserver: Arc<AppServer<P>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let period = (appserver.config.pending_ttl / 2).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    appserver.evict_expired();
                }
            }
        }
    })
}
