// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! End-to-end exercises of the whole economy: sensor, appserver, mule, and
//! provider wired together in process.

use std::future::Future;
use std::sync::{Arc, Mutex};

use p256::ecdsa::SigningKey;
use rand::rngs::OsRng;

use super::*;
use crate::appserver::{AppServer, AppServerConfig, SensorRegistry};
use crate::credential::Keypair;
use crate::crypto::{sign_payload, SymmetricKey};
use crate::dedup::memory::MemoryDedupStore;
use crate::provider::{
    AppServerInfo, AppServerRegistry, ComplaintOutcome, Provider, ProviderLedgers,
};
use crate::transport::ProviderEndpoint;
use crate::wire::{SignedHashPayload, APPSERVER_ID_BYTES, SENSOR_ID_BYTES};

const SENSOR_ID: [u8; SENSOR_ID_BYTES] = [0x51; SENSOR_ID_BYTES];
const APPSERVER_ID: [u8; APPSERVER_ID_BYTES] = [0x07; APPSERVER_ID_BYTES];
const MULE_ID: MuleId = [0xA1; 16];
const MULE_B: MuleId = [0xB2; 16];
const AES_KEY: [u8; 32] = [0x42; 32];

/// Captures what the provider would push back to the appserver during a
/// missing-record complaint.
#[derive(Clone, Default)]
struct RecordingRelay {
    forwarded: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl crate::transport::ComplaintRelay for RecordingRelay {
    fn forward_data(
        &self,
        _appserver_url: &str,
        data: &[u8],
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send {
        self.forwarded.lock().unwrap().push(data.to_vec());
        async { Ok(()) }
    }
}

/// In-process provider endpoint for the appserver's token purchases.
struct DirectEndpoint {
    provider: Arc<Provider<RecordingRelay>>,
}

impl ProviderEndpoint for DirectEndpoint {
    fn fetch_public_params(
        &self,
    ) -> impl Future<Output = Result<PublicParams, ProtocolError>> + Send {
        let params = self.provider.public_params();
        async move { Ok(params) }
    }

    fn sign_tokens(
        &self,
        blinded: TokenList,
    ) -> impl Future<Output = Result<TokenList, ProtocolError>> + Send {
        let result = self.provider.sign_tokens(&blinded);
        async move { result }
    }
}

struct World {
    provider: Arc<Provider<RecordingRelay>>,
    appserver: Arc<AppServer<DirectEndpoint>>,
    sensor_key: SigningKey,
    appserver_key: SigningKey,
    relay: RecordingRelay,
    mule: MuleSession,
}

fn world() -> World {
    let appserver_key = SigningKey::random(&mut OsRng);
    let sensor_key = SigningKey::random(&mut OsRng);
    let relay = RecordingRelay::default();

    let mut appservers = AppServerRegistry::new();
    appservers.insert(
        APPSERVER_ID,
        AppServerInfo {
            verifying_key: *appserver_key.verifying_key(),
            url: "http://appserver".into(),
            symmetric_key: SymmetricKey::new(&AES_KEY),
        },
    );
    let provider = Arc::new(Provider::new(
        Keypair::generate().unwrap(),
        Keypair::generate().unwrap(),
        appservers,
        ProviderLedgers {
            tokens: Arc::new(MemoryDedupStore::new()),
            complaint_tokens: Arc::new(MemoryDedupStore::new()),
            complaint_duplicates: Arc::new(MemoryDedupStore::new()),
        },
        relay.clone(),
    ));

    let mut sensors = SensorRegistry::new();
    sensors.insert(SENSOR_ID, *sensor_key.verifying_key());
    let appserver = Arc::new(AppServer::new(
        appserver_key.clone(),
        SymmetricKey::new(&AES_KEY),
        sensors,
        Arc::new(MemoryDedupStore::new()),
        DirectEndpoint {
            provider: Arc::clone(&provider),
        },
        AppServerConfig::default(),
    ));

    let mule = MuleSession::new(
        MULE_ID,
        APPSERVER_ID,
        *appserver_key.verifying_key(),
        provider.public_params(),
        provider.complaint_public_params(),
    );

    World {
        provider,
        appserver,
        sensor_key,
        appserver_key,
        relay,
        mule,
    }
}

impl World {
    fn sensor_commit(&self, data: &[u8]) -> SignedHashPayload {
        sensor_commitment(&self.sensor_key, SENSOR_ID, data)
    }

    /// Run the full two-phase handshake for `data` and bank the token.
    async fn deliver(&mut self, data: &[u8]) {
        let predelivery = self
            .appserver
            .deliver_hash(&self.sensor_commit(data))
            .await
            .unwrap();
        self.mule.accept_predelivery(data, predelivery).unwrap();
        let released = self.appserver.deliver_data(data).unwrap();
        self.mule.accept_token(released).unwrap();
    }

    /// Rotate the mule into a new epoch with `count` complaint tokens.
    fn rotate_epoch(&mut self, count: usize) -> TokenList {
        let (request, pendings) = self.mule.new_epoch_request(count).unwrap();
        let response = self.provider.new_epoch(&request).unwrap();
        self.mule.accept_new_epoch(pendings, &response).unwrap()
    }
}

#[tokio::test]
async fn delivery_earns_exactly_one_credit() {
    let mut w = world();
    let data = vec![0xAB; 512];

    w.deliver(&data).await;
    assert_eq!(w.mule.token_count(), 1);

    let payload = w.mule.redemption_payload();
    assert_eq!(w.mule.token_count(), 0);
    let invalid = w.provider.redeem_tokens(&payload).unwrap();
    assert!(invalid.is_empty());
    assert_eq!(w.provider.credit_of(&MULE_ID), 1);
}

#[tokio::test]
async fn stolen_token_debits_the_thief_flags_the_victim() {
    let mut w = world();
    let data = vec![0xCD; 512];
    w.deliver(&data).await;

    // Another mule overhears the released token and redeems it first.
    let stolen = w.mule.redemption_payload();
    let thief_payload = crate::wire::TokenRedemptionPayload {
        mule_id: MULE_B,
        tokens: stolen.tokens.clone(),
    };
    w.provider.redeem_tokens(&thief_payload).unwrap();
    w.provider.redeem_tokens(&stolen).unwrap();

    // First writer won; the duplicate wiped the thief's head start.
    assert_eq!(w.provider.credit_of(&MULE_B), 0);
    assert_eq!(w.provider.credit_of(&MULE_ID), 0);
}

#[tokio::test]
async fn withheld_token_is_recovered_by_complaint() {
    let mut w = world();
    let data = vec![0xEF; 512];

    // Phase one happens, then the appserver goes silent.
    let predelivery = w
        .appserver
        .deliver_hash(&w.sensor_commit(&data))
        .await
        .unwrap();
    let committed = SymmetricKey::new(&AES_KEY)
        .decrypt(&predelivery.payload.encrypted_token)
        .unwrap();
    w.mule.accept_predelivery(&data, predelivery).unwrap();

    let duplicates = w.rotate_epoch(2);
    assert!(duplicates.is_empty());
    assert_eq!(w.mule.complaint_token_count(), 2);

    let (complaint, pending) = w.mule.missing_record_complaint(&data).unwrap();
    let ComplaintOutcome::Replacement(signed) = w.provider.complain(&complaint).await.unwrap()
    else {
        panic!("expected a replacement token");
    };
    w.mule.accept_replacement(pending, &signed).unwrap();
    assert_eq!(w.mule.token_count(), 1);
    assert_eq!(w.mule.complaint_token_count(), 1);

    // The provider pushed the withheld data through to the appserver.
    let forwarded = w.relay.forwarded.lock().unwrap().clone();
    assert_eq!(forwarded, vec![data.clone()]);
    w.appserver.deliver_complaint_data(&forwarded[0]);
    assert_eq!(w.appserver.pending_count(), 0);

    // The replacement spends; the invalidated commitment does not.
    let invalid = w.provider.redeem_tokens(&w.mule.redemption_payload()).unwrap();
    assert!(invalid.is_empty());
    assert_eq!(w.provider.credit_of(&MULE_ID), 1);

    let committed_token: crate::credential::Token = committed.as_slice().try_into().unwrap();
    w.provider
        .redeem_tokens(&crate::wire::TokenRedemptionPayload {
            mule_id: MULE_B,
            tokens: TokenList::from_tokens([committed_token]),
        })
        .unwrap();
    assert_eq!(w.provider.credit_of(&MULE_B), 0);
}

#[tokio::test]
async fn complaining_about_an_honest_record_gains_nothing() {
    let mut w = world();
    let data = vec![0x33; 512];
    w.deliver(&data).await;
    w.rotate_epoch(1);

    let data_hash = crate::crypto::sha256(&data);
    let (complaint, pending) = w.mule.incorrect_record_complaint(&data_hash).unwrap();
    let ComplaintOutcome::Replacement(signed) = w.provider.complain(&complaint).await.unwrap()
    else {
        panic!("expected a replacement token");
    };
    w.mule.accept_replacement(pending, &signed).unwrap();

    // Original plus replacement, but the original got spent by the
    // complaint. Net earnings stay at one.
    assert_eq!(w.mule.token_count(), 2);
    w.provider.redeem_tokens(&w.mule.redemption_payload()).unwrap();
    assert_eq!(w.provider.credit_of(&MULE_ID), 1);
}

#[tokio::test]
async fn mule_rejects_predelivery_for_other_data() {
    let mut w = world();
    let predelivery = w
        .appserver
        .deliver_hash(&w.sensor_commit(b"the real reading"))
        .await
        .unwrap();
    assert!(matches!(
        w.mule.accept_predelivery(b"a different reading", predelivery),
        Err(ProtocolError::SignatureInvalid(_))
    ));
}

#[tokio::test]
async fn mule_rejects_token_with_stale_nonce() {
    let mut w = world();
    let data = vec![0x9C; 64];
    let predelivery = w
        .appserver
        .deliver_hash(&w.sensor_commit(&data))
        .await
        .unwrap();
    w.mule.accept_predelivery(&data, predelivery).unwrap();

    let mut released = w.appserver.deliver_data(&data).unwrap();
    released.payload.nonce = [0u8; 16];
    released.signature = sign_payload(&w.appserver_key, &released.payload.encode());
    assert!(matches!(
        w.mule.accept_token(released),
        Err(ProtocolError::SignatureInvalid("token nonce"))
    ));
    assert_eq!(w.mule.token_count(), 0);
}

#[tokio::test]
async fn complaints_need_a_complaint_token() {
    let mut w = world();
    let data = vec![0x11; 64];
    w.deliver(&data).await;

    let data_hash = crate::crypto::sha256(&data);
    assert!(matches!(
        w.mule.incorrect_record_complaint(&data_hash),
        Err(ProtocolError::CredentialExhausted(_))
    ));
}
