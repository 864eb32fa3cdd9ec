// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! Provider HTTP surface. All bodies are binary per the wire codec.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Router,
};

use crate::error::ProtocolError;
use crate::transport::ComplaintRelay;
use crate::wire::{ComplaintPayload, NewEpochRequest, TokenList, TokenRedemptionPayload};

use super::{ComplaintOutcome, Provider};

pub fn router<R: ComplaintRelay + 'static>(provider: Arc<Provider<R>>) -> Router {
    Router::new()
        .route("/public_params", get(public_params::<R>))
        .route("/sign_tokens", post(sign_tokens::<R>))
        .route("/redeem_tokens", post(redeem_tokens::<R>))
        .route("/complaint_public_params", get(complaint_public_params::<R>))
        .route("/complain", post(complain::<R>))
        .route("/new_epoch", post(new_epoch::<R>))
        .with_state(provider)
}

async fn public_params<R: ComplaintRelay>(State(provider): State<Arc<Provider<R>>>) -> Bytes {
    Bytes::from(provider.public_params().as_bytes().to_vec())
}

async fn complaint_public_params<R: ComplaintRelay>(
    State(provider): State<Arc<Provider<R>>>,
) -> Bytes {
    Bytes::from(provider.complaint_public_params().as_bytes().to_vec())
}

async fn sign_tokens<R: ComplaintRelay>(
    State(provider): State<Arc<Provider<R>>>,
    body: Bytes,
) -> Result<Bytes, ProtocolError> {
    let blinded = TokenList::decode(&body)?;
    let signed = provider.sign_tokens(&blinded)?;
    Ok(Bytes::from(signed.encode()))
}

async fn redeem_tokens<R: ComplaintRelay>(
    State(provider): State<Arc<Provider<R>>>,
    body: Bytes,
) -> Result<Bytes, ProtocolError> {
    let payload = TokenRedemptionPayload::decode(&body)?;
    let invalid = provider.redeem_tokens(&payload)?;
    Ok(Bytes::from(invalid.encode()))
}

async fn complain<R: ComplaintRelay>(
    State(provider): State<Arc<Provider<R>>>,
    body: Bytes,
) -> Result<Bytes, ProtocolError> {
    let complaint = ComplaintPayload::decode(&body)?;
    match provider.complain(&complaint).await? {
        ComplaintOutcome::Replacement(signed) => Ok(Bytes::from(signed.to_vec())),
        // Deliberately empty and non-error: the duplicate was already
        // compensated to an earlier complainant.
        ComplaintOutcome::AlreadyCompensated => Ok(Bytes::new()),
    }
}

async fn new_epoch<R: ComplaintRelay>(
    State(provider): State<Arc<Provider<R>>>,
    body: Bytes,
) -> Result<Bytes, ProtocolError> {
    let request = NewEpochRequest::decode(&body)?;
    let response = provider.new_epoch(&request)?;
    Ok(Bytes::from(response.encode()))
}
