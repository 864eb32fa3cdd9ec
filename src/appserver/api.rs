// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! AppServer HTTP surface. All bodies are binary per the wire codec.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, routing::post, Router};

use crate::error::ProtocolError;
use crate::transport::ProviderEndpoint;
use crate::wire::SignedHashPayload;

use super::AppServer;

pub fn router<P: ProviderEndpoint + 'static>(appserver: Arc<AppServer<P>>) -> Router {
    Router::new()
        .route("/deliver_hash", post(deliver_hash::<P>))
        .route("/deliver_data", post(deliver_data::<P>))
        .route("/deliver_complaint_data", post(deliver_complaint_data::<P>))
        .with_state(appserver)
}

async fn deliver_hash<P: ProviderEndpoint>(
    State(appserver): State<Arc<AppServer<P>>>,
    body: Bytes,
) -> Result<Bytes, ProtocolError> {
    let signed_hash = SignedHashPayload::decode(&body)?;
    let predelivery = appserver.deliver_hash(&signed_hash).await?;
    Ok(Bytes::from(predelivery.encode()))
}

async fn deliver_data<P: ProviderEndpoint>(
    State(appserver): State<Arc<AppServer<P>>>,
    body: Bytes,
) -> Result<Bytes, ProtocolError> {
    let signed_token = appserver.deliver_data(&body)?;
    Ok(Bytes::from(signed_token.encode()))
}

async fn deliver_complaint_data<P: ProviderEndpoint>(
    State(appserver): State<Arc<AppServer<P>>>,
    body: Bytes,
) {
    appserver.deliver_complaint_data(&body);
}
