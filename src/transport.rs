// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! HTTP client bindings between the services.
//!
//! The traits are the deployment seams: the appserver replenishes its token
//! pool through a [`ProviderEndpoint`], and the provider forces completion
//! of a disputed delivery through a [`ComplaintRelay`]. Production uses the
//! reqwest-backed implementations; tests substitute in-process ones.
//!
//! Every binding treats a non-2xx status or malformed body as failure,
//! never partial success.

use std::future::Future;

use crate::credential::PublicParams;
use crate::error::ProtocolError;
use crate::wire::TokenList;

/// Provider operations the appserver needs for Algorithm 1 (token purchase).
pub trait ProviderEndpoint: Send + Sync {
    /// `GET /public_params`.
    fn fetch_public_params(
        &self,
    ) -> impl Future<Output = Result<PublicParams, ProtocolError>> + Send;

    /// `POST /sign_tokens`: blind-sign a batch of blinded tokens.
    fn sign_tokens(
        &self,
        blinded: TokenList,
    ) -> impl Future<Output = Result<TokenList, ProtocolError>> + Send;
}

/// Out-of-band delivery-completion channel used while adjudicating Type-1
/// (missing record) complaints.
pub trait ComplaintRelay: Send + Sync {
    /// `POST {appserver_url}/deliver_complaint_data` with the raw payload.
    fn forward_data(
        &self,
        appserver_url: &str,
        data: &[u8],
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send;
}

fn transport_err(e: reqwest::Error) -> ProtocolError {
    ProtocolError::Transport(e.to_string())
}

fn check_status(response: &reqwest::Response, what: &str) -> Result<(), ProtocolError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(ProtocolError::Transport(format!(
            "{what} returned {}",
            response.status()
        )))
    }
}

// =============================================================================
// HTTP implementations
// =============================================================================

/// reqwest-backed [`ProviderEndpoint`].
#[derive(Clone)]
pub struct HttpProviderEndpoint {
    base_url: String,
    http: reqwest::Client,
}

impl HttpProviderEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }
}

impl ProviderEndpoint for HttpProviderEndpoint {
    fn fetch_public_params(
        &self,
    ) -> impl Future<Output = Result<PublicParams, ProtocolError>> + Send {
        async move {
            let response = self
                .http
                .get(format!("{}/public_params", self.base_url))
                .send()
                .await
                .map_err(transport_err)?;
            check_status(&response, "public_params")?;
            let body = response.bytes().await.map_err(transport_err)?;
            PublicParams::from_bytes(&body)
                .map_err(|_| ProtocolError::CredentialInvalid("provider public params"))
        }
    }

    fn sign_tokens(
        &self,
        blinded: TokenList,
    ) -> impl Future<Output = Result<TokenList, ProtocolError>> + Send {
        async move {
            let response = self
                .http
                .post(format!("{}/sign_tokens", self.base_url))
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(blinded.encode())
                .send()
                .await
                .map_err(transport_err)?;
            check_status(&response, "sign_tokens")?;
            let body = response.bytes().await.map_err(transport_err)?;
            Ok(TokenList::decode(&body)?)
        }
    }
}

/// reqwest-backed [`ComplaintRelay`].
#[derive(Clone)]
pub struct HttpComplaintRelay {
    http: reqwest::Client,
}

impl HttpComplaintRelay {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpComplaintRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl ComplaintRelay for HttpComplaintRelay {
    fn forward_data(
        &self,
        appserver_url: &str,
        data: &[u8],
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send {
        let url = format!("{appserver_url}/deliver_complaint_data");
        let body = data.to_vec();
        async move {
            let response = self
                .http
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(body)
                .send()
                .await
                .map_err(transport_err)?;
            check_status(&response, "deliver_complaint_data")
        }
    }
}
