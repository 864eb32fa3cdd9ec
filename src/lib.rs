// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! Mulepay - Anonymous Credentials for Delay-Tolerant Data Mules
//!
//! This crate implements a token economy in which mules ferry sensor data to
//! appservers and are paid in blind-signed single-use tokens they can redeem
//! with a provider, without the provider learning which deliveries they made.
//!
//! ## Modules
//!
//! - `provider` - Token issuance, redemption, complaints, epoch rotation
//! - `appserver` - Commit-then-reveal delivery handshake and token pool
//! - `mule` - Mule-side session state and payload construction
//! - `credential` - Blind-token primitive (verifiable OPRF over P-256)
//! - `wire` - Fixed-layout binary codec for every protocol payload
//! - `dedup` - First-writer-wins ledgers (in-memory and redb)
//! - `transport` - HTTP bindings between the services

pub mod appserver;
pub mod config;
pub mod credential;
pub mod crypto;
pub mod dedup;
pub mod error;
pub mod mule;
pub mod provider;
pub mod transport;
pub mod wire;

pub use error::ProtocolError;
