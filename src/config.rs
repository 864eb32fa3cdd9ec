// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! # Runtime Configuration Constants
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `ROLE` | Which service to run (`provider` or `appserver`) | `provider` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Root directory for persistent ledgers | `/data` |
//! | `DEDUP_BACKEND` | Ledger backend (`memory` or `redb`) | `memory` |
//! | `PROVIDER_URL` | Provider base URL (appserver role) | Required for appserver |
//! | `PROVIDER_DELIVERY_SEED` | Path to the delivery OPRF seed (32 bytes) | Required for provider |
//! | `PROVIDER_COMPLAINT_SEED` | Path to the complaint OPRF seed (32 bytes) | Required for provider |
//! | `APPSERVER_REGISTRY` | Path to the appserver registry JSON | Required for provider |
//! | `APPSERVER_SIGNING_KEY` | Path to the appserver ECDSA key (PKCS#8 PEM) | Required for appserver |
//! | `APPSERVER_AES_KEY` | Path to the provider-shared AES-256 key (32 bytes) | Required for appserver |
//! | `SENSOR_REGISTRY` | Path to the sensor registry JSON | Required for appserver |
//! | `TOKEN_BATCH_SIZE` | Tokens purchased per replenishment | `10` |
//! | `PENDING_TTL_SECS` | Lifetime of an unconsumed hash commitment | `300` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

/// Environment variable selecting the service role, `provider` or
/// `appserver`. Both roles live in one binary so deployments ship a single
/// image.
pub const ROLE_ENV: &str = "ROLE";

/// Environment variable name for the server bind address.
pub const HOST_ENV: &str = "HOST";

/// Environment variable name for the server bind port.
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the persistent-ledger directory. Only read
/// when `DEDUP_BACKEND=redb`; each ledger namespace gets its own database
/// file underneath it.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable selecting the dedup ledger backend.
///
/// `memory` keeps redemption state in process (lost on restart, fine for
/// development). `redb` persists it under [`DATA_DIR_ENV`].
pub const DEDUP_BACKEND_ENV: &str = "DEDUP_BACKEND";

/// Environment variable name for the provider base URL the appserver buys
/// tokens from.
pub const PROVIDER_URL_ENV: &str = "PROVIDER_URL";

/// Environment variable name for the path to the provider's delivery-token
/// OPRF seed file (raw 32 bytes).
pub const PROVIDER_DELIVERY_SEED_ENV: &str = "PROVIDER_DELIVERY_SEED";

/// Environment variable name for the path to the provider's complaint-token
/// OPRF seed file (raw 32 bytes). Must differ from the delivery seed;
/// the two token namespaces share nothing.
pub const PROVIDER_COMPLAINT_SEED_ENV: &str = "PROVIDER_COMPLAINT_SEED";

/// Environment variable name for the appserver registry JSON consumed by
/// the provider role.
pub const APPSERVER_REGISTRY_ENV: &str = "APPSERVER_REGISTRY";

/// Environment variable name for the appserver's ECDSA signing key
/// (PKCS#8 PEM).
pub const APPSERVER_SIGNING_KEY_ENV: &str = "APPSERVER_SIGNING_KEY";

/// Environment variable name for the AES-256 key the appserver shares with
/// the provider (raw 32 bytes).
pub const APPSERVER_AES_KEY_ENV: &str = "APPSERVER_AES_KEY";

/// Environment variable name for the sensor registry JSON consumed by the
/// appserver role.
pub const SENSOR_REGISTRY_ENV: &str = "SENSOR_REGISTRY";

/// Environment variable name for the token-pool replenishment batch size.
pub const TOKEN_BATCH_SIZE_ENV: &str = "TOKEN_BATCH_SIZE";

/// Environment variable name for the hash-commitment TTL in seconds.
pub const PENDING_TTL_SECS_ENV: &str = "PENDING_TTL_SECS";

/// Environment variable name for the log output format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_TOKEN_BATCH_SIZE: usize = 10;
pub const DEFAULT_PENDING_TTL_SECS: u64 = 300;
