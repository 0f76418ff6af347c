//! OpenVPN client credential management CLI.
//!
//! Wraps `easyrsa` for issuing, renewing, revoking and packaging client
//! certificates across one or more PKI directories ("profiles").
//!
//! ## Modules
//! - `cli` — Command-line handlers
//! - `core` — Business logic (config file, PKI layout, certs, packaging, scripts)
//! - `models` — Data structures
//! - `util` — System utilities (easyrsa, fs, path)

pub mod cli;
pub mod constants;
pub mod core;
pub mod logging;
pub mod models;
pub mod util;
