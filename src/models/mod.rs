//! Data structures for configuration and identities.

pub mod action;
pub mod config;
pub mod username;
