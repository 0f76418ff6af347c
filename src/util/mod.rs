//! Utility modules for filesystem and easyrsa operations.

pub mod easyrsa;
pub mod fs;
pub mod path;
