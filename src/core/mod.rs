//! Core business logic modules.

pub mod cert;
pub mod config_file;
pub mod file_lock;
pub mod package;
pub mod pki;
pub mod scripts;
