//! easy-rsa PKI directory layout and user enumeration.

use crate::constants;
use crate::models::config::Profile;
use crate::models::username::Username;
use crate::util::path;
use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct PkiPaths {
    pub root: PathBuf,
    pub issued: PathBuf,
    pub private: PathBuf,
}

impl PkiPaths {
    /// Resolve a profile's PKI dir against the directory holding the config file.
    pub fn for_profile(config_dir: &Path, profile: &Profile) -> Self {
        Self::from_root(path::resolve_against(config_dir, &profile.easy_rsa_pki_dir))
    }

    pub fn from_root(root: PathBuf) -> Self {
        let issued = root.join(constants::PKI_ISSUED_DIR);
        let private = root.join(constants::PKI_PRIVATE_DIR);
        Self {
            root,
            issued,
            private,
        }
    }

    pub fn cert_file(&self, user: &Username) -> PathBuf {
        self.issued
            .join(format!("{}.{}", user, constants::CERT_EXTENSION))
    }

    pub fn key_file(&self, user: &Username) -> PathBuf {
        self.private
            .join(format!("{}.{}", user, constants::KEY_EXTENSION))
    }

    /// Path to the user's certificate, failing if it does not exist.
    pub fn cert_path(&self, user: &Username) -> Result<PathBuf> {
        let path = self.cert_file(user);
        if !path.is_file() {
            bail!("cannot find a certificate for user \"{}\" at {}", user, path.display());
        }
        Ok(path)
    }

    /// Path to the user's private key, failing if it does not exist.
    pub fn key_path(&self, user: &Username) -> Result<PathBuf> {
        let path = self.key_file(user);
        if !path.is_file() {
            bail!("cannot find a key for user \"{}\" at {}", user, path.display());
        }
        Ok(path)
    }

    /// Users with a certificate, a key, or both. Sorted.
    pub fn list_users(&self) -> Result<Vec<Username>> {
        let certs = list_stems(&self.issued, constants::CERT_EXTENSION)?;
        let mut keys = list_stems(&self.private, constants::KEY_EXTENSION)?;
        keys.remove(constants::CA_KEY_STEM);

        for name in certs.difference(&keys) {
            warn!("user {:?} has a certificate but no key", name);
        }
        for name in keys.difference(&certs) {
            warn!("user {:?} has a key but no certificate", name);
        }

        let users = certs
            .union(&keys)
            .filter_map(|stem| match Username::parse(stem) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!("ignoring {:?}: {}", stem, e);
                    None
                }
            })
            .collect::<BTreeSet<_>>();
        Ok(users.into_iter().collect())
    }

    pub fn user_exists(&self, user: &Username) -> bool {
        self.cert_file(user).is_file() || self.key_file(user).is_file()
    }
}

/// File stems of regular files in `dir` carrying `extension`.
fn list_stems(dir: &Path, extension: &str) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("open PKI directory {}", dir.display()))?;
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("failed to read an entry in {}; the user list may be incomplete: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            warn!("{} is not a regular file; ignoring", path.display());
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => {
                out.insert(stem.to_string());
            }
            None => warn!("{} has no UTF-8 file stem; ignoring", path.display()),
        }
    }
    Ok(out)
}
