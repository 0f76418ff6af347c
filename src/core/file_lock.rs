//! Exclusive flock(2) on a PKI directory so concurrent runs serialize.

use crate::constants;
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::{debug, info};

/// Held for the duration of a mutating action. Released on drop.
#[derive(Debug)]
pub struct PkiLock {
    _file: File,
}

impl PkiLock {
    /// Lock `pki_dir`, waiting if another process holds it.
    pub fn acquire(pki_dir: &Path) -> Result<Self> {
        if let Some(lock) = Self::try_acquire(pki_dir)? {
            return Ok(lock);
        }
        let path = pki_dir.join(constants::PKI_LOCK_FILE);
        info!("waiting for another ocm process to release {}", path.display());
        let file = open_lock_file(&path)?;
        file.lock_exclusive()
            .with_context(|| format!("acquire lock {}", path.display()))?;
        debug!("locked {}", path.display());
        Ok(Self { _file: file })
    }

    /// Lock `pki_dir` only if it is free. `Ok(None)` means it is held elsewhere.
    pub fn try_acquire(pki_dir: &Path) -> Result<Option<Self>> {
        let path = pki_dir.join(constants::PKI_LOCK_FILE);
        let file = open_lock_file(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("locked {}", path.display());
                Ok(Some(Self { _file: file }))
            }
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("try lock {}", path.display())),
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("open lock file {}", path.display()))
}

// fs2 on Linux may report EAGAIN as Other instead of WouldBlock
fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock || e.raw_os_error() == Some(11)
}
