//! Invocations of the external `easyrsa` executable.

use crate::models::username::Username;
use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// An `easyrsa` executable bound to one PKI directory.
#[derive(Debug, Clone)]
pub struct EasyRsa {
    exe: PathBuf,
    pki_dir: PathBuf,
}

impl EasyRsa {
    pub fn new(exe: impl Into<PathBuf>, pki_dir: impl Into<PathBuf>) -> Self {
        Self {
            exe: exe.into(),
            pki_dir: pki_dir.into(),
        }
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }

    pub fn pki_dir(&self) -> &Path {
        &self.pki_dir
    }

    pub fn build_client_full(&self, name: &Username, days: Option<u32>) -> Result<()> {
        let mut args = days_arg(days);
        args.extend([
            OsString::from("--no-pass"),
            OsString::from("build-client-full"),
            OsString::from(name.as_str()),
        ]);
        self.run(&args)
            .with_context(|| format!("easyrsa build-client-full {}", name))
    }

    pub fn renew(&self, name: &Username, days: Option<u32>) -> Result<()> {
        let mut args = days_arg(days);
        args.extend([OsString::from("renew"), OsString::from(name.as_str())]);
        self.run(&args).with_context(|| format!("easyrsa renew {}", name))
    }

    pub fn revoke_renewed(&self, name: &Username) -> Result<()> {
        self.run(&[OsString::from("revoke-renewed"), OsString::from(name.as_str())])
            .with_context(|| format!("easyrsa revoke-renewed {}", name))
    }

    pub fn revoke(&self, name: &Username) -> Result<()> {
        self.run(&[OsString::from("revoke"), OsString::from(name.as_str())])
            .with_context(|| format!("easyrsa revoke {}", name))
    }

    pub fn gen_crl(&self) -> Result<()> {
        self.run(&[OsString::from("gen-crl")]).context("easyrsa gen-crl")
    }

    /// Full argument list passed to the executable for a subcommand.
    pub fn command_args(&self, args: &[OsString]) -> Vec<OsString> {
        let mut pki_arg = OsString::from("--pki-dir=");
        pki_arg.push(&self.pki_dir);
        let mut out = vec![OsString::from("--batch"), pki_arg];
        out.extend(args.iter().cloned());
        out
    }

    fn run(&self, args: &[OsString]) -> Result<()> {
        let full = self.command_args(args);
        debug!(exe = %self.exe.display(), args = ?full, "running easyrsa");
        let mut cmd = Command::new(&self.exe);
        cmd.args(&full);
        let output = cmd
            .output()
            .with_context(|| format!("run {}", self.exe.display()))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() {
            for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
                debug!("easyrsa: {}", line);
            }
            info!(pki = %self.pki_dir.display(), "easyrsa {:?} ok", args);
            return Ok(());
        }
        bail!("command failed ({}): {}{}", output.status, stdout, stderr);
    }
}

fn days_arg(days: Option<u32>) -> Vec<OsString> {
    days.map(|d| OsString::from(format!("--days={}", d)))
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_args_prefix() {
        let rsa = EasyRsa::new("/usr/bin/easyrsa", "/etc/pki");
        let args = rsa.command_args(&[OsString::from("gen-crl")]);
        assert_eq!(
            args,
            vec![
                OsString::from("--batch"),
                OsString::from("--pki-dir=/etc/pki"),
                OsString::from("gen-crl"),
            ]
        );
    }

    #[test]
    fn test_days_arg() {
        assert!(days_arg(None).is_empty());
        assert_eq!(days_arg(Some(90)), vec![OsString::from("--days=90")]);
    }

    #[test]
    fn test_missing_executable_is_error() {
        let rsa = EasyRsa::new("/nonexistent/easyrsa", "/tmp");
        assert!(rsa.gen_crl().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_includes_output() {
        let rsa = EasyRsa::new("false", "/tmp");
        let err = rsa.gen_crl().unwrap_err();
        assert!(format!("{:#}", err).contains("command failed"));
    }
}
