//! Running user-supplied shell snippets (post-action and skeleton-map scripts).

use crate::constants;
use crate::models::action::ActionType;
use crate::models::username::Username;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

pub const ENV_ACTION: &str = "OCM_ACTION";
pub const ENV_PROFILE: &str = "OCM_PROFILE";
pub const ENV_PKI_DIR: &str = "OCM_PKI_DIR";
pub const ENV_USERS: &str = "OCM_USERS";
pub const ENV_USER: &str = "OCM_USER";

/// Where and with which environment a batch of scripts runs.
#[derive(Debug, Clone, Default)]
pub struct ScriptEnv {
    cwd: Option<PathBuf>,
    vars: Vec<(&'static str, String)>,
}

impl ScriptEnv {
    /// Environment for scripts attached to `action`.
    pub fn for_action(
        action: ActionType,
        profile: &str,
        pki_dir: &Path,
        users: &[Username],
    ) -> Self {
        let users = users
            .iter()
            .map(Username::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        Self::default()
            .var(ENV_ACTION, action.as_str())
            .var(ENV_PROFILE, profile)
            .var(ENV_PKI_DIR, pki_dir.to_string_lossy())
            .var(ENV_USERS, users)
    }

    pub fn var(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.vars.push((key, value.into()));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

/// Run `scripts` one after another; the first failure aborts the rest.
pub fn run_all(label: &str, scripts: &[String], env: &ScriptEnv) -> Result<()> {
    for (i, script) in scripts.iter().enumerate() {
        info!("running {} script #{}", label, i + 1);
        debug!("{} script #{}: {}", label, i + 1, script);
        let mut cmd = Command::new(constants::SCRIPT_SHELL);
        cmd.arg("-c").arg(script);
        if let Some(dir) = &env.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &env.vars {
            cmd.env(key, value);
        }
        let status = cmd
            .status()
            .with_context(|| format!("spawn {} script #{}", label, i + 1))?;
        if !status.success() {
            bail!(
                "{} script #{} failed ({}): {}",
                label,
                i + 1,
                status,
                script
            );
        }
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_run_all_sets_env_and_cwd() {
        let dir = TempDir::new().unwrap();
        let users = vec![
            Username::parse("alice").unwrap(),
            Username::parse("bob").unwrap(),
        ];
        let env = ScriptEnv::for_action(ActionType::New, "office", Path::new("/pki"), &users)
            .cwd(dir.path());
        let scripts = vec![
            "echo \"$OCM_ACTION|$OCM_PROFILE|$OCM_PKI_DIR|$OCM_USERS\" > out.txt".to_string(),
        ];
        run_all("post-action", &scripts, &env).unwrap();
        let out = fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(out.trim(), "new|office|/pki|alice bob");
    }

    #[test]
    fn test_run_all_stops_on_failure() {
        let dir = TempDir::new().unwrap();
        let env = ScriptEnv::default().cwd(dir.path());
        let scripts = vec![
            "touch first".to_string(),
            "exit 3".to_string(),
            "touch third".to_string(),
        ];
        let err = run_all("post-action", &scripts, &env).unwrap_err();
        assert!(err.to_string().contains("#2"));
        assert!(dir.path().join("first").exists());
        assert!(!dir.path().join("third").exists());
    }

    #[test]
    fn test_run_all_empty_is_ok() {
        run_all("post-action", &[], &ScriptEnv::default()).unwrap();
    }
}
