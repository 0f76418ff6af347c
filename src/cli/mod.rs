//! CLI routing and command dispatch.

use crate::core::config_file;
use crate::core::pki::PkiPaths;
use crate::core::scripts::{self, ScriptEnv};
use crate::logging;
use crate::models::action::ActionType;
use crate::models::config::{Config, Profile};
use crate::models::username::Username;
use crate::util::easyrsa::EasyRsa;
use crate::util::path;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum, ValueHint};
use dialoguer::Confirm;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::info;

pub mod gen;
pub mod profile;
pub mod user;

/// Shared context passed to all command handlers.
pub struct CliContext {
    pub config_path: Option<PathBuf>,
    pub profile: Option<String>,
    pub force: bool,
    pub no_post_action_scripts: bool,
}

/// A loaded config together with the directory relative paths resolve against.
pub struct LoadedConfig {
    pub config: Config,
    pub dir: PathBuf,
}

impl LoadedConfig {
    pub fn profile(&self, name: Option<&str>) -> Result<&Profile> {
        self.config.get_profile(name)
    }

    pub fn pki(&self, profile: &Profile) -> PkiPaths {
        PkiPaths::for_profile(&self.dir, profile)
    }

    /// The easyrsa executable bound to `pki`. Bare names are looked up on PATH.
    pub fn easy_rsa(&self, pki: &PkiPaths) -> EasyRsa {
        let exe = &self.config.easy_rsa_path;
        let exe = if exe.components().count() > 1 {
            path::resolve_against(&self.dir, exe)
        } else {
            exe.clone()
        };
        EasyRsa::new(exe, pki.root.clone())
    }
}

impl CliContext {
    pub fn config_path(&self) -> Result<PathBuf> {
        config_file::resolve_path(self.config_path.clone())
    }

    pub fn load_config(&self) -> Result<LoadedConfig> {
        let path = self.config_path()?;
        let config = config_file::load(&path)?;
        Ok(LoadedConfig {
            config,
            dir: path::parent_dir(&path),
        })
    }

    /// Ask before a destructive step. `--force` answers yes; no terminal means no prompt is possible.
    pub fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.force {
            return Ok(true);
        }
        if !std::io::stdin().is_terminal() {
            bail!("{} Refusing to continue without a terminal; pass --force", prompt);
        }
        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("read confirmation")
    }

    /// Run the profile's scripts for `action` unless disabled.
    pub fn run_post_action(
        &self,
        profile: &Profile,
        pki: &PkiPaths,
        action: ActionType,
        users: &[Username],
    ) -> Result<()> {
        let scripts = profile
            .post_action_scripts
            .as_ref()
            .map(|m| m.get(action))
            .unwrap_or(&[]);
        if scripts.is_empty() {
            return Ok(());
        }
        if self.no_post_action_scripts {
            info!("skipping {} post-action script(s) for {}", scripts.len(), action);
            return Ok(());
        }
        let env = ScriptEnv::for_action(action, &profile.name, &pki.root, users);
        scripts::run_all("post-action", scripts, &env)
            .with_context(|| format!("post-action scripts for {}", action))
    }
}

/// Output format for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "ocm",
    version,
    about = "Manage OpenVPN client credentials with easy-rsa"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(
        short = 'c',
        long = "config",
        global = true,
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        env = "OCM_CONFIG"
    )]
    pub config: Option<PathBuf>,

    /// Profile to operate on (defaults to default-profile in the config)
    #[arg(short = 'p', long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Proceed with destructive actions without confirmation
    #[arg(short = 'f', long, global = true)]
    pub force: bool,

    /// Do not run post-action scripts
    #[arg(long, global = true)]
    pub no_post_action_scripts: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        logging::init(self.verbose, self.quiet)?;

        let ctx = CliContext {
            config_path: self.config,
            profile: self.profile,
            force: self.force,
            no_post_action_scripts: self.no_post_action_scripts,
        };

        match self.command {
            Commands::Gen { command } => gen::run(&ctx, command),
            Commands::Profile { command } => profile::run(&ctx, command),
            Commands::User { command } => user::run(&ctx, command),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate completion scripts and config files
    Gen {
        #[command(subcommand)]
        command: gen::GenCommand,
    },
    /// Operations on profiles
    Profile {
        #[command(subcommand)]
        command: profile::ProfileCommand,
    },
    /// Operations on users
    User {
        #[command(subcommand)]
        command: user::UserCommand,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::path::Path;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ocm", "user", "list", "-p", "office", "-c", "/tmp/c.toml", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.profile.as_deref(), Some("office"));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["ocm", "-v", "-q", "profile", "list"]).is_err());
    }

    #[test]
    fn test_easy_rsa_resolution() {
        let mut config = Config::example();
        let loaded = |config: &Config| LoadedConfig {
            config: config.clone(),
            dir: PathBuf::from("/etc/ocm"),
        };
        let pki = PkiPaths::from_root(PathBuf::from("/pki"));

        config.easy_rsa_path = PathBuf::from("easyrsa");
        assert_eq!(loaded(&config).easy_rsa(&pki).exe(), Path::new("easyrsa"));

        config.easy_rsa_path = PathBuf::from("bin/easyrsa");
        assert_eq!(
            loaded(&config).easy_rsa(&pki).exe(),
            Path::new("/etc/ocm/bin/easyrsa")
        );

        config.easy_rsa_path = PathBuf::from("/usr/bin/easyrsa");
        let rsa = loaded(&config).easy_rsa(&pki);
        assert_eq!(rsa.exe(), Path::new("/usr/bin/easyrsa"));
        assert_eq!(rsa.pki_dir(), Path::new("/pki"));
    }
}
