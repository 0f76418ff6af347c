use crate::cli::{Cli, CliContext};
use crate::constants;
use crate::core::config_file;
use crate::models::config::Config;
use crate::util::fs as ocm_fs;
use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, CommandFactory, Subcommand};
use clap_complete::Shell;
use std::io::Write;
use std::path::Path;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum GenCommand {
    /// Generate a shell completion script on stdout
    Completion(CompletionArgs),
    /// Write an annotated example config file
    ///
    /// The file is written to --config if given, otherwise to the default location.
    Config,
}

#[derive(Args, Debug)]
pub struct CompletionArgs {
    /// Shell to generate completion for (detected from $SHELL if omitted)
    #[arg(value_name = "SHELL")]
    pub shell: Option<Shell>,

    /// Install into the system-wide completion directory instead of printing
    #[arg(long)]
    pub install: bool,
}

pub fn run(ctx: &CliContext, cmd: GenCommand) -> Result<()> {
    match cmd {
        GenCommand::Completion(args) => run_completion(args),
        GenCommand::Config => run_config(ctx),
    }
}

/// Completion script for `shell`, generated from the live CLI definition.
pub fn completion_script(shell: Shell) -> Vec<u8> {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut cmd, constants::BIN_NAME, &mut buf);
    buf
}

/// Standard system location for a shell's completion file, if there is one.
pub fn install_path(shell: Shell) -> Option<&'static str> {
    match shell {
        Shell::Bash => Some(constants::INSTALL_BASH_COMPLETION),
        Shell::Zsh => Some(constants::INSTALL_ZSH_COMPLETION),
        Shell::Fish => Some(constants::INSTALL_FISH_COMPLETION),
        _ => None,
    }
}

fn run_completion(args: CompletionArgs) -> Result<()> {
    let shell = match args.shell {
        Some(shell) => shell,
        None => Shell::from_env()
            .ok_or_else(|| anyhow!("cannot detect your shell from $SHELL; specify one"))?,
    };
    let script = completion_script(shell);

    if args.install {
        let Some(target) = install_path(shell) else {
            bail!("no standard completion directory for {}; redirect stdout instead", shell);
        };
        ocm_fs::write_file(Path::new(target), &script, constants::INSTALL_COMPLETION_MODE)?;
        info!("installed {} completion to {}", shell, target);
        return Ok(());
    }

    let mut stdout = std::io::stdout();
    stdout.write_all(&script).context("write to stdout")?;
    stdout.flush().context("flush stdout")?;
    Ok(())
}

fn run_config(ctx: &CliContext) -> Result<()> {
    let path = ctx.config_path()?;
    if path.exists()
        && !ctx.confirm(&format!("{} already exists. Overwrite?", path.display()))?
    {
        println!("Aborted");
        return Ok(());
    }

    let content = config_file::render_annotated(&Config::example());
    config_file::save(&path, &content)?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_script_per_shell() {
        for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
            let script = String::from_utf8(completion_script(shell)).unwrap();
            assert!(!script.is_empty());
            assert!(script.contains("ocm"), "{} script does not mention ocm", shell);
        }
    }

    #[test]
    fn test_completion_includes_subcommands() {
        let script = String::from_utf8(completion_script(Shell::Bash)).unwrap();
        assert!(script.contains("completion"));
        assert!(script.contains("package"));
    }

    #[test]
    fn test_install_paths() {
        assert_eq!(
            install_path(Shell::Bash),
            Some("/usr/share/bash-completion/completions/ocm")
        );
        assert_eq!(install_path(Shell::Zsh), Some("/usr/share/zsh/site-functions/_ocm"));
        assert_eq!(
            install_path(Shell::Fish),
            Some("/usr/share/fish/vendor_completions.d/ocm.fish")
        );
        assert_eq!(install_path(Shell::PowerShell), None);
    }
}
