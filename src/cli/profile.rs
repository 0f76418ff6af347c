use crate::cli::{CliContext, OutputFormat};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};
use serde::Serialize;

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// List all known profiles
    #[command(visible_alias = "ls")]
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Serialize)]
struct ProfileItem {
    name: String,
    pki_dir: String,
    packaging: bool,
    default: bool,
}

pub fn run(ctx: &CliContext, cmd: ProfileCommand) -> Result<()> {
    match cmd {
        ProfileCommand::List(args) => run_list(ctx, args),
    }
}

fn run_list(ctx: &CliContext, args: ListArgs) -> Result<()> {
    let loaded = ctx.load_config()?;
    let default = loaded.config.default_profile.as_deref();
    let items: Vec<ProfileItem> = loaded
        .config
        .profiles
        .iter()
        .map(|p| ProfileItem {
            name: p.name.clone(),
            pki_dir: loaded.pki(p).root.display().to_string(),
            packaging: p.packaging.is_some(),
            default: Some(p.name.as_str()) == default,
        })
        .collect();

    if args.format == OutputFormat::Json {
        let json = serde_json::to_string_pretty(&items).context("serialize profiles")?;
        println!("{}", json);
        return Ok(());
    }

    if items.is_empty() {
        println!("No profiles configured");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("PKI directory").add_attribute(Attribute::Bold),
        Cell::new("Packaging").add_attribute(Attribute::Bold),
        Cell::new("Default").add_attribute(Attribute::Bold),
    ]);
    for item in items {
        table.add_row(vec![
            item.name,
            item.pki_dir,
            if item.packaging { "yes" } else { "no" }.to_string(),
            if item.default { "*" } else { "" }.to_string(),
        ]);
    }

    println!("{}", table);
    Ok(())
}
