use crate::cli::{CliContext, LoadedConfig, OutputFormat};
use crate::constants;
use crate::core::cert::{self, CertInfo, ExpiryStatus};
use crate::core::file_lock::PkiLock;
use crate::core::package::{self, PackageOptions};
use crate::core::pki::PkiPaths;
use crate::models::action::ActionType;
use crate::models::config::Profile;
use crate::models::username::Username;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Local, Utc};
use clap::{Args, Subcommand, ValueHint};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};
use serde::Serialize;
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use tracing::{error, info, warn};

fn parse_duration(s: &str) -> Result<Duration, String> {
    let parsed = s
        .parse::<humantime::Duration>()
        .map_err(|e| format!("invalid duration '{}': {}", s, e))?;
    Duration::from_std(*parsed).map_err(|e| format!("duration '{}' out of range: {}", s, e))
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// List all users, with optional expiry filtering
    #[command(visible_alias = "ls")]
    List(ListArgs),
    /// Show certificate details of users
    #[command(visible_aliases = ["get", "show"])]
    Info(InfoArgs),
    /// Issue certificates for new users
    #[command(visible_aliases = ["add", "create"])]
    New(NewArgs),
    /// Renew certificates of existing users
    Renew(RenewArgs),
    /// Revoke the certificates of existing users
    #[command(visible_aliases = ["rm", "del", "delete"])]
    Remove(RemoveArgs),
    /// Create redistributable packages for users
    #[command(visible_alias = "pkg")]
    Package(PackageArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show expired certificates
    #[arg(short = 'e', long = "expired")]
    pub only_expired: bool,

    /// Only show certificates expiring within DURATION (e.g. "30d", "2weeks")
    #[arg(
        short = 'n',
        long = "near-expiry",
        value_name = "DURATION",
        conflicts_with = "only_expired",
        value_parser = parse_duration
    )]
    pub near_expiry: Option<Duration>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Users to show
    #[arg(value_name = "NAME", required = true)]
    pub usernames: Vec<Username>,
}

#[derive(Args, Debug)]
pub struct NewArgs {
    /// Users to issue certificates for
    #[arg(value_name = "NAME", required = true)]
    pub usernames: Vec<Username>,

    /// Number of days the certificates stay valid
    #[arg(short = 'd', long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub days: Option<u32>,
}

#[derive(Args, Debug)]
pub struct RenewArgs {
    /// Users to renew
    #[arg(value_name = "NAME", required = true)]
    pub usernames: Vec<Username>,

    /// Number of days the renewed certificates stay valid
    #[arg(short = 'd', long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub days: Option<u32>,

    /// Do not revoke the replaced certificates
    #[arg(short = 'k', long)]
    pub keep_old: bool,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Users to revoke
    #[arg(value_name = "NAME", required = true)]
    pub usernames: Vec<Username>,
}

#[derive(Args, Debug)]
pub struct PackageArgs {
    /// Users to package
    #[arg(value_name = "NAME", required = true)]
    pub usernames: Vec<Username>,

    /// Prefix package names with the profile name
    #[arg(long, visible_alias = "pre")]
    pub add_prefix: bool,

    /// Write packages here instead of the current directory
    #[arg(short = 'o', long, value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    /// Keep the temporary staging directories (for debugging)
    #[arg(long)]
    pub keep_temp: bool,
}

/// Which users `user list` shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListFilter {
    All,
    Expired,
    NearExpiry(Duration),
}

impl ListFilter {
    fn from_args(args: &ListArgs) -> Self {
        match (args.only_expired, args.near_expiry) {
            (true, _) => ListFilter::Expired,
            (false, Some(window)) => ListFilter::NearExpiry(window),
            (false, None) => ListFilter::All,
        }
    }

    /// Users without a readable certificate only show up unfiltered.
    fn matches(&self, info: Option<&CertInfo>, now: DateTime<Utc>) -> bool {
        match (self, info) {
            (ListFilter::All, _) => true,
            (_, None) => false,
            (ListFilter::Expired, Some(info)) => info.is_expired(now),
            (ListFilter::NearExpiry(window), Some(info)) => info.expires_within(now, *window),
        }
    }
}

#[derive(Serialize)]
struct ListItem {
    name: Username,
    not_after: Option<DateTime<Utc>>,
    status: Option<ExpiryStatus>,
    has_key: bool,
}

pub fn run(ctx: &CliContext, cmd: UserCommand) -> Result<()> {
    let loaded = ctx.load_config()?;
    let profile = loaded.profile(ctx.profile.as_deref())?;
    let pki = loaded.pki(profile);
    if !pki.root.is_dir() {
        bail!(
            "PKI directory {} of profile \"{}\" does not exist",
            pki.root.display(),
            profile.name
        );
    }

    match cmd {
        UserCommand::List(args) => run_list(&pki, args),
        UserCommand::Info(args) => run_info(&pki, args),
        UserCommand::New(args) => run_new(ctx, &loaded, profile, &pki, args),
        UserCommand::Renew(args) => run_renew(ctx, &loaded, profile, &pki, args),
        UserCommand::Remove(args) => run_remove(ctx, &loaded, profile, &pki, args),
        UserCommand::Package(args) => run_package(ctx, &loaded, profile, &pki, args),
    }
}

fn run_list(pki: &PkiPaths, args: ListArgs) -> Result<()> {
    let filter = ListFilter::from_args(&args);
    let now = Utc::now();
    let soon = Duration::days(constants::EXPIRY_WARNING_DAYS);

    let mut items = Vec::new();
    for user in pki.list_users()? {
        let cert_path = pki.cert_file(&user);
        let info = if cert_path.is_file() {
            match cert::read(&cert_path) {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!("{}: {:#}", user, e);
                    None
                }
            }
        } else {
            None
        };
        if !filter.matches(info.as_ref(), now) {
            continue;
        }
        items.push(ListItem {
            has_key: pki.key_file(&user).is_file(),
            not_after: info.as_ref().map(|i| i.not_after),
            status: info.as_ref().map(|i| i.status(now, soon)),
            name: user,
        });
    }

    if args.format == OutputFormat::Json {
        let json = serde_json::to_string_pretty(&items).context("serialize users")?;
        println!("{}", json);
        return Ok(());
    }

    if items.is_empty() {
        println!("No users found");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Expires").add_attribute(Attribute::Bold),
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new("Key").add_attribute(Attribute::Bold),
    ]);
    for item in items {
        let expires = item
            .not_after
            .map(|t| {
                let local: DateTime<Local> = t.into();
                local.format("%Y-%m-%d %H:%M").to_string()
            })
            .unwrap_or_else(|| "-".to_string());
        let status = item
            .status
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        table.add_row(vec![
            item.name.to_string(),
            expires,
            status,
            if item.has_key { "yes" } else { "missing" }.to_string(),
        ]);
    }

    println!("{}", table);
    Ok(())
}

fn run_info(pki: &PkiPaths, args: InfoArgs) -> Result<()> {
    let users = unique_users(args.usernames)?;
    let now = Utc::now();
    let soon = Duration::days(constants::EXPIRY_WARNING_DAYS);

    for (i, user) in users.iter().enumerate() {
        let cert_path = pki.cert_path(user)?;
        let info = cert::read(&cert_path)?;
        let key = pki.key_file(user);

        if i > 0 {
            println!();
        }
        println!("name: {}", user);
        println!("subject: {}", info.subject);
        println!("issuer: {}", info.issuer);
        println!("serial: {}", info.serial);
        println!("not_before: {}", info.not_before.to_rfc3339());
        println!("not_after: {}", info.not_after.to_rfc3339());
        println!("status: {}", info.status(now, soon).as_str());
        println!("sha256: {}", info.sha256_fingerprint);
        println!("cert: {}", cert_path.display());
        if key.is_file() {
            println!("key: {}", key.display());
        } else {
            println!("key: -");
        }
    }
    Ok(())
}

fn run_new(
    ctx: &CliContext,
    loaded: &LoadedConfig,
    profile: &Profile,
    pki: &PkiPaths,
    args: NewArgs,
) -> Result<()> {
    let users = unique_users(args.usernames)?;
    for user in &users {
        if pki.user_exists(user) {
            bail!("{} already exists in profile {}", user, profile.name);
        }
    }

    let rsa = loaded.easy_rsa(pki);
    {
        let _lock = PkiLock::acquire(&pki.root)?;
        for user in &users {
            rsa.build_client_full(user, args.days)?;
            println!("Issued {}", user);
        }
    }

    ctx.run_post_action(profile, pki, ActionType::New, &users)
}

fn run_renew(
    ctx: &CliContext,
    loaded: &LoadedConfig,
    profile: &Profile,
    pki: &PkiPaths,
    args: RenewArgs,
) -> Result<()> {
    let users = unique_users(args.usernames)?;
    require_certs(pki, profile, &users)?;

    if !args.keep_old
        && !ctx.confirm(&format!(
            "Renew {} in profile {} and revoke the old certificates?",
            join_users(&users),
            profile.name
        ))?
    {
        println!("Aborted");
        return Ok(());
    }

    let rsa = loaded.easy_rsa(pki);
    {
        let _lock = PkiLock::acquire(&pki.root)?;
        let (renewed, result) = apply_each(&users, "Renewed", |user| {
            rsa.renew(user, args.days)?;
            if !args.keep_old {
                rsa.revoke_renewed(user)?;
            }
            Ok(())
        });
        if !args.keep_old && renewed > 0 {
            rsa.gen_crl()?;
            info!("regenerated CRL for profile {}", profile.name);
        }
        result?;
    }

    ctx.run_post_action(profile, pki, ActionType::Renew, &users)
}

fn run_remove(
    ctx: &CliContext,
    loaded: &LoadedConfig,
    profile: &Profile,
    pki: &PkiPaths,
    args: RemoveArgs,
) -> Result<()> {
    let users = unique_users(args.usernames)?;
    require_certs(pki, profile, &users)?;

    if !ctx.confirm(&format!(
        "Revoke {} in profile {}?",
        join_users(&users),
        profile.name
    ))? {
        println!("Aborted");
        return Ok(());
    }

    let rsa = loaded.easy_rsa(pki);
    {
        let _lock = PkiLock::acquire(&pki.root)?;
        let (revoked, result) = apply_each(&users, "Revoked", |user| rsa.revoke(user));
        if revoked > 0 {
            rsa.gen_crl()?;
            info!("regenerated CRL for profile {}", profile.name);
        }
        result?;
    }

    ctx.run_post_action(profile, pki, ActionType::Remove, &users)
}

fn run_package(
    ctx: &CliContext,
    loaded: &LoadedConfig,
    profile: &Profile,
    pki: &PkiPaths,
    args: PackageArgs,
) -> Result<()> {
    let Some(packaging) = &profile.packaging else {
        bail!("profile {} has no [profile.packaging] section", profile.name);
    };
    let users = unique_users(args.usernames)?;
    require_certs(pki, profile, &users)?;

    let output_dir = match args.output_dir {
        Some(dir) => dir,
        None => env::current_dir().context("resolve current directory")?,
    };
    let opts = PackageOptions {
        add_prefix: args.add_prefix,
        output_dir,
        keep_temp: args.keep_temp,
        overwrite: ctx.force,
    };

    for user in &users {
        let out = package::build(&loaded.dir, &profile.name, packaging, pki, user, &opts)?;
        println!("Wrote {}", out.display());
    }

    ctx.run_post_action(profile, pki, ActionType::Package, &users)
}

/// Reject repeated names so easyrsa is never asked to act twice on one user.
fn unique_users(users: Vec<Username>) -> Result<Vec<Username>> {
    let mut seen = HashSet::new();
    for user in &users {
        if !seen.insert(user) {
            bail!("{} was given more than once", user);
        }
    }
    Ok(users)
}

fn require_certs(pki: &PkiPaths, profile: &Profile, users: &[Username]) -> Result<()> {
    for user in users {
        if !pki.cert_file(user).is_file() {
            bail!("{} does not exist in profile {}", user, profile.name);
        }
    }
    Ok(())
}

/// Run `op` for every user without stopping at the first failure.
/// Returns how many succeeded and the combined error.
fn apply_each<F>(users: &[Username], done_verb: &str, mut op: F) -> (usize, Result<()>)
where
    F: FnMut(&Username) -> Result<()>,
{
    let mut succeeded = 0;
    let mut failed = Vec::new();
    for user in users {
        match op(user) {
            Ok(()) => {
                println!("{} {}", done_verb, user);
                succeeded += 1;
            }
            Err(e) => {
                error!("{}: {:#}", user, e);
                failed.push(user.as_str());
            }
        }
    }
    let result = if failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("easyrsa failed for {}", failed.join(", ")))
    };
    (succeeded, result)
}

fn join_users(users: &[Username]) -> String {
    users
        .iter()
        .map(Username::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
