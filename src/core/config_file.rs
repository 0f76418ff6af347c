//! Locating, loading and writing the TOML config file.

use crate::constants;
use crate::models::config::Config;
use anyhow::{anyhow, Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// `<platform config dir>/openvpn-cred-management/config.toml`.
pub fn default_path() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| anyhow!("cannot determine the config directory; pass --config"))?;
    Ok(base
        .join(constants::CONFIG_DIR_NAME)
        .join(constants::CONFIG_FILE_NAME))
}

/// Use the explicit path if given, otherwise the default location.
pub fn resolve_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => default_path(),
    }
}

pub fn load(path: &Path) -> Result<Config> {
    debug!("loading config from {}", path.display());
    let content = fs::read_to_string(path).with_context(|| {
        format!(
            "read config {} (run `{} gen config` to create one)",
            path.display(),
            constants::BIN_NAME
        )
    })?;
    let config: Config =
        toml::from_str(&content).with_context(|| format!("parse config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// Atomically write `content` to `path`, creating parent directories.
pub fn save(path: &Path, content: &str) -> Result<()> {
    let parent = crate::util::path::parent_dir(path);
    fs::create_dir_all(&parent).with_context(|| format!("create dir {}", parent.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent).context("create temp config")?;
    tmp.write_all(content.as_bytes()).context("write config")?;
    tmp.flush().ok();

    #[cfg(unix)]
    {
        let perm = fs::Permissions::from_mode(constants::CONFIG_FILE_MODE);
        tmp.as_file()
            .set_permissions(perm)
            .context("set permissions on temp config")?;
    }

    tmp.persist(path)
        .map_err(|err| anyhow!("persist config {}: {}", path.display(), err))?;
    Ok(())
}

/// Render `config` as TOML with explanatory comments.
pub fn render_annotated(config: &Config) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Configuration for {}.", constants::BIN_NAME);
    out.push_str("#\n");
    out.push_str("# Relative paths resolve against the directory containing this file.\n\n");

    out.push_str("# Path to the easyrsa executable.\n");
    let _ = writeln!(out, "easy-rsa-path = {}", toml_path(&config.easy_rsa_path));

    if let Some(default) = &config.default_profile {
        out.push_str("\n# Profile used when --profile is not given.\n");
        let _ = writeln!(out, "default-profile = {}", toml_str(default));
    }

    for profile in &config.profiles {
        out.push_str("\n# One table per easy-rsa PKI.\n");
        out.push_str("[[profile]]\n");
        let _ = writeln!(out, "name = {}", toml_str(&profile.name));
        out.push_str("# The easy-rsa PKI directory.\n");
        let _ = writeln!(out, "easy-rsa-pki-dir = {}", toml_path(&profile.easy_rsa_pki_dir));

        if let Some(packaging) = &profile.packaging {
            out.push_str("\n# Settings for `user package`.\n");
            out.push_str("[profile.packaging]\n");
            out.push_str("# Files included in every package. Symlinks are followed.\n");
            let _ = writeln!(out, "skel-dir = {}", toml_path(&packaging.skel_dir));
            out.push_str("# Run in a temporary copy of the skeleton; $OCM_USER names the user.\n");
            let _ = writeln!(
                out,
                "skel-map-scripts = {}",
                toml_str_array(&packaging.skel_map_scripts)
            );
            out.push_str("# Locations of the certificate and key inside the package.\n");
            let _ = writeln!(out, "cert-subpath = {}", toml_path(packaging.cert_subpath.as_ref()));
            let _ = writeln!(out, "key-subpath = {}", toml_path(packaging.key_subpath.as_ref()));
        }

        if let Some(scripts) = &profile.post_action_scripts {
            out.push_str("\n# Run in the current directory after each action succeeds.\n");
            out.push_str("# Environment: OCM_ACTION, OCM_PROFILE, OCM_PKI_DIR, OCM_USERS.\n");
            out.push_str("[profile.post-action-scripts]\n");
            for (action, list) in scripts.iter() {
                let _ = writeln!(out, "{} = {}", action, toml_str_array(list));
            }
        }
    }
    out
}

fn toml_str(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

fn toml_path(p: &Path) -> String {
    toml_str(&p.to_string_lossy())
}

fn toml_str_array(items: &[String]) -> String {
    toml::Value::Array(items.iter().cloned().map(toml::Value::String).collect()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::Profile;
    use tempfile::TempDir;

    #[test]
    fn test_example_roundtrip() {
        let example = Config::example();
        let rendered = render_annotated(&example);
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, example);
        assert!(rendered.contains("# Path to the easyrsa executable."));
    }

    #[test]
    fn test_render_without_optional_sections() {
        let config = Config {
            easy_rsa_path: PathBuf::from("/usr/bin/easyrsa"),
            default_profile: None,
            profiles: vec![Profile {
                name: "bare".into(),
                easy_rsa_pki_dir: PathBuf::from("pki"),
                packaging: None,
                post_action_scripts: None,
            }],
        };
        let rendered = render_annotated(&config);
        assert!(!rendered.contains("[profile.packaging]"));
        assert!(!rendered.contains("default-profile"));
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");
        save(&path, &render_annotated(&Config::example())).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, Config::example());
        #[cfg(unix)]
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn test_load_missing_mentions_gen_config() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("gen config"));
    }

    #[test]
    fn test_load_rejects_dangling_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "easy-rsa-path = \"/x\"\ndefault-profile = \"ghost\"\n[[profile]]\nname = \"real\"\neasy-rsa-pki-dir = \"pki\"\n",
        )
        .unwrap();
        let err = load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("ghost"));
    }

    #[test]
    fn test_resolve_path_prefers_explicit() {
        let explicit = PathBuf::from("/tmp/ocm.toml");
        assert_eq!(resolve_path(Some(explicit.clone())).unwrap(), explicit);
    }
}
