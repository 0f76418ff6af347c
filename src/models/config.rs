//! Configuration file model.

use crate::constants;
use crate::models::action::CustomScriptsMap;
use crate::util::path;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A path that is relative and stays inside the directory it is joined onto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PathBuf", into = "PathBuf")]
pub struct RelativePathBuf(PathBuf);

impl TryFrom<PathBuf> for RelativePathBuf {
    type Error = String;

    fn try_from(p: PathBuf) -> Result<Self, Self::Error> {
        if !p.is_relative() {
            return Err(format!("{} is not a relative path", p.display()));
        }
        let normalized = path::normalize(&p);
        if normalized.as_os_str().is_empty() {
            return Err(format!("{} does not name a file", p.display()));
        }
        if !path::is_within(&Path::new("root").join(&p), Path::new("root")) {
            return Err(format!("{} escapes its base directory", p.display()));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<&str> for RelativePathBuf {
    type Error = String;

    fn try_from(p: &str) -> Result<Self, Self::Error> {
        PathBuf::from(p).try_into()
    }
}

impl From<RelativePathBuf> for PathBuf {
    fn from(p: RelativePathBuf) -> Self {
        p.0
    }
}

impl AsRef<Path> for RelativePathBuf {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// Settings for `user package`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Packaging {
    /// Files included in every package. Relative paths resolve against the config dir.
    pub skel_dir: PathBuf,

    /// Scripts run inside a temporary copy of the skeleton before packaging.
    #[serde(default)]
    pub skel_map_scripts: Vec<String>,

    /// Where the user's certificate lands inside the package.
    pub cert_subpath: RelativePathBuf,

    /// Where the user's key lands inside the package.
    pub key_subpath: RelativePathBuf,
}

/// One easy-rsa PKI and its settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Profile {
    pub name: String,

    /// Relative paths resolve against the config dir.
    pub easy_rsa_pki_dir: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packaging: Option<Packaging>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_action_scripts: Option<CustomScriptsMap>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub easy_rsa_path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,

    #[serde(default, rename = "profile")]
    pub profiles: Vec<Profile>,
}

impl Config {
    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for profile in &self.profiles {
            if profile.name.trim().is_empty() {
                bail!("profile name cannot be empty");
            }
            if !seen.insert(profile.name.as_str()) {
                bail!("duplicate profile name \"{}\"", profile.name);
            }
        }
        if let Some(name) = &self.default_profile {
            if !seen.contains(name.as_str()) {
                bail!(
                    "default profile \"{}\" does not reference a known profile",
                    name
                );
            }
        }
        Ok(())
    }

    /// Select a profile by explicit name, falling back to `default-profile`.
    pub fn get_profile(&self, name: Option<&str>) -> Result<&Profile> {
        let Some(name) = name.or(self.default_profile.as_deref()) else {
            bail!("No profile specified (use --profile or set default-profile)");
        };
        match self.profiles.iter().find(|p| p.name == name) {
            Some(profile) => Ok(profile),
            None => bail!("Cannot find a profile named \"{}\"", name),
        }
    }

    /// Example config written by `gen config`.
    pub fn example() -> Self {
        let easy_rsa_path = constants::EASY_RSA_CANDIDATES
            .iter()
            .map(Path::new)
            .find(|p| p.is_file())
            .unwrap_or_else(|| Path::new(constants::EASY_RSA_CANDIDATES[0]))
            .to_path_buf();

        let packaging = Packaging {
            skel_dir: PathBuf::from("skel/example/"),
            skel_map_scripts: vec![
                "echo \"Customise the skeleton for $OCM_USER here\"".to_string(),
            ],
            cert_subpath: RelativePathBuf(PathBuf::from("creds/client.crt")),
            key_subpath: RelativePathBuf(PathBuf::from("creds/client.key")),
        };

        Self {
            easy_rsa_path,
            default_profile: Some("example".to_string()),
            profiles: vec![Profile {
                name: "example".to_string(),
                easy_rsa_pki_dir: PathBuf::from("/etc/openvpn/server/example.auth.d/"),
                packaging: Some(packaging),
                post_action_scripts: Some(CustomScriptsMap::example()),
            }],
        }
    }
}
