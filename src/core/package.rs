//! Building redistributable per-user zip packages.
//!
//! A package is the profile's skeleton directory, transformed by its
//! skeleton-map scripts, with the user's certificate and key dropped in at the
//! configured subpaths. Everything is staged in a temporary directory and
//! zipped under a single top-level folder named after the package.

use crate::constants;
use crate::core::pki::PkiPaths;
use crate::core::scripts::{self, ScriptEnv};
use crate::models::action::ActionType;
use crate::models::config::Packaging;
use crate::models::username::Username;
use crate::util::{fs as ocm_fs, path};
use anyhow::{anyhow, bail, Context, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Per-invocation packaging options.
#[derive(Debug, Clone)]
pub struct PackageOptions {
    pub add_prefix: bool,
    pub output_dir: PathBuf,
    pub keep_temp: bool,
    pub overwrite: bool,
}

/// `<profile>-<user>` with a prefix, `<user>` without.
pub fn package_name(profile: &str, user: &Username, add_prefix: bool) -> String {
    if add_prefix {
        format!("{}-{}", profile, user)
    } else {
        user.to_string()
    }
}

pub fn package_path(output_dir: &Path, name: &str) -> PathBuf {
    output_dir.join(format!("{}.{}", name, constants::PACKAGE_EXTENSION))
}

/// Build the package for `user` and return the path of the written zip.
pub fn build(
    config_dir: &Path,
    profile: &str,
    packaging: &Packaging,
    pki: &PkiPaths,
    user: &Username,
    opts: &PackageOptions,
) -> Result<PathBuf> {
    let cert = pki.cert_path(user)?;
    let key = pki.key_path(user)?;

    let name = package_name(profile, user, opts.add_prefix);
    let out = package_path(&opts.output_dir, &name);
    if out.exists() && !opts.overwrite {
        bail!("{} already exists (use --force to overwrite)", out.display());
    }

    let skel = path::resolve_against(config_dir, &packaging.skel_dir);
    if !skel.is_dir() {
        bail!("skeleton directory {} does not exist", skel.display());
    }

    let tmp = tempfile::Builder::new()
        .prefix("ocm-pkg-")
        .tempdir()
        .context("create temp directory")?;
    let stage = tmp.path().join(&name);
    fs::create_dir_all(&stage).with_context(|| format!("create {}", stage.display()))?;
    ocm_fs::copy_dir(&skel, &stage)
        .with_context(|| format!("copy skeleton {}", skel.display()))?;
    debug!("staged skeleton for {} in {}", user, stage.display());

    let users = std::slice::from_ref(user);
    let env = ScriptEnv::for_action(ActionType::Package, profile, &pki.root, users)
        .cwd(&stage)
        .var(scripts::ENV_USER, user.as_str());
    scripts::run_all("skel-map", &packaging.skel_map_scripts, &env)?;

    let cert_data = fs::read(&cert).with_context(|| format!("read {}", cert.display()))?;
    ocm_fs::write_file(
        &stage.join(&packaging.cert_subpath),
        &cert_data,
        constants::PACKAGE_CERT_MODE,
    )?;
    let key_data = fs::read(&key).with_context(|| format!("read {}", key.display()))?;
    ocm_fs::write_file(
        &stage.join(&packaging.key_subpath),
        &key_data,
        constants::PACKAGE_KEY_MODE,
    )?;

    write_zip(tmp.path(), &stage, &out)?;
    info!("wrote package {}", out.display());

    if opts.keep_temp {
        let kept = tmp.keep();
        info!("kept temporary files in {}", kept.display());
    }
    Ok(out)
}

/// Zip `stage` into `out`, naming entries relative to `base`.
fn write_zip(base: &Path, stage: &Path, out: &Path) -> Result<()> {
    let out_dir = path::parent_dir(out);
    fs::create_dir_all(&out_dir).with_context(|| format!("create {}", out_dir.display()))?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".ocm-pkg-")
        .tempfile_in(&out_dir)
        .context("create temp package")?;

    {
        let mut zip = ZipWriter::new(tmp.as_file_mut());
        for entry in WalkDir::new(stage).sort_by_file_name() {
            let entry = entry.with_context(|| format!("walk {}", stage.display()))?;
            let rel = entry
                .path()
                .strip_prefix(base)
                .with_context(|| format!("relativize {}", entry.path().display()))?;
            let entry_name = zip_entry_name(rel)?;
            let options = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(file_mode(entry.path())?);
            if entry.file_type().is_dir() {
                zip.add_directory(entry_name, options)
                    .with_context(|| format!("add directory {}", rel.display()))?;
            } else {
                zip.start_file(entry_name, options)
                    .with_context(|| format!("add file {}", rel.display()))?;
                let mut src = File::open(entry.path())
                    .with_context(|| format!("open {}", entry.path().display()))?;
                io::copy(&mut src, &mut zip)
                    .with_context(|| format!("compress {}", entry.path().display()))?;
            }
        }
        zip.finish().context("finish zip archive")?;
    }
    tmp.flush().context("flush package")?;

    tmp.persist(out)
        .map_err(|err| anyhow!("persist package {}: {}", out.display(), err))?;
    Ok(())
}

/// Forward-slash path as stored inside the archive.
fn zip_entry_name(rel: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str()
                    .ok_or_else(|| anyhow!("{} is not valid UTF-8", rel.display()))?
                    .to_string(),
            ),
            _ => bail!("unexpected path component in {}", rel.display()),
        }
    }
    Ok(parts.join("/"))
}

fn file_mode(p: &Path) -> Result<u32> {
    #[cfg(unix)]
    {
        let meta = fs::metadata(p).with_context(|| format!("stat {}", p.display()))?;
        Ok(meta.permissions().mode() & 0o7777)
    }
    #[cfg(not(unix))]
    {
        Ok(if p.is_dir() { 0o755 } else { 0o644 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cert::test_cert;
    use crate::models::config::RelativePathBuf;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    struct Fixture {
        _root: TempDir,
        config_dir: PathBuf,
        pki: PkiPaths,
        packaging: Packaging,
        out_dir: PathBuf,
    }

    fn fixture(skel_map_scripts: Vec<String>) -> Fixture {
        let root = TempDir::new().unwrap();
        let config_dir = root.path().to_path_buf();
        let pki = PkiPaths::from_root(config_dir.join("pki"));
        fs::create_dir_all(&pki.issued).unwrap();
        fs::create_dir_all(&pki.private).unwrap();
        let (cert, key) = test_cert("alice", (2031, 1, 1));
        fs::write(pki.issued.join("alice.crt"), cert).unwrap();
        fs::write(pki.private.join("alice.key"), key).unwrap();

        let skel = config_dir.join("skel");
        fs::create_dir_all(skel.join("conf")).unwrap();
        fs::write(skel.join("client.ovpn"), "remote vpn.example.com 1194\n").unwrap();
        fs::write(skel.join("conf/README"), "read me\n").unwrap();

        let out_dir = config_dir.join("out");
        Fixture {
            _root: root,
            config_dir,
            pki,
            packaging: Packaging {
                skel_dir: PathBuf::from("skel"),
                skel_map_scripts,
                cert_subpath: RelativePathBuf::try_from("creds/client.crt").unwrap(),
                key_subpath: RelativePathBuf::try_from("creds/client.key").unwrap(),
            },
            out_dir,
        }
    }

    fn opts(f: &Fixture, add_prefix: bool, overwrite: bool) -> PackageOptions {
        PackageOptions {
            add_prefix,
            output_dir: f.out_dir.clone(),
            keep_temp: false,
            overwrite,
        }
    }

    fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> String {
        let mut s = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn test_package_name() {
        let alice = Username::parse("alice").unwrap();
        assert_eq!(package_name("office", &alice, false), "alice");
        assert_eq!(package_name("office", &alice, true), "office-alice");
    }

    #[test]
    fn test_zip_entry_name() {
        assert_eq!(zip_entry_name(Path::new("alice/creds/client.crt")).unwrap(), "alice/creds/client.crt");
        assert!(zip_entry_name(Path::new("../x")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_build_contents() {
        let f = fixture(vec![
            "echo \"user=$OCM_USER profile=$OCM_PROFILE action=$OCM_ACTION users=$OCM_USERS\" > whoami".into(),
            "echo \"$OCM_PKI_DIR\" > pki-dir".into(),
        ]);
        let alice = Username::parse("alice").unwrap();
        let out = build(&f.config_dir, "office", &f.packaging, &f.pki, &alice, &opts(&f, true, false))
            .unwrap();
        assert_eq!(out, f.out_dir.join("office-alice.zip"));

        let mut archive = ZipArchive::new(File::open(&out).unwrap()).unwrap();
        assert!(read_entry(&mut archive, "office-alice/client.ovpn").contains("vpn.example.com"));
        assert_eq!(read_entry(&mut archive, "office-alice/conf/README"), "read me\n");
        assert_eq!(
            read_entry(&mut archive, "office-alice/whoami").trim(),
            "user=alice profile=office action=package users=alice"
        );
        assert_eq!(
            read_entry(&mut archive, "office-alice/pki-dir").trim(),
            f.pki.root.to_string_lossy()
        );
        assert!(read_entry(&mut archive, "office-alice/creds/client.crt").contains("BEGIN CERTIFICATE"));
        assert!(read_entry(&mut archive, "office-alice/creds/client.key").contains("PRIVATE KEY"));

        let key_mode = archive
            .by_name("office-alice/creds/client.key")
            .unwrap()
            .unix_mode()
            .unwrap();
        assert_eq!(key_mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_build_keep_temp_leaves_staging_dir() {
        let f = fixture(vec!["pwd > \"$OCM_PKI_DIR/staged-at\"".into()]);
        let alice = Username::parse("alice").unwrap();
        let mut options = opts(&f, false, false);
        options.keep_temp = true;
        build(&f.config_dir, "office", &f.packaging, &f.pki, &alice, &options).unwrap();

        let staged = PathBuf::from(fs::read_to_string(f.pki.root.join("staged-at")).unwrap().trim());
        assert!(staged.join("creds/client.key").is_file());
        fs::remove_dir_all(staged.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_build_refuses_existing_without_overwrite() {
        let f = fixture(vec![]);
        let alice = Username::parse("alice").unwrap();
        build(&f.config_dir, "office", &f.packaging, &f.pki, &alice, &opts(&f, false, false)).unwrap();
        let err = build(&f.config_dir, "office", &f.packaging, &f.pki, &alice, &opts(&f, false, false))
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
        build(&f.config_dir, "office", &f.packaging, &f.pki, &alice, &opts(&f, false, true)).unwrap();
    }

    #[test]
    fn test_build_missing_user() {
        let f = fixture(vec![]);
        let bob = Username::parse("bob").unwrap();
        assert!(build(&f.config_dir, "office", &f.packaging, &f.pki, &bob, &opts(&f, false, false)).is_err());
        assert!(!f.out_dir.join("bob.zip").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_build_failing_skel_script_writes_nothing() {
        let f = fixture(vec!["exit 1".into()]);
        let alice = Username::parse("alice").unwrap();
        assert!(build(&f.config_dir, "office", &f.packaging, &f.pki, &alice, &opts(&f, false, false)).is_err());
        assert!(!f.out_dir.join("alice.zip").exists());
    }

    #[test]
    fn test_build_missing_skel() {
        let mut f = fixture(vec![]);
        f.packaging.skel_dir = PathBuf::from("nowhere");
        let alice = Username::parse("alice").unwrap();
        let err = build(&f.config_dir, "office", &f.packaging, &f.pki, &alice, &opts(&f, false, false))
            .unwrap_err();
        assert!(err.to_string().contains("skeleton"));
    }
}
