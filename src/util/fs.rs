use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let perm = fs::Permissions::from_mode(mode);
        fs::set_permissions(path, perm)
            .with_context(|| format!("set permissions {:o} on {}", mode, path.display()))?;
    }
    Ok(())
}

/// Write `data` to `path`, creating parent directories, then apply `mode`.
pub fn write_file(path: &Path, data: &[u8], mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
    set_permissions(path, mode)
}

/// Recursively copy the contents of `src` into `dst`, following symlinks.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.with_context(|| format!("walk {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("relativize {}", entry.path().display()))?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("create directory {}", target.display()))?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!("copy {} to {}", entry.path().display(), target.display())
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_file_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c.txt");
        write_file(&path, b"hello", 0o600).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
        #[cfg(unix)]
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn test_copy_dir_nested() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("conf/sub")).unwrap();
        fs::write(src.path().join("conf/client.ovpn"), "remote vpn").unwrap();
        fs::write(src.path().join("conf/sub/readme"), "hi").unwrap();

        copy_dir(src.path(), dst.path()).unwrap();

        assert_eq!(
            fs::read_to_string(dst.path().join("conf/client.ovpn")).unwrap(),
            "remote vpn"
        );
        assert_eq!(fs::read_to_string(dst.path().join("conf/sub/readme")).unwrap(), "hi");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_dir_follows_symlinks() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("ca.crt"), "CA").unwrap();
        let src = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path().join("ca.crt"), src.path().join("ca.crt"))
            .unwrap();
        let dst = TempDir::new().unwrap();

        copy_dir(src.path(), dst.path()).unwrap();

        let copied = dst.path().join("ca.crt");
        assert!(!fs::symlink_metadata(&copied).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(copied).unwrap(), "CA");
    }
}
