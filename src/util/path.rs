//! Path normalization without filesystem access.

use std::path::{Component, Path, PathBuf};

/// Normalize a path by resolving `.` and `..` components without filesystem access.
pub fn normalize(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                components.pop();
            }
            Component::CurDir => {}
            other => components.push(other),
        }
    }
    components.iter().collect()
}

/// Check if `path` is contained within `root` after normalization.
pub fn is_within(path: &Path, root: &Path) -> bool {
    let normalized = normalize(path);
    let root_normalized = normalize(root);
    normalized.starts_with(&root_normalized)
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Directory containing `file`, treating a bare file name as living in `.`.
pub fn parent_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_simple() {
        assert_eq!(normalize(Path::new("/a/b/c")), PathBuf::from("/a/b/c"));
    }

    #[test]
    fn test_normalize_dotdot() {
        assert_eq!(normalize(Path::new("/a/b/../c")), PathBuf::from("/a/c"));
    }

    #[test]
    fn test_normalize_dot() {
        assert_eq!(normalize(Path::new("creds/./client.crt")), PathBuf::from("creds/client.crt"));
    }

    #[test]
    fn test_is_within_true() {
        assert!(is_within(
            Path::new("skel/creds/client.key"),
            Path::new("skel")
        ));
    }

    #[test]
    fn test_is_within_false_traversal() {
        assert!(!is_within(
            Path::new("skel/../../etc/passwd"),
            Path::new("skel")
        ));
    }

    #[test]
    fn test_resolve_against() {
        assert_eq!(
            resolve_against(Path::new("/etc/ocm"), Path::new("pki")),
            PathBuf::from("/etc/ocm/pki")
        );
        assert_eq!(
            resolve_against(Path::new("/etc/ocm"), Path::new("/srv/pki")),
            PathBuf::from("/srv/pki")
        );
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir(Path::new("config.toml")), PathBuf::from("."));
        assert_eq!(parent_dir(Path::new("/etc/ocm/config.toml")), PathBuf::from("/etc/ocm"));
    }
}
