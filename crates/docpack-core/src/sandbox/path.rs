//! Root confinement for agent-supplied paths.
//!
//! Resolution happens in two phases:
//!
//! 1. **Lexical**: absolute paths, drive prefixes and `..` segments that
//!    climb above the root are rejected without touching the filesystem.
//! 2. **Canonical**: the deepest existing ancestor of the candidate is
//!    canonicalized (following symlinks) and must still live under the
//!    canonical root. Dangling symlinks are rejected because their target
//!    cannot be checked.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use super::error::{SandboxError, SandboxResult};

/// Normalise `requested` into a root-relative path.
///
/// Returns `None` when the request is absolute or would climb above the root.
pub(crate) fn normalize_relative(requested: &str) -> Option<PathBuf> {
    let mut parts: Vec<&OsStr> = Vec::new();
    for component in Path::new(requested).components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return None,
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::Normal(segment) => parts.push(segment),
        }
    }
    Some(parts.iter().collect())
}

/// Confine `requested` to `root`. `root` must already be canonical.
///
/// The returned path is absolute and may not exist yet.
pub(crate) fn confine(root: &Path, requested: &str) -> SandboxResult<PathBuf> {
    let relative = normalize_relative(requested).ok_or_else(|| SandboxError::escape(requested))?;
    let candidate = root.join(&relative);

    let existing = candidate
        .ancestors()
        .find(|p| p.symlink_metadata().is_ok())
        .ok_or_else(|| SandboxError::escape(requested))?;

    let canonical = match existing.canonicalize() {
        Ok(path) => path,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // Present as an entry but unresolvable: a dangling symlink.
            return Err(SandboxError::escape(requested));
        }
        Err(source) => {
            return Err(SandboxError::Io {
                path: existing.to_path_buf(),
                source,
            })
        }
    };

    if !canonical.starts_with(root) {
        return Err(SandboxError::escape(requested));
    }

    match candidate.strip_prefix(existing) {
        Ok(rest) if rest.as_os_str().is_empty() => Ok(canonical),
        Ok(rest) => Ok(canonical.join(rest)),
        Err(_) => Err(SandboxError::escape(requested)),
    }
}

/// Render `path` relative to `root` with `/` separators, for payloads shown
/// to the agent. Host-absolute paths never leave the sandbox.
pub(crate) fn display_relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let joined = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical_tempdir() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        (dir, root)
    }

    #[test]
    fn test_normalize_keeps_inner_parent_segments() {
        assert_eq!(
            normalize_relative("src/../lib/a.rs"),
            Some(PathBuf::from("lib/a.rs"))
        );
        assert_eq!(normalize_relative("./"), Some(PathBuf::new()));
        assert_eq!(normalize_relative(""), Some(PathBuf::new()));
    }

    #[test]
    fn test_normalize_rejects_climbing_and_absolute() {
        assert_eq!(normalize_relative(".."), None);
        assert_eq!(normalize_relative("../../etc"), None);
        assert_eq!(normalize_relative("a/../../b"), None);
        assert_eq!(normalize_relative("/etc/passwd"), None);
    }

    #[test]
    fn test_lexical_rejection_needs_no_filesystem() {
        // The root does not exist: a rejection here proves no I/O was needed.
        let root = Path::new("/definitely/not/a/real/root");
        let err = confine(root, "../../etc").unwrap_err();
        assert!(matches!(err, SandboxError::PathEscape { .. }));
    }

    #[test]
    fn test_confine_allows_missing_leaf() {
        let (_dir, root) = canonical_tempdir();
        let resolved = confine(&root, "docs/new.md").unwrap();
        assert_eq!(resolved, root.join("docs/new.md"));
    }

    #[cfg(unix)]
    #[test]
    fn test_confine_rejects_symlink_escape() {
        let (_dir, root) = canonical_tempdir();
        let (_outside_dir, outside) = canonical_tempdir();
        std::fs::write(outside.join("secret.txt"), "top secret").unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        let err = confine(&root, "link/secret.txt").unwrap_err();
        assert!(matches!(err, SandboxError::PathEscape { .. }));
        // Also through a path that does not exist below the link.
        let err = confine(&root, "link/nope/deeper.txt").unwrap_err();
        assert!(matches!(err, SandboxError::PathEscape { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_confine_rejects_dangling_symlink() {
        let (_dir, root) = canonical_tempdir();
        std::os::unix::fs::symlink("/nonexistent/target", root.join("dangling")).unwrap();
        let err = confine(&root, "dangling").unwrap_err();
        assert!(matches!(err, SandboxError::PathEscape { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_confine_follows_internal_symlink() {
        let (_dir, root) = canonical_tempdir();
        std::fs::create_dir(root.join("real")).unwrap();
        std::fs::write(root.join("real/a.txt"), "a").unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("alias")).unwrap();

        let resolved = confine(&root, "alias/a.txt").unwrap();
        assert_eq!(resolved, root.join("real/a.txt"));
    }

    #[test]
    fn test_display_relative_uses_forward_slashes() {
        let root = Path::new("/bundle/content");
        assert_eq!(
            display_relative(root, Path::new("/bundle/content/src/main.py")),
            "src/main.py"
        );
        assert_eq!(display_relative(root, root), ".");
    }
}
