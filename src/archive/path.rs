//! Path-safety helpers for the archive layer (spec.md §3, §4.5, §8).
//! Purely lexical: no component is ever resolved against the real
//! filesystem, so these hold regardless of what `base` actually
//! contains.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, ErrorKind, Result};

/// Cleans a slash-separated archive entry path and asserts it's a safe
/// relative path: never absolute, never escaping above its own root
/// once every `.`/`..` component has been resolved lexically.
pub fn clean_relative(path: &str) -> Result<PathBuf> {
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(Error::wrapped(
            ErrorKind::Archive,
            format!("absolute path in archive: {}", path),
        ));
    }
    let mut stack: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                if stack.pop().is_none() {
                    return Err(Error::wrapped(
                        ErrorKind::Archive,
                        format!("path escapes archive root: {}", path),
                    ));
                }
            }
            other => stack.push(other),
        }
    }
    Ok(stack.into_iter().collect())
}

/// Joins an already-cleaned `relative` path onto `base`, asserting the
/// result is still contained within `base`.
pub fn join_within(base: &Path, relative: &Path) -> Result<PathBuf> {
    let joined = base.join(relative);
    if !joined.starts_with(base) {
        return Err(Error::wrapped(
            ErrorKind::Archive,
            format!("path escapes base directory: {}", relative.display()),
        ));
    }
    Ok(joined)
}

/// Lexically resolves `target` (a symlink's stored target, slash
/// separated) against `link_parent`, without touching the filesystem.
/// Rejects absolute targets outright.
fn resolve_lexical(link_parent: &Path, target: &str) -> Result<PathBuf> {
    if target.starts_with('/') || target.starts_with('\\') {
        return Err(Error::wrapped(
            ErrorKind::Archive,
            format!("absolute symlink target: {}", target),
        ));
    }
    let mut combined = link_parent.to_path_buf();
    for component in target.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                combined.pop();
            }
            other => combined.push(other),
        }
    }
    Ok(combined)
}

/// Resolves a symlink's target (as it will be stored/read in the
/// archive, relative to the link's own parent directory) and asserts
/// the resolution stays within `base`. Used both by the sender (to
/// decide whether to skip an out-of-tree symlink) and the receiver (to
/// validate an incoming entry before creating the link).
pub fn resolve_symlink_target(base: &Path, link_path: &Path, target: &str) -> Result<PathBuf> {
    let link_parent = link_path.parent().unwrap_or(link_path);
    let resolved = resolve_lexical(link_parent, target)?;
    if !resolved.starts_with(base) {
        return Err(Error::wrapped(
            ErrorKind::Archive,
            format!("symlink target escapes base directory: {}", target),
        ));
    }
    Ok(resolved)
}

/// Expresses `target` (an absolute, filesystem-resolved path) relative
/// to `from` (a directory), purely by comparing path components — no
/// crate in this codebase's dependency tree offers this, so it's a
/// small hand-rolled utility rather than core program logic.
pub fn relative_between(from: &Path, target: &Path) -> PathBuf {
    let from_components: Vec<Component> = from.components().collect();
    let target_components: Vec<Component> = target.components().collect();
    let common = from_components
        .iter()
        .zip(target_components.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut result = PathBuf::new();
    for _ in common..from_components.len() {
        result.push("..");
    }
    for component in &target_components[common..] {
        result.push(component.as_os_str());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_relative_rejects_absolute() {
        assert!(clean_relative("/etc/passwd").is_err());
    }

    #[test]
    fn clean_relative_rejects_escape() {
        assert!(clean_relative("../../etc/passwd").is_err());
        assert!(clean_relative("a/../../b").is_err());
    }

    #[test]
    fn clean_relative_collapses_dots() {
        let cleaned = clean_relative("a/./b/../c").unwrap();
        assert_eq!(cleaned, PathBuf::from("a/c"));
    }

    #[test]
    fn join_within_rejects_escape_via_joined_dotdot() {
        let base = Path::new("/tmp/out");
        // clean_relative would already reject this, but join_within is
        // the last line of defense if it's ever called on its own.
        let escaping = PathBuf::from("../escaped");
        assert!(join_within(base, &escaping).is_err());
    }

    #[test]
    fn resolve_symlink_target_rejects_absolute() {
        let base = Path::new("/tmp/out");
        let link = Path::new("/tmp/out/a/link");
        assert!(resolve_symlink_target(base, link, "/etc/passwd").is_err());
    }

    #[test]
    fn resolve_symlink_target_rejects_escape() {
        let base = Path::new("/tmp/out");
        let link = Path::new("/tmp/out/a/link");
        assert!(resolve_symlink_target(base, link, "../../../etc/passwd").is_err());
    }

    #[test]
    fn resolve_symlink_target_accepts_contained_target() {
        let base = Path::new("/tmp/out");
        let link = Path::new("/tmp/out/a/link");
        let resolved = resolve_symlink_target(base, link, "../b/c.txt").unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/out/b/c.txt"));
    }

    #[test]
    fn relative_between_computes_updown_path() {
        let from = Path::new("/tmp/out/a/b");
        let target = Path::new("/tmp/out/c/d.txt");
        let rel = relative_between(from, target);
        assert_eq!(rel, PathBuf::from("../../c/d.txt"));
    }
}
