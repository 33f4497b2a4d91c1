//! Lexical path helpers
//!
//! Paths here are never resolved against the filesystem: build trees are
//! frequently moved between machines, so only the textual form matters.

use std::path::{Component, Path, PathBuf};

/// Normalize `.` and `..` components without touching the filesystem
pub fn clean(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(comp),
            },
            _ => out.push(comp),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Express `target` relative to `base`
///
/// Returns `None` when one path is absolute and the other is not, or when
/// `base` climbs above its own root so that no relative form exists.
pub fn relative_to(base: &Path, target: &Path) -> Option<PathBuf> {
    let base = clean(base);
    let target = clean(target);
    if base.is_absolute() != target.is_absolute() {
        return None;
    }
    let base_parts: Vec<Component> = base
        .components()
        .filter(|c| *c != Component::CurDir)
        .collect();
    let target_parts: Vec<Component> = target
        .components()
        .filter(|c| *c != Component::CurDir)
        .collect();

    let common = base_parts
        .iter()
        .zip(target_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    if base_parts[common..]
        .iter()
        .any(|c| *c == Component::ParentDir)
    {
        return None;
    }

    let mut rel = PathBuf::new();
    for _ in common..base_parts.len() {
        rel.push("..");
    }
    for comp in &target_parts[common..] {
        rel.push(comp.as_os_str());
    }
    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    Some(rel)
}

/// Render a path with forward slashes for descriptions and metadata
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
