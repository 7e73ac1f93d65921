use indexmap::IndexSet;
use std::path::{Path, PathBuf};

/// Orders the paths the remapper resolves symbols against.
///
/// The result is `input` (unless it is already one of `siblings`), then the
/// siblings, the platform artifact and its dependencies. Paths are compared
/// as given; the first occurrence of a path wins.
pub fn build_resolution_roots(
    input: &Path,
    siblings: &[PathBuf],
    platform: &Path,
    platform_dependencies: &[PathBuf],
) -> Vec<PathBuf> {
    let mut roots = IndexSet::with_capacity(siblings.len() + platform_dependencies.len() + 2);
    if !siblings.iter().any(|sibling| sibling == input) {
        roots.insert(input.to_path_buf());
    }
    roots.extend(siblings.iter().cloned());
    roots.insert(platform.to_path_buf());
    roots.extend(platform_dependencies.iter().cloned());
    roots.into_iter().collect()
}
