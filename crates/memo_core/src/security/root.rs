use super::{SecurityError, SecurityResult};
use std::path::{Component, Path, PathBuf};

/// Resolves `path` to an absolute, normalized project root.
///
/// Relative input is anchored at the current working directory. `.`
/// components are dropped. The filesystem is not touched beyond reading the
/// working directory.
///
/// # Errors
/// - `InvalidRoot` when `path` is empty or contains a `..` component.
/// - `InvalidRoot` when the working directory cannot be read for a relative
///   input.
pub fn validate_root(path: impl AsRef<Path>) -> SecurityResult<PathBuf> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(invalid(path, "path is empty"));
    }
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(invalid(path, "path contains `..` segments"));
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = std::env::current_dir()
            .map_err(|_| invalid(path, "working directory is unavailable"))?;
        cwd.join(path)
    };

    let normalized: PathBuf = absolute
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect();

    if !normalized.is_absolute() {
        return Err(invalid(path, "path does not resolve to an absolute location"));
    }

    Ok(normalized)
}

fn invalid(path: &Path, reason: &'static str) -> SecurityError {
    SecurityError::InvalidRoot {
        path: path.to_path_buf(),
        reason,
    }
}
