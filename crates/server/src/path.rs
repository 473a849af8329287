//! Log path resolution: request filenames are confined to the base directory.

use std::path::{Component, Path, PathBuf};

use crate::error::{ApiError, ApiResult};

/// `^[A-Za-z0-9._-]+$`, excluding `.` and `..`.
pub fn is_valid_filename(filename: &str) -> bool {
    !filename.is_empty()
        && filename != "."
        && filename != ".."
        && filename
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

/// Join `filename` under `base`, refusing anything that could leave it.
///
/// The check is lexical; symlinks inside the base directory are followed
/// by the open.
pub fn resolve_log_path(base: &Path, filename: &str) -> ApiResult<PathBuf> {
    if !is_valid_filename(filename) {
        return Err(ApiError::InvalidRequest(format!(
            "invalid filename '{}'",
            filename
        )));
    }

    let resolved = base.join(filename);
    let confined = match resolved.strip_prefix(base) {
        Ok(rest) => {
            let mut components = rest.components();
            matches!(
                (components.next(), components.next()),
                (Some(Component::Normal(_)), None)
            )
        }
        Err(_) => false,
    };
    if !confined {
        return Err(ApiError::InvalidRequest(format!(
            "invalid filename '{}'",
            filename
        )));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_names() {
        for name in ["caddy.log", "app-2024_01.log", "syslog", ".hidden", "a..b"] {
            assert!(is_valid_filename(name), "{name}");
        }
    }

    #[test]
    fn test_rejects_traversal_and_separators() {
        for name in ["", ".", "..", "../etc/passwd", "a/b", "a\\b", "app log", "app%2flog", "ünï.log"] {
            assert!(!is_valid_filename(name), "{name}");
        }
    }

    #[test]
    fn test_resolves_under_base() {
        let base = Path::new("/var/log");
        let resolved = tokio_test::assert_ok!(resolve_log_path(base, "caddy.log"));
        assert_eq!(resolved, PathBuf::from("/var/log/caddy.log"));
    }

    #[test]
    fn test_rejects_escape() {
        let base = Path::new("/var/log");
        tokio_test::assert_err!(resolve_log_path(base, ".."));
        assert!(matches!(
            resolve_log_path(base, "../shadow"),
            Err(ApiError::InvalidRequest(_))
        ));
    }
}
