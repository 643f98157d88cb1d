//! Item path sanitization.

use crate::error::PackageError;

/// Rejects any `relative_path` whose `/`-separated segments contain `..`.
///
/// `allow_non_filesystem` lifts the restriction for item types marked as
/// non-filesystem (e.g. key-action items).
pub fn validate_relative_path(path: &str, allow_non_filesystem: bool) -> Result<(), PackageError> {
    if allow_non_filesystem {
        return Ok(());
    }
    for segment in path.split('/') {
        if segment == ".." {
            return Err(PackageError::Format(format!(
                "relative_path {:?} contains a disallowed '..' segment",
                path
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_paths() {
        assert!(validate_relative_path("docs/hello.txt", false).is_ok());
        assert!(validate_relative_path("hello.txt", false).is_ok());
    }

    #[test]
    fn rejects_dotdot_segment() {
        assert!(validate_relative_path("../etc/passwd", false).is_err());
        assert!(validate_relative_path("docs/../etc/passwd", false).is_err());
    }

    #[test]
    fn allows_dotdot_for_non_filesystem_items() {
        assert!(validate_relative_path("../etc/passwd", true).is_ok());
    }

    #[test]
    fn dotdot_inside_a_longer_segment_is_fine() {
        assert!(validate_relative_path("weird..name/file", false).is_ok());
    }
}
