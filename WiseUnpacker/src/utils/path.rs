//! Path utilities
//!
//! Installer scripts spell paths the Windows way (`%MAINDIR%\sub\file.txt`,
//! `C:\WINDOWS`). These helpers turn them into paths under an output
//! directory on the host.

use std::path::{MAIN_SEPARATOR, PathBuf};

/// Replace both Windows and Unix separators with the host separator.
pub fn normalize_path(path: &str) -> String {
    path.chars()
        .map(|c| if c == '\\' || c == '/' { MAIN_SEPARATOR } else { c })
        .collect()
}

/// Remove `%` characters, keeping the variable names they surround.
pub fn strip_placeholders(path: &str) -> String {
    path.replace('%', "")
}

/// Drop a trailing `*.*` wildcard and any separator before it.
pub fn strip_wildcard(path: &str) -> &str {
    path.strip_suffix("*.*")
        .unwrap_or(path)
        .trim_end_matches(['\\', '/'])
}

/// Build a relative path that cannot leave the directory it is joined to.
///
/// Empty, `.` and `..` components are dropped, as are drive prefixes such
/// as `C:`.
pub fn sanitize_relative(path: &str) -> PathBuf {
    path.split(['\\', '/'])
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .filter(|part| !(part.len() == 2 && part.ends_with(':')))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_normalize_path() {
        let expected = format!("a{MAIN_SEPARATOR}b{MAIN_SEPARATOR}c");
        assert_eq!(normalize_path("a\\b/c"), expected);
    }

    #[test]
    fn test_strip_placeholders() {
        assert_eq!(strip_placeholders("%MAINDIR%\\readme.txt"), "MAINDIR\\readme.txt");
    }

    #[test]
    fn test_strip_wildcard() {
        assert_eq!(strip_wildcard("/src\\sub\\*.*"), "/src\\sub");
        assert_eq!(strip_wildcard("plain"), "plain");
    }

    #[test]
    fn test_sanitize_relative() {
        assert_eq!(sanitize_relative("/src\\sub\\"), Path::new("src").join("sub"));
        assert_eq!(
            sanitize_relative("C:\\WINDOWS\\..\\system.ini"),
            Path::new("WINDOWS").join("system.ini")
        );
        assert_eq!(sanitize_relative(""), PathBuf::new());
    }
}
