//! Utility functions for file operations and path manipulation

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Suffix of the partial file a download writes before it is renamed into place
pub const PARTIAL_SUFFIX: &str = "tmp";

/// Replace characters that are unsafe in file names
///
/// Letters, digits, spaces and `.-_()` are kept; everything else becomes `_`.
/// Leading and trailing dots and spaces are trimmed so the result never hides
/// itself or escapes its directory.
///
/// # Examples
///
/// ```
/// use episode_grab::utils::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("S01E02: Pilot/Part 1"), "S01E02_ Pilot_Part 1");
/// assert_eq!(sanitize_file_name("../escape"), "_escape");
/// ```
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '.' | '-' | '_' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();
    replaced.trim_matches(|c| c == '.' || c == ' ').to_string()
}

/// Truncate a name to at most `max_chars` characters
pub fn cut(name: &str, max_chars: Option<usize>) -> String {
    match max_chars {
        Some(max) => name.chars().take(max).collect(),
        None => name.to_string(),
    }
}

/// Path of the partial file written while downloading to `output`
pub fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Delete a file if it exists
///
/// Returns true when something was removed.
pub async fn remove_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Find a file next to `expected` with the same stem but another extension
///
/// Downloaders sometimes pick the extension themselves (for instance a muxer
/// writing `.mkv` where `.mp4` was asked for). This is a best-effort match:
/// the first entry of the directory whose stem equals the expected stem wins,
/// partial files excluded.
pub async fn find_file_without_extension(expected: &Path) -> Result<Option<PathBuf>> {
    let (Some(parent), Some(stem)) = (expected.parent(), expected.file_stem()) else {
        return Ok(None);
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };

    let mut entries = match tokio::fs::read_dir(parent).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.file_stem() != Some(stem) {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) == Some(PARTIAL_SUFFIX) {
            continue;
        }
        if entry.file_type().await?.is_file() {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitize_keeps_safe_characters() {
        assert_eq!(sanitize_file_name("Ep 1 - Pilot (HD).mp4"), "Ep 1 - Pilot (HD).mp4");
        assert_eq!(sanitize_file_name("a/b\\c:d*e?f"), "a_b_c_d_e_f");
        assert_eq!(sanitize_file_name("  .hidden. "), "hidden");
        assert_eq!(sanitize_file_name("Épisode été"), "Épisode été");
    }

    #[test]
    fn cut_counts_characters_not_bytes() {
        assert_eq!(cut("ééééé", Some(3)), "ééé");
        assert_eq!(cut("short", Some(10)), "short");
        assert_eq!(cut("anything", None), "anything");
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/d/ep1.mp4")),
            PathBuf::from("/d/ep1.mp4.tmp")
        );
    }

    #[tokio::test]
    async fn remove_if_exists_reports_removal() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("stale.mp4");
        std::fs::write(&file, b"x").unwrap();

        assert!(remove_if_exists(&file).await.unwrap());
        assert!(!file.exists());
        assert!(!remove_if_exists(&file).await.unwrap());
    }

    #[tokio::test]
    async fn finds_same_stem_with_other_extension() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("ep1.mkv"), b"x").unwrap();
        std::fs::write(dir.path().join("ep2.mp4"), b"x").unwrap();

        let found = find_file_without_extension(&dir.path().join("ep1.mp4"))
            .await
            .unwrap();
        assert_eq!(found, Some(dir.path().join("ep1.mkv")));
    }

    #[tokio::test]
    async fn ignores_partial_files_and_missing_dirs() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("ep1.tmp"), b"x").unwrap();

        let found = find_file_without_extension(&dir.path().join("ep1.mp4"))
            .await
            .unwrap();
        assert!(found.is_none());

        let missing = dir.path().join("nope").join("ep1.mp4");
        assert!(find_file_without_extension(&missing).await.unwrap().is_none());
    }
}
