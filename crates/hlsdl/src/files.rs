//! Filesystem helpers for segment directories.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::DownloadError;

/// List files in `dir` with the given extension, sorted lexicographically by name.
///
/// Segment names are zero-padded, so this order is playlist order.
pub async fn list_segment_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, DownloadError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!(dir = %dir.display(), count = files.len(), "Listed segment files");
    Ok(files)
}

/// Size of the file at `path` in bytes.
pub async fn file_size(path: &Path) -> Result<u64, DownloadError> {
    Ok(tokio::fs::metadata(path).await?.len())
}

/// Recursively delete `dir`. A missing directory is not an error.
pub async fn remove_dir(dir: &Path) -> Result<(), DownloadError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            debug!(dir = %dir.display(), "Removed segment directory");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to remove segment directory");
            Err(e.into())
        }
    }
}

/// Turn `path` into an absolute path against the current directory.
pub fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn lists_only_matching_files_in_order() {
        let dir = TempDir::new().unwrap();
        for name in ["00010.ts", "00002.ts", "00001.ts", "concat.txt", "00003.ts.part"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.ts")).unwrap();

        let files = list_segment_files(dir.path(), "ts").await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["00001.ts", "00002.ts", "00010.ts"]);
    }

    #[tokio::test]
    async fn remove_dir_tolerates_missing() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("segments");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("00001.ts"), b"x").unwrap();

        remove_dir(&target).await.unwrap();
        assert!(!target.exists());
        remove_dir(&target).await.unwrap();
    }

    #[tokio::test]
    async fn reports_file_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.ts");
        std::fs::write(&path, [0u8; 42]).unwrap();
        assert_eq!(file_size(&path).await.unwrap(), 42);
    }
}
