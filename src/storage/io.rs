use crate::core::{Result, SyncError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::{fs, task};

/// Writes to a uniquely named sibling temp file and renames it over `path`.
///
/// Concurrent writers of the same path never share a temp file; the last
/// rename wins and readers only ever see a complete file.
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let path = path.to_path_buf();
    let bytes = bytes.to_vec();
    task::spawn_blocking(move || write_replacing(&path, &bytes))
        .await
        .map_err(|err| SyncError::Io(format!("Atomic write task failed: {}", err)))?
}

fn write_replacing(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|err| {
        SyncError::Io(format!(
            "Failed to create parent directory '{}': {}",
            parent.display(),
            err
        ))
    })?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|err| {
        SyncError::Io(format!("Failed to create temp file in '{}': {}", parent.display(), err))
    })?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|err| {
            SyncError::Io(format!(
                "Failed to write temp file '{}': {}",
                tmp.path().display(),
                err
            ))
        })?;

    tmp.persist(path).map_err(|err| {
        SyncError::Io(format!(
            "Failed to rename temp file '{}' -> '{}': {}",
            err.file.path().display(),
            path.display(),
            err.error
        ))
    })?;
    Ok(())
}

pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|err| {
        SyncError::Serialization(format!("serialize '{}': {}", path.display(), err))
    })?;
    atomic_write(path, &bytes).await
}

/// `None` when the file does not exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Ok(None);
    }
    let bytes = fs::read(path)
        .await
        .map_err(|err| SyncError::Io(format!("Failed to read '{}': {}", path.display(), err)))?;
    let value = serde_json::from_slice(&bytes).map_err(|err| {
        SyncError::Serialization(format!("parse '{}': {}", path.display(), err))
    })?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("value.json");
        write_json(&path, &vec![1, 2, 3]).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec!["value.json"]);

        let back: Option<Vec<u32>> = read_json(&path).await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_concurrent_writers_leave_one_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs.json");

        let writers: Vec<_> = (0..16u32)
            .map(|n| {
                let path = path.clone();
                tokio::spawn(async move {
                    let value: Vec<u32> = (0..=n * 50).collect();
                    write_json(&path, &value).await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let back: Vec<u32> = read_json(&path).await.unwrap().unwrap();
        let last = *back.last().unwrap();
        assert_eq!(back, (0..=last).collect::<Vec<_>>());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let back: Option<Vec<u32>> = read_json(&dir.path().join("absent.json")).await.unwrap();
        assert!(back.is_none());
    }

    #[tokio::test]
    async fn test_read_malformed_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = read_json::<Vec<u32>>(&path).await.unwrap_err();
        assert!(matches!(err, SyncError::Serialization(_)));
    }
}
