//! Whole-file JSON persistence under an advisory lock.
//!
//! [`load_json`] and [`save_json`] run the file work on Tokio's blocking
//! pool, so callers holding an async lock never block a runtime worker.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use cbridge_core::prelude::*;

/// Read and parse `path` under a shared lock.
///
/// A missing or empty file yields `T::default()`.
fn read_json<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(Error::storage(format!("Failed to open {:?}: {}", path, e))),
    };

    file.lock_shared()
        .map_err(|e| Error::storage(format!("Failed to lock {:?}: {}", path, e)))?;

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| Error::storage(format!("Failed to read {:?}: {}", path, e)))?;

    if content.trim().is_empty() {
        return Ok(T::default());
    }

    serde_json::from_str(&content)
        .map_err(|e| Error::storage(format!("Corrupt data file {:?}: {}", path, e)))
}

/// [`read_json`] on the blocking pool.
pub(crate) async fn load_json<T>(path: PathBuf) -> Result<T>
where
    T: DeserializeOwned + Default + Send + 'static,
{
    tokio::task::spawn_blocking(move || read_json(&path))
        .await
        .map_err(|e| Error::storage(format!("Persistence task failed: {}", e)))?
}

/// Serialize `value` on the caller, then write it on the blocking pool.
pub(crate) async fn save_json<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let content = serde_json::to_string_pretty(value)?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_content(&path, &content))
        .await
        .map_err(|e| Error::storage(format!("Persistence task failed: {}", e)))?
}

/// Replace the contents of `path` under an exclusive lock.
fn write_content(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::storage(format!("Failed to create {:?}: {}", parent, e)))?;
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| Error::storage(format!("Failed to open {:?}: {}", path, e)))?;

    // Truncate only while holding the lock.
    file.lock_exclusive()
        .map_err(|e| Error::storage(format!("Failed to lock {:?}: {}", path, e)))?;
    file.set_len(0)
        .map_err(|e| Error::storage(format!("Failed to truncate {:?}: {}", path, e)))?;
    file.write_all(content.as_bytes())
        .map_err(|e| Error::storage(format!("Failed to write {:?}: {}", path, e)))?;
    file.flush()
        .map_err(|e| Error::storage(format!("Failed to flush {:?}: {}", path, e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_and_empty_files_are_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.json");

        let missing: BTreeMap<String, i32> = read_json(&path).unwrap();
        assert!(missing.is_empty());

        std::fs::write(&path, "  \n").unwrap();
        let empty: BTreeMap<String, i32> = read_json(&path).unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_shorter_write_leaves_no_trailing_bytes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("data.json");

        save_json(&path, &vec!["a long first value".to_string()]).await.unwrap();
        save_json(&path, &vec!["b".to_string()]).await.unwrap();

        let back: Vec<String> = read_json(&path).unwrap();
        assert_eq!(back, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_blocking_pool_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("data.json");

        let mut data = BTreeMap::new();
        data.insert("answer".to_string(), 42);
        save_json(&path, &data).await.unwrap();

        let back: BTreeMap<String, i32> = load_json(path.clone()).await.unwrap();
        assert_eq!(back, data);

        let missing: BTreeMap<String, i32> =
            load_json(temp.path().join("missing.json")).await.unwrap();
        assert!(missing.is_empty());
    }
}
