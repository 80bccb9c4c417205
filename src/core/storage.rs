use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

use crate::Result;

/// Reads a JSON document. A missing or unreadable file yields `None`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            info!("nothing to load from {}: {}", path.display(), err);
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("{} holds invalid json, ignoring it: {}", path.display(), err);
            None
        }
    }
}

/// Writes pretty JSON next to `path` and renames it into place.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_string_pretty(value)?;
    write_text(path, &data)
}

pub fn write_text(path: &Path, data: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_corrupt_files_read_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(read_json::<Vec<u32>>(&missing).is_none());

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "[1, 2,").unwrap();
        assert!(read_json::<Vec<u32>>(&corrupt).is_none());
    }

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/values.json");
        write_json(&path, &vec![1u32, 2, 3]).unwrap();
        assert_eq!(read_json::<Vec<u32>>(&path), Some(vec![1, 2, 3]));
        assert!(!dir.path().join("nested/deeper/values.json.tmp").exists());
    }
}
