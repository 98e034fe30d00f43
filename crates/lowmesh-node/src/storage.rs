//! Key material and network state persistence.
//!
//! A get/set-by-path file store rooted at one directory. Keys are relative
//! `/`-separated paths and may not leave the root. Writes are atomic: the
//! data goes to a `.tmp` sibling first and is renamed into place.
//!
//! Running without storage (`Option<Storage>` = `None`) is a valid
//! configuration; nothing here is required for the stack to operate.

use std::path::{Component, Path, PathBuf};

use tokio::fs;

use crate::storage_codec::{
    self, FRAME_COUNTER_PATH, GROUP_KEY_PATH, StorageCodecError, StoredFrameCounter, StoredGroupKey,
};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record codec: {0}")]
    Codec(#[from] StorageCodecError),

    #[error("key '{0}' is not a relative path inside the store")]
    InvalidPath(String),
}

/// File-backed store for one node.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Create a store rooted at `root`, creating the directory if needed.
    ///
    /// # Note
    /// This performs blocking I/O (`create_dir_all`). Call at startup.
    pub fn new(root: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read the value stored at `key`. A missing file is `Ok(None)`.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Store `data` at `key`, creating intermediate directories.
    pub async fn set(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        self.atomic_write(&path, data).await
    }

    // -----------------------------------------------------------------------
    // Typed records
    // -----------------------------------------------------------------------

    /// Save the group key. The file is made owner-only on Unix.
    pub async fn save_group_key(&self, record: &StoredGroupKey) -> Result<(), StorageError> {
        self.set(GROUP_KEY_PATH, &storage_codec::encode_group_key(record)?).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let path = self.resolve(GROUP_KEY_PATH)?;
            fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        Ok(())
    }

    pub async fn load_group_key(&self) -> Result<Option<StoredGroupKey>, StorageError> {
        self.load_with(GROUP_KEY_PATH, storage_codec::decode_group_key).await
    }

    pub async fn save_frame_counter(&self, record: StoredFrameCounter) -> Result<(), StorageError> {
        self.set(FRAME_COUNTER_PATH, &storage_codec::encode_frame_counter(&record)?).await
    }

    pub async fn load_frame_counter(&self) -> Result<Option<StoredFrameCounter>, StorageError> {
        self.load_with(FRAME_COUNTER_PATH, storage_codec::decode_frame_counter).await
    }

    async fn load_with<T>(
        &self,
        key: &str,
        decode: fn(&[u8]) -> Result<T, StorageCodecError>,
    ) -> Result<Option<T>, StorageError> {
        let Some(bytes) = self.get(key).await? else {
            return Ok(None);
        };
        Ok(Some(decode(&bytes)?))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let invalid = || StorageError::InvalidPath(key.to_string());
        if key.is_empty() || key.contains('\\') || key.ends_with(".tmp") {
            return Err(invalid());
        }
        let relative = Path::new(key);
        let mut segments = 0;
        for component in relative.components() {
            match component {
                Component::Normal(_) => segments += 1,
                _ => return Err(invalid()),
            }
        }
        if segments == 0 || key.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
            return Err(invalid());
        }
        Ok(self.root.join(relative))
    }

    async fn atomic_write(&self, path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).unwrap();

        storage.set("network/config", b"hello").await.unwrap();
        assert_eq!(storage.get("network/config").await.unwrap(), Some(b"hello".to_vec()));
        assert!(dir.path().join("network").join("config").exists());
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(storage.get("keys/none").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).unwrap();
        storage.set("a", b"one").await.unwrap();
        storage.set("a", b"two").await.unwrap();
        assert_eq!(storage.get("a").await.unwrap(), Some(b"two".to_vec()));
        assert!(!dir.path().join("a.tmp").exists());
    }

    #[tokio::test]
    async fn test_paths_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("root")).unwrap();
        for key in ["../outside", "/etc/passwd", "", "a//b", "./a", "a/../../b", "a\\b", "x.tmp"] {
            assert!(
                matches!(storage.set(key, b"x").await, Err(StorageError::InvalidPath(_))),
                "{key} should be rejected"
            );
        }
        assert!(!dir.path().join("outside").exists());
    }

    #[tokio::test]
    async fn test_group_key_record_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).unwrap();
        let record = StoredGroupKey {
            index: 1,
            key: [0xC3; 16],
            remaining_secs: 3600,
        };
        storage.save_group_key(&record).await.unwrap();
        assert_eq!(storage.load_group_key().await.unwrap(), Some(record));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = std::fs::metadata(dir.path().join("keys").join("group")).unwrap();
            assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_corrupt_frame_counter_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).unwrap();
        storage.set(FRAME_COUNTER_PATH, &[]).await.unwrap();
        assert!(matches!(
            storage.load_frame_counter().await,
            Err(StorageError::Codec(StorageCodecError::Deserialize(_)))
        ));
    }

    #[tokio::test]
    async fn test_frame_counter_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(storage.load_frame_counter().await.unwrap(), None);
        storage
            .save_frame_counter(StoredFrameCounter { high_water: 4096 })
            .await
            .unwrap();
        assert_eq!(
            storage.load_frame_counter().await.unwrap(),
            Some(StoredFrameCounter { high_water: 4096 })
        );
    }

    #[test]
    fn test_storage_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        Storage::new(nested.clone()).unwrap();
        assert!(nested.is_dir());
    }
}
