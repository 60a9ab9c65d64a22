//! Persistent device identity.

use crate::{create_storage, SecureStorage, StorageKeys};
use classhopper_core::Paths;
use tracing::{debug, warn};
use uuid::Uuid;

/// Stable identifier for this installation, sent as the device id in
/// credential requests.
pub struct DeviceIdentity;

impl DeviceIdentity {
    /// Return the stored device id, generating and persisting one on first use.
    ///
    /// Storage failures never surface: the caller gets a fresh random id for
    /// this process and a warning is logged.
    pub fn load_or_create(storage: &dyn SecureStorage) -> String {
        match storage.get(StorageKeys::DEVICE_ID) {
            Ok(Some(id)) if !id.trim().is_empty() => return id,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Failed to read device id, using ephemeral id");
                return Uuid::new_v4().to_string();
            }
        }

        let id = Uuid::new_v4().to_string();
        match storage.set(StorageKeys::DEVICE_ID, &id) {
            Ok(()) => debug!(device_id = %id, "Generated device id"),
            Err(e) => warn!(error = %e, "Failed to persist device id, it will change next run"),
        }
        id
    }

    /// Like [`load_or_create`](Self::load_or_create) against the default store
    /// under `paths`. A store that cannot be opened (missing directory, corrupt
    /// file) also yields a fresh random id.
    pub fn load_or_create_at(paths: &Paths) -> String {
        if let Err(e) = paths.ensure_dirs() {
            warn!(error = %e, "Cannot create application directory, using ephemeral device id");
            return Uuid::new_v4().to_string();
        }

        match create_storage(paths) {
            Ok(storage) => Self::load_or_create(storage.as_ref()),
            Err(e) => {
                warn!(error = %e, "Session store unavailable, using ephemeral device id");
                Uuid::new_v4().to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStorage, StorageError, StorageResult};

    struct BrokenStorage;

    impl SecureStorage for BrokenStorage {
        fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::Backend("read-only".into()))
        }

        fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            Err(StorageError::Backend("unavailable".into()))
        }

        fn delete(&self, _key: &str) -> StorageResult<bool> {
            Err(StorageError::Backend("read-only".into()))
        }
    }

    #[test]
    fn test_device_id_is_stable() {
        let storage = MemoryStorage::new();
        let first = DeviceIdentity::load_or_create(&storage);
        let second = DeviceIdentity::load_or_create(&storage);

        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
        assert_eq!(storage.get(StorageKeys::DEVICE_ID).unwrap(), Some(first));
    }

    #[test]
    fn test_existing_id_is_reused() {
        let storage = MemoryStorage::new();
        storage.set(StorageKeys::DEVICE_ID, "preset-id").unwrap();
        assert_eq!(DeviceIdentity::load_or_create(&storage), "preset-id");
    }

    #[test]
    fn test_blank_id_is_replaced() {
        let storage = MemoryStorage::new();
        storage.set(StorageKeys::DEVICE_ID, "  ").unwrap();
        let id = DeviceIdentity::load_or_create(&storage);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_store_under_paths_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path());

        let first = DeviceIdentity::load_or_create_at(&paths);
        let second = DeviceIdentity::load_or_create_at(&paths);
        assert!(Uuid::parse_str(&first).is_ok());
        assert_eq!(first, second);
    }

    #[test]
    fn test_corrupt_store_falls_back_to_random() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path());
        std::fs::write(paths.store_file(), "{not json").unwrap();

        let id = DeviceIdentity::load_or_create_at(&paths);
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(std::fs::read_to_string(paths.store_file()).unwrap(), "{not json");
    }

    #[test]
    fn test_broken_storage_falls_back_to_random() {
        let a = DeviceIdentity::load_or_create(&BrokenStorage);
        let b = DeviceIdentity::load_or_create(&BrokenStorage);
        assert!(Uuid::parse_str(&a).is_ok());
        assert_ne!(a, b);
    }
}
