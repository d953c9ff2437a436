use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::domain::{AdminRecord, AuthStore, BotError, UserId};

/// Decides who may start downloads.
#[derive(Clone)]
pub struct AuthorizationGate {
    store: Arc<dyn AuthStore>,
    // Serializes read-merge-write cycles against the store.
    sync_lock: Arc<Mutex<()>>,
}

impl AuthorizationGate {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self {
            store,
            sync_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Merges `configured` into the persisted set, creating the record if absent.
    /// Returns the resulting set.
    pub async fn sync_admins(
        &self,
        configured: &BTreeSet<UserId>,
    ) -> Result<BTreeSet<UserId>, BotError> {
        let _held = self.sync_lock.lock().await;

        let merged = match self.store.load().await? {
            Some(existing) => existing.users.union(configured).copied().collect(),
            None => configured.clone(),
        };
        self.store.save(&AdminRecord::new(merged.clone())).await?;

        info!(admins = merged.len(), "Authorized users synchronized");
        Ok(merged)
    }

    /// Reads through to the store on every call.
    pub async fn is_authorized(&self, user_id: UserId) -> Result<bool, BotError> {
        Ok(self
            .store
            .load()
            .await?
            .is_some_and(|record| record.users.contains(&user_id)))
    }
}

/// Persists the admin record as a JSON document on disk.
pub struct JsonFileAuthStore {
    path: PathBuf,
}

impl JsonFileAuthStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AuthStore for JsonFileAuthStore {
    async fn load(&self) -> Result<Option<AdminRecord>, BotError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BotError::Store(format!("read {}: {}", self.path.display(), e))),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| BotError::Store(format!("decode {}: {}", self.path.display(), e)))
    }

    async fn save(&self, record: &AdminRecord) -> Result<(), BotError> {
        let content = serde_json::to_vec_pretty(record)
            .map_err(|e| BotError::Store(format!("encode admin record: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

/// Keeps the admin record in memory.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryAuthStore {
    record: Mutex<Option<AdminRecord>>,
}

#[cfg(test)]
impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
#[async_trait]
impl AuthStore for MemoryAuthStore {
    async fn load(&self) -> Result<Option<AdminRecord>, BotError> {
        Ok(self.record.lock().await.clone())
    }

    async fn save(&self, record: &AdminRecord) -> Result<(), BotError> {
        *self.record.lock().await = Some(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[UserId]) -> BTreeSet<UserId> {
        values.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_sync_creates_record_when_absent() {
        let store = Arc::new(MemoryAuthStore::new());
        let gate = AuthorizationGate::new(store.clone());

        let merged = gate.sync_admins(&ids(&[1, 2])).await.unwrap();
        assert_eq!(merged, ids(&[1, 2]));
        assert_eq!(store.load().await.unwrap().unwrap().id, "admins");
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let gate = AuthorizationGate::new(Arc::new(MemoryAuthStore::new()));

        let once = gate.sync_admins(&ids(&[1, 2])).await.unwrap();
        let twice = gate.sync_admins(&ids(&[1, 2])).await.unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_sync_unions_with_persisted_set() {
        let store = Arc::new(MemoryAuthStore::new());
        store.save(&AdminRecord::new(ids(&[5]))).await.unwrap();
        let gate = AuthorizationGate::new(store);

        let merged = gate.sync_admins(&ids(&[1, 2])).await.unwrap();
        assert_eq!(merged, ids(&[1, 2, 5]));
    }

    #[tokio::test]
    async fn test_is_authorized_reads_through() {
        let store = Arc::new(MemoryAuthStore::new());
        let gate = AuthorizationGate::new(store.clone());
        gate.sync_admins(&ids(&[1])).await.unwrap();

        assert!(gate.is_authorized(1).await.unwrap());
        assert!(!gate.is_authorized(9).await.unwrap());

        // Granted externally, no restart.
        store.save(&AdminRecord::new(ids(&[1, 9]))).await.unwrap();
        assert!(gate.is_authorized(9).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_store_authorizes_nobody() {
        let gate = AuthorizationGate::new(Arc::new(MemoryAuthStore::new()));
        assert!(!gate.is_authorized(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_json_store_round_trips_keyed_record() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state").join("admins.json");
        let gate = AuthorizationGate::new(Arc::new(JsonFileAuthStore::new(&path)));

        gate.sync_admins(&ids(&[3, 1])).await.unwrap();
        gate.sync_admins(&ids(&[2])).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["_id"], "admins");
        assert_eq!(raw["users"], serde_json::json!([1, 2, 3]));
        assert!(gate.is_authorized(2).await.unwrap());
    }

    #[tokio::test]
    async fn test_json_store_reports_corrupt_record() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("admins.json");
        std::fs::write(&path, b"not json").unwrap();

        let err = JsonFileAuthStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, BotError::Store(_)));
    }
}
