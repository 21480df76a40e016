//! Alert storage: an in-memory map mirrored to a JSON file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use ulid::Ulid;

use crate::model::{Alert, AlertPatch, InvalidAlert, NewAlert};

pub const ALERTS_FILE: &str = "alerts.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("alert store I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("alert store JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] InvalidAlert),
    #[error("alert {0} not found")]
    NotFound(Ulid),
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Alert>, StoreError>;

    async fn list_active(&self) -> Result<Vec<Alert>, StoreError> {
        let mut alerts = self.list_all().await?;
        alerts.retain(|a| a.active);
        Ok(alerts)
    }

    async fn create(&self, new: NewAlert) -> Result<Alert, StoreError>;

    /// Apply a partial update. The patched alert must still validate.
    async fn update(&self, id: Ulid, patch: AlertPatch) -> Result<Alert, StoreError>;

    /// True if the alert existed.
    async fn delete(&self, id: Ulid) -> Result<bool, StoreError>;
}

/// Alerts keyed by id, listed in creation order.
pub struct JsonAlertStore {
    alerts: DashMap<Ulid, Alert>,
    path: Option<PathBuf>,
    /// Serializes file rewrites so concurrent mutations cannot interleave.
    write_lock: Mutex<()>,
}

impl JsonAlertStore {
    /// Open the store in `data_dir`, loading `alerts.json` if present.
    pub async fn open(data_dir: &Path) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(data_dir).await?;
        let path = data_dir.join(ALERTS_FILE);
        let alerts = DashMap::new();
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let loaded: Vec<Alert> = serde_json::from_slice(&bytes)?;
                for alert in loaded {
                    alerts.insert(alert.id, alert);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!(path = %path.display(), count = alerts.len(), "alert store opened");
        Ok(Self {
            alerts,
            path: Some(path),
            write_lock: Mutex::new(()),
        })
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            alerts: DashMap::new(),
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    fn snapshot(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.alerts.iter().map(|e| e.value().clone()).collect();
        sort_by_creation(&mut alerts);
        alerts
    }

    /// Write `alerts` as the new file contents. Caller holds `write_lock` and
    /// touches the map only after this succeeds.
    async fn persist(&self, alerts: &[Alert]) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(alerts)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn sort_by_creation(alerts: &mut [Alert]) {
    alerts.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)));
}

#[async_trait]
impl AlertStore for JsonAlertStore {
    async fn list_all(&self) -> Result<Vec<Alert>, StoreError> {
        Ok(self.snapshot())
    }

    async fn create(&self, new: NewAlert) -> Result<Alert, StoreError> {
        let mut alert = new.into_alert(Ulid::new(), Utc::now());
        alert.normalize();
        alert.validate()?;

        let _guard = self.write_lock.lock().await;
        let mut next = self.snapshot();
        next.push(alert.clone());
        sort_by_creation(&mut next);
        self.persist(&next).await?;
        self.alerts.insert(alert.id, alert.clone());
        tracing::info!(alert = %alert.id, name = %alert.name, "alert created");
        Ok(alert)
    }

    async fn update(&self, id: Ulid, patch: AlertPatch) -> Result<Alert, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut alert = self
            .alerts
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(StoreError::NotFound(id))?;
        patch.apply_to(&mut alert);
        alert.normalize();
        alert.validate()?;

        let next: Vec<Alert> = self
            .snapshot()
            .into_iter()
            .map(|a| if a.id == id { alert.clone() } else { a })
            .collect();
        self.persist(&next).await?;
        self.alerts.insert(id, alert.clone());
        tracing::info!(alert = %id, active = alert.active, "alert updated");
        Ok(alert)
    }

    async fn delete(&self, id: Ulid) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        if !self.alerts.contains_key(&id) {
            return Ok(false);
        }
        let mut next = self.snapshot();
        next.retain(|a| a.id != id);
        self.persist(&next).await?;
        self.alerts.remove(&id);
        tracing::info!(alert = %id, "alert deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SlotTime;
    use chrono::NaiveDate;

    fn new_alert(name: &str, courts: Vec<u32>) -> NewAlert {
        NewAlert {
            name: name.into(),
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            start_time: SlotTime::new(18, 30),
            end_time: SlotTime::new(20, 0),
            courts,
            active: true,
        }
    }

    #[tokio::test]
    async fn create_list_in_creation_order() {
        let store = JsonAlertStore::in_memory();
        let a = store.create(new_alert("first", vec![1])).await.unwrap();
        let b = store.create(new_alert("second", vec![2])).await.unwrap();
        let all = store.list_all().await.unwrap();
        assert_eq!(all.iter().map(|x| x.id).collect::<Vec<_>>(), vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn create_rejects_invalid() {
        let store = JsonAlertStore::in_memory();
        let err = store.create(new_alert("no courts", vec![])).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_normalizes_courts() {
        let store = JsonAlertStore::in_memory();
        let a = store.create(new_alert(" evening ", vec![4, 1, 4])).await.unwrap();
        assert_eq!(a.courts, vec![1, 4]);
        assert_eq!(a.name, "evening");
    }

    #[tokio::test]
    async fn update_patches_and_revalidates() {
        let store = JsonAlertStore::in_memory();
        let a = store.create(new_alert("evening", vec![1])).await.unwrap();

        let patched = store
            .update(a.id, AlertPatch { active: Some(false), ..Default::default() })
            .await
            .unwrap();
        assert!(!patched.active);
        assert!(store.list_active().await.unwrap().is_empty());

        let bad = AlertPatch {
            end_time: Some(SlotTime::new(6, 30)),
            ..Default::default()
        };
        assert!(matches!(store.update(a.id, bad).await, Err(StoreError::Invalid(_))));
        // Rejected patch leaves the stored alert untouched.
        assert_eq!(store.list_all().await.unwrap()[0].end_time, SlotTime::new(20, 0));
    }

    #[tokio::test]
    async fn update_unknown_is_not_found() {
        let store = JsonAlertStore::in_memory();
        let err = store.update(Ulid::new(), AlertPatch::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = JsonAlertStore::in_memory();
        let a = store.create(new_alert("evening", vec![1])).await.unwrap();
        assert!(store.delete(a.id).await.unwrap());
        assert!(!store.delete(a.id).await.unwrap());
    }

    #[tokio::test]
    async fn file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = JsonAlertStore::open(dir.path()).await.unwrap();
            store.create(new_alert("evening", vec![2, 3])).await.unwrap().id
        };
        let store = JsonAlertStore::open(dir.path()).await.unwrap();
        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].courts, vec![2, 3]);
        assert!(!dir.path().join("alerts.json.tmp").exists());
    }

    #[tokio::test]
    async fn failed_write_leaves_alerts_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let store = JsonAlertStore::open(&data_dir).await.unwrap();
        let kept = store.create(new_alert("kept", vec![1])).await.unwrap();
        std::fs::remove_dir_all(&data_dir).unwrap();

        assert!(matches!(
            store.create(new_alert("lost", vec![2])).await,
            Err(StoreError::Io(_))
        ));
        let patch = AlertPatch {
            active: Some(false),
            ..Default::default()
        };
        assert!(store.update(kept.id, patch).await.is_err());
        assert!(store.delete(kept.id).await.is_err());

        let all = store.list_all().await.unwrap();
        assert_eq!(all, vec![kept]);
        assert_eq!(store.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ALERTS_FILE), b"not json").unwrap();
        assert!(matches!(
            JsonAlertStore::open(dir.path()).await,
            Err(StoreError::Json(_))
        ));
    }
}
