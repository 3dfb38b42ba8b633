use crate::access::SessionStore;
use crate::error::Result;
use crate::metrics::{AccessMetrics, DropMetrics};
use crate::objects::ObjectStore;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub scanned: usize,
    pub deactivated: usize,
    pub objects_deleted: usize,
    pub errors: Vec<String>,
}

/// Deactivates drops past their hard deadline and deletes their stored files.
///
/// A failure on one drop is recorded in the summary and the sweep moves on. A drop
/// whose object could not be deleted stays active so the next sweep picks it up
/// again; its deadline already denies access.
pub async fn sweep_expired(
    storage: &dyn Storage,
    objects: &dyn ObjectStore,
    now: DateTime<Utc>,
) -> Result<SweepSummary> {
    let expired = storage.list_expired_drops(now).await?;
    let mut summary = SweepSummary {
        scanned: expired.len(),
        ..Default::default()
    };

    for mut drop in expired {
        if let Some(file) = &drop.file {
            match objects.delete(&file.object_key).await {
                Ok(true) => summary.objects_deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(drop_id = %drop.id, "Failed to delete object {}: {}", file.object_key, e);
                    summary
                        .errors
                        .push(format!("{}: object delete failed: {e}", drop.id));
                    continue;
                }
            }
        }

        drop.file = None;

        drop.is_active = false;
        drop.updated_at = now;
        match storage.update_drop(&drop).await {
            Ok(()) => summary.deactivated += 1,
            Err(e) => {
                warn!(drop_id = %drop.id, "Failed to deactivate drop: {}", e);
                summary.errors.push(format!("{}: deactivate failed: {e}", drop.id));
            }
        }
    }

    DropMetrics::record_expired(summary.deactivated);
    Ok(summary)
}

/// Runs the sweep and session purge every `interval` until the task is dropped.
pub async fn run_sweeper(
    storage: Arc<dyn Storage>,
    objects: Arc<dyn ObjectStore>,
    sessions: Arc<SessionStore>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let now = Utc::now();

        match sweep_expired(storage.as_ref(), objects.as_ref(), now).await {
            Ok(summary) if summary.scanned > 0 => info!(
                scanned = summary.scanned,
                deactivated = summary.deactivated,
                objects_deleted = summary.objects_deleted,
                errors = summary.errors.len(),
                "Expiry sweep finished"
            ),
            Ok(_) => {}
            Err(e) => error!("Expiry sweep failed: {}", e),
        }

        match sessions.purge_expired(now) {
            Ok(purged) if purged > 0 => info!(purged, "Purged expired sessions"),
            Ok(_) => {}
            Err(e) => warn!("Session purge failed: {}", e),
        }
        AccessMetrics::record_sessions_active(sessions.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DropKind, DropRecord, ExpiryMode, StoredFile};
    use crate::error::DropError;
    use crate::objects::LocalObjectStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::storage::InMemoryStorage;
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    fn drop_with(expires_at: Option<DateTime<Utc>>, key: Option<&str>) -> DropRecord {
        let now = Utc::now();
        DropRecord {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "sweep".into(),
            description: None,
            kind: DropKind::File,
            masked_url: None,
            file: key.map(|k| StoredFile {
                object_key: k.to_string(),
                file_name: "f.txt".into(),
                content_type: "text/plain".into(),
                size_bytes: 3,
                sha256: "x".into(),
            }),
            expiry_mode: ExpiryMode::Shared,
            expires_at,
            access_window_minutes: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_sweep_deactivates_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = InMemoryStorage::new();
        let objects = LocalObjectStore::new(dir.path()).unwrap();
        let now = Utc::now();

        objects.put("drops/a/1", b"abc").await.unwrap();
        let expired = drop_with(Some(now - ChronoDuration::minutes(5)), Some("drops/a/1"));
        let live = drop_with(Some(now + ChronoDuration::hours(1)), None);
        let open_ended = drop_with(None, None);
        for d in [&expired, &live, &open_ended] {
            storage.create_drop(d).await.unwrap();
        }

        let summary = sweep_expired(&storage, &objects, now).await.unwrap();
        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.deactivated, 1);
        assert_eq!(summary.objects_deleted, 1);
        assert!(summary.errors.is_empty());

        let swept = storage.get_drop(expired.id).await.unwrap().unwrap();
        assert!(!swept.is_active);
        assert!(swept.file.is_none());
        assert!(objects.get("drops/a/1").await.unwrap().is_none());
        assert!(storage.get_drop(live.id).await.unwrap().unwrap().is_active);

        // Second pass finds nothing left to do
        let again = sweep_expired(&storage, &objects, now).await.unwrap();
        assert_eq!(again.scanned, 0);
    }

    #[tokio::test]
    async fn test_bad_object_key_is_recorded_and_sweep_continues() {
        let dir = tempfile::tempdir().unwrap();
        let storage = InMemoryStorage::new();
        let objects = LocalObjectStore::new(dir.path()).unwrap();
        let now = Utc::now();

        let broken = drop_with(Some(now - ChronoDuration::minutes(1)), Some("../escape"));
        let fine = drop_with(Some(now - ChronoDuration::minutes(1)), None);
        storage.create_drop(&broken).await.unwrap();
        storage.create_drop(&fine).await.unwrap();

        let summary = sweep_expired(&storage, &objects, now).await.unwrap();
        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.deactivated, 1);
        assert_eq!(summary.errors.len(), 1);
        let kept = storage.get_drop(broken.id).await.unwrap().unwrap();
        assert!(kept.is_active);
        assert!(kept.file.is_some());
        assert!(!storage.get_drop(fine.id).await.unwrap().unwrap().is_active);
    }

    /// Fails the first `failures` deletes, then delegates.
    struct FlakyObjectStore {
        inner: LocalObjectStore,
        failures: AtomicUsize,
        deletes: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for FlakyObjectStore {
        async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
            self.inner.put(key, bytes).await
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> Result<bool> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(DropError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk unavailable",
                )));
            }
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_failed_object_delete_is_retried_next_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let storage = InMemoryStorage::new();
        let objects = FlakyObjectStore {
            inner: LocalObjectStore::new(dir.path()).unwrap(),
            failures: AtomicUsize::new(1),
            deletes: AtomicUsize::new(0),
        };
        let now = Utc::now();

        objects.put("drops/b/1", b"abc").await.unwrap();
        let expired = drop_with(Some(now - ChronoDuration::minutes(1)), Some("drops/b/1"));
        storage.create_drop(&expired).await.unwrap();

        let first = sweep_expired(&storage, &objects, now).await.unwrap();
        assert_eq!(first.errors.len(), 1);
        assert_eq!(first.deactivated, 0);

        let second = sweep_expired(&storage, &objects, now).await.unwrap();
        assert_eq!(second.scanned, 1);
        assert_eq!(second.objects_deleted, 1);
        assert_eq!(second.deactivated, 1);
        assert!(second.errors.is_empty());
        assert_eq!(objects.deletes.load(Ordering::SeqCst), 2);

        let swept = storage.get_drop(expired.id).await.unwrap().unwrap();
        assert!(!swept.is_active);
        assert!(swept.file.is_none());
        assert!(objects.get("drops/b/1").await.unwrap().is_none());
    }
}
