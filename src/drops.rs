//! Drop lifecycle for owners, plus the public view recipients see.

use crate::access::{normalize_email, AccessSession, SessionStore};
use crate::auth::effective_tier;
use crate::domain::{
    AccessOutcome, DropAccessLog, DropKind, DropRecipient, DropRecord, ExpiryMode, StoredFile, User,
};
use crate::email::{self, Mailer};
use crate::error::{DropError, Result};
use crate::guard::{check_drop_creation, check_feature, check_file_upload, check_recipients};
use crate::metrics::DropMetrics;
use crate::objects::{content_digest, object_key_for, ObjectStore};
use crate::storage::Storage;
use crate::tiers::Feature;
use crate::usage::UsageTracker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

const MAX_NAME_LEN: usize = 200;
/// One year.
pub const MAX_ACCESS_WINDOW_MINUTES: i64 = 525_600;

fn default_expiry_mode() -> ExpiryMode {
    ExpiryMode::Shared
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDropRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: DropKind,
    #[serde(default)]
    pub masked_url: Option<String>,
    #[serde(default = "default_expiry_mode")]
    pub expiry_mode: ExpiryMode,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub access_window_minutes: Option<i64>,
    #[serde(default)]
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DropDetails {
    #[serde(flatten)]
    pub drop: DropRecord,
    pub recipients: Vec<DropRecipient>,
}

/// What a recipient may learn about a drop before verifying.
#[derive(Debug, Clone, Serialize)]
pub struct PublicDropInfo {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub kind: DropKind,
    pub expiry_mode: ExpiryMode,
    pub expires_at: Option<DateTime<Utc>>,
    pub access_window_minutes: Option<i64>,
    pub is_open: bool,
    pub has_content: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DropAnalytics {
    pub drop_id: Uuid,
    pub total_views: u64,
    pub unique_viewers: u64,
    pub denied_attempts: u64,
    pub recipients: Vec<DropRecipient>,
    pub logs: Vec<DropAccessLog>,
}

#[derive(Debug, Clone)]
pub enum DropContent {
    File {
        bytes: Vec<u8>,
        file_name: String,
        content_type: String,
    },
    Url(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipientsAdded {
    pub added: Vec<DropRecipient>,
    pub skipped: Vec<String>,
}

fn validate_masked_url(raw: Option<&str>) -> Result<String> {
    let url = raw.map(str::trim).unwrap_or_default();
    let lower = url.to_ascii_lowercase();
    let has_host = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'));
    if !has_host {
        return Err(DropError::Validation(
            "url drops need an http(s) masked_url".to_string(),
        ));
    }
    Ok(url.to_string())
}

/// Keeps the last path segment and strips control characters.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Lower-cases, validates and de-duplicates a batch of addresses.
fn normalize_batch(raw: &[String]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut emails = Vec::with_capacity(raw.len());
    for entry in raw {
        let email = normalize_email(entry)?;
        if seen.insert(email.clone()) {
            emails.push(email);
        }
    }
    Ok(emails)
}

fn is_open(drop: &DropRecord, now: DateTime<Utc>) -> bool {
    drop.is_active && drop.expires_at.map_or(true, |at| now < at)
}

#[derive(Clone)]
pub struct DropService {
    storage: Arc<dyn Storage>,
    objects: Arc<dyn ObjectStore>,
    mailer: Arc<dyn Mailer>,
    usage: UsageTracker,
    sessions: Arc<SessionStore>,
    base_url: String,
}

impl DropService {
    pub fn new(
        storage: Arc<dyn Storage>,
        objects: Arc<dyn ObjectStore>,
        mailer: Arc<dyn Mailer>,
        usage: UsageTracker,
        sessions: Arc<SessionStore>,
        base_url: &str,
    ) -> Self {
        Self {
            storage,
            objects,
            mailer,
            usage,
            sessions,
            base_url: base_url.to_string(),
        }
    }

    /// Loads a drop the caller owns. Other owners' drops read as missing.
    async fn owned(&self, owner: &User, drop_id: Uuid) -> Result<DropRecord> {
        self.storage
            .get_drop(drop_id)
            .await?
            .filter(|d| d.owner_id == owner.id)
            .ok_or_else(|| DropError::not_found("drop"))
    }

    pub async fn create(&self, owner: &User, req: CreateDropRequest, now: DateTime<Utc>) -> Result<DropDetails> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(DropError::Validation("name is required".to_string()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(DropError::Validation(format!(
                "name is longer than {MAX_NAME_LEN} characters"
            )));
        }

        let masked_url = match req.kind {
            DropKind::Url => Some(validate_masked_url(req.masked_url.as_deref())?),
            DropKind::File => None,
        };

        let tier = effective_tier(self.storage.as_ref(), owner.id, now).await?;
        let window = match req.expiry_mode {
            ExpiryMode::Shared => {
                match req.expires_at {
                    Some(at) if at > now => {}
                    _ => {
                        return Err(DropError::Validation(
                            "shared drops need an expires_at in the future".to_string(),
                        ))
                    }
                }
                None
            }
            ExpiryMode::PerRecipient => {
                check_feature(tier, Feature::PerRecipientTimers)?;
                let minutes = req.access_window_minutes.unwrap_or(0);
                if minutes <= 0 {
                    return Err(DropError::Validation(
                        "per_recipient drops need access_window_minutes > 0".to_string(),
                    ));
                }
                if minutes > MAX_ACCESS_WINDOW_MINUTES {
                    return Err(DropError::Validation(format!(
                        "access_window_minutes may not exceed {MAX_ACCESS_WINDOW_MINUTES}"
                    )));
                }
                if req.expires_at.is_some_and(|at| at <= now) {
                    return Err(DropError::Validation(
                        "expires_at must be in the future".to_string(),
                    ));
                }
                Some(minutes)
            }
        };

        let emails = normalize_batch(&req.recipients)?;
        let snapshot = self.usage.snapshot(owner.id, now).await?;
        check_drop_creation(tier, &snapshot)?;
        check_recipients(tier, 0, emails.len() as u64)?;

        let drop = DropRecord {
            id: Uuid::new_v4(),
            owner_id: owner.id,
            name: name.to_string(),
            description: req
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            kind: req.kind,
            masked_url,
            file: None,
            expiry_mode: req.expiry_mode,
            expires_at: req.expires_at,
            access_window_minutes: window,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.storage.create_drop(&drop).await?;

        let recipients: Vec<DropRecipient> = emails
            .into_iter()
            .map(|email| DropRecipient::new(drop.id, email, now))
            .collect();
        self.storage.add_recipients(&recipients).await?;

        self.usage
            .record_drop_created(owner.id, recipients.len() as u64, now)
            .await;
        DropMetrics::record_created(drop.kind, recipients.len());
        info!(drop_id = %drop.id, owner_id = %owner.id, kind = drop.kind.as_str(), recipients = recipients.len(), "Drop created");

        self.notify(&drop, owner, &recipients).await;
        Ok(DropDetails { drop, recipients })
    }

    pub async fn list(&self, owner: &User) -> Result<Vec<DropRecord>> {
        self.storage.list_drops_for_owner(owner.id).await
    }

    pub async fn get(&self, owner: &User, drop_id: Uuid) -> Result<DropDetails> {
        let drop = self.owned(owner, drop_id).await?;
        let recipients = self.storage.get_recipients(drop_id).await?;
        Ok(DropDetails { drop, recipients })
    }

    pub async fn delete(&self, owner: &User, drop_id: Uuid) -> Result<()> {
        let drop = self.owned(owner, drop_id).await?;
        if let Some(file) = &drop.file {
            if let Err(e) = self.objects.delete(&file.object_key).await {
                warn!(%drop_id, "Failed to delete object {}: {}", file.object_key, e);
            }
        }
        self.storage.delete_drop(drop_id).await?;
        let revoked = self.sessions.revoke_drop(drop_id)?;

        DropMetrics::record_deleted();
        info!(%drop_id, revoked, "Drop deleted");
        Ok(())
    }

    pub async fn upload_file(
        &self,
        owner: &User,
        drop_id: Uuid,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> Result<DropRecord> {
        let mut drop = self.owned(owner, drop_id).await?;
        if drop.kind != DropKind::File {
            return Err(DropError::Validation(
                "only file drops accept uploads".to_string(),
            ));
        }
        if !drop.is_active {
            return Err(DropError::Validation("drop is no longer active".to_string()));
        }
        if bytes.is_empty() {
            return Err(DropError::Validation("upload body is empty".to_string()));
        }

        let size = bytes.len() as u64;
        let tier = effective_tier(self.storage.as_ref(), owner.id, now).await?;
        let snapshot = self.usage.snapshot(owner.id, now).await?;
        check_file_upload(tier, &snapshot, size, drop.stored_bytes())?;

        let digest = content_digest(bytes);
        let key = object_key_for(drop_id, &digest);
        self.objects
            .put(&key, bytes)
            .instrument(info_span!("object_put", %drop_id))
            .await?;

        let previous = drop.file.replace(StoredFile {
            object_key: key.clone(),
            file_name: sanitize_file_name(file_name),
            content_type: content_type.to_string(),
            size_bytes: size,
            sha256: digest,
        });
        drop.updated_at = now;
        self.storage.update_drop(&drop).await?;

        if let Some(old) = previous.filter(|f| f.object_key != key) {
            if let Err(e) = self.objects.delete(&old.object_key).await {
                warn!(%drop_id, "Failed to delete replaced object {}: {}", old.object_key, e);
            }
        }

        self.usage.record_bytes_uploaded(owner.id, size, now).await;
        DropMetrics::record_upload(size);
        info!(%drop_id, size, "File uploaded");
        Ok(drop)
    }

    pub async fn add_recipients(
        &self,
        owner: &User,
        drop_id: Uuid,
        raw: &[String],
        now: DateTime<Utc>,
    ) -> Result<RecipientsAdded> {
        let drop = self.owned(owner, drop_id).await?;
        let existing = self.storage.get_recipients(drop_id).await?;
        let known: HashSet<&str> = existing.iter().map(|r| r.email.as_str()).collect();

        let (fresh, skipped): (Vec<String>, Vec<String>) = normalize_batch(raw)?
            .into_iter()
            .partition(|e| !known.contains(e.as_str()));

        let tier = effective_tier(self.storage.as_ref(), owner.id, now).await?;
        check_recipients(tier, existing.len() as u64, fresh.len() as u64)?;

        let added: Vec<DropRecipient> = fresh
            .into_iter()
            .map(|email| DropRecipient::new(drop_id, email, now))
            .collect();
        self.storage.add_recipients(&added).await?;
        self.usage
            .record_recipients_added(owner.id, added.len() as u64, now)
            .await;

        info!(%drop_id, added = added.len(), skipped = skipped.len(), "Recipients added");
        self.notify(&drop, owner, &added).await;
        Ok(RecipientsAdded { added, skipped })
    }

    pub async fn remove_recipient(&self, owner: &User, drop_id: Uuid, raw_email: &str) -> Result<()> {
        self.owned(owner, drop_id).await?;
        let email = normalize_email(raw_email)?;
        if !self.storage.remove_recipient(drop_id, &email).await? {
            return Err(DropError::not_found("recipient"));
        }
        info!(%drop_id, "Recipient removed");
        Ok(())
    }

    pub async fn analytics(&self, owner: &User, drop_id: Uuid, now: DateTime<Utc>) -> Result<DropAnalytics> {
        self.owned(owner, drop_id).await?;
        let tier = effective_tier(self.storage.as_ref(), owner.id, now).await?;
        check_feature(tier, Feature::Analytics)?;

        let logs = self.storage.get_access_logs(drop_id).await?;
        let recipients = self.storage.get_recipients(drop_id).await?;
        let granted: Vec<&DropAccessLog> = logs
            .iter()
            .filter(|l| l.outcome == AccessOutcome::Granted)
            .collect();
        let unique: HashSet<&str> = granted.iter().map(|l| l.email.as_str()).collect();

        Ok(DropAnalytics {
            drop_id,
            total_views: granted.len() as u64,
            unique_viewers: unique.len() as u64,
            denied_attempts: (logs.len() - granted.len()) as u64,
            recipients,
            logs,
        })
    }

    pub async fn public_info(&self, drop_id: Uuid, now: DateTime<Utc>) -> Result<PublicDropInfo> {
        let drop = self
            .storage
            .get_drop(drop_id)
            .await?
            .ok_or_else(|| DropError::not_found("drop"))?;
        Ok(PublicDropInfo {
            id: drop.id,
            is_open: is_open(&drop, now),
            has_content: match drop.kind {
                DropKind::File => drop.file.is_some(),
                DropKind::Url => drop.masked_url.is_some(),
            },
            name: drop.name,
            description: drop.description,
            kind: drop.kind,
            expiry_mode: drop.expiry_mode,
            expires_at: drop.expires_at,
            access_window_minutes: drop.access_window_minutes,
        })
    }

    /// Resolves the content behind a session that has already been validated.
    pub async fn content(&self, session: &AccessSession) -> Result<DropContent> {
        use crate::access::DenyReason;

        let drop = self
            .storage
            .get_drop(session.drop_id)
            .await?
            .ok_or(DropError::AccessDenied(DenyReason::Inactive))?;

        match drop.kind {
            DropKind::Url => drop
                .masked_url
                .map(DropContent::Url)
                .ok_or(DropError::AccessDenied(DenyReason::NotReady)),
            DropKind::File => {
                let file = drop
                    .file
                    .ok_or(DropError::AccessDenied(DenyReason::NotReady))?;
                let bytes = self
                    .objects
                    .get(&file.object_key)
                    .await?
                    .ok_or(DropError::AccessDenied(DenyReason::NotReady))?;
                Ok(DropContent::File {
                    bytes,
                    file_name: file.file_name,
                    content_type: file.content_type,
                })
            }
        }
    }

    // Delivery problems never fail the request
    async fn notify(&self, drop: &DropRecord, owner: &User, recipients: &[DropRecipient]) {
        for recipient in recipients {
            let sent = match email::drop_shared(drop, owner, &recipient.email, &self.base_url) {
                Ok(message) => self.mailer.send(&message).await,
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                DropMetrics::record_notification_failed();
                warn!(drop_id = %drop.id, "Failed to notify recipient: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::signup;
    use crate::domain::{Subscription, SubscriptionStatus};
    use crate::email::{EmailMessage, LogMailer};
    use crate::objects::LocalObjectStore;
    use crate::storage::InMemoryStorage;
    use crate::tiers::Tier;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: &EmailMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _message: &EmailMessage) -> Result<()> {
            Err(DropError::Provider {
                message: "smtp down".to_string(),
            })
        }
    }

    struct Fixture {
        service: DropService,
        storage: Arc<InMemoryStorage>,
        _dir: TempDir,
    }

    fn fixture(mailer: Arc<dyn Mailer>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(InMemoryStorage::new());
        let objects = Arc::new(LocalObjectStore::new(dir.path()).unwrap());
        let service = DropService::new(
            storage.clone(),
            objects,
            mailer,
            UsageTracker::new(storage.clone()),
            Arc::new(SessionStore::new()),
            "https://app.example.com",
        );
        Fixture {
            service,
            storage,
            _dir: dir,
        }
    }

    async fn owner(storage: &InMemoryStorage, tier: Tier) -> User {
        let now = Utc::now();
        let user = signup(storage, &format!("{}@example.com", Uuid::new_v4().simple()), None, now)
            .await
            .unwrap();
        if tier != Tier::Free {
            let mut sub = Subscription::free(user.id, now);
            sub.tier = tier;
            sub.status = SubscriptionStatus::Active;
            storage.upsert_subscription(&sub).await.unwrap();
        }
        user
    }

    fn shared_request(name: &str, recipients: &[&str]) -> CreateDropRequest {
        CreateDropRequest {
            name: name.to_string(),
            description: None,
            kind: DropKind::File,
            masked_url: None,
            expiry_mode: ExpiryMode::Shared,
            expires_at: Some(Utc::now() + Duration::days(1)),
            access_window_minutes: None,
            recipients: recipients.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_create_notifies_and_dedupes_recipients() {
        let mailer = Arc::new(RecordingMailer::default());
        let fx = fixture(mailer.clone());
        let user = owner(&fx.storage, Tier::Free).await;

        let details = fx
            .service
            .create(
                &user,
                shared_request("Deck", &["A@x.com", "a@x.com", "b@x.com"]),
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(details.recipients.len(), 2);
        assert_eq!(mailer.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_free_tier_fourth_drop_is_denied() {
        let fx = fixture(Arc::new(LogMailer));
        let user = owner(&fx.storage, Tier::Free).await;
        let now = Utc::now();
        for i in 0..3 {
            fx.service
                .create(&user, shared_request(&format!("d{i}"), &[]), now)
                .await
                .unwrap();
        }
        let err = fx
            .service
            .create(&user, shared_request("d3", &[]), now)
            .await
            .unwrap_err();
        match err {
            DropError::LimitExceeded { prompt } => {
                assert_eq!(prompt.suggested_tier, Some(Tier::Individual));
            }
            other => panic!("expected limit error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_validation_rules() {
        let fx = fixture(Arc::new(LogMailer));
        let user = owner(&fx.storage, Tier::Free).await;
        let now = Utc::now();

        let mut blank = shared_request("  ", &[]);
        assert!(matches!(
            fx.service.create(&user, blank.clone(), now).await,
            Err(DropError::Validation(_))
        ));

        blank.name = "link".into();
        blank.kind = DropKind::Url;
        blank.masked_url = Some("ftp://example.com".into());
        assert!(matches!(
            fx.service.create(&user, blank.clone(), now).await,
            Err(DropError::Validation(_))
        ));

        let mut past = shared_request("old", &[]);
        past.expires_at = Some(now - Duration::minutes(1));
        assert!(matches!(
            fx.service.create(&user, past, now).await,
            Err(DropError::Validation(_))
        ));

        let mut timed = shared_request("timed", &[]);
        timed.expiry_mode = ExpiryMode::PerRecipient;
        timed.access_window_minutes = Some(30);
        assert!(matches!(
            fx.service.create(&user, timed, now).await,
            Err(DropError::FeatureUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_access_window_is_bounded() {
        let fx = fixture(Arc::new(LogMailer));
        let user = owner(&fx.storage, Tier::Individual).await;
        let now = Utc::now();

        let mut timed = shared_request("timed", &["a@example.com"]);
        timed.expiry_mode = ExpiryMode::PerRecipient;
        timed.expires_at = None;
        timed.access_window_minutes = Some(1_000_000_000_000);
        assert!(matches!(
            fx.service.create(&user, timed.clone(), now).await,
            Err(DropError::Validation(_))
        ));

        timed.access_window_minutes = Some(MAX_ACCESS_WINDOW_MINUTES + 1);
        assert!(matches!(
            fx.service.create(&user, timed.clone(), now).await,
            Err(DropError::Validation(_))
        ));

        timed.access_window_minutes = Some(MAX_ACCESS_WINDOW_MINUTES);
        let details = fx.service.create(&user, timed, now).await.unwrap();
        assert_eq!(
            details.drop.access_window_minutes,
            Some(MAX_ACCESS_WINDOW_MINUTES)
        );
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_create() {
        let fx = fixture(Arc::new(FailingMailer));
        let user = owner(&fx.storage, Tier::Free).await;
        let details = fx
            .service
            .create(&user, shared_request("Deck", &["r@x.com"]), Utc::now())
            .await
            .unwrap();
        assert_eq!(details.recipients.len(), 1);
    }

    #[tokio::test]
    async fn test_upload_replaces_previous_object() {
        let fx = fixture(Arc::new(LogMailer));
        let user = owner(&fx.storage, Tier::Free).await;
        let now = Utc::now();
        let drop = fx
            .service
            .create(&user, shared_request("Deck", &[]), now)
            .await
            .unwrap()
            .drop;

        let first = fx
            .service
            .upload_file(&user, drop.id, "../../v1.pdf", "application/pdf", b"one", now)
            .await
            .unwrap();
        let first_file = first.file.unwrap();
        assert_eq!(first_file.file_name, "v1.pdf");

        let second = fx
            .service
            .upload_file(&user, drop.id, "v2.pdf", "application/pdf", b"two!", now)
            .await
            .unwrap();
        assert_eq!(second.stored_bytes(), 4);
        assert!(fx.service.objects.get(&first_file.object_key).await.unwrap().is_none());
        assert_eq!(fx.storage.storage_used_by_owner(user.id).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_free_tier_file_size_limit() {
        let fx = fixture(Arc::new(LogMailer));
        let user = owner(&fx.storage, Tier::Free).await;
        let now = Utc::now();
        let drop = fx
            .service
            .create(&user, shared_request("Big", &[]), now)
            .await
            .unwrap()
            .drop;
        let too_big = vec![0u8; (10 * 1024 * 1024) + 1];
        let err = fx
            .service
            .upload_file(&user, drop.id, "big.bin", "application/octet-stream", &too_big, now)
            .await
            .unwrap_err();
        assert!(matches!(err, DropError::LimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_other_owner_sees_not_found() {
        let fx = fixture(Arc::new(LogMailer));
        let alice = owner(&fx.storage, Tier::Free).await;
        let mallory = owner(&fx.storage, Tier::Free).await;
        let drop = fx
            .service
            .create(&alice, shared_request("Private", &[]), Utc::now())
            .await
            .unwrap()
            .drop;

        assert!(matches!(
            fx.service.get(&mallory, drop.id).await,
            Err(DropError::NotFound { .. })
        ));
        assert!(matches!(
            fx.service.delete(&mallory, drop.id).await,
            Err(DropError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_add_and_remove_recipients() {
        let fx = fixture(Arc::new(LogMailer));
        let user = owner(&fx.storage, Tier::Free).await;
        let now = Utc::now();
        let drop = fx
            .service
            .create(&user, shared_request("Deck", &["a@x.com"]), now)
            .await
            .unwrap()
            .drop;

        let result = fx
            .service
            .add_recipients(&user, drop.id, &["a@x.com".into(), "b@x.com".into()], now)
            .await
            .unwrap();
        assert_eq!(result.added.len(), 1);
        assert_eq!(result.skipped, vec!["a@x.com".to_string()]);

        // Free tier allows 5 per drop; 2 exist
        let many: Vec<String> = (0..4).map(|i| format!("n{i}@x.com")).collect();
        assert!(matches!(
            fx.service.add_recipients(&user, drop.id, &many, now).await,
            Err(DropError::LimitExceeded { .. })
        ));

        fx.service
            .remove_recipient(&user, drop.id, "B@x.com")
            .await
            .unwrap();
        assert!(matches!(
            fx.service.remove_recipient(&user, drop.id, "b@x.com").await,
            Err(DropError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_analytics_requires_paid_tier() {
        let fx = fixture(Arc::new(LogMailer));
        let free = owner(&fx.storage, Tier::Free).await;
        let paid = owner(&fx.storage, Tier::Individual).await;
        let now = Utc::now();

        let free_drop = fx
            .service
            .create(&free, shared_request("f", &[]), now)
            .await
            .unwrap()
            .drop;
        assert!(matches!(
            fx.service.analytics(&free, free_drop.id, now).await,
            Err(DropError::FeatureUnavailable { .. })
        ));

        let paid_drop = fx
            .service
            .create(&paid, shared_request("p", &["r@x.com"]), now)
            .await
            .unwrap()
            .drop;
        let analytics = fx.service.analytics(&paid, paid_drop.id, now).await.unwrap();
        assert_eq!(analytics.total_views, 0);
        assert_eq!(analytics.recipients.len(), 1);
    }

    #[tokio::test]
    async fn test_public_info_hides_location() {
        let fx = fixture(Arc::new(LogMailer));
        let user = owner(&fx.storage, Tier::Free).await;
        let now = Utc::now();
        let mut req = shared_request("Link", &[]);
        req.kind = DropKind::Url;
        req.masked_url = Some("https://secret.example.com/doc".into());
        let drop = fx.service.create(&user, req, now).await.unwrap().drop;

        let info = fx.service.public_info(drop.id, now).await.unwrap();
        assert!(info.is_open);
        assert!(info.has_content);
        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("secret.example.com"));

        let later = fx
            .service
            .public_info(drop.id, now + Duration::days(2))
            .await
            .unwrap();
        assert!(!later.is_open);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("C:\\tmp\\x.txt"), "x.txt");
        assert_eq!(sanitize_file_name("a\"b\n.txt"), "ab.txt");
        assert_eq!(sanitize_file_name(".."), "file");
        assert_eq!(sanitize_file_name(""), "file");
    }
}
