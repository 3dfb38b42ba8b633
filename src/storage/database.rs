use super::traits::Storage;
use crate::db::DatabaseManager;
use crate::domain::*;
use crate::error::{DropError, Result};
use crate::tiers::Tier;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{params, Connection, Row, Rows};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Relational storage on Turso/libSQL.
pub struct DatabaseStorage {
    db: Arc<DatabaseManager>,
}

const USER_COLUMNS: &str = "id, email, display_name, api_token, created_at";
const SUBSCRIPTION_COLUMNS: &str = "user_id, tier, status, provider_customer_id, \
     provider_subscription_id, current_period_end, updated_at";
const DROP_COLUMNS: &str = "id, owner_id, name, description, kind, masked_url, object_key, \
     file_name, content_type, size_bytes, sha256, expiry_mode, expires_at, \
     access_window_minutes, is_active, created_at, updated_at";
const RECIPIENT_COLUMNS: &str =
    "id, drop_id, email, access_started_at, last_accessed_at, access_count, created_at";
const LOG_COLUMNS: &str =
    "id, drop_id, email, outcome, reason, ip_address, user_agent, accessed_at";
const USAGE_COLUMNS: &str =
    "user_id, period, drops_created, recipients_added, bytes_uploaded, updated_at";

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn opt_ts(t: Option<DateTime<Utc>>) -> Option<String> {
    t.map(ts)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| DropError::database(format!("Invalid timestamp '{s}': {e}")))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| DropError::database(format!("Invalid UUID '{s}': {e}")))
}

fn parse_enum<T: FromStr<Err = String>>(s: &str) -> Result<T> {
    s.parse().map_err(DropError::database)
}

/// Reads column `idx`, converting libSQL errors and returning early on failure.
macro_rules! col {
    ($row:expr, $idx:expr) => {
        $row.get($idx).map_err(|e| {
            DropError::database(format!("Failed to read column {}: {e}", $idx))
        })?
    };
    ($row:expr, $idx:expr, $ty:ty) => {
        $row.get::<$ty>($idx).map_err(|e| {
            DropError::database(format!("Failed to read column {}: {e}", $idx))
        })?
    };
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn to_u64(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        id: parse_uuid(&col!(row, 0, String))?,
        email: col!(row, 1),
        display_name: col!(row, 2),
        api_token: col!(row, 3),
        created_at: parse_ts(&col!(row, 4, String))?,
    })
}

fn row_to_subscription(row: &Row) -> Result<Subscription> {
    Ok(Subscription {
        user_id: parse_uuid(&col!(row, 0, String))?,
        tier: col!(row, 1, String)
            .parse::<Tier>()
            .map_err(DropError::database)?,
        status: parse_enum(&col!(row, 2, String))?,
        provider_customer_id: col!(row, 3),
        provider_subscription_id: col!(row, 4),
        current_period_end: parse_opt_ts(col!(row, 5))?,
        updated_at: parse_ts(&col!(row, 6, String))?,
    })
}

fn row_to_drop(row: &Row) -> Result<DropRecord> {
    let object_key: Option<String> = col!(row, 6);
    let file = match object_key {
        Some(object_key) => Some(StoredFile {
            object_key,
            file_name: col!(row, 7, Option<String>).unwrap_or_default(),
            content_type: col!(row, 8, Option<String>).unwrap_or_default(),
            size_bytes: to_u64(col!(row, 9, Option<i64>).unwrap_or(0)),
            sha256: col!(row, 10, Option<String>).unwrap_or_default(),
        }),
        None => None,
    };
    Ok(DropRecord {
        id: parse_uuid(&col!(row, 0, String))?,
        owner_id: parse_uuid(&col!(row, 1, String))?,
        name: col!(row, 2),
        description: col!(row, 3),
        kind: parse_enum(&col!(row, 4, String))?,
        masked_url: col!(row, 5),
        file,
        expiry_mode: parse_enum(&col!(row, 11, String))?,
        expires_at: parse_opt_ts(col!(row, 12))?,
        access_window_minutes: col!(row, 13),
        is_active: col!(row, 14, i64) != 0,
        created_at: parse_ts(&col!(row, 15, String))?,
        updated_at: parse_ts(&col!(row, 16, String))?,
    })
}

fn row_to_recipient(row: &Row) -> Result<DropRecipient> {
    Ok(DropRecipient {
        id: parse_uuid(&col!(row, 0, String))?,
        drop_id: parse_uuid(&col!(row, 1, String))?,
        email: col!(row, 2),
        access_started_at: parse_opt_ts(col!(row, 3))?,
        last_accessed_at: parse_opt_ts(col!(row, 4))?,
        access_count: col!(row, 5),
        created_at: parse_ts(&col!(row, 6, String))?,
    })
}

fn row_to_log(row: &Row) -> Result<DropAccessLog> {
    Ok(DropAccessLog {
        id: parse_uuid(&col!(row, 0, String))?,
        drop_id: parse_uuid(&col!(row, 1, String))?,
        email: col!(row, 2),
        outcome: parse_enum(&col!(row, 3, String))?,
        reason: col!(row, 4),
        ip_address: col!(row, 5),
        user_agent: col!(row, 6),
        accessed_at: parse_ts(&col!(row, 7, String))?,
    })
}

fn row_to_usage(row: &Row) -> Result<UsageRecord> {
    Ok(UsageRecord {
        user_id: parse_uuid(&col!(row, 0, String))?,
        period: col!(row, 1),
        drops_created: to_u64(col!(row, 2)),
        recipients_added: to_u64(col!(row, 3)),
        bytes_uploaded: to_u64(col!(row, 4)),
        updated_at: parse_ts(&col!(row, 5, String))?,
    })
}

async fn collect<T>(mut rows: Rows, map: fn(&Row) -> Result<T>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DropError::database(format!("Failed to read row: {e}")))?
    {
        out.push(map(&row)?);
    }
    Ok(out)
}

async fn first<T>(rows: Rows, map: fn(&Row) -> Result<T>) -> Result<Option<T>> {
    Ok(collect(rows, map).await?.into_iter().next())
}

impl DatabaseStorage {
    pub fn new(db: DatabaseManager) -> Self {
        Self { db: Arc::new(db) }
    }

    async fn conn(&self) -> Result<Connection> {
        self.db.get_connection().await
    }

    async fn query(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Rows> {
        self.conn()
            .await?
            .query(sql, params)
            .await
            .map_err(|e| DropError::database(format!("Query failed: {e}")))
    }

    async fn execute(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<u64> {
        self.conn()
            .await?
            .execute(sql, params)
            .await
            .map_err(|e| DropError::database(format!("Statement failed: {e}")))
    }
}

#[async_trait]
impl Storage for DatabaseStorage {
    async fn create_user(&self, user: &User) -> Result<()> {
        self.execute(
            &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?, ?, ?, ?, ?)"),
            params![
                user.id.to_string(),
                user.email.clone(),
                user.display_name.clone(),
                user.api_token.clone(),
                ts(user.created_at)
            ],
        )
        .await?;
        info!("Created user with id {}", user.id);
        Ok(())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let rows = self
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
                params![user_id.to_string()],
            )
            .await?;
        first(rows, row_to_user).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let rows = self
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"),
                params![email.to_string()],
            )
            .await?;
        first(rows, row_to_user).await
    }

    async fn get_user_by_token(&self, token: &str) -> Result<Option<User>> {
        let rows = self
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE api_token = ?"),
                params![token.to_string()],
            )
            .await?;
        first(rows, row_to_user).await
    }

    async fn get_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>> {
        let rows = self
            .query(
                &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = ?"),
                params![user_id.to_string()],
            )
            .await?;
        first(rows, row_to_subscription).await
    }

    async fn get_subscription_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>> {
        let rows = self
            .query(
                &format!(
                    "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE provider_subscription_id = ?"
                ),
                params![provider_subscription_id.to_string()],
            )
            .await?;
        first(rows, row_to_subscription).await
    }

    async fn upsert_subscription(&self, s: &Subscription) -> Result<()> {
        self.execute(
            &format!(
                "INSERT OR REPLACE INTO subscriptions ({SUBSCRIPTION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                s.user_id.to_string(),
                s.tier.as_str(),
                s.status.as_str(),
                s.provider_customer_id.clone(),
                s.provider_subscription_id.clone(),
                opt_ts(s.current_period_end),
                ts(s.updated_at)
            ],
        )
        .await?;
        debug!("Upserted subscription for user {}", s.user_id);
        Ok(())
    }

    async fn create_drop(&self, d: &DropRecord) -> Result<()> {
        self.execute(
            &format!(
                "INSERT INTO drops ({DROP_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                d.id.to_string(),
                d.owner_id.to_string(),
                d.name.clone(),
                d.description.clone(),
                d.kind.as_str(),
                d.masked_url.clone(),
                d.file.as_ref().map(|f| f.object_key.clone()),
                d.file.as_ref().map(|f| f.file_name.clone()),
                d.file.as_ref().map(|f| f.content_type.clone()),
                d.file.as_ref().map(|f| to_i64(f.size_bytes)),
                d.file.as_ref().map(|f| f.sha256.clone()),
                d.expiry_mode.as_str(),
                opt_ts(d.expires_at),
                d.access_window_minutes,
                i64::from(d.is_active),
                ts(d.created_at),
                ts(d.updated_at)
            ],
        )
        .await?;
        info!("Created drop {} for owner {}", d.id, d.owner_id);
        Ok(())
    }

    async fn get_drop(&self, drop_id: Uuid) -> Result<Option<DropRecord>> {
        let rows = self
            .query(
                &format!("SELECT {DROP_COLUMNS} FROM drops WHERE id = ?"),
                params![drop_id.to_string()],
            )
            .await?;
        first(rows, row_to_drop).await
    }

    async fn update_drop(&self, d: &DropRecord) -> Result<()> {
        let changed = self
            .execute(
                "UPDATE drops SET name = ?, description = ?, masked_url = ?, object_key = ?, \
                 file_name = ?, content_type = ?, size_bytes = ?, sha256 = ?, expires_at = ?, \
                 access_window_minutes = ?, is_active = ?, updated_at = ? WHERE id = ?",
                params![
                    d.name.clone(),
                    d.description.clone(),
                    d.masked_url.clone(),
                    d.file.as_ref().map(|f| f.object_key.clone()),
                    d.file.as_ref().map(|f| f.file_name.clone()),
                    d.file.as_ref().map(|f| f.content_type.clone()),
                    d.file.as_ref().map(|f| to_i64(f.size_bytes)),
                    d.file.as_ref().map(|f| f.sha256.clone()),
                    opt_ts(d.expires_at),
                    d.access_window_minutes,
                    i64::from(d.is_active),
                    ts(d.updated_at),
                    d.id.to_string()
                ],
            )
            .await?;
        if changed == 0 {
            return Err(DropError::not_found("drop"));
        }
        Ok(())
    }

    async fn delete_drop(&self, drop_id: Uuid) -> Result<()> {
        let conn = self.conn().await?;
        let id = drop_id.to_string();
        // Children first; foreign keys are not enforced on every connection
        for sql in [
            "DELETE FROM drop_access_logs WHERE drop_id = ?",
            "DELETE FROM drop_recipients WHERE drop_id = ?",
            "DELETE FROM drops WHERE id = ?",
        ] {
            conn.execute(sql, params![id.clone()])
                .await
                .map_err(|e| DropError::database(format!("Failed to delete drop: {e}")))?;
        }
        info!("Deleted drop {}", drop_id);
        Ok(())
    }

    async fn list_drops_for_owner(&self, owner_id: Uuid) -> Result<Vec<DropRecord>> {
        let rows = self
            .query(
                &format!(
                    "SELECT {DROP_COLUMNS} FROM drops WHERE owner_id = ? ORDER BY created_at DESC"
                ),
                params![owner_id.to_string()],
            )
            .await?;
        collect(rows, row_to_drop).await
    }

    async fn list_expired_drops(&self, now: DateTime<Utc>) -> Result<Vec<DropRecord>> {
        let rows = self
            .query(
                &format!(
                    "SELECT {DROP_COLUMNS} FROM drops \
                     WHERE is_active = 1 AND expires_at IS NOT NULL AND expires_at <= ?"
                ),
                params![ts(now)],
            )
            .await?;
        collect(rows, row_to_drop).await
    }

    async fn storage_used_by_owner(&self, owner_id: Uuid) -> Result<u64> {
        let mut rows = self
            .query(
                "SELECT COALESCE(SUM(size_bytes), 0) FROM drops WHERE owner_id = ? AND is_active = 1",
                params![owner_id.to_string()],
            )
            .await?;
        let total = match rows
            .next()
            .await
            .map_err(|e| DropError::database(format!("Failed to read row: {e}")))?
        {
            Some(row) => col!(&row, 0, i64),
            None => 0,
        };
        Ok(to_u64(total))
    }

    async fn add_recipients(&self, recipients: &[DropRecipient]) -> Result<()> {
        let conn = self.conn().await?;
        for r in recipients {
            conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO drop_recipients ({RECIPIENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"
                ),
                params![
                    r.id.to_string(),
                    r.drop_id.to_string(),
                    r.email.clone(),
                    opt_ts(r.access_started_at),
                    opt_ts(r.last_accessed_at),
                    r.access_count,
                    ts(r.created_at)
                ],
            )
            .await
            .map_err(|e| DropError::database(format!("Failed to add recipient: {e}")))?;
        }
        Ok(())
    }

    async fn get_recipients(&self, drop_id: Uuid) -> Result<Vec<DropRecipient>> {
        let rows = self
            .query(
                &format!(
                    "SELECT {RECIPIENT_COLUMNS} FROM drop_recipients WHERE drop_id = ? ORDER BY created_at, email"
                ),
                params![drop_id.to_string()],
            )
            .await?;
        collect(rows, row_to_recipient).await
    }

    async fn get_recipient(&self, drop_id: Uuid, email: &str) -> Result<Option<DropRecipient>> {
        let rows = self
            .query(
                &format!(
                    "SELECT {RECIPIENT_COLUMNS} FROM drop_recipients WHERE drop_id = ? AND email = ?"
                ),
                params![drop_id.to_string(), email.to_string()],
            )
            .await?;
        first(rows, row_to_recipient).await
    }

    async fn record_recipient_access(
        &self,
        recipient_id: Uuid,
        started_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<DropRecipient> {
        let rows = self
            .query(
                &format!(
                    "UPDATE drop_recipients SET access_started_at = COALESCE(access_started_at, ?), \
                     last_accessed_at = ?, access_count = access_count + 1 \
                     WHERE id = ? RETURNING {RECIPIENT_COLUMNS}"
                ),
                params![opt_ts(started_at), ts(now), recipient_id.to_string()],
            )
            .await?;
        first(rows, row_to_recipient)
            .await?
            .ok_or_else(|| DropError::not_found("recipient"))
    }

    async fn remove_recipient(&self, drop_id: Uuid, email: &str) -> Result<bool> {
        let removed = self
            .execute(
                "DELETE FROM drop_recipients WHERE drop_id = ? AND email = ?",
                params![drop_id.to_string(), email.to_string()],
            )
            .await?;
        Ok(removed > 0)
    }

    async fn create_access_log(&self, log: &DropAccessLog) -> Result<()> {
        self.execute(
            &format!("INSERT INTO drop_access_logs ({LOG_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                log.id.to_string(),
                log.drop_id.to_string(),
                log.email.clone(),
                log.outcome.to_string(),
                log.reason.clone(),
                log.ip_address.clone(),
                log.user_agent.clone(),
                ts(log.accessed_at)
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_access_logs(&self, drop_id: Uuid) -> Result<Vec<DropAccessLog>> {
        let rows = self
            .query(
                &format!(
                    "SELECT {LOG_COLUMNS} FROM drop_access_logs WHERE drop_id = ? ORDER BY accessed_at DESC"
                ),
                params![drop_id.to_string()],
            )
            .await?;
        collect(rows, row_to_log).await
    }

    async fn get_usage(&self, user_id: Uuid, period: &str) -> Result<Option<UsageRecord>> {
        let rows = self
            .query(
                &format!("SELECT {USAGE_COLUMNS} FROM usage_tracking WHERE user_id = ? AND period = ?"),
                params![user_id.to_string(), period.to_string()],
            )
            .await?;
        first(rows, row_to_usage).await
    }

    async fn increment_usage(
        &self,
        user_id: Uuid,
        period: &str,
        delta: UsageDelta,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord> {
        self.execute(
            &format!(
                "INSERT INTO usage_tracking ({USAGE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (user_id, period) DO UPDATE SET \
                 drops_created = drops_created + excluded.drops_created, \
                 recipients_added = recipients_added + excluded.recipients_added, \
                 bytes_uploaded = bytes_uploaded + excluded.bytes_uploaded, \
                 updated_at = excluded.updated_at"
            ),
            params![
                user_id.to_string(),
                period.to_string(),
                to_i64(delta.drops),
                to_i64(delta.recipients),
                to_i64(delta.bytes),
                ts(now)
            ],
        )
        .await?;

        self.get_usage(user_id, period)
            .await?
            .ok_or_else(|| DropError::database("usage row missing after upsert"))
    }
}
