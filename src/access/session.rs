use crate::error::{DropError, Result};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// A verified recipient's right to open one drop until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessSession {
    pub token: String,
    pub drop_id: Uuid,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Opaque session tokens issued after email verification.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, AccessSession>>,
}

fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> Result<MutexGuard<'_, HashMap<String, AccessSession>>> {
        self.sessions
            .lock()
            .map_err(|e| DropError::database(format!("session store poisoned: {e}")))
    }

    pub fn issue(
        &self,
        drop_id: Uuid,
        email: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<AccessSession> {
        let session = AccessSession {
            token: new_token(),
            drop_id,
            email: email.to_string(),
            expires_at,
        };
        self.sessions()?
            .insert(session.token.clone(), session.clone());
        Ok(session)
    }

    pub fn get(&self, token: &str) -> Result<Option<AccessSession>> {
        Ok(self.sessions()?.get(token).cloned())
    }

    pub fn remove(&self, token: &str) -> Result<()> {
        self.sessions()?.remove(token);
        Ok(())
    }

    /// Drops every session for `drop_id`, e.g. when the drop is deleted.
    pub fn revoke_drop(&self, drop_id: Uuid) -> Result<usize> {
        let mut sessions = self.sessions()?;
        let before = sessions.len();
        sessions.retain(|_, s| s.drop_id != drop_id);
        Ok(before - sessions.len())
    }

    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut sessions = self.sessions()?;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        Ok(before - sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_tokens_are_unique_and_opaque() {
        let store = SessionStore::new();
        let drop_id = Uuid::new_v4();
        let expires = Utc::now() + Duration::hours(1);
        let a = store.issue(drop_id, "a@example.com", expires).unwrap();
        let b = store.issue(drop_id, "a@example.com", expires).unwrap();

        assert_ne!(a.token, b.token);
        assert_eq!(a.token.len(), 64);
        assert_eq!(store.get(&a.token).unwrap(), Some(a));
    }

    #[test]
    fn test_purge_and_revoke() {
        let store = SessionStore::new();
        let now = Utc::now();
        let drop_id = Uuid::new_v4();
        store.issue(drop_id, "a@example.com", now - Duration::seconds(1)).unwrap();
        store.issue(drop_id, "b@example.com", now + Duration::hours(1)).unwrap();
        store
            .issue(Uuid::new_v4(), "c@example.com", now + Duration::hours(1))
            .unwrap();

        assert_eq!(store.purge_expired(now).unwrap(), 1);
        assert_eq!(store.revoke_drop(drop_id).unwrap(), 1);
        assert_eq!(store.len(), 1);
    }
}
