use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};

use crate::cache::Cache;
use crate::error::{DiscoveryError, Result};
use crate::models::Session;

/// Session CRUD plus expiry sweep and best-effort `lastAccess` updates.
/// `lastAccess` is bumped off the read path through an unbounded channel to
/// a background writer, a fire-and-forget update pattern.
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    cache: Arc<dyn Cache>,
    max_sessions: usize,
    default_ttl: Duration,
    touch_tx: mpsc::UnboundedSender<String>,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn Cache>, max_sessions: usize, default_ttl: Duration) -> Self {
        let sessions: Arc<RwLock<HashMap<String, Session>>> = Arc::new(RwLock::new(HashMap::new()));
        let (touch_tx, touch_rx) = mpsc::unbounded_channel();
        tokio::spawn(touch_worker(sessions.clone(), touch_rx));
        SessionStore {
            sessions,
            cache,
            max_sessions,
            default_ttl,
            touch_tx,
        }
    }

    pub async fn create_session(&self, goal: impl Into<String>) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(DiscoveryError::SessionLimit);
        }
        let session = Session::new(goal, self.default_ttl);
        sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    /// Returns the session, rejecting one that is already past its TTL.
    /// Queues an async `lastAccess` bump that does not block this call.
    pub async fn get_session(&self, id: &str) -> Result<Session> {
        let session = {
            let sessions = self.sessions.read().await;
            sessions
                .get(id)
                .cloned()
                .ok_or_else(|| DiscoveryError::SessionNotFound(id.to_string()))?
        };
        if session.is_expired(Utc::now()) {
            return Err(DiscoveryError::SessionExpired(id.to_string()));
        }
        let _ = self.touch_tx.send(id.to_string());
        Ok(session)
    }

    pub async fn update_session(&self, id: &str, f: impl FnOnce(&mut Session)) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| DiscoveryError::SessionNotFound(id.to_string()))?;
        f(session);
        Ok(session.clone())
    }

    pub async fn delete_session(&self, id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| DiscoveryError::SessionNotFound(id.to_string()))
    }

    pub async fn get_context(&self, id: &str, key: &str) -> Result<Option<serde_json::Value>> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(id)
            .ok_or_else(|| DiscoveryError::SessionNotFound(id.to_string()))?;
        Ok(session.context.get(key).cloned())
    }

    /// `set_context(key, v)` followed by `get_context(key)` on the same
    /// session returns `v`: both take the same write lock and there is no
    /// intervening async point, so the write is visible to the very next
    /// read regardless of other concurrent sessions' activity.
    pub async fn set_context(&self, id: &str, key: impl Into<String>, value: serde_json::Value) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| DiscoveryError::SessionNotFound(id.to_string()))?;
        session.context.insert(key.into(), value);
        Ok(())
    }

    /// Cache key for per-session schema results:
    /// `discovery:<sessionId>:schema:<name>`.
    pub fn schema_cache_key(session_id: &str, schema_name: &str) -> String {
        format!("discovery:{session_id}:schema:{schema_name}")
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// Removes every session past its TTL, returning how many were pruned.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        before - sessions.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

async fn touch_worker(sessions: Arc<RwLock<HashMap<String, Session>>>, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(id) = rx.recv().await {
        let mut sessions = sessions.write().await;
        if let Some(session) = sessions.get_mut(&id) {
            session.touch(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoopCache;

    fn store(max_sessions: usize) -> SessionStore {
        SessionStore::new(Arc::new(NoopCache::default()), max_sessions, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = store(10);
        let session = store.create_session("explore perf data").await.unwrap();
        let fetched = store.get_session(&session.id).await.unwrap();
        assert_eq!(fetched.id, session.id);
    }

    #[tokio::test]
    async fn session_limit_rejects_once_reached() {
        let store = store(1);
        store.create_session("a").await.unwrap();
        let err = store.create_session("b").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::SessionLimit));
    }

    #[tokio::test]
    async fn set_then_get_context_is_immediately_visible() {
        let store = store(10);
        let session = store.create_session("goal").await.unwrap();
        store.set_context(&session.id, "k", serde_json::json!(42)).await.unwrap();
        let v = store.get_context(&session.id, "k").await.unwrap();
        assert_eq!(v, Some(serde_json::json!(42)));
    }

    #[tokio::test]
    async fn cleanup_expired_prunes_past_ttl_sessions() {
        let store = SessionStore::new(Arc::new(NoopCache::default()), 10, Duration::from_millis(1));
        store.create_session("goal").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let removed = store.cleanup_expired().await;
        assert_eq!(removed, 1);
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn get_session_queues_async_touch() {
        let store = store(10);
        let session = store.create_session("goal").await.unwrap();
        let original_access = session.last_access;
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.get_session(&session.id).await.unwrap();
        // Give the background touch worker a chance to run.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let reloaded = store.get_session(&session.id).await.unwrap();
        assert!(reloaded.last_access >= original_access);
    }

    #[tokio::test]
    async fn missing_session_errors() {
        let store = store(10);
        let err = store.get_session("nope").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::SessionNotFound(_)));
    }
}
