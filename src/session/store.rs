use std::future::Future;

use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::error::Result;

/// Namespace for session keys in the backing store.
pub const KEY_PREFIX: &str = "wa_session:";

/// The TTL state of a session key, mirroring the store's sentinel
/// convention: -2 = no key, -1 = key with no expiry, >= 0 = seconds left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTtl {
    Remaining(u64),
    NoKey,
    NoExpiry,
}

/// The five TTL-store primitives the session layer depends on. Implemented
/// for the Redis connection manager; tests swap in an in-memory double.
pub trait KvTtl: Clone + Send + Sync + 'static {
    fn set_ex(
        &self,
        key: &str,
        value: &str,
        seconds: u64,
    ) -> impl Future<Output = Result<()>> + Send;
    fn ttl(&self, key: &str) -> impl Future<Output = Result<i64>> + Send;
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;
    fn del(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
    fn keys(&self, pattern: &str) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Redis-backed implementation of [`KvTtl`]. The connection manager is
/// cheap to clone and multiplexes one connection process-wide.
#[derive(Clone)]
pub struct RedisKv(pub ConnectionManager);

impl KvTtl for RedisKv {
    async fn set_ex(&self, key: &str, value: &str, seconds: u64) -> Result<()> {
        let mut conn = self.0.clone();
        let _: () = conn.set_ex(key, value, seconds).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let mut conn = self.0.clone();
        Ok(conn.ttl(key).await?)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.0.clone();
        Ok(conn.exists(key).await?)
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.0.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.0.clone();
        Ok(conn.keys(pattern).await?)
    }
}

/// Per-user liveness records with a fixed expiry window. A session with no
/// key is definitionally expired; the watcher handles the farewell.
#[derive(Clone)]
pub struct SessionStore<S: KvTtl> {
    kv: S,
    ttl_secs: u64,
}

impl<S: KvTtl> SessionStore<S> {
    pub fn new(kv: S, ttl_secs: u64) -> Self {
        Self { kv, ttl_secs }
    }

    fn key(user_id: &str) -> String {
        format!("{}{}", KEY_PREFIX, user_id)
    }

    /// Creates or refreshes the user's session, resetting the expiry window
    /// to the configured duration regardless of any prior TTL.
    pub async fn touch(&self, user_id: &str) -> Result<()> {
        let now = Utc::now().timestamp().to_string();
        self.kv.set_ex(&Self::key(user_id), &now, self.ttl_secs).await?;
        tracing::debug!("Session refreshed for {} ({}s window)", user_id, self.ttl_secs);
        Ok(())
    }

    /// Reads the session's TTL state. A key with no expiry violates the
    /// touch invariant and is logged, not silently tolerated.
    pub async fn get_ttl(&self, user_id: &str) -> Result<SessionTtl> {
        match self.kv.ttl(&Self::key(user_id)).await? {
            -2 => Ok(SessionTtl::NoKey),
            -1 => {
                tracing::warn!("Session key for {} has no expiry set", user_id);
                Ok(SessionTtl::NoExpiry)
            }
            t => Ok(SessionTtl::Remaining(t as u64)),
        }
    }

    pub async fn exists(&self, user_id: &str) -> Result<bool> {
        self.kv.exists(&Self::key(user_id)).await
    }

    pub async fn delete(&self, user_id: &str) -> Result<()> {
        self.kv.del(&Self::key(user_id)).await
    }

    /// Enumerates all live session user ids. Watcher-only: a full key scan
    /// has no place on the per-request path.
    pub async fn list_active_user_ids(&self) -> Result<Vec<String>> {
        let keys = self.kv.keys(&format!("{}*", KEY_PREFIX)).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(KEY_PREFIX).map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::KvTtl;
    use crate::error::Result;

    /// In-memory [`KvTtl`] double. TTLs are stored as sentinels, not
    /// clocked: tests flip them explicitly.
    #[derive(Clone, Default)]
    pub(crate) struct MemStore {
        inner: Arc<Mutex<HashMap<String, (String, i64)>>>,
    }

    impl MemStore {
        /// Strips the expiry from a key, emulating a `SET` without `EX`.
        pub(crate) fn persist(&self, key: &str) {
            if let Some(entry) = self.inner.lock().unwrap().get_mut(key) {
                entry.1 = -1;
            }
        }

        /// Drops a key as if the store had reaped it.
        pub(crate) fn evict(&self, key: &str) {
            self.inner.lock().unwrap().remove(key);
        }
    }

    impl KvTtl for MemStore {
        async fn set_ex(&self, key: &str, value: &str, seconds: u64) -> Result<()> {
            self.inner
                .lock()
                .unwrap()
                .insert(key.to_string(), (value.to_string(), seconds as i64));
            Ok(())
        }

        async fn ttl(&self, key: &str) -> Result<i64> {
            Ok(self
                .inner
                .lock()
                .unwrap()
                .get(key)
                .map(|(_, ttl)| *ttl)
                .unwrap_or(-2))
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            Ok(self.inner.lock().unwrap().contains_key(key))
        }

        async fn del(&self, key: &str) -> Result<()> {
            self.inner.lock().unwrap().remove(key);
            Ok(())
        }

        async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
            let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
            Ok(self
                .inner
                .lock()
                .unwrap()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }
    }
}
