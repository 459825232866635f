use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::session::store::{KvTtl, SessionStore, SessionTtl};

/// Capability invoked once per expired session, with the user id. Supplied
/// by the caller at startup; typically sends the farewell message.
pub type ExpiryCallback = Arc<dyn Fn(String) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Polls the session store and fires the expiry callback for sessions whose
/// TTL has lapsed. TTL expiry is store-side, so no inbound event will ever
/// announce it; this loop is the only detector.
pub struct ExpiryWatcher<S: KvTtl> {
    store: SessionStore<S>,
    callback: ExpiryCallback,
    interval: Duration,
    started: Arc<AtomicBool>,
}

impl<S: KvTtl> ExpiryWatcher<S> {
    pub fn new(store: SessionStore<S>, callback: ExpiryCallback, interval: Duration) -> Self {
        Self {
            store,
            callback,
            interval,
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts the background loop. Returns `false` (and does nothing) if it
    /// was already started; the loop runs until process shutdown.
    pub fn spawn(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Expiry watcher already started, ignoring duplicate spawn");
            return false;
        }

        let store = self.store.clone();
        let callback = self.callback.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                // A bad tick (store unreachable) must not kill the loop.
                if let Err(e) = run_tick(&store, &callback).await {
                    tracing::error!("Expiry watcher tick failed: {}", e);
                }
            }
        });

        tracing::info!("Expiry watcher started (interval {}s)", interval.as_secs());
        true
    }
}

/// One poll of the store. For every session whose TTL reads as absent or
/// as never-expiring (both count as expired), the key is deleted FIRST and
/// the callback invoked after, so a crash between the two cannot double-fire
/// on restart. A callback that fails is logged, never retried: at-most-once
/// by design.
pub async fn run_tick<S: KvTtl>(store: &SessionStore<S>, callback: &ExpiryCallback) -> Result<()> {
    let user_ids = store.list_active_user_ids().await?;
    if user_ids.is_empty() {
        return Ok(());
    }

    let mut expired = 0usize;
    for user_id in user_ids {
        let ttl = match store.get_ttl(&user_id).await {
            Ok(ttl) => ttl,
            Err(e) => {
                tracing::error!("TTL read failed for {}: {}", user_id, e);
                continue;
            }
        };

        match ttl {
            SessionTtl::Remaining(_) => {}
            SessionTtl::NoKey | SessionTtl::NoExpiry => {
                if let Err(e) = store.delete(&user_id).await {
                    tracing::error!("Failed to delete expired session {}: {}", user_id, e);
                    continue;
                }
                expired += 1;
                if let Err(e) = (callback)(user_id.clone()).await {
                    tracing::error!("Expiry callback failed for {}: {}", user_id, e);
                }
            }
        }
    }

    if expired > 0 {
        tracing::info!("Expired {} session(s)", expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::error::AppError;
    use crate::session::store::memory::MemStore;

    fn counting_callback(counter: Arc<AtomicUsize>) -> ExpiryCallback {
        Arc::new(move |_user_id| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn empty_store_is_a_noop_tick() {
        let store = SessionStore::new(MemStore::default(), 60);
        let fired = Arc::new(AtomicUsize::new(0));

        run_tick(&store, &counting_callback(fired.clone())).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn live_sessions_are_left_alone() {
        let store = SessionStore::new(MemStore::default(), 60);
        store.touch("0812").await.unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        run_tick(&store, &counting_callback(fired.clone())).await.unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(store.exists("0812").await.unwrap());
    }

    #[tokio::test]
    async fn expired_session_fires_exactly_once() {
        let kv = MemStore::default();
        let store = SessionStore::new(kv.clone(), 60);
        store.touch("0812").await.unwrap();
        kv.persist("wa_session:0812");

        let fired = Arc::new(AtomicUsize::new(0));
        let callback = counting_callback(fired.clone());

        run_tick(&store, &callback).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!store.exists("0812").await.unwrap());

        // A second tick observing the same user must not re-fire: the key
        // was deleted with the first decision.
        run_tick(&store, &callback).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reaped_key_no_longer_enumerates() {
        let kv = MemStore::default();
        let store = SessionStore::new(kv.clone(), 60);
        store.touch("0812").await.unwrap();
        kv.evict("wa_session:0812");

        let fired = Arc::new(AtomicUsize::new(0));
        run_tick(&store, &counting_callback(fired.clone())).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_callback_does_not_stop_the_tick() {
        let kv = MemStore::default();
        let store = SessionStore::new(kv.clone(), 60);
        store.touch("0812").await.unwrap();
        store.touch("0813").await.unwrap();
        kv.persist("wa_session:0812");
        kv.persist("wa_session:0813");

        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_cb = attempts.clone();
        let callback: ExpiryCallback = Arc::new(move |_user_id| {
            let attempts = attempts_cb.clone();
            Box::pin(async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Internal("send failed".to_string()))
            })
        });

        run_tick(&store, &callback).await.unwrap();

        // Both users were attempted despite every callback failing, and both
        // keys are gone (at-most-once, no retry).
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(store.list_active_user_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn spawn_is_idempotent() {
        let store = SessionStore::new(MemStore::default(), 60);
        let watcher = ExpiryWatcher::new(
            store,
            counting_callback(Arc::new(AtomicUsize::new(0))),
            Duration::from_secs(60),
        );

        assert!(watcher.spawn());
        assert!(!watcher.spawn());
    }
}
