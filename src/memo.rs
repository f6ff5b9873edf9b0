use crate::error::StoreError;
use crate::store::PropertyStore;
use crate::warn;
use core::future::Future;
use lru::LruCache;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Reserved side-table key under which a container's pending-resolution
/// markers live. Underscore prefix marks it as internal bookkeeping.
pub const PENDING_RESOLUTIONS_KEY: &str = "_pending_resolutions";

/// State of one in-flight resolution, broadcast to every waiter through a
/// `watch` channel. The value lands in the container before `Done` is sent.
#[derive(Clone, Debug, Default)]
pub enum Resolution {
    #[default]
    Pending,
    Done,
    Failed(Arc<StoreError>),
}

impl Resolution {
    fn is_settled(&self) -> bool {
        !matches!(self, Resolution::Pending)
    }
}

type MarkerTable<K> = Arc<Mutex<HashMap<K, watch::Sender<Resolution>>>>;

/// Removes the marker entry even when the resolving future is dropped before
/// it can signal; waiters then observe a closed channel instead of hanging.
struct MarkerGuard<K: Eq + Hash> {
    markers: MarkerTable<K>,
    key: Option<K>,
}

impl<K: Eq + Hash> MarkerGuard<K> {
    fn release(&mut self) {
        if let Some(key) = self.key.take() {
            if let Ok(mut table) = self.markers.lock() {
                table.remove(&key);
            }
        }
    }
}

impl<K: Eq + Hash> Drop for MarkerGuard<K> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Seam between the memoizer and whatever associative container the caller
/// brings. Values are cloned out so the container lock is never held across
/// an await.
pub trait MapLike<K, V>: Send + Sync {
    fn get_value(&self, key: &K) -> Option<V>;
    fn put_value(&self, key: K, value: V);
}

impl<K, V> MapLike<K, V> for Mutex<HashMap<K, V>>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
{
    fn get_value(&self, key: &K) -> Option<V> {
        self.lock().unwrap().get(key).cloned()
    }

    fn put_value(&self, key: K, value: V) {
        self.lock().unwrap().insert(key, value);
    }
}

impl<K, V> MapLike<K, V> for Mutex<LruCache<K, V>>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
{
    fn get_value(&self, key: &K) -> Option<V> {
        self.lock().unwrap().get(key).cloned()
    }

    fn put_value(&self, key: K, value: V) {
        self.lock().unwrap().put(key, value);
    }
}

/// Returns the value for `key`, resolving it at most once across all
/// concurrent callers.
///
/// A container hit returns immediately. On a miss, the first caller installs
/// a pending marker and runs `resolver`; everyone else arriving for the same
/// key suspends on the marker and picks the committed value up afterwards.
/// A failed resolver fans its error out to every waiter as
/// [`StoreError::Resolution`] and clears the marker, so the next call for
/// that key starts a fresh resolution.
///
/// The marker table is attached to the container through the side-table
/// store, so any `Arc`-shared [`MapLike`] works without carrying extra
/// fields.
pub async fn get_or_resolve<C, K, V, F, Fut>(
    store: &PropertyStore,
    container: &Arc<C>,
    key: K,
    resolver: F,
) -> Result<V, StoreError>
where
    C: MapLike<K, V> + Any + Send + Sync,
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, StoreError>>,
{
    // Fast path, no synchronization.
    if let Some(value) = container.get_value(&key) {
        return Ok(value);
    }

    let markers: MarkerTable<K> =
        store.get_or_insert_with(container, PENDING_RESOLUTIONS_KEY, || Arc::new(Mutex::new(HashMap::new())))?;

    enum Arrival {
        First(watch::Sender<Resolution>),
        Waiter(watch::Receiver<Resolution>),
    }

    // Check-or-create must be atomic; committed values are re-checked under
    // the same lock because commit happens before marker removal.
    let arrival = {
        let mut table = markers.lock()?;
        match table.get(&key) {
            Some(tx) => Arrival::Waiter(tx.subscribe()),
            None => {
                if let Some(value) = container.get_value(&key) {
                    return Ok(value);
                }
                let (tx, _rx) = watch::channel(Resolution::Pending);
                table.insert(key.clone(), tx.clone());
                Arrival::First(tx)
            }
        }
    };

    let tx = match arrival {
        Arrival::Waiter(mut rx) => {
            let settled = match rx.wait_for(Resolution::is_settled).await {
                Ok(state) => (*state).clone(),
                Err(_) => {
                    // The resolving caller went away without signaling. Clear
                    // any stale marker so the next arrival can start over.
                    let mut table = markers.lock()?;
                    if table.get(&key).map(|tx| tx.is_closed()).unwrap_or(false) {
                        table.remove(&key);
                    }
                    return Err(StoreError::Custom(format!("resolution abandoned for key {:?}", key)));
                }
            };
            return match settled {
                Resolution::Failed(err) => Err(StoreError::Resolution(err)),
                _ => container.get_value(&key).ok_or_else(|| StoreError::Absent(format!("{:?}", key))),
            };
        }
        Arrival::First(tx) => tx,
    };

    let mut guard = MarkerGuard { markers: markers.clone(), key: Some(key.clone()) };
    match resolver().await {
        Ok(value) => {
            container.put_value(key, value.clone());
            guard.release();
            tx.send_replace(Resolution::Done);
            Ok(value)
        }
        Err(err) => {
            warn!("resolution failed for key {:?}: {}", key, err);
            guard.release();
            let shared = Arc::new(err);
            tx.send_replace(Resolution::Failed(shared.clone()));
            Err(StoreError::Resolution(shared))
        }
    }
}

/// [`get_or_resolve`] with up to `attempts` full single-flight rounds,
/// sleeping `delay` between failed ones. The last error bubbles out.
pub async fn get_or_resolve_with_retry<C, K, V, F, Fut>(
    store: &PropertyStore,
    container: &Arc<C>,
    key: K,
    attempts: usize,
    delay: Duration,
    mut resolver: F,
) -> Result<V, StoreError>
where
    C: MapLike<K, V> + Any + Send + Sync,
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<V, StoreError>>,
{
    assert!(attempts >= 1);
    let mut left = attempts;
    loop {
        match get_or_resolve(store, container, key.clone(), || resolver()).await {
            Ok(value) => return Ok(value),
            Err(_e) if left > 1 => {
                left -= 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
