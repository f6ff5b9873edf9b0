use crate::error::StoreError;
use crate::warn;
use core::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Lazily resolved field with change notification, backed by a `watch`
/// channel instead of an in-place struct field: observers subscribe for the
/// property-changed signal, and background resolution publishes through the
/// same channel, so there is no backing field to locate by name.
pub struct LazyField<T> {
    tx: watch::Sender<Option<T>>,
    in_flight: Arc<AtomicBool>,
}

impl<T> Default for LazyField<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LazyField<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx, in_flight: Arc::new(AtomicBool::new(false)) }
    }

    /// Current value, if one has been set or resolved yet.
    pub fn get(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// Sets the value, notifying subscribers only when it actually changed.
    pub fn set(&self, value: T) {
        self.tx.send_if_modified(|current| {
            if current.as_ref() == Some(&value) {
                false
            } else {
                *current = Some(value.clone());
                true
            }
        });
    }

    /// Receiver for observers that want to react to value changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.tx.subscribe()
    }

    /// Returns the value when already resolved; otherwise kicks off `resolver`
    /// on a background task and returns `None` right away. At most one
    /// background resolution runs at a time; a failed one is warn-logged and
    /// leaves the field unset so a later call retries.
    pub fn get_or_spawn<F, Fut>(&self, resolver: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        if let Some(value) = self.get() {
            return Some(value);
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return None;
        }
        let tx = self.tx.clone();
        let in_flight = self.in_flight.clone();
        let fut = resolver();
        tokio::spawn(async move {
            match fut.await {
                Ok(value) => {
                    tx.send_if_modified(|current| {
                        if current.as_ref() == Some(&value) {
                            false
                        } else {
                            *current = Some(value.clone());
                            true
                        }
                    });
                }
                Err(e) => warn!("lazy field resolution failed: {}", e),
            }
            in_flight.store(false, Ordering::SeqCst);
        });
        None
    }

    /// Suspends until a value has been published, then returns it.
    pub async fn wait(&self) -> Result<T, StoreError> {
        let mut rx = self.tx.subscribe();
        let value = rx
            .wait_for(|v| v.is_some())
            .await
            .map_err(|_| StoreError::new("lazy field dropped before a value was published"))?;
        Ok(value.clone().expect("wait_for guarantees a value"))
    }
}
