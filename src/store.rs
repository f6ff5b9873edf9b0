use crate::error::StoreError;
use once_cell::sync::Lazy;
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// Dead slots are only swept once the table has grown past this size.
const SWEEP_MIN: usize = 8;

struct BagValue {
    value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

struct Slot {
    owner: Weak<dyn Any + Send + Sync>,
    bag: HashMap<String, BagValue>,
}

impl Slot {
    fn is_live(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

struct Inner {
    slots: HashMap<usize, Slot>,
    high_water: usize,
}

/// Identity keyed side table, attaching string keyed values to objects the
/// caller does not control. Owners are compared by `Arc` allocation address,
/// never by value, and the store holds only a `Weak` reference per owner:
/// dropping the last strong reference elsewhere makes the whole bag
/// reclaimable. Reclamation is amortized, swept on write paths once the
/// table doubles past its high-water mark.
pub struct PropertyStore {
    inner: Mutex<Inner>,
}

static GLOBAL: Lazy<PropertyStore> = Lazy::new(PropertyStore::new);

impl Default for PropertyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner { slots: HashMap::new(), high_water: SWEEP_MIN }) }
    }

    /// Process-wide instance, for callers that do not want to thread a store around.
    pub fn global() -> &'static PropertyStore {
        &GLOBAL
    }

    fn identity<O>(owner: &Arc<O>) -> usize {
        Arc::as_ptr(owner) as *const () as usize
    }

    fn erase<O: Send + Sync + 'static>(owner: &Arc<O>) -> Weak<dyn Any + Send + Sync> {
        // Downgrade as Weak<O> first; the unsize coercion applies to the
        // returned value, not to the borrowed argument.
        let weak: Weak<O> = Arc::downgrade(owner);
        weak
    }

    fn check_key(key: &str) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidArgument("key must not be empty".to_string()));
        }
        Ok(())
    }

    fn maybe_sweep(inner: &mut Inner) {
        if inner.slots.len() >= inner.high_water {
            inner.slots.retain(|_, slot| slot.is_live());
            inner.high_water = (inner.slots.len() * 2).max(SWEEP_MIN);
        }
    }

    /// Inserts or overwrites `value` under `key` in the owner's bag,
    /// creating the bag on first write.
    pub fn set<O, V>(&self, owner: &Arc<O>, key: &str, value: V) -> Result<(), StoreError>
    where
        O: Send + Sync + 'static,
        V: Any + Send + Sync,
    {
        Self::check_key(key)?;
        let mut inner = self.inner.lock()?;
        Self::maybe_sweep(&mut inner);

        let id = Self::identity(owner);
        let slot = inner.slots.entry(id).or_insert_with(|| Slot {
            owner: Self::erase(owner),
            bag: HashMap::new(),
        });
        // The address of a dead owner can be handed out again; a slot that
        // no longer upgrades belongs to the previous tenant.
        if !slot.is_live() {
            slot.owner = Self::erase(owner);
            slot.bag.clear();
        }
        slot.bag.insert(key.to_string(), BagValue { value: Box::new(value), type_name: type_name::<V>() });
        Ok(())
    }

    /// Returns the value stored under `key` for this owner, or `default` when
    /// the owner or key is unknown. Never creates a bag.
    pub fn get<O, V>(&self, owner: &Arc<O>, key: &str, default: V) -> Result<V, StoreError>
    where
        O: Send + Sync + 'static,
        V: Any + Send + Sync + Clone,
    {
        Self::check_key(key)?;
        let inner = self.inner.lock()?;
        let slot = match inner.slots.get(&Self::identity(owner)) {
            Some(slot) if slot.is_live() => slot,
            _ => return Ok(default),
        };
        match slot.bag.get(key) {
            None => Ok(default),
            Some(entry) => match entry.value.downcast_ref::<V>() {
                Some(v) => Ok(v.clone()),
                None => Err(StoreError::TypeMismatch {
                    key: key.to_string(),
                    stored: entry.type_name,
                    requested: type_name::<V>(),
                }),
            },
        }
    }

    /// Atomic check-or-create: returns the existing value under `key`, or
    /// inserts `init()` and returns that. Both arms run under the store lock,
    /// so two racing callers always agree on one value.
    pub fn get_or_insert_with<O, V>(&self, owner: &Arc<O>, key: &str, init: impl FnOnce() -> V) -> Result<V, StoreError>
    where
        O: Send + Sync + 'static,
        V: Any + Send + Sync + Clone,
    {
        Self::check_key(key)?;
        let mut inner = self.inner.lock()?;
        Self::maybe_sweep(&mut inner);

        let id = Self::identity(owner);
        let slot = inner.slots.entry(id).or_insert_with(|| Slot {
            owner: Self::erase(owner),
            bag: HashMap::new(),
        });
        if !slot.is_live() {
            slot.owner = Self::erase(owner);
            slot.bag.clear();
        }
        if let Some(entry) = slot.bag.get(key) {
            return match entry.value.downcast_ref::<V>() {
                Some(v) => Ok(v.clone()),
                None => Err(StoreError::TypeMismatch {
                    key: key.to_string(),
                    stored: entry.type_name,
                    requested: type_name::<V>(),
                }),
            };
        }
        let value = init();
        slot.bag.insert(key.to_string(), BagValue { value: Box::new(value.clone()), type_name: type_name::<V>() });
        Ok(value)
    }

    /// Drops one entry from the owner's bag. Returns whether it was present.
    pub fn remove<O>(&self, owner: &Arc<O>, key: &str) -> Result<bool, StoreError>
    where
        O: Send + Sync + 'static,
    {
        Self::check_key(key)?;
        let mut inner = self.inner.lock()?;
        Self::maybe_sweep(&mut inner);
        let id = Self::identity(owner);
        let removed = match inner.slots.get_mut(&id) {
            Some(slot) if slot.is_live() => slot.bag.remove(key).is_some(),
            _ => false,
        };
        if removed && inner.slots.get(&id).map(|s| s.bag.is_empty()).unwrap_or(false) {
            inner.slots.remove(&id);
        }
        Ok(removed)
    }

    /// Number of slots currently held, dead ones included.
    pub fn slot_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.slots.len()).unwrap_or(0)
    }

    /// Drops every slot whose owner is gone, returning how many were removed.
    pub fn sweep(&self) -> usize {
        match self.inner.lock() {
            Ok(mut inner) => {
                let before = inner.slots.len();
                inner.slots.retain(|_, slot| slot.is_live());
                inner.high_water = (inner.slots.len() * 2).max(SWEEP_MIN);
                before - inner.slots.len()
            }
            Err(_) => 0,
        }
    }
}
