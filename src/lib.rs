//! sidetable attaches ad hoc key/value data to objects the caller does not
//! own, and deduplicates concurrent asynchronous population of shared maps.
//!
//! The [`store::PropertyStore`] is an identity-keyed side table: owners are
//! compared by `Arc` allocation address and held only weakly, so an attached
//! bag never outlives its owner. On top of it, [`memo::get_or_resolve`]
//! gives any `Arc`-shared map single-flight semantics: one resolver run per
//! key, shared by every concurrent caller, with failures fanned out instead
//! of swallowed.

pub mod collections;
pub mod error;
pub mod lazy;
pub mod logger;
pub mod memo;
pub mod store;
pub mod tasks;

pub use error::StoreError;
pub use lazy::LazyField;
pub use memo::{get_or_resolve, get_or_resolve_with_retry, MapLike, Resolution, PENDING_RESOLUTIONS_KEY};
pub use store::PropertyStore;

pub use futures;
pub use futures::future::join_all;
pub use lru::LruCache;
pub use once_cell;
pub use serde_json;
pub use std::sync::Arc;
pub use tokio::sync::watch;
