use std::sync::{Arc, PoisonError};
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Debug, Error)]
pub enum StoreError {

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Type mismatch for key '{key}': stored {stored}, requested {requested}")]
    TypeMismatch {
        key: String,
        stored: &'static str,
        requested: &'static str,
    },

    #[error("Resolution failed: {0}")]
    Resolution(#[source] Arc<StoreError>),

    #[error("Resolution signaled for key '{0}' but no value was committed")]
    Absent(String),

    #[error("Join: {0}")]
    JoinError(#[from] JoinError),

    #[error("{0}")]
    Custom(String),
}

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        StoreError::Custom(msg.into())
    }
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(e: PoisonError<T>) -> Self {
        StoreError::Custom(format!("Poison error: {:?}", e.to_string()))
    }
}
