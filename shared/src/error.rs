use thiserror::Error;
use uuid::Uuid;

/// Failure of a durable store. Business outcomes never travel through here.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        StoreError::Backend(anyhow::anyhow!("{}", err))
    }
}

#[cfg(feature = "postgres")]
impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match err {
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(info.message().to_string())
            }
            other => StoreError::Backend(other.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("{0}")]
    Validation(String),
    #[error("order not found: {0}")]
    NotFound(Uuid),
    #[error("failed to encode payment request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(String),
    #[error("account already exists")]
    AlreadyExists,
    #[error("account not found")]
    NotFound,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => AccountError::AlreadyExists,
            other => AccountError::Store(other),
        }
    }
}

/// Outcome of handing one message to its consumer when it did not succeed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Retrying can succeed later (store or channel unreachable).
    #[error("transient delivery failure: {0}")]
    Transient(#[source] anyhow::Error),
    /// Retrying would fail the same way (malformed payload, unknown order).
    #[error("message rejected: {0}")]
    Rejected(String),
}

impl From<StoreError> for DeliveryError {
    fn from(err: StoreError) -> Self {
        DeliveryError::Transient(err.into())
    }
}
