use chrono::Duration;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use thiserror::Error;

use super::types::TradeStatus;

/// Broad classes of failure, used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any mutation; fix the input and retry.
    Validation,
    /// Definitive conflict with current state; refresh instead of retrying.
    StateConflict,
    /// Refused by a rule (cooldown, ownership, balance); explainable to the user.
    Policy,
    /// Persistence or encoding failure.
    Storage,
}

/// Errors that can arise while interacting with the grove engine and its store.
#[derive(Debug, Error)]
pub enum GroveError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when fetching a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Check-in payload failed validation.
    #[error("invalid check-in: {0}")]
    InvalidCheckIn(String),

    /// Zero quantities are never meaningful for ledger or trade operations.
    #[error("quantity must be positive")]
    InvalidQuantity,

    /// User ids must be non-empty, unpadded and free of key separators.
    #[error("invalid user id: {0}")]
    InvalidUserId(String),

    /// Item names must be short, printable and non-empty.
    #[error("invalid item name: {0}")]
    InvalidItemName(String),

    /// Rules handed to the store are inconsistent (catalog, batch size).
    #[error("invalid rules: {0}")]
    InvalidRules(String),

    /// Trade offered nothing.
    #[error("trade offer is empty")]
    EmptyOffer,

    /// Trade requested nothing.
    #[error("trade request is empty")]
    EmptyRequest,

    /// Requested expiration is outside the configured range.
    #[error("expiration of {hours}h is outside 1..={max}h")]
    InvalidExpiration { hours: i64, max: i64 },

    /// The action is still locked by a cooldown window.
    #[error("cooldown active: {} seconds remaining", .remaining.num_seconds())]
    CooldownActive { remaining: Duration },

    /// The fruit was already collected (by this or another user).
    #[error("fruit {0} was already collected")]
    AlreadyCollected(String),

    /// A ledger debit would take the quantity below zero.
    #[error("{user} has {available} {item}, needs {requested}")]
    InsufficientQuantity {
        user: String,
        item: String,
        available: u64,
        requested: u64,
    },

    /// One side of a trade does not hold what it promised.
    #[error("insufficient inventory: {user} has {available} {item}, trade needs {requested}")]
    InsufficientInventory {
        user: String,
        item: String,
        available: u64,
        requested: u64,
    },

    /// Trade is no longer open.
    #[error("trade is not open (status: {0})")]
    NotOpen(TradeStatus),

    /// Trade passed its expiration time.
    #[error("trade has expired")]
    Expired,

    /// A user tried to accept their own trade.
    #[error("cannot accept your own trade")]
    SelfTrade,

    /// Caller does not own the record they tried to change.
    #[error("not owner: {0}")]
    NotOwner(String),

    /// Unexpected stored data, such as a malformed ledger row.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GroveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GroveError::InvalidCheckIn(_)
            | GroveError::InvalidQuantity
            | GroveError::InvalidItemName(_)
            | GroveError::InvalidUserId(_)
            | GroveError::InvalidRules(_)
            | GroveError::EmptyOffer
            | GroveError::EmptyRequest
            | GroveError::InvalidExpiration { .. } => ErrorKind::Validation,
            GroveError::AlreadyCollected(_)
            | GroveError::NotOpen(_)
            | GroveError::Expired
            | GroveError::SelfTrade => ErrorKind::StateConflict,
            GroveError::CooldownActive { .. }
            | GroveError::InsufficientQuantity { .. }
            | GroveError::InsufficientInventory { .. }
            | GroveError::NotOwner(_) => ErrorKind::Policy,
            GroveError::Sled(_)
            | GroveError::Bincode(_)
            | GroveError::Io(_)
            | GroveError::NotFound(_)
            | GroveError::SchemaMismatch { .. }
            | GroveError::Internal(_) => ErrorKind::Storage,
        }
    }

    /// Terminal state conflicts will fail the same way on every retry.
    pub fn is_retryable(&self) -> bool {
        self.kind() != ErrorKind::StateConflict
    }
}

impl From<TransactionError<GroveError>> for GroveError {
    fn from(err: TransactionError<GroveError>) -> Self {
        match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(inner) => GroveError::Sled(inner),
        }
    }
}

/// Abort the surrounding sled transaction with a domain error.
pub(crate) fn abort<T>(err: GroveError) -> Result<T, ConflictableTransactionError<GroveError>> {
    Err(ConflictableTransactionError::Abort(err))
}
