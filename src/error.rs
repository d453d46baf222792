// Typed failures that callers need to tell apart.
//
// Everything else flows through anyhow with context. Malformed fields and
// duplicate identifiers are recovered where they occur and never show up here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// A date at or before the last committed date was submitted
    #[error("date {date} is not after the last committed date {last_committed}")]
    OutOfOrderDate { date: String, last_committed: String },

    /// The "previous" snapshot handed to the store is not the one it committed last
    #[error(
        "previous snapshot for {date} does not match the committed state of {last_committed} \
         (expected fingerprint {expected}, got {actual})"
    )]
    PreviousMismatch {
        date: String,
        last_committed: String,
        expected: String,
        actual: String,
    },

    /// A seed commit was attempted after dates were already committed
    #[error("cannot seed {date}: store already holds commits up to {last_committed}")]
    SeedOnNonEmptyStore { date: String, last_committed: String },

    /// A diff commit was attempted before any seed was committed
    #[error("cannot commit changes for {date}: no seed snapshot has been committed")]
    MissingSeed { date: String },

    /// The bulk operation was rolled back; nothing from it is visible
    #[error("store write failed during {operation}")]
    StoreWrite {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("unknown {kind}: {value:?}")]
    UnknownValue { kind: &'static str, value: String },
}

impl LedgerError {
    pub fn store_write(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> LedgerError {
        move |source| LedgerError::StoreWrite { operation, source }
    }

    /// True for precondition violations (caller supplied dates out of order)
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            LedgerError::OutOfOrderDate { .. }
                | LedgerError::PreviousMismatch { .. }
                | LedgerError::SeedOnNonEmptyStore { .. }
                | LedgerError::MissingSeed { .. }
        )
    }
}
