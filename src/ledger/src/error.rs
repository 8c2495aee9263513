//!
//! # Settlement errors
//!
//! Three outcomes exist for any settlement step:
//! the step succeeds, the thing it looks for is legitimately absent
//! (`Option`/`bool`, never an error), or one of the kinds below.
//!

use thiserror::Error;

/// Result type of the settlement pipeline
pub type Result<T> = std::result::Result<T, SettleError>;

/// Settlement error taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettleError {
    /// Consensus-fatal: prior durable state is inconsistent,
    /// block processing must stop and nothing may be committed.
    #[error("fatal invariant violation: {0}")]
    FatalInvariant(String),

    /// An external collaborator rejected one transaction,
    /// only the effects of that transaction are dropped.
    #[error("collaborator failure: {0}")]
    Collaborator(String),

    /// The keyed object store failed.
    #[error("store failure: {0}")]
    Store(String),

    /// A stored record could not be decoded.
    #[error("codec failure: {0}")]
    Codec(String),
}

impl SettleError {
    /// Whether the error must halt the whole block.
    #[inline(always)]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SettleError::Collaborator(_))
    }
}

impl From<bincode::Error> for SettleError {
    fn from(e: bincode::Error) -> Self {
        SettleError::Codec(e.to_string())
    }
}

/// Build a `SettleError::FatalInvariant` with a formatted message.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::error::SettleError::FatalInvariant(format!($($arg)*))
    };
}

/// Build a `SettleError::Collaborator` with a formatted message.
#[macro_export]
macro_rules! reject {
    ($($arg:tt)*) => {
        $crate::error::SettleError::Collaborator(format!($($arg)*))
    };
}
