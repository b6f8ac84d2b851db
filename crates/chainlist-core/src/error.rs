//! Fault taxonomy shared by the gateway, reader, executor and controller.
//!
//! - `ResourceNotFound`: the account has no list yet. Expected, not surfaced.
//! - `Network`: transport or decoding failure. Transient, never retried automatically.
//! - `TransactionRejected`: the signer or the chain refused the mutation.
//! - `Timeout`: the mutation was submitted but not observed as committed in time.
//!   The ledger outcome is indeterminate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The requested resource does not exist under the account.
    #[error("resource {resource_type} not found under {account}")]
    ResourceNotFound {
        account: String,
        resource_type: String,
    },

    /// Transport failure, unexpected status or malformed response.
    #[error("network error: {message}")]
    Network { message: String },

    /// The transaction was refused before or during execution.
    #[error("transaction rejected: {reason}")]
    TransactionRejected {
        /// Hash, when the transaction reached the chain.
        hash: Option<String>,
        reason: String,
    },

    /// Confirmation was not observed before the deadline.
    #[error("transaction {hash} not confirmed after {waited_ms}ms")]
    Timeout { hash: String, waited_ms: u64 },
}

impl LedgerError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn rejected(hash: Option<String>, reason: impl Into<String>) -> Self {
        Self::TransactionRejected {
            hash,
            reason: reason.into(),
        }
    }

    /// Transient faults may succeed when the user tries again.
    ///
    /// A rejection is deterministic for the same ledger state, and a missing
    /// resource is a state rather than a fault.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::ResourceNotFound { .. } | Self::TransactionRejected { .. } => false,
        }
    }

    /// True when the ledger may or may not have applied the mutation.
    #[must_use]
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::network(format!("malformed response: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::LedgerError;

    #[test]
    fn network_and_timeout_are_transient() {
        assert!(LedgerError::network("connection reset").is_transient());
        assert!(
            LedgerError::Timeout {
                hash: "0xabc".to_string(),
                waited_ms: 30_000,
            }
            .is_transient()
        );
    }

    #[test]
    fn rejection_and_missing_resource_are_not_transient() {
        assert!(!LedgerError::rejected(None, "user declined").is_transient());
        assert!(
            !LedgerError::ResourceNotFound {
                account: "0x1".to_string(),
                resource_type: "0x2::todolist::TodoList".to_string(),
            }
            .is_transient()
        );
    }

    #[test]
    fn only_timeout_is_indeterminate() {
        assert!(
            LedgerError::Timeout {
                hash: "0xabc".to_string(),
                waited_ms: 1,
            }
            .is_indeterminate()
        );
        assert!(!LedgerError::network("dns").is_indeterminate());
    }

    #[test]
    fn malformed_json_maps_to_network() {
        let err = serde_json::from_str::<u64>("not json").expect_err("invalid json");
        let mapped = LedgerError::from(err);
        assert!(matches!(mapped, LedgerError::Network { .. }));
    }
}
