use thiserror::Error;

use crate::contract::ContractError;
use crate::provider::ProviderError;

/// Message shown when the platform exposes no wallet capability.
pub const WALLET_UNAVAILABLE_MESSAGE: &str =
    "Please install a browser wallet extension to interact";

/// Reason recorded when a lookup resolves to the zero-address owner.
pub const JOB_NOT_FOUND_MESSAGE: &str = "Job doesn't exist";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EscrowError {
    #[error("wallet provider unavailable")]
    WalletUnavailable,
    #[error("account authorization denied: {reason}")]
    AuthorizationDenied { reason: String },
    #[error("job {job_id} not found")]
    JobNotFound { job_id: u64 },
    #[error("remote call rejected: {reason}")]
    RemoteCallRejected { reason: String },
    #[error("job query failed: {reason}")]
    TransientQueryFailure { reason: String },
    #[error("wallet is connected to chain {actual}, expected chain {expected}")]
    WrongNetwork { expected: u64, actual: u64 },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The wallet session was replaced between issuing a request and running it.
    #[error("wallet session changed before the request was sent")]
    SessionChanged,
    #[error("internal error: {0}")]
    Internal(String),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl EscrowError {
    pub fn authorization_denied(reason: impl Into<String>) -> Self {
        Self::AuthorizationDenied {
            reason: reason.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::RemoteCallRejected {
            reason: reason.into(),
        }
    }

    pub fn query_failed(reason: impl Into<String>) -> Self {
        Self::TransientQueryFailure {
            reason: reason.into(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }

    /// Converts the error into the message surfaced by the view.
    ///
    /// Rejection reasons coming from the wallet or the contract are passed through
    /// verbatim so the user sees exactly what the remote side reported.
    pub fn display_message(&self) -> String {
        match self {
            Self::WalletUnavailable => WALLET_UNAVAILABLE_MESSAGE.to_owned(),
            Self::AuthorizationDenied { reason } => reason.clone(),
            Self::JobNotFound { .. } => JOB_NOT_FOUND_MESSAGE.to_owned(),
            Self::RemoteCallRejected { reason } => reason.clone(),
            Self::TransientQueryFailure { reason } => format!("Lookup failed: {reason}"),
            Self::WrongNetwork { expected, actual } => format!(
                "Wallet is on chain {actual}; switch to chain {expected} to continue"
            ),
            Self::InvalidInput(reason) => reason.clone(),
            Self::SessionChanged => {
                "The wallet account changed before the request was sent; nothing was submitted"
                    .to_owned()
            }
            Self::Internal(reason) => format!("Internal error: {reason}"),
            Self::Provider(error) => error.to_string(),
        }
    }

    /// Whether the user can fix the situation by retrying the same action.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::WalletUnavailable)
    }
}

impl From<ContractError> for EscrowError {
    fn from(value: ContractError) -> Self {
        match value {
            ContractError::Provider(ProviderError::Unavailable) => Self::WalletUnavailable,
            ContractError::Provider(ProviderError::UserRejected(reason))
            | ContractError::Provider(ProviderError::Reverted(reason)) => {
                Self::RemoteCallRejected { reason }
            }
            other => Self::RemoteCallRejected {
                reason: other.to_string(),
            },
        }
    }
}

pub type EscrowResult<T> = Result<T, EscrowError>;
