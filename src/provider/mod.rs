//! Boundary to the wallet capability injected by the hosting environment.
//!
//! The [`WalletProvider`] trait is the only way the client reaches the chain: account
//! authorization, read calls, transaction submission, and the account/network change
//! signals all flow through it.

pub mod mock;
pub mod rpc;
pub mod watcher;

use std::fmt;

use alloy_primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

pub use mock::MockWalletProvider;
pub use rpc::JsonRpcWalletProvider;

/// Capacity of the broadcast channel carrying wallet signals.
pub const SIGNAL_CHANNEL_CAPACITY: usize = 16;

/// Signals fired by the wallet independently of user actions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletSignal {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

impl fmt::Display for WalletSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccountsChanged(accounts) => match accounts.first() {
                Some(account) => write!(f, "accountsChanged({account})"),
                None => write!(f, "accountsChanged(<none>)"),
            },
            Self::ChainChanged(chain_id) => write!(f, "chainChanged({chain_id})"),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// No wallet capability is present on this platform.
    #[error("wallet provider is not available")]
    Unavailable,
    /// The user declined the prompt (authorization or signing).
    #[error("{0}")]
    UserRejected(String),
    /// The call reverted on-chain or during simulation.
    #[error("{0}")]
    Reverted(String),
    #[error("provider RPC error [{code}]: {message}")]
    Rpc { code: i64, message: String },
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider returned a malformed payload: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn transport(error: impl fmt::Display) -> Self {
        Self::Transport(error.to_string())
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Read-only call against a contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
}

/// State-changing call signed by `from`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Final status of a mined transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success { block_number: u64 },
    Reverted { block_number: u64 },
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn is_available(&self) -> bool;

    /// Asks the wallet for account access. May prompt the user.
    async fn request_accounts(&self) -> ProviderResult<Vec<Address>>;

    /// Lists the accounts already authorized, without prompting.
    async fn accounts(&self) -> ProviderResult<Vec<Address>>;

    async fn chain_id(&self) -> ProviderResult<u64>;

    async fn call(&self, request: &CallRequest) -> ProviderResult<Bytes>;

    async fn send_transaction(&self, request: &TransactionRequest) -> ProviderResult<TxHash>;

    async fn transaction_receipt(&self, hash: TxHash) -> ProviderResult<Option<ReceiptStatus>>;

    /// Opens a new subscription to the wallet's change signals.
    fn subscribe(&self) -> SignalSubscription;
}

/// Owned handle on a stream of [`WalletSignal`]s.
///
/// Dropping the handle, or calling [`SignalSubscription::unsubscribe`], stops any
/// background task feeding it.
#[derive(Debug)]
pub struct SignalSubscription {
    receiver: broadcast::Receiver<WalletSignal>,
    task: Option<JoinHandle<()>>,
}

impl SignalSubscription {
    pub fn new(receiver: broadcast::Receiver<WalletSignal>) -> Self {
        Self {
            receiver,
            task: None,
        }
    }

    pub fn with_task(receiver: broadcast::Receiver<WalletSignal>, task: JoinHandle<()>) -> Self {
        Self {
            receiver,
            task: Some(task),
        }
    }

    /// Waits for the next signal. Returns `None` once the source is gone.
    pub async fn next(&mut self) -> Option<WalletSignal> {
        loop {
            match self.receiver.recv().await {
                Ok(signal) => return Some(signal),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "wallet signal subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SignalSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}
