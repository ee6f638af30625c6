//! Wallet session lifecycle.
//!
//! The session slot holds either nothing or a complete [`ActiveSession`]; provider,
//! signer and binding are built together and the slot is swapped in a single write.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::Address;
use parking_lot::RwLock;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::contract::{ChainProvider, EscrowBinding, Signer};
use crate::errors::{EscrowError, EscrowResult};
use crate::provider::{ProviderError, SignalSubscription, WalletProvider, WalletSignal};

/// Identity of an established session, as seen by the view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub account: Address,
    pub chain_id: u64,
    pub epoch: u64,
}

impl fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on chain {}", self.account, self.chain_id)
    }
}

/// Everything derived from one authorized account on one network.
#[derive(Debug)]
pub struct ActiveSession {
    pub epoch: u64,
    pub account: Address,
    pub chain_id: u64,
    pub provider: ChainProvider,
    pub signer: Signer,
    pub binding: EscrowBinding,
}

impl ActiveSession {
    fn build(epoch: u64, provider: ChainProvider, account: Address, contract: Address) -> Self {
        let signer = provider.signer(account);
        let binding = EscrowBinding::new(contract, signer.clone());
        Self {
            epoch,
            account,
            chain_id: provider.chain_id(),
            provider,
            signer,
            binding,
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            account: self.account,
            chain_id: self.chain_id,
            epoch: self.epoch,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub enum Session {
    #[default]
    None,
    Active(Arc<ActiveSession>),
}

/// Effect of a wallet signal on the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionChange {
    Unchanged,
    AccountSwitched(SessionInfo),
    Disconnected,
    /// The network changed; every derived component must be rebuilt from scratch.
    ReloadRequired { chain_id: u64 },
}

pub struct WalletSessionManager {
    platform: Option<Arc<dyn WalletProvider>>,
    contract_address: Address,
    expected_chain_id: Option<u64>,
    session: RwLock<Session>,
    epochs: AtomicU64,
    subscribed: AtomicBool,
    subscription: Mutex<Option<SignalSubscription>>,
    subscription_ready: Notify,
    last_rejection: RwLock<Option<String>>,
}

impl WalletSessionManager {
    pub fn new(platform: Option<Arc<dyn WalletProvider>>, contract_address: Address) -> Self {
        Self {
            platform,
            contract_address,
            expected_chain_id: None,
            session: RwLock::new(Session::None),
            epochs: AtomicU64::new(0),
            subscribed: AtomicBool::new(false),
            subscription: Mutex::new(None),
            subscription_ready: Notify::new(),
            last_rejection: RwLock::new(None),
        }
    }

    /// Refuses sessions on any chain other than `chain_id`.
    pub fn with_expected_chain(mut self, chain_id: Option<u64>) -> Self {
        self.expected_chain_id = chain_id;
        self
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    /// Requests account access and establishes the session.
    ///
    /// Connecting again with the same account and network returns the existing
    /// session unchanged. The first successful connect subscribes to wallet signals.
    pub async fn connect(&self) -> EscrowResult<SessionInfo> {
        let platform = match &self.platform {
            Some(platform) if platform.is_available() => Arc::clone(platform),
            _ => {
                warn!("no wallet provider available");
                return Err(EscrowError::WalletUnavailable);
            }
        };

        let accounts = match platform.request_accounts().await {
            Ok(accounts) => accounts,
            Err(ProviderError::Unavailable) => return Err(EscrowError::WalletUnavailable),
            Err(ProviderError::UserRejected(reason)) => {
                info!(%reason, "account authorization rejected");
                *self.last_rejection.write() = Some(reason.clone());
                return Err(EscrowError::authorization_denied(reason));
            }
            Err(other) => return Err(EscrowError::Provider(other)),
        };
        let Some(account) = accounts.first().copied() else {
            let reason = "wallet returned no authorized accounts".to_owned();
            *self.last_rejection.write() = Some(reason.clone());
            return Err(EscrowError::authorization_denied(reason));
        };

        let chain_id = platform.chain_id().await?;
        if let Some(expected) = self.expected_chain_id {
            if expected != chain_id {
                warn!(expected, actual = chain_id, "wallet connected to unexpected chain");
                return Err(EscrowError::WrongNetwork {
                    expected,
                    actual: chain_id,
                });
            }
        }

        let info = self.install(&platform, account, chain_id);
        *self.last_rejection.write() = None;
        self.ensure_subscribed(platform.as_ref()).await;
        Ok(info)
    }

    fn install(
        &self,
        platform: &Arc<dyn WalletProvider>,
        account: Address,
        chain_id: u64,
    ) -> SessionInfo {
        let mut slot = self.session.write();
        if let Session::Active(current) = &*slot {
            if current.account == account && current.chain_id == chain_id {
                debug!(%account, epoch = current.epoch, "session already established");
                return current.info();
            }
        }
        let provider = ChainProvider::new(Arc::clone(platform), chain_id);
        let session = ActiveSession::build(self.next_epoch(), provider, account, self.contract_address);
        let info = session.info();
        *slot = Session::Active(Arc::new(session));
        info!(%account, chain_id, epoch = info.epoch, "wallet session established");
        info
    }

    async fn ensure_subscribed(&self, platform: &dyn WalletProvider) {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return;
        }
        let subscription = platform.subscribe();
        *self.subscription.lock().await = Some(subscription);
        self.subscription_ready.notify_one();
        debug!("subscribed to wallet signals");
    }

    fn next_epoch(&self) -> u64 {
        self.epochs.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Applies an `accountsChanged` signal.
    pub fn on_account_changed(&self, accounts: &[Address]) -> SessionChange {
        let mut slot = self.session.write();
        let current = match &*slot {
            Session::Active(current) => Arc::clone(current),
            Session::None => {
                debug!("account change ignored without a session");
                return SessionChange::Unchanged;
            }
        };
        match accounts.first().copied() {
            None => {
                *slot = Session::None;
                info!(account = %current.account, "wallet disconnected all accounts");
                SessionChange::Disconnected
            }
            Some(account) if account == current.account => SessionChange::Unchanged,
            Some(account) => {
                let session = ActiveSession::build(
                    self.next_epoch(),
                    current.provider.clone(),
                    account,
                    self.contract_address,
                );
                let info = session.info();
                *slot = Session::Active(Arc::new(session));
                info!(
                    from = %current.account,
                    to = %account,
                    epoch = info.epoch,
                    "wallet account switched"
                );
                SessionChange::AccountSwitched(info)
            }
        }
    }

    /// Applies a `chainChanged` signal. The session is torn down and the host must
    /// rebuild everything.
    pub fn on_network_changed(&self, chain_id: u64) -> SessionChange {
        *self.session.write() = Session::None;
        if let Ok(mut subscription) = self.subscription.try_lock() {
            subscription.take();
        }
        info!(chain_id, "wallet network changed; reload required");
        SessionChange::ReloadRequired { chain_id }
    }

    /// Waits for the next wallet signal and applies it. Pends forever while not
    /// subscribed.
    pub async fn next_change(&self) -> SessionChange {
        loop {
            {
                let mut guard = self.subscription.lock().await;
                let signal = match guard.as_mut() {
                    Some(subscription) => subscription.next().await,
                    None => None,
                };
                match signal {
                    Some(WalletSignal::AccountsChanged(accounts)) => {
                        return self.on_account_changed(&accounts);
                    }
                    Some(WalletSignal::ChainChanged(chain_id)) => {
                        guard.take();
                        drop(guard);
                        return self.on_network_changed(chain_id);
                    }
                    None => {
                        if guard.take().is_some() {
                            warn!("wallet signal source closed");
                        }
                    }
                }
            }
            self.subscription_ready.notified().await;
        }
    }

    pub fn current(&self) -> Option<Arc<ActiveSession>> {
        match &*self.session.read() {
            Session::Active(session) => Some(Arc::clone(session)),
            Session::None => None,
        }
    }

    pub fn info(&self) -> Option<SessionInfo> {
        self.current().map(|session| session.info())
    }

    pub fn last_rejection(&self) -> Option<String> {
        self.last_rejection.read().clone()
    }

    /// Drops the session and the signal subscription.
    pub async fn shutdown(&self) {
        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.unsubscribe();
        }
        *self.session.write() = Session::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockWalletProvider;

    const CONTRACT: Address = Address::repeat_byte(0xee);

    fn manager(provider: &MockWalletProvider) -> WalletSessionManager {
        WalletSessionManager::new(Some(Arc::new(provider.clone())), CONTRACT)
    }

    #[tokio::test]
    async fn connect_without_capability_fails() {
        let sessions = WalletSessionManager::new(None, CONTRACT);
        assert_eq!(sessions.connect().await, Err(EscrowError::WalletUnavailable));

        let provider = MockWalletProvider::unavailable();
        let sessions = manager(&provider);
        assert_eq!(sessions.connect().await, Err(EscrowError::WalletUnavailable));
        assert!(sessions.current().is_none());
    }

    #[tokio::test]
    async fn rejection_is_recorded() {
        let provider = MockWalletProvider::new().with_accounts(vec![Address::repeat_byte(1)]);
        provider.reject_authorization("User rejected the request.");
        let sessions = manager(&provider);

        assert_eq!(
            sessions.connect().await,
            Err(EscrowError::authorization_denied("User rejected the request."))
        );
        assert_eq!(
            sessions.last_rejection().as_deref(),
            Some("User rejected the request.")
        );
        assert!(sessions.current().is_none());
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let account = Address::repeat_byte(1);
        let provider = MockWalletProvider::new().with_accounts(vec![account]);
        let sessions = manager(&provider);

        let first = sessions.connect().await.unwrap();
        let second = sessions.connect().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.account, account);
        assert_eq!(provider.subscription_count(), 1);

        let session = sessions.current().unwrap();
        assert_eq!(session.signer.account(), account);
        assert_eq!(session.binding.address(), CONTRACT);
    }

    #[tokio::test]
    async fn wrong_network_is_refused() {
        let provider = MockWalletProvider::new()
            .with_accounts(vec![Address::repeat_byte(1)])
            .with_chain_id(1);
        let sessions = manager(&provider).with_expected_chain(Some(97));
        assert_eq!(
            sessions.connect().await,
            Err(EscrowError::WrongNetwork {
                expected: 97,
                actual: 1
            })
        );
    }

    #[tokio::test]
    async fn account_changes_rebuild_or_tear_down() {
        let provider = MockWalletProvider::new().with_accounts(vec![Address::repeat_byte(1)]);
        let sessions = manager(&provider);
        let first = sessions.connect().await.unwrap();

        assert_eq!(
            sessions.on_account_changed(&[Address::repeat_byte(1)]),
            SessionChange::Unchanged
        );

        let switched = match sessions.on_account_changed(&[Address::repeat_byte(2)]) {
            SessionChange::AccountSwitched(info) => info,
            other => panic!("unexpected change: {other:?}"),
        };
        assert_eq!(switched.account, Address::repeat_byte(2));
        assert!(switched.epoch > first.epoch);
        let session = sessions.current().unwrap();
        assert_eq!(session.signer.account(), Address::repeat_byte(2));

        assert_eq!(sessions.on_account_changed(&[]), SessionChange::Disconnected);
        assert!(sessions.current().is_none());
    }

    #[tokio::test]
    async fn signals_before_connect_are_ignored() {
        let provider = MockWalletProvider::new();
        let sessions = manager(&provider);
        assert_eq!(
            sessions.on_account_changed(&[Address::repeat_byte(3)]),
            SessionChange::Unchanged
        );
        assert!(sessions.current().is_none());
    }

    #[tokio::test]
    async fn chain_change_signal_requires_reload() {
        let provider = MockWalletProvider::new().with_accounts(vec![Address::repeat_byte(1)]);
        let sessions = manager(&provider);
        sessions.connect().await.unwrap();

        provider.switch_chain(56);
        assert_eq!(
            sessions.next_change().await,
            SessionChange::ReloadRequired { chain_id: 56 }
        );
        assert!(sessions.current().is_none());
    }
}
