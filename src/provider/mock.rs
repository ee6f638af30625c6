use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, TxHash, B256, U256};
use alloy_sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};

use super::{
    CallRequest, ProviderError, ProviderResult, ReceiptStatus, SignalSubscription,
    TransactionRequest, WalletProvider, WalletSignal, SIGNAL_CHANNEL_CAPACITY,
};
use crate::contract::IJobEscrow;
use crate::jobs::Job;

/// In-memory wallet used by tests and local harnesses.
///
/// Jobs are served by decoding the ABI-encoded `jobs(uint256)` call, so the
/// contract binding is exercised end to end. Unknown ids resolve to an all-zero
/// record, like an unset storage slot.
#[derive(Clone)]
pub struct MockWalletProvider {
    available: bool,
    state: Arc<Mutex<MockState>>,
    signals: broadcast::Sender<WalletSignal>,
}

#[derive(Default)]
struct MockState {
    accounts: Vec<Address>,
    chain_id: u64,
    authorization_rejection: Option<String>,
    jobs: HashMap<u64, Job>,
    call_failure: Option<ProviderError>,
    call_panics: bool,
    call_gate: Option<Arc<Notify>>,
    send_responses: VecDeque<ProviderResult<TxHash>>,
    sent: Vec<TransactionRequest>,
    receipts: HashMap<TxHash, ReceiptStatus>,
    lookups: Vec<u64>,
    authorization_requests: usize,
    subscriptions: usize,
    next_hash: u64,
}

impl MockWalletProvider {
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        Self {
            available: true,
            state: Arc::new(Mutex::new(MockState {
                chain_id: 97,
                ..MockState::default()
            })),
            signals,
        }
    }

    /// A provider whose capability check fails, as on a platform without a wallet.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn with_accounts(self, accounts: Vec<Address>) -> Self {
        self.state.lock().accounts = accounts;
        self
    }

    pub fn with_chain_id(self, chain_id: u64) -> Self {
        self.state.lock().chain_id = chain_id;
        self
    }

    pub fn with_job(self, job_id: u64, job: Job) -> Self {
        self.insert_job(job_id, job);
        self
    }

    pub fn insert_job(&self, job_id: u64, job: Job) {
        self.state.lock().jobs.insert(job_id, job);
    }

    pub fn reject_authorization(&self, reason: impl Into<String>) {
        self.state.lock().authorization_rejection = Some(reason.into());
    }

    pub fn allow_authorization(&self) {
        self.state.lock().authorization_rejection = None;
    }

    /// Replaces the account list without notifying subscribers.
    pub fn set_accounts(&self, accounts: Vec<Address>) {
        self.state.lock().accounts = accounts;
    }

    /// Replaces the account list and fires `accountsChanged`.
    pub fn switch_accounts(&self, accounts: Vec<Address>) {
        self.state.lock().accounts = accounts.clone();
        let _ = self.signals.send(WalletSignal::AccountsChanged(accounts));
    }

    /// Switches the chain and fires `chainChanged`.
    pub fn switch_chain(&self, chain_id: u64) {
        self.state.lock().chain_id = chain_id;
        let _ = self.signals.send(WalletSignal::ChainChanged(chain_id));
    }

    /// Makes every read call fail with `error` until cleared with `None`.
    pub fn fail_calls(&self, error: Option<ProviderError>) {
        self.state.lock().call_failure = error;
    }

    /// Makes every read call panic, as a buggy provider would.
    pub fn panic_on_calls(&self) {
        self.state.lock().call_panics = true;
    }

    /// Holds read calls until the returned gate is notified, once per call.
    pub fn hold_calls(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().call_gate = Some(Arc::clone(&gate));
        gate
    }

    pub fn release_calls(&self) {
        self.state.lock().call_gate = None;
    }

    pub fn push_send_response(&self, response: ProviderResult<TxHash>) {
        self.state.lock().send_responses.push_back(response);
    }

    pub fn set_receipt(&self, hash: TxHash, status: ReceiptStatus) {
        self.state.lock().receipts.insert(hash, status);
    }

    pub fn sent_transactions(&self) -> Vec<TransactionRequest> {
        self.state.lock().sent.clone()
    }

    pub fn lookups(&self) -> Vec<u64> {
        self.state.lock().lookups.clone()
    }

    pub fn authorization_requests(&self) -> usize {
        self.state.lock().authorization_requests
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions
    }

    fn serve_job(&self, data: &[u8]) -> ProviderResult<Bytes> {
        let call = IJobEscrow::jobsCall::abi_decode(data, true)
            .map_err(|err| ProviderError::Reverted(format!("execution reverted: {err}")))?;
        let job_id = call.jobId.saturating_to::<u64>();
        let mut state = self.state.lock();
        state.lookups.push(job_id);
        let job = state.jobs.get(&job_id).cloned().unwrap_or_default();
        let encoded = (
            job.owner,
            job.dev,
            job.amount,
            U256::from(job.deadline_epoch_seconds),
        )
            .abi_encode_params();
        Ok(Bytes::from(encoded))
    }
}

impl Default for MockWalletProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletProvider for MockWalletProvider {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn request_accounts(&self) -> ProviderResult<Vec<Address>> {
        if !self.available {
            return Err(ProviderError::Unavailable);
        }
        let mut state = self.state.lock();
        state.authorization_requests += 1;
        if let Some(reason) = state.authorization_rejection.clone() {
            return Err(ProviderError::UserRejected(reason));
        }
        Ok(state.accounts.clone())
    }

    async fn accounts(&self) -> ProviderResult<Vec<Address>> {
        Ok(self.state.lock().accounts.clone())
    }

    async fn chain_id(&self) -> ProviderResult<u64> {
        Ok(self.state.lock().chain_id)
    }

    async fn call(&self, request: &CallRequest) -> ProviderResult<Bytes> {
        let (gate, failure, panics) = {
            let state = self.state.lock();
            (
                state.call_gate.clone(),
                state.call_failure.clone(),
                state.call_panics,
            )
        };
        if panics {
            panic!("mock wallet call panicked");
        }
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(error) = failure {
            return Err(error);
        }
        self.serve_job(&request.data)
    }

    async fn send_transaction(&self, request: &TransactionRequest) -> ProviderResult<TxHash> {
        let mut state = self.state.lock();
        state.sent.push(request.clone());
        if let Some(response) = state.send_responses.pop_front() {
            return response;
        }
        state.next_hash += 1;
        Ok(B256::left_padding_from(&state.next_hash.to_be_bytes()))
    }

    async fn transaction_receipt(&self, hash: TxHash) -> ProviderResult<Option<ReceiptStatus>> {
        Ok(self.state.lock().receipts.get(&hash).copied())
    }

    fn subscribe(&self) -> SignalSubscription {
        self.state.lock().subscriptions += 1;
        SignalSubscription::new(self.signals.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejection_is_reported_as_user_rejected() {
        let provider = MockWalletProvider::new().with_accounts(vec![Address::repeat_byte(1)]);
        provider.reject_authorization("User rejected the request.");
        let err = provider.request_accounts().await.expect_err("rejected");
        assert_eq!(
            err,
            ProviderError::UserRejected("User rejected the request.".into())
        );
        assert_eq!(provider.authorization_requests(), 1);
    }

    #[tokio::test]
    async fn switch_accounts_notifies_subscribers() {
        let provider = MockWalletProvider::new();
        let mut subscription = provider.subscribe();
        provider.switch_accounts(vec![Address::repeat_byte(9)]);
        assert_eq!(
            subscription.next().await,
            Some(WalletSignal::AccountsChanged(vec![Address::repeat_byte(9)]))
        );
        assert_eq!(provider.subscription_count(), 1);
    }

    #[tokio::test]
    async fn generated_hashes_are_unique() {
        let provider = MockWalletProvider::new();
        let request = TransactionRequest {
            from: Address::repeat_byte(1),
            to: Address::repeat_byte(2),
            value: U256::from(1u8),
            data: Bytes::new(),
        };
        let first = provider.send_transaction(&request).await.unwrap();
        let second = provider.send_transaction(&request).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(provider.sent_transactions().len(), 2);
    }
}
