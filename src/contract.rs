//! Typed binding to the escrow contract.
//!
//! [`ChainProvider`], [`Signer`] and [`EscrowBinding`] are layered handles: the
//! provider talks to the network, the signer pins an account on top of it, and the
//! binding pins the contract address on top of the signer. All three are cheap to
//! clone and are rebuilt together whenever the session identity changes.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_sol_types::{sol, SolCall};
use thiserror::Error;
use tracing::debug;

use crate::jobs::Job;
use crate::provider::{
    CallRequest, ProviderError, ReceiptStatus, TransactionRequest, WalletProvider,
};

sol! {
    /// Escrow contract surface used by the client.
    interface IJobEscrow {
        function jobs(uint256 jobId)
            external
            view
            returns (address owner, address dev, uint256 amount, uint256 deadline);

        function createJob(address dev, uint256 deadline) external payable;
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("invalid {argument} argument {value:?}: {reason}")]
    InvalidArgument {
        argument: &'static str,
        value: String,
        reason: String,
    },
    #[error("unable to decode {method} result: {reason}")]
    Decode {
        method: &'static str,
        reason: String,
    },
}

/// Network handle derived from the wallet capability.
#[derive(Clone)]
pub struct ChainProvider {
    platform: Arc<dyn WalletProvider>,
    chain_id: u64,
}

impl ChainProvider {
    pub fn new(platform: Arc<dyn WalletProvider>, chain_id: u64) -> Self {
        Self { platform, chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn signer(&self, account: Address) -> Signer {
        Signer {
            account,
            provider: self.clone(),
        }
    }

    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ContractError> {
        Ok(self.platform.call(&CallRequest { to, data }).await?)
    }

    pub async fn receipt(&self, hash: TxHash) -> Result<Option<ReceiptStatus>, ContractError> {
        Ok(self.platform.transaction_receipt(hash).await?)
    }
}

impl fmt::Debug for ChainProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainProvider")
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

/// Provider pinned to one account for state-changing calls.
#[derive(Clone, Debug)]
pub struct Signer {
    account: Address,
    provider: ChainProvider,
}

impl Signer {
    pub fn account(&self) -> Address {
        self.account
    }

    pub fn provider(&self) -> &ChainProvider {
        &self.provider
    }

    pub async fn send_transaction(
        &self,
        to: Address,
        value: U256,
        data: Bytes,
    ) -> Result<TxHash, ContractError> {
        let request = TransactionRequest {
            from: self.account,
            to,
            value,
            data,
        };
        Ok(self.provider.platform.send_transaction(&request).await?)
    }
}

/// Escrow contract at a fixed address, bound to a signer.
#[derive(Clone, Debug)]
pub struct EscrowBinding {
    address: Address,
    signer: Signer,
}

impl EscrowBinding {
    pub fn new(address: Address, signer: Signer) -> Self {
        Self { address, signer }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Reads the job record stored under `job_id`. Unknown ids come back as the
    /// all-zero record.
    pub async fn jobs(&self, job_id: u64) -> Result<Job, ContractError> {
        let call = IJobEscrow::jobsCall {
            jobId: U256::from(job_id),
        };
        let output = self
            .signer
            .provider
            .call(self.address, Bytes::from(call.abi_encode()))
            .await?;
        let decoded = IJobEscrow::jobsCall::abi_decode_returns(&output, true).map_err(|err| {
            ContractError::Decode {
                method: "jobs",
                reason: err.to_string(),
            }
        })?;
        Ok(Job {
            owner: decoded.owner,
            dev: decoded.dev,
            amount: decoded.amount,
            deadline_epoch_seconds: decoded.deadline.saturating_to::<u64>(),
        })
    }

    /// Submits `createJob(dev, deadline)` carrying `value` as the escrowed deposit.
    pub async fn create_job(
        &self,
        dev: &str,
        deadline_epoch_seconds: u64,
        value: U256,
    ) -> Result<TxHash, ContractError> {
        let dev = parse_address("dev", dev)?;
        let call = IJobEscrow::createJobCall {
            dev,
            deadline: U256::from(deadline_epoch_seconds),
        };
        debug!(
            contract = %self.address,
            %dev,
            deadline = deadline_epoch_seconds,
            %value,
            "submitting createJob"
        );
        self.signer
            .send_transaction(self.address, value, Bytes::from(call.abi_encode()))
            .await
    }
}

fn parse_address(argument: &'static str, value: &str) -> Result<Address, ContractError> {
    let trimmed = value.trim();
    if !trimmed.starts_with("0x") {
        return Err(ContractError::InvalidArgument {
            argument,
            value: value.to_owned(),
            reason: "missing 0x prefix".into(),
        });
    }
    Address::from_str(trimmed).map_err(|err| ContractError::InvalidArgument {
        argument,
        value: value.to_owned(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockWalletProvider;

    fn binding(provider: &MockWalletProvider, account: Address) -> EscrowBinding {
        let platform: Arc<dyn WalletProvider> = Arc::new(provider.clone());
        let signer = ChainProvider::new(platform, 97).signer(account);
        EscrowBinding::new(Address::repeat_byte(0xee), signer)
    }

    #[tokio::test]
    async fn reads_job_records_through_abi() {
        let job = Job {
            owner: Address::repeat_byte(1),
            dev: Address::repeat_byte(2),
            amount: U256::from(5u64),
            deadline_epoch_seconds: 1_700_000_000,
        };
        let provider = MockWalletProvider::new().with_job(7, job.clone());
        let binding = binding(&provider, Address::repeat_byte(1));

        assert_eq!(binding.jobs(7).await.unwrap(), job);
        assert_eq!(binding.jobs(8).await.unwrap(), Job::default());
        assert_eq!(provider.lookups(), vec![7, 8]);
    }

    #[tokio::test]
    async fn create_job_attaches_value_and_encodes_arguments() {
        let provider = MockWalletProvider::new();
        let owner = Address::repeat_byte(1);
        let dev = Address::repeat_byte(2);
        let binding = binding(&provider, owner);

        binding
            .create_job(&dev.to_string(), 1_700_000_000, U256::from(10u64))
            .await
            .unwrap();

        let sent = provider.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, owner);
        assert_eq!(sent[0].to, binding.address());
        assert_eq!(sent[0].value, U256::from(10u64));
        let decoded = IJobEscrow::createJobCall::abi_decode(&sent[0].data, true).unwrap();
        assert_eq!(decoded.dev, dev);
        assert_eq!(decoded.deadline, U256::from(1_700_000_000u64));
    }

    #[tokio::test]
    async fn malformed_dev_address_is_rejected_before_submission() {
        let provider = MockWalletProvider::new();
        let binding = binding(&provider, Address::repeat_byte(1));

        let err = binding
            .create_job("0x1234", 1_700_000_000, U256::from(1u64))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ContractError::InvalidArgument { argument: "dev", .. }
        ));
        assert!(provider.sent_transactions().is_empty());
    }
}
