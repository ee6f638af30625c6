//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use gig_escrow::config::ClientConfig;
use gig_escrow::controller::{ControlFlow, ControllerRuntime, Message};
use gig_escrow::jobs::Job;
use gig_escrow::provider::{MockWalletProvider, WalletProvider};

pub const ACCOUNT_A: Address = Address::repeat_byte(0xab);
pub const ACCOUNT_B: Address = Address::repeat_byte(0xcd);
pub const OWNER: Address = Address::repeat_byte(0x11);
pub const DEV: Address = Address::repeat_byte(0x22);

pub const ONE_UNIT: u128 = 1_000_000_000_000_000_000;

/// Configuration with short polling intervals so tests finish quickly.
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.requests.timeout_ms = 2_000;
    config.requests.signal_poll_interval_ms = 10;
    config.creation.confirmation_poll_interval_ms = 1;
    config.creation.confirmation_max_attempts = 3;
    config
}

pub fn sample_job() -> Job {
    Job {
        owner: OWNER,
        dev: DEV,
        amount: U256::from(ONE_UNIT),
        deadline_epoch_seconds: 1_700_000_000,
    }
}

pub fn wallet(accounts: Vec<Address>) -> MockWalletProvider {
    MockWalletProvider::new()
        .with_accounts(accounts)
        .with_chain_id(97)
}

pub fn runtime_with(provider: &MockWalletProvider, config: &ClientConfig) -> ControllerRuntime {
    let platform: Arc<dyn WalletProvider> = Arc::new(provider.clone());
    ControllerRuntime::from_config(config, Some(platform)).expect("runtime from config")
}

pub async fn connected_runtime(
    provider: &MockWalletProvider,
    config: &ClientConfig,
) -> ControllerRuntime {
    let mut runtime = runtime_with(provider, config);
    runtime.dispatch(Message::ConnectRequested);
    assert_eq!(runtime.run_until_idle().await, ControlFlow::Continue);
    runtime
}
