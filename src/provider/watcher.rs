use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use super::{SignalSubscription, WalletProvider, WalletSignal, SIGNAL_CHANNEL_CAPACITY};

/// Turns a provider without push notifications into a signal source by polling
/// `accounts()` and `chain_id()` at a fixed interval.
///
/// The first successful poll only records a baseline; signals are emitted for
/// subsequent differences.
pub fn spawn_polling_watcher<P>(provider: Arc<P>, interval: Duration) -> SignalSubscription
where
    P: WalletProvider + ?Sized + 'static,
{
    let (sender, receiver) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
    let task = tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut snapshot = WatchSnapshot::default();
        loop {
            ticker.tick().await;
            let accounts = match provider.accounts().await {
                Ok(accounts) => accounts,
                Err(error) => {
                    debug!(%error, "account poll failed");
                    continue;
                }
            };
            let chain_id = match provider.chain_id().await {
                Ok(chain_id) => chain_id,
                Err(error) => {
                    debug!(%error, "chain id poll failed");
                    continue;
                }
            };
            for signal in snapshot.observe(accounts, chain_id) {
                info!(%signal, "wallet signal observed");
                if sender.send(signal).is_err() {
                    return;
                }
            }
        }
    });
    SignalSubscription::with_task(receiver, task)
}

#[derive(Debug, Default)]
struct WatchSnapshot {
    baseline: Option<(Vec<Address>, u64)>,
}

impl WatchSnapshot {
    fn observe(&mut self, accounts: Vec<Address>, chain_id: u64) -> Vec<WalletSignal> {
        let mut signals = Vec::new();
        match self.baseline.as_mut() {
            None => self.baseline = Some((accounts, chain_id)),
            Some((known_accounts, known_chain)) => {
                if *known_chain != chain_id {
                    *known_chain = chain_id;
                    signals.push(WalletSignal::ChainChanged(chain_id));
                }
                if *known_accounts != accounts {
                    *known_accounts = accounts.clone();
                    signals.push(WalletSignal::AccountsChanged(accounts));
                }
            }
        }
        signals
    }
}
