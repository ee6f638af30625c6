use alloy_primitives::{TxHash, U256};
use chrono::Utc;
use tokio::time;
use tracing::{debug, info, warn};

use super::{format_tx_hash, CreationOutcome, JobDraft};
use crate::config::CreationConfig;
use crate::errors::{EscrowError, WALLET_UNAVAILABLE_MESSAGE};
use crate::provider::ReceiptStatus;
use crate::session::ActiveSession;
use crate::units::DisplayUnit;

/// Submits `createJob` transactions and optionally follows them to a receipt.
#[derive(Clone, Debug)]
pub struct JobCreationService {
    unit: DisplayUnit,
    settings: CreationConfig,
}

impl JobCreationService {
    pub fn new(unit: DisplayUnit, settings: CreationConfig) -> Self {
        Self { unit, settings }
    }

    pub fn tracks_confirmations(&self) -> bool {
        self.settings.track_confirmations
    }

    pub async fn create_job(
        &self,
        session: Option<&ActiveSession>,
        draft: &JobDraft,
    ) -> CreationOutcome {
        let Some(session) = session else {
            return CreationOutcome::Failed(WALLET_UNAVAILABLE_MESSAGE.to_owned());
        };
        match self.submit(session, draft).await {
            Ok(tx_hash) => {
                info!(
                    account = %session.account,
                    tx_hash = %format_tx_hash(&tx_hash),
                    "createJob submitted"
                );
                CreationOutcome::Submitted(tx_hash)
            }
            Err(error) => {
                warn!(account = %session.account, %error, "createJob failed");
                CreationOutcome::Failed(error.display_message())
            }
        }
    }

    async fn submit(&self, session: &ActiveSession, draft: &JobDraft) -> Result<TxHash, EscrowError> {
        let deadline = u64::try_from(draft.deadline_epoch_seconds()).map_err(|_| {
            EscrowError::invalid_input(format!("deadline {} is before 1970", draft.deadline))
        })?;
        let value = self
            .unit
            .to_base_units(&draft.amount)
            .map_err(|err| EscrowError::invalid_input(err.to_string()))?;
        if self.settings.validate_before_submit {
            validate_draft(draft, value, Utc::now().timestamp())?;
        }
        Ok(session
            .binding
            .create_job(&draft.dev_address, deadline, value)
            .await?)
    }

    /// Polls the receipt of `tx_hash` until it is mined or the attempts run out.
    ///
    /// Returns `None` while the transaction is still pending.
    pub async fn await_confirmation(
        &self,
        session: &ActiveSession,
        tx_hash: TxHash,
    ) -> Option<CreationOutcome> {
        let interval = self.settings.confirmation_poll_interval();
        for attempt in 1..=self.settings.confirmation_max_attempts {
            match session.provider.receipt(tx_hash).await {
                Ok(Some(ReceiptStatus::Success { block_number })) => {
                    info!(tx_hash = %format_tx_hash(&tx_hash), block_number, "createJob confirmed");
                    return Some(CreationOutcome::Confirmed {
                        tx_hash,
                        block_number,
                    });
                }
                Ok(Some(ReceiptStatus::Reverted { block_number })) => {
                    warn!(tx_hash = %format_tx_hash(&tx_hash), block_number, "createJob reverted");
                    return Some(CreationOutcome::Failed(format!(
                        "transaction {} reverted in block {block_number}",
                        format_tx_hash(&tx_hash)
                    )));
                }
                Ok(None) => debug!(attempt, "transaction still pending"),
                Err(error) => debug!(attempt, %error, "receipt poll failed"),
            }
            time::sleep(interval).await;
        }
        None
    }
}

/// Checks the draft before any remote call is made.
pub fn validate_draft(draft: &JobDraft, value: U256, now_epoch_seconds: i64) -> Result<(), EscrowError> {
    if !is_address_shaped(&draft.dev_address) {
        return Err(EscrowError::invalid_input(format!(
            "developer address {:?} must be 0x followed by 40 hex digits",
            draft.dev_address
        )));
    }
    if draft.deadline_epoch_seconds() <= now_epoch_seconds {
        return Err(EscrowError::invalid_input(format!(
            "deadline {} must be in the future",
            draft.deadline
        )));
    }
    if value.is_zero() {
        return Err(EscrowError::invalid_input("amount must be greater than zero"));
    }
    Ok(())
}

fn is_address_shaped(input: &str) -> bool {
    match input.strip_prefix("0x") {
        Some(digits) => digits.len() == 40 && digits.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy_primitives::{Address, B256};
    use chrono::{DateTime, Duration as ChronoDuration};

    use super::*;
    use crate::provider::{MockWalletProvider, ProviderError};
    use crate::session::WalletSessionManager;

    const DEV: &str = "0x2222222222222222222222222222222222222222";

    async fn session(provider: &MockWalletProvider) -> Arc<ActiveSession> {
        let sessions =
            WalletSessionManager::new(Some(Arc::new(provider.clone())), Address::repeat_byte(0xee));
        sessions.connect().await.unwrap();
        sessions.current().unwrap()
    }

    fn draft(dev: &str, amount: &str) -> JobDraft {
        JobDraft {
            dev_address: dev.to_owned(),
            deadline: (Utc::now() + ChronoDuration::days(7)).fixed_offset(),
            amount: amount.to_owned(),
        }
    }

    fn service(validate: bool) -> JobCreationService {
        JobCreationService::new(
            DisplayUnit::default(),
            CreationConfig {
                validate_before_submit: validate,
                confirmation_poll_interval_ms: 1,
                confirmation_max_attempts: 3,
                ..CreationConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn submits_and_reports_transaction_hash() {
        let provider = MockWalletProvider::new().with_accounts(vec![Address::repeat_byte(1)]);
        let session = session(&provider).await;

        let outcome = service(true)
            .create_job(Some(&session), &draft(DEV, "1.5"))
            .await;
        assert!(matches!(outcome, CreationOutcome::Submitted(_)));
        let sent = provider.sent_transactions();
        assert_eq!(sent[0].value, U256::from(1_500_000_000_000_000_000u128));
    }

    #[tokio::test]
    async fn without_session_reports_wallet_unavailable() {
        let outcome = service(true).create_job(None, &draft(DEV, "1")).await;
        assert_eq!(
            outcome,
            CreationOutcome::Failed(WALLET_UNAVAILABLE_MESSAGE.to_owned())
        );
    }

    #[tokio::test]
    async fn validation_stops_bad_drafts_before_submission() {
        let provider = MockWalletProvider::new().with_accounts(vec![Address::repeat_byte(1)]);
        let session = session(&provider).await;
        let service = service(true);

        let outcome = service.create_job(Some(&session), &draft("0x1234", "1")).await;
        assert!(matches!(outcome, CreationOutcome::Failed(message) if message.contains("40 hex digits")));

        let outcome = service.create_job(Some(&session), &draft(DEV, "0")).await;
        assert!(matches!(outcome, CreationOutcome::Failed(message) if message.contains("greater than zero")));

        let mut past = draft(DEV, "1");
        past.deadline = DateTime::from_timestamp(1_000, 0).unwrap().fixed_offset();
        let outcome = service.create_job(Some(&session), &past).await;
        assert!(matches!(outcome, CreationOutcome::Failed(message) if message.contains("future")));

        assert!(provider.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn signing_rejection_is_surfaced_verbatim() {
        let provider = MockWalletProvider::new().with_accounts(vec![Address::repeat_byte(1)]);
        provider.push_send_response(Err(ProviderError::UserRejected(
            "User denied transaction signature.".into(),
        )));
        let session = session(&provider).await;

        let outcome = service(true)
            .create_job(Some(&session), &draft(DEV, "1"))
            .await;
        assert_eq!(
            outcome,
            CreationOutcome::Failed("User denied transaction signature.".into())
        );
    }

    #[tokio::test]
    async fn confirmation_polling_reports_receipt_status() {
        let provider = MockWalletProvider::new().with_accounts(vec![Address::repeat_byte(1)]);
        let session = session(&provider).await;
        let service = service(true);

        let mined = B256::repeat_byte(1);
        provider.set_receipt(mined, ReceiptStatus::Success { block_number: 12 });
        assert_eq!(
            service.await_confirmation(&session, mined).await,
            Some(CreationOutcome::Confirmed {
                tx_hash: mined,
                block_number: 12
            })
        );

        let reverted = B256::repeat_byte(2);
        provider.set_receipt(reverted, ReceiptStatus::Reverted { block_number: 13 });
        assert!(matches!(
            service.await_confirmation(&session, reverted).await,
            Some(CreationOutcome::Failed(message)) if message.ends_with("reverted in block 13")
        ));

        assert_eq!(
            service.await_confirmation(&session, B256::repeat_byte(3)).await,
            None
        );
    }

    #[test]
    fn address_shape_check() {
        assert!(is_address_shaped(DEV));
        assert!(!is_address_shaped("2222222222222222222222222222222222222222"));
        assert!(!is_address_shaped("0x22222222222222222222222222222222222222zz"));
    }
}
