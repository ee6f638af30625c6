//! View state machine.
//!
//! [`ViewController::update`] is synchronous: it folds one [`Message`] into the
//! state and returns the [`AsyncAction`]s to run. Completions come back as messages
//! tagged with the token and session epoch they were issued under, which is how
//! superseded or cross-account results are recognized and dropped.

pub mod runtime;
pub mod view;

use alloy_primitives::{Address, TxHash};
use tracing::{debug, warn};

use crate::errors::EscrowError;
use crate::jobs::{CreationOutcome, JobDraft, JobLookup};
use crate::session::{SessionChange, SessionInfo};
use crate::time_format::DeadlineFormatter;

pub use runtime::{ControllerRuntime, Services};
pub use view::ViewSnapshot;

const CONNECT_FIRST_MESSAGE: &str = "Connect a wallet first";

/// Raw creation form input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobForm {
    pub dev_address: String,
    pub deadline: String,
    pub amount: String,
}

/// Messages driving the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    ConnectRequested,
    ConnectCompleted(Result<SessionInfo, EscrowError>),
    LookupRequested {
        job_id: String,
    },
    LookupCompleted {
        token: u64,
        epoch: u64,
        result: JobLookup,
    },
    CreateRequested(JobForm),
    CreateCompleted {
        token: u64,
        account: Option<Address>,
        outcome: CreationOutcome,
    },
    ConfirmationCompleted {
        token: u64,
        outcome: Option<CreationOutcome>,
    },
    Session(SessionChange),
    DismissError,
}

/// Work the host must perform on behalf of the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AsyncAction {
    Connect,
    Lookup { token: u64, epoch: u64, job_id: u64 },
    CreateJob {
        token: u64,
        epoch: u64,
        draft: JobDraft,
    },
    AwaitConfirmation { token: u64, tx_hash: TxHash },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ControlFlow {
    #[default]
    Continue,
    /// The network changed; the host must rebuild every component.
    Reload,
}

/// Collects the effects of one update cycle.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Update {
    pub actions: Vec<AsyncAction>,
    pub control: ControlFlow,
}

impl Update {
    fn push(&mut self, action: AsyncAction) {
        self.actions.push(action);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected(SessionInfo),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LastLookup {
    None,
    Pending { token: u64, job_id: u64 },
    Resolved(JobLookup),
}

/// Latest creation attempt and the account that submitted it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreationRecord {
    pub token: u64,
    pub account: Option<Address>,
    /// `None` while the wallet is still handling the submission.
    pub outcome: Option<CreationOutcome>,
    pub confirming: bool,
}

#[derive(Debug)]
pub struct ViewController {
    formatter: DeadlineFormatter,
    track_confirmations: bool,
    connection: ConnectionState,
    last_lookup: LastLookup,
    last_creation: Option<CreationRecord>,
    last_error: Option<String>,
    next_token: u64,
}

impl ViewController {
    pub fn new(formatter: DeadlineFormatter, track_confirmations: bool) -> Self {
        Self {
            formatter,
            track_confirmations,
            connection: ConnectionState::Disconnected,
            last_lookup: LastLookup::None,
            last_creation: None,
            last_error: None,
            next_token: 0,
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn last_lookup(&self) -> &LastLookup {
        &self.last_lookup
    }

    pub fn last_creation(&self) -> Option<&CreationRecord> {
        self.last_creation.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn view(&self) -> ViewSnapshot {
        ViewSnapshot::from_controller(self)
    }

    pub fn update(&mut self, message: Message) -> Update {
        let mut update = Update::default();

        match message {
            Message::ConnectRequested => match self.connection {
                ConnectionState::Connecting => debug!("connect already in progress"),
                ConnectionState::Disconnected => {
                    self.connection = ConnectionState::Connecting;
                    update.push(AsyncAction::Connect);
                }
                ConnectionState::Connected(_) => update.push(AsyncAction::Connect),
            },
            Message::ConnectCompleted(result) => match result {
                Ok(info) => self.apply_session(info),
                Err(error) => {
                    if self.connection == ConnectionState::Connecting {
                        self.connection = ConnectionState::Disconnected;
                    }
                    self.push_error(&error);
                }
            },
            Message::LookupRequested { job_id } => self.request_lookup(&job_id, &mut update),
            Message::LookupCompleted {
                token,
                epoch,
                result,
            } => self.complete_lookup(token, epoch, result),
            Message::CreateRequested(form) => self.request_creation(form, &mut update),
            Message::CreateCompleted {
                token,
                account,
                outcome,
            } => self.complete_creation(token, account, outcome, &mut update),
            Message::ConfirmationCompleted { token, outcome } => {
                match self.last_creation.as_mut() {
                    Some(record) if record.token == token && record.confirming => {
                        record.confirming = false;
                        if let Some(outcome) = outcome {
                            record.outcome = Some(outcome);
                        }
                    }
                    _ => debug!(token, "discarding stale confirmation"),
                }
            }
            Message::Session(change) => match change {
                SessionChange::Unchanged => {}
                SessionChange::AccountSwitched(info) => self.apply_session(info),
                SessionChange::Disconnected => {
                    self.connection = ConnectionState::Disconnected;
                    self.abandon_pending_lookup();
                }
                SessionChange::ReloadRequired { chain_id } => {
                    debug!(chain_id, "network changed; requesting reload");
                    self.connection = ConnectionState::Disconnected;
                    self.abandon_pending_lookup();
                    update.control = ControlFlow::Reload;
                }
            },
            Message::DismissError => self.last_error = None,
        }

        update
    }

    fn apply_session(&mut self, info: SessionInfo) {
        if let ConnectionState::Connected(current) = self.connection {
            if current.epoch != info.epoch {
                self.abandon_pending_lookup();
            }
        }
        self.connection = ConnectionState::Connected(info);
    }

    fn abandon_pending_lookup(&mut self) {
        if let LastLookup::Pending { token, job_id } = self.last_lookup {
            debug!(token, job_id, "abandoning in-flight lookup");
            self.last_lookup = LastLookup::None;
        }
    }

    fn session_epoch(&self) -> Option<u64> {
        match self.connection {
            ConnectionState::Connected(info) => Some(info.epoch),
            _ => None,
        }
    }

    fn issue_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn push_error(&mut self, error: &EscrowError) {
        self.last_error = Some(error.display_message());
    }

    fn request_lookup(&mut self, raw: &str, update: &mut Update) {
        let Some(epoch) = self.session_epoch() else {
            self.push_error(&EscrowError::invalid_input(CONNECT_FIRST_MESSAGE));
            return;
        };
        let job_id = match raw.trim().parse::<u64>() {
            Ok(job_id) if job_id > 0 => job_id,
            _ => {
                self.push_error(&EscrowError::invalid_input(format!(
                    "Job id must be a positive integer, got {raw:?}"
                )));
                return;
            }
        };
        let token = self.issue_token();
        self.last_lookup = LastLookup::Pending { token, job_id };
        update.push(AsyncAction::Lookup {
            token,
            epoch,
            job_id,
        });
    }

    fn complete_lookup(&mut self, token: u64, epoch: u64, result: JobLookup) {
        let pending = matches!(self.last_lookup, LastLookup::Pending { token: latest, .. } if latest == token);
        if !pending || self.session_epoch() != Some(epoch) {
            debug!(token, epoch, job_id = result.job_id(), "discarding stale lookup");
            return;
        }
        self.last_lookup = LastLookup::Resolved(result);
    }

    fn request_creation(&mut self, form: JobForm, update: &mut Update) {
        let Some(info) = self.connected_info() else {
            self.push_error(&EscrowError::invalid_input(CONNECT_FIRST_MESSAGE));
            return;
        };
        let deadline = match self.formatter.parse_input(&form.deadline) {
            Ok(deadline) => deadline,
            Err(error) => {
                self.push_error(&EscrowError::invalid_input(error.to_string()));
                return;
            }
        };
        let token = self.issue_token();
        self.last_creation = Some(CreationRecord {
            token,
            account: Some(info.account),
            outcome: None,
            confirming: false,
        });
        update.push(AsyncAction::CreateJob {
            token,
            epoch: info.epoch,
            draft: JobDraft {
                dev_address: form.dev_address,
                deadline,
                amount: form.amount,
            },
        });
    }

    fn complete_creation(
        &mut self,
        token: u64,
        account: Option<Address>,
        outcome: CreationOutcome,
        update: &mut Update,
    ) {
        let Some(record) = self.last_creation.as_mut().filter(|record| record.token == token) else {
            debug!(token, "discarding stale creation outcome");
            return;
        };
        if let CreationOutcome::Submitted(tx_hash) = &outcome {
            if self.track_confirmations {
                record.confirming = true;
                update.push(AsyncAction::AwaitConfirmation {
                    token,
                    tx_hash: *tx_hash,
                });
            }
        }
        if account.is_some() && account != record.account {
            warn!(token, ?account, issued = ?record.account, "creation completed under another account");
        }
        record.outcome = Some(outcome);
    }

    fn connected_info(&self) -> Option<SessionInfo> {
        match self.connection {
            ConnectionState::Connected(info) => Some(info),
            _ => None,
        }
    }
}
