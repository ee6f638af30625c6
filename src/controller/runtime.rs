//! Async host for [`ViewController`].
//!
//! Actions run as spawned tasks and report back over an unbounded channel; the loop
//! never holds controller state across a remote call.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, info, warn};

use super::{AsyncAction, ControlFlow, Message, ViewController, ViewSnapshot};
use crate::config::ClientConfig;
use crate::errors::EscrowError;
use crate::jobs::{CreationOutcome, JobCreationService, JobLookup, JobQueryService};
use crate::provider::WalletProvider;
use crate::session::WalletSessionManager;
use crate::time_format::{DeadlineError, DeadlineFormatter};
use crate::units::DisplayUnit;

/// Long-lived collaborators shared with action tasks.
pub struct Services {
    pub sessions: Arc<WalletSessionManager>,
    pub queries: JobQueryService,
    pub creations: JobCreationService,
    pub lookup_timeout: Duration,
}

impl Services {
    pub fn from_config(
        config: &ClientConfig,
        platform: Option<Arc<dyn WalletProvider>>,
    ) -> Result<Self, DeadlineError> {
        let sessions = WalletSessionManager::new(platform, config.chain.contract_address)
            .with_expected_chain(config.chain.chain_id);
        let unit = DisplayUnit::new(
            config.display.unit_symbol.clone(),
            config.display.unit_decimals,
        );
        Ok(Self {
            sessions: Arc::new(sessions),
            queries: JobQueryService::from_config(&config.display)?,
            creations: JobCreationService::new(unit, config.creation.clone()),
            lookup_timeout: config.requests.timeout(),
        })
    }
}

impl AsyncAction {
    async fn run(self, services: &Services) -> Message {
        match self {
            AsyncAction::Connect => Message::ConnectCompleted(services.sessions.connect().await),
            AsyncAction::Lookup {
                token,
                epoch,
                job_id,
            } => {
                let Some(session) = services.sessions.current() else {
                    let error = EscrowError::query_failed("no wallet session");
                    return lookup_failed(token, epoch, job_id, error);
                };
                if session.epoch != epoch {
                    debug!(token, epoch, current = session.epoch, "lookup issued under a replaced session");
                    return lookup_failed(token, epoch, job_id, EscrowError::SessionChanged);
                }
                let lookup = services.queries.lookup(&session, job_id);
                match time::timeout(services.lookup_timeout, lookup).await {
                    Ok(result) => Message::LookupCompleted {
                        token,
                        epoch,
                        result,
                    },
                    Err(_) => {
                        let error = EscrowError::query_failed(format!(
                            "timed out after {}ms",
                            services.lookup_timeout.as_millis()
                        ));
                        lookup_failed(token, epoch, job_id, error)
                    }
                }
            }
            AsyncAction::CreateJob {
                token,
                epoch,
                draft,
            } => {
                let session = services.sessions.current();
                let outcome = match session.as_deref() {
                    Some(session) if session.epoch != epoch => {
                        warn!(
                            token,
                            epoch,
                            current = session.epoch,
                            account = %session.account,
                            "session changed before createJob was sent; not submitting"
                        );
                        return Message::CreateCompleted {
                            token,
                            account: None,
                            outcome: CreationOutcome::Failed(
                                EscrowError::SessionChanged.display_message(),
                            ),
                        };
                    }
                    current => services.creations.create_job(current, &draft).await,
                };
                Message::CreateCompleted {
                    token,
                    account: session.map(|session| session.account),
                    outcome,
                }
            }
            AsyncAction::AwaitConfirmation { token, tx_hash } => {
                let outcome = match services.sessions.current() {
                    Some(session) => {
                        services
                            .creations
                            .await_confirmation(&session, tx_hash)
                            .await
                    }
                    None => None,
                };
                Message::ConfirmationCompleted { token, outcome }
            }
        }
    }

    /// Completion reported when the task running this action died before
    /// producing one, so the controller never waits on it forever.
    fn abandoned(&self, reason: &str) -> Message {
        let error = EscrowError::Internal(reason.to_owned());
        match self {
            AsyncAction::Connect => Message::ConnectCompleted(Err(error)),
            AsyncAction::Lookup {
                token,
                epoch,
                job_id,
            } => lookup_failed(*token, *epoch, *job_id, error),
            AsyncAction::CreateJob { token, .. } => Message::CreateCompleted {
                token: *token,
                account: None,
                outcome: CreationOutcome::Failed(error.display_message()),
            },
            AsyncAction::AwaitConfirmation { token, .. } => Message::ConfirmationCompleted {
                token: *token,
                outcome: None,
            },
        }
    }
}

fn lookup_failed(token: u64, epoch: u64, job_id: u64, error: EscrowError) -> Message {
    Message::LookupCompleted {
        token,
        epoch,
        result: JobLookup::QueryFailed {
            job_id,
            reason: error.display_message(),
        },
    }
}

pub struct ControllerRuntime {
    controller: ViewController,
    services: Arc<Services>,
    completions_tx: mpsc::UnboundedSender<Message>,
    completions_rx: mpsc::UnboundedReceiver<Message>,
    inflight: usize,
}

impl ControllerRuntime {
    pub fn new(controller: ViewController, services: Services) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            controller,
            services: Arc::new(services),
            completions_tx,
            completions_rx,
            inflight: 0,
        }
    }

    pub fn from_config(
        config: &ClientConfig,
        platform: Option<Arc<dyn WalletProvider>>,
    ) -> Result<Self, DeadlineError> {
        let formatter = DeadlineFormatter::new(
            config.display.utc_offset_minutes,
            config.display.deadline_format.clone(),
        )?;
        let controller = ViewController::new(formatter, config.creation.track_confirmations);
        Ok(Self::new(controller, Services::from_config(config, platform)?))
    }

    pub fn controller(&self) -> &ViewController {
        &self.controller
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn view(&self) -> ViewSnapshot {
        self.controller.view()
    }

    pub fn inflight(&self) -> usize {
        self.inflight
    }

    /// Feeds one message to the controller and starts the resulting actions.
    pub fn dispatch(&mut self, message: Message) -> ControlFlow {
        let update = self.controller.update(message);
        for action in update.actions {
            self.spawn(action);
        }
        update.control
    }

    fn spawn(&mut self, action: AsyncAction) {
        debug!(?action, "starting action");
        self.inflight += 1;
        let services = Arc::clone(&self.services);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let fallback = action.clone();
            let message = match tokio::spawn(async move { action.run(&services).await }).await {
                Ok(message) => message,
                Err(error) => {
                    error!(action = ?fallback, %error, "action task failed");
                    fallback.abandoned(&error.to_string())
                }
            };
            let _ = completions.send(message);
        });
    }

    fn complete(&mut self, message: Message) -> ControlFlow {
        self.inflight = self.inflight.saturating_sub(1);
        self.dispatch(message)
    }

    /// Processes completions until no action is in flight.
    pub async fn run_until_idle(&mut self) -> ControlFlow {
        while self.inflight > 0 {
            let Some(message) = self.completions_rx.recv().await else {
                break;
            };
            if self.complete(message) == ControlFlow::Reload {
                return ControlFlow::Reload;
            }
        }
        ControlFlow::Continue
    }

    /// Waits for the next wallet signal and applies it.
    pub async fn pump_signal(&mut self) -> ControlFlow {
        let sessions = Arc::clone(&self.services.sessions);
        let change = sessions.next_change().await;
        self.dispatch(Message::Session(change))
    }

    /// Drives the controller from user input, action completions and wallet
    /// signals, rendering after every update.
    ///
    /// Returns [`ControlFlow::Reload`] when the network changed and
    /// [`ControlFlow::Continue`] once the input is closed.
    pub async fn run<F>(&mut self, input: &mut mpsc::Receiver<Message>, mut render: F) -> ControlFlow
    where
        F: FnMut(&ViewSnapshot),
    {
        render(&self.view());
        let sessions = Arc::clone(&self.services.sessions);
        loop {
            let control = tokio::select! {
                message = input.recv() => match message {
                    Some(message) => self.dispatch(message),
                    None => {
                        info!("input closed; stopping controller");
                        return ControlFlow::Continue;
                    }
                },
                Some(message) = self.completions_rx.recv() => self.complete(message),
                change = sessions.next_change() => self.dispatch(Message::Session(change)),
            };
            render(&self.view());
            if control == ControlFlow::Reload {
                return ControlFlow::Reload;
            }
        }
    }

    pub async fn shutdown(&self) {
        self.services.sessions.shutdown().await;
    }
}
