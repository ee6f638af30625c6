use std::fmt;

use alloy_primitives::Address;

use super::{ConnectionState, CreationRecord, LastLookup, ViewController};
use crate::jobs::JobLookup;

pub const TITLE: &str = "Solidity Gigs";
pub const TAGLINE: &str = "All-in-1 Solidity freelance escrow platform";

pub const CONNECT_ACTION: &str = "connect";
pub const LOOKUP_ACTION: &str = "lookup <job-id>";
pub const CREATE_ACTION: &str = "create <dev-address> <deadline> <amount>";

/// Plain-text rendering of the controller state. Equal states render identically.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub status: String,
    pub error: Option<String>,
    pub lookup: Vec<String>,
    pub creation: Option<String>,
    pub actions: Vec<&'static str>,
}

impl ViewSnapshot {
    pub(super) fn from_controller(controller: &ViewController) -> Self {
        let (status, actions) = match controller.connection() {
            ConnectionState::Disconnected => ("Not connected".to_owned(), vec![CONNECT_ACTION]),
            ConnectionState::Connecting => ("Connecting...".to_owned(), Vec::new()),
            ConnectionState::Connected(info) => (
                format!("Connected: {info}"),
                vec![LOOKUP_ACTION, CREATE_ACTION],
            ),
        };
        let connected = matches!(controller.connection(), ConnectionState::Connected(_));
        let current_account = match controller.connection() {
            ConnectionState::Connected(info) => Some(info.account),
            _ => None,
        };

        let lookup = if connected {
            render_lookup(controller.last_lookup())
        } else {
            Vec::new()
        };
        let creation = controller
            .last_creation()
            .filter(|_| connected)
            .map(|record| render_creation(record, current_account));

        Self {
            status,
            error: controller.last_error().map(str::to_owned),
            lookup,
            creation,
            actions,
        }
    }

    /// Whether the lookup and creation forms are offered.
    pub fn shows_job_forms(&self) -> bool {
        self.actions.contains(&LOOKUP_ACTION)
    }
}

fn render_lookup(lookup: &LastLookup) -> Vec<String> {
    match lookup {
        LastLookup::None => Vec::new(),
        LastLookup::Pending { job_id, .. } => vec![format!("Looking up job #{job_id}...")],
        LastLookup::Resolved(JobLookup::Found(details)) => vec![
            format!("Job #{}", details.job_id),
            format!("Owner: {}", details.job.owner),
            format!("Developer: {}", details.job.dev),
            format!("Amount: {}", details.amount_display),
            format!("Deadline: {}", details.deadline_display),
        ],
        LastLookup::Resolved(JobLookup::NotFound { job_id, reason }) => {
            vec![format!("Job #{job_id}: {reason}")]
        }
        LastLookup::Resolved(JobLookup::QueryFailed { job_id, reason }) => {
            vec![format!("Job #{job_id}: {reason}")]
        }
    }
}

fn render_creation(record: &CreationRecord, current_account: Option<Address>) -> String {
    let mut line = match &record.outcome {
        None => "Waiting for the wallet to submit the transaction...".to_owned(),
        Some(outcome) => outcome.to_string(),
    };
    if record.confirming {
        line.push_str(" (awaiting confirmation)");
    }
    if let Some(account) = record.account.filter(|account| Some(*account) != current_account) {
        line.push_str(&format!(" [submitted by {account}]"));
    }
    line
}

impl fmt::Display for ViewSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{TITLE}")?;
        writeln!(f, "{TAGLINE}")?;
        writeln!(f, "{}", self.status)?;
        if let Some(error) = &self.error {
            writeln!(f, "Error: {error}")?;
        }
        for line in &self.lookup {
            writeln!(f, "  {line}")?;
        }
        if let Some(creation) = &self.creation {
            writeln!(f, "  {creation}")?;
        }
        write!(f, "Actions: {}", self.actions.join(" | "))
    }
}
