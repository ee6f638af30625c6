//! Line commands accepted by the interactive host.

use thiserror::Error;

use crate::controller::{JobForm, Message};

pub const HELP: &str = "\
commands:
  connect                                  request wallet access
  lookup <job-id>                          show an escrow job
  create <dev-address> <deadline> <amount> create a job (deadline as YYYY-MM-DDTHH:MM)
  dismiss                                  clear the last error
  help                                     show this text
  quit                                     exit";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractiveCommand {
    Dispatch(Message),
    Help,
    Quit,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command {0:?}; type `help` for a list")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_command_line(line: &str) -> Result<Option<InteractiveCommand>, CommandError> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let arguments: Vec<&str> = words.collect();
    let parsed = match (command.to_ascii_lowercase().as_str(), arguments.as_slice()) {
        ("connect", []) => InteractiveCommand::Dispatch(Message::ConnectRequested),
        ("connect", _) => return Err(CommandError::Usage("connect")),
        ("lookup", [job_id]) => InteractiveCommand::Dispatch(Message::LookupRequested {
            job_id: (*job_id).to_owned(),
        }),
        ("lookup", _) => return Err(CommandError::Usage("lookup <job-id>")),
        ("create", [dev_address, deadline, amount]) => {
            InteractiveCommand::Dispatch(Message::CreateRequested(JobForm {
                dev_address: (*dev_address).to_owned(),
                deadline: (*deadline).to_owned(),
                amount: (*amount).to_owned(),
            }))
        }
        ("create", _) => {
            return Err(CommandError::Usage(
                "create <dev-address> <deadline> <amount>",
            ))
        }
        ("dismiss", _) => InteractiveCommand::Dispatch(Message::DismissError),
        ("help" | "?", _) => InteractiveCommand::Help,
        ("quit" | "exit", _) => InteractiveCommand::Quit,
        (other, _) => return Err(CommandError::Unknown(other.to_owned())),
    };
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(parse_command_line("   "), Ok(None));
    }

    #[test]
    fn parses_job_commands() {
        assert_eq!(
            parse_command_line("lookup 42"),
            Ok(Some(InteractiveCommand::Dispatch(Message::LookupRequested {
                job_id: "42".into()
            })))
        );
        assert_eq!(
            parse_command_line("create 0xabc 2030-01-01T12:00 0.5"),
            Ok(Some(InteractiveCommand::Dispatch(Message::CreateRequested(
                JobForm {
                    dev_address: "0xabc".into(),
                    deadline: "2030-01-01T12:00".into(),
                    amount: "0.5".into(),
                }
            ))))
        );
        assert_eq!(
            parse_command_line("CONNECT"),
            Ok(Some(InteractiveCommand::Dispatch(Message::ConnectRequested)))
        );
    }

    #[test]
    fn reports_usage_and_unknown_commands() {
        assert_eq!(
            parse_command_line("lookup"),
            Err(CommandError::Usage("lookup <job-id>"))
        );
        assert_eq!(
            parse_command_line("create 0xabc"),
            Err(CommandError::Usage("create <dev-address> <deadline> <amount>"))
        );
        assert_eq!(
            parse_command_line("withdraw 1"),
            Err(CommandError::Unknown("withdraw".into()))
        );
        assert_eq!(parse_command_line("quit"), Ok(Some(InteractiveCommand::Quit)));
    }
}
