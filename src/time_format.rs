//! Deadline rendering and parsing.
//!
//! Both directions run against one fixed UTC offset taken from configuration, so the
//! same epoch value always renders to the same string regardless of the host timezone.

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use thiserror::Error;

/// `HH:mm dd MMM yyyy`, e.g. `22:13 14 Nov 2023`.
pub const DEFAULT_DEADLINE_FORMAT: &str = "%H:%M %d %b %Y";

const INPUT_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeadlineError {
    #[error("utc offset of {0} minutes is out of range")]
    InvalidOffset(i32),
    #[error("invalid deadline format pattern {0:?}")]
    InvalidPattern(String),
    #[error("deadline {0} is outside the representable range")]
    OutOfRange(u64),
    #[error("unable to parse deadline {input:?}; expected YYYY-MM-DDTHH:MM or RFC 3339")]
    Unparseable { input: String },
    #[error("deadline {input:?} does not map to a single instant")]
    Ambiguous { input: String },
}

/// Pure formatter for epoch-second deadlines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeadlineFormatter {
    offset: FixedOffset,
    pattern: String,
}

impl DeadlineFormatter {
    pub fn new(utc_offset_minutes: i32, pattern: impl Into<String>) -> Result<Self, DeadlineError> {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60)
            .ok_or(DeadlineError::InvalidOffset(utc_offset_minutes))?;
        let pattern = pattern.into();
        if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
            return Err(DeadlineError::InvalidPattern(pattern));
        }
        Ok(Self { offset, pattern })
    }

    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
            pattern: DEFAULT_DEADLINE_FORMAT.to_owned(),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn format(&self, epoch_seconds: u64) -> Result<String, DeadlineError> {
        let seconds =
            i64::try_from(epoch_seconds).map_err(|_| DeadlineError::OutOfRange(epoch_seconds))?;
        let instant = DateTime::from_timestamp(seconds, 0)
            .ok_or(DeadlineError::OutOfRange(epoch_seconds))?
            .with_timezone(&self.offset);
        // chrono reports unrenderable items through fmt::Error; `to_string` would panic.
        let mut rendered = String::new();
        write!(rendered, "{}", instant.format(&self.pattern))
            .map_err(|_| DeadlineError::InvalidPattern(self.pattern.clone()))?;
        Ok(rendered)
    }

    /// Formats the deadline, falling back to the raw epoch value when it cannot be
    /// represented as a calendar date.
    pub fn format_lossy(&self, epoch_seconds: u64) -> String {
        self.format(epoch_seconds)
            .unwrap_or_else(|_| format!("{epoch_seconds} (epoch seconds)"))
    }

    /// Parses form input into an instant.
    ///
    /// Accepts RFC 3339 with an explicit offset, or a local `datetime` value which is
    /// interpreted in the formatter's offset.
    pub fn parse_input(&self, input: &str) -> Result<DateTime<FixedOffset>, DeadlineError> {
        let trimmed = input.trim();
        if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(instant);
        }
        let naive = INPUT_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
            .ok_or_else(|| DeadlineError::Unparseable {
                input: trimmed.to_owned(),
            })?;
        self.offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| DeadlineError::Ambiguous {
                input: trimmed.to_owned(),
            })
    }
}

impl Default for DeadlineFormatter {
    fn default() -> Self {
        Self::utc()
    }
}
