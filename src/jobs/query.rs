use tracing::{debug, warn};

use super::{Job, JobDetails, JobLookup};
use crate::config::DisplayConfig;
use crate::errors::EscrowError;
use crate::session::ActiveSession;
use crate::time_format::{DeadlineError, DeadlineFormatter};
use crate::units::DisplayUnit;

/// Resolves job ids to on-chain records and renders them for display.
#[derive(Clone, Debug, Default)]
pub struct JobQueryService {
    unit: DisplayUnit,
    formatter: DeadlineFormatter,
}

impl JobQueryService {
    pub fn new(unit: DisplayUnit, formatter: DeadlineFormatter) -> Self {
        Self { unit, formatter }
    }

    pub fn from_config(display: &DisplayConfig) -> Result<Self, DeadlineError> {
        let formatter =
            DeadlineFormatter::new(display.utc_offset_minutes, display.deadline_format.clone())?;
        let unit = DisplayUnit::new(display.unit_symbol.clone(), display.unit_decimals);
        Ok(Self::new(unit, formatter))
    }

    pub fn unit(&self) -> &DisplayUnit {
        &self.unit
    }

    pub fn formatter(&self) -> &DeadlineFormatter {
        &self.formatter
    }

    /// Issues `jobs(job_id)` through the session binding.
    ///
    /// Remote failures are reported as [`JobLookup::QueryFailed`], never as a
    /// missing job.
    pub async fn lookup(&self, session: &ActiveSession, job_id: u64) -> JobLookup {
        match session.binding.jobs(job_id).await {
            Ok(job) => {
                let lookup = self.classify(job_id, job);
                debug!(job_id, found = matches!(lookup, JobLookup::Found(_)), "job lookup resolved");
                lookup
            }
            Err(error) => {
                warn!(job_id, %error, "job lookup failed");
                JobLookup::QueryFailed {
                    job_id,
                    reason: EscrowError::query_failed(error.to_string()).display_message(),
                }
            }
        }
    }

    pub fn classify(&self, job_id: u64, job: Job) -> JobLookup {
        if !job.exists() {
            return JobLookup::NotFound {
                job_id,
                reason: EscrowError::JobNotFound { job_id }.display_message(),
            };
        }
        JobLookup::Found(JobDetails {
            job_id,
            amount_display: self.unit.display(job.amount),
            deadline_display: self.formatter.format_lossy(job.deadline_epoch_seconds),
            job,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use proptest::prelude::*;

    #[test]
    fn zero_owner_is_not_found() {
        let service = JobQueryService::default();
        assert_eq!(
            service.classify(42, Job::default()),
            JobLookup::NotFound {
                job_id: 42,
                reason: "Job doesn't exist".into()
            }
        );
    }

    #[test]
    fn found_jobs_carry_display_strings() {
        let service = JobQueryService::default();
        let job = Job {
            owner: Address::repeat_byte(1),
            dev: Address::repeat_byte(2),
            amount: U256::from(1_000_000_000_000_000_000u128),
            deadline_epoch_seconds: 1_700_000_000,
        };
        match service.classify(7, job.clone()) {
            JobLookup::Found(details) => {
                assert_eq!(details.job, job);
                assert_eq!(details.amount_display, "1 BNB");
                assert_eq!(details.deadline_display, "22:13 14 Nov 2023");
            }
            other => panic!("expected a found job, got {other:?}"),
        }
    }

    fn address() -> impl Strategy<Value = Address> {
        any::<[u8; 20]>().prop_map(Address::from)
    }

    proptest! {
        #[test]
        fn existence_depends_only_on_owner(
            owner in address(),
            dev in address(),
            limbs in any::<[u64; 4]>(),
            deadline in any::<u64>(),
            job_id in 1u64..,
        ) {
            let service = JobQueryService::default();
            let job = Job {
                owner,
                dev,
                amount: U256::from_limbs(limbs),
                deadline_epoch_seconds: deadline,
            };
            let lookup = service.classify(job_id, job.clone());
            prop_assert_eq!(lookup.job_id(), job_id);
            prop_assert_eq!(matches!(lookup, JobLookup::Found(_)), owner != Address::ZERO);

            let missing = Job { owner: Address::ZERO, ..job };
            let is_not_found = matches!(
                service.classify(job_id, missing),
                JobLookup::NotFound { .. }
            );
            prop_assert!(is_not_found);
        }
    }
}
