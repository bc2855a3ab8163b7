//! The API for configuring timed job production.
//!
//! Deployments trigger their recurring syncs from timers rather than from
//! user actions. A [`ScheduleConfig`] pairs each recurring job with a
//! [`cron::Schedule`]; the runner enqueues the job at every upcoming instant
//! of its schedule.
//!
//! # Example
//!
//! ```
//! # use std::path::Path;
//! # use std::str::FromStr;
//! use syncq::catalog;
//! use syncq::schedule::ScheduleConfig;
//!
//! let entry = catalog::find("purchase-achievements").unwrap();
//! let config = ScheduleConfig::new()
//!     .with_job(
//!         cron::Schedule::from_str("0 0 3 * * Mon *").unwrap(),
//!         entry.new_job(Path::new("/var/www/mirai-api")),
//!     );
//! ```
use crate::job::NewJob;

pub(crate) mod runner;

/// A set of recurring jobs, each produced on its own cron schedule.
#[derive(Default)]
pub struct ScheduleConfig {
    pub(crate) entries: Vec<ScheduleEntry>,
}

pub(crate) struct ScheduleEntry {
    pub(crate) schedule: cron::Schedule,
    pub(crate) job: NewJob,
}

impl ScheduleConfig {
    /// Constructs an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a recurring job to the config.
    pub fn with_job(mut self, schedule: cron::Schedule, job: NewJob) -> Self {
        self.entries.push(ScheduleEntry { schedule, job });
        self
    }
}

#[cfg(test)]
mod test {
    use std::{path::Path, str::FromStr};

    use super::*;
    use crate::catalog;

    #[test]
    fn config() {
        let root = Path::new("/opt/sync");
        let config = ScheduleConfig::new()
            .with_job(
                cron::Schedule::from_str("0 0 3 * * Mon *").unwrap(),
                catalog::find("contact-phase-summary")
                    .unwrap()
                    .new_job(root),
            )
            .with_job(
                cron::Schedule::from_str("0 30 4 1 * * *").unwrap(),
                catalog::find("profit-management").unwrap().new_job(root),
            );

        assert_eq!(config.entries.len(), 2);
    }
}
