//! The registry of known sync jobs.
//!
//! Each entry pairs a stable key (the value accepted by the enqueue API and
//! the timer units) with the script that performs the sync and its default
//! priority. Scripts are resolved relative to a deployment-specific root.
use std::path::Path;

use crate::job::NewJob;

/// A known sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Stable key used by producers, e.g. `"purchase-achievements"`.
    pub key: &'static str,
    /// Human-readable label stored on the job row.
    pub name: &'static str,
    /// Script path relative to the script root.
    pub script: &'static str,
    /// Default priority when enqueued from the catalog.
    pub priority: u16,
}

/// The sync jobs this deployment knows how to run.
pub const SYNC_JOBS: &[CatalogEntry] = &[
    CatalogEntry {
        key: "contact-phase-summary",
        name: "Weekly contact phase rollup",
        script: "scripts/sync_contact_phase_summary.py",
        priority: 5,
    },
    CatalogEntry {
        key: "contact-phase-summary-monthly",
        name: "Monthly contact phase rollup",
        script: "scripts/sync_contact_phase_summary_monthly.py",
        priority: 4,
    },
    CatalogEntry {
        key: "contact-scoring-summary",
        name: "Contact scoring rollup",
        script: "scripts/sync_contact_scoring_summary.py",
        priority: 5,
    },
    CatalogEntry {
        key: "purchase-achievements",
        name: "Purchase achievements sync",
        script: "scripts/sync_purchase_achievements.py",
        priority: 3,
    },
    CatalogEntry {
        key: "contact-sales-badge",
        name: "Contact sales badge update",
        script: "scripts/update_contact_sales_badge.py",
        priority: 2,
    },
    CatalogEntry {
        key: "profit-management",
        name: "Profit allocation sync",
        script: "scripts/sync_profit_management.py",
        priority: 4,
    },
];

/// Looks up a catalog entry by its key.
pub fn find(key: &str) -> Option<&'static CatalogEntry> {
    SYNC_JOBS.iter().find(|entry| entry.key == key)
}

impl CatalogEntry {
    /// Builds the enqueueable job for this entry, resolving the script
    /// against the given root directory.
    pub fn new_job(&self, script_root: &Path) -> NewJob {
        NewJob {
            job_name: self.name.to_owned(),
            script_path: script_root.join(self.script).to_string_lossy().into_owned(),
            priority: self.priority,
            max_retries: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_known_key() {
        let entry = find("purchase-achievements").unwrap();
        assert_eq!(entry.name, "Purchase achievements sync");
        assert_eq!(entry.priority, 3);
    }

    #[test]
    fn find_unknown_key() {
        assert!(find("no-such-job").is_none());
    }

    #[test]
    fn keys_are_unique() {
        for entry in SYNC_JOBS {
            assert_eq!(
                SYNC_JOBS.iter().filter(|e| e.key == entry.key).count(),
                1,
                "duplicate key {}",
                entry.key
            );
        }
    }

    #[test]
    fn new_job_resolves_script_against_root() {
        let entry = find("profit-management").unwrap();
        let job = entry.new_job(Path::new("/var/www/mirai-api"));

        assert_eq!(
            job.script_path,
            "/var/www/mirai-api/scripts/sync_profit_management.py"
        );
        assert_eq!(job.job_name, "Profit allocation sync");
        assert_eq!(job.max_retries, 0);
    }
}
