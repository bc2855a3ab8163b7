//! The purpose of this module is to alleviate the need to import many of the
//! `syncq` types.
//!
//! ```
//! # #![allow(unused_imports)]
//! use syncq::prelude::*;
//! ```
pub use crate::catalog::CatalogEntry;
pub use crate::job::builder::JobBuilder;
pub use crate::job::{Job, JobId, JobStatus, NewJob, RetryDecision};
pub use crate::schedule::ScheduleConfig;
pub use crate::store::{JobStore, StoreError};
pub use crate::worker::WorkerConfig;
pub use crate::Syncq;
