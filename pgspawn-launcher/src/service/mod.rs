//! Service layer
//!
//! The three stages of a launch, each owning one concern:
//! - submitting the batch job and reading back its id
//! - polling the job's state until it runs
//! - tailing the job's output file
//!
//! Services reach the scheduler only through the [`Scheduler`] trait so they
//! can be driven by a scripted scheduler in tests.
//!
//! [`Scheduler`]: crate::scheduler::Scheduler

mod submitter;
mod tailer;
mod tracker;

pub use submitter::JobSubmitter;
pub use tailer::LogTailer;
pub use tracker::JobStateTracker;
