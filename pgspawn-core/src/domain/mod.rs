//! Core domain types
//!
//! These types describe one launch: what is requested from the scheduler,
//! what the scheduler reports back, and where the launcher is in the job's
//! output stream.

pub mod connection;
pub mod job;
pub mod log;
