//! pgspawn Core
//!
//! Core types and parsing for launching a PostGIS server as a Slurm batch job.
//!
//! This crate contains:
//! - Domain types: job request, handle, state, log cursor, connection details
//! - Record parsing: `key=value` scheduler responses
//! - Template rendering: the opaque bootstrap script submitted to the scheduler

pub mod domain;
pub mod record;
pub mod template;
