//! Material stock ledger and FIFO allocation engine.
//!
//! Tracks received lots as stock batches, records every quantity change as an
//! immutable stock transaction, and allocates stock to store requisitions
//! oldest batch first. Procurement documents (vendor POs, invoices, GRNs) are
//! the intake path that creates batches.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod services;

pub use errors::{ErrorCategory, ServiceError};
