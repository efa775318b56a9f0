//! Ledger extraction, Brazilian locale normalization and chunked upload
//! to a REST backend.

pub mod backend;
pub mod config;
pub mod ledger;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod upload;
pub mod validate;
pub mod warehouse;

pub use config::Config;
pub use ledger::Record;
pub use pipeline::{Pipeline, RunSummary};
