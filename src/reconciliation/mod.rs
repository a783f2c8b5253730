//! Reconciliation of bank statements against the payment ledger

pub mod job;
pub mod service;

pub use job::*;
pub use service::*;
