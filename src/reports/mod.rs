//! Ledger reports composed from payment status projections

pub mod ledger_report;

pub use ledger_report::*;
