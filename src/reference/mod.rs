//! Reference number generation and validation
//!
//! Invoices carry an ISO 11649 creditor reference whose payload is itself a
//! Finnish reference number, so a reference survives being typed in either
//! form by the payer.

pub mod number;

pub use number::*;
