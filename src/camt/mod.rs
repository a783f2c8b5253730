//! ISO 20022 camt.053 bank statement import
//!
//! Only the `BkToCstmrAcctRpt` report subset the reconciliation needs is
//! understood. Parsing is all-or-nothing.

pub mod parser;
mod raw;

pub use parser::*;
