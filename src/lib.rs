//! # Payment Ledger
//!
//! An append-only payment ledger with bank statement reconciliation.
//!
//! ## Features
//!
//! - **Event-sourced payments**: balances and statuses are derived from an
//!   append-only event log, including point-in-time (`as of`) projections
//! - **Reference numbers**: Finnish reference numbers wrapped in ISO 11649
//!   RF creditor references, with generation and checksum validation
//! - **camt.053 import**: strict parsing of ISO 20022 bank statements into
//!   integer-cent transactions
//! - **Idempotent reconciliation**: each bank transaction (or external
//!   payment source event) is recorded at most once, even across overlapping
//!   imports and concurrent runs
//! - **Reporting**: ledger reports grouped by payer or debt center
//! - **Storage abstraction**: database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use payment_ledger::{BankReconciliationService, MemoryStorage, PaymentLedger};
//!
//! let ledger = PaymentLedger::new(MemoryStorage::new());
//! let service = BankReconciliationService::new(ledger);
//! // service.ingest(&camt053_bytes).await?;
//! # let _ = service;
//! ```

pub mod camt;
pub mod config;
pub mod ledger;
pub mod money;
pub mod reconciliation;
pub mod reference;
pub mod reports;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use camt::{parse_statement, Statement};
pub use config::*;
pub use ledger::*;
pub use money::Money;
pub use reconciliation::*;
pub use reference::ReferenceNumber;
pub use reports::*;
pub use traits::*;
pub use types::*;
pub use utils::*;
