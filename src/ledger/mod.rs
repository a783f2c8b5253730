//! Ledger module containing payment issuance, event appends and status derivation

pub mod core;
pub mod event;
pub mod payment;
pub mod status;

pub use core::*;
pub use event::*;
pub use payment::*;
pub use status::*;
