//! Core types and data structures for the payment ledger

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::money::Money;

/// How a payment is expected to be settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    /// Paid by bank transfer against a reference number
    Invoice,
    /// Paid in person, recorded manually
    Cash,
}

/// Identifier plus display label of a payer or debt center
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyRef {
    pub id: String,
    pub name: String,
}

impl PartyRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A payment issued for one or more debts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Unique identifier of the payment
    pub id: String,
    /// Human-readable running number
    pub payment_number: u64,
    pub payment_type: PaymentType,
    pub title: String,
    pub message: String,
    /// Who owes the money
    pub payer: PartyRef,
    /// Debt center the covered debts belong to, when there is a single one
    pub debt_center: Option<PartyRef>,
    pub created_at: DateTime<Utc>,
    /// Terminal flag set manually or by the credit cascade; never derived from events
    pub credited: bool,
    /// Reference number payers quote on bank transfers (invoices only)
    pub reference_number: Option<String>,
    /// Debts covered by this payment; several payments may cover the same debt
    pub debt_ids: BTreeSet<String>,
}

impl Payment {
    /// Whether this payment covers at least one of the debts of `other`
    pub fn overlaps(&self, other: &Payment) -> bool {
        !self.debt_ids.is_disjoint(&other.debt_ids)
    }
}

/// Kind of a ledger event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Logged once when the payment is issued, amount = -owed total
    Created,
    /// Money received
    Payment,
    /// Payment voided
    Canceled,
    /// Any other adjustment
    Other,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Created => "created",
            EventType::Payment => "payment",
            EventType::Canceled => "canceled",
            EventType::Other => "other",
        };
        f.write_str(name)
    }
}

/// Immutable entry of the append-only ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub id: Uuid,
    pub payment_id: String,
    pub event_type: EventType,
    /// Signed amount; the payment balance is the sum over its events
    pub amount: Money,
    pub time: DateTime<Utc>,
    /// Opaque audit payload (card processor metadata, source transaction, ...)
    pub data: serde_json::Value,
    /// Bank transaction this event was registered from
    pub transaction_id: Option<String>,
}

/// Status derived from the event log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Mispaid,
    Paid,
    Canceled,
}

/// Balance and derived status of a payment at some instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentBalance {
    pub balance: Money,
    pub status: PaymentStatus,
}

/// Status shown to users: the derived status, overridden by the credit flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveStatus {
    Unpaid,
    Mispaid,
    Paid,
    Canceled,
    Credited,
}

impl EffectiveStatus {
    pub fn combine(status: PaymentStatus, credited: bool) -> Self {
        match (status, credited) {
            (PaymentStatus::Paid, _) => EffectiveStatus::Paid,
            (_, true) => EffectiveStatus::Credited,
            (PaymentStatus::Unpaid, false) => EffectiveStatus::Unpaid,
            (PaymentStatus::Mispaid, false) => EffectiveStatus::Mispaid,
            (PaymentStatus::Canceled, false) => EffectiveStatus::Canceled,
        }
    }
}

/// Direction of money on the bank account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Incoming money (`CRDT`)
    Credit,
    /// Outgoing money (`DBIT`)
    Debit,
}

impl Direction {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "CRDT" => Some(Direction::Credit),
            "DBIT" => Some(Direction::Debit),
            _ => None,
        }
    }
}

/// The other side of a bank transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    pub name: String,
    pub account: Option<String>,
}

/// A transaction reported by the bank, stored once regardless of how many imports contain it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    /// Bank-assigned, globally unique identifier
    pub id: String,
    /// IBAN of our account
    pub account: String,
    /// Unsigned amount; the sign comes from `direction`
    pub amount: Money,
    pub direction: Direction,
    pub booking_date: NaiveDate,
    pub value_date: NaiveDate,
    pub counterparty: Counterparty,
    pub reference: Option<String>,
    pub message: Option<String>,
}

impl BankTransaction {
    /// Amount as seen by the ledger: positive for credits, negative for debits
    pub fn signed_amount(&self) -> Money {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }
}

/// Booked balance at a date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementBalance {
    pub date: NaiveDate,
    pub amount: Money,
}

/// Financial institution servicing the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Servicer {
    pub bic: String,
    pub name: String,
    pub street: String,
}

/// One import of a bank statement document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankStatement {
    /// Identifier of this import
    pub id: String,
    /// Identifier the bank gave the report
    pub document_id: String,
    pub account: String,
    pub servicer: Servicer,
    pub generated_at: DateTime<Utc>,
    pub imported_at: DateTime<Utc>,
    pub opening_balance: StatementBalance,
    pub closing_balance: StatementBalance,
}

/// Link between a statement import and a transaction it contained
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatementTransactionMapping {
    pub statement_id: String,
    pub transaction_id: String,
}

/// Source identity of an event; at most one event may ever be recorded per key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupKey {
    /// A bank transaction, by its bank-assigned id
    BankTransaction(String),
    /// A payment reported by another source, e.g. a card processor
    External { source: String, id: String },
}

impl DedupKey {
    pub fn bank_transaction(id: impl Into<String>) -> Self {
        DedupKey::BankTransaction(id.into())
    }

    pub fn external(source: impl Into<String>, id: impl Into<String>) -> Self {
        DedupKey::External {
            source: source.into(),
            id: id.into(),
        }
    }

    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            DedupKey::BankTransaction(id) => Some(id),
            DedupKey::External { .. } => None,
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupKey::BankTransaction(id) => write!(f, "bank:{id}"),
            DedupKey::External { source, id } => write!(f, "{source}:{id}"),
        }
    }
}

/// The single event recorded for a dedup key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventMapping {
    pub key: DedupKey,
    pub event_id: Uuid,
}

/// Input for issuing a new payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPayment {
    pub payment_type: PaymentType,
    pub title: String,
    pub message: String,
    pub payer: PartyRef,
    pub debt_center: Option<PartyRef>,
    pub debt_ids: BTreeSet<String>,
    /// Amount owed, positive
    pub total: Money,
    /// Manually entered reference; generated for invoices when absent
    pub reference: Option<String>,
    /// Defaults to now
    pub created_at: Option<DateTime<Utc>>,
}

/// An event waiting to be appended to a payment's log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub payment_id: String,
    pub event_type: EventType,
    pub amount: Money,
    /// Defaults to now
    pub time: Option<DateTime<Utc>>,
    pub data: serde_json::Value,
    /// Source identity guarding against recording the same money twice
    pub dedup_key: Option<DedupKey>,
}

/// Result of the atomic "insert event + insert mapping" step
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    Appended(PaymentEvent),
    /// The key was already mapped; nothing was written
    Duplicate { existing_event_id: Uuid },
}

/// Errors that can occur in the ledger system
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Parse error at {path}: {message}")]
    Parse { path: String, message: String },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: String, found: String },
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),
    #[error("Bank transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Statement import not found: {0}")]
    StatementNotFound(String),
    #[error("Reference {reference} matches several payments: {}", .candidates.join(", "))]
    ReconciliationConflict {
        reference: String,
        candidates: Vec<String>,
    },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    pub(crate) fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        LedgerError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Parse { .. } => "parse_error",
            LedgerError::Validation(_) => "validation_error",
            LedgerError::CurrencyMismatch { .. } => "currency_mismatch",
            LedgerError::PaymentNotFound(_)
            | LedgerError::TransactionNotFound(_)
            | LedgerError::StatementNotFound(_) => "not_found",
            LedgerError::ReconciliationConflict { .. } => "reconciliation_conflict",
            LedgerError::Storage(_) => "storage_error",
            LedgerError::Config(_) => "config_error",
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Storage(_))
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_status_precedence() {
        assert_eq!(
            EffectiveStatus::combine(PaymentStatus::Paid, true),
            EffectiveStatus::Paid
        );
        assert_eq!(
            EffectiveStatus::combine(PaymentStatus::Unpaid, true),
            EffectiveStatus::Credited
        );
        assert_eq!(
            EffectiveStatus::combine(PaymentStatus::Mispaid, false),
            EffectiveStatus::Mispaid
        );
    }

    #[test]
    fn test_signed_amount_follows_direction() {
        let mut txn = BankTransaction {
            id: "T1".to_string(),
            account: "FI2112345600000785".to_string(),
            amount: Money::from_cents(1234),
            direction: Direction::Debit,
            booking_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            value_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            counterparty: Counterparty {
                name: "Supplier Oy".to_string(),
                account: None,
            },
            reference: None,
            message: None,
        };
        assert_eq!(txn.signed_amount(), Money::from_cents(-1234));
        txn.direction = Direction::Credit;
        assert_eq!(txn.signed_amount(), Money::from_cents(1234));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(LedgerError::Storage("down".into()).code(), "storage_error");
        assert!(LedgerError::Storage("down".into()).is_transient());
        assert!(!LedgerError::parse("Document", "missing").is_transient());
        assert_eq!(LedgerError::PaymentNotFound("p".into()).code(), "not_found");
    }
}
