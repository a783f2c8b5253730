//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::money::Money;
use crate::reference;
use crate::types::*;

/// Storage abstraction for the payment ledger
///
/// Any transactional store (PostgreSQL, SQLite, in-memory, ...) can back the
/// ledger by implementing these methods. Two of them carry atomicity
/// requirements:
///
/// - [`insert_payment`](LedgerStorage::insert_payment) writes the payment row
///   and its `created` event together.
/// - [`append_event`](LedgerStorage::append_event) writes the event and its
///   dedup mapping together, and must refuse a second event for an already
///   mapped key. In SQL this is a unique constraint on the mapping key inside
///   the same database transaction as the event insert.
///
/// Events are never updated or deleted, so no such methods exist.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// Insert a new payment together with its `created` event
    async fn insert_payment(&self, payment: &Payment, created: &PaymentEvent) -> LedgerResult<()>;

    /// Get a payment by ID
    async fn get_payment(&self, payment_id: &str) -> LedgerResult<Option<Payment>>;

    /// List payments created within an inclusive date range, ordered by payment number
    async fn list_payments(
        &self,
        created_from: Option<NaiveDate>,
        created_to: Option<NaiveDate>,
    ) -> LedgerResult<Vec<Payment>>;

    /// Payments whose normalized reference equals `normalized_reference`, oldest first
    async fn find_payments_by_reference(
        &self,
        normalized_reference: &str,
    ) -> LedgerResult<Vec<Payment>>;

    /// Payments covering at least one of the given debts
    async fn find_payments_by_debts(&self, debt_ids: &BTreeSet<String>)
        -> LedgerResult<Vec<Payment>>;

    /// Set the credited flag; returns false when it was already set
    async fn set_credited(&self, payment_id: &str) -> LedgerResult<bool>;

    /// Next human-readable payment number
    async fn next_payment_number(&self) -> LedgerResult<u64>;

    /// Next reference sequence number within a year, starting at 1
    async fn next_reference_sequence(&self, year: u16) -> LedgerResult<u32>;

    /// Append an event, atomically claiming `key` when one is given
    async fn append_event(
        &self,
        event: &PaymentEvent,
        key: Option<&DedupKey>,
    ) -> LedgerResult<AppendOutcome>;

    /// All events of a payment ordered by time
    async fn get_events(&self, payment_id: &str) -> LedgerResult<Vec<PaymentEvent>>;

    /// The mapping recorded for a dedup key, if any
    async fn get_event_mapping(&self, key: &DedupKey) -> LedgerResult<Option<EventMapping>>;

    /// Save a statement import
    async fn save_statement(&self, statement: &BankStatement) -> LedgerResult<()>;

    /// Get a statement import by ID
    async fn get_statement(&self, statement_id: &str) -> LedgerResult<Option<BankStatement>>;

    /// Insert a bank transaction unless one with the same ID exists; returns true when inserted
    async fn insert_bank_transaction(&self, transaction: &BankTransaction) -> LedgerResult<bool>;

    /// Get a bank transaction by its bank-assigned ID
    async fn get_bank_transaction(&self, transaction_id: &str)
        -> LedgerResult<Option<BankTransaction>>;

    /// Record that a statement import contained a transaction
    async fn link_statement_transaction(
        &self,
        mapping: &StatementTransactionMapping,
    ) -> LedgerResult<()>;

    /// Transactions contained in a statement import
    async fn list_statement_transactions(
        &self,
        statement_id: &str,
    ) -> LedgerResult<Vec<BankTransaction>>;

    /// Transactions that no event has been registered from, ordered by value date
    async fn list_unregistered_transactions(&self) -> LedgerResult<Vec<BankTransaction>>;
}

/// Trait for implementing custom payment and event validation rules
pub trait PaymentValidator: Send + Sync {
    /// Validate a payment before it is issued
    fn validate_new_payment(&self, payment: &NewPayment) -> LedgerResult<()>;

    /// Validate an event before it is appended to `payment`
    fn validate_event(&self, payment: &Payment, draft: &EventDraft) -> LedgerResult<()>;
}

/// Default validator with the basic ledger rules
pub struct DefaultPaymentValidator;

impl PaymentValidator for DefaultPaymentValidator {
    fn validate_new_payment(&self, payment: &NewPayment) -> LedgerResult<()> {
        if payment.title.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Payment title cannot be empty".to_string(),
            ));
        }

        if !payment.total.is_positive() {
            return Err(LedgerError::Validation(format!(
                "Payment total must be positive, got {}",
                payment.total
            )));
        }

        if !payment.total.is_within_limit() {
            return Err(LedgerError::Validation(format!(
                "Payment total {} exceeds the maximum of {}",
                payment.total,
                Money::MAX
            )));
        }

        if let Some(ref manual) = payment.reference {
            validate_manual_reference(manual)?;
        }

        Ok(())
    }

    fn validate_event(&self, payment: &Payment, draft: &EventDraft) -> LedgerResult<()> {
        if draft.payment_id != payment.id {
            return Err(LedgerError::Validation(format!(
                "Event targets payment '{}' but was validated against '{}'",
                draft.payment_id, payment.id
            )));
        }

        if draft.event_type == EventType::Created {
            return Err(LedgerError::Validation(
                "A created event is only logged when the payment is issued".to_string(),
            ));
        }

        if !draft.amount.is_within_limit() {
            return Err(LedgerError::Validation(format!(
                "Event amount {} exceeds the maximum of {}",
                draft.amount,
                Money::MAX
            )));
        }

        Ok(())
    }
}

/// Check a manually entered reference against its checksums.
///
/// RF references must pass both the RF and the Finnish checksum; plain
/// numeric references must pass the Finnish one.
pub fn validate_manual_reference(input: &str) -> LedgerResult<()> {
    let trimmed = input.trim();
    let looks_rf = trimmed
        .get(..2)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("RF"));

    if looks_rf {
        trimmed.parse::<reference::ReferenceNumber>().map(|_| ())
    } else if reference::validate_finnish(trimmed) {
        Ok(())
    } else {
        Err(LedgerError::Validation(format!(
            "invalid reference number '{input}': Finnish checksum mismatch"
        )))
    }
}
