//! Event drafting: builder and common event patterns

use chrono::{DateTime, NaiveTime, Utc};
use serde_json::{json, Map, Value};

use crate::money::Money;
use crate::types::*;

/// Builder for events appended through the side door (manual entries,
/// card processor callbacks, corrections)
#[derive(Debug, Clone)]
pub struct EventBuilder {
    draft: EventDraft,
}

impl EventBuilder {
    /// Start an event of `event_type` for `payment_id`
    pub fn new(payment_id: impl Into<String>, event_type: EventType, amount: Money) -> Self {
        Self {
            draft: EventDraft {
                payment_id: payment_id.into(),
                event_type,
                amount,
                time: None,
                data: Value::Null,
                dedup_key: None,
            },
        }
    }

    /// Set when the event happened (defaults to the append time)
    pub fn time(mut self, time: DateTime<Utc>) -> Self {
        self.draft.time = Some(time);
        self
    }

    /// Replace the audit payload
    pub fn data(mut self, data: Value) -> Self {
        self.draft.data = data;
        self
    }

    /// Add one field to the audit payload
    pub fn data_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if !self.draft.data.is_object() {
            self.draft.data = Value::Object(Map::new());
        }
        if let Value::Object(ref mut fields) = self.draft.data {
            fields.insert(key.into(), value.into());
        }
        self
    }

    /// Guard the append with a source identity
    pub fn dedup_key(mut self, key: DedupKey) -> Self {
        self.draft.dedup_key = Some(key);
        self
    }

    /// Build the draft
    pub fn build(self) -> LedgerResult<EventDraft> {
        if self.draft.payment_id.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Event must target a payment".to_string(),
            ));
        }

        if self.draft.event_type == EventType::Created {
            return Err(LedgerError::Validation(
                "A created event is only logged when the payment is issued".to_string(),
            ));
        }

        Ok(self.draft)
    }
}

/// Common event patterns
pub mod patterns {
    use super::*;

    /// Payment event registered from a bank transaction.
    ///
    /// Amount is the transaction's signed amount, time is its value date at
    /// midnight UTC, and the transaction id is the dedup key.
    pub fn bank_payment(
        payment_id: impl Into<String>,
        transaction: &BankTransaction,
    ) -> LedgerResult<EventDraft> {
        let time = transaction.value_date.and_time(NaiveTime::MIN).and_utc();

        EventBuilder::new(payment_id, EventType::Payment, transaction.signed_amount())
            .time(time)
            .data(json!({
                "source": "bank",
                "transaction_id": transaction.id,
                "account": transaction.account,
                "counterparty": transaction.counterparty.name,
                "reference": transaction.reference,
                "booking_date": transaction.booking_date,
            }))
            .dedup_key(DedupKey::bank_transaction(&transaction.id))
            .build()
    }

    /// Payment reported by an external source such as a card processor.
    ///
    /// `source_event_id` must be the source's own identifier for the money
    /// movement so redelivered callbacks are recorded once.
    pub fn external_payment(
        payment_id: impl Into<String>,
        source: &str,
        source_event_id: &str,
        amount: Money,
        time: DateTime<Utc>,
        metadata: Value,
    ) -> LedgerResult<EventDraft> {
        EventBuilder::new(payment_id, EventType::Payment, amount)
            .time(time)
            .data(metadata)
            .data_field("source", source)
            .data_field("source_event_id", source_event_id)
            .dedup_key(DedupKey::external(source, source_event_id))
            .build()
    }

    /// Cash received in person
    pub fn cash_payment(
        payment_id: impl Into<String>,
        amount: Money,
        received_at: DateTime<Utc>,
        note: Option<&str>,
    ) -> LedgerResult<EventDraft> {
        let mut builder = EventBuilder::new(payment_id, EventType::Payment, amount)
            .time(received_at)
            .data_field("source", "cash");
        if let Some(note) = note {
            builder = builder.data_field("note", note);
        }
        builder.build()
    }

    /// Zero-amount cancellation
    pub fn cancellation(payment_id: impl Into<String>, reason: &str) -> LedgerResult<EventDraft> {
        EventBuilder::new(payment_id, EventType::Canceled, Money::ZERO)
            .data_field("reason", reason)
            .build()
    }

    /// Manual correction that moves the balance without counting as a payment
    pub fn adjustment(
        payment_id: impl Into<String>,
        amount: Money,
        note: &str,
    ) -> LedgerResult<EventDraft> {
        EventBuilder::new(payment_id, EventType::Other, amount)
            .data_field("note", note)
            .build()
    }
}
