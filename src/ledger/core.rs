//! Main ledger orchestrator that coordinates payments and their event logs

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::ledger::event::patterns;
use crate::ledger::status::{derive_balance, derive_balance_as_of};
use crate::ledger::PaymentManager;
use crate::reference::normalize_reference;
use crate::traits::*;
use crate::types::*;

/// Payment ledger: issues payments, appends events and derives status
///
/// Appending an event is the only mutation of a payment's money state. The
/// balance and status are always recomputed from the event log on read.
pub struct PaymentLedger<S: LedgerStorage> {
    payments: PaymentManager<S>,
    config: LedgerConfig,
}

impl<S: LedgerStorage> PaymentLedger<S> {
    /// Create a new ledger with the given storage backend and default configuration
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, LedgerConfig::default())
    }

    /// Create a new ledger with the given configuration
    pub fn with_config(storage: S, config: LedgerConfig) -> Self {
        Self {
            payments: PaymentManager::new(storage, &config),
            config,
        }
    }

    /// Create a new ledger with a custom validator
    pub fn with_validator(
        storage: S,
        config: LedgerConfig,
        validator: Box<dyn PaymentValidator>,
    ) -> Self {
        Self {
            payments: PaymentManager::with_validator(storage, &config, validator),
            config,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub(crate) fn storage(&self) -> &S {
        &self.payments.storage
    }

    // Payment operations
    /// Issue a new payment
    pub async fn create_payment(&self, new: NewPayment) -> LedgerResult<Payment> {
        self.payments.create_payment(new).await
    }

    /// Get a payment by ID
    pub async fn get_payment(&self, payment_id: &str) -> LedgerResult<Option<Payment>> {
        self.payments.get_payment(payment_id).await
    }

    /// Get a payment by ID, returning an error if not found
    pub async fn get_payment_required(&self, payment_id: &str) -> LedgerResult<Payment> {
        self.payments.get_payment_required(payment_id).await
    }

    /// List payments created within an inclusive date range
    pub async fn list_payments(
        &self,
        created_from: Option<NaiveDate>,
        created_to: Option<NaiveDate>,
    ) -> LedgerResult<Vec<Payment>> {
        self.storage().list_payments(created_from, created_to).await
    }

    /// Payments whose reference matches `reference` after normalization, oldest first
    pub async fn find_payments_by_reference(&self, reference: &str) -> LedgerResult<Vec<Payment>> {
        self.storage()
            .find_payments_by_reference(&normalize_reference(reference))
            .await
    }

    /// Set the terminal credited flag
    pub async fn credit_payment(&self, payment_id: &str) -> LedgerResult<Payment> {
        self.payments.credit_payment(payment_id).await?;
        self.get_payment_required(payment_id).await
    }

    // Event operations
    /// Append an event, failing with a validation error when its dedup key
    /// has already been recorded
    pub async fn record_event(&self, draft: EventDraft) -> LedgerResult<PaymentEvent> {
        let key = draft.dedup_key.clone();
        match self.append_event_once(draft).await? {
            AppendOutcome::Appended(event) => Ok(event),
            AppendOutcome::Duplicate { existing_event_id } => {
                let key = key.map(|k| k.to_string()).unwrap_or_default();
                Err(LedgerError::Validation(format!(
                    "Source {key} is already recorded as event {existing_event_id}"
                )))
            }
        }
    }

    /// Append an event unless its dedup key has already been recorded.
    ///
    /// The event insert and the key claim happen in one storage call, so two
    /// concurrent appends with the same key leave exactly one event.
    pub async fn append_event_once(&self, draft: EventDraft) -> LedgerResult<AppendOutcome> {
        let payment = self.get_payment_required(&draft.payment_id).await?;
        self.payments.validate_event(&payment, &draft)?;

        let event = PaymentEvent {
            id: Uuid::new_v4(),
            payment_id: payment.id.clone(),
            event_type: draft.event_type,
            amount: draft.amount,
            time: draft.time.unwrap_or_else(Utc::now),
            data: draft.data,
            transaction_id: draft
                .dedup_key
                .as_ref()
                .and_then(|k| k.transaction_id())
                .map(str::to_string),
        };

        let outcome = self
            .storage()
            .append_event(&event, draft.dedup_key.as_ref())
            .await?;

        match outcome {
            AppendOutcome::Appended(ref event) => {
                tracing::info!(
                    payment_id = %event.payment_id,
                    event_id = %event.id,
                    event_type = %event.event_type,
                    amount = %event.amount,
                    "event appended"
                );
            }
            AppendOutcome::Duplicate { existing_event_id } => {
                tracing::debug!(
                    payment_id = %payment.id,
                    existing_event_id = %existing_event_id,
                    "duplicate source skipped"
                );
            }
        }

        // Also runs for a replayed source, so a failed cascade completes on redelivery
        let settles = matches!(draft.event_type, EventType::Payment | EventType::Other);
        if settles && self.config.reconciliation.auto_credit_overlapping {
            if let Err(error) = self.cascade_credit(&payment).await {
                tracing::error!(
                    payment_id = %payment.id,
                    error = %error,
                    "credit cascade failed"
                );
            }
        }

        Ok(outcome)
    }

    /// Cancel a payment with a zero-amount `canceled` event
    pub async fn cancel_payment(
        &self,
        payment_id: &str,
        reason: &str,
    ) -> LedgerResult<PaymentEvent> {
        let draft = patterns::cancellation(payment_id, reason)?;
        self.record_event(draft).await
    }

    /// All events of a payment ordered by time
    pub async fn get_events(&self, payment_id: &str) -> LedgerResult<Vec<PaymentEvent>> {
        self.get_payment_required(payment_id).await?;
        self.storage().get_events(payment_id).await
    }

    // Status operations
    /// Balance and status over all events, or over events before `as_of`
    pub async fn get_status(
        &self,
        payment_id: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> LedgerResult<PaymentBalance> {
        match as_of {
            Some(cutoff) => self.status_as_of(payment_id, cutoff).await,
            None => Ok(derive_balance(&self.get_events(payment_id).await?)),
        }
    }

    /// Balance and status using only events with `time < cutoff`
    pub async fn status_as_of(
        &self,
        payment_id: &str,
        cutoff: DateTime<Utc>,
    ) -> LedgerResult<PaymentBalance> {
        let events = self.get_events(payment_id).await?;
        Ok(derive_balance_as_of(&events, cutoff))
    }

    /// Status for display: the derived status combined with the credited flag
    pub async fn effective_status(&self, payment_id: &str) -> LedgerResult<EffectiveStatus> {
        let payment = self.get_payment_required(payment_id).await?;
        let state = derive_balance(&self.storage().get_events(payment_id).await?);
        Ok(EffectiveStatus::combine(state.status, payment.credited))
    }

    async fn cascade_credit(&self, payment: &Payment) -> LedgerResult<()> {
        let events = self.storage().get_events(&payment.id).await?;
        if derive_balance(&events).status != PaymentStatus::Paid {
            return Ok(());
        }

        let credited = self.payments.credit_overlapping(payment).await?;
        if !credited.is_empty() {
            tracing::info!(
                payment_id = %payment.id,
                credited = credited.len(),
                "credit cascade applied"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::EventBuilder;
    use crate::money::Money;
    use crate::reference::ReferenceNumber;
    use crate::utils::memory_storage::MemoryStorage;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use std::collections::BTreeSet;

    fn invoice(debts: &[&str], cents: i64) -> NewPayment {
        NewPayment {
            payment_type: PaymentType::Invoice,
            title: "Sitsit ticket".to_string(),
            message: String::new(),
            payer: PartyRef::new("payer-1", "Maija"),
            debt_center: Some(PartyRef::new("center-1", "Events")),
            debt_ids: debts.iter().map(|d| d.to_string()).collect::<BTreeSet<_>>(),
            total: Money::from_cents(cents),
            reference: None,
            created_at: Some(Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap()),
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, d, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_ledger_payment_lifecycle() {
        let ledger = PaymentLedger::new(MemoryStorage::new());
        let payment = ledger.create_payment(invoice(&["d1"], 2500)).await.unwrap();

        let state = ledger.get_status(&payment.id, None).await.unwrap();
        assert_eq!(state.status, PaymentStatus::Unpaid);
        assert_eq!(state.balance, Money::from_cents(-2500));

        let partial = EventBuilder::new(&payment.id, EventType::Payment, Money::from_cents(1000))
            .time(day(3))
            .build()
            .unwrap();
        ledger.record_event(partial).await.unwrap();
        let state = ledger.get_status(&payment.id, None).await.unwrap();
        assert_eq!(state.status, PaymentStatus::Mispaid);

        let rest = EventBuilder::new(&payment.id, EventType::Payment, Money::from_cents(1500))
            .time(day(5))
            .build()
            .unwrap();
        ledger.record_event(rest).await.unwrap();
        let state = ledger.get_status(&payment.id, None).await.unwrap();
        assert_eq!(state.status, PaymentStatus::Paid);
        assert!(state.balance.is_zero());

        // Before the second payment the payment was still mispaid
        let earlier = ledger.status_as_of(&payment.id, day(5)).await.unwrap();
        assert_eq!(earlier.status, PaymentStatus::Mispaid);
        assert_eq!(earlier.balance, Money::from_cents(-1500));
    }

    #[tokio::test]
    async fn test_record_event_rejects_duplicate_source() {
        let ledger = PaymentLedger::new(MemoryStorage::new());
        let payment = ledger.create_payment(invoice(&["d1"], 2500)).await.unwrap();

        let draft = patterns::external_payment(
            &payment.id,
            "stripe",
            "pi_1",
            Money::from_cents(2500),
            day(2),
            json!({}),
        )
        .unwrap();

        let first = ledger.record_event(draft.clone()).await.unwrap();
        assert!(first.transaction_id.is_none());

        let second = ledger.record_event(draft.clone()).await;
        assert!(matches!(second, Err(LedgerError::Validation(_))));

        let outcome = ledger.append_event_once(draft).await.unwrap();
        assert_eq!(
            outcome,
            AppendOutcome::Duplicate {
                existing_event_id: first.id
            }
        );
        assert_eq!(ledger.get_events(&payment.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_payment_is_not_found() {
        let ledger = PaymentLedger::new(MemoryStorage::new());
        let draft = EventBuilder::new("missing", EventType::Payment, Money::from_cents(1))
            .build()
            .unwrap();
        assert!(matches!(
            ledger.record_event(draft).await,
            Err(LedgerError::PaymentNotFound(_))
        ));
        assert!(matches!(
            ledger.get_status("missing", None).await,
            Err(LedgerError::PaymentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_overrides_payments() {
        let ledger = PaymentLedger::new(MemoryStorage::new());
        let payment = ledger.create_payment(invoice(&["d1"], 2500)).await.unwrap();

        ledger.cancel_payment(&payment.id, "issued twice").await.unwrap();
        let state = ledger.get_status(&payment.id, None).await.unwrap();
        assert_eq!(state.status, PaymentStatus::Canceled);
        assert_eq!(
            ledger.effective_status(&payment.id).await.unwrap(),
            EffectiveStatus::Canceled
        );
    }

    #[tokio::test]
    async fn test_paid_payment_credits_overlapping_siblings() {
        let ledger = PaymentLedger::new(MemoryStorage::new());
        let combined = ledger
            .create_payment(invoice(&["d1", "d2"], 5000))
            .await
            .unwrap();
        let single = ledger.create_payment(invoice(&["d1"], 2500)).await.unwrap();
        let unrelated = ledger.create_payment(invoice(&["d3"], 2500)).await.unwrap();

        let draft = EventBuilder::new(&combined.id, EventType::Payment, Money::from_cents(5000))
            .time(day(4))
            .build()
            .unwrap();
        ledger.record_event(draft).await.unwrap();

        assert_eq!(
            ledger.effective_status(&combined.id).await.unwrap(),
            EffectiveStatus::Paid
        );
        assert_eq!(
            ledger.effective_status(&single.id).await.unwrap(),
            EffectiveStatus::Credited
        );
        assert_eq!(
            ledger.effective_status(&unrelated.id).await.unwrap(),
            EffectiveStatus::Unpaid
        );

        // The credit flag never changes the derived status
        let state = ledger.get_status(&single.id, None).await.unwrap();
        assert_eq!(state.status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn test_cascade_can_be_disabled() {
        let mut config = LedgerConfig::default();
        config.reconciliation.auto_credit_overlapping = false;
        let ledger = PaymentLedger::with_config(MemoryStorage::new(), config);

        let first = ledger.create_payment(invoice(&["d1"], 2500)).await.unwrap();
        let second = ledger.create_payment(invoice(&["d1"], 2500)).await.unwrap();

        let draft = EventBuilder::new(&first.id, EventType::Payment, Money::from_cents(2500))
            .build()
            .unwrap();
        ledger.record_event(draft).await.unwrap();

        let sibling = ledger.get_payment_required(&second.id).await.unwrap();
        assert!(!sibling.credited);
    }

    #[tokio::test]
    async fn test_status_as_of_is_stable_under_later_events() {
        let ledger = PaymentLedger::new(MemoryStorage::new());
        let payment = ledger.create_payment(invoice(&["d1"], 2500)).await.unwrap();
        let cutoff = day(10);

        let before = ledger.status_as_of(&payment.id, cutoff).await.unwrap();

        for offset in 0..3 {
            let draft = EventBuilder::new(&payment.id, EventType::Payment, Money::from_cents(900))
                .time(cutoff + Duration::hours(offset))
                .build()
                .unwrap();
            ledger.record_event(draft).await.unwrap();
        }

        let after = ledger.status_as_of(&payment.id, cutoff).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_manual_credit_shows_in_effective_status() {
        let ledger = PaymentLedger::new(MemoryStorage::new());
        let payment = ledger.create_payment(invoice(&["d1"], 2500)).await.unwrap();

        let credited = ledger.credit_payment(&payment.id).await.unwrap();
        assert!(credited.credited);
        assert_eq!(
            ledger.effective_status(&payment.id).await.unwrap(),
            EffectiveStatus::Credited
        );
    }

    #[tokio::test]
    async fn test_amounts_beyond_limit_are_rejected() {
        let ledger = PaymentLedger::new(MemoryStorage::new());
        let payment = ledger.create_payment(invoice(&["d1"], 2500)).await.unwrap();

        let draft = EventBuilder::new(&payment.id, EventType::Payment, Money::from_cents(i64::MAX))
            .build()
            .unwrap();
        assert!(matches!(
            ledger.record_event(draft).await,
            Err(LedgerError::Validation(_))
        ));

        let mut oversized = invoice(&["d2"], 0);
        oversized.total = Money::MAX + Money::from_cents(1);
        assert!(matches!(
            ledger.create_payment(oversized).await,
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(ledger.get_events(&payment.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_cascade_keeps_event_and_completes_on_replay() {
        let storage = MemoryStorage::new();
        let ledger = PaymentLedger::new(storage.clone());
        let combined = ledger
            .create_payment(invoice(&["d1", "d2"], 5000))
            .await
            .unwrap();
        let sibling = ledger.create_payment(invoice(&["d1"], 2500)).await.unwrap();

        let draft = patterns::external_payment(
            &combined.id,
            "stripe",
            "pi_1",
            Money::from_cents(5000),
            day(3),
            json!({}),
        )
        .unwrap();

        storage.fail_next_debt_lookup();
        let event = ledger.record_event(draft.clone()).await.unwrap();
        assert_eq!(event.payment_id, combined.id);
        assert_eq!(ledger.get_events(&combined.id).await.unwrap().len(), 2);
        assert!(!ledger.get_payment_required(&sibling.id).await.unwrap().credited);

        // Webhook redelivery is a duplicate but finishes the cascade
        let outcome = ledger.append_event_once(draft).await.unwrap();
        assert_eq!(
            outcome,
            AppendOutcome::Duplicate {
                existing_event_id: event.id
            }
        );
        assert_eq!(ledger.get_events(&combined.id).await.unwrap().len(), 2);
        assert_eq!(
            ledger.effective_status(&sibling.id).await.unwrap(),
            EffectiveStatus::Credited
        );
    }

    #[tokio::test]
    async fn test_find_payments_by_reference_accepts_any_written_form() {
        let ledger = PaymentLedger::new(MemoryStorage::new());
        let payment = ledger.create_payment(invoice(&["d1"], 2500)).await.unwrap();
        ledger.create_payment(invoice(&["d2"], 2500)).await.unwrap();

        let rendered = payment.reference_number.clone().unwrap();
        let finnish = rendered.parse::<ReferenceNumber>().unwrap().finnish();

        for form in [rendered.clone(), finnish.clone(), format!("000{finnish}")] {
            let found = ledger.find_payments_by_reference(&form).await.unwrap();
            let ids: Vec<_> = found.iter().map(|p| p.id.as_str()).collect();
            assert_eq!(ids, [payment.id.as_str()], "form {form:?}");
        }
        assert!(ledger
            .find_payments_by_reference("12345")
            .await
            .unwrap()
            .is_empty());
    }
}
