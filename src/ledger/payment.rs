//! Payment issuance and the credit flag

use chrono::{Datelike, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::ledger::status::derive_balance;
use crate::reference::ReferenceNumber;
use crate::traits::*;
use crate::types::*;

/// Payment manager for issuing payments and maintaining the credit flag
pub struct PaymentManager<S: LedgerStorage> {
    pub(crate) storage: S,
    validator: Box<dyn PaymentValidator>,
    series: u16,
}

impl<S: LedgerStorage> PaymentManager<S> {
    /// Create a new payment manager
    pub fn new(storage: S, config: &LedgerConfig) -> Self {
        Self::with_validator(storage, config, Box::new(DefaultPaymentValidator))
    }

    /// Create a new payment manager with custom validator
    pub fn with_validator(
        storage: S,
        config: &LedgerConfig,
        validator: Box<dyn PaymentValidator>,
    ) -> Self {
        Self {
            storage,
            validator,
            series: config.reference.series,
        }
    }

    /// Issue a payment and log its `created` event
    pub async fn create_payment(&self, new: NewPayment) -> LedgerResult<Payment> {
        self.validator.validate_new_payment(&new)?;

        let created_at = new.created_at.unwrap_or_else(Utc::now);

        let reference_number = match (new.payment_type, new.reference) {
            (_, Some(manual)) => Some(manual.trim().to_string()),
            (PaymentType::Invoice, None) => {
                // Sequences are counted per full year, the reference carries two digits
                let year = u16::try_from(created_at.year()).map_err(|_| {
                    LedgerError::Validation(format!(
                        "Cannot issue a reference for year {}",
                        created_at.year()
                    ))
                })?;
                let sequence = self.storage.next_reference_sequence(year).await?;
                let reference = ReferenceNumber::generate(self.series, year % 100, sequence)?;
                Some(reference.to_string())
            }
            (PaymentType::Cash, None) => None,
        };

        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            payment_number: self.storage.next_payment_number().await?,
            payment_type: new.payment_type,
            title: new.title,
            message: new.message,
            payer: new.payer,
            debt_center: new.debt_center,
            created_at,
            credited: false,
            reference_number,
            debt_ids: new.debt_ids,
        };

        let created = PaymentEvent {
            id: Uuid::new_v4(),
            payment_id: payment.id.clone(),
            event_type: EventType::Created,
            amount: -new.total,
            time: created_at,
            data: json!({ "total": new.total }),
            transaction_id: None,
        };

        self.storage.insert_payment(&payment, &created).await?;

        tracing::info!(
            payment_id = %payment.id,
            payment_number = payment.payment_number,
            reference = payment.reference_number.as_deref().unwrap_or(""),
            total = %new.total,
            "payment created"
        );

        Ok(payment)
    }

    /// Get a payment by ID
    pub async fn get_payment(&self, payment_id: &str) -> LedgerResult<Option<Payment>> {
        self.storage.get_payment(payment_id).await
    }

    /// Get a payment by ID, returning an error if not found
    pub async fn get_payment_required(&self, payment_id: &str) -> LedgerResult<Payment> {
        self.storage
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| LedgerError::PaymentNotFound(payment_id.to_string()))
    }

    /// Validate a draft against the payment it targets
    pub fn validate_event(&self, payment: &Payment, draft: &EventDraft) -> LedgerResult<()> {
        self.validator.validate_event(payment, draft)
    }

    /// Set the credited flag; returns false when it was already set
    pub async fn credit_payment(&self, payment_id: &str) -> LedgerResult<bool> {
        self.get_payment_required(payment_id).await?;
        let changed = self.storage.set_credited(payment_id).await?;
        if changed {
            tracing::info!(payment_id, "payment credited");
        }
        Ok(changed)
    }

    /// Credit the open payments that share a debt with `paid`.
    ///
    /// Payments that are paid, canceled or already credited are left alone.
    /// Returns the IDs of the payments that were credited.
    pub async fn credit_overlapping(&self, paid: &Payment) -> LedgerResult<Vec<String>> {
        let mut credited = Vec::new();

        for sibling in self.storage.find_payments_by_debts(&paid.debt_ids).await? {
            if sibling.id == paid.id || sibling.credited {
                continue;
            }

            let events = self.storage.get_events(&sibling.id).await?;
            let state = derive_balance(&events);
            if matches!(state.status, PaymentStatus::Paid | PaymentStatus::Canceled) {
                continue;
            }

            if self.storage.set_credited(&sibling.id).await? {
                tracing::info!(
                    payment_id = %sibling.id,
                    paid_payment_id = %paid.id,
                    "payment credited by overlapping paid payment"
                );
                credited.push(sibling.id);
            }
        }

        Ok(credited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::utils::memory_storage::MemoryStorage;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn invoice(debts: &[&str]) -> NewPayment {
        NewPayment {
            payment_type: PaymentType::Invoice,
            title: "Membership fee".to_string(),
            message: String::new(),
            payer: PartyRef::new("payer-1", "Maija"),
            debt_center: None,
            debt_ids: debts.iter().map(|d| d.to_string()).collect::<BTreeSet<_>>(),
            total: Money::from_cents(2500),
            reference: None,
            created_at: Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn test_invoice_gets_generated_reference() {
        let storage = MemoryStorage::new();
        let manager = PaymentManager::new(storage.clone(), &LedgerConfig::default());

        let first = manager.create_payment(invoice(&["d1"])).await.unwrap();
        let second = manager.create_payment(invoice(&["d2"])).await.unwrap();

        assert_eq!(first.payment_number, 1);
        assert_eq!(second.payment_number, 2);
        assert_eq!(
            first.reference_number.as_deref(),
            Some("RF77 0000 1337 0024 0001 0014")
        );
        assert!(crate::reference::validate(
            second.reference_number.as_deref().unwrap()
        ));

        let events = storage.get_events(&first.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Created);
        assert_eq!(events[0].amount, Money::from_cents(-2500));
    }

    #[tokio::test]
    async fn test_cash_payment_has_no_reference() {
        let manager = PaymentManager::new(MemoryStorage::new(), &LedgerConfig::default());
        let mut new = invoice(&["d1"]);
        new.payment_type = PaymentType::Cash;

        let payment = manager.create_payment(new).await.unwrap();
        assert!(payment.reference_number.is_none());
    }

    #[tokio::test]
    async fn test_credit_is_idempotent() {
        let manager = PaymentManager::new(MemoryStorage::new(), &LedgerConfig::default());
        let payment = manager.create_payment(invoice(&["d1"])).await.unwrap();

        assert!(manager.credit_payment(&payment.id).await.unwrap());
        assert!(!manager.credit_payment(&payment.id).await.unwrap());
        assert!(matches!(
            manager.credit_payment("missing").await,
            Err(LedgerError::PaymentNotFound(_))
        ));
    }
}
