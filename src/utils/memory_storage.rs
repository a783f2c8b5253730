//! In-memory storage implementation for testing

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::reference::normalize_reference;
use crate::traits::*;
use crate::types::*;

#[derive(Debug, Default)]
struct Tables {
    payments: HashMap<String, Payment>,
    /// Append-only event log per payment, in insertion order
    events: HashMap<String, Vec<PaymentEvent>>,
    /// Unique index: one event per dedup key
    event_mappings: HashMap<DedupKey, Uuid>,
    statements: HashMap<String, BankStatement>,
    transactions: HashMap<String, BankTransaction>,
    statement_links: HashSet<StatementTransactionMapping>,
    payment_counter: u64,
    reference_sequences: HashMap<u16, u32>,
    /// Keys whose next append fails with a storage error
    failing_keys: HashSet<DedupKey>,
    fail_next_debt_lookup: bool,
}

/// In-memory storage implementation for testing and development
///
/// All tables sit behind one lock, so every method is a single atomic step.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        *self.tables.write() = Tables::default();
    }

    /// Make the next append claiming `key` fail with a transient storage error
    pub fn fail_next_append(&self, key: DedupKey) {
        self.tables.write().failing_keys.insert(key);
    }

    /// Make the next lookup of payments by debt fail with a transient storage error
    pub fn fail_next_debt_lookup(&self) {
        self.tables.write().fail_next_debt_lookup = true;
    }

    /// Total number of events across all payments
    pub fn event_count(&self) -> usize {
        self.tables.read().events.values().map(Vec::len).sum()
    }

    /// Total number of stored bank transactions
    pub fn transaction_count(&self) -> usize {
        self.tables.read().transactions.len()
    }
}

fn in_range(date: NaiveDate, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    from.map_or(true, |start| date >= start) && to.map_or(true, |end| date <= end)
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn insert_payment(&self, payment: &Payment, created: &PaymentEvent) -> LedgerResult<()> {
        let mut tables = self.tables.write();
        if tables.payments.contains_key(&payment.id) {
            return Err(LedgerError::Validation(format!(
                "Payment with ID '{}' already exists",
                payment.id
            )));
        }
        tables.payments.insert(payment.id.clone(), payment.clone());
        tables
            .events
            .insert(payment.id.clone(), vec![created.clone()]);
        Ok(())
    }

    async fn get_payment(&self, payment_id: &str) -> LedgerResult<Option<Payment>> {
        Ok(self.tables.read().payments.get(payment_id).cloned())
    }

    async fn list_payments(
        &self,
        created_from: Option<NaiveDate>,
        created_to: Option<NaiveDate>,
    ) -> LedgerResult<Vec<Payment>> {
        let tables = self.tables.read();
        let mut payments: Vec<Payment> = tables
            .payments
            .values()
            .filter(|p| in_range(p.created_at.date_naive(), created_from, created_to))
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.payment_number);
        Ok(payments)
    }

    async fn find_payments_by_reference(
        &self,
        normalized_reference: &str,
    ) -> LedgerResult<Vec<Payment>> {
        let tables = self.tables.read();
        let mut matches: Vec<Payment> = tables
            .payments
            .values()
            .filter(|p| {
                p.reference_number
                    .as_deref()
                    .is_some_and(|r| normalize_reference(r) == normalized_reference)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.payment_number.cmp(&b.payment_number))
        });
        Ok(matches)
    }

    async fn find_payments_by_debts(
        &self,
        debt_ids: &BTreeSet<String>,
    ) -> LedgerResult<Vec<Payment>> {
        let mut tables = self.tables.write();
        if std::mem::take(&mut tables.fail_next_debt_lookup) {
            return Err(LedgerError::Storage(
                "simulated read failure for debt lookup".to_string(),
            ));
        }
        let mut matches: Vec<Payment> = tables
            .payments
            .values()
            .filter(|p| !p.debt_ids.is_disjoint(debt_ids))
            .cloned()
            .collect();
        matches.sort_by_key(|p| p.payment_number);
        Ok(matches)
    }

    async fn set_credited(&self, payment_id: &str) -> LedgerResult<bool> {
        let mut tables = self.tables.write();
        let payment = tables
            .payments
            .get_mut(payment_id)
            .ok_or_else(|| LedgerError::PaymentNotFound(payment_id.to_string()))?;
        let changed = !payment.credited;
        payment.credited = true;
        Ok(changed)
    }

    async fn next_payment_number(&self) -> LedgerResult<u64> {
        let mut tables = self.tables.write();
        tables.payment_counter += 1;
        Ok(tables.payment_counter)
    }

    async fn next_reference_sequence(&self, year: u16) -> LedgerResult<u32> {
        let mut tables = self.tables.write();
        let sequence = tables.reference_sequences.entry(year).or_insert(0);
        *sequence += 1;
        Ok(*sequence)
    }

    async fn append_event(
        &self,
        event: &PaymentEvent,
        key: Option<&DedupKey>,
    ) -> LedgerResult<AppendOutcome> {
        let mut tables = self.tables.write();

        if let Some(key) = key {
            if let Some(existing) = tables.event_mappings.get(key) {
                return Ok(AppendOutcome::Duplicate {
                    existing_event_id: *existing,
                });
            }
            if tables.failing_keys.remove(key) {
                return Err(LedgerError::Storage(format!(
                    "simulated write failure for {key}"
                )));
            }
        }

        let log = tables
            .events
            .get_mut(&event.payment_id)
            .ok_or_else(|| LedgerError::PaymentNotFound(event.payment_id.clone()))?;
        log.push(event.clone());

        if let Some(key) = key {
            tables.event_mappings.insert(key.clone(), event.id);
        }

        Ok(AppendOutcome::Appended(event.clone()))
    }

    async fn get_events(&self, payment_id: &str) -> LedgerResult<Vec<PaymentEvent>> {
        let mut events = self
            .tables
            .read()
            .events
            .get(payment_id)
            .cloned()
            .unwrap_or_default();
        // Stable sort keeps insertion order for equal timestamps
        events.sort_by_key(|e| e.time);
        Ok(events)
    }

    async fn get_event_mapping(&self, key: &DedupKey) -> LedgerResult<Option<EventMapping>> {
        Ok(self
            .tables
            .read()
            .event_mappings
            .get(key)
            .map(|event_id| EventMapping {
                key: key.clone(),
                event_id: *event_id,
            }))
    }

    async fn save_statement(&self, statement: &BankStatement) -> LedgerResult<()> {
        self.tables
            .write()
            .statements
            .insert(statement.id.clone(), statement.clone());
        Ok(())
    }

    async fn get_statement(&self, statement_id: &str) -> LedgerResult<Option<BankStatement>> {
        Ok(self.tables.read().statements.get(statement_id).cloned())
    }

    async fn insert_bank_transaction(&self, transaction: &BankTransaction) -> LedgerResult<bool> {
        let mut tables = self.tables.write();
        if tables.transactions.contains_key(&transaction.id) {
            return Ok(false);
        }
        tables
            .transactions
            .insert(transaction.id.clone(), transaction.clone());
        Ok(true)
    }

    async fn get_bank_transaction(
        &self,
        transaction_id: &str,
    ) -> LedgerResult<Option<BankTransaction>> {
        Ok(self.tables.read().transactions.get(transaction_id).cloned())
    }

    async fn link_statement_transaction(
        &self,
        mapping: &StatementTransactionMapping,
    ) -> LedgerResult<()> {
        let mut tables = self.tables.write();
        if !tables.statements.contains_key(&mapping.statement_id) {
            return Err(LedgerError::Storage(format!(
                "statement '{}' does not exist",
                mapping.statement_id
            )));
        }
        if !tables.transactions.contains_key(&mapping.transaction_id) {
            return Err(LedgerError::TransactionNotFound(
                mapping.transaction_id.clone(),
            ));
        }
        tables.statement_links.insert(mapping.clone());
        Ok(())
    }

    async fn list_statement_transactions(
        &self,
        statement_id: &str,
    ) -> LedgerResult<Vec<BankTransaction>> {
        let tables = self.tables.read();
        let mut transactions: Vec<BankTransaction> = tables
            .statement_links
            .iter()
            .filter(|link| link.statement_id == statement_id)
            .filter_map(|link| tables.transactions.get(&link.transaction_id))
            .cloned()
            .collect();
        transactions.sort_by(|a, b| a.value_date.cmp(&b.value_date).then(a.id.cmp(&b.id)));
        Ok(transactions)
    }

    async fn list_unregistered_transactions(&self) -> LedgerResult<Vec<BankTransaction>> {
        let tables = self.tables.read();
        let mut transactions: Vec<BankTransaction> = tables
            .transactions
            .values()
            .filter(|txn| {
                !tables
                    .event_mappings
                    .contains_key(&DedupKey::bank_transaction(txn.id.clone()))
            })
            .cloned()
            .collect();
        transactions.sort_by(|a, b| a.value_date.cmp(&b.value_date).then(a.id.cmp(&b.id)));
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use chrono::{TimeZone, Utc};

    fn payment(id: &str, number: u64) -> (Payment, PaymentEvent) {
        let created_at = Utc.with_ymd_and_hms(2024, 1, number as u32, 12, 0, 0).unwrap();
        let payment = Payment {
            id: id.to_string(),
            payment_number: number,
            payment_type: PaymentType::Invoice,
            title: "Membership".to_string(),
            message: String::new(),
            payer: PartyRef::new("payer-1", "Maija"),
            debt_center: None,
            created_at,
            credited: false,
            reference_number: Some("00012345".to_string()),
            debt_ids: BTreeSet::from(["debt-1".to_string()]),
        };
        let created = PaymentEvent {
            id: Uuid::new_v4(),
            payment_id: id.to_string(),
            event_type: EventType::Created,
            amount: Money::from_cents(-1000),
            time: created_at,
            data: serde_json::Value::Null,
            transaction_id: None,
        };
        (payment, created)
    }

    fn payment_event(payment_id: &str) -> PaymentEvent {
        PaymentEvent {
            id: Uuid::new_v4(),
            payment_id: payment_id.to_string(),
            event_type: EventType::Payment,
            amount: Money::from_cents(1000),
            time: Utc::now(),
            data: serde_json::Value::Null,
            transaction_id: Some("TX-1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_append_claims_key_once() {
        let storage = MemoryStorage::new();
        let (p, created) = payment("p1", 1);
        storage.insert_payment(&p, &created).await.unwrap();

        let key = DedupKey::bank_transaction("TX-1");
        let first = payment_event("p1");
        let outcome = storage.append_event(&first, Some(&key)).await.unwrap();
        assert_eq!(outcome, AppendOutcome::Appended(first.clone()));

        let second = payment_event("p1");
        let outcome = storage.append_event(&second, Some(&key)).await.unwrap();
        assert_eq!(
            outcome,
            AppendOutcome::Duplicate {
                existing_event_id: first.id
            }
        );
        assert_eq!(storage.get_events("p1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_append_leaves_key_free() {
        let storage = MemoryStorage::new();
        let (p, created) = payment("p1", 1);
        storage.insert_payment(&p, &created).await.unwrap();

        let key = DedupKey::bank_transaction("TX-1");
        storage.fail_next_append(key.clone());
        let err = storage
            .append_event(&payment_event("p1"), Some(&key))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(storage.get_event_mapping(&key).await.unwrap().is_none());

        storage
            .append_event(&payment_event("p1"), Some(&key))
            .await
            .unwrap();
        assert!(storage.get_event_mapping(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reference_lookup_is_normalized_and_ordered() {
        let storage = MemoryStorage::new();
        let (late, late_created) = payment("late", 5);
        let (early, early_created) = payment("early", 2);
        storage.insert_payment(&late, &late_created).await.unwrap();
        storage.insert_payment(&early, &early_created).await.unwrap();

        let found = storage.find_payments_by_reference("12345").await.unwrap();
        let ids: Vec<_> = found.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["early", "late"]);
    }

    #[tokio::test]
    async fn test_duplicate_payment_rejected() {
        let storage = MemoryStorage::new();
        let (p, created) = payment("p1", 1);
        storage.insert_payment(&p, &created).await.unwrap();
        assert!(storage.insert_payment(&p, &created).await.is_err());
        assert_eq!(storage.event_count(), 1);
    }

    #[tokio::test]
    async fn test_clear_resets_tables_and_counters() {
        let storage = MemoryStorage::new();
        let (p, created) = payment("p1", 1);
        storage.insert_payment(&p, &created).await.unwrap();
        storage
            .append_event(&payment_event("p1"), Some(&DedupKey::bank_transaction("TX-1")))
            .await
            .unwrap();
        assert_eq!(storage.next_payment_number().await.unwrap(), 1);

        storage.clear();

        assert_eq!(storage.event_count(), 0);
        assert!(storage.get_payment("p1").await.unwrap().is_none());
        assert!(storage
            .get_event_mapping(&DedupKey::bank_transaction("TX-1"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(storage.next_payment_number().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_debt_lookup_affects_one_call() {
        let storage = MemoryStorage::new();
        let (p, created) = payment("p1", 1);
        storage.insert_payment(&p, &created).await.unwrap();
        let debts = BTreeSet::from(["debt-1".to_string()]);

        storage.fail_next_debt_lookup();
        let err = storage.find_payments_by_debts(&debts).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(storage.find_payments_by_debts(&debts).await.unwrap().len(), 1);
    }
}
