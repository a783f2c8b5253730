//! Bank statement import and transaction registration

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::camt::parse_statement;
use crate::ledger::{derive_balance, patterns, PaymentLedger};
use crate::reference::normalize_reference;
use crate::traits::*;
use crate::types::*;

/// Outcome of registering one bank transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Registration {
    /// A payment event was appended
    Registered { event: PaymentEvent },
    /// An event already exists for the transaction; nothing was written
    AlreadyRegistered { event_id: Uuid },
    /// No payment could be resolved; the transaction stays unregistered
    Unmatched,
}

impl Registration {
    pub fn event(&self) -> Option<&PaymentEvent> {
        match self {
            Registration::Registered { event } => Some(event),
            _ => None,
        }
    }
}

/// One statement entry as handled by an import
#[derive(Debug)]
pub struct IngestedTransaction {
    pub transaction: BankTransaction,
    /// False when an earlier import already stored the transaction
    pub is_new: bool,
    /// Registration result; a failure here does not affect other entries
    pub outcome: LedgerResult<Registration>,
}

/// Result of importing one statement document
#[derive(Debug)]
pub struct IngestReport {
    pub statement: BankStatement,
    /// Entries in document order
    pub transactions: Vec<IngestedTransaction>,
}

/// Counts over an [`IngestReport`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub new_transactions: usize,
    pub reused_transactions: usize,
    pub registered: usize,
    pub already_registered: usize,
    pub unmatched: usize,
    pub failed: usize,
}

impl IngestReport {
    pub fn summary(&self) -> IngestSummary {
        let mut summary = IngestSummary::default();
        for item in &self.transactions {
            if item.is_new {
                summary.new_transactions += 1;
            } else {
                summary.reused_transactions += 1;
            }
            match item.outcome {
                Ok(Registration::Registered { .. }) => summary.registered += 1,
                Ok(Registration::AlreadyRegistered { .. }) => summary.already_registered += 1,
                Ok(Registration::Unmatched) => summary.unmatched += 1,
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }

    /// Entries whose registration failed
    pub fn failures(&self) -> impl Iterator<Item = (&BankTransaction, &LedgerError)> {
        self.transactions
            .iter()
            .filter_map(|item| item.outcome.as_ref().err().map(|e| (&item.transaction, e)))
    }
}

/// Imports bank statements and turns their transactions into ledger events
///
/// Registration is idempotent per bank transaction: the storage's unique
/// dedup key is the only guard, so overlapping imports and concurrent runs
/// never record the same money twice.
pub struct BankReconciliationService<S: LedgerStorage> {
    ledger: PaymentLedger<S>,
}

impl<S: LedgerStorage> BankReconciliationService<S> {
    pub fn new(ledger: PaymentLedger<S>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &PaymentLedger<S> {
        &self.ledger
    }

    fn storage(&self) -> &S {
        self.ledger.storage()
    }

    /// Import a camt.053 document and register every transaction it contains.
    ///
    /// A document that fails to parse aborts the import before anything is
    /// written. Registration failures are reported per transaction.
    pub async fn ingest(&self, xml: &[u8]) -> LedgerResult<IngestReport> {
        let parsed = parse_statement(xml)?;

        if !parsed.is_balanced() {
            tracing::warn!(
                document_id = %parsed.document_id,
                opening = %parsed.opening_balance.amount,
                closing = %parsed.closing_balance.amount,
                net = ?parsed.net_movement().ok(),
                "statement balances do not add up"
            );
        }

        let statement = BankStatement {
            id: Uuid::new_v4().to_string(),
            document_id: parsed.document_id,
            account: parsed.account,
            servicer: parsed.servicer,
            generated_at: parsed.generated_at,
            imported_at: Utc::now(),
            opening_balance: parsed.opening_balance,
            closing_balance: parsed.closing_balance,
        };
        self.storage().save_statement(&statement).await?;

        let mut stored = Vec::with_capacity(parsed.entries.len());
        for entry in parsed.entries {
            let is_new = self.storage().insert_bank_transaction(&entry).await?;
            let transaction = if is_new {
                entry
            } else {
                let existing = self.storage().get_bank_transaction(&entry.id).await?;
                existing.unwrap_or(entry)
            };

            self.storage()
                .link_statement_transaction(&StatementTransactionMapping {
                    statement_id: statement.id.clone(),
                    transaction_id: transaction.id.clone(),
                })
                .await?;

            stored.push((transaction, is_new));
        }

        let limit = self.ledger.config().reconciliation.max_concurrent_registrations;
        // Plain futures, no closure in the stream: `ingest` must stay spawnable
        let pending: Vec<_> = stored
            .iter()
            .map(|(transaction, _)| self.register_transaction(&transaction.id, None))
            .collect();
        let outcomes: Vec<LedgerResult<Registration>> = stream::iter(pending)
            .buffered(limit.max(1))
            .collect()
            .await;

        let transactions: Vec<IngestedTransaction> = stored
            .into_iter()
            .zip(outcomes)
            .map(|((transaction, is_new), outcome)| {
                if let Err(ref error) = outcome {
                    tracing::error!(
                        statement_id = %statement.id,
                        transaction_id = %transaction.id,
                        error = %error,
                        "transaction registration failed"
                    );
                }
                IngestedTransaction {
                    transaction,
                    is_new,
                    outcome,
                }
            })
            .collect();

        let report = IngestReport {
            statement,
            transactions,
        };
        let summary = report.summary();
        tracing::info!(
            statement_id = %report.statement.id,
            document_id = %report.statement.document_id,
            new = summary.new_transactions,
            reused = summary.reused_transactions,
            registered = summary.registered,
            already_registered = summary.already_registered,
            unmatched = summary.unmatched,
            failed = summary.failed,
            "statement imported"
        );

        Ok(report)
    }

    /// Register a stored bank transaction as a payment event.
    ///
    /// With `payment_id` the target is explicit; otherwise it is resolved by
    /// the transaction's reference. Debits are only registered explicitly.
    pub async fn register_transaction(
        &self,
        transaction_id: &str,
        payment_id: Option<&str>,
    ) -> LedgerResult<Registration> {
        let transaction = self
            .storage()
            .get_bank_transaction(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::TransactionNotFound(transaction_id.to_string()))?;

        let key = DedupKey::bank_transaction(&transaction.id);
        if let Some(mapping) = self.storage().get_event_mapping(&key).await? {
            tracing::debug!(transaction_id, event_id = %mapping.event_id, "already registered");
            return Ok(Registration::AlreadyRegistered {
                event_id: mapping.event_id,
            });
        }

        let payment = match payment_id {
            Some(id) => self.ledger.get_payment_required(id).await?,
            None => match self.resolve_payment(&transaction).await? {
                Some(payment) => payment,
                None => {
                    tracing::info!(
                        transaction_id,
                        reference = transaction.reference.as_deref().unwrap_or(""),
                        "transaction unmatched"
                    );
                    return Ok(Registration::Unmatched);
                }
            },
        };

        let draft = patterns::bank_payment(&payment.id, &transaction)?;
        match self.ledger.append_event_once(draft).await? {
            AppendOutcome::Appended(event) => {
                tracing::info!(
                    transaction_id,
                    payment_id = %payment.id,
                    amount = %event.amount,
                    "transaction registered"
                );
                Ok(Registration::Registered { event })
            }
            // Lost a race against a concurrent registration of the same transaction
            AppendOutcome::Duplicate { existing_event_id } => Ok(Registration::AlreadyRegistered {
                event_id: existing_event_id,
            }),
        }
    }

    /// Transactions no event has been registered from
    pub async fn unregistered_transactions(&self) -> LedgerResult<Vec<BankTransaction>> {
        self.storage().list_unregistered_transactions().await
    }

    /// Transactions contained in a statement import
    pub async fn statement_transactions(
        &self,
        statement_id: &str,
    ) -> LedgerResult<Vec<BankTransaction>> {
        if self.storage().get_statement(statement_id).await?.is_none() {
            return Err(LedgerError::StatementNotFound(statement_id.to_string()));
        }
        self.storage().list_statement_transactions(statement_id).await
    }

    /// Get a statement import by ID
    pub async fn get_statement(&self, statement_id: &str) -> LedgerResult<Option<BankStatement>> {
        self.storage().get_statement(statement_id).await
    }

    async fn resolve_payment(&self, transaction: &BankTransaction) -> LedgerResult<Option<Payment>> {
        if transaction.direction == Direction::Debit {
            return Ok(None);
        }

        let Some(reference) = transaction.reference.as_deref() else {
            return Ok(None);
        };
        let normalized = normalize_reference(reference);
        if normalized.is_empty() {
            return Ok(None);
        }

        let mut candidates = self
            .storage()
            .find_payments_by_reference(&normalized)
            .await?;

        match candidates.len() {
            0 => Ok(None),
            1 => Ok(candidates.pop()),
            _ => {
                let ids: Vec<String> = candidates.iter().map(|p| p.id.clone()).collect();
                if self.ledger.config().reconciliation.strict_reference_matching {
                    return Err(LedgerError::ReconciliationConflict {
                        reference: normalized,
                        candidates: ids,
                    });
                }

                let chosen = self.oldest_open(&candidates).await?;
                tracing::warn!(
                    transaction_id = %transaction.id,
                    reference = %normalized,
                    candidates = %ids.join(", "),
                    chosen = %candidates[chosen].id,
                    "reference matches several payments"
                );
                Ok(Some(candidates.swap_remove(chosen)))
            }
        }
    }

    /// Index of the oldest candidate that is still open, else the oldest one
    async fn oldest_open(&self, candidates: &[Payment]) -> LedgerResult<usize> {
        for (index, payment) in candidates.iter().enumerate() {
            if payment.credited {
                continue;
            }
            let events = self.storage().get_events(&payment.id).await?;
            if matches!(
                derive_balance(&events).status,
                PaymentStatus::Unpaid | PaymentStatus::Mispaid
            ) {
                return Ok(index);
            }
        }
        Ok(0)
    }
}
