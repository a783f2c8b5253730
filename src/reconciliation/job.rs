//! Job entry points for the worker layer
//!
//! Workers receive a tagged [`JobResult`] instead of a bare error so they can
//! tell retryable failures (`soft`) from permanent ones without inspecting
//! error types.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::reconciliation::{BankReconciliationService, IngestSummary, Registration};
use crate::traits::LedgerStorage;
use crate::types::*;

/// Result reported back to the job queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobResult<T> {
    Success {
        data: T,
    },
    Error {
        code: String,
        message: String,
        /// Retrying the job may succeed
        soft: bool,
    },
}

impl<T> JobResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }

    /// Whether the failure is worth retrying
    pub fn is_soft_error(&self) -> bool {
        matches!(self, JobResult::Error { soft: true, .. })
    }
}

impl<T> From<LedgerResult<T>> for JobResult<T> {
    fn from(result: LedgerResult<T>) -> Self {
        match result {
            Ok(data) => JobResult::Success { data },
            Err(error) => JobResult::Error {
                code: error.code().to_string(),
                message: error.to_string(),
                soft: error.is_transient(),
            },
        }
    }
}

/// A transaction whose registration failed during an import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFailure {
    pub transaction_id: String,
    pub code: String,
    pub message: String,
    pub soft: bool,
}

/// Payload of a successful import job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub statement_id: String,
    pub document_id: String,
    pub summary: IngestSummary,
    /// Failed registrations; these transactions stay retryable
    pub failures: Vec<TransactionFailure>,
}

/// Job handlers wrapping the reconciliation service
pub struct ReconciliationJobs<S: LedgerStorage> {
    service: Arc<BankReconciliationService<S>>,
}

impl<S: LedgerStorage> Clone for ReconciliationJobs<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<S: LedgerStorage> ReconciliationJobs<S> {
    pub fn new(service: Arc<BankReconciliationService<S>>) -> Self {
        Self { service }
    }

    /// Import a statement document.
    ///
    /// Per-transaction failures do not fail the job; they are listed in the
    /// payload so the worker can schedule `register` retries for them.
    pub async fn import_statement(&self, document: &[u8]) -> JobResult<ImportResult> {
        let result = self.service.ingest(document).await.map(|report| {
            let failures = report
                .failures()
                .map(|(transaction, error)| TransactionFailure {
                    transaction_id: transaction.id.clone(),
                    code: error.code().to_string(),
                    message: error.to_string(),
                    soft: error.is_transient(),
                })
                .collect();

            ImportResult {
                statement_id: report.statement.id.clone(),
                document_id: report.statement.document_id.clone(),
                summary: report.summary(),
                failures,
            }
        });

        if let Err(ref error) = result {
            tracing::error!(code = error.code(), error = %error, "statement import job failed");
        }
        result.into()
    }

    /// Register one transaction, optionally against an explicit payment
    pub async fn register(
        &self,
        transaction_id: &str,
        payment_id: Option<&str>,
    ) -> JobResult<Registration> {
        let result = self
            .service
            .register_transaction(transaction_id, payment_id)
            .await;

        if let Err(ref error) = result {
            tracing::warn!(
                transaction_id,
                code = error.code(),
                error = %error,
                "registration job failed"
            );
        }
        result.into()
    }
}
