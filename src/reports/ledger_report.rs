//! Ledger report: payment balances as of a cutoff, grouped by payer or debt center

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ledger::PaymentLedger;
use crate::money::Money;
use crate::traits::LedgerStorage;
use crate::types::*;

/// Group id of payments that have no debt center
pub const NO_DEBT_CENTER: &str = "none";

/// Group id of an ungrouped report
pub const ALL_PAYMENTS: &str = "all";

/// Inclusive range of creation dates; open ends are unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }
}

/// Grouping key of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Payer,
    DebtCenter,
}

/// Report parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportQuery {
    pub range: DateRange,
    pub group_by: Option<GroupBy>,
    /// Only events strictly before this instant are counted; payments
    /// created at or after it are left out
    pub as_of: DateTime<Utc>,
}

/// One payment in a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub payment_id: String,
    pub payment_number: u64,
    pub title: String,
    pub payer: PartyRef,
    pub reference_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub balance: Money,
    pub status: PaymentStatus,
    /// Current credited flag. The flag has no history, so it is not cut off at `as_of`.
    pub credited: bool,
}

/// Rows sharing a grouping key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportGroup {
    pub group_id: String,
    pub group_label: String,
    /// Sum of the row balances
    pub total: Money,
    pub rows: Vec<ReportRow>,
}

/// Builds ledger reports from a [`PaymentLedger`]
pub struct LedgerReportBuilder<'a, S: LedgerStorage> {
    ledger: &'a PaymentLedger<S>,
}

impl<'a, S: LedgerStorage> LedgerReportBuilder<'a, S> {
    pub fn new(ledger: &'a PaymentLedger<S>) -> Self {
        Self { ledger }
    }

    /// Build the report. Groups are sorted by label, rows by payment number.
    pub async fn build(&self, query: &ReportQuery) -> LedgerResult<Vec<ReportGroup>> {
        if let (Some(from), Some(to)) = (query.range.from, query.range.to) {
            if from > to {
                return Err(LedgerError::Validation(format!(
                    "Report range starts after it ends: {from} > {to}"
                )));
            }
        }

        let payments: Vec<Payment> = self
            .ledger
            .list_payments(query.range.from, query.range.to)
            .await?
            .into_iter()
            .filter(|p| p.created_at < query.as_of)
            .collect();

        let states = try_join_all(
            payments
                .iter()
                .map(|p| self.ledger.status_as_of(&p.id, query.as_of)),
        )
        .await?;

        let mut groups: BTreeMap<(String, String), Vec<ReportRow>> = BTreeMap::new();
        for (payment, state) in payments.into_iter().zip(states) {
            let (group_id, group_label) = group_key(&payment, query.group_by);
            groups
                .entry((group_label, group_id))
                .or_default()
                .push(ReportRow {
                    payment_id: payment.id,
                    payment_number: payment.payment_number,
                    title: payment.title,
                    payer: payment.payer,
                    reference_number: payment.reference_number,
                    created_at: payment.created_at,
                    balance: state.balance,
                    status: state.status,
                    credited: payment.credited,
                });
        }

        let report: Vec<ReportGroup> = groups
            .into_iter()
            .map(|((group_label, group_id), mut rows)| {
                rows.sort_by_key(|r| r.payment_number);
                ReportGroup {
                    group_id,
                    group_label,
                    total: rows.iter().map(|r| r.balance).sum(),
                    rows,
                }
            })
            .collect();

        tracing::debug!(
            groups = report.len(),
            as_of = %query.as_of,
            "ledger report built"
        );

        Ok(report)
    }
}

fn group_key(payment: &Payment, group_by: Option<GroupBy>) -> (String, String) {
    match group_by {
        None => (ALL_PAYMENTS.to_string(), "All payments".to_string()),
        Some(GroupBy::Payer) => (payment.payer.id.clone(), payment.payer.name.clone()),
        Some(GroupBy::DebtCenter) => match payment.debt_center {
            Some(ref center) => (center.id.clone(), center.name.clone()),
            None => (NO_DEBT_CENTER.to_string(), "No debt center".to_string()),
        },
    }
}

impl<S: LedgerStorage> PaymentLedger<S> {
    /// Build a ledger report over this ledger
    pub async fn build_ledger_report(&self, query: &ReportQuery) -> LedgerResult<Vec<ReportGroup>> {
        LedgerReportBuilder::new(self).build(query).await
    }
}
