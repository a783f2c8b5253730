//! Balance and status projections over an event log
//!
//! These are pure functions: the same events always give the same answer.
//! Because events are only ever appended, a projection restricted to events
//! before a cutoff never changes once that instant has passed.

use chrono::{DateTime, Utc};

use crate::money::Money;
use crate::types::*;

/// Balance and status over all given events.
///
/// Status precedence: any `canceled` event wins; otherwise no `payment`
/// event means unpaid; otherwise a non-zero balance means mispaid; otherwise
/// the payment is paid.
pub fn derive_balance<'a, I>(events: I) -> PaymentBalance
where
    I: IntoIterator<Item = &'a PaymentEvent>,
{
    let mut balance = Money::ZERO;
    let mut canceled = false;
    let mut has_payment = false;

    for event in events {
        balance += event.amount;
        match event.event_type {
            EventType::Canceled => canceled = true,
            EventType::Payment => has_payment = true,
            EventType::Created | EventType::Other => {}
        }
    }

    let status = if canceled {
        PaymentStatus::Canceled
    } else if !has_payment {
        PaymentStatus::Unpaid
    } else if !balance.is_zero() {
        PaymentStatus::Mispaid
    } else {
        PaymentStatus::Paid
    };

    PaymentBalance { balance, status }
}

/// Balance and status using only events strictly before `cutoff`
pub fn derive_balance_as_of(events: &[PaymentEvent], cutoff: DateTime<Utc>) -> PaymentBalance {
    derive_balance(events.iter().filter(|e| e.time < cutoff))
}
