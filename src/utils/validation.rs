//! Validation utilities

use crate::money::Money;
use crate::traits::*;
use crate::types::*;

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: &Money) -> LedgerResult<()> {
    if !amount.is_positive() {
        Err(LedgerError::Validation(
            "Amount must be positive".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate that an identifier (payer, debt, debt center) is valid
pub fn validate_identifier(kind: &str, id: &str) -> LedgerResult<()> {
    if id.trim().is_empty() {
        return Err(LedgerError::Validation(format!("{kind} ID cannot be empty")));
    }

    if id.len() > 64 {
        return Err(LedgerError::Validation(format!(
            "{kind} ID cannot exceed 64 characters"
        )));
    }

    // Check for valid characters (alphanumeric, dashes, underscores)
    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(LedgerError::Validation(format!(
            "{kind} ID can only contain alphanumeric characters, dashes, and underscores"
        )));
    }

    Ok(())
}

/// Validate that a payment title is valid
pub fn validate_payment_title(title: &str) -> LedgerResult<()> {
    if title.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Payment title cannot be empty".to_string(),
        ));
    }

    if title.len() > 200 {
        return Err(LedgerError::Validation(
            "Payment title cannot exceed 200 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate that a payment message is valid
pub fn validate_payment_message(message: &str) -> LedgerResult<()> {
    if message.len() > 2000 {
        return Err(LedgerError::Validation(
            "Payment message cannot exceed 2000 characters".to_string(),
        ));
    }

    Ok(())
}

/// Stricter validator used when payments are entered by hand
pub struct EnhancedPaymentValidator;

impl PaymentValidator for EnhancedPaymentValidator {
    fn validate_new_payment(&self, payment: &NewPayment) -> LedgerResult<()> {
        // Basic validation
        DefaultPaymentValidator.validate_new_payment(payment)?;

        validate_payment_title(&payment.title)?;
        validate_payment_message(&payment.message)?;
        validate_positive_amount(&payment.total)?;
        validate_identifier("Payer", &payment.payer.id)?;
        if let Some(ref center) = payment.debt_center {
            validate_identifier("Debt center", &center.id)?;
        }

        if payment.debt_ids.is_empty() {
            return Err(LedgerError::Validation(
                "Payment must cover at least one debt".to_string(),
            ));
        }
        for debt_id in &payment.debt_ids {
            validate_identifier("Debt", debt_id)?;
        }

        if payment.payment_type == PaymentType::Cash && payment.reference.is_some() {
            return Err(LedgerError::Validation(
                "Cash payments do not carry a reference number".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_event(&self, payment: &Payment, draft: &EventDraft) -> LedgerResult<()> {
        DefaultPaymentValidator.validate_event(payment, draft)?;

        if draft.event_type == EventType::Canceled && !draft.amount.is_zero() {
            return Err(LedgerError::Validation(
                "A canceled event carries no amount".to_string(),
            ));
        }

        // Audit payloads are JSON objects or nothing
        if !(draft.data.is_object() || draft.data.is_null()) {
            return Err(LedgerError::Validation(
                "Event data must be a JSON object".to_string(),
            ));
        }

        Ok(())
    }
}
