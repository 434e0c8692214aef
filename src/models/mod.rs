pub mod client;
pub mod document;
pub mod invoice;
pub mod message;
pub mod notification;
pub mod quotation;
pub mod report;
pub mod user;

pub use message::{ConnectionStatus, ConnectionStatusData, WebSocketMessage};

use rust_decimal::Decimal;
use validator::ValidationError;

/// Largest quantity or rate accepted on input; keeps line products far below `Decimal::MAX`.
pub(crate) const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

pub(crate) fn positive_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if !value.is_sign_positive() || value.is_zero() {
        return Err(ValidationError::new("must_be_positive"));
    }
    within_max(value)
}

pub(crate) fn non_negative_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("must_not_be_negative"));
    }
    within_max(value)
}

fn within_max(value: &Decimal) -> Result<(), ValidationError> {
    if *value > MAX_AMOUNT {
        Err(ValidationError::new("too_large"))
    } else {
        Ok(())
    }
}

pub(crate) fn currency_code(value: &str) -> Result<(), ValidationError> {
    if value.len() == 3 && value.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_currency_code"))
    }
}
