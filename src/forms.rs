//! Parsing helpers for free-text form inputs.

use rust_decimal::Decimal;

use crate::error::ValidationError;

/// Trimmed `value`, or `MissingField` if it is blank.
pub fn require<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField { field });
    }
    Ok(trimmed)
}

/// A non-negative whole number.
pub fn parse_count(field: &'static str, value: &str) -> Result<u32, ValidationError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| ValidationError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

/// A strictly positive whole number.
pub fn parse_positive(field: &'static str, value: &str) -> Result<u32, ValidationError> {
    match parse_count(field, value)? {
        0 => Err(ValidationError::InvalidNumber {
            field,
            value: value.to_string(),
        }),
        n => Ok(n),
    }
}

/// An optional non-negative decimal; blank means "not set".
pub fn parse_price(field: &'static str, value: &str) -> Result<Option<Decimal>, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let invalid = || ValidationError::InvalidNumber {
        field,
        value: value.to_string(),
    };
    let price: Decimal = trimmed.parse().map_err(|_| invalid())?;
    if price.is_sign_negative() {
        return Err(invalid());
    }
    Ok(Some(price))
}
