//! # Quantity Validation
//!
//! Validates storage sizes against the Kubernetes quantity grammar before
//! they are sent to the API server.
//!
//! ```text
//! <quantity>     ::= <signedNumber><suffix>
//! <suffix>       ::= <binarySI> | <decimalExponent> | <decimalSI>
//! <binarySI>     ::= Ki | Mi | Gi | Ti | Pi | Ei
//! <decimalSI>    ::= n | u | m | "" | k | M | G | T | P | E
//! ```

use std::sync::LazyLock;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use regex::Regex;
use thiserror::Error;

static QUANTITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([+-]?)(\d+(?:\.\d*)?|\.\d+)(Ki|Mi|Gi|Ti|Pi|Ei|[eE][+-]?\d+|n|u|m|k|M|G|T|P|E)?$",
    )
    .expect("Failed to compile QUANTITY_PATTERN - this should never happen")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("'{0}' is not a valid quantity")]
    Malformed(String),
    #[error("'{0}' must not be negative")]
    Negative(String),
}

/// Parse a storage size into a `Quantity`
///
/// Surrounding whitespace is ignored. Zero is accepted here and left for the
/// API server to judge.
pub fn parse_storage_size(size: &str) -> Result<Quantity, QuantityError> {
    let size = size.trim();
    let captures = QUANTITY_PATTERN
        .captures(size)
        .ok_or_else(|| QuantityError::Malformed(size.to_string()))?;

    let is_zero = captures
        .get(2)
        .is_some_and(|m| m.as_str().chars().all(|c| c == '0' || c == '.'));
    if captures.get(1).is_some_and(|m| m.as_str() == "-") && !is_zero {
        return Err(QuantityError::Negative(size.to_string()));
    }

    Ok(Quantity(size.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_common_sizes() {
        for size in ["1Gi", "500Mi", "2Ti", "1G", "1.5Gi", "100", "1e3", "0.5", "+1Gi"] {
            assert_eq!(
                parse_storage_size(size),
                Ok(Quantity(size.to_string())),
                "{size} should be accepted"
            );
        }
    }

    #[test]
    fn test_trims_whitespace() {
        assert_eq!(parse_storage_size(" 2Gi "), Ok(Quantity("2Gi".to_string())));
    }

    #[test]
    fn test_rejects_malformed_sizes() {
        for size in ["", "Gi", "1 Gi", "1GB", "one", "1.2.3Gi", "1gi"] {
            assert!(
                matches!(parse_storage_size(size), Err(QuantityError::Malformed(_))),
                "{size} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_negative_sizes() {
        assert_eq!(
            parse_storage_size("-1Gi"),
            Err(QuantityError::Negative("-1Gi".to_string()))
        );
        assert!(parse_storage_size("-0").is_ok());
    }
}
