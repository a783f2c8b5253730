//! Finnish reference numbers wrapped as ISO 11649 RF creditor references

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{LedgerError, LedgerResult};

/// Organisation prefix placed in front of every generated reference
pub const ORGANISATION_PREFIX: u64 = 1337;

/// `RF00` mapped to digits (R=27, F=15) with a zero checksum placeholder
const RF_SUFFIX: u128 = 271_500;

const FINNISH_WEIGHTS: [u32; 3] = [7, 3, 1];

/// Longest payload an RF reference carries once zero-padded
const PAYLOAD_WIDTH: usize = 20;

pub const MAX_SERIES: u16 = 999;
pub const MAX_YEAR: u16 = 9999;
pub const MAX_SEQUENCE: u32 = 9999;

/// A reference number valid under both the Finnish and the RF checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceNumber {
    /// Finnish reference, check digit included
    payload: u128,
    /// ISO 11649 mod-97 check digits
    rf_check: u8,
}

impl ReferenceNumber {
    /// Compose a reference from a series digit, a two-digit year and a running sequence
    pub fn generate(series: u16, year: u16, sequence: u32) -> LedgerResult<Self> {
        if series > MAX_SERIES {
            return Err(LedgerError::Validation(format!(
                "reference series {series} exceeds {MAX_SERIES}"
            )));
        }
        if year > MAX_YEAR {
            return Err(LedgerError::Validation(format!(
                "reference year {year} exceeds {MAX_YEAR}"
            )));
        }
        if sequence > MAX_SEQUENCE {
            return Err(LedgerError::Validation(format!(
                "reference sequence {sequence} exceeds {MAX_SEQUENCE}"
            )));
        }

        let composed = u128::from(ORGANISATION_PREFIX) * 10u128.pow(11)
            + u128::from(year) * 10u128.pow(7)
            + u128::from(sequence) * 10u128.pow(3)
            + u128::from(series);
        let payload = composed * 10 + u128::from(finnish_check_digit(composed));

        Ok(Self {
            payload,
            rf_check: rf_check_digits(payload),
        })
    }

    /// The payload on its own, a valid Finnish reference number
    pub fn finnish(&self) -> String {
        self.payload.to_string()
    }

    pub fn rf_check(&self) -> u8 {
        self.rf_check
    }

    /// `RFxx` followed by the zero-padded payload, without spaces
    pub fn compact(&self) -> String {
        format!("RF{:02}{:0width$}", self.rf_check, self.payload, width = PAYLOAD_WIDTH)
    }
}

impl fmt::Display for ReferenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let padded = format!("{:0width$}", self.payload, width = PAYLOAD_WIDTH);
        write!(f, "RF{:02}", self.rf_check)?;
        for block in padded.as_bytes().chunks(4) {
            // ASCII digits, so every block is valid UTF-8
            write!(f, " {}", String::from_utf8_lossy(block))?;
        }
        Ok(())
    }
}

impl FromStr for ReferenceNumber {
    type Err = LedgerError;

    /// Parse an RF reference, with or without grouping spaces, checking both checksums
    fn from_str(input: &str) -> LedgerResult<Self> {
        let compact: String = input
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();
        let invalid = |reason: &str| {
            LedgerError::Validation(format!("invalid reference number '{input}': {reason}"))
        };

        let rest = compact
            .strip_prefix("RF")
            .ok_or_else(|| invalid("missing RF prefix"))?;
        if rest.len() < 3 || rest.len() > 2 + PAYLOAD_WIDTH {
            return Err(invalid("wrong length"));
        }
        if !rest.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("non-digit characters"));
        }

        let (check, digits) = rest.split_at(2);
        let rf_check: u8 = check.parse().map_err(|_| invalid("bad check digits"))?;
        let payload: u128 = digits.parse().map_err(|_| invalid("bad payload"))?;

        if rf_check_digits(payload) != rf_check {
            return Err(invalid("RF checksum mismatch"));
        }
        if !is_valid_finnish(payload) {
            return Err(invalid("Finnish checksum mismatch"));
        }

        Ok(Self { payload, rf_check })
    }
}

/// Weighted mod-10 check digit over `base`, weights 7, 3, 1 from the least significant digit
pub fn finnish_check_digit(base: u128) -> u8 {
    let mut remaining = base;
    let mut sum: u32 = 0;
    let mut position = 0;
    while remaining > 0 {
        let digit = (remaining % 10) as u32;
        sum += digit * FINNISH_WEIGHTS[position % FINNISH_WEIGHTS.len()];
        remaining /= 10;
        position += 1;
    }
    ((10 - sum % 10) % 10) as u8
}

/// ISO 11649 check digits for a numeric payload
pub fn rf_check_digits(payload: u128) -> u8 {
    (98 - (payload * 1_000_000 + RF_SUFFIX) % 97) as u8
}

fn is_valid_finnish(payload: u128) -> bool {
    payload >= 10 && finnish_check_digit(payload / 10) as u128 == payload % 10
}

/// Validate a plain Finnish reference number (digits, optional spaces)
pub fn validate_finnish(reference: &str) -> bool {
    let digits: String = reference.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() || digits.len() > PAYLOAD_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    digits.parse::<u128>().map(is_valid_finnish).unwrap_or(false)
}

/// Whether `reference` is an RF reference whose RF and Finnish checksums both hold
pub fn validate(reference: &str) -> bool {
    reference.parse::<ReferenceNumber>().is_ok()
}

/// Reduce a reference to the key payments are matched on.
///
/// Whitespace is dropped; a valid RF reference becomes its Finnish payload and
/// numeric references lose their leading zeros. Anything else is returned
/// upper-cased as-is.
pub fn normalize_reference(reference: &str) -> String {
    let compact: String = reference
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    if let Ok(rf) = compact.parse::<ReferenceNumber>() {
        return rf.finnish();
    }
    if !compact.is_empty() && compact.bytes().all(|b| b.is_ascii_digit()) {
        let stripped = compact.trim_start_matches('0');
        return if stripped.is_empty() { "0".to_string() } else { stripped.to_string() };
    }
    compact
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        let reference = ReferenceNumber::generate(1, 24, 42).unwrap();
        assert_eq!(reference.finnish(), "1337002400420015");
        assert_eq!(reference.rf_check(), 78);
        assert_eq!(reference.to_string(), "RF78 0000 1337 0024 0042 0015");
        assert_eq!(reference.compact(), "RF7800001337002400420015");
    }

    #[test]
    fn test_range_edges() {
        assert_eq!(
            ReferenceNumber::generate(0, 0, 0).unwrap().to_string(),
            "RF73 0000 1337 0000 0000 0002"
        );
        assert_eq!(
            ReferenceNumber::generate(9, 99, 9999).unwrap().to_string(),
            "RF82 0000 1337 0099 9999 0091"
        );
        assert!(ReferenceNumber::generate(1000, 24, 1).is_err());
        assert!(ReferenceNumber::generate(1, 24, 10_000).is_err());
    }

    #[test]
    fn test_finnish_check_digit() {
        assert_eq!(finnish_check_digit(12345), 3);
        assert_eq!(finnish_check_digit(1234), 4);
        assert!(validate_finnish("123453"));
        assert!(validate_finnish("1337 0024 0042 0015"));
        assert!(!validate_finnish("123454"));
        assert!(!validate_finnish("12a453"));
    }

    #[test]
    fn test_validate_rejects_tampering() {
        assert!(validate("RF78 0000 1337 0024 0042 0015"));
        assert!(validate("rf7800001337002400420015"));
        // RF digits consistent, Finnish digit wrong
        assert!(!validate("RF51 0000 1337 0024 0042 0016"));
        assert!(!validate("RF79 0000 1337 0024 0042 0015"));
        assert!(!validate("1337002400420015"));
        assert!(!validate(""));
    }

    #[test]
    fn test_normalize_reference() {
        assert_eq!(normalize_reference("00000012345"), "12345");
        assert_eq!(normalize_reference("12345"), "12345");
        assert_eq!(normalize_reference("RF78 0000 1337 0024 0042 0015"), "1337002400420015");
        assert_eq!(normalize_reference(" 1337 0024 0042 0015 "), "1337002400420015");
        assert_eq!(normalize_reference("000"), "0");
        assert_eq!(normalize_reference("inv-7"), "INV-7");
    }
}
