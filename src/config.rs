//! Configuration for the ledger and reconciliation

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::reference::MAX_SERIES;
use crate::types::{LedgerError, LedgerResult};

/// Ledger configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Reference number issuance
    pub reference: ReferenceConfig,

    /// Bank reconciliation behaviour
    pub reconciliation: ReconciliationConfig,
}

/// Reference number configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    /// Series digit(s) placed in generated references
    pub series: u16,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self { series: 1 }
    }
}

/// Reconciliation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Registrations of one import processed concurrently
    pub max_concurrent_registrations: usize,

    /// Fail on ambiguous reference matches instead of picking the oldest open payment
    pub strict_reference_matching: bool,

    /// Credit sibling payments covering the same debts once a payment is paid
    pub auto_credit_overlapping: bool,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_registrations: 8,
            strict_reference_matching: false,
            auto_credit_overlapping: true,
        }
    }
}

impl LedgerConfig {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            LedgerError::Config(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse from TOML text
    pub fn from_toml(content: &str) -> LedgerResult<Self> {
        let config: LedgerConfig = toml::from_str(content)
            .map_err(|e| LedgerError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> LedgerResult<Self> {
        let mut config = LedgerConfig::default();

        if let Ok(series) = std::env::var("LEDGER_REFERENCE_SERIES") {
            config.reference.series = parse_var("LEDGER_REFERENCE_SERIES", &series)?;
        }

        if let Ok(limit) = std::env::var("LEDGER_MAX_CONCURRENT_REGISTRATIONS") {
            config.reconciliation.max_concurrent_registrations =
                parse_var("LEDGER_MAX_CONCURRENT_REGISTRATIONS", &limit)?;
        }

        if let Ok(strict) = std::env::var("LEDGER_STRICT_REFERENCE_MATCHING") {
            config.reconciliation.strict_reference_matching =
                parse_var("LEDGER_STRICT_REFERENCE_MATCHING", &strict)?;
        }

        if let Ok(cascade) = std::env::var("LEDGER_AUTO_CREDIT_OVERLAPPING") {
            config.reconciliation.auto_credit_overlapping =
                parse_var("LEDGER_AUTO_CREDIT_OVERLAPPING", &cascade)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> LedgerResult<()> {
        if self.reference.series > MAX_SERIES {
            return Err(LedgerError::Config(format!(
                "reference.series must be at most {}, got {}",
                MAX_SERIES, self.reference.series
            )));
        }

        if self.reconciliation.max_concurrent_registrations == 0 {
            return Err(LedgerError::Config(
                "reconciliation.max_concurrent_registrations must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> LedgerResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| LedgerError::Config(format!("{name}: {e}")))
}
