//! Engine configuration
//!
//! Every field has a default, so an empty configuration gives the behaviour of
//! the standard chart. Values can be layered from an optional `bookkeeping`
//! file (any format the `config` crate understands) and `BOOKKEEPING_*`
//! environment variables, e.g. `BOOKKEEPING_INBOUND_HOLDING_ACCOUNT=2893`.

use bigdecimal::BigDecimal;
use config::{Config as Cfg, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::rules::engine::default_correction_limit;
use crate::types::*;

/// How a match larger than the open amount is handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverMatchPolicy {
    /// Fail with `LedgerError::OverMatch`
    #[default]
    Reject,
    /// Reduce the match to the smaller open amount
    Clamp,
    /// Store the match as requested
    Permit,
}

/// A bank text keyword and the account it books to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordAccount {
    pub keyword: String,
    pub account: String,
}

impl KeywordAccount {
    pub fn new(keyword: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            account: account.into(),
        }
    }
}

/// Settings written into the export header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub program_name: String,
    pub program_version: String,
    /// Signature in the `#GEN` line
    pub generated_by: String,
    /// Voucher series in `#VER` lines
    pub series: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            program_name: "bookkeeping-core".to_string(),
            program_version: env!("CARGO_PKG_VERSION").to_string(),
            generated_by: "Admin".to_string(),
            series: "B".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// The company bank account every statement row is booked against
    pub bank_account: String,
    /// Fallback contra account for unrecognised money in
    pub inbound_holding_account: String,
    /// Fallback contra account for unrecognised money out
    pub outbound_holding_account: String,
    pub vat_keyword: String,
    pub output_vat_account: String,
    pub input_vat_account: String,
    /// Checked in order; the first keyword found in the reference wins
    pub keyword_accounts: Vec<KeywordAccount>,
    pub correction_limit: BigDecimal,
    pub over_match_policy: OverMatchPolicy,
    /// Free-text bookkeeping guidance passed to the suggestion provider
    pub general_rules: String,
    pub export: ExportConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bank_account: "1930".to_string(),
            inbound_holding_account: "1798".to_string(),
            outbound_holding_account: "1799".to_string(),
            vat_keyword: "moms".to_string(),
            output_vat_account: "2611".to_string(),
            input_vat_account: "2641".to_string(),
            keyword_accounts: default_keyword_accounts(),
            correction_limit: default_correction_limit(),
            over_match_policy: OverMatchPolicy::default(),
            general_rules: String::new(),
            export: ExportConfig::default(),
        }
    }
}

fn default_keyword_accounts() -> Vec<KeywordAccount> {
    [
        ("xl-bygg", "4010"),
        ("jbm", "4010"),
        ("skatteverket", "1630"),
        ("lån", "1680"),
        ("bankkostnad", "6570"),
        ("bankkostnader", "6570"),
        ("utlägg", "2893"),
        ("lön", "1613"),
        ("avräkning", "2893"),
        ("avr", "2893"),
        ("bankavgift", "6570"),
        ("banktjänst", "6570"),
        ("leverantör", "2440"),
        ("försäljning", "3041"),
        ("hyra", "6991"),
        ("drivmedel", "5611"),
        ("okq8", "5611"),
        ("ingo", "5611"),
    ]
    .into_iter()
    .map(|(keyword, account)| KeywordAccount::new(keyword, account))
    .collect()
}

impl EngineConfig {
    /// Load from an optional `bookkeeping.*` file in the working directory and the environment
    pub fn load() -> LedgerResult<Self> {
        let config = Cfg::builder()
            .add_source(File::with_name("bookkeeping").required(false))
            .add_source(
                Environment::with_prefix("BOOKKEEPING")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load from a specific file, without environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let config = Cfg::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Account for the first configured keyword contained in `text`, case-insensitive
    pub fn keyword_account(&self, text: &str) -> Option<&str> {
        let text = text.to_lowercase();
        self.keyword_accounts
            .iter()
            .find(|k| !k.keyword.is_empty() && text.contains(&k.keyword.to_lowercase()))
            .map(|k| k.account.as_str())
    }

    /// Holding account for an amount that no rule recognised
    pub fn holding_account(&self, amount: &BigDecimal) -> &str {
        if *amount > BigDecimal::from(0) {
            &self.inbound_holding_account
        } else {
            &self.outbound_holding_account
        }
    }
}
