//! Chart of accounts: the fixed catalogue of account codes and descriptions

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::types::*;

/// Immutable lookup of account code to description
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartOfAccounts {
    accounts: BTreeMap<String, Account>,
}

impl ChartOfAccounts {
    /// Create an empty chart
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chart from accounts; later duplicates replace earlier ones
    pub fn from_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|account| (account.code.clone(), account))
                .collect(),
        }
    }

    /// Load a chart from a JSON object of `code: description` pairs
    pub fn from_json(json: &str) -> LedgerResult<Self> {
        let pairs: BTreeMap<String, String> = serde_json::from_str(json)
            .map_err(|e| LedgerError::Validation(format!("Invalid chart of accounts: {}", e)))?;
        Ok(Self::from_accounts(
            pairs
                .into_iter()
                .map(|(code, description)| Account::new(code, description)),
        ))
    }

    /// The small-business chart the engine ships with (BAS subset)
    pub fn standard() -> Self {
        Self::from_accounts(
            [
                ("1613", "Lön"),
                ("1630", "Skatteverket"),
                ("1680", "Lån"),
                ("1798", "Avvaktar (Inbetalning)"),
                ("1799", "Avvaktar (Utbetalning)"),
                ("1930", "Bankkonto"),
                ("2440", "Leverantörsskulder"),
                ("2611", "Utgående moms (25%)"),
                ("2612", "Utgående moms (12%)"),
                ("2613", "Utgående moms (6%)"),
                ("2641", "Ingående moms (25%)"),
                ("2642", "Ingående moms (12%)"),
                ("2643", "Ingående moms (6%)"),
                ("2893", "Utlägg/Avräkning"),
                ("3041", "Försäljning"),
                ("4010", "Inköp av varor och material"),
                ("5410", "Förbrukningsinventarier"),
                ("5611", "Drivmedel"),
                ("6250", "Porto"),
                ("6570", "Banktjänster/Bankkostnader"),
                ("6991", "Hyra"),
            ]
            .into_iter()
            .map(|(code, description)| Account::new(code, description)),
        )
    }

    pub fn get(&self, code: &str) -> Option<&Account> {
        self.accounts.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.accounts.contains_key(code)
    }

    /// Description of the account, or a placeholder for codes missing from the chart
    pub fn describe(&self, code: &str) -> Cow<'_, str> {
        match self.accounts.get(code) {
            Some(account) => Cow::Borrowed(account.description.as_str()),
            None => Cow::Owned(format!("Unknown account {}", code)),
        }
    }

    /// Accounts in ascending code order
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Render the chart as `code description` lines for prompts and listings
    pub fn to_text(&self) -> String {
        self.accounts
            .values()
            .map(|a| format!("{} {}", a.code, a.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
