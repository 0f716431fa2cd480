//! Validation utilities

use bigdecimal::BigDecimal;

use crate::ledger::chart::ChartOfAccounts;
use crate::ledger::validator;
use crate::traits::*;
use crate::types::*;

/// Validate that an amount is not negative
pub fn validate_non_negative_amount(amount: &BigDecimal) -> LedgerResult<()> {
    if *amount < BigDecimal::from(0) {
        Err(LedgerError::Validation(format!(
            "Amount cannot be negative: {}",
            amount
        )))
    } else {
        Ok(())
    }
}

/// Validate that an account code has the canonical four-digit form
pub fn validate_account_code(code: &str) -> LedgerResult<()> {
    if code.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Account code cannot be empty".to_string(),
        ));
    }

    if code.len() != 4 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(LedgerError::Validation(format!(
            "Account code '{}' must be four digits",
            code
        )));
    }

    Ok(())
}

/// Validator that also rejects negative lines, malformed codes and codes missing from the chart
pub struct StrictVoucherValidator;

impl VoucherValidator for StrictVoucherValidator {
    fn validate_entries(&self, entries: &[LedgerEntry]) -> LedgerResult<()> {
        for entry in entries {
            validate_account_code(&entry.account)?;
            validate_non_negative_amount(&entry.debit)?;
            validate_non_negative_amount(&entry.credit)?;
        }

        validator::validate(entries)?;
        Ok(())
    }

    fn validate_account_references(
        &self,
        entries: &[LedgerEntry],
        chart: &ChartOfAccounts,
    ) -> LedgerResult<()> {
        match entries.iter().find(|e| !chart.contains(&e.account)) {
            Some(entry) => Err(LedgerError::Validation(format!(
                "Account {} is not in the chart of accounts",
                entry.account
            ))),
            None => Ok(()),
        }
    }
}
