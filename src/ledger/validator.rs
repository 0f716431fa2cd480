//! Double-entry balance check applied before any voucher is stored

use bigdecimal::BigDecimal;

use crate::types::LedgerEntry;
use crate::utils::money::cents;

/// Debit and credit totals of a voucher that does not balance
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Voucher does not balance: debit total {debit_total}, credit total {credit_total}")]
pub struct BalanceError {
    pub debit_total: BigDecimal,
    pub credit_total: BigDecimal,
}

/// Largest accepted difference between debit and credit totals
pub fn balance_tolerance() -> BigDecimal {
    cents(1)
}

/// Sum debit and credit columns
pub fn totals(entries: &[LedgerEntry]) -> (BigDecimal, BigDecimal) {
    let debit_total: BigDecimal = entries.iter().map(|e| &e.debit).sum();
    let credit_total: BigDecimal = entries.iter().map(|e| &e.credit).sum();
    (debit_total, credit_total)
}

/// Check that the entries balance within one cent and are not all zero
pub fn validate(entries: &[LedgerEntry]) -> Result<(), BalanceError> {
    let (debit_total, credit_total) = totals(entries);
    let difference = (&debit_total - &credit_total).abs();

    if difference > balance_tolerance() || debit_total <= BigDecimal::from(0) {
        return Err(BalanceError {
            debit_total,
            credit_total,
        });
    }

    Ok(())
}
