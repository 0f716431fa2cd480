//! VAT (moms) splitting and period reporting

use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::types::*;
use crate::utils::money::round_cents;

/// Standard Swedish VAT rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VatCategory {
    /// 25%
    Standard,
    /// 12%, food and hotels
    Reduced,
    /// 6%, books, transport and culture
    Low,
    /// 0%
    Exempt,
}

impl VatCategory {
    /// Rate in percent
    pub fn rate(&self) -> BigDecimal {
        match self {
            VatCategory::Standard => BigDecimal::from(25),
            VatCategory::Reduced => BigDecimal::from(12),
            VatCategory::Low => BigDecimal::from(6),
            VatCategory::Exempt => BigDecimal::from(0),
        }
    }

    /// Account for VAT charged on sales
    pub fn output_account(&self) -> Option<&'static str> {
        match self {
            VatCategory::Standard => Some("2611"),
            VatCategory::Reduced => Some("2612"),
            VatCategory::Low => Some("2613"),
            VatCategory::Exempt => None,
        }
    }

    /// Account for deductible VAT on purchases
    pub fn input_account(&self) -> Option<&'static str> {
        match self {
            VatCategory::Standard => Some("2641"),
            VatCategory::Reduced => Some("2642"),
            VatCategory::Low => Some("2643"),
            VatCategory::Exempt => None,
        }
    }
}

/// Net/VAT breakdown of a gross amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatSplit {
    pub gross: BigDecimal,
    pub net: BigDecimal,
    pub vat: BigDecimal,
}

impl VatSplit {
    /// Split a gross amount: `net = gross / (1 + rate / 100)`, `vat = gross - net`.
    ///
    /// Amounts are kept at full precision; callers round where they book.
    pub fn from_gross(gross: BigDecimal, rate_percent: &BigDecimal) -> Result<Self, VatError> {
        let divisor = BigDecimal::from(1) + rate_percent / BigDecimal::from(100);
        if divisor <= BigDecimal::from(0) {
            return Err(VatError::InvalidRate(rate_percent.clone()));
        }
        let net = &gross / &divisor;
        let vat = &gross - &net;
        Ok(Self { gross, net, vat })
    }

    /// Add VAT on top of a net amount
    pub fn from_net(net: BigDecimal, rate_percent: &BigDecimal) -> Result<Self, VatError> {
        if *rate_percent < BigDecimal::from(0) {
            return Err(VatError::InvalidRate(rate_percent.clone()));
        }
        let vat = &net * rate_percent / BigDecimal::from(100);
        let gross = &net + &vat;
        Ok(Self { gross, net, vat })
    }

    /// Same split rounded to two decimals, VAT taking the rounding remainder
    pub fn rounded(&self) -> Self {
        let gross = round_cents(&self.gross);
        let net = round_cents(&self.net);
        let vat = &gross - &net;
        Self { gross, net, vat }
    }
}

/// Reporting period for the VAT return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VatPeriod {
    Year(i32),
    /// Quarter 1-4
    Quarter(i32, u32),
    /// Month 1-12
    Month(i32, u32),
}

impl VatPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        match *self {
            VatPeriod::Year(year) => date.year() == year,
            VatPeriod::Quarter(year, quarter) => {
                date.year() == year && (date.month() - 1) / 3 + 1 == quarter
            }
            VatPeriod::Month(year, month) => date.year() == year && date.month() == month,
        }
    }
}

/// Totals for the periodic VAT return, computed from posted vouchers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatReport {
    pub period: VatPeriod,
    /// Sales excluding VAT (credit balance of 30xx accounts)
    pub sales_excl_vat: BigDecimal,
    pub output_vat_standard: BigDecimal,
    pub output_vat_reduced: BigDecimal,
    pub output_vat_low: BigDecimal,
    /// Deductible input VAT (debit balance of 264x accounts)
    pub input_vat: BigDecimal,
    /// Output VAT minus input VAT; negative means a refund
    pub vat_payable: BigDecimal,
}

impl VatReport {
    pub fn from_vouchers<'a>(
        period: VatPeriod,
        vouchers: impl IntoIterator<Item = &'a Voucher>,
    ) -> Self {
        let mut sales_excl_vat = BigDecimal::from(0);
        let mut output_vat_standard = BigDecimal::from(0);
        let mut output_vat_reduced = BigDecimal::from(0);
        let mut output_vat_low = BigDecimal::from(0);
        let mut input_vat = BigDecimal::from(0);

        let entries = vouchers
            .into_iter()
            .filter(|v| v.status.is_posted() && period.contains(v.date))
            .flat_map(|v| v.entries.iter());

        for entry in entries {
            let credit_net = &entry.credit - &entry.debit;
            match entry.account.as_str() {
                "2611" => output_vat_standard += credit_net,
                "2612" => output_vat_reduced += credit_net,
                "2613" => output_vat_low += credit_net,
                code if code.starts_with("264") => input_vat -= credit_net,
                code if code.starts_with("30") => sales_excl_vat += credit_net,
                _ => {}
            }
        }

        let vat_payable =
            &output_vat_standard + &output_vat_reduced + &output_vat_low - &input_vat;

        Self {
            period,
            sales_excl_vat,
            output_vat_standard,
            output_vat_reduced,
            output_vat_low,
            input_vat,
            vat_payable,
        }
    }
}

/// VAT-related errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VatError {
    #[error("Invalid VAT rate: {0}")]
    InvalidRate(BigDecimal),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_split_from_gross() {
        let split = VatSplit::from_gross(BigDecimal::from(125), &BigDecimal::from(25)).unwrap();
        assert_eq!(split.net, BigDecimal::from(100));
        assert_eq!(split.vat, BigDecimal::from(25));
    }

    #[test]
    fn test_split_from_net() {
        let split = VatSplit::from_net(BigDecimal::from(1000), &VatCategory::Reduced.rate()).unwrap();
        assert_eq!(split.vat, BigDecimal::from(120));
        assert_eq!(split.gross, BigDecimal::from(1120));
    }

    #[test]
    fn test_rounded_split_keeps_gross() {
        let split = VatSplit::from_gross(BigDecimal::from(100), &BigDecimal::from(6))
            .unwrap()
            .rounded();
        assert_eq!(split.net, BigDecimal::from_str("94.34").unwrap());
        assert_eq!(split.vat, BigDecimal::from_str("5.66").unwrap());
        assert_eq!(&split.net + &split.vat, BigDecimal::from(100));
    }

    #[test]
    fn test_invalid_rate() {
        assert!(VatSplit::from_gross(BigDecimal::from(100), &BigDecimal::from(-100)).is_err());
    }

    #[test]
    fn test_period_contains() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        assert!(VatPeriod::Year(2024).contains(date));
        assert!(VatPeriod::Quarter(2024, 2).contains(date));
        assert!(!VatPeriod::Quarter(2024, 3).contains(date));
        assert!(VatPeriod::Month(2024, 5).contains(date));
    }

    #[test]
    fn test_report_from_vouchers() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let mut sale = Voucher::new(
            1,
            1,
            date,
            "Sale".to_string(),
            BigDecimal::from(1250),
            VoucherStatus::Processed,
        );
        sale.set_entries(vec![
            LedgerEntry::debit("1930", BigDecimal::from(1250)),
            LedgerEntry::credit("3041", BigDecimal::from(1000)),
            LedgerEntry::credit("2611", BigDecimal::from(250)),
        ]);
        let mut purchase = Voucher::new(
            2,
            1,
            date,
            "Purchase".to_string(),
            BigDecimal::from(-500),
            VoucherStatus::Processed,
        );
        purchase.set_entries(vec![
            LedgerEntry::debit("4010", BigDecimal::from(400)),
            LedgerEntry::debit("2641", BigDecimal::from(100)),
            LedgerEntry::credit("1930", BigDecimal::from(500)),
        ]);
        let unposted = Voucher::new(
            3,
            1,
            date,
            "Pending".to_string(),
            BigDecimal::from(99),
            VoucherStatus::Unprocessed,
        );

        let report = VatReport::from_vouchers(VatPeriod::Year(2024), &[sale, purchase, unposted]);
        assert_eq!(report.sales_excl_vat, BigDecimal::from(1000));
        assert_eq!(report.output_vat_standard, BigDecimal::from(250));
        assert_eq!(report.input_vat, BigDecimal::from(100));
        assert_eq!(report.vat_payable, BigDecimal::from(150));
    }

    #[test]
    fn test_credit_notes_reduce_the_return() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let mut sale = Voucher::new(1, 1, date, "Sale".to_string(), BigDecimal::from(1250), VoucherStatus::Processed);
        sale.set_entries(vec![
            LedgerEntry::debit("1930", BigDecimal::from(1250)),
            LedgerEntry::credit("3041", BigDecimal::from(1000)),
            LedgerEntry::credit("2611", BigDecimal::from(250)),
        ]);
        let mut credit_note = Voucher::new(2, 1, date, "Kreditfaktura".to_string(), BigDecimal::from(-250), VoucherStatus::Manual);
        credit_note.set_entries(vec![
            LedgerEntry::debit("3041", BigDecimal::from(200)),
            LedgerEntry::debit("2611", BigDecimal::from(50)),
            LedgerEntry::credit("1930", BigDecimal::from(250)),
        ]);
        let mut returned_purchase = Voucher::new(3, 1, date, "Retur".to_string(), BigDecimal::from(125), VoucherStatus::Processed);
        returned_purchase.set_entries(vec![
            LedgerEntry::debit("1930", BigDecimal::from(125)),
            LedgerEntry::credit("4010", BigDecimal::from(100)),
            LedgerEntry::credit("2641", BigDecimal::from(25)),
        ]);

        let report = VatReport::from_vouchers(
            VatPeriod::Month(2024, 2),
            &[sale, credit_note, returned_purchase],
        );
        assert_eq!(report.sales_excl_vat, BigDecimal::from(800));
        assert_eq!(report.output_vat_standard, BigDecimal::from(200));
        assert_eq!(report.input_vat, BigDecimal::from(-25));
        assert_eq!(report.vat_payable, BigDecimal::from(225));
    }
}
