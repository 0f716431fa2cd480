//! SIE 4 export encoder
//!
//! Produces the interchange file as code page 437 bytes ("PC8"), CRLF line
//! endings. The encoder is pure: generation date, program and series come in
//! through [`SieOptions`].

use chrono::{Datelike, NaiveDate};
use codepage_437::{ToCp437, CP437_CONTROL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::ExportConfig;
use crate::ledger::chart::ChartOfAccounts;
use crate::types::*;
use crate::utils::money::format_amount;

/// Character set name of the encoded file
pub const EXPORT_CHARSET: &str = "cp437";

const LINE_END: &str = "\r\n";

/// Generation metadata written into the file header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SieOptions {
    pub program_name: String,
    pub program_version: String,
    pub generated_by: String,
    pub generated_on: NaiveDate,
    pub series: String,
}

impl SieOptions {
    pub fn from_config(config: &ExportConfig, generated_on: NaiveDate) -> Self {
        Self {
            program_name: config.program_name.clone(),
            program_version: config.program_version.clone(),
            generated_by: config.generated_by.clone(),
            generated_on,
            series: config.series.clone(),
        }
    }
}

/// A finished export, ready to be handed out as a download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub charset: &'static str,
    pub bytes: Vec<u8>,
}

/// `import_<company id>_<YYYYMMDD>.si`
pub fn export_file_name(company_id: CompanyId, generated_on: NaiveDate) -> String {
    format!("import_{}_{}.si", company_id, generated_on.format("%Y%m%d"))
}

/// Errors raised while producing the export
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("No vouchers to export")]
    NoVouchers,
    #[error("Character '{character}' on line {line} cannot be written in code page 437")]
    Unrepresentable { character: char, line: usize },
}

pub struct SieEncoder {
    options: SieOptions,
}

impl SieEncoder {
    pub fn new(options: SieOptions) -> Self {
        Self { options }
    }

    /// Render the file as text, vouchers in (date, id) order
    pub fn render(
        &self,
        company: &Company,
        vouchers: &[Voucher],
        chart: &ChartOfAccounts,
    ) -> Result<String, EncodingError> {
        let mut ordered: Vec<&Voucher> = vouchers.iter().collect();
        ordered.sort_by_key(|v| (v.date, v.id));
        let first = ordered.first().ok_or(EncodingError::NoVouchers)?;
        let year = first.date.year();

        let opts = &self.options;
        let mut lines = vec![
            "#FLAGGA 0".to_string(),
            format!(
                "#PROGRAM \"{}\" {}",
                quoted(&opts.program_name),
                bare(&opts.program_version)
            ),
            "#FORMAT PC8".to_string(),
            format!(
                "#GEN {} \"{}\"",
                opts.generated_on.format("%Y%m%d"),
                quoted(&opts.generated_by)
            ),
            "#SIETYP 4".to_string(),
            format!("#FNAMN \"{}\"", quoted(&company.name)),
            format!("#ORGNR {}", bare(&company.org_number)),
            format!(
                "#ADRESS \"\" \"{}\" \"{} {}\" \"\"",
                quoted(&company.street),
                quoted(&company.postal_code),
                quoted(&company.city)
            ),
            format!("#RAR 0 {}0101 {}1231", year, year),
        ];

        let codes: BTreeSet<&str> = ordered
            .iter()
            .flat_map(|v| v.entries.iter().map(|e| e.account.as_str()))
            .collect();
        for code in codes {
            if !chart.contains(code) {
                tracing::warn!(account = code, "exporting account missing from chart");
            }
            lines.push(format!("#KONTO {} \"{}\"", code, quoted(&chart.describe(code))));
        }

        let zero = bigdecimal::BigDecimal::from(0);
        for (index, voucher) in ordered.iter().enumerate() {
            lines.push(format!(
                "#VER \"{}\" {} {} \"{}\"",
                quoted(&opts.series),
                index + 1,
                voucher.date.format("%Y%m%d"),
                quoted(&voucher.reference)
            ));
            lines.push("{".to_string());
            for entry in &voucher.entries {
                let amount = entry.signed_amount();
                if amount != zero {
                    lines.push(format!("#TRANS {} {{}} {}", entry.account, format_amount(&amount)));
                }
            }
            lines.push("}".to_string());
        }

        let mut text = String::new();
        for line in lines {
            text.push_str(&line);
            text.push_str(LINE_END);
        }
        Ok(text)
    }

    /// Render and transcode to code page 437
    pub fn encode(
        &self,
        company: &Company,
        vouchers: &[Voucher],
        chart: &ChartOfAccounts,
    ) -> Result<Vec<u8>, EncodingError> {
        let text = self.render(company, vouchers, chart)?;
        to_cp437(&text)
    }
}

/// Transcode text, naming the first character code page 437 lacks
pub fn to_cp437(text: &str) -> Result<Vec<u8>, EncodingError> {
    let mut bytes = Vec::with_capacity(text.len());
    for (index, line) in text.split_inclusive('\n').enumerate() {
        match line.to_cp437(&CP437_CONTROL) {
            Ok(encoded) => bytes.extend_from_slice(&encoded),
            Err(_) => {
                let character = line
                    .chars()
                    .find(|c| c.to_string().to_cp437(&CP437_CONTROL).is_err())
                    .unwrap_or(char::REPLACEMENT_CHARACTER);
                return Err(EncodingError::Unrepresentable {
                    character,
                    line: index + 1,
                });
            }
        }
    }
    Ok(bytes)
}

/// Quoted fields stay on one line and cannot contain quotes
fn quoted(text: &str) -> String {
    text.chars()
        .filter(|c| *c != '"')
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Unquoted fields are single tokens
fn bare(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !c.is_control() && *c != '"')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn company() -> Company {
        Company {
            id: 7,
            name: "Bygg & Måleri \"AB\"".to_string(),
            org_number: "556677-8899".to_string(),
            street: "Storgatan 1".to_string(),
            postal_code: "211 20".to_string(),
            city: "Malmö".to_string(),
        }
    }

    fn options() -> SieOptions {
        SieOptions {
            program_name: "bookkeeping-core".to_string(),
            program_version: "1.0".to_string(),
            generated_by: "Admin".to_string(),
            generated_on: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            series: "B".to_string(),
        }
    }

    fn voucher(id: VoucherId, day: u32, reference: &str, entries: Vec<LedgerEntry>) -> Voucher {
        let mut voucher = Voucher::new(
            id,
            7,
            NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            reference.to_string(),
            BigDecimal::from(0),
            VoucherStatus::Processed,
        );
        voucher.set_entries(entries);
        voucher
    }

    fn sale(id: VoucherId, day: u32) -> Voucher {
        voucher(
            id,
            day,
            "Kund \"Ett\"",
            vec![
                LedgerEntry::debit("1930", BigDecimal::from(100)),
                LedgerEntry::credit("3041", BigDecimal::from(100)),
                LedgerEntry::debit("6570", BigDecimal::from(0)),
            ],
        )
    }

    fn chart() -> ChartOfAccounts {
        ChartOfAccounts::from_accounts(vec![
            Account::new("1930", "Bank"),
            Account::new("3041", "Sales"),
        ])
    }

    #[test]
    fn test_render_lines() {
        let encoder = SieEncoder::new(options());
        let text = encoder.render(&company(), &[sale(1, 5)], &chart()).unwrap();
        let lines: Vec<&str> = text.split("\r\n").collect();

        assert_eq!(
            lines,
            vec![
                "#FLAGGA 0",
                "#PROGRAM \"bookkeeping-core\" 1.0",
                "#FORMAT PC8",
                "#GEN 20241231 \"Admin\"",
                "#SIETYP 4",
                "#FNAMN \"Bygg & Måleri AB\"",
                "#ORGNR 556677-8899",
                "#ADRESS \"\" \"Storgatan 1\" \"211 20 Malmö\" \"\"",
                "#RAR 0 20240101 20241231",
                "#KONTO 1930 \"Bank\"",
                "#KONTO 3041 \"Sales\"",
                "#KONTO 6570 \"Unknown account 6570\"",
                "#VER \"B\" 1 20240305 \"Kund Ett\"",
                "{",
                "#TRANS 1930 {} 100.00",
                "#TRANS 3041 {} -100.00",
                "}",
                "",
            ]
        );
    }

    #[test]
    fn test_vouchers_are_numbered_by_date_then_id() {
        let encoder = SieEncoder::new(options());
        let late = voucher(
            1,
            20,
            "Late",
            vec![
                LedgerEntry::debit("1930", BigDecimal::from(5)),
                LedgerEntry::credit("3041", BigDecimal::from(5)),
            ],
        );
        let early_b = voucher(3, 2, "Early B", late.entries.clone());
        let early_a = voucher(2, 2, "Early A", late.entries.clone());

        let text = encoder
            .render(&company(), &[late, early_b, early_a], &chart())
            .unwrap();
        let vers: Vec<&str> = text.lines().filter(|l| l.starts_with("#VER")).collect();
        assert_eq!(
            vers,
            vec![
                "#VER \"B\" 1 20240302 \"Early A\"",
                "#VER \"B\" 2 20240302 \"Early B\"",
                "#VER \"B\" 3 20240320 \"Late\"",
            ]
        );
    }

    #[test]
    fn test_encoding_is_deterministic_and_order_independent() {
        let encoder = SieEncoder::new(options());
        let a = sale(1, 5);
        let b = voucher(
            2,
            6,
            "Hyra",
            vec![
                LedgerEntry::debit("6991", BigDecimal::from(50)),
                LedgerEntry::credit("1930", BigDecimal::from(50)),
            ],
        );
        let first = encoder.encode(&company(), &[a.clone(), b.clone()], &chart()).unwrap();
        let second = encoder.encode(&company(), &[b, a], &chart()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_swedish_letters_use_pc8_bytes() {
        let bytes = to_cp437("Malmö Åre ä\r\n").unwrap();
        assert_eq!(bytes, b"Malm\x94 \x8fre \x84\r\n".to_vec());
    }

    #[test]
    fn test_unrepresentable_character_is_reported() {
        let encoder = SieEncoder::new(options());
        let euro = voucher(1, 5, "Avgift 5 €", sale(1, 5).entries);
        let err = encoder.encode(&company(), &[euro], &chart()).unwrap_err();
        assert_eq!(
            err,
            EncodingError::Unrepresentable {
                character: '€',
                line: 13,
            }
        );
    }

    #[test]
    fn test_line_breaks_in_fields_stay_on_one_line() {
        let encoder = SieEncoder::new(options());
        let forged = voucher(
            1,
            5,
            "Hyra\r\n#VER \"B\" 99 20240101 \"fake\"",
            sale(1, 5).entries,
        );
        let mut company = company();
        company.org_number = "556677-8899\r\n#FLAGGA 1".to_string();

        let text = encoder.render(&company, &[forged], &chart()).unwrap();
        let vers: Vec<&str> = text.lines().filter(|l| l.starts_with("#VER")).collect();
        assert_eq!(vers, vec!["#VER \"B\" 1 20240305 \"Hyra  #VER B 99 20240101 fake\""]);
        assert!(text.lines().any(|l| l == "#ORGNR 556677-8899#FLAGGA1"));
        assert_eq!(text.matches("#FLAGGA").count(), 2);
        assert_eq!(text.matches('\n').count(), text.matches("\r\n").count());
    }

    #[test]
    fn test_no_vouchers() {
        let encoder = SieEncoder::new(options());
        assert_eq!(
            encoder.encode(&company(), &[], &chart()),
            Err(EncodingError::NoVouchers)
        );
    }

    #[test]
    fn test_file_name() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 9).unwrap();
        assert_eq!(export_file_name(12, date), "import_12_20250109.si");
    }
}
