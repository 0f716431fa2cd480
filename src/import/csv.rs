//! Bank statement CSV parsing
//!
//! Two layouts are recognised:
//!
//! * the bank's own export: a one-line preamble, then a semicolon-separated
//!   header with `Bokföringsdag`, `Referens` and `Insättning/Uttag`, comma
//!   decimals and space thousands separators;
//! * a plain comma-separated `date,reference,amount` file with dot decimals
//!   and an optional header row.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::utils::money::{parse_amount, round_cents};

const DATE_COLUMN: &str = "Bokföringsdag";
const REFERENCE_COLUMN: &str = "Referens";
const AMOUNT_COLUMN: &str = "Insättning/Uttag";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementLayout {
    /// Semicolon export with preamble and named columns
    BankExport,
    /// `date,reference,amount`
    Simple,
}

/// One usable statement row
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRow {
    /// Line number in the input, 1-based
    pub line: usize,
    pub date: NaiveDate,
    pub reference: String,
    pub amount: BigDecimal,
}

/// A row that could not be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatement {
    pub layout: StatementLayout,
    pub rows: Vec<StatementRow>,
    pub skipped: Vec<RowError>,
}

/// Errors for input that is not a statement at all
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("Unrecognized statement layout")]
    UnrecognizedLayout,
    #[error("Statement header is missing column '{0}'")]
    MissingColumn(&'static str),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Decode statement bytes: UTF-8 when valid, Latin-1 otherwise. A leading BOM is dropped.
pub fn decode(raw: &[u8]) -> Cow<'_, str> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(raw.iter().map(|&b| char::from(b)).collect()),
    };
    match text {
        Cow::Borrowed(t) => Cow::Borrowed(t.strip_prefix('\u{feff}').unwrap_or(t)),
        Cow::Owned(t) => match t.strip_prefix('\u{feff}') {
            Some(rest) => Cow::Owned(rest.to_string()),
            None => Cow::Owned(t),
        },
    }
}

/// Parse a raw statement, trying the bank export layout first
pub fn parse_statement(raw: &[u8]) -> Result<ParsedStatement, FormatError> {
    let text = decode(raw);

    if let Some((preamble_lines, body)) = bank_export_body(&text) {
        return parse_bank_export(body, preamble_lines);
    }

    parse_simple(&text)
}

/// The text after the preamble when the second line is a bank export header
fn bank_export_body(text: &str) -> Option<(usize, &str)> {
    let (_, body) = text.split_once('\n')?;
    let header = body.lines().next()?;
    if header.contains(DATE_COLUMN) && header.contains(';') {
        Some((1, body))
    } else {
        None
    }
}

fn parse_bank_export(body: &str, preamble_lines: usize) -> Result<ParsedStatement, FormatError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers = reader.headers()?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or(FormatError::MissingColumn(name))
    };
    let date_col = column(DATE_COLUMN)?;
    let reference_col = column(REFERENCE_COLUMN)?;
    let amount_col = column(AMOUNT_COLUMN)?;

    let mut rows = Vec::new();
    let mut skipped = Vec::new();
    for (index, record) in reader.records().enumerate() {
        // header is line 1 of the body
        let fallback_line = preamble_lines + index + 2;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                skip(&mut skipped, line_of_error(&e, preamble_lines, fallback_line), e.to_string());
                continue;
            }
        };
        let line = line_of(&record, preamble_lines, fallback_line);

        let date = field(&record, date_col);
        if date.is_empty() {
            continue;
        }
        match build_row(line, date, field(&record, reference_col), field(&record, amount_col), true) {
            Ok(row) => rows.push(row),
            Err(reason) => skip(&mut skipped, line, reason),
        }
    }

    Ok(ParsedStatement {
        layout: StatementLayout::BankExport,
        rows,
        skipped,
    })
}

fn parse_simple(text: &str) -> Result<ParsedStatement, FormatError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    let mut skipped = Vec::new();
    let mut recognised = false;

    for (index, record) in reader.records().enumerate() {
        let fallback_line = index + 1;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                skip(&mut skipped, line_of_error(&e, 0, fallback_line), e.to_string());
                continue;
            }
        };
        let line = line_of(&record, 0, fallback_line);
        let shaped = looks_like_row(&record);

        // optional header row
        if index == 0 && record.len() >= 3 && !shaped {
            continue;
        }
        recognised |= shaped;

        let date = field(&record, 0);
        if date.is_empty() {
            continue;
        }
        if record.len() < 3 {
            skip(&mut skipped, line, format!("expected 3 columns, found {}", record.len()));
            continue;
        }
        match build_row(line, date, field(&record, 1), field(&record, 2), false) {
            Ok(row) => rows.push(row),
            Err(reason) => skip(&mut skipped, line, reason),
        }
    }

    if !recognised {
        return Err(FormatError::UnrecognizedLayout);
    }

    Ok(ParsedStatement {
        layout: StatementLayout::Simple,
        rows,
        skipped,
    })
}

/// Three columns with a readable date or amount
fn looks_like_row(record: &StringRecord) -> bool {
    record.len() >= 3
        && (NaiveDate::parse_from_str(field(record, 0), DATE_FORMAT).is_ok()
            || parse_amount(field(record, 2), false).is_some())
}

fn build_row(
    line: usize,
    date: &str,
    reference: &str,
    amount: &str,
    decimal_comma: bool,
) -> Result<StatementRow, String> {
    let date = NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|e| format!("invalid date '{}': {}", date, e))?;
    let amount = parse_amount(amount, decimal_comma)
        .ok_or_else(|| format!("invalid amount '{}'", amount))?;

    Ok(StatementRow {
        line,
        date,
        reference: reference.to_string(),
        amount: round_cents(&amount),
    })
}

fn field(record: &StringRecord, index: usize) -> &str {
    record.get(index).map(str::trim).unwrap_or("")
}

fn line_of(record: &StringRecord, offset: usize, fallback: usize) -> usize {
    record
        .position()
        .map(|p| p.line() as usize + offset)
        .unwrap_or(fallback)
}

fn line_of_error(error: &csv::Error, offset: usize, fallback: usize) -> usize {
    error
        .position()
        .map(|p| p.line() as usize + offset)
        .unwrap_or(fallback)
}

fn skip(skipped: &mut Vec<RowError>, line: usize, reason: String) {
    tracing::warn!(line, reason = %reason, "skipping statement row");
    skipped.push(RowError { line, reason });
}
