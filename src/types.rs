//! Core types and data structures for the bookkeeping engine

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::export::EncodingError;
use crate::import::FormatError;
use crate::ledger::validator::BalanceError;
use crate::rules::RuleError;
use crate::traits::ExternalServiceError;

pub type CompanyId = u64;
pub type VoucherId = u64;
pub type InvoiceId = u64;
pub type ClientId = u64;
pub type ReceiptId = u64;
pub type MatchId = u64;
pub type RuleId = u64;

/// Entry in the chart of accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account code in canonical form, e.g. "1930"
    pub code: String,
    /// Human-readable description
    pub description: String,
}

impl Account {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }
}

/// A company keeping its books in the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    /// Organization number as registered with the tax authority
    pub org_number: String,
    pub street: String,
    pub postal_code: String,
    pub city: String,
}

/// Processing state of a voucher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherStatus {
    /// Imported from a bank statement, waiting for categorization
    Unprocessed,
    /// Imported row whose fingerprint already existed; needs an operator decision
    PendingDuplicate,
    /// Categorized and posted
    Processed,
    /// Created by hand from a receipt, not backed by a bank row
    Manual,
}

impl VoucherStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoucherStatus::Unprocessed => "unprocessed",
            VoucherStatus::PendingDuplicate => "pending_duplicate",
            VoucherStatus::Processed => "processed",
            VoucherStatus::Manual => "manual",
        }
    }

    /// Whether vouchers in this state are part of the books
    pub fn is_posted(&self) -> bool {
        matches!(self, VoucherStatus::Processed | VoucherStatus::Manual)
    }
}

impl std::fmt::Display for VoucherStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One debit or credit line of a voucher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Account code the line is booked on
    pub account: String,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
}

impl LedgerEntry {
    pub fn new(account: impl Into<String>, debit: BigDecimal, credit: BigDecimal) -> Self {
        Self {
            account: account.into(),
            debit,
            credit,
        }
    }

    /// Create a debit line
    pub fn debit(account: impl Into<String>, amount: BigDecimal) -> Self {
        Self::new(account, amount, BigDecimal::from(0))
    }

    /// Create a credit line
    pub fn credit(account: impl Into<String>, amount: BigDecimal) -> Self {
        Self::new(account, BigDecimal::from(0), amount)
    }

    /// Signed amount as written to the interchange file: debit if any, otherwise negated credit
    pub fn signed_amount(&self) -> BigDecimal {
        if self.debit > BigDecimal::from(0) {
            self.debit.clone()
        } else {
            -self.credit.clone()
        }
    }
}

/// The (date, reference, amount) triple used to recognise re-imported bank rows
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub date: NaiveDate,
    pub reference: String,
    pub amount: BigDecimal,
}

/// A dated, referenced group of ledger entries (a bookkeeping verification)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voucher {
    pub id: VoucherId,
    pub company_id: CompanyId,
    /// Posting date
    pub date: NaiveDate,
    /// Free-text reference, usually the bank row text
    pub reference: String,
    /// Signed total; positive for money in, negative for money out
    pub amount: BigDecimal,
    pub status: VoucherStatus,
    /// Lines owned by this voucher
    pub entries: Vec<LedgerEntry>,
    /// Customer invoice this voucher books, if any
    pub invoice_id: Option<InvoiceId>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Voucher {
    /// Create a new voucher without entries
    pub fn new(
        id: VoucherId,
        company_id: CompanyId,
        date: NaiveDate,
        reference: String,
        amount: BigDecimal,
        status: VoucherStatus,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            company_id,
            date,
            reference,
            amount,
            status,
            entries: Vec::new(),
            invoice_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace all entries of the voucher
    pub fn set_entries(&mut self, entries: Vec<LedgerEntry>) {
        self.entries = entries;
        self.touch();
    }

    pub fn set_status(&mut self, status: VoucherStatus) {
        self.status = status;
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().naive_utc();
    }

    /// Calculate total debits
    pub fn total_debits(&self) -> BigDecimal {
        self.entries.iter().map(|e| &e.debit).sum()
    }

    /// Calculate total credits
    pub fn total_credits(&self) -> BigDecimal {
        self.entries.iter().map(|e| &e.credit).sum()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            date: self.date,
            reference: self.reference.clone(),
            amount: self.amount.clone(),
        }
    }
}

/// Customer invoice status as reported by the invoicing service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
}

/// Customer invoice, synchronised from the external invoicing service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// Identifier in the invoicing service
    pub external_id: u64,
    pub company_id: CompanyId,
    pub client_id: ClientId,
    pub number: String,
    pub date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub paid_at: Option<NaiveDate>,
    /// Total including tax
    pub sum: BigDecimal,
    pub net: BigDecimal,
    pub tax: BigDecimal,
    pub reverse_charge: bool,
    pub status: InvoiceStatus,
    /// Voucher the invoice was booked with
    pub voucher_id: Option<VoucherId>,
}

/// Customer of a company, synchronised from the external invoicing service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub external_id: u64,
    pub company_id: CompanyId,
    pub name: String,
    pub org_number: Option<String>,
    pub street_address: Option<String>,
    pub zip_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// Whether a receipt has been booked or matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Unassigned,
    Assigned,
}

/// Fields extracted from a receipt or supplier invoice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptFields {
    pub invoice_number: Option<String>,
    pub date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    /// Payment reference
    pub ocr: Option<String>,
    pub gross_amount: Option<BigDecimal>,
    pub net_amount: Option<BigDecimal>,
    pub vat_amount: Option<BigDecimal>,
    pub suggested_account: Option<String>,
    pub vendor_name: Option<String>,
    /// First item text on the document, used for account suggestions
    pub item_text: Option<String>,
    pub reverse_charge: bool,
}

/// An uploaded supplier receipt or invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: ReceiptId,
    pub company_id: CompanyId,
    /// Name shown to the operator
    pub display_name: String,
    /// Location returned by the attachment store
    pub file_path: String,
    pub status: ReceiptStatus,
    pub fields: ReceiptFields,
    /// Voucher the receipt is attached to, if any
    pub voucher_id: Option<VoucherId>,
}

/// The document side of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTarget {
    Invoice(InvoiceId),
    Receipt(ReceiptId),
}

/// A partial-amount link between a voucher and an invoice or a receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub amount: BigDecimal,
    pub voucher_id: VoucherId,
    pub target: MatchTarget,
    pub created_at: NaiveDateTime,
}

impl Match {
    pub fn new(id: MatchId, amount: BigDecimal, voucher_id: VoucherId, target: MatchTarget) -> Self {
        Self {
            id,
            amount,
            voucher_id,
            target,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}

/// Outcome list of a batch where every item is processed independently
#[derive(Debug)]
pub struct BatchReport<K, T> {
    pub outcomes: Vec<(K, LedgerResult<T>)>,
}

impl<K, T> BatchReport<K, T> {
    pub fn new() -> Self {
        Self {
            outcomes: Vec::new(),
        }
    }

    pub fn push(&mut self, key: K, outcome: LedgerResult<T>) {
        self.outcomes.push((key, outcome));
    }

    /// Number of items that went through
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|(_, r)| r.is_ok()).count()
    }

    /// Failed items with their errors
    pub fn errors(&self) -> Vec<(&K, &LedgerError)> {
        self.outcomes
            .iter()
            .filter_map(|(k, r)| r.as_ref().err().map(|e| (k, e)))
            .collect()
    }
}

impl<K, T> Default for BatchReport<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur in the bookkeeping engine
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Balance(#[from] BalanceError),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: u64 },
    #[error("Keyword '{0}' is already mapped to an account")]
    DuplicateKeyword(String),
    #[error("Match of {requested} exceeds open amount {open}")]
    OverMatch {
        requested: BigDecimal,
        open: BigDecimal,
    },
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    ExternalService(#[from] ExternalServiceError),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl LedgerError {
    pub(crate) fn not_found(kind: &'static str, id: u64) -> Self {
        LedgerError::NotFound { kind, id }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
