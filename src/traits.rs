//! Traits for storage abstraction and the external collaborators

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ledger::chart::ChartOfAccounts;
use crate::ledger::unit_of_work::UnitOfWork;
use crate::ledger::validator;
use crate::rules::{CategorizationRule, RuleDefinition};
use crate::types::*;
use crate::utils::validation::validate_non_negative_amount;

/// Storage abstraction for the bookkeeping engine
///
/// Reads return owned snapshots. All writes go through [`LedgerStorage::commit`],
/// which applies a [`UnitOfWork`] atomically: either every operation in it is
/// applied or none is. Implementations enforce keyword uniqueness and the
/// foreign keys of matches at commit time.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// Allocate a fresh identifier for any entity
    async fn allocate_id(&mut self) -> LedgerResult<u64>;

    async fn get_company(&self, company_id: CompanyId) -> LedgerResult<Option<Company>>;

    async fn get_voucher(&self, voucher_id: VoucherId) -> LedgerResult<Option<Voucher>>;

    /// List a company's vouchers, optionally filtered by status, in id order
    async fn list_vouchers(
        &self,
        company_id: CompanyId,
        status: Option<VoucherStatus>,
    ) -> LedgerResult<Vec<Voucher>>;

    /// Insert an imported voucher, marking it `PendingDuplicate` when another
    /// voucher of the same company already has its fingerprint.
    ///
    /// The check and the insert happen under one lock.
    async fn import_voucher(&mut self, voucher: Voucher) -> LedgerResult<Voucher>;

    async fn get_rule(&self, rule_id: RuleId) -> LedgerResult<Option<CategorizationRule>>;

    /// Find the rule whose keyword equals `keyword` exactly
    async fn find_rule(&self, keyword: &str) -> LedgerResult<Option<CategorizationRule>>;

    async fn list_rules(&self) -> LedgerResult<Vec<CategorizationRule>>;

    async fn get_invoice(&self, invoice_id: InvoiceId) -> LedgerResult<Option<Invoice>>;

    async fn find_invoice_by_external_id(
        &self,
        company_id: CompanyId,
        external_id: u64,
    ) -> LedgerResult<Option<Invoice>>;

    async fn list_invoices(&self, company_id: CompanyId) -> LedgerResult<Vec<Invoice>>;

    async fn get_client(&self, client_id: ClientId) -> LedgerResult<Option<Client>>;

    async fn find_client_by_external_id(
        &self,
        company_id: CompanyId,
        external_id: u64,
    ) -> LedgerResult<Option<Client>>;

    async fn get_receipt(&self, receipt_id: ReceiptId) -> LedgerResult<Option<Receipt>>;

    async fn list_receipts(&self, company_id: CompanyId) -> LedgerResult<Vec<Receipt>>;

    async fn get_match(&self, match_id: MatchId) -> LedgerResult<Option<Match>>;

    async fn list_matches_for_voucher(&self, voucher_id: VoucherId) -> LedgerResult<Vec<Match>>;

    async fn list_matches_for_target(&self, target: MatchTarget) -> LedgerResult<Vec<Match>>;

    /// Apply every operation of the unit of work, or none of them
    async fn commit(&mut self, work: UnitOfWork) -> LedgerResult<()>;
}

/// Trait for implementing custom voucher validation rules
pub trait VoucherValidator: Send + Sync {
    /// Validate the entries of a voucher before it is stored
    fn validate_entries(&self, entries: &[LedgerEntry]) -> LedgerResult<()>;

    /// Validate that the referenced accounts are acceptable
    fn validate_account_references(
        &self,
        entries: &[LedgerEntry],
        chart: &ChartOfAccounts,
    ) -> LedgerResult<()>;
}

/// Default voucher validator: lines must be non-negative and balance, unknown accounts are tolerated
pub struct DefaultVoucherValidator;

impl VoucherValidator for DefaultVoucherValidator {
    fn validate_entries(&self, entries: &[LedgerEntry]) -> LedgerResult<()> {
        for entry in entries {
            validate_non_negative_amount(&entry.debit)?;
            validate_non_negative_amount(&entry.credit)?;
        }
        validator::validate(entries)?;
        Ok(())
    }

    fn validate_account_references(
        &self,
        _entries: &[LedgerEntry],
        _chart: &ChartOfAccounts,
    ) -> LedgerResult<()> {
        Ok(())
    }
}

/// Failure reported by an external collaborator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{service} failed: {message}")]
pub struct ExternalServiceError {
    pub service: String,
    pub message: String,
}

impl ExternalServiceError {
    pub fn new(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            message: message.into(),
        }
    }
}

/// What a suggestion is asked for
#[derive(Debug, Clone, PartialEq)]
pub enum SuggestionSubject {
    /// An uncategorized bank voucher
    Voucher(Voucher),
    /// A customer invoice to be booked
    Invoice {
        invoice: Invoice,
        client: Option<Client>,
    },
}

#[derive(Debug, Clone)]
pub struct SuggestionRequest {
    pub subject: SuggestionSubject,
    pub chart: Arc<ChartOfAccounts>,
    /// Operator-provided bookkeeping guidance
    pub general_rules: String,
    /// Existing rule for the same keyword, if any
    pub known_rule: Option<CategorizationRule>,
}

/// Proposed posting returned by a suggestion provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub entries: Vec<LedgerEntry>,
    /// General rule to remember for similar transactions
    #[serde(default)]
    pub rule: Option<RuleDefinition>,
}

/// Collaborator proposing entries for vouchers and invoices no rule covers
#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    async fn suggest(&self, request: &SuggestionRequest) -> Result<Suggestion, ExternalServiceError>;
}

/// Collaborator for the external invoicing service
#[async_trait]
pub trait InvoicingService: Send + Sync {
    /// Register a full payment of the invoice on the given date
    async fn register_payment(
        &self,
        external_id: u64,
        paid_on: NaiveDate,
    ) -> Result<(), ExternalServiceError>;
}

/// Metadata returned after a file is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub display_name: String,
    pub relative_path: String,
}

/// Collaborator that keeps uploaded receipt files
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn store(
        &self,
        file_name: &str,
        bytes: &[u8],
        company_id: CompanyId,
    ) -> Result<StoredFile, ExternalServiceError>;
}
