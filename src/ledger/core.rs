//! Main ledger orchestrator that coordinates import, categorization, matching and export

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::export::{export_file_name, ExportArtifact, SieEncoder, SieOptions, EXPORT_CHARSET};
use crate::import::{IngestReport, StatementImporter};
use crate::ledger::chart::ChartOfAccounts;
use crate::ledger::invoice::InvoiceManager;
use crate::ledger::receipt::ReceiptManager;
use crate::ledger::unit_of_work::UnitOfWork;
use crate::ledger::validator;
use crate::ledger::voucher::{VoucherInput, VoucherManager};
use crate::reconciliation::{MatchRequest, ReconciliationEngine, Settleable, Unsettled};
use crate::rules::{Categorization, CategorizationRule, Categorizer, RuleDefinition, RuleManager};
use crate::tax::vat::{VatPeriod, VatReport};
use crate::traits::*;
use crate::types::*;

/// Main ledger system that orchestrates all bookkeeping operations
pub struct Ledger<S: LedgerStorage> {
    storage: S,
    chart: Arc<ChartOfAccounts>,
    config: Arc<EngineConfig>,
    importer: StatementImporter<S>,
    categorizer: Categorizer<S>,
    rule_manager: RuleManager<S>,
    voucher_manager: VoucherManager<S>,
    receipt_manager: ReceiptManager<S>,
    invoice_manager: InvoiceManager<S>,
    reconciliation: ReconciliationEngine<S>,
}

impl<S: LedgerStorage + Clone> Ledger<S> {
    /// Create a new ledger with the given storage backend, chart and configuration
    pub fn new(storage: S, chart: ChartOfAccounts, config: EngineConfig) -> Self {
        Self::with_validator(storage, chart, config, Arc::new(DefaultVoucherValidator))
    }

    /// Create a new ledger with a custom voucher validator
    pub fn with_validator(
        storage: S,
        chart: ChartOfAccounts,
        config: EngineConfig,
        validator: Arc<dyn VoucherValidator>,
    ) -> Self {
        let chart = Arc::new(chart);
        let config = Arc::new(config);
        Self {
            importer: StatementImporter::new(storage.clone()),
            categorizer: Categorizer::new(
                storage.clone(),
                chart.clone(),
                config.clone(),
                validator.clone(),
            ),
            rule_manager: RuleManager::new(storage.clone()),
            voucher_manager: VoucherManager::new(storage.clone(), chart.clone(), validator.clone()),
            receipt_manager: ReceiptManager::new(
                storage.clone(),
                chart.clone(),
                config.clone(),
                validator.clone(),
            ),
            invoice_manager: InvoiceManager::new(storage.clone(), chart.clone(), config.clone(), validator),
            reconciliation: ReconciliationEngine::new(storage.clone(), config.over_match_policy),
            storage,
            chart,
            config,
        }
    }

    /// Use a suggestion provider for vouchers and invoices no rule covers
    pub fn set_suggestion_provider(&mut self, provider: Arc<dyn SuggestionProvider>) {
        self.categorizer.set_provider(provider.clone());
        self.invoice_manager.set_provider(provider);
    }

    pub fn set_invoicing_service(&mut self, service: Arc<dyn InvoicingService>) {
        self.invoice_manager.set_invoicing_service(service);
    }

    pub fn set_attachment_store(&mut self, store: Arc<dyn AttachmentStore>) {
        self.receipt_manager.set_attachment_store(store);
    }

    pub fn chart(&self) -> &ChartOfAccounts {
        &self.chart
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // Company operations
    /// Register a company; the id is assigned by storage
    pub async fn add_company(&mut self, mut company: Company) -> LedgerResult<Company> {
        if company.name.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Company name cannot be empty".to_string(),
            ));
        }
        company.id = self.storage.allocate_id().await?;

        let mut work = UnitOfWork::new();
        work.put_company(company.clone());
        self.storage.commit(work).await?;

        tracing::info!(company_id = company.id, name = %company.name, "company added");
        Ok(company)
    }

    pub async fn get_company(&self, company_id: CompanyId) -> LedgerResult<Option<Company>> {
        self.storage.get_company(company_id).await
    }

    // Import operations
    /// Import a bank statement file
    #[tracing::instrument(skip(self, raw), fields(bytes = raw.len()))]
    pub async fn ingest(&mut self, raw: &[u8], company_id: CompanyId) -> LedgerResult<IngestReport> {
        self.importer.ingest(raw, company_id).await
    }

    pub async fn approve_duplicate(&mut self, voucher_id: VoucherId) -> LedgerResult<Voucher> {
        self.importer.approve_duplicate(voucher_id).await
    }

    pub async fn reject_duplicate(&mut self, voucher_id: VoucherId) -> LedgerResult<()> {
        self.importer.reject_duplicate(voucher_id).await
    }

    // Categorization operations
    #[tracing::instrument(skip(self))]
    pub async fn categorize(&mut self, voucher_id: VoucherId) -> LedgerResult<Categorization> {
        self.categorizer.categorize(voucher_id).await
    }

    /// Categorize every unprocessed voucher of a company
    #[tracing::instrument(skip(self))]
    pub async fn categorize_all(
        &mut self,
        company_id: CompanyId,
    ) -> LedgerResult<BatchReport<VoucherId, Categorization>> {
        self.categorizer.categorize_all(company_id).await
    }

    #[tracing::instrument(skip(self, voucher_ids), fields(count = voucher_ids.len()))]
    pub async fn categorize_batch(
        &mut self,
        voucher_ids: &[VoucherId],
    ) -> BatchReport<VoucherId, Categorization> {
        self.categorizer.categorize_batch(voucher_ids).await
    }

    // Rule operations
    pub async fn add_rule(
        &mut self,
        keyword: &str,
        account: &str,
        definition: Option<RuleDefinition>,
    ) -> LedgerResult<CategorizationRule> {
        self.rule_manager.add_rule(keyword, account, definition).await
    }

    pub async fn update_rule(
        &mut self,
        rule_id: RuleId,
        keyword: &str,
        account: &str,
        definition: Option<RuleDefinition>,
    ) -> LedgerResult<CategorizationRule> {
        self.rule_manager
            .update_rule(rule_id, keyword, account, definition)
            .await
    }

    pub async fn delete_rule(&mut self, rule_id: RuleId) -> LedgerResult<()> {
        self.rule_manager.delete_rule(rule_id).await
    }

    pub async fn get_rule(&self, rule_id: RuleId) -> LedgerResult<Option<CategorizationRule>> {
        self.rule_manager.get_rule(rule_id).await
    }

    pub async fn list_rules(&self) -> LedgerResult<Vec<CategorizationRule>> {
        self.rule_manager.list_rules().await
    }

    pub async fn rules_by_account(&self) -> LedgerResult<BTreeMap<String, Vec<CategorizationRule>>> {
        self.rule_manager.rules_by_account().await
    }

    // Voucher operations
    #[tracing::instrument(skip(self, input), fields(reference = %input.reference))]
    pub async fn create_voucher(
        &mut self,
        company_id: CompanyId,
        input: VoucherInput,
    ) -> LedgerResult<Voucher> {
        self.voucher_manager.create_voucher(company_id, input).await
    }

    #[tracing::instrument(skip(self, input))]
    pub async fn update_voucher(
        &mut self,
        voucher_id: VoucherId,
        input: VoucherInput,
    ) -> LedgerResult<Voucher> {
        self.voucher_manager.update_voucher(voucher_id, input).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_voucher(&mut self, voucher_id: VoucherId) -> LedgerResult<()> {
        self.voucher_manager.delete_voucher(voucher_id).await
    }

    pub async fn get_voucher(&self, voucher_id: VoucherId) -> LedgerResult<Option<Voucher>> {
        self.voucher_manager.get_voucher(voucher_id).await
    }

    /// Unprocessed and pending duplicate vouchers, newest first
    pub async fn inbox(&self, company_id: CompanyId) -> LedgerResult<Vec<Voucher>> {
        self.voucher_manager.inbox(company_id).await
    }

    pub async fn posted_vouchers(&self, company_id: CompanyId) -> LedgerResult<Vec<Voucher>> {
        self.voucher_manager.posted_vouchers(company_id).await
    }

    // Receipt operations
    #[tracing::instrument(skip(self, bytes, fields), fields(size = bytes.len()))]
    pub async fn add_receipt(
        &mut self,
        company_id: CompanyId,
        file_name: &str,
        bytes: &[u8],
        fields: ReceiptFields,
    ) -> LedgerResult<Receipt> {
        self.receipt_manager
            .add_receipt(company_id, file_name, bytes, fields)
            .await
    }

    pub async fn update_receipt_fields(
        &mut self,
        receipt_id: ReceiptId,
        fields: ReceiptFields,
    ) -> LedgerResult<Receipt> {
        self.receipt_manager
            .update_receipt_fields(receipt_id, fields)
            .await
    }

    #[tracing::instrument(skip(self, entries))]
    pub async fn post_receipt(
        &mut self,
        receipt_id: ReceiptId,
        entries: Vec<LedgerEntry>,
        fallback_date: NaiveDate,
    ) -> LedgerResult<Voucher> {
        self.receipt_manager
            .post_receipt(receipt_id, entries, fallback_date)
            .await
    }

    pub async fn delete_receipt(&mut self, receipt_id: ReceiptId) -> LedgerResult<()> {
        self.receipt_manager.delete_receipt(receipt_id).await
    }

    pub async fn get_receipt(&self, receipt_id: ReceiptId) -> LedgerResult<Option<Receipt>> {
        self.receipt_manager.get_receipt(receipt_id).await
    }

    pub async fn unassigned_receipts(&self, company_id: CompanyId) -> LedgerResult<Vec<Receipt>> {
        self.receipt_manager.unassigned_receipts(company_id).await
    }

    // Invoice operations
    pub async fn sync_client(&mut self, client: Client) -> LedgerResult<Client> {
        self.invoice_manager.sync_client(client).await
    }

    pub async fn sync_invoice(&mut self, invoice: Invoice) -> LedgerResult<Invoice> {
        self.invoice_manager.sync_invoice(invoice).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_invoice_paid(
        &mut self,
        invoice_id: InvoiceId,
        paid_on: NaiveDate,
    ) -> LedgerResult<Invoice> {
        self.invoice_manager.mark_invoice_paid(invoice_id, paid_on).await
    }

    #[tracing::instrument(skip(self, invoice_ids), fields(count = invoice_ids.len()))]
    pub async fn book_invoices_with_suggestions(
        &mut self,
        company_id: CompanyId,
        invoice_ids: &[InvoiceId],
    ) -> LedgerResult<BatchReport<InvoiceId, Voucher>> {
        self.invoice_manager
            .book_invoices_with_suggestions(company_id, invoice_ids)
            .await
    }

    pub async fn get_invoice(&self, invoice_id: InvoiceId) -> LedgerResult<Option<Invoice>> {
        self.invoice_manager.get_invoice(invoice_id).await
    }

    pub async fn list_invoices(&self, company_id: CompanyId) -> LedgerResult<Vec<Invoice>> {
        self.invoice_manager.list_invoices(company_id).await
    }

    // Reconciliation operations
    pub async fn remaining(&self, entity: Settleable) -> LedgerResult<Option<BigDecimal>> {
        self.reconciliation.remaining(entity).await
    }

    #[tracing::instrument(skip(self, amount), fields(amount = %amount))]
    pub async fn create_match(
        &mut self,
        voucher_id: VoucherId,
        target: MatchTarget,
        amount: BigDecimal,
    ) -> LedgerResult<Match> {
        self.reconciliation.create_match(voucher_id, target, amount).await
    }

    #[tracing::instrument(skip(self, requests), fields(count = requests.len()))]
    pub async fn create_matches(&mut self, requests: Vec<MatchRequest>) -> LedgerResult<Vec<Match>> {
        self.reconciliation.create_matches(requests).await
    }

    pub async fn delete_match(&mut self, match_id: MatchId) -> LedgerResult<()> {
        self.reconciliation.delete_match(match_id).await
    }

    pub async fn matches_for_voucher(&self, voucher_id: VoucherId) -> LedgerResult<Vec<Match>> {
        self.reconciliation.matches_for_voucher(voucher_id).await
    }

    pub async fn unsettled_vouchers(&self, company_id: CompanyId) -> LedgerResult<Vec<Unsettled<Voucher>>> {
        self.reconciliation.unsettled_vouchers(company_id).await
    }

    pub async fn unsettled_invoices(&self, company_id: CompanyId) -> LedgerResult<Vec<Unsettled<Invoice>>> {
        self.reconciliation.unsettled_invoices(company_id).await
    }

    pub async fn unsettled_receipts(&self, company_id: CompanyId) -> LedgerResult<Vec<Unsettled<Receipt>>> {
        self.reconciliation.unsettled_receipts(company_id).await
    }

    // Export and reporting operations
    /// Export every posted voucher of a company as an interchange file
    #[tracing::instrument(skip(self))]
    pub async fn export_company(
        &self,
        company_id: CompanyId,
        generated_on: NaiveDate,
    ) -> LedgerResult<ExportArtifact> {
        let company = self
            .storage
            .get_company(company_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Company", company_id))?;
        let vouchers = self.posted_vouchers(company_id).await?;

        let encoder = SieEncoder::new(SieOptions::from_config(&self.config.export, generated_on));
        let bytes = encoder.encode(&company, &vouchers, &self.chart)?;

        let artifact = ExportArtifact {
            file_name: export_file_name(company_id, generated_on),
            charset: EXPORT_CHARSET,
            bytes,
        };
        tracing::info!(
            company_id,
            vouchers = vouchers.len(),
            size = artifact.bytes.len(),
            file = %artifact.file_name,
            "ledger exported"
        );
        Ok(artifact)
    }

    /// VAT return totals for a company and period
    pub async fn vat_report(&self, company_id: CompanyId, period: VatPeriod) -> LedgerResult<VatReport> {
        let vouchers = self.posted_vouchers(company_id).await?;
        Ok(VatReport::from_vouchers(period, &vouchers))
    }

    /// Validate the integrity of a company's books
    pub async fn validate_integrity(&self, company_id: CompanyId) -> LedgerResult<LedgerIntegrityReport> {
        let vouchers = self.posted_vouchers(company_id).await?;

        let mut issues = Vec::new();
        let mut unbalanced_vouchers = Vec::new();
        let mut unknown_accounts = BTreeSet::new();
        let mut total_debits = BigDecimal::from(0);
        let mut total_credits = BigDecimal::from(0);

        for voucher in &vouchers {
            if let Err(e) = validator::validate(&voucher.entries) {
                issues.push(format!("Voucher {} ({}): {}", voucher.id, voucher.date, e));
                unbalanced_vouchers.push(voucher.id);
            }
            for entry in &voucher.entries {
                if !self.chart.contains(&entry.account) {
                    unknown_accounts.insert(entry.account.clone());
                }
            }
            total_debits += voucher.total_debits();
            total_credits += voucher.total_credits();
        }

        for code in &unknown_accounts {
            issues.push(format!("Account {} is not in the chart of accounts", code));
        }

        if !issues.is_empty() {
            tracing::warn!(company_id, issues = issues.len(), "integrity check found issues");
        }

        Ok(LedgerIntegrityReport {
            company_id,
            is_valid: issues.is_empty(),
            issues,
            unbalanced_vouchers,
            unknown_accounts: unknown_accounts.into_iter().collect(),
            total_debits,
            total_credits,
        })
    }
}

/// Report on ledger integrity and validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerIntegrityReport {
    pub company_id: CompanyId,
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub unbalanced_vouchers: Vec<VoucherId>,
    /// Referenced codes missing from the chart, ascending
    pub unknown_accounts: Vec<String>,
    pub total_debits: BigDecimal,
    pub total_credits: BigDecimal,
}
