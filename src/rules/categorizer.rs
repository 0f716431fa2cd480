//! Chooses and posts entries for imported vouchers
//!
//! Selection order for one voucher:
//! 1. the stored rule whose keyword equals the trimmed reference, if it has a body;
//! 2. the suggestion provider, learning a rule from an accepted suggestion;
//! 3. a bank/contra pair where the contra account comes from the stored rule's
//!    account, the VAT keyword, the configured keyword list or, last, the
//!    holding account for the direction of the money.

use bigdecimal::BigDecimal;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::ledger::chart::ChartOfAccounts;
use crate::ledger::unit_of_work::UnitOfWork;
use crate::rules::engine::{self, CategorizationRule};
use crate::traits::*;
use crate::types::*;

/// Which step of the selection order produced the entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategorizationSource {
    /// Body of the stored rule
    Rule(RuleId),
    /// Accepted suggestion from the provider
    Suggestion,
    /// Account of a stored rule without a usable body
    RuleAccount(RuleId),
    /// Keyword found in the reference text
    Keyword,
    /// Nothing matched
    HoldingAccount,
}

/// A posted voucher and how its entries were chosen
#[derive(Debug, Clone, PartialEq)]
pub struct Categorization {
    pub voucher: Voucher,
    pub source: CategorizationSource,
}

/// Categorizes unprocessed vouchers
pub struct Categorizer<S: LedgerStorage> {
    storage: S,
    chart: Arc<ChartOfAccounts>,
    config: Arc<EngineConfig>,
    validator: Arc<dyn VoucherValidator>,
    provider: Option<Arc<dyn SuggestionProvider>>,
}

impl<S: LedgerStorage> Categorizer<S> {
    pub fn new(
        storage: S,
        chart: Arc<ChartOfAccounts>,
        config: Arc<EngineConfig>,
        validator: Arc<dyn VoucherValidator>,
    ) -> Self {
        Self {
            storage,
            chart,
            config,
            validator,
            provider: None,
        }
    }

    pub fn set_provider(&mut self, provider: Arc<dyn SuggestionProvider>) {
        self.provider = Some(provider);
    }

    /// Categorize and post one unprocessed voucher
    pub async fn categorize(&mut self, voucher_id: VoucherId) -> LedgerResult<Categorization> {
        let voucher = self
            .storage
            .get_voucher(voucher_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Voucher", voucher_id))?;

        if voucher.status != VoucherStatus::Unprocessed {
            return Err(LedgerError::Validation(format!(
                "Voucher {} is {}, only unprocessed vouchers can be categorized",
                voucher.id, voucher.status
            )));
        }

        let keyword = voucher.reference.trim().to_string();
        let known_rule = if keyword.is_empty() {
            None
        } else {
            self.storage.find_rule(&keyword).await?
        };

        if let Some(rule) = &known_rule {
            if let Some(definition) = &rule.definition {
                let applied =
                    engine::apply_with_limit(&voucher.amount, definition, &self.config.correction_limit)
                        .map_err(LedgerError::from)
                        .and_then(|entries| self.check(&entries).map(|_| entries));
                match applied {
                    Ok(entries) => {
                        tracing::debug!(voucher_id, rule_id = rule.id, "applying stored rule");
                        return self
                            .post(voucher, entries, CategorizationSource::Rule(rule.id), UnitOfWork::new())
                            .await;
                    }
                    Err(e) => {
                        tracing::warn!(voucher_id, rule_id = rule.id, error = %e, "stored rule failed");
                    }
                }
            }
        }

        if let Some(provider) = self.provider.clone() {
            let request = SuggestionRequest {
                subject: SuggestionSubject::Voucher(voucher.clone()),
                chart: self.chart.clone(),
                general_rules: self.config.general_rules.clone(),
                known_rule: known_rule.clone(),
            };
            match provider.suggest(&request).await {
                Ok(suggestion) => match self.check(&suggestion.entries) {
                    Ok(()) => {
                        let mut work = UnitOfWork::new();
                        self.learn(&mut work, &keyword, &voucher.amount, known_rule.as_ref(), &suggestion)
                            .await?;
                        return self
                            .post(voucher, suggestion.entries, CategorizationSource::Suggestion, work)
                            .await;
                    }
                    Err(e) => {
                        tracing::warn!(voucher_id, error = %e, "suggestion rejected");
                    }
                },
                Err(e) => {
                    tracing::warn!(voucher_id, error = %e, "suggestion provider failed");
                }
            }
        }

        let (contra, source) =
            fallback_account(&self.config, &voucher.reference, &voucher.amount, known_rule.as_ref());
        tracing::debug!(voucher_id, contra = %contra, ?source, "using fallback account");
        let entries = bank_entries(&self.config.bank_account, &contra, &voucher.amount);
        self.check(&entries)?;
        self.post(voucher, entries, source, UnitOfWork::new()).await
    }

    /// Categorize every unprocessed voucher of a company; each one commits on its own
    pub async fn categorize_all(
        &mut self,
        company_id: CompanyId,
    ) -> LedgerResult<BatchReport<VoucherId, Categorization>> {
        let ids: Vec<VoucherId> = self
            .storage
            .list_vouchers(company_id, Some(VoucherStatus::Unprocessed))
            .await?
            .into_iter()
            .map(|v| v.id)
            .collect();
        Ok(self.categorize_batch(&ids).await)
    }

    /// Categorize the given vouchers; failures are recorded and the batch continues
    pub async fn categorize_batch(
        &mut self,
        voucher_ids: &[VoucherId],
    ) -> BatchReport<VoucherId, Categorization> {
        let mut report = BatchReport::new();
        for &voucher_id in voucher_ids {
            let outcome = self.categorize(voucher_id).await;
            if let Err(e) = &outcome {
                tracing::warn!(voucher_id, error = %e, "categorization failed");
            }
            report.push(voucher_id, outcome);
        }
        tracing::info!(
            total = voucher_ids.len(),
            succeeded = report.succeeded(),
            "batch categorization finished"
        );
        report
    }

    fn check(&self, entries: &[LedgerEntry]) -> LedgerResult<()> {
        self.validator.validate_entries(entries)?;
        self.validator.validate_account_references(entries, &self.chart)
    }

    async fn learn(
        &mut self,
        work: &mut UnitOfWork,
        keyword: &str,
        amount: &BigDecimal,
        known_rule: Option<&CategorizationRule>,
        suggestion: &Suggestion,
    ) -> LedgerResult<()> {
        if keyword.is_empty() {
            return Ok(());
        }
        // only keep a body that books this very voucher
        let definition = suggestion.rule.clone().filter(|r| {
            !r.entries.is_empty()
                && engine::apply_with_limit(amount, r, &self.config.correction_limit)
                    .map_err(LedgerError::from)
                    .and_then(|entries| self.check(&entries))
                    .is_ok()
        });

        match known_rule {
            // a stored body that applied cleanly never reaches the provider
            Some(rule) => {
                if let Some(definition) = definition {
                    if rule.definition.as_ref() != Some(&definition) {
                        let mut updated = rule.clone();
                        updated.definition = Some(definition);
                        tracing::info!(
                            rule_id = rule.id,
                            keyword,
                            replaced = rule.definition.is_some(),
                            "rule body learned"
                        );
                        work.put_rule(updated);
                    }
                }
            }
            None => {
                let account = suggestion
                    .entries
                    .iter()
                    .map(|e| e.account.as_str())
                    .find(|account| *account != self.config.bank_account);
                if let Some(account) = account {
                    let id = self.storage.allocate_id().await?;
                    let mut rule = CategorizationRule::new(id, keyword, account);
                    rule.definition = definition;
                    tracing::info!(rule_id = id, keyword, account, "rule learned");
                    work.put_rule(rule);
                }
            }
        }
        Ok(())
    }

    async fn post(
        &mut self,
        mut voucher: Voucher,
        entries: Vec<LedgerEntry>,
        source: CategorizationSource,
        mut work: UnitOfWork,
    ) -> LedgerResult<Categorization> {
        voucher.set_entries(entries);
        voucher.set_status(VoucherStatus::Processed);
        work.put_voucher(voucher.clone());
        self.storage.commit(work).await?;

        tracing::info!(voucher_id = voucher.id, ?source, "voucher categorized");
        Ok(Categorization { voucher, source })
    }
}

/// Contra account for a voucher no rule body or suggestion covered
pub fn fallback_account(
    config: &EngineConfig,
    reference: &str,
    amount: &BigDecimal,
    known_rule: Option<&CategorizationRule>,
) -> (String, CategorizationSource) {
    if let Some(rule) = known_rule {
        if !rule.account.trim().is_empty() {
            return (rule.account.clone(), CategorizationSource::RuleAccount(rule.id));
        }
    }

    let text = reference.to_lowercase();
    if !config.vat_keyword.is_empty() && text.contains(&config.vat_keyword.to_lowercase()) {
        let account = if *amount > BigDecimal::from(0) {
            &config.output_vat_account
        } else {
            &config.input_vat_account
        };
        return (account.clone(), CategorizationSource::Keyword);
    }

    if let Some(account) = config.keyword_account(reference) {
        return (account.to_string(), CategorizationSource::Keyword);
    }

    (
        config.holding_account(amount).to_string(),
        CategorizationSource::HoldingAccount,
    )
}

/// Book a signed bank amount against one contra account
pub fn bank_entries(bank_account: &str, contra_account: &str, amount: &BigDecimal) -> Vec<LedgerEntry> {
    let value = amount.abs();
    if *amount > BigDecimal::from(0) {
        vec![
            LedgerEntry::debit(bank_account, value.clone()),
            LedgerEntry::credit(contra_account, value),
        ]
    } else {
        vec![
            LedgerEntry::credit(bank_account, value.clone()),
            LedgerEntry::debit(contra_account, value),
        ]
    }
}
