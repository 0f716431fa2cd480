//! Administration of stored categorization rules

use std::collections::BTreeMap;

use crate::ledger::unit_of_work::UnitOfWork;
use crate::rules::engine::{CategorizationRule, RuleDefinition};
use crate::traits::*;
use crate::types::*;

/// Rule manager for adding, changing and listing keyword rules
pub struct RuleManager<S: LedgerStorage> {
    storage: S,
}

impl<S: LedgerStorage> RuleManager<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Store a new keyword rule; the keyword must not be in use
    pub async fn add_rule(
        &mut self,
        keyword: &str,
        account: &str,
        definition: Option<RuleDefinition>,
    ) -> LedgerResult<CategorizationRule> {
        let (keyword, account) = Self::check_fields(keyword, account)?;
        if self.storage.find_rule(keyword).await?.is_some() {
            return Err(LedgerError::DuplicateKeyword(keyword.to_string()));
        }

        let id = self.storage.allocate_id().await?;
        let mut rule = CategorizationRule::new(id, keyword, account);
        rule.definition = definition;

        let mut work = UnitOfWork::new();
        work.put_rule(rule.clone());
        self.storage.commit(work).await?;

        tracing::info!(rule_id = id, keyword, account, "rule added");
        Ok(rule)
    }

    /// Change keyword, account and body of an existing rule
    pub async fn update_rule(
        &mut self,
        rule_id: RuleId,
        keyword: &str,
        account: &str,
        definition: Option<RuleDefinition>,
    ) -> LedgerResult<CategorizationRule> {
        let (keyword, account) = Self::check_fields(keyword, account)?;
        let mut rule = self.get_rule_required(rule_id).await?;

        if let Some(other) = self.storage.find_rule(keyword).await? {
            if other.id != rule_id {
                return Err(LedgerError::DuplicateKeyword(keyword.to_string()));
            }
        }

        rule.keyword = keyword.to_string();
        rule.account = account.to_string();
        rule.definition = definition;

        let mut work = UnitOfWork::new();
        work.put_rule(rule.clone());
        self.storage.commit(work).await?;

        tracing::info!(rule_id, keyword, account, "rule updated");
        Ok(rule)
    }

    pub async fn delete_rule(&mut self, rule_id: RuleId) -> LedgerResult<()> {
        let mut work = UnitOfWork::new();
        work.delete_rule(rule_id);
        self.storage.commit(work).await?;
        tracing::info!(rule_id, "rule deleted");
        Ok(())
    }

    pub async fn get_rule(&self, rule_id: RuleId) -> LedgerResult<Option<CategorizationRule>> {
        self.storage.get_rule(rule_id).await
    }

    pub async fn get_rule_required(&self, rule_id: RuleId) -> LedgerResult<CategorizationRule> {
        self.storage
            .get_rule(rule_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Rule", rule_id))
    }

    /// All rules sorted by keyword
    pub async fn list_rules(&self) -> LedgerResult<Vec<CategorizationRule>> {
        let mut rules = self.storage.list_rules().await?;
        rules.sort_by(|a, b| a.keyword.cmp(&b.keyword));
        Ok(rules)
    }

    /// Rules grouped by target account, accounts ascending
    pub async fn rules_by_account(&self) -> LedgerResult<BTreeMap<String, Vec<CategorizationRule>>> {
        let mut grouped: BTreeMap<String, Vec<CategorizationRule>> = BTreeMap::new();
        for rule in self.list_rules().await? {
            grouped.entry(rule.account.clone()).or_default().push(rule);
        }
        Ok(grouped)
    }

    fn check_fields<'a>(keyword: &'a str, account: &'a str) -> LedgerResult<(&'a str, &'a str)> {
        let keyword = keyword.trim();
        let account = account.trim();
        if keyword.is_empty() || account.is_empty() {
            return Err(LedgerError::Validation(
                "Rule keyword and account are required".to_string(),
            ));
        }
        Ok((keyword, account))
    }
}
