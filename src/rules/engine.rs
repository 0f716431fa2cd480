//! Turns a transaction amount and a rule definition into balanced ledger entries

use bigdecimal::BigDecimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::ledger::validator::{self, BalanceError};
use crate::rules::expr::{self, EvalContext, ExprError};
use crate::types::*;
use crate::utils::money::{cents, round_cents};

/// One line of a rule: an account and the expressions for its debit and credit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineTemplate {
    #[serde(alias = "konto", deserialize_with = "text_or_number")]
    pub account: String,
    #[serde(alias = "debet", default, deserialize_with = "text_or_number")]
    pub debit: String,
    #[serde(alias = "kredit", default, deserialize_with = "text_or_number")]
    pub credit: String,
}

impl LineTemplate {
    pub fn new(account: impl Into<String>, debit: impl Into<String>, credit: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            debit: debit.into(),
            credit: credit.into(),
        }
    }
}

/// Stored rule body: ordered line templates and an optional VAT rate in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub entries: Vec<LineTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat_rate: Option<BigDecimal>,
}

impl RuleDefinition {
    pub fn new(entries: Vec<LineTemplate>) -> Self {
        Self {
            description: None,
            entries,
            vat_rate: None,
        }
    }

    pub fn with_vat_rate(mut self, rate: BigDecimal) -> Self {
        self.vat_rate = Some(rate);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        serde_json::from_str(json).map_err(|e| RuleError::InvalidDefinition(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, RuleError> {
        serde_json::to_string(self).map_err(|e| RuleError::InvalidDefinition(e.to_string()))
    }
}

/// A keyword mapped to an account, optionally with a full rule body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizationRule {
    pub id: RuleId,
    /// Exact (trimmed) bank reference the rule applies to; unique
    pub keyword: String,
    /// Main contra account
    pub account: String,
    pub definition: Option<RuleDefinition>,
}

impl CategorizationRule {
    pub fn new(id: RuleId, keyword: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            id,
            keyword: keyword.into().trim().to_string(),
            account: account.into(),
            definition: None,
        }
    }

    pub fn with_definition(mut self, definition: RuleDefinition) -> Self {
        self.definition = Some(definition);
        self
    }
}

/// Largest imbalance that is corrected automatically
pub fn default_correction_limit() -> BigDecimal {
    cents(5)
}

/// Apply a rule to a signed amount with the default correction limit
pub fn apply(amount: &BigDecimal, rule: &RuleDefinition) -> Result<Vec<LedgerEntry>, RuleError> {
    apply_with_limit(amount, rule, &default_correction_limit())
}

/// Apply a rule, correcting rounding imbalances up to `correction_limit`
pub fn apply_with_limit(
    amount: &BigDecimal,
    rule: &RuleDefinition,
    correction_limit: &BigDecimal,
) -> Result<Vec<LedgerEntry>, RuleError> {
    if rule.entries.is_empty() {
        return Err(RuleError::NoEntries);
    }

    let ctx = EvalContext::new(amount, rule.vat_rate.as_ref())
        .map_err(|e| RuleError::InvalidDefinition(e.to_string()))?;

    let mut entries = Vec::with_capacity(rule.entries.len());
    for (index, template) in rule.entries.iter().enumerate() {
        let line = index + 1;
        let account = template.account.trim();
        if account.is_empty() {
            return Err(RuleError::InvalidDefinition(format!(
                "line {} has no account",
                line
            )));
        }

        let debit = evaluate_line(line, account, &template.debit, &ctx)?;
        let credit = evaluate_line(line, account, &template.credit, &ctx)?;
        entries.push(LedgerEntry::new(account, debit, credit));
    }

    correct_rounding(&mut entries, correction_limit);

    validator::validate(&entries).map_err(
        |BalanceError {
             debit_total,
             credit_total,
         }| RuleError::Imbalance {
            debit_total,
            credit_total,
        },
    )?;

    Ok(entries)
}

fn evaluate_line(
    line: usize,
    account: &str,
    expression: &str,
    ctx: &EvalContext,
) -> Result<BigDecimal, RuleError> {
    let value = expr::evaluate(expression, ctx)
        .map_err(|source| RuleError::Expression { line, source })?;
    let value = round_cents(&value);
    if value < BigDecimal::from(0) {
        return Err(RuleError::NegativeAmount {
            line,
            account: account.to_string(),
            amount: value,
        });
    }
    Ok(value)
}

/// Take a small difference off the largest line on the heavier side
fn correct_rounding(entries: &mut [LedgerEntry], limit: &BigDecimal) {
    let (debit_total, credit_total) = validator::totals(entries);
    let difference = &debit_total - &credit_total;
    let zero = BigDecimal::from(0);
    if difference == zero || difference.abs() > *limit {
        return;
    }

    let debit_side = difference > zero;
    let side = |entry: &LedgerEntry| -> BigDecimal {
        if debit_side {
            entry.debit.clone()
        } else {
            entry.credit.clone()
        }
    };

    let mut largest: Option<(usize, BigDecimal)> = None;
    for (index, entry) in entries.iter().enumerate() {
        let value = side(entry);
        if largest.as_ref().map_or(true, |(_, max)| value > *max) {
            largest = Some((index, value));
        }
    }

    if let Some((index, _)) = largest {
        let entry = &mut entries[index];
        if debit_side {
            entry.debit -= &difference;
        } else {
            entry.credit += &difference;
        }
    }
}

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) => Ok(text),
        serde_json::Value::Number(number) => Ok(number.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or a number, got {}",
            other
        ))),
    }
}

/// Errors raised while applying a rule
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error("Rule has no entries")]
    NoEntries,
    #[error("Invalid rule definition: {0}")]
    InvalidDefinition(String),
    #[error("Rule expression on line {line} failed: {source}")]
    Expression { line: usize, source: ExprError },
    #[error("Rule line {line} ({account}) evaluated to a negative amount {amount}")]
    NegativeAmount {
        line: usize,
        account: String,
        amount: BigDecimal,
    },
    #[error("Rule produced an unbalanced voucher: debit total {debit_total}, credit total {credit_total}")]
    Imbalance {
        debit_total: BigDecimal,
        credit_total: BigDecimal,
    },
}
