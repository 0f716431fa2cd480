//! Partial-amount matching of bank vouchers against invoices and receipts

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::OverMatchPolicy;
use crate::ledger::unit_of_work::UnitOfWork;
use crate::traits::*;
use crate::types::*;

/// Anything that can carry an open amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Settleable {
    Voucher(VoucherId),
    Invoice(InvoiceId),
    Receipt(ReceiptId),
}

impl From<MatchTarget> for Settleable {
    fn from(target: MatchTarget) -> Self {
        match target {
            MatchTarget::Invoice(id) => Settleable::Invoice(id),
            MatchTarget::Receipt(id) => Settleable::Receipt(id),
        }
    }
}

/// An entity together with its remaining amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unsettled<T> {
    pub item: T,
    pub remaining: BigDecimal,
}

/// A requested match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub voucher_id: VoucherId,
    pub target: MatchTarget,
    pub amount: BigDecimal,
}

impl MatchRequest {
    pub fn new(voucher_id: VoucherId, target: MatchTarget, amount: BigDecimal) -> Self {
        Self {
            voucher_id,
            target,
            amount,
        }
    }
}

/// Reconciliation engine linking vouchers to invoices and receipts
pub struct ReconciliationEngine<S: LedgerStorage> {
    storage: S,
    policy: OverMatchPolicy,
}

impl<S: LedgerStorage> ReconciliationEngine<S> {
    pub fn new(storage: S, policy: OverMatchPolicy) -> Self {
        Self { storage, policy }
    }

    pub fn policy(&self) -> OverMatchPolicy {
        self.policy
    }

    /// Amount still open on an entity: its own amount minus all matched amounts.
    ///
    /// Receipts without a gross amount have nothing to settle and give `None`.
    pub async fn remaining(&self, entity: Settleable) -> LedgerResult<Option<BigDecimal>> {
        match entity {
            Settleable::Voucher(id) => {
                let voucher = self.voucher(id).await?;
                let matched = self.matched(self.storage.list_matches_for_voucher(id).await?);
                Ok(Some(&voucher.amount - &matched))
            }
            Settleable::Invoice(id) => {
                let invoice = self.invoice(id).await?;
                let matched = self.matched_target(MatchTarget::Invoice(id)).await?;
                Ok(Some(&invoice.sum - &matched))
            }
            Settleable::Receipt(id) => {
                let receipt = self.receipt(id).await?;
                let matched = self.matched_target(MatchTarget::Receipt(id)).await?;
                Ok(receipt.fields.gross_amount.map(|gross| gross - matched))
            }
        }
    }

    /// Create a single match
    pub async fn create_match(
        &mut self,
        voucher_id: VoucherId,
        target: MatchTarget,
        amount: BigDecimal,
    ) -> LedgerResult<Match> {
        let mut created = self
            .create_matches(vec![MatchRequest::new(voucher_id, target, amount)])
            .await?;
        created
            .pop()
            .ok_or_else(|| LedgerError::Storage("match was not created".to_string()))
    }

    /// Create several matches in one unit of work; either all are stored or none
    pub async fn create_matches(&mut self, requests: Vec<MatchRequest>) -> LedgerResult<Vec<Match>> {
        if requests.is_empty() {
            return Err(LedgerError::Validation("No matches to create".to_string()));
        }

        let mut work = UnitOfWork::new();
        let mut pending: Vec<Match> = Vec::new();
        let mut assigned: HashMap<ReceiptId, Receipt> = HashMap::new();

        for request in requests {
            let m = self.plan(&request, &pending).await?;
            if let MatchTarget::Receipt(receipt_id) = m.target {
                if !assigned.contains_key(&receipt_id) {
                    let mut receipt = self.receipt(receipt_id).await?;
                    receipt.status = ReceiptStatus::Assigned;
                    assigned.insert(receipt_id, receipt);
                }
            }
            pending.push(m);
        }

        for m in &pending {
            work.put_match(m.clone());
        }
        for receipt in assigned.into_values() {
            work.put_receipt(receipt);
        }
        self.storage.commit(work).await?;

        for m in &pending {
            tracing::info!(match_id = m.id, voucher_id = m.voucher_id, document = ?m.target, amount = %m.amount, "match created");
        }
        Ok(pending)
    }

    /// Delete a match; a receipt left without matches and without a linked voucher is released
    pub async fn delete_match(&mut self, match_id: MatchId) -> LedgerResult<()> {
        let m = self
            .storage
            .get_match(match_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Match", match_id))?;

        let mut work = UnitOfWork::new();
        work.delete_match(match_id);

        if let MatchTarget::Receipt(receipt_id) = m.target {
            let others = self
                .storage
                .list_matches_for_target(m.target)
                .await?
                .into_iter()
                .filter(|other| other.id != match_id)
                .count();
            if others == 0 {
                let mut receipt = self.receipt(receipt_id).await?;
                if receipt.voucher_id.is_none() && receipt.status == ReceiptStatus::Assigned {
                    receipt.status = ReceiptStatus::Unassigned;
                    work.put_receipt(receipt);
                }
            }
        }

        self.storage.commit(work).await?;
        tracing::info!(match_id, "match deleted");
        Ok(())
    }

    pub async fn matches_for_voucher(&self, voucher_id: VoucherId) -> LedgerResult<Vec<Match>> {
        self.storage.list_matches_for_voucher(voucher_id).await
    }

    /// Vouchers with a positive remaining amount, by date then id
    pub async fn unsettled_vouchers(&self, company_id: CompanyId) -> LedgerResult<Vec<Unsettled<Voucher>>> {
        let mut unsettled = Vec::new();
        for voucher in self.storage.list_vouchers(company_id, None).await? {
            if voucher.status == VoucherStatus::PendingDuplicate {
                continue;
            }
            let matched = self.matched(self.storage.list_matches_for_voucher(voucher.id).await?);
            let remaining = &voucher.amount - &matched;
            if remaining > BigDecimal::from(0) {
                unsettled.push(Unsettled {
                    item: voucher,
                    remaining,
                });
            }
        }
        unsettled.sort_by(|a, b| (a.item.date, a.item.id).cmp(&(b.item.date, b.item.id)));
        Ok(unsettled)
    }

    /// Invoices with a positive remaining amount, by date then id
    pub async fn unsettled_invoices(&self, company_id: CompanyId) -> LedgerResult<Vec<Unsettled<Invoice>>> {
        let mut unsettled = Vec::new();
        for invoice in self.storage.list_invoices(company_id).await? {
            let matched = self.matched_target(MatchTarget::Invoice(invoice.id)).await?;
            let remaining = &invoice.sum - &matched;
            if remaining > BigDecimal::from(0) {
                unsettled.push(Unsettled {
                    item: invoice,
                    remaining,
                });
            }
        }
        unsettled.sort_by(|a, b| sort_key(a.item.date, a.item.id).cmp(&sort_key(b.item.date, b.item.id)));
        Ok(unsettled)
    }

    /// Receipts with a positive remaining amount, by date then id
    pub async fn unsettled_receipts(&self, company_id: CompanyId) -> LedgerResult<Vec<Unsettled<Receipt>>> {
        let mut unsettled = Vec::new();
        for receipt in self.storage.list_receipts(company_id).await? {
            let Some(gross) = receipt.fields.gross_amount.clone() else {
                continue;
            };
            let matched = self.matched_target(MatchTarget::Receipt(receipt.id)).await?;
            let remaining = gross - matched;
            if remaining > BigDecimal::from(0) {
                unsettled.push(Unsettled {
                    item: receipt,
                    remaining,
                });
            }
        }
        unsettled.sort_by(|a, b| {
            sort_key(a.item.fields.date, a.item.id).cmp(&sort_key(b.item.fields.date, b.item.id))
        });
        Ok(unsettled)
    }

    /// Validate a request against stored and not yet committed matches
    async fn plan(&mut self, request: &MatchRequest, pending: &[Match]) -> LedgerResult<Match> {
        let zero = BigDecimal::from(0);
        if request.amount <= zero {
            return Err(LedgerError::Validation(
                "Match amount must be positive".to_string(),
            ));
        }

        let voucher = self.voucher(request.voucher_id).await?;
        if voucher.status == VoucherStatus::PendingDuplicate {
            return Err(LedgerError::Validation(format!(
                "Voucher {} is a pending duplicate",
                voucher.id
            )));
        }

        let (target_company, target_total) = match request.target {
            MatchTarget::Invoice(id) => {
                let invoice = self.invoice(id).await?;
                (invoice.company_id, invoice.sum)
            }
            MatchTarget::Receipt(id) => {
                let receipt = self.receipt(id).await?;
                let gross = receipt.fields.gross_amount.ok_or_else(|| {
                    LedgerError::Validation(format!("Receipt {} has no gross amount", id))
                })?;
                (receipt.company_id, gross)
            }
        };
        if target_company != voucher.company_id {
            return Err(LedgerError::Validation(format!(
                "Voucher {} and {:?} belong to different companies",
                voucher.id, request.target
            )));
        }

        let voucher_matched = self.matched(self.storage.list_matches_for_voucher(voucher.id).await?)
            + self.matched(pending.iter().filter(|m| m.voucher_id == voucher.id).cloned());
        let target_matched = self.matched_target(request.target).await?
            + self.matched(pending.iter().filter(|m| m.target == request.target).cloned());

        let voucher_open = voucher.amount.abs() - voucher_matched;
        let target_open = target_total - target_matched;
        let open = if voucher_open < target_open {
            voucher_open
        } else {
            target_open
        };

        let amount = match self.policy {
            OverMatchPolicy::Permit => request.amount.clone(),
            OverMatchPolicy::Reject if request.amount > open => {
                return Err(LedgerError::OverMatch {
                    requested: request.amount.clone(),
                    open,
                });
            }
            OverMatchPolicy::Reject => request.amount.clone(),
            OverMatchPolicy::Clamp if open <= zero => {
                return Err(LedgerError::OverMatch {
                    requested: request.amount.clone(),
                    open,
                });
            }
            OverMatchPolicy::Clamp if request.amount > open => {
                tracing::debug!(requested = %request.amount, open = %open, "clamping match");
                open
            }
            OverMatchPolicy::Clamp => request.amount.clone(),
        };

        let id = self.storage.allocate_id().await?;
        Ok(Match::new(id, amount, voucher.id, request.target))
    }

    fn matched(&self, matches: impl IntoIterator<Item = Match>) -> BigDecimal {
        matches.into_iter().map(|m| m.amount).sum()
    }

    async fn matched_target(&self, target: MatchTarget) -> LedgerResult<BigDecimal> {
        Ok(self.matched(self.storage.list_matches_for_target(target).await?))
    }

    async fn voucher(&self, id: VoucherId) -> LedgerResult<Voucher> {
        self.storage
            .get_voucher(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Voucher", id))
    }

    async fn invoice(&self, id: InvoiceId) -> LedgerResult<Invoice> {
        self.storage
            .get_invoice(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Invoice", id))
    }

    async fn receipt(&self, id: ReceiptId) -> LedgerResult<Receipt> {
        self.storage
            .get_receipt(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Receipt", id))
    }
}

/// Undated documents sort last
fn sort_key(date: Option<NaiveDate>, id: u64) -> (NaiveDate, u64) {
    (date.unwrap_or(NaiveDate::MAX), id)
}
