//! Manual voucher processing and management

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::ledger::chart::ChartOfAccounts;
use crate::ledger::unit_of_work::UnitOfWork;
use crate::traits::*;
use crate::types::*;

/// Operator-entered contents of a voucher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoucherInput {
    pub date: NaiveDate,
    pub reference: String,
    pub entries: Vec<LedgerEntry>,
    /// Receipts attached to the voucher
    #[serde(default)]
    pub receipt_ids: Vec<ReceiptId>,
}

impl VoucherInput {
    pub fn new(date: NaiveDate, reference: impl Into<String>, entries: Vec<LedgerEntry>) -> Self {
        Self {
            date,
            reference: reference.into(),
            entries,
            receipt_ids: Vec::new(),
        }
    }

    pub fn with_receipts(mut self, receipt_ids: Vec<ReceiptId>) -> Self {
        self.receipt_ids = receipt_ids;
        self
    }
}

/// Voucher manager for creating, editing and deleting vouchers
pub struct VoucherManager<S: LedgerStorage> {
    storage: S,
    chart: Arc<ChartOfAccounts>,
    validator: Arc<dyn VoucherValidator>,
}

impl<S: LedgerStorage> VoucherManager<S> {
    pub fn new(storage: S, chart: Arc<ChartOfAccounts>, validator: Arc<dyn VoucherValidator>) -> Self {
        Self {
            storage,
            chart,
            validator,
        }
    }

    /// Create a posted voucher from operator input
    pub async fn create_voucher(
        &mut self,
        company_id: CompanyId,
        input: VoucherInput,
    ) -> LedgerResult<Voucher> {
        if self.storage.get_company(company_id).await?.is_none() {
            return Err(LedgerError::not_found("Company", company_id));
        }
        let reference = Self::check_input(&input)?;
        self.check_entries(&input.entries)?;

        let id = self.storage.allocate_id().await?;
        let amount: BigDecimal = input.entries.iter().map(|e| &e.debit).sum();
        let mut voucher = Voucher::new(
            id,
            company_id,
            input.date,
            reference,
            amount,
            VoucherStatus::Processed,
        );
        voucher.set_entries(input.entries);

        let mut work = UnitOfWork::new();
        for receipt_id in &input.receipt_ids {
            let receipt = self.attachable_receipt(*receipt_id, &voucher).await?;
            work.put_receipt(receipt);
        }
        work.put_voucher(voucher.clone());
        self.storage.commit(work).await?;

        tracing::info!(voucher_id = id, company_id, receipts = input.receipt_ids.len(), "voucher created");
        Ok(voucher)
    }

    /// Replace date, reference, entries and receipt links of a voucher
    ///
    /// The bank amount of the voucher is kept. Receipts no longer in the list
    /// are released.
    pub async fn update_voucher(
        &mut self,
        voucher_id: VoucherId,
        input: VoucherInput,
    ) -> LedgerResult<Voucher> {
        let mut voucher = self.get_voucher_required(voucher_id).await?;
        if voucher.status == VoucherStatus::PendingDuplicate {
            return Err(LedgerError::Validation(format!(
                "Voucher {} is a pending duplicate; approve it before booking",
                voucher_id
            )));
        }
        let reference = Self::check_input(&input)?;
        self.check_entries(&input.entries)?;

        voucher.date = input.date;
        voucher.reference = reference;
        voucher.set_entries(input.entries);
        if voucher.status != VoucherStatus::Manual {
            voucher.set_status(VoucherStatus::Processed);
        }

        let mut work = UnitOfWork::new();
        let keep: HashSet<ReceiptId> = input.receipt_ids.iter().copied().collect();
        for receipt in self.linked_receipts(&voucher).await? {
            if !keep.contains(&receipt.id) {
                let released = self.release(receipt, &HashSet::new()).await?;
                work.put_receipt(released);
            }
        }
        for receipt_id in &input.receipt_ids {
            let receipt = self.attachable_receipt(*receipt_id, &voucher).await?;
            work.put_receipt(receipt);
        }
        work.put_voucher(voucher.clone());
        self.storage.commit(work).await?;

        tracing::info!(voucher_id, status = %voucher.status, "voucher updated");
        Ok(voucher)
    }

    /// Delete a voucher together with its matches, releasing the receipts it held
    pub async fn delete_voucher(&mut self, voucher_id: VoucherId) -> LedgerResult<()> {
        let voucher = self.get_voucher_required(voucher_id).await?;
        let matches = self.storage.list_matches_for_voucher(voucher_id).await?;
        let dropped: HashSet<MatchId> = matches.iter().map(|m| m.id).collect();

        let mut work = UnitOfWork::new();
        for m in &matches {
            work.delete_match(m.id);
        }

        let mut released: HashSet<ReceiptId> = HashSet::new();
        for receipt in self.linked_receipts(&voucher).await? {
            released.insert(receipt.id);
            let receipt = self.release(receipt, &dropped).await?;
            work.put_receipt(receipt);
        }
        for m in &matches {
            if let MatchTarget::Receipt(receipt_id) = m.target {
                if !released.insert(receipt_id) {
                    continue;
                }
                let receipt = self
                    .storage
                    .get_receipt(receipt_id)
                    .await?
                    .ok_or_else(|| LedgerError::not_found("Receipt", receipt_id))?;
                if receipt.voucher_id.is_none() {
                    let receipt = self.release(receipt, &dropped).await?;
                    work.put_receipt(receipt);
                }
            }
        }

        for mut invoice in self.storage.list_invoices(voucher.company_id).await? {
            if invoice.voucher_id == Some(voucher_id) {
                invoice.voucher_id = None;
                work.put_invoice(invoice);
            }
        }

        work.delete_voucher(voucher_id);
        self.storage.commit(work).await?;

        tracing::info!(voucher_id, matches = matches.len(), receipts = released.len(), "voucher deleted");
        Ok(())
    }

    pub async fn get_voucher(&self, voucher_id: VoucherId) -> LedgerResult<Option<Voucher>> {
        self.storage.get_voucher(voucher_id).await
    }

    /// Get a voucher by ID, returning an error if not found
    pub async fn get_voucher_required(&self, voucher_id: VoucherId) -> LedgerResult<Voucher> {
        self.storage
            .get_voucher(voucher_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Voucher", voucher_id))
    }

    /// Imported vouchers waiting for the operator, newest first
    pub async fn inbox(&self, company_id: CompanyId) -> LedgerResult<Vec<Voucher>> {
        let mut vouchers: Vec<Voucher> = self
            .storage
            .list_vouchers(company_id, None)
            .await?
            .into_iter()
            .filter(|v| {
                matches!(
                    v.status,
                    VoucherStatus::Unprocessed | VoucherStatus::PendingDuplicate
                )
            })
            .collect();
        vouchers.sort_by(|a, b| (b.date, b.id).cmp(&(a.date, a.id)));
        Ok(vouchers)
    }

    /// Vouchers that are part of the books, by date then id
    pub async fn posted_vouchers(&self, company_id: CompanyId) -> LedgerResult<Vec<Voucher>> {
        let mut vouchers: Vec<Voucher> = self
            .storage
            .list_vouchers(company_id, None)
            .await?
            .into_iter()
            .filter(|v| v.status.is_posted())
            .collect();
        vouchers.sort_by_key(|v| (v.date, v.id));
        Ok(vouchers)
    }

    fn check_input(input: &VoucherInput) -> LedgerResult<String> {
        let reference = input.reference.trim();
        if reference.is_empty() {
            return Err(LedgerError::Validation(
                "Voucher reference cannot be empty".to_string(),
            ));
        }
        Ok(reference.to_string())
    }

    fn check_entries(&self, entries: &[LedgerEntry]) -> LedgerResult<()> {
        self.validator.validate_entries(entries)?;
        self.validator.validate_account_references(entries, &self.chart)
    }

    async fn linked_receipts(&self, voucher: &Voucher) -> LedgerResult<Vec<Receipt>> {
        Ok(self
            .storage
            .list_receipts(voucher.company_id)
            .await?
            .into_iter()
            .filter(|r| r.voucher_id == Some(voucher.id))
            .collect())
    }

    async fn attachable_receipt(&self, receipt_id: ReceiptId, voucher: &Voucher) -> LedgerResult<Receipt> {
        let mut receipt = self
            .storage
            .get_receipt(receipt_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Receipt", receipt_id))?;
        if receipt.company_id != voucher.company_id {
            return Err(LedgerError::Validation(format!(
                "Receipt {} belongs to another company",
                receipt_id
            )));
        }
        if let Some(other) = receipt.voucher_id {
            if other != voucher.id {
                return Err(LedgerError::Validation(format!(
                    "Receipt {} is already attached to voucher {}",
                    receipt_id, other
                )));
            }
        }
        receipt.voucher_id = Some(voucher.id);
        receipt.status = ReceiptStatus::Assigned;
        Ok(receipt)
    }

    /// Detach a receipt; it stays assigned while matches outside `dropped` remain
    async fn release(&self, mut receipt: Receipt, dropped: &HashSet<MatchId>) -> LedgerResult<Receipt> {
        let still_matched = self
            .storage
            .list_matches_for_target(MatchTarget::Receipt(receipt.id))
            .await?
            .iter()
            .any(|m| !dropped.contains(&m.id));
        receipt.voucher_id = None;
        if !still_matched {
            receipt.status = ReceiptStatus::Unassigned;
        }
        Ok(receipt)
    }
}
