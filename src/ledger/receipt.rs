//! Supplier receipts: upload, field editing and posting

use chrono::NaiveDate;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::ledger::chart::ChartOfAccounts;
use crate::ledger::unit_of_work::UnitOfWork;
use crate::traits::*;
use crate::types::*;
use crate::utils::money::round_cents;

/// Receipt manager
pub struct ReceiptManager<S: LedgerStorage> {
    storage: S,
    chart: Arc<ChartOfAccounts>,
    config: Arc<EngineConfig>,
    validator: Arc<dyn VoucherValidator>,
    attachments: Option<Arc<dyn AttachmentStore>>,
}

impl<S: LedgerStorage> ReceiptManager<S> {
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
            attachments: None,
        }
    }

    pub fn set_attachment_store(&mut self, store: Arc<dyn AttachmentStore>) {
        self.attachments = Some(store);
    }

    /// Store an uploaded file and record it with its extracted fields
    pub async fn add_receipt(
        &mut self,
        company_id: CompanyId,
        file_name: &str,
        bytes: &[u8],
        mut fields: ReceiptFields,
    ) -> LedgerResult<Receipt> {
        let store = self.attachments.clone().ok_or_else(|| {
            ExternalServiceError::new("attachment store", "no attachment store configured")
        })?;
        if self.storage.get_company(company_id).await?.is_none() {
            return Err(LedgerError::not_found("Company", company_id));
        }

        let stored = store.store(file_name, bytes, company_id).await?;
        if fields.suggested_account.is_none() {
            fields.suggested_account = suggest_account(&self.config, &fields);
        }

        let id = self.storage.allocate_id().await?;
        let receipt = Receipt {
            id,
            company_id,
            display_name: stored.display_name,
            file_path: stored.relative_path,
            status: ReceiptStatus::Unassigned,
            fields,
            voucher_id: None,
        };

        let mut work = UnitOfWork::new();
        work.put_receipt(receipt.clone());
        self.storage.commit(work).await?;

        tracing::info!(
            receipt_id = id,
            company_id,
            suggested_account = ?receipt.fields.suggested_account,
            "receipt added"
        );
        Ok(receipt)
    }

    /// Replace the extracted fields; net is recomputed from gross and VAT when both are known
    pub async fn update_receipt_fields(
        &mut self,
        receipt_id: ReceiptId,
        mut fields: ReceiptFields,
    ) -> LedgerResult<Receipt> {
        let mut receipt = self.get_receipt_required(receipt_id).await?;
        if let (Some(gross), Some(vat)) = (&fields.gross_amount, &fields.vat_amount) {
            fields.net_amount = Some(round_cents(&(gross - vat)));
        }
        receipt.fields = fields;

        let mut work = UnitOfWork::new();
        work.put_receipt(receipt.clone());
        self.storage.commit(work).await?;

        tracing::debug!(receipt_id, "receipt fields updated");
        Ok(receipt)
    }

    /// Book a receipt on a new manual voucher
    ///
    /// The voucher is dated from the receipt, or `fallback_date` when the
    /// receipt has no date, and carries no bank amount.
    pub async fn post_receipt(
        &mut self,
        receipt_id: ReceiptId,
        entries: Vec<LedgerEntry>,
        fallback_date: NaiveDate,
    ) -> LedgerResult<Voucher> {
        let mut receipt = self.get_receipt_required(receipt_id).await?;
        if receipt.status == ReceiptStatus::Assigned {
            return Err(LedgerError::Validation(format!(
                "Receipt {} is already booked",
                receipt_id
            )));
        }
        let entries: Vec<LedgerEntry> = entries
            .into_iter()
            .filter(|e| !e.account.trim().is_empty())
            .collect();
        self.validator.validate_entries(&entries)?;
        self.validator.validate_account_references(&entries, &self.chart)?;

        let id = self.storage.allocate_id().await?;
        let mut voucher = Voucher::new(
            id,
            receipt.company_id,
            receipt.fields.date.unwrap_or(fallback_date),
            format!("Receipt: {}", receipt.display_name),
            bigdecimal::BigDecimal::from(0),
            VoucherStatus::Manual,
        );
        voucher.set_entries(entries);

        receipt.voucher_id = Some(id);
        receipt.status = ReceiptStatus::Assigned;

        let mut work = UnitOfWork::new();
        work.put_voucher(voucher.clone()).put_receipt(receipt);
        self.storage.commit(work).await?;

        tracing::info!(receipt_id, voucher_id = id, "receipt posted");
        Ok(voucher)
    }

    /// Delete a receipt and every match that settles it
    pub async fn delete_receipt(&mut self, receipt_id: ReceiptId) -> LedgerResult<()> {
        self.get_receipt_required(receipt_id).await?;
        let matches = self
            .storage
            .list_matches_for_target(MatchTarget::Receipt(receipt_id))
            .await?;

        let mut work = UnitOfWork::new();
        for m in &matches {
            work.delete_match(m.id);
        }
        work.delete_receipt(receipt_id);
        self.storage.commit(work).await?;

        tracing::info!(receipt_id, matches = matches.len(), "receipt deleted");
        Ok(())
    }

    pub async fn get_receipt(&self, receipt_id: ReceiptId) -> LedgerResult<Option<Receipt>> {
        self.storage.get_receipt(receipt_id).await
    }

    pub async fn get_receipt_required(&self, receipt_id: ReceiptId) -> LedgerResult<Receipt> {
        self.storage
            .get_receipt(receipt_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Receipt", receipt_id))
    }

    /// Receipts not yet booked or matched
    pub async fn unassigned_receipts(&self, company_id: CompanyId) -> LedgerResult<Vec<Receipt>> {
        Ok(self
            .storage
            .list_receipts(company_id)
            .await?
            .into_iter()
            .filter(|r| r.status == ReceiptStatus::Unassigned)
            .collect())
    }
}

/// Account guess from the first item text, then the vendor name
pub fn suggest_account(config: &EngineConfig, fields: &ReceiptFields) -> Option<String> {
    [&fields.item_text, &fields.vendor_name]
        .into_iter()
        .flatten()
        .find_map(|text| config.keyword_account(text))
        .map(str::to_string)
}
