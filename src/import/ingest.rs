//! Statement ingestion with duplicate detection

use serde::{Deserialize, Serialize};

use crate::import::csv::{parse_statement, RowError, StatementLayout};
use crate::ledger::unit_of_work::UnitOfWork;
use crate::traits::*;
use crate::types::*;

/// Outcome of one ingest call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub layout: StatementLayout,
    /// Rows stored as `unprocessed`
    pub new: usize,
    /// Rows stored as `pending_duplicate`
    pub duplicates: usize,
    pub skipped: Vec<RowError>,
    /// Ids of every stored voucher, in input order
    pub voucher_ids: Vec<VoucherId>,
}

/// Turns statement files into imported vouchers and resolves flagged duplicates
pub struct StatementImporter<S: LedgerStorage> {
    storage: S,
}

impl<S: LedgerStorage> StatementImporter<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Import every usable row of a raw statement for a company
    pub async fn ingest(&mut self, raw: &[u8], company_id: CompanyId) -> LedgerResult<IngestReport> {
        if self.storage.get_company(company_id).await?.is_none() {
            return Err(LedgerError::not_found("Company", company_id));
        }

        let statement = parse_statement(raw)?;
        let mut report = IngestReport {
            layout: statement.layout,
            new: 0,
            duplicates: 0,
            skipped: statement.skipped,
            voucher_ids: Vec::with_capacity(statement.rows.len()),
        };

        for row in statement.rows {
            let id = self.storage.allocate_id().await?;
            let voucher = Voucher::new(
                id,
                company_id,
                row.date,
                row.reference,
                row.amount,
                VoucherStatus::Unprocessed,
            );
            let stored = self.storage.import_voucher(voucher).await?;
            match stored.status {
                VoucherStatus::PendingDuplicate => {
                    tracing::debug!(voucher_id = id, line = row.line, "row flagged as duplicate");
                    report.duplicates += 1;
                }
                _ => report.new += 1,
            }
            report.voucher_ids.push(id);
        }

        tracing::info!(
            company_id,
            new = report.new,
            duplicates = report.duplicates,
            skipped = report.skipped.len(),
            "statement ingested"
        );
        Ok(report)
    }

    /// Accept a flagged row as a genuine transaction
    pub async fn approve_duplicate(&mut self, voucher_id: VoucherId) -> LedgerResult<Voucher> {
        let mut voucher = self.pending_duplicate(voucher_id).await?;
        voucher.set_status(VoucherStatus::Unprocessed);

        let mut work = UnitOfWork::new();
        work.put_voucher(voucher.clone());
        self.storage.commit(work).await?;

        tracing::info!(voucher_id, "duplicate approved");
        Ok(voucher)
    }

    /// Drop a flagged row
    pub async fn reject_duplicate(&mut self, voucher_id: VoucherId) -> LedgerResult<()> {
        self.pending_duplicate(voucher_id).await?;

        let mut work = UnitOfWork::new();
        work.delete_voucher(voucher_id);
        self.storage.commit(work).await?;

        tracing::info!(voucher_id, "duplicate rejected");
        Ok(())
    }

    async fn pending_duplicate(&self, voucher_id: VoucherId) -> LedgerResult<Voucher> {
        let voucher = self
            .storage
            .get_voucher(voucher_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Voucher", voucher_id))?;
        if voucher.status != VoucherStatus::PendingDuplicate {
            return Err(LedgerError::Validation(format!(
                "Voucher {} is {}, not a pending duplicate",
                voucher_id, voucher.status
            )));
        }
        Ok(voucher)
    }
}
