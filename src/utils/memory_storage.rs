//! In-memory storage implementation for testing

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ledger::unit_of_work::{UnitOfWork, WriteOp};
use crate::rules::CategorizationRule;
use crate::traits::*;
use crate::types::*;

#[derive(Debug, Clone, Default)]
struct Tables {
    companies: BTreeMap<CompanyId, Company>,
    vouchers: BTreeMap<VoucherId, Voucher>,
    rules: BTreeMap<RuleId, CategorizationRule>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    clients: BTreeMap<ClientId, Client>,
    receipts: BTreeMap<ReceiptId, Receipt>,
    matches: BTreeMap<MatchId, Match>,
}

impl Tables {
    fn apply(&mut self, op: WriteOp) -> LedgerResult<()> {
        match op {
            WriteOp::PutCompany(company) => {
                self.companies.insert(company.id, company);
            }
            WriteOp::PutVoucher(voucher) => {
                self.vouchers.insert(voucher.id, voucher);
            }
            WriteOp::DeleteVoucher(id) => {
                self.vouchers
                    .remove(&id)
                    .ok_or_else(|| LedgerError::not_found("Voucher", id))?;
            }
            WriteOp::PutRule(rule) => {
                let taken = self
                    .rules
                    .values()
                    .any(|r| r.id != rule.id && r.keyword == rule.keyword);
                if taken {
                    return Err(LedgerError::DuplicateKeyword(rule.keyword));
                }
                self.rules.insert(rule.id, rule);
            }
            WriteOp::DeleteRule(id) => {
                self.rules
                    .remove(&id)
                    .ok_or_else(|| LedgerError::not_found("Rule", id))?;
            }
            WriteOp::PutInvoice(invoice) => {
                self.invoices.insert(invoice.id, invoice);
            }
            WriteOp::PutClient(client) => {
                self.clients.insert(client.id, client);
            }
            WriteOp::PutReceipt(receipt) => {
                self.receipts.insert(receipt.id, receipt);
            }
            WriteOp::DeleteReceipt(id) => {
                self.receipts
                    .remove(&id)
                    .ok_or_else(|| LedgerError::not_found("Receipt", id))?;
            }
            WriteOp::PutMatch(m) => {
                self.matches.insert(m.id, m);
            }
            WriteOp::DeleteMatch(id) => {
                self.matches
                    .remove(&id)
                    .ok_or_else(|| LedgerError::not_found("Match", id))?;
            }
        }
        Ok(())
    }

    /// Every match must point at an existing voucher and an existing document
    fn check_match_references(&self) -> LedgerResult<()> {
        for m in self.matches.values() {
            if !self.vouchers.contains_key(&m.voucher_id) {
                return Err(LedgerError::Validation(format!(
                    "Match {} references unknown voucher {}",
                    m.id, m.voucher_id
                )));
            }
            let target_exists = match m.target {
                MatchTarget::Invoice(id) => self.invoices.contains_key(&id),
                MatchTarget::Receipt(id) => self.receipts.contains_key(&id),
            };
            if !target_exists {
                return Err(LedgerError::Validation(format!(
                    "Match {} references unknown {:?}",
                    m.id, m.target
                )));
            }
        }
        Ok(())
    }
}

/// In-memory storage implementation for testing and development
///
/// Clones share the same tables.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    tables: Arc<RwLock<Tables>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> LedgerResult<()> {
        *self.write()? = Tables::default();
        Ok(())
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| LedgerError::Storage("storage lock poisoned".to_string()))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| LedgerError::Storage("storage lock poisoned".to_string()))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn allocate_id(&mut self) -> LedgerResult<u64> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn get_company(&self, company_id: CompanyId) -> LedgerResult<Option<Company>> {
        Ok(self.read()?.companies.get(&company_id).cloned())
    }

    async fn get_voucher(&self, voucher_id: VoucherId) -> LedgerResult<Option<Voucher>> {
        Ok(self.read()?.vouchers.get(&voucher_id).cloned())
    }

    async fn list_vouchers(
        &self,
        company_id: CompanyId,
        status: Option<VoucherStatus>,
    ) -> LedgerResult<Vec<Voucher>> {
        let tables = self.read()?;
        Ok(tables
            .vouchers
            .values()
            .filter(|v| v.company_id == company_id)
            .filter(|v| status.is_none_or(|s| v.status == s))
            .cloned()
            .collect())
    }

    async fn import_voucher(&mut self, mut voucher: Voucher) -> LedgerResult<Voucher> {
        let mut tables = self.write()?;
        let fingerprint = voucher.fingerprint();
        let seen = tables
            .vouchers
            .values()
            .any(|v| v.company_id == voucher.company_id && v.fingerprint() == fingerprint);
        if seen {
            voucher.status = VoucherStatus::PendingDuplicate;
        }
        tables.vouchers.insert(voucher.id, voucher.clone());
        Ok(voucher)
    }

    async fn get_rule(&self, rule_id: RuleId) -> LedgerResult<Option<CategorizationRule>> {
        Ok(self.read()?.rules.get(&rule_id).cloned())
    }

    async fn find_rule(&self, keyword: &str) -> LedgerResult<Option<CategorizationRule>> {
        Ok(self
            .read()?
            .rules
            .values()
            .find(|r| r.keyword == keyword)
            .cloned())
    }

    async fn list_rules(&self) -> LedgerResult<Vec<CategorizationRule>> {
        Ok(self.read()?.rules.values().cloned().collect())
    }

    async fn get_invoice(&self, invoice_id: InvoiceId) -> LedgerResult<Option<Invoice>> {
        Ok(self.read()?.invoices.get(&invoice_id).cloned())
    }

    async fn find_invoice_by_external_id(
        &self,
        company_id: CompanyId,
        external_id: u64,
    ) -> LedgerResult<Option<Invoice>> {
        Ok(self
            .read()?
            .invoices
            .values()
            .find(|i| i.company_id == company_id && i.external_id == external_id)
            .cloned())
    }

    async fn list_invoices(&self, company_id: CompanyId) -> LedgerResult<Vec<Invoice>> {
        Ok(self
            .read()?
            .invoices
            .values()
            .filter(|i| i.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn get_client(&self, client_id: ClientId) -> LedgerResult<Option<Client>> {
        Ok(self.read()?.clients.get(&client_id).cloned())
    }

    async fn find_client_by_external_id(
        &self,
        company_id: CompanyId,
        external_id: u64,
    ) -> LedgerResult<Option<Client>> {
        Ok(self
            .read()?
            .clients
            .values()
            .find(|c| c.company_id == company_id && c.external_id == external_id)
            .cloned())
    }

    async fn get_receipt(&self, receipt_id: ReceiptId) -> LedgerResult<Option<Receipt>> {
        Ok(self.read()?.receipts.get(&receipt_id).cloned())
    }

    async fn list_receipts(&self, company_id: CompanyId) -> LedgerResult<Vec<Receipt>> {
        Ok(self
            .read()?
            .receipts
            .values()
            .filter(|r| r.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn get_match(&self, match_id: MatchId) -> LedgerResult<Option<Match>> {
        Ok(self.read()?.matches.get(&match_id).cloned())
    }

    async fn list_matches_for_voucher(&self, voucher_id: VoucherId) -> LedgerResult<Vec<Match>> {
        Ok(self
            .read()?
            .matches
            .values()
            .filter(|m| m.voucher_id == voucher_id)
            .cloned()
            .collect())
    }

    async fn list_matches_for_target(&self, target: MatchTarget) -> LedgerResult<Vec<Match>> {
        Ok(self
            .read()?
            .matches
            .values()
            .filter(|m| m.target == target)
            .cloned()
            .collect())
    }

    async fn commit(&mut self, work: UnitOfWork) -> LedgerResult<()> {
        let mut tables = self.write()?;
        let mut scratch = tables.clone();
        for op in work.into_ops() {
            scratch.apply(op)?;
        }
        scratch.check_match_references()?;
        *tables = scratch;
        Ok(())
    }
}
