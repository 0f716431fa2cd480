//! A batch of writes that storage applies atomically

use crate::rules::CategorizationRule;
use crate::types::*;

/// A single pending write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    PutCompany(Company),
    PutVoucher(Voucher),
    DeleteVoucher(VoucherId),
    PutRule(CategorizationRule),
    DeleteRule(RuleId),
    PutInvoice(Invoice),
    PutClient(Client),
    PutReceipt(Receipt),
    DeleteReceipt(ReceiptId),
    PutMatch(Match),
    DeleteMatch(MatchId),
}

/// Ordered writes committed together with [`crate::traits::LedgerStorage::commit`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitOfWork {
    ops: Vec<WriteOp>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn put_company(&mut self, company: Company) -> &mut Self {
        self.push(WriteOp::PutCompany(company))
    }

    pub fn put_voucher(&mut self, voucher: Voucher) -> &mut Self {
        self.push(WriteOp::PutVoucher(voucher))
    }

    pub fn delete_voucher(&mut self, voucher_id: VoucherId) -> &mut Self {
        self.push(WriteOp::DeleteVoucher(voucher_id))
    }

    pub fn put_rule(&mut self, rule: CategorizationRule) -> &mut Self {
        self.push(WriteOp::PutRule(rule))
    }

    pub fn delete_rule(&mut self, rule_id: RuleId) -> &mut Self {
        self.push(WriteOp::DeleteRule(rule_id))
    }

    pub fn put_invoice(&mut self, invoice: Invoice) -> &mut Self {
        self.push(WriteOp::PutInvoice(invoice))
    }

    pub fn put_client(&mut self, client: Client) -> &mut Self {
        self.push(WriteOp::PutClient(client))
    }

    pub fn put_receipt(&mut self, receipt: Receipt) -> &mut Self {
        self.push(WriteOp::PutReceipt(receipt))
    }

    pub fn delete_receipt(&mut self, receipt_id: ReceiptId) -> &mut Self {
        self.push(WriteOp::DeleteReceipt(receipt_id))
    }

    pub fn put_match(&mut self, m: Match) -> &mut Self {
        self.push(WriteOp::PutMatch(m))
    }

    pub fn delete_match(&mut self, match_id: MatchId) -> &mut Self {
        self.push(WriteOp::DeleteMatch(match_id))
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
