//! Integration tests for bookkeeping-core

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use bookkeeping_core::ledger::validate;
use bookkeeping_core::utils::{MemoryStorage, StrictVoucherValidator};
use bookkeeping_core::{
    Account, AttachmentStore, BalanceError, ChartOfAccounts, Company, CompanyId, EngineConfig,
    ExternalServiceError, Invoice, InvoiceStatus, InvoicingService, Ledger, LedgerEntry,
    LedgerError, LineTemplate, MatchRequest, MatchTarget, OverMatchPolicy, ReceiptFields,
    ReceiptStatus, RuleDefinition, Settleable, StoredFile, Suggestion, SuggestionProvider,
    SuggestionRequest, SuggestionSubject, VatPeriod, VoucherInput, VoucherStatus,
};
use chrono::NaiveDate;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

const BANK_EXPORT: &str = "\
Kontoutdrag 1234-5678;;;;
Bokföringsdag;Valutadag;Referens;Insättning/Uttag;Bokfört saldo
2024-01-05;2024-01-05;HYRA JANUARI;-8 000,00;12 000,00
2024-01-07;2024-01-07;Kund AB;1 250,50;13 250,50
;;Summa;;13 250,50
";

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

fn amount(text: &str) -> BigDecimal {
    BigDecimal::from_str(text).unwrap()
}

async fn ledger_with(
    chart: ChartOfAccounts,
    config: EngineConfig,
) -> (Ledger<MemoryStorage>, CompanyId) {
    let mut ledger = Ledger::new(MemoryStorage::new(), chart, config);
    let company = ledger
        .add_company(Company {
            id: 0,
            name: "Exempel AB".to_string(),
            org_number: "556677-8899".to_string(),
            street: "Storgatan 1".to_string(),
            postal_code: "211 20".to_string(),
            city: "Lund".to_string(),
        })
        .await
        .unwrap();
    (ledger, company.id)
}

async fn standard_ledger() -> (Ledger<MemoryStorage>, CompanyId) {
    ledger_with(ChartOfAccounts::standard(), EngineConfig::default()).await
}

struct MemoryFiles;

#[async_trait]
impl AttachmentStore for MemoryFiles {
    async fn store(
        &self,
        file_name: &str,
        _bytes: &[u8],
        company_id: CompanyId,
    ) -> Result<StoredFile, ExternalServiceError> {
        Ok(StoredFile {
            display_name: file_name.to_string(),
            relative_path: format!("{}/{}", company_id, file_name),
        })
    }
}

struct PaymentLog {
    payments: Mutex<Vec<u64>>,
}

#[async_trait]
impl InvoicingService for PaymentLog {
    async fn register_payment(
        &self,
        external_id: u64,
        _paid_on: NaiveDate,
    ) -> Result<(), ExternalServiceError> {
        self.payments.lock().unwrap().push(external_id);
        Ok(())
    }
}

/// Books every outgoing voucher on telephone costs
struct PhoneBill;

#[async_trait]
impl SuggestionProvider for PhoneBill {
    async fn suggest(&self, request: &SuggestionRequest) -> Result<Suggestion, ExternalServiceError> {
        let SuggestionSubject::Voucher(voucher) = &request.subject else {
            return Err(ExternalServiceError::new("ai", "only vouchers"));
        };
        let value = voucher.amount.abs();
        Ok(Suggestion {
            description: voucher.reference.clone(),
            date: Some(voucher.date),
            entries: vec![
                LedgerEntry::credit("1930", value.clone()),
                LedgerEntry::debit("6250", value),
            ],
            rule: Some(RuleDefinition::new(vec![
                LineTemplate::new("1930", "0", "ABS_AMOUNT"),
                LineTemplate::new("6250", "ABS_AMOUNT", "0"),
            ])),
        })
    }
}

fn sent_invoice(external_id: u64, sum: i64) -> Invoice {
    Invoice {
        id: 0,
        external_id,
        company_id: 0,
        client_id: 0,
        number: format!("F{}", external_id),
        date: Some(date(2, 1)),
        due_date: Some(date(2, 28)),
        paid_at: None,
        sum: BigDecimal::from(sum),
        net: BigDecimal::from(sum) * amount("0.8"),
        tax: BigDecimal::from(sum) * amount("0.2"),
        reverse_charge: false,
        status: InvoiceStatus::Sent,
        voucher_id: None,
    }
}

#[test]
fn test_balance_validation() {
    let balanced = vec![
        LedgerEntry::debit("1930", BigDecimal::from(100)),
        LedgerEntry::credit("3041", BigDecimal::from(100)),
    ];
    assert!(validate(&balanced).is_ok());

    let unbalanced = vec![
        LedgerEntry::debit("1930", BigDecimal::from(100)),
        LedgerEntry::credit("3041", BigDecimal::from(90)),
    ];
    assert_eq!(
        validate(&unbalanced),
        Err(BalanceError {
            debit_total: BigDecimal::from(100),
            credit_total: BigDecimal::from(90),
        })
    );
}

#[tokio::test]
async fn test_reimport_flags_every_row() {
    let (mut ledger, company_id) = standard_ledger().await;

    let first = ledger.ingest(BANK_EXPORT.as_bytes(), company_id).await.unwrap();
    assert_eq!((first.new, first.duplicates), (2, 0));

    let second = ledger.ingest(BANK_EXPORT.as_bytes(), company_id).await.unwrap();
    assert_eq!((second.new, second.duplicates), (0, 2));

    let inbox = ledger.inbox(company_id).await.unwrap();
    assert_eq!(inbox.len(), 4);

    let approved = ledger.approve_duplicate(second.voucher_ids[0]).await.unwrap();
    assert_eq!(approved.status, VoucherStatus::Unprocessed);
    ledger.reject_duplicate(second.voucher_ids[1]).await.unwrap();
    assert!(ledger.get_voucher(second.voucher_ids[1]).await.unwrap().is_none());
    assert!(matches!(
        ledger.reject_duplicate(first.voucher_ids[0]).await,
        Err(LedgerError::Validation(_))
    ));
}

#[tokio::test]
async fn test_vat_rule_splits_gross_amount() {
    let (mut ledger, company_id) = standard_ledger().await;
    let body = RuleDefinition::new(vec![
        LineTemplate::new("1930", "ABS_AMOUNT", "0"),
        LineTemplate::new("3041", "0", "NET_AMOUNT"),
        LineTemplate::new("2611", "0", "VAT_AMOUNT"),
    ])
    .with_vat_rate(BigDecimal::from(25));
    ledger.add_rule("Kund AB", "3041", Some(body)).await.unwrap();

    let report = ledger
        .ingest(b"2024-01-07,Kund AB,125.00\n", company_id)
        .await
        .unwrap();
    let result = ledger.categorize(report.voucher_ids[0]).await.unwrap();

    assert_eq!(
        result.voucher.entries,
        vec![
            LedgerEntry::debit("1930", amount("125.00")),
            LedgerEntry::credit("3041", amount("100.00")),
            LedgerEntry::credit("2611", amount("25.00")),
        ]
    );
    assert_eq!(result.voucher.status, VoucherStatus::Processed);
}

#[tokio::test]
async fn test_export_lists_accounts_and_bracketed_vouchers() {
    let chart = ChartOfAccounts::from_accounts(vec![
        Account::new("3041", "Sales"),
        Account::new("1930", "Bank"),
    ]);
    let (mut ledger, company_id) = ledger_with(chart, EngineConfig::default()).await;
    ledger
        .create_voucher(
            company_id,
            VoucherInput::new(
                date(1, 15),
                "Sale",
                vec![
                    LedgerEntry::debit("1930", BigDecimal::from(100)),
                    LedgerEntry::credit("3041", BigDecimal::from(100)),
                ],
            ),
        )
        .await
        .unwrap();

    let artifact = ledger.export_company(company_id, date(12, 31)).await.unwrap();
    let text = String::from_utf8_lossy(&artifact.bytes);
    let lines: Vec<&str> = text.split("\r\n").collect();

    let konto = lines.iter().position(|l| *l == "#KONTO 1930 \"Bank\"").unwrap();
    assert_eq!(lines[konto + 1], "#KONTO 3041 \"Sales\"");
    assert!(lines.contains(&"#RAR 0 20240101 20241231"));

    let ver = lines
        .iter()
        .position(|l| *l == "#VER \"B\" 1 20240115 \"Sale\"")
        .unwrap();
    assert_eq!(
        &lines[ver + 1..ver + 5],
        &["{", "#TRANS 1930 {} 100.00", "#TRANS 3041 {} -100.00", "}"]
    );
    assert!(text.ends_with("}\r\n"));

    let again = ledger.export_company(company_id, date(12, 31)).await.unwrap();
    assert_eq!(artifact.bytes, again.bytes);
}

#[tokio::test]
async fn test_multiline_reference_exports_one_voucher_header() {
    let (mut ledger, company_id) = standard_ledger().await;
    ledger
        .ingest(
            b"2024-03-01,\"Hyra\r\n#VER \"\"B\"\" 99 20240101 \"\"fake\"\"\",-100\n",
            company_id,
        )
        .await
        .unwrap();
    ledger.categorize_all(company_id).await.unwrap();

    let artifact = ledger.export_company(company_id, date(12, 31)).await.unwrap();
    let text = String::from_utf8_lossy(&artifact.bytes);
    let vers: Vec<&str> = text.split("\r\n").filter(|l| l.starts_with("#VER")).collect();
    assert_eq!(vers.len(), 1);
    assert!(vers[0].starts_with("#VER \"B\" 1 20240301 \"Hyra"));
    assert!(vers[0].ends_with("fake\""));
}

#[tokio::test]
async fn test_batch_categorization_continues_after_failure() {
    let chart = ChartOfAccounts::from_accounts(vec![
        Account::new("1930", "Bankkonto"),
        Account::new("1798", "Avvaktar (Inbetalning)"),
        Account::new("6991", "Hyra"),
    ]);
    let mut ledger = Ledger::with_validator(
        MemoryStorage::new(),
        chart,
        EngineConfig::default(),
        Arc::new(StrictVoucherValidator),
    );
    let company = ledger
        .add_company(Company {
            id: 0,
            name: "Strikt AB".to_string(),
            org_number: "556000-0001".to_string(),
            street: String::new(),
            postal_code: String::new(),
            city: String::new(),
        })
        .await
        .unwrap();

    let report = ledger
        .ingest(
            b"2024-02-01,Hyra februari,-5000\n2024-02-02,Okand betalning,-50\n2024-02-03,Swish,200\n",
            company.id,
        )
        .await
        .unwrap();

    let batch = ledger.categorize_batch(&report.voucher_ids).await;
    assert_eq!(batch.succeeded(), 2);
    let errors = batch.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(*errors[0].0, report.voucher_ids[1]);
    assert!(matches!(errors[0].1, LedgerError::Validation(_)));

    let failed = ledger.get_voucher(report.voucher_ids[1]).await.unwrap().unwrap();
    assert_eq!(failed.status, VoucherStatus::Unprocessed);
    assert!(failed.entries.is_empty());
}

#[tokio::test]
async fn test_holding_accounts_follow_configuration() {
    for (inbound, outbound) in [("1798", "1799"), ("2893", "1630")] {
        let config = EngineConfig {
            inbound_holding_account: inbound.to_string(),
            outbound_holding_account: outbound.to_string(),
            ..EngineConfig::default()
        };
        let (mut ledger, company_id) = ledger_with(ChartOfAccounts::standard(), config).await;
        let report = ledger
            .ingest(b"2024-03-01,Swish,100\n2024-03-02,Okand,-100\n", company_id)
            .await
            .unwrap();

        let money_in = ledger.categorize(report.voucher_ids[0]).await.unwrap();
        assert_eq!(money_in.voucher.entries[1], LedgerEntry::credit(inbound, amount("100.00")));
        let money_out = ledger.categorize(report.voucher_ids[1]).await.unwrap();
        assert_eq!(money_out.voucher.entries[1], LedgerEntry::debit(outbound, amount("100.00")));
    }
}

#[tokio::test]
async fn test_partial_payments_settle_invoice() {
    let (mut ledger, company_id) = standard_ledger().await;
    let mut invoice = sent_invoice(501, 1000);
    invoice.company_id = company_id;
    let invoice = ledger.sync_invoice(invoice).await.unwrap();
    let invoices = ledger.list_invoices(company_id).await.unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].id, invoice.id);

    let report = ledger
        .ingest(
            b"2024-02-10,Kund AB delbetalning,600\n2024-02-20,Kund AB rest,400\n",
            company_id,
        )
        .await
        .unwrap();
    let (first, second) = (report.voucher_ids[0], report.voucher_ids[1]);
    let target = MatchTarget::Invoice(invoice.id);

    ledger.create_match(first, target, BigDecimal::from(600)).await.unwrap();
    assert_eq!(
        ledger.remaining(Settleable::Invoice(invoice.id)).await.unwrap(),
        Some(amount("400"))
    );

    assert!(matches!(
        ledger.create_match(second, target, BigDecimal::from(500)).await,
        Err(LedgerError::OverMatch { .. })
    ));

    ledger
        .create_matches(vec![MatchRequest::new(second, target, BigDecimal::from(400))])
        .await
        .unwrap();
    assert!(ledger.unsettled_invoices(company_id).await.unwrap().is_empty());
    assert!(ledger.unsettled_vouchers(company_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_clamp_policy_reduces_match() {
    let config = EngineConfig {
        over_match_policy: OverMatchPolicy::Clamp,
        ..EngineConfig::default()
    };
    let (mut ledger, company_id) = ledger_with(ChartOfAccounts::standard(), config).await;
    let mut invoice = sent_invoice(502, 300);
    invoice.company_id = company_id;
    let invoice = ledger.sync_invoice(invoice).await.unwrap();
    let report = ledger.ingest(b"2024-02-10,Kund,1000\n", company_id).await.unwrap();

    let m = ledger
        .create_match(report.voucher_ids[0], MatchTarget::Invoice(invoice.id), BigDecimal::from(900))
        .await
        .unwrap();
    assert_eq!(m.amount, BigDecimal::from(300));
}

#[tokio::test]
async fn test_delete_voucher_releases_matched_receipt() {
    let (mut ledger, company_id) = standard_ledger().await;
    ledger.set_attachment_store(Arc::new(MemoryFiles));

    let receipt = ledger
        .add_receipt(
            company_id,
            "clas-ohlson.pdf",
            b"%PDF-1.4",
            ReceiptFields {
                date: Some(date(4, 2)),
                gross_amount: Some(BigDecimal::from(400)),
                ..ReceiptFields::default()
            },
        )
        .await
        .unwrap();
    let report = ledger.ingest(b"2024-04-03,Clas Ohlson,-400\n", company_id).await.unwrap();
    let voucher_id = report.voucher_ids[0];

    ledger
        .create_match(voucher_id, MatchTarget::Receipt(receipt.id), BigDecimal::from(400))
        .await
        .unwrap();
    let matched = ledger.get_receipt(receipt.id).await.unwrap().unwrap();
    assert_eq!(matched.status, ReceiptStatus::Assigned);
    assert!(ledger.unsettled_receipts(company_id).await.unwrap().is_empty());
    assert!(ledger.unassigned_receipts(company_id).await.unwrap().is_empty());

    ledger.delete_voucher(voucher_id).await.unwrap();

    assert!(ledger.get_voucher(voucher_id).await.unwrap().is_none());
    assert!(ledger.matches_for_voucher(voucher_id).await.unwrap().is_empty());
    let released = ledger.get_receipt(receipt.id).await.unwrap().unwrap();
    assert_eq!(released.status, ReceiptStatus::Unassigned);
    assert_eq!(ledger.unsettled_receipts(company_id).await.unwrap().len(), 1);
    let unassigned = ledger.unassigned_receipts(company_id).await.unwrap();
    assert_eq!(unassigned.len(), 1);
    assert_eq!(unassigned[0].id, receipt.id);
}

#[tokio::test]
async fn test_receipt_posting_reaches_export() {
    let (mut ledger, company_id) = standard_ledger().await;
    ledger.set_attachment_store(Arc::new(MemoryFiles));
    let receipt = ledger
        .add_receipt(
            company_id,
            "okq8.pdf",
            b"",
            ReceiptFields {
                vendor_name: Some("OKQ8".to_string()),
                ..ReceiptFields::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(receipt.fields.suggested_account.as_deref(), Some("5611"));

    let voucher = ledger
        .post_receipt(
            receipt.id,
            vec![
                LedgerEntry::debit("5611", BigDecimal::from(400)),
                LedgerEntry::debit("2641", BigDecimal::from(100)),
                LedgerEntry::credit("1930", BigDecimal::from(500)),
            ],
            date(5, 20),
        )
        .await
        .unwrap();
    assert_eq!(voucher.status, VoucherStatus::Manual);
    assert_eq!(voucher.date, date(5, 20));

    let artifact = ledger.export_company(company_id, date(12, 31)).await.unwrap();
    let text = String::from_utf8_lossy(&artifact.bytes);
    assert!(text.contains("\"Receipt: okq8.pdf\"\r\n"));
    assert!(text.contains("#TRANS 5611 {} 400.00\r\n"));
}

#[tokio::test]
async fn test_mark_invoice_paid_through_service() {
    let (mut ledger, company_id) = standard_ledger().await;
    let service = Arc::new(PaymentLog {
        payments: Mutex::new(Vec::new()),
    });
    ledger.set_invoicing_service(service.clone());
    let mut invoice = sent_invoice(777, 1250);
    invoice.company_id = company_id;
    let invoice = ledger.sync_invoice(invoice).await.unwrap();

    let paid = ledger.mark_invoice_paid(invoice.id, date(3, 1)).await.unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert_eq!(paid.paid_at, Some(date(3, 1)));
    assert_eq!(*service.payments.lock().unwrap(), vec![777]);

    assert!(matches!(
        ledger.mark_invoice_paid(invoice.id, date(3, 2)).await,
        Err(LedgerError::Validation(_))
    ));
}

#[tokio::test]
async fn test_accepted_suggestion_becomes_rule() {
    let (mut ledger, company_id) = standard_ledger().await;
    ledger.set_suggestion_provider(Arc::new(PhoneBill));

    let report = ledger
        .ingest(b"2024-05-02,Telia,-399\n2024-06-02,Telia,-420\n", company_id)
        .await
        .unwrap();
    ledger.categorize(report.voucher_ids[0]).await.unwrap();

    let rules = ledger.rules_by_account().await.unwrap();
    assert_eq!(rules["6250"].len(), 1);
    assert_eq!(rules["6250"][0].keyword, "Telia");

    let second = ledger.categorize(report.voucher_ids[1]).await.unwrap();
    assert_eq!(second.voucher.entries[1], LedgerEntry::debit("6250", amount("420.00")));
}

#[tokio::test]
async fn test_vat_report_over_posted_vouchers() {
    let (mut ledger, company_id) = standard_ledger().await;
    ledger
        .create_voucher(
            company_id,
            VoucherInput::new(
                date(2, 3),
                "Försäljning",
                vec![
                    LedgerEntry::debit("1930", BigDecimal::from(1250)),
                    LedgerEntry::credit("3041", BigDecimal::from(1000)),
                    LedgerEntry::credit("2611", BigDecimal::from(250)),
                ],
            ),
        )
        .await
        .unwrap();
    ledger
        .create_voucher(
            company_id,
            VoucherInput::new(
                date(3, 9),
                "Inventarier",
                vec![
                    LedgerEntry::debit("5410", BigDecimal::from(200)),
                    LedgerEntry::debit("2641", BigDecimal::from(50)),
                    LedgerEntry::credit("1930", BigDecimal::from(250)),
                ],
            ),
        )
        .await
        .unwrap();
    ledger
        .ingest(b"2024-03-10,Moms retur,999\n", company_id)
        .await
        .unwrap();

    let report = ledger.vat_report(company_id, VatPeriod::Quarter(2024, 1)).await.unwrap();
    assert_eq!(report.sales_excl_vat, BigDecimal::from(1000));
    assert_eq!(report.output_vat_standard, BigDecimal::from(250));
    assert_eq!(report.input_vat, BigDecimal::from(50));
    assert_eq!(report.vat_payable, BigDecimal::from(200));

    let next = ledger.vat_report(company_id, VatPeriod::Quarter(2024, 2)).await.unwrap();
    assert_eq!(next.vat_payable, BigDecimal::from(0));
}
