//! Customer invoices and clients mirrored from the invoicing service

use chrono::NaiveDate;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::ledger::chart::ChartOfAccounts;
use crate::ledger::unit_of_work::UnitOfWork;
use crate::traits::*;
use crate::types::*;

/// Invoice manager
pub struct InvoiceManager<S: LedgerStorage> {
    storage: S,
    chart: Arc<ChartOfAccounts>,
    config: Arc<EngineConfig>,
    validator: Arc<dyn VoucherValidator>,
    invoicing: Option<Arc<dyn InvoicingService>>,
    provider: Option<Arc<dyn SuggestionProvider>>,
}

impl<S: LedgerStorage> InvoiceManager<S> {
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
            invoicing: None,
            provider: None,
        }
    }

    pub fn set_invoicing_service(&mut self, service: Arc<dyn InvoicingService>) {
        self.invoicing = Some(service);
    }

    pub fn set_provider(&mut self, provider: Arc<dyn SuggestionProvider>) {
        self.provider = Some(provider);
    }

    /// Insert or replace a client, keyed by company and external id
    pub async fn sync_client(&mut self, mut client: Client) -> LedgerResult<Client> {
        match self
            .storage
            .find_client_by_external_id(client.company_id, client.external_id)
            .await?
        {
            Some(existing) => client.id = existing.id,
            None => client.id = self.storage.allocate_id().await?,
        }

        let mut work = UnitOfWork::new();
        work.put_client(client.clone());
        self.storage.commit(work).await?;

        tracing::debug!(client_id = client.id, external_id = client.external_id, "client synced");
        Ok(client)
    }

    /// Insert or replace an invoice, keyed by company and external id
    ///
    /// The booking link of an existing invoice is kept.
    pub async fn sync_invoice(&mut self, mut invoice: Invoice) -> LedgerResult<Invoice> {
        match self
            .storage
            .find_invoice_by_external_id(invoice.company_id, invoice.external_id)
            .await?
        {
            Some(existing) => {
                invoice.id = existing.id;
                invoice.voucher_id = existing.voucher_id;
            }
            None => invoice.id = self.storage.allocate_id().await?,
        }

        let mut work = UnitOfWork::new();
        work.put_invoice(invoice.clone());
        self.storage.commit(work).await?;

        tracing::debug!(invoice_id = invoice.id, external_id = invoice.external_id, "invoice synced");
        Ok(invoice)
    }

    /// Register the payment with the invoicing service, then record it locally
    pub async fn mark_invoice_paid(
        &mut self,
        invoice_id: InvoiceId,
        paid_on: NaiveDate,
    ) -> LedgerResult<Invoice> {
        let service = self.invoicing.clone().ok_or_else(|| {
            ExternalServiceError::new("invoicing", "no invoicing service configured")
        })?;
        let mut invoice = self.get_invoice_required(invoice_id).await?;
        if invoice.status == InvoiceStatus::Paid {
            return Err(LedgerError::Validation(format!(
                "Invoice {} is already paid",
                invoice.number
            )));
        }

        service.register_payment(invoice.external_id, paid_on).await?;

        invoice.paid_at = Some(paid_on);
        invoice.status = InvoiceStatus::Paid;
        let mut work = UnitOfWork::new();
        work.put_invoice(invoice.clone());
        self.storage.commit(work).await?;

        tracing::info!(invoice_id, number = %invoice.number, %paid_on, "invoice marked paid");
        Ok(invoice)
    }

    /// Book each invoice on a voucher proposed by the suggestion provider
    pub async fn book_invoices_with_suggestions(
        &mut self,
        company_id: CompanyId,
        invoice_ids: &[InvoiceId],
    ) -> LedgerResult<BatchReport<InvoiceId, Voucher>> {
        let provider = self.provider.clone().ok_or_else(|| {
            ExternalServiceError::new("suggestions", "no suggestion provider configured")
        })?;

        let mut report = BatchReport::new();
        for &invoice_id in invoice_ids {
            let outcome = self.book_invoice(company_id, invoice_id, provider.as_ref()).await;
            if let Err(e) = &outcome {
                tracing::warn!(invoice_id, error = %e, "invoice booking failed");
            }
            report.push(invoice_id, outcome);
        }
        tracing::info!(
            company_id,
            total = invoice_ids.len(),
            succeeded = report.succeeded(),
            "invoice batch booked"
        );
        Ok(report)
    }

    pub async fn get_invoice(&self, invoice_id: InvoiceId) -> LedgerResult<Option<Invoice>> {
        self.storage.get_invoice(invoice_id).await
    }

    pub async fn get_invoice_required(&self, invoice_id: InvoiceId) -> LedgerResult<Invoice> {
        self.storage
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Invoice", invoice_id))
    }

    pub async fn list_invoices(&self, company_id: CompanyId) -> LedgerResult<Vec<Invoice>> {
        self.storage.list_invoices(company_id).await
    }

    async fn book_invoice(
        &mut self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
        provider: &dyn SuggestionProvider,
    ) -> LedgerResult<Voucher> {
        let mut invoice = self
            .storage
            .get_invoice(invoice_id)
            .await?
            .filter(|i| i.company_id == company_id)
            .ok_or_else(|| LedgerError::not_found("Invoice", invoice_id))?;
        if let Some(voucher_id) = invoice.voucher_id {
            return Err(LedgerError::Validation(format!(
                "Invoice {} is already booked on voucher {}",
                invoice.number, voucher_id
            )));
        }

        let client = self.storage.get_client(invoice.client_id).await?;
        let request = SuggestionRequest {
            subject: SuggestionSubject::Invoice {
                invoice: invoice.clone(),
                client,
            },
            chart: self.chart.clone(),
            general_rules: self.config.general_rules.clone(),
            known_rule: None,
        };
        let suggestion = provider.suggest(&request).await?;
        if suggestion.entries.is_empty() {
            return Err(LedgerError::Validation(format!(
                "No entries suggested for invoice {}",
                invoice.number
            )));
        }
        self.validator.validate_entries(&suggestion.entries)?;
        self.validator
            .validate_account_references(&suggestion.entries, &self.chart)?;

        let date = suggestion.date.or(invoice.date).ok_or_else(|| {
            LedgerError::Validation(format!("Invoice {} has no date to book on", invoice.number))
        })?;
        let reference = match suggestion.description.trim() {
            "" => format!("Invoice {}", invoice.number),
            text => text.to_string(),
        };

        let id = self.storage.allocate_id().await?;
        let mut voucher = Voucher::new(
            id,
            company_id,
            date,
            reference,
            invoice.sum.clone(),
            VoucherStatus::Processed,
        );
        voucher.invoice_id = Some(invoice_id);
        voucher.set_entries(suggestion.entries);
        invoice.voucher_id = Some(id);

        let mut work = UnitOfWork::new();
        work.put_voucher(voucher.clone()).put_invoice(invoice);
        self.storage.commit(work).await?;

        tracing::info!(invoice_id, voucher_id = id, "invoice booked");
        Ok(voucher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use std::sync::Mutex;

    struct RecordingService {
        fail: bool,
        payments: Mutex<Vec<(u64, NaiveDate)>>,
    }

    #[async_trait]
    impl InvoicingService for RecordingService {
        async fn register_payment(
            &self,
            external_id: u64,
            paid_on: NaiveDate,
        ) -> Result<(), ExternalServiceError> {
            if self.fail {
                return Err(ExternalServiceError::new("invoicing", "HTTP 503"));
            }
            self.payments.lock().unwrap().push((external_id, paid_on));
            Ok(())
        }
    }

    struct SaleProvider;

    #[async_trait]
    impl SuggestionProvider for SaleProvider {
        async fn suggest(&self, request: &SuggestionRequest) -> Result<Suggestion, ExternalServiceError> {
            let SuggestionSubject::Invoice { invoice, .. } = &request.subject else {
                return Err(ExternalServiceError::new("ai", "expected an invoice"));
            };
            if invoice.number == "broken" {
                return Ok(Suggestion {
                    description: String::new(),
                    date: None,
                    entries: Vec::new(),
                    rule: None,
                });
            }
            Ok(Suggestion {
                description: format!("Faktura {}", invoice.number),
                date: None,
                entries: vec![
                    LedgerEntry::debit("1510", invoice.sum.clone()),
                    LedgerEntry::credit("3041", invoice.net.clone()),
                    LedgerEntry::credit("2611", invoice.tax.clone()),
                ],
                rule: None,
            })
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, day).unwrap()
    }

    fn invoice(external_id: u64, number: &str) -> Invoice {
        Invoice {
            id: 0,
            external_id,
            company_id: 1,
            client_id: 0,
            number: number.to_string(),
            date: Some(date(1)),
            due_date: Some(date(30)),
            paid_at: None,
            sum: BigDecimal::from(1250),
            net: BigDecimal::from(1000),
            tax: BigDecimal::from(250),
            reverse_charge: false,
            status: InvoiceStatus::Sent,
            voucher_id: None,
        }
    }

    fn manager(storage: &MemoryStorage) -> InvoiceManager<MemoryStorage> {
        InvoiceManager::new(
            storage.clone(),
            Arc::new(ChartOfAccounts::standard()),
            Arc::new(EngineConfig::default()),
            Arc::new(DefaultVoucherValidator),
        )
    }

    #[tokio::test]
    async fn test_sync_upserts_by_external_id() {
        let storage = MemoryStorage::new();
        let mut manager = manager(&storage);

        let first = manager.sync_invoice(invoice(77, "1001")).await.unwrap();
        let mut changed = invoice(77, "1001");
        changed.status = InvoiceStatus::Paid;
        let second = manager.sync_invoice(changed).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(manager.list_invoices(1).await.unwrap().len(), 1);
        assert_eq!(
            manager.get_invoice_required(first.id).await.unwrap().status,
            InvoiceStatus::Paid
        );

        let client = Client {
            id: 0,
            external_id: 5,
            company_id: 1,
            name: "Kund AB".to_string(),
            org_number: None,
            street_address: None,
            zip_code: None,
            city: None,
            country: None,
        };
        let a = manager.sync_client(client.clone()).await.unwrap();
        let b = manager.sync_client(client).await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_mark_paid_calls_service_first() {
        let storage = MemoryStorage::new();
        let mut manager = manager(&storage);
        let stored = manager.sync_invoice(invoice(77, "1001")).await.unwrap();

        manager.set_invoicing_service(Arc::new(RecordingService {
            fail: true,
            payments: Mutex::new(Vec::new()),
        }));
        assert!(matches!(
            manager.mark_invoice_paid(stored.id, date(15)).await,
            Err(LedgerError::ExternalService(_))
        ));
        let unchanged = manager.get_invoice_required(stored.id).await.unwrap();
        assert_eq!(unchanged.status, InvoiceStatus::Sent);
        assert_eq!(unchanged.paid_at, None);

        let service = Arc::new(RecordingService {
            fail: false,
            payments: Mutex::new(Vec::new()),
        });
        manager.set_invoicing_service(service.clone());
        let paid = manager.mark_invoice_paid(stored.id, date(15)).await.unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(paid.paid_at, Some(date(15)));
        assert_eq!(*service.payments.lock().unwrap(), vec![(77, date(15))]);
    }

    #[tokio::test]
    async fn test_book_invoices_batch() {
        let storage = MemoryStorage::new();
        let mut manager = manager(&storage);
        manager.set_provider(Arc::new(SaleProvider));
        let good = manager.sync_invoice(invoice(1, "1001")).await.unwrap();
        let broken = manager.sync_invoice(invoice(2, "broken")).await.unwrap();

        let report = manager
            .book_invoices_with_suggestions(1, &[good.id, broken.id, 4040])
            .await
            .unwrap();
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.errors().len(), 2);

        let booked = manager.get_invoice_required(good.id).await.unwrap();
        let voucher_id = booked.voucher_id.unwrap();
        let voucher = storage.get_voucher(voucher_id).await.unwrap().unwrap();
        assert_eq!(voucher.amount, BigDecimal::from(1250));
        assert_eq!(voucher.invoice_id, Some(good.id));
        assert_eq!(voucher.reference, "Faktura 1001");
        assert_eq!(voucher.date, date(1));

        let again = manager
            .book_invoices_with_suggestions(1, &[good.id])
            .await
            .unwrap();
        assert!(matches!(again.errors()[0].1, LedgerError::Validation(_)));
    }
}
