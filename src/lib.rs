//! # Bookkeeping Core
//!
//! A double-entry bookkeeping engine for small businesses: bank statement
//! import with duplicate detection, rule based categorization with VAT
//! splitting, partial-amount reconciliation against invoices and receipts, and
//! export to the SIE 4 interchange format.
//!
//! ## Features
//!
//! - **Double-entry validation**: no unbalanced voucher is ever stored
//! - **Rule engine**: keyword rules whose lines are small arithmetic expressions over the bank amount
//! - **Statement import**: the bank's semicolon export and plain CSV, with re-import detection
//! - **Reconciliation**: partial matches between bank vouchers and invoices or receipts
//! - **SIE export**: byte-exact PC8 (code page 437) output
//! - **Storage abstraction**: database-agnostic design with an async storage trait
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bookkeeping_core::utils::MemoryStorage;
//! use bookkeeping_core::{ChartOfAccounts, Company, EngineConfig, Ledger};
//! use chrono::NaiveDate;
//!
//! # async fn run() -> bookkeeping_core::LedgerResult<()> {
//! let mut ledger = Ledger::new(MemoryStorage::new(), ChartOfAccounts::standard(), EngineConfig::load()?);
//! let company = ledger
//!     .add_company(Company {
//!         id: 0,
//!         name: "Exempel AB".to_string(),
//!         org_number: "556000-0000".to_string(),
//!         street: "Storgatan 1".to_string(),
//!         postal_code: "111 22".to_string(),
//!         city: "Stockholm".to_string(),
//!     })
//!     .await?;
//!
//! ledger.ingest(b"2024-03-01,Hyra mars,-8000\n", company.id).await?;
//! ledger.categorize_all(company.id).await?;
//! let file = ledger
//!     .export_company(company.id, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod export;
pub mod import;
pub mod ledger;
pub mod reconciliation;
pub mod rules;
pub mod tax;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use self::config::{EngineConfig, ExportConfig, KeywordAccount, OverMatchPolicy};
pub use export::{EncodingError, ExportArtifact, SieEncoder, SieOptions};
pub use import::{FormatError, IngestReport, StatementImporter, StatementLayout};
pub use ledger::{
    BalanceError, ChartOfAccounts, Ledger, LedgerIntegrityReport, UnitOfWork, VoucherInput,
};
pub use reconciliation::{MatchRequest, ReconciliationEngine, Settleable, Unsettled};
pub use rules::{
    Categorization, CategorizationRule, CategorizationSource, LineTemplate, RuleDefinition,
    RuleError,
};
pub use tax::vat::{VatCategory, VatPeriod, VatReport, VatSplit};
pub use traits::*;
pub use types::*;
