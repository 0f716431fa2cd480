//! Ledger module containing the orchestrator, vouchers, receipts and invoices

pub mod chart;
pub mod core;
pub mod invoice;
pub mod receipt;
pub mod unit_of_work;
pub mod validator;
pub mod voucher;

pub use chart::*;
pub use self::core::*;
pub use invoice::*;
pub use receipt::*;
pub use unit_of_work::*;
pub use validator::{balance_tolerance, totals, validate, BalanceError};
pub use voucher::*;
