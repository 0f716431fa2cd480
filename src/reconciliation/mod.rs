//! Reconciliation of bank vouchers against customer invoices and supplier receipts
//!
//! A [`crate::types::Match`] records that part of a voucher's amount settles
//! part of a document. Remaining amounts are always derived from the stored
//! matches, never cached.

pub mod engine;

pub use engine::*;
