//! Ledger export

pub mod sie;

pub use sie::{export_file_name, EncodingError, ExportArtifact, SieEncoder, SieOptions, EXPORT_CHARSET};
