//! Bank statement import

pub mod csv;
pub mod ingest;

pub use self::csv::{decode, parse_statement, FormatError, RowError, StatementLayout, StatementRow};
pub use ingest::*;
