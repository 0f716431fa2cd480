//! Categorization: the restricted expression language, rule application,
//! rule administration and the selection order for uncategorized vouchers

pub mod categorizer;
pub mod engine;
pub mod expr;
pub mod manager;

pub use categorizer::*;
pub use engine::{
    apply, apply_with_limit, default_correction_limit, CategorizationRule, LineTemplate,
    RuleDefinition, RuleError,
};
pub use expr::{EvalContext, Expr, ExprError};
pub use manager::*;
