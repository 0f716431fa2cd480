//! VAT splitting and rule expression examples

use bigdecimal::BigDecimal;
use bookkeeping_core::rules::{apply, EvalContext, Expr};
use bookkeeping_core::{LineTemplate, RuleDefinition, VatCategory, VatSplit};
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("🧾 Bookkeeping Core - VAT and Rule Examples\n");

    // 1. Swedish VAT rates
    println!("📊 VAT categories:");
    for category in [
        VatCategory::Standard,
        VatCategory::Reduced,
        VatCategory::Low,
        VatCategory::Exempt,
    ] {
        println!(
            "  {:?}: {}% (output {:?}, input {:?})",
            category,
            category.rate(),
            category.output_account(),
            category.input_account()
        );
    }
    println!();

    // 2. Gross to net
    let gross = BigDecimal::from_str("1499.00")?;
    let split = VatSplit::from_gross(gross, &VatCategory::Standard.rate())?.rounded();
    println!("💰 1499.00 incl. 25% VAT:");
    println!("  Net: {}", split.net);
    println!("  VAT: {}", split.vat);
    println!();

    // 3. Expressions
    let amount = BigDecimal::from(-1250);
    let rate = BigDecimal::from(25);
    let ctx = EvalContext::new(&amount, Some(&rate))?;
    println!("🧮 Expressions for a bank amount of -1250 at 25%:");
    for text in ["ABS_AMOUNT", "NET_AMOUNT", "VAT_AMOUNT", "ORIGINAL_AMOUNT", "(TOTAL - 50) * 0.5"] {
        let value = Expr::parse(text)?.eval(&ctx)?;
        println!("  {:<20} = {}", text, value);
    }
    println!();

    // 4. A supplier rule with a fixed fee line
    let rule = RuleDefinition::new(vec![
        LineTemplate::new("1930", "0", "ABS_AMOUNT"),
        LineTemplate::new("5410", "NET_AMOUNT - 20", "0"),
        LineTemplate::new("6570", "20", "0"),
        LineTemplate::new("2641", "VAT_AMOUNT", "0"),
    ])
    .with_vat_rate(rate);
    println!("📒 Rule as stored:\n  {}", rule.to_json()?);
    println!("📒 Entries:");
    for entry in apply(&amount, &rule)? {
        println!("  {} D {} K {}", entry.account, entry.debit, entry.credit);
    }

    Ok(())
}
