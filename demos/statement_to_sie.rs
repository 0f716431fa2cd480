//! Import a bank statement, categorize it and write a SIE file

use bookkeeping_core::utils::MemoryStorage;
use bookkeeping_core::{ChartOfAccounts, Company, EngineConfig, Ledger, LineTemplate, RuleDefinition};
use chrono::NaiveDate;
use tracing_subscriber::EnvFilter;

const STATEMENT: &str = "\
Kontoutdrag 1234-5678;;;;
Bokföringsdag;Valutadag;Referens;Insättning/Uttag;Bokfört saldo
2024-01-05;2024-01-05;HYRA JANUARI;-8 000,00;12 000,00
2024-01-07;2024-01-07;Kund AB;12 500,00;24 500,00
2024-01-09;2024-01-09;OKQ8 Lund;-612,40;23 887,60
2024-01-12;2024-01-12;Swish inbetalning;350,00;24 237,60
;;Summa;;24 237,60
";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("🧾 Bookkeeping Core - Statement to SIE\n");

    let config = EngineConfig::load()?;
    let mut ledger = Ledger::new(MemoryStorage::new(), ChartOfAccounts::standard(), config);
    let company = ledger
        .add_company(Company {
            id: 0,
            name: "Exempel Bygg AB".to_string(),
            org_number: "556677-8899".to_string(),
            street: "Storgatan 1".to_string(),
            postal_code: "211 20".to_string(),
            city: "Malmö".to_string(),
        })
        .await?;

    // Customer payments include 25% VAT
    let sale = RuleDefinition::new(vec![
        LineTemplate::new("1930", "ABS_AMOUNT", "0"),
        LineTemplate::new("3041", "0", "NET_AMOUNT"),
        LineTemplate::new("2611", "0", "VAT_AMOUNT"),
    ])
    .with_vat_rate(bigdecimal::BigDecimal::from(25))
    .with_description("Customer payment");
    ledger.add_rule("Kund AB", "3041", Some(sale)).await?;

    println!("📥 Importing statement...");
    let report = ledger.ingest(STATEMENT.as_bytes(), company.id).await?;
    println!(
        "  {} new, {} duplicates, {} skipped\n",
        report.new,
        report.duplicates,
        report.skipped.len()
    );

    println!("🏷️  Categorizing...");
    let batch = ledger.categorize_all(company.id).await?;
    for (voucher_id, outcome) in &batch.outcomes {
        match outcome {
            Ok(result) => {
                println!("  ✓ {} {} ({:?})", voucher_id, result.voucher.reference, result.source);
                for entry in &result.voucher.entries {
                    println!("      {} D {} K {}", entry.account, entry.debit, entry.credit);
                }
            }
            Err(e) => println!("  ✗ {}: {}", voucher_id, e),
        }
    }
    println!();

    let integrity = ledger.validate_integrity(company.id).await?;
    println!("🔍 Integrity: {}", if integrity.is_valid { "ok" } else { "issues found" });
    for issue in &integrity.issues {
        println!("  - {}", issue);
    }
    println!();

    let generated_on = NaiveDate::from_ymd_opt(2024, 12, 31).ok_or("invalid date")?;
    let artifact = ledger.export_company(company.id, generated_on).await?;
    std::fs::write(&artifact.file_name, &artifact.bytes)?;
    println!(
        "💾 Wrote {} ({} bytes, {})",
        artifact.file_name,
        artifact.bytes.len(),
        artifact.charset
    );

    Ok(())
}
