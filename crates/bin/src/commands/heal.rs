//! Heal command - rewrites every scope to 1..N.

use positioning::Clock;

use crate::backend::engine;
use crate::cli::{HealArgs, OutputFormat};

/// Run the heal command
pub async fn run(args: &HealArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine(&args.target).await?;
    let report = engine.heal(&args.target.column, args.order.as_ref()).await?;

    match format {
        OutputFormat::Human => {
            println!(
                "Healed {} rows in {} scopes of {}.{}",
                report.rows, report.scopes, args.target.table, args.target.column
            );
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "table": args.target.table,
                "column": args.target.column,
                "scopes": report.scopes,
                "rows": report.rows,
                "at": engine.store().clock().now_rfc3339(),
            });
            println!("{}", serde_json::to_string(&value)?);
        }
    }

    engine.store().close().await;
    Ok(())
}
