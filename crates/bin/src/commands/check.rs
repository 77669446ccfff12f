//! Check command - reports the density of every scope.

use crate::backend::engine;
use crate::cli::{CheckArgs, OutputFormat};
use crate::output::{optional, print_table, scope_json};

/// Run the check command
pub async fn run(args: &CheckArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine(&args.target).await?;
    let reports = engine.check(&args.target.column).await?;
    engine.store().close().await;

    let broken = reports.iter().filter(|r| !r.is_dense()).count();

    match format {
        OutputFormat::Human => {
            if reports.is_empty() {
                println!("No rows found.");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = reports
                .iter()
                .map(|r| {
                    vec![
                        r.scope.to_string(),
                        r.rows.to_string(),
                        r.distinct.to_string(),
                        optional(r.min),
                        optional(r.max),
                        if r.is_dense() { "yes" } else { "NO" }.to_string(),
                    ]
                })
                .collect();
            print_table(&["SCOPE", "ROWS", "DISTINCT", "MIN", "MAX", "DENSE"], &rows);
            println!();
            println!("{} scopes, {} not dense", reports.len(), broken);
        }
        OutputFormat::Json => {
            let entries: Vec<_> = reports
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "scope": scope_json(&r.scope),
                        "rows": r.rows,
                        "positioned": r.positioned,
                        "distinct": r.distinct,
                        "min": r.min,
                        "max": r.max,
                        "dense": r.is_dense(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string(&entries)?);
        }
    }

    if args.strict && broken > 0 {
        return Err(format!("{broken} scopes of {}.{} are not dense", args.target.table, args.target.column).into());
    }
    Ok(())
}
