//! Reposition command - reorders the given rows within their scopes.

use positioning::{Clock, RepositionOrder};

use crate::backend::{engine, parse_key, parse_weight};
use crate::cli::{OutputFormat, RepositionArgs};

/// Build the requested order from either the key list or the weights.
fn order(args: &RepositionArgs) -> Result<RepositionOrder, String> {
    if args.weights.is_empty() {
        return Ok(RepositionOrder::from_keys(
            args.keys.iter().map(|k| parse_key(k)),
        ));
    }
    let weights = args
        .weights
        .iter()
        .map(|w| parse_weight(w))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RepositionOrder::from_weights(
        weights.into_iter().map(|(key, weight)| (Some(key), Some(weight))),
    ))
}

/// Run the reposition command
pub async fn run(
    args: &RepositionArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let order = order(args)?;
    let engine = engine(&args.target).await?;
    let report = engine.reposition(&args.target.column, &order).await?;

    match format {
        OutputFormat::Human => {
            if report.rows == 0 {
                println!("No matching rows found.");
            } else {
                println!(
                    "Repositioned {} rows in {} scopes",
                    report.rows, report.scopes
                );
            }
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "requested": order.keys().len(),
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
