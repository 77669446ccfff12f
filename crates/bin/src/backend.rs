//! Store connection and engine construction from command line flags.

use std::sync::Arc;

use positioning::config::{Positioned, TableSchema};
use positioning::{Key, Positioning, Store, Value};

use crate::cli::TargetArgs;

/// Redact credentials from a database URL for safe logging
pub fn redact_url(url: &str) -> String {
    if url.starts_with("sqlite:") {
        return url.to_string();
    }
    if let Ok(parsed) = url::Url::parse(url) {
        let mut redacted = parsed.clone();
        if !parsed.username().is_empty() {
            let _ = redacted.set_username("***");
        }
        if parsed.password().is_some() {
            let _ = redacted.set_password(Some("***"));
        }
        redacted.to_string()
    } else {
        "postgres://***@<unparsable-url>".to_string()
    }
}

/// Connect to the database named on the command line.
pub async fn connect(args: &TargetArgs) -> Result<Store, Box<dyn std::error::Error>> {
    let display_url = redact_url(&args.database_url);
    tracing::info!("Connecting to {}", display_url);

    let store = match Store::connect(&args.database_url).await {
        Ok(store) => store,
        Err(e) => return Err(format!("Failed to connect to {display_url}: {e}").into()),
    };
    Ok(match &args.lock_dir {
        Some(dir) => store.with_lock_dir(dir),
        None => store,
    })
}

/// Declare the single tracked column described by the flags.
pub fn schema(args: &TargetArgs) -> Result<TableSchema, positioning::Error> {
    let declaration = Positioned::on(args.scope.iter().cloned())
        .column(&args.column)
        .lock(args.lock);
    Ok(TableSchema::builder(&args.table, &args.table)
        .primary_key(args.primary_key.iter().cloned())
        .positioned(declaration)?
        .build()?)
}

/// Connect and build the engine for the target column.
pub async fn engine(args: &TargetArgs) -> Result<Positioning, Box<dyn std::error::Error>> {
    let store = connect(args).await?;
    let schema = schema(args)?;
    Ok(Positioning::new(&store, Arc::new(schema)))
}

/// Parse a key argument; composite keys are colon separated.
///
/// Integral components become integers, anything else is text.
pub fn parse_key(input: &str) -> Key {
    Key::new(
        input
            .split(':')
            .map(|part| match part.parse::<i64>() {
                Ok(i) => Value::Int(i),
                Err(_) => Value::Text(part.to_string()),
            })
            .collect(),
    )
}

/// Parse a `key=weight` pair.
pub fn parse_weight(input: &str) -> Result<(Key, f64), String> {
    let (key, weight) = input
        .rsplit_once('=')
        .ok_or_else(|| format!("expected key=weight, got `{input}`"))?;
    let weight = weight
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid weight in `{input}`: {e}"))?;
    Ok((parse_key(key.trim()), weight))
}
