//! `stockval-replay <movements.json> [METHOD]`
//!
//! Values a JSON array of movements and prints the trail as JSON on stdout.

use std::process::ExitCode;

use anyhow::{Context, Result, bail};

use stockval_infra::ValuationConfig;
use stockval_inventory::ValuationMethod;

fn main() -> ExitCode {
    stockval_observability::init();

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "stockval-replay failed");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every movement was valued.
fn run() -> Result<bool> {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: stockval-replay <movements.json> [CMP|FIFO|LIFO]");
    };
    let method = args
        .next()
        .map(|raw| raw.parse::<ValuationMethod>())
        .transpose()
        .context("parsing method argument")?;

    let config = ValuationConfig::from_env().context("loading configuration")?;
    let input = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;

    let trail = stockval_cli::run(&input, method, config)?;
    println!("{}", serde_json::to_string_pretty(&trail)?);
    Ok(trail.iter().all(|e| !e.is_rejected()))
}
