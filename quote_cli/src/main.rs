//! # Quote CLI
//!
//! Recalculates a quote file against a catalog and an association rule file
//! and prints the breakdown, warnings and price.
//!
//! ```text
//! quote_cli <quote.json> <catalog.json> <rules.json> [--save] [--user NAME] [--json]
//! ```
//!
//! `--save` writes the recalculated quote back under a file lock.
//! `RUST_LOG=debug` shows the engine's passes.

use std::path::PathBuf;
use std::process::ExitCode;

use quote_core::engine::RecalcStatus;
use quote_core::file_io::{load_catalog, load_quote_with_lock_check, load_rules, save_quote, FileLock};
use quote_core::quote::{Quote, QuoteOutcome};
use quote_core::QuoteResult;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: quote_cli <quote.json> <catalog.json> <rules.json> [--save] [--user NAME] [--json]";

struct Args {
    quote: PathBuf,
    catalog: PathBuf,
    rules: PathBuf,
    save: bool,
    json: bool,
    user: String,
}

fn parse_args() -> Result<Args, String> {
    let mut positional = Vec::new();
    let mut save = false;
    let mut json = false;
    let mut user = std::env::var("USER").unwrap_or_else(|_| "quote_cli".to_string());

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--save" => save = true,
            "--json" => json = true,
            "--user" => user = args.next().ok_or("--user needs a value")?,
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with("--") => return Err(format!("unknown option {}\n{}", flag, USAGE)),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let [quote, catalog, rules]: [PathBuf; 3] = positional.try_into().map_err(|_| USAGE.to_string())?;
    Ok(Args {
        quote,
        catalog,
        rules,
        save,
        json,
        user,
    })
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_breakdown(quote: &Quote) {
    println!("═══════════════════════════════════════════════════════════════════════════");
    println!("  {}  {}  ({})", quote.meta.reference, quote.meta.client, quote.meta.author);
    println!("═══════════════════════════════════════════════════════════════════════════");
    println!(
        "{:>3}  {:<12} {:<4} {:>8} {:>8} {:>6} {:>7} {:>9} {:>8} {:>9}",
        "#", "code", "unit", "comp", "larg", "esp", "qt", "material", "edges", "total"
    );
    for row in &quote.rows {
        let cell = |value: Option<f64>, error: bool| match (value, error) {
            (_, true) => "ERR".to_string(),
            (Some(v), false) => format!("{:.0}", v),
            (None, false) => "-".to_string(),
        };
        let indent = if row.is_associated() { "  " } else { "" };
        println!(
            "{:>3}  {:<12} {:<4} {:>8} {:>8} {:>6} {:>7.2} {:>9.2} {:>8.2} {:>9.2}{}",
            row.id,
            format!("{}{}", indent, row.definition_code),
            row.unit.code(),
            cell(row.comp.value, row.comp.error),
            cell(row.larg.value, row.larg.error),
            cell(row.esp.value, row.esp.error),
            row.qt_total,
            row.costs.material_total,
            row.costs.edge_total,
            row.costs.total,
            if row.locked { "  [locked]" } else { "" }
        );
    }
    println!();
}

fn print_outcome(outcome: &QuoteOutcome) {
    let report = &outcome.report;
    let status = match report.status {
        RecalcStatus::Converged => "converged",
        RecalcStatus::IterationCapReached => "iteration cap reached",
        RecalcStatus::AlreadyRunning => "already running",
    };
    println!(
        "Recalculation: {} after {} pass(es), {} row(s) inserted",
        status, report.iterations, report.rows_inserted
    );

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &report.warnings {
            println!("  - {}", warning);
        }
    }

    let price = &outcome.price;
    println!();
    println!("Subtotals:");
    println!("  Material  {:>10.2}", price.totals.material);
    println!("  Edges     {:>10.2}", price.totals.edge);
    println!("  Labor     {:>10.2}", price.totals.labor);
    println!("  Finishes  {:>10.2}", price.totals.finish);
    println!("  ─────────────────────");
    println!("  Cost      {:>10.2}", price.cost_total);
    println!("  Sale      {:>10.2}", price.sale_total);
    println!("  Unit      {:>10.2}  (÷ {})", price.unit_price, price.item_quantity);
}

fn run(args: &Args) -> QuoteResult<()> {
    let (mut quote, holder) = load_quote_with_lock_check(&args.quote)?;
    let catalog = load_catalog(&args.catalog)?;
    let rules = load_rules(&args.rules)?;

    if let Some(holder) = &holder {
        warn!(user = %holder.user_id, machine = %holder.machine, "quote is open elsewhere, read-only");
    }

    let outcome = quote.recalculate(&catalog, &rules)?;

    if args.json {
        let json = serde_json::to_string_pretty(&outcome).map_err(|e| quote_core::QuoteError::SerializationError {
            reason: e.to_string(),
        })?;
        println!("{}", json);
    } else {
        print_breakdown(&quote);
        print_outcome(&outcome);
    }

    if args.save {
        let _lock = FileLock::acquire(&args.quote, args.user.as_str())?;
        save_quote(&quote, &args.quote)?;
        info!(path = %args.quote.display(), "quote saved");
    }
    Ok(())
}

fn main() -> ExitCode {
    init_logging();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error [{}]: {}", error.error_code(), error);
            ExitCode::FAILURE
        }
    }
}
