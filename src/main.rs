//! Reconciliation Engine CLI
//!
//! Command-line interface for running operator commands from CSV files.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- commands.csv > ledger.csv
//! cargo run -- --strategy sync commands.csv > ledger.csv
//! cargo run -- --strategy async --batch-size 2000 --max-concurrent 8 commands.csv > ledger.csv
//! cargo run -- --withdrawal-fee-rate 0.02 --audit-log audit.jsonl -v commands.csv > ledger.csv
//! ```
//!
//! The program reads submit/approve/reject commands from the input CSV file,
//! runs them through the Reconciliation Engine using the selected processing
//! strategy, and writes the final ledger to stdout. Diagnostics go to stderr.
//!
//! # Processing Strategies
//!
//! - **sync**: Commands applied one at a time in file order (default)
//! - **async**: Batches partitioned by user and processed in parallel
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, file not readable, etc.)

use rust_reconciliation_engine::cli;
use rust_reconciliation_engine::logging;
use rust_reconciliation_engine::strategy;
use std::process;
use tracing::error;

fn main() {
    let args = cli::parse_args();
    logging::init_logging(args.verbose);

    let strategy = {
        let config = if matches!(args.strategy, cli::StrategyType::Async) {
            Some(args.to_batch_config())
        } else {
            None
        };
        strategy::create_strategy(args.strategy.clone(), args.to_engine_settings(), config)
    };

    let mut output = std::io::stdout();
    if let Err(e) = strategy.process(&args.input_file, &mut output) {
        error!(error = %e, "processing failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
