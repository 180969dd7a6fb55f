//! Synchronous processing strategy
//!
//! This module provides a sequential implementation of the ProcessingStrategy
//! trait. Commands are applied one at a time in file order on a current-thread
//! tokio runtime.
//!
//! # Design
//!
//! The SyncProcessingStrategy focuses on orchestration, delegating:
//! - CSV parsing to `SyncReader` (iterator interface)
//! - Command execution to `BatchProcessor::execute` (engine calls + logging)
//! - CSV output to `csv_format::write_accounts_csv` (format handling)
//!
//! # Memory Efficiency
//!
//! Commands are streamed one at a time; memory usage is
//! O(accounts + requests), not O(rows).

use crate::io::sync_reader::SyncReader;
use crate::strategy::{finish_pipeline, start_pipeline, EngineSettings, ProcessingStrategy};
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// Synchronous processing strategy
///
/// Implements the ProcessingStrategy trait using single-threaded, in-order
/// processing.
///
/// # Examples
///
/// ```no_run
/// use rust_reconciliation_engine::strategy::{
///     EngineSettings, ProcessingStrategy, SyncProcessingStrategy,
/// };
/// use std::path::Path;
/// use std::io;
///
/// let strategy = SyncProcessingStrategy::new(EngineSettings::default());
/// let mut output = io::stdout();
///
/// strategy.process(Path::new("commands.csv"), &mut output)
///     .expect("Processing failed");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SyncProcessingStrategy {
    settings: EngineSettings,
}

impl SyncProcessingStrategy {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    /// Process commands from input file and write the ledger to output
    ///
    /// This method orchestrates the complete synchronous processing pipeline:
    /// 1. Creates a SyncReader to stream commands from the CSV file
    /// 2. Assembles the engine and starts the notification worker
    /// 3. Runs each command through the engine in file order
    /// 4. Completes stalled approvals and writes the ledger
    ///
    /// # Error Handling
    ///
    /// Fatal errors (file not found, I/O errors) are returned immediately.
    /// Individual command errors are logged and processing continues.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let reader = SyncReader::new(input_path)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(async {
            let (processor, worker) = start_pipeline(&self.settings)?;

            for result in reader {
                match result {
                    Ok(command) => {
                        processor.execute(command).await;
                    }
                    Err(e) => warn!(error = %e, "skipping malformed command"),
                }
            }

            finish_pipeline(processor, worker, output).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const HEADER: &str = "action,request,user,kind,amount,method,actor,reason\n";

    /// Helper function to create a temporary CSV file for testing
    fn create_temp_csv(rows: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(format!("{}{}", HEADER, rows).as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    fn run(rows: &str) -> String {
        let file = create_temp_csv(rows);
        let strategy = SyncProcessingStrategy::default();
        let mut output = Vec::new();

        strategy.process(file.path(), &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_sync_strategy_approves_deposit() {
        let output = run("submit,r1,alice,deposit,100,bank_transfer,,\n\
                          approve,r1,,,,,admin,\n");

        assert_eq!(output, "user,balance,version\nalice,100.00,1\n");
    }

    #[test]
    fn test_sync_strategy_applies_commands_in_order() {
        // Withdrawal approval before the deposit fails; the retry after succeeds
        let output = run("submit,d1,alice,deposit,100,,,\n\
                          submit,w1,alice,withdrawal,60,,,\n\
                          approve,w1,,,,,admin,\n\
                          approve,d1,,,,,admin,\n\
                          approve,w1,,,,,admin,\n");

        assert_eq!(output, "user,balance,version\nalice,40.00,2\n");
    }

    #[test]
    fn test_sync_strategy_continues_on_malformed_record() {
        let output = run("submit,r1,alice,deposit,100,,,\n\
                          submit,r2,bob,deposit,invalid,,,\n\
                          approve,r1,,,,,admin,\n\
                          approve,r2,,,,,admin,\n");

        assert_eq!(output, "user,balance,version\nalice,100.00,1\n");
    }

    #[test]
    fn test_sync_strategy_handles_missing_file() {
        let strategy = SyncProcessingStrategy::default();
        let mut output = Vec::new();

        let result = strategy.process(Path::new("nonexistent.csv"), &mut output);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Failed to open file"));
    }

    #[test]
    fn test_sync_strategy_writes_audit_log() {
        let input = create_temp_csv("submit,r1,alice,deposit,100,,,\n\
                                     approve,r1,,,,,admin,\n\
                                     submit,r2,alice,withdrawal,10,,,\n\
                                     reject,r2,,,,,admin,no kyc\n");
        let audit = NamedTempFile::new().unwrap();
        let strategy = SyncProcessingStrategy::new(EngineSettings {
            audit_log: Some(audit.path().to_path_buf()),
            ..EngineSettings::default()
        });
        let mut output = Vec::new();

        strategy.process(input.path(), &mut output).unwrap();

        let trail = std::fs::read_to_string(audit.path()).unwrap();
        let lines: Vec<&str> = trail.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"deposit_approved\""));
        assert!(lines[1].contains("\"withdrawal_rejected\""));
        assert!(lines[1].contains("no kyc"));
    }

    #[test]
    fn test_sync_strategy_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyncProcessingStrategy>();
    }
}
