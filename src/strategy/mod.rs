//! Processing strategy module for the command pipeline
//!
//! This module defines the Strategy pattern for complete processing pipelines,
//! encompassing CSV parsing, command execution against the Reconciliation
//! Engine and ledger output. This allows different processing implementations
//! (synchronous, asynchronous batch) to be selected at runtime.

use crate::audit::{JsonlAuditSink, MemoryAuditSink};
use crate::cli::StrategyType;
use crate::core::{
    AuditSink, BatchProcessor, EngineConfig, InMemoryLedgerStore, InMemoryRequestStore,
    ReconciliationEngine,
};
use crate::io::csv_format::write_accounts_csv;
use crate::notify::{
    DispatchStats, LogChannel, NotificationChannel, NotificationDispatcher, WebhookChannel,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub mod r#async;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use sync::SyncProcessingStrategy;

/// Everything needed to assemble an engine for one pipeline run
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    /// Fee schedule, lease TTL and retry budgets
    pub config: EngineConfig,

    /// Append the audit trail to this JSON-lines file instead of keeping it in memory
    pub audit_log: Option<PathBuf>,

    /// Webhook endpoints notified after every decision
    pub webhooks: Vec<String>,
}

/// Processing strategy trait for complete command pipelines
///
/// This trait defines the interface for different processing implementations.
/// Each strategy must be able to read commands from a CSV file, run them
/// through the Reconciliation Engine, and write the final ledger to output.
pub trait ProcessingStrategy: Send + Sync {
    /// Process commands from input file and write the ledger to output
    ///
    /// # Arguments
    ///
    /// * `input_path` - Path to the input CSV file containing commands
    /// * `output` - Mutable reference to a writer for outputting ledger accounts
    ///
    /// # Returns
    ///
    /// * `Ok(())` if all processing completed successfully (or with recoverable errors)
    /// * `Err(String)` if a fatal error occurred (file not found, I/O error, etc.)
    ///
    /// Individual command errors are logged but do not cause this method to
    /// return an error. Processing continues with the next command.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String>;
}

/// Create a processing strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - The type of processing strategy to create (Sync or Async)
/// * `settings` - Engine assembly settings shared by both strategies
/// * `config` - Optional configuration for async batch processing (ignored for sync)
///
/// # Returns
///
/// A boxed trait object implementing the ProcessingStrategy trait
pub fn create_strategy(
    strategy_type: StrategyType,
    settings: EngineSettings,
    config: Option<BatchConfig>,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(settings)),
        StrategyType::Async => {
            let config = config.unwrap_or_default();
            Box::new(AsyncProcessingStrategy::new(settings, config))
        }
    }
}

/// Assemble the engine and start the notification worker
///
/// Must be called from within a tokio runtime.
pub(crate) fn start_pipeline(
    settings: &EngineSettings,
) -> Result<(BatchProcessor, JoinHandle<DispatchStats>), String> {
    let audit: Arc<dyn AuditSink> = match &settings.audit_log {
        Some(path) => Arc::new(JsonlAuditSink::open(path).map_err(|e| {
            format!("Failed to open audit log '{}': {}", path.display(), e)
        })?),
        None => Arc::new(MemoryAuditSink::new()),
    };

    let mut channels: Vec<Arc<dyn NotificationChannel>> = vec![Arc::new(LogChannel)];
    for (index, url) in settings.webhooks.iter().enumerate() {
        let channel = WebhookChannel::new(format!("webhook-{}", index + 1), url.clone())
            .map_err(|e| format!("Failed to set up webhook '{}': {}", url, e))?;
        channels.push(Arc::new(channel));
    }

    let (dispatcher, worker) =
        NotificationDispatcher::new(channels, settings.config.notify_retry_backoff);

    let engine = ReconciliationEngine::new(
        Arc::new(InMemoryLedgerStore::new()),
        Arc::new(InMemoryRequestStore::new()),
        audit,
        settings.config.clone(),
    )
    .with_notifier(dispatcher);

    Ok((BatchProcessor::new(engine), worker.spawn()))
}

/// Complete stalled approvals, write the ledger and drain notifications
pub(crate) async fn finish_pipeline(
    processor: BatchProcessor,
    worker: JoinHandle<DispatchStats>,
    output: &mut dyn Write,
) -> Result<(), String> {
    let engine = processor.engine().clone();
    drop(processor);

    let report = engine
        .reconcile_stalled()
        .await
        .map_err(|e| format!("Failed to scan pending requests: {}", e))?;
    for (request_id, e) in &report.failed {
        error!(request_id = %request_id, error = %e, "stalled approval could not be completed");
    }
    if !report.completed.is_empty() {
        info!(completed = report.completed.len(), "completed stalled approvals");
    }

    let pending = engine
        .pending_requests()
        .map_err(|e| format!("Failed to read requests: {}", e))?;
    if !pending.is_empty() {
        info!(pending = pending.len(), "requests left pending");
    }

    let accounts = engine
        .accounts()
        .map_err(|e| format!("Failed to read ledger: {}", e))?;
    let scale = engine.config().fees.currency_scale;

    // Last sender goes away here, letting the worker drain and exit
    drop(engine);
    match worker.await {
        Ok(stats) => debug!(
            delivered = stats.delivered,
            failed = stats.failed,
            "notifications drained"
        ),
        Err(e) => warn!(error = %e, "notification worker did not finish cleanly"),
    }

    write_accounts_csv(&accounts, scale, output)
}
