//! Asynchronous batch processing strategy
//!
//! This module provides an asynchronous, multi-threaded implementation of the
//! ProcessingStrategy trait. It processes commands in batches using thread-based
//! parallelism with user-based partitioning.
//!
//! # Architecture
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── AsyncReader (batch CSV reading)
//!     └── BatchProcessor (user partitioning + tokio tasks)
//!         └── ReconciliationEngine (shared stores, idempotency guard)
//! ```
//!
//! # Thread-Based Parallelism
//!
//! - Processes batches sequentially to maintain per-user ordering across the entire file
//! - Within each batch, partitions by owning user for parallel processing
//! - Commands for different users race on the shared stores; the ledger's
//!   compare-and-swap and the idempotency guard keep them consistent

use crate::io::async_reader::AsyncReader;
use crate::strategy::{finish_pipeline, start_pipeline, EngineSettings, ProcessingStrategy};
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Configuration for batch processing
///
/// Controls how commands are batched and the number of worker threads
/// for parallel processing within each batch.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Number of commands per batch
    pub batch_size: usize,
    /// Number of runtime worker threads
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig, replacing zero values with defaults
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                batch_size,
                default = default.batch_size,
                "invalid batch size, using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            warn!(
                max_concurrent_batches,
                default = default.max_concurrent_batches,
                "invalid worker count, using default"
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

/// Asynchronous batch processing strategy
///
/// Commands are read in batches and processed batch by batch. Within each
/// batch, commands are partitioned by owning user and different users run in
/// parallel on a multi-threaded tokio runtime.
#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    settings: EngineSettings,
    config: BatchConfig,
}

impl AsyncProcessingStrategy {
    /// Create a new AsyncProcessingStrategy
    ///
    /// # Arguments
    ///
    /// * `settings` - Engine assembly settings
    /// * `config` - BatchConfig with batch_size and max_concurrent_batches
    pub fn new(settings: EngineSettings, config: BatchConfig) -> Self {
        Self { settings, config }
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    /// Process commands from input file and write the ledger to output
    ///
    /// 1. Creates a tokio multi-threaded runtime
    /// 2. Assembles the engine and starts the notification worker
    /// 3. Reads commands in batches using AsyncReader
    /// 4. Processes each batch and waits for it before reading the next
    /// 5. Completes stalled approvals and writes the ledger
    ///
    /// # Error Handling
    ///
    /// Fatal errors (file not found, I/O errors, runtime errors) are returned immediately.
    /// Individual command errors are logged and processing continues.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent_batches)
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(async {
            let file = tokio::fs::File::open(input_path)
                .await
                .map_err(|e| format!("Failed to open file '{}': {}", input_path.display(), e))?;

            // csv-async reads futures-io, tokio files speak tokio-io
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            let (processor, worker) = start_pipeline(&self.settings)?;

            let mut batches = 0usize;
            loop {
                let batch = reader.read_batch(self.config.batch_size).await;
                if batch.is_empty() {
                    break;
                }

                // A user's commands may span batches, so each batch finishes first
                processor.process_batch(batch).await;
                batches += 1;
            }
            debug!(batches, "input exhausted");

            finish_pipeline(processor, worker, output).await
        })
    }
}
