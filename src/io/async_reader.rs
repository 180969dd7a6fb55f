//! Asynchronous CSV reader with batch interface
//!
//! Provides a streaming interface over operator commands from a CSV file.
//! Supports batch reading for efficient async processing.
//!
//! # Design
//!
//! The AsyncReader uses:
//! - csv-async for streaming CSV parsing
//! - tokio for async runtime and concurrency primitives
//! - Batch reading for efficient processing
//!
//! # Architecture
//!
//! ```text
//! CSV Reader → AsyncReader → Batches of Commands
//!                  ↓
//!           csv_format module
//!           (CommandRecord, convert_command_record)
//! ```

use crate::io::csv_format::{convert_command_record, CommandRecord};
use crate::types::Command;
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// Asynchronous CSV reader
///
/// Provides batch reading interface over operator commands.
/// Maintains streaming behavior with constant memory usage.
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    /// Create a new AsyncReader from an async reader
    ///
    /// # Arguments
    ///
    /// * `reader` - Async reader providing CSV data
    ///
    /// # Returns
    ///
    /// A new AsyncReader instance
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self { csv_reader }
    }

    /// Read a batch of commands
    ///
    /// This method reads up to `batch_size` rows from the CSV file,
    /// converting them to Commands. Invalid rows are logged and skipped.
    ///
    /// # Arguments
    ///
    /// * `batch_size` - Maximum number of commands to read
    ///
    /// # Returns
    ///
    /// A vector of successfully converted commands.
    /// Returns an empty vector when the end of the file is reached.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<Command> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<CommandRecord>();

        while batch.len() < batch_size {
            match records.next().await {
                Some(Ok(record)) => match convert_command_record(record) {
                    Ok(command) => batch.push(command),
                    Err(e) => warn!(error = %e, "skipping malformed command"),
                },
                Some(Err(e)) => warn!(error = %e, "skipping unparseable CSV row"),
                None => break,
            }
        }

        batch
    }
}
