//! Blocking command reader for the sync strategy
//!
//! Wraps `csv::Reader` and yields one `Result<Command, String>` per row, so the
//! caller can skip a bad row and keep going. Opening the file is the only fatal
//! error. Row errors carry the file line number (header counted as line 1).
//!
//! ```no_run
//! use rust_reconciliation_engine::io::sync_reader::SyncReader;
//! use std::path::Path;
//!
//! let reader = SyncReader::new(Path::new("commands.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(command) => println!("{} {}", command.action(), command.request_id()),
//!         Err(e) => eprintln!("skipped: {}", e),
//!     }
//! }
//! ```
//!
//! Rows are read one at a time; nothing beyond the current record is buffered
//! apart from the reader's 8 KiB I/O buffer.

use crate::io::csv_format::{convert_command_record, CommandRecord};
use crate::types::Command;
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::path::Path;

/// Iterator over the commands in a CSV file
#[derive(Debug)]
pub struct SyncReader {
    reader: csv::Reader<File>,
    line_num: usize,
}

impl SyncReader {
    /// Open `path` for reading
    ///
    /// Fields are trimmed and rows may omit trailing optional columns.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the CSV file
    ///
    /// # Returns
    ///
    /// * `Ok(SyncReader)` if file opened successfully
    /// * `Err(String)` if file could not be opened
    pub fn new(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 0,
        })
    }
}

impl Iterator for SyncReader {
    type Item = Result<Command, String>;

    /// Get the next command from the CSV file
    ///
    /// This method:
    /// 1. Reads the next CSV row and deserializes it to CommandRecord
    /// 2. Converts it to a Command using csv_format::convert_command_record
    /// 3. Includes line numbers in error messages for debugging
    ///
    /// # Returns
    ///
    /// * `Some(Ok(Command))` - Successfully parsed command
    /// * `Some(Err(String))` - Parse or conversion error with line number
    /// * `None` - End of file reached
    fn next(&mut self) -> Option<Self::Item> {
        // Get next CSV record
        let mut deserializer = self.reader.deserialize::<CommandRecord>();

        match deserializer.next()? {
            Ok(csv_record) => {
                self.line_num += 1;
                // Line number is 1-based and counts the header
                Some(
                    convert_command_record(csv_record)
                        .map_err(|e| format!("Line {}: {}", self.line_num + 1, e)),
                )
            }
            Err(e) => {
                self.line_num += 1;
                Some(Err(format!(
                    "Line {}: CSV parse error: {}",
                    self.line_num + 1,
                    e
                )))
            }
        }
    }
}
