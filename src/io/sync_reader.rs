//! Blocking request reader
//!
//! `SyncReader` walks an `account,action,amount` CSV one row at a time and
//! yields each row as an [`UpdateRequest`], or as an error message naming the
//! line it came from. It never buffers more than one record, so arbitrarily
//! large replay files stream through in constant memory.
//!
//! ```no_run
//! use ledger_locks::io::sync_reader::SyncReader;
//! use std::path::Path;
//!
//! let reader = SyncReader::open(Path::new("requests.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(request) => println!("{:?}", request),
//!         Err(e) => eprintln!("{}", e),
//!     }
//! }
//! ```
//!
//! Opening the file can fail outright. After that a bad row is reported with
//! its line number and iteration moves on; only an I/O failure ends it early.

use crate::io::csv_format::{convert_csv_record, CsvRecord};
use crate::types::UpdateRequest;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Iterator over the update requests of a CSV source
#[derive(Debug)]
pub struct SyncReader<R = File> {
    csv: csv::Reader<R>,
    headers: Option<csv::StringRecord>,
    row: csv::StringRecord,
    finished: bool,
}

impl SyncReader<File> {
    /// Open a CSV file for streaming
    pub fn open(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;
        Ok(Self::from_reader(file))
    }
}

impl<R: Read> SyncReader<R> {
    /// Stream requests from any byte source
    ///
    /// Fields are trimmed and rows may omit the trailing amount column.
    pub fn from_reader(source: R) -> Self {
        let csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);

        Self {
            csv,
            headers: None,
            row: csv::StringRecord::new(),
            finished: false,
        }
    }

    fn fail(&mut self, message: String) -> Option<Result<UpdateRequest, String>> {
        self.finished = true;
        Some(Err(message))
    }
}

impl<R: Read> Iterator for SyncReader<R> {
    type Item = Result<UpdateRequest, String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if self.headers.is_none() {
            match self.csv.headers() {
                Ok(headers) => self.headers = Some(headers.clone()),
                Err(e) => return self.fail(format!("Line 1: unreadable header: {}", e)),
            }
        }

        match self.csv.read_record(&mut self.row) {
            Ok(false) => {
                self.finished = true;
                None
            }
            Ok(true) => {
                let line = self.row.position().map_or(0, |p| p.line());
                let parsed = self
                    .row
                    .deserialize::<CsvRecord>(self.headers.as_ref())
                    .map_err(|e| format!("Line {}: malformed row: {}", line, e))
                    .and_then(|record| {
                        convert_csv_record(record).map_err(|e| format!("Line {}: {}", line, e))
                    });
                Some(parsed)
            }
            // The underlying source broke; nothing after this point is readable
            Err(e) if e.is_io_error() => self.fail(format!("Read failed: {}", e)),
            Err(e) => Some(Err(format!("Malformed CSV: {}", e))),
        }
    }
}
