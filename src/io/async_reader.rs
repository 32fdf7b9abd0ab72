//! Non-blocking request reader
//!
//! `AsyncReader` is the tokio-side counterpart of
//! [`SyncReader`](super::SyncReader). It hands out one request at a time
//! through [`next_request`](AsyncReader::next_request), or a bounded batch
//! through [`read_batch`](AsyncReader::read_batch), which logs and counts the
//! rows it has to skip so a replay can report them.
//!
//! ```text
//! tokio File ─compat─> csv_async ─> CsvRecord ─convert_csv_record─> UpdateRequest
//! ```

use crate::io::csv_format::{convert_csv_record, CsvRecord};
use crate::types::UpdateRequest;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// Streaming reader of update requests over any `futures` byte source
pub struct AsyncReader<R: AsyncRead + Unpin> {
    rows: csv_async::AsyncDeserializer<R>,
    /// Data rows consumed so far
    consumed: u64,
    skipped: u64,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    /// Wrap `source`; the first row must be the `account,action,amount` header
    pub fn new(source: R) -> Self {
        let rows = csv_async::AsyncReaderBuilder::new()
            .trim(csv_async::Trim::All)
            .flexible(true)
            .create_deserializer(source);

        Self {
            rows,
            consumed: 0,
            skipped: 0,
        }
    }

    /// Next row as a request, or an error naming its line; `None` at end of input
    pub async fn next_request(&mut self) -> Option<Result<UpdateRequest, String>> {
        let row = self.rows.deserialize::<CsvRecord>().next().await?;
        self.consumed += 1;
        // Line 1 is the header
        let line = self.consumed + 1;

        Some(match row {
            Ok(record) => convert_csv_record(record).map_err(|e| format!("Line {}: {}", line, e)),
            Err(e) => Err(format!("Line {}: malformed row: {}", line, e)),
        })
    }

    /// Collect up to `batch_size` requests, skipping unusable rows
    ///
    /// An empty batch means the input is exhausted.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<UpdateRequest> {
        let mut batch = Vec::with_capacity(batch_size);

        while batch.len() < batch_size {
            match self.next_request().await {
                Some(Ok(request)) => batch.push(request),
                Some(Err(e)) => {
                    self.skipped += 1;
                    warn!("Skipping record: {}", e);
                }
                None => break,
            }
        }

        batch
    }

    /// Rows dropped by `read_batch` so far
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
