pub mod rows;

pub use rows::RowsClient;

use crate::domain::booking::BookingRecord;

/// Optional secondary destination for scraped records.
#[async_trait::async_trait]
pub trait SheetSync: Send + Sync {
    /// Appends records; returns whether they were accepted. Never fails the run.
    async fn append(&self, records: &[BookingRecord]) -> bool;
}
