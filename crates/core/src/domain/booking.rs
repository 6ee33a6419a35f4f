use serde::{Deserialize, Serialize};

/// One top-level calendar entry scraped from the reservation calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub resid: String,
    pub booking_id: String,
    pub guest: String,
    pub source: String,
    pub balance: String,
    pub status: String,
    pub element_id: String,
    pub extracted_at: String,
}

impl BookingRecord {
    /// Column order used when appending to a spreadsheet table.
    pub fn to_row(&self) -> [&str; 7] {
        [
            self.booking_id.as_str(),
            self.guest.as_str(),
            self.source.as_str(),
            self.balance.as_str(),
            self.status.as_str(),
            self.resid.as_str(),
            self.extracted_at.as_str(),
        ]
    }
}
