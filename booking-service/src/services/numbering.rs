//! Human-readable reference numbers.
//!
//! Sequences come from the store's atomic counters; this module only decides
//! the counter key and the printed shape.

use crate::models::BookingKind;
use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceFormat {
    pub prefix: &'static str,
    /// Whether the number carries a `YYYYMMDD` stamp and a per-day counter.
    pub dated: bool,
    pub width: usize,
}

pub const PAYMENT_FORMAT: ReferenceFormat = ReferenceFormat {
    prefix: "PAY",
    dated: true,
    width: 6,
};

impl ReferenceFormat {
    pub fn for_booking(kind: BookingKind) -> Self {
        match kind {
            BookingKind::Appointment => ReferenceFormat {
                prefix: kind.reference_prefix(),
                dated: false,
                width: 6,
            },
            _ => ReferenceFormat {
                prefix: kind.reference_prefix(),
                dated: true,
                width: 4,
            },
        }
    }

    /// Counter document key. Dated formats restart every UTC day.
    pub fn counter_key(&self, date: NaiveDate) -> String {
        if self.dated {
            format!("{}-{}", self.prefix, date.format("%Y%m%d"))
        } else {
            self.prefix.to_string()
        }
    }

    pub fn render(&self, date: NaiveDate, sequence: u64) -> String {
        if self.dated {
            format!(
                "{}{}{:0width$}",
                self.prefix,
                date.format("%Y%m%d"),
                sequence,
                width = self.width
            )
        } else {
            format!("{}{:0width$}", self.prefix, sequence, width = self.width)
        }
    }
}
