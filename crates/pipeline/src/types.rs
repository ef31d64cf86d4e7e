//! Record and aggregate value types.
//!
//! A [`Record`] is one daily observation parsed from a cold-store row; an
//! [`Aggregate`] is the single summary a pipeline run publishes. Both are
//! immutable once built.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One raw row of fields as read from the cold store, in fixed column order
/// `[date, open, high, low, close, volume]`.
pub type Row = Vec<String>;

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One daily observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Record {
    /// Returns the value of `field` for this record.
    ///
    /// Volume is widened to `f64` so every field compares on the same scale.
    pub fn value(&self, field: RecordField) -> f64 {
        match field {
            RecordField::Open => self.open,
            RecordField::High => self.high,
            RecordField::Low => self.low,
            RecordField::Close => self.close,
            RecordField::Volume => self.volume as f64,
        }
    }
}

// ---------------------------------------------------------------------------

/// The numeric field an aggregation ranks records by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    Open,
    #[default]
    High,
    Low,
    Close,
    Volume,
}

impl RecordField {
    /// Returns the lowercase column name.
    pub fn as_str(self) -> &'static str {
        match self {
            RecordField::Open => "open",
            RecordField::High => "high",
            RecordField::Low => "low",
            RecordField::Close => "close",
            RecordField::Volume => "volume",
        }
    }
}

impl std::fmt::Display for RecordField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// The record with the largest value in [`Aggregate::field`], reduced to its
/// date and that value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Date of the winning record.
    pub date: NaiveDate,
    /// Field the batch was ranked by.
    pub field: RecordField,
    /// Value of `field` on the winning record.
    pub value: f64,
}

impl Aggregate {
    /// Key under which both sinks store this aggregate: the ISO-8601 calendar
    /// date (`YYYY-MM-DD`).
    pub fn storage_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    /// Decimal rendering of [`Aggregate::value`] written to the fast store.
    ///
    /// Whole numbers carry no fractional part (`110.0` renders as `"110"`).
    pub fn cache_value(&self) -> String {
        format!("{}", self.value)
    }
}

impl std::fmt::Display for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}={}", self.storage_key(), self.field, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        Record {
            date: NaiveDate::from_ymd_opt(2020, 1, 3).unwrap(),
            open: 102.0,
            high: 110.0,
            low: 100.0,
            close: 108.0,
            volume: 1200,
        }
    }

    #[test]
    fn record_value_selects_field() {
        let record = sample_record();
        assert_eq!(record.value(RecordField::Open), 102.0);
        assert_eq!(record.value(RecordField::High), 110.0);
        assert_eq!(record.value(RecordField::Low), 100.0);
        assert_eq!(record.value(RecordField::Close), 108.0);
        assert_eq!(record.value(RecordField::Volume), 1200.0);
    }

    #[test]
    fn default_field_is_high() {
        assert_eq!(RecordField::default(), RecordField::High);
    }

    #[test]
    fn storage_key_is_iso_date() {
        let agg = Aggregate {
            date: NaiveDate::from_ymd_opt(2020, 1, 3).unwrap(),
            field: RecordField::High,
            value: 110.0,
        };
        assert_eq!(agg.storage_key(), "2020-01-03");
    }

    #[test]
    fn cache_value_drops_trailing_zero_fraction() {
        let mut agg = Aggregate {
            date: NaiveDate::from_ymd_opt(2020, 1, 3).unwrap(),
            field: RecordField::High,
            value: 110.0,
        };
        assert_eq!(agg.cache_value(), "110");
        agg.value = 102.5;
        assert_eq!(agg.cache_value(), "102.5");
    }

    #[test]
    fn aggregate_serializes_date_as_iso_string() {
        let agg = Aggregate {
            date: NaiveDate::from_ymd_opt(2020, 1, 3).unwrap(),
            field: RecordField::High,
            value: 110.0,
        };
        let json = serde_json::to_string(&agg).unwrap();
        assert_eq!(json, r#"{"date":"2020-01-03","field":"high","value":110.0}"#);
    }
}
