//! Row-to-record parsing.
//!
//! Parsing is all-or-nothing: a batch with one malformed row is rejected
//! outright rather than returned with the bad row dropped.

use chrono::NaiveDate;

use crate::{PipelineError, Record, Row};

/// Number of columns in a row: `[date, open, high, low, close, volume]`.
pub const COLUMN_COUNT: usize = 6;

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Parses one row of raw fields into a [`Record`].
///
/// The returned error carries row index `0`; [`parse_batch`] rewrites it to
/// the row's position in the batch.
pub fn parse_record<S: AsRef<str>>(fields: &[S]) -> Result<Record, PipelineError> {
    parse_row(fields).map_err(|reason| PipelineError::MalformedRecord { row: 0, reason })
}

/// Parses every row in order, failing on the first malformed one.
pub fn parse_batch(rows: &[Row]) -> Result<Vec<Record>, PipelineError> {
    rows.iter()
        .enumerate()
        .map(|(row, fields)| {
            parse_row(fields).map_err(|reason| PipelineError::MalformedRecord { row, reason })
        })
        .collect()
}

fn parse_row<S: AsRef<str>>(fields: &[S]) -> Result<Record, String> {
    if fields.len() != COLUMN_COUNT {
        return Err(format!(
            "expected {COLUMN_COUNT} fields, found {}",
            fields.len()
        ));
    }
    let field = |i: usize| fields[i].as_ref().trim();

    Ok(Record {
        date: parse_date(field(0))?,
        open: parse_number("open", field(1))?,
        high: parse_number("high", field(2))?,
        low: parse_number("low", field(3))?,
        close: parse_number("close", field(4))?,
        volume: parse_volume(field(5))?,
    })
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .ok_or_else(|| format!("invalid date '{raw}'"))
}

fn parse_number(column: &str, raw: &str) -> Result<f64, String> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(format!("{column} is not a finite number: '{raw}'")),
    }
}

// Volume arrives as either "1200" or "1200.0"; fractional shares are truncated.
fn parse_volume(raw: &str) -> Result<u64, String> {
    let value = parse_number("volume", raw)?;
    if value < 0.0 {
        return Err(format!("volume is negative: '{raw}'"));
    }
    // `u64::MAX as f64` rounds up to 2^64, which itself does not fit.
    if value >= u64::MAX as f64 {
        return Err(format!("volume is out of range: '{raw}'"));
    }
    Ok(value.trunc() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn row(fields: &[&str]) -> Row {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn parses_well_formed_row() {
        let record = parse_record(&["2020-01-02", "100", "105", "95", "102", "1000"]).unwrap();
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2020, 1, 2).unwrap());
        assert_eq!(record.open, 100.0);
        assert_eq!(record.high, 105.0);
        assert_eq!(record.low, 95.0);
        assert_eq!(record.close, 102.0);
        assert_eq!(record.volume, 1000);
    }

    #[test]
    fn accepts_slash_separated_dates() {
        let record = parse_record(&["2020/01/02", "1", "2", "0.5", "1.5", "10"]).unwrap();
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2020, 1, 2).unwrap());
    }

    #[test]
    fn truncates_fractional_volume() {
        let record = parse_record(&["2020-01-02", "1", "2", "0.5", "1.5", "1200.9"]).unwrap();
        assert_eq!(record.volume, 1200);
    }

    #[test]
    fn rejects_volume_beyond_u64() {
        let err = parse_record(&["2020-01-02", "1", "2", "0.5", "1.5", "1e30"]).unwrap_err();
        match err {
            PipelineError::MalformedRecord { reason, .. } => {
                assert!(reason.contains("out of range"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(parse_record(&["2020-01-02", "1", "2", "0.5", "1.5", "18446744073709551616"]).is_err());
    }

    #[test]
    fn accepts_large_volume_within_range() {
        let record = parse_record(&["2020-01-02", "1", "2", "0.5", "1.5", "1e18"]).unwrap();
        assert_eq!(record.volume, 1_000_000_000_000_000_000);
    }

    #[test]
    fn rejects_invalid_calendar_date() {
        let err = parse_record(&["2020-13-40", "1", "2", "0.5", "1.5", "10"]).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { row: 0, .. }));
    }

    #[test]
    fn rejects_non_numeric_field() {
        let err = parse_record(&["2020-01-02", "1", "high", "0.5", "1.5", "10"]).unwrap_err();
        match err {
            PipelineError::MalformedRecord { reason, .. } => assert!(reason.contains("high")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_non_finite_numbers() {
        assert!(parse_record(&["2020-01-02", "NaN", "2", "0.5", "1.5", "10"]).is_err());
        assert!(parse_record(&["2020-01-02", "1", "inf", "0.5", "1.5", "10"]).is_err());
    }

    #[test]
    fn rejects_negative_volume() {
        assert!(parse_record(&["2020-01-02", "1", "2", "0.5", "1.5", "-10"]).is_err());
    }

    #[test]
    fn rejects_missing_fields() {
        let err = parse_record(&["2020-01-02", "1", "2"]).unwrap_err();
        match err {
            PipelineError::MalformedRecord { reason, .. } => {
                assert_eq!(reason, "expected 6 fields, found 3")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_extra_fields() {
        let err = parse_record(&["2020-01-02", "1", "2", "0.5", "1.5", "10", "extra"]).unwrap_err();
        match err {
            PipelineError::MalformedRecord { reason, .. } => {
                assert_eq!(reason, "expected 6 fields, found 7")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn batch_reports_index_of_first_bad_row() {
        let rows = vec![
            row(&["2020-01-02", "100", "105", "95", "102", "1000"]),
            row(&["2020-01-03", "102", "110", "100", "108", "1200"]),
            row(&["not-a-date", "1", "1", "1", "1", "1"]),
            row(&["also-bad", "1", "1", "1", "1", "1"]),
        ];
        let err = parse_batch(&rows).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { row: 2, .. }));
    }

    #[test]
    fn empty_batch_parses_to_empty_vec() {
        assert!(parse_batch(&[]).unwrap().is_empty());
    }

    proptest! {
        /// parse_batch(rows)[i] corresponds to rows[i] for any all-valid input.
        #[test]
        fn batch_preserves_order(days in proptest::collection::vec(0u32..3650, 0..50)) {
            let base = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
            let rows: Vec<Row> = days
                .iter()
                .enumerate()
                .map(|(i, d)| {
                    let date = (base + chrono::Duration::days(i64::from(*d)))
                        .format("%Y-%m-%d")
                        .to_string();
                    let high = i.to_string();
                    row(&[date.as_str(), "1", high.as_str(), "0", "1", "10"])
                })
                .collect();

            let records = parse_batch(&rows).unwrap();
            prop_assert_eq!(records.len(), rows.len());
            for (i, record) in records.iter().enumerate() {
                prop_assert_eq!(record.high, i as f64);
                prop_assert_eq!(record.date.format("%Y-%m-%d").to_string(), rows[i][0].clone());
            }
        }
    }
}
