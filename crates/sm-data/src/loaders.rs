//! CSV bar ingestion.
//!
//! Expected shape: one row per bar with columns `Datetime` (ISO 8601),
//! `Open`, `High`, `Low`, `Close` (f32) and `Volume` (f64), in ascending
//! `Datetime` order.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use sm_types::{Bar, DataError};

#[derive(Debug, Deserialize)]
struct BarRecord {
    #[serde(rename = "Datetime")]
    datetime: String,
    #[serde(rename = "Open")]
    open: f32,
    #[serde(rename = "High")]
    high: f32,
    #[serde(rename = "Low")]
    low: f32,
    #[serde(rename = "Close")]
    close: f32,
    #[serde(rename = "Volume")]
    volume: f64,
}

/// Load OHLCV bars from a CSV file.
pub fn load_bars_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Bar>, DataError> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).map_err(|e| DataError::Decode {
        message: format!("{}: {}", path.display(), e),
    })?;

    let mut bars = Vec::new();
    for result in reader.deserialize() {
        let record: BarRecord = result.map_err(|e| DataError::Decode {
            message: e.to_string(),
        })?;
        let timestamp = parse_datetime(&record.datetime)?;
        bars.push(Bar::new(
            timestamp,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume,
        ));
    }

    bars.sort_by_key(|bar| bar.timestamp);
    info!(path = %path.display(), bars = bars.len(), "loaded CSV bars");
    Ok(bars)
}

/// Parse an ISO 8601 datetime (with or without offset, or a bare date) into
/// epoch seconds.
fn parse_datetime(value: &str) -> Result<i64, DataError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc().timestamp());
    }
    if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc().timestamp());
    }
    Err(DataError::Decode {
        message: format!("unparseable Datetime: {value}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_well_formed_rows() {
        let file = write_csv(
            "Datetime,Open,High,Low,Close,Volume\n\
             2024-01-02 09:30:00,100.5,101.0,100.0,100.8,12345\n\
             2024-01-02 10:30:00,100.8,102.0,100.7,101.9,23456\n",
        );
        let bars = load_bars_csv(file.path()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].open, 100.5);
        assert_eq!(bars[1].close, 101.9);
        assert_eq!(bars[1].timestamp - bars[0].timestamp, 3600);
    }

    #[test]
    fn accepts_rfc3339_and_bare_dates() {
        let file = write_csv(
            "Datetime,Open,High,Low,Close,Volume\n\
             2024-01-02T09:30:00+00:00,1,2,0.5,1.5,10\n\
             2024-01-03,1.5,2.5,1.0,2.0,20\n",
        );
        let bars = load_bars_csv(file.path()).unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
    }

    #[test]
    fn sorts_rows_by_timestamp() {
        let file = write_csv(
            "Datetime,Open,High,Low,Close,Volume\n\
             2024-01-02 11:00:00,2,2,2,2,1\n\
             2024-01-02 09:00:00,1,1,1,1,1\n",
        );
        let bars = load_bars_csv(file.path()).unwrap();
        assert_eq!(bars[0].close, 1.0);
        assert_eq!(bars[1].close, 2.0);
    }

    #[test]
    fn rejects_malformed_datetime() {
        let file = write_csv(
            "Datetime,Open,High,Low,Close,Volume\n\
             yesterday,1,2,0.5,1.5,10\n",
        );
        assert!(matches!(
            load_bars_csv(file.path()),
            Err(DataError::Decode { .. })
        ));
    }

    #[test]
    fn rejects_missing_columns() {
        let file = write_csv("Datetime,Open\n2024-01-02,1\n");
        assert!(load_bars_csv(file.path()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_bars_csv("/nonexistent/bars.csv").is_err());
    }
}
