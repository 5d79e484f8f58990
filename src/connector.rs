//! Row source boundary
//!
//! `RowSource` is the seam to storage: anything that can hand back daily
//! records for a date range. `Connector` wraps a source with range and
//! device filtering, stable date ordering and the optional intraday overlay.
//! This is the only stage of the card pipeline that can fail.

use chrono::NaiveDate;
use std::path::Path;

use crate::error::SourceError;
use crate::types::RawDayRecord;

/// Provider of daily records
pub trait RowSource {
    /// Rows for `[start, end_exclusive)`, optionally for one device.
    ///
    /// Implementations may return extra rows; `Connector` filters again.
    fn daily_rows(
        &self,
        start: NaiveDate,
        end_exclusive: NaiveDate,
        device_id: Option<&str>,
    ) -> Result<Vec<RawDayRecord>, SourceError>;

    /// Latest cumulative intraday snapshot for a day that is not finalized yet
    fn latest_intraday(
        &self,
        _date: NaiveDate,
        _device_id: Option<&str>,
    ) -> Result<Option<RawDayRecord>, SourceError> {
        Ok(None)
    }
}

/// Filtered, ordered access to a row source
pub struct Connector<'a> {
    source: &'a dyn RowSource,
    intraday_for: Option<NaiveDate>,
}

impl<'a> Connector<'a> {
    pub fn new(source: &'a dyn RowSource) -> Self {
        Self {
            source,
            intraday_for: None,
        }
    }

    /// Overlay the latest intraday snapshot for `day` when it falls in a fetched range
    pub fn with_intraday_for(mut self, day: Option<NaiveDate>) -> Self {
        self.intraday_for = day;
        self
    }

    /// Rows inside `[start, end_exclusive)` matching the device filter, sorted by date.
    ///
    /// Rows sharing a date keep the source's order. Source failures propagate unchanged.
    pub fn fetch(
        &self,
        start: NaiveDate,
        end_exclusive: NaiveDate,
        device_id: Option<&str>,
    ) -> Result<Vec<RawDayRecord>, SourceError> {
        if start >= end_exclusive {
            return Ok(Vec::new());
        }

        let in_scope = |row: &RawDayRecord| {
            row.date >= start
                && row.date < end_exclusive
                && device_id.map_or(true, |device| row.device_id == device)
        };

        let mut rows: Vec<RawDayRecord> = self
            .source
            .daily_rows(start, end_exclusive, device_id)?
            .into_iter()
            .filter(|row| in_scope(row))
            .collect();

        if let Some(day) = self.intraday_for.filter(|day| *day >= start && *day < end_exclusive) {
            if let Some(snapshot) = self.source.latest_intraday(day, device_id)? {
                if in_scope(&snapshot) {
                    tracing::debug!(%day, device_id = %snapshot.device_id, "applying intraday overlay");
                    rows.retain(|row| !(row.date == day && row.device_id == snapshot.device_id));
                    rows.push(snapshot);
                }
            }
        }

        rows.sort_by_key(|row| row.date);
        tracing::debug!(%start, %end_exclusive, rows = rows.len(), "fetched daily rows");
        Ok(rows)
    }
}

/// In-memory row source, loaded from JSON or NDJSON
#[derive(Debug, Clone, Default)]
pub struct MemoryRowSource {
    daily: Vec<RawDayRecord>,
    intraday: Vec<RawDayRecord>,
}

impl MemoryRowSource {
    pub fn new(daily: Vec<RawDayRecord>) -> Self {
        Self {
            daily,
            intraday: Vec::new(),
        }
    }

    /// Attach intraday snapshots; later snapshots for the same day win
    pub fn with_intraday(mut self, intraday: Vec<RawDayRecord>) -> Self {
        self.intraday = intraday;
        self
    }

    /// Parse a JSON array of rows
    pub fn from_json_array(json: &str) -> Result<Self, SourceError> {
        Ok(Self::new(parse_json_array(json)?))
    }

    /// Parse newline-delimited rows, one JSON object per line
    pub fn from_ndjson(ndjson: &str) -> Result<Self, SourceError> {
        Ok(Self::new(parse_ndjson(ndjson)?))
    }

    /// Load rows from a file; `.ndjson`/`.jsonl` files are line-delimited, anything else a JSON array
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        Ok(Self::new(load_rows(path)?))
    }

    pub fn len(&self) -> usize {
        self.daily.len()
    }

    pub fn is_empty(&self) -> bool {
        self.daily.is_empty()
    }
}

impl RowSource for MemoryRowSource {
    fn daily_rows(
        &self,
        start: NaiveDate,
        end_exclusive: NaiveDate,
        device_id: Option<&str>,
    ) -> Result<Vec<RawDayRecord>, SourceError> {
        Ok(self
            .daily
            .iter()
            .filter(|row| row.date >= start && row.date < end_exclusive)
            .filter(|row| device_id.map_or(true, |device| row.device_id == device))
            .cloned()
            .collect())
    }

    fn latest_intraday(
        &self,
        date: NaiveDate,
        device_id: Option<&str>,
    ) -> Result<Option<RawDayRecord>, SourceError> {
        Ok(self
            .intraday
            .iter()
            .filter(|row| row.date == date)
            .filter(|row| device_id.map_or(true, |device| row.device_id == device))
            .last()
            .cloned())
    }
}

/// Parse a JSON array of rows
pub fn parse_json_array(json: &str) -> Result<Vec<RawDayRecord>, SourceError> {
    let rows: Vec<RawDayRecord> = serde_json::from_str(json)?;
    Ok(rows)
}

/// Parse NDJSON rows, skipping blank lines
pub fn parse_ndjson(ndjson: &str) -> Result<Vec<RawDayRecord>, SourceError> {
    let mut rows = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let row = serde_json::from_str::<RawDayRecord>(trimmed).map_err(|e| SourceError::Parse {
            line: line_num + 1,
            message: e.to_string(),
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Read rows from disk, picking the format from the extension
pub fn load_rows(path: &Path) -> Result<Vec<RawDayRecord>, SourceError> {
    let content = std::fs::read_to_string(path)?;
    let line_delimited = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext, "ndjson" | "jsonl"));

    if line_delimited {
        parse_ndjson(&content)
    } else {
        parse_json_array(&content)
    }
}
