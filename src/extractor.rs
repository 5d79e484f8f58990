//! Signal extraction
//!
//! Resolves catalog paths against a day's JSON payload. Extraction is
//! best-effort per (row, signal) pair: a missing key, a short list or a
//! non-numeric leaf yields `None` for that pair and nothing else.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::signals::{SignalCatalog, SignalSpec};
use crate::types::RawDayRecord;

/// Walk a dot path ("body_metrics.weight_kg", "sleep_sessions.0.duration_minutes").
///
/// Integer segments index into arrays, anything else is an object key.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index)),
        _ => None,
    })
}

/// Numeric leaf to f64. Booleans are not numbers; numeric strings are parsed.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Extract one signal value from one record
pub fn extract(record: &RawDayRecord, spec: &SignalSpec) -> Option<f64> {
    let raw = match spec.path.as_deref() {
        Some(path) => resolve_path(&record.payload, path)?,
        None => record.payload.as_object()?.get(&spec.name)?,
    };
    to_number(raw)
}

/// Values for one signal in row order, skipping rows without a value
pub fn extract_series(rows: &[RawDayRecord], spec: &SignalSpec) -> Vec<f64> {
    rows.iter().filter_map(|row| extract(row, spec)).collect()
}

/// Like [`extract_series`] but keeps the date of each value
pub fn extract_dated_series(rows: &[RawDayRecord], spec: &SignalSpec) -> Vec<(NaiveDate, f64)> {
    rows.iter()
        .filter_map(|row| extract(row, spec).map(|value| (row.date, value)))
        .collect()
}

/// Series for every catalog signal; signals with no values map to an empty series
pub fn extract_all(rows: &[RawDayRecord], catalog: &SignalCatalog) -> HashMap<String, Vec<f64>> {
    catalog
        .iter()
        .map(|spec| (spec.name.clone(), extract_series(rows, spec)))
        .collect()
}

/// All catalog signals present in a single record
pub fn extract_row(record: &RawDayRecord, catalog: &SignalCatalog) -> HashMap<String, f64> {
    catalog
        .iter()
        .filter_map(|spec| extract(record, spec).map(|value| (spec.name.clone(), value)))
        .collect()
}

/// One dated value of a signal history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub device_id: String,
    pub value: f64,
}

/// Per-day history of an arbitrary payload path.
///
/// When several rows share a date the last one in row order wins, so a
/// source that returns cumulative snapshots in collection order yields the
/// latest snapshot for each day.
pub fn signal_history(rows: &[RawDayRecord], path: &str) -> Vec<HistoryPoint> {
    let mut latest: BTreeMap<NaiveDate, &RawDayRecord> = BTreeMap::new();
    for row in rows {
        latest.insert(row.date, row);
    }

    latest
        .into_values()
        .filter_map(|row| {
            let value = resolve_path(&row.payload, path).and_then(to_number)?;
            Some(HistoryPoint {
                date: row.date,
                device_id: row.device_id.clone(),
                value,
            })
        })
        .collect()
}
