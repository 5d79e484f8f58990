//! Core types for the Synheart Cards pipeline
//!
//! This module defines the data structures that flow through the card
//! builder: raw per-day records coming in from a row source, and the
//! `CardEnvelope` going out to the API client.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::signals::AggregationMethod;

/// One row per device per calendar day.
///
/// The payload is an arbitrary JSON tree holding every metric for the day
/// (steps, body metrics, heart-rate summary, sleep sessions, nutrition).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDayRecord {
    pub device_id: String,
    pub date: NaiveDate,
    #[serde(alias = "raw_data", default)]
    pub payload: serde_json::Value,
}

impl RawDayRecord {
    pub fn new(device_id: impl Into<String>, date: NaiveDate, payload: serde_json::Value) -> Self {
        Self {
            device_id: device_id.into(),
            date,
            payload,
        }
    }
}

/// Period covered by a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
        }
    }
}

/// Card kinds the builder knows how to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    DailySummary,
    WeeklyOverview,
    MonthlyOverview,
}

impl CardType {
    pub const ALL: [CardType; 3] = [
        CardType::DailySummary,
        CardType::WeeklyOverview,
        CardType::MonthlyOverview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::DailySummary => "daily_summary",
            CardType::WeeklyOverview => "weekly_overview",
            CardType::MonthlyOverview => "monthly_overview",
        }
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            CardType::DailySummary => Granularity::Daily,
            CardType::WeeklyOverview => Granularity::Weekly,
            CardType::MonthlyOverview => Granularity::Monthly,
        }
    }
}

/// Goal status traffic light
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Red,
    Yellow,
    Green,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Red => "red",
            Status::Yellow => "yellow",
            Status::Green => "green",
        }
    }
}

/// Direction of a signal relative to its baseline window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Flat => "flat",
        }
    }
}

/// Requested time range, expressed in UTC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub timezone: String,
}

/// Manual tracking coverage details attached to the tracking consistency signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageVector {
    /// Share of the last 7 days with weight or calories logged (0-1)
    pub manual_coverage_7d: f64,
    /// Share of the last 30 days (or days since tracking began) with a manual entry (0-1)
    pub manual_coverage_30d: f64,
    /// Days since the most recent manual entry (999 when there is none)
    pub days_since_last_manual_entry: f64,
    /// Consecutive manual days ending on the card's last day
    pub streak_manual_days: u32,
}

/// A computed signal on a card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Human-readable name
    pub name: String,
    /// Catalog name this signal was computed from
    pub source_signal_id: String,
    pub value: Option<f64>,
    pub unit: Option<String>,
    /// Aggregation applied over the target range (None for virtual signals)
    pub aggregation: Option<AggregationMethod>,
    pub baseline: Option<f64>,
    pub delta: Option<f64>,
    pub target: Option<f64>,
    pub target_progress_pct: Option<f64>,
    pub priority: Option<u32>,
    pub status: Option<Status>,
    pub trend: Option<Trend>,
    pub coverage_vector: Option<CoverageVector>,
}

/// Provenance of one signal within the target range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSource {
    pub signal: String,
    pub row_count: usize,
    pub earliest_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub sources: Vec<EvidenceSource>,
    pub total_rows: usize,
}

/// Completeness of a single signal (0-1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalCoverage {
    pub signal_name: String,
    pub completeness: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub signals: Vec<SignalCoverage>,
    pub missing_sources: Vec<String>,
    pub partial_days: Vec<String>,
}

/// Query descriptor pointing at the raw records behind a signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drilldown {
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub params: BTreeMap<String, String>,
}

/// Rolled-up state of one priority tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityStatus {
    pub status: Status,
    /// Mean progress of the tier's members (0-100)
    pub progress: f64,
    pub trend: Trend,
    pub message: String,
}

/// Top-level card response, always constructible
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardEnvelope {
    pub id: String,
    pub schema_version: String,
    pub card_type: CardType,
    pub granularity: Granularity,
    pub time_range: TimeRange,
    pub generated_at: DateTime<Utc>,
    pub summary: String,
    pub signals: Vec<Signal>,
    pub evidence: Evidence,
    pub coverage: Coverage,
    pub warnings: Vec<String>,
    pub drilldowns: Vec<Drilldown>,
    pub priority_summary: Option<BTreeMap<String, PriorityStatus>>,
}
