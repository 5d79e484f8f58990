//! Card builder
//!
//! Orchestrates one card request:
//! 1. Connector - fetch target and baseline rows
//! 2. Extractor - rows to per-signal value series
//! 3. Feature library - aggregate, baseline, delta, goal fields, coverage
//! 4. Envelope assembly - evidence, warnings, drilldowns, priority summary
//!
//! Daily, weekly and monthly cards differ only in how the target range and
//! the baseline window are derived. The only error is a failing row source.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::connector::{Connector, RowSource};
use crate::error::{CardError, SourceError};
use crate::extractor::{extract_dated_series, extract_series};
use crate::features::{
    aggregate, baseline_window, combine_trends, compute_trend, coverage_ratio, delta,
    detect_partial_days, find_tracking_start_date, goal_progress_pct, goal_status,
    has_tracked_field, manual_tracking_coverage_vector, tracking_status_from_coverage,
    trailing_average, worst_status, DEFAULT_TREND_THRESHOLD, MANUAL_FIELDS,
};
use crate::goals::{GoalCatalog, GoalSpec, TRACKING_CONSISTENCY};
use crate::request::CardRequest;
use crate::signals::{display_name, SignalCatalog, SignalSpec};
use crate::types::{
    CardEnvelope, CardType, Coverage, Drilldown, Evidence, EvidenceSource, PriorityStatus,
    RawDayRecord, Signal, SignalCoverage, Status, TimeRange,
};
use crate::SCHEMA_VERSION;

pub const FUTURE_RANGE_WARNING: &str = "Requested range is entirely in the future.";
pub const NO_DATA_WARNING: &str = "No data found in the requested range.";
pub const NO_DATA_SUMMARY: &str = "No data available for this period.";

/// Days in one baseline "month"
const BASELINE_MONTH_DAYS: i64 = 30;

/// Target range and baseline window of one card
#[derive(Debug, Clone, Copy, PartialEq)]
struct CardWindow {
    card_type: CardType,
    start: NaiveDate,
    end_exclusive: NaiveDate,
    baseline_start: NaiveDate,
}

impl CardWindow {
    fn daily(date: NaiveDate) -> Self {
        let days = i64::from(baseline_window(CardType::DailySummary.granularity()));
        Self {
            card_type: CardType::DailySummary,
            start: date,
            end_exclusive: date + Duration::days(1),
            baseline_start: date - Duration::days(days),
        }
    }

    fn weekly(week_start: NaiveDate) -> Self {
        let weeks = i64::from(baseline_window(CardType::WeeklyOverview.granularity()));
        Self {
            card_type: CardType::WeeklyOverview,
            start: week_start,
            end_exclusive: week_start + Duration::days(7),
            baseline_start: week_start - Duration::weeks(weeks),
        }
    }

    fn monthly(first_day: NaiveDate) -> Self {
        let months = i64::from(baseline_window(CardType::MonthlyOverview.granularity()));
        Self {
            card_type: CardType::MonthlyOverview,
            start: first_day,
            end_exclusive: first_day
                .checked_add_months(Months::new(1))
                .unwrap_or(first_day + Duration::days(31)),
            baseline_start: first_day - Duration::days(months * BASELINE_MONTH_DAYS),
        }
    }

    fn days(&self) -> i64 {
        (self.end_exclusive - self.start).num_days()
    }

    fn last_day(&self) -> NaiveDate {
        self.end_exclusive - Duration::days(1)
    }
}

/// Builds card envelopes from a row source and the signal/goal catalogs
pub struct CardBuilder<'a> {
    source: &'a dyn RowSource,
    signals: &'a SignalCatalog,
    goals: &'a GoalCatalog,
    now: Option<DateTime<Utc>>,
    intraday_today: bool,
}

impl<'a> CardBuilder<'a> {
    /// Builder over the built-in catalogs
    pub fn new(source: &'a dyn RowSource) -> Self {
        Self {
            source,
            signals: SignalCatalog::builtin(),
            goals: GoalCatalog::builtin(),
            now: None,
            intraday_today: false,
        }
    }

    pub fn with_catalogs(mut self, signals: &'a SignalCatalog, goals: &'a GoalCatalog) -> Self {
        self.signals = signals;
        self.goals = goals;
        self
    }

    /// Pin the clock used for `generated_at`, the future-range check and "today"
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Replace today's daily row with the latest intraday snapshot
    pub fn with_intraday_today(mut self, enabled: bool) -> Self {
        self.intraday_today = enabled;
        self
    }

    pub fn build_daily_summary(
        &self,
        date: NaiveDate,
        tz: Tz,
        device_id: Option<&str>,
    ) -> Result<CardEnvelope, SourceError> {
        self.build_card(CardWindow::daily(date), tz, device_id)
    }

    /// Seven days starting at `week_start` (any weekday)
    pub fn build_weekly_overview(
        &self,
        week_start: NaiveDate,
        tz: Tz,
        device_id: Option<&str>,
    ) -> Result<CardEnvelope, SourceError> {
        self.build_card(CardWindow::weekly(week_start), tz, device_id)
    }

    /// The full calendar month; an impossible (year, month) is a client error
    pub fn build_monthly_overview(
        &self,
        year: i32,
        month: u32,
        tz: Tz,
        device_id: Option<&str>,
    ) -> Result<CardEnvelope, CardError> {
        let first_day = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| CardError::InvalidDate {
            field: "month".to_string(),
            value: format!("{year}-{month:02}"),
        })?;
        Ok(self.build_card(CardWindow::monthly(first_day), tz, device_id)?)
    }

    /// Build the card a validated request asks for
    pub fn build(&self, request: &CardRequest) -> Result<CardEnvelope, SourceError> {
        let window = match request.card_type {
            CardType::DailySummary => CardWindow::daily(request.from),
            CardType::WeeklyOverview => CardWindow::weekly(request.from),
            CardType::MonthlyOverview => {
                CardWindow::monthly(request.from.with_day(1).unwrap_or(request.from))
            }
        };
        self.build_card(window, request.timezone, request.device_id.as_deref())
    }

    fn build_card(
        &self,
        window: CardWindow,
        tz: Tz,
        device_id: Option<&str>,
    ) -> Result<CardEnvelope, SourceError> {
        let now = self.now.unwrap_or_else(Utc::now);
        let time_range = TimeRange {
            start: local_midnight_utc(window.start, tz),
            end: local_midnight_utc(window.end_exclusive, tz),
            timezone: tz.name().to_string(),
        };

        let mut warnings = Vec::new();
        if time_range.start > now {
            warnings.push(FUTURE_RANGE_WARNING.to_string());
        }

        let today = now.with_timezone(&tz).date_naive();
        let connector =
            Connector::new(self.source).with_intraday_for(self.intraday_today.then_some(today));

        let target_rows = connector.fetch(window.start, window.end_exclusive, device_id)?;
        if target_rows.is_empty() {
            tracing::debug!(card_type = window.card_type.as_str(), start = %window.start, "no rows in target range");
            warnings.push(NO_DATA_WARNING.to_string());
            return Ok(CardEnvelope {
                id: Uuid::new_v4().to_string(),
                schema_version: SCHEMA_VERSION.to_string(),
                card_type: window.card_type,
                granularity: window.card_type.granularity(),
                time_range,
                generated_at: now,
                summary: NO_DATA_SUMMARY.to_string(),
                signals: Vec::new(),
                evidence: Evidence::default(),
                coverage: Coverage::default(),
                warnings,
                drilldowns: Vec::new(),
                priority_summary: None,
            });
        }

        let baseline_rows = connector.fetch(window.baseline_start, window.start, device_id)?;
        tracing::debug!(
            card_type = window.card_type.as_str(),
            target_rows = target_rows.len(),
            baseline_rows = baseline_rows.len(),
            "building card"
        );

        let days_in_range = window.days();
        let mut signals = Vec::with_capacity(self.signals.len() + 1);
        let mut evidence_sources = Vec::with_capacity(self.signals.len());
        let mut signal_coverages = Vec::with_capacity(self.signals.len());
        let mut drilldowns = Vec::with_capacity(self.signals.len());
        let mut missing_sources = Vec::new();

        for spec in self.signals.iter() {
            let dated = extract_dated_series(&target_rows, spec);
            let values: Vec<f64> = dated.iter().map(|(_, value)| *value).collect();
            let baseline_values = extract_series(&baseline_rows, spec);

            let mut signal = self.catalog_signal(spec, &values, &baseline_values);
            if let Some(goal) = self.goals.lookup(&spec.name) {
                apply_goal(&mut signal, goal);
                signal.trend = Some(compute_trend(&values, &baseline_values, DEFAULT_TREND_THRESHOLD));
            }
            signals.push(signal);

            if values.is_empty() {
                missing_sources.push(spec.name.clone());
            }
            signal_coverages.push(SignalCoverage {
                signal_name: spec.name.clone(),
                completeness: coverage_ratio(values.len(), days_in_range),
            });
            evidence_sources.push(EvidenceSource {
                signal: spec.name.clone(),
                row_count: values.len(),
                earliest_date: dated.iter().map(|(date, _)| *date).min(),
                latest_date: dated.iter().map(|(date, _)| *date).max(),
            });
            drilldowns.push(drilldown(spec, &window, device_id));
        }

        if let Some(goal) = self.goals.lookup(TRACKING_CONSISTENCY) {
            signals.push(tracking_signal(goal, &target_rows, &baseline_rows, &window));
        }
        let computed = signals.iter().filter(|signal| signal.value.is_some()).count();

        let row_midnights: Vec<DateTime<Utc>> = target_rows
            .iter()
            .map(|row| Utc.from_utc_datetime(&row.date.and_time(NaiveTime::MIN)))
            .collect();
        let partial_days = detect_partial_days(&row_midnights);

        if !missing_sources.is_empty() {
            warnings.push(format!("Missing in target range: {}", missing_sources.join(", ")));
        }

        let priority_summary = priority_summary(&signals, self.goals);
        let total_rows = target_rows.len();

        Ok(CardEnvelope {
            id: Uuid::new_v4().to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            card_type: window.card_type,
            granularity: window.card_type.granularity(),
            time_range,
            generated_at: now,
            summary: format!("{computed} signal(s) computed across {total_rows} records."),
            signals,
            evidence: Evidence {
                sources: evidence_sources,
                total_rows,
            },
            coverage: Coverage {
                signals: signal_coverages,
                missing_sources,
                partial_days,
            },
            warnings,
            drilldowns,
            priority_summary,
        })
    }

    fn catalog_signal(&self, spec: &SignalSpec, values: &[f64], baseline_values: &[f64]) -> Signal {
        let value = aggregate(values, spec.aggregation);
        let baseline = trailing_average(baseline_values, None);
        Signal {
            name: display_name(&spec.name),
            source_signal_id: spec.name.clone(),
            value,
            unit: spec.unit.clone(),
            aggregation: Some(spec.aggregation),
            baseline,
            delta: delta(value, baseline),
            target: None,
            target_progress_pct: None,
            priority: None,
            status: None,
            trend: None,
            coverage_vector: None,
        }
    }
}

fn apply_goal(signal: &mut Signal, goal: &GoalSpec) {
    let progress = goal_progress_pct(signal.value, goal.target_value, goal.target_type);
    signal.target = Some(goal.target_value);
    signal.target_progress_pct = progress;
    signal.priority = Some(goal.priority);
    signal.status = Some(goal_status(progress));
}

/// Virtual signal: share of target days with a manual entry.
///
/// Status comes from the short-window coverage vector, which looks back
/// through the baseline rows as well.
fn tracking_signal(
    goal: &GoalSpec,
    target_rows: &[RawDayRecord],
    baseline_rows: &[RawDayRecord],
    window: &CardWindow,
) -> Signal {
    // Several devices may log the same day; count each day once
    let tracked_days: BTreeSet<NaiveDate> = target_rows
        .iter()
        .filter(|row| has_tracked_field(&row.payload, &MANUAL_FIELDS))
        .map(|row| row.date)
        .collect();
    let value = coverage_ratio(tracked_days.len(), window.days());

    let history: Vec<RawDayRecord> = baseline_rows.iter().chain(target_rows).cloned().collect();
    let last_day = window.last_day();
    let tracking_start = find_tracking_start_date(&history).unwrap_or(last_day);
    let vector = manual_tracking_coverage_vector(&history, goal.window_days, tracking_start, last_day);

    Signal {
        name: display_name(TRACKING_CONSISTENCY),
        source_signal_id: TRACKING_CONSISTENCY.to_string(),
        value: Some(value),
        unit: Some("ratio".to_string()),
        aggregation: None,
        baseline: None,
        delta: None,
        target: Some(goal.target_value),
        target_progress_pct: goal_progress_pct(Some(value), goal.target_value, goal.target_type),
        priority: Some(goal.priority),
        status: Some(tracking_status_from_coverage(vector.manual_coverage_7d)),
        trend: None,
        coverage_vector: Some(vector),
    }
}

fn drilldown(spec: &SignalSpec, window: &CardWindow, device_id: Option<&str>) -> Drilldown {
    let mut params = BTreeMap::new();
    params.insert("signal".to_string(), spec.name.clone());
    params.insert(
        "path".to_string(),
        spec.path.clone().unwrap_or_else(|| spec.name.clone()),
    );
    params.insert("from".to_string(), window.start.to_string());
    params.insert("to".to_string(), window.end_exclusive.to_string());
    if let Some(device) = device_id {
        params.insert("device_id".to_string(), device.to_string());
    }
    Drilldown {
        label: format!("Signal: {}", spec.name),
        kind: "records".to_string(),
        params,
    }
}

/// Roll goal-bearing signals up into one entry per priority tier ("P1", "P2", ...)
fn priority_summary(signals: &[Signal], goals: &GoalCatalog) -> Option<BTreeMap<String, PriorityStatus>> {
    let mut tiers: BTreeMap<u32, Vec<(&Signal, Status)>> = BTreeMap::new();
    for signal in signals {
        if let (Some(priority), Some(status)) = (signal.priority, signal.status) {
            tiers.entry(priority).or_default().push((signal, status));
        }
    }
    if tiers.is_empty() {
        return None;
    }

    let summary = tiers
        .into_iter()
        .map(|(priority, members)| {
            let statuses: Vec<Status> = members.iter().map(|(_, status)| *status).collect();
            let trends: Vec<_> = members.iter().filter_map(|(signal, _)| signal.trend).collect();
            let progress = members
                .iter()
                .map(|(signal, _)| signal.target_progress_pct.unwrap_or(0.0))
                .sum::<f64>()
                / members.len() as f64;
            let message = members
                .iter()
                .map(|(signal, status)| {
                    let label = goals
                        .lookup(&signal.source_signal_id)
                        .map_or(signal.name.as_str(), |goal| goal.label.as_str());
                    format!("{label}: {}", status.as_str())
                })
                .collect::<Vec<_>>()
                .join("; ");

            (
                format!("P{priority}"),
                PriorityStatus {
                    status: worst_status(&statuses),
                    progress,
                    trend: combine_trends(&trends),
                    message,
                },
            )
        })
        .collect();

    Some(summary)
}

/// Local midnight of `date` in `tz`, as a UTC instant.
///
/// Ambiguous midnights take the earlier instant; a midnight skipped by a DST
/// jump resolves to 01:00 local.
fn local_midnight_utc(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::MemoryRowSource;
    use crate::types::{Granularity, Trend};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).unwrap()
    }

    fn make_daily_row(date: NaiveDate, payload: Value) -> RawDayRecord {
        RawDayRecord::new("test-device", date, payload)
    }

    fn source_with_baseline(target: Vec<RawDayRecord>, baseline_steps: Option<u32>) -> MemoryRowSource {
        let mut rows = target;
        if let Some(steps) = baseline_steps {
            for i in 1..=7 {
                rows.push(make_daily_row(day(2, 16) - Duration::days(i), json!({ "steps_total": steps })));
            }
        }
        MemoryRowSource::new(rows)
    }

    fn daily(source: &MemoryRowSource) -> CardEnvelope {
        CardBuilder::new(source)
            .with_now(fixed_now())
            .build_daily_summary(day(2, 16), Tz::UTC, None)
            .unwrap()
    }

    fn signal<'e>(envelope: &'e CardEnvelope, id: &str) -> &'e Signal {
        envelope
            .signals
            .iter()
            .find(|s| s.source_signal_id == id)
            .unwrap()
    }

    struct FailingSource;

    impl RowSource for FailingSource {
        fn daily_rows(
            &self,
            _start: NaiveDate,
            _end_exclusive: NaiveDate,
            _device_id: Option<&str>,
        ) -> Result<Vec<RawDayRecord>, SourceError> {
            Err(SourceError::Unavailable("timeout".to_string()))
        }
    }

    #[test]
    fn test_empty_data_envelope() {
        let envelope = daily(&MemoryRowSource::default());

        assert_eq!(envelope.card_type, CardType::DailySummary);
        assert_eq!(envelope.summary, NO_DATA_SUMMARY);
        assert_eq!(envelope.warnings, vec![NO_DATA_WARNING.to_string()]);
        assert!(envelope.signals.is_empty());
        assert!(envelope.drilldowns.is_empty());
        assert_eq!(envelope.evidence.total_rows, 0);
        assert!(envelope.coverage.partial_days.is_empty());
        assert!(envelope.coverage.missing_sources.is_empty());
        assert!(envelope.coverage.signals.is_empty());
        assert!(envelope.evidence.sources.is_empty());
        assert_eq!(envelope.priority_summary, None);
        assert_eq!(envelope.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_end_to_end_daily() {
        let source = source_with_baseline(
            vec![make_daily_row(
                day(2, 16),
                json!({"steps_total": 2530, "heart_rate_summary": {"avg_hr": 76}}),
            )],
            Some(8000),
        );
        let envelope = daily(&source);

        let steps = signal(&envelope, "steps_total");
        assert_eq!(steps.value, Some(2530.0));
        assert_eq!(steps.baseline, Some(8000.0));
        assert_eq!(steps.delta, Some(-5470.0));
        assert_eq!(steps.name, "Steps Total");

        let hr = signal(&envelope, "avg_hr");
        assert_eq!(hr.value, Some(76.0));
        assert_eq!(hr.baseline, None);
        assert_eq!(hr.delta, None);

        assert_eq!(envelope.card_type, CardType::DailySummary);
        assert_eq!(envelope.granularity, Granularity::Daily);
        assert_eq!(envelope.evidence.total_rows, 1);
        assert_eq!(envelope.summary, "3 signal(s) computed across 1 records.");
        assert_eq!(envelope.time_range.start, Utc.with_ymd_and_hms(2026, 2, 16, 0, 0, 0).unwrap());
        assert_eq!(envelope.time_range.end, Utc.with_ymd_and_hms(2026, 2, 17, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_evidence_coverage_and_drilldowns() {
        let source = source_with_baseline(
            vec![make_daily_row(day(2, 16), json!({"steps_total": 2530}))],
            None,
        );
        let envelope = daily(&source);

        let steps_evidence = &envelope.evidence.sources[0];
        assert_eq!(steps_evidence.signal, "steps_total");
        assert_eq!(steps_evidence.row_count, 1);
        assert_eq!(steps_evidence.earliest_date, Some(day(2, 16)));

        let weight_evidence = envelope
            .evidence
            .sources
            .iter()
            .find(|s| s.signal == "weight_kg")
            .unwrap();
        assert_eq!(weight_evidence.row_count, 0);
        assert_eq!(weight_evidence.latest_date, None);

        assert_eq!(envelope.coverage.signals[0].completeness, 1.0);
        assert!(envelope.coverage.missing_sources.contains(&"weight_kg".to_string()));
        assert!(!envelope.coverage.missing_sources.contains(&"steps_total".to_string()));
        assert!(envelope
            .warnings
            .iter()
            .any(|w| w.starts_with("Missing in target range: weight_kg")));

        assert_eq!(envelope.drilldowns.len(), SignalCatalog::builtin().len());
        let drill = &envelope.drilldowns[1];
        assert_eq!(drill.label, "Signal: weight_kg");
        assert_eq!(drill.kind, "records");
        assert_eq!(drill.params["path"], "body_metrics.weight_kg");
        assert_eq!(drill.params["from"], "2026-02-16");
        assert_eq!(drill.params["to"], "2026-02-17");
        assert!(!drill.params.contains_key("device_id"));
    }

    #[test]
    fn test_deterministic_output() {
        let source = source_with_baseline(
            vec![make_daily_row(
                day(2, 16),
                json!({"steps_total": 9000, "nutrition_summary": {"calories_total": 1800}}),
            )],
            Some(7000),
        );
        let first = daily(&source);
        let second = daily(&source);

        assert_eq!(first.signals, second.signals);
        assert_eq!(first.coverage, second.coverage);
        assert_eq!(first.evidence, second.evidence);
        assert_eq!(first.summary, second.summary);
        assert_eq!(first.warnings, second.warnings);
        assert_eq!(first.priority_summary, second.priority_summary);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_goal_fields_on_steps_signal() {
        let source = source_with_baseline(
            vec![make_daily_row(
                day(2, 16),
                json!({"steps_total": 10000, "nutrition_summary": {"calories_total": 1800}}),
            )],
            Some(7000),
        );
        let steps = signal(&daily(&source), "steps_total").clone();

        assert_eq!(steps.priority, Some(3));
        assert_eq!(steps.target, Some(8000.0));
        assert_eq!(steps.target_progress_pct, Some(100.0));
        assert_eq!(steps.status, Some(Status::Green));
        assert_eq!(steps.trend, Some(Trend::Up));
    }

    #[test]
    fn test_calories_under_target_is_green() {
        let source = MemoryRowSource::new(vec![make_daily_row(
            day(2, 16),
            json!({"nutrition_summary": {"calories_total": 1500}}),
        )]);
        let envelope = daily(&source);
        let calories = signal(&envelope, "calories_total");

        assert_eq!(calories.status, Some(Status::Green));
        assert_eq!(calories.target_progress_pct, Some(100.0));
        assert_eq!(calories.trend, Some(Trend::Flat));
    }

    #[test]
    fn test_tracking_consistency_signal() {
        let mut rows = vec![make_daily_row(
            day(2, 16),
            json!({"nutrition_summary": {"calories_total": 1800}}),
        )];
        for i in 1..=6 {
            rows.push(make_daily_row(
                day(2, 16) - Duration::days(i),
                json!({"body_metrics": {"weight_kg": 130.0}}),
            ));
        }
        let envelope = daily(&MemoryRowSource::new(rows));
        let tracking = signal(&envelope, TRACKING_CONSISTENCY);

        assert_eq!(tracking.priority, Some(1));
        assert_eq!(tracking.value, Some(1.0));
        assert_eq!(tracking.target_progress_pct, Some(100.0));
        assert_eq!(tracking.aggregation, None);
        assert_eq!(tracking.trend, None);
        assert_eq!(tracking.status, Some(Status::Green));

        let vector = tracking.coverage_vector.unwrap();
        assert_eq!(vector.manual_coverage_7d, 1.0);
        assert_eq!(vector.streak_manual_days, 7);
        assert_eq!(vector.days_since_last_manual_entry, 0.0);
    }

    #[test]
    fn test_tracking_status_uses_seven_day_coverage() {
        let source = MemoryRowSource::new(vec![make_daily_row(
            day(2, 16),
            json!({"nutrition_summary": {"calories_total": 1800}}),
        )]);
        let envelope = daily(&source);
        let tracking = signal(&envelope, TRACKING_CONSISTENCY);

        assert_eq!(tracking.value, Some(1.0));
        assert_eq!(tracking.status, Some(Status::Red));
    }

    #[test]
    fn test_priority_summary_present() {
        let source = MemoryRowSource::new(vec![make_daily_row(
            day(2, 16),
            json!({"steps_total": 10000, "nutrition_summary": {"calories_total": 1800}}),
        )]);
        let summary = daily(&source).priority_summary.unwrap();

        assert_eq!(
            summary.keys().cloned().collect::<Vec<_>>(),
            vec!["P1".to_string(), "P2".to_string(), "P3".to_string()]
        );
        let p3 = &summary["P3"];
        assert_eq!(p3.status, Status::Green);
        assert_eq!(p3.progress, 100.0);
        assert_eq!(p3.trend, Trend::Flat);
        assert_eq!(p3.message, "Daily steps: green");
    }

    #[test]
    fn test_priority_summary_takes_worst_status() {
        let signals = vec![
            Signal {
                status: Some(Status::Green),
                priority: Some(2),
                target_progress_pct: Some(100.0),
                trend: Some(Trend::Up),
                ..bare_signal("a")
            },
            Signal {
                status: Some(Status::Yellow),
                priority: Some(2),
                target_progress_pct: Some(60.0),
                trend: Some(Trend::Flat),
                ..bare_signal("b")
            },
            bare_signal("c"),
        ];
        let summary = priority_summary(&signals, &GoalCatalog::empty()).unwrap();

        assert_eq!(summary.len(), 1);
        let p2 = &summary["P2"];
        assert_eq!(p2.status, Status::Yellow);
        assert_eq!(p2.progress, 80.0);
        assert_eq!(p2.trend, Trend::Up);
        assert_eq!(p2.message, "A: green; B: yellow");
    }

    #[test]
    fn test_priority_summary_counts_missing_progress_as_zero() {
        let signals = vec![
            Signal {
                status: Some(Status::Green),
                priority: Some(3),
                target_progress_pct: Some(100.0),
                ..bare_signal("steps_total")
            },
            Signal {
                value: None,
                status: Some(Status::Red),
                priority: Some(3),
                target_progress_pct: None,
                ..bare_signal("sleep_duration_minutes")
            },
        ];
        let summary = priority_summary(&signals, &GoalCatalog::empty()).unwrap();

        let p3 = &summary["P3"];
        assert_eq!(p3.progress, 50.0);
        assert_eq!(p3.status, Status::Red);
        assert_eq!(p3.trend, Trend::Flat);
    }

    #[test]
    fn test_tracking_consistency_counts_days_not_rows() {
        let rows = vec![
            RawDayRecord::new("watch", day(2, 9), json!({"nutrition_summary": {"calories_total": 1800}})),
            RawDayRecord::new("phone", day(2, 9), json!({"body_metrics": {"weight_kg": 130.0}})),
        ];
        let envelope = CardBuilder::new(&MemoryRowSource::new(rows))
            .with_now(fixed_now())
            .build_weekly_overview(day(2, 9), Tz::UTC, None)
            .unwrap();
        let tracking = signal(&envelope, TRACKING_CONSISTENCY);

        assert!((tracking.value.unwrap() - 1.0 / 7.0).abs() < 1e-9);
        assert_eq!(envelope.summary, "3 signal(s) computed across 2 records.");
    }

    fn bare_signal(id: &str) -> Signal {
        Signal {
            name: display_name(id),
            source_signal_id: id.to_string(),
            value: Some(1.0),
            unit: None,
            aggregation: None,
            baseline: None,
            delta: None,
            target: None,
            target_progress_pct: None,
            priority: None,
            status: None,
            trend: None,
            coverage_vector: None,
        }
    }

    #[test]
    fn test_signals_without_goals_have_none_fields() {
        let source = MemoryRowSource::new(vec![make_daily_row(
            day(2, 16),
            json!({"steps_total": 5000, "heart_rate_summary": {"avg_hr": 72}}),
        )]);
        let envelope = daily(&source);
        let hr = signal(&envelope, "avg_hr");

        assert_eq!(hr.priority, None);
        assert_eq!(hr.status, None);
        assert_eq!(hr.trend, None);
        assert_eq!(hr.target, None);
        assert_eq!(hr.coverage_vector, None);
    }

    #[test]
    fn test_without_goals_no_priority_summary() {
        let source = MemoryRowSource::new(vec![make_daily_row(day(2, 16), json!({"steps_total": 5000}))]);
        let goals = GoalCatalog::empty();
        let envelope = CardBuilder::new(&source)
            .with_catalogs(SignalCatalog::builtin(), &goals)
            .with_now(fixed_now())
            .build_daily_summary(day(2, 16), Tz::UTC, None)
            .unwrap();

        assert_eq!(envelope.priority_summary, None);
        assert_eq!(envelope.signals.len(), SignalCatalog::builtin().len());
    }

    #[test]
    fn test_weekly_overview() {
        let rows = vec![
            make_daily_row(day(2, 9), json!({"steps_total": 6000})),
            make_daily_row(day(2, 11), json!({"steps_total": 7000})),
            make_daily_row(day(2, 13), json!({"steps_total": 8000, "body_metrics": {"weight_kg": 130.2}})),
            make_daily_row(day(2, 16), json!({"steps_total": 99999})),
        ];
        let envelope = CardBuilder::new(&MemoryRowSource::new(rows))
            .with_now(fixed_now())
            .build_weekly_overview(day(2, 9), Tz::UTC, None)
            .unwrap();

        assert_eq!(envelope.card_type, CardType::WeeklyOverview);
        assert_eq!(envelope.granularity, Granularity::Weekly);
        assert_eq!(envelope.evidence.total_rows, 3);
        assert_eq!(signal(&envelope, "steps_total").value, Some(21000.0));
        assert_eq!(signal(&envelope, "weight_kg").value, Some(130.2));

        let steps_coverage = &envelope.coverage.signals[0];
        assert!((steps_coverage.completeness - 3.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_monthly_overview() {
        let rows = vec![
            make_daily_row(day(2, 1), json!({"steps_total": 1000})),
            make_daily_row(day(2, 28), json!({"steps_total": 2000})),
            make_daily_row(day(3, 1), json!({"steps_total": 4000})),
            make_daily_row(day(1, 10), json!({"steps_total": 500})),
        ];
        let envelope = CardBuilder::new(&MemoryRowSource::new(rows))
            .with_now(fixed_now())
            .build_monthly_overview(2026, 2, Tz::UTC, None)
            .unwrap();

        assert_eq!(envelope.granularity, Granularity::Monthly);
        assert_eq!(envelope.time_range.end, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        let steps = signal(&envelope, "steps_total");
        assert_eq!(steps.value, Some(3000.0));
        assert_eq!(steps.baseline, Some(500.0));
    }

    #[test]
    fn test_monthly_overview_rejects_bad_month() {
        let source = MemoryRowSource::default();
        let result = CardBuilder::new(&source).build_monthly_overview(2026, 13, Tz::UTC, None);
        assert!(matches!(result, Err(CardError::InvalidDate { .. })));
    }

    #[test]
    fn test_build_from_request() {
        let source = MemoryRowSource::new(vec![make_daily_row(day(2, 20), json!({"steps_total": 1234}))]);
        let request = CardRequest::parse("monthly_overview", "2026-02-15", None, None, None, "UTC").unwrap();
        let envelope = CardBuilder::new(&source).with_now(fixed_now()).build(&request).unwrap();

        assert_eq!(envelope.card_type, CardType::MonthlyOverview);
        assert_eq!(envelope.time_range.start, Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(signal(&envelope, "steps_total").value, Some(1234.0));
    }

    #[test]
    fn test_time_range_in_local_timezone() {
        let source = MemoryRowSource::default();
        let envelope = CardBuilder::new(&source)
            .with_now(fixed_now())
            .build_daily_summary(day(2, 16), chrono_tz::America::New_York, None)
            .unwrap();

        assert_eq!(envelope.time_range.start, Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap());
        assert_eq!(envelope.time_range.timezone, "America/New_York");
    }

    #[test]
    fn test_dst_gap_midnight() {
        // Santiago skips from 00:00 to 01:00 when DST starts
        let start = local_midnight_utc(NaiveDate::from_ymd_opt(2025, 9, 7).unwrap(), chrono_tz::America::Santiago);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 9, 7, 4, 0, 0).unwrap());
    }

    #[test]
    fn test_future_range_warning() {
        let source = MemoryRowSource::default();
        let envelope = CardBuilder::new(&source)
            .with_now(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap())
            .build_daily_summary(day(2, 16), Tz::UTC, None)
            .unwrap();

        assert_eq!(
            envelope.warnings,
            vec![FUTURE_RANGE_WARNING.to_string(), NO_DATA_WARNING.to_string()]
        );
    }

    #[test]
    fn test_partial_days() {
        let rows = vec![
            RawDayRecord::new("watch", day(2, 9), json!({"steps_total": 1})),
            RawDayRecord::new("phone", day(2, 9), json!({"steps_total": 1})),
            RawDayRecord::new("watch", day(2, 10), json!({"steps_total": 1})),
            RawDayRecord::new("phone", day(2, 10), json!({"steps_total": 1})),
            RawDayRecord::new("watch", day(2, 11), json!({"steps_total": 1})),
        ];
        let envelope = CardBuilder::new(&MemoryRowSource::new(rows))
            .with_now(fixed_now())
            .build_weekly_overview(day(2, 9), Tz::UTC, None)
            .unwrap();

        assert_eq!(envelope.coverage.partial_days, vec!["2026-02-11".to_string()]);
    }

    #[test]
    fn test_device_filter() {
        let rows = vec![
            RawDayRecord::new("watch", day(2, 16), json!({"steps_total": 1000})),
            RawDayRecord::new("phone", day(2, 16), json!({"steps_total": 3000})),
        ];
        let envelope = CardBuilder::new(&MemoryRowSource::new(rows))
            .with_now(fixed_now())
            .build_daily_summary(day(2, 16), Tz::UTC, Some("phone"))
            .unwrap();

        assert_eq!(signal(&envelope, "steps_total").value, Some(3000.0));
        assert_eq!(envelope.drilldowns[0].params["device_id"], "phone");
    }

    #[test]
    fn test_intraday_today_overlay() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 18, 0, 0).unwrap();
        let source = MemoryRowSource::new(vec![make_daily_row(day(2, 16), json!({"steps_total": 100}))])
            .with_intraday(vec![make_daily_row(day(2, 16), json!({"steps_total": 6400}))]);

        let envelope = CardBuilder::new(&source)
            .with_now(now)
            .with_intraday_today(true)
            .build_daily_summary(day(2, 16), Tz::UTC, None)
            .unwrap();
        assert_eq!(signal(&envelope, "steps_total").value, Some(6400.0));

        let without = CardBuilder::new(&source)
            .with_now(now)
            .build_daily_summary(day(2, 16), Tz::UTC, None)
            .unwrap();
        assert_eq!(signal(&without, "steps_total").value, Some(100.0));
    }

    #[test]
    fn test_source_failure_propagates() {
        let result = CardBuilder::new(&FailingSource)
            .with_now(fixed_now())
            .build_daily_summary(day(2, 16), Tz::UTC, None);
        assert!(matches!(result, Err(SourceError::Unavailable(_))));
    }

    #[test]
    fn test_envelope_serializes_with_utc_offsets() {
        let source = MemoryRowSource::new(vec![make_daily_row(day(2, 16), json!({"steps_total": 5000}))]);
        let value = serde_json::to_value(daily(&source)).unwrap();

        assert_eq!(value["granularity"], "daily");
        assert_eq!(value["card_type"], "daily_summary");
        assert_eq!(value["time_range"]["start"], "2026-02-16T00:00:00Z");
        assert_eq!(value["drilldowns"][0]["type"], "records");
        assert!(value["coverage"]["partial_days"].as_array().unwrap().is_empty());
    }
}
