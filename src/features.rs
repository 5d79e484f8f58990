//! Feature library
//!
//! Pure numeric functions used by the card builder:
//! - Aggregation, trailing baselines and deltas
//! - Coverage ratios and partial-day detection
//! - Goal progress, status and trend
//! - Manual tracking consistency and its coverage vector
//! - Calorie deficit and gated steps-ramp helpers
//!
//! Nothing here performs I/O or panics on odd input; missing data comes
//! back as `None`, an empty collection or a neutral value.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::extractor::{resolve_path, to_number};
use crate::goals::TargetType;
use crate::signals::AggregationMethod;
use crate::types::{CoverageVector, Granularity, RawDayRecord, Status, Trend};

/// Relative change needed before a trend counts as up or down
pub const DEFAULT_TREND_THRESHOLD: f64 = 0.05;

/// Manually entered fields; steps are auto-collected and never count
pub const MANUAL_FIELDS: [&str; 2] = ["calories_total", "weight_kg"];

/// Payload sections searched for tracked fields besides the top level
pub const TRACKED_SECTIONS: [&str; 2] = ["nutrition_summary", "body_metrics"];

/// Reported when no manual entry exists at all
pub const NO_MANUAL_ENTRY_DAYS: f64 = 999.0;

/// Fallback basal metabolic rate (kcal/day) when body metrics are missing
pub const FALLBACK_BMR_KCAL: f64 = 1500.0;

// ---------------------------------------------------------------------------
// Aggregation and baselines
// ---------------------------------------------------------------------------

/// Combine values with the given method; `None` for an empty slice
pub fn aggregate(values: &[f64], method: AggregationMethod) -> Option<f64> {
    let last = *values.last()?;
    let value = match method {
        AggregationMethod::Sum => values.iter().sum(),
        AggregationMethod::Avg => mean(values),
        AggregationMethod::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregationMethod::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        AggregationMethod::Last => last,
    };
    Some(value)
}

/// Mean of the last `window` values (all values when `window` is `None`,
/// zero, or longer than the slice)
pub fn trailing_average(values: &[f64], window: Option<usize>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let subset = match window {
        Some(w) if w > 0 && w < values.len() => &values[values.len() - w..],
        _ => values,
    };
    Some(mean(subset))
}

/// Absolute difference `current - baseline`
pub fn delta(current: Option<f64>, baseline: Option<f64>) -> Option<f64> {
    Some(current? - baseline?)
}

/// Percent difference relative to `|baseline|`; `None` when the baseline is zero
pub fn delta_pct(current: Option<f64>, baseline: Option<f64>) -> Option<f64> {
    match (current, baseline) {
        (Some(curr), Some(base)) if base != 0.0 => Some(((curr - base) / base.abs()) * 100.0),
        _ => None,
    }
}

/// Number of prior periods used for the baseline of a granularity
pub fn baseline_window(granularity: Granularity) -> u32 {
    match granularity {
        Granularity::Daily => 7,
        Granularity::Weekly => 4,
        Granularity::Monthly => 3,
    }
}

/// [`baseline_window`] keyed by name; unknown names get the daily window
pub fn baseline_window_for(granularity: &str) -> u32 {
    match granularity {
        "weekly" => baseline_window(Granularity::Weekly),
        "monthly" => baseline_window(Granularity::Monthly),
        _ => baseline_window(Granularity::Daily),
    }
}

// ---------------------------------------------------------------------------
// Coverage and data quality
// ---------------------------------------------------------------------------

/// `actual / expected` clamped to [0, 1]; 0 when nothing is expected
pub fn coverage_ratio(actual: usize, expected: i64) -> f64 {
    if expected <= 0 {
        return 0.0;
    }
    (actual as f64 / expected as f64).clamp(0.0, 1.0)
}

/// ISO dates whose record count is strictly below the median count per day.
///
/// A median of 1 or less carries no signal, so nothing is flagged then.
/// The result depends only on the multiset of calendar dates.
pub fn detect_partial_days(timestamps: &[DateTime<Utc>]) -> Vec<String> {
    let mut day_counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for ts in timestamps {
        *day_counts.entry(ts.date_naive()).or_insert(0) += 1;
    }
    if day_counts.is_empty() {
        return Vec::new();
    }

    let mut counts: Vec<usize> = day_counts.values().copied().collect();
    counts.sort_unstable();
    let mid = counts.len() / 2;
    let median = if counts.len() % 2 == 0 {
        (counts[mid - 1] + counts[mid]) as f64 / 2.0
    } else {
        counts[mid] as f64
    };

    if median <= 1.0 {
        return Vec::new();
    }

    day_counts
        .into_iter()
        .filter(|(_, count)| (*count as f64) < median)
        .map(|(day, _)| day.format("%Y-%m-%d").to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Goals
// ---------------------------------------------------------------------------

/// Progress toward a goal as a percentage in [0, 100].
///
/// - minimum: value / target, capped at 100
/// - maximum: 100 while at or under target, then target / value
/// - exact: 100 minus the relative deviation, clamped to [0, 100]
pub fn goal_progress_pct(value: Option<f64>, target: f64, target_type: TargetType) -> Option<f64> {
    let value = value?;
    if target == 0.0 {
        return None;
    }
    let progress = match target_type {
        TargetType::Minimum => (value / target * 100.0).min(100.0),
        TargetType::Maximum => {
            if value <= target {
                100.0
            } else {
                (target / value * 100.0).min(100.0)
            }
        }
        TargetType::Exact => {
            let deviation = (value - target).abs() / target.abs();
            ((1.0 - deviation) * 100.0).clamp(0.0, 100.0)
        }
    };
    Some(progress)
}

/// Map progress to a status: >=100 green, >=50 yellow, otherwise (or missing) red
pub fn goal_status(progress_pct: Option<f64>) -> Status {
    match progress_pct {
        Some(p) if p >= 100.0 => Status::Green,
        Some(p) if p >= 50.0 => Status::Yellow,
        _ => Status::Red,
    }
}

/// Compare the mean of `recent` against the mean of `prior`
pub fn compute_trend(recent: &[f64], prior: &[f64], threshold: f64) -> Trend {
    if recent.is_empty() || prior.is_empty() {
        return Trend::Flat;
    }
    let recent_mean = mean(recent);
    let prior_mean = mean(prior);

    if prior_mean == 0.0 {
        return if recent_mean > 0.0 { Trend::Up } else { Trend::Flat };
    }

    let ratio = recent_mean / prior_mean;
    if ratio >= 1.0 + threshold {
        Trend::Up
    } else if ratio <= 1.0 - threshold {
        Trend::Down
    } else {
        Trend::Flat
    }
}

/// Worst status present: red beats yellow beats green
pub fn worst_status(statuses: &[Status]) -> Status {
    statuses.iter().copied().min().unwrap_or(Status::Green)
}

/// Up only if something went up and nothing went down; down symmetrically
pub fn combine_trends(trends: &[Trend]) -> Trend {
    let any_up = trends.contains(&Trend::Up);
    let any_down = trends.contains(&Trend::Down);
    match (any_up, any_down) {
        (true, false) => Trend::Up,
        (false, true) => Trend::Down,
        _ => Trend::Flat,
    }
}

// ---------------------------------------------------------------------------
// Tracking consistency
// ---------------------------------------------------------------------------

/// Whether any of `fields` holds a non-null value at the top level of the
/// payload or inside one of the [`TRACKED_SECTIONS`]
pub fn has_tracked_field(payload: &Value, fields: &[&str]) -> bool {
    let present = |section: &Value, field: &str| {
        section
            .as_object()
            .and_then(|map| map.get(field))
            .is_some_and(|v| !v.is_null())
    };

    fields.iter().copied().any(|field| {
        present(payload, field)
            || TRACKED_SECTIONS
                .iter()
                .filter_map(|section| payload.get(section))
                .any(|section| present(section, field))
    })
}

/// Fraction of `expected_days` covered by rows carrying a tracked field, capped at 1
pub fn tracking_consistency(rows: &[RawDayRecord], expected_days: i64, tracked_fields: &[&str]) -> f64 {
    if expected_days <= 0 {
        return 0.0;
    }
    let tracked = rows
        .iter()
        .filter(|row| has_tracked_field(&row.payload, tracked_fields))
        .count();
    (tracked as f64 / expected_days as f64).min(1.0)
}

/// Earliest date with a manual entry (weight or calories)
pub fn find_tracking_start_date(rows: &[RawDayRecord]) -> Option<NaiveDate> {
    rows.iter()
        .filter(|row| has_tracked_field(&row.payload, &MANUAL_FIELDS))
        .map(|row| row.date)
        .min()
}

/// Manual tracking coverage as of `current_date`.
///
/// The short window is the `recent_days` days ending on `current_date`; the
/// long window is 30 days, shortened when tracking began more recently.
pub fn manual_tracking_coverage_vector(
    rows: &[RawDayRecord],
    recent_days: u32,
    tracking_start: NaiveDate,
    current_date: NaiveDate,
) -> CoverageVector {
    let manual_dates: BTreeSet<NaiveDate> = rows
        .iter()
        .filter(|row| row.date <= current_date)
        .filter(|row| has_tracked_field(&row.payload, &MANUAL_FIELDS))
        .map(|row| row.date)
        .collect();

    let Some(last_manual) = manual_dates.last().copied() else {
        return CoverageVector {
            manual_coverage_7d: 0.0,
            manual_coverage_30d: 0.0,
            days_since_last_manual_entry: NO_MANUAL_ENTRY_DAYS,
            streak_manual_days: 0,
        };
    };

    let window_ratio = |days: i64| -> f64 {
        if days <= 0 {
            return 0.0;
        }
        let cutoff = current_date - Duration::days(days - 1);
        let hits = manual_dates.range(cutoff..=current_date).count();
        (hits as f64 / days as f64).clamp(0.0, 1.0)
    };

    let days_since_start = (current_date - tracking_start).num_days();
    let long_window = (days_since_start + 1).min(30);

    let mut streak = 0;
    let mut check_date = current_date;
    while check_date >= tracking_start && manual_dates.contains(&check_date) {
        streak += 1;
        check_date -= Duration::days(1);
    }

    CoverageVector {
        manual_coverage_7d: window_ratio(i64::from(recent_days)),
        manual_coverage_30d: window_ratio(long_window),
        days_since_last_manual_entry: (current_date - last_manual).num_days() as f64,
        streak_manual_days: streak,
    }
}

/// Status from 7-day manual coverage: green >=85%, yellow >=70%, red below
pub fn tracking_status_from_coverage(coverage_7d: f64) -> Status {
    if coverage_7d >= 0.85 {
        Status::Green
    } else if coverage_7d >= 0.70 {
        Status::Yellow
    } else {
        Status::Red
    }
}

// ---------------------------------------------------------------------------
// Calorie deficit
// ---------------------------------------------------------------------------

/// Mifflin-St Jeor basal metabolic rate (kcal/day); sexes starting with "f" use the female offset
pub fn bmr_mifflin_st_jeor(weight_kg: f64, height_cm: f64, age_years: u32, sex: &str) -> f64 {
    let base = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * f64::from(age_years);
    if sex.trim().to_ascii_lowercase().starts_with('f') {
        base - 161.0
    } else {
        base + 5.0
    }
}

/// BMR for one day: `body_metrics.bmr_kcal` if present, else Mifflin-St Jeor
/// from that day's weight and height (age defaults to 30)
pub fn bmr_from_payload(payload: &Value, age_years: Option<u32>, sex: Option<&str>) -> Option<f64> {
    let body = payload.get("body_metrics")?;
    if let Some(bmr) = body.get("bmr_kcal").and_then(to_number) {
        return Some(bmr);
    }
    let weight = body.get("weight_kg").and_then(to_number)?;
    let height = body.get("height_cm").and_then(to_number)?;
    let age = age_years.filter(|age| *age > 0).unwrap_or(30);
    Some(bmr_mifflin_st_jeor(weight, height, age, sex.unwrap_or("male")))
}

/// Activity calories earned from steps (never negative)
pub fn activity_kcal_from_steps(steps: f64, steps_to_kcal: f64, activity_modifier: f64) -> f64 {
    (steps * steps_to_kcal * activity_modifier).max(0.0)
}

/// Sum of (BMR + step activity - calories eaten) over the rows
pub fn weekly_deficit_from_rows(
    rows: &[RawDayRecord],
    steps_to_kcal: f64,
    activity_modifier: f64,
    age_years: Option<u32>,
    sex: Option<&str>,
) -> f64 {
    rows.iter()
        .map(|row| {
            let bmr = bmr_from_payload(&row.payload, age_years, sex)
                .filter(|bmr| *bmr > 0.0)
                .unwrap_or(FALLBACK_BMR_KCAL);
            let steps = resolve_path(&row.payload, "steps_total")
                .and_then(to_number)
                .unwrap_or(0.0);
            let eaten = resolve_path(&row.payload, "nutrition_summary.calories_total")
                .and_then(to_number)
                .unwrap_or(0.0);
            bmr + activity_kcal_from_steps(steps, steps_to_kcal, activity_modifier) - eaten
        })
        .sum()
}

/// Progress toward a weekly deficit target, capped at 100
pub fn weekly_deficit_progress(actual_deficit: f64, target_deficit: f64) -> f64 {
    if target_deficit <= 0.0 {
        return 0.0;
    }
    (actual_deficit / target_deficit * 100.0).min(100.0)
}

/// Status from deficit progress: green >=70, yellow >=20, red below
pub fn calorie_status_from_progress(progress_pct: f64) -> Status {
    if progress_pct >= 70.0 {
        Status::Green
    } else if progress_pct >= 20.0 {
        Status::Yellow
    } else {
        Status::Red
    }
}

// ---------------------------------------------------------------------------
// Gated steps ramp
// ---------------------------------------------------------------------------

/// Tuning for the gated steps ramp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampParams {
    /// Ramp applied when tracking and calories are both green
    pub ramp_rate_fast: f64,
    /// Ramp applied when either is yellow
    pub ramp_rate_slow: f64,
    pub long_term_target: f64,
    pub floor: f64,
}

impl Default for RampParams {
    fn default() -> Self {
        Self {
            ramp_rate_fast: 0.10,
            ramp_rate_slow: 0.05,
            long_term_target: 10_000.0,
            floor: 5_000.0,
        }
    }
}

/// Rolling average of the last `window` step counts (all of them if fewer); 0 when empty
pub fn steps_baseline(steps_series: &[f64], window: usize) -> f64 {
    trailing_average(steps_series, Some(window)).unwrap_or(0.0)
}

/// Next steps target, gated on the higher-priority statuses.
///
/// Either status red holds the target at the baseline; both green ramps
/// fast; anything else ramps slow. The result is capped at the long-term
/// target and floored.
pub fn dynamic_steps_target(
    baseline_avg: f64,
    tracking_status: Status,
    calories_status: Status,
    params: &RampParams,
) -> f64 {
    let ramp_rate = match (tracking_status, calories_status) {
        (Status::Red, _) | (_, Status::Red) => 0.0,
        (Status::Green, Status::Green) => params.ramp_rate_fast,
        _ => params.ramp_rate_slow,
    };
    (baseline_avg * (1.0 + ramp_rate))
        .min(params.long_term_target)
        .max(params.floor)
}

/// Steps status: below the floor is red, at or above the target green, otherwise yellow
pub fn steps_status_from_avg(avg: f64, dynamic_target: f64, floor: f64) -> Status {
    if avg < floor {
        Status::Red
    } else if avg >= dynamic_target {
        Status::Green
    } else {
        Status::Yellow
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
