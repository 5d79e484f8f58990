//! Named bundles of card types
//!
//! A preset is configuration only: an id, a label and the cards it expands
//! to. Running one builds each card for the same request parameters.

use serde::Serialize;

use crate::builder::CardBuilder;
use crate::error::CardError;
use crate::request::CardRequest;
use crate::types::{CardEnvelope, CardType};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preset {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub card_types: &'static [CardType],
}

const PRESETS: [Preset; 3] = [
    Preset {
        id: "daily_brief",
        label: "Daily Brief",
        description: "Single-day summary card.",
        card_types: &[CardType::DailySummary],
    },
    Preset {
        id: "weekly_health",
        label: "Weekly Health",
        description: "7-day overview card.",
        card_types: &[CardType::WeeklyOverview],
    },
    Preset {
        id: "monthly_overview",
        label: "Monthly Overview",
        description: "Full-month overview card.",
        card_types: &[CardType::MonthlyOverview],
    },
];

pub fn list() -> &'static [Preset] {
    &PRESETS
}

pub fn get(id: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|preset| preset.id == id)
}

/// Build every card of a preset.
///
/// The request's own card type is ignored; each card in the preset reuses
/// its dates, timezone and device.
pub fn run(builder: &CardBuilder<'_>, id: &str, request: &CardRequest) -> Result<Vec<CardEnvelope>, CardError> {
    let preset = get(id).ok_or_else(|| CardError::UnknownPreset(id.to_string()))?;
    tracing::debug!(preset = preset.id, cards = preset.card_types.len(), "running preset");

    preset
        .card_types
        .iter()
        .map(|card_type| {
            let card_request = CardRequest {
                card_type: *card_type,
                ..request.clone()
            };
            builder.build(&card_request).map_err(CardError::from)
        })
        .collect()
}
