//! Card request parsing
//!
//! Turns loosely typed request parameters (query strings, FFI JSON, CLI
//! flags) into a validated `CardRequest`. All validation errors are client
//! errors; nothing here touches a row source.

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::CardError;
use crate::types::CardType;

impl FromStr for CardType {
    type Err = CardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CardType::ALL
            .into_iter()
            .find(|card_type| card_type.as_str() == s.trim())
            .ok_or_else(|| CardError::UnknownCardType(s.to_string()))
    }
}

/// Validated card request
#[derive(Debug, Clone, PartialEq)]
pub struct CardRequest {
    pub card_type: CardType,
    /// Anchor date: the day, the first day of the week, or any day of the month
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub timezone: Tz,
    pub device_id: Option<String>,
}

impl CardRequest {
    /// Validate raw request parameters.
    ///
    /// `to` defaults to `from`; `timezone` defaults to `default_timezone`.
    pub fn parse(
        card_type: &str,
        from: &str,
        to: Option<&str>,
        timezone: Option<&str>,
        device_id: Option<&str>,
        default_timezone: &str,
    ) -> Result<Self, CardError> {
        let card_type: CardType = card_type.parse()?;
        let from_date = parse_date("from", from)?;
        let to_date = match to {
            Some(value) => parse_date("to", value)?,
            None => from_date,
        };
        if to_date < from_date {
            return Err(CardError::InvalidRange {
                from: from.to_string(),
                to: to.unwrap_or(from).to_string(),
            });
        }
        let timezone = parse_timezone(timezone.unwrap_or(default_timezone))?;

        Ok(Self {
            card_type,
            from: from_date,
            to: to_date,
            timezone,
            device_id: device_id
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        })
    }
}

/// Request as it arrives over JSON (FFI, saved request files)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardRequestParams {
    pub card_type: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default, alias = "tz")]
    pub timezone: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

impl CardRequestParams {
    pub fn from_json(json: &str) -> Result<Self, CardError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn validate(&self, default_timezone: &str) -> Result<CardRequest, CardError> {
        CardRequest::parse(
            &self.card_type,
            &self.from,
            self.to.as_deref(),
            self.timezone.as_deref(),
            self.device_id.as_deref(),
            default_timezone,
        )
    }
}

/// Parse an ISO `YYYY-MM-DD` date
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, CardError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| CardError::InvalidDate {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Parse an IANA zone name
pub fn parse_timezone(name: &str) -> Result<Tz, CardError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| CardError::InvalidTimezone(name.to_string()))
}
