//! Common types used across Repforge

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

// =============================================================================
// Users
// =============================================================================

/// Maximum username length (the frontend renders these in fixed-width chips)
pub const USERNAME_MAX_LEN: usize = 19;

/// User model
///
/// `username` is the primary key and immutable after registration.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub is_active: bool,
    pub is_su: bool,
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    pub mfa_enabled: bool,
    #[serde(skip_serializing)]
    pub mfa_secret: Option<String>,
    pub last_connect: Option<OffsetDateTime>,
}

/// Validate a username: 1-19 chars, alphanumeric plus `_` and `-`
pub fn validate_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= USERNAME_MAX_LEN
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// =============================================================================
// Categories and Blocs
// =============================================================================

/// Bloc category (per-user, ordered by weight)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BlocCategory {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    pub color: String,
    pub weight: i32,
}

/// Default categories seeded for every new user
pub const DEFAULT_CATEGORIES: [(&str, &str, i32); 8] = [
    ("note", "#909090", 1),
    ("(p)rehab", "#18a773", 2),
    ("weightlifting", "#9d2a24", 3),
    ("gym", "#e75480", 4),
    ("metcon", "#3c74c4", 5),
    ("cardio", "#6e4c23", 6),
    ("accessory", "#c88a89", 7),
    ("other", "#4c495c", 8),
];

/// Result metric attached to a bloc or tracked by a PR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecordKey {
    Kg,
    Rep,
    Time,
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kg => write!(f, "kg"),
            Self::Rep => write!(f, "rep"),
            Self::Time => write!(f, "time"),
        }
    }
}

impl std::str::FromStr for RecordKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kg" => Ok(Self::Kg),
            "rep" => Ok(Self::Rep),
            "time" => Ok(Self::Time),
            _ => Err(format!("Invalid record key: {}", s)),
        }
    }
}

/// Check that a raw value string is well-formed for a record key
///
/// - `rep`: positive integer
/// - `kg`: positive decimal
/// - `time`: `[[HHH:]MM:]SS` with minutes and seconds in 0-59
pub fn value_matches_key(key: RecordKey, value: &str) -> bool {
    match key {
        RecordKey::Rep => value.parse::<u32>().map(|v| v > 0).unwrap_or(false),
        RecordKey::Kg => value.parse::<f64>().map(|v| v > 0.0).unwrap_or(false),
        RecordKey::Time => parse_time_value(value).is_some(),
    }
}

/// Parse a `[[HHH:]MM:]SS` time value into total seconds
pub fn parse_time_value(value: &str) -> Option<u32> {
    let parts: Vec<&str> = value.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [s] => (0, 0, parse_sexagesimal(s)?),
        [m, s] => (0, parse_sexagesimal(m)?, parse_sexagesimal(s)?),
        [h, m, s] => {
            if h.is_empty() || h.len() > 3 || !h.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            (h.parse::<u32>().ok()?, parse_sexagesimal(m)?, parse_sexagesimal(s)?)
        }
        _ => return None,
    };
    Some(hours * 3600 + minutes * 60 + seconds)
}

/// One or two digits, value 0-59
fn parse_sexagesimal(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 2 || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let v = s.parse::<u32>().ok()?;
    (v < 60).then_some(v)
}

/// A logged workout entry, tagged with a category
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Bloc {
    pub id: Uuid,
    pub owner: String,
    pub category_id: Uuid,
    pub content: String,
    /// Duration in minutes
    pub duration: Option<i32>,
    pub cdate: Date,
    pub result_key: Option<RecordKey>,
    pub result_value: Option<String>,
    pub result_comment: Option<String>,
}

// =============================================================================
// Personal Records
// =============================================================================

/// Personal record: a named metric with a time series of values
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Pr {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    pub key: RecordKey,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PrValue {
    pub id: Uuid,
    pub pr_id: Uuid,
    pub value: String,
    pub cdate: Date,
}

// =============================================================================
// Programs
// =============================================================================

/// Reusable training template
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Program {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProgramStep {
    pub id: Uuid,
    pub program_id: Uuid,
    pub name: String,
    pub weight: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProgramStepBloc {
    pub id: Uuid,
    pub step_id: Uuid,
    pub content: String,
    pub weight: i32,
}

// =============================================================================
// Stash
// =============================================================================

/// Quick note dropped in from the owner or a machine client
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StashItem {
    pub id: Uuid,
    pub owner: String,
    pub content: String,
    pub cdate: Date,
}

// =============================================================================
// Health Watch Data
// =============================================================================

/// One day of imported watch metrics, unique per (owner, cdate)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HealthWatchData {
    pub id: Uuid,
    pub owner: String,
    pub cdate: Date,
    pub recovery: Option<i32>,
    pub resting_hr: Option<i32>,
    pub hrv: Option<i32>,
    pub temperature: Option<f64>,
    pub oxy_level: Option<f64>,
    pub strain: Option<f64>,
    pub sleep_score: Option<i32>,
    /// Sleep phase durations in minutes
    pub sleep_duration_light: Option<i32>,
    pub sleep_duration_deep: Option<i32>,
    pub sleep_duration_rem: Option<i32>,
    pub sleep_duration_awake: Option<i32>,
    pub sleep_efficiency: Option<f64>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice"));
        assert!(validate_username("al-ice_99"));
        assert!(validate_username("a"));
        assert!(validate_username("a234567890123456789")); // 19 chars

        assert!(!validate_username(""));
        assert!(!validate_username("a2345678901234567890")); // 20 chars
        assert!(!validate_username("al ice"));
        assert!(!validate_username("al!ce"));
        assert!(!validate_username("älice"));
    }

    #[test]
    fn test_record_key_roundtrip() {
        assert_eq!("kg".parse::<RecordKey>().unwrap(), RecordKey::Kg);
        assert_eq!("REP".parse::<RecordKey>().unwrap(), RecordKey::Rep);
        assert_eq!(format!("{}", RecordKey::Time), "time");
        assert!("distance".parse::<RecordKey>().is_err());
    }

    #[test]
    fn test_rep_values() {
        assert!(value_matches_key(RecordKey::Rep, "1"));
        assert!(value_matches_key(RecordKey::Rep, "250"));
        assert!(!value_matches_key(RecordKey::Rep, "0"));
        assert!(!value_matches_key(RecordKey::Rep, "-3"));
        assert!(!value_matches_key(RecordKey::Rep, "3.5"));
        assert!(!value_matches_key(RecordKey::Rep, "ten"));
    }

    #[test]
    fn test_kg_values() {
        assert!(value_matches_key(RecordKey::Kg, "100"));
        assert!(value_matches_key(RecordKey::Kg, "102.5"));
        assert!(!value_matches_key(RecordKey::Kg, "0"));
        assert!(!value_matches_key(RecordKey::Kg, "-5"));
        assert!(!value_matches_key(RecordKey::Kg, "heavy"));
    }

    #[test]
    fn test_time_values() {
        assert!(value_matches_key(RecordKey::Time, "45"));
        assert!(value_matches_key(RecordKey::Time, "5:30"));
        assert!(value_matches_key(RecordKey::Time, "05:30"));
        assert!(value_matches_key(RecordKey::Time, "1:05:30"));
        assert!(value_matches_key(RecordKey::Time, "123:05:30"));
        assert!(value_matches_key(RecordKey::Time, "0"));

        assert!(!value_matches_key(RecordKey::Time, "60"));
        assert!(!value_matches_key(RecordKey::Time, "5:60"));
        assert!(!value_matches_key(RecordKey::Time, "1234:05:30"));
        assert!(!value_matches_key(RecordKey::Time, "1:2:3:4"));
        assert!(!value_matches_key(RecordKey::Time, ""));
        assert!(!value_matches_key(RecordKey::Time, "5:"));
        assert!(!value_matches_key(RecordKey::Time, "a:30"));
    }

    #[test]
    fn test_parse_time_value_seconds() {
        assert_eq!(parse_time_value("45"), Some(45));
        assert_eq!(parse_time_value("5:30"), Some(330));
        assert_eq!(parse_time_value("1:05:30"), Some(3930));
        assert_eq!(parse_time_value("1:2:3:4"), None);
    }

    #[test]
    fn test_default_categories() {
        assert_eq!(DEFAULT_CATEGORIES.len(), 8);
        // Weights are the display order and must be dense from 1
        let mut weights: Vec<i32> = DEFAULT_CATEGORIES.iter().map(|(_, _, w)| *w).collect();
        weights.sort_unstable();
        assert_eq!(weights, (1..=8).collect::<Vec<_>>());
        assert!(DEFAULT_CATEGORIES
            .iter()
            .all(|(_, color, _)| color.starts_with('#') && color.len() == 7));
    }
}
