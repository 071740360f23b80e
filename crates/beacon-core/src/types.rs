use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BeaconError;

// =============================================================================
// Role
// =============================================================================

/// Author of a conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Instruction for the dialogue backend. Only ever built for an outbound
    /// request; never stored or shown.
    System,
    /// The person asking for help.
    User,
    /// The emergency-assistance agent.
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = BeaconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(BeaconError::UnknownRole(other.to_string())),
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// One entry of the conversation history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at,
        }
    }

    pub fn user(content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self::new(Role::User, content, created_at)
    }

    pub fn assistant(content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self::new(Role::Assistant, content, created_at)
    }

    /// Strip the message down to what the dialogue backend sees.
    pub fn to_wire(&self) -> WireMessage {
        WireMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Role and content only, as sent to the dialogue backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl WireMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

// =============================================================================
// Location
// =============================================================================

/// A latitude/longitude pair in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build coordinates, rejecting values outside the WGS84 range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, BeaconError> {
        let lat_ok = latitude.is_finite() && (-90.0..=90.0).contains(&latitude);
        let lon_ok = longitude.is_finite() && (-180.0..=180.0).contains(&longitude);
        if !(lat_ok && lon_ok) {
            return Err(BeaconError::InvalidCoordinates {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Human-readable announcement recorded as a user message when the
    /// location is shared. `f64` display keeps the full precision.
    pub fn announcement(&self) -> String {
        format!(
            "\u{1F4CD} Location shared: latitude {}, longitude {}",
            self.latitude, self.longitude
        )
    }
}

// =============================================================================
// Locale
// =============================================================================

/// Active language code, e.g. `en`, `es`, `pt-BR`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locale(String);

impl Locale {
    pub fn new(code: impl Into<String>) -> Result<Self, BeaconError> {
        let code = code.into();
        let trimmed = code.trim();
        let valid = !trimmed.is_empty()
            && trimmed.len() <= 35
            && !trimmed.starts_with('-')
            && !trimmed.ends_with('-')
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(BeaconError::InvalidLocale(code));
        }
        Ok(Self(trimmed.replace('_', "-")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Primary language subtag, lowercased (`pt-BR` -> `pt`).
    pub fn language(&self) -> String {
        self.0
            .split('-')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self("en".to_string())
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Locale {
    type Err = BeaconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Locale::new(s)
    }
}

impl TryFrom<String> for Locale {
    type Error = BeaconError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Locale::new(value)
    }
}

impl From<Locale> for String {
    fn from(locale: Locale) -> Self {
        locale.0
    }
}

// =============================================================================
// Tests
// =============================================================================
