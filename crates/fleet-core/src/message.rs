//! The rendered chat message, which doubles as the workflow's only state.
//!
//! Everything that couples workflows to rendered text lives here: field
//! names, the timestamp format and the lookups that read them back.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};

pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

pub const FIELD_PLAYERS: &str = "Players";
pub const FIELD_PLAYER_COUNT: &str = "Player Count";
pub const FIELD_LAST_TRY: &str = "Last try";
pub const FIELD_LAST_REFRESH: &str = "Last Refresh";
pub const FIELD_USERNAME: &str = "Username";

// ---------------------------------------------------------------------------
// ActionMessage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMessage {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub buttons: Vec<Button>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub id: String,
    pub label: String,
    pub emoji: Option<String>,
    pub style: ButtonStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

impl Button {
    pub fn new(id: impl Into<String>, label: impl Into<String>, style: ButtonStyle) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            emoji: None,
            style,
        }
    }

    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }
}

impl ActionMessage {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            fields: Vec::new(),
            buttons: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_button(mut self, button: Button) -> Self {
        self.buttons.push(button);
        self
    }

    /// A message without buttons can't move anywhere.
    pub fn is_terminal(&self) -> bool {
        self.buttons.is_empty()
    }

    /// Value of the first field called `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn require_field(&self, name: &str) -> Result<&str> {
        self.field(name).ok_or_else(|| {
            FleetError::MalformedInteraction(format!(
                "message '{}' has no '{name}' field",
                self.title
            ))
        })
    }

    /// The instant stored in field `name`, if present and well formed.
    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        self.field(name).and_then(parse_timestamp)
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn timestamp_survives_rendering() {
        let rendered = format_timestamp(at(9, 5, 7));
        assert_eq!(rendered, "2024/03/01 09:05:07");
        assert_eq!(parse_timestamp(&rendered), Some(at(9, 5, 7)));
    }

    #[test]
    fn malformed_timestamp_is_none() {
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("2024-03-01T09:05:07Z"), None);
    }

    #[test]
    fn fields_are_found_by_name_not_position() {
        let msg = ActionMessage::new("Requesting Restart", "")
            .with_field(FIELD_LAST_TRY, "2024/03/01 09:05:07")
            .with_field(FIELD_PLAYERS, "2");
        assert_eq!(msg.field(FIELD_PLAYERS), Some("2"));
        assert_eq!(msg.timestamp(FIELD_LAST_TRY), Some(at(9, 5, 7)));
        assert_eq!(msg.field("Nope"), None);
    }

    #[test]
    fn missing_field_is_malformed() {
        let msg = ActionMessage::new("Requesting Whitelist", "");
        let err = msg.require_field(FIELD_USERNAME).unwrap_err();
        assert!(matches!(err, FleetError::MalformedInteraction(_)));
    }

    #[test]
    fn terminal_means_no_buttons() {
        let msg = ActionMessage::new("Aborted", "");
        assert!(msg.is_terminal());
        let msg = msg.with_button(Button::new("retry_restart", "Retry", ButtonStyle::Primary));
        assert!(!msg.is_terminal());
    }
}
