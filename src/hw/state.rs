use std::fmt;

use dashmap::DashMap;
use serde::{Serialize, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::handlers::Percent;
use crate::protocol::ChannelId;

/// Last value reported or commanded for a channel.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum ChannelValue {
    /// Switch state.
    OnOff(bool),
    /// Scaled dimmer value.
    Percent(Percent),
    /// Free-form text value.
    Text(String),
    /// Timestamp in UTC.
    #[serde(serialize_with = "serialize_rfc3339")]
    DateTime(OffsetDateTime),
}

fn serialize_rfc3339<S: Serializer>(
    timestamp: &OffsetDateTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let formatted = timestamp
        .format(&Rfc3339)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&formatted)
}

impl ChannelValue {
    /// Returns the percentage carried by a dimmer value.
    #[must_use]
    pub fn as_percent(&self) -> Option<Percent> {
        match self {
            Self::Percent(percent) => Some(*percent),
            _ => None,
        }
    }

    /// Returns the text carried by a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnOff(true) => f.write_str("ON"),
            Self::OnOff(false) => f.write_str("OFF"),
            Self::Percent(percent) => write!(f, "{percent}"),
            Self::Text(text) => f.write_str(text),
            Self::DateTime(timestamp) => match timestamp.format(&Rfc3339) {
                Ok(formatted) => f.write_str(&formatted),
                Err(_) => write!(f, "{timestamp}"),
            },
        }
    }
}

/// Concurrent map of the last value seen for each channel.
///
/// Last write wins. Entries are never evicted.
#[derive(Debug, Default)]
pub struct LastKnownState {
    values: DashMap<ChannelId, ChannelValue>,
}

impl LastKnownState {
    /// Creates an empty state map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` as the latest value of `channel`.
    pub fn update(&self, channel: ChannelId, value: ChannelValue) {
        self.values.insert(channel, value);
    }

    /// Returns the latest value of `channel`, if any.
    #[must_use]
    pub fn get(&self, channel: ChannelId) -> Option<ChannelValue> {
        self.values.get(&channel).map(|entry| entry.value().clone())
    }

    /// Returns the latest percentage of `channel`, if it holds one.
    #[must_use]
    pub fn percent(&self, channel: ChannelId) -> Option<Percent> {
        self.values
            .get(&channel)
            .and_then(|entry| entry.value().as_percent())
    }

    /// Returns whether `channel` currently holds the text `expected`.
    #[must_use]
    pub fn text_equals(&self, channel: ChannelId, expected: &str) -> bool {
        self.values
            .get(&channel)
            .is_some_and(|entry| entry.value().as_text() == Some(expected))
    }

    /// Returns a copy of every recorded channel value.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(ChannelId, ChannelValue)> {
        self.values
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}
