use serde_with::SerializeDisplay;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

/// TCP port the fan listens on for its ASCII control protocol.
pub const BAF_PORT: u16 = 31415;

/// Status poll sent by the health check to re-pull every channel.
pub(crate) const STATUS_POLL_FRAGMENT: &str = ";GETALL";

/// Occupancy poll sent alongside the status poll.
pub(crate) const OCCUPANCY_POLL_FRAGMENT: &str = ";SNSROCC;STATUS;GET";

/// Channels exposed by a fan session.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, EnumString, Display, SerializeDisplay,
)]
#[strum(ascii_case_insensitive)]
pub enum ChannelId {
    #[strum(to_string = "fan-power")]
    FanPower,
    #[strum(to_string = "fan-speed")]
    FanSpeed,
    #[strum(to_string = "fan-direction")]
    FanDirection,
    #[strum(to_string = "fan-auto")]
    FanAuto,
    #[strum(to_string = "fan-whoosh")]
    FanWhoosh,
    #[strum(to_string = "fan-smartmode")]
    FanSmartmode,
    #[strum(to_string = "fan-learn-minspeed")]
    FanLearnMinspeed,
    #[strum(to_string = "fan-learn-maxspeed")]
    FanLearnMaxspeed,
    #[strum(to_string = "fan-speed-min")]
    FanSpeedMin,
    #[strum(to_string = "fan-speed-max")]
    FanSpeedMax,
    #[strum(to_string = "fan-wintermode")]
    FanWintermode,
    #[strum(to_string = "fan-sleep")]
    FanSleep,
    #[strum(to_string = "light-power")]
    LightPower,
    #[strum(to_string = "light-level")]
    LightLevel,
    #[strum(to_string = "light-hue")]
    LightHue,
    #[strum(to_string = "light-auto")]
    LightAuto,
    #[strum(to_string = "light-smarter")]
    LightSmarter,
    #[strum(to_string = "light-level-min")]
    LightLevelMin,
    #[strum(to_string = "light-level-max")]
    LightLevelMax,
    #[strum(to_string = "light-present")]
    LightPresent,
    #[strum(to_string = "light-color")]
    LightColor,
    #[strum(to_string = "motion")]
    Motion,
    #[strum(to_string = "time")]
    Time,
}

/// Value shape carried by a channel.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub enum ChannelKind {
    #[strum(to_string = "switch")]
    Switch,
    #[strum(to_string = "dimmer")]
    Dimmer,
    #[strum(to_string = "text")]
    Text,
    #[strum(to_string = "datetime")]
    DateTime,
}

/// Descriptive metadata for one channel.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ChannelMetadata {
    description: &'static str,
    kind: ChannelKind,
    writable: bool,
}

impl ChannelMetadata {
    /// Human-readable channel description.
    #[must_use]
    pub fn description(self) -> &'static str {
        self.description
    }

    /// Value shape of the channel.
    #[must_use]
    pub fn kind(self) -> ChannelKind {
        self.kind
    }

    /// Whether commands can be sent to the channel.
    #[must_use]
    pub fn writable(self) -> bool {
        self.writable
    }
}

impl ChannelId {
    /// Returns metadata for this channel.
    ///
    /// ```
    /// use baf::{ChannelId, ChannelKind};
    ///
    /// let metadata = ChannelId::FanSpeed.metadata();
    /// assert_eq!(ChannelKind::Dimmer, metadata.kind());
    /// assert!(metadata.writable());
    /// ```
    #[must_use]
    pub fn metadata(self) -> ChannelMetadata {
        metadata_for(self)
    }
}

/// Returns all known channels.
pub(crate) fn known_channels() -> impl Iterator<Item = ChannelId> {
    ChannelId::iter()
}

fn metadata_for(channel: ChannelId) -> ChannelMetadata {
    let (description, kind, writable) = match channel {
        ChannelId::FanPower => ("Fan power", ChannelKind::Switch, true),
        ChannelId::FanSpeed => ("Fan speed", ChannelKind::Dimmer, true),
        ChannelId::FanDirection => ("Fan direction", ChannelKind::Text, false),
        ChannelId::FanAuto => ("Fan auto mode", ChannelKind::Switch, true),
        ChannelId::FanWhoosh => ("Fan whoosh mode", ChannelKind::Switch, true),
        ChannelId::FanSmartmode => ("Fan smartmode", ChannelKind::Text, true),
        ChannelId::FanLearnMinspeed => ("Smartmode learn minimum speed", ChannelKind::Dimmer, true),
        ChannelId::FanLearnMaxspeed => ("Smartmode learn maximum speed", ChannelKind::Dimmer, true),
        ChannelId::FanSpeedMin => ("Fan minimum speed", ChannelKind::Dimmer, true),
        ChannelId::FanSpeedMax => ("Fan maximum speed", ChannelKind::Dimmer, true),
        ChannelId::FanWintermode => ("Fan wintermode", ChannelKind::Switch, true),
        ChannelId::FanSleep => ("Fan sleep mode", ChannelKind::Switch, true),
        ChannelId::LightPower => ("Light power", ChannelKind::Switch, true),
        ChannelId::LightLevel => ("Light level", ChannelKind::Dimmer, true),
        ChannelId::LightHue => ("Light colour temperature", ChannelKind::Dimmer, true),
        ChannelId::LightAuto => ("Light auto mode", ChannelKind::Switch, true),
        ChannelId::LightSmarter => ("Light smarter mode", ChannelKind::Switch, true),
        ChannelId::LightLevelMin => ("Light minimum level", ChannelKind::Dimmer, true),
        ChannelId::LightLevelMax => ("Light maximum level", ChannelKind::Dimmer, true),
        ChannelId::LightPresent => ("Light installed", ChannelKind::Text, false),
        ChannelId::LightColor => ("Light supports colour", ChannelKind::Text, false),
        ChannelId::Motion => ("Occupancy sensor", ChannelKind::Switch, false),
        ChannelId::Time => ("Fan clock", ChannelKind::DateTime, false),
    };

    ChannelMetadata {
        description,
        kind,
        writable,
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ChannelId::FanPower, "fan-power")]
    #[case(ChannelId::FanLearnMinspeed, "fan-learn-minspeed")]
    #[case(ChannelId::LightLevelMax, "light-level-max")]
    #[case(ChannelId::Time, "time")]
    fn channel_ids_round_trip_through_strings(#[case] channel: ChannelId, #[case] id: &str) {
        assert_eq!(id, channel.to_string());
        assert_eq!(Ok(channel), ChannelId::from_str(id));
    }

    #[test]
    fn every_channel_parses_from_its_display_form() {
        for channel in known_channels() {
            assert_eq!(Ok(channel), ChannelId::from_str(&channel.to_string()));
        }
    }

    #[test]
    fn sensor_channels_are_read_only() {
        assert!(!ChannelId::Motion.metadata().writable());
        assert!(!ChannelId::Time.metadata().writable());
        assert!(!ChannelId::LightPresent.metadata().writable());
    }
}
