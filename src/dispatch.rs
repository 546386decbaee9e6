use std::sync::Arc;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info, trace};

use crate::config::DeviceAddress;
use crate::handlers::{FrameCodec, FrameCodecError, InboundFrame, NativeScale};
use crate::hw::{ChannelSink, ChannelValue, LastKnownState};
use crate::protocol::ChannelId;

/// Errors that cause an inbound frame to be dropped.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    /// The token could not be decoded into fields.
    #[error(transparent)]
    Decode(#[from] FrameCodecError),
    /// No route matched the message.
    #[error("unsupported message `{message}`")]
    Unsupported { message: String },
    /// The message had the wrong number of fields for its route.
    #[error("`{channel}` update has unexpected number of fields: {actual}")]
    FieldCount { channel: ChannelId, actual: usize },
    /// A scaled value was not an integer.
    #[error("`{channel}` update has non-numeric value `{value}`")]
    NonNumeric { channel: ChannelId, value: String },
    /// A timestamp did not parse as RFC 3339.
    #[error("`{channel}` update has invalid timestamp `{value}`")]
    InvalidTimestamp {
        channel: ChannelId,
        value: String,
        source: time::error::Parse,
    },
}

/// Result of processing one inbound token.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The frame updated one or more channels.
    Applied(Vec<(ChannelId, ChannelValue)>),
    /// The frame was addressed to another fan.
    NotAddressed { addressee: String },
    /// The frame was discarded.
    Dropped(DispatchError),
}

#[derive(Debug, Clone, Copy)]
enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    fn accepts(self, actual: usize) -> bool {
        match self {
            Self::Exactly(expected) => actual == expected,
            Self::AtLeast(minimum) => actual >= minimum,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Conversion {
    /// `true` when the value equals the given keyword, ignoring case.
    Keyword(&'static str),
    Scaled(NativeScale),
    Text,
    Timestamp,
}

#[derive(Debug, Clone, Copy)]
struct Route {
    pattern: &'static str,
    channel: ChannelId,
    arity: Arity,
    index: usize,
    conversion: Conversion,
    /// Extra text channel read from `index + 1` when the frame carries it.
    trailing: Option<ChannelId>,
}

const fn route(
    pattern: &'static str,
    channel: ChannelId,
    fields: usize,
    conversion: Conversion,
) -> Route {
    Route {
        pattern,
        channel,
        arity: Arity::Exactly(fields),
        index: fields - 1,
        conversion,
        trailing: None,
    }
}

const ON: Conversion = Conversion::Keyword("ON");
const SPEED: Conversion = Conversion::Scaled(NativeScale::Speed);
const LEVEL: Conversion = Conversion::Scaled(NativeScale::Level);

/// Routes in match order. Earlier patterns win when several match.
const ROUTES: [Route; 21] = [
    route(";FAN;PWR;", ChannelId::FanPower, 4, ON),
    route(";FAN;SPD;ACTUAL;", ChannelId::FanSpeed, 5, SPEED),
    route(";FAN;DIR;", ChannelId::FanDirection, 4, Conversion::Text),
    route(";FAN;AUTO;", ChannelId::FanAuto, 4, ON),
    route(";FAN;WHOOSH;STATUS;", ChannelId::FanWhoosh, 5, ON),
    route(";WINTERMODE;STATE;", ChannelId::FanWintermode, 4, ON),
    route(";SMARTMODE;STATE;", ChannelId::FanSmartmode, 4, Conversion::Text),
    route(";FAN;SPD;MIN;", ChannelId::FanSpeedMin, 5, SPEED),
    route(";FAN;SPD;MAX;", ChannelId::FanSpeedMax, 5, SPEED),
    route(";SLEEP;STATE", ChannelId::FanSleep, 4, ON),
    route(";LEARN;MINSPEED;", ChannelId::FanLearnMinspeed, 4, SPEED),
    route(";LEARN;MAXSPEED;", ChannelId::FanLearnMaxspeed, 4, SPEED),
    route(";LIGHT;PWR;", ChannelId::LightPower, 4, ON),
    route(";LIGHT;LEVEL;ACTUAL;", ChannelId::LightLevel, 5, LEVEL),
    route(
        ";LIGHT;COLOR;TEMP;VALUE;",
        ChannelId::LightHue,
        6,
        Conversion::Scaled(NativeScale::Hue),
    ),
    route(";LIGHT;AUTO;", ChannelId::LightAuto, 4, ON),
    route(";LIGHT;LEVEL;MIN;", ChannelId::LightLevelMin, 5, LEVEL),
    route(";LIGHT;LEVEL;MAX;", ChannelId::LightLevelMax, 5, LEVEL),
    Route {
        pattern: ";DEVICE;LIGHT;",
        channel: ChannelId::LightPresent,
        arity: Arity::AtLeast(4),
        index: 3,
        conversion: Conversion::Text,
        trailing: Some(ChannelId::LightColor),
    },
    route(
        ";SNSROCC;STATUS;",
        ChannelId::Motion,
        4,
        Conversion::Keyword("OCCUPIED"),
    ),
    route(";TIME;VALUE;", ChannelId::Time, 4, Conversion::Timestamp),
];

/// Turns inbound fan messages into channel updates.
pub struct Dispatcher {
    address: DeviceAddress,
    state: Arc<LastKnownState>,
    channels: Arc<dyn ChannelSink>,
}

impl Dispatcher {
    /// Creates a dispatcher for the fan at `address`.
    #[must_use]
    pub fn new(
        address: DeviceAddress,
        state: Arc<LastKnownState>,
        channels: Arc<dyn ChannelSink>,
    ) -> Self {
        Self {
            address,
            state,
            channels,
        }
    }

    /// Processes one `)`-delimited token read from the fan.
    ///
    /// Never fails; malformed or foreign frames are reported in the outcome
    /// and logged.
    pub fn process(&self, token: &str) -> DispatchOutcome {
        let frame = match FrameCodec::decode(token) {
            Ok(frame) => frame,
            Err(error) => {
                debug!(%error, "Dropped inbound token");
                return DispatchOutcome::Dropped(error.into());
            }
        };

        if !self.address.is_me(frame.addressee()) {
            trace!(addressee = frame.addressee(), "Message is for another fan");
            return DispatchOutcome::NotAddressed {
                addressee: frame.addressee().to_owned(),
            };
        }

        match Self::decode_updates(&frame) {
            Ok(updates) => {
                for (channel, value) in &updates {
                    debug!(%channel, %value, "Applying channel update");
                    self.state.update(*channel, value.clone());
                    self.channels.publish(*channel, value);
                }
                DispatchOutcome::Applied(updates)
            }
            Err(error @ DispatchError::InvalidTimestamp { .. }) => {
                info!(%error, "Failed to parse fan time");
                DispatchOutcome::Dropped(error)
            }
            Err(error) => {
                debug!(%error, frame = %frame, "Dropped inbound frame");
                DispatchOutcome::Dropped(error)
            }
        }
    }

    fn decode_updates(frame: &InboundFrame) -> Result<Vec<(ChannelId, ChannelValue)>, DispatchError> {
        let message = frame.fields().join(";").to_ascii_uppercase();
        let route = ROUTES
            .iter()
            .find(|route| message.contains(route.pattern))
            .ok_or_else(|| DispatchError::Unsupported {
                message: frame.to_string(),
            })?;

        if !route.arity.accepts(frame.len()) {
            return Err(DispatchError::FieldCount {
                channel: route.channel,
                actual: frame.len(),
            });
        }

        let raw = frame.field(route.index).unwrap_or_default();
        let mut updates = vec![(route.channel, convert(route.channel, route.conversion, raw)?)];
        if let Some(trailing) = route.trailing
            && let Some(raw) = frame.field(route.index + 1)
            && frame.len() == route.index + 2
        {
            updates.push((trailing, ChannelValue::Text(raw.to_owned())));
        }

        Ok(updates)
    }
}

fn convert(
    channel: ChannelId,
    conversion: Conversion,
    raw: &str,
) -> Result<ChannelValue, DispatchError> {
    match conversion {
        Conversion::Keyword(keyword) => Ok(ChannelValue::OnOff(raw.eq_ignore_ascii_case(keyword))),
        Conversion::Scaled(scale) => {
            let native = raw
                .trim()
                .parse::<i64>()
                .map_err(|_| DispatchError::NonNumeric {
                    channel,
                    value: raw.to_owned(),
                })?;
            Ok(ChannelValue::Percent(scale.to_percent(native)))
        }
        Conversion::Text => Ok(ChannelValue::Text(raw.to_owned())),
        Conversion::Timestamp => OffsetDateTime::parse(raw, &Rfc3339)
            .map(|timestamp| ChannelValue::DateTime(timestamp.to_offset(UtcOffset::UTC)))
            .map_err(|source| DispatchError::InvalidTimestamp {
                channel,
                value: raw.to_owned(),
                source,
            }),
    }
}
