use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use strum_macros::Display;
use tracing::{debug, instrument, trace, warn};

use super::{BoundDirection, FrameCodec, NativeScale, PairedBound, Percent, fan, light};
use crate::error::{CommandError, ConnectionError};
use crate::hw::{ChannelSink, ChannelValue, FanConnection, LastKnownState};
use crate::protocol::ChannelId;

/// Command sent to a channel by the host.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ChannelCommand {
    /// Switch command.
    OnOff(bool),
    /// Dimmer command.
    Percent(Percent),
    /// Text command.
    Text(String),
    /// Request to re-read the channel.
    Refresh,
}

impl fmt::Display for ChannelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnOff(on) => f.write_str(on_off(*on)),
            Self::Percent(percent) => write!(f, "{percent}"),
            Self::Text(text) => f.write_str(text),
            Self::Refresh => f.write_str("REFRESH"),
        }
    }
}

/// Fate of an outbound command.
#[must_use]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Delivery {
    /// The frame was written to the socket.
    #[strum(to_string = "sent")]
    Sent,
    /// No connection could be established.
    #[strum(to_string = "not connected")]
    NotConnected,
    /// The frame could not be encoded; nothing was sent.
    #[strum(to_string = "rejected")]
    Rejected,
    /// The socket write failed and the connection was closed.
    #[strum(to_string = "write failed")]
    WriteFailed,
}

pub(crate) fn on_off(on: bool) -> &'static str {
    if on { "ON" } else { "OFF" }
}

/// Sends commands to the fan and keeps the last known state in step.
pub struct CommandFacade {
    connection: Arc<FanConnection>,
    state: Arc<LastKnownState>,
    channels: Arc<dyn ChannelSink>,
}

impl CommandFacade {
    /// Creates a facade over an open or closed connection.
    #[must_use]
    pub fn new(
        connection: Arc<FanConnection>,
        state: Arc<LastKnownState>,
        channels: Arc<dyn ChannelSink>,
    ) -> Self {
        Self {
            connection,
            state,
            channels,
        }
    }

    /// Last known channel values.
    #[must_use]
    pub fn state(&self) -> &LastKnownState {
        &self.state
    }

    /// Sends one `;`-prefixed command fragment.
    ///
    /// Reconnects once when the link is down.
    #[instrument(skip(self), fields(mac = %self.connection.address().mac()))]
    pub async fn send_fragment(&self, fragment: &str) -> Delivery {
        if !self.connection.is_connected() {
            debug!("Reconnecting before sending command");
            if let Err(error) = self.connection.connect().await {
                debug!(%error, "Reconnect before send failed");
            }
            if !self.connection.is_connected() {
                warn!("Dropped command, fan is not connected");
                return Delivery::NotConnected;
            }
        }

        let frame = match FrameCodec::encode(self.connection.address().mac(), fragment) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "Dropped command that cannot be encoded");
                return Delivery::Rejected;
            }
        };

        trace!(frame = %String::from_utf8_lossy(&frame), "Sending command");
        match self.connection.write(&frame).await {
            Ok(()) => Delivery::Sent,
            Err(ConnectionError::NotConnected | ConnectionError::WriteInterrupted) => {
                warn!("Dropped command, connection closed during send");
                Delivery::NotConnected
            }
            Err(error) => {
                warn!(%error, "Failed to send command");
                self.connection.disconnect().await;
                Delivery::WriteFailed
            }
        }
    }

    /// Sends `;PATH;VALUE`.
    pub async fn send_value(&self, path: &str, value: impl fmt::Display) -> Delivery {
        self.send_fragment(&FrameCodec::command_fragment(path, value))
            .await
    }

    /// Sends a percentage converted to the fan's native range.
    ///
    /// ```
    /// # async fn demo(facade: baf::CommandFacade) {
    /// use baf::{NativeScale, Percent};
    ///
    /// let half = Percent::new(50).expect("50 is a valid percent");
    /// // Sends `<mac;FAN;SPD;SET;4>`.
    /// let delivery = facade.send_percent("FAN;SPD;SET", half, NativeScale::Speed).await;
    /// # let _ = delivery;
    /// # }
    /// ```
    pub async fn send_percent(&self, path: &str, percent: Percent, scale: NativeScale) -> Delivery {
        self.send_value(path, scale.to_native(percent)).await
    }

    /// Sends `ON` or `OFF`.
    pub async fn send_boolean(&self, path: &str, on: bool) -> Delivery {
        self.send_value(path, on_off(on)).await
    }

    /// Records a channel value locally and publishes it.
    pub fn record(&self, channel: ChannelId, value: ChannelValue) {
        self.state.update(channel, value.clone());
        self.channels.publish(channel, &value);
    }

    /// Records a channel value locally without publishing it.
    pub fn remember(&self, channel: ChannelId, value: ChannelValue) {
        self.state.update(channel, value);
    }
}

/// Value carried by a planned command.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum PlannedValue {
    OnOff(bool),
    Scaled(Percent, NativeScale),
    Keyword(&'static str),
}

/// Frame to send for a channel command, plus its state bookkeeping.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct CommandPlan {
    pub(crate) path: &'static str,
    pub(crate) value: PlannedValue,
    /// Channel whose local value is updated once the command is sent.
    pub(crate) remembers: Option<ChannelId>,
    pub(crate) clamp: Option<(PairedBound, BoundDirection)>,
}

impl CommandPlan {
    pub(crate) fn switch(path: &'static str, on: bool) -> Self {
        Self::new(path, PlannedValue::OnOff(on))
    }

    pub(crate) fn scaled(path: &'static str, percent: Percent, scale: NativeScale) -> Self {
        Self::new(path, PlannedValue::Scaled(percent, scale))
    }

    pub(crate) fn keyword(path: &'static str, keyword: &'static str) -> Self {
        Self::new(path, PlannedValue::Keyword(keyword))
    }

    /// A bound command that remembers its own value and keeps its partner
    /// on the correct side.
    pub(crate) fn bound(
        channel: ChannelId,
        path: &'static str,
        percent: Percent,
        partner: PairedBound,
        direction: BoundDirection,
    ) -> Self {
        Self {
            remembers: Some(channel),
            clamp: Some((partner, direction)),
            ..Self::scaled(path, percent, partner.scale)
        }
    }

    fn new(path: &'static str, value: PlannedValue) -> Self {
        Self {
            path,
            value,
            remembers: None,
            clamp: None,
        }
    }

    /// Fragment this plan sends first.
    pub(crate) fn fragment(&self) -> String {
        match self.value {
            PlannedValue::OnOff(on) => FrameCodec::command_fragment(self.path, on_off(on)),
            PlannedValue::Scaled(percent, scale) => {
                FrameCodec::command_fragment(self.path, scale.to_native(percent))
            }
            PlannedValue::Keyword(keyword) => FrameCodec::command_fragment(self.path, keyword),
        }
    }
}

impl CommandFacade {
    /// Handles a host command for `channel`.
    ///
    /// `Refresh` is accepted and ignored. Returns the delivery of the
    /// channel's own frame.
    ///
    /// # Errors
    ///
    /// Returns an error when the channel is read-only, does not accept the
    /// command, or needs a light feature the fan lacks. Nothing is sent.
    #[instrument(skip(self), fields(mac = %self.connection.address().mac()))]
    pub async fn handle_command(
        &self,
        channel: ChannelId,
        command: &ChannelCommand,
    ) -> Result<Option<Delivery>, CommandError> {
        if *command == ChannelCommand::Refresh {
            trace!(%channel, "Ignoring refresh");
            return Ok(None);
        }

        let plan = match channel {
            ChannelId::FanPower
            | ChannelId::FanSpeed
            | ChannelId::FanAuto
            | ChannelId::FanWhoosh
            | ChannelId::FanSmartmode
            | ChannelId::FanLearnMinspeed
            | ChannelId::FanLearnMaxspeed
            | ChannelId::FanSpeedMin
            | ChannelId::FanSpeedMax
            | ChannelId::FanWintermode
            | ChannelId::FanSleep => fan::plan(channel, command),
            ChannelId::LightPower
            | ChannelId::LightLevel
            | ChannelId::LightHue
            | ChannelId::LightAuto
            | ChannelId::LightSmarter
            | ChannelId::LightLevelMin
            | ChannelId::LightLevelMax => light::plan(channel, command, &self.state),
            ChannelId::FanDirection
            | ChannelId::LightPresent
            | ChannelId::LightColor
            | ChannelId::Motion
            | ChannelId::Time => Err(CommandError::ReadOnlyChannel { channel }),
        }
        .inspect_err(|error| debug!(%error, "Ignoring command"))?;

        Ok(Some(self.execute(plan).await))
    }

    async fn execute(&self, plan: CommandPlan) -> Delivery {
        let delivery = self.send_fragment(&plan.fragment()).await;
        if let (Some(channel), PlannedValue::Scaled(percent, _)) = (plan.remembers, plan.value) {
            self.remember(channel, ChannelValue::Percent(percent));
            if let Some((partner, direction)) = plan.clamp
                && let Some(correction) = self.clamp_paired_bound(percent, partner, direction).await
            {
                debug!(%correction, channel = %partner.channel, "Sent paired bound correction");
            }
        }
        delivery
    }
}
