use std::io;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, instrument};

use crate::cli::command::{FanTarget, OutputFormat, parse_duration};
use crate::cli::{CliSession, write_json_line};
use crate::error::CliConfigError;
use crate::handlers::{ChannelCommand, Delivery, Percent};
use crate::hw::{ChannelValue, SessionEvent};
use crate::protocol::{ChannelId, ChannelKind};

const REFRESH: &str = "refresh";

/// JSON result emitted by the `control` command.
#[derive(Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ControlResult {
    Sent {
        channel: ChannelId,
        command: String,
        delivery: Delivery,
    },
    Refreshed {
        channel: ChannelId,
        value: Option<ChannelValue>,
    },
}

/// Arguments for the `control` command.
#[derive(Debug, Args)]
pub struct ControlArgs {
    /// Channel to command, e.g. `fan-speed` or `light-power`.
    #[arg(value_parser = parse_channel)]
    channel: ChannelId,
    /// `on`/`off` for switches, `0`-`100` for dimmers, free text otherwise, or `refresh`.
    value: String,
    /// How long to wait for the fan to report its state (e.g. `500ms`, `3s`).
    #[arg(long, value_parser = parse_duration, default_value = "3s")]
    settle: Duration,
}

impl ControlArgs {
    /// Creates control arguments for one channel command.
    ///
    /// ```
    /// use baf::{ChannelId, ControlArgs};
    ///
    /// let args = ControlArgs::new(ChannelId::FanSpeed, "50");
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(channel: ChannelId, value: impl Into<String>) -> Self {
        Self {
            channel,
            value: value.into(),
            settle: Duration::from_secs(3),
        }
    }

    /// Overrides how long to wait for state reports.
    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Parses the value according to the channel's kind.
    pub(crate) fn command(&self) -> Result<ChannelCommand, CliConfigError> {
        let value = self.value.trim();
        if value.eq_ignore_ascii_case(REFRESH) {
            return Ok(ChannelCommand::Refresh);
        }

        let invalid = |expected: &'static str| CliConfigError::InvalidValue {
            channel: self.channel,
            value: value.to_owned(),
            expected,
        };
        match self.channel.metadata().kind() {
            ChannelKind::Switch => match value.to_ascii_lowercase().as_str() {
                "on" | "true" | "1" => Ok(ChannelCommand::OnOff(true)),
                "off" | "false" | "0" => Ok(ChannelCommand::OnOff(false)),
                _ => Err(invalid("`on` or `off`")),
            },
            ChannelKind::Dimmer => value
                .trim_end_matches('%')
                .parse::<i64>()
                .ok()
                .and_then(|number| Percent::new(number).ok())
                .map(ChannelCommand::Percent)
                .ok_or_else(|| invalid("a percentage between 0 and 100")),
            ChannelKind::Text | ChannelKind::DateTime => Ok(ChannelCommand::Text(value.to_owned())),
        }
    }
}

fn parse_channel(value: &str) -> Result<ChannelId, String> {
    value
        .parse::<ChannelId>()
        .map_err(|_error| format!("unknown channel `{value}`"))
}

/// Channel whose report must be known before `channel` accepts commands.
fn prerequisite(channel: ChannelId) -> Option<ChannelId> {
    match channel {
        ChannelId::LightHue => Some(ChannelId::LightColor),
        ChannelId::LightPower
        | ChannelId::LightLevel
        | ChannelId::LightAuto
        | ChannelId::LightSmarter
        | ChannelId::LightLevelMin
        | ChannelId::LightLevelMax => Some(ChannelId::LightPresent),
        _ => None,
    }
}

/// Executes the `control` command.
#[instrument(skip_all, level = "info", fields(channel = %args.channel, value = %args.value, ?output_format))]
pub(crate) async fn run<W>(
    target: FanTarget,
    args: &ControlArgs,
    out: &mut W,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let command = args.command()?;
    let mut cli_session = CliSession::open(target).await?;
    let result = run_with_session(&mut cli_session, args, &command).await;
    cli_session.close().await;

    let result = result?;
    match output_format {
        OutputFormat::Pretty => match &result {
            ControlResult::Sent {
                channel,
                command,
                delivery,
            } => writeln!(out, "Applied {channel}: {command} ({delivery})")?,
            ControlResult::Refreshed {
                channel,
                value: Some(value),
            } => writeln!(out, "{channel}: {value}")?,
            ControlResult::Refreshed {
                channel,
                value: None,
            } => writeln!(out, "{channel}: <not reported>")?,
        },
        OutputFormat::Json => write_json_line(out, &result)?,
    }

    if let ControlResult::Sent { delivery, .. } = result
        && delivery != Delivery::Sent
    {
        bail!("command was not delivered: {delivery}");
    }
    Ok(())
}

async fn run_with_session(
    cli_session: &mut CliSession,
    args: &ControlArgs,
    command: &ChannelCommand,
) -> Result<ControlResult> {
    let channel = args.channel;

    if *command == ChannelCommand::Refresh {
        let poll = cli_session.session().request_status().await;
        debug!(%poll, "Requested fan status");
        let value = wait_for_channel(cli_session.events(), channel, args.settle).await;
        return Ok(ControlResult::Refreshed { channel, value });
    }

    if let Some(required) = prerequisite(channel) {
        let poll = cli_session.session().request_status().await;
        debug!(%poll, %required, "Waiting for fan light report");
        wait_for_channel(cli_session.events(), required, args.settle).await;
    }

    let delivery = cli_session
        .session()
        .handle_command(channel, command)
        .await?
        .unwrap_or(Delivery::Sent);
    Ok(ControlResult::Sent {
        channel,
        command: command.to_string(),
        delivery,
    })
}

async fn wait_for_channel(
    events: &mut UnboundedReceiver<SessionEvent>,
    channel: ChannelId,
    settle: Duration,
) -> Option<ChannelValue> {
    let wait = async {
        while let Some(event) = events.recv().await {
            if let SessionEvent::Channel {
                channel: reported,
                value,
            } = event
                && reported == channel
            {
                return Some(value);
            }
        }
        None
    };
    tokio::time::timeout(settle, wait).await.ok().flatten()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ChannelId::FanPower, "ON", ChannelCommand::OnOff(true))]
    #[case(ChannelId::LightAuto, "false", ChannelCommand::OnOff(false))]
    #[case(ChannelId::FanSmartmode, "cooling", ChannelCommand::Text("cooling".to_owned()))]
    #[case(ChannelId::FanSpeed, "refresh", ChannelCommand::Refresh)]
    fn values_parse_by_channel_kind(
        #[case] channel: ChannelId,
        #[case] value: &str,
        #[case] expected: ChannelCommand,
    ) {
        let command = ControlArgs::new(channel, value)
            .command()
            .expect("value should parse");
        assert_eq!(expected, command);
    }

    #[test]
    fn dimmer_accepts_percent_suffix() {
        let command = ControlArgs::new(ChannelId::LightLevel, "40%")
            .command()
            .expect("value should parse");
        assert_matches!(command, ChannelCommand::Percent(percent) if percent.value() == 40);
    }

    #[rstest]
    #[case(ChannelId::FanSpeed, "101")]
    #[case(ChannelId::FanSpeed, "fast")]
    #[case(ChannelId::FanPower, "maybe")]
    fn invalid_values_are_rejected(#[case] channel: ChannelId, #[case] value: &str) {
        let result = ControlArgs::new(channel, value).command();
        assert_matches!(result, Err(CliConfigError::InvalidValue { .. }));
    }

    #[test]
    fn light_channels_wait_for_light_report() {
        assert_eq!(Some(ChannelId::LightColor), prerequisite(ChannelId::LightHue));
        assert_eq!(Some(ChannelId::LightPresent), prerequisite(ChannelId::LightLevel));
        assert_eq!(None, prerequisite(ChannelId::FanSpeed));
    }
}
