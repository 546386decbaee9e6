use std::io;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use derive_more::Display;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::sleep;
use tracing::{debug, instrument};

use crate::cli::command::{FanTarget, OutputFormat, parse_duration};
use crate::cli::{CliSession, write_json_line};
use crate::error::CliConfigError;
use crate::hw::SessionEvent;
use crate::terminal::TerminalClient;

use super::ui::{ListenSummaryView, Painter, SessionEventView, SessionReadyView};

/// Arguments for the `listen` command.
#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Stop after this many channel updates. If omitted, listen until Ctrl+C.
    #[arg(long)]
    max_updates: Option<usize>,
    /// Stop after this long (e.g. `30s`, `5m`).
    #[arg(long, value_parser = parse_duration)]
    duration: Option<Duration>,
}

impl ListenArgs {
    /// Creates listen arguments with an optional update limit.
    #[must_use]
    pub fn new(max_updates: Option<usize>) -> Self {
        Self {
            max_updates,
            duration: None,
        }
    }

    /// Also stops listening after `duration`.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Why a listen run ended.
#[derive(Debug, Clone, Eq, PartialEq, Display, Serialize)]
#[serde(tag = "reason", content = "updates", rename_all = "snake_case")]
pub(crate) enum ListenStopReason {
    #[display("reached limit of {_0} update(s)")]
    ReachedLimit(usize),
    #[display("reached duration")]
    ReachedDuration,
    #[display("interrupted")]
    Interrupted,
    #[display("event stream closed")]
    EventStreamClosed,
}

/// Outcome of a listen run.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ListenSummary {
    received_updates: usize,
    stop_reason: ListenStopReason,
}

impl ListenSummary {
    pub(crate) fn new(received_updates: usize, stop_reason: ListenStopReason) -> Self {
        Self {
            received_updates,
            stop_reason,
        }
    }

    pub(crate) fn received_updates(&self) -> usize {
        self.received_updates
    }

    pub(crate) fn stop_reason(&self) -> &ListenStopReason {
        &self.stop_reason
    }
}

/// Executes the `listen` command.
#[instrument(skip_all, level = "info", fields(max_updates = ?args.max_updates, ?output_format))]
pub(crate) async fn run<W>(
    target: FanTarget,
    args: &ListenArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    if args.max_updates == Some(0) {
        return Err(CliConfigError::ZeroMaxUpdates.into());
    }
    let painter = Painter::new(terminal_client.stdout_is_terminal());
    let mut cli_session = CliSession::open(target).await?;

    if output_format == OutputFormat::Pretty {
        let ready = SessionReadyView::new(cli_session.session().address(), &painter);
        if let Err(error) = writeln!(out, "{ready}") {
            cli_session.close().await;
            return Err(error.into());
        }
    }
    let poll = cli_session.session().request_status().await;
    debug!(%poll, "Requested fan status");

    let streamed = stream_events(cli_session.events(), args, out, &painter, output_format).await;
    cli_session.close().await;
    let summary = streamed?;

    match output_format {
        OutputFormat::Pretty => {
            writeln!(out)?;
            writeln!(out, "{}", ListenSummaryView::new(&summary, &painter))?;
        }
        OutputFormat::Json => write_json_line(out, &summary)?,
    }

    Ok(())
}

async fn stream_events<W>(
    events: &mut UnboundedReceiver<SessionEvent>,
    args: &ListenArgs,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<ListenSummary>
where
    W: io::Write,
{
    let deadline = sleep(args.duration.unwrap_or(Duration::MAX));
    tokio::pin!(deadline);
    let mut index = 0;
    let mut received_updates = 0;

    let stop_reason = loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => break ListenStopReason::Interrupted,
            () = &mut deadline, if args.duration.is_some() => break ListenStopReason::ReachedDuration,
            event = events.recv() => event,
        };
        let Some(event) = event else {
            break ListenStopReason::EventStreamClosed;
        };

        index += 1;
        match output_format {
            OutputFormat::Pretty => {
                writeln!(out, "{}", SessionEventView::new(index, &event, painter))?;
            }
            OutputFormat::Json => write_json_line(out, &event)?,
        }
        if matches!(event, SessionEvent::Channel { .. }) {
            received_updates += 1;
            if args.max_updates == Some(received_updates) {
                break ListenStopReason::ReachedLimit(received_updates);
            }
        }
    };

    Ok(ListenSummary::new(received_updates, stop_reason))
}
