use std::io;

use anyhow::Result;
use tracing::instrument;

use crate::cli::{Command, FanTarget, LogLevel, OutputFormat};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Runs the CLI command against the selected fan.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = baf::Args::try_parse_from(["baf", "--fake", "channels"])?;
/// let (command, target) = args.into_command_and_target()?;
/// let mut out = Vec::new();
/// baf::run(command, &mut out, target, baf::OutputFormat::Json).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the session cannot start,
/// the command is rejected, or output writing fails.
pub async fn run<W>(
    command: Command,
    out: &mut W,
    target: FanTarget,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_log_level(command, out, target, None, output_format).await
}

/// Runs the CLI command with an explicit telemetry log-level override.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the session cannot start,
/// the command is rejected, or output writing fails.
pub async fn run_with_log_level<W>(
    command: Command,
    out: &mut W,
    target: FanTarget,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        out,
        &SystemTerminalClient,
        target,
        log_level,
        output_format,
    )
    .await
}

/// Runs the CLI command with an injected terminal client.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the session cannot start,
/// the command is rejected, or output writing fails.
pub async fn run_with_clients<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    target: FanTarget,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(command, out, terminal_client, target, None, output_format)
        .await
}

/// Runs the CLI command with injected clients and explicit telemetry settings.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// struct FakeTerminal;
/// impl baf::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let args = baf::Args::try_parse_from([
///     "baf",
///     "--log-level",
///     "trace",
///     "--fake",
///     "--listener-delay",
///     "0s",
///     "control",
///     "fan-power",
///     "on",
/// ])?;
/// let log_level = args.log_level();
/// let (command, target) = args.into_command_and_target()?;
/// let mut out = Vec::new();
/// baf::run_with_clients_and_log_level(
///     command,
///     &mut out,
///     &FakeTerminal,
///     target,
///     log_level,
///     baf::OutputFormat::Pretty,
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the session cannot start,
/// the command is rejected, or output writing fails.
#[instrument(
    skip(out, terminal_client, target),
    level = "info",
    fields(command = %command_name(&command), ?log_level)
)]
pub async fn run_with_clients_and_log_level<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    target: FanTarget,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "baf",
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    match command {
        Command::Channels => crate::cli::channels::run(out, terminal_client, output_format),
        Command::Listen(args) => {
            crate::cli::listen::run(target, &args, out, terminal_client, output_format).await
        }
        Command::Control(args) => {
            crate::cli::control::run(target, &args, out, output_format).await
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Channels => "channels",
        Command::Listen(_args) => "listen",
        Command::Control(_args) => "control",
    }
}
