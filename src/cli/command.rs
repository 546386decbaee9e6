use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;

use crate::cli::control::ControlArgs;
use crate::cli::listen::ListenArgs;
use crate::config::{FanConfig, SessionTimings};
use crate::error::CliConfigError;
use crate::hw::{FakeFanConfig, FanBackend};
use crate::protocol::BAF_PORT;

const DEFAULT_MAC: &str = "20:F8:5E:00:00:01";
const DEFAULT_LABEL: &str = "Fake Fan";
const DEFAULT_FAKE_STATUS: [&str; 8] = [
    "FAN;PWR;ON",
    "FAN;SPD;ACTUAL;3",
    "FAN;SPD;MIN;1",
    "FAN;SPD;MAX;7",
    "FAN;DIR;FWD",
    "LIGHT;PWR;OFF",
    "LIGHT;LEVEL;ACTUAL;8",
    "DEVICE;LIGHT;PRESENT;COLOR",
];

/// Command-line options for the Big Ass Fans tool.
#[derive(Debug, Parser)]
#[command(name = "baf", about = "Monitor and control Big Ass Fans devices over TCP.")]
pub struct Args {
    /// Fan MAC address used to address outgoing frames.
    #[arg(long, global = true, default_value = DEFAULT_MAC)]
    mac: String,
    /// Fan name as it appears in the fan's own messages.
    #[arg(long, global = true, default_value = DEFAULT_LABEL)]
    label: String,
    /// Fan IPv4 address. Required unless `--fake` is set.
    #[arg(long, global = true)]
    ip: Option<String>,
    /// Fan TCP port.
    #[arg(long, global = true, default_value_t = BAF_PORT)]
    port: u16,
    /// Local IPv4 address to bind outgoing connections to.
    #[arg(long, global = true)]
    local_address: Option<String>,
    /// Connect timeout (e.g. `1500ms`, `2s`).
    #[arg(long, global = true, value_parser = parse_duration, default_value = "1500ms")]
    connect_timeout: Duration,
    /// Delay before the listener starts reading (e.g. `0s`, `2s`).
    #[arg(long, global = true, value_parser = parse_duration, default_value = "2s")]
    listener_delay: Duration,
    /// Uses an in-process fake fan instead of a real device.
    #[arg(long, global = true, conflicts_with = "ip")]
    fake: bool,
    /// Frame the fake fan reports on a status poll, without the label (e.g. `FAN;PWR;ON`).
    #[arg(long = "fake-status", global = true, requires = "fake")]
    fake_status: Vec<String>,
    /// Overrides `RUST_LOG` for this run.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format. Defaults to pretty on a terminal, JSON otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use baf::{Args, Command, ListenArgs};
    ///
    /// let channels = Args::new(Command::Channels);
    /// let listen = Args::new(Command::Listen(ListenArgs::new(Some(10))));
    /// let _ = (channels, listen);
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            mac: DEFAULT_MAC.to_owned(),
            label: DEFAULT_LABEL.to_owned(),
            ip: None,
            port: BAF_PORT,
            local_address: None,
            connect_timeout: SessionTimings::default().connect_timeout,
            listener_delay: SessionTimings::default().listener_delay,
            fake: false,
            fake_status: Vec::new(),
            log_level: None,
            output: None,
            command,
        }
    }

    /// Targets the fan at `ip`.
    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Enables fake backend mode with pre-parsed fake configuration.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        self.fake = true;
        self.fake_status = fake.status_frames;
        self.listener_delay = fake.listener_delay;
        self
    }

    /// Returns the log-level override, if any.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Returns the requested output format, if any.
    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Splits parsed CLI arguments into the command and the fan it targets.
    ///
    /// # Errors
    ///
    /// Returns an error if a command that connects has no fan address
    /// outside fake mode.
    pub fn into_command_and_target(self) -> anyhow::Result<(Command, FanTarget)> {
        let Args {
            mac,
            label,
            ip,
            port,
            local_address,
            connect_timeout,
            listener_delay,
            fake,
            fake_status,
            command,
            ..
        } = self;

        let backend = if fake {
            FanBackend::Fake(fake_fan_config(&label, fake_status))
        } else {
            FanBackend::Real
        };
        let ip = match ip {
            Some(ip) => ip,
            // Redirected to the fake fan once it is listening. `channels`
            // never connects.
            None if fake || matches!(command, Command::Channels) => {
                std::net::Ipv4Addr::LOCALHOST.to_string()
            }
            None => return Err(CliConfigError::MissingIp.into()),
        };

        let config = FanConfig::builder()
            .mac(mac)
            .label(label)
            .ip(ip)
            .port(port)
            .maybe_local_address(local_address)
            .build();
        let timings = SessionTimings::builder()
            .connect_timeout(connect_timeout)
            .listener_delay(listener_delay)
            .build();

        Ok((
            command,
            FanTarget::builder()
                .config(config)
                .timings(timings)
                .backend(backend)
                .build(),
        ))
    }
}

fn fake_fan_config(label: &str, status_frames: Vec<String>) -> FakeFanConfig {
    let frames: Vec<String> = if status_frames.is_empty() {
        DEFAULT_FAKE_STATUS.iter().map(|&frame| frame.to_owned()).collect()
    } else {
        status_frames
    };

    FakeFanConfig::builder()
        .label(label)
        .status_frames(
            frames
                .into_iter()
                .map(|frame| format!("{label};{frame}"))
                .collect(),
        )
        .build()
}

/// Fake backend arguments for programmatic runs.
#[derive(Debug, Builder)]
pub struct FakeArgs {
    /// Frames reported on a status poll, without the label.
    #[builder(default)]
    status_frames: Vec<String>,
    #[builder(default = Duration::ZERO)]
    listener_delay: Duration,
}

/// Fan endpoint, session timings and backend selected for a run.
#[derive(Debug, Builder)]
pub struct FanTarget {
    config: FanConfig,
    #[builder(default)]
    timings: SessionTimings,
    #[builder(default)]
    backend: FanBackend,
}

impl FanTarget {
    pub(crate) fn into_parts(self) -> (FanConfig, SessionTimings, FanBackend) {
        (self.config, self.timings, self.backend)
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List every channel the fan reports, with its value kind.
    Channels,
    /// Connect, poll the fan once, then print channel updates as they arrive.
    Listen(ListenArgs),
    /// Connect, then send one command to a channel.
    Control(ControlArgs),
}

/// Log verbosity selectable on the command line.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Output rendering for command results.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable, coloured on a terminal.
    Pretty,
    /// One JSON document per result.
    Json,
}

pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
