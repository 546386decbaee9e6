use std::net::SocketAddrV4;
use std::time::Duration;

use derive_more::From;
use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatch::DispatchError;
use crate::handlers::{FrameCodecError, PercentError};
use crate::hw::InterfaceError;
use crate::protocol::ChannelId;

/// Errors returned by the fan TCP connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("not connected to the fan")]
    NotConnected,
    #[error("failed to create a TCP socket")]
    Socket { source: std::io::Error },
    #[error("failed to bind to local address {address}")]
    Bind {
        address: std::net::Ipv4Addr,
        source: std::io::Error,
    },
    #[error("failed to connect to fan at {address}")]
    Connect {
        address: SocketAddrV4,
        source: std::io::Error,
    },
    #[error(
        "timed out after {timeout} connecting to fan at {address}",
        timeout = humantime::format_duration(*timeout)
    )]
    ConnectTimeout {
        address: SocketAddrV4,
        timeout: Duration,
    },
    #[error("failed to read from the fan")]
    Read { source: std::io::Error },
    #[error("failed to write to the fan")]
    Write { source: std::io::Error },
    #[error("write interrupted by disconnect")]
    WriteInterrupted,
}

/// Errors returned when starting a fan session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No suitable network interface")]
    Interface(#[from] InterfaceError),
}

/// Errors returned when a channel command cannot be sent.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum CommandError {
    #[error("channel `{channel}` is read-only")]
    ReadOnlyChannel { channel: ChannelId },
    #[error("channel `{channel}` does not accept `{command}`")]
    UnsupportedCommand { channel: ChannelId, command: String },
    #[error("the fan has no light installed")]
    LightNotPresent,
    #[error("the fan light does not support colour temperature")]
    ColourNotSupported,
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("`--ip` is required unless `--fake` is set")]
    MissingIp,
    #[error("`--max-updates` must be greater than zero")]
    ZeroMaxUpdates,
    #[error("invalid value `{value}` for `{channel}`: expected {expected}")]
    InvalidValue {
        channel: ChannelId,
        value: String,
        expected: &'static str,
    },
}

/// Errors returned when preparing the runtime fan backend.
#[derive(Debug, Error)]
pub(crate) enum BackendError {
    #[error("failed to start the fake fan")]
    FakeFan(#[source] std::io::Error),
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Top-level binding errors wrapping module-specific error types.
#[derive(Debug, Error, From)]
pub enum BindingError {
    #[error(transparent)]
    #[from(ConfigError, Box<ConfigError>)]
    Config(Box<ConfigError>),
    #[error(transparent)]
    #[from(ConnectionError, Box<ConnectionError>)]
    Connection(Box<ConnectionError>),
    #[error(transparent)]
    #[from(SessionError, Box<SessionError>)]
    Session(Box<SessionError>),
    #[error(transparent)]
    #[from(CommandError, Box<CommandError>)]
    Command(Box<CommandError>),
    #[error(transparent)]
    #[from(FrameCodecError, Box<FrameCodecError>)]
    FrameCodec(Box<FrameCodecError>),
    #[error(transparent)]
    #[from(PercentError, Box<PercentError>)]
    Percent(Box<PercentError>),
    #[error(transparent)]
    #[from(DispatchError, Box<DispatchError>)]
    Dispatch(Box<DispatchError>),
}
