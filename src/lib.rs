mod app;
mod cli;
mod config;
mod dispatch;
mod error;
mod handlers;
mod hw;
mod protocol;
mod telemetry;
mod terminal;

pub use app::{run, run_with_clients, run_with_clients_and_log_level, run_with_log_level};
pub use cli::{
    Args, Command, ControlArgs, FakeArgs, FanTarget, ListenArgs, LogLevel, OutputFormat,
};
pub use config::{ConfigError, DeviceAddress, FanConfig, SessionTimings};
pub use dispatch::{DispatchError, DispatchOutcome, Dispatcher};
pub use error::{BindingError, CommandError, ConnectionError, SessionError};
pub use handlers::{
    BoundDirection, ChannelCommand, CommandFacade, Delivery, FrameCodec, FrameCodecError,
    InboundFrame, NativeScale, PairedBound, Percent, PercentError,
};
pub use hw::{
    ChannelSink, ChannelValue, DeviceStatus, EventSink, FakeFan, FakeFanConfig, FanBackend,
    FanConnection, FanSession, InterfaceError, LastKnownState, LinkPhase, LocalInterface,
    SessionEvent, StatusDetail, StatusReport, StatusSink, StatusTracker, resolve_local_interface,
};
pub use protocol::{BAF_PORT, ChannelId, ChannelKind, ChannelMetadata};
pub use terminal::TerminalClient;
