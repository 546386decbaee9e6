mod connection;
mod fake_fan;
mod hardware;
mod health;
mod interface;
mod listener;
mod session;
mod state;
mod status;

pub use self::connection::{FanConnection, LinkPhase};
pub use self::fake_fan::{FakeFan, FakeFanConfig};
pub use self::hardware::FanBackend;
pub(crate) use self::hardware::PreparedFan;
pub use self::interface::{InterfaceError, LocalInterface, resolve_local_interface};
pub use self::session::FanSession;
pub use self::state::{ChannelValue, LastKnownState};
pub use self::status::{
    ChannelSink, DeviceStatus, EventSink, SessionEvent, StatusDetail, StatusReport, StatusSink,
    StatusTracker,
};
