use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use strum_macros::Display;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::hw::state::ChannelValue;
use crate::protocol::ChannelId;

/// Reachability of the fan as reported to the host.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceStatus {
    /// No status has been reported yet.
    #[strum(to_string = "unknown")]
    Unknown,
    /// The connection is up.
    #[strum(to_string = "online")]
    Online,
    /// The connection is down.
    #[strum(to_string = "offline")]
    Offline,
}

/// Reason attached to an offline status.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusDetail {
    /// The fan could not be reached.
    #[strum(to_string = "communication error")]
    CommunicationError,
    /// The session cannot run with its configuration.
    #[strum(to_string = "configuration error")]
    ConfigurationError,
}

/// Snapshot of the reported status.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct StatusReport {
    pub status: DeviceStatus,
    pub detail: Option<StatusDetail>,
    pub message: Option<String>,
}

impl StatusReport {
    fn new(status: DeviceStatus) -> Self {
        Self {
            status,
            detail: None,
            message: None,
        }
    }
}

/// Receiver of device status transitions.
pub trait StatusSink: Send + Sync {
    /// Reports the connection as up.
    fn mark_online(&self);

    /// Reports the connection as down.
    fn mark_offline(&self);

    /// Reports the connection as down with a reason.
    fn mark_offline_with_detail(&self, detail: StatusDetail, message: &str);
}

/// Receiver of channel value updates.
pub trait ChannelSink: Send + Sync {
    /// Publishes the latest value of `channel`.
    fn publish(&self, channel: ChannelId, value: &ChannelValue);
}

/// Status sink that suppresses repeated transitions before forwarding.
///
/// Online is forwarded only when not already online, plain offline only
/// when currently online, and a detailed offline unless the device is
/// already offline with a detail.
pub struct StatusTracker {
    current: Mutex<StatusReport>,
    downstream: Arc<dyn StatusSink>,
}

impl StatusTracker {
    /// Creates a tracker in the `Unknown` state.
    #[must_use]
    pub fn new(downstream: Arc<dyn StatusSink>) -> Self {
        Self {
            current: Mutex::new(StatusReport::new(DeviceStatus::Unknown)),
            downstream,
        }
    }

    /// Returns the last forwarded status.
    #[must_use]
    pub fn current(&self) -> StatusReport {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn transition(&self, next: StatusReport, accept: impl FnOnce(&StatusReport) -> bool) -> bool {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if !accept(&current) {
            debug!(status = %current.status, "Suppressed repeated status transition");
            return false;
        }
        *current = next;
        true
    }
}

impl StatusSink for StatusTracker {
    fn mark_online(&self) {
        if self.transition(StatusReport::new(DeviceStatus::Online), |current| {
            current.status != DeviceStatus::Online
        }) {
            info!("Fan is online");
            self.downstream.mark_online();
        }
    }

    fn mark_offline(&self) {
        if self.transition(StatusReport::new(DeviceStatus::Offline), |current| {
            current.status == DeviceStatus::Online
        }) {
            info!("Fan is offline");
            self.downstream.mark_offline();
        }
    }

    fn mark_offline_with_detail(&self, detail: StatusDetail, message: &str) {
        let next = StatusReport {
            status: DeviceStatus::Offline,
            detail: Some(detail),
            message: Some(message.to_owned()),
        };
        if self.transition(next, |current| {
            current.status != DeviceStatus::Offline || current.detail.is_none()
        }) {
            info!(%detail, message, "Fan is offline");
            self.downstream.mark_offline_with_detail(detail, message);
        }
    }
}

/// Event emitted by a running session.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SessionEvent {
    /// Device status changed.
    Status(StatusReport),
    /// A channel received a new value.
    Channel {
        channel: ChannelId,
        value: ChannelValue,
    },
}

/// Status and channel sink that forwards everything into a channel.
#[derive(Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    /// Creates a sink and the receiver for its events.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn emit(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            debug!("Session event receiver dropped");
        }
    }
}

impl StatusSink for EventSink {
    fn mark_online(&self) {
        self.emit(SessionEvent::Status(StatusReport::new(DeviceStatus::Online)));
    }

    fn mark_offline(&self) {
        self.emit(SessionEvent::Status(StatusReport::new(DeviceStatus::Offline)));
    }

    fn mark_offline_with_detail(&self, detail: StatusDetail, message: &str) {
        self.emit(SessionEvent::Status(StatusReport {
            status: DeviceStatus::Offline,
            detail: Some(detail),
            message: Some(message.to_owned()),
        }));
    }
}

impl ChannelSink for EventSink {
    fn publish(&self, channel: ChannelId, value: &ChannelValue) {
        self.emit(SessionEvent::Channel {
            channel,
            value: value.clone(),
        });
    }
}
