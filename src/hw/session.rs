use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use super::connection::FanConnection;
use super::health::HealthCheck;
use super::interface::resolve_local_interface;
use super::listener::ListenerSupervisor;
use super::state::LastKnownState;
use super::status::{ChannelSink, StatusDetail, StatusReport, StatusSink, StatusTracker};
use crate::config::{ConfigError, DeviceAddress, FanConfig, SessionTimings};
use crate::dispatch::Dispatcher;
use crate::error::{CommandError, SessionError};
use crate::handlers::{ChannelCommand, CommandFacade, Delivery, NativeScale, Percent};
use crate::protocol::{ChannelId, STATUS_POLL_FRAGMENT};

const NO_INTERFACE_MESSAGE: &str = "No suitable network interface";

/// Tasks and handles of a started session.
struct Running {
    connection: Arc<FanConnection>,
    facade: Arc<CommandFacade>,
    listener: Arc<ListenerSupervisor>,
    health_cancel: CancellationToken,
    listener_cancel: CancellationToken,
    health: JoinHandle<()>,
}

/// Connection lifecycle and command entry point for one fan.
///
/// ```no_run
/// # async fn demo() -> Result<(), baf::BindingError> {
/// use std::sync::Arc;
///
/// use baf::{EventSink, FanConfig, FanSession, SessionTimings};
///
/// let config = FanConfig::builder()
///     .mac("20:F8:5E:AA:BB:CC")
///     .label("Living Room")
///     .ip("192.168.1.40")
///     .build();
/// let (sink, mut events) = EventSink::channel();
/// let sink = Arc::new(sink);
/// let session = FanSession::new(&config, SessionTimings::default(), sink.clone(), sink)?;
///
/// session.start().await?;
/// while let Some(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// session.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct FanSession {
    address: DeviceAddress,
    timings: SessionTimings,
    status: Arc<StatusTracker>,
    channels: Arc<dyn ChannelSink>,
    state: Arc<LastKnownState>,
    /// Serialises `start` and `stop`.
    lifecycle: Mutex<()>,
    /// Held only briefly, so commands never wait for a connect.
    running: Mutex<Option<Running>>,
}

impl FanSession {
    /// Validates `config` and creates a stopped session.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid.
    pub fn new(
        config: &FanConfig,
        timings: SessionTimings,
        status: Arc<dyn StatusSink>,
        channels: Arc<dyn ChannelSink>,
    ) -> Result<Self, ConfigError> {
        let address = config.validate()?;
        Ok(Self {
            address,
            timings,
            status: Arc::new(StatusTracker::new(status)),
            channels,
            state: Arc::new(LastKnownState::new()),
            lifecycle: Mutex::new(()),
            running: Mutex::new(None),
        })
    }

    /// Addressing information of the fan.
    #[must_use]
    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Last known channel values.
    #[must_use]
    pub fn state(&self) -> &LastKnownState {
        &self.state
    }

    /// Last reported device status.
    #[must_use]
    pub fn status(&self) -> StatusReport {
        self.status.current()
    }

    /// Returns whether the session is started and the link is up.
    pub async fn is_connected(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| running.connection.is_connected())
    }

    /// Connects and schedules the listener and health check.
    ///
    /// Idempotent. A failed first connect is reported through the status
    /// sink and retried by the health check. Commands and status queries
    /// issued while the first connect is pending see a stopped session.
    ///
    /// # Errors
    ///
    /// Returns an error when no local interface owns the configured local
    /// address. Nothing is started in that case.
    #[instrument(skip(self), fields(mac = %self.address.mac(), address = %self.address.socket_addr()))]
    pub async fn start(&self) -> Result<(), SessionError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.running.lock().await.is_some() {
            debug!("Session already started");
            return Ok(());
        }

        let interface = match resolve_local_interface(self.address.local_address()) {
            Ok(interface) => interface,
            Err(error) => {
                warn!(%error, "Cannot start fan session");
                self.status
                    .mark_offline_with_detail(StatusDetail::ConfigurationError, NO_INTERFACE_MESSAGE);
                return Err(error.into());
            }
        };

        let status: Arc<dyn StatusSink> = Arc::clone(&self.status) as Arc<dyn StatusSink>;
        let connection = Arc::new(FanConnection::new(
            self.address.clone(),
            interface,
            self.timings.connect_timeout,
            status,
        ));
        let facade = Arc::new(CommandFacade::new(
            Arc::clone(&connection),
            Arc::clone(&self.state),
            Arc::clone(&self.channels),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            self.address.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.channels),
        ));

        if let Err(error) = connection.connect().await {
            debug!(%error, "Initial connect failed, health check will retry");
        }

        let listener_cancel = CancellationToken::new();
        let listener = Arc::new(ListenerSupervisor::new(
            Arc::clone(&connection),
            dispatcher,
            self.timings.reconnect_idle,
            listener_cancel.clone(),
        ));

        let health_cancel = CancellationToken::new();
        let health_check = HealthCheck {
            connection: Arc::clone(&connection),
            facade: Arc::clone(&facade),
            listener: Arc::clone(&listener),
            initial_delay: self.timings.health_check_initial_delay,
            interval: self.timings.health_check_interval,
        };
        let health = tokio::spawn(
            health_check
                .run(health_cancel.clone())
                .instrument(info_span!("fan_health_check", mac = %self.address.mac())),
        );
        listener.spawn_after(self.timings.listener_delay);

        info!("Fan session started");
        *self.running.lock().await = Some(Running {
            connection,
            facade,
            listener,
            health_cancel,
            listener_cancel,
            health,
        });
        Ok(())
    }

    /// Cancels the health check and listener, then disconnects.
    ///
    /// Idempotent. Returns once both tasks have ended.
    #[instrument(skip(self), fields(mac = %self.address.mac()))]
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        running.health_cancel.cancel();
        running.listener_cancel.cancel();
        running.connection.disconnect().await;

        if let Err(error) = running.health.await {
            warn!(%error, "Health check task failed");
        }
        let exit = running.listener.join().await;
        // A check or command in flight may have reconnected meanwhile.
        running.connection.disconnect().await;
        info!(?exit, "Fan session stopped");
    }

    async fn facade(&self) -> Option<Arc<CommandFacade>> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|running| Arc::clone(&running.facade))
    }

    /// Sends `;PATH;VALUE` with `percent` converted by `scale`.
    pub async fn send_percent(&self, path: &str, percent: Percent, scale: NativeScale) -> Delivery {
        match self.facade().await {
            Some(facade) => facade.send_percent(path, percent, scale).await,
            None => Delivery::NotConnected,
        }
    }

    /// Sends `;PATH;ON` or `;PATH;OFF`.
    pub async fn send_boolean(&self, path: &str, on: bool) -> Delivery {
        match self.facade().await {
            Some(facade) => facade.send_boolean(path, on).await,
            None => Delivery::NotConnected,
        }
    }

    /// Asks the fan to report every channel.
    pub async fn request_status(&self) -> Delivery {
        match self.facade().await {
            Some(facade) => facade.send_fragment(STATUS_POLL_FRAGMENT).await,
            None => Delivery::NotConnected,
        }
    }

    /// Handles a host command for `channel`.
    ///
    /// # Errors
    ///
    /// Returns an error when the channel does not accept the command.
    pub async fn handle_command(
        &self,
        channel: ChannelId,
        command: &ChannelCommand,
    ) -> Result<Option<Delivery>, CommandError> {
        match self.facade().await {
            Some(facade) => facade.handle_command(channel, command).await,
            None => Ok(Some(Delivery::NotConnected)),
        }
    }
}
