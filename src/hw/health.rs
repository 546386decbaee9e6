use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::FanConnection;
use super::listener::ListenerSupervisor;
use crate::handlers::{CommandFacade, Delivery};
use crate::protocol::{OCCUPANCY_POLL_FRAGMENT, STATUS_POLL_FRAGMENT};

/// Periodic reconnect and status poll for one fan.
pub(crate) struct HealthCheck {
    pub(crate) connection: Arc<FanConnection>,
    pub(crate) facade: Arc<CommandFacade>,
    pub(crate) listener: Arc<ListenerSupervisor>,
    pub(crate) initial_delay: Duration,
    pub(crate) interval: Duration,
}

impl HealthCheck {
    /// Runs checks on a fixed-delay schedule until cancelled.
    ///
    /// A check in progress always completes before cancellation is seen.
    pub(crate) async fn run(self, cancel: CancellationToken) {
        let mut delay = self.initial_delay;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = sleep(delay) => {}
            }
            delay = self.interval;
            self.check_once().await;
        }
        debug!("Health check stopped");
    }

    /// Reconnects a dropped link, otherwise polls the fan for its state.
    pub(crate) async fn check_once(&self) {
        if !self.connection.is_connected() {
            info!("Health check reconnecting to fan");
            if let Err(error) = self.connection.connect().await {
                debug!(%error, "Health check reconnect failed");
            }
        } else {
            debug!("Health check polling fan state");
            for fragment in [STATUS_POLL_FRAGMENT, OCCUPANCY_POLL_FRAGMENT] {
                let delivery = self.facade.send_fragment(fragment).await;
                if delivery != Delivery::Sent {
                    warn!(%delivery, fragment, "Health check poll was not sent");
                    break;
                }
            }
        }

        self.listener.ensure_running();
    }
}
