use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use strum_macros::Display;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use super::connection::FanConnection;
use crate::dispatch::Dispatcher;

/// Why a listener task ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub(crate) enum ListenerExit {
    /// The session was stopped.
    #[strum(to_string = "stopped")]
    Stopped,
    /// A socket read failed.
    #[strum(to_string = "read failed")]
    ReadFailed,
}

/// Reads frames until stopped and hands them to the dispatcher.
///
/// Backs off while the link is down. The caller must disconnect after
/// cancelling so a blocked read returns.
pub(crate) async fn listen(
    connection: Arc<FanConnection>,
    dispatcher: Arc<Dispatcher>,
    idle: Duration,
    cancel: CancellationToken,
) -> ListenerExit {
    info!("Fan listener started");
    loop {
        if cancel.is_cancelled() {
            break;
        }

        if !connection.is_connected() {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = sleep(idle) => continue,
            }
        }

        match connection.read().await {
            Ok(Some(token)) => {
                let outcome = dispatcher.process(&token);
                debug!(?outcome, "Processed fan message");
            }
            Ok(None) => {}
            Err(error) => {
                warn!(%error, "Fan listener stopped after read failure");
                return ListenerExit::ReadFailed;
            }
        }
    }

    info!("Fan listener stopped");
    ListenerExit::Stopped
}

/// Owns the listener task and restarts it after a read failure.
pub(crate) struct ListenerSupervisor {
    connection: Arc<FanConnection>,
    dispatcher: Arc<Dispatcher>,
    idle: Duration,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<ListenerExit>>>,
}

impl ListenerSupervisor {
    pub(crate) fn new(
        connection: Arc<FanConnection>,
        dispatcher: Arc<Dispatcher>,
        idle: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connection,
            dispatcher,
            idle,
            cancel,
            task: Mutex::new(None),
        }
    }

    /// Starts the listener after `delay`.
    pub(crate) fn spawn_after(&self, delay: Duration) {
        let connection = Arc::clone(&self.connection);
        let dispatcher = Arc::clone(&self.dispatcher);
        let cancel = self.cancel.clone();
        let idle = self.idle;
        let span = info_span!("fan_listener", mac = %connection.address().mac());
        let handle = tokio::spawn(
            async move {
                tokio::select! {
                    () = cancel.cancelled() => return ListenerExit::Stopped,
                    () = sleep(delay) => {}
                }
                listen(connection, dispatcher, idle, cancel).await
            }
            .instrument(span),
        );

        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Restarts the listener if it ended while the session is running.
    pub(crate) fn ensure_running(&self) {
        if self.cancel.is_cancelled() || !self.connection.is_connected() {
            return;
        }
        let finished = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(JoinHandle::is_finished);
        if finished {
            info!("Restarting fan listener");
            self.spawn_after(Duration::ZERO);
        }
    }

    /// Waits for the listener task to end.
    pub(crate) async fn join(&self) -> Option<ListenerExit> {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        match handle.await {
            Ok(exit) => Some(exit),
            Err(error) => {
                warn!(%error, "Fan listener task failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::FanConfig;
    use crate::hw::interface::LocalInterface;
    use crate::hw::state::LastKnownState;
    use crate::hw::status::EventSink;

    fn supervisor(cancel: CancellationToken) -> ListenerSupervisor {
        let address = FanConfig::builder()
            .mac("20:F8:5E:AA:BB:CC")
            .label("Office")
            .ip("127.0.0.1")
            .port(9)
            .build()
            .validate()
            .expect("test config should validate");
        let (sink, _events) = EventSink::channel();
        let sink = Arc::new(sink);
        let connection = Arc::new(FanConnection::new(
            address.clone(),
            LocalInterface::unspecified(),
            Duration::from_millis(100),
            sink.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            address,
            Arc::new(LastKnownState::new()),
            sink,
        ));
        ListenerSupervisor::new(connection, dispatcher, Duration::from_millis(10), cancel)
    }

    #[tokio::test]
    async fn join_without_task_is_none() {
        let supervisor = supervisor(CancellationToken::new());

        assert_eq!(None, supervisor.join().await);
    }

    #[tokio::test]
    async fn cancelled_listener_reports_stopped() {
        let cancel = CancellationToken::new();
        let supervisor = supervisor(cancel.clone());
        supervisor.spawn_after(Duration::ZERO);
        sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        assert_eq!(Some(ListenerExit::Stopped), supervisor.join().await);
    }

    #[tokio::test]
    async fn cancel_during_start_delay_reports_stopped() {
        let cancel = CancellationToken::new();
        let supervisor = supervisor(cancel.clone());
        supervisor.spawn_after(Duration::from_secs(60));
        cancel.cancel();

        assert_eq!(Some(ListenerExit::Stopped), supervisor.join().await);
    }
}
