use std::net::{SocketAddr, SocketAddrV4};
use std::sync::{Arc, PoisonError};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use strum_macros::{Display, FromRepr};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use super::interface::LocalInterface;
use super::status::{StatusDetail, StatusSink};
use crate::config::DeviceAddress;
use crate::error::ConnectionError;

const TOKEN_DELIMITER: u8 = b')';
const MAX_TOKEN_LEN: usize = 4096;

/// Lifecycle phase of the fan connection.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, FromRepr)]
#[repr(u8)]
pub enum LinkPhase {
    #[strum(to_string = "disconnected")]
    Disconnected,
    #[strum(to_string = "connecting")]
    Connecting,
    #[strum(to_string = "connected")]
    Connected,
}

/// Write side of an established connection.
#[derive(Default)]
struct Link {
    writer: Option<OwnedWriteHalf>,
    closed: CancellationToken,
    generation: u64,
}

/// Cancellation handle of the current link, reachable without the link lock.
#[derive(Default)]
struct LinkInterrupt {
    closed: CancellationToken,
    generation: u64,
}

enum ReadOutcome {
    Token(String),
    Oversized,
    Cancelled,
    Eof,
    Failed(std::io::Error),
}

/// Read side of an established connection, split on `)`.
struct FrameReader {
    lines: BufReader<OwnedReadHalf>,
    buffer: Vec<u8>,
    discarding: bool,
    closed: CancellationToken,
    generation: u64,
}

impl FrameReader {
    fn new(read_half: OwnedReadHalf, closed: CancellationToken, generation: u64) -> Self {
        Self {
            lines: BufReader::new(read_half),
            buffer: Vec::new(),
            discarding: false,
            closed,
            generation,
        }
    }

    async fn next_token(&mut self) -> ReadOutcome {
        loop {
            let remaining = (MAX_TOKEN_LEN + 1).saturating_sub(self.buffer.len()) as u64;
            let mut limited = (&mut self.lines).take(remaining);
            let read = tokio::select! {
                () = self.closed.cancelled() => return ReadOutcome::Cancelled,
                read = limited.read_until(TOKEN_DELIMITER, &mut self.buffer) => read,
            };

            if let Err(error) = read {
                return ReadOutcome::Failed(error);
            }

            if self.buffer.last() == Some(&TOKEN_DELIMITER) {
                self.buffer.pop();
                let token = std::mem::take(&mut self.buffer);
                if std::mem::take(&mut self.discarding) {
                    trace!(len = token.len(), "Discarded tail of oversized token");
                    continue;
                }
                if token.is_empty() {
                    continue;
                }
                return ReadOutcome::Token(String::from_utf8_lossy(&token).into_owned());
            }

            if self.buffer.len() > MAX_TOKEN_LEN {
                self.buffer.clear();
                if std::mem::replace(&mut self.discarding, true) {
                    continue;
                }
                return ReadOutcome::Oversized;
            }

            return ReadOutcome::Eof;
        }
    }
}

/// TCP connection to one fan.
///
/// Connect, disconnect and write are serialised on one lock. Reads use a
/// separate lock so a pending read never blocks a command. A disconnect
/// interrupts a pending read or write before it waits for the lock.
pub struct FanConnection {
    address: DeviceAddress,
    interface: LocalInterface,
    connect_timeout: Duration,
    status: Arc<dyn StatusSink>,
    phase: AtomicU8,
    link: Mutex<Link>,
    interrupt: std::sync::Mutex<LinkInterrupt>,
    reader: Mutex<Option<FrameReader>>,
}

impl FanConnection {
    /// Creates a disconnected connection.
    #[must_use]
    pub fn new(
        address: DeviceAddress,
        interface: LocalInterface,
        connect_timeout: Duration,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            address,
            interface,
            connect_timeout,
            status,
            phase: AtomicU8::new(LinkPhase::Disconnected as u8),
            link: Mutex::new(Link::default()),
            interrupt: std::sync::Mutex::new(LinkInterrupt::default()),
            reader: Mutex::new(None),
        }
    }

    /// Addressing information of the fan.
    #[must_use]
    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> LinkPhase {
        LinkPhase::from_repr(self.phase.load(Ordering::Acquire)).unwrap_or(LinkPhase::Disconnected)
    }

    /// Returns whether the connection is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.phase() == LinkPhase::Connected
    }

    fn set_phase(&self, phase: LinkPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Opens the TCP connection unless it is already open.
    ///
    /// Failures are also reported to the status sink as a communication
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error when the socket cannot be created, bound or
    /// connected within the connect timeout.
    #[instrument(skip(self), fields(mac = %self.address.mac(), address = %self.address.socket_addr()))]
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let mut link = self.link.lock().await;
        if self.is_connected() {
            trace!("Already connected");
            return Ok(());
        }

        self.set_phase(LinkPhase::Connecting);
        let stream = match self.open_stream().await {
            Ok(stream) => stream,
            Err(error) => {
                self.set_phase(LinkPhase::Disconnected);
                warn!(%error, "Failed to connect to fan");
                self.status
                    .mark_offline_with_detail(StatusDetail::CommunicationError, &error.to_string());
                return Err(error);
            }
        };

        if let Err(error) = stream.set_nodelay(true) {
            debug!(%error, "Failed to disable Nagle's algorithm");
        }
        let (read_half, write_half) = stream.into_split();
        let closed = CancellationToken::new();
        let generation = link.generation.wrapping_add(1);

        *self.reader.lock().await = Some(FrameReader::new(read_half, closed.clone(), generation));
        *self
            .interrupt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = LinkInterrupt {
            closed: closed.clone(),
            generation,
        };
        *link = Link {
            writer: Some(write_half),
            closed,
            generation,
        };
        self.set_phase(LinkPhase::Connected);
        info!("Connected to fan");
        self.status.mark_online();

        Ok(())
    }

    async fn open_stream(&self) -> Result<TcpStream, ConnectionError> {
        let target = self.address.socket_addr();
        let local = self.interface.address();
        let socket = TcpSocket::new_v4().map_err(|source| ConnectionError::Socket { source })?;
        socket
            .bind(SocketAddr::from((local, 0)))
            .map_err(|source| ConnectionError::Bind {
                address: local,
                source,
            })?;

        match timeout(self.connect_timeout, socket.connect(SocketAddr::V4(target))).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(ConnectionError::Connect {
                address: target,
                source,
            }),
            Err(_) => Err(ConnectionError::ConnectTimeout {
                address: target,
                timeout: self.connect_timeout,
            }),
        }
    }

    /// Closes the connection.
    ///
    /// Idempotent. A pending read is interrupted and the offline status is
    /// reported once per established connection.
    #[instrument(skip(self), fields(mac = %self.address.mac()))]
    pub async fn disconnect(&self) {
        self.close(None).await;
    }

    async fn close(&self, generation: Option<u64>) {
        {
            let interrupt = self.interrupt.lock().unwrap_or_else(PoisonError::into_inner);
            if generation.is_none_or(|generation| generation == interrupt.generation) {
                interrupt.closed.cancel();
            }
        }

        let mut link = self.link.lock().await;
        if generation.is_some_and(|generation| generation != link.generation) {
            trace!("Ignoring close for a previous connection");
            return;
        }
        let Some(mut writer) = link.writer.take() else {
            return;
        };

        link.closed.cancel();
        if let Err(error) = writer.shutdown().await {
            warn!(%error, "Failed to shut down fan connection");
        }
        drop(writer);
        self.reader.lock().await.take();
        self.set_phase(LinkPhase::Disconnected);
        info!("Disconnected from fan");
        self.status.mark_offline();
    }

    /// Reads the next `)`-delimited token.
    ///
    /// Returns `Ok(None)` when there is no connection, the read was
    /// interrupted by a disconnect, the fan closed the connection, or the
    /// token exceeded the size limit.
    ///
    /// # Errors
    ///
    /// Returns an error when the socket read fails. The connection is closed
    /// first.
    pub async fn read(&self) -> Result<Option<String>, ConnectionError> {
        let mut guard = self.reader.lock().await;
        let Some(reader) = guard.as_mut() else {
            return Ok(None);
        };
        let generation = reader.generation;
        let outcome = reader.next_token().await;
        drop(guard);

        match outcome {
            ReadOutcome::Token(token) => {
                trace!(len = token.len(), "Read token from fan");
                Ok(Some(token))
            }
            ReadOutcome::Oversized => {
                debug!(limit = MAX_TOKEN_LEN, "Dropped oversized token");
                Ok(None)
            }
            ReadOutcome::Cancelled => Ok(None),
            ReadOutcome::Eof => {
                info!("Fan closed the connection");
                self.close(Some(generation)).await;
                Ok(None)
            }
            ReadOutcome::Failed(source) => {
                warn!(error = %source, "Failed to read from fan");
                self.close(Some(generation)).await;
                Err(ConnectionError::Read { source })
            }
        }
    }

    /// Writes a complete frame.
    ///
    /// # Errors
    ///
    /// Returns an error when not connected, the socket write fails, or a
    /// disconnect interrupts the write.
    pub async fn write(&self, frame: &[u8]) -> Result<(), ConnectionError> {
        let mut link = self.link.lock().await;
        let closed = link.closed.clone();
        let writer = link.writer.as_mut().ok_or(ConnectionError::NotConnected)?;
        let written = tokio::select! {
            () = closed.cancelled() => return Err(ConnectionError::WriteInterrupted),
            written = async {
                writer.write_all(frame).await?;
                writer.flush().await
            } => written,
        };
        written.map_err(|source| ConnectionError::Write { source })?;
        trace!(len = frame.len(), "Wrote frame to fan");
        Ok(())
    }

    /// Local address of the established connection, for diagnostics.
    pub async fn local_addr(&self) -> Option<SocketAddrV4> {
        let link = self.link.lock().await;
        match link.writer.as_ref()?.local_addr().ok()? {
            SocketAddr::V4(address) => Some(address),
            SocketAddr::V6(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::time::sleep;

    use super::*;
    use crate::config::FanConfig;

    #[derive(Debug, Clone, Eq, PartialEq)]
    enum Recorded {
        Online,
        Offline,
        OfflineWithDetail(StatusDetail),
    }

    #[derive(Default)]
    struct RecordingStatus {
        events: StdMutex<Vec<Recorded>>,
    }

    impl RecordingStatus {
        fn events(&self) -> Vec<Recorded> {
            self.events.lock().expect("status lock should not be poisoned").clone()
        }

        fn push(&self, event: Recorded) {
            self.events
                .lock()
                .expect("status lock should not be poisoned")
                .push(event);
        }
    }

    impl StatusSink for RecordingStatus {
        fn mark_online(&self) {
            self.push(Recorded::Online);
        }

        fn mark_offline(&self) {
            self.push(Recorded::Offline);
        }

        fn mark_offline_with_detail(&self, detail: StatusDetail, _message: &str) {
            self.push(Recorded::OfflineWithDetail(detail));
        }
    }

    fn connection_to(port: u16, status: Arc<RecordingStatus>) -> FanConnection {
        let address = FanConfig::builder()
            .mac("AA:BB")
            .label("Office")
            .ip("127.0.0.1")
            .port(port)
            .build()
            .validate()
            .expect("test config should validate");
        FanConnection::new(
            address,
            LocalInterface::unspecified(),
            Duration::from_millis(500),
            status,
        )
    }

    async fn connected_pair() -> (FanConnection, Arc<RecordingStatus>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("test listener should bind");
        let port = listener
            .local_addr()
            .expect("test listener should have an address")
            .port();
        let status = Arc::new(RecordingStatus::default());
        let connection = connection_to(port, Arc::clone(&status));

        let (connected, accepted) = tokio::join!(connection.connect(), listener.accept());
        connected.expect("connect should succeed");
        let (peer, _) = accepted.expect("accept should succeed");
        (connection, status, peer)
    }

    #[tokio::test]
    async fn connect_marks_online() {
        let (connection, status, _peer) = connected_pair().await;

        assert_eq!(LinkPhase::Connected, connection.phase());
        assert_eq!(vec![Recorded::Online], status.events());
    }

    #[tokio::test]
    async fn connect_when_connected_is_a_no_op() {
        let (connection, status, _peer) = connected_pair().await;
        connection.connect().await.expect("second connect should be a no-op");

        assert_eq!(vec![Recorded::Online], status.events());
    }

    #[tokio::test]
    async fn read_splits_on_closing_paren_and_skips_empty_tokens() {
        let (connection, _status, mut peer) = connected_pair().await;
        peer.write_all(b"(AA:BB;FAN;PWR;ON))\r\n(AA:BB;FAN;SPD;ACTUAL;3)")
            .await
            .expect("peer write should succeed");

        assert_eq!(
            Some("(AA:BB;FAN;PWR;ON".to_owned()),
            connection.read().await.expect("read should succeed")
        );
        assert_eq!(
            Some("\r\n(AA:BB;FAN;SPD;ACTUAL;3".to_owned()),
            connection.read().await.expect("read should succeed")
        );
    }

    #[tokio::test]
    async fn eof_disconnects_and_reports_offline_once() {
        let (connection, status, peer) = connected_pair().await;
        drop(peer);

        assert_eq!(None, connection.read().await.expect("eof is not an error"));
        assert_eq!(LinkPhase::Disconnected, connection.phase());
        connection.disconnect().await;

        assert_eq!(vec![Recorded::Online, Recorded::Offline], status.events());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (connection, status, _peer) = connected_pair().await;
        connection.disconnect().await;
        connection.disconnect().await;

        assert_eq!(vec![Recorded::Online, Recorded::Offline], status.events());
        assert_eq!(None, connection.read().await.expect("read without reader is not an error"));
    }

    #[tokio::test]
    async fn write_without_connection_fails() {
        let status = Arc::new(RecordingStatus::default());
        let connection = connection_to(9, status);

        assert_matches!(
            connection.write(b"<AA:BB;FAN;PWR;ON>").await,
            Err(ConnectionError::NotConnected)
        );
    }

    #[tokio::test]
    async fn refused_connection_reports_communication_error() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("test listener should bind");
        let port = listener
            .local_addr()
            .expect("test listener should have an address")
            .port();
        drop(listener);
        let status = Arc::new(RecordingStatus::default());
        let connection = connection_to(port, Arc::clone(&status));

        assert_matches!(
            connection.connect().await,
            Err(ConnectionError::Connect { .. })
        );
        assert_eq!(LinkPhase::Disconnected, connection.phase());
        assert_eq!(
            vec![Recorded::OfflineWithDetail(StatusDetail::CommunicationError)],
            status.events()
        );
        assert_eq!(None, connection.read().await.expect("read without reader is not an error"));
    }

    #[tokio::test]
    async fn disconnect_interrupts_pending_read() {
        let (connection, _status, _peer) = connected_pair().await;
        let connection = Arc::new(connection);
        let reader = tokio::spawn({
            let connection = Arc::clone(&connection);
            async move { connection.read().await }
        });
        tokio::task::yield_now().await;
        connection.disconnect().await;

        let read = reader.await.expect("reader task should not panic");
        assert_matches!(read, Ok(None));
    }

    #[tokio::test]
    async fn disconnect_interrupts_write_the_fan_never_drains() {
        let (connection, status, _peer) = connected_pair().await;
        let connection = Arc::new(connection);
        let writer = tokio::spawn({
            let connection = Arc::clone(&connection);
            async move { connection.write(&vec![b'x'; 64 << 20]).await }
        });
        sleep(Duration::from_millis(100)).await;

        timeout(Duration::from_secs(3), connection.disconnect())
            .await
            .expect("disconnect should not wait for the stalled write");
        let written = timeout(Duration::from_secs(3), writer)
            .await
            .expect("stalled write should end")
            .expect("writer task should not panic");
        assert_matches!(written, Err(ConnectionError::WriteInterrupted));
        assert_eq!(LinkPhase::Disconnected, connection.phase());
        assert_eq!(vec![Recorded::Online, Recorded::Offline], status.events());
    }

    /// Listener whose accept queue is full, so further connects stall.
    async fn saturated_listener() -> (TcpListener, Vec<TcpStream>) {
        let socket = TcpSocket::new_v4().expect("test socket should be created");
        socket
            .bind(SocketAddr::from((std::net::Ipv4Addr::LOCALHOST, 0)))
            .expect("test socket should bind");
        let listener = socket.listen(0).expect("test socket should listen");
        let address = listener
            .local_addr()
            .expect("test listener should have an address");

        let mut queued = Vec::new();
        for _ in 0..4 {
            if let Ok(Ok(stream)) =
                timeout(Duration::from_millis(100), TcpStream::connect(address)).await
            {
                queued.push(stream);
            }
        }
        (listener, queued)
    }

    #[tokio::test]
    async fn connect_timeout_reports_communication_error() {
        let (listener, _queued) = saturated_listener().await;
        let port = listener
            .local_addr()
            .expect("test listener should have an address")
            .port();
        let status = Arc::new(RecordingStatus::default());
        let connection = connection_to(port, Arc::clone(&status));

        assert_matches!(
            connection.connect().await,
            Err(ConnectionError::ConnectTimeout { timeout, .. }) if timeout == Duration::from_millis(500)
        );
        assert_eq!(LinkPhase::Disconnected, connection.phase());
        assert_eq!(
            vec![Recorded::OfflineWithDetail(StatusDetail::CommunicationError)],
            status.events()
        );
        let read = timeout(Duration::from_millis(100), connection.read())
            .await
            .expect("read without a link should not block");
        assert_eq!(None, read.expect("read without reader is not an error"));
    }

    #[tokio::test]
    async fn oversized_tokens_are_dropped() {
        let (connection, _status, mut peer) = connected_pair().await;
        let mut payload = vec![b'x'; MAX_TOKEN_LEN + 10];
        payload.extend_from_slice(b")(AA:BB;FAN;PWR;OFF)");
        peer.write_all(&payload).await.expect("peer write should succeed");

        assert_eq!(None, connection.read().await.expect("oversized token is not an error"));
        assert_eq!(
            Some("(AA:BB;FAN;PWR;OFF".to_owned()),
            connection.read().await.expect("read should succeed")
        );
        assert!(connection.is_connected());
    }
}
