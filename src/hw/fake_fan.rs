use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bon::Builder;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, trace, warn};

const DEFAULT_LABEL: &str = "Fake Fan";
const FRAME_END: u8 = b'>';
const POLL_STEP: Duration = Duration::from_millis(10);

/// Settings for an in-process fake fan.
#[derive(Debug, Clone, Builder)]
pub struct FakeFanConfig {
    /// Name the fake uses to address its replies.
    #[builder(into, default = DEFAULT_LABEL.to_owned())]
    label: String,
    /// Frame bodies sent in reply to a status poll, without parentheses.
    #[builder(default)]
    status_frames: Vec<String>,
    /// Whether commands are echoed back as state reports.
    #[builder(default = true)]
    echo_commands: bool,
}

impl Default for FakeFanConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

struct Peer {
    id: usize,
    writer: OwnedWriteHalf,
    closed: CancellationToken,
}

#[derive(Default)]
struct Shared {
    received: Mutex<Vec<String>>,
    peers: tokio::sync::Mutex<Vec<Peer>>,
    peer_addrs: Mutex<Vec<SocketAddr>>,
}

/// TCP server on loopback that speaks the fan protocol.
///
/// Records every `<...>` frame it receives, answers status polls with the
/// configured frames and echoes commands back as state reports.
pub struct FakeFan {
    address: SocketAddrV4,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    accept: JoinHandle<()>,
}

impl FakeFan {
    /// Binds to an ephemeral loopback port and starts accepting.
    ///
    /// # Errors
    ///
    /// Returns an error when the listening socket cannot be bound.
    pub async fn start(config: FakeFanConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).await?;
        let address = match listener.local_addr()? {
            SocketAddr::V4(address) => address,
            SocketAddr::V6(address) => SocketAddrV4::new(Ipv4Addr::LOCALHOST, address.port()),
        };
        let shared = Arc::new(Shared::default());
        let cancel = CancellationToken::new();
        let accept = tokio::spawn(
            accept_loop(listener, Arc::new(config), Arc::clone(&shared), cancel.clone())
                .instrument(info_span!("fake_fan", %address)),
        );
        debug!(%address, "Fake fan listening");

        Ok(Self {
            address,
            shared,
            cancel,
            accept,
        })
    }

    /// Address the fake listens on.
    #[must_use]
    pub fn address(&self) -> SocketAddrV4 {
        self.address
    }

    /// Frame bodies received so far, without angle brackets.
    #[must_use]
    pub fn received(&self) -> Vec<String> {
        lock(&self.shared.received).clone()
    }

    /// Remote addresses of every accepted connection.
    #[must_use]
    pub fn peer_addrs(&self) -> Vec<SocketAddr> {
        lock(&self.shared.peer_addrs).clone()
    }

    /// Waits until a received frame body ends with `suffix`.
    ///
    /// Returns `false` when `timeout` elapses first.
    pub async fn wait_for_frame(&self, suffix: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.received().iter().any(|frame| frame.ends_with(suffix)) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(POLL_STEP).await;
        }
    }

    /// Waits until `count` connections have been accepted.
    pub async fn wait_for_connections(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.peer_addrs().len() >= count {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(POLL_STEP).await;
        }
    }

    /// Sends `(body)` to every connected client.
    ///
    /// # Errors
    ///
    /// Returns an error when a client write fails.
    pub async fn push(&self, body: &str) -> std::io::Result<()> {
        let frame = format!("({body})");
        let mut peers = self.shared.peers.lock().await;
        for peer in peers.iter_mut() {
            peer.writer.write_all(frame.as_bytes()).await?;
        }
        Ok(())
    }

    /// Closes every client connection, as a fan reboot would.
    pub async fn drop_connections(&self) {
        let mut peers = self.shared.peers.lock().await;
        for mut peer in peers.drain(..) {
            peer.closed.cancel();
            if let Err(error) = peer.writer.shutdown().await {
                trace!(%error, "Fake fan client already closed");
            }
        }
    }

    /// Stops accepting and closes every client connection.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.drop_connections().await;
        if let Err(error) = self.accept.await {
            warn!(%error, "Fake fan accept task failed");
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: Arc<FakeFanConfig>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            () = cancel.cancelled() => return,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer_addr)) => {
                debug!(%peer_addr, "Fake fan accepted connection");
                let id = lock(&shared.peer_addrs).len() + 1;
                let closed = cancel.child_token();
                let (read_half, writer) = stream.into_split();
                shared.peers.lock().await.push(Peer {
                    id,
                    writer,
                    closed: closed.clone(),
                });
                // Recorded last so a waiting test sees the peer registered.
                lock(&shared.peer_addrs).push(peer_addr);
                let shared = Arc::clone(&shared);
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    serve(id, read_half, &config, &shared, closed).await;
                    shared.peers.lock().await.retain(|peer| peer.id != id);
                });
            }
            Err(error) => warn!(%error, "Fake fan failed to accept"),
        }
    }
}

async fn serve(
    id: usize,
    read_half: OwnedReadHalf,
    config: &FakeFanConfig,
    shared: &Shared,
    closed: CancellationToken,
) {
    let mut reader = BufReader::new(read_half);
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        let read = tokio::select! {
            () = closed.cancelled() => return,
            read = reader.read_until(FRAME_END, &mut buffer) => read,
        };
        match read {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        let text = String::from_utf8_lossy(&buffer);
        let Some((_, body)) = text.trim_end_matches('>').split_once('<') else {
            continue;
        };
        trace!(body, "Fake fan received frame");
        lock(&shared.received).push(body.to_owned());

        let replies = replies_for(config, body);
        if replies.is_empty() {
            continue;
        }
        let mut peers = shared.peers.lock().await;
        let Some(peer) = peers.iter_mut().find(|peer| peer.id == id) else {
            return;
        };
        for reply in replies {
            if peer.writer.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builds the frames a fan would send back for `body`.
fn replies_for(config: &FakeFanConfig, body: &str) -> Vec<String> {
    let fields: Vec<&str> = body.split(';').skip(1).collect();
    let label = &config.label;

    match fields.as_slice() {
        ["GETALL"] => config
            .status_frames
            .iter()
            .map(|frame| format!("({frame})"))
            .collect(),
        _ if !config.echo_commands => Vec::new(),
        ["FAN", "SPD", "SET", "MIN", value] => vec![format!("({label};FAN;SPD;MIN;{value})")],
        ["FAN", "SPD", "SET", "MAX", value] => vec![format!("({label};FAN;SPD;MAX;{value})")],
        ["FAN", "SPD", "SET", value] => vec![format!("({label};FAN;SPD;ACTUAL;{value})")],
        ["LIGHT", "LEVEL", "SET", value] => vec![format!("({label};LIGHT;LEVEL;ACTUAL;{value})")],
        [path @ ("FAN" | "LIGHT"), "PWR", value] => vec![format!("({label};{path};PWR;{value})")],
        _ => Vec::new(),
    }
}
