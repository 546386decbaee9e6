use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{sleep, timeout};

use baf::{
    ChannelCommand, ChannelId, ChannelValue, CommandError, Delivery, DeviceStatus, EventSink,
    FakeFan, FakeFanConfig, FanConfig, FanSession, NativeScale, Percent, SessionError,
    SessionEvent, SessionTimings, StatusDetail,
};

const MAC: &str = "20:F8:5E:AA:BB:CC";
const LABEL: &str = "Living Room";
const WAIT: Duration = Duration::from_secs(3);

fn timings() -> SessionTimings {
    SessionTimings::builder()
        .connect_timeout(Duration::from_millis(500))
        .listener_delay(Duration::ZERO)
        .health_check_initial_delay(Duration::from_secs(60))
        .health_check_interval(Duration::from_secs(60))
        .reconnect_idle(Duration::from_millis(20))
        .build()
}

fn config_for(endpoint: SocketAddrV4) -> FanConfig {
    FanConfig::builder()
        .mac(MAC)
        .label(LABEL)
        .ip(endpoint.ip().to_string())
        .port(endpoint.port())
        .build()
}

async fn fake_fan() -> FakeFan {
    FakeFan::start(FakeFanConfig::builder().label(LABEL).build())
        .await
        .expect("fake fan should bind to loopback")
}

fn session_for(
    config: &FanConfig,
    timings: SessionTimings,
) -> (FanSession, UnboundedReceiver<SessionEvent>) {
    let (sink, events) = EventSink::channel();
    let sink = Arc::new(sink);
    let session =
        FanSession::new(config, timings, sink.clone(), sink).expect("test config is valid");
    (session, events)
}

async fn next_event(events: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("session event should arrive")
        .expect("event stream should stay open")
}

async fn next_status(events: &mut UnboundedReceiver<SessionEvent>) -> baf::StatusReport {
    loop {
        if let SessionEvent::Status(report) = next_event(events).await {
            return report;
        }
    }
}

async fn next_value(
    events: &mut UnboundedReceiver<SessionEvent>,
    channel: ChannelId,
) -> ChannelValue {
    loop {
        if let SessionEvent::Channel {
            channel: reported,
            value,
        } = next_event(events).await
            && reported == channel
        {
            return value;
        }
    }
}

fn percent(value: i64) -> Percent {
    Percent::new(value).expect("test percent is in range")
}

#[tokio::test]
async fn start_reports_online_and_applies_pushed_frames() {
    let fake = fake_fan().await;
    let (session, mut events) = session_for(&config_for(fake.address()), timings());

    session.start().await.expect("session should start");
    assert_eq!(DeviceStatus::Online, next_status(&mut events).await.status);
    assert!(session.is_connected().await);
    assert!(fake.wait_for_connections(1, WAIT).await);

    fake.push("Living Room;FAN;SPD;ACTUAL;3")
        .await
        .expect("push should reach the session");
    assert_eq!(
        ChannelValue::Percent(percent(43)),
        next_value(&mut events, ChannelId::FanSpeed).await
    );
    assert_eq!(Some(percent(43)), session.state().percent(ChannelId::FanSpeed));

    session.stop().await;
    fake.shutdown().await;
}

#[tokio::test]
async fn frames_for_other_fans_are_ignored() {
    let fake = fake_fan().await;
    let (session, mut events) = session_for(&config_for(fake.address()), timings());
    session.start().await.expect("session should start");
    assert!(fake.wait_for_connections(1, WAIT).await);

    fake.push("Bedroom;FAN;PWR;ON").await.expect("push");
    fake.push("20:f8:5e:aa:bb:cc;FAN;PWR;OFF").await.expect("push");

    assert_matches!(next_status(&mut events).await.status, DeviceStatus::Online);
    assert_eq!(
        SessionEvent::Channel {
            channel: ChannelId::FanPower,
            value: ChannelValue::OnOff(false),
        },
        next_event(&mut events).await
    );

    session.stop().await;
    fake.shutdown().await;
}

#[tokio::test]
async fn commands_are_framed_with_the_mac() {
    let fake = fake_fan().await;
    let (session, mut events) = session_for(&config_for(fake.address()), timings());
    session.start().await.expect("session should start");

    let delivery = session
        .send_percent("FAN;SPD;SET", percent(50), NativeScale::Speed)
        .await;
    assert_eq!(Delivery::Sent, delivery);
    assert!(
        fake.wait_for_frame("20:F8:5E:AA:BB:CC;FAN;SPD;SET;4", WAIT)
            .await
    );
    assert_eq!(
        ChannelValue::Percent(percent(57)),
        next_value(&mut events, ChannelId::FanSpeed).await
    );

    assert_eq!(Delivery::Sent, session.send_boolean("LIGHT;PWR", true).await);
    assert!(fake.wait_for_frame(";LIGHT;PWR;ON", WAIT).await);

    session.stop().await;
    fake.shutdown().await;
}

#[tokio::test]
async fn raising_min_speed_above_max_moves_max() {
    let fake = fake_fan().await;
    let (session, mut events) = session_for(&config_for(fake.address()), timings());
    session.start().await.expect("session should start");
    assert!(fake.wait_for_connections(1, WAIT).await);

    fake.push("Living Room;FAN;SPD;MAX;3").await.expect("push");
    assert_eq!(
        ChannelValue::Percent(percent(43)),
        next_value(&mut events, ChannelId::FanSpeedMax).await
    );

    let delivery = session
        .handle_command(ChannelId::FanSpeedMin, &ChannelCommand::Percent(percent(86)))
        .await
        .expect("min speed accepts a percentage");
    assert_eq!(Some(Delivery::Sent), delivery);

    assert!(fake.wait_for_frame(";FAN;SPD;SET;MIN;6", WAIT).await);
    assert!(fake.wait_for_frame(";FAN;SPD;SET;MAX;6", WAIT).await);
    assert_eq!(
        ChannelValue::Percent(percent(86)),
        next_value(&mut events, ChannelId::FanSpeedMax).await
    );
    assert_eq!(Some(percent(86)), session.state().percent(ChannelId::FanSpeedMin));

    session.stop().await;
    fake.shutdown().await;
}

#[tokio::test]
async fn raising_min_speed_with_unknown_max_also_sets_max() {
    let fake = FakeFan::start(
        FakeFanConfig::builder()
            .label(LABEL)
            .echo_commands(false)
            .build(),
    )
    .await
    .expect("fake fan should bind to loopback");
    let (session, _events) = session_for(&config_for(fake.address()), timings());
    session.start().await.expect("session should start");
    assert_eq!(None, session.state().percent(ChannelId::FanSpeedMax));

    let delivery = session
        .handle_command(ChannelId::FanSpeedMin, &ChannelCommand::Percent(percent(80)))
        .await
        .expect("min speed accepts a percentage");
    assert_eq!(Some(Delivery::Sent), delivery);

    assert!(fake.wait_for_frame(";FAN;SPD;SET;MIN;6", WAIT).await);
    assert!(fake.wait_for_frame(";FAN;SPD;SET;MAX;6", WAIT).await);
    assert_eq!(Some(percent(80)), session.state().percent(ChannelId::FanSpeedMin));
    assert_eq!(Some(percent(80)), session.state().percent(ChannelId::FanSpeedMax));

    session.stop().await;
    fake.shutdown().await;
}

#[tokio::test]
async fn light_commands_need_an_installed_light() {
    let fake = fake_fan().await;
    let (session, mut events) = session_for(&config_for(fake.address()), timings());
    session.start().await.expect("session should start");

    let result = session
        .handle_command(ChannelId::LightPower, &ChannelCommand::OnOff(true))
        .await;
    assert_eq!(Err(CommandError::LightNotPresent), result);

    fake.push("Living Room;DEVICE;LIGHT;PRESENT").await.expect("push");
    next_value(&mut events, ChannelId::LightPresent).await;

    let result = session
        .handle_command(ChannelId::LightHue, &ChannelCommand::Percent(percent(50)))
        .await;
    assert_eq!(Err(CommandError::ColourNotSupported), result);
    let result = session
        .handle_command(ChannelId::LightPower, &ChannelCommand::OnOff(true))
        .await;
    assert_eq!(Ok(Some(Delivery::Sent)), result);

    session.stop().await;
    fake.shutdown().await;
}

#[tokio::test]
async fn stop_reports_offline_once() {
    let fake = fake_fan().await;
    let (session, mut events) = session_for(&config_for(fake.address()), timings());
    session.start().await.expect("session should start");
    assert_eq!(DeviceStatus::Online, next_status(&mut events).await.status);

    session.stop().await;
    session.stop().await;

    let report = next_status(&mut events).await;
    assert_eq!(DeviceStatus::Offline, report.status);
    assert_eq!(None, report.detail);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(Err(TryRecvError::Empty), events.try_recv());
    assert!(!session.is_connected().await);
    assert_eq!(
        Delivery::NotConnected,
        session.send_boolean("FAN;PWR", true).await
    );

    fake.shutdown().await;
}

#[tokio::test]
async fn unreachable_fan_reports_communication_error() {
    let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind loopback listener");
    let std::net::SocketAddr::V4(endpoint) = listener.local_addr().expect("loopback listener address") else {
        panic!("loopback listener should be IPv4");
    };
    drop(listener);

    let (session, mut events) = session_for(&config_for(endpoint), timings());
    session
        .start()
        .await
        .expect("a failed first connect still starts the session");

    let report = next_status(&mut events).await;
    assert_eq!(DeviceStatus::Offline, report.status);
    assert_eq!(Some(StatusDetail::CommunicationError), report.detail);
    assert!(!session.is_connected().await);

    session.stop().await;
}

/// Listener whose accept queue is full, so further connects stall.
async fn saturated_listener() -> (TcpListener, Vec<TcpStream>) {
    let socket = TcpSocket::new_v4().expect("test socket");
    socket
        .bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0).into())
        .expect("bind stalled listener");
    let listener = socket.listen(0).expect("listen on stalled listener");
    let address = listener.local_addr().expect("stalled listener address");

    let mut queued = Vec::new();
    for _ in 0..4 {
        if let Ok(Ok(stream)) = timeout(Duration::from_millis(100), TcpStream::connect(address)).await
        {
            queued.push(stream);
        }
    }
    (listener, queued)
}

#[tokio::test]
async fn queries_do_not_wait_for_a_pending_first_connect() {
    let (listener, _queued) = saturated_listener().await;
    let std::net::SocketAddr::V4(endpoint) = listener.local_addr().expect("listener address") else {
        panic!("loopback listener should be IPv4");
    };
    let timings = SessionTimings::builder()
        .connect_timeout(Duration::from_secs(1))
        .listener_delay(Duration::ZERO)
        .health_check_initial_delay(Duration::from_secs(60))
        .health_check_interval(Duration::from_secs(60))
        .reconnect_idle(Duration::from_millis(20))
        .build();
    let (session, mut events) = session_for(&config_for(endpoint), timings);
    let session = Arc::new(session);

    let starting = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.start().await }
    });
    sleep(Duration::from_millis(100)).await;

    let connected = timeout(Duration::from_millis(200), session.is_connected())
        .await
        .expect("is_connected should not wait for the connect");
    assert!(!connected);
    let delivery = timeout(
        Duration::from_millis(200),
        session.send_boolean("FAN;PWR", true),
    )
    .await
    .expect("commands should not wait for the connect");
    assert_eq!(Delivery::NotConnected, delivery);

    starting
        .await
        .expect("start task should not panic")
        .expect("a timed out first connect still starts the session");
    let report = next_status(&mut events).await;
    assert_eq!(Some(StatusDetail::CommunicationError), report.detail);

    session.stop().await;
}

#[tokio::test]
async fn health_check_reconnects_after_the_fan_drops() {
    let fake = fake_fan().await;
    let timings = SessionTimings::builder()
        .connect_timeout(Duration::from_millis(500))
        .listener_delay(Duration::ZERO)
        .health_check_initial_delay(Duration::from_millis(100))
        .health_check_interval(Duration::from_millis(100))
        .reconnect_idle(Duration::from_millis(20))
        .build();
    let (session, mut events) = session_for(&config_for(fake.address()), timings);
    session.start().await.expect("session should start");
    assert_eq!(DeviceStatus::Online, next_status(&mut events).await.status);

    fake.drop_connections().await;
    assert_eq!(DeviceStatus::Offline, next_status(&mut events).await.status);
    assert_eq!(DeviceStatus::Online, next_status(&mut events).await.status);
    assert!(fake.wait_for_connections(2, WAIT).await);
    assert!(fake.wait_for_frame(";GETALL", WAIT).await);

    session.stop().await;
    fake.shutdown().await;
}

#[tokio::test]
async fn local_address_binds_the_outgoing_socket() {
    let fake = fake_fan().await;
    let config = FanConfig::builder()
        .mac(MAC)
        .label(LABEL)
        .ip("127.0.0.1")
        .port(fake.address().port())
        .local_address("127.0.0.1")
        .build();
    let (session, mut events) = session_for(&config, timings());

    session.start().await.expect("loopback is a local interface");
    assert_eq!(DeviceStatus::Online, next_status(&mut events).await.status);
    assert!(fake.wait_for_connections(1, WAIT).await);
    let peers = fake.peer_addrs();
    assert_eq!(
        std::net::IpAddr::V4(Ipv4Addr::LOCALHOST),
        peers[0].ip()
    );

    session.stop().await;
    fake.shutdown().await;
}

#[tokio::test]
async fn unknown_local_address_is_a_configuration_error() {
    let config = FanConfig::builder()
        .mac(MAC)
        .label(LABEL)
        .ip("127.0.0.1")
        .local_address("203.0.113.7")
        .build();
    let (session, mut events) = session_for(&config, timings());

    let result = session.start().await;
    assert_matches!(result, Err(SessionError::Interface(_)));

    let report = next_status(&mut events).await;
    assert_eq!(DeviceStatus::Offline, report.status);
    assert_eq!(Some(StatusDetail::ConfigurationError), report.detail);
    assert_eq!(
        Some("No suitable network interface".to_owned()),
        report.message
    );
    assert!(!session.is_connected().await);
}
