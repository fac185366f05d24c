//! Command server behaviour over real loopback sockets

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use trilo_io::core::actuators::shared;
use trilo_io::devices::mock::{ActuatorCall, MockRobot};
use trilo_io::streaming::{CommandServer, FrameBuffer, Reply, ServerConfig};

const IO_TIMEOUT: Duration = Duration::from_secs(2);

struct Harness {
    server: CommandServer,
    addr: SocketAddr,
    robot: MockRobot,
    frames: Arc<FrameBuffer>,
    /// Bound on the configured video port so datagrams have somewhere to land
    video: UdpSocket,
}

fn start_server() -> Harness {
    let video = UdpSocket::bind("127.0.0.1:0").unwrap();
    video.set_read_timeout(Some(IO_TIMEOUT)).unwrap();

    let config = ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        video_port: video.local_addr().unwrap().port(),
        join_timeout: Duration::from_secs(2),
        relay_join_timeout: Duration::from_secs(2),
        wake_timeout: Duration::from_millis(500),
    };

    let robot = MockRobot::new(42.5);
    let frames = Arc::new(FrameBuffer::new());
    let server = CommandServer::new(
        config,
        shared(Box::new(robot.clone())),
        Arc::clone(&frames),
    )
    .unwrap();
    let addr = server.start().unwrap();

    Harness {
        server,
        addr,
        robot,
        frames,
        video,
    }
}

struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(IO_TIMEOUT)).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Self { stream, reader }
    }

    fn send(&mut self, line: &str) {
        self.stream.write_all(line.as_bytes()).unwrap();
        self.stream.write_all(b"\n").unwrap();
    }

    fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        line
    }

    /// True once the server has closed the connection
    fn is_closed(&mut self) -> bool {
        let mut buf = [0u8; 64];
        matches!(self.reader.read(&mut buf), Ok(0) | Err(_))
    }

    fn ping(&mut self) {
        self.send(r#"{"action":"ping"}"#);
        assert_eq!(self.read_line(), "{\"status\":\"pong\"}\n");
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + IO_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn ping_gets_exact_pong_line() {
    let harness = start_server();
    let mut client = Client::connect(harness.addr);

    client.ping();
    assert!(harness.robot.calls().is_empty());
}

#[test]
fn read_distance_replies_with_sensor_value() {
    let harness = start_server();
    let mut client = Client::connect(harness.addr);

    client.send(r#"{"action":"read_distance"}"#);
    let line = client.read_line();
    assert_eq!(Reply::parse(&line), Some(Reply::distance(42.5)));
    assert_eq!(harness.robot.last_call(), Some(ActuatorCall::ReadDistance));
}

#[test]
fn commands_reach_actuators_in_order() {
    let harness = start_server();
    let mut client = Client::connect(harness.addr);

    client.send(r#"{"action":"FORWARD","speed":0.5}"#);
    client.send(r#"{"action":"turn_left"}"#);
    client.send(r#"{"action":"set_led","led":1,"value":0.25}"#);
    client.send(r#"{"action":"fill_underlighting","r":0,"g":0,"b":200}"#);
    client.send(r#"{"action":"Stop"}"#);
    // Replies are in order, so the pong means everything before it ran
    client.ping();

    assert_eq!(
        harness.robot.calls(),
        vec![
            ActuatorCall::Forward(0.5),
            ActuatorCall::TurnLeft(1.0),
            ActuatorCall::SetButtonLed(1, 0.25),
            ActuatorCall::FillUnderlighting(0, 0, 200),
            ActuatorCall::Stop,
        ]
    );
}

#[test]
fn malformed_lines_are_ignored_without_reply() {
    let harness = start_server();
    let mut client = Client::connect(harness.addr);

    client.send("not json at all");
    client.send("[1, 2, 3]");
    client.send(r#"{"speed":1.0}"#);
    client.send(r#"{"action":42}"#);
    client.send(r#"{"action":"forward","speed":"fast"}"#);
    client.send(r#"{"action":"moonwalk"}"#);
    client.send(r#"{"action":"set_led","led":7,"value":0.5}"#);
    client.send("");

    // The first thing written back is the pong
    client.ping();
    assert!(harness.robot.calls().is_empty());
    assert!(harness.server.active_session().is_some());
}

#[test]
fn second_client_gets_busy_and_is_closed() {
    let harness = start_server();
    let mut first = Client::connect(harness.addr);
    first.ping();

    let mut second = Client::connect(harness.addr);
    assert_eq!(second.read_line(), "{\"error\":\"Server busy\"}\n");
    assert!(second.is_closed());

    // The admitted session is untouched
    first.ping();
    let info = harness.server.active_session().unwrap();
    assert_eq!(info.peer, first.stream.local_addr().unwrap());
}

#[test]
fn exit_frees_slot_for_next_client() {
    let harness = start_server();

    let mut first = Client::connect(harness.addr);
    first.ping();
    first.send(r#"{"action":"exit"}"#);
    assert!(first.is_closed());
    assert!(wait_until(|| harness.server.active_session().is_none()));
    assert!(wait_until(|| !harness.server.is_streaming()));

    let mut second = Client::connect(harness.addr);
    second.ping();
}

#[test]
fn peer_close_frees_slot() {
    let harness = start_server();

    let mut first = Client::connect(harness.addr);
    first.ping();
    drop(first);
    assert!(wait_until(|| harness.server.active_session().is_none()));

    let mut second = Client::connect(harness.addr);
    second.ping();
}

#[test]
fn oversized_line_closes_connection() {
    let harness = start_server();
    let mut client = Client::connect(harness.addr);

    let junk = vec![b'x'; 64 * 1024 + 16];
    client.stream.write_all(&junk).unwrap();
    assert!(client.is_closed());
    assert!(wait_until(|| harness.server.active_session().is_none()));
}

#[test]
fn frames_published_during_session_reach_video_port() {
    let harness = start_server();
    let mut client = Client::connect(harness.addr);
    client.ping();
    assert!(harness.server.is_streaming());

    let frame: Vec<u8> = (0..2048u32).map(|i| (i * 7 % 256) as u8).collect();
    harness.frames.publish(frame.clone());

    let mut buf = vec![0u8; 65536];
    let (len, from) = harness.video.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..len], &frame[..]);
    assert!(from.ip().is_loopback());
}

#[test]
fn stop_without_client_is_bounded() {
    let harness = start_server();

    let started = Instant::now();
    harness.server.stop();
    assert!(started.elapsed() < Duration::from_millis(1500));
    assert!(!harness.server.is_running());

    // Listener is closed
    assert!(TcpStream::connect_timeout(&harness.addr, Duration::from_millis(500)).is_err());

    // Second stop is a no-op
    harness.server.stop();
}

#[test]
fn stop_with_active_client_closes_session() {
    let harness = start_server();
    let mut client = Client::connect(harness.addr);
    client.ping();

    let started = Instant::now();
    harness.server.stop();
    assert!(started.elapsed() < Duration::from_millis(1500));
    assert!(client.is_closed());
    assert!(harness.server.active_session().is_none());
    assert!(!harness.server.is_streaming());
}

#[test]
fn start_twice_keeps_listener() {
    let harness = start_server();
    assert_eq!(harness.server.start().unwrap(), harness.addr);
    assert_eq!(harness.server.local_addr(), Some(harness.addr));

    let mut client = Client::connect(harness.addr);
    client.ping();
}
