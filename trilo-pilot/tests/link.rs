//! RobotLink against a real CommandServer on loopback

use crossbeam_channel::Receiver;
use std::net::{TcpListener, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use trilo_io::config::CameraConfig;
use trilo_io::core::actuators::shared;
use trilo_io::devices::mock::{ActuatorCall, MockRobot, encode_test_frame};
use trilo_io::streaming::{Command, CommandServer, FrameBuffer, Reply, ServerConfig};
use trilo_pilot::{LinkEvent, PilotConfig, PilotError, RobotLink};

const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// A UDP port nothing is bound to right now
fn free_udp_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

struct Robot {
    server: CommandServer,
    robot: MockRobot,
    frames: Arc<FrameBuffer>,
    command_port: u16,
    video_port: u16,
}

fn start_robot() -> Robot {
    let video_port = free_udp_port();
    let config = ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        video_port,
        join_timeout: Duration::from_secs(2),
        relay_join_timeout: Duration::from_secs(2),
        wake_timeout: Duration::from_millis(500),
    };

    let robot = MockRobot::new(12.0);
    let frames = Arc::new(FrameBuffer::new());
    let server = CommandServer::new(
        config,
        shared(Box::new(robot.clone())),
        Arc::clone(&frames),
    )
    .unwrap();
    let command_port = server.start().unwrap().port();

    Robot {
        server,
        robot,
        frames,
        command_port,
        video_port,
    }
}

fn pilot_config(command_port: u16, video_port: u16) -> PilotConfig {
    PilotConfig {
        command_port,
        video_port,
        video_bind_host: "127.0.0.1".to_string(),
        connect_timeout_ms: 1000,
        video_recv_timeout_ms: 200,
        join_timeout_ms: 2000,
        ..PilotConfig::default()
    }
}

fn connected_link(robot: &Robot) -> (RobotLink, Receiver<LinkEvent>) {
    let link = RobotLink::new(pilot_config(robot.command_port, robot.video_port));
    let events = link.events();
    link.connect("127.0.0.1").unwrap();
    (link, events)
}

/// Ping and wait for the pong, which also proves the session is admitted
fn ping(link: &RobotLink, events: &Receiver<LinkEvent>) {
    link.send(&Command::Ping).unwrap();
    assert_eq!(
        events.recv_timeout(EVENT_TIMEOUT).unwrap(),
        LinkEvent::Reply {
            line: "{\"status\":\"pong\"}".to_string(),
            reply: Some(Reply::pong()),
        }
    );
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn connect_refused_is_reported() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let link = RobotLink::new(pilot_config(port, free_udp_port()));

    match link.connect("127.0.0.1") {
        Err(PilotError::ConnectionRefused(addr)) => assert_eq!(addr.port(), port),
        other => panic!("expected refusal, got {:?}", other),
    }
    assert!(!link.is_connected());
}

#[test]
fn bind_failure_closes_command_connection() {
    let robot = start_robot();
    let taken = UdpSocket::bind(("127.0.0.1", robot.video_port)).unwrap();

    let link = RobotLink::new(pilot_config(robot.command_port, robot.video_port));
    assert!(matches!(
        link.connect("127.0.0.1"),
        Err(PilotError::Bind { .. })
    ));
    assert!(!link.is_connected());

    // The half-open session is torn down on the robot too
    assert!(wait_until(|| robot.server.active_session().is_none()));
    drop(taken);

    link.connect("127.0.0.1").unwrap();
    assert!(link.is_connected());
}

#[test]
fn ping_and_distance_replies_arrive_as_events() {
    let robot = start_robot();
    let (link, events) = connected_link(&robot);

    ping(&link, &events);

    link.send(&Command::ReadDistance).unwrap();
    match events.recv_timeout(EVENT_TIMEOUT).unwrap() {
        LinkEvent::Reply { reply, .. } => assert_eq!(reply, Some(Reply::distance(12.0))),
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn commands_reach_the_robot() {
    let robot = start_robot();
    let (link, events) = connected_link(&robot);

    link.send(&Command::Forward { speed: 2.0 }).unwrap();
    let mut params = serde_json::Map::new();
    params.insert("r".to_string(), 0.into());
    params.insert("g".to_string(), 0.into());
    params.insert("b".to_string(), 200.into());
    link.send_action("fill_underlighting", params).unwrap();
    link.send_action("moonwalk", serde_json::Map::new()).unwrap();
    ping(&link, &events);

    assert_eq!(
        robot.robot.calls(),
        vec![
            ActuatorCall::Forward(2.0),
            ActuatorCall::FillUnderlighting(0, 0, 200),
        ]
    );
}

#[test]
fn connect_and_disconnect_are_idempotent() {
    let robot = start_robot();
    let (link, events) = connected_link(&robot);

    link.connect("127.0.0.1").unwrap();
    ping(&link, &events);
    let session = robot.server.active_session().unwrap();

    link.disconnect();
    link.disconnect();
    assert!(!link.is_connected());
    assert_eq!(
        events.recv_timeout(EVENT_TIMEOUT).unwrap(),
        LinkEvent::Disconnected
    );
    assert!(events.recv_timeout(Duration::from_millis(200)).is_err());

    // exit was sent, so the robot frees the slot for the next controller
    assert!(wait_until(|| robot.server.active_session().is_none()));

    link.connect("127.0.0.1").unwrap();
    ping(&link, &events);
    assert_ne!(robot.server.active_session().unwrap().id, session.id);
}

#[test]
fn video_frames_are_received_and_decoded() {
    let robot = start_robot();
    let (link, events) = connected_link(&robot);
    ping(&link, &events);

    let camera = CameraConfig {
        width: 64,
        height: 48,
        ..CameraConfig::default()
    };
    let jpeg = encode_test_frame(&camera, 3).unwrap();
    robot.frames.publish(jpeg.clone());

    assert!(wait_until(|| link.latest_frame().is_some()));
    assert_eq!(&link.latest_frame().unwrap()[..], &jpeg[..]);

    let image = link.latest_image().unwrap();
    assert_eq!((image.width(), image.height()), (64, 48));

    link.disconnect();
    assert!(link.latest_frame().is_none());
}

#[test]
fn server_shutdown_disconnects_link() {
    let robot = start_robot();
    let (link, events) = connected_link(&robot);
    ping(&link, &events);

    robot.server.stop();
    assert_eq!(
        events.recv_timeout(EVENT_TIMEOUT).unwrap(),
        LinkEvent::Disconnected
    );
    assert!(!link.is_connected());
    assert!(matches!(
        link.send(&Command::Stop),
        Err(PilotError::NotConnected)
    ));
}

#[test]
fn second_controller_is_turned_away() {
    let robot = start_robot();
    let (first, first_events) = connected_link(&robot);
    ping(&first, &first_events);

    let second = RobotLink::new(pilot_config(robot.command_port, free_udp_port()));
    let second_events = second.events();
    second.connect("127.0.0.1").unwrap();

    match second_events.recv_timeout(EVENT_TIMEOUT).unwrap() {
        LinkEvent::Reply { reply, .. } => assert_eq!(reply, Some(Reply::busy())),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(
        second_events.recv_timeout(EVENT_TIMEOUT).unwrap(),
        LinkEvent::Disconnected
    );
    assert!(!second.is_connected());

    // First controller is unaffected
    ping(&first, &first_events);
}
