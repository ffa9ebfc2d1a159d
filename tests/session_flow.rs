use crossbeam::channel::{self, Receiver};
use std::time::{Duration, Instant};
use tftbridge::{
    protocol::{frame::checksum_of, Dialect, DialectSetting},
    serial::{
        errors::{classify_error, SerialFailureKind},
        fake::FakeSerialPort,
    },
    session::{Session, SessionOptions, SessionState},
    telemetry::{
        ControlRequest, Heater, HeaterReading, PrintAction, PrintState, PrinterSnapshot,
    },
    Error,
};

fn numbered(n: u32, body: &str) -> String {
    let payload = format!("N{n} {body}");
    format!("{payload}*{}", checksum_of(&payload))
}

fn auto(window: Duration, fallback: Dialect) -> SessionOptions {
    SessionOptions {
        dialect: DialectSetting::Auto,
        fallback,
        detect_window: window,
        summary_line: false,
    }
}

fn fixed(dialect: Dialect) -> SessionOptions {
    SessionOptions {
        dialect: DialectSetting::Fixed(dialect),
        ..SessionOptions::default()
    }
}

fn session(options: SessionOptions) -> (Session<FakeSerialPort>, Receiver<ControlRequest>) {
    let (tx, rx) = channel::unbounded();
    (Session::new(FakeSerialPort::default(), options, tx), rx)
}

/// A session past its handshake with the write log cleared.
fn steady(dialect: Dialect) -> (Session<FakeSerialPort>, Receiver<ControlRequest>) {
    let (mut session, rx) = session(fixed(dialect));
    session.begin(Instant::now()).unwrap();
    assert_eq!(session.state(), SessionState::SteadyState);
    session.io_mut().take_writes();
    (session, rx)
}

fn cold_printer() -> PrinterSnapshot {
    PrinterSnapshot {
        hotend: HeaterReading {
            current: 25.0,
            target: 0.0,
        },
        bed: HeaterReading {
            current: 22.0,
            target: 0.0,
        },
        ..PrinterSnapshot::default()
    }
}

fn send(session: &mut Session<FakeSerialPort>, raw: &str) -> Vec<String> {
    session.handle_line(raw, Instant::now()).unwrap();
    session.io_mut().take_writes()
}

#[test]
fn temperature_query_after_ok_prefixed_detection() {
    let (mut session, _rx) = session(auto(Duration::from_secs(10), Dialect::Terse));
    let now = Instant::now();
    session.begin(now).unwrap();
    session.on_snapshot(cold_printer()).unwrap();
    assert!(session.io().writes().is_empty(), "nothing before detection");

    let handshake = send(&mut session, &numbered(1, "M105"));
    assert_eq!(session.dialect(), Some(Dialect::OkPrefixed));
    assert!(session.handshake_complete());
    assert_eq!(handshake, Dialect::OkPrefixed.handshake(&cold_printer()));
    assert_eq!(handshake[0], "ok T:25.0 /0.0 B:22.0 /0.0 @:0 B@:0");

    assert_eq!(
        send(&mut session, "M105"),
        vec!["ok T:25.0 /0.0 B:22.0 /0.0 @:0 B@:0"]
    );
}

#[test]
fn hotend_target_updates_snapshot_and_queues_one_request() {
    let (mut session, rx) = steady(Dialect::OkPrefixed);
    session.on_snapshot(cold_printer()).unwrap();
    session.io_mut().take_writes();

    assert_eq!(send(&mut session, "M104 S200"), vec!["ok"]);
    assert_eq!(session.snapshot().hotend.target, 200.0);
    assert_eq!(
        rx.try_recv().unwrap(),
        ControlRequest::SetTarget {
            heater: Heater::Hotend,
            value: 200.0
        }
    );
    assert!(rx.try_recv().is_err(), "exactly one control request");

    assert_eq!(
        send(&mut session, "M105"),
        vec!["ok T:25.0 /200.0 B:22.0 /0.0 @:0 B@:0"]
    );
}

#[test]
fn fan_speed_is_reported_as_percent() {
    let (mut session, rx) = steady(Dialect::Terse);

    assert_eq!(send(&mut session, "M106 S128"), vec!["ok"]);
    assert_eq!(session.snapshot().fan_percent, 50);
    assert_eq!(
        rx.try_recv().unwrap(),
        ControlRequest::Gcode("M106 S128".into())
    );

    let summary = send(&mut session, "M999");
    assert_eq!(summary.len(), 1);
    assert!(summary[0].starts_with("KLIP:"), "{summary:?}");
    assert!(summary[0].ends_with(":50"), "{summary:?}");
}

#[test]
fn acknowledgement_placement_follows_dialect() {
    let (mut ok_prefixed, _rx) = steady(Dialect::OkPrefixed);
    let firmware = send(&mut ok_prefixed, "M115");
    assert_eq!(firmware[0], "ok");
    assert_eq!(&firmware[1..], Dialect::OkPrefixed.firmware_lines().as_slice());
    assert_eq!(send(&mut ok_prefixed, "G28"), vec!["ok"]);
    assert_eq!(
        send(&mut ok_prefixed, "M25"),
        vec!["ok", "//action:paused"]
    );

    let (mut terse, _rx) = steady(Dialect::Terse);
    assert_eq!(
        send(&mut terse, "M115"),
        Dialect::Terse.firmware_lines()
    );
    assert_eq!(send(&mut terse, "G28"), vec!["ok"]);
    assert_eq!(
        send(&mut terse, "M105"),
        vec!["T:0.0 /0.0 B:0.0 /0.0 @:0 B@:0"]
    );

    let (mut no_power, rx) = steady(Dialect::NoPower);
    assert_eq!(send(&mut no_power, "M105"), vec!["T:0.0 /0.0 B:0.0 /0.0"]);
    assert_eq!(
        send(&mut no_power, "M118 P0 A1 action:remote cancel"),
        vec!["M118 P0 A1 action:cancel"]
    );
    assert_eq!(
        rx.try_recv().unwrap(),
        ControlRequest::Print(PrintAction::Cancel)
    );
}

#[test]
fn dialect_is_fixed_once_detected() {
    let (mut session, _rx) = session(auto(Duration::from_secs(10), Dialect::OkPrefixed));
    session.begin(Instant::now()).unwrap();

    let handshake = send(&mut session, "M105");
    assert_eq!(session.dialect(), Some(Dialect::Terse));
    assert_eq!(handshake.len(), 3);
    assert_eq!(handshake.last().map(String::as_str), Some("ok"));

    // A numbered frame would have meant ok-prefixed during classification.
    let reply = send(&mut session, &numbered(7, "M105"));
    assert_eq!(session.dialect(), Some(Dialect::Terse));
    assert_eq!(reply, vec!["T:0.0 /0.0 B:0.0 /0.0 @:0 B@:0"]);
}

#[test]
fn undecided_frames_get_a_bare_ok_only() {
    let (mut session, rx) = session(auto(Duration::from_secs(10), Dialect::OkPrefixed));
    session.begin(Instant::now()).unwrap();

    assert_eq!(send(&mut session, "M115"), vec!["ok"]);
    assert_eq!(send(&mut session, "M104 S210"), vec!["ok"]);
    assert_eq!(session.state(), SessionState::Classifying);
    assert_eq!(session.dialect(), None);
    assert!(!session.handshake_complete());
    assert_eq!(session.snapshot().hotend.target, 0.0);
    assert!(rx.try_recv().is_err(), "no dispatch before the handshake");
}

#[test]
fn detection_window_falls_back_to_configured_dialect() {
    let (mut session, _rx) = session(auto(Duration::from_secs(1), Dialect::NoPower));
    let start = Instant::now();
    session.begin(start).unwrap();

    session
        .poll_detection(start + Duration::from_millis(500))
        .unwrap();
    assert_eq!(session.state(), SessionState::Classifying);
    assert!(session.io().writes().is_empty());

    session.poll_detection(start + Duration::from_secs(1)).unwrap();
    assert_eq!(session.dialect(), Some(Dialect::NoPower));
    assert_eq!(session.state(), SessionState::SteadyState);
    assert_eq!(
        session.io().writes(),
        Dialect::NoPower
            .handshake(&PrinterSnapshot::default())
            .as_slice()
    );
}

#[test]
fn failed_fetch_keeps_last_snapshot() {
    let (mut session, _rx) = steady(Dialect::OkPrefixed);
    session.on_fetch_failure("connection refused").unwrap();
    assert!(
        session.io().writes().is_empty(),
        "no heartbeat before the first snapshot"
    );

    session.on_snapshot(cold_printer()).unwrap();
    let first = session.io_mut().take_writes();
    assert_eq!(first, vec!["T:25.0 /0.0 B:22.0 /0.0 @:0 B@:0"]);

    session.on_fetch_failure("timed out").unwrap();
    assert_eq!(session.io_mut().take_writes(), first);
    assert_eq!(session.snapshot(), &cold_printer());
}

#[test]
fn print_lifecycle_emits_each_transition_once() {
    let (mut session, _rx) = steady(Dialect::Terse);
    let states = [
        PrintState::Standby,
        PrintState::Printing,
        PrintState::Printing,
        PrintState::Paused,
        PrintState::Paused,
        PrintState::Printing,
        PrintState::Complete,
        PrintState::Complete,
    ];
    for state in states {
        session
            .on_snapshot(PrinterSnapshot {
                state,
                progress: 37.6,
                remaining_secs: 605,
                current_layer: Some(3),
                total_layers: Some(10),
                ..PrinterSnapshot::default()
            })
            .unwrap();
    }
    let writes = session.io_mut().take_writes();
    let transitions: Vec<&str> = writes
        .iter()
        .filter(|line| line.starts_with("//action:") && !line.contains("notification"))
        .map(String::as_str)
        .collect();
    assert_eq!(
        transitions,
        vec![
            "//action:print_start",
            "//action:pause",
            "//action:resume",
            "//action:print_end"
        ]
    );
    assert!(writes.contains(&"//action:notification Data Left 38/100".to_string()));
    assert!(writes.contains(&"//action:notification Time Left 00h10m05s".to_string()));
    assert!(writes.contains(&"//action:notification Layer Left 3/10".to_string()));
    assert!(!session.print_active());

    // one heartbeat per tick, never carrying an acknowledgement
    let heartbeats = writes.iter().filter(|line| line.starts_with("T:")).count();
    assert_eq!(heartbeats, states.len());
    assert!(!writes.iter().any(|line| line.starts_with("ok")));
}

#[test]
fn temperature_query_is_idempotent() {
    let (mut session, rx) = steady(Dialect::OkPrefixed);
    session.on_snapshot(cold_printer()).unwrap();
    session.io_mut().take_writes();

    let first = send(&mut session, "M105");
    let second = send(&mut session, "M105");
    assert_eq!(first, second);
    assert_eq!(session.snapshot(), &cold_printer());
    assert!(rx.try_recv().is_err());
}

#[test]
fn write_failure_closes_the_session() {
    let (mut session, rx) = steady(Dialect::OkPrefixed);
    session.io_mut().fail_writes();

    let err = session.handle_line("M105", Instant::now()).unwrap_err();
    assert!(matches!(err, Error::Io(_)), "{err}");
    assert_eq!(classify_error(&err), SerialFailureKind::Disconnected);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.io().is_closed());

    session.on_snapshot(cold_printer()).unwrap();
    session.handle_line("M105", Instant::now()).unwrap();
    assert!(session.io().writes().is_empty());
    assert!(
        matches!(rx.recv_timeout(Duration::from_millis(10)), Err(channel::RecvTimeoutError::Disconnected)),
        "control sender released on close"
    );
}

#[test]
fn corrupt_frames_are_dropped_without_reply() {
    let (mut session, rx) = steady(Dialect::OkPrefixed);
    let payload = "N3 M104 S200";
    let bad = format!("{payload}*{}", checksum_of(payload).wrapping_add(1));

    assert!(send(&mut session, &bad).is_empty());
    assert!(send(&mut session, "N4 M104 S200*").is_empty());
    assert_eq!(session.snapshot().hotend.target, 0.0);
    assert!(rx.try_recv().is_err());
}

#[test]
fn service_inbound_reads_from_the_transport() {
    let script = vec![
        Ok(numbered(1, "M110 N0")),
        Err(Error::Parse("frame exceeds 256 bytes".into())),
        Ok("M105".into()),
    ];
    let (tx, _rx) = channel::unbounded();
    let mut session = Session::new(
        FakeSerialPort::new(script),
        auto(Duration::from_secs(10), Dialect::Terse),
        tx,
    );
    let now = Instant::now();
    session.begin(now).unwrap();

    assert!(session.service_inbound(now).unwrap());
    assert_eq!(session.dialect(), Some(Dialect::OkPrefixed));
    let handshake_len = session.io_mut().take_writes().len();
    assert_eq!(handshake_len, 7);

    assert!(session.service_inbound(now).unwrap());
    assert!(session.io().writes().is_empty(), "oversize frame dropped");

    assert!(session.service_inbound(now).unwrap());
    assert_eq!(
        session.io_mut().take_writes(),
        vec!["ok T:0.0 /0.0 B:0.0 /0.0 @:0 B@:0"]
    );

    assert!(!session.service_inbound(now).unwrap());
}
