//! PigpioSource against an in-process fake pigpio daemon.

use gf_common::edge::{EdgeEvent, EdgeSink};
use gf_common::time::Tick;
use gf_common::FreqError;
use gf_common::config::PigpioConfig;
use gf_source::{cmd, EdgeSource, PigpioSource, Report, COMMAND_LEN, FLAG_WDOG};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

const REFERENCE_GPIO: u8 = 17;
const MEASURED_GPIO: u8 = 27;
const REF_BIT: u32 = 1 << REFERENCE_GPIO;
const MEAS_BIT: u32 = 1 << MEASURED_GPIO;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<EdgeEvent>>,
}

impl EdgeSink for Recorder {
    fn notify_measured_edge(&self, tick: Tick) {
        self.events.lock().unwrap().push(EdgeEvent::measured(tick));
    }

    fn notify_reference_edge(&self, tick: Tick) {
        self.events.lock().unwrap().push(EdgeEvent::reference(tick));
    }
}

fn read_command(stream: &mut TcpStream) -> Option<[u32; 3]> {
    let mut frame = [0u8; COMMAND_LEN];
    stream.read_exact(&mut frame).ok()?;
    let word = |i: usize| u32::from_le_bytes([frame[i], frame[i + 1], frame[i + 2], frame[i + 3]]);
    Some([word(0), word(4), word(8)])
}

fn write_response(stream: &mut TcpStream, request: [u32; 3], result: i32) {
    let mut frame = [0u8; COMMAND_LEN];
    frame[0..4].copy_from_slice(&request[0].to_le_bytes());
    frame[4..8].copy_from_slice(&request[1].to_le_bytes());
    frame[8..12].copy_from_slice(&request[2].to_le_bytes());
    frame[12..16].copy_from_slice(&result.to_le_bytes());
    stream.write_all(&frame).unwrap();
}

/// Answer control commands until the client disconnects.
fn serve_control(mut stream: TcpStream, started: mpsc::Sender<u32>, modes_result: i32) {
    while let Some(request) = read_command(&mut stream) {
        let result = match request[0] {
            cmd::MODES => modes_result,
            cmd::BR1 => (REF_BIT | MEAS_BIT) as i32,
            cmd::NB => {
                let _ = started.send(request[2]);
                0
            }
            _ => 0,
        };
        write_response(&mut stream, request, result);
    }
}

fn config(address: String) -> PigpioConfig {
    PigpioConfig {
        address,
        reference_gpio: REFERENCE_GPIO,
        measured_gpio: MEASURED_GPIO,
        connect_timeout: Duration::from_secs(2),
        ..PigpioConfig::default()
    }
}

fn report(seq: u16, flags: u16, tick: u32, level: u32) -> [u8; 12] {
    Report {
        seq,
        flags,
        tick: Tick(tick),
        level,
    }
    .to_bytes()
}

#[test]
fn test_streams_falling_edges_until_daemon_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let daemon = thread::spawn(move || {
        let (control, _) = listener.accept().unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let control_thread = thread::spawn(move || serve_control(control, started_tx, 0));

        let (mut notify, _) = listener.accept().unwrap();
        let request = read_command(&mut notify).unwrap();
        assert_eq!(request[0], cmd::NOIB);
        write_response(&mut notify, request, 0);

        let mask = started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(mask, REF_BIT | MEAS_BIT);

        let mut stream = Vec::new();
        stream.extend_from_slice(&report(0, 0, 1_000, REF_BIT));
        stream.extend_from_slice(&report(1, 0, 5_000, REF_BIT | MEAS_BIT));
        stream.extend_from_slice(&report(2, FLAG_WDOG, 7_000, 0));
        stream.extend_from_slice(&report(3, 0, 11_000, REF_BIT));
        stream.extend_from_slice(&report(4, 0, 20_000, 0));

        // Split mid-report so the client has to reassemble
        notify.write_all(&stream[..18]).unwrap();
        notify.flush().unwrap();
        thread::sleep(Duration::from_millis(50));
        notify.write_all(&stream[18..]).unwrap();
        drop(notify);

        control_thread.join().unwrap();
    });

    let mut source = PigpioSource::new(config(address));
    source.init().unwrap();
    assert!(source.is_operational());

    let sink = Recorder::default();
    let mut outcome = None;
    for _ in 0..100 {
        match source.poll(&sink, Duration::from_millis(100)) {
            Ok(_) => continue,
            Err(e) => {
                outcome = Some(e);
                break;
            }
        }
    }

    assert!(matches!(outcome, Some(FreqError::SourceUnavailable(_))));
    assert_eq!(
        *sink.events.lock().unwrap(),
        vec![
            EdgeEvent::measured(Tick(1_000)),
            EdgeEvent::measured(Tick(11_000)),
            EdgeEvent::reference(Tick(20_000)),
        ]
    );

    source.shutdown().unwrap();
    assert!(!source.is_operational());
    daemon.join().unwrap();
}

#[test]
fn test_rejected_command_surfaces_protocol_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let daemon = thread::spawn(move || {
        let (control, _) = listener.accept().unwrap();
        let (started_tx, _started_rx) = mpsc::channel();
        serve_control(control, started_tx, -3);
    });

    let mut source = PigpioSource::new(config(address));
    let err = source.init().unwrap_err();
    assert_eq!(
        err,
        FreqError::Protocol {
            command: cmd::MODES,
            code: -3,
        }
    );

    source.shutdown().unwrap();
    daemon.join().unwrap();
}

#[test]
fn test_unreachable_daemon_is_unavailable() {
    // Bind then drop to get a port nothing listens on
    let address = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    };

    let mut source = PigpioSource::new(config(address));
    assert!(matches!(source.init(), Err(FreqError::SourceUnavailable(_))));
}
