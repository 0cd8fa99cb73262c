//! pigpio daemon client.
//!
//! Talks to `pigpiod` over its TCP socket interface:
//!
//! - **Control socket**: 16-byte little-endian command frames
//!   `cmd, p1, p2, p3` answered by `cmd, p1, p2, res` (negative `res` = error).
//! - **Notification socket**: opened with `NOIB`, which returns a handle;
//!   `NB(handle, bits)` on the control socket starts streaming 12-byte
//!   reports `seq:u16, flags:u16, tick:u32, level:u32` for the monitored bits.
//!
//! Reports carry the full bank-1 level; edges are found by comparing each
//! level with the previous one. Only falling edges are forwarded.

use crate::EdgeSource;
use gf_common::config::{PigpioConfig, Pull, SourceDriver};
use gf_common::edge::{EdgeEvent, EdgeSink};
use gf_common::time::Tick;
use gf_common::{FreqError, FreqResult};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// pigpio socket command codes.
pub mod cmd {
    /// Set GPIO mode.
    pub const MODES: u32 = 0;
    /// Set pull-up/down.
    pub const PUD: u32 = 2;
    /// Read bank 1 levels.
    pub const BR1: u32 = 10;
    /// Begin notifications on a handle.
    pub const NB: u32 = 19;
    /// Close a notification handle.
    pub const NC: u32 = 21;
    /// Open a notification handle on the issuing socket.
    pub const NOIB: u32 = 99;
}

/// Command frame and response length.
pub const COMMAND_LEN: usize = 16;
/// Notification report length.
pub const REPORT_LEN: usize = 12;

const PI_INPUT: u32 = 0;

/// Report flag: event notification, no level change.
pub const FLAG_EVENT: u16 = 1 << 7;
/// Report flag: keep-alive, no level change.
pub const FLAG_ALIVE: u16 = 1 << 6;
/// Report flag: watchdog timeout, no level change.
pub const FLAG_WDOG: u16 = 1 << 5;

const READ_CHUNK: usize = REPORT_LEN * 64;

/// Encode a command frame.
#[must_use]
pub fn encode_command(command: u32, p1: u32, p2: u32) -> [u8; COMMAND_LEN] {
    let mut frame = [0u8; COMMAND_LEN];
    frame[0..4].copy_from_slice(&command.to_le_bytes());
    frame[4..8].copy_from_slice(&p1.to_le_bytes());
    frame[8..12].copy_from_slice(&p2.to_le_bytes());
    frame
}

/// Decode a response frame into `(command, result)`.
#[must_use]
pub fn decode_response(frame: &[u8; COMMAND_LEN]) -> (u32, i32) {
    let command = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
    let result = i32::from_le_bytes([frame[12], frame[13], frame[14], frame[15]]);
    (command, result)
}

/// A GPIO notification report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    /// Report sequence number.
    pub seq: u16,
    /// Flags (0 for a level report).
    pub flags: u16,
    /// Daemon tick in microseconds.
    pub tick: Tick,
    /// Bank 1 levels.
    pub level: u32,
}

impl Report {
    /// Parse a 12-byte report.
    #[must_use]
    pub fn parse(bytes: &[u8; REPORT_LEN]) -> Self {
        Self {
            seq: u16::from_le_bytes([bytes[0], bytes[1]]),
            flags: u16::from_le_bytes([bytes[2], bytes[3]]),
            tick: Tick(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]])),
            level: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        }
    }

    /// Serialize to the wire format.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; REPORT_LEN] {
        let mut bytes = [0u8; REPORT_LEN];
        bytes[0..2].copy_from_slice(&self.seq.to_le_bytes());
        bytes[2..4].copy_from_slice(&self.flags.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.tick.0.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.level.to_le_bytes());
        bytes
    }
}

/// Turns level reports into falling-edge events for the two inputs.
#[derive(Debug, Clone)]
pub struct FallingEdgeDecoder {
    reference_bit: u32,
    measured_bit: u32,
    last_level: u32,
}

impl FallingEdgeDecoder {
    /// Decoder for the given GPIOs, starting from `initial_level`.
    #[must_use]
    pub fn new(reference_gpio: u8, measured_gpio: u8, initial_level: u32) -> Self {
        Self {
            reference_bit: 1 << reference_gpio,
            measured_bit: 1 << measured_gpio,
            last_level: initial_level,
        }
    }

    /// Bitmask of monitored GPIOs.
    #[must_use]
    pub fn mask(&self) -> u32 {
        self.reference_bit | self.measured_bit
    }

    /// Feed one report; falling edges are passed to `emit` in line order.
    pub fn decode(&mut self, report: &Report, mut emit: impl FnMut(EdgeEvent)) {
        if report.flags != 0 {
            trace!(flags = report.flags, "Ignoring non-level report");
            return;
        }
        let fell = self.last_level & !report.level;
        self.last_level = report.level;

        if fell & self.reference_bit != 0 {
            emit(EdgeEvent::reference(report.tick));
        }
        if fell & self.measured_bit != 0 {
            emit(EdgeEvent::measured(report.tick));
        }
    }
}

fn pull_code(pull: Pull) -> u32 {
    match pull {
        Pull::Off => 0,
        Pull::Down => 1,
        Pull::Up => 2,
    }
}

fn unavailable(context: &str, err: &std::io::Error) -> FreqError {
    FreqError::SourceUnavailable(format!("{context}: {err}"))
}

/// Send a command and return the raw result word.
fn exchange(stream: &mut TcpStream, command: u32, p1: u32, p2: u32) -> FreqResult<i32> {
    stream
        .write_all(&encode_command(command, p1, p2))
        .map_err(|e| unavailable("pigpio command write failed", &e))?;
    let mut response = [0u8; COMMAND_LEN];
    stream
        .read_exact(&mut response)
        .map_err(|e| unavailable("pigpio command read failed", &e))?;
    let (_, result) = decode_response(&response);
    Ok(result)
}

/// Send a command and wait for its result.
fn command(stream: &mut TcpStream, command: u32, p1: u32, p2: u32) -> FreqResult<i32> {
    let result = exchange(stream, command, p1, p2)?;
    if result < 0 {
        return Err(FreqError::Protocol {
            command,
            code: result,
        });
    }
    Ok(result)
}

/// Edge source backed by the pigpio daemon.
#[derive(Debug)]
pub struct PigpioSource {
    config: PigpioConfig,
    control: Option<TcpStream>,
    notify: Option<TcpStream>,
    handle: Option<u32>,
    decoder: FallingEdgeDecoder,
    /// Bytes of an incomplete report.
    pending: Vec<u8>,
    last_seq: Option<u16>,
}

impl PigpioSource {
    /// Create an unconnected source.
    pub fn new(config: PigpioConfig) -> Self {
        let decoder = FallingEdgeDecoder::new(config.reference_gpio, config.measured_gpio, 0);
        Self {
            config,
            control: None,
            notify: None,
            handle: None,
            decoder,
            pending: Vec::with_capacity(READ_CHUNK + REPORT_LEN),
            last_seq: None,
        }
    }

    fn resolve(&self) -> FreqResult<SocketAddr> {
        self.config
            .address
            .to_socket_addrs()
            .map_err(|e| {
                FreqError::Config(format!("invalid pigpio address {}: {e}", self.config.address))
            })?
            .next()
            .ok_or_else(|| {
                FreqError::Config(format!("pigpio address {} did not resolve", self.config.address))
            })
    }

    fn connect(&self, addr: &SocketAddr) -> FreqResult<TcpStream> {
        let stream = TcpStream::connect_timeout(addr, self.config.connect_timeout).map_err(|e| {
            FreqError::SourceUnavailable(format!(
                "cannot reach pigpio daemon at {addr} (is pigpiod running?): {e}"
            ))
        })?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.config.connect_timeout))?;
        Ok(stream)
    }

    fn track_sequence(&mut self, seq: u16) {
        if let Some(last) = self.last_seq {
            let expected = last.wrapping_add(1);
            if seq != expected {
                warn!(expected, got = seq, "pigpio report sequence gap, edges lost");
            }
        }
        self.last_seq = Some(seq);
    }

    fn process_pending(&mut self, sink: &dyn EdgeSink) -> usize {
        let mut delivered = 0;
        let complete = self.pending.len() / REPORT_LEN * REPORT_LEN;
        let mut reports = Vec::with_capacity(complete / REPORT_LEN);
        for chunk in self.pending[..complete].chunks_exact(REPORT_LEN) {
            let mut bytes = [0u8; REPORT_LEN];
            bytes.copy_from_slice(chunk);
            reports.push(Report::parse(&bytes));
        }
        self.pending.drain(..complete);

        for report in &reports {
            self.track_sequence(report.seq);
            self.decoder.decode(report, |event| {
                sink.deliver(event);
                delivered += 1;
            });
        }
        delivered
    }
}

impl EdgeSource for PigpioSource {
    fn init(&mut self) -> FreqResult<()> {
        let addr = self.resolve()?;
        info!(%addr, "Connecting to pigpio daemon");

        let mut control = self.connect(&addr)?;
        let pull = pull_code(self.config.pull);
        for gpio in [self.config.reference_gpio, self.config.measured_gpio] {
            command(&mut control, cmd::MODES, u32::from(gpio), PI_INPUT)?;
            command(&mut control, cmd::PUD, u32::from(gpio), pull)?;
        }
        // Bank read result is a bit pattern, GPIO 31 sets the sign bit
        let level = exchange(&mut control, cmd::BR1, 0, 0)? as u32;
        self.decoder = FallingEdgeDecoder::new(
            self.config.reference_gpio,
            self.config.measured_gpio,
            level,
        );
        self.control = Some(control);

        let mut notify = self.connect(&addr)?;
        let handle = command(&mut notify, cmd::NOIB, 0, 0)? as u32;
        self.handle = Some(handle);
        self.notify = Some(notify);

        let mask = self.decoder.mask();
        if let Some(control) = self.control.as_mut() {
            command(control, cmd::NB, handle, mask)?;
        }

        info!(
            handle,
            reference_gpio = self.config.reference_gpio,
            measured_gpio = self.config.measured_gpio,
            mask = format_args!("{mask:#010x}"),
            "pigpio notifications started"
        );
        Ok(())
    }

    fn poll(&mut self, sink: &dyn EdgeSink, timeout: Duration) -> FreqResult<usize> {
        let notify = self.notify.as_mut().ok_or_else(|| {
            FreqError::SourceUnavailable("pigpio notification stream not open".into())
        })?;
        notify.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;

        let start = self.pending.len();
        self.pending.resize(start + READ_CHUNK, 0);
        let read = notify.read(&mut self.pending[start..]);
        match read {
            Ok(0) => {
                self.pending.truncate(start);
                Err(FreqError::SourceUnavailable(
                    "pigpio daemon closed the notification stream".into(),
                ))
            }
            Ok(n) => {
                self.pending.truncate(start + n);
                Ok(self.process_pending(sink))
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                self.pending.truncate(start);
                Ok(0)
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {
                self.pending.truncate(start);
                Ok(0)
            }
            Err(e) => {
                self.pending.truncate(start);
                Err(unavailable("pigpio notification read failed", &e))
            }
        }
    }

    fn shutdown(&mut self) -> FreqResult<()> {
        if let (Some(handle), Some(control)) = (self.handle.take(), self.control.as_mut()) {
            match command(control, cmd::NC, handle, 0) {
                Ok(_) => debug!(handle, "pigpio notification handle closed"),
                Err(e) => warn!(handle, error = %e, "Failed to close pigpio notification handle"),
            }
        }
        for stream in [self.notify.take(), self.control.take()].into_iter().flatten() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.pending.clear();
        self.last_seq = None;
        Ok(())
    }

    fn is_operational(&self) -> bool {
        self.notify.is_some() && self.handle.is_some()
    }

    fn kind(&self) -> SourceDriver {
        SourceDriver::Pigpio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gf_common::edge::Channel;

    #[test]
    fn test_command_frame_layout() {
        let frame = encode_command(cmd::NB, 3, 0x0800_0000 | 0x0002_0000);
        assert_eq!(&frame[0..4], &19u32.to_le_bytes());
        assert_eq!(&frame[4..8], &3u32.to_le_bytes());
        assert_eq!(&frame[8..12], &0x0802_0000u32.to_le_bytes());
        assert_eq!(&frame[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_negative_result_decoded() {
        let mut frame = encode_command(cmd::MODES, 99, 0);
        frame[12..16].copy_from_slice(&(-3i32).to_le_bytes());
        assert_eq!(decode_response(&frame), (cmd::MODES, -3));
    }

    #[test]
    fn test_report_parse() {
        let report = Report {
            seq: 7,
            flags: 0,
            tick: Tick(0xDEAD_BEEF),
            level: 1 << 17,
        };
        assert_eq!(Report::parse(&report.to_bytes()), report);
    }

    #[test]
    fn test_decoder_emits_falling_edges_only() {
        let high = (1 << 17) | (1 << 27);
        let mut decoder = FallingEdgeDecoder::new(17, 27, high);
        let mut events = Vec::new();

        let reports = [
            (Tick(100), 1 << 17),  // 27 falls
            (Tick(200), high),     // 27 rises
            (Tick(300), 1 << 27),  // 17 falls
            (Tick(400), 0),        // 27 falls
            (Tick(500), 0),        // no change
        ];
        for (seq, (tick, level)) in reports.iter().enumerate() {
            let report = Report {
                seq: seq as u16,
                flags: 0,
                tick: *tick,
                level: *level,
            };
            decoder.decode(&report, |e| events.push(e));
        }

        assert_eq!(
            events,
            vec![
                EdgeEvent::measured(Tick(100)),
                EdgeEvent::reference(Tick(300)),
                EdgeEvent::measured(Tick(400)),
            ]
        );
    }

    #[test]
    fn test_decoder_skips_flagged_reports() {
        let mut decoder = FallingEdgeDecoder::new(17, 27, 1 << 27);
        let mut events = Vec::new();
        for flags in [FLAG_WDOG, FLAG_ALIVE, FLAG_EVENT] {
            let report = Report {
                seq: 0,
                flags,
                tick: Tick(1),
                level: 0,
            };
            decoder.decode(&report, |e| events.push(e));
        }
        assert!(events.is_empty());

        // Level tracking unaffected by the flagged reports
        let report = Report {
            seq: 1,
            flags: 0,
            tick: Tick(2),
            level: 0,
        };
        decoder.decode(&report, |e| events.push(e));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].channel, Channel::Measured);
    }

    #[test]
    fn test_simultaneous_falls_reference_first() {
        let mut decoder = FallingEdgeDecoder::new(17, 27, (1 << 17) | (1 << 27));
        let mut events = Vec::new();
        let report = Report {
            seq: 0,
            flags: 0,
            tick: Tick(9),
            level: 0,
        };
        decoder.decode(&report, |e| events.push(e));
        assert_eq!(events[0].channel, Channel::Reference);
        assert_eq!(events[1].channel, Channel::Measured);
    }

    #[test]
    fn test_unresolvable_address_is_config_error() {
        let mut source = PigpioSource::new(PigpioConfig {
            address: "not an address".into(),
            ..PigpioConfig::default()
        });
        assert!(matches!(source.init(), Err(FreqError::Config(_))));
        assert!(!source.is_operational());
    }
}
