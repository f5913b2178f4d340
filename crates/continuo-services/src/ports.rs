//! midir adapters for the clock, input, and output ports

use crossbeam_channel::Sender;
use midir::{Ignore, MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection};
use thiserror::Error;
use tracing::{info, warn};

use continuo_core::Event;

use crate::clock_grid::ClockMessage;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("MIDI init error: {0}")]
    Init(String),
    #[error("No MIDI port matching '{0}'")]
    NotFound(String),
    #[error("Failed to connect to '{0}': {1}")]
    Connect(String, String),
    #[error("Send failed: {0}")]
    Send(String),
}

/// Output side of the bridge, one event at a time.
///
/// Implemented by the midir adapter in production and by plain collectors in
/// tests.
pub trait EventSink: Send {
    fn send(&mut self, event: &Event) -> Result<(), PortError>;
}

/// Resolve a port by exact name first, then by prefix (DAW virtual ports
/// often carry a numeric suffix).
fn find_input_port(input: &MidiInput, name: &str) -> Result<MidiInputPort, PortError> {
    let ports = input.ports();
    let named: Vec<(MidiInputPort, String)> = ports
        .into_iter()
        .filter_map(|p| input.port_name(&p).ok().map(|n| (p, n)))
        .collect();

    named
        .iter()
        .find(|(_, n)| n == name)
        .or_else(|| named.iter().find(|(_, n)| n.starts_with(name)))
        .map(|(p, _)| p.clone())
        .ok_or_else(|| PortError::NotFound(name.to_string()))
}

/// Connect the clock port and forward real-time messages into a channel.
///
/// The returned connection must be kept alive for the lifetime of the
/// bridge; dropping it closes the port.
pub fn connect_clock_input(
    name: &str,
    tx: Sender<ClockMessage>,
) -> Result<MidiInputConnection<()>, PortError> {
    let mut input = MidiInput::new("continuo-clock").map_err(|e| PortError::Init(e.to_string()))?;
    // Real-time messages are filtered out by default.
    input.ignore(Ignore::None);

    let port = find_input_port(&input, name)?;
    let conn = input
        .connect(
            &port,
            "clock-in",
            move |_timestamp, bytes, _| {
                if let Some(msg) = bytes.first().and_then(|b| ClockMessage::from_status(*b)) {
                    // If the grid thread is gone we are shutting down anyway.
                    let _ = tx.try_send(msg);
                }
            },
            (),
        )
        .map_err(|e| PortError::Connect(name.to_string(), e.to_string()))?;

    info!(port = name, "clock port opened");
    Ok(conn)
}

/// Connect the note input port and forward recognized channel messages.
pub fn connect_note_input(
    name: &str,
    tx: Sender<Event>,
) -> Result<MidiInputConnection<()>, PortError> {
    let mut input = MidiInput::new("continuo-in").map_err(|e| PortError::Init(e.to_string()))?;
    input.ignore(Ignore::All);

    let port = find_input_port(&input, name)?;
    let conn = input
        .connect(
            &port,
            "notes-in",
            move |_timestamp, bytes, _| {
                if let Some(event) = Event::from_raw(bytes) {
                    if tx.try_send(event).is_err() {
                        warn!("input channel full, dropping event");
                    }
                }
            },
            (),
        )
        .map_err(|e| PortError::Connect(name.to_string(), e.to_string()))?;

    info!(port = name, "input port opened");
    Ok(conn)
}

/// midir-backed output sink emitting on a single channel.
pub struct MidiOutputSink {
    conn: MidiOutputConnection,
    channel: u8,
}

impl MidiOutputSink {
    pub fn connect(name: &str) -> Result<Self, PortError> {
        let output = MidiOutput::new("continuo-out").map_err(|e| PortError::Init(e.to_string()))?;

        let ports = output.ports();
        let named: Vec<(midir::MidiOutputPort, String)> = ports
            .into_iter()
            .filter_map(|p| output.port_name(&p).ok().map(|n| (p, n)))
            .collect();
        let port = named
            .iter()
            .find(|(_, n)| n == name)
            .or_else(|| named.iter().find(|(_, n)| n.starts_with(name)))
            .map(|(p, _)| p.clone())
            .ok_or_else(|| PortError::NotFound(name.to_string()))?;

        let conn = output
            .connect(&port, "notes-out")
            .map_err(|e| PortError::Connect(name.to_string(), e.to_string()))?;

        info!(port = name, "output port opened");
        Ok(Self { conn, channel: 0 })
    }
}

impl EventSink for MidiOutputSink {
    fn send(&mut self, event: &Event) -> Result<(), PortError> {
        self.conn
            .send(&event.to_raw(self.channel))
            .map_err(|e| PortError::Send(e.to_string()))
    }
}

/// Available (input, output) port names, for `--list-ports`.
pub fn list_ports() -> Result<(Vec<String>, Vec<String>), PortError> {
    let input = MidiInput::new("continuo-list").map_err(|e| PortError::Init(e.to_string()))?;
    let output = MidiOutput::new("continuo-list").map_err(|e| PortError::Init(e.to_string()))?;

    let ins = input
        .ports()
        .iter()
        .filter_map(|p| input.port_name(p).ok())
        .collect();
    let outs = output
        .ports()
        .iter()
        .filter_map(|p| output.port_name(p).ok())
        .collect();
    Ok((ins, outs))
}
