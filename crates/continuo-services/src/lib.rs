//! continuo-services: threads and device edges for the continuo bridge

mod clock_grid;
mod model;
mod ports;
mod worker;

pub use clock_grid::{ClockGrid, ClockMessage, ClockState};
pub use model::{CommandEngine, ModelEngine, ModelError};
pub use ports::{
    connect_clock_input, connect_note_input, list_ports, EventSink, MidiOutputSink, PortError,
};
pub use worker::{GenerationJob, GenerationWorker, WorkerError};
