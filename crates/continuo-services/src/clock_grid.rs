//! Pulse counter driven by external MIDI clock

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, error, info};

/// MIDI real-time message consumed by the clock grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMessage {
    Tick,
    Start,
    Continue,
    Stop,
}

impl ClockMessage {
    /// Decode a real-time status byte; anything else is ignored.
    pub fn from_status(status: u8) -> Option<Self> {
        match status {
            0xF8 => Some(Self::Tick),
            0xFA => Some(Self::Start),
            0xFB => Some(Self::Continue),
            0xFC => Some(Self::Stop),
            _ => None,
        }
    }
}

/// Shared clock position (lock-free reads from every thread).
///
/// Written by the grid thread only; readers may observe a value stale by at
/// most one increment, which the `>=` comparisons downstream tolerate.
pub struct ClockState {
    pulse_count: AtomicU64,
    running: AtomicBool,
}

impl ClockState {
    pub fn new() -> Self {
        Self {
            pulse_count: AtomicU64::new(0),
            running: AtomicBool::new(false),
        }
    }

    pub fn pulse(&self) -> u64 {
        self.pulse_count.load(Ordering::Relaxed)
    }

    /// Transport running flag (between MIDI start/continue and stop).
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn tick(&self) -> u64 {
        self.pulse_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn reset(&self) {
        self.pulse_count.store(0, Ordering::Relaxed);
    }

    fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }
}

impl Default for ClockState {
    fn default() -> Self {
        Self::new()
    }
}

/// Dedicated thread consuming clock messages into a `ClockState`.
///
/// A disconnected clock source is fatal: the shared stop flag is raised so
/// every other loop winds down.
pub struct ClockGrid {
    state: Arc<ClockState>,
    handle: Option<JoinHandle<()>>,
}

impl ClockGrid {
    pub fn spawn(rx: Receiver<ClockMessage>, stop: Arc<AtomicBool>) -> Self {
        let state = Arc::new(ClockState::new());
        let thread_state = state.clone();

        let handle = thread::spawn(move || {
            info!("clock grid listening");
            let mut last_report = Instant::now();

            loop {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                match rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(msg) => handle_message(&thread_state, msg),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        error!("clock source disconnected; shutting down");
                        stop.store(true, Ordering::Relaxed);
                        break;
                    }
                }

                if last_report.elapsed() >= Duration::from_secs(1) {
                    debug!(
                        pulse = thread_state.pulse(),
                        running = thread_state.is_running(),
                        "clock grid"
                    );
                    last_report = Instant::now();
                }
            }
            info!("clock grid stopped");
        });

        Self { state, handle: Some(handle) }
    }

    pub fn state(&self) -> Arc<ClockState> {
        self.state.clone()
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn handle_message(state: &ClockState, msg: ClockMessage) {
    match msg {
        ClockMessage::Tick => {
            state.tick();
        }
        ClockMessage::Start => {
            state.reset();
            state.set_running(true);
            info!("MIDI START");
        }
        ClockMessage::Continue => {
            state.set_running(true);
            debug!("MIDI CONTINUE");
        }
        ClockMessage::Stop => {
            state.set_running(false);
            info!("MIDI STOP");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn decodes_realtime_status_bytes() {
        assert_eq!(ClockMessage::from_status(0xF8), Some(ClockMessage::Tick));
        assert_eq!(ClockMessage::from_status(0xFA), Some(ClockMessage::Start));
        assert_eq!(ClockMessage::from_status(0xFB), Some(ClockMessage::Continue));
        assert_eq!(ClockMessage::from_status(0xFC), Some(ClockMessage::Stop));
        assert_eq!(ClockMessage::from_status(0x90), None);
        assert_eq!(ClockMessage::from_status(0xFE), None); // active sensing
    }

    #[test]
    fn ticks_accumulate_and_start_resets() {
        let state = ClockState::new();
        handle_message(&state, ClockMessage::Start);
        assert!(state.is_running());
        assert_eq!(state.pulse(), 0);

        for _ in 0..5 {
            handle_message(&state, ClockMessage::Tick);
        }
        assert_eq!(state.pulse(), 5);

        handle_message(&state, ClockMessage::Stop);
        assert!(!state.is_running());
        assert_eq!(state.pulse(), 5);

        handle_message(&state, ClockMessage::Continue);
        assert!(state.is_running());
        assert_eq!(state.pulse(), 5);

        handle_message(&state, ClockMessage::Start);
        assert_eq!(state.pulse(), 0);
    }

    #[test]
    fn disconnect_raises_the_stop_flag() {
        let (tx, rx) = bounded(16);
        let stop = Arc::new(AtomicBool::new(false));
        let mut grid = ClockGrid::spawn(rx, stop.clone());

        tx.send(ClockMessage::Start).unwrap();
        tx.send(ClockMessage::Tick).unwrap();
        drop(tx);

        grid.join();
        assert!(stop.load(Ordering::Relaxed));
        assert_eq!(grid.state().pulse(), 1);
    }

    #[test]
    fn stop_flag_ends_the_thread() {
        let (_tx, rx) = bounded::<ClockMessage>(16);
        let stop = Arc::new(AtomicBool::new(false));
        let mut grid = ClockGrid::spawn(rx, stop.clone());

        stop.store(true, Ordering::Relaxed);
        grid.join();
    }
}
