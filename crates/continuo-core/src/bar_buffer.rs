//! Per-measure capture buffer for live input

use std::collections::HashMap;
use std::sync::Mutex;

use crate::event::{Event, PulsedEvent};

struct Inner {
    anchor: Option<u64>,
    bars: HashMap<u32, Vec<PulsedEvent>>,
}

/// Maps captured events onto measures of the anchor-relative grid.
///
/// The first positive-velocity note-on fixes the anchor pulse; every later
/// event lands in bar `(pulse - anchor) / pulses_per_bar`. One producer (the
/// input loop) and one consumer (the controller) share it.
pub struct BarBuffer {
    pulses_per_bar: u64,
    inner: Mutex<Inner>,
}

impl BarBuffer {
    pub fn new(pulses_per_bar: u64) -> Self {
        Self {
            pulses_per_bar,
            inner: Mutex::new(Inner { anchor: None, bars: HashMap::new() }),
        }
    }

    /// Append a captured event stamped with its capture pulse.
    ///
    /// Before the anchor is set, anything that is not a positive-velocity
    /// note-on is dropped (no ghost note-offs, no orphan controllers). An
    /// event whose stamp predates the anchor is dropped as well.
    pub fn append(&self, event: Event, pulse: u64) {
        let Ok(mut inner) = self.inner.lock() else { return };

        let anchor = match inner.anchor {
            Some(anchor) => anchor,
            None => {
                if !event.is_note_on() {
                    return;
                }
                inner.anchor = Some(pulse);
                pulse
            }
        };

        if pulse < anchor {
            return;
        }

        let bar = ((pulse - anchor) / self.pulses_per_bar) as u32;
        inner
            .bars
            .entry(bar)
            .or_default()
            .push(PulsedEvent::new(pulse, event));
    }

    /// Pulse of the first captured note-on, if any.
    pub fn anchor(&self) -> Option<u64> {
        self.inner.lock().ok().and_then(|inner| inner.anchor)
    }

    /// Remove and return the events captured for one bar, in capture order.
    pub fn take(&self, bar_index: u32) -> Vec<PulsedEvent> {
        self.inner
            .lock()
            .ok()
            .and_then(|mut inner| inner.bars.remove(&bar_index))
            .unwrap_or_default()
    }

    /// Drop all captured bars. The anchor survives: the grid is fixed for
    /// the lifetime of the session.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.bars.clear();
        }
    }

    /// Total captured events across all bars.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.bars.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
