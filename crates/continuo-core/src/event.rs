//! MIDI event representation

use serde::{Deserialize, Serialize};

/// Controller number for the "all notes off" channel mode message.
pub const ALL_NOTES_OFF: u8 = 123;

/// A channel-agnostic MIDI event.
///
/// Only the three message kinds the bridge cares about are represented;
/// everything else is dropped at the port boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    NoteOn { pitch: u8, velocity: u8 },
    NoteOff { pitch: u8, velocity: u8 },
    ControlChange { controller: u8, value: u8 },
}

impl Event {
    /// Decode a raw channel message.
    ///
    /// Recognizes note-on (`0x9n`), note-off (`0x8n`) and control-change
    /// (`0xBn`); returns `None` for anything else. A note-on with velocity 0
    /// is normalized to a note-off, per MIDI running convention.
    pub fn from_raw(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        let a = *data.first()? & 0x7F;
        let b = *data.get(1)? & 0x7F;

        match status & 0xF0 {
            0x90 if b == 0 => Some(Self::NoteOff { pitch: a, velocity: 0 }),
            0x90 => Some(Self::NoteOn { pitch: a, velocity: b }),
            0x80 => Some(Self::NoteOff { pitch: a, velocity: b }),
            0xB0 => Some(Self::ControlChange { controller: a, value: b }),
            _ => None,
        }
    }

    /// Encode as a raw channel message on the given channel (0-15).
    pub fn to_raw(&self, channel: u8) -> [u8; 3] {
        let ch = channel & 0x0F;
        match *self {
            Self::NoteOn { pitch, velocity } => [0x90 | ch, pitch, velocity],
            Self::NoteOff { pitch, velocity } => [0x80 | ch, pitch, velocity],
            Self::ControlChange { controller, value } => [0xB0 | ch, controller, value],
        }
    }

    /// True for a note-on with positive velocity.
    pub fn is_note_on(&self) -> bool {
        matches!(self, Self::NoteOn { velocity, .. } if *velocity > 0)
    }
}

/// An input event stamped with the absolute clock pulse at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulsedEvent {
    pub pulse: u64,
    pub event: Event,
}

impl PulsedEvent {
    pub fn new(pulse: u64, event: Event) -> Self {
        Self { pulse, event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_channel_messages() {
        assert_eq!(
            Event::from_raw(&[0x90, 60, 100]),
            Some(Event::NoteOn { pitch: 60, velocity: 100 })
        );
        assert_eq!(
            Event::from_raw(&[0x83, 60, 64]),
            Some(Event::NoteOff { pitch: 60, velocity: 64 })
        );
        assert_eq!(
            Event::from_raw(&[0xB0, 64, 127]),
            Some(Event::ControlChange { controller: 64, value: 127 })
        );
    }

    #[test]
    fn note_on_velocity_zero_is_note_off() {
        assert_eq!(
            Event::from_raw(&[0x90, 60, 0]),
            Some(Event::NoteOff { pitch: 60, velocity: 0 })
        );
    }

    #[test]
    fn ignores_unrecognized_status() {
        assert_eq!(Event::from_raw(&[0xC0, 5, 0]), None); // program change
        assert_eq!(Event::from_raw(&[0xF8]), None); // clock tick
        assert_eq!(Event::from_raw(&[]), None);
    }

    #[test]
    fn raw_round_trip() {
        let ev = Event::NoteOn { pitch: 72, velocity: 90 };
        assert_eq!(Event::from_raw(&ev.to_raw(0)), Some(ev));
        assert_eq!(ev.to_raw(3)[0], 0x93);
    }

    #[test]
    fn is_note_on_requires_positive_velocity() {
        assert!(Event::NoteOn { pitch: 60, velocity: 1 }.is_note_on());
        assert!(!Event::NoteOff { pitch: 60, velocity: 0 }.is_note_on());
        assert!(!Event::ControlChange { controller: 64, value: 127 }.is_note_on());
    }
}
