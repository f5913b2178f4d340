//! Prompt assembly: captured events to a standard MIDI file

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

use crate::error::Result;
use crate::event::{Event, PulsedEvent};
use crate::grid::PPQN;

/// Reference tempo written into every prompt: 120 BPM, the rate the model
/// was trained against.
const REFERENCE_TEMPO_US: u32 = 500_000;

/// Serialize captured events into a single-track SMF blob.
///
/// Ticks are relative to the earliest event's pulse, converted at
/// `ticks_per_beat / 24` ticks per pulse, so the prompt starts at tick 0
/// regardless of where in the session the bar fell.
pub fn encode_prompt(events: &[PulsedEvent], ticks_per_beat: u16) -> Result<Vec<u8>> {
    let mut ordered: Vec<&PulsedEvent> = events.iter().collect();
    ordered.sort_by_key(|pe| pe.pulse);

    let first_pulse = ordered.first().map(|pe| pe.pulse).unwrap_or(0);
    let tpb = ticks_per_beat as u64;

    let mut track: Vec<TrackEvent> = Vec::with_capacity(ordered.len() + 2);
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(REFERENCE_TEMPO_US))),
    });

    let mut last_tick = 0u64;
    for pe in ordered {
        let tick = (pe.pulse - first_pulse) * tpb / PPQN;
        let delta = tick.saturating_sub(last_tick);
        last_tick = tick;

        let message = match pe.event {
            Event::NoteOn { pitch, velocity } => MidiMessage::NoteOn {
                key: u7::new(pitch),
                vel: u7::new(velocity),
            },
            Event::NoteOff { pitch, velocity } => MidiMessage::NoteOff {
                key: u7::new(pitch),
                vel: u7::new(velocity),
            },
            Event::ControlChange { controller, value } => MidiMessage::Controller {
                controller: u7::new(controller),
                value: u7::new(value),
            },
        };

        track.push(TrackEvent {
            delta: u28::new(delta as u32),
            kind: TrackEventKind::Midi { channel: u4::new(0), message },
        });
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header::new(Format::SingleTrack, Timing::Metrical(u15::new(ticks_per_beat))),
        tracks: vec![track],
    };

    let mut blob = Vec::new();
    smf.write_std(&mut blob)?;
    Ok(blob)
}
