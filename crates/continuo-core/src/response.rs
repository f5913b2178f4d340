//! Window enforcement for generated continuations

use midly::{MidiMessage, Smf, Timing, TrackEventKind};

use crate::error::{CoreError, Result};
use crate::event::{Event, ALL_NOTES_OFF};
use crate::grid::PPQN;

/// A generated continuation mapped onto absolute clock pulses.
pub struct PlaybackPlan {
    /// (target_pulse, event) pairs, in track order. Forced note-offs and the
    /// closing all-notes-off sit at `end_pulse`.
    pub batch: Vec<(u64, Event)>,
    /// Exclusive upper bound of the response: `boundary_pulse + window`.
    pub end_pulse: u64,
}

impl PlaybackPlan {
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn min_target(&self) -> Option<u64> {
        self.batch.iter().map(|(pulse, _)| *pulse).min()
    }

    pub fn max_target(&self) -> Option<u64> {
        self.batch.iter().map(|(pulse, _)| *pulse).max()
    }
}

/// Parse a generated MIDI blob and fit it into the output window.
///
/// Events are placed at `boundary_pulse + floor(abs_tick * 24 / tpq)`.
/// Anything at or past `window` pulses is dropped; pitches left sounding at
/// the end are force-closed at the window edge, followed by an
/// all-notes-off controller so nothing can hang into the next cycle.
///
/// The floor conversion deliberately biases events early: an event meant to
/// land exactly on the window edge is dropped rather than leaked past it.
pub fn plan_playback(
    blob: &[u8],
    boundary_pulse: u64,
    window: u64,
    fallback_tpq: u16,
) -> Result<PlaybackPlan> {
    let smf = Smf::parse(blob).map_err(|e| CoreError::MalformedMidi(e.to_string()))?;

    let tpq = match smf.header.timing {
        Timing::Metrical(t) if t.as_int() > 0 => t.as_int() as u64,
        _ => fallback_tpq as u64,
    };
    if tpq == 0 {
        return Err(CoreError::MalformedMidi("ticks per quarter note is zero".into()));
    }

    let mut batch = Vec::new();
    let mut active: Vec<u8> = Vec::new();

    for track in &smf.tracks {
        let mut abs_tick = 0u64;
        for ev in track {
            abs_tick += u64::from(ev.delta.as_int());

            let TrackEventKind::Midi { message, .. } = ev.kind else {
                continue;
            };
            let event = match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => {
                    Event::NoteOff { pitch: key.as_int(), velocity: 0 }
                }
                MidiMessage::NoteOn { key, vel } => {
                    Event::NoteOn { pitch: key.as_int(), velocity: vel.as_int() }
                }
                MidiMessage::NoteOff { key, vel } => {
                    Event::NoteOff { pitch: key.as_int(), velocity: vel.as_int() }
                }
                MidiMessage::Controller { controller, value } => Event::ControlChange {
                    controller: controller.as_int(),
                    value: value.as_int(),
                },
                _ => continue,
            };

            let offset = abs_tick * PPQN / tpq;
            if offset >= window {
                continue;
            }

            match event {
                Event::NoteOn { pitch, .. } => {
                    if !active.contains(&pitch) {
                        active.push(pitch);
                    }
                }
                Event::NoteOff { pitch, .. } => active.retain(|&p| p != pitch),
                Event::ControlChange { .. } => {}
            }

            batch.push((boundary_pulse + offset, event));
        }
    }

    let end_pulse = boundary_pulse + window;
    for pitch in active.drain(..) {
        batch.push((end_pulse, Event::NoteOff { pitch, velocity: 0 }));
    }
    batch.push((end_pulse, Event::ControlChange { controller: ALL_NOTES_OFF, value: 0 }));

    Ok(PlaybackPlan { batch, end_pulse })
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u15, u28, u4, u7};
    use midly::{Format, Header, MetaMessage, TrackEvent};

    /// Build a single-track SMF from (delta_tick, message) pairs.
    fn blob(tpq: u16, messages: &[(u32, MidiMessage)]) -> Vec<u8> {
        let mut track: Vec<TrackEvent> = messages
            .iter()
            .map(|(delta, message)| TrackEvent {
                delta: u28::new(*delta),
                kind: TrackEventKind::Midi { channel: u4::new(0), message: *message },
            })
            .collect();
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        let smf = Smf {
            header: Header::new(Format::SingleTrack, Timing::Metrical(u15::new(tpq))),
            tracks: vec![track],
        };
        let mut out = Vec::new();
        smf.write_std(&mut out).unwrap();
        out
    }

    fn note_on(key: u8, vel: u8) -> MidiMessage {
        MidiMessage::NoteOn { key: u7::new(key), vel: u7::new(vel) }
    }

    fn note_off(key: u8) -> MidiMessage {
        MidiMessage::NoteOff { key: u7::new(key), vel: u7::new(0) }
    }

    const W: u64 = 192; // 4/4, two measures

    #[test]
    fn maps_ticks_to_boundary_relative_pulses() {
        // Ticks 240 and 480 at tpq 480 are pulses +12 and +24.
        let blob = blob(480, &[(240, note_on(62, 100)), (240, note_off(62))]);
        let plan = plan_playback(&blob, 196, W, 480).unwrap();

        assert_eq!(
            plan.batch,
            vec![
                (208, Event::NoteOn { pitch: 62, velocity: 100 }),
                (220, Event::NoteOff { pitch: 62, velocity: 0 }),
                (388, Event::ControlChange { controller: ALL_NOTES_OFF, value: 0 }),
            ]
        );
        assert_eq!(plan.end_pulse, 388);
    }

    #[test]
    fn drops_events_at_or_past_the_window() {
        // Tick 4000 at tpq 480 is pulse +200, past W=192.
        let blob = blob(480, &[(4000, note_on(70, 100))]);
        let plan = plan_playback(&blob, 196, W, 480).unwrap();

        // Only the all-notes-off survives; no stray note-off for pitch 70.
        assert_eq!(
            plan.batch,
            vec![(388, Event::ControlChange { controller: ALL_NOTES_OFF, value: 0 })]
        );
        assert_eq!(plan.max_target(), Some(388));
    }

    #[test]
    fn offset_exactly_at_window_is_dropped() {
        // Tick 3840 at tpq 480 is pulse +192 == W.
        let blob = blob(480, &[(3840, note_on(60, 100))]);
        let plan = plan_playback(&blob, 0, W, 480).unwrap();
        assert_eq!(plan.batch.len(), 1); // all-notes-off only
    }

    #[test]
    fn note_on_just_inside_window_is_kept_and_closed() {
        // Pulse +191 = tick 3820 at tpq 480 (3820 * 24 / 480 = 191).
        let blob = blob(480, &[(3820, note_on(60, 100))]);
        let plan = plan_playback(&blob, 0, W, 480).unwrap();

        assert_eq!(
            plan.batch,
            vec![
                (191, Event::NoteOn { pitch: 60, velocity: 100 }),
                (192, Event::NoteOff { pitch: 60, velocity: 0 }),
                (192, Event::ControlChange { controller: ALL_NOTES_OFF, value: 0 }),
            ]
        );
    }

    #[test]
    fn unclosed_note_is_forced_off_at_window_edge() {
        // Tick 96 at tpq 480 is pulse +4; no matching note-off.
        let blob = blob(480, &[(96, note_on(72, 100))]);
        let plan = plan_playback(&blob, 196, W, 480).unwrap();

        assert_eq!(
            plan.batch,
            vec![
                (200, Event::NoteOn { pitch: 72, velocity: 100 }),
                (388, Event::NoteOff { pitch: 72, velocity: 0 }),
                (388, Event::ControlChange { controller: ALL_NOTES_OFF, value: 0 }),
            ]
        );
    }

    #[test]
    fn note_off_past_window_still_forces_close() {
        // On at +4, off at +200 (dropped): the pitch stays active.
        let blob = blob(480, &[(96, note_on(60, 100)), (3904, note_off(60))]);
        let plan = plan_playback(&blob, 0, W, 480).unwrap();

        let offs: Vec<u64> = plan
            .batch
            .iter()
            .filter(|(_, e)| matches!(e, Event::NoteOff { pitch: 60, .. }))
            .map(|(p, _)| *p)
            .collect();
        assert_eq!(offs, vec![192]);
    }

    #[test]
    fn velocity_zero_note_on_closes_the_pitch() {
        let blob = blob(480, &[(0, note_on(60, 100)), (240, note_on(60, 0))]);
        let plan = plan_playback(&blob, 0, W, 480).unwrap();

        // Closed inside the window: no forced off, just the all-notes-off.
        let at_edge: Vec<&Event> = plan
            .batch
            .iter()
            .filter(|(p, _)| *p == 192)
            .map(|(_, e)| e)
            .collect();
        assert_eq!(at_edge, vec![&Event::ControlChange { controller: ALL_NOTES_OFF, value: 0 }]);
    }

    #[test]
    fn malformed_blob_is_an_error() {
        assert!(matches!(
            plan_playback(b"not a midi file", 0, W, 480),
            Err(CoreError::MalformedMidi(_))
        ));
    }

    #[test]
    fn n1_window_s5() {
        // N=1 in 4/4: W=96. Note-on at tick 240 (tpq 480) lands at +12.
        let blob = blob(480, &[(240, note_on(67, 100))]);
        let plan = plan_playback(&blob, 96, 96, 480).unwrap();

        assert_eq!(plan.min_target(), Some(108));
        assert_eq!(plan.end_pulse, 192);
        assert!(plan
            .batch
            .contains(&(192, Event::NoteOff { pitch: 67, velocity: 0 })));
    }

    #[test]
    fn in_window_events_keep_raw_offsets() {
        let blob = blob(480, &[(100, note_on(60, 80)), (100, note_off(60)), (40, note_on(61, 80))]);
        let plan = plan_playback(&blob, 1000, W, 480).unwrap();

        // floor(100*24/480)=5, floor(200*24/480)=10, floor(240*24/480)=12
        let targets: Vec<u64> = plan.batch.iter().map(|(p, _)| *p).collect();
        assert_eq!(&targets[..3], &[1005, 1010, 1012]);
    }
}
