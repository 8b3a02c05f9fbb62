//! Format-1 Standard MIDI File serialization (§4.5, §6): orders header and
//! timed events into a single track, converts each to its `midly` wire
//! representation, and writes `MThd`/`MTrk` via `midly::Smf::write_std`.

use midly::num::{u14, u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, PitchBend, Smf, Timing, TrackEvent, TrackEventKind};

use crate::error::{InfraredError, Result};
use crate::midi::buffer::{EventPayload, MidiBuffer, MidiEvent};
use crate::midi::message::ChannelMsg;

const MODULE: &str = "smf";

/// Moments per quarter note: `96 quanta * 8 subquanta/quantum * 3
/// moments/subquantum` (§6).
pub const DIVISION: u16 = 2304;

struct AbsEvent<'a> {
    tick: u32,
    priority: u8,
    seq: u32,
    kind: TrackEventKind<'a>,
}

fn channel_message(msg: &ChannelMsg) -> MidiMessage {
    match *msg {
        ChannelMsg::NoteOn { key, vel } => MidiMessage::NoteOn { key: u7::new(key), vel: u7::new(vel) },
        ChannelMsg::NoteOff { key, vel } => MidiMessage::NoteOff { key: u7::new(key), vel: u7::new(vel) },
        ChannelMsg::PolyAftertouch { key, pressure } => MidiMessage::Aftertouch {
            key: u7::new(key),
            vel: u7::new(pressure),
        },
        ChannelMsg::Controller { index, value } => MidiMessage::Controller {
            controller: u7::new(index),
            value: u7::new(value),
        },
        ChannelMsg::ProgramChange { program } => MidiMessage::ProgramChange { program: u7::new(program) },
        ChannelMsg::ChannelPressure { pressure } => MidiMessage::ChannelAftertouch { vel: u7::new(pressure) },
        ChannelMsg::PitchBend { bend14 } => MidiMessage::PitchBend {
            bend: PitchBend(u14::new(bend14)),
        },
    }
}

fn event_kind(event: &MidiEvent) -> Result<TrackEventKind<'_>> {
    match &event.payload {
        EventPayload::Channel(msg) => {
            let channel = event.channel.ok_or_else(|| {
                InfraredError::state(MODULE, crate::error::NO_LINE, "channel message missing channel")
            })?;
            if !(1..=16).contains(&channel) {
                return Err(InfraredError::input(
                    MODULE,
                    crate::error::NO_LINE,
                    format!("channel {channel} out of range 1..=16"),
                ));
            }
            Ok(TrackEventKind::Midi {
                channel: u4::new(channel - 1),
                message: channel_message(msg),
            })
        }
        EventPayload::Tempo(mpq) => Ok(TrackEventKind::Meta(MetaMessage::Tempo(u24::new(*mpq)))),
        EventPayload::SysEx { f0, data } => {
            if *f0 {
                Ok(TrackEventKind::SysEx(data))
            } else {
                Ok(TrackEventKind::Escape(data))
            }
        }
    }
}

fn collect_abs_events<'a>(buffer: &'a MidiBuffer, tick_base: i64) -> Result<Vec<AbsEvent<'a>>> {
    let mut out = Vec::with_capacity(buffer.header_events().len() + buffer.timed_events().len());
    for event in buffer.header_events() {
        out.push(AbsEvent {
            tick: 0,
            priority: 0,
            seq: event.seq,
            kind: event_kind(event)?,
        });
    }
    for event in buffer.timed_events() {
        let tick = (event.moment as i64) - tick_base;
        let tick = u32::try_from(tick).map_err(|_| {
            InfraredError::input(MODULE, crate::error::NO_LINE, "event precedes range_lower; negative delta")
        })?;
        out.push(AbsEvent {
            tick,
            priority: 1,
            seq: event.seq,
            kind: event_kind(event)?,
        });
    }
    Ok(out)
}

fn to_track<'a>(mut abs_events: Vec<AbsEvent<'a>>) -> Vec<TrackEvent<'a>> {
    abs_events.sort_by(|a, b| a.tick.cmp(&b.tick).then(a.priority.cmp(&b.priority)).then(a.seq.cmp(&b.seq)));
    let mut out = Vec::with_capacity(abs_events.len() + 1);
    let mut cursor = 0_u32;
    for event in abs_events {
        let delta = event.tick.saturating_sub(cursor).min(0x0FFF_FFFF);
        out.push(TrackEvent {
            delta: u28::new(delta),
            kind: event.kind,
        });
        cursor = event.tick;
    }
    out.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    out
}

/// Serializes the buffer to a single-track Format-1 SMF (§6: `MThd
/// {format=1, ntrks=1, division=2304}`, one `MTrk`, terminal `FF 2F 00`).
pub fn serialize(buffer: &MidiBuffer) -> Result<Vec<u8>> {
    let tick_base = (buffer.range_lower() as i64) * 3;
    let abs_events = collect_abs_events(buffer, tick_base)?;
    let track = to_track(abs_events);

    let smf = Smf {
        header: Header {
            format: Format::Parallel,
            timing: Timing::Metrical(u15::new(DIVISION)),
        },
        tracks: vec![track],
    };

    let mut out = Vec::new();
    smf.write_std(&mut out)
        .map_err(|e| InfraredError::resource(MODULE, format!("SMF serialization failed: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::message::ChannelMsg;

    #[test]
    fn serializes_minimal_note() {
        let mut buffer = MidiBuffer::new();
        buffer.push_channel(0, false, 1, ChannelMsg::NoteOn { key: 60, vel: 100 });
        buffer.push_channel(300, false, 1, ChannelMsg::NoteOff { key: 60, vel: 0 });
        let bytes = serialize(&buffer).unwrap();
        let parsed = Smf::parse(&bytes).expect("round-trips through midly's own parser");
        assert_eq!(parsed.header.format, Format::Parallel);
        assert_eq!(parsed.header.timing, Timing::Metrical(u15::new(DIVISION)));
        assert_eq!(parsed.tracks.len(), 1);
        let last = parsed.tracks[0].last().unwrap();
        assert!(matches!(last.kind, TrackEventKind::Meta(MetaMessage::EndOfTrack)));
    }

    #[test]
    fn delta_times_sum_to_range_span() {
        let mut buffer = MidiBuffer::new();
        buffer.push_channel(0, false, 1, ChannelMsg::NoteOn { key: 60, vel: 100 });
        buffer.push_channel(90, false, 1, ChannelMsg::NoteOff { key: 60, vel: 0 });
        let expected_span = (buffer.range_upper() - buffer.range_lower()) * 3;
        let bytes = serialize(&buffer).unwrap();
        let parsed = Smf::parse(&bytes).unwrap();
        let sum: u32 = parsed.tracks[0].iter().map(|e| e.delta.as_int()).sum();
        assert_eq!(sum, expected_span as u32);
    }

    #[test]
    fn header_events_precede_timed_events_at_same_tick() {
        let mut buffer = MidiBuffer::new();
        buffer.push_channel(0, true, 1, ChannelMsg::Controller { index: 0, value: 1 });
        buffer.push_channel(0, false, 1, ChannelMsg::NoteOn { key: 60, vel: 100 });
        let bytes = serialize(&buffer).unwrap();
        let parsed = Smf::parse(&bytes).unwrap();
        let first = &parsed.tracks[0][0];
        assert!(matches!(
            first.kind,
            TrackEventKind::Midi {
                message: MidiMessage::Controller { .. },
                ..
            }
        ));
    }
}
