//! The MIDI event buffer (§4.5): a header buffer (serialized first, at time
//! 0) plus a moment-keyed timed buffer, both feeding the track serializer in
//! `smf.rs`. `midi_null` extends the observed event-time range without
//! emitting anything, which is how a silent script can still widen the
//! track's `range_lower`/`range_upper`.

use crate::midi::message::ChannelMsg;
use crate::pointer::pointer_unpack;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Channel(ChannelMsg),
    /// Tempo meta-event, microseconds per quarter note.
    Tempo(u32),
    /// Raw system-exclusive payload; `f0` selects status 0xF0 (payload
    /// already omits the leading 0xF0 byte) vs. the 0xF7 escape form.
    SysEx { f0: bool, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiEvent {
    pub moment: i32,
    pub channel: Option<u8>,
    pub payload: EventPayload,
    pub(crate) seq: u32,
}

/// Collects timestamped MIDI events for one compilation (§3, §4.5). Not an
/// open-build accumulator in the §5 sense — events are appended freely and
/// finalized once, at serialization time.
#[derive(Debug, Clone, Default)]
pub struct MidiBuffer {
    header: Vec<MidiEvent>,
    timed: Vec<MidiEvent>,
    next_seq: u32,
    range_lower: Option<i32>,
    range_upper: Option<i32>,
}

impl MidiBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn update_range(&mut self, moment: i32) {
        let (subq, _) = pointer_unpack(moment);
        self.range_lower = Some(self.range_lower.map_or(subq, |l| l.min(subq)));
        self.range_upper = Some(self.range_upper.map_or(subq, |u| u.max(subq)));
    }

    fn next_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Extends the range bounds without emitting a message.
    pub fn midi_null(&mut self, moment: i32) {
        self.update_range(moment);
    }

    pub fn push_channel(&mut self, moment: i32, head: bool, channel: u8, msg: ChannelMsg) {
        self.update_range(moment);
        let seq = self.next_seq();
        let event = MidiEvent {
            moment,
            channel: Some(channel),
            payload: EventPayload::Channel(msg),
            seq,
        };
        if head {
            self.header.push(event);
        } else {
            self.timed.push(event);
        }
    }

    pub fn push_tempo(&mut self, moment: i32, head: bool, mpq: u32) {
        self.update_range(moment);
        let seq = self.next_seq();
        let event = MidiEvent {
            moment,
            channel: None,
            payload: EventPayload::Tempo(mpq),
            seq,
        };
        if head {
            self.header.push(event);
        } else {
            self.timed.push(event);
        }
    }

    pub fn push_sysex(&mut self, moment: i32, head: bool, f0: bool, data: Vec<u8>) {
        self.update_range(moment);
        let seq = self.next_seq();
        let event = MidiEvent {
            moment,
            channel: None,
            payload: EventPayload::SysEx { f0, data },
            seq,
        };
        if head {
            self.header.push(event);
        } else {
            self.timed.push(event);
        }
    }

    /// Minimum subquantum offset observed by any event or `midi_null` call;
    /// `0` if nothing has been observed yet.
    pub fn range_lower(&self) -> i32 {
        self.range_lower.unwrap_or(0)
    }

    /// Maximum subquantum offset observed; `0` if nothing observed yet.
    pub fn range_upper(&self) -> i32 {
        self.range_upper.unwrap_or(0)
    }

    /// Header-buffer events, in insertion order (serialized first, at time
    /// 0, per §4.5).
    pub fn header_events(&self) -> &[MidiEvent] {
        &self.header
    }

    /// Timed events, unsorted; `smf.rs` sorts by `(moment, seq)`.
    pub fn timed_events(&self) -> &[MidiEvent] {
        &self.timed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_tracks_subquanta_not_moments() {
        let mut buf = MidiBuffer::new();
        // moment = subq*3 + part; pack(10, Start) = 30, pack(20, End) = 62.
        buf.push_channel(30, false, 1, ChannelMsg::NoteOn { key: 60, vel: 100 });
        buf.push_channel(62, false, 1, ChannelMsg::NoteOff { key: 60, vel: 0 });
        assert_eq!(buf.range_lower(), 10);
        assert_eq!(buf.range_upper(), 20);
    }

    #[test]
    fn midi_null_extends_range_without_emitting() {
        let mut buf = MidiBuffer::new();
        buf.midi_null(300);
        assert_eq!(buf.range_upper(), 100);
        assert!(buf.timed_events().is_empty());
        assert!(buf.header_events().is_empty());
    }

    #[test]
    fn header_events_are_kept_separate() {
        let mut buf = MidiBuffer::new();
        buf.push_channel(0, true, 1, ChannelMsg::Controller { index: 0, value: 0 });
        buf.push_channel(30, false, 1, ChannelMsg::NoteOn { key: 60, vel: 100 });
        assert_eq!(buf.header_events().len(), 1);
        assert_eq!(buf.timed_events().len(), 1);
    }
}
