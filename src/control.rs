//! The control layer (§4.6): thin wrappers that resolve a pointer to a MIDI
//! buffer moment (or mark the event as a header event) and forward it as a
//! channel message, plus the auto-tracked controller map that `control_track`
//! drains once rendering is complete.

use std::collections::HashMap;

use crate::arena::{Arena, Handle};
use crate::error::{InfraredError, Result};
use crate::graph::Graph;
use crate::midi::buffer::MidiBuffer;
use crate::midi::message::{self, ChannelMsg};
use crate::nmf::NmfSource;
use crate::pointer::{pointer_pack, MomentPart, Pointer};

const MODULE: &str = "control";

fn validate_channel(channel: u8, script_line: i32) -> Result<()> {
    if !(1..=16).contains(&channel) {
        return Err(InfraredError::input(MODULE, script_line, format!("channel {channel} out of range 1..=16")));
    }
    Ok(())
}

/// Resolves `pointer` to `(moment, head)`: `head=true` with an arbitrary
/// moment of `0` when the pointer is a header marker.
fn moment_or_head(pointer: &Pointer, nmf: &dyn NmfSource, script_line: i32) -> Result<(i32, bool)> {
    match pointer.absolute_moment(nmf, script_line)? {
        Some(moment) => Ok((moment, false)),
        None => Ok((0, true)),
    }
}

pub fn control_note_on(
    buffer: &mut MidiBuffer,
    nmf: &dyn NmfSource,
    pointer: &Pointer,
    channel: u8,
    key: u8,
    velocity: u8,
    script_line: i32,
) -> Result<()> {
    validate_channel(channel, script_line)?;
    let (moment, head) = moment_or_head(pointer, nmf, script_line)?;
    buffer.push_channel(moment, head, channel, ChannelMsg::NoteOn { key, vel: velocity });
    Ok(())
}

pub fn control_note_off(
    buffer: &mut MidiBuffer,
    nmf: &dyn NmfSource,
    pointer: &Pointer,
    channel: u8,
    key: u8,
    velocity: u8,
    script_line: i32,
) -> Result<()> {
    validate_channel(channel, script_line)?;
    let (moment, head) = moment_or_head(pointer, nmf, script_line)?;
    buffer.push_channel(moment, head, channel, ChannelMsg::NoteOff { key, vel: velocity });
    Ok(())
}

pub fn control_poly_aftertouch(
    buffer: &mut MidiBuffer,
    nmf: &dyn NmfSource,
    pointer: &Pointer,
    channel: u8,
    key: u8,
    pressure: u8,
    script_line: i32,
) -> Result<()> {
    validate_channel(channel, script_line)?;
    let (moment, head) = moment_or_head(pointer, nmf, script_line)?;
    buffer.push_channel(moment, head, channel, ChannelMsg::PolyAftertouch { key, pressure });
    Ok(())
}

pub fn control_cc(
    buffer: &mut MidiBuffer,
    nmf: &dyn NmfSource,
    pointer: &Pointer,
    channel: u8,
    index: u8,
    value: u8,
    script_line: i32,
) -> Result<()> {
    validate_channel(channel, script_line)?;
    let (moment, head) = moment_or_head(pointer, nmf, script_line)?;
    buffer.push_channel(moment, head, channel, ChannelMsg::Controller { index, value });
    Ok(())
}

pub fn control_cc14(
    buffer: &mut MidiBuffer,
    nmf: &dyn NmfSource,
    pointer: &Pointer,
    channel: u8,
    index: u8,
    value14: u16,
    script_line: i32,
) -> Result<()> {
    validate_channel(channel, script_line)?;
    let (moment, head) = moment_or_head(pointer, nmf, script_line)?;
    for msg in message::controller_14bit_split(index, value14) {
        buffer.push_channel(moment, head, channel, msg);
    }
    Ok(())
}

pub fn control_nrpn(
    buffer: &mut MidiBuffer,
    nmf: &dyn NmfSource,
    pointer: &Pointer,
    channel: u8,
    index14: u16,
    value14: u16,
    script_line: i32,
) -> Result<()> {
    validate_channel(channel, script_line)?;
    let (moment, head) = moment_or_head(pointer, nmf, script_line)?;
    for msg in message::nrpn(index14, value14) {
        buffer.push_channel(moment, head, channel, msg);
    }
    Ok(())
}

pub fn control_rpn(
    buffer: &mut MidiBuffer,
    nmf: &dyn NmfSource,
    pointer: &Pointer,
    channel: u8,
    index14: u16,
    value14: u16,
    script_line: i32,
) -> Result<()> {
    validate_channel(channel, script_line)?;
    let (moment, head) = moment_or_head(pointer, nmf, script_line)?;
    for msg in message::rpn(index14, value14) {
        buffer.push_channel(moment, head, channel, msg);
    }
    Ok(())
}

/// `control_instrument` (scenario 6): bank select + program change, emitted
/// at the same moment, in order.
pub fn control_instrument(
    buffer: &mut MidiBuffer,
    nmf: &dyn NmfSource,
    pointer: &Pointer,
    channel: u8,
    bank: i32,
    program: i32,
    script_line: i32,
) -> Result<()> {
    validate_channel(channel, script_line)?;
    let (moment, head) = moment_or_head(pointer, nmf, script_line)?;
    for msg in message::bank_select_program(bank, program) {
        buffer.push_channel(moment, head, channel, msg);
    }
    Ok(())
}

pub fn control_sysex(
    buffer: &mut MidiBuffer,
    nmf: &dyn NmfSource,
    pointer: &Pointer,
    data: Vec<u8>,
    script_line: i32,
) -> Result<()> {
    let (moment, head) = moment_or_head(pointer, nmf, script_line)?;
    let (f0, payload) = match data.split_first() {
        Some((&0xF0, rest)) => (true, rest.to_vec()),
        _ => (false, data),
    };
    buffer.push_sysex(moment, head, f0, payload);
    Ok(())
}

/// Controller types recognized by `control_auto` (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoType {
    Tempo,
    Bit7,
    Bit14,
    Nrpn,
    Rpn,
    Pressure,
    Pitch,
}

fn validate_auto_index(ty: AutoType, index: i32, script_line: i32) -> Result<()> {
    let ok = match ty {
        AutoType::Tempo | AutoType::Pressure | AutoType::Pitch => true,
        AutoType::Bit7 => (0x40..=0x5f).contains(&index) || (0x66..=0x77).contains(&index),
        AutoType::Bit14 => (0x01..=0x1f).contains(&index) && index != 0x06,
        AutoType::Nrpn | AutoType::Rpn => (0..=16_383).contains(&index),
    };
    if ok {
        Ok(())
    } else {
        Err(InfraredError::constraint(
            MODULE,
            script_line,
            format!("control_auto index {index} invalid for {ty:?}"),
        ))
    }
}

/// `(type, channel, index)`; `channel` is `0` for `Tempo` since the type is
/// channel-independent (§4.6).
type AutoKey = (AutoType, u8, i32);

/// The auto-tracked controller map (§4.6): last write wins per `(type,
/// channel, index)`.
#[derive(Debug, Clone, Default)]
pub struct ControlMap {
    mappings: HashMap<AutoKey, Handle<Graph>>,
    order: Vec<AutoKey>,
}

impl ControlMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn control_auto(&mut self, ty: AutoType, channel: u8, index: i32, graph: Handle<Graph>, script_line: i32) -> Result<()> {
        if !matches!(ty, AutoType::Tempo) {
            validate_channel(channel, script_line)?;
        }
        validate_auto_index(ty, index, script_line)?;
        let key = (ty, if matches!(ty, AutoType::Tempo) { 0 } else { channel }, index);
        if self.mappings.insert(key, graph).is_none() {
            self.order.push(key);
        }
        Ok(())
    }

    /// `control_track`: drains every mapping's graph over the MIDI buffer's
    /// observed event range (in subquanta) and emits the corresponding MIDI
    /// messages. Must run after `render_nmf` and all explicit control calls
    /// so the range is final (§5).
    pub fn control_track(&self, buffer: &mut MidiBuffer, arena: &Arena<Graph>, script_line: i32) -> Result<()> {
        let t_start = buffer.range_lower();
        let t_end = buffer.range_upper();
        for key in &self.order {
            let &(ty, channel, index) = key;
            let handle = self.mappings[key];
            let graph = arena.get(handle);
            let mut points = Vec::new();
            graph.track(t_start, Some(t_end), None, |t, v| points.push((t, v)));
            for (t_subq, value) in points {
                let moment = pointer_pack(t_subq, MomentPart::Start, script_line)?;
                emit_auto_point(buffer, ty, channel, index, value, moment, script_line)?;
            }
        }
        Ok(())
    }
}

fn emit_auto_point(buffer: &mut MidiBuffer, ty: AutoType, channel: u8, index: i32, value: i32, moment: i32, script_line: i32) -> Result<()> {
    match ty {
        AutoType::Tempo => {
            let mpq = u32::try_from(value).map_err(|_| InfraredError::input(MODULE, script_line, "tempo value out of range"))?;
            buffer.push_tempo(moment, false, mpq);
        }
        AutoType::Bit7 => {
            let value = value.clamp(0, 127) as u8;
            buffer.push_channel(moment, false, channel, ChannelMsg::Controller { index: index as u8, value });
        }
        AutoType::Bit14 => {
            let value14 = value.clamp(0, 16_383) as u16;
            for msg in message::controller_14bit_split(index as u8, value14) {
                buffer.push_channel(moment, false, channel, msg);
            }
        }
        AutoType::Nrpn => {
            let value14 = value.clamp(0, 16_383) as u16;
            for msg in message::nrpn(index as u16, value14) {
                buffer.push_channel(moment, false, channel, msg);
            }
        }
        AutoType::Rpn => {
            let value14 = value.clamp(0, 16_383) as u16;
            for msg in message::rpn(index as u16, value14) {
                buffer.push_channel(moment, false, channel, msg);
            }
        }
        AutoType::Pressure => {
            let pressure = value.clamp(0, 127) as u8;
            buffer.push_channel(moment, false, channel, ChannelMsg::ChannelPressure { pressure });
        }
        AutoType::Pitch => {
            let bend14 = value.clamp(0, 16_383) as u16;
            buffer.push_channel(moment, false, channel, ChannelMsg::PitchBend { bend14 });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::nmf::StaticNmf;

    #[test]
    fn scenario_bank_select_via_control_instrument() {
        let nmf = StaticNmf::single_section(0);
        let mut buffer = MidiBuffer::new();
        let mut pointer = Pointer::header();
        pointer.jump(0, -1).unwrap();
        control_instrument(&mut buffer, &nmf, &pointer, 2, 129, 5, -1).unwrap();
        assert_eq!(buffer.timed_events().len(), 3);
    }

    #[test]
    fn scenario_auto_tempo_track() {
        let nmf = StaticNmf::single_section(0);
        let mut buffer = MidiBuffer::new();
        let mut pointer = Pointer::header();
        pointer.jump(0, -1).unwrap();
        // Establish an event range of [0, 768] subquanta via two note-ish events.
        control_note_on(&mut buffer, &nmf, &pointer, 1, 60, 100, -1).unwrap();
        pointer.seek(96, -1).unwrap(); // 96 quanta = 768 subquanta
        control_note_off(&mut buffer, &nmf, &pointer, 1, 60, 0, -1).unwrap();

        let mut arena = Arena::new("graph", 16_384);
        let mut cache = crate::graph::GraphCache::new();
        let mut gb = GraphBuilder::new(16_384);
        gb.add_ramp(0, 1_000_000, 250_000, 96, false, -1).unwrap();
        gb.add_const(768, 250_000, -1).unwrap();
        let graph = gb.end(&mut arena, &mut cache, -1).unwrap();

        let mut map = ControlMap::new();
        map.control_auto(AutoType::Tempo, 1, 0, graph, -1).unwrap();
        map.control_track(&mut buffer, &arena, -1).unwrap();

        let tempo_events = buffer
            .timed_events()
            .iter()
            .filter(|e| matches!(e.payload, crate::midi::buffer::EventPayload::Tempo(_)))
            .count();
        assert!(tempo_events >= 2);
    }

    #[test]
    fn rejects_out_of_range_bit7_index() {
        let mut map = ControlMap::new();
        let mut arena = Arena::new("graph", 16_384);
        let mut cache = crate::graph::GraphCache::new();
        let mut gb = GraphBuilder::new(16_384);
        gb.add_const(0, 64, -1).unwrap();
        let graph = gb.end(&mut arena, &mut cache, -1).unwrap();
        assert!(map.control_auto(AutoType::Bit7, 1, 0x10, graph, -1).is_err());
    }
}
