//! The operation registry (§4.8, §6: "operation-registration glue remains
//! an external collaborator"). A name-indexed table of native operations,
//! bounded at `MAX_OPS` (§5); this module both defines the registry and
//! populates it with the builtin vocabulary needed to drive every other
//! subsystem from script source.

use std::collections::HashMap;

use crate::artic::{Articulation, Ruler};
use crate::control;
use crate::control::AutoType;
use crate::error::{InfraredError, Result};
use crate::limits::MAX_OPS;
use crate::nmf::NmfSource;
use crate::render::{Classifier, ClassifierValue};
use crate::value::{Blob, Value};

use super::stack::{GroupStack, ValueStack};
use crate::context::Context;

const MODULE: &str = "ops";

/// Bundles the pieces every builtin needs so `OpFn` stays a single-argument
/// function pointer instead of a seven-parameter one.
pub struct OpArgs<'a> {
    pub ctx: &'a mut Context,
    pub stack: &'a mut ValueStack,
    pub groups: &'a GroupStack,
    pub nmf: &'a dyn NmfSource,
    pub script_line: i32,
}

impl<'a> OpArgs<'a> {
    /// Pops the value stack, rejecting any pop that would reach below the
    /// innermost open group's threshold (§4.8: "`pop` is forbidden from
    /// popping below the top group's threshold").
    pub fn checked_pop(&mut self) -> Result<Value> {
        if self.groups.depth() > 0 && self.stack.len() <= self.groups.floor() {
            return Err(InfraredError::constraint(
                MODULE,
                self.script_line,
                format!("pop would cross the group boundary at depth {}", self.groups.floor()),
            ));
        }
        self.stack.pop(self.script_line)
    }
}

pub type OpFn = fn(&mut OpArgs) -> Result<()>;

/// Name-indexed operation table (§4.8): "operations are registered by
/// name... at most 16384 may be registered."
#[derive(Default)]
pub struct OpRegistry {
    ops: HashMap<String, OpFn>,
}

impl OpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, op: OpFn, script_line: i32) -> Result<()> {
        if self.ops.len() >= MAX_OPS && !self.ops.contains_key(name) {
            return Err(InfraredError::capacity(MODULE, script_line, format!("operation table capacity {MAX_OPS} exceeded")));
        }
        self.ops.insert(name.to_string(), op);
        Ok(())
    }

    pub fn call(&self, name: &str, args: &mut OpArgs) -> Result<()> {
        let op = self
            .ops
            .get(name)
            .ok_or_else(|| InfraredError::state(MODULE, args.script_line, format!("unknown operation '{name}'")))?;
        op(args)
    }

    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        for (name, op) in BUILTINS {
            reg.register(name, *op, -1).expect("builtin table fits within MAX_OPS");
        }
        reg
    }
}

fn pop_i32(a: &mut OpArgs) -> Result<i32> {
    a.checked_pop()?.as_integer(a.script_line)
}

fn pop_u8(a: &mut OpArgs, what: &str) -> Result<u8> {
    let v = pop_i32(a)?;
    u8::try_from(v).map_err(|_| InfraredError::input(MODULE, a.script_line, format!("{what} {v} out of range 0..=255")))
}

fn pop_u16(a: &mut OpArgs, what: &str) -> Result<u16> {
    let v = pop_i32(a)?;
    u16::try_from(v).map_err(|_| InfraredError::input(MODULE, a.script_line, format!("{what} {v} out of range 0..=65535")))
}

fn op_dup(a: &mut OpArgs) -> Result<()> {
    let v = *a.stack.peek(a.script_line)?;
    a.stack.push(v, a.script_line)
}

fn op_drop(a: &mut OpArgs) -> Result<()> {
    a.checked_pop().map(|_| ())
}

fn op_swap(a: &mut OpArgs) -> Result<()> {
    let b = a.checked_pop()?;
    let x = a.checked_pop()?;
    a.stack.push(b, a.script_line)?;
    a.stack.push(x, a.script_line)
}

fn op_add(a: &mut OpArgs) -> Result<()> {
    let y = pop_i32(a)?;
    let x = pop_i32(a)?;
    let r = x.checked_add(y).ok_or_else(|| InfraredError::input(MODULE, a.script_line, "integer overflow in add"))?;
    a.stack.push(Value::Integer(r), a.script_line)
}

fn op_sub(a: &mut OpArgs) -> Result<()> {
    let y = pop_i32(a)?;
    let x = pop_i32(a)?;
    let r = x.checked_sub(y).ok_or_else(|| InfraredError::input(MODULE, a.script_line, "integer overflow in sub"))?;
    a.stack.push(Value::Integer(r), a.script_line)
}

fn op_mul(a: &mut OpArgs) -> Result<()> {
    let y = pop_i32(a)?;
    let x = pop_i32(a)?;
    let r = x.checked_mul(y).ok_or_else(|| InfraredError::input(MODULE, a.script_line, "integer overflow in mul"))?;
    a.stack.push(Value::Integer(r), a.script_line)
}

fn op_div(a: &mut OpArgs) -> Result<()> {
    let y = pop_i32(a)?;
    let x = pop_i32(a)?;
    if y == 0 {
        return Err(InfraredError::input(MODULE, a.script_line, "division by zero"));
    }
    let r = x.checked_div(y).ok_or_else(|| InfraredError::input(MODULE, a.script_line, "integer overflow in div"))?;
    a.stack.push(Value::Integer(r), a.script_line)
}

fn op_neg(a: &mut OpArgs) -> Result<()> {
    let x = pop_i32(a)?;
    let r = x.checked_neg().ok_or_else(|| InfraredError::input(MODULE, a.script_line, "cannot negate i32::MIN"))?;
    a.stack.push(Value::Integer(r), a.script_line)
}

fn op_pointer_reset(a: &mut OpArgs) -> Result<()> {
    let mut p = a.checked_pop()?.as_pointer(a.script_line)?;
    p.reset();
    a.stack.push(Value::Pointer(p), a.script_line)
}

fn op_text_concat(a: &mut OpArgs) -> Result<()> {
    let rhs = a.checked_pop()?.as_text(a.script_line)?;
    let lhs = a.checked_pop()?.as_text(a.script_line)?;
    let cap = a.ctx.limits.text_chars;
    let joined = a.ctx.texts.get(lhs).concat(a.ctx.texts.get(rhs), cap, a.script_line)?;
    let h = a.ctx.texts.push(joined)?;
    a.stack.push(Value::Text(h), a.script_line)
}

fn op_text_slice(a: &mut OpArgs) -> Result<()> {
    let j = pop_i32(a)? as usize;
    let i = pop_i32(a)? as usize;
    let t = a.checked_pop()?.as_text(a.script_line)?;
    let cap = a.ctx.limits.text_chars;
    let sliced = a.ctx.texts.get(t).slice(i, j, cap, a.script_line)?;
    let h = a.ctx.texts.push(sliced)?;
    a.stack.push(Value::Text(h), a.script_line)
}

fn op_blob_from_hex(a: &mut OpArgs) -> Result<()> {
    let t = a.checked_pop()?.as_text(a.script_line)?;
    let cap = a.ctx.limits.blob_bytes;
    let blob = Blob::from_hex(a.ctx.texts.get(t).as_str(), cap, a.script_line)?;
    let h = a.ctx.blobs.push(blob)?;
    a.stack.push(Value::Blob(h), a.script_line)
}

fn op_blob_concat(a: &mut OpArgs) -> Result<()> {
    let rhs = a.checked_pop()?.as_blob(a.script_line)?;
    let lhs = a.checked_pop()?.as_blob(a.script_line)?;
    let cap = a.ctx.limits.blob_bytes;
    let joined = a.ctx.blobs.get(lhs).concat(a.ctx.blobs.get(rhs), cap, a.script_line)?;
    let h = a.ctx.blobs.push(joined)?;
    a.stack.push(Value::Blob(h), a.script_line)
}

fn op_set_begin(a: &mut OpArgs) -> Result<()> {
    a.ctx.begin_set_build(a.script_line)
}

fn op_set_all(a: &mut OpArgs) -> Result<()> {
    a.ctx.set_builder_mut(a.script_line)?.all();
    Ok(())
}

fn op_set_none(a: &mut OpArgs) -> Result<()> {
    a.ctx.set_builder_mut(a.script_line)?.none();
    Ok(())
}

fn op_set_invert(a: &mut OpArgs) -> Result<()> {
    a.ctx.set_builder_mut(a.script_line)?.invert();
    Ok(())
}

fn set_closed_op(include: bool) -> OpFn {
    match include {
        true => |a| {
            let hi = pop_i32(a)?;
            let lo = pop_i32(a)?;
            a.ctx.set_builder_mut(a.script_line)?.closed(lo, hi, true, a.script_line)
        },
        false => |a| {
            let hi = pop_i32(a)?;
            let lo = pop_i32(a)?;
            a.ctx.set_builder_mut(a.script_line)?.closed(lo, hi, false, a.script_line)
        },
    }
}

fn set_open_op(include: bool) -> OpFn {
    match include {
        true => |a| {
            let lo = pop_i32(a)?;
            a.ctx.set_builder_mut(a.script_line)?.open(lo, true, a.script_line)
        },
        false => |a| {
            let lo = pop_i32(a)?;
            a.ctx.set_builder_mut(a.script_line)?.open(lo, false, a.script_line)
        },
    }
}

fn op_set_union(a: &mut OpArgs) -> Result<()> {
    let other = a.checked_pop()?.as_set(a.script_line)?;
    let snapshot = a.ctx.sets.get(other).clone();
    a.ctx.set_builder_mut(a.script_line)?.union(&snapshot, a.script_line)
}

fn op_set_intersect(a: &mut OpArgs) -> Result<()> {
    let other = a.checked_pop()?.as_set(a.script_line)?;
    let snapshot = a.ctx.sets.get(other).clone();
    a.ctx.set_builder_mut(a.script_line)?.intersect(&snapshot, a.script_line)
}

fn op_set_except(a: &mut OpArgs) -> Result<()> {
    let other = a.checked_pop()?.as_set(a.script_line)?;
    let snapshot = a.ctx.sets.get(other).clone();
    a.ctx.set_builder_mut(a.script_line)?.except(&snapshot, a.script_line)
}

fn op_set_end(a: &mut OpArgs) -> Result<()> {
    let h = a.ctx.end_set_build(a.script_line)?;
    a.stack.push(Value::Set(h), a.script_line)
}

fn op_set_has(a: &mut OpArgs) -> Result<()> {
    let v = pop_i32(a)?;
    let h = a.checked_pop()?.as_set(a.script_line)?;
    let result = if a.ctx.sets.get(h).has(v) { 1 } else { 0 };
    a.stack.push(Value::Integer(result), a.script_line)
}

fn op_graph_begin(a: &mut OpArgs) -> Result<()> {
    a.ctx.begin_graph_build(a.script_line)
}

fn op_graph_const(a: &mut OpArgs) -> Result<()> {
    let value = pop_i32(a)?;
    let t = pop_i32(a)?;
    a.ctx.graph_builder_mut(a.script_line)?.add_const(t, value, a.script_line)
}

fn op_graph_ramp(a: &mut OpArgs) -> Result<()> {
    let log = pop_i32(a)? != 0;
    let step = pop_i32(a)?;
    let b = pop_i32(a)?;
    let aa = pop_i32(a)?;
    let t_start = pop_i32(a)?;
    a.ctx.graph_builder_mut(a.script_line)?.add_ramp(t_start, aa, b, step, log, a.script_line)
}

fn op_graph_derived(a: &mut OpArgs) -> Result<()> {
    let max_val = pop_i32(a)?;
    let min_val = pop_i32(a)?;
    let c = pop_i32(a)?;
    let den = pop_i32(a)?;
    let num = pop_i32(a)?;
    let source = a.checked_pop()?.as_graph(a.script_line)?;
    let t_src = pop_i32(a)?;
    let t_start = pop_i32(a)?;
    let source_graph = a.ctx.graphs.get(source).clone();
    a.ctx
        .graph_builder_mut(a.script_line)?
        .add_derived(t_start, t_src, &source_graph, num, den, c, min_val, max_val, a.script_line)
}

fn op_graph_end(a: &mut OpArgs) -> Result<()> {
    let h = a.ctx.end_graph_build(a.script_line)?;
    a.stack.push(Value::Graph(h), a.script_line)
}

fn op_graph_query(a: &mut OpArgs) -> Result<()> {
    let t = pop_i32(a)?;
    let h = a.checked_pop()?.as_graph(a.script_line)?;
    let v = a.ctx.graphs.get(h).query(t);
    a.stack.push(Value::Integer(v), a.script_line)
}

fn op_default_velocity_graph(a: &mut OpArgs) -> Result<()> {
    let h = a.ctx.default_velocity_graph(a.script_line)?;
    a.stack.push(Value::Graph(h), a.script_line)
}

fn op_art_new(a: &mut OpArgs) -> Result<()> {
    let gap = pop_i32(a)?;
    let bumper = pop_i32(a)?;
    let denom = pop_i32(a)?;
    let num = pop_i32(a)?;
    let art = Articulation::new(num, denom, bumper, gap, a.script_line)?;
    let h = a.ctx.artics.push(art)?;
    a.stack.push(Value::Articulation(h), a.script_line)
}

fn op_ruler_new(a: &mut OpArgs) -> Result<()> {
    let gap = pop_i32(a)?;
    let slot = pop_i32(a)?;
    let ruler = Ruler::new(slot, gap, a.script_line)?;
    let h = a.ctx.rulers.push(ruler)?;
    a.stack.push(Value::Ruler(h), a.script_line)
}

fn op_ruler_push(a: &mut OpArgs) -> Result<()> {
    let h = a.checked_pop()?.as_ruler(a.script_line)?;
    let ruler = *a.ctx.rulers.get(h);
    a.ctx.push_ruler(ruler, a.script_line)
}

fn op_ruler_pop(a: &mut OpArgs) -> Result<()> {
    let ruler = a.ctx.pop_ruler(a.script_line)?;
    let h = a.ctx.rulers.push(ruler)?;
    a.stack.push(Value::Ruler(h), a.script_line)
}

fn push_classifier(a: &mut OpArgs, value: ClassifierValue) -> Result<()> {
    let art_set = a.checked_pop()?.as_set(a.script_line)?;
    let layer_set = a.checked_pop()?.as_set(a.script_line)?;
    let sect_set = a.checked_pop()?.as_set(a.script_line)?;
    a.ctx.render_pipeline.push(Classifier { sect_set, layer_set, art_set, value });
    Ok(())
}

fn op_classify_art(a: &mut OpArgs) -> Result<()> {
    let h = a.checked_pop()?.as_articulation(a.script_line)?;
    push_classifier(a, ClassifierValue::Art(h))
}

fn op_classify_ruler(a: &mut OpArgs) -> Result<()> {
    let h = a.checked_pop()?.as_ruler(a.script_line)?;
    push_classifier(a, ClassifierValue::Ruler(h))
}

fn op_classify_velocity(a: &mut OpArgs) -> Result<()> {
    let h = a.checked_pop()?.as_graph(a.script_line)?;
    push_classifier(a, ClassifierValue::VelocityGraph(h))
}

fn op_classify_channel(a: &mut OpArgs) -> Result<()> {
    let ch = pop_u8(a, "channel")?;
    push_classifier(a, ClassifierValue::Channel(ch))
}

fn op_classify_release(a: &mut OpArgs) -> Result<()> {
    let v = pop_i32(a)?;
    let r = i8::try_from(v).map_err(|_| InfraredError::input(MODULE, a.script_line, format!("release {v} out of range -128..=127")))?;
    push_classifier(a, ClassifierValue::Release(r))
}

fn op_classify_aftertouch(a: &mut OpArgs) -> Result<()> {
    let on = pop_i32(a)? != 0;
    push_classifier(a, ClassifierValue::Aftertouch(on))
}

fn op_render(a: &mut OpArgs) -> Result<()> {
    crate::render::render_nmf(
        a.nmf,
        &a.ctx.render_pipeline,
        &a.ctx.sets,
        &a.ctx.artics,
        &a.ctx.rulers,
        &mut a.ctx.graphs,
        &mut a.ctx.graph_cache,
        &mut a.ctx.midi,
        a.script_line,
    )
    .map(|_| ())
}

fn op_control_track(a: &mut OpArgs) -> Result<()> {
    a.ctx.control_map.control_track(&mut a.ctx.midi, &a.ctx.graphs, a.script_line)
}

fn op_midi_null(a: &mut OpArgs) -> Result<()> {
    let p = a.checked_pop()?.as_pointer(a.script_line)?;
    if let Some(moment) = p.absolute_moment(a.nmf, a.script_line)? {
        a.ctx.midi.midi_null(moment);
    }
    Ok(())
}

fn op_note_on(a: &mut OpArgs) -> Result<()> {
    let vel = pop_u8(a, "velocity")?;
    let key = pop_u8(a, "key")?;
    let ch = pop_u8(a, "channel")?;
    let p = a.checked_pop()?.as_pointer(a.script_line)?;
    control::control_note_on(&mut a.ctx.midi, a.nmf, &p, ch, key, vel, a.script_line)
}

fn op_note_off(a: &mut OpArgs) -> Result<()> {
    let vel = pop_u8(a, "velocity")?;
    let key = pop_u8(a, "key")?;
    let ch = pop_u8(a, "channel")?;
    let p = a.checked_pop()?.as_pointer(a.script_line)?;
    control::control_note_off(&mut a.ctx.midi, a.nmf, &p, ch, key, vel, a.script_line)
}

fn op_poly_aftertouch(a: &mut OpArgs) -> Result<()> {
    let pressure = pop_u8(a, "pressure")?;
    let key = pop_u8(a, "key")?;
    let ch = pop_u8(a, "channel")?;
    let p = a.checked_pop()?.as_pointer(a.script_line)?;
    control::control_poly_aftertouch(&mut a.ctx.midi, a.nmf, &p, ch, key, pressure, a.script_line)
}

fn op_cc(a: &mut OpArgs) -> Result<()> {
    let value = pop_u8(a, "cc value")?;
    let index = pop_u8(a, "cc index")?;
    let ch = pop_u8(a, "channel")?;
    let p = a.checked_pop()?.as_pointer(a.script_line)?;
    control::control_cc(&mut a.ctx.midi, a.nmf, &p, ch, index, value, a.script_line)
}

fn op_cc14(a: &mut OpArgs) -> Result<()> {
    let value = pop_u16(a, "cc14 value")?;
    let index = pop_u8(a, "cc14 index")?;
    let ch = pop_u8(a, "channel")?;
    let p = a.checked_pop()?.as_pointer(a.script_line)?;
    control::control_cc14(&mut a.ctx.midi, a.nmf, &p, ch, index, value, a.script_line)
}

fn op_nrpn(a: &mut OpArgs) -> Result<()> {
    let value = pop_u16(a, "nrpn value")?;
    let index = pop_u16(a, "nrpn index")?;
    let ch = pop_u8(a, "channel")?;
    let p = a.checked_pop()?.as_pointer(a.script_line)?;
    control::control_nrpn(&mut a.ctx.midi, a.nmf, &p, ch, index, value, a.script_line)
}

fn op_rpn(a: &mut OpArgs) -> Result<()> {
    let value = pop_u16(a, "rpn value")?;
    let index = pop_u16(a, "rpn index")?;
    let ch = pop_u8(a, "channel")?;
    let p = a.checked_pop()?.as_pointer(a.script_line)?;
    control::control_rpn(&mut a.ctx.midi, a.nmf, &p, ch, index, value, a.script_line)
}

fn op_instrument(a: &mut OpArgs) -> Result<()> {
    let program = pop_i32(a)?;
    let bank = pop_i32(a)?;
    let ch = pop_u8(a, "channel")?;
    let p = a.checked_pop()?.as_pointer(a.script_line)?;
    control::control_instrument(&mut a.ctx.midi, a.nmf, &p, ch, bank, program, a.script_line)
}

fn op_sysex(a: &mut OpArgs) -> Result<()> {
    let blob = a.checked_pop()?.as_blob(a.script_line)?;
    let p = a.checked_pop()?.as_pointer(a.script_line)?;
    let data = a.ctx.blobs.get(blob).as_bytes().to_vec();
    control::control_sysex(&mut a.ctx.midi, a.nmf, &p, data, a.script_line)
}

fn auto_op(ty: AutoType) -> OpFn {
    match ty {
        AutoType::Tempo => |a| {
            let g = a.checked_pop()?.as_graph(a.script_line)?;
            a.ctx.control_map.control_auto(AutoType::Tempo, 0, 0, g, a.script_line)
        },
        AutoType::Pressure => |a| {
            let g = a.checked_pop()?.as_graph(a.script_line)?;
            let ch = pop_u8(a, "channel")?;
            a.ctx.control_map.control_auto(AutoType::Pressure, ch, 0, g, a.script_line)
        },
        AutoType::Pitch => |a| {
            let g = a.checked_pop()?.as_graph(a.script_line)?;
            let ch = pop_u8(a, "channel")?;
            a.ctx.control_map.control_auto(AutoType::Pitch, ch, 0, g, a.script_line)
        },
        AutoType::Bit7 => |a| {
            let g = a.checked_pop()?.as_graph(a.script_line)?;
            let index = pop_i32(a)?;
            let ch = pop_u8(a, "channel")?;
            a.ctx.control_map.control_auto(AutoType::Bit7, ch, index, g, a.script_line)
        },
        AutoType::Bit14 => |a| {
            let g = a.checked_pop()?.as_graph(a.script_line)?;
            let index = pop_i32(a)?;
            let ch = pop_u8(a, "channel")?;
            a.ctx.control_map.control_auto(AutoType::Bit14, ch, index, g, a.script_line)
        },
        AutoType::Nrpn => |a| {
            let g = a.checked_pop()?.as_graph(a.script_line)?;
            let index = pop_i32(a)?;
            let ch = pop_u8(a, "channel")?;
            a.ctx.control_map.control_auto(AutoType::Nrpn, ch, index, g, a.script_line)
        },
        AutoType::Rpn => |a| {
            let g = a.checked_pop()?.as_graph(a.script_line)?;
            let index = pop_i32(a)?;
            let ch = pop_u8(a, "channel")?;
            a.ctx.control_map.control_auto(AutoType::Rpn, ch, index, g, a.script_line)
        },
    }
}

const SET_INCLUDE_CLOSED: OpFn = include_closed;
fn include_closed(a: &mut OpArgs) -> Result<()> {
    set_closed_op(true)(a)
}
const SET_EXCLUDE_CLOSED: OpFn = exclude_closed;
fn exclude_closed(a: &mut OpArgs) -> Result<()> {
    set_closed_op(false)(a)
}
const SET_INCLUDE_OPEN: OpFn = include_open;
fn include_open(a: &mut OpArgs) -> Result<()> {
    set_open_op(true)(a)
}
const SET_EXCLUDE_OPEN: OpFn = exclude_open;
fn exclude_open(a: &mut OpArgs) -> Result<()> {
    set_open_op(false)(a)
}

const AUTO_TEMPO: OpFn = auto_tempo;
fn auto_tempo(a: &mut OpArgs) -> Result<()> {
    auto_op(AutoType::Tempo)(a)
}
const AUTO_PRESSURE: OpFn = auto_pressure;
fn auto_pressure(a: &mut OpArgs) -> Result<()> {
    auto_op(AutoType::Pressure)(a)
}
const AUTO_PITCH: OpFn = auto_pitch;
fn auto_pitch(a: &mut OpArgs) -> Result<()> {
    auto_op(AutoType::Pitch)(a)
}
const AUTO_BIT7: OpFn = auto_bit7;
fn auto_bit7(a: &mut OpArgs) -> Result<()> {
    auto_op(AutoType::Bit7)(a)
}
const AUTO_BIT14: OpFn = auto_bit14;
fn auto_bit14(a: &mut OpArgs) -> Result<()> {
    auto_op(AutoType::Bit14)(a)
}
const AUTO_NRPN: OpFn = auto_nrpn;
fn auto_nrpn(a: &mut OpArgs) -> Result<()> {
    auto_op(AutoType::Nrpn)(a)
}
const AUTO_RPN: OpFn = auto_rpn;
fn auto_rpn(a: &mut OpArgs) -> Result<()> {
    auto_op(AutoType::Rpn)(a)
}

/// The reference builtin vocabulary. `interp/mod.rs` registers these once
/// at startup; a host embedding the library can register additional native
/// operations through the same `OpRegistry::register`.
const BUILTINS: &[(&str, OpFn)] = &[
    ("dup", op_dup),
    ("drop", op_drop),
    ("swap", op_swap),
    ("add", op_add),
    ("sub", op_sub),
    ("mul", op_mul),
    ("div", op_div),
    ("neg", op_neg),
    ("pointer_reset", op_pointer_reset),
    ("text_concat", op_text_concat),
    ("text_slice", op_text_slice),
    ("blob_from_hex", op_blob_from_hex),
    ("blob_concat", op_blob_concat),
    ("set_begin", op_set_begin),
    ("set_all", op_set_all),
    ("set_none", op_set_none),
    ("set_invert", op_set_invert),
    ("set_include", SET_INCLUDE_CLOSED),
    ("set_exclude", SET_EXCLUDE_CLOSED),
    ("set_include_open", SET_INCLUDE_OPEN),
    ("set_exclude_open", SET_EXCLUDE_OPEN),
    ("set_union", op_set_union),
    ("set_intersect", op_set_intersect),
    ("set_except", op_set_except),
    ("set_end", op_set_end),
    ("set_has", op_set_has),
    ("graph_begin", op_graph_begin),
    ("graph_const", op_graph_const),
    ("graph_ramp", op_graph_ramp),
    ("graph_derived", op_graph_derived),
    ("graph_end", op_graph_end),
    ("graph_query", op_graph_query),
    ("default_velocity_graph", op_default_velocity_graph),
    ("art_new", op_art_new),
    ("ruler_new", op_ruler_new),
    ("ruler_push", op_ruler_push),
    ("ruler_pop", op_ruler_pop),
    ("classify_art", op_classify_art),
    ("classify_ruler", op_classify_ruler),
    ("classify_velocity", op_classify_velocity),
    ("classify_channel", op_classify_channel),
    ("classify_release", op_classify_release),
    ("classify_aftertouch", op_classify_aftertouch),
    ("render", op_render),
    ("control_track", op_control_track),
    ("midi_null", op_midi_null),
    ("note_on", op_note_on),
    ("note_off", op_note_off),
    ("poly_aftertouch", op_poly_aftertouch),
    ("cc", op_cc),
    ("cc14", op_cc14),
    ("nrpn", op_nrpn),
    ("rpn", op_rpn),
    ("instrument", op_instrument),
    ("sysex", op_sysex),
    ("auto_tempo", AUTO_TEMPO),
    ("auto_pressure", AUTO_PRESSURE),
    ("auto_pitch", AUTO_PITCH),
    ("auto_bit7", AUTO_BIT7),
    ("auto_bit14", AUTO_BIT14),
    ("auto_nrpn", AUTO_NRPN),
    ("auto_rpn", AUTO_RPN),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::limits::Limits;
    use crate::nmf::StaticNmf;

    fn run(op: &str, ctx: &mut Context, stack: &mut ValueStack, nmf: &dyn NmfSource) -> Result<()> {
        let reg = OpRegistry::with_builtins();
        let groups = GroupStack::new(16);
        let mut args = OpArgs { ctx, stack, groups: &groups, nmf, script_line: -1 };
        reg.call(op, &mut args)
    }

    #[test]
    fn arithmetic_round_trip() {
        let mut ctx = Context::new(Limits::default());
        let mut stack = ValueStack::new(16);
        let nmf = StaticNmf::single_section(0);
        stack.push(Value::Integer(3), -1).unwrap();
        stack.push(Value::Integer(4), -1).unwrap();
        run("add", &mut ctx, &mut stack, &nmf).unwrap();
        assert_eq!(stack.pop(-1).unwrap(), Value::Integer(7));
    }

    #[test]
    fn set_build_round_trip() {
        let mut ctx = Context::new(Limits::default());
        let mut stack = ValueStack::new(16);
        let nmf = StaticNmf::single_section(0);
        run("set_begin", &mut ctx, &mut stack, &nmf).unwrap();
        run("set_all", &mut ctx, &mut stack, &nmf).unwrap();
        run("set_end", &mut ctx, &mut stack, &nmf).unwrap();
        let h = stack.pop(-1).unwrap().as_set(-1).unwrap();
        assert!(ctx.sets.get(h).has(42));
    }

    #[test]
    fn graph_build_and_query() {
        let mut ctx = Context::new(Limits::default());
        let mut stack = ValueStack::new(16);
        let nmf = StaticNmf::single_section(0);
        run("graph_begin", &mut ctx, &mut stack, &nmf).unwrap();
        stack.push(Value::Integer(0), -1).unwrap();
        stack.push(Value::Integer(10), -1).unwrap();
        run("graph_const", &mut ctx, &mut stack, &nmf).unwrap();
        run("graph_end", &mut ctx, &mut stack, &nmf).unwrap();
        stack.push(Value::Integer(5), -1).unwrap();
        run("graph_query", &mut ctx, &mut stack, &nmf).unwrap();
        assert_eq!(stack.pop(-1).unwrap(), Value::Integer(10));
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let mut ctx = Context::new(Limits::default());
        let mut stack = ValueStack::new(16);
        let nmf = StaticNmf::single_section(0);
        assert!(run("not_a_real_op", &mut ctx, &mut stack, &nmf).is_err());
    }
}
