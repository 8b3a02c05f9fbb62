//! The renderer (§4.7): an ordered classifier pipeline assigns per-note
//! performance parameters, `render_nmf` turns surviving NMF notes into MIDI
//! channel events, and the optional keyboard-overlap pass disambiguates
//! notes that would otherwise collide on the same (channel, key).

use crate::arena::{Arena, Handle};
use crate::artic::{Articulation, Ruler};
use crate::error::{InfraredError, Result};
use crate::graph::{Graph, GraphCache};
use crate::midi::buffer::MidiBuffer;
use crate::midi::message::ChannelMsg;
use crate::nmf::NmfSource;
use crate::pointer::{pointer_pack, MomentPart};
use crate::set::Set;

const MODULE: &str = "render";

/// The value a classifier assigns when it matches (§4.7).
#[derive(Debug, Clone, Copy)]
pub enum ClassifierValue {
    Art(Handle<Articulation>),
    Ruler(Handle<Ruler>),
    VelocityGraph(Handle<Graph>),
    Channel(u8),
    Release(i8),
    Aftertouch(bool),
}

/// `(sect_set, layer_set, art_set, value)` (§4.7). Later classifiers in the
/// pipeline override earlier ones that assign the same kind of value.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    pub sect_set: Handle<Set>,
    pub layer_set: Handle<Set>,
    pub art_set: Handle<Set>,
    pub value: ClassifierValue,
}

/// The ordered list of classifiers plus the keyboard-overlap toggle
/// (§4.7/§4.11, Open Question: off by default).
#[derive(Debug, Clone, Default)]
pub struct RenderPipeline {
    classifiers: Vec<Classifier>,
    keyboard_pass_enabled: bool,
}

impl RenderPipeline {
    pub fn new(keyboard_pass_enabled: bool) -> Self {
        Self {
            classifiers: Vec::new(),
            keyboard_pass_enabled,
        }
    }

    pub fn push(&mut self, classifier: Classifier) {
        self.classifiers.push(classifier);
    }

    pub fn keyboard_pass_enabled(&self) -> bool {
        self.keyboard_pass_enabled
    }
}

/// The renderer's intermediate per-note representation (§3). A negative
/// `eid` would denote a tombstone, but tombstoned (`dur==0`) NMF notes never
/// reach this stage — they carry only cue metadata and are dropped before
/// event-id assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrNoteEvent {
    pub eid: i32,
    pub t_subq: i32,
    pub dur_subq: i32,
    pub key: u8,
    pub channel: u8,
    pub release: i8,
    pub aftertouch_enabled: bool,
    pub velocity_graph: Handle<Graph>,
}

struct NoteParams {
    art: Articulation,
    ruler: Ruler,
    velocity_graph: Handle<Graph>,
    channel: u8,
    release: i8,
    aftertouch: bool,
}

fn classify(
    pipeline: &RenderPipeline,
    sets: &Arena<Set>,
    artics: &Arena<Articulation>,
    rulers: &Arena<Ruler>,
    default_velocity: Handle<Graph>,
    sect: i32,
    layer_i: i32,
    art: i32,
) -> NoteParams {
    let mut params = NoteParams {
        art: Articulation::default_identity(),
        ruler: Ruler::default_ruler(),
        velocity_graph: default_velocity,
        channel: 1,
        release: -1,
        aftertouch: false,
    };
    for c in &pipeline.classifiers {
        let matches = sets.get(c.sect_set).has(sect) && sets.get(c.layer_set).has(layer_i) && sets.get(c.art_set).has(art);
        if !matches {
            continue;
        }
        match c.value {
            ClassifierValue::Art(h) => params.art = *artics.get(h),
            ClassifierValue::Ruler(h) => params.ruler = *rulers.get(h),
            ClassifierValue::VelocityGraph(h) => params.velocity_graph = h,
            ClassifierValue::Channel(ch) => params.channel = ch,
            ClassifierValue::Release(r) => params.release = r,
            ClassifierValue::Aftertouch(on) => params.aftertouch = on,
        }
    }
    params
}

#[allow(clippy::too_many_arguments)]
fn build_events(
    nmf: &dyn NmfSource,
    pipeline: &RenderPipeline,
    sets: &Arena<Set>,
    artics: &Arena<Articulation>,
    rulers: &Arena<Ruler>,
    graphs: &mut Arena<Graph>,
    graph_cache: &mut GraphCache,
    script_line: i32,
) -> Result<Vec<IrNoteEvent>> {
    let default_velocity = graph_cache.intern_const(64, graphs)?;
    let mut events = Vec::new();
    let mut next_eid: i32 = 0;

    for note in nmf.notes() {
        if note.dur == 0 {
            continue;
        }
        let params = classify(pipeline, sets, artics, rulers, default_velocity, note.sect, note.layer_i, note.art);

        let (t_subq, dur_subq) = if note.dur > 0 {
            let offset = (note.t as i64)
                .checked_mul(8)
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| InfraredError::input(MODULE, script_line, "note offset overflow"))?;
            let dur = params.art.transform(note.dur, script_line)?;
            (offset, dur)
        } else {
            let beat_subq = (note.t as i64)
                .checked_mul(8)
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| InfraredError::input(MODULE, script_line, "grace beat offset overflow"))?;
            let offset = params.ruler.grace_offset(beat_subq, note.dur, script_line)?;
            (offset, params.ruler.duration())
        };

        let key = note
            .pitch
            .checked_add(60)
            .filter(|k| (0..=127).contains(k))
            .ok_or_else(|| InfraredError::input(MODULE, script_line, format!("pitch {} maps outside key range 0..=127", note.pitch)))?
            as u8;

        next_eid = next_eid
            .checked_add(1)
            .ok_or_else(|| InfraredError::input(MODULE, script_line, "event id overflow"))?;

        events.push(IrNoteEvent {
            eid: next_eid,
            t_subq,
            dur_subq,
            key,
            channel: params.channel,
            release: params.release,
            aftertouch_enabled: params.aftertouch,
            velocity_graph: params.velocity_graph,
        });
    }
    Ok(events)
}

/// The keyboard-overlap pass (§4.7, Open Question: implemented, configurable,
/// default off). Sorts by `(channel, key, time asc, duration desc, eid
/// desc)`, collapses same-`(channel, key, time)` runs to the first (longest,
/// latest-defined) survivor, then truncates each event's duration so the
/// next event on the same key starts no earlier than this one's release.
fn keyboard_overlap_pass(mut events: Vec<IrNoteEvent>) -> Vec<IrNoteEvent> {
    events.sort_by(|a, b| {
        a.channel
            .cmp(&b.channel)
            .then(a.key.cmp(&b.key))
            .then(a.t_subq.cmp(&b.t_subq))
            .then(b.dur_subq.cmp(&a.dur_subq))
            .then(b.eid.cmp(&a.eid))
    });

    let mut collapsed: Vec<IrNoteEvent> = Vec::with_capacity(events.len());
    for event in events {
        if let Some(last) = collapsed.last() {
            if last.channel == event.channel && last.key == event.key && last.t_subq == event.t_subq {
                continue;
            }
        }
        collapsed.push(event);
    }

    for i in 0..collapsed.len() {
        if let Some(next) = collapsed.get(i + 1).copied() {
            let current = collapsed[i];
            if next.channel == current.channel && next.key == current.key {
                let release_time = current.t_subq + current.dur_subq;
                if next.t_subq < release_time {
                    collapsed[i].dur_subq = (next.t_subq - current.t_subq).max(1);
                }
            }
        }
    }
    collapsed
}

fn emit_events(buffer: &mut MidiBuffer, graphs: &Arena<Graph>, events: &[IrNoteEvent], script_line: i32) -> Result<()> {
    for event in events {
        let graph = graphs.get(event.velocity_graph);
        let onset_moment = pointer_pack(event.t_subq, MomentPart::Middle, script_line)?;
        let velocity = graph.query(onset_moment).clamp(1, 127) as u8;
        buffer.push_channel(onset_moment, false, event.channel, ChannelMsg::NoteOn { key: event.key, vel: velocity });

        let release_subq = event
            .t_subq
            .checked_add(event.dur_subq)
            .ok_or_else(|| InfraredError::input(MODULE, script_line, "note release offset overflow"))?;
        let release_moment = pointer_pack(release_subq, MomentPart::Start, script_line)?;
        if event.release == -1 {
            buffer.push_channel(release_moment, false, event.channel, ChannelMsg::NoteOn { key: event.key, vel: 0 });
        } else {
            buffer.push_channel(
                release_moment,
                false,
                event.channel,
                ChannelMsg::NoteOff { key: event.key, vel: event.release as u8 },
            );
        }

        if event.aftertouch_enabled && event.dur_subq >= 2 {
            let start_bound = pointer_pack(event.t_subq + 1, MomentPart::Start, script_line)?;
            let end_bound = pointer_pack(event.t_subq + event.dur_subq - 1, MomentPart::End, script_line)?;
            let mut points = Vec::new();
            graph.track(start_bound, Some(end_bound), Some(velocity as i32), |t, v| points.push((t, v)));
            for (t, v) in points {
                let pressure = v.clamp(0, 127) as u8;
                buffer.push_channel(t, false, event.channel, ChannelMsg::PolyAftertouch { key: event.key, pressure });
            }
        }
    }
    Ok(())
}

/// `render_nmf`: builds IR events from `nmf` through the classifier
/// pipeline, optionally runs the keyboard-overlap pass, and emits the
/// resulting channel events into `buffer`.
#[allow(clippy::too_many_arguments)]
pub fn render_nmf(
    nmf: &dyn NmfSource,
    pipeline: &RenderPipeline,
    sets: &Arena<Set>,
    artics: &Arena<Articulation>,
    rulers: &Arena<Ruler>,
    graphs: &mut Arena<Graph>,
    graph_cache: &mut GraphCache,
    buffer: &mut MidiBuffer,
    script_line: i32,
) -> Result<Vec<IrNoteEvent>> {
    let mut events = build_events(nmf, pipeline, sets, artics, rulers, graphs, graph_cache, script_line)?;
    if pipeline.keyboard_pass_enabled() {
        events = keyboard_overlap_pass(events);
    }
    emit_events(buffer, graphs, &events, script_line)?;
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nmf::{NmfNoteIn, StaticNmf};
    use crate::set::SetBuilder;

    fn everything_set(sets: &mut Arena<Set>) -> Handle<Set> {
        let mut b = SetBuilder::new();
        b.all();
        sets.push(b.end(16_384, -1).unwrap()).unwrap()
    }

    #[test]
    fn keyboard_overlap_pass_removes_overlap() {
        let mut graphs: Arena<Graph> = Arena::new("graph", 16_384);
        let mut cache = GraphCache::new();
        let velocity_graph = cache.intern_const(64, &mut graphs).unwrap();
        let events = vec![
            IrNoteEvent {
                eid: 1,
                t_subq: 0,
                dur_subq: 100,
                key: 60,
                channel: 1,
                release: -1,
                aftertouch_enabled: false,
                velocity_graph,
            },
            IrNoteEvent {
                eid: 2,
                t_subq: 50,
                dur_subq: 100,
                key: 60,
                channel: 1,
                release: -1,
                aftertouch_enabled: false,
                velocity_graph,
            },
        ];
        let result = keyboard_overlap_pass(events);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].t_subq + result[0].dur_subq, result[1].t_subq);
    }

    #[test]
    fn classifier_override_applies_later_classifier() {
        let mut sets: Arena<Set> = Arena::new("set", 16_384);
        let mut artics: Arena<Articulation> = Arena::new("artic", 16_384);
        let rulers: Arena<Ruler> = Arena::new("artic", 16_384);
        let mut graphs: Arena<Graph> = Arena::new("graph", 16_384);
        let mut cache = GraphCache::new();

        let all = everything_set(&mut sets);
        let custom_art = artics.push(Articulation::new(1, 1, 8, 0, -1).unwrap()).unwrap();

        let mut pipeline = RenderPipeline::new(false);
        pipeline.push(Classifier {
            sect_set: all,
            layer_set: all,
            art_set: all,
            value: ClassifierValue::Channel(3),
        });
        pipeline.push(Classifier {
            sect_set: all,
            layer_set: all,
            art_set: all,
            value: ClassifierValue::Art(custom_art),
        });

        let nmf = StaticNmf::new(
            vec![0],
            96,
            vec![NmfNoteIn { t: 0, dur: 4, pitch: 0, art: 0, sect: 0, layer_i: 0 }],
        )
        .unwrap();

        let mut buffer = MidiBuffer::new();
        let events = render_nmf(&nmf, &pipeline, &sets, &artics, &rulers, &mut graphs, &mut cache, &mut buffer, -1).unwrap();
        assert_eq!(events[0].channel, 3);
        assert_eq!(events[0].key, 60);
    }

    #[test]
    fn tombstoned_notes_do_not_produce_events() {
        let mut sets: Arena<Set> = Arena::new("set", 16_384);
        let artics: Arena<Articulation> = Arena::new("artic", 16_384);
        let rulers: Arena<Ruler> = Arena::new("artic", 16_384);
        let mut graphs: Arena<Graph> = Arena::new("graph", 16_384);
        let mut cache = GraphCache::new();
        let _ = everything_set(&mut sets);
        let pipeline = RenderPipeline::new(false);
        let nmf = StaticNmf::new(
            vec![0],
            96,
            vec![NmfNoteIn { t: 0, dur: 0, pitch: 0, art: 0, sect: 0, layer_i: 0 }],
        )
        .unwrap();
        let mut buffer = MidiBuffer::new();
        let events = render_nmf(&nmf, &pipeline, &sets, &artics, &rulers, &mut graphs, &mut cache, &mut buffer, -1).unwrap();
        assert!(events.is_empty());
    }
}
