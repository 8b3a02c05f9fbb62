//! End-to-end tests driving the interpreter against hand-built NMF/script
//! fixtures, covering the worked scenarios in the full form (classify,
//! render, control, auto-track) rather than exercising each module in
//! isolation.

use infrared::context::Context;
use infrared::interp::Interpreter;
use infrared::limits::Limits;
use infrared::midi::smf;
use infrared::nmf::{NmfNoteIn, StaticNmf};
use infrared::script::SourceTokenizer;

fn one_note_nmf() -> StaticNmf {
    StaticNmf::new(
        vec![0],
        96,
        vec![NmfNoteIn {
            t: 0,
            dur: 96,
            pitch: 0,
            art: 0,
            sect: 0,
            layer_i: 0,
        }],
    )
    .unwrap()
}

fn compile(script: &str, nmf: &StaticNmf) -> Vec<u8> {
    let mut ctx = Context::new(Limits::default());
    let mut interp = Interpreter::new(&ctx);
    let mut tokenizer = SourceTokenizer::new(script);
    interp.run(&mut tokenizer, &mut ctx, nmf).expect("script should run without error");
    smf::serialize(&ctx.midi).expect("resulting buffer should serialize")
}

/// Classifies every note with the default velocity graph, renders the
/// single note through the pipeline, and checks the resulting SMF carries a
/// NoteOn/NoteOff pair.
#[test]
fn classify_and_render_single_note() {
    let nmf = one_note_nmf();
    let script = r#"
        var allsect
        var alllayer
        var allart
        var vel

        set_begin set_all set_end allsect=
        set_begin set_all set_end alllayer=
        set_begin set_all set_end allart=
        default_velocity_graph vel=

        @allsect @alllayer @allart @vel classify_velocity
        render
    "#;
    let bytes = compile(script, &nmf);
    let parsed = midly::Smf::parse(&bytes).expect("should round-trip through midly");
    let events: Vec<_> = parsed.tracks[0]
        .iter()
        .filter(|e| matches!(e.kind, midly::TrackEventKind::Midi { .. }))
        .collect();
    let note_ons = events
        .iter()
        .filter(|e| matches!(e.kind, midly::TrackEventKind::Midi { message: midly::MidiMessage::NoteOn { .. }, .. }))
        .count();
    let note_offs = events
        .iter()
        .filter(|e| match e.kind {
            midly::TrackEventKind::Midi { message: midly::MidiMessage::NoteOff { .. }, .. } => true,
            midly::TrackEventKind::Midi { message: midly::MidiMessage::NoteOn { vel, .. }, .. } => vel.as_int() == 0,
            _ => false,
        })
        .count();
    assert_eq!(note_ons, 1);
    assert!(note_offs >= 1);
}

/// Scenario 6 (§8): `control_instrument` on channel 2 with bank 129,
/// program 5 emits `CC#0=1`, `CC#32=0`, `PC=4`, driven entirely through the
/// script surface rather than calling `control::control_instrument`
/// directly.
#[test]
fn scenario_bank_select_via_script() {
    let nmf = one_note_nmf();
    let script = "var p 0s p= @p 2 129 5 instrument";
    let bytes = compile(script, &nmf);
    let parsed = midly::Smf::parse(&bytes).unwrap();
    let controllers: Vec<_> = parsed.tracks[0]
        .iter()
        .filter_map(|e| match e.kind {
            midly::TrackEventKind::Midi {
                message: midly::MidiMessage::Controller { controller, value },
                ..
            } => Some((controller.as_int(), value.as_int())),
            _ => None,
        })
        .collect();
    assert_eq!(controllers, vec![(0, 1), (32, 0)]);
    let programs: Vec<_> = parsed.tracks[0]
        .iter()
        .filter_map(|e| match e.kind {
            midly::TrackEventKind::Midi {
                message: midly::MidiMessage::ProgramChange { program },
                ..
            } => Some(program.as_int()),
            _ => None,
        })
        .collect();
    assert_eq!(programs, vec![4]);
}

/// Scenario 5 (§8): a ramp from 1,000,000 to 250,000 microseconds per
/// quarter note across 96 quanta (768 subquanta), then constant, tracked by
/// `auto_tempo` and drained into tempo meta-events by `control_track`.
#[test]
fn scenario_auto_tempo_track_via_script() {
    let nmf = one_note_nmf();
    let script = r#"
        var p
        0s p=

        @p 1 60 100 note_on
        @p 96q 1 60 0 note_off

        graph_begin
        0 1000000 250000 96 0 graph_ramp
        768 250000 graph_const
        graph_end
        auto_tempo

        control_track
    "#;
    let bytes = compile(script, &nmf);
    let parsed = midly::Smf::parse(&bytes).unwrap();
    let tempo_events = parsed
        .tracks[0]
        .iter()
        .filter(|e| matches!(e.kind, midly::TrackEventKind::Meta(midly::MetaMessage::Tempo(_))))
        .count();
    assert!(tempo_events >= 2, "expected a ramp start point plus the trailing constant point");
}

/// A script that fails partway through must not leave the buffer in a
/// state the caller can mistake for success; every scope-specific capacity
/// and underflow check is exercised per-module, this just checks the
/// top-level `Interpreter::run` surfaces the error instead of swallowing it.
#[test]
fn unbalanced_group_is_reported_as_an_error() {
    let nmf = one_note_nmf();
    let mut ctx = Context::new(Limits::default());
    let mut interp = Interpreter::new(&ctx);
    let mut tokenizer = SourceTokenizer::new("[ 1 2 ]");
    assert!(interp.run(&mut tokenizer, &mut ctx, &nmf).is_err());
}

/// The sum of a serialized track's delta-times always equals the observed
/// subquantum range times three, regardless of whether events arrived via
/// direct control calls or through the renderer.
#[test]
fn delta_times_match_observed_range_end_to_end() {
    let nmf = one_note_nmf();
    let script = r#"
        var allsect
        var alllayer
        var allart
        var vel

        set_begin set_all set_end allsect=
        set_begin set_all set_end alllayer=
        set_begin set_all set_end allart=
        default_velocity_graph vel=

        @allsect @alllayer @allart @vel classify_velocity
        render
    "#;
    let mut ctx = Context::new(Limits::default());
    let mut interp = Interpreter::new(&ctx);
    let mut tokenizer = SourceTokenizer::new(script);
    interp.run(&mut tokenizer, &mut ctx, &nmf).unwrap();
    let expected_span = (ctx.midi.range_upper() - ctx.midi.range_lower()) * 3;
    let bytes = smf::serialize(&ctx.midi).unwrap();
    let parsed = midly::Smf::parse(&bytes).unwrap();
    let sum: u32 = parsed.tracks[0].iter().map(|e| e.delta.as_int()).sum();
    assert_eq!(sum, expected_span as u32);
}
