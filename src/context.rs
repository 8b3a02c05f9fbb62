//! The single owning context (§9, Design Notes — "global singletons"):
//! every arena, accumulator, and script-visible store lives here, passed by
//! `&mut` into every operation instead of being reached through module
//! globals.

use crate::arena::{Arena, Handle};
use crate::artic::{Articulation, Ruler};
use crate::control::ControlMap;
use crate::error::{InfraredError, Result};
use crate::graph::{Graph, GraphBuilder, GraphCache};
use crate::limits::Limits;
use crate::midi::buffer::MidiBuffer;
use crate::render::RenderPipeline;
use crate::set::{Set, SetBuilder};
use crate::value::{Blob, Text};

const MODULE: &str = "context";

/// Which of the two two-phase accumulators (graph, set) currently has an
/// open builder. MIDI buffer, render pipeline, and control map are each a
/// single instance that accepts pushes for the whole compilation rather
/// than a begin/end builder, so they need no separate flag (§5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBuild {
    None,
    Graph,
    Set,
}

/// Owns every arena and accumulator for one compilation (§5: single-
/// threaded, process-wide, lazily initialized, explicitly torn down).
pub struct Context {
    pub texts: Arena<Text>,
    pub blobs: Arena<Blob>,
    pub graphs: Arena<Graph>,
    pub sets: Arena<Set>,
    pub artics: Arena<Articulation>,
    pub rulers: Arena<Ruler>,
    pub graph_cache: GraphCache,
    pub midi: MidiBuffer,
    pub control_map: ControlMap,
    pub render_pipeline: RenderPipeline,
    pub ruler_stack: Vec<Ruler>,
    pub limits: Limits,
    default_velocity: Option<Handle<Graph>>,
    open_build: OpenBuild,
    graph_builder: Option<GraphBuilder>,
    set_builder: Option<SetBuilder>,
}

impl Context {
    pub fn new(limits: Limits) -> Self {
        Self {
            texts: Arena::new("value", limits.bank),
            blobs: Arena::new("value", limits.bank),
            graphs: Arena::new("graph", limits.bank),
            sets: Arena::new("set", limits.bank),
            artics: Arena::new("artic", limits.bank),
            rulers: Arena::new("artic", limits.bank),
            graph_cache: GraphCache::new(),
            midi: MidiBuffer::new(),
            control_map: ControlMap::new(),
            render_pipeline: RenderPipeline::new(false),
            ruler_stack: Vec::new(),
            limits,
            default_velocity: None,
            open_build: OpenBuild::None,
            graph_builder: None,
            set_builder: None,
        }
    }

    /// `current ruler` (§4.8): top of the ruler stack, or the lazy default.
    pub fn current_ruler(&self) -> Ruler {
        self.ruler_stack.last().copied().unwrap_or_else(Ruler::default_ruler)
    }

    pub fn push_ruler(&mut self, ruler: Ruler, script_line: i32) -> Result<()> {
        if self.ruler_stack.len() >= self.limits.ruler_stack {
            return Err(InfraredError::capacity(MODULE, script_line, format!("ruler stack capacity {} exceeded", self.limits.ruler_stack)));
        }
        self.ruler_stack.push(ruler);
        Ok(())
    }

    pub fn pop_ruler(&mut self, script_line: i32) -> Result<Ruler> {
        self.ruler_stack
            .pop()
            .ok_or_else(|| InfraredError::state(MODULE, script_line, "ruler stack underflow"))
    }

    /// The constant-64 velocity graph used by the renderer when no
    /// classifier assigns one (§4.7); created once, lazily, and interned.
    pub fn default_velocity_graph(&mut self, script_line: i32) -> Result<Handle<Graph>> {
        if let Some(h) = self.default_velocity {
            return Ok(h);
        }
        let h = self.graph_cache.intern_const(64, &mut self.graphs)?;
        self.default_velocity = Some(h);
        let _ = script_line;
        Ok(h)
    }

    pub fn begin_graph_build(&mut self, script_line: i32) -> Result<()> {
        if self.open_build != OpenBuild::None {
            return Err(InfraredError::state(MODULE, script_line, "another accumulator is already open"));
        }
        self.open_build = OpenBuild::Graph;
        self.graph_builder = Some(GraphBuilder::new(self.limits.graph_nodes));
        Ok(())
    }

    pub fn graph_builder_mut(&mut self, script_line: i32) -> Result<&mut GraphBuilder> {
        self.graph_builder
            .as_mut()
            .ok_or_else(|| InfraredError::state(MODULE, script_line, "no graph accumulator is open"))
    }

    pub fn end_graph_build(&mut self, script_line: i32) -> Result<Handle<Graph>> {
        let builder = self
            .graph_builder
            .take()
            .ok_or_else(|| InfraredError::state(MODULE, script_line, "no graph accumulator is open"))?;
        self.open_build = OpenBuild::None;
        builder.end(&mut self.graphs, &mut self.graph_cache, script_line)
    }

    pub fn begin_set_build(&mut self, script_line: i32) -> Result<()> {
        if self.open_build != OpenBuild::None {
            return Err(InfraredError::state(MODULE, script_line, "another accumulator is already open"));
        }
        self.open_build = OpenBuild::Set;
        self.set_builder = Some(SetBuilder::new());
        Ok(())
    }

    pub fn set_builder_mut(&mut self, script_line: i32) -> Result<&mut SetBuilder> {
        self.set_builder
            .as_mut()
            .ok_or_else(|| InfraredError::state(MODULE, script_line, "no set accumulator is open"))
    }

    /// Whether the graph or set accumulator currently has an open builder
    /// ("At script end: ... no open set/graph accumulator").
    pub fn has_open_build(&self) -> bool {
        self.open_build != OpenBuild::None
    }

    pub fn end_set_build(&mut self, script_line: i32) -> Result<Handle<Set>> {
        let builder = self
            .set_builder
            .take()
            .ok_or_else(|| InfraredError::state(MODULE, script_line, "no set accumulator is open"))?;
        self.open_build = OpenBuild::None;
        let set = builder.end(self.limits.set_entries, script_line)?;
        self.sets.push(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_accumulator_may_be_open_at_a_time() {
        let mut ctx = Context::new(Limits::default());
        ctx.begin_graph_build(-1).unwrap();
        assert!(ctx.begin_set_build(-1).is_err());
        ctx.end_graph_build(-1).unwrap_err();
    }

    #[test]
    fn graph_build_closes_and_reopens() {
        let mut ctx = Context::new(Limits::default());
        ctx.begin_graph_build(-1).unwrap();
        ctx.graph_builder_mut(-1).unwrap().add_const(0, 10, -1).unwrap();
        ctx.end_graph_build(-1).unwrap();
        ctx.begin_set_build(-1).unwrap();
        ctx.set_builder_mut(-1).unwrap().all();
        ctx.end_set_build(-1).unwrap();
    }

    #[test]
    fn default_velocity_graph_is_cached() {
        let mut ctx = Context::new(Limits::default());
        let a = ctx.default_velocity_graph(-1).unwrap();
        let b = ctx.default_velocity_graph(-1).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ruler_stack_defaults_when_empty() {
        let ctx = Context::new(Limits::default());
        assert_eq!(ctx.current_ruler().duration(), Ruler::default_ruler().duration());
    }
}
