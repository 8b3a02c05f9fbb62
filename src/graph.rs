//! The graph accumulator (§4.4): assembles a piecewise-linear or
//! piecewise-log function of time out of constant, ramp, and derived
//! regions fed in one after another, then freezes it into an immutable
//! [`Graph`]. Each `add_*` call resolves whatever region was buffered
//! against the new region's starting offset before buffering the new one;
//! `end` resolves the last buffered region against "no next region."

use std::collections::HashMap;

use crate::arena::{Arena, Handle};
use crate::error::{InfraredError, Result};

const MODULE: &str = "graph";

/// An immutable piecewise function of time (§3): nodes in strictly
/// ascending moment order, never two adjacent nodes with equal value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    nodes: Vec<(i32, i32)>,
}

impl Graph {
    pub fn nodes(&self) -> &[(i32, i32)] {
        &self.nodes
    }

    /// `graph_query(t)`: value of the latest node with moment `<= t`, or the
    /// first node's value if `t` precedes every node.
    pub fn query(&self, t: i32) -> i32 {
        query_nodes(&self.nodes, t)
    }

    /// `graph_track`: emits the node at `t_start` (skipped if its value
    /// equals `v_start`), then every subsequent node up to and including
    /// `t_end`.
    pub fn track(&self, t_start: i32, t_end: Option<i32>, v_start: Option<i32>, mut callback: impl FnMut(i32, i32)) {
        let first_value = self.query(t_start);
        if v_start != Some(first_value) {
            callback(t_start, first_value);
        }
        for &(t, v) in &self.nodes {
            if t <= t_start {
                continue;
            }
            if let Some(end) = t_end {
                if t > end {
                    break;
                }
            }
            callback(t, v);
        }
    }
}

fn query_nodes(nodes: &[(i32, i32)], t: i32) -> i32 {
    let idx = nodes.partition_point(|&(node_t, _)| node_t <= t);
    if idx == 0 {
        nodes[0].1
    } else {
        nodes[idx - 1].1
    }
}

/// Interns single-node (constant-value) graphs by value, so that e.g. the
/// renderer's default velocity graph doesn't allocate a fresh arena slot
/// every time it is requested.
#[derive(Debug, Default)]
pub struct GraphCache {
    consts: HashMap<i32, Handle<Graph>>,
}

impl GraphCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns (or reuses) the single-node constant-value graph for
    /// `value`. Public so the renderer can materialize its default
    /// constant-64 velocity graph on demand.
    pub fn intern_const(&mut self, value: i32, arena: &mut Arena<Graph>) -> Result<Handle<Graph>> {
        if let Some(&handle) = self.consts.get(&value) {
            return Ok(handle);
        }
        let handle = arena.push(Graph {
            nodes: vec![(0, value)],
        })?;
        self.consts.insert(value, handle);
        Ok(handle)
    }
}

#[derive(Debug, Clone)]
enum PendingRegion {
    Empty,
    Const {
        t: i32,
        value: i32,
    },
    Ramp {
        t_start: i32,
        a: i32,
        b: i32,
        step: i32,
        log: bool,
    },
    Derived {
        t_start: i32,
        t_src: i32,
        source_nodes: Vec<(i32, i32)>,
        num: i32,
        den: i32,
        c: i32,
        min_val: i32,
        max_val: i32,
    },
}

/// The open-build accumulator (§3, §5: at most one open at a time, enforced
/// by the owning context rather than here).
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    pending: PendingRegion,
    nodes: Vec<(i32, i32)>,
    cap: usize,
}

impl GraphBuilder {
    /// `cap` is the active `Limits::graph_nodes`.
    pub fn new(cap: usize) -> Self {
        Self {
            pending: PendingRegion::Empty,
            nodes: Vec::new(),
            cap,
        }
    }

    fn push_node(&mut self, t: i32, value: i32, script_line: i32) -> Result<()> {
        if value < 0 {
            return Err(InfraredError::constraint(
                MODULE,
                script_line,
                "graph node value must be >= 0",
            ));
        }
        if let Some(&(last_t, last_v)) = self.nodes.last() {
            if t <= last_t {
                return Err(InfraredError::constraint(
                    MODULE,
                    script_line,
                    format!("graph nodes must be strictly ascending (t={t} after t={last_t})"),
                ));
            }
            if last_v == value {
                return Ok(());
            }
        }
        if self.nodes.len() >= self.cap {
            return Err(InfraredError::capacity(
                MODULE,
                script_line,
                format!("graph node count exceeds {}", self.cap),
            ));
        }
        self.nodes.push((t, value));
        Ok(())
    }

    fn resolve(&mut self, next_start: Option<i32>, script_line: i32) -> Result<()> {
        let pending = std::mem::replace(&mut self.pending, PendingRegion::Empty);
        match pending {
            PendingRegion::Empty => Ok(()),
            PendingRegion::Const { t, value } => self.push_node(t, value, script_line),
            PendingRegion::Ramp { t_start, a, b, step, log } => {
                self.resolve_ramp(t_start, a, b, step, log, next_start, script_line)
            }
            PendingRegion::Derived {
                t_start,
                t_src,
                source_nodes,
                num,
                den,
                c,
                min_val,
                max_val,
            } => self.resolve_derived(
                t_start, t_src, &source_nodes, num, den, c, min_val, max_val, next_start, script_line,
            ),
        }
    }

    fn resolve_ramp(
        &mut self,
        t_start: i32,
        a: i32,
        b: i32,
        step: i32,
        log: bool,
        next_start: Option<i32>,
        script_line: i32,
    ) -> Result<()> {
        if a == b {
            return self.push_node(t_start, a, script_line);
        }
        let Some(t_next) = next_start else {
            return Err(InfraredError::constraint(
                MODULE,
                script_line,
                "ramp region requires a following region",
            ));
        };
        self.push_node(t_start, a, script_line)?;
        let base = t_start.div_euclid(step) * step;
        let mut t_step = base + step;
        while t_step < t_next {
            if t_step > t_start {
                let u = ((t_step - t_start) as f64 / (t_next - t_start) as f64).clamp(0.0, 1.0);
                let v = ramp_value(a, b, u, log);
                self.push_node(t_step, v, script_line)?;
            }
            t_step += step;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_derived(
        &mut self,
        t_start: i32,
        t_src: i32,
        source_nodes: &[(i32, i32)],
        num: i32,
        den: i32,
        c: i32,
        min_val: i32,
        max_val: i32,
        next_start: Option<i32>,
        script_line: i32,
    ) -> Result<()> {
        let start_value = query_nodes(source_nodes, t_src);
        self.push_node(t_start, transform_value(start_value, num, den, c, min_val, max_val, script_line)?, script_line)?;

        let bound = next_start.and_then(|t_next| t_src.checked_add(t_next - t_start));
        for &(src_t, src_v) in source_nodes {
            if src_t <= t_src {
                continue;
            }
            if let Some(b) = bound {
                if src_t > b {
                    break;
                }
            }
            let out_t = t_start
                .checked_add(src_t - t_src)
                .ok_or_else(|| InfraredError::input(MODULE, script_line, "derived graph offset overflow"))?;
            let out_v = transform_value(src_v, num, den, c, min_val, max_val, script_line)?;
            self.push_node(out_t, out_v, script_line)?;
        }
        Ok(())
    }

    /// `add_const`: resolves the previously buffered region against `t`,
    /// then buffers a constant region.
    pub fn add_const(&mut self, t: i32, value: i32, script_line: i32) -> Result<()> {
        self.resolve(Some(t), script_line)?;
        self.pending = PendingRegion::Const { t, value };
        Ok(())
    }

    /// `add_ramp`: linear (`log=false`) or logarithmic (`log=true`) ramp
    /// from `a` to `b` stepping by `step > 0` subquanta.
    pub fn add_ramp(&mut self, t_start: i32, a: i32, b: i32, step: i32, log: bool, script_line: i32) -> Result<()> {
        if step <= 0 {
            return Err(InfraredError::constraint(MODULE, script_line, "ramp step must be > 0"));
        }
        if a < 0 || b < 0 {
            return Err(InfraredError::constraint(MODULE, script_line, "ramp endpoints must be >= 0"));
        }
        self.resolve(Some(t_start), script_line)?;
        self.pending = PendingRegion::Ramp { t_start, a, b, step, log };
        Ok(())
    }

    /// `add_derived`: copies and transforms nodes from `source` starting at
    /// `t_src`, as `clamp((v*num)/den + c, min_val, max_val)` (`max_val ==
    /// -1` means unclamped above).
    #[allow(clippy::too_many_arguments)]
    pub fn add_derived(
        &mut self,
        t_start: i32,
        t_src: i32,
        source: &Graph,
        num: i32,
        den: i32,
        c: i32,
        min_val: i32,
        max_val: i32,
        script_line: i32,
    ) -> Result<()> {
        if den == 0 {
            return Err(InfraredError::constraint(MODULE, script_line, "derived graph denominator must be nonzero"));
        }
        self.resolve(Some(t_start), script_line)?;
        self.pending = PendingRegion::Derived {
            t_start,
            t_src,
            source_nodes: source.nodes.clone(),
            num,
            den,
            c,
            min_val,
            max_val,
        };
        Ok(())
    }

    /// `end`: resolves the final buffered region against "no next region"
    /// and returns a handle to the (possibly interned) immutable graph.
    pub fn end(mut self, arena: &mut Arena<Graph>, cache: &mut GraphCache, script_line: i32) -> Result<Handle<Graph>> {
        self.resolve(None, script_line)?;
        if self.nodes.is_empty() {
            return Err(InfraredError::constraint(MODULE, script_line, "graph has no nodes"));
        }
        log::debug!("graph_end: {} node(s)", self.nodes.len());
        if self.nodes.len() == 1 {
            return cache.intern_const(self.nodes[0].1, arena);
        }
        arena.push(Graph { nodes: self.nodes })
    }
}

fn ramp_value(a: i32, b: i32, u: f64, log: bool) -> i32 {
    let v = if log {
        let la = ((a + 1) as f64).ln();
        let lb = ((b + 1) as f64).ln();
        (la + u * (lb - la)).exp() - 1.0
    } else {
        a as f64 + u * (b as f64 - a as f64)
    };
    v.floor() as i32
}

fn transform_value(v: i32, num: i32, den: i32, c: i32, min_val: i32, max_val: i32, script_line: i32) -> Result<i32> {
    let overflow = || InfraredError::input(MODULE, script_line, "derived graph transform overflow");
    let scaled = (v as i64).checked_mul(num as i64).ok_or_else(overflow)?;
    let divided = scaled.checked_div(den as i64).ok_or_else(overflow)?;
    let shifted = divided.checked_add(c as i64).ok_or_else(overflow)?;
    let mut r = shifted.max(min_val as i64);
    if max_val != -1 {
        r = r.min(max_val as i64);
    }
    i32::try_from(r).map_err(|_| overflow())
}
