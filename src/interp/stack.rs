//! The value stack and the grouping stack that sits beside it (§4.8,
//! §4.9). Grouping is a simple index: `begin_group` remembers the current
//! depth, `end_group` checks exactly one value was produced since, then
//! collapses the marker away.

use crate::error::{InfraredError, Result};
use crate::limits::MAX_GROUPS;
use crate::value::Value;

const MODULE: &str = "stack";

/// The interpreter's operand stack, bounded at `cap` entries (§5).
#[derive(Debug, Default)]
pub struct ValueStack {
    values: Vec<Value>,
    cap: usize,
}

impl ValueStack {
    pub fn new(cap: usize) -> Self {
        Self { values: Vec::new(), cap }
    }

    pub fn push(&mut self, value: Value, script_line: i32) -> Result<()> {
        if self.values.len() >= self.cap {
            return Err(InfraredError::capacity(MODULE, script_line, format!("value stack capacity {} exceeded", self.cap)));
        }
        self.values.push(value);
        Ok(())
    }

    pub fn pop(&mut self, script_line: i32) -> Result<Value> {
        self.values
            .pop()
            .ok_or_else(|| InfraredError::state(MODULE, script_line, "value stack underflow"))
    }

    pub fn peek(&self, script_line: i32) -> Result<&Value> {
        self.values
            .last()
            .ok_or_else(|| InfraredError::state(MODULE, script_line, "value stack is empty"))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Grouping markers (§4.9): each entry records the value-stack depth at
/// `begin_group` time. Bounded separately from the value stack since groups
/// can nest much shallower in practice but still need their own limit.
#[derive(Debug, Default)]
pub struct GroupStack {
    marks: Vec<usize>,
    cap: usize,
}

impl GroupStack {
    pub fn new(cap: usize) -> Self {
        Self { marks: Vec::new(), cap }
    }

    pub fn begin(&mut self, depth: usize, script_line: i32) -> Result<()> {
        if self.marks.len() >= self.cap {
            return Err(InfraredError::capacity(MODULE, script_line, format!("group stack capacity {} exceeded", self.cap)));
        }
        self.marks.push(depth);
        Ok(())
    }

    /// Pops the innermost marker, requiring the value stack to have exactly
    /// one more entry than it did at `begin_group` time (§4.9).
    pub fn end(&mut self, current_depth: usize, script_line: i32) -> Result<()> {
        let mark = self
            .marks
            .pop()
            .ok_or_else(|| InfraredError::state(MODULE, script_line, "end_group without a matching begin_group"))?;
        if current_depth != mark + 1 {
            return Err(InfraredError::constraint(
                MODULE,
                script_line,
                format!("end_group requires exactly one value on the stack since begin_group, found {}", current_depth as i64 - mark as i64),
            ));
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.marks.len()
    }

    /// A pop (or any stack-shrinking op) below the innermost group's mark
    /// would let the operation escape its group; callers check this before
    /// popping.
    pub fn floor(&self) -> usize {
        self.marks.last().copied().unwrap_or(0)
    }
}

impl Default for ValueStack {
    fn default() -> Self {
        Self::new(MAX_GROUPS)
    }
}
