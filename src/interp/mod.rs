//! The script interpreter (§4.8): drives an [`EntitySource`] one entity at
//! a time against a [`Context`], a [`ValueStack`]/[`GroupStack`] pair, a
//! [`Bank`], and an [`OpRegistry`].

pub mod bank;
pub mod ops;
pub mod stack;

use crate::context::Context;
use crate::error::{InfraredError, Result};
use crate::nmf::NmfSource;
use crate::pointer::Pointer;
use crate::script::{Entity, EntitySource, NumericSuffix, StringLit};
use crate::value::{Blob, Text, Value};

use bank::Bank;
use ops::{OpArgs, OpRegistry};
use stack::{GroupStack, ValueStack};

const MODULE: &str = "interp";

/// Owns the three script-visible stores that sit beside the shared
/// [`Context`]: the value stack, the grouping stack, and the name bank.
pub struct Interpreter {
    pub stack: ValueStack,
    pub groups: GroupStack,
    pub bank: Bank,
    pub ops: OpRegistry,
}

impl Interpreter {
    pub fn new(ctx: &Context) -> Self {
        Self {
            stack: ValueStack::new(ctx.limits.value_stack),
            groups: GroupStack::new(ctx.limits.groups),
            bank: Bank::new(ctx.limits.bank),
            ops: OpRegistry::with_builtins(),
        }
    }

    /// Pops the value stack, rejecting any pop that would reach below the
    /// innermost open group's threshold (§4.8), matching the same rule
    /// `ops::OpArgs::checked_pop` enforces for builtins.
    fn guarded_pop(&mut self, script_line: i32) -> Result<Value> {
        if self.groups.depth() > 0 && self.stack.len() <= self.groups.floor() {
            return Err(InfraredError::constraint(
                MODULE,
                script_line,
                format!("pop would cross the group boundary at depth {}", self.groups.floor()),
            ));
        }
        self.stack.pop(script_line)
    }

    /// Applies a numeric-suffix pointer mutator to the pointer on top of the
    /// stack, popping and pushing it back (§4.8).
    fn apply_suffix(&mut self, suffix: NumericSuffix, value: i32, ctx: &mut Context, script_line: i32) -> Result<()> {
        let mut pointer = self.guarded_pop(script_line)?.as_pointer(script_line)?;
        match suffix {
            NumericSuffix::Section => pointer.jump(value, script_line)?,
            NumericSuffix::Seek => pointer.seek(value, script_line)?,
            NumericSuffix::Advance => pointer.advance(value, script_line)?,
            NumericSuffix::Grace => pointer.grace(value, ctx.current_ruler(), script_line)?,
            NumericSuffix::Tilt => pointer.tilt(value, script_line)?,
            NumericSuffix::Moment => pointer.moment(value, script_line)?,
            NumericSuffix::None => unreachable!("None is handled before apply_suffix is called"),
        }
        self.stack.push(Value::Pointer(pointer), script_line)
    }

    /// Runs one entity against the interpreter/context pair.
    pub fn step(&mut self, entity: Entity, script_line: i32, ctx: &mut Context, nmf: &dyn NmfSource) -> Result<()> {
        match entity {
            Entity::Numeric(value, NumericSuffix::None) => self.stack.push(Value::Integer(value), script_line),
            Entity::Numeric(value, suffix) => self.apply_suffix(suffix, value, ctx, script_line),
            Entity::Str(StringLit::Text(s)) => {
                let h = ctx.texts.push(Text::new(s, ctx.limits.text_chars, script_line)?)?;
                self.stack.push(Value::Text(h), script_line)
            }
            Entity::Str(StringLit::HexBlob(hex)) => {
                let h = ctx.blobs.push(Blob::from_hex(&hex, ctx.limits.blob_bytes, script_line)?)?;
                self.stack.push(Value::Blob(h), script_line)
            }
            Entity::VarDecl(name) => self.bank.declare_var(&name, script_line),
            Entity::ConstDecl(name) => self.bank.declare_const(&name, script_line),
            Entity::Assign(name) => {
                let value = self.guarded_pop(script_line)?;
                self.bank.assign(&name, value, script_line)
            }
            Entity::Get(name) => {
                let value = self.bank.get(&name, script_line)?;
                self.stack.push(value, script_line)
            }
            Entity::BeginGroup => self.groups.begin(self.stack.len(), script_line),
            Entity::EndGroup => self.groups.end(self.stack.len(), script_line),
            Entity::Array(count) => {
                let n = i32::try_from(count).map_err(|_| InfraredError::input(MODULE, script_line, format!("array count {count} out of range")))?;
                self.stack.push(Value::Integer(n), script_line)
            }
            Entity::Op(name) => {
                let mut args = OpArgs { ctx, stack: &mut self.stack, groups: &self.groups, nmf, script_line };
                self.ops.call(&name, &mut args)
            }
        }
    }

    /// Drains `source` entirely, running every entity against `ctx`; a
    /// fresh header [`Pointer`] is pushed before the first entity runs so
    /// scripts can `@name=` it away immediately (§4.1, §4.8). At script end
    /// the value stack must be empty (the implicit header pointer is exempt
    /// if the script never consumed it), no group may still be open, and
    /// neither two-phase accumulator may still be open.
    pub fn run(&mut self, source: &mut dyn EntitySource, ctx: &mut Context, nmf: &dyn NmfSource) -> Result<()> {
        self.stack.push(Value::Pointer(Pointer::header()), -1)?;
        let mut last_line = -1;
        while let Some(tagged) = source.next_entity()? {
            last_line = tagged.script_line;
            self.step(tagged.entity, tagged.script_line, ctx, nmf)?;
        }
        let stack_is_clean = match self.stack.len() {
            0 => true,
            1 => matches!(self.stack.peek(last_line), Ok(Value::Pointer(p)) if p.is_header()),
            _ => false,
        };
        if !stack_is_clean {
            return Err(InfraredError::state(
                MODULE,
                last_line,
                format!("script ended with {} value(s) left on the stack", self.stack.len()),
            ));
        }
        if self.groups.depth() > 0 {
            return Err(InfraredError::state(MODULE, last_line, "script ended with an open group"));
        }
        if ctx.has_open_build() {
            return Err(InfraredError::state(MODULE, last_line, "script ended with an open set/graph accumulator"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::Limits;
    use crate::nmf::StaticNmf;
    use crate::script::SourceTokenizer;

    fn run_script(src: &str) -> (Interpreter, Context) {
        let mut ctx = Context::new(Limits::default());
        let mut interp = Interpreter::new(&ctx);
        let nmf = StaticNmf::single_section(0);
        let mut tok = SourceTokenizer::new(src);
        interp.run(&mut tok, &mut ctx, &nmf).unwrap();
        (interp, ctx)
    }

    #[test]
    fn numeric_literal_with_no_suffix_pushes_integer() {
        let (interp, _ctx) = run_script("var x 7 x=");
        assert_eq!(interp.bank.get("x", -1).unwrap(), Value::Integer(7));
    }

    #[test]
    fn var_assign_get_round_trip() {
        let (interp, _ctx) = run_script("var x 5 x= var y @x y=");
        assert_eq!(interp.bank.get("y", -1).unwrap(), Value::Integer(5));
    }

    #[test]
    fn pointer_suffix_chain_matches_scenario_four() {
        let (interp, ctx) = run_script("var p 0s 10q 3t 2m p=");
        let pointer = interp.bank.get("p", -1).unwrap().as_pointer(-1).unwrap();
        let nmf = StaticNmf::single_section(0);
        let _ = ctx;
        assert_eq!(pointer.absolute_moment(&nmf, -1).unwrap().unwrap(), 251);
    }

    #[test]
    fn group_requires_exactly_one_value() {
        let mut ctx = Context::new(Limits::default());
        let mut interp = Interpreter::new(&ctx);
        let nmf = StaticNmf::single_section(0);
        let mut tok = SourceTokenizer::new("[ 1 2 ]");
        assert!(interp.run(&mut tok, &mut ctx, &nmf).is_err());
    }

    #[test]
    fn arithmetic_op_via_registry() {
        let (interp, _ctx) = run_script("var x 3 4 add x=");
        assert_eq!(interp.bank.get("x", -1).unwrap(), Value::Integer(7));
    }

    #[test]
    fn script_ending_with_a_stray_value_is_rejected() {
        let mut ctx = Context::new(Limits::default());
        let mut interp = Interpreter::new(&ctx);
        let nmf = StaticNmf::single_section(0);
        let mut tok = SourceTokenizer::new("1 2");
        assert!(interp.run(&mut tok, &mut ctx, &nmf).is_err());
    }

    #[test]
    fn script_that_never_touches_the_header_pointer_is_accepted() {
        let mut ctx = Context::new(Limits::default());
        let mut interp = Interpreter::new(&ctx);
        let nmf = StaticNmf::single_section(0);
        let mut tok = SourceTokenizer::new("var x 1 x=");
        assert!(interp.run(&mut tok, &mut ctx, &nmf).is_ok());
    }

    #[test]
    fn script_ending_with_an_open_group_is_rejected() {
        let mut ctx = Context::new(Limits::default());
        let mut interp = Interpreter::new(&ctx);
        let nmf = StaticNmf::single_section(0);
        let mut tok = SourceTokenizer::new("[");
        assert!(interp.run(&mut tok, &mut ctx, &nmf).is_err());
    }

    #[test]
    fn script_ending_with_an_open_graph_accumulator_is_rejected() {
        let mut ctx = Context::new(Limits::default());
        let mut interp = Interpreter::new(&ctx);
        let nmf = StaticNmf::single_section(0);
        let mut tok = SourceTokenizer::new("graph_begin 0 1 graph_const");
        assert!(interp.run(&mut tok, &mut ctx, &nmf).is_err());
    }

    #[test]
    fn group_pop_cannot_reach_below_threshold() {
        let mut ctx = Context::new(Limits::default());
        let mut interp = Interpreter::new(&ctx);
        let nmf = StaticNmf::single_section(0);
        let mut tok = SourceTokenizer::new("var x [ 1 drop drop 9 ] x=");
        assert!(interp.run(&mut tok, &mut ctx, &nmf).is_err());
    }

    #[test]
    fn group_pop_down_to_threshold_then_rebuilding_is_allowed() {
        let (interp, _ctx) = run_script("var x [ 1 drop 9 ] x=");
        assert_eq!(interp.bank.get("x", -1).unwrap(), Value::Integer(9));
    }
}
