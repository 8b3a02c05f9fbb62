//! The variable/constant bank (§4.9): a name-indexed slot table. Names are
//! declared once (`var`/`const`), written by `assign` (pop-and-store, per
//! the resolved reading of the assignment operator — see DESIGN.md), and
//! read by `get`, which leaves the bound value in place.

use std::collections::HashMap;

use crate::error::{InfraredError, Result};
use crate::value::Value;

const MODULE: &str = "bank";

#[derive(Debug, Clone, Copy)]
struct Slot {
    value: Option<Value>,
    is_const: bool,
}

/// Insertion-ordered name table, bounded at `cap` declared names (§5).
#[derive(Debug, Default)]
pub struct Bank {
    index: HashMap<String, usize>,
    slots: Vec<Slot>,
    cap: usize,
}

impl Bank {
    pub fn new(cap: usize) -> Self {
        Self {
            index: HashMap::new(),
            slots: Vec::new(),
            cap,
        }
    }

    fn declare(&mut self, name: &str, is_const: bool, script_line: i32) -> Result<()> {
        if self.index.contains_key(name) {
            return Err(InfraredError::constraint(MODULE, script_line, format!("name '{name}' already declared")));
        }
        if self.slots.len() >= self.cap {
            return Err(InfraredError::capacity(MODULE, script_line, format!("bank capacity {} exceeded", self.cap)));
        }
        self.index.insert(name.to_string(), self.slots.len());
        self.slots.push(Slot { value: None, is_const });
        Ok(())
    }

    pub fn declare_var(&mut self, name: &str, script_line: i32) -> Result<()> {
        self.declare(name, false, script_line)
    }

    pub fn declare_const(&mut self, name: &str, script_line: i32) -> Result<()> {
        self.declare(name, true, script_line)
    }

    fn slot_index(&self, name: &str, script_line: i32) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| InfraredError::state(MODULE, script_line, format!("name '{name}' was never declared")))
    }

    /// `assign(name)`: stores `value` into `name`'s slot. A constant may be
    /// assigned exactly once (its first write); any later assignment is
    /// rejected (§4.9).
    pub fn assign(&mut self, name: &str, value: Value, script_line: i32) -> Result<()> {
        let i = self.slot_index(name, script_line)?;
        let slot = &mut self.slots[i];
        if slot.is_const && slot.value.is_some() {
            return Err(InfraredError::constraint(MODULE, script_line, format!("constant '{name}' already assigned")));
        }
        slot.value = Some(value);
        Ok(())
    }

    /// `get(name)`: reads the bound value without consuming it.
    pub fn get(&self, name: &str, script_line: i32) -> Result<Value> {
        let i = self.slot_index(name, script_line)?;
        self.slots[i]
            .value
            .ok_or_else(|| InfraredError::state(MODULE, script_line, format!("name '{name}' read before assignment")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn declare_assign_get_round_trip() {
        let mut bank = Bank::new(16);
        bank.declare_var("x", -1).unwrap();
        bank.assign("x", Value::Integer(5), -1).unwrap();
        assert_eq!(bank.get("x", -1).unwrap(), Value::Integer(5));
    }

    #[test]
    fn redeclaration_is_rejected() {
        let mut bank = Bank::new(16);
        bank.declare_var("x", -1).unwrap();
        assert!(bank.declare_var("x", -1).is_err());
        assert!(bank.declare_const("x", -1).is_err());
    }

    #[test]
    fn const_reassignment_is_rejected() {
        let mut bank = Bank::new(16);
        bank.declare_const("k", -1).unwrap();
        bank.assign("k", Value::Integer(1), -1).unwrap();
        assert!(bank.assign("k", Value::Integer(2), -1).is_err());
    }

    #[test]
    fn var_may_be_reassigned() {
        let mut bank = Bank::new(16);
        bank.declare_var("x", -1).unwrap();
        bank.assign("x", Value::Integer(1), -1).unwrap();
        bank.assign("x", Value::Integer(2), -1).unwrap();
        assert_eq!(bank.get("x", -1).unwrap(), Value::Integer(2));
    }

    #[test]
    fn get_before_assign_is_rejected() {
        let mut bank = Bank::new(16);
        bank.declare_var("x", -1).unwrap();
        assert!(bank.get("x", -1).is_err());
    }

    #[test]
    fn undeclared_name_is_rejected() {
        let bank = Bank::new(16);
        assert!(bank.get("nope", -1).is_err());
    }

    #[test]
    fn capacity_is_enforced() {
        let mut bank = Bank::new(1);
        bank.declare_var("a", -1).unwrap();
        assert!(bank.declare_var("b", -1).is_err());
    }
}
