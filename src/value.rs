//! The tagged value union (§3) plus the two simplest immutable object kinds,
//! `Text` and `Blob`. Everything heavier (graph, set, articulation, ruler)
//! gets its own module; this one is for the value types too small to need
//! one.

use crate::arena::Handle;
use crate::artic::{Articulation, Ruler};
use crate::error::{InfraredError, Result};
use crate::graph::Graph;
use crate::pointer::Pointer;
use crate::set::Set;

const MODULE: &str = "value";

/// Immutable printable-ASCII-plus-space string, length `0..=1023` (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text(String);

impl Text {
    /// `cap` is the active `Limits::text_chars`, not the hard `MAX_TEXT_CHARS`
    /// ceiling, so a `--config`-tightened limit is actually observed here.
    pub fn new(s: impl Into<String>, cap: usize, script_line: i32) -> Result<Self> {
        let s = s.into();
        if s.len() > cap {
            return Err(InfraredError::capacity(MODULE, script_line, format!("text length {} exceeds {cap}", s.len())));
        }
        if !s.bytes().all(|b| b == b' ' || (0x21..=0x7e).contains(&b)) {
            return Err(InfraredError::input(MODULE, script_line, "text must be printable ASCII plus space"));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn concat(&self, other: &Text, cap: usize, script_line: i32) -> Result<Text> {
        Text::new(format!("{}{}", self.0, other.0), cap, script_line)
    }

    /// `[i, j)` slice, matching Rust's own half-open convention (§3).
    pub fn slice(&self, i: usize, j: usize, cap: usize, script_line: i32) -> Result<Text> {
        if i > j || j > self.0.len() {
            return Err(InfraredError::input(MODULE, script_line, format!("text slice [{i},{j}) out of bounds")));
        }
        Text::new(&self.0[i..j], cap, script_line)
    }
}

/// Immutable byte sequence, length `0..=1_048_576` (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob(Vec<u8>);

impl Blob {
    /// `cap` is the active `Limits::blob_bytes`.
    pub fn new(bytes: Vec<u8>, cap: usize, script_line: i32) -> Result<Self> {
        if bytes.len() > cap {
            return Err(InfraredError::capacity(MODULE, script_line, format!("blob length {} exceeds {cap}", bytes.len())));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whitespace-tolerant hex-pair decode (§3): every non-whitespace
    /// character must form part of a two-hex-digit pair.
    pub fn from_hex(text: &str, cap: usize, script_line: i32) -> Result<Self> {
        let mut digits = Vec::with_capacity(text.len());
        for ch in text.chars() {
            if ch.is_whitespace() {
                continue;
            }
            let Some(d) = ch.to_digit(16) else {
                return Err(InfraredError::input(MODULE, script_line, format!("invalid hex digit '{ch}'")));
            };
            digits.push(d as u8);
        }
        if digits.len() % 2 != 0 {
            return Err(InfraredError::input(MODULE, script_line, "hex blob has an odd number of digits"));
        }
        let bytes = digits.chunks_exact(2).map(|pair| (pair[0] << 4) | pair[1]).collect();
        Blob::new(bytes, cap, script_line)
    }

    pub fn concat(&self, other: &Blob, cap: usize, script_line: i32) -> Result<Blob> {
        let mut bytes = self.0.clone();
        bytes.extend_from_slice(&other.0);
        Blob::new(bytes, cap, script_line)
    }

    pub fn slice(&self, i: usize, j: usize, cap: usize, script_line: i32) -> Result<Blob> {
        if i > j || j > self.0.len() {
            return Err(InfraredError::input(MODULE, script_line, format!("blob slice [{i},{j}) out of bounds")));
        }
        Blob::new(self.0[i..j].to_vec(), cap, script_line)
    }
}

/// The interpreter's typed value stack entry (§3). Reference variants carry
/// arena handles, never back-pointers; `Pointer` is held inline since it is
/// mutable and has nothing to intern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Integer(i32),
    Text(Handle<Text>),
    Blob(Handle<Blob>),
    Graph(Handle<Graph>),
    Set(Handle<Set>),
    Articulation(Handle<Articulation>),
    Ruler(Handle<Ruler>),
    Pointer(Pointer),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Graph(_) => "graph",
            Value::Set(_) => "set",
            Value::Articulation(_) => "articulation",
            Value::Ruler(_) => "ruler",
            Value::Pointer(_) => "pointer",
        }
    }

    pub fn as_integer(&self, script_line: i32) -> Result<i32> {
        match self {
            Value::Integer(v) => Ok(*v),
            other => Err(InfraredError::input(MODULE, script_line, format!("expected integer, found {}", other.type_name()))),
        }
    }

    pub fn as_pointer(&self, script_line: i32) -> Result<Pointer> {
        match self {
            Value::Pointer(p) => Ok(*p),
            other => Err(InfraredError::input(MODULE, script_line, format!("expected pointer, found {}", other.type_name()))),
        }
    }

    pub fn as_text(&self, script_line: i32) -> Result<Handle<Text>> {
        match self {
            Value::Text(h) => Ok(*h),
            other => Err(InfraredError::input(MODULE, script_line, format!("expected text, found {}", other.type_name()))),
        }
    }

    pub fn as_blob(&self, script_line: i32) -> Result<Handle<Blob>> {
        match self {
            Value::Blob(h) => Ok(*h),
            other => Err(InfraredError::input(MODULE, script_line, format!("expected blob, found {}", other.type_name()))),
        }
    }

    pub fn as_graph(&self, script_line: i32) -> Result<Handle<Graph>> {
        match self {
            Value::Graph(h) => Ok(*h),
            other => Err(InfraredError::input(MODULE, script_line, format!("expected graph, found {}", other.type_name()))),
        }
    }

    pub fn as_set(&self, script_line: i32) -> Result<Handle<Set>> {
        match self {
            Value::Set(h) => Ok(*h),
            other => Err(InfraredError::input(MODULE, script_line, format!("expected set, found {}", other.type_name()))),
        }
    }

    pub fn as_articulation(&self, script_line: i32) -> Result<Handle<Articulation>> {
        match self {
            Value::Articulation(h) => Ok(*h),
            other => Err(InfraredError::input(MODULE, script_line, format!("expected articulation, found {}", other.type_name()))),
        }
    }

    pub fn as_ruler(&self, script_line: i32) -> Result<Handle<Ruler>> {
        match self {
            Value::Ruler(h) => Ok(*h),
            other => Err(InfraredError::input(MODULE, script_line, format!("expected ruler, found {}", other.type_name()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_rejects_control_characters() {
        assert!(Text::new("hello\tworld", 1024, -1).is_err());
        assert!(Text::new("hello world", 1024, -1).is_ok());
    }

    #[test]
    fn text_new_enforces_the_passed_cap() {
        assert!(Text::new("hello", 4, -1).is_err());
        assert!(Text::new("hell", 4, -1).is_ok());
    }

    #[test]
    fn blob_hex_decode_is_whitespace_tolerant() {
        let b = Blob::from_hex("de ad\nbe ef", 1024, -1).unwrap();
        assert_eq!(b.as_bytes(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn blob_hex_decode_rejects_odd_digit_count() {
        assert!(Blob::from_hex("abc", 1024, -1).is_err());
    }

    #[test]
    fn blob_new_enforces_the_passed_cap() {
        assert!(Blob::new(vec![0, 1, 2], 2, -1).is_err());
        assert!(Blob::new(vec![0, 1], 2, -1).is_ok());
    }

    #[test]
    fn value_as_integer_rejects_other_types() {
        let v = Value::Integer(5);
        assert_eq!(v.as_integer(-1).unwrap(), 5);
        let v = Value::Pointer(Pointer::header());
        assert!(v.as_integer(-1).is_err());
    }
}
