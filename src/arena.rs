//! Typed bump arenas. Every immutable engine object (text, blob, graph, set,
//! articulation, ruler) is created once and lives until shutdown; rather than
//! reference-count or box-and-leak it, each kind gets its own `Arena<T>` and
//! callers hold a small `Copy` handle instead of a pointer. This keeps
//! `Value` trivially copyable and free of lifetimes.

use std::marker::PhantomData;

use crate::error::{InfraredError, Result};

/// A stable index into an `Arena<T>`. Two handles from different arenas are
/// never comparable by accident because the phantom type parameter differs.
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: usize) -> Self {
        Self {
            index: index as u32,
            _marker: PhantomData,
        }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Handle<T> {}
impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}
impl<T> Eq for Handle<T> {}
impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}
impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

/// Append-only store for one object kind. `cap` is the caller-supplied
/// capacity (from `limits::Limits`, itself clamped to the §5 hard maximum);
/// exceeding it is `InfraredError::Capacity`, not a panic.
pub struct Arena<T> {
    items: Vec<T>,
    cap: usize,
    module: &'static str,
}

impl<T> Arena<T> {
    pub fn new(module: &'static str, cap: usize) -> Self {
        Self {
            items: Vec::new(),
            cap,
            module,
        }
    }

    pub fn push(&mut self, value: T) -> Result<Handle<T>> {
        if self.items.len() >= self.cap {
            return Err(InfraredError::capacity(
                self.module,
                crate::error::NO_LINE,
                format!("arena capacity {} exceeded", self.cap),
            ));
        }
        let handle = Handle::new(self.items.len());
        self.items.push(value);
        Ok(handle)
    }

    pub fn get(&self, handle: Handle<T>) -> &T {
        &self.items[handle.index()]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
