//! The NMF collaborator interface (§6a). A real NMF parser is out of scope —
//! an external component supplies notes, sections, and the section base
//! offsets. This module only defines the contract plus a trivial
//! `Vec`-backed implementation used for tests and as the CLI's stdin reader.

use crate::error::{InfraredError, Result};

/// `dur > 0`: measured note. `dur < 0`: unmeasured grace note (the magnitude
/// is the grace index consumed by the ruler). `dur == 0`: tombstoned cue
/// metadata, never rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NmfNoteIn {
    pub t: i32,
    pub dur: i32,
    /// NMF pitch; 0 maps to MIDI key 60 (§6a, §4.7).
    pub pitch: i32,
    pub art: i32,
    pub sect: i32,
    pub layer_i: i32,
}

/// The subset of a parsed NMF document the core consumes (§6a): sections,
/// their base quantum offsets, the quantum basis, and the notes themselves.
pub trait NmfSource {
    fn section_count(&self) -> usize;
    fn section_base_quanta(&self, section: usize) -> i32;
    /// Quanta per quarter note; must be 96 (§6a).
    fn quantum_basis(&self) -> i32;
    fn notes(&self) -> &[NmfNoteIn];
}

/// Reference `NmfSource`, backed by plain `Vec`s. Good enough to run the CLI
/// and the integration tests; not a replacement for a real NMF parser.
#[derive(Debug, Clone, Default)]
pub struct StaticNmf {
    section_base_quanta: Vec<i32>,
    quantum_basis: i32,
    notes: Vec<NmfNoteIn>,
}

impl StaticNmf {
    pub fn new(section_base_quanta: Vec<i32>, quantum_basis: i32, notes: Vec<NmfNoteIn>) -> Result<Self> {
        if quantum_basis != 96 {
            return Err(InfraredError::input(
                "nmf",
                -1,
                format!("quantum basis must be 96 per quarter note, got {quantum_basis}"),
            ));
        }
        Ok(Self {
            section_base_quanta,
            quantum_basis,
            notes,
        })
    }

    /// A single section starting at the given base offset, with no notes;
    /// convenient for pointer-algebra unit tests.
    pub fn single_section(base_quanta: i32) -> Self {
        Self {
            section_base_quanta: vec![base_quanta],
            quantum_basis: 96,
            notes: Vec::new(),
        }
    }
}

impl NmfSource for StaticNmf {
    fn section_count(&self) -> usize {
        self.section_base_quanta.len()
    }

    fn section_base_quanta(&self, section: usize) -> i32 {
        self.section_base_quanta[section]
    }

    fn quantum_basis(&self) -> i32 {
        self.quantum_basis
    }

    fn notes(&self) -> &[NmfNoteIn] {
        &self.notes
    }
}
