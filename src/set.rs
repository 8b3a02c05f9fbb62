//! The set engine (§4.3): closed/open integer sets over the non-negative
//! integers, built incrementally behind a polarity flag and materialized
//! into a compact run-length encoding for fast membership queries. The
//! polarity only matters while a set is under construction; `end` resolves
//! it into plain membership ranges, so the immutable `Set` itself carries no
//! polarity and `has` is a pure binary search (§4.3).

use crate::error::{InfraredError, Result};

const MODULE: &str = "set";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// `ranges` lists the members directly.
    Positive,
    /// `ranges` lists the non-members; everything else is a member.
    Negative,
}

/// A half-open-ended span `[lo, hi]`; `hi = None` means "to +infinity".
type Span = (i32, Option<i32>);

fn far_before(a: Span, b: Span) -> bool {
    // True if a ends more than one excluded value before b starts, i.e. a
    // and b do not overlap or touch within a gap of one.
    match a.1 {
        None => false,
        Some(a_hi) => a_hi.checked_add(2).map(|next| next < b.0).unwrap_or(false),
    }
}

fn touches_or_overlaps(a: Span, b: Span) -> bool {
    // True if a and b overlap or have a gap of at most one excluded value
    // (§4.3: "gap of exactly one" still merges on include).
    !far_before(a, b) && !far_before(b, a)
}

/// Gap ranges of `ranges` (assumed sorted, non-overlapping) over `[0, +inf)`
/// — used to resolve negative polarity into actual membership ranges.
fn complement(ranges: &[Span]) -> Vec<Span> {
    let mut out = Vec::new();
    let mut cursor = 0_i32;
    for &(lo, hi) in ranges {
        if cursor < lo {
            out.push((cursor, Some(lo - 1)));
        }
        match hi {
            Some(h) => match h.checked_add(1) {
                Some(next) => cursor = next,
                None => return out,
            },
            None => return out,
        }
    }
    out.push((cursor, None));
    out
}

/// The open, mutable accumulation state for a set under construction.
#[derive(Debug, Clone)]
pub struct SetBuilder {
    polarity: Polarity,
    ranges: Vec<Span>,
}

impl SetBuilder {
    pub fn new() -> Self {
        Self {
            polarity: Polarity::Positive,
            ranges: Vec::new(),
        }
    }

    pub fn all(&mut self) {
        self.polarity = Polarity::Negative;
        self.ranges.clear();
    }

    pub fn none(&mut self) {
        self.polarity = Polarity::Positive;
        self.ranges.clear();
    }

    pub fn invert(&mut self) {
        self.polarity = match self.polarity {
            Polarity::Positive => Polarity::Negative,
            Polarity::Negative => Polarity::Positive,
        };
    }

    fn merge_into(&mut self, lo: i32, hi: Option<i32>) {
        let mut all: Vec<Span> = self.ranges.clone();
        all.push((lo, hi));
        all.sort_by_key(|s| s.0);
        let mut merged: Vec<Span> = Vec::with_capacity(all.len());
        for span in all {
            if let Some(last) = merged.last_mut() {
                if touches_or_overlaps(*last, span) {
                    last.0 = last.0.min(span.0);
                    last.1 = match (last.1, span.1) {
                        (None, _) | (_, None) => None,
                        (Some(x), Some(y)) => Some(x.max(y)),
                    };
                    continue;
                }
            }
            merged.push(span);
        }
        self.ranges = merged;
    }

    fn split_from(&mut self, lo: i32, hi: Option<i32>) {
        let mut out: Vec<Span> = Vec::with_capacity(self.ranges.len() + 1);
        for &(a_lo, a_hi) in &self.ranges {
            let overlap = a_lo <= hi.unwrap_or(i32::MAX) && lo <= a_hi.unwrap_or(i32::MAX);
            if !overlap {
                out.push((a_lo, a_hi));
                continue;
            }
            if a_lo < lo {
                out.push((a_lo, Some(lo - 1)));
            }
            if let Some(h) = hi {
                match a_hi {
                    None => out.push((h + 1, None)),
                    Some(a_hi_v) if a_hi_v > h => out.push((h + 1, Some(a_hi_v))),
                    _ => {}
                }
            }
        }
        self.ranges = out;
    }

    /// Closed include/exclude `[lo, hi]` (§4.3). `is_include` is the
    /// request as written in script source; the effective action on the
    /// underlying range list flips when polarity is negative (the list
    /// always means "the ranges of whatever `polarity` currently says it
    /// means" — members when Positive, non-members when Negative).
    pub fn closed(&mut self, lo: i32, hi: i32, is_include: bool, script_line: i32) -> Result<()> {
        if lo > hi || lo < 0 {
            return Err(InfraredError::input(
                MODULE,
                script_line,
                format!("invalid closed range [{lo},{hi}]"),
            ));
        }
        let effective_include = match self.polarity {
            Polarity::Positive => is_include,
            Polarity::Negative => !is_include,
        };
        if effective_include {
            self.merge_into(lo, Some(hi));
        } else {
            self.split_from(lo, Some(hi));
        }
        Ok(())
    }

    /// Open include/exclude `lo..∞` (§4.3), via the same effective-include
    /// flip as `closed`.
    pub fn open(&mut self, lo: i32, is_include: bool, script_line: i32) -> Result<()> {
        if lo < 0 {
            return Err(InfraredError::input(
                MODULE,
                script_line,
                "open range lo must be >= 0",
            ));
        }
        let effective_include = match self.polarity {
            Polarity::Positive => is_include,
            Polarity::Negative => !is_include,
        };
        if effective_include {
            self.merge_into(lo, None);
        } else {
            self.split_from(lo, None);
        }
        Ok(())
    }

    /// Applies `ranges` (another set's resolved membership ranges) as
    /// closed/open include or exclude calls (§4.3: union/intersect/except
    /// iterate the other set as ranges).
    fn combine_ranges(&mut self, ranges: &[Span], include: bool, script_line: i32) -> Result<()> {
        for &(lo, hi) in ranges {
            match hi {
                Some(h) => self.closed(lo, h, include, script_line)?,
                None => self.open(lo, include, script_line)?,
            }
        }
        Ok(())
    }

    pub fn union(&mut self, other: &Set, script_line: i32) -> Result<()> {
        self.combine_ranges(&other.ranges(), true, script_line)
    }

    pub fn intersect(&mut self, other: &Set, script_line: i32) -> Result<()> {
        // A ∧ B == ¬(¬A ∨ ¬B).
        self.invert();
        self.combine_ranges(&complement(&other.ranges()), true, script_line)?;
        self.invert();
        Ok(())
    }

    pub fn except(&mut self, other: &Set, script_line: i32) -> Result<()> {
        self.combine_ranges(&other.ranges(), false, script_line)
    }

    /// Materializes the compact encoding (§4.3) and returns an immutable
    /// `Set`. Negative polarity is resolved into its gap ranges here, so
    /// `Set` itself is a plain membership table. `cap` is the active
    /// `Limits::set_entries`.
    pub fn end(&self, cap: usize, script_line: i32) -> Result<Set> {
        let member_ranges = match self.polarity {
            Polarity::Positive => self.ranges.clone(),
            Polarity::Negative => complement(&self.ranges),
        };
        let mut encoded = Vec::new();
        for (lo, hi) in member_ranges {
            let run_len: i64 = match hi {
                Some(h) => (h as i64) - (lo as i64) + 1,
                None => i64::MAX,
            };
            if run_len == 1 {
                encoded.push(lo);
            } else if run_len == 2 {
                encoded.push(lo);
                encoded.push(lo + 1);
            } else {
                encoded.push(-(lo + 1));
                if let Some(h) = hi {
                    encoded.push(h);
                }
            }
        }
        if encoded.len() > cap {
            return Err(InfraredError::capacity(
                MODULE,
                script_line,
                format!("set encoding exceeds {cap} entries"),
            ));
        }
        Ok(Set { encoded })
    }
}

impl Default for SetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The immutable, compactly encoded set (§3, §4.3). `encoded[i] >= 0` is a
/// closed singleton; `encoded[i] < 0` decodes to `-(v+1)` and opens a run
/// that continues until just before the next entry (or to +infinity if
/// last).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Set {
    encoded: Vec<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Closed(i32),
    Open(i32),
}

impl Set {
    fn decode(&self) -> Vec<Entry> {
        self.encoded
            .iter()
            .map(|&raw| {
                if raw >= 0 {
                    Entry::Closed(raw)
                } else {
                    Entry::Open(-(raw + 1))
                }
            })
            .collect()
    }

    /// The membership ranges this set's encoding represents.
    fn ranges(&self) -> Vec<Span> {
        let entries = self.decode();
        let mut out = Vec::new();
        let mut i = 0;
        while i < entries.len() {
            match entries[i] {
                Entry::Open(v) => {
                    let hi = if i + 1 < entries.len() {
                        match entries[i + 1] {
                            Entry::Closed(c) => Some(c),
                            Entry::Open(_) => None,
                        }
                    } else {
                        None
                    };
                    out.push((v, hi));
                    i += if hi.is_some() { 2 } else { 1 };
                }
                Entry::Closed(v) => {
                    out.push((v, Some(v)));
                    i += 1;
                }
            }
        }
        out
    }

    /// Binary search for the greatest entry whose decoded value is `<= v`;
    /// membership holds iff that entry is open, or is closed and equals `v`
    /// (§4.3).
    pub fn has(&self, v: i32) -> bool {
        let entries = self.decode();
        let decoded_value = |e: Entry| match e {
            Entry::Closed(x) | Entry::Open(x) => x,
        };
        let idx = entries.partition_point(|&e| decoded_value(e) <= v);
        if idx == 0 {
            return false;
        }
        match entries[idx - 1] {
            Entry::Open(_) => true,
            Entry::Closed(x) => x == v,
        }
    }

    pub fn encoded_len(&self) -> usize {
        self.encoded.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finish(b: &SetBuilder) -> Set {
        b.end(16_384, -1).unwrap()
    }

    #[test]
    fn end_enforces_the_passed_cap() {
        let mut b = SetBuilder::new();
        b.none();
        b.closed(0, 9, true, -1).unwrap();
        assert!(b.end(5, -1).is_err());
        assert!(b.end(16_384, -1).is_ok());
    }

    #[test]
    fn scenario_set_polarity_flip() {
        let mut b = SetBuilder::new();
        b.none();
        b.closed(1, 16, true, -1).unwrap();
        b.closed(7, 7, false, -1).unwrap();
        b.closed(7, 7, true, -1).unwrap();
        let set = finish(&b);
        assert!(set.has(7));
        assert!(!set.has(17));
    }

    #[test]
    fn all_includes_everything() {
        let mut b = SetBuilder::new();
        b.all();
        let set = finish(&b);
        for v in [0, 1, 1000, 1_000_000] {
            assert!(set.has(v));
        }
    }

    #[test]
    fn none_includes_nothing() {
        let mut b = SetBuilder::new();
        b.none();
        let set = finish(&b);
        assert!(!set.has(0));
        assert!(!set.has(500));
    }

    #[test]
    fn adjacency_merge_on_include() {
        let mut b = SetBuilder::new();
        b.none();
        b.closed(0, 2, true, -1).unwrap();
        b.closed(4, 6, true, -1).unwrap(); // gap of exactly one (value 3)
        let set = finish(&b);
        for v in 0..=6 {
            assert!(set.has(v), "expected {v} to be merged in");
        }
    }

    #[test]
    fn exclude_splits_a_range() {
        let mut b = SetBuilder::new();
        b.none();
        b.closed(0, 10, true, -1).unwrap();
        b.closed(4, 6, false, -1).unwrap();
        let set = finish(&b);
        for v in [0, 1, 2, 3, 7, 8, 9, 10] {
            assert!(set.has(v));
        }
        for v in [4, 5, 6] {
            assert!(!set.has(v));
        }
    }

    #[test]
    fn open_include_then_query() {
        let mut b = SetBuilder::new();
        b.none();
        b.open(10, true, -1).unwrap();
        let set = finish(&b);
        assert!(!set.has(9));
        assert!(set.has(10));
        assert!(set.has(1_000_000));
    }

    #[test]
    fn open_exclude_from_all() {
        let mut b = SetBuilder::new();
        b.all();
        b.open(10, false, -1).unwrap();
        let set = finish(&b);
        assert!(set.has(9));
        assert!(!set.has(10));
        assert!(!set.has(1_000_000));
    }

    #[test]
    fn union_is_logical_or() {
        let mut a = SetBuilder::new();
        a.none();
        a.closed(0, 4, true, -1).unwrap();
        let a_set = finish(&a);

        let mut b = SetBuilder::new();
        b.none();
        b.closed(10, 14, true, -1).unwrap();
        let b_set = finish(&b);

        let mut u = SetBuilder::new();
        u.none();
        u.union(&a_set, -1).unwrap();
        u.union(&b_set, -1).unwrap();
        let u_set = finish(&u);

        for v in 0..20 {
            assert_eq!(u_set.has(v), a_set.has(v) || b_set.has(v));
        }
    }

    #[test]
    fn intersect_is_logical_and() {
        let mut a = SetBuilder::new();
        a.none();
        a.closed(0, 9, true, -1).unwrap();
        let a_set = finish(&a);

        let mut b = SetBuilder::new();
        b.none();
        b.closed(5, 14, true, -1).unwrap();
        let b_set = finish(&b);

        let mut x = SetBuilder::new();
        x.none();
        x.union(&a_set, -1).unwrap();
        x.intersect(&b_set, -1).unwrap();
        let x_set = finish(&x);

        for v in 0..20 {
            assert_eq!(x_set.has(v), a_set.has(v) && b_set.has(v));
        }
    }

    #[test]
    fn except_is_a_and_not_b() {
        let mut a = SetBuilder::new();
        a.none();
        a.closed(0, 9, true, -1).unwrap();
        let a_set = finish(&a);

        let mut b = SetBuilder::new();
        b.none();
        b.closed(5, 14, true, -1).unwrap();
        let b_set = finish(&b);

        let mut x = SetBuilder::new();
        x.none();
        x.union(&a_set, -1).unwrap();
        x.except(&b_set, -1).unwrap();
        let x_set = finish(&x);

        for v in 0..20 {
            assert_eq!(x_set.has(v), a_set.has(v) && !b_set.has(v));
        }
    }
}
