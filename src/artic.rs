//! Articulation (duration transform for measured notes) and Ruler (duration
//! transform for unmeasured grace notes). Both are small immutable records;
//! both normalize their constructor arguments and reject out-of-range input
//! at construction time rather than at first use.

use crate::error::{InfraredError, Result};

const MODULE: &str = "artic";

/// `{scale_num: 1..=8, scale_denom: 8 (post-normalization), bumper >= 0, gap <= 0}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Articulation {
    scale_num: i32,
    bumper: i32,
    gap: i32,
}

impl Articulation {
    /// `raw_denom` must be one of {1, 2, 4, 8}; it is rescaled to 8 by
    /// doubling `raw_num`/`raw_denom` the appropriate number of times, per
    /// §3. The resulting `scale_num` must land in 1..=8.
    pub fn new(raw_num: i32, raw_denom: i32, bumper: i32, gap: i32, script_line: i32) -> Result<Self> {
        let factor = match raw_denom {
            8 => 1,
            4 => 2,
            2 => 4,
            1 => 8,
            _ => {
                return Err(InfraredError::constraint(
                    MODULE,
                    script_line,
                    format!("articulation denominator {raw_denom} must be one of 1, 2, 4, 8"),
                ));
            }
        };
        let scale_num = raw_num.checked_mul(factor).ok_or_else(|| {
            InfraredError::input(MODULE, script_line, "articulation numerator overflow")
        })?;
        if !(1..=8).contains(&scale_num) {
            return Err(InfraredError::constraint(
                MODULE,
                script_line,
                format!("normalized articulation numerator {scale_num} out of range 1..=8"),
            ));
        }
        if bumper < 0 {
            return Err(InfraredError::constraint(
                MODULE,
                script_line,
                "articulation bumper must be >= 0",
            ));
        }
        if gap > 0 {
            return Err(InfraredError::constraint(
                MODULE,
                script_line,
                "articulation gap must be <= 0",
            ));
        }
        Ok(Self {
            scale_num,
            bumper,
            gap,
        })
    }

    /// The 1/1 articulation with the documented defaults (§4.7): bumper=8,
    /// gap=0.
    pub fn default_identity() -> Self {
        Self {
            scale_num: 8,
            bumper: 8,
            gap: 0,
        }
    }

    /// §4.2: `r = (dur*8*scale_num)/8; r = max(r, bumper); r = min(r, dur*8+gap); r = max(r, 1)`.
    pub fn transform(&self, dur_quanta: i32, script_line: i32) -> Result<i32> {
        if dur_quanta <= 0 {
            return Err(InfraredError::input(
                MODULE,
                script_line,
                "art_transform requires dur_quanta > 0",
            ));
        }
        let overflow = || InfraredError::input(MODULE, script_line, "articulation transform overflow");
        let dur_8 = (dur_quanta as i64) * 8;
        let scaled = dur_8 * (self.scale_num as i64);
        let mut r = scaled / 8;
        r = r.max(self.bumper as i64);
        let ceiling = dur_8.checked_add(self.gap as i64).ok_or_else(overflow)?;
        r = r.min(ceiling);
        r = r.max(1);
        i32::try_from(r).map_err(|_| overflow())
    }
}

/// `{slot > 0, gap <= 0, slot + gap >= 1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ruler {
    slot: i32,
    gap: i32,
}

impl Ruler {
    pub fn new(slot: i32, gap: i32, script_line: i32) -> Result<Self> {
        if slot <= 0 {
            return Err(InfraredError::constraint(
                MODULE,
                script_line,
                "ruler slot must be > 0",
            ));
        }
        if gap > 0 {
            return Err(InfraredError::constraint(
                MODULE,
                script_line,
                "ruler gap must be <= 0",
            ));
        }
        let total = slot
            .checked_add(gap)
            .ok_or_else(|| InfraredError::input(MODULE, script_line, "ruler slot+gap overflow"))?;
        if total < 1 {
            return Err(InfraredError::constraint(
                MODULE,
                script_line,
                "ruler slot+gap must be >= 1",
            ));
        }
        Ok(Self { slot, gap })
    }

    /// The lazily-constructed default ruler used when the ruler stack is
    /// empty (§4.8): `48, 0`.
    pub fn default_ruler() -> Self {
        Self { slot: 48, gap: 0 }
    }

    pub fn slot(&self) -> i32 {
        self.slot
    }

    /// Offset of the `i`-th grace note (`i < 0`) before a beat at
    /// subquantum offset `b`: `b + i*slot`.
    pub fn grace_offset(&self, beat_subq: i32, grace: i32, script_line: i32) -> Result<i32> {
        let overflow = || InfraredError::input(MODULE, script_line, "ruler_pos overflow");
        let shift = (grace as i64).checked_mul(self.slot as i64).ok_or_else(overflow)?;
        let abs = (beat_subq as i64).checked_add(shift).ok_or_else(overflow)?;
        i32::try_from(abs).map_err(|_| overflow())
    }

    /// Duration of a grace note: `slot + gap`.
    pub fn duration(&self) -> i32 {
        self.slot + self.gap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_articulation_scales_by_eight() {
        let art = Articulation::default_identity();
        for x in [1, 2, 100] {
            assert_eq!(art.transform(x, -1).unwrap(), 8 * x);
        }
    }

    #[test]
    fn bumper_forces_minimum_at_small_duration() {
        let art = Articulation::new(1, 1, 8, 0, -1).unwrap();
        assert_eq!(art.transform(1, -1).unwrap(), 8);
    }

    #[test]
    fn monotonic_in_duration() {
        let art = Articulation::new(3, 4, 2, -4, -1).unwrap();
        let mut prev = art.transform(1, -1).unwrap();
        for x in 2..200 {
            let next = art.transform(x, -1).unwrap();
            assert!(next >= prev, "art_transform not monotone at {x}");
            prev = next;
        }
    }

    #[test]
    fn denominator_normalization() {
        // 1/2 normalizes to scale_num=4 (num*4) over denom 8.
        let art = Articulation::new(1, 2, 0, 0, -1).unwrap();
        assert_eq!(art.transform(8, -1).unwrap(), 4 * 8);
    }

    #[test]
    fn rejects_bad_denominator() {
        assert!(Articulation::new(1, 3, 0, 0, -1).is_err());
    }

    #[test]
    fn ruler_grace_offset_and_duration() {
        let ruler = Ruler::new(48, -8, -1).unwrap();
        assert_eq!(ruler.grace_offset(800, -2, -1).unwrap(), 800 - 96);
        assert_eq!(ruler.duration(), 40);
    }
}
