//! Volume-ramp ranges.
//!
//! A range records a linear volume fade overlapping the buffer being
//! generated: constant at `from` before `start`, constant at `to` after
//! `end`, interpolated between. The mixer collects ranges during the
//! channel walk and folds them per frame into a running gain.
//!
//! The default build does the per-frame folding in 16.16 fixed point;
//! the `floatmath` feature switches the folding to `f64` and converts to
//! an integer gain at the end. Either way the gain handed to the sample
//! path is a 16.16 integer.

/// Per-frame running gain accumulator.
///
/// The fixed-point accumulator starts at `2^14` rather than `2^16`,
/// leaving two bits of headroom for envelope values above 1.0; the final
/// scale compensates by shifting right 14 instead of 16.
#[derive(Clone, Copy, Debug)]
pub(crate) struct VarVol(#[cfg(feature = "floatmath")] f64, #[cfg(not(feature = "floatmath"))] i64);

/// A linear fade between two absolute frame times.
#[derive(Clone, Copy, Debug)]
pub struct VolRange {
    pub(crate) start: i64,
    pub(crate) end: i64,
    #[cfg(feature = "floatmath")]
    from: f64,
    #[cfg(feature = "floatmath")]
    to: f64,
    #[cfg(not(feature = "floatmath"))]
    from: i64,
    #[cfg(not(feature = "floatmath"))]
    to: i64,
}

/// Precomputed base gain for one output side of one source channel:
/// note volume times pan split, before any per-frame ramps.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BaseVol(#[cfg(feature = "floatmath")] f64, #[cfg(not(feature = "floatmath"))] i64);

#[cfg(not(feature = "floatmath"))]
mod imp {
    use super::{BaseVol, VarVol, VolRange};

    impl VolRange {
        pub fn new(start: i64, end: i64, from: f64, to: f64) -> Self {
            Self {
                start,
                end,
                from: (from * 65536.0) as i64,
                to: (to * 65536.0) as i64,
            }
        }
    }

    impl VarVol {
        pub fn unit() -> Self {
            VarVol(0x4000)
        }

        /// Multiply the accumulator by the range's value at time `t`.
        ///
        /// The interpolation divides the elapsed time by the range
        /// length pre-shifted 8 bits (floored to 1), keeping 8 bits of
        /// fractional precision through the multiply.
        pub fn fold(&mut self, range: &VolRange, t: i64) {
            if t >= range.end {
                self.0 = (self.0 * range.to) >> 16;
            } else if t <= range.start {
                self.0 = (self.0 * range.from) >> 16;
            } else {
                let mut interp = (t - range.start) / (((range.end - range.start) >> 8) | 1);
                interp = (interp * (range.to - range.from)) >> 8;
                interp += range.from;
                self.0 = (self.0 * interp) >> 16;
            }
        }

        /// Final 16.16 gain for one side.
        pub fn gain(&self, base: &BaseVol) -> i64 {
            (self.0 * base.0) >> 14
        }
    }

    impl BaseVol {
        pub fn new(value: f64) -> Self {
            BaseVol((value * 65536.0) as i64)
        }

        /// The 16.16 gain when no ramps apply.
        pub fn fixed(&self) -> i64 {
            self.0
        }
    }
}

#[cfg(feature = "floatmath")]
mod imp {
    use super::{BaseVol, VarVol, VolRange};

    impl VolRange {
        pub fn new(start: i64, end: i64, from: f64, to: f64) -> Self {
            Self {
                start,
                end,
                from,
                to,
            }
        }
    }

    impl VarVol {
        pub fn unit() -> Self {
            VarVol(1.0)
        }

        pub fn fold(&mut self, range: &VolRange, t: i64) {
            if t >= range.end {
                self.0 *= range.to;
            } else if t <= range.start {
                self.0 *= range.from;
            } else {
                let ratio = (t - range.start) as f64 / (range.end - range.start) as f64;
                self.0 *= ratio * (range.to - range.from) + range.from;
            }
        }

        pub fn gain(&self, base: &BaseVol) -> i64 {
            (self.0 * base.0 * 65536.0) as i64
        }
    }

    impl BaseVol {
        pub fn new(value: f64) -> Self {
            BaseVol(value)
        }

        pub fn fixed(&self) -> i64 {
            (self.0 * 65536.0) as i64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gain_at(range: &VolRange, t: i64) -> i64 {
        let mut var = VarVol::unit();
        var.fold(range, t);
        var.gain(&BaseVol::new(1.0))
    }

    #[test]
    fn constant_outside_the_window() {
        let range = VolRange::new(1000, 2000, 0.25, 0.75);
        assert_eq!(gain_at(&range, 0), gain_at(&range, 1000));
        assert_eq!(gain_at(&range, 2000), gain_at(&range, 9999));
    }

    #[test]
    fn midpoint_is_halfway() {
        let range = VolRange::new(0, 4096, 0.0, 1.0);
        let mid = gain_at(&range, 2048);
        let expected = 0x8000; // 0.5 in 16.16
        assert!(
            (mid - expected).abs() <= 0x200,
            "midpoint gain {:#x} not near {:#x}",
            mid,
            expected
        );
    }

    #[test]
    fn ramps_compose_multiplicatively() {
        let a = VolRange::new(0, 0, 0.5, 0.5);
        let b = VolRange::new(0, 0, 0.5, 0.5);
        let mut var = VarVol::unit();
        var.fold(&a, 100);
        var.fold(&b, 100);
        let gain = var.gain(&BaseVol::new(1.0));
        let expected = 0x4000; // 0.25
        assert!((gain - expected).abs() <= 0x10);
    }

    #[test]
    fn headroom_handles_overdrive() {
        // Values above 1.0 must survive the accumulator.
        let range = VolRange::new(0, 0, 2.0, 2.0);
        let gain = gain_at(&range, 100);
        let expected = 0x20000; // 2.0
        assert!((gain - expected).abs() <= 0x10);
    }
}
