//! Fixed-point arithmetic with a 10^-6 quantum.
//!
//! All score arithmetic runs on these values. Every operation is integer-only
//! and bit-reproducible across platforms; rounding is half-to-even at the
//! quantum boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::{Decimal, Value};
use crate::constants::SCORE_QUANTUM_DENOM;

/// ln(2) scaled by 10^12.
const LN2_PICO: i128 = 693_147_180_560;

/// Fractional bits carried through the binary-logarithm iteration. 40 bits
/// keeps the error well under one 10^-6 quantum.
const LOG_FRAC_BITS: u32 = 40;

/// A signed fixed-point number in micro-units (10^-6).
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Fixed(i64);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(SCORE_QUANTUM_DENOM);

    pub fn from_int(i: i64) -> Fixed {
        Fixed(i.saturating_mul(SCORE_QUANTUM_DENOM))
    }

    pub fn from_micros(micros: i64) -> Fixed {
        Fixed(micros)
    }

    pub fn micros(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Saturating addition. The scorer adds in sorted input order, so any
    /// saturation (never expected under ruleset caps) is at least
    /// deterministic.
    pub fn add(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.saturating_add(rhs.0))
    }

    pub fn sub(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.saturating_sub(rhs.0))
    }

    /// Multiplication with half-to-even rounding at the quantum.
    pub fn mul(self, rhs: Fixed) -> Fixed {
        let wide = self.0 as i128 * rhs.0 as i128;
        Fixed(clamp_i64(round_half_even(wide, SCORE_QUANTUM_DENOM as i128)))
    }

    /// Division with half-to-even rounding at the quantum. Panics on zero
    /// divisor, matching integer division semantics.
    pub fn div(self, rhs: Fixed) -> Fixed {
        let num = self.0 as i128 * SCORE_QUANTUM_DENOM as i128;
        Fixed(clamp_i64(round_half_even(num, rhs.0 as i128)))
    }

    pub fn min(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.min(rhs.0))
    }

    pub fn max(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.max(rhs.0))
    }

    pub fn clamp(self, lo: Fixed, hi: Fixed) -> Fixed {
        Fixed(self.0.clamp(lo.0, hi.0))
    }

    /// Largest integer ≤ self.
    pub fn floor_int(self) -> i64 {
        self.0.div_euclid(SCORE_QUANTUM_DENOM)
    }

    /// Square root of a non-negative value, rounded to nearest quantum.
    pub fn sqrt(self) -> Fixed {
        debug_assert!(self.0 >= 0, "sqrt of negative fixed-point value");
        if self.0 <= 0 {
            return Fixed::ZERO;
        }
        // sqrt(m / 1e6) in micro-units = sqrt(m * 1e6).
        let n = self.0 as u128 * SCORE_QUANTUM_DENOM as u128;
        let r = isqrt(n);
        // Round to nearest: (r + 1/2)^2 = r^2 + r + 1/4.
        let rounded = if n - r * r > r { r + 1 } else { r };
        Fixed(clamp_i64(rounded as i128))
    }

    /// Natural logarithm of (1 + self) for self ≥ 0, via a binary logarithm
    /// computed with the iterative-squaring method. Integer-only and
    /// reproducible.
    pub fn ln_1p(self) -> Fixed {
        debug_assert!(self.0 >= 0, "ln_1p of negative fixed-point value");
        if self.0 <= 0 {
            return Fixed::ZERO;
        }
        let one_plus = self.0 as u128 + SCORE_QUANTUM_DENOM as u128;
        let log2_q = log2_q40(one_plus, SCORE_QUANTUM_DENOM as u128);
        // ln x = log2(x) · ln 2;  log2 is Q40, ln2 is scaled 1e12, so the
        // result in micro-units divides by 2^40 · 1e6.
        let num = log2_q * LN2_PICO;
        let den = (1i128 << LOG_FRAC_BITS) * SCORE_QUANTUM_DENOM as i128;
        Fixed(clamp_i64(round_half_even(num, den)))
    }

    /// Render as the canonical decimal value (for wire embedding).
    pub fn to_value(self) -> Value {
        Value::Decimal(Decimal::new(self.0 as i128, 6).expect("scale 6 always representable"))
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let int = abs / SCORE_QUANTUM_DENOM as u64;
        let frac = abs % SCORE_QUANTUM_DENOM as u64;
        if frac == 0 {
            write!(f, "{sign}{int}")
        } else {
            let frac_str = format!("{frac:06}");
            write!(f, "{sign}{int}.{}", frac_str.trim_end_matches('0'))
        }
    }
}

impl fmt::Debug for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixed({self})")
    }
}

/// Round `num / den` half-to-even. `den` must be positive.
pub fn round_half_even(num: i128, den: i128) -> i128 {
    debug_assert!(den > 0);
    let q = num.div_euclid(den);
    let r = num.rem_euclid(den);
    match (2 * r).cmp(&den) {
        std::cmp::Ordering::Less => q,
        std::cmp::Ordering::Greater => q + 1,
        std::cmp::Ordering::Equal => {
            if q % 2 == 0 {
                q
            } else {
                q + 1
            }
        }
    }
}

fn clamp_i64(v: i128) -> i64 {
    v.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Integer square root (floor) of a u128, by Newton's method.
fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let mut x = 1u128 << (n.ilog2() / 2 + 1);
    loop {
        let next = (x + n / x) / 2;
        if next >= x {
            return x;
        }
        x = next;
    }
}

/// log2(num/den) as a Q40 fixed-point integer, num/den > 0.
///
/// Classic shift-and-square: normalize the ratio into [1, 2), then each
/// squaring step yields one fractional bit.
fn log2_q40(num: u128, den: u128) -> i128 {
    debug_assert!(num > 0 && den > 0);
    // v is the ratio in Q64.
    let mut v = (num << 64) / den;
    let one: u128 = 1 << 64;
    let two: u128 = 1 << 65;

    let mut int_part: i128 = 0;
    while v >= two {
        v >>= 1;
        int_part += 1;
    }
    while v < one {
        v <<= 1;
        int_part -= 1;
    }

    let mut frac: i128 = 0;
    for _ in 0..LOG_FRAC_BITS {
        // Square in Q64: (v * v) >> 64. v < 2^65, so square via halves to
        // stay inside u128.
        let hi = v >> 32;
        let lo = v & 0xFFFF_FFFF;
        let sq = (hi * hi) + ((hi * lo) >> 31) + ((lo * lo) >> 64);
        v = sq;
        frac <<= 1;
        if v >= two {
            v >>= 1;
            frac |= 1;
        }
    }
    (int_part << LOG_FRAC_BITS) + frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantum_display() {
        assert_eq!(Fixed::from_micros(1_250_000).to_string(), "1.25");
        assert_eq!(Fixed::from_micros(-500_000).to_string(), "-0.5");
        assert_eq!(Fixed::from_int(3).to_string(), "3");
    }

    #[test]
    fn mul_rounds_half_to_even() {
        // 0.0000015 * 1 → tie at 1.5 micro → rounds to 2 (even).
        let a = Fixed::from_micros(3);
        let half = Fixed::from_micros(500_000);
        assert_eq!(a.mul(half).micros(), 2);
        // 0.0000025 * 0.5 = 1.25 micro → rounds to 1.
        let b = Fixed::from_micros(5);
        assert_eq!(b.mul(half).micros(), 2); // 2.5 → even → 2
        let c = Fixed::from_micros(1);
        assert_eq!(c.mul(half).micros(), 0); // 0.5 → even → 0
    }

    #[test]
    fn sqrt_matches_known_squares() {
        assert_eq!(Fixed::from_int(4).sqrt(), Fixed::from_int(2));
        assert_eq!(Fixed::from_int(9).sqrt(), Fixed::from_int(3));
        assert_eq!(Fixed::from_micros(250_000).sqrt(), Fixed::from_micros(500_000));
        assert_eq!(Fixed::ZERO.sqrt(), Fixed::ZERO);
        // sqrt(2) ≈ 1.414214
        assert_eq!(Fixed::from_int(2).sqrt().micros(), 1_414_214);
    }

    #[test]
    fn ln_1p_matches_reference_values() {
        // ln(2) ≈ 0.693147
        let one = Fixed::ONE;
        let got = one.ln_1p().micros();
        assert!((got - 693_147).abs() <= 1, "ln(2) off: {got}");
        // ln(1) = 0
        assert_eq!(Fixed::ZERO.ln_1p(), Fixed::ZERO);
        // ln(1 + e-1) = 1: e-1 ≈ 1.718282
        let em1 = Fixed::from_micros(1_718_282);
        let got = em1.ln_1p().micros();
        assert!((got - 1_000_000).abs() <= 1, "ln(e) off: {got}");
        // ln(101) ≈ 4.615121
        let hundred = Fixed::from_int(100);
        let got = hundred.ln_1p().micros();
        assert!((got - 4_615_121).abs() <= 1, "ln(101) off: {got}");
    }

    #[test]
    fn floor_int_on_negatives() {
        assert_eq!(Fixed::from_micros(-1).floor_int(), -1);
        assert_eq!(Fixed::from_micros(1).floor_int(), 0);
        assert_eq!(Fixed::from_int(2).floor_int(), 2);
    }

    #[test]
    fn round_half_even_cases() {
        assert_eq!(round_half_even(5, 2), 2); // 2.5 → 2
        assert_eq!(round_half_even(7, 2), 4); // 3.5 → 4
        assert_eq!(round_half_even(-5, 2), -2); // -2.5 → -2
        assert_eq!(round_half_even(3, 2), 2); // 1.5 → 2
    }
}
