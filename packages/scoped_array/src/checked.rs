//! Overflow-checked size arithmetic.
//!
//! Every size the growth path computes goes through these functions. Two implementations
//! exist: the default uses the checked integer intrinsics, while the
//! `portable-overflow-checks` feature swaps in a square-root based test that does not depend
//! on them. The choice is made once, at build time, and both report overflow identically.

#[cfg(not(feature = "portable-overflow-checks"))]
use intrinsic as selected;
#[cfg(feature = "portable-overflow-checks")]
use portable as selected;

/// Multiplies two sizes, returning `None` if the product is not representable as `usize`.
///
/// # Examples
///
/// ```
/// use scoped_array::safe_multiply;
///
/// assert_eq!(safe_multiply(32, 4), Some(128));
/// assert_eq!(safe_multiply(usize::MAX, 2), None);
/// ```
#[inline]
#[must_use]
pub fn safe_multiply(a: usize, b: usize) -> Option<usize> {
    selected::multiply(a, b)
}

/// Adds two sizes, returning `None` if the sum is not representable as `usize`.
///
/// # Examples
///
/// ```
/// use scoped_array::safe_add;
///
/// assert_eq!(safe_add(16, 16), Some(32));
/// assert_eq!(safe_add(usize::MAX, 1), None);
/// ```
#[inline]
#[must_use]
pub fn safe_add(a: usize, b: usize) -> Option<usize> {
    selected::add(a, b)
}

#[cfg(any(test, not(feature = "portable-overflow-checks")))]
mod intrinsic {
    #[inline]
    pub(crate) fn multiply(a: usize, b: usize) -> Option<usize> {
        a.checked_mul(b)
    }

    #[inline]
    pub(crate) fn add(a: usize, b: usize) -> Option<usize> {
        a.checked_add(b)
    }
}

#[cfg(any(test, feature = "portable-overflow-checks"))]
mod portable {
    /// `sqrt(usize::MAX + 1)`. If both factors are below this, their product always fits.
    const MUL_NO_OVERFLOW: usize = 1 << (usize::BITS / 2);

    #[inline]
    #[expect(
        clippy::integer_division,
        clippy::arithmetic_side_effects,
        reason = "a is checked to be non-zero and truncation is the point of the test"
    )]
    pub(crate) fn multiply(a: usize, b: usize) -> Option<usize> {
        if (a >= MUL_NO_OVERFLOW || b >= MUL_NO_OVERFLOW) && a > 0 && usize::MAX / a < b {
            return None;
        }

        Some(a.wrapping_mul(b))
    }

    #[inline]
    pub(crate) fn add(a: usize, b: usize) -> Option<usize> {
        // MAX - a cannot wrap, whatever a is.
        if b > usize::MAX.wrapping_sub(a) {
            return None;
        }

        Some(a.wrapping_add(b))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::arithmetic_side_effects,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const HALF_BITS: u32 = usize::BITS / 2;
    const SQRT_LIMIT: usize = 1 << HALF_BITS;

    /// Inputs that sit on the interesting boundaries of both implementations.
    fn edge_values() -> Vec<usize> {
        vec![
            0,
            1,
            2,
            16,
            SQRT_LIMIT - 1,
            SQRT_LIMIT,
            SQRT_LIMIT + 1,
            usize::MAX / 2,
            usize::MAX / 2 + 1,
            usize::MAX - 16,
            usize::MAX - 1,
            usize::MAX,
        ]
    }

    #[test]
    fn multiply_reports_overflow() {
        assert_eq!(safe_multiply(0, usize::MAX), Some(0));
        assert_eq!(safe_multiply(usize::MAX, 0), Some(0));
        assert_eq!(safe_multiply(1, usize::MAX), Some(usize::MAX));
        assert!(safe_multiply(SQRT_LIMIT - 1, SQRT_LIMIT - 1).is_some());
        assert_eq!(safe_multiply(SQRT_LIMIT, SQRT_LIMIT), None);
        assert_eq!(safe_multiply(usize::MAX / 16 + 1, 16), None);
        assert_eq!(safe_multiply(usize::MAX / 16, 16), Some(usize::MAX / 16 * 16));
    }

    #[test]
    fn add_uses_both_operands() {
        // Growth always adds 16 but the helper must not assume that.
        assert_eq!(safe_add(5, 3), Some(8));
        assert_eq!(safe_add(0, 0), Some(0));
        assert_eq!(safe_add(0, usize::MAX), Some(usize::MAX));
        assert_eq!(safe_add(usize::MAX - 16, 16), Some(usize::MAX));
        assert_eq!(safe_add(usize::MAX - 15, 16), None);
        assert_eq!(safe_add(usize::MAX, usize::MAX), None);
    }

    #[test]
    fn implementations_agree_on_edges() {
        for a in edge_values() {
            for b in edge_values() {
                assert_eq!(
                    portable::multiply(a, b),
                    intrinsic::multiply(a, b),
                    "multiply({a}, {b})"
                );
                assert_eq!(portable::add(a, b), intrinsic::add(a, b), "add({a}, {b})");
            }
        }
    }

    proptest! {
        #[test]
        fn implementations_agree(a in any::<usize>(), b in any::<usize>()) {
            prop_assert_eq!(portable::multiply(a, b), intrinsic::multiply(a, b));
            prop_assert_eq!(portable::add(a, b), intrinsic::add(a, b));
        }

        #[test]
        fn implementations_agree_near_square_root(
            a in (SQRT_LIMIT - 1024)..(SQRT_LIMIT + 1024),
            b in (SQRT_LIMIT - 1024)..(SQRT_LIMIT + 1024),
        ) {
            prop_assert_eq!(portable::multiply(a, b), intrinsic::multiply(a, b));
        }
    }
}
