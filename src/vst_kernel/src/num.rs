//! Operations for integer and rational numbers, supporting `const fn`
use num_rational::Ratio;

/// Find the greatest common divisor of two given numbers.
pub const fn gcd128(x: u128, y: u128) -> u128 {
    if y == 0 {
        x
    } else {
        gcd128(y, x % y)
    }
}

/// Reduce the given fraction.
pub const fn reduce_ratio128(r: Ratio<u128>) -> Ratio<u128> {
    let gcd = gcd128(*r.numer(), *r.denom());
    Ratio::new_raw(*r.numer() / gcd, *r.denom() / gcd)
}

/// Apply the floor function on the given fractional number.
pub const fn floor_ratio128(r: Ratio<u128>) -> u128 {
    *r.numer() / *r.denom()
}

/// Get the largest value representable by a counter `width` bits wide.
///
/// `width` must be in range `1..=64`.
#[inline]
pub const fn counter_max(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Calculate `later - earlier` modulo `mask + 1`, where `mask` is a value
/// returned by [`counter_max`]. The result is the number of cycles elapsed
/// between two readings of a wrapping counter, assuming the counter wrapped
/// around at most once.
#[inline]
pub const fn wrapping_cycles_between(earlier: u64, later: u64, mask: u64) -> u64 {
    later.wrapping_sub(earlier) & mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn counter_max_known_values() {
        assert_eq!(counter_max(1), 1);
        assert_eq!(counter_max(16), 0xffff);
        assert_eq!(counter_max(32), 0xffff_ffff);
        assert_eq!(counter_max(63), 0x7fff_ffff_ffff_ffff);
        assert_eq!(counter_max(64), u64::MAX);
    }

    #[test]
    fn reduce_known_values() {
        let r = reduce_ratio128(Ratio::new_raw(32_768, 100));
        assert_eq!((*r.numer(), *r.denom()), (8_192, 25));
        assert_eq!(floor_ratio128(r), 327);
    }

    #[quickcheck]
    fn cycles_between_survives_one_wrap(width: u8, start: u64, len: u64) -> bool {
        let width = (width % 64) as u32 + 1;
        let mask = counter_max(width);
        let start = start & mask;
        let len = len & mask;
        let end = start.wrapping_add(len) & mask;
        wrapping_cycles_between(start, end, mask) == len
    }
}
