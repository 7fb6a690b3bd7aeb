/// A strategy computing the next capacity of a growing container.
///
/// Implementations must be monotonically non-decreasing and return a
/// strictly positive capacity from zero.
pub trait GrowthPolicy {
    /// The capacity to grow to from `current`
    fn next(current: usize) -> usize;
}

/// Grows the capacity by one slot at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct Linear;

impl GrowthPolicy for Linear {
    #[inline]
    fn next(current: usize) -> usize {
        current.saturating_add(1)
    }
}

/// Doubles the capacity, starting at two.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exponential;

impl GrowthPolicy for Exponential {
    #[inline]
    fn next(current: usize) -> usize {
        if current == 0 {
            2
        } else {
            current.saturating_mul(2)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn linear_steps_by_one() {
        assert_eq!(Linear::next(0), 1);
        assert_eq!(Linear::next(7), 8);
        assert_eq!(Linear::next(usize::MAX), usize::MAX);
    }

    #[test]
    fn exponential_doubles() {
        assert_eq!(Exponential::next(0), 2);
        assert_eq!(Exponential::next(2), 4);
        assert_eq!(Exponential::next(3), 6);
        assert_eq!(Exponential::next(usize::MAX / 2 + 1), usize::MAX);
    }

    #[test]
    fn policies_never_shrink() {
        for cap in 0..1000 {
            assert!(Linear::next(cap) > cap);
            assert!(Exponential::next(cap) > cap);
        }
    }
}
