//! Integer helpers used for sizing addresses and registers.

/// Number of bits needed to distinguish `n` values. Always at least one.
pub fn bits_needed_for(n: u64) -> u64 {
    std::cmp::max(ceil_log2(n), 1)
}

/// Smallest `k` such that `2^k >= n`. Zero for `n <= 1`.
pub fn ceil_log2(n: u64) -> u64 {
    if n <= 1 {
        0
    } else {
        (u64::BITS - (n - 1).leading_zeros()) as u64
    }
}
