//! Block-size policy.
//!
//! A block takes the largest power of two not exceeding the pending backlog,
//! capped at `2^max_exponent`.

/// Default cap exponent (blocks of at most 2^20 transactions).
pub const DEFAULT_MAX_EXPONENT: u32 = 20;

/// Number of transactions to put in the next block, or 0 if none are available.
pub fn calculate_block_length(available: u64, max_exponent: u32) -> u64 {
    if available == 0 {
        return 0;
    }

    let floor_exponent = u64::BITS - 1 - available.leading_zeros();
    1u64 << floor_exponent.min(max_exponent)
}
