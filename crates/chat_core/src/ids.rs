//! Random hex identifiers.

use rand::Rng;

/// Generate a random lowercase hex id of exactly `len` characters.
///
/// Ids are drawn uniformly from `16^(len-1)..16^len`, so the leading
/// character is never zero. Uniqueness is the caller's concern; allocation
/// sites retry on collision against their own id space.
pub fn random_hex_id(len: u32) -> String {
    debug_assert!((1..=15).contains(&len));
    let low = 16u64.pow(len - 1);
    let high = 16u64.pow(len);
    format!("{:x}", rand::thread_rng().gen_range(low..high))
}
