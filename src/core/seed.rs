//! Deterministic Entity Seeds
//!
//! Every peer derives the per-entity AI seeds for a tick from the shared
//! loop counter alone. No local randomness is involved, so two peers that
//! agree on the loop counter agree on every entity's behaviour.

/// Seed for one entity at a given loop count.
///
/// `rotr(loop_count, 8) + entity`, wrapping.
///
/// # Example
///
/// ```
/// use lockstep_sync::core::seed::entity_seed;
///
/// assert_eq!(entity_seed(0x0000_0100, 0), 1);
/// assert_eq!(entity_seed(0x0000_0100, 5), 6);
/// ```
#[inline]
pub fn entity_seed(loop_count: u32, entity: usize) -> u32 {
    loop_count.rotate_right(8).wrapping_add(entity as u32)
}

/// Iterator over the seeds of entities `0..count` at `loop_count`.
pub fn entity_seeds(loop_count: u32, count: usize) -> impl Iterator<Item = u32> {
    let base = loop_count.rotate_right(8);
    (0..count).map(move |i| base.wrapping_add(i as u32))
}

/// Loop counter implied by an absolute turn count.
///
/// Turns are collected every `4 × update_rate` ticks, so the loop counter
/// at the start of turn `n` is `4 × n × update_rate`.
#[inline]
pub fn loop_count_for_turn(turn: u32, update_rate: u32) -> u32 {
    4u32.wrapping_mul(turn).wrapping_mul(update_rate)
}

// =============================================================================
// TESTS
// =============================================================================
