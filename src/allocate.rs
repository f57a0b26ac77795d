//! # Allocator: size rounding, search, and splitting
//!
//! A request for `n` bytes is rounded up to a block size that can hold both
//! the header and at least `n` bytes of payload, then satisfied either by
//! taking an exact-size free block as-is or by splitting a larger one into
//! a used prefix and a free remainder.

use crate::config::{self, N_LISTS};
use crate::freelist::FreeListRegistry;
use crate::header::{BlockState, Header, HEADER_SIZE};
use core::ptr::NonNull;

/// Smallest block size this allocator ever hands out or keeps free: one
/// header for the block itself, plus one header's worth of minimum payload
/// (so a freed block always has room for its own free-list links).
pub const MIN_BLOCK_SIZE: usize = 2 * HEADER_SIZE;

/// Round a requested payload size up to the block size that will hold it.
#[must_use]
pub fn round_size(requested: usize) -> usize {
    let raw = requested.max(HEADER_SIZE);
    config::align_up(raw + HEADER_SIZE)
}

/// Outcome of a successful search: the block to hand to the caller, split
/// off from a larger free block if needed.
pub struct Found {
    pub block: NonNull<Header>,
}

/// Search `freelist` for a free block of at least `actual_size` bytes.
///
/// Walks every exact-size class from `class_for(actual_size)` up to (but
/// not including) the catch-all class, taking the first non-empty one —
/// its size is either an exact match or, for a higher class, large enough
/// to split. Only once every exact class has come up empty does the
/// catch-all class get a first-fit scan.
///
/// Returns `None` if no sufficiently large free block exists anywhere;
/// the caller is then responsible for growing the heap and retrying.
pub fn find(freelist: &mut FreeListRegistry, actual_size: usize) -> Option<Found> {
    let start_class = FreeListRegistry::class_for(actual_size);

    for class in start_class..N_LISTS - 1 {
        if let Some(block) = freelist.pop_class(class) {
            return Some(if class == start_class {
                debug_assert_eq!(unsafe { block.as_ref().size() }, actual_size);
                finish(block)
            } else {
                split(freelist, block, actual_size)
            });
        }
    }

    let block = freelist.find_first_fit(N_LISTS - 1, actual_size)?;
    Some(split(freelist, block, actual_size))
}

/// Mark `block` allocated and hand it back, with no splitting.
fn finish(mut block: NonNull<Header>) -> Found {
    unsafe { block.as_mut().set_state(BlockState::Allocated) };
    Found { block }
}

/// Split `block` (whose size is `>= actual_size`) into a used prefix of
/// `actual_size` bytes and, if the remainder is large enough to stand on
/// its own, a free suffix reinserted into `freelist`.
fn split(
    freelist: &mut FreeListRegistry,
    block: NonNull<Header>,
    actual_size: usize,
) -> Found {
    let total = unsafe { block.as_ref().size() };
    let remainder = total - actual_size;

    if remainder < MIN_BLOCK_SIZE {
        // Too small to free separately; hand over the whole block.
        return finish(block);
    }

    let mut block = block;
    unsafe {
        block.as_mut().set_size(actual_size);
        block.as_mut().set_state(BlockState::Allocated);

        let suffix = crate::header::offset(block, actual_size as isize);
        Header::write(suffix, remainder, BlockState::Unallocated, actual_size);

        // Fix up the boundary tag of whatever used to sit to the right of
        // `block`; it must now report `remainder` as its left neighbor.
        let mut right_of_suffix = crate::header::right(suffix);
        right_of_suffix.as_mut().left_size = remainder;

        freelist.insert(suffix);
    }

    Found { block }
}
