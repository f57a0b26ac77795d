//! # Deallocator: double-free detection and coalescing
//!
//! Freeing a block checks both neighbors in address order and merges with
//! whichever of them (if any) are themselves free, so that adjacent free
//! space never stays fragmented across a `free` call. Fenceposts never
//! satisfy `state() == Unallocated`, so they naturally stop coalescing at
//! chunk boundaries without any special-casing here.

use crate::error::fatal;
use crate::freelist::FreeListRegistry;
use crate::header::{self, BlockState, Header};
use core::ptr::NonNull;

/// Free `block`, coalescing it with any free neighbors and reinserting the
/// result into `freelist`.
///
/// # Safety
/// `block` must be a pointer this allocator previously handed out via its
/// public API and must not have been freed since.
///
/// Aborts the process via [`fatal`] if `block` is not currently marked
/// allocated, which means either a double free or a corrupted/foreign
/// pointer.
pub unsafe fn free(freelist: &mut FreeListRegistry, block: NonNull<Header>) {
    match unsafe { block.as_ref().state() } {
        BlockState::Allocated => {}
        BlockState::Unallocated => fatal("double free detected"),
        BlockState::Fencepost => fatal("attempt to free a fencepost"),
    }

    let left = unsafe { header::left(block) };
    let right = unsafe { header::right(block) };
    let left_free = unsafe { left.as_ref().state() } == BlockState::Unallocated;
    let right_free = unsafe { right.as_ref().state() } == BlockState::Unallocated;

    unsafe {
        match (left_free, right_free) {
            (false, false) => {
                freelist.insert(block);
            }
            (true, false) => {
                FreeListRegistry::remove(left);
                merge_into(left, block);
                freelist.insert(left);
            }
            (false, true) => {
                FreeListRegistry::remove(right);
                merge_into(block, right);
                freelist.insert(block);
            }
            (true, true) => {
                FreeListRegistry::remove(left);
                FreeListRegistry::remove(right);
                merge_into(left, block);
                merge_into(left, right);
                freelist.insert(left);
            }
        }
    }
}

/// Absorb `donor` into `keep`, which must be `donor`'s immediate left
/// neighbor. Updates `keep`'s size and the boundary tag of whatever now
/// sits to `keep`'s right.
///
/// # Safety
/// `keep` and `donor` must be adjacent in address order with `donor`
/// immediately to the right of `keep`.
unsafe fn merge_into(mut keep: NonNull<Header>, donor: NonNull<Header>) {
    unsafe {
        let combined = keep.as_ref().size() + donor.as_ref().size();
        keep.as_mut().set_size(combined);
        let mut new_right = header::right(keep);
        new_right.as_mut().left_size = combined;
    }
}
