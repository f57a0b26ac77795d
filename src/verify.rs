//! # Verifier
//!
//! Walks every free list and every chunk and checks that the heap's
//! structural invariants still hold: free lists are cycle-free and
//! correctly bucketed, boundary tags agree with their neighbors' sizes, and
//! fenceposts sit exactly where a chunk begins and ends. Returns a plain
//! `bool` — failures are logged at `warn` level with enough detail to find
//! the offending block, but nothing here aborts the process. Callers that
//! want a crash-on-corruption policy call [`crate::error::fatal`]
//! themselves based on the result.

use crate::chunk::ChunkList;
use crate::freelist::FreeListRegistry;
use crate::header::{BlockState, Header};
use core::ptr::NonNull;

/// Run every structural check and report whether the heap is consistent.
#[must_use]
pub fn run(freelist: &mut FreeListRegistry, chunks: &ChunkList) -> bool {
    let lists_ok = verify_freelists(freelist);
    let chunks_ok = verify_chunks(chunks);
    lists_ok && chunks_ok
}

/// Check every free list for cycles, correct bucketing, and consistent
/// `prev`/`next` links.
fn verify_freelists(freelist: &mut FreeListRegistry) -> bool {
    let mut ok = true;
    for (class, sentinel) in freelist.classes() {
        if detect_cycle(sentinel) {
            log::warn!("cycle detected in free list class {class}");
            ok = false;
            continue;
        }
        ok &= verify_list_members(class, sentinel);
    }
    ok
}

/// Floyd's cycle detection over a circular list starting and ending at
/// `sentinel`.
fn detect_cycle(sentinel: NonNull<Header>) -> bool {
    let mut slow = sentinel;
    let mut fast = sentinel;
    loop {
        // SAFETY: every node in a free list, sentinel included, has a
        // valid `next` pointer into the same list.
        fast = unsafe { NonNull::new_unchecked(fast.as_ref().next) };
        if fast == sentinel {
            return false;
        }
        fast = unsafe { NonNull::new_unchecked(fast.as_ref().next) };
        if fast == sentinel {
            return false;
        }
        slow = unsafe { NonNull::new_unchecked(slow.as_ref().next) };
        if fast == slow {
            return true;
        }
    }
}

fn verify_list_members(class: usize, sentinel: NonNull<Header>) -> bool {
    let mut ok = true;
    let mut cursor = unsafe { sentinel.as_ref().next };
    while cursor != sentinel.as_ptr() {
        let node = unsafe { NonNull::new_unchecked(cursor) };
        unsafe {
            if node.as_ref().state() != BlockState::Unallocated {
                log::warn!("free list {class} contains a non-free block");
                ok = false;
            }
            if FreeListRegistry::class_for(node.as_ref().size()) != class {
                log::warn!("block in free list {class} belongs to a different size class");
                ok = false;
            }
            let next = NonNull::new_unchecked(node.as_ref().next);
            if next.as_ref().prev != node.as_ptr() {
                log::warn!("broken back-link after block in free list {class}");
                ok = false;
            }
            cursor = node.as_ref().next;
        }
    }
    ok
}

/// Walk every recorded chunk from its left fencepost to its right fencepost
/// and check that boundary tags, sizes, and fencepost placement agree.
fn verify_chunks(chunks: &ChunkList) -> bool {
    let mut ok = true;
    for chunk in chunks.iter() {
        unsafe {
            if chunk.start.as_ref().state() != BlockState::Fencepost
                || chunk.end.as_ref().state() != BlockState::Fencepost
            {
                log::warn!("chunk boundary is not a fencepost");
                ok = false;
                continue;
            }

            let mut cursor = chunk.start;
            while cursor != chunk.end {
                let right = crate::header::right(cursor);
                if right.as_ref().left_size != cursor.as_ref().size() {
                    log::warn!(
                        "boundary tag mismatch at {:p}: right neighbor reports left_size {}, actual size is {}",
                        cursor.as_ptr(),
                        right.as_ref().left_size,
                        cursor.as_ref().size()
                    );
                    ok = false;
                }
                if right.as_ptr() <= cursor.as_ptr() || right.as_ptr() > chunk.end.as_ptr() {
                    log::warn!("chunk walk failed to make forward progress toward its end fencepost");
                    ok = false;
                    break;
                }
                cursor = right;
            }
        }
    }
    ok
}
