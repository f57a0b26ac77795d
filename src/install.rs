//! # Chunk installer & cross-chunk coalescer
//!
//! When the heap needs to grow, the new chunk's fenceposts are checked
//! against the previous chunk's right fencepost. If the OS handed back
//! address space immediately following the last chunk, the two chunks are
//! glued into one: their adjoining fenceposts are dissolved and the free
//! space on either side of the seam is merged into a single free block.
//! Otherwise the new chunk stands alone as an "island" and is tracked
//! separately.

use crate::chunk::{self, Chunk, ChunkList};
use crate::error::AllocError;
use crate::freelist::FreeListRegistry;
use crate::header::{self, BlockState, Header};
use crate::os::ChunkSource;
use core::ptr::NonNull;

/// Acquire a new chunk able to hold `min_payload` bytes, install it, and
/// fold it into `chunks`/`freelist`, gluing it onto the previous chunk when
/// the OS happened to return contiguous address space.
///
/// # Errors
/// Propagates [`chunk::install`] failures.
pub fn extend(
    source: &mut impl ChunkSource,
    chunks: &mut ChunkList,
    freelist: &mut FreeListRegistry,
    min_payload: usize,
) -> Result<(), AllocError> {
    let (new_chunk, new_free) = chunk::install(source, min_payload)?;

    let previous_end = chunks.iter().last().map(|c| c.end);

    match previous_end {
        Some(old_end) if unsafe { header::right(old_end) } == new_chunk.start => {
            unsafe { glue(freelist, old_end, new_chunk, new_free) };
            chunks.extend_last(new_chunk.end);
        }
        _ => {
            unsafe { freelist.insert(new_free) };
            chunks.record(new_chunk);
        }
    }

    Ok(())
}

/// Dissolve the two fenceposts at the seam between an existing chunk
/// (ending at `old_end`) and a freshly installed, address-contiguous
/// `new_chunk`, merging the reclaimed space with whichever of the old
/// chunk's last block / the new chunk's first block are free.
///
/// # Safety
/// `old_end` must be the right fencepost of a chunk whose next byte is the
/// first byte of `new_chunk`.
unsafe fn glue(
    freelist: &mut FreeListRegistry,
    old_end: NonNull<Header>,
    new_chunk: Chunk,
    new_free: NonNull<Header>,
) {
    let left_of_seam = unsafe { header::left(old_end) };
    let left_is_free = unsafe { left_of_seam.as_ref().state() } == BlockState::Unallocated;

    // The two fencepost headers (old_end and new_chunk.start) are reclaimed
    // as raw space; together with `new_free` they form the right half of
    // the merged block.
    let reclaimed = unsafe { old_end.as_ref().size() } + unsafe { new_chunk.start.as_ref().size() };
    let right_half_size = reclaimed + unsafe { new_free.as_ref().size() };

    if left_is_free {
        unsafe { FreeListRegistry::remove(left_of_seam) };
        let combined = unsafe { left_of_seam.as_ref().size() } + right_half_size;
        let mut merged = left_of_seam;
        unsafe {
            merged.as_mut().set_size(combined);
            let mut right = header::right(merged);
            right.as_mut().left_size = combined;
            freelist.insert(merged);
        }
    } else {
        let left_size = unsafe { left_of_seam.as_ref().size() };
        let merged = old_end;
        unsafe {
            Header::write(merged, right_half_size, BlockState::Unallocated, left_size);
            let mut right = header::right(merged);
            right.as_mut().left_size = right_half_size;
            freelist.insert(merged);
        }
    }
}
