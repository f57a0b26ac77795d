//! # Chunk provider
//!
//! Turns a raw span of bytes from the [`crate::os::ChunkSource`] into a
//! well-formed heap chunk: a left fencepost, one large free block spanning
//! everything in between, and a right fencepost. Fenceposts are
//! permanent, zero-payload sentinels that stop [`crate::header::left`] and
//! [`crate::header::right`] from ever walking off the end of a chunk.

use crate::config;
use crate::error::AllocError;
use crate::header::{BlockState, Header, HEADER_SIZE};
use crate::os::ChunkSource;
use core::ptr::NonNull;

/// A single OS-backed span of the heap, delimited by two fenceposts.
#[derive(Clone, Copy)]
pub struct Chunk {
    /// Left fencepost: the first header in the chunk.
    pub start: NonNull<Header>,
    /// Right fencepost: the last header in the chunk.
    pub end: NonNull<Header>,
}

// SAFETY: `start`/`end` point at headers within the same heap, whose access
// is always serialized by the `Mutex` wrapping the owning `Heap` (see
// `crate::heap::global`).
unsafe impl Send for Chunk {}

/// Acquire at least `min_payload` bytes of new chunk space from `source`,
/// lay down its fenceposts, and return both the chunk descriptor and the
/// one large free block it starts out with.
///
/// # Errors
/// Propagates [`crate::os::ChunkSource::acquire`] failures.
pub fn install(
    source: &mut impl ChunkSource,
    min_payload: usize,
) -> Result<(Chunk, NonNull<Header>), AllocError> {
    let needed = min_payload + 2 * HEADER_SIZE;
    let (region, region_size) = source.acquire(needed)?;
    debug_assert!(region_size >= needed);
    debug_assert_eq!(region.as_ptr() as usize % config::ALIGNMENT, 0);

    let left_fence: NonNull<Header> = region.cast();
    // SAFETY: `region` is `region_size` freshly committed, aligned bytes;
    // `left_fence` is the first `HEADER_SIZE` of it.
    unsafe { Header::write(left_fence, HEADER_SIZE, BlockState::Fencepost, 0) };

    let free_size = region_size - 2 * HEADER_SIZE;
    // SAFETY: offsetting by `HEADER_SIZE` stays within `region_size` bytes.
    let free_block = unsafe { crate::header::offset(left_fence, HEADER_SIZE as isize) };
    unsafe { Header::write(free_block, free_size, BlockState::Unallocated, HEADER_SIZE) };

    // SAFETY: offsetting by `HEADER_SIZE + free_size` lands exactly on the
    // last `HEADER_SIZE` bytes of `region`.
    let right_fence = unsafe { crate::header::offset(free_block, free_size as isize) };
    unsafe { Header::write(right_fence, HEADER_SIZE, BlockState::Fencepost, free_size) };

    Ok((
        Chunk {
            start: left_fence,
            end: right_fence,
        },
        free_block,
    ))
}

/// Fixed-capacity record of chunks acquired so far, used only by
/// [`crate::verify`]. Beyond [`config::MAX_OS_CHUNKS`] entries, further
/// chunks still back live allocations but are no longer walked during
/// verification, matching the reference allocator's fixed-size chunk list.
#[derive(Default)]
pub struct ChunkList {
    chunks: Vec<Chunk>,
}

impl ChunkList {
    #[must_use]
    pub fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    pub fn record(&mut self, chunk: Chunk) {
        if self.chunks.len() < config::MAX_OS_CHUNKS {
            self.chunks.push(chunk);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    /// Replace the last recorded chunk's `end` fencepost, used when a newly
    /// acquired chunk is glued onto the end of the previous one.
    pub fn extend_last(&mut self, new_end: NonNull<Header>) {
        if let Some(last) = self.chunks.last_mut() {
            last.end = new_end;
        }
    }
}
