//! A boundary-tagged, segregated free-list heap allocator.
//!
//! ```text
//!  chunk                                                         chunk
//!  +------+----------------------------------------------+------+
//!  | fence| header | payload || header | payload | ...    | fence|
//!  +------+----------------------------------------------+------+
//!    ^ left_size/right() link every header to its neighbors in O(1),
//!      independent of whatever free list (if any) it sits on.
//! ```
//!
//! Free blocks of the same size share a size class ([`freelist`]); classes
//! below the largest are exact-size buckets, the last is a catch-all
//! searched first-fit. Allocation ([`allocate`]) rounds a request up to a
//! block size and either pops an exact match or splits a larger block.
//! Freeing ([`deallocate`]) coalesces with whichever neighbors are
//! themselves free. When no free block is large enough, [`install`] asks
//! the OS collaborator ([`os`]) for more address space and glues it onto
//! the heap, merging across the old/new chunk boundary when the OS handed
//! back contiguous memory.
//!
//! The crate exposes both a direct, lock-protected API ([`allocate`],
//! [`free`], [`allocate_zeroed`], [`reallocate`], [`verify`] — thin
//! wrappers over [`heap::lock`]) and a [`GlobalAlloc`] implementation
//! ([`SegHeap`]) for use as `#[global_allocator]`.

#![warn(clippy::pedantic)]

pub mod allocate;
pub mod chunk;
pub mod config;
pub mod deallocate;
pub mod error;
pub mod freelist;
pub mod header;
pub mod heap;
pub mod install;
pub mod os;
pub mod verify;

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;
use error::AllocError;

/// Allocate `size` bytes from the process-wide heap.
///
/// Returns `Ok(None)` for `size == 0` instead of a real block.
///
/// # Errors
/// Returns [`AllocError`] if `size` cannot be satisfied.
pub fn allocate(size: usize) -> Result<Option<NonNull<u8>>, AllocError> {
    heap::lock().allocate(size)
}

/// Allocate `size` zeroed bytes from the process-wide heap.
///
/// Returns `Ok(None)` for `size == 0` instead of a real block.
///
/// # Errors
/// Returns [`AllocError`] if `size` cannot be satisfied.
pub fn allocate_zeroed(size: usize) -> Result<Option<NonNull<u8>>, AllocError> {
    heap::lock().allocate_zeroed(size)
}

/// Free a pointer previously returned by [`allocate`]/[`allocate_zeroed`]/
/// [`reallocate`].
///
/// # Safety
/// `ptr` must have come from this crate's allocation functions and must
/// not already have been freed. Freeing a pointer twice, or one this heap
/// never produced, aborts the process.
pub unsafe fn free(ptr: NonNull<u8>) {
    unsafe { heap::lock().free(ptr) };
}

/// Resize the allocation at `ptr` to `new_size` bytes. `new_size == 0`
/// frees `ptr` and returns `Ok(None)`.
///
/// # Safety
/// `ptr` must have come from this crate's allocation functions and must
/// not already have been freed.
///
/// # Errors
/// Returns [`AllocError`] if `new_size` cannot be satisfied; on error, the
/// original allocation at `ptr` is left untouched.
pub unsafe fn reallocate(
    ptr: NonNull<u8>,
    new_size: usize,
) -> Result<Option<NonNull<u8>>, AllocError> {
    unsafe { heap::lock().reallocate(ptr, new_size) }
}

/// Check every structural invariant of the process-wide heap.
#[must_use]
pub fn verify() -> bool {
    heap::lock().verify()
}

/// [`GlobalAlloc`] adapter over the process-wide heap, for use as
/// `#[global_allocator]`.
///
/// ```
/// use segheap::SegHeap;
///
/// #[global_allocator]
/// static ALLOCATOR: SegHeap = SegHeap;
/// ```
pub struct SegHeap;

// SAFETY: every method below either succeeds with a pointer from this
// crate's own bookkeeping or returns null, and every `dealloc` call is
// required by the trait's own safety contract to pass back a pointer this
// allocator produced.
unsafe impl GlobalAlloc for SegHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        allocate(layout.size())
            .ok()
            .flatten()
            .map_or(core::ptr::null_mut(), |p| p.as_ptr())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if let Some(ptr) = NonNull::new(ptr) {
            unsafe { free(ptr) };
        }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        allocate_zeroed(layout.size())
            .ok()
            .flatten()
            .map_or(core::ptr::null_mut(), |p| p.as_ptr())
    }

    unsafe fn realloc(&self, ptr: *mut u8, _layout: Layout, new_size: usize) -> *mut u8 {
        let Some(ptr) = NonNull::new(ptr) else {
            return core::ptr::null_mut();
        };
        unsafe { reallocate(ptr, new_size) }
            .ok()
            .flatten()
            .map_or(core::ptr::null_mut(), |p| p.as_ptr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_round_trips() {
        let ptr = allocate(64)
            .expect("allocation should succeed")
            .expect("size > 0 should allocate");
        assert!(verify());
        unsafe { free(ptr) };
        assert!(verify());
    }

    #[test]
    fn public_api_zero_size_returns_none() {
        assert!(allocate(0).expect("allocation should succeed").is_none());
        assert!(allocate_zeroed(0)
            .expect("allocation should succeed")
            .is_none());
    }
}
