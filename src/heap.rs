//! # The heap: process-wide state and its public operations
//!
//! [`Heap`] owns everything that makes up the allocator's state: the chunk
//! source, the chunk list, and the free-list registry. It is generic over
//! [`ChunkSource`] so tests can swap in [`crate::os::test_support::FakeChunkSource`]
//! without touching a single real page of memory.
//!
//! A process only ever needs one heap, so [`global`] wraps a single
//! [`Heap<MmapRegionSource>`] behind a [`Mutex`] in a `static`. The heap
//! itself starts out only partially built — its free-list sentinels are not
//! yet self-referential, because a self-pointer computed before the value
//! reaches its final static storage would be pointing at a stack temporary
//! that is about to move. [`Heap::ensure_init`] fixes that up lazily, the
//! first time the lock is taken, following the same pattern the reference
//! allocator uses for its own static heap.

use crate::allocate::{self, MIN_BLOCK_SIZE};
use crate::chunk::ChunkList;
use crate::deallocate;
use crate::error::{fatal, AllocError};
use crate::freelist::FreeListRegistry;
use crate::header;
use crate::install;
use crate::os::{ChunkSource, MmapRegionSource};
use crate::verify;
use core::ptr::NonNull;
use std::sync::{Mutex, OnceLock};

/// All process-wide allocator state, generic over where chunks come from.
pub struct Heap<S: ChunkSource> {
    source: S,
    freelist: FreeListRegistry,
    chunks: ChunkList,
    initialized: bool,
}

impl<S: ChunkSource> Heap<S> {
    /// Build a heap around `source`. Does not touch `source` yet; the first
    /// chunk is only acquired lazily, on first use.
    pub fn new(source: S) -> Self {
        Self {
            source,
            freelist: FreeListRegistry::new_uninit(),
            chunks: ChunkList::new(),
            initialized: false,
        }
    }

    /// Finish constructing the free-list sentinels and acquire the first
    /// chunk, if this hasn't happened yet.
    ///
    /// Must only be called while holding whatever lock guards this `Heap`
    /// for the rest of the program's run, since it relies on `self` never
    /// moving again once its sentinels have been made self-referential.
    fn ensure_init(&mut self) -> Result<(), AllocError> {
        if self.initialized {
            return Ok(());
        }
        // SAFETY: this `Heap` is behind a lock in its final static storage
        // by the time any caller can reach `ensure_init`.
        unsafe { self.freelist.init() };
        install::extend(&mut self.source, &mut self.chunks, &mut self.freelist, MIN_BLOCK_SIZE)?;
        self.initialized = true;
        log::trace!("heap initialized with first chunk");
        Ok(())
    }

    /// Allocate at least `size` bytes, growing the heap as needed.
    ///
    /// Returns `Ok(None)` for `size == 0` rather than handing back a real
    /// block, per the allocator's input-degenerate handling: a zero-size
    /// request is a silent no-op, not an error.
    ///
    /// # Errors
    /// Returns [`AllocError`] if `size` cannot be satisfied, including when
    /// the OS collaborator cannot provide more address space.
    pub fn allocate(&mut self, size: usize) -> Result<Option<NonNull<u8>>, AllocError> {
        if size == 0 {
            return Ok(None);
        }

        self.ensure_init()?;
        let actual = allocate::round_size(size);

        loop {
            if let Some(found) = allocate::find(&mut self.freelist, actual) {
                log::trace!("allocated {actual} bytes at {:p}", found.block.as_ptr());
                return Ok(Some(header::to_payload(found.block)));
            }
            install::extend(&mut self.source, &mut self.chunks, &mut self.freelist, actual)?;
        }
    }

    /// Allocate `size` zeroed bytes. See [`Self::allocate`] for the
    /// `size == 0` case.
    ///
    /// # Errors
    /// See [`Self::allocate`].
    pub fn allocate_zeroed(&mut self, size: usize) -> Result<Option<NonNull<u8>>, AllocError> {
        let Some(ptr) = self.allocate(size)? else {
            return Ok(None);
        };
        // SAFETY: `allocate` just returned a fresh, writable region of at
        // least `size` bytes.
        unsafe { ptr.as_ptr().write_bytes(0, size) };
        Ok(Some(ptr))
    }

    /// Free a pointer previously returned by this heap.
    ///
    /// # Safety
    /// `ptr` must have come from this `Heap`'s `allocate`/`allocate_zeroed`/
    /// `reallocate` and must not already have been freed.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>) {
        let block = unsafe { header::from_payload(ptr) };
        unsafe { deallocate::free(&mut self.freelist, block) };
    }

    /// Resize the allocation at `ptr` to `new_size` bytes, preserving the
    /// lesser of its old and new payload capacities and freeing the old
    /// pointer. `new_size == 0` frees `ptr` and returns `Ok(None)`, the same
    /// input-degenerate handling as [`Self::allocate`].
    ///
    /// # Safety
    /// `ptr` must have come from this `Heap` and must not already have been
    /// freed.
    ///
    /// # Errors
    /// See [`Self::allocate`].
    pub unsafe fn reallocate(
        &mut self,
        ptr: NonNull<u8>,
        new_size: usize,
    ) -> Result<Option<NonNull<u8>>, AllocError> {
        if new_size == 0 {
            unsafe { self.free(ptr) };
            return Ok(None);
        }

        let old_block = unsafe { header::from_payload(ptr) };
        let old_capacity = unsafe { old_block.as_ref().size() } - header::HEADER_SIZE;

        let new_ptr = self
            .allocate(new_size)?
            .expect("allocate(new_size) with new_size > 0 always returns Some");
        let copy_len = old_capacity.min(new_size);
        // SAFETY: `ptr` has at least `old_capacity` readable bytes, and
        // `new_ptr` has at least `new_size` writable bytes; the two
        // allocations never overlap.
        unsafe {
            core::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), copy_len);
            self.free(ptr);
        }
        Ok(Some(new_ptr))
    }

    /// Check every structural invariant of the heap. See [`crate::verify`].
    #[must_use]
    pub fn verify(&mut self) -> bool {
        verify::run(&mut self.freelist, &self.chunks)
    }
}

static HEAP: OnceLock<Mutex<Heap<MmapRegionSource>>> = OnceLock::new();

/// The process-wide heap, created (but not yet chunk-backed) on first
/// access.
pub fn global() -> &'static Mutex<Heap<MmapRegionSource>> {
    HEAP.get_or_init(|| {
        let source = MmapRegionSource::new()
            .unwrap_or_else(|err| fatal(format!("failed to reserve heap address space: {err}")));
        Mutex::new(Heap::new(source))
    })
}

/// Lock the global heap, recovering from a poisoned lock rather than
/// propagating the panic: a prior panic inside the critical section does
/// not, by itself, mean the heap's structural invariants were left broken
/// (most operations here either complete atomically from the heap's point
/// of view or call [`fatal`] directly on real corruption).
pub fn lock() -> std::sync::MutexGuard<'static, Heap<MmapRegionSource>> {
    global().lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os::test_support::FakeChunkSource;

    fn test_heap() -> Heap<FakeChunkSource> {
        Heap::new(FakeChunkSource::new())
    }

    #[test]
    fn allocate_then_free_round_trips_and_verifies() {
        let mut heap = test_heap();
        let ptr = heap.allocate(64).unwrap().expect("size > 0 should allocate");
        assert!(heap.verify());
        unsafe { heap.free(ptr) };
        assert!(heap.verify());
    }

    #[test]
    fn allocate_zero_size_is_a_no_op() {
        let mut heap = test_heap();
        assert!(heap.allocate(0).unwrap().is_none());
        assert!(heap.allocate_zeroed(0).unwrap().is_none());
        assert!(heap.verify());
    }

    #[test]
    fn allocate_zeroed_is_actually_zero() {
        let mut heap = test_heap();
        let ptr = heap
            .allocate_zeroed(128)
            .unwrap()
            .expect("size > 0 should allocate");
        let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), 128) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn reallocate_preserves_prefix() {
        let mut heap = test_heap();
        let ptr = heap.allocate(16).unwrap().expect("size > 0 should allocate");
        unsafe {
            for i in 0..16u8 {
                ptr.as_ptr().add(i as usize).write(i);
            }
        }
        let grown = unsafe { heap.reallocate(ptr, 256).unwrap() }.expect("new_size > 0");
        let bytes = unsafe { core::slice::from_raw_parts(grown.as_ptr(), 16) };
        assert_eq!(bytes, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);
        unsafe { heap.free(grown) };
        assert!(heap.verify());
    }

    #[test]
    fn reallocate_to_zero_frees_and_returns_none() {
        let mut heap = test_heap();
        let ptr = heap.allocate(32).unwrap().expect("size > 0 should allocate");
        let result = unsafe { heap.reallocate(ptr, 0).unwrap() };
        assert!(result.is_none());
        assert!(heap.verify());
    }

    #[test]
    fn many_allocations_trigger_growth_and_still_verify() {
        let mut heap = test_heap();
        let mut ptrs = Vec::new();
        for _ in 0..200 {
            ptrs.push(heap.allocate(32).unwrap().expect("size > 0 should allocate"));
        }
        assert!(heap.verify());
        for ptr in ptrs {
            unsafe { heap.free(ptr) };
        }
        assert!(heap.verify());
    }
}
