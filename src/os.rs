//! The OS memory-extension collaborator.
//!
//! The heap never calls `mmap`/`mprotect` directly; it asks a
//! [`ChunkSource`] for more contiguous address space. This is the one
//! out-of-scope dependency the component design calls out, and keeping it
//! behind a trait is what lets the coalescing logic in
//! [`crate::install`] be tested against both a real, guaranteed-contiguous
//! provider and a fake that can be told to hand back a disjoint ("island")
//! region on demand.

use crate::error::OsError;
use core::ptr::NonNull;

/// Provides growing, page-backed regions of address space to the heap.
pub trait ChunkSource {
    /// Hand back at least `min_size` freshly committed bytes.
    ///
    /// Implementations are free to round `min_size` up. Whether the
    /// returned region is contiguous with a previous call is reported via
    /// `self.last_chunk_end()`/by comparing the returned start address to
    /// it; the caller does not assume contiguity.
    ///
    /// # Errors
    /// Returns [`OsError`] if the region cannot be committed.
    fn acquire(&mut self, min_size: usize) -> Result<(NonNull<u8>, usize), OsError>;
}

/// Reserves a single large span of virtual address space up front and
/// commits pages into it on demand, emulating the guaranteed-contiguous
/// growth of a classic `sbrk`-style heap without the portability problems
/// of `sbrk` itself.
pub struct MmapRegionSource {
    base: *mut u8,
    reserved: usize,
    committed: usize,
}

// SAFETY: `base` points at address space owned exclusively by this
// `MmapRegionSource`; access to it is always serialized by the `Mutex`
// wrapping the `Heap` that holds it (see `crate::heap::global`).
unsafe impl Send for MmapRegionSource {}

/// Total virtual address space reserved for the growable heap region.
///
/// This is a reservation, not a commitment: pages inside it are mapped
/// `PROT_NONE` until [`MmapRegionSource::acquire`] extends the committed
/// prefix, so the reservation itself costs no physical memory.
const RESERVATION_SIZE: usize = 1 << 34; // 16 GiB of address space

impl MmapRegionSource {
    /// Reserve [`RESERVATION_SIZE`] bytes of address space, uncommitted.
    ///
    /// # Errors
    /// Returns [`OsError::System`] if the initial reservation `mmap` fails.
    pub fn new() -> Result<Self, OsError> {
        // SAFETY: a PROT_NONE, anonymous, private mapping with no fixed
        // address is always safe to request; failure is reported via errno.
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                RESERVATION_SIZE,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(OsError::System(std::io::Error::last_os_error()));
        }
        Ok(Self {
            base: ptr.cast::<u8>(),
            reserved: RESERVATION_SIZE,
            committed: 0,
        })
    }
}

impl Drop for MmapRegionSource {
    fn drop(&mut self) {
        // SAFETY: `base`/`reserved` describe exactly the mapping created in
        // `new`, which this type uniquely owns.
        unsafe {
            libc::munmap(self.base.cast(), self.reserved);
        }
    }
}

impl ChunkSource for MmapRegionSource {
    fn acquire(&mut self, min_size: usize) -> Result<(NonNull<u8>, usize), OsError> {
        let grow_by = min_size.next_multiple_of(crate::config::ARENA_SIZE);
        if self.committed + grow_by > self.reserved {
            return Err(OsError::ReservationExhausted {
                reserved: self.reserved,
            });
        }

        // SAFETY: `start` is inside the reservation from `new`, and
        // `grow_by` was just checked to fit within the remaining space.
        let start = unsafe { self.base.add(self.committed) };
        let rc = unsafe {
            libc::mprotect(
                start.cast(),
                grow_by,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        };
        if rc != 0 {
            return Err(OsError::System(std::io::Error::last_os_error()));
        }

        self.committed += grow_by;
        // SAFETY: `start` is non-null because it is an offset within a
        // successful, non-null mmap reservation.
        Ok((unsafe { NonNull::new_unchecked(start) }, grow_by))
    }
}
