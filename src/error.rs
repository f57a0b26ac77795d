//! Error taxonomy and fatal-diagnostic path.
//!
//! Most of this crate's invariants are not recoverable: a corrupted boundary
//! tag or a double free means the heap's bookkeeping no longer reflects
//! reality, and returning `Err` to the caller would just let them keep
//! allocating on top of garbage. For those cases we print a diagnostic to
//! stderr and abort the process, the same way the reference allocator calls
//! straight into `abort(3)`. [`AllocError`] covers everything that *can* be
//! reported back to a caller instead.

use std::fmt;

/// Errors a caller can observe from the public API.
///
/// This is deliberately small: most failure modes in this allocator are
/// treated as corruption and handled by [`fatal`] instead of by returning a
/// value, matching the reference design's "verification failures don't
/// return, they crash" stance.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    /// The requested size, once rounded up to a block size, would overflow
    /// `usize` or exceed what a single chunk could ever hold.
    #[error("requested size {requested} is not satisfiable")]
    SizeTooLarge {
        /// The size the caller asked for, before rounding.
        requested: usize,
    },

    /// The OS chunk source could not provide more address space.
    #[error("failed to extend the heap: {0}")]
    OsChunk(#[from] OsError),
}

/// Failure acquiring or extending address space from the OS collaborator.
#[derive(Debug, thiserror::Error)]
pub enum OsError {
    /// The reserved region has been exhausted; no further growth is
    /// possible without relocating existing allocations, which this
    /// allocator never does.
    #[error("reserved address space exhausted ({reserved} bytes)")]
    ReservationExhausted {
        /// Total size of the reservation that was exhausted.
        reserved: usize,
    },

    /// The underlying `mmap`/`mprotect` call failed.
    #[error("OS memory call failed: {0}")]
    System(#[from] std::io::Error),
}

/// Print `message` to stderr and terminate the process immediately.
///
/// Used for violations that mean the heap's internal state is no longer
/// trustworthy: a double free, a corrupted boundary tag, a free-list cycle.
/// There is no way to recover from these without risking silent memory
/// corruption elsewhere, so this never returns.
#[cold]
pub fn fatal(message: impl fmt::Display) -> ! {
    eprintln!("segheap: fatal: {message}");
    std::process::abort();
}
