//! # Free-list registry
//!
//! Free blocks are segregated by size into [`crate::config::N_LISTS`]
//! circular, doubly-linked lists, each anchored by a sentinel [`Header`]
//! that is never itself a real block (it carries no payload and is skipped
//! by every walk). An empty list is a sentinel pointing at itself.
//!
//! Because every list is circular and doubly linked, insertion and removal
//! are both O(1) and need no knowledge of where in the list a node sits.

use crate::config::N_LISTS;
use crate::header::{BlockState, Header};
use core::ptr::NonNull;

/// `N_LISTS` sentinel nodes, one per size class.
///
/// The sentinels are given their self-referential `prev`/`next` pointers by
/// [`FreeListRegistry::init`], which must run exactly once, after the
/// registry has reached its final address (it is never moved again once a
/// [`crate::heap::Heap`] is placed behind the global lock).
pub struct FreeListRegistry {
    sentinels: [Header; N_LISTS],
}

impl FreeListRegistry {
    /// Build a registry whose sentinels are not yet self-referential.
    /// Callers must invoke [`Self::init`] before using it.
    pub fn new_uninit() -> Self {
        Self {
            sentinels: core::array::from_fn(|_| Header::zeroed()),
        }
    }

    /// Point every sentinel's `prev`/`next` at itself, making each list a
    /// valid empty circular list.
    ///
    /// # Safety
    /// Must be called exactly once, after `self` has reached the address it
    /// will occupy for the rest of the program (no further moves of
    /// `self`).
    pub unsafe fn init(&mut self) {
        for sentinel in &mut self.sentinels {
            let ptr: *mut Header = sentinel;
            sentinel.prev = ptr;
            sentinel.next = ptr;
        }
    }

    /// The size class a block of `size` bytes belongs to.
    ///
    /// Classes below the last one hold blocks whose size is exactly
    /// `HEADER_SIZE + (class + 1) * ALIGNMENT`; everything larger than the
    /// last exact class falls into the final, catch-all class.
    #[must_use]
    pub fn class_for(size: usize) -> usize {
        let header_size = crate::header::HEADER_SIZE;
        let units = (size.saturating_sub(header_size)) / crate::config::ALIGNMENT;
        units.saturating_sub(1).min(N_LISTS - 1)
    }

    /// Sentinel anchoring size class `class`.
    fn sentinel(&mut self, class: usize) -> NonNull<Header> {
        unsafe { NonNull::new_unchecked(&mut self.sentinels[class]) }
    }

    /// Insert `block` at the head of the size class its current size maps
    /// to, marking it unallocated.
    ///
    /// # Safety
    /// `block` must point at a live header not currently linked into any
    /// free list.
    pub unsafe fn insert(&mut self, mut block: NonNull<Header>) {
        let class = Self::class_for(unsafe { block.as_ref().size() });
        let sentinel = self.sentinel(class);
        unsafe {
            block.as_mut().set_state(BlockState::Unallocated);
            let old_first = sentinel.as_ref().next;
            block.as_mut().next = old_first;
            block.as_mut().prev = sentinel.as_ptr();
            (*old_first).prev = block.as_ptr();
            (*sentinel.as_ptr()).next = block.as_ptr();
        }
    }

    /// Unlink `block` from whichever free list currently holds it.
    ///
    /// # Safety
    /// `block` must currently be linked into a free list (its `prev`/`next`
    /// must be valid header pointers, sentinel or otherwise).
    pub unsafe fn remove(block: NonNull<Header>) {
        unsafe {
            let prev = block.as_ref().prev;
            let next = block.as_ref().next;
            (*prev).next = next;
            (*next).prev = prev;
        }
    }

    /// Find and unlink the first block in size class `class`, if the class
    /// is non-empty.
    pub fn pop_class(&mut self, class: usize) -> Option<NonNull<Header>> {
        let sentinel = self.sentinel(class);
        unsafe {
            let first = sentinel.as_ref().next;
            if first == sentinel.as_ptr() {
                return None;
            }
            let first = NonNull::new_unchecked(first);
            Self::remove(first);
            Some(first)
        }
    }

    /// Walk size class `class` for the first block at least `min_size`
    /// bytes, unlinking and returning it.
    ///
    /// Used only for the catch-all last class, where members are not all
    /// the same size; exact classes are matched in O(1) by the caller
    /// instead.
    pub fn find_first_fit(&mut self, class: usize, min_size: usize) -> Option<NonNull<Header>> {
        let sentinel = self.sentinel(class);
        unsafe {
            let mut cursor = sentinel.as_ref().next;
            while cursor != sentinel.as_ptr() {
                if (*cursor).size() >= min_size {
                    let found = NonNull::new_unchecked(cursor);
                    Self::remove(found);
                    return Some(found);
                }
                cursor = (*cursor).next;
            }
            None
        }
    }

    /// Iterate the (class index, sentinel pointer) pairs, for verification.
    pub fn classes(&mut self) -> impl Iterator<Item = (usize, NonNull<Header>)> + '_ {
        self.sentinels
            .iter_mut()
            .enumerate()
            .map(|(i, s)| (i, unsafe { NonNull::new_unchecked(s) }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HEADER_SIZE;
    use core::mem::MaybeUninit;

    fn leaked_block(size: usize) -> NonNull<Header> {
        let storage = Box::leak(Box::new(MaybeUninit::<Header>::uninit()));
        let ptr = NonNull::new(storage.as_mut_ptr()).unwrap();
        unsafe { Header::write(ptr, size, BlockState::Unallocated, 0) };
        ptr
    }

    fn init_registry() -> Box<FreeListRegistry> {
        let mut reg = Box::new(FreeListRegistry::new_uninit());
        unsafe { reg.init() };
        reg
    }

    #[test]
    fn class_for_caps_at_last_list() {
        assert_eq!(FreeListRegistry::class_for(HEADER_SIZE), 0);
        assert!(FreeListRegistry::class_for(usize::MAX - 7) == N_LISTS - 1);
    }

    #[test]
    fn insert_then_pop_round_trips() {
        let mut reg = init_registry();
        let block = leaked_block(HEADER_SIZE + 8);
        let class = FreeListRegistry::class_for(HEADER_SIZE + 8);
        unsafe { reg.insert(block) };
        let popped = reg.pop_class(class).expect("block should be present");
        assert_eq!(popped, block);
        assert!(reg.pop_class(class).is_none());
    }

    #[test]
    fn empty_class_round_trips_to_none() {
        let mut reg = init_registry();
        assert!(reg.pop_class(0).is_none());
    }
}
