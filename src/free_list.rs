//! The single circular free list threaded through block headers across all
//! chunks, searched next-fit from a roving cursor.

use core::ptr::NonNull;

use log::trace;

use crate::block::{self, BlockFlags, BlockHeader, HEADER_SIZE, PTR_SIZE};

/// Next-fit cursor into the circular list of free blocks.
///
/// The cursor is `None` exactly when every block in the heap is allocated;
/// otherwise it points at some member of the cycle and is moved by both
/// [`take`](FreeList::take) and [`release`](FreeList::release) so searches
/// resume near recent activity.
pub struct FreeList {
    cursor: Option<NonNull<BlockHeader>>,
}

impl FreeList {
    pub const fn new() -> Self {
        FreeList { cursor: None }
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.is_none()
    }

    pub fn cursor(&self) -> Option<NonNull<BlockHeader>> {
        self.cursor
    }

    /// One full next-fit cycle for a block of `size` payload bytes (already
    /// pointer-aligned). Returns the payload pointer of a block flagged
    /// `ALLOC`, or `None` when no member fits.
    ///
    /// An exact fit is unlinked. An oversized block is split from the high
    /// end: the resident block shrinks by `size + HEADER_SIZE` and the
    /// exposed tail becomes the block handed out, leaving the predecessor's
    /// linkage untouched. A block whose surplus could not hold a header and
    /// a minimal payload is handed out whole, like an exact fit.
    ///
    /// # Safety
    ///
    /// The list must be a well-formed cycle of free headers.
    pub unsafe fn take(&mut self, size: usize) -> Option<NonNull<u8>> {
        let start = self.cursor?.as_ptr();
        let mut prev = start;
        let mut cur = (*start).next_free;
        loop {
            if (*cur).size >= size {
                if (*cur).size < size + HEADER_SIZE + PTR_SIZE {
                    if (*cur).next_free == cur {
                        self.cursor = None;
                    } else {
                        (*prev).next_free = (*cur).next_free;
                        self.cursor = NonNull::new(prev);
                    }
                } else {
                    (*cur).size -= size + HEADER_SIZE;
                    let tail = block::next(cur);
                    (*tail).size = size;
                    (*tail).next_free = core::ptr::null_mut();
                    self.cursor = NonNull::new(prev);
                    cur = tail;
                }
                (*cur).flags = BlockFlags::ALLOC;
                trace!("take: {} bytes at {:p}", (*cur).size, cur);
                return NonNull::new(block::payload(cur));
            }
            if cur == start {
                return None;
            }
            prev = cur;
            cur = (*cur).next_free;
        }
    }

    /// Return the block owning `payload` to the list at its address-ordered
    /// position, merging with physically adjacent free neighbors, and leave
    /// the cursor at the insertion predecessor.
    ///
    /// # Safety
    ///
    /// `payload` must be the payload pointer of a block inside a chunk that
    /// is not currently on the list.
    pub unsafe fn release(&mut self, payload: NonNull<u8>) {
        let target = block::from_payload(payload.as_ptr());
        trace!("release: {} bytes at {:p}", (*target).size, target);

        let Some(cursor) = self.cursor else {
            (*target).next_free = target;
            (*target).flags = BlockFlags::empty();
            self.cursor = NonNull::new(target);
            return;
        };

        // Find `hit` such that `target` falls between `hit` and its
        // successor in address order. At the highest-address member
        // (`hit >= hit.next_free`) the insertion point wraps: the target
        // belongs there if it lies above the whole cycle or below it.
        let mut hit = cursor.as_ptr();
        loop {
            let next = (*hit).next_free;
            if hit < target && target < next {
                break;
            }
            if hit >= next && (target > hit || target < next) {
                break;
            }
            hit = next;
        }

        let succ = (*hit).next_free;
        if block::next(target) == succ {
            // Forward merge: the successor's header becomes payload.
            (*target).size += (*succ).size + HEADER_SIZE;
            if succ == hit {
                // The sole member was absorbed; the target is now the whole
                // list.
                (*target).next_free = target;
                (*target).flags = BlockFlags::empty();
                self.cursor = NonNull::new(target);
                return;
            }
            (*target).next_free = (*succ).next_free;
        } else {
            (*target).next_free = succ;
        }

        if block::next(hit) == target {
            // Backward merge into the predecessor.
            (*hit).size += (*target).size + HEADER_SIZE;
            (*hit).next_free = (*target).next_free;
        } else {
            (*hit).next_free = target;
        }

        self.cursor = NonNull::new(hit);
        (*target).flags = BlockFlags::empty();
    }
}

impl Default for FreeList {
    fn default() -> Self {
        Self::new()
    }
}
