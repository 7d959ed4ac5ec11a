//! Block header layout and the arithmetic used to walk headers.

use bitflags::bitflags;
use static_assertions::const_assert;

pub const PTR_SIZE: usize = core::mem::size_of::<usize>();
pub const HEADER_SIZE: usize = core::mem::size_of::<BlockHeader>();

bitflags! {
    /// Per-block state bits. All bits beyond these are reserved zero.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct BlockFlags: usize {
        /// The block is currently handed out to the mutator.
        const ALLOC = 1 << 0;
        /// The block was reached from a root during the current collection.
        /// Always clear between collections.
        const MARK = 1 << 1;
    }
}

/// Prefixes every block in the heap, allocated or free.
///
/// The payload occupies exactly `size` bytes immediately after the header, so
/// the next block begins at `header + HEADER_SIZE + size`. `size` is always a
/// positive multiple of the pointer size. `next_free` is meaningful only
/// while the block is on the free list.
#[repr(C)]
#[derive(Debug)]
pub struct BlockHeader {
    pub flags: BlockFlags,
    pub size: usize,
    pub next_free: *mut BlockHeader,
}

// Headers sit at pointer-aligned addresses; the header size must keep the
// payload (and therefore the next header) pointer-aligned too.
const_assert!(HEADER_SIZE % PTR_SIZE == 0);
const_assert!(core::mem::align_of::<BlockHeader>() == core::mem::align_of::<usize>());

/// Round `n` up to a multiple of `align`, which must be a power of two.
pub const fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Header of the physically next block.
///
/// # Safety
///
/// `this` must point to an initialized header inside a chunk.
pub unsafe fn next(this: *mut BlockHeader) -> *mut BlockHeader {
    (this as usize + HEADER_SIZE + (*this).size) as *mut BlockHeader
}

/// First payload byte of the block at `this`.
pub fn payload(this: *mut BlockHeader) -> *mut u8 {
    (this as usize + HEADER_SIZE) as *mut u8
}

/// Header of the block whose payload starts at `payload`.
pub fn from_payload(payload: *mut u8) -> *mut BlockHeader {
    (payload as usize - HEADER_SIZE) as *mut BlockHeader
}
