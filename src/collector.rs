//! The collector: allocation entry points, the conservative mark phase, and
//! the sweep phase.

use core::ptr::NonNull;

use log::{debug, trace};

use crate::block::{self, BlockFlags, BlockHeader, HEADER_SIZE, PTR_SIZE};
use crate::chunks::ChunkTable;
use crate::free_list::FreeList;
use crate::machine;
use crate::roots::{RootRange, RootTable, StackBounds};
use crate::source::ChunkSource;
use crate::TINY_HEAP_SIZE;

/// Counters accumulated across collections.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GcStats {
    pub collections: u64,
    pub reclaimed_blocks: u64,
    pub reclaimed_bytes: u64,
}

/// A conservative, stop-the-world, mark-sweep collector over a next-fit
/// free-list allocator, drawing chunk memory from `S`.
///
/// The mutator must keep live pointers where a collection can see them: in
/// registers, on the stack below the creation-time probe, inside the payload
/// of another live block, or in a registered root range. Pointers stashed
/// anywhere else may be reclaimed from under the mutator.
pub struct Collector<S> {
    source: S,
    chunks: ChunkTable,
    free_list: FreeList,
    roots: RootTable,
    stack: StackBounds,
    stats: GcStats,
}

// SAFETY: the raw block pointers inside are only dereferenced through
// `&mut self`, so exclusive access follows from the borrow rules. The
// process-wide facade additionally serializes access behind a mutex.
unsafe impl<S: Send> Send for Collector<S> {}

impl<S: ChunkSource> Collector<S> {
    /// Create a collector drawing chunks from `source`.
    ///
    /// The address of a slot in this call's frame becomes the outer bound of
    /// every stack scan, so create the collector near the top of the
    /// mutator's call tree; frames above it are invisible to collections.
    #[inline(never)]
    pub fn new(source: S) -> Self {
        let probe: usize = 0;
        Collector {
            source,
            chunks: ChunkTable::new(),
            free_list: FreeList::new(),
            roots: RootTable::new(),
            stack: StackBounds::capture(core::hint::black_box(
                &probe as *const usize as *const u8,
            )),
            stats: GcStats::default(),
        }
    }

    /// Allocate `size` bytes, rounded up to pointer alignment. A request the
    /// free list cannot satisfy triggers one collection, then heap growth;
    /// `None` means the underlying source is exhausted. Zero-size requests
    /// return `None`.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let size = size.checked_add(PTR_SIZE - 1)? & !(PTR_SIZE - 1);
        if let Some(p) = unsafe { self.free_list.take(size) } {
            return Some(p);
        }
        self.collect();
        if let Some(p) = unsafe { self.free_list.take(size) } {
            return Some(p);
        }
        self.grow(size)?;
        unsafe { self.free_list.take(size) }
    }

    /// Return `ptr` to the free list immediately.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from [`allocate`](Collector::allocate) on this
    /// collector and not have been freed since.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>) {
        self.free_list.release(ptr);
    }

    /// Add the normalized `[start, end)` to the root set scanned by all
    /// subsequent collections.
    pub fn register_root_range(&mut self, start: *const u8, end: *const u8) {
        self.roots.register(RootRange::new(start, end));
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Number of chunks acquired from the source.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Acquire a chunk of at least `max(req_size, TINY_HEAP_SIZE)` payload
    /// bytes, shape it into one maximal free block, and release that block
    /// into the list. A `None` leaves all existing state untouched.
    fn grow(&mut self, req_size: usize) -> Option<()> {
        let req_size = req_size.max(TINY_HEAP_SIZE);
        // The source hands back pointer-aligned memory, so the extra word is
        // pure slack for the trailing word read of byte-stride payload scans
        // over the chunk's last block.
        let total = req_size.checked_add(PTR_SIZE + HEADER_SIZE)?;
        let raw = self.source.request(total)?;
        let base = block::align_up(raw.as_ptr() as usize, PTR_SIZE) as *mut BlockHeader;
        self.chunks.add(base, req_size);
        debug!(
            "grow: chunk {} at {:p}, {} payload bytes",
            self.chunks.len() - 1,
            base,
            req_size
        );
        unsafe {
            base.write(BlockHeader {
                flags: BlockFlags::empty(),
                size: req_size,
                next_free: base,
            });
            self.free_list.release(NonNull::new_unchecked(block::payload(base)));
        }
        Some(())
    }

    /// Run a full stop-the-world collection: conservatively mark from the
    /// spilled register file, the stack, and every registered range, then
    /// sweep all chunks.
    #[inline(never)]
    pub fn collect(&mut self) {
        self.stats.collections += 1;
        debug!("collect #{}", self.stats.collections);

        let registers = machine::spill_registers();
        for &word in registers.words() {
            self.mark(word);
        }

        let stack = self.stack.oriented(machine::stack_probe());
        self.mark_range(stack);

        for i in 0..self.roots.len() {
            let range = self.roots.get(i);
            self.mark_range(range);
        }

        self.sweep();
    }

    /// Treat `word` as a pointer candidate: if it lands within the payload
    /// span of an allocated block, mark that block and trace its payload.
    fn mark(&mut self, word: usize) {
        let Some(chunk) = self.chunks.containing(word) else {
            return;
        };
        let Some(header) = (unsafe { chunk.block_spanning(word) }) else {
            return;
        };
        unsafe {
            if !(*header).flags.contains(BlockFlags::ALLOC) {
                // A free block: the candidate was a false positive.
                return;
            }
            if (*header).flags.contains(BlockFlags::MARK) {
                return;
            }
            (*header).flags.insert(BlockFlags::MARK);
            trace!("mark {:#x} -> block {:p}", word, header);
            self.mark_range(RootRange {
                start: block::payload(header) as usize,
                end: block::next(header) as usize,
            });
        }
    }

    /// Scan `[start, end)` reading a pointer-sized word at every byte
    /// offset, so unaligned pointers are still seen.
    fn mark_range(&mut self, range: RootRange) {
        for p in range.start..range.end {
            let word = unsafe { core::ptr::read_unaligned(p as *const usize) };
            self.mark(word);
        }
    }

    /// Walk every chunk block-by-block: clear `MARK` on marked allocated
    /// blocks, release unmarked allocated blocks, leave free blocks alone.
    fn sweep(&mut self) {
        let mut blocks = 0u64;
        let mut bytes = 0u64;
        for i in 0..self.chunks.len() {
            let chunk = self.chunks.get(i);
            let mut p = chunk.base;
            while (p as usize) < chunk.limit() {
                unsafe {
                    let flags = (*p).flags;
                    if flags.contains(BlockFlags::ALLOC) {
                        if flags.contains(BlockFlags::MARK) {
                            (*p).flags.remove(BlockFlags::MARK);
                        } else {
                            blocks += 1;
                            bytes += (*p).size as u64;
                            self.free_list
                                .release(NonNull::new_unchecked(block::payload(p)));
                        }
                    }
                    // Strides over anything a release just coalesced into
                    // this block.
                    p = block::next(p);
                }
            }
        }
        self.stats.reclaimed_blocks += blocks;
        self.stats.reclaimed_bytes += bytes;
        debug!("sweep: reclaimed {} blocks, {} bytes", blocks, bytes);
    }
}
