//! Bounded registry of the chunks acquired from the chunk source, plus the
//! in-chunk block searches the mark and sweep phases lean on.

use arrayvec::ArrayVec;

use crate::block::{self, BlockHeader, HEADER_SIZE};
use crate::HEAP_LIMIT;

/// One region acquired from the chunk source. `base` is the first (aligned)
/// header; `size` is the payload capacity recorded at grow time. The chunk is
/// tiled by consecutive blocks over the half-open interval
/// `[base, base + HEADER_SIZE + size)`, and address cover tests use that same
/// interval: the tail of the highest block's payload reaches all the way to
/// the tiled end.
///
/// Chunks never move, never shrink, and are never returned to the source.
#[derive(Clone, Copy, Debug)]
pub struct Chunk {
    pub base: *mut BlockHeader,
    pub size: usize,
}

impl Chunk {
    pub fn covers(&self, addr: usize) -> bool {
        let base = self.base as usize;
        base <= addr && addr < self.limit()
    }

    /// One past the chunk's tiled extent; header walks land here exactly.
    pub fn limit(&self) -> usize {
        self.base as usize + HEADER_SIZE + self.size
    }

    /// Walk headers from the base to the block whose payload span contains
    /// `addr`. Interior pointers are accepted; header bytes are not payload.
    ///
    /// # Safety
    ///
    /// The chunk must be fully tiled by initialized headers.
    pub unsafe fn block_spanning(&self, addr: usize) -> Option<*mut BlockHeader> {
        let mut p = self.base;
        while (p as usize) < self.limit() {
            let next = block::next(p);
            if block::payload(p) as usize <= addr && addr < next as usize {
                return Some(p);
            }
            p = next;
        }
        None
    }
}

/// Append-only table of every chunk, with a one-entry cache in front of the
/// linear lookup. The cache is never invalidated; that is sound because
/// chunks are never removed, reordered, or moved.
pub struct ChunkTable {
    chunks: ArrayVec<Chunk, HEAP_LIMIT>,
    cache: Option<usize>,
}

impl ChunkTable {
    pub fn new() -> Self {
        ChunkTable {
            chunks: ArrayVec::new(),
            cache: None,
        }
    }

    /// Record a chunk. Running past `HEAP_LIMIT` is a programming error, not
    /// a runtime condition, and aborts the process.
    pub fn add(&mut self, base: *mut BlockHeader, size: usize) {
        if self.chunks.try_push(Chunk { base, size }).is_err() {
            crate::fatal("OutOfMemory Error");
        }
    }

    /// The chunk whose interval covers `addr`, if any.
    pub fn containing(&mut self, addr: usize) -> Option<Chunk> {
        if let Some(i) = self.cache {
            if self.chunks[i].covers(addr) {
                return Some(self.chunks[i]);
            }
        }
        for (i, chunk) in self.chunks.iter().enumerate() {
            if chunk.covers(addr) {
                self.cache = Some(i);
                return Some(*chunk);
            }
        }
        None
    }

    pub fn get(&self, index: usize) -> Chunk {
        self.chunks[index]
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl Default for ChunkTable {
    fn default() -> Self {
        Self::new()
    }
}
