//! A conservative, stop-the-world, mark-sweep garbage collector layered on a
//! next-fit free-list allocator.
//!
//! Memory is acquired from the OS in coarse chunks, sub-allocated into
//! header-prefixed blocks, and reclaimed by scanning the CPU registers, the
//! mutator stack, and user-registered ranges for words that look like
//! pointers into a managed chunk. Scanning is conservative: anything that
//! looks like a pointer pins its block, and nothing reachable from a scanned
//! root is ever reclaimed.
//!
//! [`Collector`] is the reusable core, generic over its [`ChunkSource`]. The
//! module-level functions drive one process-wide collector over the
//! [`SystemSource`]; call [`init`] once near the top of the program before
//! using them.

pub mod block;
pub mod chunks;
pub mod collector;
pub mod free_list;
pub mod machine;
pub mod roots;
pub mod source;

pub use collector::{Collector, GcStats};
pub use source::{ChunkSource, SystemSource};

use core::ptr::NonNull;

use spin::Mutex;

/// Minimum chunk request, in bytes.
pub const TINY_HEAP_SIZE: usize = 0x4000;
/// Maximum number of chunks.
pub const HEAP_LIMIT: usize = 10000;
/// Maximum number of registered root ranges.
pub const ROOT_RANGES_LIMIT: usize = 1000;

/// A structural limit was hit. These indicate programming error, not a
/// runtime condition the caller could recover from.
pub(crate) fn fatal(msg: &str) -> ! {
    log::error!("{}", msg);
    eprintln!("{}", msg);
    std::process::abort()
}

static COLLECTOR: Mutex<Option<Collector<SystemSource>>> = Mutex::new(None);

/// Set up the process-wide collector. Call exactly once, near the top of the
/// program, before any other operation here; stack frames above the caller
/// are invisible to collections.
#[inline(never)]
pub fn init() {
    *COLLECTOR.try_lock().unwrap() = Some(Collector::new(SystemSource));
}

/// Allocate `size` bytes from the process-wide collector. Returns `None` for
/// zero-size requests and when the heap cannot be grown any further.
pub fn allocate(size: usize) -> Option<NonNull<u8>> {
    COLLECTOR.try_lock().unwrap().as_mut().unwrap().allocate(size)
}

/// Return a block to the process-wide collector's free list.
///
/// # Safety
///
/// `ptr` must have come from [`allocate`] and not have been freed since.
pub unsafe fn free(ptr: NonNull<u8>) {
    COLLECTOR.try_lock().unwrap().as_mut().unwrap().free(ptr);
}

/// Collect the process-wide heap now.
pub fn collect() {
    COLLECTOR.try_lock().unwrap().as_mut().unwrap().collect();
}

/// Add the normalized `[start, end)` to the process-wide root set.
pub fn register_root_range(start: *const u8, end: *const u8) {
    COLLECTOR
        .try_lock()
        .unwrap()
        .as_mut()
        .unwrap()
        .register_root_range(start, end);
}
