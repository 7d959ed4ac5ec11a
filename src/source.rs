//! The seam between the collector and whatever provides its chunk memory.

use core::ptr::NonNull;

/// Provides backing memory for chunks.
///
/// # Safety
///
/// `request` must hand back exclusive ownership of a readable, writable,
/// contiguous, pointer-aligned range of at least the requested length. The
/// range must stay valid and fixed at its address for as long as the source
/// exists; the collector tiles headers into it and keeps raw pointers across
/// calls.
pub unsafe trait ChunkSource {
    /// Acquire at least `bytes` contiguous bytes, or `None` when the
    /// underlying provider refuses.
    fn request(&mut self, bytes: usize) -> Option<NonNull<u8>>;
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        /// Chunk memory straight from the OS via anonymous private mappings.
        ///
        /// Mappings are never unmapped; chunks live until the process exits.
        #[derive(Debug, Default)]
        pub struct SystemSource;

        unsafe impl ChunkSource for SystemSource {
            fn request(&mut self, bytes: usize) -> Option<NonNull<u8>> {
                let raw = unsafe {
                    libc::mmap(
                        core::ptr::null_mut(),
                        bytes,
                        libc::PROT_READ | libc::PROT_WRITE,
                        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                        -1,
                        0,
                    )
                };
                if raw == libc::MAP_FAILED {
                    return None;
                }
                NonNull::new(raw as *mut u8)
            }
        }
    } else {
        /// Fallback through the global allocator on targets without `mmap`.
        ///
        /// The allocations are deliberately never returned; chunks live
        /// until the process exits.
        #[derive(Debug, Default)]
        pub struct SystemSource;

        unsafe impl ChunkSource for SystemSource {
            fn request(&mut self, bytes: usize) -> Option<NonNull<u8>> {
                let layout =
                    std::alloc::Layout::from_size_align(bytes, crate::block::PTR_SIZE).ok()?;
                NonNull::new(unsafe { std::alloc::alloc(layout) })
            }
        }
    }
}
