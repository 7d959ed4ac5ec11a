//! Access to the machine context: a spill of the callee-saved register file
//! and a stack probe.
//!
//! Only callee-saved registers need capturing. A value in a caller-saved
//! register cannot stay live across the call into the collector without also
//! existing in stack memory the collector scans.

/// Callee-saved registers captured at the top of a collection, scanned as
/// pointer candidates alongside the stack and the registered ranges.
#[derive(Debug)]
pub struct RegisterFile {
    words: [usize; REGISTER_WORDS],
}

impl RegisterFile {
    pub fn words(&self) -> &[usize] {
        &self.words
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub const REGISTER_WORDS: usize = 7;

        /// Spill rbx, rbp, rsp, and r12-r15 into a scannable buffer.
        #[inline(never)]
        pub fn spill_registers() -> RegisterFile {
            let mut file = RegisterFile { words: [0; REGISTER_WORDS] };
            unsafe {
                // The buffer pointer is pinned to rax, which is caller-saved
                // and not among the captured registers.
                core::arch::asm!(
                    "mov [rax], rbx",
                    "mov [rax + 8], rbp",
                    "mov [rax + 16], rsp",
                    "mov [rax + 24], r12",
                    "mov [rax + 32], r13",
                    "mov [rax + 40], r14",
                    "mov [rax + 48], r15",
                    in("rax") file.words.as_mut_ptr(),
                    options(nostack, preserves_flags),
                );
            }
            file
        }
    } else if #[cfg(target_arch = "aarch64")] {
        pub const REGISTER_WORDS: usize = 12;

        /// Spill x19-x28, the frame pointer, and sp into a scannable buffer.
        #[inline(never)]
        pub fn spill_registers() -> RegisterFile {
            let mut file = RegisterFile { words: [0; REGISTER_WORDS] };
            unsafe {
                // x9 and x10 are caller-saved scratch registers, not among
                // the captured set.
                core::arch::asm!(
                    "stp x19, x20, [x9]",
                    "stp x21, x22, [x9, #16]",
                    "stp x23, x24, [x9, #32]",
                    "stp x25, x26, [x9, #48]",
                    "stp x27, x28, [x9, #64]",
                    "mov x10, sp",
                    "stp x29, x10, [x9, #80]",
                    in("x9") file.words.as_mut_ptr(),
                    out("x10") _,
                    options(nostack, preserves_flags),
                );
            }
            file
        }
    } else {
        pub const REGISTER_WORDS: usize = 0;

        /// No spill on this architecture; only the stack and the registered
        /// ranges are scanned, so pointers held purely in registers across a
        /// collection are invisible here.
        #[inline(never)]
        pub fn spill_registers() -> RegisterFile {
            RegisterFile { words: [0; REGISTER_WORDS] }
        }
    }
}

/// Address of a slot in this function's frame, one call deeper than the
/// caller; used to bound stack scans from below the frame that asked.
#[inline(never)]
pub fn stack_probe() -> *const u8 {
    let slot: usize = 0;
    core::hint::black_box(&slot as *const usize as *const u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_is_near_the_current_frame() {
        let local: usize = 0;
        let probe = stack_probe() as usize;
        let here = &local as *const usize as usize;
        assert!(probe.abs_diff(here) < 64 * 1024);
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    #[test]
    fn spill_captures_the_stack_pointer() {
        let local: usize = 0;
        let here = &local as *const usize as usize;
        let file = spill_registers();
        assert_eq!(file.words().len(), REGISTER_WORDS);
        // sp is in the captured set and must land near this frame.
        assert!(file
            .words()
            .iter()
            .any(|&w| w.abs_diff(here) < 64 * 1024));
    }
}
