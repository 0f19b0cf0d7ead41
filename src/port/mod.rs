//! Port layer - CPU-specific implementations
//!
//! The kernel core uses this contract abstractly: stack frame
//! initialization, tick timer programming, software-interrupt trigger,
//! and first-task dispatch. Each supported MCU supplies an
//! implementation; other targets get host stubs so the kernel logic can
//! be exercised in unit tests.

#[cfg(target_arch = "riscv32")]
pub mod qingke_v4;

#[cfg(target_arch = "riscv32")]
pub use qingke_v4::*;

// Stub implementations for non-RISC-V targets (for testing)
#[cfg(not(target_arch = "riscv32"))]
pub mod stub {
    use crate::task::OsTaskFn;
    use crate::types::OsStkElement;

    /// Build an initial stack frame
    ///
    /// The host stub has no register frame to build; it hands back a
    /// pointer near the stack top so overflow checks hold.
    pub unsafe fn os_task_stk_init(
        _task_fn: OsTaskFn,
        _arg: *mut (),
        stk_base: *mut OsStkElement,
        stk_size: usize,
    ) -> *mut OsStkElement {
        unsafe { stk_base.add(stk_size - 1) }
    }

    /// Program the periodic tick timer
    pub fn os_init_timer(_reload: u32) {
        // No-op for testing
    }

    /// Request a context switch
    ///
    /// On hardware this pends the software interrupt; tests observe the
    /// scheduler decision through the next-TCB pointer instead.
    pub fn os_trigger_swi() {
        // No-op for testing
    }

    /// Dispatch the first task
    ///
    /// No-op on the host so `os_start` returns and tests continue with
    /// the kernel marked running.
    pub unsafe fn os_start_first_task() {
        // No-op for testing
    }

    /// Idle task body
    pub fn os_cpu_idle() {
        core::hint::spin_loop();
    }
}

#[cfg(not(target_arch = "riscv32"))]
pub use stub::*;
