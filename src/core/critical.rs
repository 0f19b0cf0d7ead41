//! Critical section handling
//!
//! A nesting-aware global interrupt gate. Entering disables interrupts and
//! bumps the nesting counter; interrupts are re-enabled only when the
//! outermost section is left. Every kernel data mutation happens inside
//! one of these sections.

use core::sync::atomic::{AtomicU32, Ordering};

/// Critical section nesting depth
static CRITICAL_NESTING: AtomicU32 = AtomicU32::new(0);

/// RAII guard for critical sections
///
/// Creating the guard disables interrupts; dropping it re-enables them
/// once the nesting count returns to zero. Guards must be dropped in
/// reverse order of creation on every call path.
pub struct CriticalSection {
    _private: (),
}

impl CriticalSection {
    /// Enter a critical section by disabling global interrupts.
    #[inline(always)]
    pub fn enter() -> Self {
        #[cfg(target_arch = "riscv32")]
        riscv::interrupt::disable();

        CRITICAL_NESTING.fetch_add(1, Ordering::Relaxed);
        CriticalSection { _private: () }
    }

    /// Current nesting depth (0 = not in a critical section)
    #[inline(always)]
    pub fn nesting() -> u32 {
        CRITICAL_NESTING.load(Ordering::Relaxed)
    }
}

impl Drop for CriticalSection {
    #[inline(always)]
    fn drop(&mut self) {
        let nesting = CRITICAL_NESTING.load(Ordering::Relaxed);
        debug_assert!(nesting != 0);

        CRITICAL_NESTING.store(nesting.saturating_sub(1), Ordering::Relaxed);

        if nesting <= 1 {
            #[cfg(target_arch = "riscv32")]
            unsafe {
                riscv::interrupt::enable()
            };
        }
    }
}

/// Execute a closure with interrupts disabled
///
/// The closure receives a reference to the critical section guard,
/// which can be used to access [`CsCell`](crate::core::cs_cell::CsCell)
/// protected data.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    let cs = CriticalSection::enter();
    f(&cs)
}

/// Check if currently executing in an ISR context
///
/// ISR context is tracked with the interrupt nesting counter maintained
/// by `os_int_enter`/`os_int_exit`; interrupt entry stubs in the port
/// are responsible for the bracketing.
#[inline]
pub fn is_isr_context() -> bool {
    crate::core::kernel::KERNEL.int_nesting() > 0
}
