//! SandOS RTOS kernel in Rust
//!
//! A real-time operating system kernel for 32-bit RISC-V MCUs providing:
//! - Priority-based preemptive scheduling with O(1) top-priority lookup
//! - Tick-driven blocking delays on a delta-encoded delay list
//! - Synchronization primitives (semaphores, mutexes, message queues)
//! - Fixed-block memory pools with blocking allocation
//! - Context switching for the QingkeV4 (CH32V2xx) core

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
extern crate std;

// ============ Critical Section ============

#[cfg(target_arch = "riscv32")]
mod cs_impl {
    use critical_section::{set_impl, Impl, RawRestoreState};
    use riscv::register::mstatus;

    struct SingleHartCriticalSection;
    set_impl!(SingleHartCriticalSection);

    unsafe impl Impl for SingleHartCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = mstatus::read().mie();
            riscv::interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { riscv::interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod sync;
pub mod port;

// ============ Re-exports ============

pub use self::core::config;
pub use self::core::config::*;
pub use self::core::critical;
pub use self::core::error;
pub use self::core::error::{OsError, OsResult};
pub use self::core::kernel;
pub use self::core::kernel::{os_init, os_start};
pub use self::core::list;
pub use self::core::prio;
pub use self::core::types;
pub use self::core::types::*;
pub use self::core::task;
pub use self::core::task::os_task_create;
pub use self::core::sched;
pub use self::core::time;
pub use self::core::time::{os_tick_handler, os_time_dly, os_time_get};

#[cfg(feature = "sem")]
pub use sync::sem;
#[cfg(feature = "mutex")]
pub use sync::mutex;
#[cfg(feature = "queue")]
pub use sync::queue;
#[cfg(feature = "mem")]
pub use sync::mem;
