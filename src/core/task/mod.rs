//! Task management module
//!
//! Task creation only: the kernel never deletes or reclaims a task, and
//! the TCB plus stack stay owned by the caller for the task's lifetime.

mod tcb;

pub use tcb::OsTcb;

use core::ptr::NonNull;

use crate::config::{CFG_PRIO_MAX, CFG_STACK_MAGIC, CFG_STK_SIZE_MIN};
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::types::{OsPrio, OsStkElement, OsTaskState};

/// Task entry point function type
pub type OsTaskFn = fn(*mut ()) -> !;

/// Internal task creation shared by the public API and the idle task
///
/// # Safety
/// `tcb` must point to storage that outlives the task; `stk_base` must
/// point to `stk_size` writable words.
pub(crate) unsafe fn os_task_create_raw(
    tcb: *mut OsTcb,
    name: &'static str,
    task_fn: OsTaskFn,
    arg: *mut (),
    prio: OsPrio,
    stk_base: *mut OsStkElement,
    stk_size: usize,
) -> OsResult<()> {
    if tcb.is_null() || stk_base.is_null() || stk_size == 0 {
        return Err(OsError::Param);
    }

    if prio as usize >= CFG_PRIO_MAX {
        return Err(OsError::Param);
    }

    critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *tcb };
        tcb_ref.init();

        tcb_ref.name = name;
        tcb_ref.prio = prio;
        tcb_ref.base_prio = prio;
        tcb_ref.task_state = OsTaskState::Ready;

        // Build the initial register frame, then paint the overflow
        // sentinel at the low end of the stack.
        let stk_ptr = unsafe { crate::port::os_task_stk_init(task_fn, arg, stk_base, stk_size) };
        tcb_ref.stk_ptr = stk_ptr;
        tcb_ref.stk_limit = stk_base;
        tcb_ref.stk_size = stk_size;
        unsafe { stk_base.write(CFG_STACK_MAGIC) };

        let tcb_nonnull = unsafe { NonNull::new_unchecked(tcb) };
        unsafe { crate::sched::os_rdy_list_insert(tcb_nonnull) };

        Ok(())
    })
}

/// Create a new task
///
/// The TCB and stack are provided by the caller as static storage; the
/// kernel borrows them and never frees them. The new task becomes ready
/// immediately, and preempts the caller right away when it outranks it.
///
/// # Arguments
/// * `tcb` - Static mutable reference to the Task Control Block
/// * `stack` - Static mutable reference to the stack array (low address first)
/// * `name` - Task name for debugging
/// * `task_fn` - Task entry point; must never return
/// * `arg` - Argument passed to the task function
/// * `prio` - Task priority (0 = highest)
///
/// # Example
/// ```ignore
/// static mut TASK_TCB: OsTcb = OsTcb::new();
/// static mut TASK_STK: [OsStkElement; 256] = [0; 256];
///
/// fn my_task(_: *mut ()) -> ! {
///     loop { /* ... */ }
/// }
///
/// // In main:
/// os_task_create(
///     unsafe { &mut TASK_TCB },
///     unsafe { &mut TASK_STK },
///     "MyTask",
///     my_task,
///     core::ptr::null_mut(),
///     5,
/// ).expect("task creation failed");
/// ```
pub fn os_task_create(
    tcb: &'static mut OsTcb,
    stack: &'static mut [OsStkElement],
    name: &'static str,
    task_fn: OsTaskFn,
    arg: *mut (),
    prio: OsPrio,
) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::Isr);
    }

    if stack.len() < CFG_STK_SIZE_MIN {
        return Err(OsError::Param);
    }

    unsafe {
        os_task_create_raw(
            tcb as *mut OsTcb,
            name,
            task_fn,
            arg,
            prio,
            stack.as_mut_ptr(),
            stack.len(),
        )?;
    }

    if kernel::KERNEL.is_running() {
        crate::sched::os_sched();
    }

    Ok(())
}
