//! Scheduler core
//!
//! Priority-strict preemptive scheduling: the bitmap names the highest
//! non-empty ready queue, the queue head is the task to run. Every path
//! that changes readiness ends with a switch request when the decision
//! differs from the running task.

use core::ptr::NonNull;

use crate::critical::{is_isr_context, CriticalSection};
use crate::kernel;
use crate::task::OsTcb;
use crate::types::OsPrio;

/// Select the task to run next
///
/// Head of the ready queue at the highest set priority. Never returns
/// null while the kernel runs: the idle task keeps the bitmap non-empty.
///
/// # Safety
/// Must be called with preemption disabled (inside a critical section or
/// an ISR).
pub(crate) unsafe fn find_next_task() -> NonNull<OsTcb> {
    let prio_map = unsafe { kernel::prio_map() };
    if prio_map.is_empty() {
        kernel::os_fatal();
    }

    let top_prio = prio_map.get_highest();
    match unsafe { kernel::rdy_list(top_prio).head() } {
        Some(tcb) => tcb,
        None => kernel::os_fatal(),
    }
}

/// Main scheduling point
///
/// Determines the highest priority ready task and requests a context
/// switch if it differs from the running task. Called after any
/// operation that may change task readiness.
pub fn os_sched() {
    if !kernel::KERNEL.is_running() {
        return;
    }

    // ISRs defer their switch to os_int_exit
    if is_isr_context() {
        return;
    }

    let _cs = CriticalSection::enter();

    unsafe {
        let next = find_next_task();
        if Some(next) != kernel::tcb_cur_ptr() {
            kernel::set_tcb_next(next);
            crate::port::os_trigger_swi();
        }
    }
}

/// Rotate the running task within its own priority queue
///
/// One slot per tick: when the running task is still ready and shares
/// its priority with at least one other ready task, it moves to the tail
/// so its peers each get a tick in turn.
///
/// # Safety
/// Tick-handler context only (interrupts masked).
pub(crate) unsafe fn os_sched_round_robin() {
    let Some(cur) = kernel::tcb_cur_ptr() else {
        return;
    };

    let cur_ref = unsafe { cur.as_ref() };
    if !cur_ref.is_ready() {
        return;
    }

    let rdy_list = unsafe { kernel::rdy_list(cur_ref.prio) };
    if rdy_list.head() != rdy_list.tail() {
        rdy_list.remove(cur);
        rdy_list.insert_tail(cur);
    }
}

/// Make a task ready
///
/// The only insert path into the ready queues; keeps the bitmap in sync.
pub(crate) unsafe fn os_rdy_list_insert(tcb: NonNull<OsTcb>) {
    let prio = unsafe { tcb.as_ref().prio };

    unsafe {
        kernel::rdy_list(prio).insert_tail(tcb);
        kernel::prio_map().insert(prio);
    }
}

/// Remove a task from its ready queue
///
/// The only remove path out of the ready queues; clears the bitmap bit
/// when the queue drains.
pub(crate) unsafe fn os_rdy_list_remove(tcb: NonNull<OsTcb>) {
    let prio = unsafe { tcb.as_ref().prio };

    unsafe {
        let rdy_list = kernel::rdy_list(prio);
        rdy_list.remove(tcb);

        if rdy_list.is_empty() {
            kernel::prio_map().remove(prio);
        }
    }
}

/// Move a ready task to a different priority
///
/// Used by priority inheritance to re-seat a ready owner so the bitmap
/// and queues reflect its effective priority.
pub(crate) unsafe fn os_rdy_list_change_prio(tcb: NonNull<OsTcb>, new_prio: OsPrio) {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };

    if tcb_ref.prio == new_prio {
        return;
    }

    unsafe { os_rdy_list_remove(tcb) };
    tcb_ref.prio = new_prio;
    unsafe { os_rdy_list_insert(tcb) };
}
