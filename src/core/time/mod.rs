//! Timebase and delay list
//!
//! Sleeping tasks sit on a single sorted list keyed by relative deltas:
//! each node's `delay_ticks` is the gap to its predecessor's wake instant
//! (the head's gap is from "now"), so the tick handler only ever
//! decrements the head. Followers whose delta is zero share the head's
//! wake instant and are released on the same tick.

use crate::critical::{critical_section, is_isr_context, CriticalSection};
use crate::config::CFG_STACK_MAGIC;
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::sched;
use crate::types::{OsTaskState, OsTick};

/// Delay the calling task for a number of system ticks
///
/// The caller leaves its ready queue and is spliced into the delay list
/// at the position given by its wake instant; the tick handler moves it
/// back when the cumulative delta reaches zero.
///
/// A delay of zero ticks yields instead: the caller rotates to the tail
/// of its own priority queue, giving equal-priority peers a slot, and
/// returns immediately when it has none.
///
/// # Returns
/// * `Ok(())` - Delay elapsed (or yield completed)
/// * `Err(OsError::NotRunning)` - Scheduler not started
/// * `Err(OsError::Isr)` - Cannot delay from ISR
pub fn os_time_dly(ticks: OsTick) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::NotRunning);
    }

    if is_isr_context() {
        return Err(OsError::Isr);
    }

    if ticks == 0 {
        critical_section(|_cs| unsafe {
            sched::os_sched_round_robin();
        });
        sched::os_sched();
        return Ok(());
    }

    let _cs = CriticalSection::enter();

    let Some(cur) = kernel::tcb_cur_ptr() else {
        return Err(OsError::NotRunning);
    };

    unsafe {
        let cur_ref = &mut *cur.as_ptr();
        cur_ref.task_state = OsTaskState::Blocked;
        sched::os_rdy_list_remove(cur);

        // Walk the list consuming predecessor deltas; what is left of
        // `ticks` becomes this task's delta relative to the node before
        // the insertion point.
        let delay_list = kernel::delay_list();
        let mut remain = ticks;
        let mut iter = delay_list.head();

        while let Some(node) = iter {
            let node_ref = node.as_ref();
            if remain < node_ref.delay_ticks {
                break;
            }
            remain -= node_ref.delay_ticks;
            iter = node_ref.next_ptr;
        }

        cur_ref.delay_ticks = remain;

        match iter {
            Some(node) => {
                // The successor's delta is now relative to this task
                (*node.as_ptr()).delay_ticks -= remain;
                delay_list.insert_before(cur, node);
            }
            None => delay_list.insert_tail(cur),
        }

        let next = sched::find_next_task();
        kernel::set_tcb_next(next);
        crate::port::os_trigger_swi();
    }

    Ok(())
}

/// Get current tick count
#[inline]
pub fn os_time_get() -> OsTick {
    kernel::KERNEL.tick_get()
}

/// System tick handler
///
/// Called from the tick ISR with interrupts masked. Advances time, wakes
/// expired delays, rotates equal-priority peers, and requests a context
/// switch when the scheduling decision changed.
pub fn os_tick_handler() {
    if !kernel::KERNEL.is_running() {
        return;
    }

    critical_section(|_cs| {
        os_check_stack_overflow();

        kernel::KERNEL.tick_increment();

        unsafe {
            // Delta decrement touches only the head; every zero-delta
            // follower shares the head's wake instant and wakes now too.
            let delay_list = kernel::delay_list();
            if let Some(head) = delay_list.head() {
                let head_ref = &mut *head.as_ptr();
                if head_ref.delay_ticks > 0 {
                    head_ref.delay_ticks -= 1;
                }

                while let Some(head) = delay_list.head() {
                    if head.as_ref().delay_ticks != 0 {
                        break;
                    }
                    delay_list.pop_head();
                    (*head.as_ptr()).task_state = OsTaskState::Ready;
                    sched::os_rdy_list_insert(head);
                }
            }

            sched::os_sched_round_robin();

            let next = sched::find_next_task();
            if Some(next) != kernel::tcb_cur_ptr() {
                kernel::set_tcb_next(next);
                crate::port::os_trigger_swi();
            }
        }
    });
}

/// Validate the running task's stack sentinel
///
/// The word at the stack's low end must still hold the magic value and
/// the saved stack pointer must not have crossed it. Either violation is
/// fatal.
fn os_check_stack_overflow() {
    let Some(cur) = kernel::tcb_cur_ptr() else {
        return;
    };

    let cur_ref = unsafe { cur.as_ref() };
    if cur_ref.stk_limit.is_null() {
        return;
    }

    unsafe {
        if cur_ref.stk_limit.read() != CFG_STACK_MAGIC || cur_ref.stk_ptr <= cur_ref.stk_limit {
            kernel::os_fatal();
        }
    }
}
