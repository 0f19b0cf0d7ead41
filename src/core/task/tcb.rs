//! Task Control Block (TCB) definition
//!
//! The TCB is owned by the task's creator; the kernel borrows it for the
//! task's lifetime and never frees it. It doubles as the intrusive list
//! node, so a task sits in exactly one list at any moment.

use core::ptr::NonNull;

use crate::types::{OsPrio, OsStkElement, OsTaskState, OsTick};

/// Task Control Block
///
/// `stk_ptr` must stay the first field: the context-switch handler loads
/// and stores it through offset 0 of the TCB.
#[repr(C)]
pub struct OsTcb {
    /// Current stack pointer, updated at every context switch
    pub stk_ptr: *mut OsStkElement,

    // ============ Stack information ============
    /// Low end of the stack; holds the overflow sentinel word
    pub stk_limit: *mut OsStkElement,
    /// Stack size in words
    pub stk_size: usize,

    // ============ Task identification ============
    /// Task name
    pub name: &'static str,

    // ============ List links ============
    /// Next TCB in whichever list this task is on
    pub next_ptr: Option<NonNull<OsTcb>>,
    /// Previous TCB in whichever list this task is on
    pub prev_ptr: Option<NonNull<OsTcb>>,

    // ============ Scheduling state ============
    /// Current task state
    pub task_state: OsTaskState,
    /// Remaining delay, delta-encoded while on the delay list
    pub delay_ticks: OsTick,
    /// Current (possibly inherited) priority
    pub prio: OsPrio,
    /// Priority assigned at creation
    pub base_prio: OsPrio,
}

impl OsTcb {
    /// Create a new, uninitialized TCB
    pub const fn new() -> Self {
        OsTcb {
            stk_ptr: core::ptr::null_mut(),
            stk_limit: core::ptr::null_mut(),
            stk_size: 0,

            name: "",

            next_ptr: None,
            prev_ptr: None,

            task_state: OsTaskState::Ready,
            delay_ticks: 0,
            prio: 0,
            base_prio: 0,
        }
    }

    /// Reset the TCB to default values
    pub fn init(&mut self) {
        *self = Self::new();
    }

    /// Check if the task is ready to run
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.task_state == OsTaskState::Ready
    }
}

impl Default for OsTcb {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for OsTcb {}
unsafe impl Sync for OsTcb {}
