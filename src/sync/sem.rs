//! Semaphore implementation
//!
//! Counting semaphores with a FIFO wait set: for equal-priority waiters,
//! the k-th task to wait is the k-th to be released.

use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::list::TcbList;
use crate::sched;
use crate::types::{OsSemCtr, OsTaskState};

/// Counting semaphore
pub struct OsSem {
    /// Current count
    count: OsSemCtr,
    /// Tasks waiting on this semaphore, FIFO
    wait_list: TcbList,
}

impl OsSem {
    /// Create a new semaphore with an initial count
    pub const fn new(count: OsSemCtr) -> Self {
        OsSem {
            count,
            wait_list: TcbList::new(),
        }
    }

    /// Initialize/reset the semaphore
    pub fn init(&mut self, count: OsSemCtr) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::Isr);
        }

        critical_section(|_cs| {
            self.count = count;
            self.wait_list.init();
            Ok(())
        })
    }

    /// Wait on the semaphore (P operation)
    ///
    /// Takes a count when one is available, otherwise blocks with no
    /// timeout until a post releases this task.
    ///
    /// # Returns
    /// * `Ok(())` - Count taken (immediately or after blocking)
    /// * `Err(OsError::Isr)` - Cannot block from ISR
    /// * `Err(OsError::NotRunning)` - Would block before the scheduler started
    pub fn wait(&mut self) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::Isr);
        }

        critical_section(|_cs| {
            if self.count > 0 {
                self.count -= 1;
                return Ok(());
            }

            if !kernel::KERNEL.is_running() {
                return Err(OsError::NotRunning);
            }

            let Some(cur) = kernel::tcb_cur_ptr() else {
                return Err(OsError::NotRunning);
            };

            unsafe {
                (*cur.as_ptr()).task_state = OsTaskState::Blocked;
                sched::os_rdy_list_remove(cur);
                self.wait_list.insert_tail(cur);

                let next = sched::find_next_task();
                kernel::set_tcb_next(next);
                crate::port::os_trigger_swi();
            }

            // Runs again once a post released this task
            Ok(())
        })
    }

    /// Signal the semaphore (V operation)
    ///
    /// Wakes the longest-waiting task when one exists; otherwise the
    /// count goes up, saturating at the counter maximum.
    pub fn post(&mut self) -> OsResult<()> {
        critical_section(|_cs| {
            match self.wait_list.pop_head() {
                Some(tcb) => {
                    unsafe {
                        (*tcb.as_ptr()).task_state = OsTaskState::Ready;
                        sched::os_rdy_list_insert(tcb);
                    }
                    sched::os_sched();
                }
                None => {
                    self.count = self.count.saturating_add(1);
                }
            }
            Ok(())
        })
    }

    /// Signal the semaphore from an ISR
    ///
    /// Never blocks and never requests the switch itself: when the woken
    /// task outranks the running one, `higher_prio_woken` is set and the
    /// interrupt epilogue (`os_int_exit`) performs the switch request.
    pub fn post_from_isr(&mut self, higher_prio_woken: &mut bool) -> OsResult<()> {
        *higher_prio_woken = false;

        critical_section(|_cs| {
            match self.wait_list.pop_head() {
                Some(tcb) => unsafe {
                    (*tcb.as_ptr()).task_state = OsTaskState::Ready;
                    sched::os_rdy_list_insert(tcb);

                    if let Some(cur) = kernel::tcb_cur_ptr() {
                        if tcb.as_ref().prio < cur.as_ref().prio {
                            *higher_prio_woken = true;
                        }
                    }
                },
                None => {
                    self.count = self.count.saturating_add(1);
                }
            }
            Ok(())
        })
    }

    /// Get current semaphore count
    #[inline(always)]
    pub fn count(&self) -> OsSemCtr {
        self.count
    }
}

impl Default for OsSem {
    fn default() -> Self {
        Self::new(0)
    }
}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

/// Shareable semaphore handle for static storage
pub struct Semaphore {
    inner: UnsafeCell<OsSem>,
}

unsafe impl Sync for Semaphore {}
unsafe impl Send for Semaphore {}

impl Semaphore {
    pub const fn new(count: OsSemCtr) -> Self {
        Semaphore {
            inner: UnsafeCell::new(OsSem::new(count)),
        }
    }

    pub fn init(&self, count: OsSemCtr) -> OsResult<()> {
        unsafe { (*self.inner.get()).init(count) }
    }

    pub fn wait(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).wait() }
    }

    pub fn post(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).post() }
    }

    pub fn post_from_isr(&self, higher_prio_woken: &mut bool) -> OsResult<()> {
        unsafe { (*self.inner.get()).post_from_isr(higher_prio_woken) }
    }

    #[inline]
    pub fn count(&self) -> OsSemCtr {
        unsafe { (*self.inner.get()).count() }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}
