//! Mutex implementation with priority inheritance
//!
//! Recursive ownership with automatic priority boosting: a contended
//! owner runs at the priority of its highest-priority waiter until it
//! releases, which caps the time a high-priority task can be held up by
//! a low-priority lock holder.
//!
//! Priority restore uses the owner's base priority, which is exact while
//! a task holds at most one mutex acquired under inheritance.

use core::ptr::NonNull;

use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::list::TcbList;
use crate::sched;
use crate::task::OsTcb;
use crate::types::{OsNestingCtr, OsTaskState};

/// Mutex with priority inheritance
pub struct OsMutex {
    /// Task that owns the mutex
    owner: Option<NonNull<OsTcb>>,
    /// Recursion depth
    nesting_ctr: OsNestingCtr,
    /// Waiting tasks ordered by priority, FIFO among equals
    wait_list: TcbList,
}

impl OsMutex {
    /// Create a new unowned mutex
    pub const fn new() -> Self {
        OsMutex {
            owner: None,
            nesting_ctr: 0,
            wait_list: TcbList::new(),
        }
    }

    /// Initialize/reset the mutex
    pub fn init(&mut self) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::Isr);
        }

        critical_section(|_cs| {
            self.owner = None;
            self.nesting_ctr = 0;
            self.wait_list.init();
            Ok(())
        })
    }

    /// Acquire the mutex
    ///
    /// Free mutexes are claimed immediately and re-acquisition by the
    /// owner nests. On contention the caller blocks in priority order;
    /// if it outranks the owner, the owner inherits the caller's
    /// priority first.
    ///
    /// # Returns
    /// * `Ok(())` - Mutex acquired (immediately or after blocking)
    /// * `Err(OsError::Nesting)` - Recursion depth exhausted
    /// * `Err(OsError::Isr)` - Cannot acquire from ISR
    /// * `Err(OsError::NotRunning)` - Scheduler not started
    pub fn pend(&mut self) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::Isr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::NotRunning);
        }

        critical_section(|_cs| {
            let Some(cur) = kernel::tcb_cur_ptr() else {
                return Err(OsError::NotRunning);
            };

            let Some(owner) = self.owner else {
                self.owner = Some(cur);
                self.nesting_ctr = 1;
                return Ok(());
            };

            if owner == cur {
                if self.nesting_ctr == OsNestingCtr::MAX {
                    return Err(OsError::Nesting);
                }
                self.nesting_ctr += 1;
                return Ok(());
            }

            // Contended: boost the owner before blocking so it cannot be
            // starved by tasks between the two priorities.
            unsafe {
                let cur_prio = cur.as_ref().prio;
                let owner_ref = &mut *owner.as_ptr();

                if cur_prio < owner_ref.prio {
                    if owner_ref.is_ready() {
                        sched::os_rdy_list_change_prio(owner, cur_prio);
                    } else {
                        owner_ref.prio = cur_prio;
                    }
                }

                (*cur.as_ptr()).task_state = OsTaskState::Blocked;
                sched::os_rdy_list_remove(cur);
                self.wait_list.insert_by_prio(cur);

                let next = sched::find_next_task();
                kernel::set_tcb_next(next);
                crate::port::os_trigger_swi();
            }

            // Runs again once the previous owner handed the mutex over
            Ok(())
        })
    }

    /// Release the mutex
    ///
    /// Unwinds one nesting level; at zero the owner's base priority is
    /// restored if it was boosted, and ownership passes directly to the
    /// highest-priority waiter when one exists.
    ///
    /// # Returns
    /// * `Ok(())` - Released (or nesting unwound by one)
    /// * `Err(OsError::NotOwner)` - Caller does not own the mutex
    /// * `Err(OsError::Isr)` - Cannot release from ISR
    pub fn post(&mut self) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::Isr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::NotRunning);
        }

        critical_section(|_cs| {
            let Some(cur) = kernel::tcb_cur_ptr() else {
                return Err(OsError::NotRunning);
            };

            if self.owner != Some(cur) {
                return Err(OsError::NotOwner);
            }

            self.nesting_ctr -= 1;
            if self.nesting_ctr > 0 {
                return Ok(());
            }

            unsafe {
                let cur_ref = &mut *cur.as_ptr();
                if cur_ref.prio != cur_ref.base_prio {
                    sched::os_rdy_list_change_prio(cur, cur_ref.base_prio);
                }

                match self.wait_list.pop_head() {
                    Some(waiter) => {
                        self.owner = Some(waiter);
                        self.nesting_ctr = 1;

                        (*waiter.as_ptr()).task_state = OsTaskState::Ready;
                        sched::os_rdy_list_insert(waiter);

                        sched::os_sched();
                    }
                    None => {
                        self.owner = None;
                    }
                }
            }

            Ok(())
        })
    }

    /// Check if the mutex is owned
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }

    /// Current recursion depth
    #[inline]
    pub fn nesting(&self) -> OsNestingCtr {
        self.nesting_ctr
    }
}

impl Default for OsMutex {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

/// Shareable mutex handle for static storage
pub struct Mutex {
    inner: UnsafeCell<OsMutex>,
}

unsafe impl Sync for Mutex {}
unsafe impl Send for Mutex {}

impl Mutex {
    pub const fn new() -> Self {
        Mutex {
            inner: UnsafeCell::new(OsMutex::new()),
        }
    }

    pub fn init(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).init() }
    }

    pub fn lock(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).pend() }
    }

    pub fn unlock(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).post() }
    }

    #[inline]
    pub fn is_owned(&self) -> bool {
        unsafe { (*self.inner.get()).is_owned() }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}
