//! Intrusive doubly-linked list of TCBs
//!
//! The TCB itself is the list node; a task belongs to exactly one list at
//! a time (a ready queue, the delay list, or one wait list). Removal is
//! O(1) given the node. The list is not thread-safe on its own; callers
//! hold a critical section.

use core::ptr::NonNull;

use crate::task::OsTcb;
use crate::types::OsPrio;

/// Intrusive list of TCBs with head and tail pointers
#[derive(Debug)]
pub struct TcbList {
    head: Option<NonNull<OsTcb>>,
    tail: Option<NonNull<OsTcb>>,
}

impl TcbList {
    /// Create a new empty list
    pub const fn new() -> Self {
        TcbList {
            head: None,
            tail: None,
        }
    }

    /// Initialize/reset the list
    pub fn init(&mut self) {
        self.head = None;
        self.tail = None;
    }

    /// Get head of list
    #[inline]
    pub fn head(&self) -> Option<NonNull<OsTcb>> {
        self.head
    }

    /// Get tail of list
    #[inline]
    pub fn tail(&self) -> Option<NonNull<OsTcb>> {
        self.tail
    }

    /// Check if list is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Insert TCB at the tail of the list (FIFO order)
    ///
    /// Caller must ensure tcb is valid and not already in any list.
    pub fn insert_tail(&mut self, tcb: NonNull<OsTcb>) {
        // SAFETY: exclusive access via critical section
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        tcb_ref.next_ptr = None;
        tcb_ref.prev_ptr = self.tail;

        match self.tail {
            Some(tail) => {
                unsafe { (*tail.as_ptr()).next_ptr = Some(tcb) };
            }
            None => {
                self.head = Some(tcb);
            }
        }

        self.tail = Some(tcb);
    }

    /// Insert TCB immediately before another node already in this list
    ///
    /// Used by the delay list to splice a task in front of the node whose
    /// delta it just re-normalized.
    pub fn insert_before(&mut self, tcb: NonNull<OsTcb>, before: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        let before_ref = unsafe { &mut *before.as_ptr() };

        tcb_ref.next_ptr = Some(before);
        tcb_ref.prev_ptr = before_ref.prev_ptr;

        match before_ref.prev_ptr {
            Some(prev) => {
                unsafe { (*prev.as_ptr()).next_ptr = Some(tcb) };
            }
            None => {
                self.head = Some(tcb);
            }
        }

        before_ref.prev_ptr = Some(tcb);
    }

    /// Insert in priority order
    ///
    /// Strictly higher priority (numerically lower) precedes; among equal
    /// priorities the newcomer goes after the incumbents, so equals stay
    /// FIFO.
    pub fn insert_by_prio(&mut self, tcb: NonNull<OsTcb>) {
        let prio: OsPrio = unsafe { tcb.as_ref().prio };

        let mut iter = self.head;
        while let Some(cur) = iter {
            let cur_ref = unsafe { cur.as_ref() };
            if prio < cur_ref.prio {
                self.insert_before(tcb, cur);
                return;
            }
            iter = cur_ref.next_ptr;
        }

        self.insert_tail(tcb);
    }

    /// Remove a TCB from the list
    ///
    /// Caller must ensure tcb is valid and is in this list.
    pub fn remove(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        match tcb_ref.prev_ptr {
            Some(prev) => {
                unsafe { (*prev.as_ptr()).next_ptr = tcb_ref.next_ptr };
            }
            None => {
                // This was the head
                self.head = tcb_ref.next_ptr;
            }
        }

        match tcb_ref.next_ptr {
            Some(next) => {
                unsafe { (*next.as_ptr()).prev_ptr = tcb_ref.prev_ptr };
            }
            None => {
                // This was the tail
                self.tail = tcb_ref.prev_ptr;
            }
        }

        tcb_ref.prev_ptr = None;
        tcb_ref.next_ptr = None;
    }

    /// Detach and return the head of the list, or None when empty
    pub fn pop_head(&mut self) -> Option<NonNull<OsTcb>> {
        let head = self.head?;
        self.remove(head);
        Some(head)
    }
}

impl Default for TcbList {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: TcbList is only modified within critical sections
unsafe impl Send for TcbList {}
unsafe impl Sync for TcbList {}
