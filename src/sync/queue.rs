//! Bounded message queue
//!
//! A ring buffer of fixed-size messages over caller-provided storage,
//! copied by value in both directions. Senders never block: a full queue
//! is an error. Receivers block until a message arrives.
//!
//! Send does not hand the message to a waking receiver directly; it goes
//! into the ring and the receiver copies it out after resuming, so one
//! receiver wakes per message posted and the ring stays the only data
//! path.

use crate::critical::{critical_section, is_isr_context, CriticalSection};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::list::TcbList;
use crate::sched;
use crate::types::{OsMsgQty, OsTaskState};

/// Bounded queue of fixed-size messages
pub struct OsQueue {
    /// Caller-provided message storage
    buffer: *mut u8,
    /// Size of one message in bytes
    msg_size: OsMsgQty,
    /// Capacity in messages
    capacity: OsMsgQty,
    /// Messages currently stored
    msg_count: OsMsgQty,
    /// Write index
    head: OsMsgQty,
    /// Read index
    tail: OsMsgQty,
    /// Tasks blocked waiting to receive, FIFO
    wait_read_list: TcbList,
}

impl OsQueue {
    /// Create a new, uninitialized queue
    pub const fn new() -> Self {
        OsQueue {
            buffer: core::ptr::null_mut(),
            msg_size: 0,
            capacity: 0,
            msg_count: 0,
            head: 0,
            tail: 0,
            wait_read_list: TcbList::new(),
        }
    }

    /// Initialize the queue over caller-provided storage
    ///
    /// # Arguments
    /// * `buffer` - Storage for `capacity * msg_size` bytes
    /// * `msg_size` - Size of one message in bytes
    /// * `capacity` - Queue depth in messages
    ///
    /// # Safety
    /// `buffer` must point to at least `capacity * msg_size` writable
    /// bytes that outlive the queue.
    pub unsafe fn init(
        &mut self,
        buffer: *mut u8,
        msg_size: OsMsgQty,
        capacity: OsMsgQty,
    ) -> OsResult<()> {
        if buffer.is_null() || msg_size == 0 || capacity == 0 {
            return Err(OsError::Param);
        }

        critical_section(|_cs| {
            self.buffer = buffer;
            self.msg_size = msg_size;
            self.capacity = capacity;
            self.msg_count = 0;
            self.head = 0;
            self.tail = 0;
            self.wait_read_list.init();
            Ok(())
        })
    }

    /// Copy one message into the ring at the write index
    unsafe fn enqueue(&mut self, p_msg: *const u8) {
        let write_addr = unsafe {
            self.buffer.add(self.head as usize * self.msg_size as usize)
        };
        unsafe { core::ptr::copy_nonoverlapping(p_msg, write_addr, self.msg_size as usize) };
        self.head = (self.head + 1) % self.capacity;
        self.msg_count += 1;
    }

    /// Copy one message out of the ring at the read index
    unsafe fn dequeue(&mut self, p_buf: *mut u8) {
        let read_addr = unsafe {
            self.buffer.add(self.tail as usize * self.msg_size as usize)
        };
        unsafe { core::ptr::copy_nonoverlapping(read_addr, p_buf, self.msg_size as usize) };
        self.tail = (self.tail + 1) % self.capacity;
        self.msg_count -= 1;
    }

    /// Send a message (task context, never blocks)
    ///
    /// Copies the message into the ring and wakes one waiting receiver
    /// if there is one.
    ///
    /// # Returns
    /// * `Ok(())` - Message enqueued
    /// * `Err(OsError::QFull)` - Queue is full
    ///
    /// # Safety
    /// `p_msg` must point to `msg_size` readable bytes.
    pub unsafe fn send(&mut self, p_msg: *const u8) -> OsResult<()> {
        if p_msg.is_null() {
            return Err(OsError::Param);
        }

        critical_section(|_cs| {
            if self.msg_count >= self.capacity {
                return Err(OsError::QFull);
            }

            unsafe { self.enqueue(p_msg) };

            if let Some(tcb) = self.wait_read_list.pop_head() {
                unsafe {
                    (*tcb.as_ptr()).task_state = OsTaskState::Ready;
                    sched::os_rdy_list_insert(tcb);
                }
                sched::os_sched();
            }

            Ok(())
        })
    }

    /// Block the calling task on the receiver wait set and request a switch
    ///
    /// One iteration of the receive retry loop; on hardware the caller
    /// does not run again until a send releases it. Must be called with
    /// the queue empty, inside a critical section.
    fn pend_receiver(&mut self) -> OsResult<()> {
        if !kernel::KERNEL.is_running() {
            return Err(OsError::NotRunning);
        }

        let Some(cur) = kernel::tcb_cur_ptr() else {
            return Err(OsError::NotRunning);
        };

        unsafe {
            (*cur.as_ptr()).task_state = OsTaskState::Blocked;
            sched::os_rdy_list_remove(cur);
            self.wait_read_list.insert_tail(cur);

            let next = sched::find_next_task();
            kernel::set_tcb_next(next);
            crate::port::os_trigger_swi();
        }

        Ok(())
    }

    /// Receive a message, blocking while the queue is empty
    ///
    /// A woken receiver re-tests the queue after resuming: another
    /// receiver may have consumed the message first.
    ///
    /// # Returns
    /// * `Ok(())` - One message copied into `p_buf`
    /// * `Err(OsError::Isr)` - Cannot block from ISR
    /// * `Err(OsError::NotRunning)` - Would block before the scheduler started
    ///
    /// # Safety
    /// `p_buf` must point to `msg_size` writable bytes.
    pub unsafe fn receive(&mut self, p_buf: *mut u8) -> OsResult<()> {
        if p_buf.is_null() {
            return Err(OsError::Param);
        }

        if is_isr_context() {
            return Err(OsError::Isr);
        }

        let mut cs = CriticalSection::enter();

        while self.msg_count == 0 {
            self.pend_receiver()?;

            // Leave the critical section so the pended switch happens,
            // then re-enter and re-test once a send released this task.
            drop(cs);
            cs = CriticalSection::enter();
        }

        unsafe { self.dequeue(p_buf) };

        drop(cs);
        Ok(())
    }

    /// Send a message from an ISR
    ///
    /// Never blocks and never requests the switch itself: when the woken
    /// receiver outranks the running task, `higher_prio_woken` is set
    /// and `os_int_exit` performs the switch request.
    ///
    /// # Safety
    /// `p_msg` must point to `msg_size` readable bytes.
    pub unsafe fn send_from_isr(
        &mut self,
        p_msg: *const u8,
        higher_prio_woken: &mut bool,
    ) -> OsResult<()> {
        *higher_prio_woken = false;

        if p_msg.is_null() {
            return Err(OsError::Param);
        }

        critical_section(|_cs| {
            if self.msg_count >= self.capacity {
                return Err(OsError::QFull);
            }

            unsafe { self.enqueue(p_msg) };

            if let Some(tcb) = self.wait_read_list.pop_head() {
                unsafe {
                    (*tcb.as_ptr()).task_state = OsTaskState::Ready;
                    sched::os_rdy_list_insert(tcb);

                    if let Some(cur) = kernel::tcb_cur_ptr() {
                        if tcb.as_ref().prio < cur.as_ref().prio {
                            *higher_prio_woken = true;
                        }
                    }
                }
            }

            Ok(())
        })
    }

    /// Receive a message from an ISR
    ///
    /// Never blocks.
    ///
    /// # Returns
    /// * `Ok(())` - One message copied into `p_buf`
    /// * `Err(OsError::Resource)` - Queue is empty
    ///
    /// # Safety
    /// `p_buf` must point to `msg_size` writable bytes.
    pub unsafe fn receive_from_isr(&mut self, p_buf: *mut u8) -> OsResult<()> {
        if p_buf.is_null() {
            return Err(OsError::Param);
        }

        critical_section(|_cs| {
            if self.msg_count == 0 {
                return Err(OsError::Resource);
            }

            unsafe { self.dequeue(p_buf) };
            Ok(())
        })
    }

    /// Messages currently stored
    #[inline(always)]
    pub fn count(&self) -> OsMsgQty {
        self.msg_count
    }

    /// Write index
    #[inline(always)]
    pub fn head(&self) -> OsMsgQty {
        self.head
    }

    /// Read index
    #[inline(always)]
    pub fn tail(&self) -> OsMsgQty {
        self.tail
    }
}

impl Default for OsQueue {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for OsQueue {}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

/// Shareable queue handle for static storage
pub struct Queue {
    inner: UnsafeCell<OsQueue>,
}

unsafe impl Sync for Queue {}
unsafe impl Send for Queue {}

impl Queue {
    pub const fn new() -> Self {
        Queue {
            inner: UnsafeCell::new(OsQueue::new()),
        }
    }

    /// Initialize over a static byte buffer
    ///
    /// The buffer must hold at least `capacity * msg_size` bytes.
    pub fn init(
        &self,
        buffer: &'static mut [u8],
        msg_size: OsMsgQty,
        capacity: OsMsgQty,
    ) -> OsResult<()> {
        if buffer.len() < msg_size as usize * capacity as usize {
            return Err(OsError::Param);
        }
        unsafe { (*self.inner.get()).init(buffer.as_mut_ptr(), msg_size, capacity) }
    }

    /// Send a message; `msg` must be exactly one message long
    pub fn send(&self, msg: &[u8]) -> OsResult<()> {
        let q = unsafe { &mut *self.inner.get() };
        if msg.len() != q.msg_size as usize {
            return Err(OsError::Param);
        }
        unsafe { q.send(msg.as_ptr()) }
    }

    /// Receive a message into `buf`, blocking while empty
    pub fn receive(&self, buf: &mut [u8]) -> OsResult<()> {
        let q = unsafe { &mut *self.inner.get() };
        if buf.len() != q.msg_size as usize {
            return Err(OsError::Param);
        }
        unsafe { q.receive(buf.as_mut_ptr()) }
    }

    /// Send a message from an ISR
    pub fn send_from_isr(&self, msg: &[u8], higher_prio_woken: &mut bool) -> OsResult<()> {
        let q = unsafe { &mut *self.inner.get() };
        if msg.len() != q.msg_size as usize {
            return Err(OsError::Param);
        }
        unsafe { q.send_from_isr(msg.as_ptr(), higher_prio_woken) }
    }

    /// Receive a message from an ISR; fails with `Resource` when empty
    pub fn receive_from_isr(&self, buf: &mut [u8]) -> OsResult<()> {
        let q = unsafe { &mut *self.inner.get() };
        if buf.len() != q.msg_size as usize {
            return Err(OsError::Param);
        }
        unsafe { q.receive_from_isr(buf.as_mut_ptr()) }
    }

    #[inline]
    pub fn count(&self) -> OsMsgQty {
        unsafe { (*self.inner.get()).count() }
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_util;
    use std::boxed::Box;

    #[test]
    fn test_send_wakes_blocked_receiver() {
        let _guard = test_util::lock();

        kernel::os_init().unwrap();
        let recv = test_util::spawn("Recv", 3);
        let send = test_util::spawn("Send", 8);
        kernel::os_start().unwrap();
        assert_eq!(kernel::tcb_cur_ptr(), Some(recv));

        let mut q = OsQueue::new();
        let buf = Box::leak(Box::new([0u8; 16]));
        unsafe { q.init(buf.as_mut_ptr(), 4, 4).unwrap() };

        // The receiver finds the queue empty and blocks
        critical_section(|_cs| q.pend_receiver()).unwrap();
        assert_eq!(unsafe { recv.as_ref().task_state }, OsTaskState::Blocked);
        assert_eq!(kernel::tcb_next_ptr(), Some(send));
        test_util::switch_to_next();

        // The sender posts one message; the woken receiver outranks it
        // and the switch is requested immediately
        let msg = 0x1122_3344u32.to_le_bytes();
        unsafe { q.send(msg.as_ptr()).unwrap() };
        assert_eq!(unsafe { recv.as_ref().task_state }, OsTaskState::Ready);
        assert!(q.wait_read_list.is_empty());
        assert_eq!(kernel::tcb_next_ptr(), Some(recv));
        test_util::switch_to_next();

        // The resumed receiver re-tests the queue and copies the
        // message out of the ring
        let mut out = [0u8; 4];
        unsafe { q.receive(out.as_mut_ptr()).unwrap() };
        assert_eq!(u32::from_le_bytes(out), 0x1122_3344);
        assert_eq!((q.count(), q.head(), q.tail()), (0, 1, 1));
    }
}
