//! Fixed-block memory pool
//!
//! O(1) alloc/free over caller-provided storage with no fragmentation.
//! The free list is threaded through the first machine word of each free
//! block, so the pool needs no sidecar metadata. Exhausted pools block
//! the requester until another task returns a block.

use crate::critical::{critical_section, is_isr_context, CriticalSection};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::list::TcbList;
use crate::sched;
use crate::types::OsTaskState;

/// Fixed-block memory pool
pub struct OsMemPool {
    /// Pool storage base address
    addr: *mut u8,
    /// Head of the free-block list
    free_list: *mut u8,
    /// Size of one block in bytes
    block_size: usize,
    /// Total number of blocks
    total_blocks: u32,
    /// Blocks currently free
    free_blocks: u32,
    /// Tasks blocked waiting for a block, FIFO
    wait_list: TcbList,
}

impl OsMemPool {
    /// Create a new, uninitialized pool
    pub const fn new() -> Self {
        OsMemPool {
            addr: core::ptr::null_mut(),
            free_list: core::ptr::null_mut(),
            block_size: 0,
            total_blocks: 0,
            free_blocks: 0,
            wait_list: TcbList::new(),
        }
    }

    /// Initialize the pool over caller-provided storage
    ///
    /// Threads the free list through the first word of each block. The
    /// base address and block size must be aligned for a pointer store
    /// and each block must be able to hold one pointer.
    ///
    /// # Safety
    /// `start_addr` must point to at least `blocks * block_size` writable
    /// bytes that outlive the pool.
    pub unsafe fn init(
        &mut self,
        start_addr: *mut u8,
        blocks: u32,
        block_size: usize,
    ) -> OsResult<()> {
        let ptr_align = core::mem::align_of::<*mut u8>();

        if start_addr.is_null() || blocks == 0 || block_size < core::mem::size_of::<*mut u8>() {
            return Err(OsError::Param);
        }

        if start_addr as usize % ptr_align != 0 || block_size % ptr_align != 0 {
            return Err(OsError::Param);
        }

        critical_section(|_cs| {
            self.addr = start_addr;
            self.free_list = start_addr;
            self.block_size = block_size;
            self.total_blocks = blocks;
            self.free_blocks = blocks;
            self.wait_list.init();

            // Each free block's first word points at the next block
            unsafe {
                let mut p_block = start_addr;
                for _ in 0..blocks - 1 {
                    let p_next = p_block.add(block_size);
                    (p_block as *mut *mut u8).write(p_next);
                    p_block = p_next;
                }
                (p_block as *mut *mut u8).write(core::ptr::null_mut());
            }

            Ok(())
        })
    }

    /// Block the calling task on the pool's wait set and request a switch
    ///
    /// One iteration of the allocation retry loop; on hardware the
    /// caller does not run again until a put releases it. Must be called
    /// with the pool exhausted, inside a critical section.
    fn pend_requester(&mut self) -> OsResult<()> {
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

        Ok(())
    }

    /// Get a block, blocking while the pool is exhausted
    ///
    /// # Returns
    /// * `Ok(block)` - Pointer to a free block
    /// * `Err(OsError::Isr)` - Cannot block from ISR
    /// * `Err(OsError::NotRunning)` - Would block before the scheduler started
    pub fn get(&mut self) -> OsResult<*mut u8> {
        if is_isr_context() {
            return Err(OsError::Isr);
        }

        let mut cs = CriticalSection::enter();

        while self.free_blocks == 0 {
            self.pend_requester()?;

            // Let the pended switch happen, then re-test after a put
            // released this task.
            drop(cs);
            cs = CriticalSection::enter();
        }

        let block = self.free_list;
        self.free_list = unsafe { (block as *mut *mut u8).read() };
        self.free_blocks -= 1;

        drop(cs);
        Ok(block)
    }

    /// Return a block to the pool
    ///
    /// The address must lie inside the pool and be block-aligned. One
    /// waiting task is released when the pool had been exhausted.
    ///
    /// # Returns
    /// * `Ok(())` - Block returned
    /// * `Err(OsError::InvalidAddr)` - Address outside the pool
    /// * `Err(OsError::NotAlign)` - Address not on a block boundary
    pub fn put(&mut self, p_block: *mut u8) -> OsResult<()> {
        if p_block.is_null() {
            return Err(OsError::Param);
        }

        critical_section(|_cs| {
            let start = self.addr as usize;
            let block = p_block as usize;
            let total_size = self.total_blocks as usize * self.block_size;

            if block < start || block >= start + total_size {
                return Err(OsError::InvalidAddr);
            }

            if (block - start) % self.block_size != 0 {
                return Err(OsError::NotAlign);
            }

            unsafe { (p_block as *mut *mut u8).write(self.free_list) };
            self.free_list = p_block;
            self.free_blocks += 1;

            if let Some(tcb) = self.wait_list.pop_head() {
                unsafe {
                    (*tcb.as_ptr()).task_state = OsTaskState::Ready;
                    sched::os_rdy_list_insert(tcb);
                }
                sched::os_sched();
            }

            Ok(())
        })
    }

    /// Blocks currently free
    #[inline(always)]
    pub fn free_blocks(&self) -> u32 {
        self.free_blocks
    }

    /// Total number of blocks
    #[inline(always)]
    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }
}

impl Default for OsMemPool {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for OsMemPool {}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

/// Shareable memory pool handle for static storage
pub struct MemPool {
    inner: UnsafeCell<OsMemPool>,
}

unsafe impl Sync for MemPool {}
unsafe impl Send for MemPool {}

impl MemPool {
    pub const fn new() -> Self {
        MemPool {
            inner: UnsafeCell::new(OsMemPool::new()),
        }
    }

    /// Initialize over a static byte buffer
    ///
    /// The buffer must hold at least `blocks * block_size` bytes.
    pub fn init(&self, storage: &'static mut [u8], blocks: u32, block_size: usize) -> OsResult<()> {
        if storage.len() < blocks as usize * block_size {
            return Err(OsError::Param);
        }
        unsafe { (*self.inner.get()).init(storage.as_mut_ptr(), blocks, block_size) }
    }

    pub fn get(&self) -> OsResult<*mut u8> {
        unsafe { (*self.inner.get()).get() }
    }

    pub fn put(&self, p_block: *mut u8) -> OsResult<()> {
        unsafe { (*self.inner.get()).put(p_block) }
    }

    #[inline]
    pub fn free_blocks(&self) -> u32 {
        unsafe { (*self.inner.get()).free_blocks() }
    }
}

impl Default for MemPool {
    fn default() -> Self {
        Self::new()
    }
}
