//! Unit tests for core RTOS modules
//!
//! These tests run on the host (not the embedded target) and cover the
//! pure data structures: priority bitmap, intrusive list, queue ring,
//! and memory pool bookkeeping. Scenario tests that need the kernel
//! singleton live in kernel_tests.rs.

use core::ptr::NonNull;

use sandos::task::OsTcb;

fn leak_tcb(prio: u8) -> NonNull<OsTcb> {
    let tcb = Box::leak(Box::new(OsTcb::new()));
    tcb.prio = prio;
    tcb.base_prio = prio;
    NonNull::from(tcb)
}

mod prio_tests {
    use sandos::config::CFG_PRIO_MAX;
    use sandos::prio::PrioMap;

    #[test]
    fn test_empty_map() {
        let map = PrioMap::new();
        assert!(map.is_empty());
    }

    #[test]
    fn test_single_priority() {
        let mut map = PrioMap::new();

        map.insert(5);
        assert!(!map.is_empty());
        assert!(map.is_set(5));
        assert!(!map.is_set(4));
        assert_eq!(map.get_highest(), 5);

        map.remove(5);
        assert!(map.is_empty());
    }

    #[test]
    fn test_multiple_priorities() {
        let mut map = PrioMap::new();

        map.insert(20);
        map.insert(5);
        map.insert(10);
        map.insert(0);
        map.insert(15);

        assert_eq!(map.get_highest(), 0);

        map.remove(0);
        assert_eq!(map.get_highest(), 5);

        map.remove(5);
        assert_eq!(map.get_highest(), 10);

        map.remove(10);
        assert_eq!(map.get_highest(), 15);

        map.remove(15);
        assert_eq!(map.get_highest(), 20);

        map.remove(20);
        assert!(map.is_empty());
    }

    #[test]
    fn test_byte_boundaries() {
        let mut map = PrioMap::new();

        map.insert(7);
        map.insert(8);
        assert_eq!(map.get_highest(), 7);

        map.remove(7);
        assert_eq!(map.get_highest(), 8);

        map.insert(31);
        map.remove(8);
        assert_eq!(map.get_highest(), 31);
    }

    #[test]
    fn test_all_priorities() {
        let mut map = PrioMap::new();

        for i in 0..CFG_PRIO_MAX {
            map.insert(i as u8);
        }

        for i in 0..CFG_PRIO_MAX {
            assert_eq!(map.get_highest(), i as u8);
            map.remove(i as u8);
        }

        assert!(map.is_empty());
    }
}

mod list_tests {
    use super::leak_tcb;
    use sandos::list::TcbList;

    #[test]
    fn test_empty_list() {
        let mut list = TcbList::new();
        assert!(list.is_empty());
        assert!(list.head().is_none());
        assert!(list.tail().is_none());
        assert!(list.pop_head().is_none());
    }

    #[test]
    fn test_fifo_order() {
        let mut list = TcbList::new();
        let a = leak_tcb(1);
        let b = leak_tcb(2);
        let c = leak_tcb(3);

        list.insert_tail(a);
        list.insert_tail(b);
        list.insert_tail(c);

        assert_eq!(list.head(), Some(a));
        assert_eq!(list.tail(), Some(c));

        assert_eq!(list.pop_head(), Some(a));
        assert_eq!(list.pop_head(), Some(b));
        assert_eq!(list.pop_head(), Some(c));
        assert!(list.is_empty());
    }

    #[test]
    fn test_remove_middle() {
        let mut list = TcbList::new();
        let a = leak_tcb(1);
        let b = leak_tcb(2);
        let c = leak_tcb(3);

        list.insert_tail(a);
        list.insert_tail(b);
        list.insert_tail(c);

        list.remove(b);
        assert_eq!(list.pop_head(), Some(a));
        assert_eq!(list.pop_head(), Some(c));
        assert!(list.is_empty());

        // Removed node's links are cleared
        unsafe {
            assert!(b.as_ref().next_ptr.is_none());
            assert!(b.as_ref().prev_ptr.is_none());
        }
    }

    #[test]
    fn test_remove_head_and_tail() {
        let mut list = TcbList::new();
        let a = leak_tcb(1);
        let b = leak_tcb(2);

        list.insert_tail(a);
        list.insert_tail(b);

        list.remove(a);
        assert_eq!(list.head(), Some(b));
        assert_eq!(list.tail(), Some(b));

        list.remove(b);
        assert!(list.is_empty());
    }

    #[test]
    fn test_insert_by_prio_ordering() {
        let mut list = TcbList::new();
        let p5 = leak_tcb(5);
        let p10_first = leak_tcb(10);
        let p10_second = leak_tcb(10);
        let p20 = leak_tcb(20);

        // Arrival order: 10, 20, 10, 5
        list.insert_by_prio(p10_first);
        list.insert_by_prio(p20);
        list.insert_by_prio(p10_second);
        list.insert_by_prio(p5);

        // Highest priority first; equal priorities keep arrival order
        assert_eq!(list.pop_head(), Some(p5));
        assert_eq!(list.pop_head(), Some(p10_first));
        assert_eq!(list.pop_head(), Some(p10_second));
        assert_eq!(list.pop_head(), Some(p20));
    }

    #[test]
    fn test_insert_before_head() {
        let mut list = TcbList::new();
        let a = leak_tcb(1);
        let b = leak_tcb(2);

        list.insert_tail(a);
        list.insert_before(b, a);

        assert_eq!(list.pop_head(), Some(b));
        assert_eq!(list.pop_head(), Some(a));
    }
}

#[cfg(feature = "queue")]
mod queue_tests {
    use sandos::error::OsError;
    use sandos::sync::queue::Queue;

    fn leak_buf(len: usize) -> &'static mut [u8] {
        Box::leak(vec![0u8; len].into_boxed_slice())
    }

    #[test]
    fn test_init_param_checks() {
        let q = Queue::new();
        assert_eq!(q.init(leak_buf(16), 0, 4), Err(OsError::Param));
        assert_eq!(q.init(leak_buf(16), 4, 0), Err(OsError::Param));
        // Buffer too small for capacity * msg_size
        assert_eq!(q.init(leak_buf(8), 4, 4), Err(OsError::Param));
    }

    #[test]
    fn test_send_full() {
        let q = Queue::new();
        q.init(leak_buf(8), 4, 2).unwrap();

        q.send(&1u32.to_le_bytes()).unwrap();
        q.send(&2u32.to_le_bytes()).unwrap();
        assert_eq!(q.send(&3u32.to_le_bytes()), Err(OsError::QFull));
        assert_eq!(q.count(), 2);
    }

    #[test]
    fn test_ring_indices() {
        let mut q = sandos::sync::queue::OsQueue::new();
        let buf = leak_buf(16);
        unsafe { q.init(buf.as_mut_ptr(), 4, 4).unwrap() };

        let msg = 0x1122_3344u32.to_le_bytes();
        unsafe { q.send(msg.as_ptr()).unwrap() };
        assert_eq!(q.count(), 1);
        assert_eq!(q.head(), 1);
        assert_eq!(q.tail(), 0);

        let mut out = [0u8; 4];
        unsafe { q.receive(out.as_mut_ptr()).unwrap() };
        assert_eq!(u32::from_le_bytes(out), 0x1122_3344);
        assert_eq!((q.count(), q.head(), q.tail()), (0, 1, 1));
    }

    #[test]
    fn test_capacity_one_alternation() {
        let q = Queue::new();
        q.init(leak_buf(2), 2, 1).unwrap();

        let mut out = [0u8; 2];
        for i in 0..8u16 {
            q.send(&i.to_le_bytes()).unwrap();
            assert_eq!(q.send(&i.to_le_bytes()), Err(OsError::QFull));
            q.receive(&mut out).unwrap();
            assert_eq!(u16::from_le_bytes(out), i);
            assert_eq!(q.count(), 0);
        }
    }

    #[test]
    fn test_isr_variants() {
        let q = Queue::new();
        q.init(leak_buf(12), 4, 3).unwrap();

        let mut out = [0u8; 4];
        assert_eq!(q.receive_from_isr(&mut out), Err(OsError::Resource));

        let mut woken = true;
        q.send_from_isr(&7u32.to_le_bytes(), &mut woken).unwrap();
        // Nobody was waiting
        assert!(!woken);

        q.receive_from_isr(&mut out).unwrap();
        assert_eq!(u32::from_le_bytes(out), 7);
    }

    #[test]
    fn test_message_size_mismatch() {
        let q = Queue::new();
        q.init(leak_buf(16), 4, 4).unwrap();

        assert_eq!(q.send(&[0u8; 2]), Err(OsError::Param));
        let mut out = [0u8; 8];
        assert_eq!(q.receive(&mut out), Err(OsError::Param));
    }
}

#[cfg(feature = "mem")]
mod mem_tests {
    use sandos::error::OsError;
    use sandos::sync::mem::MemPool;

    fn leak_storage(len: usize) -> &'static mut [u8] {
        // Box<[u64]> keeps the base pointer-aligned
        let words = Box::leak(vec![0u64; len / 8 + 1].into_boxed_slice());
        unsafe {
            core::slice::from_raw_parts_mut(words.as_mut_ptr() as *mut u8, len)
        }
    }

    #[test]
    fn test_init_param_checks() {
        let pool = MemPool::new();
        // Block must hold at least one pointer
        assert_eq!(pool.init(leak_storage(64), 16, 2), Err(OsError::Param));
        assert_eq!(pool.init(leak_storage(64), 0, 16), Err(OsError::Param));
        // Storage too small
        assert_eq!(pool.init(leak_storage(16), 4, 16), Err(OsError::Param));
    }

    #[test]
    fn test_get_put_inverse() {
        let pool = MemPool::new();
        pool.init(leak_storage(64), 4, 16).unwrap();
        assert_eq!(pool.free_blocks(), 4);

        let b = pool.get().unwrap();
        assert_eq!(pool.free_blocks(), 3);

        pool.put(b).unwrap();
        assert_eq!(pool.free_blocks(), 4);

        // Freed block returns to the list head
        assert_eq!(pool.get().unwrap(), b);
        pool.put(b).unwrap();
    }

    #[test]
    fn test_all_blocks_distinct() {
        let pool = MemPool::new();
        pool.init(leak_storage(64), 4, 16).unwrap();

        let mut blocks = Vec::new();
        for _ in 0..4 {
            blocks.push(pool.get().unwrap());
        }
        assert_eq!(pool.free_blocks(), 0);

        blocks.sort();
        blocks.dedup();
        assert_eq!(blocks.len(), 4);

        // Consecutive blocks are block_size apart
        for pair in blocks.windows(2) {
            assert_eq!(pair[1] as usize - pair[0] as usize, 16);
        }

        for b in blocks {
            pool.put(b).unwrap();
        }
        assert_eq!(pool.free_blocks(), 4);
    }

    #[test]
    fn test_put_validation() {
        let pool = MemPool::new();
        let storage = leak_storage(64);
        let base = storage.as_mut_ptr();
        pool.init(storage, 4, 16).unwrap();

        let b = pool.get().unwrap();

        // Outside the pool
        assert_eq!(
            pool.put(unsafe { base.add(64) }),
            Err(OsError::InvalidAddr)
        );
        // Inside but not on a block boundary
        assert_eq!(pool.put(unsafe { base.add(3) }), Err(OsError::NotAlign));

        pool.put(b).unwrap();
    }
}

#[cfg(feature = "sem")]
mod sem_tests {
    use sandos::sync::sem::Semaphore;

    #[test]
    fn test_count_without_waiters() {
        let sem = Semaphore::new(2);
        assert_eq!(sem.count(), 2);

        // Count available: wait succeeds without the scheduler
        sem.wait().unwrap();
        sem.wait().unwrap();
        assert_eq!(sem.count(), 0);

        sem.post().unwrap();
        assert_eq!(sem.count(), 1);

        sem.init(5).unwrap();
        assert_eq!(sem.count(), 5);
    }
}

mod error_tests {
    use sandos::error::OsError;

    #[test]
    fn test_stable_discriminants() {
        assert_eq!(OsError::Param as u16, 1);
        assert_eq!(OsError::Timeout as u16, 2);
        assert_eq!(OsError::Resource as u16, 3);
        assert_eq!(OsError::NotOwner as u16, 10);
        assert_eq!(OsError::Nesting as u16, 11);
        assert_eq!(OsError::QFull as u16, 15);
        assert_eq!(OsError::InvalidAddr as u16, 18);
        assert_eq!(OsError::NotAlign as u16, 19);
        assert_eq!(OsError::Isr as u16, 20);
    }
}

mod config_tests {
    use sandos::config::*;

    #[test]
    fn test_config_values() {
        assert_eq!(CFG_PRIO_MAX, 32, "bitmap is a single 32-bit word");
        assert_eq!(CFG_PRIO_IDLE, (CFG_PRIO_MAX - 1) as u8);

        assert!(CFG_TICK_RATE_HZ >= 10, "tick rate too slow");
        assert!(CFG_TICK_RATE_HZ <= 10000, "tick rate too fast");

        assert!(CFG_IDLE_STK_SIZE >= CFG_STK_SIZE_MIN);
        assert_eq!(CFG_STACK_MAGIC, 0xDEAD_BEEF);
    }
}
