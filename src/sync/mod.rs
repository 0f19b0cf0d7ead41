//! Inter-task synchronization and communication primitives
//!
//! Semaphores, mutexes, message queues, and fixed-block memory pools.

#[cfg(feature = "sem")]
pub mod sem;

#[cfg(feature = "mutex")]
pub mod mutex;

#[cfg(feature = "queue")]
pub mod queue;

#[cfg(feature = "mem")]
pub mod mem;
