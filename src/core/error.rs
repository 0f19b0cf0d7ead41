//! Error types
//!
//! Uses Rust's Result pattern instead of C-style status returns. The
//! discriminants are part of the API and stay stable across releases.

/// RTOS error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OsError {
    /// Null pointer, out-of-range priority, or zero size
    Param = 1,
    /// Wait timed out (reserved; no timed waits today)
    Timeout = 2,
    /// Non-blocking variant found no data / no free block
    Resource = 3,

    // ============ Mutex errors ============
    /// Mutex released by a task that does not own it
    NotOwner = 10,
    /// Mutex recursion depth exceeded
    Nesting = 11,

    // ============ Queue errors ============
    /// Queue send on a full queue
    QFull = 15,

    // ============ Memory pool errors ============
    /// Block address outside the pool
    InvalidAddr = 18,
    /// Block address not aligned to the block size
    NotAlign = 19,

    // ============ System errors ============
    /// Task-level API called from an ISR
    Isr = 20,
    /// Kernel has not been initialized
    NotInit = 30,
    /// Kernel is already running
    Running = 31,
    /// Kernel is not running yet
    NotRunning = 32,
}

/// Result type alias for RTOS operations
pub type OsResult<T> = Result<T, OsError>;
