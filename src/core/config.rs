//! Compile-time kernel configuration
//!
//! These constants control the behavior and resource limits of the RTOS.

/// Maximum number of priority levels (0 = highest)
pub const CFG_PRIO_MAX: usize = 32;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// System core clock in Hz, used to program the tick timer
pub const CFG_SYSCLK_HZ: u32 = 96_000_000;

/// Idle task stack size in words
pub const CFG_IDLE_STK_SIZE: usize = 128;

/// Minimum task stack size in words
pub const CFG_STK_SIZE_MIN: usize = 64;

/// Sentinel value painted at the low end of every task stack
pub const CFG_STACK_MAGIC: u32 = 0xDEAD_BEEF;

/// Idle task priority (always the lowest)
pub const CFG_PRIO_IDLE: u8 = (CFG_PRIO_MAX - 1) as u8;
