//! Global kernel state and initialization
//!
//! This module owns the kernel singletons: run-state flags, the scheduler
//! state (priority bitmap, ready queues, delay list), and the pair of TCB
//! pointers the context-switch handler swaps.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use crate::config::{CFG_IDLE_STK_SIZE, CFG_PRIO_IDLE, CFG_PRIO_MAX, CFG_SYSCLK_HZ, CFG_TICK_RATE_HZ};
use crate::critical::{critical_section, CriticalSection};
use crate::core::cs_cell::CsCell;
use crate::error::{OsError, OsResult};
use crate::list::TcbList;
use crate::prio::PrioMap;
use crate::task::OsTcb;
use crate::types::{OsPrio, OsTick};

// ============ Kernel State Structures ============

/// Atomic kernel flags
pub struct KernelFlags {
    initialized: AtomicBool,
    running: AtomicBool,
    int_nesting: AtomicU8,
    tick_counter: AtomicU32,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            int_nesting: AtomicU8::new(0),
            tick_counter: AtomicU32::new(0),
        }
    }

    pub(crate) fn reset(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.int_nesting.store(0, Ordering::SeqCst);
        self.tick_counter.store(0, Ordering::SeqCst);
    }

    /// Check if the OS is running
    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Check if the OS is initialized
    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Get current tick count
    #[inline(always)]
    pub fn tick_get(&self) -> OsTick {
        self.tick_counter.load(Ordering::Relaxed)
    }

    /// Get interrupt nesting level
    #[inline(always)]
    pub fn int_nesting(&self) -> u8 {
        self.int_nesting.load(Ordering::Relaxed)
    }

    /// Increment and return tick count
    #[inline(always)]
    pub(crate) fn tick_increment(&self) -> OsTick {
        self.tick_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    #[inline(always)]
    pub(crate) fn set_initialized(&self, val: bool) {
        self.initialized.store(val, Ordering::SeqCst);
    }

    #[inline(always)]
    pub(crate) fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }

    #[inline(always)]
    fn int_nesting_inc(&self) {
        let nesting = self.int_nesting.load(Ordering::Relaxed);
        self.int_nesting.store(nesting.saturating_add(1), Ordering::Relaxed);
    }

    #[inline(always)]
    fn int_nesting_dec(&self) -> u8 {
        let nesting = self.int_nesting.load(Ordering::Relaxed);
        let new = nesting.saturating_sub(1);
        self.int_nesting.store(new, Ordering::Relaxed);
        new
    }
}

/// Global kernel state instance
pub(crate) static KERNEL: KernelFlags = KernelFlags::new();

/// Scheduler state
pub struct SchedState {
    pub(crate) prio_map: PrioMap,
    pub(crate) rdy_list: [TcbList; CFG_PRIO_MAX],
    pub(crate) delay_list: TcbList,
}

impl SchedState {
    const fn new() -> Self {
        Self {
            prio_map: PrioMap::new(),
            rdy_list: [const { TcbList::new() }; CFG_PRIO_MAX],
            delay_list: TcbList::new(),
        }
    }

    fn reset(&mut self) {
        self.prio_map.init();
        for list in self.rdy_list.iter_mut() {
            list.init();
        }
        self.delay_list.init();
    }
}

/// Global scheduler state instance
pub(crate) static SCHED: CsCell<SchedState> = CsCell::new(SchedState::new());

/// IDLE task TCB
static mut IDLE_TCB: OsTcb = OsTcb::new();

/// IDLE task stack
static mut IDLE_STK: [crate::types::OsStkElement; CFG_IDLE_STK_SIZE] = [0; CFG_IDLE_STK_SIZE];

// ============ CPU/Context Switch State ============

/// CPU context switch state
///
/// The software-interrupt handler reads both pointers; keep the layout
/// fixed (`tcb_cur` at offset 0, `tcb_next` one word after).
#[repr(C)]
pub struct CpuState {
    /// Current running task's TCB pointer
    pub tcb_cur: *mut OsTcb,
    /// TCB pointer of the task chosen to run next
    pub tcb_next: *mut OsTcb,
}

impl CpuState {
    pub const fn new() -> Self {
        Self {
            tcb_cur: core::ptr::null_mut(),
            tcb_next: core::ptr::null_mut(),
        }
    }
}

/// Global CPU state instance
#[no_mangle]
#[used]
pub static mut CPU_STATE: CpuState = CpuState::new();

// ============ Initialization ============

/// Internal IDLE task function
fn os_idle_task(_: *mut ()) -> ! {
    loop {
        crate::port::os_cpu_idle();
    }
}

/// Reset global kernel state
fn os_reset_globals() {
    KERNEL.reset();

    unsafe {
        CPU_STATE.tcb_cur = core::ptr::null_mut();
        CPU_STATE.tcb_next = core::ptr::null_mut();
    }

    critical_section(|cs| {
        SCHED.get(cs).reset();
    });
}

// ============ Public API ============

/// Initialize the RTOS kernel
///
/// Must be called before any other OS function. Resets the priority
/// bitmap, ready queues, and delay list, discarding any previous kernel
/// state, and creates the idle task so the scheduler always finds a
/// ready task.
pub fn os_init() -> OsResult<()> {
    os_reset_globals();

    unsafe {
        crate::task::os_task_create_raw(
            &raw mut IDLE_TCB,
            "Idle",
            os_idle_task,
            core::ptr::null_mut(),
            CFG_PRIO_IDLE,
            &raw mut IDLE_STK as *mut crate::types::OsStkElement,
            CFG_IDLE_STK_SIZE,
        )?;
    }

    KERNEL.set_initialized(true);

    Ok(())
}

/// Start multitasking
///
/// Dispatches the highest priority ready task; on hardware this call
/// never returns. At least one application task should exist, otherwise
/// only the idle task runs.
///
/// # Returns
/// * `Err(OsError::NotInit)` - OS not initialized
/// * `Err(OsError::Running)` - OS is already running
pub fn os_start() -> OsResult<()> {
    if !KERNEL.is_initialized() {
        return Err(OsError::NotInit);
    }

    if KERNEL.is_running() {
        return Err(OsError::Running);
    }

    critical_section(|_cs| {
        let first = unsafe { crate::sched::find_next_task() };
        unsafe {
            CPU_STATE.tcb_cur = first.as_ptr();
            CPU_STATE.tcb_next = first.as_ptr();
        }
        KERNEL.set_running(true);
    });

    crate::port::os_init_timer(CFG_SYSCLK_HZ / CFG_TICK_RATE_HZ);

    unsafe { crate::port::os_start_first_task() };

    Ok(())
}

/// Enter ISR
///
/// Interrupt entry stubs call this before any kernel work so ISR context
/// is observable and the deferred switch in [`os_int_exit`] fires.
pub fn os_int_enter() {
    if KERNEL.is_running() {
        KERNEL.int_nesting_inc();
    }
}

/// Exit ISR
///
/// At the outermost interrupt exit, request a context switch if an ISR
/// made a higher-priority task ready (the `*_from_isr` wake primitives
/// defer their switch to this point).
pub fn os_int_exit() {
    if !KERNEL.is_running() {
        return;
    }

    let _cs = CriticalSection::enter();

    if KERNEL.int_nesting() == 0 {
        return;
    }

    if KERNEL.int_nesting_dec() == 0 {
        let next = unsafe { crate::sched::find_next_task() };
        unsafe {
            if next.as_ptr() != CPU_STATE.tcb_cur {
                CPU_STATE.tcb_next = next.as_ptr();
                crate::port::os_trigger_swi();
            }
        }
    }
}

/// Fatal kernel error: disable interrupts and halt
///
/// Reached on assertion failures and stack sentinel violations.
pub fn os_fatal() -> ! {
    crate::error!("fatal kernel error");

    #[cfg(target_arch = "riscv32")]
    {
        riscv::interrupt::disable();
        loop {
            riscv::asm::wfi();
        }
    }

    #[cfg(not(target_arch = "riscv32"))]
    panic!("fatal kernel error");
}

// ============ Internal accessors for other modules ============

/// Get mutable reference to the priority bitmap
#[inline(always)]
pub(crate) unsafe fn prio_map() -> &'static mut PrioMap {
    unsafe { &mut SCHED.get_unchecked().prio_map }
}

/// Get mutable reference to the ready queue for a priority
#[inline(always)]
pub(crate) unsafe fn rdy_list(prio: OsPrio) -> &'static mut TcbList {
    unsafe { &mut SCHED.get_unchecked().rdy_list[prio as usize] }
}

/// Get mutable reference to the delay list
#[inline(always)]
pub(crate) unsafe fn delay_list() -> &'static mut TcbList {
    unsafe { &mut SCHED.get_unchecked().delay_list }
}

/// Get current TCB pointer
#[inline]
pub fn tcb_cur_ptr() -> Option<NonNull<OsTcb>> {
    NonNull::new(unsafe { CPU_STATE.tcb_cur })
}

/// Get next TCB pointer (latest scheduler decision)
#[inline]
pub fn tcb_next_ptr() -> Option<NonNull<OsTcb>> {
    NonNull::new(unsafe { CPU_STATE.tcb_next })
}

/// Set next TCB pointer
#[inline]
pub(crate) unsafe fn set_tcb_next(tcb: NonNull<OsTcb>) {
    unsafe { CPU_STATE.tcb_next = tcb.as_ptr() };
}

// ============ Test support ============

/// Helpers for in-crate scenario tests
///
/// Kernel state is a process-wide singleton, so tests serialize on one
/// lock. The stub port's switch trigger is a no-op; tests emulate the
/// architectural switch by promoting the next-TCB pointer.
#[cfg(test)]
pub(crate) mod test_util {
    use core::ptr::NonNull;
    use std::sync::{Mutex, MutexGuard};

    use super::CPU_STATE;
    use crate::task::OsTcb;
    use crate::types::{OsPrio, OsStkElement};

    static SERIAL: Mutex<()> = Mutex::new(());

    /// Serialize kernel-global tests; survives lock poisoning.
    pub(crate) fn lock() -> MutexGuard<'static, ()> {
        SERIAL.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn test_task(_: *mut ()) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    /// Create a task over leaked static storage and return its TCB.
    pub(crate) fn spawn(name: &'static str, prio: OsPrio) -> NonNull<OsTcb> {
        use std::boxed::Box;

        let tcb = Box::leak(Box::new(OsTcb::new()));
        let stack = Box::leak(Box::new([0 as OsStkElement; 128]));
        let ptr = NonNull::new(tcb as *mut OsTcb).unwrap();
        crate::task::os_task_create(tcb, stack, name, test_task, core::ptr::null_mut(), prio)
            .unwrap();
        ptr
    }

    /// Pretend the given task was dispatched.
    pub(crate) fn set_current(tcb: NonNull<OsTcb>) {
        unsafe { CPU_STATE.tcb_cur = tcb.as_ptr() };
    }

    /// Emulate the software-interrupt handler: promote the scheduler
    /// decision to the running task.
    pub(crate) fn switch_to_next() {
        unsafe { CPU_STATE.tcb_cur = CPU_STATE.tcb_next };
    }
}
