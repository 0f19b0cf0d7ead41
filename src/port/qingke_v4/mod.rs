//! QingkeV4 (CH32V2xx) port implementation
//!
//! Context switching runs through the core's software interrupt: wake
//! and block paths pend it, and the handler performs the register swap
//! once interrupts are enabled again. The vendor SysTick provides the
//! 1 kHz timebase and also carries the software-interrupt request bit.

use core::arch::{asm, naked_asm};

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::ReadWrite;

use crate::kernel::CPU_STATE;
use crate::task::{OsTaskFn, OsTcb};
use crate::types::OsStkElement;

// ============ Vendor peripheral access ============

/// SysTick register block (vendor core peripheral, not the mtime CLINT)
#[repr(C)]
struct SysTickRegisters {
    ctlr: ReadWrite<u32>,
    sr: ReadWrite<u32>,
    cnt: ReadWrite<u64>,
    cmp: ReadWrite<u64>,
}

const SYSTICK_BASE: usize = 0xE000_F000;
/// PFIC interrupt enable registers (one bit per interrupt)
const PFIC_IENR_BASE: usize = 0xE000_E100;
/// PFIC priority registers (one byte per interrupt)
const PFIC_IPRIOR_BASE: usize = 0xE000_E400;

const CTLR_STE: u32 = 1 << 0;
const CTLR_STIE: u32 = 1 << 1;
const CTLR_STCLK: u32 = 1 << 2;
const CTLR_STRE: u32 = 1 << 3;
const CTLR_MODE: u32 = 1 << 4;
const CTLR_INIT: u32 = 1 << 5;
/// Software-interrupt request bit
const CTLR_SWIE: u32 = 1 << 31;

const SYSTICK_IRQN: u32 = 12;
const SWI_IRQN: u32 = 14;

/// Initial mstatus: machine mode, MPIE set so mret enters the task with
/// interrupts enabled
const MSTATUS_INIT: u32 = 0x0000_1880;

#[inline(always)]
fn systick() -> &'static SysTickRegisters {
    // Safety: fixed core-peripheral address, always mapped
    unsafe { &*(SYSTICK_BASE as *const SysTickRegisters) }
}

#[inline(always)]
fn pfic_ienr() -> &'static [ReadWrite<u32>; 4] {
    // Safety: fixed core-peripheral address, always mapped
    unsafe { &*(PFIC_IENR_BASE as *const _) }
}

#[inline(always)]
fn pfic_iprior() -> &'static [ReadWrite<u8>; 256] {
    // Safety: fixed core-peripheral address, always mapped
    unsafe { &*(PFIC_IPRIOR_BASE as *const _) }
}

fn pfic_enable_irq(irqn: u32) {
    // Write-one-to-enable, so no read-modify-write
    pfic_ienr()[(irqn / 32) as usize].set(1 << (irqn % 32));
}

fn pfic_set_priority(irqn: u32, prio: u8) {
    pfic_iprior()[irqn as usize].set(prio);
}

// ============ Port contract ============

/// Initialize SysTick for periodic tick generation
///
/// `reload` is the compare value in core clock cycles per tick. The tick
/// interrupt is given a higher urgency than the software interrupt so a
/// context switch pended during tick processing runs after the tick
/// handler returns.
pub fn os_init_timer(reload: u32) {
    let st = systick();
    st.sr.set(0);
    st.cnt.set(0);
    st.cmp.set(reload as u64);
    st.ctlr.set(CTLR_MODE | CTLR_STRE | CTLR_STCLK);
    st.ctlr.set(st.ctlr.get() | CTLR_INIT | CTLR_STIE | CTLR_STE);

    pfic_set_priority(SYSTICK_IRQN, 0b110 << 5);
    pfic_set_priority(SWI_IRQN, 0b111 << 5);
    pfic_enable_irq(SYSTICK_IRQN);
    pfic_enable_irq(SWI_IRQN);
}

/// Request a context switch
///
/// Pends the software interrupt; the switch happens at the next moment
/// global interrupts are enabled. The request is edge-pending: raising
/// it again before the handler runs coalesces into one switch.
#[inline(always)]
pub fn os_trigger_swi() {
    let st = systick();
    st.ctlr.set(st.ctlr.get() | CTLR_SWIE);
}

/// Idle task body
#[inline(always)]
pub fn os_cpu_idle() {
    riscv::asm::wfi();
}

/// Trap for tasks that return
///
/// Task functions never return; the initial frame aims `ra` here so a
/// miscompiled or corrupted task parks instead of running off into
/// arbitrary memory.
fn os_task_return() -> ! {
    loop {
        riscv::asm::wfi();
    }
}

/// Context saved on a task's stack across a switch
///
/// Matches the store/load offsets in the software-interrupt handler:
/// every integer register except `sp` and `zero`, plus `mepc` and
/// `mstatus`. 32 words keeps the frame 16-byte aligned.
#[repr(C, align(4))]
struct TrapFrame {
    tp: u32,
    t0: u32,
    t1: u32,
    t2: u32,
    t3: u32,
    t4: u32,
    t5: u32,
    t6: u32,
    s0: u32,
    s1: u32,
    s2: u32,
    s3: u32,
    s4: u32,
    s5: u32,
    s6: u32,
    s7: u32,
    s8: u32,
    s9: u32,
    s10: u32,
    s11: u32,
    a1: u32,
    a2: u32,
    a3: u32,
    a4: u32,
    a5: u32,
    a6: u32,
    a7: u32,
    a0: u32,
    gp: u32,
    ra: u32,
    mepc: u32,
    mstatus: u32,
}

const FRAME_WORDS: usize = core::mem::size_of::<TrapFrame>() / 4;

/// Build the initial stack frame for a new task
///
/// The frame is laid out so the restore sequence enters `task_fn` via
/// `mret` with `arg` in `a0`, the shared global pointer in `gp`, and
/// interrupts enabled.
pub unsafe fn os_task_stk_init(
    task_fn: OsTaskFn,
    arg: *mut (),
    stk_base: *mut OsStkElement,
    stk_size: usize,
) -> *mut OsStkElement {
    unsafe {
        let stk_top = stk_base.add(stk_size);
        let stk_aligned = ((stk_top as usize) & !0xF) as *mut OsStkElement;

        // Tasks share the kernel's global pointer
        let gp: u32;
        asm!("mv {}, gp", out(reg) gp, options(nomem, nostack, preserves_flags));

        let frame_ptr = stk_aligned.sub(FRAME_WORDS) as *mut TrapFrame;
        frame_ptr.write(TrapFrame {
            tp: 0,
            t0: 0,
            t1: 0,
            t2: 0,
            t3: 0,
            t4: 0,
            t5: 0,
            t6: 0,
            s0: 0,
            s1: 0,
            s2: 0,
            s3: 0,
            s4: 0,
            s5: 0,
            s6: 0,
            s7: 0,
            s8: 0,
            s9: 0,
            s10: 0,
            s11: 0,
            a1: 0,
            a2: 0,
            a3: 0,
            a4: 0,
            a5: 0,
            a6: 0,
            a7: 0,
            a0: arg as u32,
            gp,
            ra: os_task_return as usize as u32,
            mepc: task_fn as usize as u32,
            mstatus: MSTATUS_INIT,
        });

        frame_ptr as *mut OsStkElement
    }
}

/// Swap the TCB pointers under the software-interrupt handler
///
/// Stores the suspended task's stack pointer, promotes the scheduler's
/// next-task decision to current, clears the pended request, and hands
/// back the stack pointer to resume from.
#[no_mangle]
unsafe extern "C" fn os_swi_switch_context(cur_sp: *mut u32) -> *mut u32 {
    let st = systick();
    st.ctlr.set(st.ctlr.get() & !CTLR_SWIE);

    unsafe {
        let cur: *mut OsTcb = CPU_STATE.tcb_cur;
        if !cur.is_null() {
            (*cur).stk_ptr = cur_sp;
        }

        CPU_STATE.tcb_cur = CPU_STATE.tcb_next;
        (*CPU_STATE.tcb_cur).stk_ptr
    }
}

/// Software-interrupt handler - performs the full context switch
///
/// 1. Save every integer register plus mepc/mstatus onto the current
///    task's stack
/// 2. Swap TCB pointers and store/load the stack pointers
/// 3. Restore the new task's registers
/// 4. `mret` into the new task
#[no_mangle]
#[unsafe(naked)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn SW_Handler() {
    naked_asm!(
        "addi sp, sp, -128",
        "sw tp,   0(sp)",
        "sw t0,   4(sp)",
        "sw t1,   8(sp)",
        "sw t2,  12(sp)",
        "sw t3,  16(sp)",
        "sw t4,  20(sp)",
        "sw t5,  24(sp)",
        "sw t6,  28(sp)",
        "sw s0,  32(sp)",
        "sw s1,  36(sp)",
        "sw s2,  40(sp)",
        "sw s3,  44(sp)",
        "sw s4,  48(sp)",
        "sw s5,  52(sp)",
        "sw s6,  56(sp)",
        "sw s7,  60(sp)",
        "sw s8,  64(sp)",
        "sw s9,  68(sp)",
        "sw s10, 72(sp)",
        "sw s11, 76(sp)",
        "sw a1,  80(sp)",
        "sw a2,  84(sp)",
        "sw a3,  88(sp)",
        "sw a4,  92(sp)",
        "sw a5,  96(sp)",
        "sw a6, 100(sp)",
        "sw a7, 104(sp)",
        "sw a0, 108(sp)",
        "sw gp, 112(sp)",
        "sw ra, 116(sp)",
        "csrr t0, mepc",
        "sw t0, 120(sp)",
        "csrr t0, mstatus",
        "sw t0, 124(sp)",
        "mv a0, sp",
        "call os_swi_switch_context",
        "mv sp, a0",
        "lw t0, 124(sp)",
        "csrw mstatus, t0",
        "lw t0, 120(sp)",
        "csrw mepc, t0",
        "lw ra, 116(sp)",
        "lw gp, 112(sp)",
        "lw a0, 108(sp)",
        "lw a7, 104(sp)",
        "lw a6, 100(sp)",
        "lw a5,  96(sp)",
        "lw a4,  92(sp)",
        "lw a3,  88(sp)",
        "lw a2,  84(sp)",
        "lw a1,  80(sp)",
        "lw s11, 76(sp)",
        "lw s10, 72(sp)",
        "lw s9,  68(sp)",
        "lw s8,  64(sp)",
        "lw s7,  60(sp)",
        "lw s6,  56(sp)",
        "lw s5,  52(sp)",
        "lw s4,  48(sp)",
        "lw s3,  44(sp)",
        "lw s2,  40(sp)",
        "lw s1,  36(sp)",
        "lw s0,  32(sp)",
        "lw t6,  28(sp)",
        "lw t5,  24(sp)",
        "lw t4,  20(sp)",
        "lw t3,  16(sp)",
        "lw t2,  12(sp)",
        "lw t1,   8(sp)",
        "lw t0,   4(sp)",
        "lw tp,   0(sp)",
        "addi sp, sp, 128",
        "mret",
    );
}

/// Dispatch the first task
///
/// Loads the stack pointer from the current TCB and runs the restore
/// half of the context switch. Called once from `os_start`; does not
/// return in practice.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn os_start_first_task() {
    naked_asm!(
        "la a0, {cpu_state}",
        "lw a1, 0(a0)",
        "lw sp, 0(a1)",
        "lw t0, 124(sp)",
        "csrw mstatus, t0",
        "lw t0, 120(sp)",
        "csrw mepc, t0",
        "lw ra, 116(sp)",
        "lw gp, 112(sp)",
        "lw a0, 108(sp)",
        "lw a7, 104(sp)",
        "lw a6, 100(sp)",
        "lw a5,  96(sp)",
        "lw a4,  92(sp)",
        "lw a3,  88(sp)",
        "lw a2,  84(sp)",
        "lw a1,  80(sp)",
        "lw s11, 76(sp)",
        "lw s10, 72(sp)",
        "lw s9,  68(sp)",
        "lw s8,  64(sp)",
        "lw s7,  60(sp)",
        "lw s6,  56(sp)",
        "lw s5,  52(sp)",
        "lw s4,  48(sp)",
        "lw s3,  44(sp)",
        "lw s2,  40(sp)",
        "lw s1,  36(sp)",
        "lw s0,  32(sp)",
        "lw t6,  28(sp)",
        "lw t5,  24(sp)",
        "lw t4,  20(sp)",
        "lw t3,  16(sp)",
        "lw t2,  12(sp)",
        "lw t1,   8(sp)",
        "lw t0,   4(sp)",
        "lw tp,   0(sp)",
        "addi sp, sp, 128",
        "mret",
        cpu_state = sym CPU_STATE,
    );
}

/// SysTick interrupt entry
///
/// Acknowledges the timer, brackets the tick handler with the interrupt
/// nesting counter, and lets `os_int_exit` pend the switch when tick
/// processing changed the scheduling decision.
#[no_mangle]
extern "C" fn os_systick_entry() {
    let st = systick();
    st.ctlr.set(st.ctlr.get() | CTLR_INIT);
    st.sr.set(0);

    crate::kernel::os_int_enter();
    crate::time::os_tick_handler();
    crate::kernel::os_int_exit();
}

/// SysTick interrupt handler
///
/// Saves the caller-saved registers, runs the tick entry, and returns
/// with `mret`. A switch pended during the tick is taken right after.
#[no_mangle]
#[unsafe(naked)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn SysTick_Handler() {
    naked_asm!(
        "addi sp, sp, -64",
        "sw ra,  0(sp)",
        "sw t0,  4(sp)",
        "sw t1,  8(sp)",
        "sw t2, 12(sp)",
        "sw t3, 16(sp)",
        "sw t4, 20(sp)",
        "sw t5, 24(sp)",
        "sw t6, 28(sp)",
        "sw a0, 32(sp)",
        "sw a1, 36(sp)",
        "sw a2, 40(sp)",
        "sw a3, 44(sp)",
        "sw a4, 48(sp)",
        "sw a5, 52(sp)",
        "sw a6, 56(sp)",
        "sw a7, 60(sp)",
        "call os_systick_entry",
        "lw ra,  0(sp)",
        "lw t0,  4(sp)",
        "lw t1,  8(sp)",
        "lw t2, 12(sp)",
        "lw t3, 16(sp)",
        "lw t4, 20(sp)",
        "lw t5, 24(sp)",
        "lw t6, 28(sp)",
        "lw a0, 32(sp)",
        "lw a1, 36(sp)",
        "lw a2, 40(sp)",
        "lw a3, 44(sp)",
        "lw a4, 48(sp)",
        "lw a5, 52(sp)",
        "lw a6, 56(sp)",
        "lw a7, 60(sp)",
        "addi sp, sp, 64",
        "mret",
    );
}
