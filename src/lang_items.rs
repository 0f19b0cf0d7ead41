//! Language items for the embedded target
//!
//! On the host these are provided by std; on riscv32 the kernel supplies
//! a panic handler that parks the hart with interrupts off.

#[cfg(all(feature = "defmt", target_arch = "riscv32"))]
use defmt_rtt as _;

#[cfg(all(feature = "defmt", target_arch = "riscv32"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    let _ = info;
    defmt::error!("kernel panic");
    riscv::interrupt::disable();
    loop {
        riscv::asm::wfi();
    }
}

#[cfg(all(not(feature = "defmt"), target_arch = "riscv32"))]
#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    riscv::interrupt::disable();
    loop {
        riscv::asm::wfi();
    }
}

// Defmt timestamp in system ticks
#[cfg(all(feature = "defmt", target_arch = "riscv32"))]
defmt::timestamp!("{=u32}", crate::core::kernel::KERNEL.tick_get());
