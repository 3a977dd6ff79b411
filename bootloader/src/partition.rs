//! Trust-partition configuration.
//!
//! Run once at boot, before any non-secure instruction executes. The
//! [`TrustZone`] trait abstracts the security attribution unit; the
//! supervisor drives it through [`configure`] in a fixed order ending with
//! memory and pipeline barriers.

use crate::consts::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    Secure,
    NonSecure,
}

/// Peripherals subject to individual security attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peripheral {
    Clock,
    Power,
    Timer0,
    Timer1,
    Timer2,
    Rtc0,
    Rtc1,
    Gpio0,
    Gpio1,
    Gpiote,
    Saadc,
    Pwm0,
    Pwm1,
    Pwm2,
    Pwm3,
    Pdm,
    Qdec,
    Serial0,
    Serial1,
    Serial2,
    Serial3,
    Usbd,
    UsbRegulator,
    Egu0,
    Comp,
    Nfct,
    I2s,
    /// Flash write controller. Never leaves the secure world.
    Nvmc,
    /// Inter-processor signal peripheral.
    Ipc,
    /// Hardware mutex backing the shared-block lock.
    Mutex,
    /// Primary watchdog. Never leaves the secure world.
    Wdt0,
    /// Auxiliary watchdog, started by the hardware stop route.
    Wdt1,
}

/// Peripherals (with their DMA and interrupts) handed to the user
/// application. The flash controller, the watchdogs and the inter-processor
/// plumbing are deliberately absent.
pub const NONSECURE_PERIPHERALS: &[Peripheral] = &[
    Peripheral::Clock,
    Peripheral::Timer0,
    Peripheral::Timer1,
    Peripheral::Timer2,
    Peripheral::Rtc0,
    Peripheral::Rtc1,
    Peripheral::Gpio0,
    Peripheral::Gpio1,
    Peripheral::Gpiote,
    Peripheral::Saadc,
    Peripheral::Pwm0,
    Peripheral::Pwm1,
    Peripheral::Pwm2,
    Peripheral::Pwm3,
    Peripheral::Pdm,
    Peripheral::Qdec,
    Peripheral::Serial0,
    Peripheral::Serial1,
    Peripheral::Serial2,
    Peripheral::Serial3,
    Peripheral::Usbd,
    Peripheral::UsbRegulator,
    Peripheral::Egu0,
    Peripheral::Comp,
    Peripheral::Nfct,
    Peripheral::I2s,
];

/// The hardware security attribution interface.
pub trait TrustZone {
    fn set_flash_region(&mut self, region: usize, security: Security);
    fn set_ram_region(&mut self, region: usize, security: Security);
    /// Declare the non-secure-callable veneer window inside a secure flash
    /// region.
    fn set_veneer_region(&mut self, flash_region: usize, size: usize);
    /// Attribute a peripheral and its DMA to one world.
    fn set_peripheral(&mut self, peripheral: Peripheral, security: Security);
    /// Route the peripheral's interrupt to the non-secure vector table.
    fn retarget_interrupt(&mut self, peripheral: Peripheral);
    /// Enable secure-fault handling plus alignment and divide-by-zero traps.
    fn enable_fault_traps(&mut self);
    /// Memory and pipeline barriers making the new attribution visible.
    fn barrier(&mut self);
}

/// Apply the whole partition. Ordering matters: memory first, then the
/// veneer window, then peripherals and their interrupts, faults, and
/// finally the barriers.
pub fn configure(tz: &mut impl TrustZone) {
    for region in 0..SECURE_FLASH_REGIONS {
        tz.set_flash_region(region, Security::Secure);
    }
    for region in SECURE_FLASH_REGIONS..FLASH_REGION_COUNT {
        tz.set_flash_region(region, Security::NonSecure);
    }

    for region in 0..SECURE_RAM_REGIONS {
        tz.set_ram_region(region, Security::Secure);
    }
    for region in SECURE_RAM_REGIONS..RAM_REGION_COUNT {
        tz.set_ram_region(region, Security::NonSecure);
    }

    tz.set_veneer_region(VENEER_FLASH_REGION, VENEER_SIZE);

    for &peripheral in NONSECURE_PERIPHERALS {
        tz.set_peripheral(peripheral, Security::NonSecure);
        tz.retarget_interrupt(peripheral);
    }

    tz.enable_fault_traps();
    tz.barrier();

    log::info!("trust partition configured");
}
