//! The gateway-call surface.
//!
//! This is the entire world as seen from the user application: a handful of
//! calls entering the secure partition through veneers. Every call
//! validates its input before touching shared or secure state; a rejected
//! call has no side effects at all.

use crate::consts::{RAM_BASE, SECURE_FLASH_SIZE, SECURE_RAM_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallError {
    TooLong,
    /// The caller handed over a pointer into the secure world.
    SecureAddress,
    BadChannel,
}

/// The address ranges the user application must never make the supervisor
/// read from. Owned by the supervisor so the simulation harness can stand
/// in its own ranges.
#[derive(Debug, Clone)]
pub struct MemoryRanges {
    pub secure_flash: core::ops::Range<usize>,
    pub secure_ram: core::ops::Range<usize>,
}

impl MemoryRanges {
    /// The device memory map.
    pub const fn device() -> Self {
        MemoryRanges {
            secure_flash: 0..SECURE_FLASH_SIZE,
            secure_ram: RAM_BASE..RAM_BASE + SECURE_RAM_SIZE,
        }
    }

    /// Whether a buffer at `addr` overlaps either secure range.
    pub fn covers(&self, addr: usize, len: usize) -> bool {
        if len == 0 {
            return false;
        }
        let end = addr.saturating_add(len);
        addr < self.secure_flash.end && end > self.secure_flash.start
            || addr < self.secure_ram.end && end > self.secure_ram.start
    }
}

/// The calls exposed to the user application.
///
/// `ipc_isr` hands the pending received packet to the caller's callback as
/// an immutable view; the callback runs in interrupt context and must not
/// outstay the acknowledgement budget of the calling ISR.
pub trait UserApi {
    /// Kick the primary watchdog.
    fn reload_wdt(&mut self);

    /// Transmit a `[type, length]`-framed user data packet.
    fn send_data_packet(&mut self, data: &[u8]) -> Result<(), CallError>;

    /// Transmit a raw radio payload.
    fn send_raw_data(&mut self, data: &[u8]) -> Result<(), CallError>;

    /// Queue a log record for the network core to ship out.
    fn log_data(&mut self, data: &[u8]) -> Result<(), CallError>;

    /// Deliver a pending received packet, if any, to `cb`.
    fn ipc_isr(&mut self, cb: &mut dyn FnMut(&[u8]));

    /// The 64-bit device identity.
    fn read_device_id(&self) -> u64;

    fn init_rng(&mut self);

    /// One random byte from the network core's hardware generator.
    fn read_rng(&mut self) -> u8;

    /// Sample an ADC channel (battery measurement lives on channel
    /// [`crate::battery::BATTERY_CHANNEL`]).
    fn saadc_read(&mut self, channel: u8) -> Result<u16, CallError>;
}
