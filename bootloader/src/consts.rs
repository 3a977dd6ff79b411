//! Memory map and supervision constants.

use swarmit_ipc::RadioMode;

/// Granularity of flash security attribution.
pub const FLASH_REGION_SIZE: usize = 16 * 1024;

/// Number of flash regions covered by the security controller.
pub const FLASH_REGION_COUNT: usize = 64;

/// The secure flash partition holds the supervisor and the gateway-call
/// veneers: the first eight regions.
pub const SECURE_FLASH_SIZE: usize = 128 * 1024;

pub const SECURE_FLASH_REGIONS: usize = SECURE_FLASH_SIZE / FLASH_REGION_SIZE;

/// Base address of the non-secure user application image.
pub const USER_FLASH_BASE: u32 = SECURE_FLASH_SIZE as u32;

/// Granularity of RAM security attribution.
pub const RAM_REGION_SIZE: usize = 8 * 1024;

pub const RAM_REGION_COUNT: usize = 64;

/// Low RAM is secure: supervisor stack and shared-block header.
pub const SECURE_RAM_SIZE: usize = 32 * 1024;

pub const SECURE_RAM_REGIONS: usize = SECURE_RAM_SIZE / RAM_REGION_SIZE;

/// Where RAM appears in the address space.
pub const RAM_BASE: usize = 0x2000_0000;

/// The gateway-call veneers live in a callable subregion of the last secure
/// flash region.
pub const VENEER_FLASH_REGION: usize = SECURE_FLASH_REGIONS - 1;

/// Size of the callable veneer subregion in bytes.
pub const VENEER_SIZE: usize = 4096;

/// Both watchdogs run on a one second leash.
pub const WATCHDOG_TIMEOUT_MS: u32 = 1_000;

/// Transceiver configuration the supervisor requests from the network core
/// at boot.
pub const DEFAULT_RADIO_MODE: RadioMode = RadioMode::Ble1Mbit;

/// 2400 MHz + frequency in MHz.
pub const DEFAULT_RADIO_FREQUENCY: u8 = 8;

/// Logical address shared by the whole swarm.
pub const DEFAULT_NETWORK_ADDRESS: u32 = 0x12345678;

/// Channels exposed by the analog-to-digital converter.
pub const SAADC_CHANNEL_COUNT: u8 = 8;
