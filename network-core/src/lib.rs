#![cfg_attr(not(test), no_std)]

//! Network-core firmware: the radio-facing half of the device.
//!
//! This core owns the transceiver. Its event loop bridges three worlds:
//! requests submitted by the application core over IPC, operator requests
//! arriving over the radio, and log records the user application wants
//! shipped out. The OTA state machine lives here too; the application core
//! only ever sees fully staged chunks.

pub mod event_loop;
pub mod ota;

pub use event_loop::NetCore;
pub use ota::{OtaTransfer, NO_CHUNK_ACKED};
pub use swarmit_ipc::RadioMode;

/// The radio transceiver, as seen from the event loop. Configuration
/// arrives as requests from the application core; reception is interrupt
/// driven, with received payloads pushed into [`NetCore::on_radio_frame`]
/// by the glue layer.
pub trait Radio {
    fn init(&mut self, mode: RadioMode);
    fn set_frequency(&mut self, frequency: u8);
    fn set_network_address(&mut self, address: u32);
    fn enable_rx(&mut self);
    fn transmit(&mut self, payload: &[u8]);
}

/// Monotonic milliseconds since boot, stamped onto log events.
pub trait Clock {
    fn now_ms(&mut self) -> u32;
}
