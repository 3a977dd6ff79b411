#![cfg_attr(not(test), no_std)]

//! Application-core supervisor.
//!
//! The supervisor is the privileged firmware on the application core. At
//! boot it carves the device into a secure and a non-secure world
//! ([`partition`]), arms the watchdogs ([`watchdog`]), releases the network
//! core, and then either launches the user application in the non-secure
//! partition or stays resident to serve over-the-air reprogramming
//! ([`ota`]). While the user application runs, the only way back into the
//! supervisor is a gateway call ([`api`]), an interrupt, or a watchdog
//! reset.

pub mod api;
pub mod battery;
pub mod consts;
pub mod ota;
pub mod partition;
pub mod supervisor;
pub mod watchdog;

pub use api::{CallError, MemoryRanges, UserApi};
pub use supervisor::{Event, Supervisor};
