#![cfg_attr(not(test), no_std)]

//! Inter-processor communication between the application core and the
//! network core.
//!
//! The two cores cooperate through three mechanisms:
//!
//! * the [`SharedData`] block, a fixed-layout record in shared RAM accessed
//!   through volatile typed accessors,
//! * numbered edge-triggered signal [`Channel`]s, one per logical event,
//! * a hardware mutex serializing multi-field updates to the block.
//!
//! On top of those sits a single-outstanding-request RPC: the application
//! core publishes a [`Req`], raises the REQUEST channel and busy-waits for
//! the acknowledgement flag. The network core services one request at a time
//! and acknowledges exactly once. There are no timeouts; a hung peer is the
//! watchdog's problem.

use core::sync::atomic::{fence, Ordering};

pub mod shared;

pub use shared::{SharedBlock, SharedData};

/// Inter-processor signal channels. Edge triggered; the payload, if any,
/// lives in the shared block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Application core published a request (A to N).
    Request = 0,
    /// A packet addressed to the user application arrived (N to A).
    RadioRx = 1,
    /// Operator requested a user application start (N to A).
    AppStart = 2,
    /// Operator requested a user application stop (N to A).
    AppStop = 3,
    /// User application logged a record (A to N).
    Log = 4,
    /// Operator initiated an OTA transfer (N to A).
    OtaStart = 5,
    /// An OTA chunk is staged for flashing (N to A).
    OtaChunk = 6,
}

pub const CHANNEL_COUNT: usize = 7;

impl Channel {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Requests the application core may submit to the network core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Req {
    /// Pure acknowledgement barrier, nothing is dispatched.
    None = 0,
    RadioInit = 1,
    RadioSetFrequency = 2,
    RadioSetNetworkAddress = 3,
    RadioRx = 4,
    RadioTx = 5,
    RngInit = 6,
    RngRead = 7,
}

impl Req {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Req::None),
            1 => Some(Req::RadioInit),
            2 => Some(Req::RadioSetFrequency),
            3 => Some(Req::RadioSetNetworkAddress),
            4 => Some(Req::RadioRx),
            5 => Some(Req::RadioTx),
            6 => Some(Req::RngInit),
            7 => Some(Req::RngRead),
            _ => None,
        }
    }
}

/// Transceiver modulation modes, carried in the shared radio configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RadioMode {
    Ble1Mbit = 0,
    Ble2Mbit = 1,
    BleLongRange125Kbit = 2,
    BleLongRange500Kbit = 3,
}

impl RadioMode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => RadioMode::Ble2Mbit,
            2 => RadioMode::BleLongRange125Kbit,
            3 => RadioMode::BleLongRange500Kbit,
            _ => RadioMode::Ble1Mbit,
        }
    }
}

/// The per-core view of the signal channel hardware.
///
/// Interrupt handlers only latch the event; the main loop consumes latched
/// events through [`Channels::take`].
pub trait Channels {
    /// Trigger the event on the peer core.
    fn raise(&mut self, channel: Channel);

    /// Consume a latched event. Returns whether it was pending.
    fn take(&mut self, channel: Channel) -> bool;

    /// Hint that the core has nothing to do until the next event.
    fn wait(&mut self) {
        core::hint::spin_loop();
    }
}

/// The shared hardware mutex cell. Locking spins until the cell is granted;
/// unlocking a free mutex is a no-op.
pub trait HwMutex {
    fn lock(&mut self);
    fn unlock(&mut self);
}

/// Control over the network core's force-off reset line.
pub trait NetworkReset {
    /// Whether the network core is currently held in reset.
    fn held_in_reset(&self) -> bool;

    /// Release the network core so it boots.
    fn release(&mut self);
}

/// One core's endpoint of the IPC substrate.
pub struct Ipc<C: Channels, M: HwMutex> {
    shared: SharedBlock,
    channels: C,
    mutex: M,
}

impl<C: Channels, M: HwMutex> Ipc<C, M> {
    pub fn new(shared: SharedBlock, channels: C, mutex: M) -> Self {
        Ipc { shared, channels, mutex }
    }

    /// A copy of the shared-block handle.
    pub fn shared(&self) -> SharedBlock {
        self.shared
    }

    pub fn channels_mut(&mut self) -> &mut C {
        &mut self.channels
    }

    /// Consume a latched channel event.
    pub fn take(&mut self, channel: Channel) -> bool {
        self.channels.take(channel)
    }

    /// Raise a channel event on the peer core.
    pub fn raise(&mut self, channel: Channel) {
        fence(Ordering::SeqCst);
        self.channels.raise(channel);
    }

    /// Submit a request to the network core and block until it is
    /// acknowledged. [`Req::None`] skips the submission and only consumes a
    /// pending acknowledgement, acting as a barrier.
    ///
    /// At most one request is in flight: the acknowledgement flag is cleared
    /// before returning, and the next call may not overwrite the request
    /// slot before the network core acknowledged the previous one.
    pub fn network_call(&mut self, req: Req) {
        if req != Req::None {
            self.shared.set_req(req as u8);
            fence(Ordering::SeqCst);
            self.channels.raise(Channel::Request);
        }
        while !self.shared.net_ack() {
            self.channels.wait();
        }
        fence(Ordering::SeqCst);
        self.shared.set_net_ack(false);
    }

    /// Release the network core out of reset and wait for it to report
    /// ready. Idempotent: if the core already runs and is ready, this
    /// returns immediately.
    pub fn release_network(&mut self, reset: &mut impl NetworkReset) {
        if !reset.held_in_reset() {
            if self.shared.net_ready() {
                return;
            }
            // Running but not ready: it is rebooting, wait for it again.
            self.shared.set_net_ready(false);
        }
        reset.release();
        while !self.shared.net_ready() {
            self.channels.wait();
        }
        log::debug!("network core ready");
    }

    /// Acknowledge the request currently being serviced. Network-core side.
    pub fn ack_request(&mut self) {
        fence(Ordering::SeqCst);
        self.shared.set_net_ack(true);
    }

    /// Report the network core up and serving. Network-core side.
    pub fn announce_ready(&mut self) {
        fence(Ordering::SeqCst);
        self.shared.set_net_ready(true);
    }

    /// Run a closure with the hardware mutex held.
    pub fn with_lock<R>(&mut self, f: impl FnOnce(&SharedBlock) -> R) -> R {
        self.mutex.lock();
        fence(Ordering::SeqCst);
        let result = f(&self.shared);
        fence(Ordering::SeqCst);
        self.mutex.unlock();
        result
    }
}
