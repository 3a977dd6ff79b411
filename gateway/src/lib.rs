#![cfg_attr(not(test), no_std)]

//! Gateway node: the bridge between the operator console and the swarm.
//!
//! The gateway sits on a serial link to the host and relays framed payloads
//! to the radio, and radio notifications back to the host. It forwards
//! nothing until the operator console announces itself with a connect
//! control record; a disconnect record re-arms that gate.

use swarmit_protocol::frame::{self, Decoder};

/// Out-of-band control record: the operator console attached.
pub const CONTROL_CONNECT: u8 = 0xFF;

/// Out-of-band control record: the operator console detached.
pub const CONTROL_DISCONNECT: u8 = 0xFE;

/// The gateway's radio transmitter.
pub trait RadioLink {
    fn transmit(&mut self, payload: &[u8]);
}

/// The serial link back to the host.
pub trait HostPort {
    fn write(&mut self, bytes: &[u8]);
}

pub struct Gateway {
    decoder: Decoder,
    connected: bool,
}

impl Gateway {
    pub const fn new() -> Self {
        Gateway { decoder: Decoder::new(), connected: false }
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    /// Feed one byte from the host serial link. Completed frames are
    /// control records or radio-bound payloads.
    pub fn on_host_byte(&mut self, byte: u8, radio: &mut impl RadioLink) {
        let Some(payload) = self.decoder.feed(byte) else {
            return;
        };
        match payload.as_slice() {
            [CONTROL_CONNECT] => {
                self.connected = true;
                log::info!("operator connected");
            }
            [CONTROL_DISCONNECT] => {
                self.connected = false;
                log::info!("operator disconnected");
            }
            _ if !self.connected => {
                log::debug!("dropping {} byte frame, no operator attached", payload.len());
            }
            payload => radio.transmit(payload),
        }
    }

    /// Relay a received radio payload up to the host.
    pub fn on_radio_frame(&mut self, payload: &[u8], host: &mut impl HostPort) {
        if !self.connected {
            log::debug!("dropping {} byte notification, no operator attached", payload.len());
            return;
        }
        match frame::encode(payload) {
            Ok(framed) => host.write(&framed),
            Err(err) => log::warn!("notification framing failed: {:?}", err),
        }
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}
