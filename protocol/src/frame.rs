//! Byte-stuffed framing for the gateway-to-host serial link.
//!
//! A frame is `FLAG payload crc16 FLAG` where occurrences of the flag and
//! escape markers inside payload and trailer are escaped as
//! `ESCAPE, byte ^ 0x20`. The 16-bit CRC (X.25 polynomial) is computed over
//! the unstuffed payload and transmitted little endian.

use crc::{Crc, CRC_16_IBM_SDLC};
use heapless::Vec;

use crate::MAX_PAYLOAD_SIZE;

/// Frame boundary marker.
pub const FLAG: u8 = 0x7E;

/// Escape marker.
pub const ESCAPE: u8 = 0x7D;

const ESCAPE_XOR: u8 = 0x20;
const CRC_SIZE: usize = 2;

/// Worst case on-wire size: every payload and CRC byte escaped, two flags.
pub const MAX_FRAME_SIZE: usize = 2 * (MAX_PAYLOAD_SIZE + CRC_SIZE) + 2;

const FCS: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    PayloadTooLarge,
}

/// Wrap a payload into a stuffed frame with CRC trailer.
pub fn encode(payload: &[u8]) -> Result<Vec<u8, MAX_FRAME_SIZE>, Error> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::PayloadTooLarge);
    }
    let mut out = Vec::new();
    // Frame geometry is bounded by MAX_FRAME_SIZE, pushes cannot fail.
    let _ = out.push(FLAG);
    for &byte in payload {
        push_stuffed(&mut out, byte);
    }
    for byte in FCS.checksum(payload).to_le_bytes() {
        push_stuffed(&mut out, byte);
    }
    let _ = out.push(FLAG);
    Ok(out)
}

fn push_stuffed(out: &mut Vec<u8, MAX_FRAME_SIZE>, byte: u8) {
    if byte == FLAG || byte == ESCAPE {
        let _ = out.push(ESCAPE);
        let _ = out.push(byte ^ ESCAPE_XOR);
    } else {
        let _ = out.push(byte);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Receiving,
    Escaping,
}

/// Incremental frame decoder fed one serial byte at a time.
///
/// Bytes outside a frame are discarded. Frames with a bad CRC or an
/// oversized body are dropped silently; the decoder re-synchronizes on the
/// next flag.
pub struct Decoder {
    state: State,
    buf: Vec<u8, { MAX_PAYLOAD_SIZE + CRC_SIZE }>,
}

impl Decoder {
    pub const fn new() -> Self {
        Decoder { state: State::Idle, buf: Vec::new() }
    }

    pub fn feed(&mut self, byte: u8) -> Option<Vec<u8, MAX_PAYLOAD_SIZE>> {
        match self.state {
            State::Idle => {
                if byte == FLAG {
                    self.buf.clear();
                    self.state = State::Receiving;
                }
                None
            }
            State::Receiving => match byte {
                FLAG => {
                    if self.buf.len() < CRC_SIZE {
                        // Runt or back-to-back flag: treat as a new opener.
                        self.buf.clear();
                        return None;
                    }
                    self.state = State::Idle;
                    self.check()
                }
                ESCAPE => {
                    self.state = State::Escaping;
                    None
                }
                byte => {
                    self.accumulate(byte);
                    None
                }
            },
            State::Escaping => {
                if byte == FLAG {
                    // Aborted frame, the flag opens a new one.
                    self.buf.clear();
                    self.state = State::Receiving;
                    return None;
                }
                self.accumulate(byte ^ ESCAPE_XOR);
                if self.state == State::Escaping {
                    self.state = State::Receiving;
                }
                None
            }
        }
    }

    fn accumulate(&mut self, byte: u8) {
        if self.buf.push(byte).is_err() {
            // Oversized frame, drop it and wait for the next opener.
            self.buf.clear();
            self.state = State::Idle;
        }
    }

    fn check(&mut self) -> Option<Vec<u8, MAX_PAYLOAD_SIZE>> {
        let split = self.buf.len() - CRC_SIZE;
        let (payload, trailer) = self.buf.split_at(split);
        let received = u16::from_le_bytes([trailer[0], trailer[1]]);
        if FCS.checksum(payload) != received {
            return None;
        }
        let mut out = Vec::new();
        out.extend_from_slice(payload).ok()?;
        Some(out)
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
