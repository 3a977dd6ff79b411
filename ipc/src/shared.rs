//! The shared-data block both cores agree on.
//!
//! The block lives at a fixed address in the RAM region visible to both
//! processors. Neither core ever holds a Rust reference into it: every
//! access goes through [`SharedBlock`], which performs volatile reads and
//! writes on individual fields. Multi-field groups (OTA descriptor, log
//! record, PDUs) must be accessed with the hardware mutex held; single-byte
//! flags are plain volatile stores.

use core::ptr::{addr_of, addr_of_mut};

use swarmit_protocol::{LOG_DATA_SIZE, MAX_PAYLOAD_SIZE, OTA_CHUNK_SIZE};

/// A radio PDU staged for transmission or just received.
#[repr(C)]
pub struct Pdu {
    length: u8,
    buffer: [u8; MAX_PAYLOAD_SIZE],
}

/// A log record filled by the user application.
#[repr(C)]
pub struct LogRecord {
    length: u8,
    data: [u8; LOG_DATA_SIZE],
}

/// OTA exchange state: header recorded at start, one staged chunk, and the
/// acknowledgement high-water mark.
#[repr(C)]
pub struct OtaRecord {
    image_size: u32,
    chunk_count: u32,
    chunk_index: u32,
    chunk_size: u32,
    chunk: [u8; OTA_CHUNK_SIZE],
    hashes_match: u8,
    last_chunk_acked: u32,
}

/// Parameters for the radio requests, written by the application core before
/// raising REQUEST.
#[repr(C)]
pub struct RadioRecord {
    mode: u8,
    frequency: u8,
    address: u32,
    tx_pdu: Pdu,
    rx_pdu: Pdu,
}

/// The whole shared record. Layout is part of the inter-core contract; both
/// firmware images must be built from the same revision of this crate.
#[repr(C)]
pub struct SharedData {
    net_ready: u8,
    net_ack: u8,
    req: u8,
    status: u8,
    log: LogRecord,
    ota: OtaRecord,
    radio: RadioRecord,
    rng_value: u8,
}

impl SharedData {
    pub const fn new() -> Self {
        SharedData {
            net_ready: 0,
            net_ack: 0,
            req: 0,
            status: 0,
            log: LogRecord { length: 0, data: [0; LOG_DATA_SIZE] },
            ota: OtaRecord {
                image_size: 0,
                chunk_count: 0,
                chunk_index: 0,
                chunk_size: 0,
                chunk: [0; OTA_CHUNK_SIZE],
                hashes_match: 0,
                last_chunk_acked: 0,
            },
            radio: RadioRecord {
                mode: 0,
                frequency: 0,
                address: 0,
                tx_pdu: Pdu { length: 0, buffer: [0; MAX_PAYLOAD_SIZE] },
                rx_pdu: Pdu { length: 0, buffer: [0; MAX_PAYLOAD_SIZE] },
            },
            rng_value: 0,
        }
    }
}

impl Default for SharedData {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the shared record. Copyable; both cores (and, on the
/// application core, both the supervisor loop and the gateway-call veneers)
/// keep their own handle to the same block.
#[derive(Clone, Copy)]
pub struct SharedBlock {
    base: *mut SharedData,
}

impl SharedBlock {
    /// Wrap the fixed-address shared record.
    ///
    /// # Safety
    ///
    /// `base` must point to a `SharedData` that stays valid for the lifetime
    /// of the handle, placed in memory visible to both cores. All aliasing
    /// handles must go through volatile accessors only.
    pub const unsafe fn from_ptr(base: *mut SharedData) -> Self {
        SharedBlock { base }
    }

    pub fn net_ready(&self) -> bool {
        unsafe { addr_of!((*self.base).net_ready).read_volatile() != 0 }
    }

    pub fn set_net_ready(&self, ready: bool) {
        unsafe { addr_of_mut!((*self.base).net_ready).write_volatile(ready as u8) }
    }

    pub fn net_ack(&self) -> bool {
        unsafe { addr_of!((*self.base).net_ack).read_volatile() != 0 }
    }

    pub fn set_net_ack(&self, acked: bool) {
        unsafe { addr_of_mut!((*self.base).net_ack).write_volatile(acked as u8) }
    }

    pub fn req(&self) -> u8 {
        unsafe { addr_of!((*self.base).req).read_volatile() }
    }

    pub fn set_req(&self, req: u8) {
        unsafe { addr_of_mut!((*self.base).req).write_volatile(req) }
    }

    pub fn status(&self) -> u8 {
        unsafe { addr_of!((*self.base).status).read_volatile() }
    }

    pub fn set_status(&self, status: u8) {
        unsafe { addr_of_mut!((*self.base).status).write_volatile(status) }
    }

    pub fn rng_value(&self) -> u8 {
        unsafe { addr_of!((*self.base).rng_value).read_volatile() }
    }

    pub fn set_rng_value(&self, value: u8) {
        unsafe { addr_of_mut!((*self.base).rng_value).write_volatile(value) }
    }

    // Log record. Mutex must be held.

    pub fn write_log(&self, data: &[u8]) {
        let length = data.len().min(LOG_DATA_SIZE);
        unsafe {
            copy_in(addr_of_mut!((*self.base).log.data) as *mut u8, &data[..length]);
            addr_of_mut!((*self.base).log.length).write_volatile(length as u8);
        }
    }

    pub fn read_log(&self, out: &mut [u8; LOG_DATA_SIZE]) -> usize {
        unsafe {
            let length = (addr_of!((*self.base).log.length).read_volatile() as usize).min(LOG_DATA_SIZE);
            copy_out(addr_of!((*self.base).log.data) as *const u8, &mut out[..length]);
            length
        }
    }

    // OTA descriptor. Mutex must be held for every accessor below, including
    // the single-word verdict and acknowledgement fields: both cores read
    // and write them around the same transfer.

    pub fn set_ota_header(&self, image_size: u32, chunk_count: u32) {
        unsafe {
            addr_of_mut!((*self.base).ota.image_size).write_volatile(image_size);
            addr_of_mut!((*self.base).ota.chunk_count).write_volatile(chunk_count);
        }
    }

    pub fn ota_image_size(&self) -> u32 {
        unsafe { addr_of!((*self.base).ota.image_size).read_volatile() }
    }

    pub fn ota_chunk_count(&self) -> u32 {
        unsafe { addr_of!((*self.base).ota.chunk_count).read_volatile() }
    }

    pub fn set_ota_chunk(&self, index: u32, bytes: &[u8]) {
        let size = bytes.len().min(OTA_CHUNK_SIZE);
        unsafe {
            addr_of_mut!((*self.base).ota.chunk_index).write_volatile(index);
            addr_of_mut!((*self.base).ota.chunk_size).write_volatile(size as u32);
            copy_in(addr_of_mut!((*self.base).ota.chunk) as *mut u8, &bytes[..size]);
        }
    }

    pub fn ota_chunk(&self, out: &mut [u8; OTA_CHUNK_SIZE]) -> (u32, usize) {
        unsafe {
            let index = addr_of!((*self.base).ota.chunk_index).read_volatile();
            let size = (addr_of!((*self.base).ota.chunk_size).read_volatile() as usize).min(OTA_CHUNK_SIZE);
            copy_out(addr_of!((*self.base).ota.chunk) as *const u8, &mut out[..size]);
            (index, size)
        }
    }

    pub fn hashes_match(&self) -> bool {
        unsafe { addr_of!((*self.base).ota.hashes_match).read_volatile() != 0 }
    }

    pub fn set_hashes_match(&self, matched: bool) {
        unsafe { addr_of_mut!((*self.base).ota.hashes_match).write_volatile(matched as u8) }
    }

    pub fn last_chunk_acked(&self) -> u32 {
        unsafe { addr_of!((*self.base).ota.last_chunk_acked).read_volatile() }
    }

    pub fn set_last_chunk_acked(&self, index: u32) {
        unsafe { addr_of_mut!((*self.base).ota.last_chunk_acked).write_volatile(index) }
    }

    // Radio request parameters. Mutex must be held; the configuration is a
    // multi-field group.

    pub fn radio_mode(&self) -> u8 {
        unsafe { addr_of!((*self.base).radio.mode).read_volatile() }
    }

    pub fn set_radio_mode(&self, mode: u8) {
        unsafe { addr_of_mut!((*self.base).radio.mode).write_volatile(mode) }
    }

    pub fn radio_frequency(&self) -> u8 {
        unsafe { addr_of!((*self.base).radio.frequency).read_volatile() }
    }

    pub fn set_radio_frequency(&self, frequency: u8) {
        unsafe { addr_of_mut!((*self.base).radio.frequency).write_volatile(frequency) }
    }

    pub fn radio_address(&self) -> u32 {
        unsafe { addr_of!((*self.base).radio.address).read_volatile() }
    }

    pub fn set_radio_address(&self, address: u32) {
        unsafe { addr_of_mut!((*self.base).radio.address).write_volatile(address) }
    }

    // PDU buffers. Mutex must be held.

    pub fn write_tx_pdu(&self, bytes: &[u8]) {
        unsafe { write_pdu(addr_of_mut!((*self.base).radio.tx_pdu), bytes) }
    }

    pub fn read_tx_pdu(&self, out: &mut [u8; MAX_PAYLOAD_SIZE]) -> usize {
        unsafe { read_pdu(addr_of!((*self.base).radio.tx_pdu), out) }
    }

    pub fn write_rx_pdu(&self, bytes: &[u8]) {
        unsafe { write_pdu(addr_of_mut!((*self.base).radio.rx_pdu), bytes) }
    }

    pub fn read_rx_pdu(&self, out: &mut [u8; MAX_PAYLOAD_SIZE]) -> usize {
        unsafe { read_pdu(addr_of!((*self.base).radio.rx_pdu), out) }
    }
}

unsafe fn write_pdu(pdu: *mut Pdu, bytes: &[u8]) {
    let length = bytes.len().min(MAX_PAYLOAD_SIZE);
    copy_in(addr_of_mut!((*pdu).buffer) as *mut u8, &bytes[..length]);
    addr_of_mut!((*pdu).length).write_volatile(length as u8);
}

unsafe fn read_pdu(pdu: *const Pdu, out: &mut [u8; MAX_PAYLOAD_SIZE]) -> usize {
    let length = addr_of!((*pdu).length).read_volatile() as usize;
    copy_out(addr_of!((*pdu).buffer) as *const u8, &mut out[..length]);
    length
}

unsafe fn copy_in(dst: *mut u8, src: &[u8]) {
    for (i, &byte) in src.iter().enumerate() {
        dst.add(i).write_volatile(byte);
    }
}

unsafe fn copy_out(src: *const u8, dst: &mut [u8]) {
    for (i, slot) in dst.iter_mut().enumerate() {
        *slot = src.add(i).read_volatile();
    }
}
