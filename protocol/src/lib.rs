#![cfg_attr(not(test), no_std)]

//! Wire formats spoken between the operator console, the gateway and the
//! devices.
//!
//! Radio payloads come in two flavors: operator *requests* (gateway to
//! device) and device *notifications* (device to gateway). Both start with a
//! one byte type tag followed by the 64-bit device identifier, little endian.
//! A request whose identifier is [`BROADCAST_ID`] targets every device in
//! range.
//!
//! The [`frame`] module implements the byte-stuffed UART envelope used on
//! the gateway-to-host serial link.

use heapless::Vec;

pub mod frame;

/// Maximum radio payload size in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 255;

/// Maximum size of a single OTA firmware chunk.
pub const OTA_CHUNK_SIZE: usize = 128;

/// Length of the SHA-256 digest carried in an OTA start request.
pub const OTA_HASH_SIZE: usize = 32;

/// Maximum number of bytes in a user log record.
pub const LOG_DATA_SIZE: usize = 127;

/// Device identifier addressing every device in range.
pub const BROADCAST_ID: u64 = 0;

/// Type tag prefixed to framed user data packets.
pub const PACKET_DATA: u8 = 0x05;

/// Size of the `[type, length]` header of a framed user data packet.
pub const DATA_PACKET_HEADER_SIZE: usize = 2;

/// Size of the `[type, device_id]` preamble of requests and notifications.
pub const PREAMBLE_SIZE: usize = 1 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Truncated,
    UnknownType(u8),
    UnknownStatus(u8),
    ChunkTooLarge,
    PayloadTooLarge,
}

/// Lifecycle state of the user application, as reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ready = 0,
    Running = 1,
    Stopping = 2,
    Resetting = 3,
    Programming = 4,
}

impl Status {
    pub fn from_u8(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Status::Ready),
            1 => Ok(Status::Running),
            2 => Ok(Status::Stopping),
            3 => Ok(Status::Resetting),
            4 => Ok(Status::Programming),
            other => Err(Error::UnknownStatus(other)),
        }
    }
}

/// Operator request type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestKind {
    Status = 0x80,
    Start = 0x81,
    Stop = 0x82,
    Reset = 0x83,
    OtaStart = 0x84,
    OtaChunk = 0x85,
}

/// Device notification type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NotificationKind {
    Status = 0x90,
    OtaStartAck = 0x93,
    OtaChunkAck = 0x94,
    LogEvent = 0x96,
}

/// Header of an OTA transfer: declared image geometry and expected digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaStart {
    pub image_size: u32,
    pub chunk_count: u32,
    pub hash: [u8; OTA_HASH_SIZE],
}

/// One firmware chunk, addressed by its 32-bit index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaChunk {
    pub index: u32,
    pub size: u8,
    pub data: [u8; OTA_CHUNK_SIZE],
}

impl OtaChunk {
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.size as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestBody {
    Status,
    Start,
    Stop,
    Reset,
    OtaStart(OtaStart),
    OtaChunk(OtaChunk),
}

/// A parsed operator request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Request {
    pub device_id: u64,
    pub body: RequestBody,
}

impl Request {
    /// Parse a radio payload as an operator request.
    ///
    /// Payloads whose type tag is outside the request range yield
    /// [`Error::UnknownType`]; the caller decides whether they are user data
    /// or garbage.
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        if payload.len() < PREAMBLE_SIZE {
            return Err(Error::Truncated);
        }
        let device_id = read_u64(payload, 1);
        let tail = &payload[PREAMBLE_SIZE..];
        let body = match payload[0] {
            0x80 => RequestBody::Status,
            0x81 => RequestBody::Start,
            0x82 => RequestBody::Stop,
            0x83 => RequestBody::Reset,
            0x84 => {
                if tail.len() < 8 + OTA_HASH_SIZE {
                    return Err(Error::Truncated);
                }
                let mut hash = [0u8; OTA_HASH_SIZE];
                hash.copy_from_slice(&tail[8..8 + OTA_HASH_SIZE]);
                RequestBody::OtaStart(OtaStart {
                    image_size: read_u32(tail, 0),
                    chunk_count: read_u32(tail, 4),
                    hash,
                })
            }
            0x85 => {
                if tail.len() < 5 {
                    return Err(Error::Truncated);
                }
                let size = tail[4];
                if size as usize > OTA_CHUNK_SIZE {
                    return Err(Error::ChunkTooLarge);
                }
                if tail.len() < 5 + size as usize {
                    return Err(Error::Truncated);
                }
                let mut data = [0u8; OTA_CHUNK_SIZE];
                data[..size as usize].copy_from_slice(&tail[5..5 + size as usize]);
                RequestBody::OtaChunk(OtaChunk {
                    index: read_u32(tail, 0),
                    size,
                    data,
                })
            }
            other => return Err(Error::UnknownType(other)),
        };
        Ok(Request { device_id, body })
    }

    /// Whether this request targets the given device.
    pub fn addressed_to(&self, device_id: u64) -> bool {
        self.device_id == device_id || self.device_id == BROADCAST_ID
    }

    pub fn kind(&self) -> RequestKind {
        match self.body {
            RequestBody::Status => RequestKind::Status,
            RequestBody::Start => RequestKind::Start,
            RequestBody::Stop => RequestKind::Stop,
            RequestBody::Reset => RequestKind::Reset,
            RequestBody::OtaStart(_) => RequestKind::OtaStart,
            RequestBody::OtaChunk(_) => RequestKind::OtaChunk,
        }
    }

    /// Serialize the request into a radio payload.
    pub fn encode(&self) -> Result<Vec<u8, MAX_PAYLOAD_SIZE>, Error> {
        let mut out = Vec::new();
        push(&mut out, self.kind() as u8)?;
        extend(&mut out, &self.device_id.to_le_bytes())?;
        match &self.body {
            RequestBody::Status | RequestBody::Start | RequestBody::Stop | RequestBody::Reset => {}
            RequestBody::OtaStart(start) => {
                extend(&mut out, &start.image_size.to_le_bytes())?;
                extend(&mut out, &start.chunk_count.to_le_bytes())?;
                extend(&mut out, &start.hash)?;
            }
            RequestBody::OtaChunk(chunk) => {
                extend(&mut out, &chunk.index.to_le_bytes())?;
                push(&mut out, chunk.size)?;
                extend(&mut out, &chunk.data)?;
            }
        }
        Ok(out)
    }
}

/// A device notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Status { status: Status, hashes_match: bool },
    OtaStartAck,
    OtaChunkAck { index: u32 },
    LogEvent { timestamp: u32, data: Vec<u8, LOG_DATA_SIZE> },
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::Status { .. } => NotificationKind::Status,
            Notification::OtaStartAck => NotificationKind::OtaStartAck,
            Notification::OtaChunkAck { .. } => NotificationKind::OtaChunkAck,
            Notification::LogEvent { .. } => NotificationKind::LogEvent,
        }
    }

    /// Serialize the notification into a radio payload.
    pub fn encode(&self, device_id: u64) -> Result<Vec<u8, MAX_PAYLOAD_SIZE>, Error> {
        let mut out = Vec::new();
        push(&mut out, self.kind() as u8)?;
        extend(&mut out, &device_id.to_le_bytes())?;
        match self {
            Notification::Status { status, hashes_match } => {
                push(&mut out, *status as u8)?;
                push(&mut out, *hashes_match as u8)?;
            }
            Notification::OtaStartAck => {}
            Notification::OtaChunkAck { index } => {
                extend(&mut out, &index.to_le_bytes())?;
            }
            Notification::LogEvent { timestamp, data } => {
                extend(&mut out, &timestamp.to_le_bytes())?;
                push(&mut out, data.len() as u8)?;
                extend(&mut out, data)?;
            }
        }
        Ok(out)
    }

    /// Parse a radio payload as a device notification.
    ///
    /// Returns the emitting device identifier along with the notification.
    pub fn parse(payload: &[u8]) -> Result<(u64, Self), Error> {
        if payload.len() < PREAMBLE_SIZE {
            return Err(Error::Truncated);
        }
        let device_id = read_u64(payload, 1);
        let tail = &payload[PREAMBLE_SIZE..];
        let notification = match payload[0] {
            0x90 => {
                if tail.len() < 2 {
                    return Err(Error::Truncated);
                }
                Notification::Status {
                    status: Status::from_u8(tail[0])?,
                    hashes_match: tail[1] != 0,
                }
            }
            0x93 => Notification::OtaStartAck,
            0x94 => {
                if tail.len() < 4 {
                    return Err(Error::Truncated);
                }
                Notification::OtaChunkAck { index: read_u32(tail, 0) }
            }
            0x96 => {
                if tail.len() < 5 {
                    return Err(Error::Truncated);
                }
                let length = tail[4] as usize;
                if length > LOG_DATA_SIZE || tail.len() < 5 + length {
                    return Err(Error::Truncated);
                }
                let mut data = Vec::new();
                data.extend_from_slice(&tail[5..5 + length])
                    .map_err(|_| Error::PayloadTooLarge)?;
                Notification::LogEvent { timestamp: read_u32(tail, 0), data }
            }
            other => return Err(Error::UnknownType(other)),
        };
        Ok((device_id, notification))
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

fn push(out: &mut Vec<u8, MAX_PAYLOAD_SIZE>, byte: u8) -> Result<(), Error> {
    out.push(byte).map_err(|_| Error::PayloadTooLarge)
}

fn extend(out: &mut Vec<u8, MAX_PAYLOAD_SIZE>, bytes: &[u8]) -> Result<(), Error> {
    out.extend_from_slice(bytes).map_err(|_| Error::PayloadTooLarge)
}
