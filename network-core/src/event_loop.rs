//! The network-core event loop.
//!
//! A single loop services, in order: requests latched on the REQUEST
//! channel, then log records latched on the LOG channel. Radio reception is
//! interrupt driven and enters through [`NetCore::on_radio_frame`].
//!
//! Operator requests are gated on the lifecycle status exactly as the
//! operator sees it; anything arriving in the wrong state is dropped
//! without a reply.

use rand_core::RngCore;

use swarmit_ipc::{Channel, Channels, HwMutex, Ipc, Req};
use swarmit_protocol::{
    Notification, Request, RequestBody, Status, LOG_DATA_SIZE, MAX_PAYLOAD_SIZE,
};

use crate::ota::{OtaTransfer, NO_CHUNK_ACKED};
use crate::{Clock, Radio, RadioMode};

pub struct NetCore<C, M, R, G, K>
where
    C: Channels,
    M: HwMutex,
    R: Radio,
    G: RngCore,
    K: Clock,
{
    ipc: Ipc<C, M>,
    radio: R,
    rng: G,
    clock: K,
    device_id: u64,
    ota: OtaTransfer,
}

impl<C, M, R, G, K> NetCore<C, M, R, G, K>
where
    C: Channels,
    M: HwMutex,
    R: Radio,
    G: RngCore,
    K: Clock,
{
    pub fn new(ipc: Ipc<C, M>, radio: R, rng: G, clock: K, device_id: u64) -> Self {
        NetCore { ipc, radio, rng, clock, device_id, ota: OtaTransfer::new() }
    }

    /// Report readiness to the application core. The transceiver stays down
    /// until the supervisor configures it through radio requests.
    pub fn start(&mut self) {
        self.set_status(Status::Ready);
        self.ipc.announce_ready();
        log::info!("network core ready, device {:#018x}", self.device_id);
    }

    /// Service the latched channel events once.
    pub fn service(&mut self) {
        if self.ipc.take(Channel::Request) {
            self.handle_request();
        }
        if self.ipc.take(Channel::Log) {
            self.forward_log();
        }
    }

    /// Park until the next event.
    pub fn idle(&mut self) {
        self.ipc.channels_mut().wait();
    }

    fn status(&self) -> Status {
        Status::from_u8(self.ipc.shared().status()).unwrap_or(Status::Ready)
    }

    fn set_status(&mut self, status: Status) {
        self.ipc.shared().set_status(status as u8);
    }

    /// Dispatch the request published in the shared block, then acknowledge
    /// it. Exactly one acknowledgement per request.
    fn handle_request(&mut self) {
        let raw = self.ipc.shared().req();
        match Req::from_u8(raw) {
            Some(Req::None) => {}
            Some(Req::RadioInit) => {
                let mode = self.ipc.with_lock(|shared| shared.radio_mode());
                self.radio.init(RadioMode::from_u8(mode));
            }
            Some(Req::RadioSetFrequency) => {
                let frequency = self.ipc.with_lock(|shared| shared.radio_frequency());
                self.radio.set_frequency(frequency);
            }
            Some(Req::RadioSetNetworkAddress) => {
                let address = self.ipc.with_lock(|shared| shared.radio_address());
                self.radio.set_network_address(address);
            }
            Some(Req::RadioRx) => self.radio.enable_rx(),
            Some(Req::RadioTx) => {
                let mut pdu = [0u8; MAX_PAYLOAD_SIZE];
                let length = self.ipc.with_lock(|shared| shared.read_tx_pdu(&mut pdu));
                self.radio.transmit(&pdu[..length]);
            }
            Some(Req::RngInit) => {
                // The hardware generator free-runs; nothing to configure.
            }
            Some(Req::RngRead) => {
                let byte = (self.rng.next_u32() & 0xff) as u8;
                self.ipc.shared().set_rng_value(byte);
            }
            None => log::warn!("unknown request {}", raw),
        }
        self.ipc.ack_request();
    }

    /// Package the staged log record and ship it out with the device id and
    /// a timestamp.
    fn forward_log(&mut self) {
        let mut record = [0u8; LOG_DATA_SIZE];
        let length = self.ipc.with_lock(|shared| shared.read_log(&mut record));
        let mut data = heapless::Vec::new();
        let _ = data.extend_from_slice(&record[..length]);
        let timestamp = self.clock.now_ms();
        self.send_notification(Notification::LogEvent { timestamp, data });
    }

    /// Entry point for every payload the transceiver received.
    pub fn on_radio_frame(&mut self, payload: &[u8]) {
        match Request::parse(payload) {
            Ok(request) => {
                if !request.addressed_to(self.device_id) {
                    log::debug!("request for {:#x}, not us", request.device_id);
                    return;
                }
                self.handle_operator_request(&request);
            }
            Err(_) => {
                // Not an operator request: user traffic, delivered only
                // while an application runs.
                if self.status() == Status::Running {
                    self.ipc.with_lock(|shared| shared.write_rx_pdu(payload));
                    self.ipc.raise(Channel::RadioRx);
                } else {
                    log::debug!("dropping {} byte payload outside RUNNING", payload.len());
                }
            }
        }
    }

    fn handle_operator_request(&mut self, request: &Request) {
        let status = self.status();
        match request.body {
            RequestBody::Status => {
                let hashes_match = self.ipc.with_lock(|shared| shared.hashes_match());
                self.send_notification(Notification::Status { status, hashes_match });
            }
            RequestBody::Start => {
                if status != Status::Ready {
                    log::debug!("start ignored in {:?}", status);
                    return;
                }
                if self.ota.start_refused() {
                    log::warn!("start refused: staged image failed verification");
                    return;
                }
                self.set_status(Status::Running);
                self.ipc.raise(Channel::AppStart);
            }
            RequestBody::Stop => {
                if !matches!(status, Status::Running | Status::Resetting | Status::Programming) {
                    log::debug!("stop ignored in {:?}", status);
                    return;
                }
                self.set_status(Status::Stopping);
                self.ipc.raise(Channel::AppStop);
            }
            RequestBody::Reset => {
                if status != Status::Ready {
                    log::debug!("reset ignored in {:?}", status);
                    return;
                }
                self.set_status(Status::Resetting);
            }
            RequestBody::OtaStart(header) => {
                if status != Status::Ready {
                    log::debug!("ota start ignored in {:?}", status);
                    return;
                }
                self.set_status(Status::Programming);
                self.ota.begin(&header);
                self.ipc.with_lock(|shared| {
                    shared.set_ota_header(header.image_size, header.chunk_count);
                    shared.set_last_chunk_acked(NO_CHUNK_ACKED);
                    shared.set_hashes_match(false);
                });
                self.ipc.raise(Channel::OtaStart);
            }
            RequestBody::OtaChunk(chunk) => {
                if status != Status::Programming {
                    log::debug!("ota chunk ignored in {:?}", status);
                    return;
                }
                // A retransmitted chunk is staged again for the writer (the
                // write is idempotent) but must not be hashed twice.
                let replay = self.ipc.with_lock(|shared| {
                    let replay = chunk.index == shared.last_chunk_acked();
                    shared.set_ota_chunk(chunk.index, chunk.bytes());
                    replay
                });
                if !replay {
                    self.ota.absorb(chunk.bytes());
                }
                if self.ota.is_last(chunk.index) {
                    let matched = self.ota.finalize();
                    self.ipc.with_lock(|shared| shared.set_hashes_match(matched));
                    self.set_status(Status::Ready);
                }
                self.ipc.raise(Channel::OtaChunk);
            }
        }
    }

    fn send_notification(&mut self, notification: Notification) {
        match notification.encode(self.device_id) {
            Ok(payload) => self.radio.transmit(&payload),
            Err(err) => log::error!("notification encode failed: {:?}", err),
        }
    }
}
