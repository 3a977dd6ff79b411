//! The application-core event loop and the gateway-call implementation.
//!
//! One single-threaded loop services the channel events latched by the IPC
//! interrupt handler, in a fixed priority order: OTA start, OTA chunk,
//! application start. Received user packets are not consumed here; they
//! stay latched until the user application drains them through
//! [`UserApi::ipc_isr`].

use embedded_storage::nor_flash::NorFlash;
use heapless::Vec;

use swarmit_ipc::{Channel, Channels, HwMutex, Ipc, NetworkReset, Req};
use swarmit_protocol::{
    Notification, DATA_PACKET_HEADER_SIZE, LOG_DATA_SIZE, MAX_PAYLOAD_SIZE, OTA_CHUNK_SIZE,
    PACKET_DATA,
};

use crate::api::{CallError, MemoryRanges, UserApi};
use crate::battery::Adc;
use crate::consts::{
    DEFAULT_NETWORK_ADDRESS, DEFAULT_RADIO_FREQUENCY, DEFAULT_RADIO_MODE, SAADC_CHANNEL_COUNT,
};
use crate::ota::OtaWriter;
use crate::watchdog::{StopRoute, Watchdog, WatchdogSupervisor};

/// What the event loop surfaces to the boot glue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The operator asked for the user application; jump into the
    /// non-secure image.
    StartUserApp,
}

pub struct Supervisor<C, M, F, W, S, A>
where
    C: Channels,
    M: HwMutex,
    F: NorFlash,
    W: Watchdog,
    S: StopRoute,
    A: Adc,
{
    ipc: Ipc<C, M>,
    writer: OtaWriter<F>,
    watchdogs: WatchdogSupervisor<W, S>,
    adc: A,
    device_id: u64,
    ranges: MemoryRanges,
}

impl<C, M, F, W, S, A> Supervisor<C, M, F, W, S, A>
where
    C: Channels,
    M: HwMutex,
    F: NorFlash,
    W: Watchdog,
    S: StopRoute,
    A: Adc,
{
    pub fn new(
        ipc: Ipc<C, M>,
        writer: OtaWriter<F>,
        watchdogs: WatchdogSupervisor<W, S>,
        adc: A,
        device_id: u64,
        ranges: MemoryRanges,
    ) -> Self {
        Supervisor { ipc, writer, watchdogs, adc, device_id, ranges }
    }

    /// Boot-time bring-up: arm the watchdogs, release the network core and
    /// block until it reports ready, then configure the transceiver through
    /// radio requests.
    pub fn start(&mut self, reset: &mut impl NetworkReset) {
        self.watchdogs.arm();
        self.ipc.release_network(reset);
        self.init_radio();
        log::info!("supervisor up, device {:#018x}", self.device_id);
    }

    /// The network core owns the transceiver but the application core owns
    /// its configuration: stage the parameters, then bring the radio up
    /// listening, one acknowledged request at a time.
    fn init_radio(&mut self) {
        self.ipc.with_lock(|shared| {
            shared.set_radio_mode(DEFAULT_RADIO_MODE as u8);
            shared.set_radio_frequency(DEFAULT_RADIO_FREQUENCY);
            shared.set_radio_address(DEFAULT_NETWORK_ADDRESS);
        });
        self.ipc.network_call(Req::RadioInit);
        self.ipc.network_call(Req::RadioSetFrequency);
        self.ipc.network_call(Req::RadioSetNetworkAddress);
        self.ipc.network_call(Req::RadioRx);
    }

    /// Service the latched channel events once. Returns an [`Event`] when
    /// control should leave the supervisor.
    pub fn service(&mut self) -> Option<Event> {
        // While the supervisor is resident it feeds the dog itself; once the
        // user application runs, only the gateway call does.
        self.watchdogs.reload_primary();

        if self.ipc.take(Channel::OtaStart) {
            self.handle_ota_start();
        }
        if self.ipc.take(Channel::OtaChunk) {
            self.handle_ota_chunk();
        }
        if self.ipc.take(Channel::AppStart) {
            log::info!("user application start requested");
            return Some(Event::StartUserApp);
        }
        None
    }

    /// Park until the next event.
    pub fn idle(&mut self) {
        self.ipc.channels_mut().wait();
    }

    fn handle_ota_start(&mut self) {
        let image_size = self.ipc.with_lock(|shared| shared.ota_image_size());
        match self.writer.erase_user_region(image_size) {
            Ok(()) => self.notify(Notification::OtaStartAck),
            Err(err) => log::error!("user region erase failed: {:?}", err),
        }
    }

    fn handle_ota_chunk(&mut self) {
        let mut chunk = [0u8; OTA_CHUNK_SIZE];
        let (index, size) = self.ipc.with_lock(|shared| shared.ota_chunk(&mut chunk));
        match self.writer.write_chunk(index, &chunk[..size]) {
            Ok(()) => {
                self.notify(Notification::OtaChunkAck { index });
                self.ipc.with_lock(|shared| shared.set_last_chunk_acked(index));
            }
            Err(err) => log::error!("chunk {} write failed: {:?}", index, err),
        }
    }

    fn notify(&mut self, notification: Notification) {
        match notification.encode(self.device_id) {
            Ok(payload) => self.transmit(&payload),
            Err(err) => log::error!("notification encode failed: {:?}", err),
        }
    }

    /// Stage a payload in the shared block and have the network core send
    /// it.
    fn transmit(&mut self, payload: &[u8]) {
        self.ipc.with_lock(|shared| shared.write_tx_pdu(payload));
        self.ipc.network_call(Req::RadioTx);
    }
}

impl<C, M, F, W, S, A> UserApi for Supervisor<C, M, F, W, S, A>
where
    C: Channels,
    M: HwMutex,
    F: NorFlash,
    W: Watchdog,
    S: StopRoute,
    A: Adc,
{
    fn reload_wdt(&mut self) {
        self.watchdogs.reload_primary();
    }

    fn send_data_packet(&mut self, data: &[u8]) -> Result<(), CallError> {
        if data.len() > MAX_PAYLOAD_SIZE - DATA_PACKET_HEADER_SIZE {
            return Err(CallError::TooLong);
        }
        let mut packet: Vec<u8, MAX_PAYLOAD_SIZE> = Vec::new();
        let _ = packet.push(PACKET_DATA);
        let _ = packet.push(data.len() as u8);
        let _ = packet.extend_from_slice(data);
        self.transmit(&packet);
        Ok(())
    }

    fn send_raw_data(&mut self, data: &[u8]) -> Result<(), CallError> {
        if data.len() > MAX_PAYLOAD_SIZE {
            return Err(CallError::TooLong);
        }
        self.transmit(data);
        Ok(())
    }

    fn log_data(&mut self, data: &[u8]) -> Result<(), CallError> {
        if data.len() > LOG_DATA_SIZE {
            return Err(CallError::TooLong);
        }
        if self.ranges.covers(data.as_ptr() as usize, data.len()) {
            log::warn!("log_data rejected: buffer in the secure world");
            return Err(CallError::SecureAddress);
        }
        self.ipc.with_lock(|shared| shared.write_log(data));
        self.ipc.raise(Channel::Log);
        Ok(())
    }

    fn ipc_isr(&mut self, cb: &mut dyn FnMut(&[u8])) {
        if self.ipc.take(Channel::RadioRx) {
            let mut pdu = [0u8; MAX_PAYLOAD_SIZE];
            let length = self.ipc.with_lock(|shared| shared.read_rx_pdu(&mut pdu));
            // The callback runs outside the mutex on a private copy.
            cb(&pdu[..length]);
        }
    }

    fn read_device_id(&self) -> u64 {
        self.device_id
    }

    fn init_rng(&mut self) {
        self.ipc.network_call(Req::RngInit);
    }

    fn read_rng(&mut self) -> u8 {
        self.ipc.network_call(Req::RngRead);
        self.ipc.shared().rng_value()
    }

    fn saadc_read(&mut self, channel: u8) -> Result<u16, CallError> {
        if channel >= SAADC_CHANNEL_COUNT {
            return Err(CallError::BadChannel);
        }
        Ok(self.adc.read(channel))
    }
}
