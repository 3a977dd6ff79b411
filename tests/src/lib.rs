//! Whole-device simulation harness.
//!
//! Builds both cores against host-side fakes of the hardware seams: signal
//! channels, the shared mutex, the radio, flash, watchdogs, the ADC and the
//! random generator. The simulation is deterministic and single threaded;
//! the "interrupt" of a raised channel is modeled by servicing the peer
//! core's loop synchronously inside [`Channels::raise`], which also means a
//! request submitted by the application core is acknowledged before its
//! busy-wait even starts spinning.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use rand_core::RngCore;

use swarmit_bootloader::api::MemoryRanges;
use swarmit_bootloader::battery::Adc;
use swarmit_bootloader::ota::OtaWriter;
use swarmit_bootloader::supervisor::{Event, Supervisor};
use swarmit_bootloader::watchdog::{
    boot_disposition, BootPath, ResetController, ResetReason, StopRoute, Watchdog,
    WatchdogSupervisor,
};
use swarmit_ipc::{Channel, Channels, HwMutex, Ipc, NetworkReset, SharedBlock, SharedData, CHANNEL_COUNT};
use swarmit_network_core::{Clock, NetCore, Radio, RadioMode};

/// Size of the simulated user flash partition.
pub const SIM_FLASH_SIZE: usize = 64 * 1024;

const PAGE_SIZE: usize = 4096;

// ---------------------------------------------------------------------------
// Flash

#[derive(Debug)]
pub struct FlashFault(NorFlashErrorKind);

impl NorFlashError for FlashFault {
    fn kind(&self) -> NorFlashErrorKind {
        self.0
    }
}

/// User-partition flash backed by host memory. Clones share the same cells,
/// and the content survives a simulated reset.
#[derive(Clone)]
pub struct SharedFlash {
    mem: Rc<RefCell<Vec<u8>>>,
}

impl SharedFlash {
    pub fn new() -> Self {
        SharedFlash { mem: Rc::new(RefCell::new(vec![0xff; SIM_FLASH_SIZE])) }
    }

    pub fn snapshot(&self, offset: usize, length: usize) -> Vec<u8> {
        self.mem.borrow()[offset..offset + length].to_vec()
    }

    /// Drop an image into the partition behind the writer's back, as a
    /// factory-flashed device would have.
    pub fn preload(&self, bytes: &[u8]) {
        self.mem.borrow_mut()[..bytes.len()].copy_from_slice(bytes);
    }

    fn image_present(&self) -> bool {
        self.mem.borrow()[..8] != [0xff; 8]
    }
}

impl Default for SharedFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorType for SharedFlash {
    type Error = FlashFault;
}

impl ReadNorFlash for SharedFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let offset = offset as usize;
        let mem = self.mem.borrow();
        if offset + bytes.len() > mem.len() {
            return Err(FlashFault(NorFlashErrorKind::OutOfBounds));
        }
        bytes.copy_from_slice(&mem[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.mem.borrow().len()
    }
}

impl NorFlash for SharedFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = PAGE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from % PAGE_SIZE as u32 != 0 || to % PAGE_SIZE as u32 != 0 {
            return Err(FlashFault(NorFlashErrorKind::NotAligned));
        }
        let mut mem = self.mem.borrow_mut();
        if to as usize > mem.len() {
            return Err(FlashFault(NorFlashErrorKind::OutOfBounds));
        }
        mem[from as usize..to as usize].fill(0xff);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if offset % Self::WRITE_SIZE as u32 != 0 || bytes.len() % Self::WRITE_SIZE != 0 {
            return Err(FlashFault(NorFlashErrorKind::NotAligned));
        }
        let offset = offset as usize;
        let mut mem = self.mem.borrow_mut();
        if offset + bytes.len() > mem.len() {
            return Err(FlashFault(NorFlashErrorKind::OutOfBounds));
        }
        mem[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Watchdogs

#[derive(Default)]
struct DogState {
    timeout: Option<u32>,
    remaining: i64,
    reloads: u32,
}

/// The primary watchdog, reloadable only through the gateway call.
pub struct PrimaryDog(Rc<RefCell<DogState>>);

impl Watchdog for PrimaryDog {
    fn start(&mut self, timeout_ms: u32) {
        let mut dog = self.0.borrow_mut();
        dog.timeout = Some(timeout_ms);
        dog.remaining = timeout_ms as i64;
    }

    fn reload(&mut self) {
        let mut dog = self.0.borrow_mut();
        dog.reloads += 1;
        if let Some(timeout) = dog.timeout {
            dog.remaining = timeout as i64;
        }
    }
}

#[derive(Default)]
struct AuxState {
    subscription: Option<(Channel, u32)>,
    remaining: Option<i64>,
}

impl AuxState {
    /// The hardware route: a channel event starts the dog, no software
    /// involved.
    fn channel_fired(&mut self, channel: Channel) {
        if let Some((subscribed, timeout)) = self.subscription {
            if subscribed == channel && self.remaining.is_none() {
                self.remaining = Some(timeout as i64);
            }
        }
    }
}

/// The auxiliary watchdog's channel subscription.
pub struct AuxRoute(Rc<RefCell<AuxState>>);

impl StopRoute for AuxRoute {
    fn subscribe(&mut self, channel: Channel, timeout_ms: u32) {
        self.0.borrow_mut().subscription = Some((channel, timeout_ms));
    }
}

// ---------------------------------------------------------------------------
// Channels and mutex

type Pending = Rc<RefCell<[bool; CHANNEL_COUNT]>>;

type SimNet = NetCore<NetChannels, SimMutex, SimRadio, SeqRng, TickClock>;

/// The application core's channel view. Raising a request or log event
/// services the network core synchronously, standing in for its IPC
/// interrupt.
pub struct AppChannels {
    app_pending: Pending,
    net_pending: Pending,
    net: Rc<RefCell<Option<SimNet>>>,
}

impl Channels for AppChannels {
    fn raise(&mut self, channel: Channel) {
        self.net_pending.borrow_mut()[channel.index()] = true;
        if let Some(net) = self.net.borrow_mut().as_mut() {
            net.service();
        }
    }

    fn take(&mut self, channel: Channel) -> bool {
        std::mem::take(&mut self.app_pending.borrow_mut()[channel.index()])
    }

    fn wait(&mut self) {
        panic!("application core parked while busy-waiting; the simulation lost an acknowledgement");
    }
}

/// The network core's channel view. Raising APP_STOP also fires the
/// hardware route into the auxiliary watchdog.
pub struct NetChannels {
    app_pending: Pending,
    net_pending: Pending,
    aux: Rc<RefCell<AuxState>>,
}

impl Channels for NetChannels {
    fn raise(&mut self, channel: Channel) {
        self.app_pending.borrow_mut()[channel.index()] = true;
        if channel == Channel::AppStop {
            self.aux.borrow_mut().channel_fired(channel);
        }
    }

    fn take(&mut self, channel: Channel) -> bool {
        std::mem::take(&mut self.net_pending.borrow_mut()[channel.index()])
    }

    fn wait(&mut self) {
        panic!("network core parked while busy-waiting");
    }
}

/// The shared hardware mutex cell. Single threaded, so a relock is a
/// genuine bug, not contention.
#[derive(Clone)]
pub struct SimMutex {
    locked: Rc<Cell<bool>>,
}

impl HwMutex for SimMutex {
    fn lock(&mut self) {
        assert!(!self.locked.get(), "shared mutex relocked; both cores would spin forever");
        self.locked.set(true);
    }

    fn unlock(&mut self) {
        self.locked.set(false);
    }
}

// ---------------------------------------------------------------------------
// Radio, RNG, clock, ADC

/// What the supervisor configured the transceiver to, observable by tests.
#[derive(Clone, Default)]
pub struct RadioState {
    pub mode: Option<RadioMode>,
    pub frequency: Option<u8>,
    pub address: Option<u32>,
    pub rx_enabled: bool,
}

/// Records configuration and every transmitted payload; ingress goes
/// straight to [`SimDevice::radio_ingress`].
#[derive(Clone)]
pub struct SimRadio {
    out: Rc<RefCell<VecDeque<Vec<u8>>>>,
    state: Rc<RefCell<RadioState>>,
}

impl Radio for SimRadio {
    fn init(&mut self, mode: RadioMode) {
        self.state.borrow_mut().mode = Some(mode);
    }

    fn set_frequency(&mut self, frequency: u8) {
        self.state.borrow_mut().frequency = Some(frequency);
    }

    fn set_network_address(&mut self, address: u32) {
        self.state.borrow_mut().address = Some(address);
    }

    fn enable_rx(&mut self) {
        self.state.borrow_mut().rx_enabled = true;
    }

    fn transmit(&mut self, payload: &[u8]) {
        self.out.borrow_mut().push_back(payload.to_vec());
    }
}

/// Deterministic stand-in for the hardware random generator.
pub struct SeqRng(u32);

impl RngCore for SeqRng {
    fn next_u32(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1664525).wrapping_add(1013904223);
        self.0
    }

    fn next_u64(&mut self) -> u64 {
        (self.next_u32() as u64) << 32 | self.next_u32() as u64
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for byte in dest {
            *byte = (self.next_u32() & 0xff) as u8;
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

pub struct TickClock(u32);

impl Clock for TickClock {
    fn now_ms(&mut self) -> u32 {
        self.0 += 10;
        self.0
    }
}

#[derive(Clone)]
pub struct SimAdc {
    pub value: Rc<Cell<u16>>,
}

impl Adc for SimAdc {
    fn read(&mut self, _channel: u8) -> u16 {
        self.value.get()
    }
}

// ---------------------------------------------------------------------------
// Reset plumbing

/// Reset-reason register fake: reading clears the latch.
struct LatchedReset(Option<ResetReason>);

impl ResetController for LatchedReset {
    fn take_reason(&mut self) -> ResetReason {
        self.0.take().unwrap_or(ResetReason::Other)
    }
}

struct SimReset {
    net: Rc<RefCell<Option<SimNet>>>,
    held: bool,
}

impl NetworkReset for SimReset {
    fn held_in_reset(&self) -> bool {
        self.held
    }

    fn release(&mut self) {
        self.held = false;
        self.net
            .borrow_mut()
            .as_mut()
            .expect("network core installed before release")
            .start();
    }
}

// ---------------------------------------------------------------------------
// The device

pub type SimSupervisor = Supervisor<AppChannels, SimMutex, SharedFlash, PrimaryDog, AuxRoute, SimAdc>;

pub struct SimDevice {
    pub supervisor: SimSupervisor,
    pub shared: SharedBlock,
    /// Which way the last boot went.
    pub last_boot: BootPath,
    net: Rc<RefCell<Option<SimNet>>>,
    radio_out: Rc<RefCell<VecDeque<Vec<u8>>>>,
    radio: Rc<RefCell<RadioState>>,
    flash: SharedFlash,
    primary: Rc<RefCell<DogState>>,
    aux: Rc<RefCell<AuxState>>,
    device_id: u64,
    ranges: MemoryRanges,
    adc: SimAdc,
}

impl SimDevice {
    pub fn new(device_id: u64) -> Self {
        Self::with_ranges(device_id, MemoryRanges::device())
    }

    /// Build a device whose secure address ranges are chosen by the test,
    /// so host buffers can be made to look like secure memory.
    pub fn with_ranges(device_id: u64, ranges: MemoryRanges) -> Self {
        let flash = SharedFlash::new();
        let radio_out = Rc::new(RefCell::new(VecDeque::new()));
        let radio = Rc::new(RefCell::new(RadioState::default()));
        let adc = SimAdc { value: Rc::new(Cell::new(0)) };
        let mut device = SimDevice {
            // Placeholder, immediately replaced by the first reboot below.
            supervisor: Self::build(
                device_id,
                ranges.clone(),
                flash.clone(),
                radio_out.clone(),
                radio.clone(),
                adc.clone(),
            )
            .0,
            shared: unsafe { SharedBlock::from_ptr(Box::leak(Box::new(SharedData::new()))) },
            last_boot: BootPath::Supervisor,
            net: Rc::new(RefCell::new(None)),
            radio_out,
            radio,
            flash,
            primary: Rc::new(RefCell::new(DogState::default())),
            aux: Rc::new(RefCell::new(AuxState::default())),
            device_id,
            ranges,
            adc,
        };
        device.reboot(ResetReason::PowerOn);
        device
    }

    fn build(
        device_id: u64,
        ranges: MemoryRanges,
        flash: SharedFlash,
        radio_out: Rc<RefCell<VecDeque<Vec<u8>>>>,
        radio_state: Rc<RefCell<RadioState>>,
        adc: SimAdc,
    ) -> (SimSupervisor, SharedBlock, Rc<RefCell<Option<SimNet>>>, Rc<RefCell<DogState>>, Rc<RefCell<AuxState>>)
    {
        // The transceiver comes out of reset unconfigured.
        *radio_state.borrow_mut() = RadioState::default();
        let shared = unsafe { SharedBlock::from_ptr(Box::leak(Box::new(SharedData::new()))) };
        let app_pending: Pending = Rc::new(RefCell::new([false; CHANNEL_COUNT]));
        let net_pending: Pending = Rc::new(RefCell::new([false; CHANNEL_COUNT]));
        let mutex = SimMutex { locked: Rc::new(Cell::new(false)) };
        let net: Rc<RefCell<Option<SimNet>>> = Rc::new(RefCell::new(None));
        let primary = Rc::new(RefCell::new(DogState::default()));
        let aux = Rc::new(RefCell::new(AuxState::default()));

        let net_channels = NetChannels {
            app_pending: app_pending.clone(),
            net_pending: net_pending.clone(),
            aux: aux.clone(),
        };
        let radio = SimRadio { out: radio_out, state: radio_state };
        *net.borrow_mut() = Some(NetCore::new(
            Ipc::new(shared, net_channels, mutex.clone()),
            radio,
            SeqRng(0x5eed),
            TickClock(0),
            device_id,
        ));

        let app_channels = AppChannels {
            app_pending,
            net_pending,
            net: net.clone(),
        };
        let supervisor = Supervisor::new(
            Ipc::new(shared, app_channels, mutex),
            OtaWriter::new(flash, 0),
            WatchdogSupervisor::new(PrimaryDog(primary.clone()), AuxRoute(aux.clone())),
            adc,
            device_id,
            ranges,
        );
        (supervisor, shared, net, primary, aux)
    }

    /// Power-cycle the device: RAM and both cores come up fresh, the flash
    /// keeps its content, and the boot path is decided from the reset
    /// reason and the user image.
    pub fn reboot(&mut self, reason: ResetReason) {
        let mut controller = LatchedReset(Some(reason));
        self.last_boot = boot_disposition(&mut controller, self.flash.image_present());
        let (supervisor, shared, net, primary, aux) = Self::build(
            self.device_id,
            self.ranges.clone(),
            self.flash.clone(),
            self.radio_out.clone(),
            self.radio.clone(),
            self.adc.clone(),
        );
        self.supervisor = supervisor;
        self.shared = shared;
        self.net = net;
        self.primary = primary;
        self.aux = aux;

        let mut reset = SimReset { net: self.net.clone(), held: true };
        self.supervisor.start(&mut reset);
    }

    /// Deliver a radio payload to the network core.
    pub fn radio_ingress(&mut self, payload: &[u8]) {
        self.net
            .borrow_mut()
            .as_mut()
            .expect("device booted")
            .on_radio_frame(payload);
    }

    /// Run the application core's event loop once.
    pub fn service_app(&mut self) -> Option<Event> {
        self.supervisor.service()
    }

    /// Drain everything the device transmitted so far.
    pub fn sent(&mut self) -> Vec<Vec<u8>> {
        self.radio_out.borrow_mut().drain(..).collect()
    }

    /// Let simulated time pass; reports a watchdog that ran out, which the
    /// test should answer with [`SimDevice::reboot`].
    pub fn advance(&mut self, ms: u32) -> Option<ResetReason> {
        {
            let mut dog = self.primary.borrow_mut();
            if dog.timeout.is_some() {
                dog.remaining -= ms as i64;
                if dog.remaining < 0 {
                    return Some(ResetReason::Watchdog0);
                }
            }
        }
        let mut aux = self.aux.borrow_mut();
        if let Some(remaining) = aux.remaining.as_mut() {
            *remaining -= ms as i64;
            if *remaining < 0 {
                return Some(ResetReason::Watchdog1);
            }
        }
        None
    }

    pub fn primary_reloads(&self) -> u32 {
        self.primary.borrow().reloads
    }

    /// Set the raw sample every ADC channel reads back.
    pub fn set_adc_value(&self, value: u16) {
        self.adc.value.set(value);
    }

    /// Whether the operator-stop route started the auxiliary watchdog.
    pub fn aux_running(&self) -> bool {
        self.aux.borrow().remaining.is_some()
    }

    /// The transceiver configuration as last requested by the supervisor.
    pub fn radio_state(&self) -> RadioState {
        self.radio.borrow().clone()
    }

    pub fn flash(&self) -> &SharedFlash {
        &self.flash
    }
}
