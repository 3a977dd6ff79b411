//! Watchdog supervision of the user application.
//!
//! Two dogs, two failure modes. The primary watchdog is reloadable only
//! through the `reload_wdt` gateway call, so a wedged user application
//! starves it and the device resets. The auxiliary watchdog is started by a
//! hardware route from the APP_STOP channel event, giving the operator a
//! reset path that needs no cooperation from the user application at all.

use swarmit_ipc::Channel;

use crate::consts::WATCHDOG_TIMEOUT_MS;

/// A runnable, reloadable watchdog.
pub trait Watchdog {
    fn start(&mut self, timeout_ms: u32);
    fn reload(&mut self);
}

/// Hardware subscription of the auxiliary watchdog's start task to a
/// channel event. Bound once at init and never again.
pub trait StopRoute {
    fn subscribe(&mut self, channel: Channel, timeout_ms: u32);
}

/// Why the core came out of reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    PowerOn,
    Pin,
    Soft,
    /// The primary watchdog expired: the user application hung.
    Watchdog0,
    /// The auxiliary watchdog expired: the operator forced a stop.
    Watchdog1,
    Other,
}

impl ResetReason {
    pub fn watchdog_fired(self) -> bool {
        matches!(self, ResetReason::Watchdog0 | ResetReason::Watchdog1)
    }
}

/// Reset-reason register access; reading must also clear the latched cause.
pub trait ResetController {
    fn take_reason(&mut self) -> ResetReason;
}

/// What the boot path does after inspecting the reset cause and the user
/// image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootPath {
    /// Stay resident: wait for operator requests (READY).
    Supervisor,
    /// Jump into the non-secure user image.
    UserApp,
}

/// A watchdog reset or a missing image keeps the device in the supervisor;
/// everything else proceeds to the user application.
pub fn boot_path(reason: ResetReason, image_present: bool) -> BootPath {
    if reason.watchdog_fired() || !image_present {
        BootPath::Supervisor
    } else {
        BootPath::UserApp
    }
}

/// Inspect and clear the latched reset cause, then decide the boot path.
pub fn boot_disposition(reset: &mut impl ResetController, image_present: bool) -> BootPath {
    let reason = reset.take_reason();
    if reason.watchdog_fired() {
        log::info!("watchdog reset ({:?}), staying in supervisor", reason);
    }
    boot_path(reason, image_present)
}

/// Owns both dogs for the lifetime of the supervisor.
pub struct WatchdogSupervisor<W: Watchdog, S: StopRoute> {
    primary: W,
    stop_route: S,
}

impl<W: Watchdog, S: StopRoute> WatchdogSupervisor<W, S> {
    pub fn new(primary: W, stop_route: S) -> Self {
        WatchdogSupervisor { primary, stop_route }
    }

    /// Start the primary watchdog and bind the auxiliary one to the
    /// APP_STOP channel.
    pub fn arm(&mut self) {
        self.primary.start(WATCHDOG_TIMEOUT_MS);
        self.stop_route.subscribe(Channel::AppStop, WATCHDOG_TIMEOUT_MS);
        log::info!("watchdogs armed ({} ms)", WATCHDOG_TIMEOUT_MS);
    }

    pub fn reload_primary(&mut self) {
        self.primary.reload();
    }
}
