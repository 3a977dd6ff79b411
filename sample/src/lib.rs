#![cfg_attr(not(test), no_std)]

//! Sample user application.
//!
//! Lives entirely in the non-secure world and talks to the device through
//! the gateway-call surface: it counts, logs every tenth count, pings the
//! gateway every twentieth, drains received packets, and keeps the primary
//! watchdog fed. Doubles as living documentation of [`UserApi`].

use swarmit_bootloader::api::UserApi;

pub struct SampleApp {
    counter: u32,
    received: u32,
}

impl SampleApp {
    pub const fn new() -> Self {
        SampleApp { counter: 0, received: 0 }
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Bytes of user data delivered so far.
    pub fn received(&self) -> u32 {
        self.received
    }

    /// One iteration of the application main loop.
    pub fn step(&mut self, api: &mut impl UserApi) {
        self.counter += 1;

        if self.counter % 10 == 0 {
            if api.log_data(&self.counter.to_le_bytes()).is_err() {
                log::warn!("log record rejected");
            }
        }
        if self.counter % 20 == 0 {
            let _ = api.send_data_packet(b"ping");
        }

        let mut received = 0u32;
        api.ipc_isr(&mut |payload| received += payload.len() as u32);
        self.received += received;

        api.reload_wdt();
    }

    pub fn run_for(&mut self, api: &mut impl UserApi, iterations: u32) {
        for _ in 0..iterations {
            self.step(api);
        }
    }
}

impl Default for SampleApp {
    fn default() -> Self {
        Self::new()
    }
}
