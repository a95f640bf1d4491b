// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! The context every timer test runs in.
//!
//! `DriverEnv` bundles the simulated peripheral with the timer stack built on
//! it and offers the handful of conveniences the test cases share: reading
//! the clock, arming a timeout on the well-known `TIMER_ID` slot, resetting
//! the logical timer and blocking until the next timer interrupt.

use capsules_core::ltimer::{LogicalTimer, TimeError, Timeout};
use capsules_core::test::periodic_callback::TestPeriodicCallback;
use capsules_core::virtualizers::time_manager::TimeManager;
use kernel::debug_verbose;
use kernel::ErrorCode;

use crate::sim::{SimPeripheral, SimTimer};

/// Time manager slot reserved for the test driver's own timeouts.
pub const TIMER_ID: usize = 0;

/// Number of time manager slots on this board.
pub const NUM_TIMER_SLOTS: usize = kernel::config::CONFIG.default_timer_slots;

pub type SimLogicalTimer<'a> = LogicalTimer<'a, SimTimer<'a>>;
pub type SimTimeManager<'a> = TimeManager<'a, SimTimer<'a>, NUM_TIMER_SLOTS>;

pub struct DriverEnv<'a> {
    sim: &'a SimPeripheral,
    mtimer: &'a SimTimer<'a>,
    ltimer: &'a SimLogicalTimer<'a>,
    tm: &'a SimTimeManager<'a>,
    periodic_callback: &'a TestPeriodicCallback<'a>,
    /// Give up waiting for an interrupt after this many simulation steps.
    max_wait_steps: u64,
}

impl<'a> DriverEnv<'a> {
    pub fn new(
        sim: &'a SimPeripheral,
        mtimer: &'a SimTimer<'a>,
        ltimer: &'a SimLogicalTimer<'a>,
        tm: &'a SimTimeManager<'a>,
        periodic_callback: &'a TestPeriodicCallback<'a>,
        max_wait_steps: u64,
    ) -> DriverEnv<'a> {
        DriverEnv {
            sim,
            mtimer,
            ltimer,
            tm,
            periodic_callback,
            max_wait_steps,
        }
    }

    pub fn ltimer(&self) -> &'a SimLogicalTimer<'a> {
        self.ltimer
    }

    pub fn tm(&self) -> &'a SimTimeManager<'a> {
        self.tm
    }

    /// Callback capsule for the periodic time manager test. It lives as long
    /// as the board so it can be registered with the time manager.
    pub fn periodic_callback(&self) -> &'a TestPeriodicCallback<'a> {
        self.periodic_callback
    }

    /// Current time in nanoseconds. Every reading lets one simulation step
    /// pass.
    pub fn timestamp(&self) -> u64 {
        self.sim.tick();
        self.ltimer.now_ns()
    }

    /// Arm `timeout` on `TIMER_ID`, without a callback. `TIMER_ID` must be
    /// allocated.
    pub fn timeout(&self, timeout: Timeout) -> Result<(), TimeError> {
        self.tm.register_cb(TIMER_ID, timeout, 0, None)
    }

    pub fn timer_reset(&self) -> Result<(), TimeError> {
        self.ltimer.reset()
    }

    /// Run the simulation until the logical timer reports an interrupt,
    /// then consume it.
    ///
    /// Fails with `ErrorCode::FAIL` if nothing fires within
    /// `max_wait_steps` steps, which means a timeout was lost.
    pub fn wait_for_timer_interrupt(&self) -> Result<(), ErrorCode> {
        for _ in 0..self.max_wait_steps {
            if self.ltimer.take_interrupt() {
                return Ok(());
            }
            self.sim.tick();
            self.service_pending_interrupts();
        }
        if self.ltimer.take_interrupt() {
            Ok(())
        } else {
            debug_verbose!("no timer interrupt within {} steps", self.max_wait_steps);
            Err(ErrorCode::FAIL)
        }
    }

    /// Release everything a failed test case may have left behind.
    pub fn cleanup(&self) {
        if self.tm.is_allocated(TIMER_ID) {
            let _ = self.tm.free_id(TIMER_ID);
        }
        let _ = self.ltimer.reset();
    }

    fn service_pending_interrupts(&self) {
        if self.sim.interrupt_pending() {
            self.mtimer.handle_interrupt();
        }
    }
}
