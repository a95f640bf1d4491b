// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! Board file for the host timer simulation.
//!
//! Instantiates the compare timer chip driver on a register block in host
//! memory, stacks the logical timer and the time manager on it, and runs the
//! timer test suite against the result. Exits non-zero if any case fails.

use core::ptr::addr_of_mut;

use capsules_core::ltimer::LogicalTimer;
use capsules_core::test::periodic_callback::TestPeriodicCallback;
use capsules_core::virtualizers::time_manager::TimeManager;
use kernel::hil::time::HardwareTimer;
use kernel::utilities::StaticRef;
use kernel::{debug, static_init};
use mtimer::mtimer::MachineTimerRegisters;

use crate::env::{DriverEnv, SimLogicalTimer, SimTimeManager};
use crate::sim::{SimPeripheral, SimTimer};

mod env;
mod io;
mod sim;

/// Counter ticks that pass per simulation step. At 1MHz this is 10us.
const SIM_STEP_TICKS: u64 = 10;

/// Simulation steps after which a wait for a timer interrupt gives up. This
/// is ten simulated seconds, longer than any timeout in the suite.
const MAX_WAIT_STEPS: u64 = 1_000_000;

fn main() {
    // SAFETY: runs once, before anything prints.
    unsafe {
        kernel::debug::set_debug_writer(&mut *addr_of_mut!(io::WRITER));
    }

    // SAFETY: `main` runs once, so every `static_init!` buffer is written
    // once. All zeroes is the reset state of the register block.
    let (sim, mtimer, ltimer, tm, periodic_callback) = unsafe {
        let registers = static_init!(MachineTimerRegisters, core::mem::zeroed());
        let base = StaticRef::new(registers as *const MachineTimerRegisters);

        let sim = static_init!(SimPeripheral, SimPeripheral::new(base, SIM_STEP_TICKS));
        let mtimer = static_init!(SimTimer<'static>, SimTimer::new(base));
        let ltimer = static_init!(SimLogicalTimer<'static>, LogicalTimer::new(mtimer));
        let tm = static_init!(SimTimeManager<'static>, TimeManager::new(ltimer));
        let periodic_callback = static_init!(
            TestPeriodicCallback<'static>,
            TestPeriodicCallback::new(timer_tests::PERIODIC_CALLBACK_GOAL)
        );
        (&*sim, &*mtimer, &*ltimer, &*tm, &*periodic_callback)
    };

    mtimer.set_timer_client(ltimer);
    mtimer.enable();

    let env = DriverEnv::new(sim, mtimer, ltimer, tm, periodic_callback, MAX_WAIT_STEPS);

    debug!("Timer simulation board, {} timer slots", env::NUM_TIMER_SLOTS);
    let failures = timer_tests::run_all(&env);
    if failures > 0 {
        std::process::exit(1);
    }
}
