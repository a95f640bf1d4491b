// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! Hardware side of the simulated compare timer.
//!
//! The chip driver (`mtimer::MachineTimer`) programs an ordinary register
//! block in host memory. `SimPeripheral` plays the peripheral: every `tick`
//! advances the counter by a fixed number of ticks while `CTRL::ENABLE` is
//! set, and latches `INTR::PENDING` once the counter reaches the compare
//! value while `CTRL::INTEN` is set.

use kernel::hil::time::Freq1MHz;
use kernel::utilities::registers::interfaces::{ReadWriteable, Readable, Writeable};
use kernel::utilities::StaticRef;
use mtimer::mtimer::{MachineTimer, MachineTimerRegisters, CTRL, INTR};

/// The chip driver as instantiated on this board.
pub type SimTimer<'a> = MachineTimer<'a, Freq1MHz>;

pub struct SimPeripheral {
    registers: StaticRef<MachineTimerRegisters>,
    step: u64,
}

impl SimPeripheral {
    pub const fn new(registers: StaticRef<MachineTimerRegisters>, step: u64) -> SimPeripheral {
        SimPeripheral { registers, step }
    }

    /// Let one step of simulated time pass.
    pub fn tick(&self) {
        let regs = self.registers;
        if !regs.ctrl.is_set(CTRL::ENABLE) {
            return;
        }

        let counter = ((regs.value_high.get() as u64) << 32) | regs.value_low.get() as u64;
        let counter = counter.wrapping_add(self.step);
        regs.value_high.set((counter >> 32) as u32);
        regs.value_low.set(counter as u32);

        let compare = ((regs.compare_high.get() as u64) << 32) | regs.compare_low.get() as u64;
        if regs.ctrl.is_set(CTRL::INTEN) && counter >= compare {
            regs.intr.modify(INTR::PENDING::SET);
        }
    }

    /// Whether the interrupt line is raised.
    pub fn interrupt_pending(&self) -> bool {
        self.registers.ctrl.is_set(CTRL::INTEN) && self.registers.intr.is_set(INTR::PENDING)
    }
}

#[cfg(test)]
mod test {
    use super::{SimPeripheral, SimTimer};
    use kernel::hil::time::{HardwareTimer, Time};
    use kernel::utilities::StaticRef;
    use mtimer::mtimer::MachineTimerRegisters;

    #[test]
    fn counter_only_runs_once_enabled() {
        // SAFETY: all zeroes is the reset state of the register block, and
        // `regs` outlives every user of `base`.
        let regs: MachineTimerRegisters = unsafe { core::mem::zeroed() };
        let base = unsafe { StaticRef::new(&regs as *const MachineTimerRegisters) };
        let timer = SimTimer::new(base);
        let sim = SimPeripheral::new(base, 10);

        sim.tick();
        assert_eq!(timer.now(), 0);
        timer.enable();
        sim.tick();
        sim.tick();
        assert_eq!(timer.now(), 20);
    }

    #[test]
    fn compare_match_raises_interrupt_line() {
        let regs: MachineTimerRegisters = unsafe { core::mem::zeroed() };
        let base = unsafe { StaticRef::new(&regs as *const MachineTimerRegisters) };
        let timer = SimTimer::new(base);
        let sim = SimPeripheral::new(base, 10);
        timer.enable();

        timer.arm(25).unwrap();
        sim.tick();
        sim.tick();
        assert!(!sim.interrupt_pending());
        sim.tick();
        assert!(sim.interrupt_pending());

        timer.disarm().unwrap();
        assert!(!sim.interrupt_pending());
    }
}
