// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Hardware timer adapter for a 64-bit compare timer.
//!
//! The peripheral has a free-running counter split over two 32-bit registers,
//! a 64-bit compare register and a pending flag. While `CTRL::INTEN` is set
//! the peripheral latches `INTR::PENDING` whenever the counter is greater
//! than or equal to the compare value; software clears the flag by writing
//! zero to it. Because the comparison is `>=`, a compare value that is
//! already behind the counter pends the interrupt on the next tick, which is
//! what makes deadlines in the past safe to arm.

use core::marker::PhantomData;

use kernel::hil::time::{Frequency, HardwareTimer, Time, TimerInterruptClient};
use kernel::utilities::cells::OptionalCell;
use kernel::utilities::registers::interfaces::{ReadWriteable, Readable, Writeable};
use kernel::utilities::registers::{register_bitfields, register_structs, ReadWrite};
use kernel::utilities::StaticRef;
use kernel::ErrorCode;

register_structs! {
    pub MachineTimerRegisters {
        /// Bits 31:0 of the counter
        (0x00 => pub value_low: ReadWrite<u32>),
        /// Bits 63:32 of the counter
        (0x04 => pub value_high: ReadWrite<u32>),
        /// Bits 31:0 of the compare value
        (0x08 => pub compare_low: ReadWrite<u32>),
        /// Bits 63:32 of the compare value
        (0x0C => pub compare_high: ReadWrite<u32>),
        /// Counter and interrupt enables
        (0x10 => pub ctrl: ReadWrite<u32, CTRL::Register>),
        /// Raw interrupt status
        (0x14 => pub intr: ReadWrite<u32, INTR::Register>),
        (0x18 => @END),
    }
}

register_bitfields![u32,
    pub CTRL [
        /// Counter runs while set
        ENABLE OFFSET(0) NUMBITS(1) [],
        /// Compare match raises the interrupt while set
        INTEN OFFSET(1) NUMBITS(1) []
    ],
    pub INTR [
        /// Compare matched; write zero to clear
        PENDING OFFSET(0) NUMBITS(1) []
    ]
];

/// Compare value that is never reached.
const COMPARE_PARKED: u64 = u64::MAX;

pub struct MachineTimer<'a, F: Frequency> {
    registers: StaticRef<MachineTimerRegisters>,
    client: OptionalCell<&'a dyn TimerInterruptClient>,
    _freq: PhantomData<F>,
}

impl<'a, F: Frequency> MachineTimer<'a, F> {
    pub const fn new(base: StaticRef<MachineTimerRegisters>) -> Self {
        MachineTimer {
            registers: base,
            client: OptionalCell::empty(),
            _freq: PhantomData,
        }
    }

    /// Start the counter with no deadline armed.
    pub fn enable(&self) {
        self.registers.ctrl.modify(CTRL::INTEN::CLEAR);
        self.write_compare(COMPARE_PARKED);
        self.registers.intr.modify(INTR::PENDING::CLEAR);
        self.registers.ctrl.modify(CTRL::ENABLE::SET);
    }

    pub fn handle_interrupt(&self) {
        if !self.registers.intr.is_set(INTR::PENDING) {
            // Spurious, or discarded by a `disarm` racing the interrupt.
            return;
        }
        let _ = self.ack_interrupt();
        // The comparator is level sensitive; park it so the match does not
        // pend again before the client re-arms.
        self.write_compare(COMPARE_PARKED);

        self.client.map(|client| client.fired());
    }

    fn write_compare(&self, val: u64) {
        let high = (val >> 32) as u32;
        let low = (val & 0xffff_ffff) as u32;

        // Park the low half first so that no intermediate value of the
        // 64-bit compare register can be below the counter.
        self.registers.compare_low.set(0xFFFF_FFFF);
        self.registers.compare_high.set(high);
        self.registers.compare_low.set(low);
    }

    fn read_compare(&self) -> u64 {
        let high = self.registers.compare_high.get() as u64;
        (high << 32) | self.registers.compare_low.get() as u64
    }
}

impl<F: Frequency> Time for MachineTimer<'_, F> {
    type Frequency = F;

    fn now(&self) -> u64 {
        read_counter(
            || self.registers.value_low.get(),
            || self.registers.value_high.get(),
        )
    }
}

/// Read a 64-bit counter exposed as two 32-bit halves without tearing.
///
/// If the low half wrapped between the two low reads, the high half read in
/// between may be stale and is read again.
fn read_counter(mut low: impl FnMut() -> u32, mut high: impl FnMut() -> u32) -> u64 {
    let first_low = low();
    let mut hi = high();
    let second_low = low();
    if second_low < first_low {
        // Wraparound
        hi = high();
    }
    ((hi as u64) << 32) | second_low as u64
}

impl<'a, F: Frequency> HardwareTimer<'a> for MachineTimer<'a, F> {
    fn set_timer_client(&self, client: &'a dyn TimerInterruptClient) {
        self.client.set(client);
    }

    fn arm(&self, deadline: u64) -> Result<(), ErrorCode> {
        if !self.registers.ctrl.is_set(CTRL::ENABLE) {
            return Err(ErrorCode::OFF);
        }

        self.registers.ctrl.modify(CTRL::INTEN::CLEAR);
        let earliest = self.now().saturating_add(self.minimum_dt());
        let expire = if deadline < earliest {
            earliest
        } else {
            deadline
        };
        self.write_compare(expire);
        self.registers.ctrl.modify(CTRL::INTEN::SET);
        Ok(())
    }

    fn get_deadline(&self) -> u64 {
        self.read_compare()
    }

    fn disarm(&self) -> Result<(), ErrorCode> {
        self.registers.ctrl.modify(CTRL::INTEN::CLEAR);
        self.write_compare(COMPARE_PARKED);
        self.registers.intr.modify(INTR::PENDING::CLEAR);
        Ok(())
    }

    fn ack_interrupt(&self) -> Result<(), ErrorCode> {
        self.registers.intr.modify(INTR::PENDING::CLEAR);
        Ok(())
    }

    fn is_armed(&self) -> bool {
        self.registers.ctrl.is_set(CTRL::INTEN) && self.read_compare() != COMPARE_PARKED
    }

    fn minimum_dt(&self) -> u64 {
        1
    }
}
