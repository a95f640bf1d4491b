// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Hardware agnostic interfaces for time and timers within the kernel.
//!
//! The interfaces in this module model a single physical compare timer: a
//! free-running 64-bit counter plus one programmable deadline register that
//! raises an interrupt once the counter reaches it. Higher layers (the
//! logical timer and the time manager in `capsules_core`) build relative,
//! absolute and periodic timeouts, and the multiplexing of many timeouts, on
//! top of this one deadline.
//!
//! Counter values are in hardware ticks. The `Frequency` associated type lets
//! clients portably convert ticks to nanoseconds with [`ConvertTicks`].

use crate::ErrorCode;

pub const NS_IN_MS: u64 = 1_000_000;
pub const NS_IN_S: u64 = 1_000_000_000;

/// Trait to represent clock frequency in Hz
///
/// This trait is used as an associated type for `Time` so clients can portably
/// convert native cycles to real-time values.
pub trait Frequency {
    /// Returns frequency in Hz.
    fn frequency() -> u32;
}

/// 1GHz `Frequency`, one tick per nanosecond.
#[derive(Debug)]
pub struct Freq1GHz;
impl Frequency for Freq1GHz {
    fn frequency() -> u32 {
        1_000_000_000
    }
}

/// 1MHz `Frequency`
#[derive(Debug)]
pub struct Freq1MHz;
impl Frequency for Freq1MHz {
    fn frequency() -> u32 {
        1_000_000
    }
}

/// 32.768KHz `Frequency`
#[derive(Debug)]
pub struct Freq32KHz;
impl Frequency for Freq32KHz {
    fn frequency() -> u32 {
        32768
    }
}

/// An object that tracks the passage of time.
pub trait Time {
    type Frequency: Frequency;

    /// Returns the current value of the free-running counter, in ticks.
    ///
    /// Successive calls never return a smaller value. Handling the wrap of
    /// the 64-bit counter is left to the platform.
    fn now(&self) -> u64;
}

/// Conversion between hardware ticks and nanoseconds.
///
/// Implemented for every `Time`. Tick-to-nanosecond conversion rounds down,
/// nanosecond-to-tick conversion rounds up, so that a deadline converted to
/// ticks never lands before the requested instant. Both saturate at
/// `u64::MAX` instead of overflowing.
pub trait ConvertTicks {
    /// Returns the number of nanoseconds elapsed over `ticks`.
    fn ticks_to_ns(&self, ticks: u64) -> u64;

    /// Returns the smallest tick count covering at least `ns` nanoseconds.
    fn ns_to_ticks(&self, ns: u64) -> u64;

    /// Returns the current time in nanoseconds.
    fn now_ns(&self) -> u64;
}

impl<T: Time + ?Sized> ConvertTicks for T {
    fn ticks_to_ns(&self, ticks: u64) -> u64 {
        let hz = <T as Time>::Frequency::frequency() as u128;
        let ns = (ticks as u128 * NS_IN_S as u128) / hz;
        ns.min(u64::MAX as u128) as u64
    }

    fn ns_to_ticks(&self, ns: u64) -> u64 {
        let hz = <T as Time>::Frequency::frequency() as u128;
        let ticks = (ns as u128 * hz).div_ceil(NS_IN_S as u128);
        ticks.min(u64::MAX as u128) as u64
    }

    fn now_ns(&self) -> u64 {
        self.ticks_to_ns(self.now())
    }
}

/// A physical timer with a single programmable deadline.
///
/// Implementers raise an interrupt once the counter reaches the armed
/// deadline, acknowledge it in their interrupt handler and then signal the
/// [`TimerInterruptClient`].
///
/// The central contract is that an armed deadline is never lost: arming a
/// deadline that is at or before `now()` must produce an interrupt within
/// one tick (typically `minimum_dt()` ticks), not silently wait for the
/// counter to wrap.
pub trait HardwareTimer<'a>: Time {
    /// Set the client for interrupt events.
    fn set_timer_client(&self, client: &'a dyn TimerInterruptClient);

    /// Program the compare register so that an interrupt is raised at or
    /// after `deadline` ticks.
    ///
    /// Replaces any previously armed deadline. Deadlines in the past are
    /// clamped to fire as soon as the hardware allows.
    fn arm(&self, deadline: u64) -> Result<(), ErrorCode>;

    /// Returns the deadline currently programmed in hardware, in ticks.
    ///
    /// The value is meaningless if `is_armed()` returns false.
    fn get_deadline(&self) -> u64;

    /// Suppress interrupts until the next call to `arm`.
    ///
    /// An interrupt that was already pending when `disarm` is called is
    /// discarded.
    fn disarm(&self) -> Result<(), ErrorCode>;

    /// Clear the pending interrupt flag.
    ///
    /// Must be called exactly once per received interrupt, before the timer
    /// is armed again, or the interrupt may trigger again spuriously.
    fn ack_interrupt(&self) -> Result<(), ErrorCode>;

    /// Returns whether a deadline is currently armed.
    fn is_armed(&self) -> bool;

    /// Returns the smallest distance, in ticks, between `now()` and a
    /// deadline that the hardware can reliably fire on.
    fn minimum_dt(&self) -> u64;
}

/// A client of an implementer of the [`HardwareTimer`] trait.
pub trait TimerInterruptClient {
    /// Callback signaled after the hardware timer raised (and the chip
    /// acknowledged) its interrupt.
    fn fired(&self);
}
