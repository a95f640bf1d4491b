// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! Logical timer: relative, absolute and periodic timeouts over one hardware
//! compare timer.
//!
//! The logical timer is the single source of truth for the current time and
//! for the deadline that is programmed in hardware. It speaks nanoseconds to
//! its users and converts to hardware ticks with
//! [`ConvertTicks`](kernel::hil::time::ConvertTicks).
//!
//! A deadline at or before the current time is not an error here: it is
//! handed to the hardware, which raises the interrupt within one tick. The
//! time manager layered on top takes the opposite stance and rejects such
//! deadlines at registration.
//!
//! Periodic timeouts are free running: on every interrupt the next deadline
//! is `now + period`, so jitter in servicing the interrupt accumulates.
//!
//! Usage
//! -----
//!
//! ```rust,ignore
//! let ltimer = static_init!(
//!     LogicalTimer<'static, MachineTimer<'static, Freq1MHz>>,
//!     LogicalTimer::new(mtimer)
//! );
//! mtimer.set_timer_client(ltimer);
//! ltimer.set_timeout(Timeout::Periodic(NS_IN_MS))?;
//! ```

use core::cell::Cell;

use kernel::{debug, debug_verbose};
use kernel::hil::time::{ConvertTicks, HardwareTimer, TimerInterruptClient};
use kernel::utilities::cells::OptionalCell;
use kernel::ErrorCode;

/// What a timeout request means.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timeout {
    /// Fire once, this many nanoseconds from now.
    Relative(u64),
    /// Fire once, when the monotonic clock reaches this many nanoseconds.
    Absolute(u64),
    /// Fire repeatedly, every this many nanoseconds.
    Periodic(u64),
}

/// Errors reported by timeout operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeError {
    /// The requested deadline is at or before the current time.
    TimeoutInPast,
    /// A periodic timeout was requested with a zero period.
    InvalidPeriod,
    /// The timer id has not been allocated.
    NotAllocated,
    /// The hardware timer refused an operation.
    HardwareFault(ErrorCode),
    /// A timeout callback returned an error, aborting dispatch.
    CallbackFailed { id: usize, code: ErrorCode },
}

impl From<TimeError> for ErrorCode {
    fn from(err: TimeError) -> ErrorCode {
        match err {
            TimeError::TimeoutInPast => ErrorCode::TIME,
            TimeError::InvalidPeriod => ErrorCode::INVAL,
            TimeError::NotAllocated => ErrorCode::RESERVE,
            TimeError::HardwareFault(code) => code,
            TimeError::CallbackFailed { code, .. } => code,
        }
    }
}

/// Receives an upcall every time the logical timer's deadline passed.
pub trait LogicalTimerClient {
    fn timer_fired(&self);
}

pub struct LogicalTimer<'a, T: HardwareTimer<'a>> {
    timer: &'a T,
    /// Deadline programmed in hardware, in nanoseconds.
    armed_deadline: Cell<Option<u64>>,
    /// Set while in periodic mode.
    period: Cell<Option<u64>>,
    /// Interrupts delivered and not yet consumed with `take_interrupt`.
    /// Saturates, since nothing consumes them while a client is installed.
    interrupts: Cell<usize>,
    client: OptionalCell<&'a dyn LogicalTimerClient>,
}

impl<'a, T: HardwareTimer<'a>> LogicalTimer<'a, T> {
    pub fn new(timer: &'a T) -> LogicalTimer<'a, T> {
        LogicalTimer {
            timer,
            armed_deadline: Cell::new(None),
            period: Cell::new(None),
            interrupts: Cell::new(0),
            client: OptionalCell::empty(),
        }
    }

    pub fn set_client(&self, client: &'a dyn LogicalTimerClient) {
        self.client.set(client);
    }

    /// Monotonic time since the counter started, in nanoseconds.
    pub fn now_ns(&self) -> u64 {
        self.timer.now_ns()
    }

    /// Arm the timer for `timeout`, replacing whatever was armed before.
    ///
    /// Relative and absolute timeouts leave periodic mode. A deadline that
    /// has already passed fires on the next hardware tick.
    pub fn set_timeout(&self, timeout: Timeout) -> Result<(), TimeError> {
        let now = self.now_ns();
        let (deadline, period) = match timeout {
            Timeout::Relative(ns) => (now.saturating_add(ns), None),
            Timeout::Absolute(ns) => (ns, None),
            Timeout::Periodic(0) => return Err(TimeError::InvalidPeriod),
            Timeout::Periodic(period) => (now.saturating_add(period), Some(period)),
        };

        if kernel::config::CONFIG.trace_timers && deadline <= now {
            debug!("ltimer: deadline {} <= now {}, firing next tick", deadline, now);
        }

        self.arm_ns(deadline)?;
        self.period.set(period);
        Ok(())
    }

    /// Program the hardware for an absolute deadline in nanoseconds, without
    /// changing periodic mode.
    pub fn arm_ns(&self, deadline: u64) -> Result<(), TimeError> {
        let ticks = self.timer.ns_to_ticks(deadline);
        self.timer.arm(ticks).map_err(TimeError::HardwareFault)?;
        self.armed_deadline.set(Some(deadline));
        if kernel::config::CONFIG.trace_timers {
            debug!("ltimer: armed {} ns (tick {})", deadline, ticks);
        }
        Ok(())
    }

    /// Stop the hardware timer and leave periodic mode.
    pub fn disarm(&self) -> Result<(), TimeError> {
        self.timer.disarm().map_err(TimeError::HardwareFault)?;
        self.armed_deadline.set(None);
        self.period.set(None);
        if kernel::config::CONFIG.trace_timers {
            debug!("ltimer: disarmed");
        }
        Ok(())
    }

    /// Return to the state right after construction: disarmed, not
    /// periodic, no interrupts outstanding. Calling it twice is harmless.
    pub fn reset(&self) -> Result<(), TimeError> {
        self.interrupts.set(0);
        self.disarm()
    }

    /// Consume one delivered interrupt. Returns `false` if none is
    /// outstanding.
    pub fn take_interrupt(&self) -> bool {
        let pending = self.interrupts.get();
        if pending == 0 {
            false
        } else {
            self.interrupts.set(pending - 1);
            true
        }
    }

    pub fn pending_interrupts(&self) -> usize {
        self.interrupts.get()
    }

    pub fn armed_deadline_ns(&self) -> Option<u64> {
        self.armed_deadline.get()
    }

    pub fn period_ns(&self) -> Option<u64> {
        self.period.get()
    }
}

impl<'a, T: HardwareTimer<'a>> TimerInterruptClient for LogicalTimer<'a, T> {
    fn fired(&self) {
        match self.period.get() {
            Some(period) => {
                let next = self.now_ns().saturating_add(period);
                if let Err(err) = self.arm_ns(next) {
                    debug_verbose!("ltimer: periodic re-arm failed: {:?}", err);
                    // Nothing is ticking any more.
                    self.armed_deadline.set(None);
                    self.period.set(None);
                }
            }
            None => self.armed_deadline.set(None),
        }

        self.interrupts.set(self.interrupts.get().saturating_add(1));
        self.client.map(|client| client.timer_fired());
    }
}
