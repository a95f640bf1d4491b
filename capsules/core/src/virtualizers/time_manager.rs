// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! Virtualize one logical timer into a fixed number of independent timeout
//! slots.
//!
//! Each slot is identified by a small integer id. A user reserves an id with
//! `alloc_id` (or lets the manager pick one with `alloc_id_any`), registers a
//! one-shot or periodic timeout on it together with a [`TimeoutClient`], and
//! releases it with `free_id`. The manager keeps the logical timer armed for
//! the earliest pending slot deadline.
//!
//! Unlike the logical timer, the time manager refuses deadlines at or before
//! the current time: firing a callback from inside `register_cb` would re-enter
//! the caller from an unexpected context.
//!
//! `update` must be called once per timer interrupt. It dispatches every slot
//! whose deadline passed, in id order, then re-arms for the new earliest
//! deadline. Callbacks may register or cancel timeouts on any slot, including
//! their own.
//!
//! Usage
//! -----
//!
//! ```rust,ignore
//! let tm = static_init!(
//!     TimeManager<'static, MachineTimer<'static, Freq1MHz>, 8>,
//!     TimeManager::new(ltimer)
//! );
//! ltimer.set_client(tm);
//!
//! let id = tm.alloc_id_any()?;
//! tm.register_cb(id, Timeout::Periodic(NS_IN_S), 0, Some(blinker))?;
//! ```

use core::cell::Cell;

use kernel::debug;
use kernel::hil::time::HardwareTimer;
use kernel::utilities::cells::OptionalCell;
use kernel::ErrorCode;

use crate::ltimer::{LogicalTimer, LogicalTimerClient, TimeError, Timeout};

/// Errors reported by id management.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdError {
    /// The id is already in use.
    AlreadyAllocated,
    /// The id is not in use.
    NotAllocated,
    /// The id is beyond the slot table, or every slot is in use.
    CapacityExceeded,
}

impl From<IdError> for ErrorCode {
    fn from(err: IdError) -> ErrorCode {
        match err {
            IdError::AlreadyAllocated => ErrorCode::ALREADY,
            IdError::NotAllocated => ErrorCode::RESERVE,
            IdError::CapacityExceeded => ErrorCode::NOMEM,
        }
    }
}

/// Callback invoked when a slot's timeout expires.
///
/// Any state the callback needs is carried by the implementer. Returning an
/// error stops the dispatch of the remaining due slots and is reported by
/// `update`.
pub trait TimeoutClient {
    fn timeout_fired(&self, id: usize) -> Result<(), ErrorCode>;
}

impl<F: Fn(usize) -> Result<(), ErrorCode>> TimeoutClient for F {
    fn timeout_fired(&self, id: usize) -> Result<(), ErrorCode> {
        self(id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotState {
    Idle,
    OneShot { deadline: u64 },
    Periodic { next: u64, period: u64 },
}

impl SlotState {
    fn deadline(self) -> Option<u64> {
        match self {
            SlotState::Idle => None,
            SlotState::OneShot { deadline } => Some(deadline),
            SlotState::Periodic { next, .. } => Some(next),
        }
    }
}

struct Slot<'a> {
    allocated: Cell<bool>,
    state: Cell<SlotState>,
    client: OptionalCell<&'a dyn TimeoutClient>,
}

impl<'a> Slot<'a> {
    fn new() -> Slot<'a> {
        Slot {
            allocated: Cell::new(false),
            state: Cell::new(SlotState::Idle),
            client: OptionalCell::empty(),
        }
    }

    fn claim(&self) {
        self.allocated.set(true);
        self.state.set(SlotState::Idle);
        self.client.clear();
    }

    fn release(&self) {
        self.allocated.set(false);
        self.state.set(SlotState::Idle);
        self.client.clear();
    }
}

pub struct TimeManager<'a, T: HardwareTimer<'a>, const NUM_SLOTS: usize> {
    ltimer: &'a LogicalTimer<'a, T>,
    slots: [Slot<'a>; NUM_SLOTS],
}

impl<'a, T: HardwareTimer<'a>, const NUM_SLOTS: usize> TimeManager<'a, T, NUM_SLOTS> {
    pub fn new(ltimer: &'a LogicalTimer<'a, T>) -> TimeManager<'a, T, NUM_SLOTS> {
        TimeManager {
            ltimer,
            slots: core::array::from_fn(|_| Slot::new()),
        }
    }

    pub fn ltimer(&self) -> &'a LogicalTimer<'a, T> {
        self.ltimer
    }

    pub fn now_ns(&self) -> u64 {
        self.ltimer.now_ns()
    }

    /// Reserve slot `id`.
    pub fn alloc_id(&self, id: usize) -> Result<(), IdError> {
        let slot = self.slots.get(id).ok_or(IdError::CapacityExceeded)?;
        if slot.allocated.get() {
            return Err(IdError::AlreadyAllocated);
        }
        slot.claim();
        Ok(())
    }

    /// Reserve the lowest free slot and return its id.
    pub fn alloc_id_any(&self) -> Result<usize, IdError> {
        let (id, slot) = self
            .slots
            .iter()
            .enumerate()
            .find(|(_, slot)| !slot.allocated.get())
            .ok_or(IdError::CapacityExceeded)?;
        slot.claim();
        Ok(id)
    }

    /// Release slot `id`, dropping any timeout registered on it.
    ///
    /// The hardware deadline is left alone; the next `register_cb`,
    /// `deregister_cb` or `update` reconciles it.
    pub fn free_id(&self, id: usize) -> Result<(), IdError> {
        match self.slots.get(id) {
            Some(slot) if slot.allocated.get() => {
                slot.release();
                Ok(())
            }
            _ => Err(IdError::NotAllocated),
        }
    }

    pub fn is_allocated(&self, id: usize) -> bool {
        self.slots.get(id).is_some_and(|slot| slot.allocated.get())
    }

    /// Register a timeout on allocated slot `id`, replacing any timeout
    /// already registered there.
    ///
    /// `Relative(d)` fires at `now + d` and `Absolute(t)` at `t`.
    /// `Periodic(p)` first fires at `start_ns`, or at `now + p` when
    /// `start_ns` is zero, and then every `p` nanoseconds. A first deadline
    /// at or before `now` is rejected with `TimeoutInPast` and the slot is
    /// left untouched.
    pub fn register_cb(
        &self,
        id: usize,
        timeout: Timeout,
        start_ns: u64,
        client: Option<&'a dyn TimeoutClient>,
    ) -> Result<(), TimeError> {
        let slot = self.allocated_slot(id)?;
        let now = self.now_ns();

        let state = match timeout {
            Timeout::Relative(ns) => SlotState::OneShot {
                deadline: now.saturating_add(ns),
            },
            Timeout::Absolute(ns) => SlotState::OneShot { deadline: ns },
            Timeout::Periodic(0) => return Err(TimeError::InvalidPeriod),
            Timeout::Periodic(period) => SlotState::Periodic {
                next: if start_ns != 0 {
                    start_ns
                } else {
                    now.saturating_add(period)
                },
                period,
            },
        };

        if let Some(deadline) = state.deadline() {
            if deadline <= now {
                if kernel::config::CONFIG.trace_timers {
                    debug!("tm: slot {} deadline {} <= now {}, rejected", id, deadline, now);
                }
                return Err(TimeError::TimeoutInPast);
            }
        }

        slot.state.set(state);
        slot.client.insert(client);
        self.rearm()
    }

    /// Cancel the timeout registered on slot `id`. The id stays allocated.
    pub fn deregister_cb(&self, id: usize) -> Result<(), TimeError> {
        let slot = self.allocated_slot(id)?;
        slot.state.set(SlotState::Idle);
        slot.client.clear();
        self.rearm()
    }

    /// Dispatch every slot whose deadline passed, then re-arm the logical
    /// timer for the earliest remaining deadline, or disarm it if none is
    /// left.
    ///
    /// The first callback error aborts the dispatch and is returned. The
    /// hardware is re-armed regardless, so no pending slot is stranded.
    pub fn update(&self) -> Result<(), TimeError> {
        let dispatched = self.dispatch_expired();
        let rearmed = self.rearm();
        dispatched.and(rearmed)
    }

    /// Earliest deadline among all pending slots.
    pub fn next_deadline_ns(&self) -> Option<u64> {
        self.slots
            .iter()
            .filter(|slot| slot.allocated.get())
            .filter_map(|slot| slot.state.get().deadline())
            .min()
    }

    fn allocated_slot(&self, id: usize) -> Result<&Slot<'a>, TimeError> {
        self.slots
            .get(id)
            .filter(|slot| slot.allocated.get())
            .ok_or(TimeError::NotAllocated)
    }

    fn dispatch_expired(&self) -> Result<(), TimeError> {
        // Everything due at this instant fires in this call. Timeouts that
        // callbacks register are due strictly after it.
        let now = self.now_ns();

        for (id, slot) in self.slots.iter().enumerate() {
            if !slot.allocated.get() {
                continue;
            }
            let next_state = match slot.state.get() {
                SlotState::OneShot { deadline } if deadline <= now => SlotState::Idle,
                SlotState::Periodic { next, period } if next <= now => {
                    // Skip whole periods that were missed while keeping the
                    // phase of the original deadline.
                    let missed = (now - next) / period;
                    SlotState::Periodic {
                        next: next.saturating_add(missed.saturating_add(1).saturating_mul(period)),
                        period,
                    }
                }
                _ => continue,
            };
            // Advance before the callback so it can re-register its own slot.
            slot.state.set(next_state);

            if kernel::config::CONFIG.trace_timers {
                debug!("tm: slot {} fired at {}", id, now);
            }
            if let Some(client) = slot.client.get() {
                client
                    .timeout_fired(id)
                    .map_err(|code| TimeError::CallbackFailed { id, code })?;
            }
        }
        Ok(())
    }

    fn rearm(&self) -> Result<(), TimeError> {
        match self.next_deadline_ns() {
            Some(deadline) => self.ltimer.arm_ns(deadline),
            None => self.ltimer.disarm(),
        }
    }
}

impl<'a, T: HardwareTimer<'a>, const NUM_SLOTS: usize> LogicalTimerClient
    for TimeManager<'a, T, NUM_SLOTS>
{
    fn timer_fired(&self) {
        if let Err(err) = self.update() {
            debug!("tm: update failed: {:?}", err);
        }
    }
}

#[cfg(test)]
mod test {
    use super::{IdError, TimeManager, TimeoutClient};
    use crate::ltimer::{LogicalTimer, TimeError, Timeout};
    use crate::test::mock_timer::MockTimer;
    use core::cell::Cell;
    use kernel::hil::time::HardwareTimer;
    use kernel::ErrorCode;

    /// Records the order slots fired in.
    struct Recorder {
        fired: Cell<[usize; 8]>,
        len: Cell<usize>,
        fail_on: Cell<Option<usize>>,
    }

    impl Recorder {
        fn new() -> Self {
            Recorder {
                fired: Cell::new([0; 8]),
                len: Cell::new(0),
                fail_on: Cell::new(None),
            }
        }

        fn count(&self) -> usize {
            self.len.get()
        }

        fn nth(&self, n: usize) -> usize {
            self.fired.get()[n]
        }
    }

    impl TimeoutClient for Recorder {
        fn timeout_fired(&self, id: usize) -> Result<(), ErrorCode> {
            let mut fired = self.fired.get();
            fired[self.len.get()] = id;
            self.fired.set(fired);
            self.len.set(self.len.get() + 1);
            if self.fail_on.get() == Some(id) {
                Err(ErrorCode::FAIL)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn id_lifecycle() {
        let timer = MockTimer::new(0);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 4> = TimeManager::new(&ltimer);

        assert_eq!(tm.alloc_id(2), Ok(()));
        assert!(tm.is_allocated(2));
        assert_eq!(tm.alloc_id(2), Err(IdError::AlreadyAllocated));
        assert_eq!(tm.free_id(2), Ok(()));
        assert_eq!(tm.free_id(2), Err(IdError::NotAllocated));
        assert_eq!(tm.alloc_id(2), Ok(()));

        assert_eq!(tm.alloc_id(4), Err(IdError::CapacityExceeded));
        assert_eq!(tm.free_id(9), Err(IdError::NotAllocated));
        assert!(!tm.is_allocated(9));
    }

    #[test]
    fn alloc_any_picks_lowest_free_id() {
        let timer = MockTimer::new(0);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 3> = TimeManager::new(&ltimer);

        tm.alloc_id(0).unwrap();
        assert_eq!(tm.alloc_id_any(), Ok(1));
        assert_eq!(tm.alloc_id_any(), Ok(2));
        assert_eq!(tm.alloc_id_any(), Err(IdError::CapacityExceeded));
        tm.free_id(1).unwrap();
        assert_eq!(tm.alloc_id_any(), Ok(1));
    }

    #[test]
    fn register_requires_allocated_id() {
        let timer = MockTimer::new(0);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 2> = TimeManager::new(&ltimer);

        assert_eq!(
            tm.register_cb(0, Timeout::Relative(10), 0, None),
            Err(TimeError::NotAllocated)
        );
        assert_eq!(
            tm.register_cb(7, Timeout::Relative(10), 0, None),
            Err(TimeError::NotAllocated)
        );
        assert_eq!(tm.deregister_cb(1), Err(TimeError::NotAllocated));
    }

    #[test]
    fn past_deadlines_are_rejected() {
        let timer = MockTimer::new(1_000);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 2> = TimeManager::new(&ltimer);
        tm.alloc_id(0).unwrap();

        assert_eq!(
            tm.register_cb(0, Timeout::Relative(0), 0, None),
            Err(TimeError::TimeoutInPast)
        );
        assert_eq!(
            tm.register_cb(0, Timeout::Absolute(1_000), 0, None),
            Err(TimeError::TimeoutInPast)
        );
        assert_eq!(
            tm.register_cb(0, Timeout::Periodic(100), 500, None),
            Err(TimeError::TimeoutInPast)
        );
        assert_eq!(
            tm.register_cb(0, Timeout::Periodic(0), 0, None),
            Err(TimeError::InvalidPeriod)
        );
        assert_eq!(ErrorCode::from(TimeError::TimeoutInPast), ErrorCode::TIME);

        // Nothing got scheduled.
        assert_eq!(tm.next_deadline_ns(), None);
        assert_eq!(timer.armed_deadline(), None);
    }

    #[test]
    fn rejected_registration_keeps_previous_timeout() {
        let timer = MockTimer::new(100);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 1> = TimeManager::new(&ltimer);
        tm.alloc_id(0).unwrap();

        tm.register_cb(0, Timeout::Relative(50), 0, None).unwrap();
        assert!(tm.register_cb(0, Timeout::Absolute(10), 0, None).is_err());
        assert_eq!(tm.next_deadline_ns(), Some(150));
    }

    #[test]
    fn one_shot_fires_exactly_once() {
        let timer = MockTimer::new(0);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 2> = TimeManager::new(&ltimer);
        let rec = Recorder::new();
        tm.alloc_id(1).unwrap();

        tm.register_cb(1, Timeout::Relative(10_000_000), 0, Some(&rec))
            .unwrap();
        assert_eq!(timer.armed_deadline(), Some(10_000_000));

        timer.set_now(12_000_000);
        assert_eq!(tm.update(), Ok(()));
        assert_eq!(rec.count(), 1);
        assert_eq!(rec.nth(0), 1);

        assert_eq!(tm.update(), Ok(()));
        assert_eq!(tm.update(), Ok(()));
        assert_eq!(rec.count(), 1);
        // Fired one-shots keep their id.
        assert!(tm.is_allocated(1));
        assert_eq!(timer.armed_deadline(), None);
    }

    #[test]
    fn rearms_for_new_minimum() {
        let timer = MockTimer::new(0);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 3> = TimeManager::new(&ltimer);
        let rec = Recorder::new();
        for id in 0..3 {
            tm.alloc_id(id).unwrap();
        }

        tm.register_cb(0, Timeout::Absolute(300), 0, Some(&rec)).unwrap();
        tm.register_cb(1, Timeout::Absolute(100), 0, Some(&rec)).unwrap();
        tm.register_cb(2, Timeout::Absolute(500), 0, Some(&rec)).unwrap();
        assert_eq!(timer.armed_deadline(), Some(100));

        timer.set_now(100);
        tm.update().unwrap();
        assert_eq!(rec.count(), 1);
        assert_eq!(rec.nth(0), 1);
        assert_eq!(timer.armed_deadline(), Some(300));
        assert_eq!(ltimer.armed_deadline_ns(), Some(300));
    }

    #[test]
    fn all_due_slots_fire_in_one_update() {
        let timer = MockTimer::new(0);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 4> = TimeManager::new(&ltimer);
        let rec = Recorder::new();
        for id in 0..4 {
            tm.alloc_id(id).unwrap();
        }

        tm.register_cb(3, Timeout::Absolute(50), 0, Some(&rec)).unwrap();
        tm.register_cb(0, Timeout::Absolute(50), 0, Some(&rec)).unwrap();
        tm.register_cb(2, Timeout::Absolute(40), 0, Some(&rec)).unwrap();
        tm.register_cb(1, Timeout::Absolute(90), 0, Some(&rec)).unwrap();

        timer.set_now(60);
        tm.update().unwrap();
        assert_eq!(rec.count(), 3);
        assert_eq!((rec.nth(0), rec.nth(1), rec.nth(2)), (0, 2, 3));
        assert_eq!(tm.next_deadline_ns(), Some(90));
    }

    #[test]
    fn periodic_keeps_phase_and_skips_missed_periods() {
        let timer = MockTimer::new(0);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 1> = TimeManager::new(&ltimer);
        let rec = Recorder::new();
        tm.alloc_id(0).unwrap();

        tm.register_cb(0, Timeout::Periodic(100), 0, Some(&rec)).unwrap();
        assert_eq!(tm.next_deadline_ns(), Some(100));

        timer.set_now(105);
        tm.update().unwrap();
        assert_eq!(tm.next_deadline_ns(), Some(200));

        // Serviced late, past two more deadlines: one callback, and the next
        // deadline stays on the original grid.
        timer.set_now(420);
        tm.update().unwrap();
        assert_eq!(rec.count(), 2);
        assert_eq!(tm.next_deadline_ns(), Some(500));
        assert_eq!(timer.armed_deadline(), Some(500));
    }

    #[test]
    fn periodic_honours_explicit_start() {
        let timer = MockTimer::new(0);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 1> = TimeManager::new(&ltimer);
        tm.alloc_id(0).unwrap();

        tm.register_cb(0, Timeout::Periodic(100), 30, None).unwrap();
        assert_eq!(tm.next_deadline_ns(), Some(30));
        timer.set_now(30);
        tm.update().unwrap();
        assert_eq!(tm.next_deadline_ns(), Some(130));
    }

    #[test]
    fn interrupt_drives_dispatch() {
        let timer = MockTimer::new(0);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 2> = TimeManager::new(&ltimer);
        let rec = Recorder::new();
        timer.set_timer_client(&ltimer);
        ltimer.set_client(&tm);
        tm.alloc_id(0).unwrap();

        tm.register_cb(0, Timeout::Periodic(1_000), 0, Some(&rec)).unwrap();
        for _ in 0..5 {
            assert!(timer.run_to_deadline());
        }
        assert_eq!(rec.count(), 5);
        assert_eq!(timer.armed_deadline(), Some(6_000));
    }

    #[test]
    fn callback_error_aborts_scan_but_rearms() {
        let timer = MockTimer::new(0);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 3> = TimeManager::new(&ltimer);
        let rec = Recorder::new();
        rec.fail_on.set(Some(0));
        for id in 0..3 {
            tm.alloc_id(id).unwrap();
        }

        tm.register_cb(0, Timeout::Absolute(10), 0, Some(&rec)).unwrap();
        tm.register_cb(1, Timeout::Absolute(10), 0, Some(&rec)).unwrap();
        tm.register_cb(2, Timeout::Absolute(80), 0, Some(&rec)).unwrap();

        timer.set_now(20);
        assert_eq!(
            tm.update(),
            Err(TimeError::CallbackFailed {
                id: 0,
                code: ErrorCode::FAIL
            })
        );
        assert_eq!(rec.count(), 1);
        // Slot 1 was not reached; the timer is armed so it is not lost.
        assert_eq!(tm.next_deadline_ns(), Some(10));
        assert!(timer.is_armed());

        rec.fail_on.set(None);
        timer.advance(1);
        tm.update().unwrap();
        assert_eq!(rec.count(), 2);
        assert_eq!(rec.nth(1), 1);
        assert_eq!(timer.armed_deadline(), Some(80));
    }

    #[test]
    fn hardware_fault_on_rearm_is_reported() {
        let timer = MockTimer::new(0);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 1> = TimeManager::new(&ltimer);
        tm.alloc_id(0).unwrap();

        timer.fail_next_arm(ErrorCode::NODEVICE);
        assert_eq!(
            tm.register_cb(0, Timeout::Relative(10), 0, None),
            Err(TimeError::HardwareFault(ErrorCode::NODEVICE))
        );
    }

    #[test]
    fn free_id_leaves_hardware_until_next_update() {
        let timer = MockTimer::new(0);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 2> = TimeManager::new(&ltimer);
        let rec = Recorder::new();
        tm.alloc_id(0).unwrap();

        tm.register_cb(0, Timeout::Relative(100), 0, Some(&rec)).unwrap();
        tm.free_id(0).unwrap();
        assert_eq!(timer.armed_deadline(), Some(100));

        timer.set_now(100);
        tm.update().unwrap();
        assert_eq!(rec.count(), 0);
        assert_eq!(timer.armed_deadline(), None);
    }

    #[test]
    fn deregister_cancels_and_reconciles() {
        let timer = MockTimer::new(0);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 2> = TimeManager::new(&ltimer);
        tm.alloc_id(0).unwrap();
        tm.alloc_id(1).unwrap();

        tm.register_cb(0, Timeout::Relative(100), 0, None).unwrap();
        tm.register_cb(1, Timeout::Relative(300), 0, None).unwrap();
        assert_eq!(tm.deregister_cb(0), Ok(()));
        assert!(tm.is_allocated(0));
        assert_eq!(timer.armed_deadline(), Some(300));

        assert_eq!(tm.deregister_cb(1), Ok(()));
        assert_eq!(timer.armed_deadline(), None);
    }

    #[test]
    fn disarm_fault_on_last_deregister_is_reported() {
        let timer = MockTimer::new(0);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 1> = TimeManager::new(&ltimer);
        tm.alloc_id(0).unwrap();

        tm.register_cb(0, Timeout::Relative(100), 0, None).unwrap();
        timer.fail_next_disarm(ErrorCode::NODEVICE);
        assert_eq!(
            tm.deregister_cb(0),
            Err(TimeError::HardwareFault(ErrorCode::NODEVICE))
        );
        // The slot itself is cancelled either way.
        assert_eq!(tm.next_deadline_ns(), None);
        assert_eq!(tm.deregister_cb(0), Ok(()));
        assert_eq!(timer.armed_deadline(), None);
    }

    #[test]
    fn disarm_fault_after_last_dispatch_is_reported() {
        let timer = MockTimer::new(0);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 2> = TimeManager::new(&ltimer);
        let rec = Recorder::new();
        tm.alloc_id(1).unwrap();

        tm.register_cb(1, Timeout::Relative(50), 0, Some(&rec)).unwrap();
        timer.set_now(50);
        timer.fail_next_disarm(ErrorCode::BUSY);
        assert_eq!(
            tm.update(),
            Err(TimeError::HardwareFault(ErrorCode::BUSY))
        );
        assert_eq!(rec.count(), 1);
    }

    #[test]
    fn closures_carry_their_own_state() {
        let timer = MockTimer::new(0);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 2> = TimeManager::new(&ltimer);
        let ticks = Cell::new(0usize);
        let count = |_id: usize| -> Result<(), ErrorCode> {
            ticks.set(ticks.get() + 1);
            Ok(())
        };
        tm.alloc_id(1).unwrap();

        tm.register_cb(1, Timeout::Periodic(10), 0, Some(&count)).unwrap();
        for now in [10, 20, 30] {
            timer.set_now(now);
            tm.update().unwrap();
        }
        assert_eq!(ticks.get(), 3);
    }

    /// Re-registers its own slot from inside the callback.
    struct Rescheduler<'a, 'b> {
        tm: &'b TimeManager<'a, MockTimer<'a>, 2>,
        remaining: Cell<usize>,
    }

    impl TimeoutClient for Rescheduler<'_, '_> {
        fn timeout_fired(&self, id: usize) -> Result<(), ErrorCode> {
            let left = self.remaining.get();
            if left > 0 {
                self.remaining.set(left - 1);
                self.tm
                    .register_cb(id, Timeout::Relative(25), 0, None)
                    .map_err(ErrorCode::from)?;
            }
            Ok(())
        }
    }

    #[test]
    fn callback_can_reschedule_its_slot() {
        let timer = MockTimer::new(0);
        let ltimer = LogicalTimer::new(&timer);
        let tm: TimeManager<_, 2> = TimeManager::new(&ltimer);
        let resched = Rescheduler {
            tm: &tm,
            remaining: Cell::new(1),
        };
        tm.alloc_id(0).unwrap();

        tm.register_cb(0, Timeout::Relative(10), 0, Some(&resched))
            .unwrap();
        timer.set_now(10);
        tm.update().unwrap();
        assert_eq!(tm.next_deadline_ns(), Some(35));
        assert_eq!(timer.armed_deadline(), Some(35));
    }
}
