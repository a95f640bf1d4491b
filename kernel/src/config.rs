// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Data structure for storing compile-time configuration options in the kernel.
//!
//! The rationale for configuration based on a `const` object is twofold.
//!
//! - In theory, Cargo features could be used for boolean-based configuration.
//!   However, these features are generally error-prone for non-trivial use
//!   cases. First, they are globally enabled as long as a dependency
//!   relationship requires a feature (even for other dependency relationships
//!   that do not want the feature). Second, code gated by a non-enabled feature
//!   isn't even type-checked by the compiler, and therefore we can end up with
//!   broken features due to refactoring code (if these features aren't tested
//!   during the refactoring), or to incompatible feature combinations.
//!
//! - Cargo features can only contain bits. On the other hand, a constant value
//!   can contain arbitrary types, which allow configuration based on integers,
//!   strings, or even more complex values.
//!
//! With a typed `const` configuration, all code paths are type-checked by the
//! compiler - even those that end up disabled - which greatly reduces the risks
//! of breaking a feature or combination of features because they are disabled
//! in tests.

/// Data structure holding compile-time configuration options.
///
/// To change the configuration, modify the relevant values in the `CONFIG`
/// constant object defined at the end of this file.
pub struct Config {
    /// Whether the logical timer and the time manager should trace their
    /// events to the debug output.
    ///
    /// If enabled, every hardware arm and disarm, every dispatched timeout and
    /// every rejected registration is printed together with the timestamp at
    /// which it happened. This is noisy and perturbs short timeouts, so it is
    /// off by default.
    pub trace_timers: bool,

    /// Whether the timer test suite prints a line per iteration (measured
    /// timeout latency, tick timestamps).
    pub debug_timer_tests: bool,

    /// Number of timeout slots boards reserve for their time manager.
    pub default_timer_slots: usize,
}

/// A unique instance of `Config` where compile-time configuration options are
/// defined. Notably, this is the only location in the kernel where we permit
/// `#[cfg(x)]` to be used to configure code based on Cargo features.
pub const CONFIG: Config = Config {
    trace_timers: cfg!(feature = "trace_timers"),
    debug_timer_tests: !cfg!(feature = "quiet_timer_tests"),
    default_timer_slots: 8,
};
