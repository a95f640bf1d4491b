// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Core timer kernel.
//!
//! The kernel crate holds the Hardware Interface Layer (HIL) definitions for
//! counter and compare-timer peripherals, the standard error type shared by
//! chips and capsules, the `debug!` logging facility and the compile-time
//! configuration. Chips implement the HIL traits, capsules build the logical
//! timer and the time manager on top of them, and boards wire everything
//! together.
//!
//! Most `unsafe` code is in this kernel crate.

#![no_std]
#![warn(unreachable_pub)]

pub mod config;
#[macro_use]
pub mod debug;
pub mod errorcode;
pub mod hil;
pub mod utilities;

pub use crate::errorcode::ErrorCode;
