// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Driver for a generic 64-bit compare timer peripheral.

#![no_std]
#![crate_name = "mtimer"]
#![crate_type = "rlib"]

pub mod mtimer;
