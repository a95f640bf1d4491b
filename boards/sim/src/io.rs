// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

use std::io::Write;

use kernel::debug::IoWrite;

/// Debug output for the host board, written to stderr.
pub struct Writer {}

pub static mut WRITER: Writer = Writer {};

impl IoWrite for Writer {
    fn write(&mut self, buf: &[u8]) -> usize {
        let mut stderr = std::io::stderr().lock();
        match stderr.write_all(buf) {
            Ok(()) => buf.len(),
            Err(_) => 0,
        }
    }
}
