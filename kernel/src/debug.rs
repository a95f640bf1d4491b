// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Support for in-kernel debugging.
//!
//! For printing, this module uses an `IoWrite` implementation provided by the
//! board (usually a UART, or stderr on host simulation boards). Until a board
//! installs a writer, debug output is silently discarded.
//!
//! Example
//! -------
//!
//! ```rust,ignore
//! debug!("Timer fired at {} ns", now);
//! debug_verbose!("Armed slot {}", id);
//! ```
//!
//! ```text
//! Timer fired at 1000230 ns
//! TIMER_DEBUG(1): capsules/core/src/ltimer.rs:112: Armed slot 3
//! ```

use core::fmt::{write, Arguments, Result, Write};
use core::ptr::addr_of_mut;

/// Byte sink used for debug output.
pub trait IoWrite {
    /// Write `buf` to the output, returning the number of bytes written.
    fn write(&mut self, buf: &[u8]) -> usize;
}

struct DebugWriterWrapper {
    dw: Option<&'static mut dyn IoWrite>,
    count: usize,
}

static mut DEBUG_WRITER: DebugWriterWrapper = DebugWriterWrapper {
    dw: None,
    count: 0,
};

/// Install the writer all `debug!` output goes to.
///
/// # Safety
///
/// Must be called once, during board setup, before any other code can print.
/// The kernel is single threaded; this writes a global without
/// synchronization.
pub unsafe fn set_debug_writer(writer: &'static mut dyn IoWrite) {
    let wrapper = &mut *addr_of_mut!(DEBUG_WRITER);
    wrapper.dw = Some(writer);
    wrapper.count = 0;
}

struct FmtAdapter<'w> {
    writer: &'w mut dyn IoWrite,
}

impl Write for FmtAdapter<'_> {
    fn write_str(&mut self, s: &str) -> Result {
        self.writer.write(s.as_bytes());
        Ok(())
    }
}

/// Format one debug line to `writer`.
pub fn write_debug_line(writer: &mut dyn IoWrite, args: Arguments) {
    let mut adapter = FmtAdapter { writer };
    let _ = write(&mut adapter, args);
    let _ = adapter.write_str("\r\n");
}

/// Format one verbose debug line to `writer`, tagged with the message number
/// and the source location.
pub fn write_debug_verbose_line(
    writer: &mut dyn IoWrite,
    count: usize,
    file_line: &(&'static str, u32),
    args: Arguments,
) {
    let (file, line) = *file_line;
    let mut adapter = FmtAdapter { writer };
    let _ = adapter.write_fmt(format_args!("TIMER_DEBUG({}): {}:{}: ", count, file, line));
    let _ = write(&mut adapter, args);
    let _ = adapter.write_str("\r\n");
}

pub fn debug_println(args: Arguments) {
    // SAFETY: the kernel is single threaded and the writer is only replaced
    // during board setup.
    let wrapper = unsafe { &mut *addr_of_mut!(DEBUG_WRITER) };
    if let Some(writer) = wrapper.dw.as_deref_mut() {
        write_debug_line(writer, args);
    }
}

pub fn debug_verbose_println(args: Arguments, file_line: &(&'static str, u32)) {
    // SAFETY: see `debug_println`.
    let wrapper = unsafe { &mut *addr_of_mut!(DEBUG_WRITER) };
    wrapper.count = wrapper.count.wrapping_add(1);
    let count = wrapper.count;
    if let Some(writer) = wrapper.dw.as_deref_mut() {
        write_debug_verbose_line(writer, count, file_line, args);
    }
}

/// In-kernel `println()` debugging.
#[macro_export]
macro_rules! debug {
    () => ({
        // Allow an empty debug!() to print the location when hit
        debug!("")
    });
    ($msg:expr $(,)?) => ({
        $crate::debug::debug_println(format_args!($msg));
    });
    ($fmt:expr, $($arg:tt)+) => ({
        $crate::debug::debug_println(format_args!($fmt, $($arg)+));
    });
}

/// In-kernel `println()` debugging that includes the message number and the
/// location it was printed from.
#[macro_export]
macro_rules! debug_verbose {
    () => ({
        // Allow an empty debug_verbose!() to print the location when hit
        debug_verbose!("")
    });
    ($msg:expr $(,)?) => ({
        $crate::debug::debug_verbose_println(format_args!($msg), {
            static _FILE_LINE: (&'static str, u32) = (file!(), line!());
            &_FILE_LINE
        })
    });
    ($fmt:expr, $($arg:tt)+) => ({
        $crate::debug::debug_verbose_println(format_args!($fmt, $($arg)+), {
            static _FILE_LINE: (&'static str, u32) = (file!(), line!());
            &_FILE_LINE
        })
    });
}
