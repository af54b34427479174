//! Kernel debugger output. This is the fallback when the host cannot be
//! reached, and one of the hooks every message is dispatched to.

use core::fmt::Write;

use escape_shim::shim::truncate;
use spin::Mutex;
use wdk_sys::{_DPFLTR_TYPE::DPFLTR_IHVDRIVER_ID, DPFLTR_ERROR_LEVEL, ntddk::DbgPrintEx};

/// Debug prints a message to a kernel debugger with a newline.
#[macro_export]
macro_rules! eprintln {
    () => {
        ($crate::print!("\n"));
    };

    ($($arg:tt)*) => {
        ($crate::print!("{}\n", format_args!($($arg)*)))
    };
}

/// Debug prints a message to a kernel debugger without a newline.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        ($crate::eprintln::print(format_args!($($arg)*)))
    };
}

#[doc(hidden)]
pub(crate) fn print(args: core::fmt::Arguments<'_>) {
    let _ = Write::write_fmt(&mut *DEBUG_PRINTER.lock(), args);
}

/// The debugger hook, with the same signature as the shim's log sink.
pub(crate) fn debugger_sink(message: &str) {
    crate::eprintln!("{message}");
}

static DEBUG_PRINTER: Mutex<DbgOutput> = Mutex::new(DbgOutput);

struct DbgOutput;

impl Write for DbgOutput {
    fn write_str(&mut self, msg: &str) -> core::fmt::Result {
        // Avoid heap allocation so the macros are usable at any IRQL. Long
        // messages are printed in pieces rather than cut.
        let mut buffer = [0u8; 256];
        let mut rest = msg;
        while !rest.is_empty() {
            let (piece, _) = truncate(rest, buffer.len() - 1);
            if piece.is_empty() {
                break;
            }
            buffer[..piece.len()].copy_from_slice(piece.as_bytes());
            buffer[piece.len()] = 0;
            let _ = unsafe {
                DbgPrintEx(
                    DPFLTR_IHVDRIVER_ID as _,
                    DPFLTR_ERROR_LEVEL,
                    c"%s".as_ptr(),
                    buffer.as_ptr().cast::<i8>(),
                )
            };
            rest = &rest[piece.len()..];
        }
        Ok(())
    }
}
