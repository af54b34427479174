/// Prints a message to the console with a newline.
#[macro_export]
macro_rules! println {
    () => {
        ($crate::print!("\n"));
    };

    ($($arg:tt)*) => {
        ($crate::print!("{}\n", format_args!($($arg)*)))
    };
}

/// Prints a message to the console without a newline.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        ($crate::println::print(format_args!($($arg)*)))
    };
}

#[doc(hidden)]
pub(crate) fn print(args: core::fmt::Arguments<'_>) {
    // Console errors are ignored.
    uefi::system::with_stdout(|stdout| {
        let _ = core::fmt::Write::write_fmt(stdout, args);
    });
}
