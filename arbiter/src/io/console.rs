//! Colored diagnostic output.
//!
//! Everything goes to stderr so that command output on stdout stays
//! machine-readable. Each call writes under one stderr lock, so lines from
//! different processors never interleave.

use std::fmt;
use std::io::{self, Write};

/// ANSI color codes for terminal output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(unused)]
pub enum Color {
    Black = 30,
    Red = 31,
    Green = 32,
    Yellow = 33,
    Blue = 34,
    Magenta = 35,
    Cyan = 36,
    White = 37,
    BrightBlack = 90,
    BrightRed = 91,
    BrightGreen = 92,
    BrightYellow = 93,
    BrightBlue = 94,
    BrightMagenta = 95,
    BrightCyan = 96,
    BrightWhite = 97,
}

impl Color {
    pub const RESET: &'static str = "\x1B[0m";

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Writes `args` wrapped in the escape sequence for `color`.
///
/// A closed or full stderr is not worth failing over; write errors are dropped.
pub fn color_print(color: Color, args: fmt::Arguments) {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    let _ = write!(out, "\x1B[{}m{}{}", color.code(), args, Color::RESET);
}

#[macro_export]
macro_rules! color_print {
    ($color:expr, $fmt:literal $(, $($arg:tt)+)?) => {
        $crate::io::console::color_print(
            $color,
            format_args!($fmt $(, $($arg)+)?)
        )
    };
}

/// Like `color_print!`, newline appended.
#[macro_export]
macro_rules! color_println {
    ($color:expr, $fmt:literal $(, $($arg:tt)+)?) => {
        $crate::io::console::color_print(
            $color,
            format_args!(concat!($fmt, "\n") $(, $($arg)+)?)
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_codes_are_ansi() {
        assert_eq!(Color::Red.code(), 31);
        assert_eq!(Color::BrightBlack.code(), 90);
        assert_eq!(Color::RESET, "\u{1b}[0m");
    }
}
