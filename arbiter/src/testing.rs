//! Runtime support for `#[sync_test]`. Not a stable interface.

use crate::color_println;
use crate::io::console::Color;
use crate::io::logging;

pub fn banner(name: &str, file: &str) {
    logging::init();
    color_println!(Color::Blue, "\nTesting > {} ({}) ...", name, file);
}

pub fn passed() {
    color_println!(Color::Green, "========[Test passed!]========");
}
