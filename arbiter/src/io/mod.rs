//! Console output and the `log` backend.

pub mod console;
pub mod logging;
