#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate quick_error;

pub mod cpu;
pub mod dos;
pub mod emulator;
pub mod error;
pub mod fcb;
pub mod format;
pub mod host_io;
pub mod loader;
pub mod memory;
pub mod psp;
pub mod register;

pub use crate::emulator::Emulator;
pub use crate::error::EmulatorError;
