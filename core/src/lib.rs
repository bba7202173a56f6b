//! toumapet device emulation: a W65C02S-based handheld's CPU, memory map,
//! serial flash, framebuffer, and BIOS call surface, driven by
//! [`system::System::tick`] at the device's native 30 Hz.

pub mod cpu;
pub mod display;
pub mod error;
mod exec;
pub mod flash;
pub mod font;
pub mod frame;
pub mod image;
pub mod input;
pub mod rom;
pub mod save;
pub mod system;
pub mod trace;
mod traps;

pub mod prelude {
    pub use crate::cpu::Registers;
    pub use crate::display::{Framebuffer, Palette, SCREEN_W};
    pub use crate::error::{EmuError, Result};
    pub use crate::input::Button;
    pub use crate::rom::{Model, Rom};
    pub use crate::system::{StepOutcome, System};
}
