//! DotBoy: a cycle-stepped Game Boy (DMG) emulator core.
//!
//! The crate models the hard emulation core only: CPU interpreter, pixel
//! timing controller, memory mapper, interrupt controller, timer and a
//! binary save-state codec. Presentation, audio synthesis, input polling
//! and the debugger wire transport are collaborators that drive this core
//! through [`GameBoy`] and its read-only accessors.

pub mod cpu;
pub mod machine;

pub use machine::cartridge::{is_valid_rom, CartridgeError, RomHeader};
pub use machine::state::{StateLoadError, StateSaveError};
pub use machine::{EventMask, GameBoy, JoypadState, RunError};

/// Logical screen width in pixels for the Game Boy DMG.
pub const SCREEN_WIDTH: usize = 160;
/// Logical screen height in pixels.
pub const SCREEN_HEIGHT: usize = 144;

/// T-cycles per full video frame (154 scanlines of 456 dots).
pub const CYCLES_PER_FRAME: u32 = 70_224;

/// Size in bytes of one packed frame buffer.
///
/// Pixels are stored at 2 bits per pixel in scanline order, most
/// significant pair first: pixel `i` lives in byte `i / 4` at bit offset
/// `6 - (i % 4) * 2`. The stored value is the palette-mapped DMG shade
/// (0 = lightest, 3 = darkest).
pub const FRAME_BUFFER_SIZE: usize = SCREEN_WIDTH * SCREEN_HEIGHT / 4;
