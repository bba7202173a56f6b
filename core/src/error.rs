use std::fmt;

/// Everything that can go fatally wrong while interpreting a firmware image.
///
/// Every variant corresponds to one of the abort paths a real device would
/// hit by running off into the weeds: a malformed ROM, a CPU instruction
/// stream that walks outside the addressable traps, a flash protocol
/// violation, or a save file that doesn't match the shape this build
/// expects. There is no recovery path for any of them — see `Display` for
/// the message printed before exit.
#[derive(Debug)]
pub enum EmuError {
    RomTooSmall { size: usize, min: usize },
    RomBadSize { size: usize },
    RomBadMagic,
    RomBadResourceOffset { offset: u32, size: usize },
    ResourceOutOfRange { id: u32 },
    ResourceReadOutsideRom { offset: u32 },
    BadImageHeader,
    UnsupportedFlip,
    RleUnderflow,
    RleZeroRun,
    UnsupportedRepeatMode,
    UndefinedOpcode { opcode: u8, pc: u16 },
    Break { pc: u16 },
    Stop { pc: u16 },
    UnknownBiosTrap { entry: u8 },
    UnexpectedTrapPc { pc: u16 },
    FrameTooLarge { size: u32 },
    FrameReadOutsideRom { addr: u32, size: u32 },
    FrameStackOverflow,
    FrameStackUnderflow,
    FlashProtocolMismatch,
    FlashRepeatedBitMismatch,
    FlashUnknownCommand { cmd: u8 },
    FlashUnalignedAddress { addr: u32 },
    FlashAddressOutOfRange { addr: u32 },
    SaveSizeMismatch { field: &'static str, expected: usize, actual: usize },
    Io(std::io::Error),
}

impl fmt::Display for EmuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmuError::RomTooSmall { size, min } => {
                write!(f, "ROM is too small ({size} bytes, need at least {min})")
            }
            EmuError::RomBadSize { size } => {
                write!(f, "unexpected ROM size ({size} bytes, expected 4 MiB or 8 MiB)")
            }
            EmuError::RomBadMagic => write!(f, "ROM magic doesn't match"),
            EmuError::RomBadResourceOffset { offset, size } => {
                write!(f, "bad resources offset 0x{offset:x} (ROM is {size} bytes)")
            }
            EmuError::ResourceOutOfRange { id } => write!(f, "resource {id} is out of range"),
            EmuError::ResourceReadOutsideRom { offset } => {
                write!(f, "read outside the ROM (0x{offset:x})")
            }
            EmuError::BadImageHeader => write!(f, "unsupported image"),
            EmuError::UnsupportedFlip => write!(f, "unsupported flip"),
            EmuError::RleUnderflow => write!(f, "RLE error"),
            EmuError::RleZeroRun => write!(f, "zero RLE count"),
            EmuError::UnsupportedRepeatMode => write!(f, "unknown repeat mode"),
            EmuError::UndefinedOpcode { opcode, pc } => {
                write!(f, "unexpected opcode 0x{opcode:02x} at 0x{pc:04x}")
            }
            EmuError::Break { pc } => write!(f, "BRK at 0x{pc:04x}"),
            EmuError::Stop { pc } => write!(f, "STP at 0x{pc:04x}"),
            EmuError::UnknownBiosTrap { entry } => write!(f, "unknown syscall 0x{entry:02x}"),
            EmuError::UnexpectedTrapPc { pc } => write!(f, "unexpected pc 0x{pc:04x}"),
            EmuError::FrameTooLarge { size } => write!(f, "too big rom call (0x{size:x})"),
            EmuError::FrameReadOutsideRom { addr, size } => {
                write!(f, "bad ROM call (0x{addr:x}, 0x{size:x})")
            }
            EmuError::FrameStackOverflow => write!(f, "call stack overflow"),
            EmuError::FrameStackUnderflow => write!(f, "call stack underflow"),
            EmuError::FlashProtocolMismatch => write!(f, "unexpected flash data"),
            EmuError::FlashRepeatedBitMismatch => write!(f, "wrong bit repeated"),
            EmuError::FlashUnknownCommand { cmd } => write!(f, "unknown flash cmd 0x{cmd:02x}"),
            EmuError::FlashUnalignedAddress { addr } => {
                write!(f, "unaligned flash address 0x{addr:06x}")
            }
            EmuError::FlashAddressOutOfRange { addr } => {
                write!(f, "unexpected flash address 0x{addr:06x}")
            }
            EmuError::SaveSizeMismatch { field, expected, actual } => {
                write!(f, "unexpected save size for {field} (expected {expected}, got {actual})")
            }
            EmuError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for EmuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EmuError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EmuError {
    fn from(e: std::io::Error) -> Self {
        EmuError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, EmuError>;
