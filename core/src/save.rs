//! Save-file load/store (§4.J): the concatenation of CPU RAM, the ROM's
//! save region, and the framebuffer, all at fixed sizes. Any size mismatch
//! is fatal rather than silently truncated or zero-padded.

use std::io::{Read, Write};
use std::path::Path;

use crate::display::SCREEN_W;
use crate::error::{EmuError, Result};
use crate::rom::SAVE_REGION_SIZE;
use crate::system::{System, RAM_SIZE};

fn expect_size(field: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(EmuError::SaveSizeMismatch { field, expected, actual });
    }
    Ok(())
}

/// Loads `path` into `sys` if it exists; a missing file is not an error
/// (§7: "missing save file on load" is silent) and leaves `sys` as freshly
/// booted. Any other I/O error, or a save file of the wrong size, is
/// fatal.
pub fn load(sys: &mut System, path: &Path) -> Result<()> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(EmuError::Io(e)),
    };

    let save_region_size = sys.rom.len() - sys.rom.save_offset();
    let fb_size = SCREEN_W * sys.fb.screen_h;
    let expected = RAM_SIZE + save_region_size + fb_size;
    expect_size("save file", expected, bytes.len())?;

    let (ram_bytes, rest) = bytes.split_at(RAM_SIZE);
    let (save_bytes, fb_bytes) = rest.split_at(save_region_size);

    sys.ram.copy_from_slice(ram_bytes);
    let save_offset = sys.rom.save_offset();
    sys.rom.bytes[save_offset..].copy_from_slice(save_bytes);
    sys.rom.xor_save_region();
    sys.fb.pixels.copy_from_slice(fb_bytes);
    sys.init_done = true;
    Ok(())
}

/// Writes `sys`'s RAM, save region (re-masked), and framebuffer to `path`.
pub fn store(sys: &mut System, path: &Path) -> Result<()> {
    let mut out = Vec::with_capacity(RAM_SIZE + SAVE_REGION_SIZE + SCREEN_W * sys.fb.screen_h);
    out.extend_from_slice(&sys.ram[..]);

    sys.rom.xor_save_region();
    let save_offset = sys.rom.save_offset();
    out.extend_from_slice(&sys.rom.bytes[save_offset..]);
    sys.rom.xor_save_region();

    out.extend_from_slice(&sys.fb.pixels);

    let mut f = std::fs::File::create(path)?;
    f.write_all(&out)?;
    Ok(())
}

/// Reads a ROM file from `path`, enforcing the 4 MiB / 8 MiB size limit
/// documented in §6 rather than reading an unbounded stream.
pub fn read_rom(path: &Path, max: usize) -> Result<Vec<u8>> {
    let mut f = std::fs::File::open(path)?;
    let mut bytes = Vec::new();
    f.take(max as u64 + 1).read_to_end(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::{Model, Rom};

    fn make_rom(size: usize, key: u8) -> Rom {
        let mut bytes = vec![0u8; size];
        bytes[0x23] = key ^ b't';
        bytes[0x24] = key ^ b'o';
        bytes[0x25] = key ^ b'n';
        bytes[0x26] = key ^ b'y';
        if key != 0 {
            for b in bytes.iter_mut() {
                *b ^= key;
            }
        }
        Rom::load(bytes).unwrap()
    }

    #[test]
    fn round_trips_ram_save_region_and_framebuffer() {
        let rom = make_rom(4 << 20, 0x5a);
        assert_eq!(rom.model, Model::Model550);
        let mut sys = System::new(rom);
        sys.ram[0x10] = 0x42;
        sys.rom.bytes[sys.rom.save_offset() + 3] = 0x99;
        sys.fb.pixels[7] = 0x11;

        let path = std::env::temp_dir().join("toumapet_save_roundtrip_test.sav");
        store(&mut sys, &path).unwrap();

        let rom2 = make_rom(4 << 20, 0x5a);
        let mut sys2 = System::new(rom2);
        load(&mut sys2, &path).unwrap();

        assert_eq!(sys2.ram[0x10], 0x42);
        assert_eq!(sys2.rom.bytes[sys2.rom.save_offset() + 3], 0x99);
        assert_eq!(sys2.fb.pixels[7], 0x11);
        assert!(sys2.init_done);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_save_file_is_silently_ignored() {
        let rom = make_rom(4 << 20, 0);
        let mut sys = System::new(rom);
        let path = std::env::temp_dir().join("toumapet_save_does_not_exist.sav");
        std::fs::remove_file(&path).ok();
        load(&mut sys, &path).unwrap();
        assert!(!sys.init_done);
    }

    #[test]
    fn wrong_size_save_file_is_fatal() {
        let rom = make_rom(4 << 20, 0);
        let mut sys = System::new(rom);
        let path = std::env::temp_dir().join("toumapet_save_bad_size.sav");
        std::fs::write(&path, vec![0u8; 10]).unwrap();
        assert!(matches!(load(&mut sys, &path), Err(EmuError::SaveSizeMismatch { .. })));
        std::fs::remove_file(&path).ok();
    }
}
