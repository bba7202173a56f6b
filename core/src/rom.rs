//! Firmware ROM container: deobfuscation, model detection, resource table.

use crate::error::{EmuError, Result};

pub const SAVE_REGION_SIZE: usize = 0x10000;

/// Which physical handheld this ROM targets — inferred purely from file size.
///
/// Fragile (§9 open question (d) of the device spec), but it is the only
/// signal the firmware format carries, so it's retained as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Model550,
    Model560,
}

impl Model {
    pub fn screen_h(self) -> usize {
        match self {
            Model::Model550 => 128,
            Model::Model560 => 160,
        }
    }

    fn from_rom_size(size: usize) -> Result<Model> {
        match size {
            n if n == 4 << 20 => Ok(Model::Model550),
            n if n == 8 << 20 => Ok(Model::Model560),
            n => Err(EmuError::RomBadSize { size: n }),
        }
    }
}

/// Resource kind inferred from leading bytes of the resource body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    ImageRle,
    Sound,
    Image1Bit,
    Opaque,
}

fn classify_resource(bytes: &[u8]) -> ResourceKind {
    if bytes.len() >= 4 && bytes[3] == 0x80 && bytes[1] == 0 {
        return ResourceKind::ImageRle;
    }
    if !bytes.is_empty() && bytes[0] == 0x81 {
        return ResourceKind::Sound;
    }
    if bytes.len() >= 2 {
        let w = bytes[0] as usize;
        let h = bytes[1] as usize;
        if w <= 128 && h <= 128 && bytes.len() == (w + 7) / 8 * h + 2 {
            return ResourceKind::Image1Bit;
        }
    }
    ResourceKind::Opaque
}

/// Owns the firmware bytes, unmasked in place. The last [`SAVE_REGION_SIZE`]
/// bytes are the mutable save region; everything before it is logically
/// read-only firmware (even though nothing besides flash programming ever
/// writes into the save region either — the distinction only matters for
/// bounds-checking flash commands).
pub struct Rom {
    pub bytes: Vec<u8>,
    pub key: u8,
    pub model: Model,
    pub resource_table_offset: u32,
}

fn read24(b: &[u8], at: usize) -> u32 {
    b[at] as u32 | (b[at + 1] as u32) << 8 | (b[at + 2] as u32) << 16
}

impl Rom {
    pub const MAGIC: &'static [u8] = b"tony";

    /// Detects model from size, derives the XOR key from the obfuscated
    /// magic at offset 0x23, verifies it, and unmasks the whole buffer.
    pub fn load(bytes: Vec<u8>) -> Result<Rom> {
        if bytes.len() < SAVE_REGION_SIZE {
            return Err(EmuError::RomTooSmall { size: bytes.len(), min: SAVE_REGION_SIZE });
        }
        let model = Model::from_rom_size(bytes.len())?;

        let key = bytes[0x23] ^ Self::MAGIC[0];
        for (i, &m) in Self::MAGIC.iter().enumerate().skip(1) {
            if bytes[0x23 + i] ^ key != m {
                return Err(EmuError::RomBadMagic);
            }
        }

        let mut bytes = bytes;
        if key != 0 {
            for b in bytes.iter_mut() {
                *b ^= key;
            }
        }

        let resource_table_offset = read24(&bytes, 0);
        if resource_table_offset as usize > bytes.len() {
            return Err(EmuError::RomBadResourceOffset {
                offset: resource_table_offset,
                size: bytes.len(),
            });
        }

        Ok(Rom { bytes, key, model, resource_table_offset })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn save_offset(&self) -> usize {
        self.bytes.len() - SAVE_REGION_SIZE
    }

    /// Boot entry point: address (u24) and size (u16) stored at ROM+3.
    pub fn boot_frame(&self) -> (u32, u16) {
        (read24(&self.bytes, 3), u16::from_le_bytes([self.bytes[5], self.bytes[6]]))
    }

    /// Per-tick game entry point: address (u24) and size (u16) at ROM+0x1B.
    pub fn game_frame(&self) -> (u32, u16) {
        (read24(&self.bytes, 0x1b), u16::from_le_bytes([self.bytes[0x1d], self.bytes[0x1e]]))
    }

    /// Font glyph table base pointer, stored as u16 LE at ROM+7.
    pub fn font_base(&self) -> u16 {
        u16::from_le_bytes([self.bytes[7], self.bytes[8]])
    }

    /// Resolves resource `id` through the table to its byte offset, the way
    /// the BIOS image/font traps look resources up: just bounds-checked
    /// enough to read a 4-byte header, no classification.
    pub fn image_offset(&self, id: u32) -> Result<u32> {
        let table = self.resource_table_offset as usize;
        let entry_at = table + id as usize * 3;
        if self.bytes.len() < entry_at + 3 {
            return Err(EmuError::ResourceOutOfRange { id });
        }
        let offs = read24(&self.bytes, entry_at);
        if self.bytes.len() < offs as usize + 4 {
            return Err(EmuError::ResourceReadOutsideRom { offset: offs });
        }
        Ok(offs)
    }

    /// Start/end (exclusive) of resource `id`'s body, and its kind.
    pub fn resource(&self, id: u32) -> Result<(usize, usize, ResourceKind)> {
        let table = self.resource_table_offset as usize;
        let entry_at = table + id as usize * 3;
        if entry_at + 3 > self.bytes.len() {
            return Err(EmuError::ResourceOutOfRange { id });
        }
        let start = read24(&self.bytes, entry_at) as usize;

        let next_at = entry_at + 3;
        let end = if next_at + 3 <= self.bytes.len() {
            let next = read24(&self.bytes, next_at);
            if next == 0xFFFFFF { table } else { next as usize }
        } else {
            table
        };

        if start >= end || end > self.bytes.len() {
            return Err(EmuError::ResourceOutOfRange { id });
        }
        let kind = classify_resource(&self.bytes[start..end]);
        Ok((start, end, kind))
    }

    /// XORs the save region (the last [`SAVE_REGION_SIZE`] bytes) in place.
    /// Applied both when loading a save (to un-mask it into logical form)
    /// and when writing one back out (to re-mask it for storage).
    pub fn xor_save_region(&mut self) {
        if self.key == 0 {
            return;
        }
        let offs = self.save_offset();
        for b in &mut self.bytes[offs..] {
            *b ^= self.key;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_rom(size: usize, key: u8, resource_offset: u32) -> Vec<u8> {
        let mut rom = vec![0u8; size];
        rom[0..3].copy_from_slice(&resource_offset.to_le_bytes()[..3]);
        rom[0x23] = key ^ b't';
        rom[0x24] = key ^ b'o';
        rom[0x25] = key ^ b'n';
        rom[0x26] = key ^ b'y';
        if key != 0 {
            for b in rom.iter_mut() {
                *b ^= key;
            }
        }
        rom
    }

    #[test]
    fn load_unmasks_and_reads_resource_offset() {
        let bytes = make_rom(4 << 20, 0x5a, 0x1000);
        let rom = Rom::load(bytes).unwrap();
        assert_eq!(rom.resource_table_offset, 0x1000);
        assert_eq!(rom.model, Model::Model550);
    }

    #[test]
    fn zero_key_is_a_noop_xor() {
        let bytes = make_rom(8 << 20, 0, 0x2000);
        let rom = Rom::load(bytes).unwrap();
        assert_eq!(rom.key, 0);
        assert_eq!(rom.model, Model::Model560);
        assert_eq!(rom.model.screen_h(), 160);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = vec![0u8; 4 << 20];
        bytes[0x23] = 0xff;
        assert!(matches!(Rom::load(bytes), Err(EmuError::RomBadMagic)));
    }

    #[test]
    fn bad_size_is_rejected() {
        let bytes = vec![0u8; 5 << 20];
        assert!(matches!(Rom::load(bytes), Err(EmuError::RomBadSize { .. })));
    }

    #[test]
    fn resource_sentinel_extends_to_table_offset() {
        // Resource bodies live before the table; the last one's "next"
        // offset is the sentinel, meaning it runs up to the table itself.
        let mut rom = make_rom(4 << 20, 0, 0x100);
        rom[0x100..0x103].copy_from_slice(&0x20u32.to_le_bytes()[..3]);
        rom[0x103..0x106].copy_from_slice(&0xFFFFFFu32.to_le_bytes()[..3]);
        rom[0x20] = 5; // w
        rom[0x21] = 0;
        let rom = Rom::load(rom).unwrap();
        let (start, end, _kind) = rom.resource(0).unwrap();
        assert_eq!(start, 0x20);
        assert_eq!(end, 0x100);
    }
}
