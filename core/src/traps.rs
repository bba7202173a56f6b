//! BIOS trap dispatch for the synthetic `[0x6000, 0x7000)` program-counter
//! range (§4.E) and the call/tail-call/return mechanics that page ROM code
//! windows into RAM (§4.H).
//!
//! None of these addresses hold real opcodes: landing on one means the
//! ROM executed `JSR $6000` (or one of the other fixed entry points) with
//! the call selected however that particular entry point expects — by `X`
//! for the BIOS function table, by the call argument block at `0x80` for
//! `0x60DE`/`0x6052`. [`System::step`] checks this range before ever
//! fetching a byte as an opcode.

use crate::error::{EmuError, Result};
use crate::font;
use crate::image;
use crate::system::{StepOutcome, System, SYS_RET, SYS_RET_VECTOR};

const ARG: u16 = 0x0080; // 24-bit ROM address argument block for most traps
const ARG_SIZE: u16 = 0x0083; // 16-bit size-in-words argument for call traps

impl System {
    pub(crate) fn step(&mut self) -> Result<StepOutcome> {
        let pc = self.regs.pc;
        self.trace_pc(pc);
        if pc >= 0x6000 {
            if pc == 0x6000 {
                self.dispatch_bios_trap()?;
            } else if pc == 0x6003 {
                self.rom_peek_trap()?;
            } else if pc == SYS_RET {
                match self.frames.pop()? {
                    None => return Ok(StepOutcome::FrameDone),
                    Some(top) => self.reload_frame_window(top.rom_addr, top.size)?,
                }
            } else if pc == 0x60de || pc == 0x6052 {
                let tail_call = pc == 0x6052;
                let addr = self.read_ram24(ARG);
                let frame_size = self.read_ram16(ARG_SIZE) << 1;
                if !tail_call {
                    self.push_return_marker();
                }
                self.dispatch_call(addr, frame_size, tail_call)?;
                return Ok(StepOutcome::Continue);
            } else {
                return Err(EmuError::UnexpectedTrapPc { pc });
            }
            self.regs.pc = SYS_RET_VECTOR;
            self.synthetic_rts();
            return Ok(StepOutcome::Continue);
        }

        let op = self.fetch_u8();
        self.execute_opcode(op, pc)
    }

    /// Pops a return address and resumes one byte past it. Shared between
    /// the trap dispatcher (which always returns this way) and the real
    /// `RTS` opcode in [`crate::exec`].
    pub(crate) fn synthetic_rts(&mut self) {
        let lo = self.pop8() as u16;
        let hi = self.pop8() as u16;
        self.regs.pc = (lo | hi << 8).wrapping_add(1);
    }

    fn reload_frame_window(&mut self, rom_addr: u32, size: u16) -> Result<()> {
        let window = crate::frame::WINDOW_BASE as usize;
        let start = rom_addr as usize;
        let size = size as usize;
        self.ram[window..window + size].copy_from_slice(&self.rom.bytes[start..start + size]);
        Ok(())
    }

    pub(crate) fn read_ram16(&self, at: u16) -> u16 {
        let at = at as usize;
        u16::from_le_bytes([self.ram[at], self.ram[at + 1]])
    }

    pub(crate) fn read_ram24(&self, at: u16) -> u32 {
        let at = at as usize;
        self.ram[at] as u32 | (self.ram[at + 1] as u32) << 8 | (self.ram[at + 2] as u32) << 16
    }

    fn write_ram16(&mut self, at: u16, value: u16) {
        let at = at as usize;
        self.ram[at] = value as u8;
        self.ram[at + 1] = (value >> 8) as u8;
    }

    /// The `0x6003` entry: reads 6 bytes starting at the 24-bit ROM address
    /// in the argument block into `mem[0x8d..0x93]`, padding with `!key`
    /// past the end of the ROM rather than failing.
    fn rom_peek_trap(&mut self) -> Result<()> {
        let addr = self.read_ram24(ARG);
        self.trace(|| format!("ROM read (0x{addr:x})"));
        if self.rom.len() <= addr as usize {
            return Err(EmuError::ResourceReadOutsideRom { offset: addr });
        }
        let available = self.rom.len() - addr as usize;
        let fill = !self.rom.key;
        for i in 0..6usize {
            self.ram[0x8d + i] =
                if i < available { self.rom.bytes[addr as usize + i] } else { fill };
        }
        Ok(())
    }

    fn dispatch_bios_trap(&mut self) -> Result<()> {
        match self.regs.x {
            0x06 => self.bios_image_size(),
            0x08 => self.bios_image_draw(0xff),
            0x0a => self.bios_image_draw(-1),
            0x0c => self.bios_clear_screen(),
            0x0e => self.bios_repeat_line(),
            0x10 => self.bios_check_intersect(),
            entry @ (0x14 | 0x16 | 0x18 | 0x1a | 0x2c) => self.bios_diagnostic_rom_check(entry),
            0x1c => {
                // reads an id, never validated or used
                let id = self.read_ram16(0x100);
                self.trace(|| format!("bios_1c (res = {id})"));
                Ok(())
            }
            0x1e => {
                self.trace(|| "bios_1e".to_string());
                Ok(())
            }
            0x24 => self.bios_draw_char(-1),
            0x26 => self.bios_draw_char(self.ram[0x104] as i32),
            entry => Err(EmuError::UnknownBiosTrap { entry }),
        }
    }

    fn bios_image_size(&mut self) -> Result<()> {
        let id = self.read_ram16(0x100);
        self.trace(|| format!("image_size (id = {id})"));
        self.write_ram16(0x102, id);
        let offset = self.rom.image_offset(id as u32)?;
        self.ram[0x85] = self.rom.bytes[offset as usize];
        self.ram[0x86] = self.rom.bytes[offset as usize + 2];
        Ok(())
    }

    fn bios_image_draw(&mut self, alpha: i32) -> Result<()> {
        let x = self.ram[0x100];
        let y = self.ram[0x101];
        let id = self.read_ram16(0x102);
        let flip = self.ram[0x104];
        let blend = self.ram[0x105];
        self.trace(|| {
            let name = if alpha == 0xff { "image_draw_alpha" } else { "image_draw" };
            format!("{name} (x = {x}, y = {y}, id = {id}, flip = {flip}, blend = 0x{blend:02x})")
        });
        let offset = self.rom.image_offset(id as u32)?;
        image::draw_image(&mut self.fb, &self.rom, x, y, offset, flip, blend, alpha)
    }

    fn bios_clear_screen(&mut self) -> Result<()> {
        let start = self.ram[0x100] as usize;
        let mut end = self.ram[0x101] as usize + 1;
        let color = self.ram[0x102];
        self.trace(|| format!("clear_screen (start = {start}, end = {end}, color = 0x{color:02x})"));
        let screen_h = self.fb.screen_h;
        if end > screen_h {
            end = screen_h;
        }
        if start >= end {
            return Ok(());
        }
        let w = crate::display::SCREEN_W;
        self.fb.pixels[start * w..end * w].fill(color);
        Ok(())
    }

    /// Tiles a 1-pixel-wide or 1-pixel-tall image across a range of
    /// columns or rows. Which axis is driven by the source image's shape:
    /// width 1 repeats vertically filled rows, height 1 repeats
    /// horizontally filled columns. Any other shape is an error — the
    /// firmware never calls this with one.
    fn bios_repeat_line(&mut self) -> Result<()> {
        let start = self.ram[0x100] as usize;
        let mut end = self.ram[0x101] as usize + 1;
        let id = self.read_ram16(0x102);
        self.trace(|| format!("repeat_line (start = {start}, end = {end}, id = {id})"));
        let screen_h = self.fb.screen_h;
        let w_screen = crate::display::SCREEN_W;
        let offset = self.rom.image_offset(id as u32)?;
        let (w, h) = image::image_size(&self.rom, offset)?;
        let (w, h) = (w as usize, h as usize);
        if w == 1 {
            image::draw_image(&mut self.fb, &self.rom, start as u8, 0, offset, 0, 0xff, -1)?;
            if end > w_screen {
                end = w_screen;
            }
            let h = h.min(screen_h);
            if start >= end {
                return Ok(());
            }
            for row in 0..h {
                let fill = self.fb.pixels[row * w_screen + start];
                self.fb.pixels[row * w_screen + start..row * w_screen + end].fill(fill);
            }
        } else if h == 1 {
            image::draw_image(&mut self.fb, &self.rom, 0, start as u8, offset, 0, 0xff, -1)?;
            if end > screen_h {
                end = screen_h;
            }
            let w = w.min(w_screen);
            if start >= end {
                return Ok(());
            }
            let src_row = start;
            for row in start + 1..end {
                let (head, tail) = self.fb.pixels.split_at_mut(row * w_screen);
                let src = &head[src_row * w_screen..src_row * w_screen + w];
                tail[..w].copy_from_slice(src);
            }
        } else {
            return Err(EmuError::UnsupportedRepeatMode);
        }
        Ok(())
    }

    /// Axis-aligned bounding-box overlap test between two sprites placed
    /// at byte (wraparound) coordinates; sets `A` to 1 on overlap, 0
    /// otherwise.
    fn bios_check_intersect(&mut self) -> Result<()> {
        let x1 = self.ram[0x100] as i32;
        let y1 = self.ram[0x101] as i32;
        let id1 = self.read_ram16(0x102);
        let x2 = self.ram[0x105] as i32;
        let y2 = self.ram[0x106] as i32;
        let id2 = self.read_ram16(0x107);

        let offs1 = self.rom.image_offset(id1 as u32)?;
        let (w1, h1) = image::image_size(&self.rom, offs1)?;
        let offs2 = self.rom.image_offset(id2 as u32)?;
        let (w2, h2) = image::image_size(&self.rom, offs2)?;

        self.trace(|| {
            format!(
                "check_intersect (x1 = {x1}, y1 = {y1}, id1 = {id1}, x2 = {x2}, y2 = {y2}, id2 = {id2})"
            )
        });

        let mut cmp = 0u32;
        if ((x2 - x1) & 0xff) < w1 as i32 {
            cmp |= 1;
        }
        if ((x1 - x2) & 0xff) < w2 as i32 {
            cmp |= 1 + 4;
        }
        if ((y2 - y1) & 0xff) < h1 as i32 {
            cmp |= 2;
        }
        if ((y1 - y2) & 0xff) < h2 as i32 {
            cmp |= 2 + 8;
        }
        self.regs.a = if cmp & 3 == 3 { 1 } else { 0 };
        Ok(())
    }

    /// `0x14`/`0x16`/`0x18`/`0x1a`/`0x2c`: only ever traced in the original
    /// (§9 open question (a)), so the sole observable effect here is the
    /// bounds check on the ROM address argument.
    fn bios_diagnostic_rom_check(&mut self, entry: u8) -> Result<()> {
        let addr = self.read_ram24(ARG);
        let tag = self.ram[0x85];
        self.trace(|| {
            let name = match entry {
                0x14 => "bios_14",
                0x16 => "bios_16",
                0x18 => "bios_18",
                0x1a => "bios_1a",
                _ => "bios_2c",
            };
            format!("{name} (addr = 0x{addr:x}, {tag})")
        });
        if self.rom.len() < addr as usize + 4 {
            return Err(EmuError::ResourceReadOutsideRom { offset: addr });
        }
        Ok(())
    }

    fn bios_draw_char(&mut self, bg: i32) -> Result<()> {
        let x = self.ram[0x100];
        let y = self.ram[0x101];
        let id = self.ram[0x102];
        let color = self.ram[0x103];
        self.trace(|| {
            if bg < 0 {
                format!("draw_char_alpha (x = {x}, y = {y}, id = {id}, color = 0x{color:02x})")
            } else {
                format!(
                    "draw_char (x = {x}, y = {y}, id = {id}, color = 0x{color:02x}, bg = 0x{bg:02x})"
                )
            }
        });
        font::draw_char(&mut self.fb, &self.rom, x, y, id, color, bg)
    }
}

#[cfg(test)]
mod tests {
    use crate::rom::Rom;
    use crate::system::System;

    fn blank_rom() -> Rom {
        let mut bytes = vec![0u8; 4 << 20];
        bytes[0x23] = b't';
        bytes[0x24] = b'o';
        bytes[0x25] = b'n';
        bytes[0x26] = b'y';
        Rom::load(bytes).unwrap()
    }

    /// Scenario seed 5 (§8): `PC=0x60DE` with a valid call argument block
    /// pages the callee's ROM bytes into the 0x300 window, pushes the
    /// synthetic return marker, and leaves SP two lower.
    #[test]
    fn call_trap_pages_in_callee_and_pushes_return_marker() {
        let mut rom = blank_rom();
        let callee_addr: u32 = 0x010000;
        rom.bytes[callee_addr as usize..callee_addr as usize + 8].copy_from_slice(&[0xaa; 8]);

        let mut sys = System::new(rom);
        sys.regs.sp = 0x7f;
        sys.ram[0x80] = callee_addr as u8;
        sys.ram[0x81] = (callee_addr >> 8) as u8;
        sys.ram[0x82] = (callee_addr >> 16) as u8;
        sys.ram[0x83] = 4; // size in words; frame_size = 4 << 1 = 8
        sys.ram[0x84] = 0;
        sys.regs.pc = 0x60de;

        sys.step().unwrap();

        assert_eq!(sys.regs.sp, 0x7d);
        assert_eq!(sys.ram[0x017e], 0xff); // low byte of the 0x6FFF marker
        assert_eq!(sys.ram[0x017f], 0x6f); // high byte
        assert_eq!(sys.regs.pc, crate::frame::WINDOW_BASE);
        assert_eq!(&sys.ram[0x300..0x308], &[0xaa; 8]);
        assert_eq!(sys.frames.depth(), 1);
    }

    /// An attached trace sink records one line per step, including the
    /// BIOS trap's own descriptive line, not just a bare address.
    #[test]
    fn trace_sink_records_instruction_and_trap_lines() {
        let rom = blank_rom();
        let mut sys = System::new(rom);
        sys.set_trace(crate::trace::Trace::new(16));
        sys.ram[0x100] = 5; // start
        sys.ram[0x101] = 10; // end
        sys.ram[0x102] = 0x42; // color
        sys.regs.x = 0x0c; // bios_clear_screen
        sys.regs.pc = 0x6000;

        sys.step().unwrap();

        let trace = sys.trace.take().unwrap();
        let lines: Vec<&str> = trace.lines_for_test();
        assert!(lines.iter().any(|l| l.starts_with("6000:")));
        assert!(lines.iter().any(|l| l.contains("clear_screen")));
    }
}
