//! The device itself: ROM, 64 KiB RAM, register file, flash, frame stack,
//! framebuffer and palette, wired together behind the memory-mapped I/O
//! side effects the firmware depends on (§4.G) and the BIOS call/trap
//! mechanism (§4.E, §4.H) that [`crate::exec`] and [`crate::traps`]
//! implement as methods on [`System`].

use crate::cpu::Registers;
use crate::display::{Framebuffer, Palette};
use crate::error::{EmuError, Result};
use crate::flash::Flash;
use crate::frame::FrameStack;
use crate::input::{self, Button};
use crate::rom::Rom;
use crate::trace::Trace;

pub const RAM_SIZE: usize = 0x10000;
pub(crate) const STACK_PAGE: u16 = 0x0100;
pub(crate) const SYS_RET: u16 = 0x7000;
pub(crate) const SYS_RET_VECTOR: u16 = 0x7001;
const IDLE_TIMER: u16 = 0x0181;
const SUBSECOND_TIMER: u16 = 0x00af;
const TIMERS_ENABLE: u16 = 0x0093;
const TIMERS_ENABLE_BIT: u8 = 1 << 4;
const BOOT_ANIM_FLAG: u16 = 0x00a3;
const ROM_KEY_SHADOW: u16 = 0x0099;

/// What a call-stack driven run of instructions stopped for. Both variants
/// are ordinary control flow, not errors: the original interpreter's
/// `goto end` is reached by an empty return stack and by `WAI` alike.
pub enum StepOutcome {
    Continue,
    FrameDone,
}

/// The emulated handheld. Owns every piece of mutable device state; the
/// frontend drives it by calling [`System::tick`] once per 30 Hz frame.
pub struct System {
    pub rom: Rom,
    pub ram: Box<[u8; RAM_SIZE]>,
    pub regs: Registers,
    pub fb: Framebuffer,
    pub palette: Palette,
    pub flash: Flash,
    pub frames: FrameStack,
    /// Buttons in bits 0..=6 plus the quit/reset/power-off/WAI/LCD-clean
    /// flags in bits 16..=20, mirroring the single `keys` word the
    /// original firmware host code keeps (§4.K, §4.I).
    pub keys: u32,
    button_read_count: u32,
    pub init_done: bool,
    pub trace: Option<Trace>,
    /// Leftover numerator (in `elapsed_ms * 256` units, mod 1000) from the
    /// previous tick's `mem[0xAF]` update, carried so the integer division
    /// in [`System::tick`] doesn't truncate a few 256ths away every call —
    /// over many ticks those fractions would otherwise add up and the
    /// counter would run slow against wall-clock time.
    subsecond_rem: u32,
}

impl System {
    pub fn new(rom: Rom) -> System {
        let screen_h = rom.model.screen_h();
        System {
            rom,
            ram: Box::new([0u8; RAM_SIZE]),
            regs: Registers::default(),
            fb: Framebuffer::new(screen_h),
            palette: Palette::new(),
            flash: Flash::new(),
            frames: FrameStack::new(),
            keys: 0,
            button_read_count: 0,
            init_done: false,
            trace: None,
            subsecond_rem: 0,
        }
    }

    pub fn set_trace(&mut self, trace: Trace) {
        self.trace = Some(trace);
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        let bit = 1u32 << input::button_bit(self.rom.model, button);
        if pressed {
            self.keys |= bit;
        } else {
            self.keys &= !bit;
        }
    }

    pub fn set_reset_held(&mut self, held: bool) {
        if held {
            self.keys |= input::FLAG_RESET;
        } else {
            self.keys &= !input::FLAG_RESET;
        }
    }

    pub fn request_quit(&mut self) {
        self.keys |= input::FLAG_QUIT;
    }

    pub fn should_exit(&self) -> bool {
        self.keys & (input::FLAG_QUIT | input::FLAG_RESET) != 0
    }

    pub fn quit_requested(&self) -> bool {
        self.keys & input::FLAG_QUIT != 0
    }

    // -- Memory-mapped I/O side effects (§4.G) -------------------------
    //
    // Real reads/writes of RAM only ever trigger these for the *final*
    // effective address of a genuine memory addressing mode; raw fetches
    // off the code stream and zero-page pointer dereferences never do, and
    // neither does a store-only opcode's read (it never reads at all).

    pub(crate) fn apply_read_effect(&mut self, addr: u16) {
        match addr {
            0x00 => {
                self.button_read_count += 1;
                if self.button_read_count >= 16 {
                    self.button_read_count = 0;
                }
                self.ram[0] = !(self.keys as u8);
            }
            0x02 => self.ram[2] &= !2,
            0x14 => self.ram[0x14] |= 1 << 6,
            0x7b => self.ram[0x7b] |= 1 << 3,
            0x93 => self.ram[0x93] |= 1 << 7,
            _ => {}
        }
    }

    pub(crate) fn mem_read(&mut self, addr: u16) -> u8 {
        self.apply_read_effect(addr);
        self.ram[addr as usize]
    }

    pub(crate) fn apply_write_effect(&mut self, addr: u16, value: u8) -> Result<()> {
        match addr {
            0x02 => self.flash.write_data(value, &mut self.rom)?,
            0x12 => self.flash.write_enable_latch(value),
            0x00 if value == 0 => self.keys |= input::FLAG_POWER_OFF | input::FLAG_LCD_CLEAN,
            0x8000 if value == 0x28 => self.keys |= input::FLAG_LCD_CLEAN,
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn mem_write(&mut self, addr: u16, value: u8) -> Result<()> {
        self.ram[addr as usize] = value;
        self.apply_write_effect(addr, value)
    }

    /// Dereferences a zero-page pointer (bytes at `zp` and `zp+1`,
    /// wrapping within the zero page). Bypasses the read-effect switch
    /// entirely, as the original does for pointer bytes.
    /// Records one trace line if a [`Trace`] sink is attached; a no-op
    /// (not even building the string) otherwise, matching the original's
    /// `#if CPU_TRACE` compile-time gate.
    pub(crate) fn trace(&mut self, make_line: impl FnOnce() -> String) {
        if let Some(t) = self.trace.as_mut() {
            t.record(make_line());
        }
    }

    /// Formats the address a trace line should show for the current PC:
    /// its ROM-relative address when it falls inside the paged frame
    /// window, the raw PC otherwise (mirrors the original's `pc - 0x300 +
    /// 0x10000 + frames[depth - 1].addr` vs. plain `pc`).
    pub(crate) fn trace_pc(&mut self, pc: u16) {
        if self.trace.is_none() {
            return;
        }
        let addr = match self.frames.top() {
            Some(f) if pc >= crate::frame::WINDOW_BASE && pc - crate::frame::WINDOW_BASE < f.size => {
                (pc - crate::frame::WINDOW_BASE) as u32 + 0x10000 + f.rom_addr
            }
            _ => pc as u32,
        };
        self.trace(|| {
            if addr > 0xffff { format!("{addr:05x}:") } else { format!("{addr:04x}:") }
        });
    }

    pub(crate) fn zp_ptr16(&self, zp: u8) -> u16 {
        let lo = self.ram[zp as usize] as u16;
        let hi = self.ram[zp.wrapping_add(1) as usize] as u16;
        lo | hi << 8
    }

    pub(crate) fn push8(&mut self, value: u8) {
        let sp = self.regs.sp;
        self.regs.sp = sp.wrapping_sub(1);
        self.ram[STACK_PAGE as usize + sp as usize] = value;
    }

    pub(crate) fn pop8(&mut self) -> u8 {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        self.ram[STACK_PAGE as usize + self.regs.sp as usize]
    }

    /// Pushes `SYS_RET - 1` onto the 6502 stack, the same marker the
    /// `0x60DE` non-tail-call trap pushes before paging in its callee, so
    /// that callee's final `RTS` lands on `SYS_RET` and pops the frame
    /// stack instead of running off into whatever garbage sits at the
    /// popped address. `boot`/`tick` are themselves top-level, trap-less
    /// calls (the reference host enters them via `pc = 0x60de`), so they
    /// need the same marker pushed by hand before dispatching.
    pub(crate) fn push_return_marker(&mut self) {
        let ret = SYS_RET.wrapping_sub(1);
        self.push8((ret >> 8) as u8);
        self.push8(ret as u8);
    }

    // -- Boot / tick (§4.I) ---------------------------------------------

    /// Dispatches the firmware's boot frame once, with the startup-
    /// animation flag and ROM-key shadow byte primed the way the
    /// reference host's `run_game` does on first entry (and on every
    /// reset, since a reset re-enters this same path after clearing CPU
    /// state).
    pub fn boot(&mut self) -> Result<()> {
        self.ram.fill(0);
        self.regs = Registers::default();
        self.ram[BOOT_ANIM_FLAG as usize] |= 1;
        self.ram[ROM_KEY_SHADOW as usize] = self.rom.key;

        self.frames.clear();
        self.regs.sp = 0x7f;
        self.push_return_marker();
        let (addr, size) = self.rom.boot_frame();
        self.dispatch_call(addr, size, false)?;
        self.run_until_frame_done()?;
        self.init_done = true;
        Ok(())
    }

    /// Runs one 30 Hz tick: decrements the idle timer, advances the
    /// sub-second counter by `elapsed_ms` worth of 256ths (carrying the
    /// division's leftover numerator in `subsecond_rem` so truncation
    /// doesn't accumulate into drift over many ticks), dispatches the
    /// per-tick game frame (unless the previous tick ended on `WAI`, in
    /// which case this tick just clears that flag and does nothing),
    /// clears the framebuffer if the firmware asked for a clean screen,
    /// and reports whether the host should keep running.
    pub fn tick(&mut self, elapsed_ms: u32) -> Result<()> {
        let idle = u16::from_le_bytes([self.ram[IDLE_TIMER as usize], self.ram[IDLE_TIMER as usize + 1]]);
        if idle != 0 {
            let idle = idle.wrapping_sub(1);
            self.ram[IDLE_TIMER as usize] = idle as u8;
            self.ram[IDLE_TIMER as usize + 1] = (idle >> 8) as u8;
        }

        let total = elapsed_ms * 256 + self.subsecond_rem;
        let whole = total / 1000;
        self.subsecond_rem = total % 1000;
        self.ram[SUBSECOND_TIMER as usize] = self.ram[SUBSECOND_TIMER as usize].wrapping_add(whole as u8);

        if self.keys & input::FLAG_WAI != 0 {
            self.keys &= !input::FLAG_WAI;
        } else {
            self.ram[TIMERS_ENABLE as usize] |= TIMERS_ENABLE_BIT;
            self.frames.clear();
            self.regs.sp = 0x7f;
            self.push_return_marker();
            let (addr, size) = self.rom.game_frame();
            self.dispatch_call(addr, size, false)?;
            self.run_until_frame_done()?;
        }

        if self.keys & input::FLAG_LCD_CLEAN != 0 {
            self.keys &= !input::FLAG_LCD_CLEAN;
            self.fb.clear();
        }
        Ok(())
    }

    /// Re-enters the boot path after a reset key release, the way
    /// `run_game`'s `goto reset` does: keeps the button/flag byte but
    /// drops the quit/reset/etc. bits, clears `init_done`, and zeroes the
    /// CPU registers and RAM before booting again.
    pub fn reset(&mut self) -> Result<()> {
        self.keys &= 0xff;
        self.init_done = false;
        self.boot()
    }

    pub(crate) fn dispatch_call(&mut self, rom_addr: u32, frame_size: u16, tail_call: bool) -> Result<()> {
        if frame_size >= crate::frame::MAX_FRAME_SIZE {
            return Err(EmuError::FrameTooLarge { size: frame_size as u32 });
        }
        if self.rom.len() < rom_addr as usize + frame_size as usize {
            return Err(EmuError::FrameReadOutsideRom { addr: rom_addr, size: frame_size as u32 });
        }
        if tail_call {
            self.frames.tail_call(rom_addr, frame_size, 0, self.rom.len())?;
        } else {
            self.frames.push(rom_addr, frame_size, 0, self.rom.len())?;
        }
        let window = crate::frame::WINDOW_BASE as usize;
        self.ram[window..window + frame_size as usize]
            .copy_from_slice(&self.rom.bytes[rom_addr as usize..rom_addr as usize + frame_size as usize]);
        self.regs.pc = crate::frame::WINDOW_BASE;
        Ok(())
    }

    /// Runs [`crate::exec::step`] until the frame's return stack empties,
    /// the firmware executes `WAI`, or the firmware powers the device off.
    /// A power-off write to address 0 ends the current instruction loop
    /// immediately rather than waiting for the frame to return on its own,
    /// matching the reference interpreter's inline `break` on that write.
    fn run_until_frame_done(&mut self) -> Result<()> {
        self.keys &= !input::FLAG_POWER_OFF;
        loop {
            match self.step()? {
                StepOutcome::Continue => {
                    if self.keys & input::FLAG_POWER_OFF != 0 {
                        return Ok(());
                    }
                }
                StepOutcome::FrameDone => return Ok(()),
            }
        }
    }
}
