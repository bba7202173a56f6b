//! Cross-module scenarios driven entirely through the public API: a
//! synthesized ROM, a boot/tick cycle, and the resulting device state.
//! Complements the per-module unit tests with full boot-to-frame and
//! tick-to-frame runs instead of testing one subsystem in isolation.

use phosphor_core::prelude::{Rom, System};

const MAGIC_AT: usize = 0x23;

fn base_rom_bytes() -> Vec<u8> {
    let mut bytes = vec![0u8; 4 << 20];
    bytes[MAGIC_AT] = b't';
    bytes[MAGIC_AT + 1] = b'o';
    bytes[MAGIC_AT + 2] = b'n';
    bytes[MAGIC_AT + 3] = b'y';
    bytes
}

fn set_boot_frame(bytes: &mut [u8], addr: u32, size: u16, code: &[u8]) {
    bytes[3] = addr as u8;
    bytes[4] = (addr >> 8) as u8;
    bytes[5] = (addr >> 16) as u8; // shares a byte with size's low byte
    bytes[6] = (size >> 8) as u8;
    assert_eq!((addr >> 16) as u8, size as u8, "addr's top byte must equal size's low byte");
    bytes[addr as usize..addr as usize + code.len()].copy_from_slice(code);
}

fn set_game_frame(bytes: &mut [u8], addr: u32, size: u16, code: &[u8]) {
    bytes[0x1b] = addr as u8;
    bytes[0x1c] = (addr >> 8) as u8;
    bytes[0x1d] = (addr >> 16) as u8; // shares a byte with size's low byte
    bytes[0x1e] = (size >> 8) as u8;
    assert_eq!((addr >> 16) as u8, size as u8, "addr's top byte must equal size's low byte");
    bytes[addr as usize..addr as usize + code.len()].copy_from_slice(code);
}

/// Scenario seed 1 (§8): a ROM whose plaintext resources-offset field is
/// `0x00 0x10 0x00` reports a resource table starting at `0x1000`.
#[test]
fn resource_table_offset_after_load() {
    let mut bytes = base_rom_bytes();
    bytes[0] = 0x00;
    bytes[1] = 0x10;
    bytes[2] = 0x00;
    let rom = Rom::load(bytes).unwrap();
    assert_eq!(rom.resource_table_offset, 0x1000);
}

/// Boots a minimal synthesized ROM whose boot frame immediately returns
/// (`JMP $7000`) and checks the device ends up in the expected resting
/// state: initialized, frame stack empty, framebuffer present.
#[test]
fn boot_to_first_frame_smoke_test() {
    let mut bytes = base_rom_bytes();
    set_boot_frame(&mut bytes, 0x030300, 3, &[0x4c, 0x00, 0x70]); // JMP $7000
    let rom = Rom::load(bytes).unwrap();
    let mut sys = System::new(rom);

    sys.boot().unwrap();

    assert!(sys.init_done);
    assert_eq!(sys.frames.depth(), 0);
    assert_eq!(sys.fb.pixels.len(), 128 * sys.rom.model.screen_h());
}

/// Scenario seed 2 (§8): the clear-screen BIOS trap (`X=0x0C`), invoked
/// through a real `JSR $6000`/`JMP $7000` game-frame program, leaves
/// every framebuffer byte equal to the requested color.
#[test]
fn bios_clear_screen_trap_fills_framebuffer() {
    let mut bytes = base_rom_bytes();
    set_boot_frame(&mut bytes, 0x030300, 3, &[0x4c, 0x00, 0x70]); // JMP $7000

    #[rustfmt::skip]
    let code: [u8; 23] = [
        0xa9, 0x00,             // LDA #$00        ; start row
        0x8d, 0x00, 0x01,       // STA $0100
        0xa9, 0x7f,             // LDA #$7F        ; end row - 1
        0x8d, 0x01, 0x01,       // STA $0101
        0xa9, 0x42,             // LDA #$42        ; fill color
        0x8d, 0x02, 0x01,       // STA $0102
        0xa2, 0x0c,             // LDX #$0C        ; bios_clear_screen
        0x20, 0x00, 0x60,       // JSR $6000
        0x4c, 0x00, 0x70,       // JMP $7000
    ];
    set_game_frame(&mut bytes, 0x170300, code.len() as u16, &code);

    let rom = Rom::load(bytes).unwrap();
    let mut sys = System::new(rom);
    sys.boot().unwrap();

    sys.tick(9).unwrap();

    assert!(sys.fb.pixels.iter().all(|&b| b == 0x42));
}

/// A boot frame that ends in a real `RTS` instead of `JMP $7000` only
/// works if `boot` pushed the `SYS_RET - 1` return marker itself before
/// dispatching — there's no `0x60DE` trap involved at the top level to
/// push it. Regression test for the top-level entry points bypassing
/// that push.
#[test]
fn boot_frame_ending_in_rts_returns_through_sys_ret() {
    let mut bytes = base_rom_bytes();
    #[rustfmt::skip]
    let code: [u8; 1] = [
        0x60, // RTS
    ];
    set_boot_frame(&mut bytes, 0x010300, 1, &code);
    let rom = Rom::load(bytes).unwrap();
    let mut sys = System::new(rom);

    sys.boot().unwrap();

    assert!(sys.init_done);
    assert_eq!(sys.frames.depth(), 0);
}

/// The sub-second counter at `mem[0xAF]` must keep advancing tick after
/// tick instead of freezing after the first one: regression test for an
/// earlier version that subtracted the *previous* tick's whole-256ths
/// value from the *current* one (always ~0 once `elapsed_ms` settles
/// into a steady 1/30 s cadence) instead of carrying the division's
/// leftover numerator.
#[test]
fn subsecond_counter_keeps_advancing_across_steady_ticks() {
    let mut bytes = base_rom_bytes();
    set_boot_frame(&mut bytes, 0x030300, 3, &[0x4c, 0x00, 0x70]); // JMP $7000
    set_game_frame(&mut bytes, 0x170300, 3, &[0x4c, 0x00, 0x70]); // JMP $7000
    let rom = Rom::load(bytes).unwrap();
    let mut sys = System::new(rom);
    sys.boot().unwrap();

    for _ in 0..30 {
        sys.tick(33).unwrap();
    }

    // floor(30 * 33 * 256 / 1000), reconstructed exactly by carrying the
    // per-tick division remainder rather than dropped every call.
    assert_eq!(sys.ram[0xaf], 253);
}

/// Scenario seed 6 (§8): storing 0 to address 0 ends the current tick's
/// instruction loop immediately rather than running on into whatever
/// follows the write.
#[test]
fn power_off_write_ends_tick_before_the_next_instruction() {
    let mut bytes = base_rom_bytes();
    set_boot_frame(&mut bytes, 0x030300, 3, &[0x4c, 0x00, 0x70]); // JMP $7000

    #[rustfmt::skip]
    let code: [u8; 6] = [
        0xa9, 0x00,       // LDA #$00
        0x8d, 0x00, 0x00, // STA $0000   ; power off
        0x00,             // BRK         ; never reached if power-off short-circuits
    ];
    set_game_frame(&mut bytes, 0x060400, code.len() as u16, &code);

    let rom = Rom::load(bytes).unwrap();
    let mut sys = System::new(rom);
    sys.boot().unwrap();

    sys.tick(9).unwrap();

    assert_eq!(sys.ram[0], 0);
    assert_eq!(sys.keys & phosphor_core::input::FLAG_POWER_OFF, phosphor_core::input::FLAG_POWER_OFF);
}
