use std::path::PathBuf;

use chrono::{Datelike, Timelike};
use clap::Parser;
use phosphor_core::prelude::{Rom, System};
use phosphor_core::{save, trace::Trace};

mod emulator;
mod input;
mod video;

/// toumapet: a W65C02S handheld virtual-pet emulator.
#[derive(Parser)]
#[command(name = "toumapet")]
struct Args {
    /// Firmware ROM image to load.
    #[arg(long, default_value = "toumapet.bin")]
    rom: PathBuf,

    /// Save file to load on start and write back on exit.
    #[arg(long)]
    save: Option<PathBuf>,

    /// Window zoom level (1-5).
    #[arg(long, default_value_t = 3)]
    zoom: u32,

    /// Stamp the current date/time into RAM on boot.
    #[arg(long)]
    update_time: bool,

    /// Write a CPU trace log to this path on exit.
    #[arg(long)]
    log: Option<PathBuf>,

    /// Maximum trace log size in bytes.
    #[arg(long, default_value_t = 4 << 20)]
    log_size: usize,
}

const MAX_ROM_SIZE: usize = 8 << 20;
const MIN_LOG_SIZE: usize = 256;
const MAX_LOG_SIZE: usize = 1 << 30;

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> phosphor_core::prelude::Result<()> {
    let zoom = args.zoom.clamp(1, 5);

    let rom_bytes = save::read_rom(&args.rom, MAX_ROM_SIZE)?;
    let rom = Rom::load(rom_bytes)?;
    let mut sys = System::new(rom);

    if args.log.is_some() {
        let log_size = args.log_size.clamp(MIN_LOG_SIZE, MAX_LOG_SIZE);
        sys.set_trace(Trace::new(log_size));
    }

    if let Some(save_path) = &args.save {
        save::load(&mut sys, save_path)?;
    }
    if !sys.init_done {
        sys.boot()?;
    }
    if args.update_time {
        stamp_current_time(&mut sys);
    }

    let result = emulator::run(&mut sys, zoom);

    if let Some(save_path) = &args.save {
        save::store(&mut sys, save_path)?;
    }
    if let Some(log_path) = &args.log
        && let Some(trace) = &sys.trace
    {
        trace.flush_to(log_path)?;
    }

    result
}

/// Writes the host's current local date/time into the firmware's clock
/// fields the way `--update-time` does in the reference interpreter: month
/// and day are stored zero-based (`tm_mon`/`tm_mday - 1`), and seconds are
/// doubled into a single byte.
fn stamp_current_time(sys: &mut System) {
    let now = chrono::Local::now();
    sys.ram[0x1df] = (now.year() % 100) as u8;
    sys.ram[0x1e0] = now.month0() as u8;
    sys.ram[0x1e1] = (now.day() - 1) as u8;
    sys.ram[0x1e2] = now.hour() as u8;
    sys.ram[0x1e3] = now.minute() as u8;
    sys.ram[0x1e4] = (now.second() as u8).wrapping_mul(2);
}
