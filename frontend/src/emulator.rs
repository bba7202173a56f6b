//! The 30 Hz tick/event loop tying input, video, and [`System`] together.
//!
//! The reference host waits `START_DELAY` (500 ms) after boot before
//! polling input for the first time, then runs one tick on (roughly)
//! every following 1/30 s wall-clock boundary until the outer loop's
//! quit/reset condition is set.

use std::time::{Duration, Instant};

use phosphor_core::prelude::System;
use sdl2::event::Event;

use crate::input::{self, Control};
use crate::video::Video;

const TICK: Duration = Duration::from_millis(1000 / 30);
const START_DELAY: Duration = Duration::from_millis(500);

pub fn run(sys: &mut System, zoom: u32) -> phosphor_core::prelude::Result<()> {
    let sdl_context = sdl2::init().expect("failed to initialize SDL2");
    let sdl_video = sdl_context.video().expect("failed to init SDL video");
    let mut event_pump = sdl_context.event_pump().expect("failed to get event pump");

    let mut video = Video::new(&sdl_video, "toumapet", sys.rom.model.screen_h(), zoom);

    std::thread::sleep(START_DELAY);

    let mut last_tick = Instant::now();
    loop {
        for event in event_pump.poll_iter() {
            match event {
                Event::Quit { .. } => sys.request_quit(),
                Event::KeyDown { scancode: Some(sc), repeat: false, .. } => {
                    match input::control_for(sc) {
                        Some(Control::Button(b)) => sys.set_button(b, true),
                        Some(Control::Reset) => sys.set_reset_held(true),
                        Some(Control::Quit) => sys.request_quit(),
                        None => {}
                    }
                }
                Event::KeyUp { scancode: Some(sc), .. } => match input::control_for(sc) {
                    Some(Control::Button(b)) => sys.set_button(b, false),
                    Some(Control::Reset) => sys.set_reset_held(false),
                    _ => {}
                },
                _ => {}
            }
        }

        if sys.quit_requested() {
            return Ok(());
        }
        if sys.should_exit() {
            sys.reset()?;
        }

        let now = Instant::now();
        let elapsed = now.duration_since(last_tick);
        last_tick = now;
        sys.tick(elapsed.as_millis() as u32)?;

        video.present(&sys.fb, &sys.palette);

        let budget = TICK.saturating_sub(Instant::now().duration_since(now));
        if !budget.is_zero() {
            std::thread::sleep(budget);
        }
    }
}
