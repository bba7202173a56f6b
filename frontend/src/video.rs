//! Presentation: palette lookup followed by manual pixel/row replication
//! at the configured zoom level, the way the reference host's
//! `sys_update` builds its window surface rather than leaving the
//! scaling to hardware texture stretching.

use phosphor_core::prelude::{Framebuffer, Palette, SCREEN_W};
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};

pub struct Video {
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    zoom: u32,
    screen_h: usize,
    scaled: Vec<u8>,
}

impl Video {
    /// Creates an SDL window sized to `zoom` times the device's native
    /// `SCREEN_W x screen_h` resolution.
    pub fn new(sdl_video: &sdl2::VideoSubsystem, title: &str, screen_h: usize, zoom: u32) -> Self {
        let width = SCREEN_W as u32 * zoom;
        let height = screen_h as u32 * zoom;

        let window = sdl_video
            .window(title, width, height)
            .position_centered()
            .build()
            .expect("failed to create window");

        let canvas = window.into_canvas().accelerated().build().expect("failed to create canvas");
        let texture_creator = canvas.texture_creator();

        Self {
            canvas,
            texture_creator,
            zoom,
            screen_h,
            scaled: vec![0u8; width as usize * height as usize * 3],
        }
    }

    /// Looks up every indexed pixel in `palette`, replicates it `zoom`
    /// times horizontally and vertically, and presents the result.
    pub fn present(&mut self, fb: &Framebuffer, palette: &Palette) {
        let zoom = self.zoom as usize;
        let width = SCREEN_W * zoom;

        for y in 0..self.screen_h {
            let src_row = &fb.pixels[y * SCREEN_W..(y + 1) * SCREEN_W];
            let mut row = vec![0u8; width * 3];
            for (x, &index) in src_row.iter().enumerate() {
                let rgb = palette.rgb[index as usize];
                for dx in 0..zoom {
                    let o = (x * zoom + dx) * 3;
                    row[o..o + 3].copy_from_slice(&rgb);
                }
            }
            for dy in 0..zoom {
                let o = (y * zoom + dy) * width * 3;
                self.scaled[o..o + width * 3].copy_from_slice(&row);
            }
        }

        let mut texture = self
            .texture_creator
            .create_texture_streaming(PixelFormatEnum::RGB24, width as u32, self.screen_h as u32 * zoom as u32)
            .expect("failed to create texture");
        texture
            .update(None, &self.scaled, width * 3)
            .expect("failed to update texture");

        self.canvas.clear();
        self.canvas.copy(&texture, None, None).expect("failed to copy texture");
        self.canvas.present();
    }
}
