//! Detection overlay drawing.
//!
//! Boxes land on a transparent RGBA canvas sized to the displayed video
//! rect. Labels use a built-in 5x7 glyph set so no font asset ships with
//! the console.

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::DetectionBox;
use crate::video::SurfaceRect;

const BOX_COLOR: Rgba<u8> = Rgba([0xFF, 0xE6, 0x00, 0xFF]);
const LABEL_BG: Rgba<u8> = Rgba([0xFF, 0xE6, 0x00, 0xFF]);
const LABEL_FG: Rgba<u8> = Rgba([0x00, 0x00, 0x00, 0xFF]);
const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

const STROKE_PX: u32 = 3;
const LABEL_BAND_PX: u32 = 20;
const DEFAULT_LABEL: &str = "fire";
const GLYPH_SCALE: u32 = 2;

pub struct OverlayRenderer {
    canvas: RgbaImage,
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self {
            canvas: RgbaImage::new(0, 0),
        }
    }

    /// Match the canvas to the displayed rect. A size change drops the old
    /// drawing; an unchanged size keeps it until the next render.
    pub fn fit_to(&mut self, rect: SurfaceRect) {
        if self.canvas.width() != rect.w || self.canvas.height() != rect.h {
            self.canvas = RgbaImage::new(rect.w, rect.h);
        }
    }

    /// Wipe the previous frame's drawing and stroke the given boxes.
    /// An empty slice leaves a fully transparent canvas.
    pub fn render(&mut self, boxes: &[DetectionBox]) {
        self.clear();
        for b in boxes {
            self.draw_box(b);
        }
    }

    pub fn clear(&mut self) {
        for pixel in self.canvas.pixels_mut() {
            *pixel = CLEAR;
        }
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    fn draw_box(&mut self, b: &DetectionBox) {
        let (cw, ch) = (self.canvas.width(), self.canvas.height());
        if cw == 0 || ch == 0 {
            return;
        }

        // All coordinates at or below 1.0 read as normalized. A tiny
        // pixel-unit box at the origin is misread and scaled; the wire
        // format does not distinguish the two cases.
        let normalized = b.x1 <= 1.0 && b.y1 <= 1.0 && b.x2 <= 1.0 && b.y2 <= 1.0;
        let (x1, y1, x2, y2) = if normalized {
            (
                b.x1 * cw as f32,
                b.y1 * ch as f32,
                b.x2 * cw as f32,
                b.y2 * ch as f32,
            )
        } else {
            (b.x1, b.y1, b.x2, b.y2)
        };
        if x2 <= x1 || y2 <= y1 {
            return;
        }

        let ix1 = x1.round() as i32;
        let iy1 = y1.round() as i32;
        let w = (x2 - x1).round().max(1.0) as u32;
        let h = (y2 - y1).round().max(1.0) as u32;

        for inset in 0..STROKE_PX {
            let rw = w.saturating_sub(inset * 2);
            let rh = h.saturating_sub(inset * 2);
            if rw == 0 || rh == 0 {
                break;
            }
            draw_hollow_rect_mut(
                &mut self.canvas,
                Rect::at(ix1 + inset as i32, iy1 + inset as i32).of_size(rw, rh),
                BOX_COLOR,
            );
        }

        let text = label_text(b);
        let band_w = text_width(&text, GLYPH_SCALE) + 8;
        let band_y = (iy1 - LABEL_BAND_PX as i32).max(0);
        draw_filled_rect_mut(
            &mut self.canvas,
            Rect::at(ix1, band_y).of_size(band_w.max(1), LABEL_BAND_PX),
            LABEL_BG,
        );
        draw_text(
            &mut self.canvas,
            &text,
            ix1 + 4,
            band_y + 3,
            GLYPH_SCALE,
            LABEL_FG,
        );
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn label_text(b: &DetectionBox) -> String {
    let label = b.label.as_deref().unwrap_or(DEFAULT_LABEL);
    match b.score {
        Some(score) => format!("{} {}%", label, (score * 100.0).round() as i32),
        None => label.to_string(),
    }
}

fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * 6 * scale
}

fn draw_text(canvas: &mut RgbaImage, text: &str, x: i32, y: i32, scale: u32, color: Rgba<u8>) {
    let mut cursor = x;
    for ch in text.chars() {
        let rows = glyph_rows(ch.to_ascii_uppercase());
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..5u32 {
                if bits & (1 << (4 - col)) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = cursor + (col * scale + dx) as i32;
                        let py = y + (row as u32 * scale + dy) as i32;
                        if px >= 0
                            && py >= 0
                            && (px as u32) < canvas.width()
                            && (py as u32) < canvas.height()
                        {
                            canvas.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
        cursor += (6 * scale) as i32;
    }
}

/// 5x7 glyph bitmaps, one byte per row, low five bits used.
fn glyph_rows(ch: char) -> [u8; 7] {
    match ch {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '%' => [0b11001, 0b11001, 0b00010, 0b00100, 0b01000, 0b10011, 0b10011],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        '_' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b11111],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        _ => [0b00000; 7],
    }
}
