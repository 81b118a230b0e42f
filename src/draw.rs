//! Drawing primitives for RGB24 buffers.
//!
//! Boxes, noise blocks and a small embedded 5x7 bitmap font. These back the
//! failure test card and the text-overlay filter. Everything clips against
//! the target dimensions; out-of-range coordinates draw less, never panic.

use rand::Rng;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
}

/// Fill `[x1, x2) x [y1, y2)` with a solid color.
pub fn draw_box(target: &mut [u8], tw: u32, th: u32, x1: u32, y1: u32, x2: u32, y2: u32, col: Rgb) {
    let x2 = x2.min(tw);
    let y2 = y2.min(th);

    for y in y1..y2 {
        let row = (y * tw) as usize * 3;
        for x in x1..x2 {
            let o = row + x as usize * 3;
            target[o] = col.r;
            target[o + 1] = col.g;
            target[o + 2] = col.b;
        }
    }
}

/// Fill `[x1, x2) x [y1, y2)` with per-pixel gray noise.
pub fn draw_noise(target: &mut [u8], tw: u32, th: u32, x1: u32, y1: u32, x2: u32, y2: u32) {
    let mut rng = rand::thread_rng();
    let x2 = x2.min(tw);
    let y2 = y2.min(th);

    for y in y1..y2 {
        let row = (y * tw) as usize * 3;
        for x in x1..x2 {
            let o = row + x as usize * 3;
            let v: u8 = rng.gen();
            target[o] = v;
            target[o + 1] = v;
            target[o + 2] = v;
        }
    }
}

pub fn draw_horizontal(target: &mut [u8], tw: u32, th: u32, x: u32, y: u32, w: u32, col: Rgb) {
    draw_box(target, tw, th, x, y, x.saturating_add(w), y.saturating_add(1), col);
}

pub fn draw_vertical(target: &mut [u8], tw: u32, th: u32, x: u32, y: u32, h: u32, col: Rgb) {
    draw_box(target, tw, th, x, y, x.saturating_add(1), y.saturating_add(h), col);
}

// ----------------------------------------------------------------------------
// bitmap font
// ----------------------------------------------------------------------------

/// Glyph cell geometry: 5x7 pixels plus one blank column/row of spacing.
pub const GLYPH_W: u32 = 6;
pub const GLYPH_H: u32 = 8;

/// Pixel width of `text` rendered at `scale`.
pub fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * GLYPH_W * scale
}

/// Pixel height of one text line at `scale`.
pub fn text_height(scale: u32) -> u32 {
    GLYPH_H * scale
}

/// Render one line of text. Lowercase maps to uppercase, unknown characters
/// render as a hollow box. `bg` fills the whole glyph cell first when given.
/// Coordinates may be negative; pixels outside the target are skipped.
pub fn draw_text(
    target: &mut [u8],
    tw: u32,
    th: u32,
    x: i32,
    y: i32,
    scale: u32,
    text: &str,
    fg: Rgb,
    bg: Option<Rgb>,
) {
    let scale = scale.max(1);
    let mut pen_x = x;

    for ch in text.chars() {
        let rows = glyph(ch);

        for gy in 0..GLYPH_H {
            let row_bits = if gy < 7 { rows[gy as usize] } else { 0 };

            for gx in 0..GLYPH_W {
                let on = gx < 5 && (row_bits >> (4 - gx)) & 1 == 1;
                let col = if on {
                    Some(fg)
                } else {
                    bg
                };
                let Some(col) = col else { continue };

                for sy in 0..scale {
                    for sx in 0..scale {
                        let px = pen_x + (gx * scale + sx) as i32;
                        let py = y + (gy * scale + sy) as i32;
                        put_pixel(target, tw, th, px, py, col);
                    }
                }
            }
        }

        pen_x += (GLYPH_W * scale) as i32;
    }
}

fn put_pixel(target: &mut [u8], tw: u32, th: u32, x: i32, y: i32, col: Rgb) {
    if x < 0 || y < 0 || x as u32 >= tw || y as u32 >= th {
        return;
    }
    let o = (y as u32 * tw + x as u32) as usize * 3;
    target[o] = col.r;
    target[o + 1] = col.g;
    target[o + 2] = col.b;
}

/// 5x7 glyph rows, bit 4 = leftmost pixel.
fn glyph(c: char) -> [u8; 7] {
    let c = c.to_ascii_uppercase();
    match c {
        ' ' => [0; 7],
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
        'Y' => [0b10001, 0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
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
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100],
        ',' => [0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b00100, 0b01000],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        '+' => [0b00000, 0b00100, 0b00100, 0b11111, 0b00100, 0b00100, 0b00000],
        '_' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b11111],
        '/' => [0b00001, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b10000],
        '%' => [0b11000, 0b11001, 0b00010, 0b00100, 0b01000, 0b10011, 0b00011],
        '!' => [0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00000, 0b00100],
        '?' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b00000, 0b00100],
        '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
        // hollow box for anything else
        _ => [0b11111, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11111],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas(w: u32, h: u32) -> Vec<u8> {
        vec![0u8; (w * h * 3) as usize]
    }

    fn pixel(buf: &[u8], tw: u32, x: u32, y: u32) -> (u8, u8, u8) {
        let o = ((y * tw + x) * 3) as usize;
        (buf[o], buf[o + 1], buf[o + 2])
    }

    #[test]
    fn box_fills_exclusive_range() {
        let mut buf = canvas(8, 8);
        draw_box(&mut buf, 8, 8, 2, 2, 4, 4, Rgb::new(9, 8, 7));

        assert_eq!(pixel(&buf, 8, 2, 2), (9, 8, 7));
        assert_eq!(pixel(&buf, 8, 3, 3), (9, 8, 7));
        assert_eq!(pixel(&buf, 8, 4, 4), (0, 0, 0));
        assert_eq!(pixel(&buf, 8, 1, 2), (0, 0, 0));
    }

    #[test]
    fn box_clips_against_target() {
        let mut buf = canvas(4, 4);
        draw_box(&mut buf, 4, 4, 2, 2, 100, 100, Rgb::WHITE);
        assert_eq!(pixel(&buf, 4, 3, 3), (255, 255, 255));
    }

    #[test]
    fn noise_is_gray() {
        let mut buf = canvas(16, 4);
        draw_noise(&mut buf, 16, 4, 0, 0, 16, 4);
        for px in buf.chunks_exact(3) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
        }
    }

    #[test]
    fn text_marks_pixels_and_clips() {
        let mut buf = canvas(32, 16);
        draw_text(&mut buf, 32, 16, 0, 0, 1, "A", Rgb::WHITE, None);
        assert!(buf.iter().any(|v| *v != 0));

        // off-canvas rendering must not panic
        let mut buf = canvas(8, 8);
        draw_text(&mut buf, 8, 8, -20, -20, 2, "XYZ", Rgb::WHITE, None);
    }

    #[test]
    fn background_fills_whole_cell() {
        let mut buf = canvas(8, 8);
        draw_text(&mut buf, 8, 8, 0, 0, 1, " ", Rgb::WHITE, Some(Rgb::new(1, 2, 3)));
        // a space glyph paints only background
        assert_eq!(pixel(&buf, 8, 0, 0), (1, 2, 3));
        assert_eq!(pixel(&buf, 8, 5, 7), (1, 2, 3));
    }

    #[test]
    fn text_width_scales() {
        assert_eq!(text_width("AB", 1), 12);
        assert_eq!(text_width("AB", 4), 48);
        assert_eq!(text_height(4), 32);
    }
}
