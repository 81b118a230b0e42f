//! Text overlay filter.
//!
//! Renders a line (or several, split on `\n`) onto the frame. The text may
//! contain `$id$`, `$descr$` and `$ts$` placeholders plus `strftime`-style
//! `%` codes, which format the frame timestamp.

use std::str::FromStr;

use anyhow::{anyhow, bail};
use chrono::format::{Item, StrftimeItems};
use chrono::{Local, TimeZone};

use super::Filter;
use crate::draw::{self, Rgb};
use crate::source::Source;

const MARGIN: i32 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextPosition {
    UpperLeft,
    UpperCenter,
    UpperRight,
    CenterLeft,
    Center,
    CenterRight,
    LowerLeft,
    LowerCenter,
    LowerRight,
    Xy { x: i32, y: i32 },
}

impl FromStr for TextPosition {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "upper-left" => TextPosition::UpperLeft,
            "upper-center" => TextPosition::UpperCenter,
            "upper-right" => TextPosition::UpperRight,
            "center-left" => TextPosition::CenterLeft,
            "center-center" | "center" => TextPosition::Center,
            "center-right" => TextPosition::CenterRight,
            "lower-left" => TextPosition::LowerLeft,
            "lower-center" => TextPosition::LowerCenter,
            "lower-right" => TextPosition::LowerRight,
            other => {
                let Some(coords) = other.strip_prefix("xy:") else {
                    bail!("unknown text position {other:?}");
                };
                let (x, y) = coords
                    .split_once(',')
                    .ok_or_else(|| anyhow!("text position {other:?} needs xy:<x>,<y>"))?;
                TextPosition::Xy {
                    x: x.trim().parse()?,
                    y: y.trim().parse()?,
                }
            }
        })
    }
}

pub struct AddText {
    text: String,
    pos: TextPosition,
    scale: u32,
    fg: Rgb,
    bg: Option<Rgb>,
}

impl AddText {
    pub fn new(text: impl Into<String>, pos: TextPosition) -> Self {
        Self {
            text: text.into(),
            pos,
            scale: 2,
            fg: Rgb::WHITE,
            bg: Some(Rgb::BLACK),
        }
    }

    pub fn with_style(mut self, scale: u32, fg: Rgb, bg: Option<Rgb>) -> Self {
        self.scale = scale.max(1);
        self.fg = fg;
        self.bg = bg;
        self
    }

    fn render(&self, src: Option<&Source>, ts: u64) -> String {
        let mut s = self.text.clone();
        match src {
            Some(src) => {
                s = s.replace("$id$", src.id());
                s = s.replace("$descr$", src.descr());
            }
            None => {
                s = s.replace("$id$", "");
                s = s.replace("$descr$", "");
            }
        }
        s = s.replace("$ts$", &(ts / 1_000_000).to_string());

        if s.contains('%') {
            s = format_time(&s, ts);
        }
        s
    }

    fn line_x(&self, line_w: u32, w: u32) -> i32 {
        let (line_w, w) = (line_w as i32, w as i32);
        match self.pos {
            TextPosition::UpperLeft | TextPosition::CenterLeft | TextPosition::LowerLeft => MARGIN,
            TextPosition::UpperCenter | TextPosition::Center | TextPosition::LowerCenter => (w - line_w) / 2,
            TextPosition::UpperRight | TextPosition::CenterRight | TextPosition::LowerRight => {
                w - line_w - MARGIN
            }
            TextPosition::Xy { x, .. } => x,
        }
    }

    fn block_y(&self, block_h: u32, h: u32) -> i32 {
        let (block_h, h) = (block_h as i32, h as i32);
        match self.pos {
            TextPosition::UpperLeft | TextPosition::UpperCenter | TextPosition::UpperRight => MARGIN,
            TextPosition::CenterLeft | TextPosition::Center | TextPosition::CenterRight => (h - block_h) / 2,
            TextPosition::LowerLeft | TextPosition::LowerCenter | TextPosition::LowerRight => {
                h - block_h - MARGIN
            }
            TextPosition::Xy { y, .. } => y,
        }
    }
}

impl Filter for AddText {
    fn apply(&self, src: Option<&Source>, ts: u64, w: u32, h: u32, _prev: Option<&[u8]>, work: &mut [u8]) {
        let rendered = self.render(src, ts);
        let lines: Vec<&str> = rendered.split('\n').collect();

        let line_h = draw::text_height(self.scale);
        let y0 = self.block_y(line_h * lines.len() as u32, h);

        for (i, line) in lines.iter().enumerate() {
            let x = self.line_x(draw::text_width(line, self.scale), w);
            let y = y0 + (i as u32 * line_h) as i32;
            draw::draw_text(work, w, h, x, y, self.scale, line, self.fg, self.bg);
        }
    }
}

/// Format `%` codes against the frame timestamp (microseconds since the
/// epoch). An unparseable format string comes back verbatim, text overlay
/// must never take the stream down.
pub(crate) fn format_time(fmt: &str, ts_us: u64) -> String {
    let items: Vec<Item<'_>> = StrftimeItems::new(fmt).collect();
    if items.iter().any(|i| matches!(i, Item::Error)) {
        return fmt.to_string();
    }

    let secs = (ts_us / 1_000_000) as i64;
    let nanos = ((ts_us % 1_000_000) * 1000) as u32;
    match Local.timestamp_opt(secs, nanos).single() {
        Some(dt) => dt.format_with_items(items.iter()).to_string(),
        None => fmt.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_parse() {
        assert_eq!("upper-left".parse::<TextPosition>().unwrap(), TextPosition::UpperLeft);
        assert_eq!("center".parse::<TextPosition>().unwrap(), TextPosition::Center);
        assert_eq!(
            "xy:12,-3".parse::<TextPosition>().unwrap(),
            TextPosition::Xy { x: 12, y: -3 }
        );
        assert!("topish".parse::<TextPosition>().is_err());
    }

    #[test]
    fn placeholders_expand_without_source() {
        let f = AddText::new("cam $id$ at $ts$", TextPosition::UpperLeft);
        assert_eq!(f.render(None, 5_000_000), "cam  at 5");
    }

    #[test]
    fn time_codes_format_frame_timestamp() {
        let f = AddText::new("%Y", TextPosition::UpperLeft);
        let s = f.render(None, 1_000_000);
        assert_eq!(s.len(), 4);
        assert!(s.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn broken_time_format_passes_through() {
        assert_eq!(format_time("100%!", 0), "100%!");
    }

    #[test]
    fn literal_text_without_percent_is_untouched() {
        let f = AddText::new("hello", TextPosition::LowerRight);
        assert_eq!(f.render(None, 42), "hello");
    }

    #[test]
    fn lower_right_draws_in_lower_right_quadrant() {
        let f = AddText::new("A", TextPosition::LowerRight).with_style(1, Rgb::WHITE, None);
        let (w, h) = (64u32, 64u32);
        let mut work = vec![0u8; (w * h * 3) as usize];
        f.apply(None, 0, w, h, None, &mut work);

        let mut touched = Vec::new();
        for y in 0..h {
            for x in 0..w {
                if work[((y * w + x) * 3) as usize] != 0 {
                    touched.push((x, y));
                }
            }
        }
        assert!(!touched.is_empty());
        assert!(touched.iter().all(|(x, y)| *x >= 32 && *y >= 32));
    }

    #[test]
    fn multiline_blocks_stack() {
        let f = AddText::new("A\nB", TextPosition::UpperLeft).with_style(1, Rgb::WHITE, None);
        let (w, h) = (32u32, 32u32);
        let mut work = vec![0u8; (w * h * 3) as usize];
        f.apply(None, 0, w, h, None, &mut work);

        let row_lit = |y: u32| (0..w).any(|x| work[((y * w + x) * 3) as usize] != 0);
        // first line occupies rows 4..11, second 12..19
        assert!(row_lit(5));
        assert!(row_lit(14));
    }
}
