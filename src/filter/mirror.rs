//! Horizontal and vertical mirroring.

use super::Filter;
use crate::source::Source;

pub struct MirrorH;

impl Filter for MirrorH {
    fn uses_in_out(&self) -> bool {
        true
    }

    fn apply_io(
        &self,
        _src: Option<&Source>,
        _ts: u64,
        w: u32,
        h: u32,
        _prev: Option<&[u8]>,
        input: &[u8],
        output: &mut [u8],
    ) {
        let (w, h) = (w as usize, h as usize);
        for y in 0..h {
            let row = y * w * 3;
            for x in 0..w {
                let src = row + (w - 1 - x) * 3;
                let dst = row + x * 3;
                output[dst..dst + 3].copy_from_slice(&input[src..src + 3]);
            }
        }
    }
}

pub struct MirrorV;

impl Filter for MirrorV {
    fn uses_in_out(&self) -> bool {
        true
    }

    fn apply_io(
        &self,
        _src: Option<&Source>,
        _ts: u64,
        w: u32,
        h: u32,
        _prev: Option<&[u8]>,
        input: &[u8],
        output: &mut [u8],
    ) {
        let stride = w as usize * 3;
        let h = h as usize;
        for y in 0..h {
            let src = (h - 1 - y) * stride;
            let dst = y * stride;
            output[dst..dst + stride].copy_from_slice(&input[src..src + stride]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizontal_swaps_columns() {
        let input = vec![1, 1, 1, 2, 2, 2, 3, 3, 3];
        let mut output = vec![0u8; 9];
        MirrorH.apply_io(None, 0, 3, 1, None, &input, &mut output);
        assert_eq!(output, vec![3, 3, 3, 2, 2, 2, 1, 1, 1]);
    }

    #[test]
    fn vertical_swaps_rows() {
        let input = vec![1, 1, 1, 2, 2, 2, 3, 3, 3];
        let mut output = vec![0u8; 9];
        MirrorV.apply_io(None, 0, 1, 3, None, &input, &mut output);
        assert_eq!(output, vec![3, 3, 3, 2, 2, 2, 1, 1, 1]);
    }

    #[test]
    fn double_horizontal_is_identity() {
        let input = vec![9, 8, 7, 6, 5, 4];
        let mut mid = vec![0u8; 6];
        let mut out = vec![0u8; 6];
        MirrorH.apply_io(None, 0, 2, 1, None, &input, &mut mid);
        MirrorH.apply_io(None, 0, 2, 1, None, &mid, &mut out);
        assert_eq!(out, input);
    }
}
