use bytemuck::{Pod, Zeroable};

use crate::analysis::bars::Bar;

/// Horizontal gap left between neighbouring bars.
pub const BAR_GAP: u32 = 2;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::opaque(0, 0, 0);

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

/// Axis-aligned pixel rectangle, `[x, x + width) x [y, y + height)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Rectangle covered by bar `index` when each column is `column_width` wide.
pub fn bar_rect(index: usize, column_width: u32, bar_height: u32, canvas_height: u32) -> Rect {
    let bar_height = bar_height.min(canvas_height);
    Rect {
        x: index as u32 * column_width,
        y: canvas_height - bar_height,
        width: column_width.saturating_sub(BAR_GAP),
        height: bar_height,
    }
}

/// Row-major index of `(x, y)`, computed in `usize` so large canvases don't wrap.
fn pixel_offset(x: u32, y: u32, width: u32) -> usize {
    y as usize * width as usize + x as usize
}

/// One rendered video frame. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    index: usize,
    width: u32,
    height: u32,
    pixels: Vec<Rgba>,
}

impl Frame {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        self.pixels[pixel_offset(x, y, self.width)]
    }

    /// Row-major RGBA8 bytes, as expected by ffmpeg's `rgba` raw format.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }
}

/// Draws bars onto a fixed-size canvas.
#[derive(Clone, Copy, Debug)]
pub struct Rasterizer {
    width: u32,
    height: u32,
}

impl Rasterizer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Clear to black, then fill one bottom-aligned rectangle per bar.
    /// Remainder width past the last column stays empty.
    pub fn rasterize(&self, index: usize, bars: &[Bar]) -> Frame {
        let mut pixels = vec![Rgba::BLACK; self.width as usize * self.height as usize];
        let column_width = if bars.is_empty() {
            0
        } else {
            self.width / bars.len() as u32
        };

        for (i, bar) in bars.iter().enumerate() {
            let rect = bar_rect(i, column_width, bar.pixel_height, self.height);
            self.fill(&mut pixels, rect, bar.color);
        }

        Frame {
            index,
            width: self.width,
            height: self.height,
            pixels,
        }
    }

    fn fill(&self, pixels: &mut [Rgba], rect: Rect, color: Rgba) {
        let x_end = (rect.x + rect.width).min(self.width);
        if rect.x >= x_end {
            return;
        }
        for y in rect.y..rect.y + rect.height {
            let row = pixel_offset(0, y, self.width);
            pixels[row + rect.x as usize..row + x_end as usize].fill(color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::bars::bar_color;

    fn bar(normalized: f64, pixel_height: u32) -> Bar {
        Bar {
            bin_index: 0,
            normalized,
            pixel_height,
            color: bar_color(normalized),
        }
    }

    #[test]
    fn rect_geometry() {
        // 1280 / 64 = 20 pixel columns
        let r = bar_rect(3, 20, 100, 720);
        assert_eq!(r, Rect { x: 60, y: 620, width: 18, height: 100 });
    }

    #[test]
    fn narrow_columns_collapse_instead_of_underflowing() {
        assert_eq!(bar_rect(5, 1, 10, 10).width, 0);
        assert_eq!(bar_rect(5, 2, 10, 10).width, 0);
        assert_eq!(bar_rect(5, 3, 10, 10).width, 1);
    }

    #[test]
    fn empty_bars_give_black_canvas() {
        let frame = Rasterizer::new(8, 4).rasterize(0, &[bar(0.0, 0), bar(0.0, 0)]);
        assert_eq!(frame.as_bytes().len(), 8 * 4 * 4);
        assert!(frame.as_bytes().chunks(4).all(|p| p == [0, 0, 0, 255]));
    }

    #[test]
    fn bars_are_bottom_aligned_with_gap() {
        let frame = Rasterizer::new(10, 6).rasterize(7, &[bar(1.0, 6), bar(0.5, 2)]);
        assert_eq!(frame.index(), 7);
        let red = bar_color(1.0);
        let mid = bar_color(0.5);

        // Column width 5: bar 0 covers x 0..3, gap at 3..5
        for y in 0..6 {
            assert_eq!(frame.pixel(0, y), red);
            assert_eq!(frame.pixel(2, y), red);
            assert_eq!(frame.pixel(3, y), Rgba::BLACK);
            assert_eq!(frame.pixel(4, y), Rgba::BLACK);
        }

        // Bar 1 covers x 5..8, rows 4..6
        assert_eq!(frame.pixel(5, 3), Rgba::BLACK);
        assert_eq!(frame.pixel(5, 4), mid);
        assert_eq!(frame.pixel(7, 5), mid);
        assert_eq!(frame.pixel(8, 5), Rgba::BLACK);
    }

    #[test]
    fn remainder_width_stays_empty() {
        // 11 / 2 = 5, column 10 is never drawn
        let frame = Rasterizer::new(11, 3).rasterize(0, &[bar(1.0, 3), bar(1.0, 3)]);
        assert_eq!(frame.pixel(7, 0), bar_color(1.0));
        assert_eq!(frame.pixel(10, 0), Rgba::BLACK);
    }

    #[test]
    fn more_bars_than_pixels_does_not_panic() {
        let bars: Vec<Bar> = (0..64).map(|_| bar(1.0, 4)).collect();
        let frame = Rasterizer::new(32, 4).rasterize(0, &bars);
        assert!(frame.as_bytes().chunks(4).all(|p| p == [0, 0, 0, 255]));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn offsets_past_u32_range_do_not_wrap() {
        assert_eq!(pixel_offset(0, 65536, 65536), 1 << 32);
        assert_eq!(pixel_offset(5, u32::MAX, u32::MAX), u32::MAX as usize * u32::MAX as usize + 5);
    }

    #[test]
    fn pixel_bytes_are_rgba_order() {
        let frame = Rasterizer::new(3, 1).rasterize(0, &[bar(1.0, 1)]);
        assert_eq!(&frame.as_bytes()[..4], &[255, 0, 50, 255]);
    }
}
