//! Trimap labels and mask initialization.

use image::{GrayImage, Luma};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Hard background label.
pub const BGD: u8 = 0;
/// Hard foreground label.
pub const FGD: u8 = 1;
/// Probable background label.
pub const PR_BGD: u8 = 2;
/// Probable foreground label.
pub const PR_FGD: u8 = 3;

/// True for `BGD` and `PR_BGD`; the label split used to pick the mixture a
/// pixel samples into.
pub(crate) fn is_background(label: u8) -> bool {
    label == BGD || label == PR_BGD
}

/// True for `PR_BGD` and `PR_FGD`; only these labels may flip during
/// iteration.
pub(crate) fn is_undetermined(label: u8) -> bool {
    label == PR_BGD || label == PR_FGD
}

/// A rectangular seed region in pixel coordinates.
///
/// Negative origins and out-of-bounds extents are allowed; the rectangle is
/// clipped against the image before use. A rectangle that clips to nothing
/// yields an all-background mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Clip to an image of the given dimensions, returning the half-open
    /// pixel ranges `(x0..x1, y0..y1)`; empty ranges when nothing remains.
    fn clip(&self, width: u32, height: u32) -> (std::ops::Range<u32>, std::ops::Range<u32>) {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let w = self.width.min(width as i32 - x0);
        let h = self.height.min(height as i32 - y0);
        if w <= 0 || h <= 0 {
            return (0..0, 0..0);
        }
        (x0 as u32..(x0 + w) as u32, y0 as u32..(y0 + h) as u32)
    }
}

/// Rebuild the mask from a seed rectangle: background everywhere, probable
/// foreground inside the clipped rectangle.
pub(crate) fn init_mask_with_rect(mask: &mut GrayImage, size: (u32, u32), rect: Rect) {
    let (width, height) = size;
    *mask = GrayImage::from_pixel(width, height, Luma([BGD]));
    let (xs, ys) = rect.clip(width, height);
    for y in ys {
        for x in xs.clone() {
            mask.put_pixel(x, y, Luma([PR_FGD]));
        }
    }
}

/// Validate a caller-provided mask: dimensions must match the image and every
/// pixel must hold one of the four labels.
pub(crate) fn check_mask(size: (u32, u32), mask: &GrayImage) -> Result<()> {
    if mask.dimensions() != size {
        return Err(Error::MaskSize {
            expected: size,
            actual: mask.dimensions(),
        });
    }
    for (x, y, px) in mask.enumerate_pixels() {
        let value = px.0[0];
        if value != BGD && value != FGD && value != PR_BGD && value != PR_FGD {
            return Err(Error::MaskValue { x, y, value });
        }
    }
    Ok(())
}
