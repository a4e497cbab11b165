//! Smoothness term: the beta statistic and the four neighbor weight tables.

use image::RgbImage;
use nalgebra::{DMatrix, Vector3};

/// Smoothness magnitude.
pub const GAMMA: f64 = 50.0;
/// "Infinite" terminal capacity enforcing hard trimap constraints.
pub const LAMBDA: f64 = 9.0 * GAMMA;

/// A pixel's color as a 3-vector of doubles.
pub(crate) fn pixel_color(img: &RgbImage, x: u32, y: u32) -> Vector3<f64> {
    let p = img.get_pixel(x, y).0;
    Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64)
}

/// Number of predecessor-neighbor pairs in a `width` x `height` grid, over
/// the left, up-left, up and up-right offsets.
fn pair_count(width: u32, height: u32) -> i64 {
    let (w, h) = (width as i64, height as i64);
    4 * w * h - 3 * (w + h) + 2
}

/// The inverse-variance scale of the smoothness term:
/// `1 / (2 * avg(||c_i - c_j||^2))` over the four predecessor offsets, or 0
/// for an image with no color variation at all.
pub fn calc_beta(img: &RgbImage) -> f64 {
    let (width, height) = img.dimensions();
    let mut beta = 0.0;
    for y in 0..height {
        for x in 0..width {
            let color = pixel_color(img, x, y);
            if x > 0 {
                beta += (color - pixel_color(img, x - 1, y)).norm_squared();
            }
            if x > 0 && y > 0 {
                beta += (color - pixel_color(img, x - 1, y - 1)).norm_squared();
            }
            if y > 0 {
                beta += (color - pixel_color(img, x, y - 1)).norm_squared();
            }
            if y > 0 && x < width - 1 {
                beta += (color - pixel_color(img, x + 1, y - 1)).norm_squared();
            }
        }
    }
    if beta <= f64::EPSILON {
        0.0
    } else {
        1.0 / (2.0 * beta / pair_count(width, height) as f64)
    }
}

/// Per-pixel smoothness weights toward the four predecessor neighbors.
///
/// Entry `(y, x)` of each table is the weight of the edge from pixel `(x, y)`
/// to that neighbor; border entries whose neighbor falls outside the image
/// hold 0. Diagonal tables carry the `1/sqrt(2)` length compensation.
#[derive(Debug, Clone)]
pub struct NeighborWeights {
    pub left: DMatrix<f64>,
    pub upleft: DMatrix<f64>,
    pub up: DMatrix<f64>,
    pub upright: DMatrix<f64>,
}

impl NeighborWeights {
    pub fn new(img: &RgbImage, beta: f64, gamma: f64) -> Self {
        let (width, height) = img.dimensions();
        let (rows, cols) = (height as usize, width as usize);
        let gamma_diag = gamma / 2f64.sqrt();
        let mut w = Self {
            left: DMatrix::zeros(rows, cols),
            upleft: DMatrix::zeros(rows, cols),
            up: DMatrix::zeros(rows, cols),
            upright: DMatrix::zeros(rows, cols),
        };
        for y in 0..height {
            for x in 0..width {
                let color = pixel_color(img, x, y);
                let at = (y as usize, x as usize);
                if x > 0 {
                    let d2 = (color - pixel_color(img, x - 1, y)).norm_squared();
                    w.left[at] = gamma * (-beta * d2).exp();
                }
                if x > 0 && y > 0 {
                    let d2 = (color - pixel_color(img, x - 1, y - 1)).norm_squared();
                    w.upleft[at] = gamma_diag * (-beta * d2).exp();
                }
                if y > 0 {
                    let d2 = (color - pixel_color(img, x, y - 1)).norm_squared();
                    w.up[at] = gamma * (-beta * d2).exp();
                }
                if y > 0 && x < width - 1 {
                    let d2 = (color - pixel_color(img, x + 1, y - 1)).norm_squared();
                    w.upright[at] = gamma_diag * (-beta * d2).exp();
                }
            }
        }
        w
    }
}
