//! The segmentation driver: mixture seeding, component assignment and the
//! assign / learn / cut / update iteration.

use image::{GrayImage, RgbImage};
use nalgebra::{DMatrix, Vector3};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::gmm::{Gmm, COMPONENTS};
use crate::graph::slim::build_slim_graph;
use crate::graph::update_mask;
use crate::kmeans::kmeans;
use crate::trimap::{self, check_mask, init_mask_with_rect, Rect};
use crate::weights::{calc_beta, pixel_color, NeighborWeights, GAMMA};

/// How [`segment`] interprets its mask and rect arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SegmentMode {
    /// Rebuild the mask from `rect` and seed fresh mixture models.
    InitWithRect,
    /// Take the caller's mask as-is and seed fresh mixture models.
    InitWithMask,
    /// Continue iterating with previously learned models.
    Eval,
}

const KMEANS_ITERATIONS: usize = 10;

/// Refine a trimap by iterated graph cuts.
///
/// `mask` uses the labels [`BGD`](crate::BGD), [`FGD`](crate::FGD),
/// [`PR_BGD`](crate::PR_BGD) and [`PR_FGD`](crate::PR_FGD); hard labels are
/// user constraints and are never modified, only the probable labels flip.
/// The two model buffers are caller-owned and persist learned mixture
/// parameters across calls (pass empty vectors on the first call).
///
/// # Example
///
/// ```
/// use image::{GrayImage, Rgb, RgbImage};
/// use grabcut::{segment, Rect, SegmentMode, BGD, PR_FGD};
///
/// // Two half-planes; seed with a rectangle over the bright one.
/// let mut img = RgbImage::new(4, 4);
/// for (x, _, px) in img.enumerate_pixels_mut() {
///     *px = if x < 2 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) };
/// }
/// let mut mask = GrayImage::new(4, 4);
/// let (mut bgd, mut fgd) = (Vec::new(), Vec::new());
/// segment(
///     &img,
///     &mut mask,
///     Rect::new(2, 0, 2, 4),
///     &mut bgd,
///     &mut fgd,
///     1,
///     SegmentMode::InitWithRect,
/// )
/// .unwrap();
/// for (x, _, px) in mask.enumerate_pixels() {
///     assert_eq!(px.0[0], if x < 2 { BGD } else { PR_FGD });
/// }
/// ```
pub fn segment(
    img: &RgbImage,
    mask: &mut GrayImage,
    rect: Rect,
    bgd_model: &mut Vec<f64>,
    fgd_model: &mut Vec<f64>,
    iter_count: usize,
    mode: SegmentMode,
) -> Result<()> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::EmptyImage);
    }
    if mode == SegmentMode::Eval && (bgd_model.is_empty() || fgd_model.is_empty()) {
        return Err(Error::ModelShape { actual: 0 });
    }

    let mut bgd_gmm = Gmm::from_model(bgd_model)?;
    let mut fgd_gmm = Gmm::from_model(fgd_model)?;

    match mode {
        SegmentMode::InitWithRect => {
            init_mask_with_rect(mask, img.dimensions(), rect);
            init_gmms(img, mask, &mut bgd_gmm, &mut fgd_gmm)?;
            bgd_gmm.write_model(bgd_model);
            fgd_gmm.write_model(fgd_model);
        }
        SegmentMode::InitWithMask => {
            check_mask(img.dimensions(), mask)?;
            init_gmms(img, mask, &mut bgd_gmm, &mut fgd_gmm)?;
            bgd_gmm.write_model(bgd_model);
            fgd_gmm.write_model(fgd_model);
        }
        SegmentMode::Eval => {}
    }

    if iter_count == 0 {
        return Ok(());
    }
    if mode == SegmentMode::Eval {
        check_mask(img.dimensions(), mask)?;
    }

    let beta = calc_beta(img);
    let weights = NeighborWeights::new(img, beta, GAMMA);
    let mut comp_idxs = DMatrix::zeros(height as usize, width as usize);

    for i in 0..iter_count {
        assign_components(img, mask, &bgd_gmm, &fgd_gmm, &mut comp_idxs);
        learn_gmms(img, mask, &comp_idxs, &mut bgd_gmm, &mut fgd_gmm);
        let mut slim = build_slim_graph(img, mask, &bgd_gmm, &fgd_gmm, &weights);
        let flow = slim.graph.max_flow();
        debug!(iteration = i, flow, s2tw = slim.s2tw, "cut");
        update_mask(&slim.graph, &slim.pixel_to_vertex, mask);
    }

    bgd_gmm.write_model(bgd_model);
    fgd_gmm.write_model(fgd_model);
    Ok(())
}

/// Seed both mixtures: split the pixels into background and foreground
/// candidates by their trimap label, cluster each set with k-means and refit
/// from the clustered samples.
pub(crate) fn init_gmms(
    img: &RgbImage,
    mask: &GrayImage,
    bgd_gmm: &mut Gmm,
    fgd_gmm: &mut Gmm,
) -> Result<()> {
    let mut bgd_samples: Vec<Vector3<f64>> = Vec::new();
    let mut fgd_samples: Vec<Vector3<f64>> = Vec::new();
    for (x, y, px) in mask.enumerate_pixels() {
        if trimap::is_background(px.0[0]) {
            bgd_samples.push(pixel_color(img, x, y));
        } else {
            fgd_samples.push(pixel_color(img, x, y));
        }
    }
    if bgd_samples.is_empty() {
        return Err(Error::EmptySamples { foreground: false });
    }
    if fgd_samples.is_empty() {
        return Err(Error::EmptySamples { foreground: true });
    }

    let bgd_labels = kmeans(&bgd_samples, COMPONENTS, KMEANS_ITERATIONS);
    let fgd_labels = kmeans(&fgd_samples, COMPONENTS, KMEANS_ITERATIONS);

    bgd_gmm.begin_learning();
    for (label, sample) in bgd_labels.into_iter().zip(bgd_samples) {
        bgd_gmm.add_sample(label, sample);
    }
    bgd_gmm.end_learning();

    fgd_gmm.begin_learning();
    for (label, sample) in fgd_labels.into_iter().zip(fgd_samples) {
        fgd_gmm.add_sample(label, sample);
    }
    fgd_gmm.end_learning();
    Ok(())
}

/// Pick, for every pixel, the most likely component of the mixture its
/// current trimap label selects.
fn assign_components(
    img: &RgbImage,
    mask: &GrayImage,
    bgd_gmm: &Gmm,
    fgd_gmm: &Gmm,
    comp_idxs: &mut DMatrix<usize>,
) {
    for (x, y, px) in mask.enumerate_pixels() {
        let color = pixel_color(img, x, y);
        comp_idxs[(y as usize, x as usize)] = if trimap::is_background(px.0[0]) {
            bgd_gmm.which_component(color)
        } else {
            fgd_gmm.which_component(color)
        };
    }
}

/// Refit both mixtures from the current assignment.
fn learn_gmms(
    img: &RgbImage,
    mask: &GrayImage,
    comp_idxs: &DMatrix<usize>,
    bgd_gmm: &mut Gmm,
    fgd_gmm: &mut Gmm,
) {
    bgd_gmm.begin_learning();
    fgd_gmm.begin_learning();
    for (x, y, px) in mask.enumerate_pixels() {
        let ci = comp_idxs[(y as usize, x as usize)];
        let color = pixel_color(img, x, y);
        if trimap::is_background(px.0[0]) {
            bgd_gmm.add_sample(ci, color);
        } else {
            fgd_gmm.add_sample(ci, color);
        }
    }
    bgd_gmm.end_learning();
    fgd_gmm.end_learning();
}

#[cfg(test)]
mod tests {
    use image::{Luma, Rgb};

    use super::*;
    use crate::gmm::MODEL_LEN;
    use crate::trimap::{BGD, FGD, PR_BGD, PR_FGD};

    fn half_plane_image() -> RgbImage {
        let mut img = RgbImage::new(4, 4);
        for (x, _, px) in img.enumerate_pixels_mut() {
            *px = if x < 2 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) };
        }
        img
    }

    #[test]
    fn half_plane_seeded_with_the_bright_half_keeps_it_foreground() {
        let img = half_plane_image();
        let mut mask = GrayImage::new(4, 4);
        let (mut bgd, mut fgd) = (Vec::new(), Vec::new());
        segment(
            &img,
            &mut mask,
            Rect::new(2, 0, 2, 4),
            &mut bgd,
            &mut fgd,
            1,
            SegmentMode::InitWithRect,
        )
        .unwrap();
        for (x, _, px) in mask.enumerate_pixels() {
            assert_eq!(px.0[0], if x < 2 { BGD } else { PR_FGD });
        }
        assert_eq!(bgd.len(), MODEL_LEN);
        assert_eq!(fgd.len(), MODEL_LEN);
    }

    #[test]
    fn rect_covering_everything_leaves_no_background_candidates() {
        let img = RgbImage::new(2, 2);
        let mut mask = GrayImage::new(2, 2);
        let (mut bgd, mut fgd) = (Vec::new(), Vec::new());
        let err = segment(
            &img,
            &mut mask,
            Rect::new(0, 0, 2, 2),
            &mut bgd,
            &mut fgd,
            1,
            SegmentMode::InitWithRect,
        )
        .unwrap_err();
        assert_eq!(err, Error::EmptySamples { foreground: false });
        // The mask keeps the state the failing call reached.
        assert!(mask.pixels().all(|px| px.0[0] == PR_FGD));
    }

    #[test]
    fn single_seed_pixel_survives_iteration() {
        let mut img = RgbImage::new(3, 3);
        img.put_pixel(1, 1, Rgb([255, 0, 0]));
        let mut mask = GrayImage::new(3, 3);
        let (mut bgd, mut fgd) = (Vec::new(), Vec::new());
        segment(
            &img,
            &mut mask,
            Rect::new(1, 1, 1, 1),
            &mut bgd,
            &mut fgd,
            2,
            SegmentMode::InitWithRect,
        )
        .unwrap();
        for (x, y, px) in mask.enumerate_pixels() {
            let expected = if (x, y) == (1, 1) { PR_FGD } else { BGD };
            assert_eq!(px.0[0], expected);
        }
    }

    #[test]
    fn eval_without_learned_models_is_an_argument_error() {
        let img = half_plane_image();
        let mut mask = GrayImage::from_pixel(4, 4, Luma([PR_BGD]));
        let (mut bgd, mut fgd) = (Vec::new(), Vec::new());
        let err = segment(
            &img,
            &mut mask,
            Rect::default(),
            &mut bgd,
            &mut fgd,
            1,
            SegmentMode::Eval,
        )
        .unwrap_err();
        assert_eq!(err, Error::ModelShape { actual: 0 });
        assert!(err.to_string().starts_with("model must have"));
    }

    #[test]
    fn wrong_model_buffer_length_is_rejected() {
        let img = half_plane_image();
        let mut mask = GrayImage::new(4, 4);
        let (mut bgd, mut fgd) = (vec![0.0; 7], Vec::new());
        let err = segment(
            &img,
            &mut mask,
            Rect::new(2, 0, 2, 4),
            &mut bgd,
            &mut fgd,
            1,
            SegmentMode::InitWithRect,
        )
        .unwrap_err();
        assert_eq!(err, Error::ModelShape { actual: 7 });
    }

    #[test]
    fn zero_iterations_only_initializes_the_mask() {
        let img = half_plane_image();
        let mut mask = GrayImage::new(4, 4);
        let (mut bgd, mut fgd) = (Vec::new(), Vec::new());
        segment(
            &img,
            &mut mask,
            Rect::new(2, 0, 2, 4),
            &mut bgd,
            &mut fgd,
            0,
            SegmentMode::InitWithRect,
        )
        .unwrap();
        for (x, _, px) in mask.enumerate_pixels() {
            assert_eq!(px.0[0], if x < 2 { BGD } else { PR_FGD });
        }
        // The seeded models persist for a later Eval call.
        assert_eq!(bgd.len(), MODEL_LEN);
        assert!(bgd.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn one_call_with_n_iterations_matches_n_chained_calls() {
        let mut img = RgbImage::new(6, 5);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let v = (x * 40 + y * 13) as u8;
            *px = Rgb([v, 255 - v, v / 2]);
        }
        let rect = Rect::new(2, 1, 3, 3);

        let mut mask_a = GrayImage::new(1, 1);
        let (mut bgd_a, mut fgd_a) = (Vec::new(), Vec::new());
        segment(&img, &mut mask_a, rect, &mut bgd_a, &mut fgd_a, 2, SegmentMode::InitWithRect)
            .unwrap();

        let mut mask_b = GrayImage::new(1, 1);
        let (mut bgd_b, mut fgd_b) = (Vec::new(), Vec::new());
        segment(&img, &mut mask_b, rect, &mut bgd_b, &mut fgd_b, 1, SegmentMode::InitWithRect)
            .unwrap();
        segment(&img, &mut mask_b, rect, &mut bgd_b, &mut fgd_b, 1, SegmentMode::Eval).unwrap();

        assert_eq!(mask_a.as_raw(), mask_b.as_raw());
        assert_eq!(bgd_a, bgd_b);
        assert_eq!(fgd_a, fgd_b);
    }

    #[test]
    fn off_image_rect_initializes_all_background_and_fails_seeding() {
        let img = half_plane_image();
        let mut mask = GrayImage::new(4, 4);
        let (mut bgd, mut fgd) = (Vec::new(), Vec::new());
        let err = segment(
            &img,
            &mut mask,
            Rect::new(40, 40, 2, 2),
            &mut bgd,
            &mut fgd,
            1,
            SegmentMode::InitWithRect,
        )
        .unwrap_err();
        assert_eq!(err, Error::EmptySamples { foreground: true });
        assert!(mask.pixels().all(|px| px.0[0] == BGD));
    }

    #[test]
    fn hard_labels_survive_iteration_and_labels_stay_valid() {
        let mut img = RgbImage::new(5, 5);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgb([(x * 50) as u8, (y * 50) as u8, 128]);
        }
        let mut mask = GrayImage::from_pixel(5, 5, Luma([PR_BGD]));
        mask.put_pixel(0, 0, Luma([BGD]));
        mask.put_pixel(4, 4, Luma([FGD]));
        mask.put_pixel(2, 2, Luma([PR_FGD]));
        mask.put_pixel(3, 2, Luma([PR_FGD]));

        let (mut bgd, mut fgd) = (Vec::new(), Vec::new());
        segment(
            &img,
            &mut mask,
            Rect::default(),
            &mut bgd,
            &mut fgd,
            3,
            SegmentMode::InitWithMask,
        )
        .unwrap();

        assert_eq!(mask.get_pixel(0, 0).0[0], BGD);
        assert_eq!(mask.get_pixel(4, 4).0[0], FGD);
        for px in mask.pixels() {
            assert!(px.0[0] <= PR_FGD);
        }
    }

    #[test]
    fn constant_image_keeps_hard_labels_and_valid_probable_labels() {
        // Both mixtures degenerate to the same point mass, the data terms
        // cancel, and the hard-background border decides the cut.
        let img = RgbImage::from_pixel(5, 4, Rgb([90, 90, 90]));
        let mut mask = GrayImage::new(1, 1);
        let (mut bgd, mut fgd) = (Vec::new(), Vec::new());
        segment(
            &img,
            &mut mask,
            Rect::new(1, 1, 3, 2),
            &mut bgd,
            &mut fgd,
            1,
            SegmentMode::InitWithRect,
        )
        .unwrap();
        for (x, y, px) in mask.enumerate_pixels() {
            let seeded = (1..4).contains(&x) && (1..3).contains(&y);
            if seeded {
                assert!(px.0[0] == PR_BGD || px.0[0] == PR_FGD);
            } else {
                assert_eq!(px.0[0], BGD);
            }
        }
    }

    #[test]
    fn invalid_mask_values_are_rejected_in_mask_mode() {
        let img = half_plane_image();
        let mut mask = GrayImage::from_pixel(4, 4, Luma([9]));
        let (mut bgd, mut fgd) = (Vec::new(), Vec::new());
        let err = segment(
            &img,
            &mut mask,
            Rect::default(),
            &mut bgd,
            &mut fgd,
            1,
            SegmentMode::InitWithMask,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MaskValue { value: 9, .. }));
    }
}
