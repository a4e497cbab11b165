//! Energy-graph construction and cut extraction.
//!
//! The naive build allocates one node per pixel; the slim build in
//! [`slim`] collapses weight-dominated pixels into neighboring nodes or
//! straight into a terminal before the solver runs.

pub(crate) mod slim;

use image::{GrayImage, RgbImage};
use nalgebra::{DMatrix, Vector3};

use crate::gmm::Gmm;
use crate::maxflow::FlowGraph;
use crate::trimap::{self, BGD, FGD, PR_BGD, PR_FGD};
use crate::weights::{pixel_color, NeighborWeights, LAMBDA};

/// `pixel_to_vertex` sentinel: the pixel was collapsed into the sink
/// (background) terminal.
pub const JOINED_BGD: i32 = -1;
/// `pixel_to_vertex` sentinel: the pixel was collapsed into the source
/// (foreground) terminal.
pub const JOINED_FGD: i32 = -2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Point {
    pub x: i32,
    pub y: i32,
}

/// Capacity of the source-to-pixel terminal edge: free for hard background,
/// `LAMBDA` for hard foreground, and the background-model surprisal for
/// undetermined pixels (the source capacity uses the *background* mixture).
pub(crate) fn source_weight(label: u8, color: Vector3<f64>, bgd_gmm: &Gmm) -> f64 {
    match label {
        FGD => LAMBDA,
        PR_BGD | PR_FGD => -bgd_gmm.evaluate(color).ln(),
        _ => 0.0,
    }
}

/// Capacity of the pixel-to-sink terminal edge; mirror of [`source_weight`]
/// with the foreground mixture.
pub(crate) fn sink_weight(label: u8, color: Vector3<f64>, fgd_gmm: &Gmm) -> f64 {
    match label {
        BGD => LAMBDA,
        PR_BGD | PR_FGD => -fgd_gmm.evaluate(color).ln(),
        _ => 0.0,
    }
}

/// Upper bound on directed edge count for a `width` x `height` 8-connected
/// pixel grid.
pub(crate) fn edge_bound(width: u32, height: u32) -> usize {
    let (w, h) = (width as i64, height as i64);
    (2 * (4 * w * h - 3 * (w + h) + 2)).max(0) as usize
}

/// One node per pixel, terminal capacities from the data terms, smoothness
/// edges toward the four predecessors.
pub(crate) fn build_graph(
    img: &RgbImage,
    mask: &GrayImage,
    bgd_gmm: &Gmm,
    fgd_gmm: &Gmm,
    weights: &NeighborWeights,
) -> FlowGraph {
    let (width, height) = img.dimensions();
    let mut graph = FlowGraph::with_capacity(
        (width * height) as usize,
        edge_bound(width, height),
    );
    for y in 0..height {
        for x in 0..width {
            let v = graph.add_vtx();
            let label = mask.get_pixel(x, y).0[0];
            let color = pixel_color(img, x, y);
            graph.add_term_weights(
                v,
                source_weight(label, color, bgd_gmm),
                sink_weight(label, color, fgd_gmm),
            );

            let at = (y as usize, x as usize);
            let cols = width as usize;
            if x > 0 {
                graph.add_edges(v, v - 1, weights.left[at], weights.left[at]);
            }
            if x > 0 && y > 0 {
                graph.add_edges(v, v - cols - 1, weights.upleft[at], weights.upleft[at]);
            }
            if y > 0 {
                graph.add_edges(v, v - cols, weights.up[at], weights.up[at]);
            }
            if x < width - 1 && y > 0 {
                graph.add_edges(v, v - cols + 1, weights.upright[at], weights.upright[at]);
            }
        }
    }
    graph
}

/// Run the cut on a naive graph and fold the result back into the mask.
/// Returns the flow value.
pub(crate) fn estimate_segmentation(graph: &mut FlowGraph, mask: &mut GrayImage) -> f64 {
    let flow = graph.max_flow();
    tracing::debug!(flow, "naive graph cut");
    let width = mask.width();
    for y in 0..mask.height() {
        for x in 0..width {
            let label = mask.get_pixel(x, y).0[0];
            if trimap::is_undetermined(label) {
                let v = (y * width + x) as usize;
                let new = if graph.in_source_segment(v) { PR_FGD } else { PR_BGD };
                mask.put_pixel(x, y, image::Luma([new]));
            }
        }
    }
    flow
}

/// Fold a slim cut back into the mask: collapsed pixels take their
/// terminal's side, everything else follows the residual reachability of its
/// vertex. Hard labels are never touched.
pub(crate) fn update_mask(
    graph: &FlowGraph,
    pixel_to_vertex: &DMatrix<i32>,
    mask: &mut GrayImage,
) {
    for y in 0..mask.height() {
        for x in 0..mask.width() {
            let label = mask.get_pixel(x, y).0[0];
            if !trimap::is_undetermined(label) {
                continue;
            }
            let v = pixel_to_vertex[(y as usize, x as usize)];
            let new = if v == JOINED_BGD {
                PR_BGD
            } else if v == JOINED_FGD {
                PR_FGD
            } else if graph.in_source_segment(v as usize) {
                PR_FGD
            } else {
                PR_BGD
            };
            mask.put_pixel(x, y, image::Luma([new]));
        }
    }
}

#[cfg(test)]
mod tests {
    use image::Luma;
    use statrs::assert_almost_eq;

    use super::*;
    use crate::weights::{calc_beta, GAMMA};

    fn gmm_from(samples: &[[f64; 3]]) -> Gmm {
        let mut model = Vec::new();
        let mut gmm = Gmm::from_model(&mut model).unwrap();
        gmm.begin_learning();
        for &c in samples {
            gmm.add_sample(0, Vector3::from(c));
        }
        gmm.end_learning();
        gmm
    }

    // Affinely independent sample sets keep the fitted covariance regular
    // and the mixture likelihood strictly positive near the cluster.
    const DARK: [[f64; 3]; 4] = [
        [0.0, 0.0, 0.0],
        [60.0, 0.0, 0.0],
        [0.0, 60.0, 0.0],
        [0.0, 0.0, 60.0],
    ];
    const BRIGHT: [[f64; 3]; 4] = [
        [255.0, 255.0, 255.0],
        [195.0, 255.0, 255.0],
        [255.0, 195.0, 255.0],
        [255.0, 255.0, 195.0],
    ];

    #[test]
    fn data_terms_encode_hard_constraints() {
        let bgd = gmm_from(&DARK);
        let fgd = gmm_from(&BRIGHT);
        let c = Vector3::new(100.0, 100.0, 100.0);

        assert_eq!(source_weight(BGD, c, &bgd), 0.0);
        assert_eq!(sink_weight(BGD, c, &fgd), LAMBDA);
        assert_eq!(source_weight(FGD, c, &bgd), LAMBDA);
        assert_eq!(sink_weight(FGD, c, &fgd), 0.0);
        for label in [PR_BGD, PR_FGD] {
            assert_almost_eq!(source_weight(label, c, &bgd), -bgd.evaluate(c).ln(), 1e-12);
            assert_almost_eq!(sink_weight(label, c, &fgd), -fgd.evaluate(c).ln(), 1e-12);
        }
    }

    #[test]
    fn single_pixel_cut_is_the_smaller_terminal_weight() {
        // A 1x1 image has empty weight tables; the cut is decided by the
        // lone terminal pair.
        let img = RgbImage::from_pixel(1, 1, image::Rgb([30, 30, 30]));
        let mut mask = GrayImage::from_pixel(1, 1, Luma([PR_FGD]));
        let bgd = gmm_from(&DARK);
        let fgd = gmm_from(&BRIGHT);

        let beta = calc_beta(&img);
        assert_eq!(beta, 0.0);
        let weights = NeighborWeights::new(&img, beta, GAMMA);
        let mut graph = build_graph(&img, &mask, &bgd, &fgd, &weights);

        let c = pixel_color(&img, 0, 0);
        let fs = source_weight(PR_FGD, c, &bgd);
        let ts = sink_weight(PR_FGD, c, &fgd);
        let flow = estimate_segmentation(&mut graph, &mut mask);
        assert_almost_eq!(flow, fs.min(ts), 1e-9);
        // (30, 30, 30) is far more background-like: the source edge is the
        // cheaper cut, the pixel lands on the sink side.
        assert!(fs < ts);
        assert_eq!(mask.get_pixel(0, 0).0[0], PR_BGD);
    }

    #[test]
    fn update_mask_honors_sentinels_and_hard_labels() {
        let mut graph = FlowGraph::with_capacity(1, 0);
        let v = graph.add_vtx();
        graph.add_term_weights(v, 5.0, 1.0);
        graph.max_flow();
        assert!(graph.in_source_segment(v));

        let mut mask = GrayImage::new(2, 2);
        mask.put_pixel(0, 0, Luma([BGD]));
        mask.put_pixel(1, 0, Luma([PR_FGD]));
        mask.put_pixel(0, 1, Luma([PR_BGD]));
        mask.put_pixel(1, 1, Luma([PR_BGD]));
        let pixel_to_vertex = DMatrix::from_row_slice(2, 2, &[
            JOINED_FGD, JOINED_BGD,
            JOINED_FGD, v as i32,
        ]);

        update_mask(&graph, &pixel_to_vertex, &mut mask);
        // Hard background ignores its (nonsense) sentinel.
        assert_eq!(mask.get_pixel(0, 0).0[0], BGD);
        assert_eq!(mask.get_pixel(1, 0).0[0], PR_BGD);
        assert_eq!(mask.get_pixel(0, 1).0[0], PR_FGD);
        assert_eq!(mask.get_pixel(1, 1).0[0], PR_FGD);
    }
}
