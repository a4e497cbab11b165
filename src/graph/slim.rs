//! Reduced ("slim") graph construction.
//!
//! Pixels whose terminal bias or edge mass toward an existing super-node
//! dominates half of their total incident weight are collapsed into that
//! destination instead of receiving a node of their own. The resulting graph
//! has the same min-cut value as the naive one, up to the source-to-sink
//! constant accumulated in `s2tw`.
//!
//! Everything here depends on the row-major scan order: vertex assignments
//! of earlier pixels are visible when later pixels probe their predecessors,
//! and the terminal chains are monotone in scan position, which is what lets
//! pending-weight walks terminate early.

use image::{GrayImage, RgbImage};
use nalgebra::DMatrix;

use crate::gmm::Gmm;
use crate::maxflow::FlowGraph;
use crate::trimap::{self, BGD};
use crate::weights::{pixel_color, NeighborWeights};

use super::{edge_bound, sink_weight, source_weight, Point, JOINED_BGD, JOINED_FGD};

/// The slim graph plus the bookkeeping the cut reader needs.
pub(crate) struct SlimGraph {
    pub graph: FlowGraph,
    /// Node index per pixel, or a `JOINED_*` sentinel for collapsed pixels.
    pub pixel_to_vertex: DMatrix<i32>,
    /// Weight of edges joining the two terminal components directly. Part of
    /// every cut, so it is reported next to the solver's flow instead of
    /// being handed to it.
    pub s2tw: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Join {
    Vertex(usize),
    Sink,
    Source,
}

fn joined_bgd(v: i32) -> bool {
    v == JOINED_BGD
}

fn joined_fgd(v: i32) -> bool {
    v == JOINED_FGD
}

pub(crate) fn build_slim_graph(
    img: &RgbImage,
    mask: &GrayImage,
    bgd_gmm: &Gmm,
    fgd_gmm: &Gmm,
    weights: &NeighborWeights,
) -> SlimGraph {
    Builder::new(img, mask, bgd_gmm, fgd_gmm, weights).build()
}

/// Total incident weight of every pixel in the un-reduced graph: the eight
/// directional smoothness weights plus both terminal weights. Computed once
/// up front; never updated.
fn init_sigma_w(
    img: &RgbImage,
    mask: &GrayImage,
    bgd_gmm: &Gmm,
    fgd_gmm: &Gmm,
    w: &NeighborWeights,
) -> DMatrix<f64> {
    let (width, height) = img.dimensions();
    let (rows, cols) = (height as usize, width as usize);
    let mut sigma = DMatrix::zeros(rows, cols);
    for y in 0..rows {
        for x in 0..cols {
            let mut s = w.left[(y, x)] + w.upleft[(y, x)] + w.up[(y, x)] + w.upright[(y, x)];
            if x < cols - 1 {
                s += w.left[(y, x + 1)];
            }
            if x < cols - 1 && y < rows - 1 {
                s += w.upleft[(y + 1, x + 1)];
            }
            if y < rows - 1 {
                s += w.up[(y + 1, x)];
            }
            if x > 0 && y < rows - 1 {
                s += w.upright[(y + 1, x - 1)];
            }

            let label = mask.get_pixel(x as u32, y as u32).0[0];
            let color = pixel_color(img, x as u32, y as u32);
            sigma[(y, x)] = s
                + source_weight(label, color, bgd_gmm)
                + sink_weight(label, color, fgd_gmm);
        }
    }
    sigma
}

/// Weight of the edges between chain pixel `q` and pixels that have not been
/// scanned yet, while the scan sits at `p` (exclusive). Only pixels on the
/// scan frontier contribute: the row of `p` left of it, and the row above
/// from `p.x` rightward.
fn pending_sum_w(p: Point, q: Point, rows: i32, cols: i32, w: &NeighborWeights) -> f64 {
    let mut s = 0.0;
    let frontier = (q.y == p.y && q.x < p.x) || (q.y == p.y - 1 && q.x >= p.x);
    if frontier {
        if q.x == p.x - 1 {
            s += w.left[(q.y as usize, (q.x + 1) as usize)];
        }
        if q.y < rows - 1 {
            s += w.up[((q.y + 1) as usize, q.x as usize)];
            if q.x > 0 && q.x != p.x {
                s += w.upright[((q.y + 1) as usize, (q.x - 1) as usize)];
            }
            if q.x < cols - 1 {
                s += w.upleft[((q.y + 1) as usize, (q.x + 1) as usize)];
            }
        }
    }
    if q.y == p.y - 1 && q.x == p.x - 1 {
        s += w.upleft[(p.y as usize, p.x as usize)];
    }
    s
}

/// Pending weight over a terminal chain, walked from the tail. Chains grow
/// in raster order, so once a pixel sits strictly above `p` and left of
/// `p.x - 1` nothing earlier can still contribute.
fn chain_pending(p: Point, chain: &[Point], rows: i32, cols: i32, w: &NeighborWeights) -> f64 {
    let mut s = 0.0;
    for &q in chain.iter().rev() {
        s += pending_sum_w(p, q, rows, cols, w);
        if q.y <= p.y - 1 && q.x < p.x - 1 {
            break;
        }
    }
    s
}

struct Builder<'a> {
    img: &'a RgbImage,
    mask: &'a GrayImage,
    bgd_gmm: &'a Gmm,
    fgd_gmm: &'a Gmm,
    weights: &'a NeighborWeights,
    rows: i32,
    cols: i32,
    graph: FlowGraph,
    pixel_to_vertex: DMatrix<i32>,
    /// Per-pixel link to the previously collapsed pixel of its vertex.
    vtx_to_pixel: DMatrix<Option<Point>>,
    /// Chain head per vertex.
    first_pixel: Vec<Option<Point>>,
    sink_chain: Vec<Point>,
    source_chain: Vec<Point>,
    sigma_w: DMatrix<f64>,
    /// Capacity mass attached to each terminal so far; grows with every
    /// terminal weight routed into the graph, the terminal weights of
    /// collapsed pixels, and source-to-sink edges.
    sink_sigma_w: f64,
    source_sigma_w: f64,
    s2tw: f64,
    joined: usize,
}

impl<'a> Builder<'a> {
    fn new(
        img: &'a RgbImage,
        mask: &'a GrayImage,
        bgd_gmm: &'a Gmm,
        fgd_gmm: &'a Gmm,
        weights: &'a NeighborWeights,
    ) -> Self {
        let (width, height) = img.dimensions();
        let (rows, cols) = (height as usize, width as usize);
        Self {
            img,
            mask,
            bgd_gmm,
            fgd_gmm,
            weights,
            rows: height as i32,
            cols: width as i32,
            graph: FlowGraph::with_capacity((width * height) as usize, edge_bound(width, height)),
            pixel_to_vertex: DMatrix::from_element(rows, cols, 0),
            vtx_to_pixel: DMatrix::from_element(rows, cols, None),
            first_pixel: Vec::new(),
            sink_chain: Vec::new(),
            source_chain: Vec::new(),
            sigma_w: init_sigma_w(img, mask, bgd_gmm, fgd_gmm, weights),
            sink_sigma_w: 0.0,
            source_sigma_w: 0.0,
            s2tw: 0.0,
            joined: 0,
        }
    }

    fn build(mut self) -> SlimGraph {
        for y in 0..self.rows {
            for x in 0..self.cols {
                let p = Point { x, y };
                self.classify(p);
                self.connect_predecessors(p);
            }
        }
        tracing::debug!(
            vertices = self.graph.vtx_count(),
            joined = self.joined,
            s2tw = self.s2tw,
            "slim graph built"
        );
        SlimGraph {
            graph: self.graph,
            pixel_to_vertex: self.pixel_to_vertex,
            s2tw: self.s2tw,
        }
    }

    fn at(&self, p: Point) -> (usize, usize) {
        (p.y as usize, p.x as usize)
    }

    fn label(&self, p: Point) -> u8 {
        self.mask.get_pixel(p.x as u32, p.y as u32).0[0]
    }

    /// Terminal weights routed through here also feed the terminal mass
    /// accumulators used by the dual join condition.
    fn add_term_weights(&mut self, v: usize, from_source: f64, to_sink: f64) {
        self.graph.add_term_weights(v, from_source, to_sink);
        self.source_sigma_w += from_source;
        self.sink_sigma_w += to_sink;
    }

    /// Collapse pixel `p` into a terminal. Its data weight toward the other
    /// terminal turns into a source-to-sink edge.
    fn join_terminal(&mut self, p: Point, target: Join, from_source: f64, to_sink: f64) {
        let at = self.at(p);
        if target == Join::Sink {
            self.pixel_to_vertex[at] = JOINED_BGD;
            self.sink_chain.push(p);
            self.s2tw += from_source;
            self.sink_sigma_w += from_source + to_sink;
            self.source_sigma_w += from_source;
        } else {
            self.pixel_to_vertex[at] = JOINED_FGD;
            self.source_chain.push(p);
            self.s2tw += to_sink;
            self.source_sigma_w += from_source + to_sink;
            self.sink_sigma_w += to_sink;
        }
    }

    fn classify(&mut self, p: Point) {
        let at = self.at(p);
        let label = self.label(p);
        let color = pixel_color(self.img, p.x as u32, p.y as u32);
        let from_source = source_weight(label, color, self.bgd_gmm);
        let to_sink = sink_weight(label, color, self.fgd_gmm);

        if !trimap::is_undetermined(label) {
            let target = if label == BGD { Join::Sink } else { Join::Source };
            self.join_terminal(p, target, from_source, to_sink);
            return;
        }

        match self.search_join(p, from_source, to_sink) {
            Some(Join::Vertex(v)) => {
                self.joined += 1;
                self.pixel_to_vertex[at] = v as i32;
                self.vtx_to_pixel[at] = self.first_pixel[v];
                self.first_pixel[v] = Some(p);
                self.add_term_weights(v, from_source, to_sink);
            }
            Some(target) => {
                self.joined += 1;
                self.join_terminal(p, target, from_source, to_sink);
            }
            None => {
                let v = self.graph.add_vtx();
                self.first_pixel.push(Some(p));
                self.pixel_to_vertex[at] = v as i32;
                self.add_term_weights(v, from_source, to_sink);
            }
        }
    }

    /// Decide where pixel `p` can be collapsed, if anywhere.
    fn search_join(&self, p: Point, from_source: f64, to_sink: f64) -> Option<Join> {
        let at = self.at(p);
        // Predecessor targets and edge weights, fixed probe order.
        let mut nbr: [Option<i32>; 4] = [None; 4];
        let mut w = [0.0f64; 4];
        if p.x > 0 {
            nbr[0] = Some(self.pixel_to_vertex[(at.0, at.1 - 1)]);
            w[0] = self.weights.left[at];
        }
        if p.x > 0 && p.y > 0 {
            nbr[1] = Some(self.pixel_to_vertex[(at.0 - 1, at.1 - 1)]);
            w[1] = self.weights.upleft[at];
        }
        if p.y > 0 {
            nbr[2] = Some(self.pixel_to_vertex[(at.0 - 1, at.1)]);
            w[2] = self.weights.up[at];
        }
        if p.y > 0 && p.x < self.cols - 1 {
            nbr[3] = Some(self.pixel_to_vertex[(at.0 - 1, at.1 + 1)]);
            w[3] = self.weights.upright[at];
        }

        // Aggregate the edge mass per distinct target; a terminal target
        // additionally attracts the pixel's own data weight toward it.
        let mut s = [0.0f64; 4];
        for i in 0..4 {
            let Some(n) = nbr[i] else { continue };
            for j in 0..4 {
                if nbr[j] == Some(n) {
                    s[i] += w[j];
                }
            }
            if joined_bgd(n) {
                s[i] += to_sink;
            } else if joined_fgd(n) {
                s[i] += from_source;
            }
        }

        // A dominant terminal bias decides immediately.
        let half = 0.5 * self.sigma_w[at];
        if to_sink >= half {
            return Some(Join::Sink);
        }
        if from_source >= half {
            return Some(Join::Source);
        }

        // Edge mass toward one target dominating the pixel's own total.
        for i in 0..4 {
            let Some(n) = nbr[i] else { continue };
            if s[i] >= half {
                return Some(self.join_of(n));
            }
        }

        // Dual condition against a real candidate's incident mass, pending
        // edges included.
        for i in 0..4 {
            let Some(n) = nbr[i] else { continue };
            if n >= 0 {
                let total = self.graph.sum_w(n as usize) + self.vertex_pending(p, n as usize);
                if s[i] >= 0.5 * total {
                    return Some(Join::Vertex(n as usize));
                }
            }
        }

        // Dual condition against a terminal's accumulated mass plus the
        // pending tail of its chain.
        for i in 0..4 {
            let Some(n) = nbr[i] else { continue };
            if n >= 0 {
                continue;
            }
            let (mass, chain) = if joined_bgd(n) {
                (self.sink_sigma_w, &self.sink_chain)
            } else {
                (self.source_sigma_w, &self.source_chain)
            };
            let total = mass + chain_pending(p, chain, self.rows, self.cols, self.weights);
            if s[i] >= 0.5 * total {
                return Some(self.join_of(n));
            }
        }
        None
    }

    fn join_of(&self, n: i32) -> Join {
        if n >= 0 {
            Join::Vertex(n as usize)
        } else if joined_bgd(n) {
            Join::Sink
        } else {
            Join::Source
        }
    }

    /// Pending edge weight of vertex `v`, summed over its whole pixel chain.
    fn vertex_pending(&self, p: Point, v: usize) -> f64 {
        let mut s = 0.0;
        let mut cur = self.first_pixel[v];
        while let Some(q) = cur {
            s += pending_sum_w(p, q, self.rows, self.cols, self.weights);
            cur = self.vtx_to_pixel[self.at(q)];
        }
        s
    }

    /// Write the four predecessor smoothness edges of `p` into the graph,
    /// folding edges against collapsed pixels into terminal weights.
    fn connect_predecessors(&mut self, p: Point) {
        let at = self.at(p);
        let v = self.pixel_to_vertex[at];
        if p.x > 0 {
            let n = self.pixel_to_vertex[(at.0, at.1 - 1)];
            self.connect(v, n, self.weights.left[at]);
        }
        if p.x > 0 && p.y > 0 {
            let n = self.pixel_to_vertex[(at.0 - 1, at.1 - 1)];
            self.connect(v, n, self.weights.upleft[at]);
        }
        if p.y > 0 {
            let n = self.pixel_to_vertex[(at.0 - 1, at.1)];
            self.connect(v, n, self.weights.up[at]);
        }
        if p.x < self.cols - 1 && p.y > 0 {
            let n = self.pixel_to_vertex[(at.0 - 1, at.1 + 1)];
            self.connect(v, n, self.weights.upright[at]);
        }
    }

    fn connect(&mut self, v: i32, n: i32, w: f64) {
        if n >= 0 {
            if v >= 0 {
                // Inside one super-node the weight cancels against itself.
                if v != n {
                    self.graph.add_weight(v as usize, n as usize, w);
                }
            } else {
                // The edge collapses onto the real endpoint as a terminal
                // weight on the side this pixel joined.
                self.add_term_weights(
                    n as usize,
                    if joined_fgd(v) { w } else { 0.0 },
                    if joined_bgd(v) { w } else { 0.0 },
                );
            }
        } else if v >= 0 {
            self.add_term_weights(
                v as usize,
                if joined_fgd(n) { w } else { 0.0 },
                if joined_bgd(n) { w } else { 0.0 },
            );
        } else if joined_bgd(v) != joined_bgd(n) {
            // Both endpoints collapsed into opposite terminals: the weight is
            // part of every cut.
            self.s2tw += w;
            self.sink_sigma_w += w;
            self.source_sigma_w += w;
        }
    }
}
