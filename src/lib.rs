//! Interactive foreground extraction with iterated graph cuts.
//!
//! Starting from a rectangle or a user-painted trimap, the algorithm
//! alternates fitting two Gaussian mixture color models (background and
//! foreground) with a minimum cut on the 8-connected pixel graph, flipping
//! only the probable labels of the trimap on every pass. The graph handed to
//! the solver is the reduced ("slim") variant: pixels whose terminal bias
//! dominates their neighborhood are collapsed into a neighboring super-node
//! or straight into a terminal, preserving the cut value.
//!
//! The entry point is [`segment`]; see its example for the typical call.

pub mod error;
pub mod gmm;
pub mod graph;
pub mod kmeans;
pub mod maxflow;
pub mod segment;
pub mod trimap;
pub mod weights;

pub use error::{Error, Result};
pub use gmm::Gmm;
pub use graph::{JOINED_BGD, JOINED_FGD};
pub use maxflow::FlowGraph;
pub use segment::{segment, SegmentMode};
pub use trimap::{Rect, BGD, FGD, PR_BGD, PR_FGD};
pub use weights::{calc_beta, NeighborWeights, GAMMA, LAMBDA};
