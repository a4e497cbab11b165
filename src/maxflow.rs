//! Min-cut solver over a two-terminal capacitated graph.
//!
//! The two terminals are implicit: every node carries a signed excess, the
//! net of its accumulated source/sink capacities (the cancelled pair goes
//! straight into the flow constant). Augmentation runs over BFS level graphs
//! with a current-arc blocking pass, pushing from positive-excess nodes to
//! negative-excess ones through the residual adjacency lists.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
struct Edge {
    dst: u32,
    next: i32,
    cap: f64,
}

/// A directed capacitated graph with implicit source/sink terminals.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    first: Vec<i32>,
    edges: Vec<Edge>,
    /// Net terminal capacity per node: positive toward the source, negative
    /// toward the sink.
    excess: Vec<f64>,
    /// Raw accumulated terminal capacity per node, kept for `sum_w`.
    term_sum: Vec<f64>,
    flow: f64,
    in_source: Vec<bool>,
}

impl FlowGraph {
    pub fn with_capacity(vertices: usize, edges: usize) -> Self {
        Self {
            first: Vec::with_capacity(vertices),
            edges: Vec::with_capacity(edges),
            excess: Vec::with_capacity(vertices),
            term_sum: Vec::with_capacity(vertices),
            flow: 0.0,
            in_source: Vec::new(),
        }
    }

    pub fn add_vtx(&mut self) -> usize {
        self.first.push(-1);
        self.excess.push(0.0);
        self.term_sum.push(0.0);
        self.first.len() - 1
    }

    pub fn vtx_count(&self) -> usize {
        self.first.len()
    }

    /// Accumulate terminal capacities onto a node. The overlapping part of
    /// the source and sink capacities can never be cut apart, so it is
    /// cancelled into the flow constant immediately.
    pub fn add_term_weights(&mut self, v: usize, from_source: f64, to_sink: f64) {
        let dw = self.excess[v];
        let fs = if dw > 0.0 { from_source + dw } else { from_source };
        let ts = if dw > 0.0 { to_sink } else { to_sink - dw };
        self.flow += fs.min(ts);
        self.excess[v] = fs - ts;
        self.term_sum[v] += from_source + to_sink;
    }

    /// Add a pair of antiparallel edges with independent capacities.
    pub fn add_edges(&mut self, u: usize, v: usize, cap_uv: f64, cap_vu: f64) {
        self.push_edge(u, v, cap_uv);
        self.push_edge(v, u, cap_vu);
    }

    /// Symmetric accumulate: add `w` to both directions between `u` and `v`,
    /// merging into an existing edge pair when one is present.
    pub fn add_weight(&mut self, u: usize, v: usize, w: f64) {
        let mut e = self.first[u];
        while e >= 0 {
            if self.edges[e as usize].dst as usize == v {
                self.edges[e as usize].cap += w;
                self.edges[(e ^ 1) as usize].cap += w;
                return;
            }
            e = self.edges[e as usize].next;
        }
        self.add_edges(u, v, w, w);
    }

    /// Total capacity incident to a node, terminals included. Only
    /// meaningful before `max_flow` consumes the capacities.
    pub fn sum_w(&self, v: usize) -> f64 {
        let mut s = self.term_sum[v];
        let mut e = self.first[v];
        while e >= 0 {
            s += self.edges[e as usize].cap;
            e = self.edges[e as usize].next;
        }
        s
    }

    fn push_edge(&mut self, u: usize, v: usize, cap: f64) {
        let id = self.edges.len() as i32;
        self.edges.push(Edge {
            dst: v as u32,
            next: self.first[u],
            cap,
        });
        self.first[u] = id;
    }

    /// Run max-flow and return the min-cut value (including the terminal
    /// capacity cancelled at `add_term_weights` time).
    pub fn max_flow(&mut self) -> f64 {
        let n = self.first.len();
        let mut level = vec![-1i32; n];
        let mut queue = VecDeque::new();
        loop {
            level.iter_mut().for_each(|l| *l = -1);
            queue.clear();
            for v in 0..n {
                if self.excess[v] > 0.0 {
                    level[v] = 0;
                    queue.push_back(v);
                }
            }
            let mut reached_sink = false;
            while let Some(u) = queue.pop_front() {
                let mut e = self.first[u];
                while e >= 0 {
                    let edge = &self.edges[e as usize];
                    let w = edge.dst as usize;
                    if edge.cap > 0.0 && level[w] < 0 {
                        level[w] = level[u] + 1;
                        if self.excess[w] < 0.0 {
                            reached_sink = true;
                        }
                        queue.push_back(w);
                    }
                    e = edge.next;
                }
            }
            if !reached_sink {
                break;
            }

            let mut arc = self.first.clone();
            for s in 0..n {
                while self.excess[s] > 0.0 {
                    let pushed = self.augment(s, self.excess[s], &level, &mut arc);
                    if pushed <= 0.0 {
                        break;
                    }
                    self.excess[s] -= pushed;
                    self.flow += pushed;
                }
            }
        }

        // Residual reachability from the source determines the cut sides.
        self.in_source = vec![false; n];
        queue.clear();
        for v in 0..n {
            if self.excess[v] > 0.0 {
                self.in_source[v] = true;
                queue.push_back(v);
            }
        }
        while let Some(u) = queue.pop_front() {
            let mut e = self.first[u];
            while e >= 0 {
                let edge = &self.edges[e as usize];
                let w = edge.dst as usize;
                if edge.cap > 0.0 && !self.in_source[w] {
                    self.in_source[w] = true;
                    queue.push_back(w);
                }
                e = edge.next;
            }
        }
        self.flow
    }

    /// Push up to `limit` units from `u` along the level graph, delivering
    /// into the first deficit node reached.
    fn augment(&mut self, u: usize, limit: f64, level: &[i32], arc: &mut [i32]) -> f64 {
        if self.excess[u] < 0.0 {
            let d = limit.min(-self.excess[u]);
            self.excess[u] += d;
            return d;
        }
        while arc[u] >= 0 {
            let e = arc[u] as usize;
            let (dst, cap) = (self.edges[e].dst as usize, self.edges[e].cap);
            if cap > 0.0 && level[dst] == level[u] + 1 {
                let d = self.augment(dst, limit.min(cap), level, arc);
                if d > 0.0 {
                    self.edges[e].cap -= d;
                    self.edges[e ^ 1].cap += d;
                    return d;
                }
            }
            arc[u] = self.edges[e].next;
        }
        0.0
    }

    /// Whether the node ended on the source side of the cut, i.e. is
    /// reachable from the source in the residual graph. Valid after
    /// `max_flow`.
    pub fn in_source_segment(&self, v: usize) -> bool {
        debug_assert!(!self.in_source.is_empty(), "query before max_flow");
        self.in_source[v]
    }
}
