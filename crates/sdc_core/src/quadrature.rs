use log::warn;
use nalgebra::DMatrix;
use std::f64::consts::PI;

use crate::error::SdcError;

/// Node counts past this point still build, but the shrinking end-node
/// spacing makes the substep recurrences increasingly roundoff-limited.
const SPACING_WARN_NODES: usize = 24;

/// Collocation nodes and the spectral integration operator for one time
/// interval.
///
/// `nodes` is the anchored sequence `[t_start, s_1, …, s_m]` where the `s_k`
/// are Gauss–Legendre points mapped into `(t_start, t_end)`. `matrix` is the
/// `m × m` operator with `matrix[(i, j)] = ∫_{t_start}^{s_i} L_j(τ) dτ`, the
/// `L_j` being the Lagrange basis over the collocation nodes (the anchor is
/// not an interpolation node). Immutable once built; safe to share read-only
/// across concurrent solves.
#[derive(Debug, Clone)]
pub struct CollocationGrid {
    t_start: f64,
    t_end: f64,
    nodes: Vec<f64>,
    matrix: DMatrix<f64>,
}

impl CollocationGrid {
    /// Builds the node sequence and integration matrix for `m` collocation
    /// nodes on `[t_start, t_end]`.
    ///
    /// The matrix is assembled on the reference interval `[-1, 1]` from
    /// barycentric basis evaluations and an auxiliary Gauss rule per row
    /// (exact for degree ≤ 2m−1), then scaled onto the target interval. No
    /// Vandermonde solve is involved, so conditioning does not degrade with
    /// moderate `m` the way explicit polynomial fitting does.
    pub fn build(m: usize, t_start: f64, t_end: f64) -> Result<Self, SdcError> {
        if m < 1 {
            return Err(SdcError::invalid("node count m must be at least 1"));
        }
        if !t_start.is_finite() || !t_end.is_finite() {
            return Err(SdcError::invalid("interval endpoints must be finite"));
        }
        if t_start >= t_end {
            return Err(SdcError::invalid(format!(
                "interval [{t_start}, {t_end}] is degenerate or reversed"
            )));
        }
        if m > SPACING_WARN_NODES {
            warn!(
                "building {m} collocation nodes: end-node spacing shrinks as O(1/m^2), \
                 expect roundoff-limited sweep accuracy"
            );
        }

        let (reference_nodes, weights) = gauss_legendre_rule(m);
        let reference_matrix = integration_matrix(&reference_nodes, &weights);

        let half_width = 0.5 * (t_end - t_start);
        let midpoint = 0.5 * (t_end + t_start);
        let mut nodes = Vec::with_capacity(m + 1);
        nodes.push(t_start);
        nodes.extend(reference_nodes.iter().map(|&x| half_width * x + midpoint));

        Ok(Self {
            t_start,
            t_end,
            nodes,
            matrix: reference_matrix.scale(half_width),
        })
    }

    /// Number of collocation nodes `m` (the anchored sequence has `m + 1`).
    pub fn node_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// The anchored node sequence `[t_start, s_1, …, s_m]`.
    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    /// The collocation nodes only, anchor excluded.
    pub fn collocation_nodes(&self) -> &[f64] {
        &self.nodes[1..]
    }

    /// The spectral integration matrix `S`.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn t_start(&self) -> f64 {
        self.t_start
    }

    pub fn t_end(&self) -> f64 {
        self.t_end
    }
}

/// Gauss–Legendre abscissas (ascending) and weights on `[-1, 1]`.
///
/// Roots of the degree-`n` Legendre polynomial by Newton iteration on the
/// three-term recurrence, seeded with the Tricomi cosine estimate; the
/// weights are `2 / ((1 − x²)·Pₙ′(x)²)`. Symmetric pairs are filled from one
/// converged root, so the output is deterministic and bit-reproducible.
fn gauss_legendre_rule(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut x = vec![0.0; n];
    let mut w = vec![0.0; n];
    let half = (n + 1) / 2;
    for i in 0..half {
        let mut root = f64::cos(PI * (i as f64 + 0.75) / (n as f64 + 0.5));
        for _ in 0..50 {
            let (p, dp) = legendre_eval(n, root);
            let dx = -p / dp;
            root += dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        let (_, dp) = legendre_eval(n, root);
        let weight = 2.0 / ((1.0 - root * root) * dp * dp);
        x[i] = -root;
        x[n - 1 - i] = root;
        w[i] = weight;
        w[n - 1 - i] = weight;
    }
    (x, w)
}

/// Evaluates the Legendre polynomial `Pₙ` and its derivative at `x` via the
/// three-term recurrence. Only valid away from `x = ±1`, which holds for
/// every Newton iterate here since all roots are interior.
fn legendre_eval(n: usize, x: f64) -> (f64, f64) {
    if n == 0 {
        return (1.0, 0.0);
    }
    let mut prev = 1.0;
    let mut curr = x;
    if n == 1 {
        return (curr, 1.0);
    }
    for k in 2..=n {
        let kf = k as f64;
        let next = ((2.0 * kf - 1.0) * x * curr - (kf - 1.0) * prev) / kf;
        prev = curr;
        curr = next;
    }
    let dp = (n as f64) * (x * curr - prev) / (x * x - 1.0);
    (curr, dp)
}

/// Weights of the barycentric interpolation formula over `nodes`.
fn barycentric_weights(nodes: &[f64]) -> Vec<f64> {
    let mut weights = vec![1.0; nodes.len()];
    for j in 0..nodes.len() {
        for k in 0..nodes.len() {
            if k != j {
                weights[j] *= nodes[j] - nodes[k];
            }
        }
        weights[j] = 1.0 / weights[j];
    }
    weights
}

/// Evaluates every Lagrange basis polynomial over `nodes` at `x` into `out`,
/// using the second barycentric form. An exact node hit is handled up front
/// since the rational form degenerates there.
fn lagrange_basis(nodes: &[f64], weights: &[f64], x: f64, out: &mut [f64]) {
    for (j, &node) in nodes.iter().enumerate() {
        if x == node {
            out.fill(0.0);
            out[j] = 1.0;
            return;
        }
    }
    let mut denom = 0.0;
    for j in 0..nodes.len() {
        out[j] = weights[j] / (x - nodes[j]);
        denom += out[j];
    }
    for value in out.iter_mut() {
        *value /= denom;
    }
}

/// Integration matrix on the reference interval: row `i` integrates each
/// basis polynomial over `[-1, nodes[i]]` with the reference Gauss rule
/// mapped onto that subinterval. The rule is exact to degree `2m − 1`, the
/// basis has degree `m − 1`, so the entries are exact up to roundoff.
fn integration_matrix(nodes: &[f64], rule_weights: &[f64]) -> DMatrix<f64> {
    let m = nodes.len();
    let bary = barycentric_weights(nodes);
    let mut matrix = DMatrix::zeros(m, m);
    let mut basis = vec![0.0; m];
    for i in 0..m {
        let scale = 0.5 * (nodes[i] + 1.0);
        let shift = 0.5 * (nodes[i] - 1.0);
        for q in 0..m {
            let tau = scale * nodes[q] + shift;
            lagrange_basis(nodes, &bary, tau, &mut basis);
            let wq = scale * rule_weights[q];
            for j in 0..m {
                matrix[(i, j)] += wq * basis[j];
            }
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauss_rule_basics() {
        for n in 1..=10 {
            let (x, w) = gauss_legendre_rule(n);
            let total: f64 = w.iter().sum();
            assert!((total - 2.0).abs() < 1e-13, "weights must sum to 2");
            for pair in x.windows(2) {
                assert!(pair[0] < pair[1], "nodes must be strictly increasing");
            }
            assert!(x[0] > -1.0 && x[n - 1] < 1.0);
        }
        // Degree-3 roots are ±sqrt(3/5) and 0.
        let (x, _) = gauss_legendre_rule(3);
        assert!((x[0] + (0.6f64).sqrt()).abs() < 1e-14);
        assert!(x[1].abs() < 1e-14);
        assert!((x[2] - (0.6f64).sqrt()).abs() < 1e-14);
    }

    #[test]
    fn test_anchor_and_interior_nodes() {
        let grid = CollocationGrid::build(5, 0.0, 0.2).unwrap();
        let nodes = grid.nodes();
        assert_eq!(nodes.len(), 6);
        assert_eq!(nodes[0], 0.0);
        for pair in nodes.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        for &s in grid.collocation_nodes() {
            assert!(s > 0.0 && s < 0.2);
        }
    }

    #[test]
    fn test_quadrature_exactness() {
        // S applied to nodal samples of t^d must reproduce the exact
        // definite integral at every collocation node for all d < m.
        for &(t_start, t_end) in &[(0.0, 0.2), (-1.0, 2.0), (1.5, 1.9)] {
            for m in 1..=8 {
                let grid = CollocationGrid::build(m, t_start, t_end).unwrap();
                let s = grid.collocation_nodes();
                let matrix = grid.matrix();
                for d in 0..m {
                    for i in 0..m {
                        let mut applied = 0.0;
                        for j in 0..m {
                            applied += matrix[(i, j)] * s[j].powi(d as i32);
                        }
                        let exact = (s[i].powi(d as i32 + 1)
                            - t_start.powi(d as i32 + 1))
                            / (d as f64 + 1.0);
                        let tol = 1e-12 * exact.abs().max(1.0);
                        assert!(
                            (applied - exact).abs() < tol,
                            "m={m} d={d} i={i}: got {applied}, want {exact}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_single_node_is_midpoint_rule() {
        let grid = CollocationGrid::build(1, 0.0, 1.0).unwrap();
        assert!((grid.collocation_nodes()[0] - 0.5).abs() < 1e-15);
        assert!((grid.matrix()[(0, 0)] - 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_build_is_bit_reproducible() {
        let a = CollocationGrid::build(7, -0.3, 1.7).unwrap();
        let b = CollocationGrid::build(7, -0.3, 1.7).unwrap();
        for (x, y) in a.nodes().iter().zip(b.nodes()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
        for (x, y) in a.matrix().iter().zip(b.matrix().iter()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn test_rejects_bad_configuration() {
        assert!(matches!(
            CollocationGrid::build(0, 0.0, 1.0),
            Err(SdcError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            CollocationGrid::build(3, 1.0, 1.0),
            Err(SdcError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            CollocationGrid::build(3, 2.0, 1.0),
            Err(SdcError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            CollocationGrid::build(3, f64::NAN, 1.0),
            Err(SdcError::InvalidConfiguration { .. })
        ));
    }
}
