/// Gauss-Legendre nodes and weights on `[-1, 1]`.
const GAUSS_3: [(f64, f64); 3] = [
    (-0.7745966692414834, 0.5555555555555556),
    (0.0, 0.8888888888888888),
    (0.7745966692414834, 0.5555555555555556),
];

const GAUSS_4: [(f64, f64); 4] = [
    (-0.8611363115940526, 0.3478548451374538),
    (-0.3399810435848563, 0.6521451548625461),
    (0.3399810435848563, 0.6521451548625461),
    (0.8611363115940526, 0.3478548451374538),
];

/// Quadrature rule on the reference tetrahedron.
///
/// Points are stored in barycentric coordinates and the weights sum to 1,
/// so a cell integral is `volume * sum(w_q * f(x_q))`.
#[derive(Debug, Clone)]
pub struct QuadratureRule {
    pub points: Vec<[f64; 4]>,
    pub weights: Vec<f64>,
}

impl QuadratureRule {
    /// Collapsed (Duffy) tensor-product Gauss rule with `n` points per
    /// direction. Exact for polynomials of total degree `2n - 3`.
    ///
    /// Supported: `n = 3` (degree 3) and `n = 4` (degree 5).
    pub fn collapsed_gauss(n: usize) -> Self {
        let gauss: &[(f64, f64)] = match n {
            3 => &GAUSS_3,
            4 => &GAUSS_4,
            _ => panic!("unsupported collapsed Gauss order {n}, expected 3 or 4"),
        };
        // Map to [0, 1]
        let line: Vec<(f64, f64)> = gauss.iter().map(|&(x, w)| (0.5 * (x + 1.0), 0.5 * w)).collect();

        let mut points = Vec::with_capacity(n * n * n);
        let mut weights = Vec::with_capacity(n * n * n);
        for &(a, wa) in &line {
            for &(b, wb) in &line {
                for &(c, wc) in &line {
                    let x = a;
                    let y = b * (1.0 - a);
                    let z = c * (1.0 - a) * (1.0 - b);
                    let jac = (1.0 - a).powi(2) * (1.0 - b);
                    points.push([1.0 - x - y - z, x, y, z]);
                    // Reference volume is 1/6
                    weights.push(6.0 * wa * wb * wc * jac);
                }
            }
        }

        Self { points, weights }
    }

    /// Rule used for element matrices (degree 3).
    pub fn assembly() -> Self {
        Self::collapsed_gauss(3)
    }

    /// Rule used for error norms (degree 5).
    pub fn accurate() -> Self {
        Self::collapsed_gauss(4)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterates over `(barycentric point, weight)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&[f64; 4], f64)> {
        self.points.iter().zip(self.weights.iter().copied())
    }
}
