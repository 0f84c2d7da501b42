//! Hubbard model on a periodic nx × ny lattice.
//!
//! H = -t Σ_{⟨ij⟩σ} (c†_{iσ} c_{jσ} + h.c.) + U Σ_i n_{i↑} n_{i↓}
//!
//! Sites are indexed as `i = x + nx * y`.

use nalgebra::DMatrix;

use super::traits::{EnergyComponents, System};
use crate::io::ModelConfig;
use crate::linalg::{Complex64, ZERO};

#[derive(Debug, Clone)]
pub struct Hubbard {
    pub nx: usize,
    pub ny: usize,
    /// Hopping amplitude
    pub t: f64,
    /// On-site interaction
    pub u: f64,
    pub nup: usize,
    pub ndown: usize,
    /// Kinetic matrix for each spin (identical for the plain model)
    kinetic: [DMatrix<f64>; 2],
}

impl Hubbard {
    pub fn new(nx: usize, ny: usize, t: f64, u: f64, nup: usize, ndown: usize) -> Self {
        let kinetic = Self::kinetic_matrix(nx, ny, t);
        Self {
            nx,
            ny,
            t,
            u,
            nup,
            ndown,
            kinetic: [kinetic.clone(), kinetic],
        }
    }

    pub fn from_config(model: &ModelConfig) -> Self {
        match *model {
            ModelConfig::Hubbard { nx, ny, t, u, nup, ndown } => Self::new(nx, ny, t, u, nup, ndown),
        }
    }

    /// Nearest-neighbour hopping with periodic boundaries. A pair of sites
    /// is coupled at most once, so a two-site ring has a single bond.
    fn kinetic_matrix(nx: usize, ny: usize, t: f64) -> DMatrix<f64> {
        let n = nx * ny;
        let mut kinetic = DMatrix::zeros(n, n);
        for y in 0..ny {
            for x in 0..nx {
                let i = x + nx * y;
                let mut neighbours = Vec::with_capacity(2);
                if nx > 1 {
                    neighbours.push((x + 1) % nx + nx * y);
                }
                if ny > 1 {
                    neighbours.push(x + nx * ((y + 1) % ny));
                }
                for j in neighbours {
                    kinetic[(i, j)] = -t;
                    kinetic[(j, i)] = -t;
                }
            }
        }
        kinetic
    }
}

impl System for Hubbard {
    fn nbasis(&self) -> usize {
        self.nx * self.ny
    }

    fn nup(&self) -> usize {
        self.nup
    }

    fn ndown(&self) -> usize {
        self.ndown
    }

    fn one_body(&self) -> &[DMatrix<f64>; 2] {
        &self.kinetic
    }

    fn local_energy(&self, g: &[DMatrix<Complex64>; 2]) -> EnergyComponents {
        let mut ke = ZERO;
        for (t, gs) in self.kinetic.iter().zip(g.iter()) {
            ke += t.iter().zip(gs.transpose().iter()).map(|(&tij, &gji)| gji * tij).sum::<Complex64>();
        }
        let pe: Complex64 = (0..self.nbasis())
            .map(|i| g[0][(i, i)] * g[1][(i, i)])
            .sum::<Complex64>()
            * self.u;
        (ke + pe, ke, pe)
    }
}
