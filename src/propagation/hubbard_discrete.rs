//! Discrete Hubbard-Stratonovich propagator for the Hubbard model.
//!
//! One step is split symmetrically as
//!
//!   B(x) = B_K^{1/2} B_V(x) B_K^{1/2},   B_K^{1/2} = exp(-Δτ T / 2)
//!
//! and the on-site interaction is decoupled per site with Hirsch's spin
//! transformation
//!
//!   exp(-Δτ U n↑ n↓) = ½ Σ_{x=±1} exp(γ x (n↑ - n↓) - Δτ U (n↑ + n↓) / 2),
//!   cosh γ = exp(Δτ U / 2).
//!
//! Under the constrained-path approximation each field is sampled from the
//! positive part of the overlap ratio it produces, so weights never change
//! sign. With free projection fields are sampled uniformly and the sign
//! is carried by the overlap.

use log::{debug, info, trace};
use nalgebra::{DMatrix, DVector};
use rand::Rng;

use super::traits::Propagator;
use crate::io::{HubbardStratonovich, PropagatorConfig};
use crate::linalg::{expm_symmetric, to_complex, Complex64, ZERO};
use crate::systems::{Hubbard, System};
use crate::walkers::Walker;
use crate::wavefunction::{Determinant, Trial};

#[derive(Clone, Debug)]
pub struct HubbardDiscrete {
    pub dt: f64,
    /// Coupling of the discrete field, cosh γ = exp(Δτ U / 2)
    pub gamma: f64,
    /// Diagonal B_V factors: `auxf[x][spin]` with x = 0 for +1, 1 for -1
    auxf: [[Complex64; 2]; 2],
    /// exp(-Δτ T / 2) per spin
    bk_half: Determinant,
    free_projection: bool,
}

impl HubbardDiscrete {
    pub fn new(system: &Hubbard, dt: f64, free_projection: bool) -> Self {
        let gamma = (0.5 * dt * system.u).exp().acosh();
        let shift = (-0.5 * dt * system.u).exp();
        let factor = |sign: f64| {
            [
                Complex64::new((sign * gamma).exp() * shift, 0.0),
                Complex64::new((-sign * gamma).exp() * shift, 0.0),
            ]
        };
        let t = system.one_body();
        Self {
            dt,
            gamma,
            auxf: [factor(1.0), factor(-1.0)],
            bk_half: [
                to_complex(&expm_symmetric(&t[0], -0.5 * dt)),
                to_complex(&expm_symmetric(&t[1], -0.5 * dt)),
            ],
            free_projection,
        }
    }

    pub fn from_config(system: &Hubbard, dt: f64, config: &PropagatorConfig) -> Self {
        match config.hubbard_stratonovich {
            HubbardStratonovich::Discrete => {
                info!(
                    "# Discrete Hubbard-Stratonovich transformation (free projection: {})",
                    config.free_projection
                );
                Self::new(system, dt, config.free_projection)
            }
        }
    }

    fn field_index(x: f64) -> usize {
        if x > 0.0 { 0 } else { 1 }
    }

    /// Apply B_K^{1/2}. With importance sampling the weight picks up the
    /// overlap ratio, and a non-positive ratio kills the walker.
    fn kinetic(&self, walker: &mut Walker, trial: &Trial) {
        let old_ot = walker.ot;
        for spin in 0..2 {
            walker.phi[spin] = &self.bk_half[spin] * &walker.phi[spin];
        }
        walker.update_greens_function(trial);
        if self.free_projection {
            return;
        }
        if old_ot.norm() == 0.0 {
            walker.weight = ZERO;
            return;
        }
        let ratio = walker.ot / old_ot;
        if ratio.re > 0.0 && ratio.re.is_finite() {
            walker.weight *= ratio.re;
        } else {
            trace!("Kinetic step crossed the constraint: ratio {}", ratio);
            walker.weight = ZERO;
        }
    }

    /// Sample a field on every site and apply B_V(x) one site at a time.
    /// Returns false when the walker was killed by the constraint.
    fn potential<R: Rng + ?Sized>(&self, walker: &mut Walker, trial: &Trial, rng: &mut R) -> bool {
        let nbasis = walker.phi[0].nrows();
        let mut fields = Vec::with_capacity(nbasis);
        for i in 0..nbasis {
            let x = if self.free_projection {
                if rng.gen::<f64>() < 0.5 { 1.0 } else { -1.0 }
            } else {
                let p_plus = 0.5 * walker.site_overlap_ratio(trial, i, self.auxf[0]).re.max(0.0);
                let p_minus = 0.5 * walker.site_overlap_ratio(trial, i, self.auxf[1]).re.max(0.0);
                let norm = p_plus + p_minus;
                if !(norm > 0.0) {
                    debug!("No admissible field on site {}, walker killed", i);
                    walker.weight = ZERO;
                    walker.fields = fields;
                    return false;
                }
                walker.weight *= norm;
                if rng.gen::<f64>() < p_plus / norm { 1.0 } else { -1.0 }
            };
            walker.apply_site_update(trial, i, self.auxf[Self::field_index(x)]);
            fields.push(x);
        }
        walker.fields = fields;
        true
    }
}

impl Propagator for HubbardDiscrete {
    fn propagate_walker<R: Rng + ?Sized>(&self, walker: &mut Walker, trial: &Trial, rng: &mut R) {
        self.kinetic(walker, trial);
        if walker.weight == ZERO {
            walker.fields.clear();
            return;
        }
        if !self.potential(walker, trial, rng) {
            return;
        }
        self.kinetic(walker, trial);
    }

    /// B(x) = B_K^{1/2} diag(v(x)) B_K^{1/2}. Sites without a recorded
    /// field get a unit potential factor.
    fn step_matrices(&self, fields: &[f64]) -> Determinant {
        let nbasis = self.bk_half[0].nrows();
        let mut b = [DMatrix::zeros(nbasis, nbasis), DMatrix::zeros(nbasis, nbasis)];
        for spin in 0..2 {
            let v = DVector::from_fn(nbasis, |i, _| match fields.get(i) {
                Some(&x) => self.auxf[Self::field_index(x)][spin],
                None => Complex64::new(1.0, 0.0),
            });
            b[spin] = &self.bk_half[spin] * DMatrix::from_diagonal(&v) * &self.bk_half[spin];
        }
        b
    }

    fn free_projection(&self) -> bool {
        self.free_projection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wavefunction::free_electron;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn setup(free_projection: bool) -> (Hubbard, Trial, HubbardDiscrete) {
        let system = Hubbard::new(4, 1, 1.0, 4.0, 2, 2);
        let psi = free_electron(&system, None).unwrap();
        let trial = Trial::single("free_electron", psi, &system).unwrap();
        let propagator = HubbardDiscrete::new(&system, 0.05, free_projection);
        (system, trial, propagator)
    }

    #[test]
    fn test_hirsch_coupling() {
        let (_, _, propagator) = setup(false);
        assert_relative_eq!(propagator.gamma.cosh(), (0.5 * 0.05 * 4.0_f64).exp(), epsilon = 1e-12);
        // the two field values average to exp(-Δτ U n↑n↓) on a doubly occupied site
        let avg: f64 = (0..2).map(|x| (propagator.auxf[x][0] * propagator.auxf[x][1]).re).sum::<f64>() * 0.5;
        assert_relative_eq!(avg, (-0.05 * 4.0_f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_constrained_weights_stay_non_negative() {
        let (_, trial, propagator) = setup(false);
        let mut rng = StdRng::seed_from_u64(17);
        let mut walkers: Vec<Walker> = (0..5).map(|_| Walker::new(&trial, trial.psi[0].clone())).collect();
        for step in 0..40 {
            for walker in walkers.iter_mut().filter(|w| w.is_active()) {
                propagator.propagate_walker(walker, &trial, &mut rng);
                assert!(walker.weight.re >= 0.0);
                assert_eq!(walker.weight.im, 0.0);
                if step % 5 == 0 {
                    walker.reortho(&trial, true);
                }
            }
        }
        assert!(walkers.iter().any(|w| w.weight.re > 0.0));
    }

    #[test]
    fn test_greens_function_consistent_after_step() {
        let (_, trial, propagator) = setup(false);
        let mut rng = StdRng::seed_from_u64(3);
        let mut walker = Walker::new(&trial, trial.psi[0].clone());
        for _ in 0..3 {
            propagator.propagate_walker(&mut walker, &trial, &mut rng);
        }
        let mut fresh = walker.clone();
        fresh.update_greens_function(&trial);
        for spin in 0..2 {
            let diff = &walker.greens_function()[spin] - &fresh.greens_function()[spin];
            assert_relative_eq!(diff.norm(), 0.0, epsilon = 1e-9);
        }
        assert_relative_eq!((walker.ot - fresh.ot).norm(), 0.0, epsilon = 1e-9 * fresh.ot.norm());
    }

    #[test]
    fn test_step_matrices_replay_recorded_fields() {
        let (_, trial, propagator) = setup(true);
        let mut rng = StdRng::seed_from_u64(8);
        let mut walker = Walker::new(&trial, trial.psi[0].clone());
        let start = walker.phi.clone();
        propagator.propagate_walker(&mut walker, &trial, &mut rng);
        assert_eq!(walker.fields.len(), 4);
        assert!(walker.fields.iter().all(|&x| x == 1.0 || x == -1.0));
        let b = propagator.step_matrices(&walker.fields);
        for spin in 0..2 {
            let replayed = &b[spin] * &start[spin];
            assert_relative_eq!((replayed - &walker.phi[spin]).norm(), 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_skipped_step_replays_as_identity() {
        let (_, trial, propagator) = setup(false);
        let mut walker = Walker::new(&trial, trial.psi[0].clone());
        walker.fields = vec![1.0, -1.0, 1.0, 1.0];
        walker.skip_step();
        assert!(walker.fields.is_empty());
        let identity = DMatrix::<Complex64>::identity(4, 4);
        for b in propagator.replay(&walker) {
            assert_relative_eq!((b - &identity).norm(), 0.0, epsilon = 1e-14);
        }
        // an empty field list alone is a kinetic-only step, not a skip
        let kinetic = propagator.step_matrices(&[]);
        assert!((&kinetic[0] - &identity).norm() > 1e-3);
    }

    #[test]
    fn test_replay_matches_step_matrices_after_propagation() {
        let (_, trial, propagator) = setup(false);
        let mut rng = StdRng::seed_from_u64(6);
        let mut walker = Walker::new(&trial, trial.psi[0].clone());
        propagator.propagate_walker(&mut walker, &trial, &mut rng);
        assert!(!walker.skipped);
        let replayed = propagator.replay(&walker);
        let direct = propagator.step_matrices(&walker.fields);
        for spin in 0..2 {
            assert_relative_eq!((&replayed[spin] - &direct[spin]).norm(), 0.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_from_config_selects_discrete_transformation() {
        let system = Hubbard::new(4, 1, 1.0, 4.0, 2, 2);
        let config: PropagatorConfig =
            serde_yaml::from_str("{hubbard_stratonovich: discrete, free_projection: true}").unwrap();
        let propagator = HubbardDiscrete::from_config(&system, 0.05, &config);
        assert!(propagator.free_projection());
        assert_relative_eq!(propagator.gamma, HubbardDiscrete::new(&system, 0.05, true).gamma);
    }

    #[test]
    fn test_free_projection_leaves_weight_alone() {
        let (_, trial, propagator) = setup(true);
        let mut rng = StdRng::seed_from_u64(21);
        let mut walker = Walker::new(&trial, trial.psi[0].clone());
        for _ in 0..10 {
            propagator.propagate_walker(&mut walker, &trial, &mut rng);
        }
        assert_eq!(walker.weight, Complex64::new(1.0, 0.0));
        assert!(propagator.free_projection());
    }
}
