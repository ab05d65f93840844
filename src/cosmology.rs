//! Background cosmology and linear growth.
//!
//! [`Cosmology`] is the capability a power spectrum needs from its
//! background model: the linear growth factor and the two primordial
//! parameters `ns` and `sigma8`. [`LambdaCdm`] implements it for a
//! ΛCDM universe with optional spatial curvature (w = −1, radiation
//! neglected).
//!
//! # Growth factor
//!
//! D₊(z) = g(z) / (1 + z), normalized so that D₊(0) = 1. The suppression
//! g(z) comes either from the Carroll, Press & Turner (1992) fit
//!
//! ```text
//! g = 2.5 Ωm / (Ωm^{4/7} − ΩΛ + (1 + Ωm/2)(1 + ΩΛ/70))
//! ```
//!
//! or from the growing-mode integral
//!
//! ```text
//! D ∝ 2.5 Ωm0 E(z) ∫₀^{a} da' / (a' E(a'))³
//! ```
//!
//! evaluated in `t = √(a / (1 + a))`, which keeps the upper limit finite
//! at z = −1 and the integrand smooth at a = 0.
//!
//! # Mass scales
//!
//! Masses are in M☉/h and radii in Mpc/h. A Lagrangian radius encloses
//! its mass at the mean matter density today:
//!
//! ```text
//! M = (4π/3) r³ ρm(0),    ρm(z) = Ωm0 ρcrit(0) (1 + z)³
//! ```

use crate::numeric::Integrator;
use log::warn;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

/// Critical density today, in h² M☉ / Mpc³ (equivalently M☉/h per (Mpc/h)³).
pub const RHO_CRIT0: f64 = 2.77536627e11;

/// Gauss–Legendre points per panel of the growth integral.
const GROWTH_QUAD_ORDER: usize = 16;

/// Panel width of the growth integral in the compactified variable.
const GROWTH_PANEL_WIDTH: f64 = 0.05;

/// Curvature densities below this are treated as exactly flat.
const FLAT_THRESHOLD: f64 = 1e-15;

/// Errors raised for unphysical cosmological parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CosmologyError {
    #[error("invalid cosmological parameter: {0}")]
    InvalidParameter(String),
}

// ============================================================================
// Capability
// ============================================================================

/// What a power spectrum requires from a background cosmology.
pub trait Cosmology {
    /// Linear growth factor normalized to 1 at z = 0. `exact` selects the
    /// integral over the fitting formula where the model distinguishes them.
    fn dplus(&self, z: f64, exact: bool) -> f64;

    /// Spectral index of the primordial power spectrum.
    fn ns(&self) -> f64;

    /// Amplitude of fluctuations in spheres of 8 Mpc/h at z = 0.
    fn sigma8(&self) -> f64;

    /// Checks the model is usable by a power spectrum.
    fn validate(&self) -> Result<(), CosmologyError> {
        let sigma8 = self.sigma8();
        if !(sigma8.is_finite() && sigma8 > 0.0) {
            return Err(CosmologyError::InvalidParameter(format!(
                "sigma8 must be positive, got {sigma8}"
            )));
        }
        if !self.ns().is_finite() {
            return Err(CosmologyError::InvalidParameter(format!(
                "ns must be finite, got {}",
                self.ns()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Parameters
// ============================================================================

fn default_tcmb0() -> f64 {
    2.725
}

/// Input parameters of a [`LambdaCdm`] model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CosmologyParams {
    /// Hubble parameter in units of 100 km/s/Mpc.
    pub h: f64,
    /// Total matter density today.
    pub om0: f64,
    /// Baryon density today.
    pub ob0: f64,
    pub sigma8: f64,
    pub ns: f64,
    /// CMB temperature today, in K.
    #[serde(default = "default_tcmb0")]
    pub tcmb0: f64,
    /// Dark-energy density today; `None` makes the model flat.
    #[serde(default)]
    pub ode0: Option<f64>,
}

impl CosmologyParams {
    /// Flat model with the default CMB temperature.
    pub fn flat(h: f64, om0: f64, ob0: f64, sigma8: f64, ns: f64) -> Self {
        Self {
            h,
            om0,
            ob0,
            sigma8,
            ns,
            tcmb0: default_tcmb0(),
            ode0: None,
        }
    }

    pub fn validate(&self) -> Result<(), CosmologyError> {
        let invalid = |msg: String| Err(CosmologyError::InvalidParameter(msg));

        if !(self.h > 0.0 && self.h.is_finite()) {
            return invalid(format!("h must be positive, got {}", self.h));
        }
        if !(self.om0 > 0.0 && self.om0.is_finite()) {
            return invalid(format!("om0 must be positive, got {}", self.om0));
        }
        if !(self.ob0 >= 0.0 && self.ob0 <= self.om0) {
            return invalid(format!(
                "ob0 must lie in [0, om0], got {} with om0 = {}",
                self.ob0, self.om0
            ));
        }
        if !(self.sigma8 > 0.0 && self.sigma8.is_finite()) {
            return invalid(format!("sigma8 must be positive, got {}", self.sigma8));
        }
        if !self.ns.is_finite() {
            return invalid(format!("ns must be finite, got {}", self.ns));
        }
        if !(self.tcmb0 > 0.0 && self.tcmb0.is_finite()) {
            return invalid(format!("tcmb0 must be positive, got {}", self.tcmb0));
        }
        match self.ode0 {
            None if self.om0 > 1.0 => invalid(format!(
                "flat model needs om0 <= 1 for non-negative dark energy, got {}",
                self.om0
            )),
            Some(ode0) if !(ode0 >= 0.0 && ode0.is_finite()) => {
                invalid(format!("ode0 must be non-negative, got {ode0}"))
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// ΛCDM Model
// ============================================================================

/// ΛCDM background with optional curvature.
///
/// # Examples
/// ```
/// use u_cosmo::cosmology::{Cosmology, CosmologyParams, LambdaCdm};
///
/// let cosmo = LambdaCdm::new(CosmologyParams::flat(0.7, 0.3, 0.05, 0.8, 1.0)).unwrap();
/// assert_eq!(cosmo.dplus(0.0, false), 1.0);
/// assert!(cosmo.dplus(1.0, false) < 1.0);
/// assert!((cosmo.ode0() - 0.7).abs() < 1e-15);
/// ```
#[derive(Debug, Clone)]
pub struct LambdaCdm {
    params: CosmologyParams,
    ode0: f64,
    ok0: f64,
    integrator: Integrator,
    fit_d0: f64,
    exact_d0: f64,
}

impl LambdaCdm {
    /// Validates the parameters and precomputes the growth normalization.
    pub fn new(params: CosmologyParams) -> Result<Self, CosmologyError> {
        params.validate()?;

        let ode0 = params.ode0.unwrap_or(1.0 - params.om0);
        let mut ok0 = 1.0 - params.om0 - ode0;
        if ok0.abs() < FLAT_THRESHOLD {
            ok0 = 0.0;
        }

        let mut model = Self {
            params,
            ode0,
            ok0,
            integrator: Integrator::new(GROWTH_QUAD_ORDER, GROWTH_PANEL_WIDTH),
            fit_d0: 1.0,
            exact_d0: 1.0,
        };
        model.fit_d0 = model.raw_growth(1.0, false);
        model.exact_d0 = model.raw_growth(1.0, true);
        if !(model.fit_d0 > 0.0 && model.exact_d0 > 0.0) {
            return Err(CosmologyError::InvalidParameter(
                "growth factor at z = 0 is not positive".into(),
            ));
        }
        Ok(model)
    }

    pub fn params(&self) -> &CosmologyParams {
        &self.params
    }

    pub fn h(&self) -> f64 {
        self.params.h
    }

    pub fn om0(&self) -> f64 {
        self.params.om0
    }

    pub fn ob0(&self) -> f64 {
        self.params.ob0
    }

    pub fn tcmb0(&self) -> f64 {
        self.params.tcmb0
    }

    pub fn ode0(&self) -> f64 {
        self.ode0
    }

    pub fn ok0(&self) -> f64 {
        self.ok0
    }

    pub fn is_flat(&self) -> bool {
        self.ok0 == 0.0
    }

    /// E²(z) = H²(z) / H₀².
    pub fn e2(&self, z: f64) -> f64 {
        let zp1 = z + 1.0;
        self.params.om0 * zp1 * zp1 * zp1 + self.ok0 * zp1 * zp1 + self.ode0
    }

    pub fn efunc(&self, z: f64) -> f64 {
        self.e2(z).sqrt()
    }

    /// Matter density parameter at redshift z.
    pub fn omega_m(&self, z: f64) -> f64 {
        let zp1 = z + 1.0;
        self.params.om0 * zp1 * zp1 * zp1 / self.e2(z)
    }

    /// Dark-energy density parameter at redshift z.
    pub fn omega_de(&self, z: f64) -> f64 {
        self.ode0 / self.e2(z)
    }

    pub fn omega_k(&self, z: f64) -> f64 {
        let zp1 = z + 1.0;
        self.ok0 * zp1 * zp1 / self.e2(z)
    }

    /// Critical density ρcrit(z) = ρcrit(0) E²(z), in h² M☉ / Mpc³.
    pub fn critical_density(&self, z: f64) -> f64 {
        RHO_CRIT0 * self.e2(z)
    }

    /// Mean matter density ρm(z), in h² M☉ / Mpc³.
    pub fn rho_m(&self, z: f64) -> f64 {
        let zp1 = z + 1.0;
        RHO_CRIT0 * self.params.om0 * zp1 * zp1 * zp1
    }

    /// Radius in Mpc/h of the sphere holding mass `m` (M☉/h) at the mean
    /// matter density today.
    ///
    /// # Examples
    /// ```
    /// use u_cosmo::cosmology::{CosmologyParams, LambdaCdm};
    ///
    /// let cosmo = LambdaCdm::new(CosmologyParams::flat(0.7, 0.3, 0.05, 0.8, 0.96)).unwrap();
    /// let r = cosmo.lagrangian_radius(1e14);
    /// assert!((cosmo.lagrangian_mass(r) / 1e14 - 1.0).abs() < 1e-12);
    /// ```
    pub fn lagrangian_radius(&self, m: f64) -> f64 {
        (0.75 * m / (PI * self.rho_m(0.0))).cbrt()
    }

    /// Mass in M☉/h enclosed by a Lagrangian radius `r` in Mpc/h.
    pub fn lagrangian_mass(&self, r: f64) -> f64 {
        4.0 * PI / 3.0 * r * r * r * self.rho_m(0.0)
    }

    /// Growth suppression relative to a matter-dominated universe,
    /// g(z) = (1 + z) D(z), with D unnormalized.
    pub fn g(&self, z: f64, exact: bool) -> f64 {
        (z + 1.0) * self.raw_growth(z + 1.0, exact)
    }

    /// Unnormalized D₊ as a function of 1 + z.
    fn raw_growth(&self, zp1: f64, exact: bool) -> f64 {
        if zp1 == 0.0 && self.ode0 == 0.0 {
            return self.matter_curvature_limit();
        }
        if exact {
            self.exact_growth(zp1)
        } else {
            self.fitted_growth(zp1)
        }
    }

    fn fitted_growth(&self, zp1: f64) -> f64 {
        if zp1 == 0.0 {
            // Ωm → 0 faster than 1 + z once dark energy dominates
            return 0.0;
        }
        let z = zp1 - 1.0;
        let om = self.omega_m(z);
        let ode = self.omega_de(z);
        let g = 2.5 * om / (om.powf(4.0 / 7.0) - ode + (1.0 + 0.5 * om) * (1.0 + ode / 70.0));
        g / zp1
    }

    fn exact_growth(&self, zp1: f64) -> f64 {
        let om0 = self.params.om0;
        let (ok0, ode0) = (self.ok0, self.ode0);
        let t_max = (1.0 / (zp1 + 1.0)).sqrt();

        // (a E)² = Ωm0/a + Ωk0 + ΩΛ0 a², with a = s / (1 − s) and s = t²;
        // the integrand is analytic in t at the origin.
        let integrand = |t: f64| {
            let s = t * t;
            let a = s / (1.0 - s);
            let ae2 = om0 / a + ok0 + ode0 * a * a;
            2.0 * t * ae2.powf(-1.5) / ((1.0 - s) * (1.0 - s))
        };
        // Non-finite values only arise for collapsing closed models; the
        // NaN reaches callers through their own finiteness checks.
        let integral = match self.integrator.integrate(integrand, 0.0, t_max) {
            Ok(value) => value,
            Err(err) => {
                warn!("growth integral at 1 + z = {zp1} failed: {err}");
                f64::NAN
            }
        };

        2.5 * om0 * self.e2(zp1 - 1.0).sqrt() * integral
    }

    /// a → ∞ limit of D₊ without dark energy: finite for open models,
    /// divergent for Einstein–de Sitter.
    fn matter_curvature_limit(&self) -> f64 {
        if self.ok0 > 0.0 {
            2.5 * self.params.om0 / self.ok0
        } else if self.ok0 == 0.0 {
            f64::INFINITY
        } else {
            f64::NAN
        }
    }
}

impl Cosmology for LambdaCdm {
    fn dplus(&self, z: f64, exact: bool) -> f64 {
        let d0 = if exact { self.exact_d0 } else { self.fit_d0 };
        self.raw_growth(z + 1.0, exact) / d0
    }

    fn ns(&self) -> f64 {
        self.params.ns
    }

    fn sigma8(&self) -> f64 {
        self.params.sigma8
    }

    fn validate(&self) -> Result<(), CosmologyError> {
        self.params.validate()
    }
}

impl<C: Cosmology + ?Sized> Cosmology for &C {
    fn dplus(&self, z: f64, exact: bool) -> f64 {
        (**self).dplus(z, exact)
    }

    fn ns(&self) -> f64 {
        (**self).ns()
    }

    fn sigma8(&self) -> f64 {
        (**self).sigma8()
    }

    fn validate(&self) -> Result<(), CosmologyError> {
        (**self).validate()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn planck_like() -> LambdaCdm {
        LambdaCdm::new(CosmologyParams::flat(0.7, 0.3, 0.05, 0.8, 0.96)).unwrap()
    }

    fn einstein_de_sitter() -> LambdaCdm {
        LambdaCdm::new(CosmologyParams::flat(0.7, 1.0, 0.05, 0.8, 1.0)).unwrap()
    }

    #[test]
    fn test_flat_closure() {
        let cosmo = planck_like();
        assert!(cosmo.is_flat());
        assert_relative_eq!(cosmo.e2(0.0), 1.0, epsilon = 1e-15);
        for &z in &[0.0, 0.5, 3.0] {
            let total = cosmo.omega_m(z) + cosmo.omega_de(z) + cosmo.omega_k(z);
            assert_relative_eq!(total, 1.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_open_curvature() {
        let mut params = CosmologyParams::flat(0.7, 0.3, 0.05, 0.8, 1.0);
        params.ode0 = Some(0.5);
        let cosmo = LambdaCdm::new(params).unwrap();
        assert!(!cosmo.is_flat());
        assert_relative_eq!(cosmo.ok0(), 0.2, epsilon = 1e-15);
    }

    #[test]
    fn test_eds_growth_is_scale_factor() {
        let cosmo = einstein_de_sitter();
        for &z in &[0.0, 0.5, 2.0, 10.0] {
            let expected = 1.0 / (1.0 + z);
            assert_relative_eq!(cosmo.dplus(z, false), expected, max_relative = 1e-12);
            assert_relative_eq!(cosmo.dplus(z, true), expected, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_growth_normalized_today() {
        let cosmo = planck_like();
        assert_relative_eq!(cosmo.dplus(0.0, false), 1.0, epsilon = 1e-15);
        assert_relative_eq!(cosmo.dplus(0.0, true), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_fit_tracks_exact_growth() {
        // The Carroll et al. fit is good to about a percent for ΛCDM
        let cosmo = planck_like();
        for &z in &[0.5, 1.0, 3.0] {
            let fit = cosmo.dplus(z, false);
            let exact = cosmo.dplus(z, true);
            assert!(
                ((fit - exact) / exact).abs() < 0.01,
                "z={z}: fit {fit}, exact {exact}"
            );
        }
    }

    #[test]
    fn test_growth_at_z_minus_one() {
        let cosmo = planck_like();
        assert_eq!(cosmo.dplus(-1.0, false), 0.0);
        let exact = cosmo.dplus(-1.0, true);
        assert!(exact.is_finite() && exact > 1.0);
    }

    #[test]
    fn test_collapsing_model_growth_is_nan() {
        // Ωm0 = 3 without dark energy turns around before a = 1.5
        let mut params = CosmologyParams::flat(0.7, 3.0, 0.05, 0.8, 1.0);
        params.ode0 = Some(0.0);
        let cosmo = LambdaCdm::new(params).unwrap();
        assert!(cosmo.dplus(0.5, true).is_finite());
        assert!(cosmo.dplus(-0.5, true).is_nan());
    }

    #[test]
    fn test_matter_density() {
        let cosmo = planck_like();
        assert_relative_eq!(cosmo.critical_density(0.0), RHO_CRIT0, max_relative = 1e-15);
        assert_relative_eq!(cosmo.rho_m(0.0), 0.3 * RHO_CRIT0, max_relative = 1e-15);
        assert_relative_eq!(cosmo.rho_m(1.0), 8.0 * cosmo.rho_m(0.0), max_relative = 1e-15);
    }

    #[test]
    fn test_lagrangian_mass_radius() {
        let cosmo = planck_like();
        // 8 Mpc/h holds about 1.8e14 M☉/h for Ωm0 = 0.3
        let m8 = cosmo.lagrangian_mass(8.0);
        assert_relative_eq!(m8, 4.0 * PI / 3.0 * 512.0 * 0.3 * RHO_CRIT0, max_relative = 1e-14);
        assert!(m8 > 1.7e14 && m8 < 1.9e14, "M(8) = {m8}");
        for &m in &[1e8, 1e12, 1e15] {
            let r = cosmo.lagrangian_radius(m);
            assert_relative_eq!(cosmo.lagrangian_mass(r), m, max_relative = 1e-12);
        }
        for &r in &[0.1, 8.0, 50.0] {
            assert_relative_eq!(cosmo.lagrangian_radius(cosmo.lagrangian_mass(r)), r, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_invalid_parameters() {
        let base = CosmologyParams::flat(0.7, 0.3, 0.05, 0.8, 1.0);
        let bad = [
            CosmologyParams { h: 0.0, ..base.clone() },
            CosmologyParams { om0: -0.1, ..base.clone() },
            CosmologyParams { ob0: 0.4, ..base.clone() },
            CosmologyParams { sigma8: 0.0, ..base.clone() },
            CosmologyParams { tcmb0: -1.0, ..base.clone() },
            CosmologyParams { om0: 1.2, ob0: 0.1, ..base.clone() },
            CosmologyParams { ode0: Some(-0.2), ..base.clone() },
        ];
        for params in bad {
            assert!(
                matches!(LambdaCdm::new(params.clone()), Err(CosmologyError::InvalidParameter(_))),
                "{params:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_params_from_json() {
        let params: CosmologyParams =
            serde_json::from_str(r#"{ "h": 0.7, "om0": 0.3, "ob0": 0.05, "sigma8": 0.8, "ns": 1.0 }"#)
                .unwrap();
        assert_eq!(params.tcmb0, 2.725);
        assert_eq!(params.ode0, None);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn growth_decreases_with_redshift(
            om0 in 0.1_f64..1.0,
            z in 0.0_f64..20.0,
            dz in 0.01_f64..5.0,
        ) {
            let cosmo = LambdaCdm::new(CosmologyParams::flat(0.7, om0, 0.0, 0.8, 1.0)).unwrap();
            prop_assert!(cosmo.dplus(z + dz, false) < cosmo.dplus(z, false));
            prop_assert!(cosmo.dplus(z + dz, true) < cosmo.dplus(z, true));
        }
    }
}
