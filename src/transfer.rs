//! Transfer functions of the linear matter power spectrum.
//!
//! A transfer function `T(k, z)` carries the primordial spectrum
//! `k^ns` through horizon entry and radiation-matter equality. Wavenumbers
//! are in h/Mpc.
//!
//! | Model | Reference |
//! |-------|-----------|
//! | [`Sugiyama96`] | Bardeen et al. (1986), baryon correction by Sugiyama (1995) |
//! | [`EisensteinHuZeroBaryon`] | Eisenstein & Hu (1998), ApJ 496, 605, eqs. 26–31 |
//! | [`EisensteinHuWithBaryon`] | Eisenstein & Hu (1998), eqs. 2–24 |
//! | [`TabulatedTransfer`] | natural cubic spline through `(ln k, ln T)` samples |
//!
//! Any `Fn(k, z) -> T` closure is also a [`TransferFunction`].

use crate::cosmology::{CosmologyError, CosmologyParams};
use crate::special::spherical_bessel_j0;
use serde::{Deserialize, Serialize};
use std::f64::consts::E;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while building a transfer function.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransferError {
    #[error("invalid transfer table: {0}")]
    InvalidTable(String),

    #[error("unknown transfer model '{0}' (expected one of: sugiyama96, bbks, eisenstein98_zb, eisenstein98_wb)")]
    UnknownModel(String),

    #[error(transparent)]
    Cosmology(#[from] CosmologyError),
}

// ============================================================================
// Capability
// ============================================================================

/// Transfer function T(k, z), finite and non-negative for k > 0.
pub trait TransferFunction {
    fn transfer(&self, k: f64, z: f64) -> f64;
}

impl<F: Fn(f64, f64) -> f64> TransferFunction for F {
    fn transfer(&self, k: f64, z: f64) -> f64 {
        self(k, z)
    }
}

/// CMB temperature in units of 2.7 K.
fn theta_cmb(params: &CosmologyParams) -> f64 {
    params.tcmb0 / 2.7
}

// ============================================================================
// BBKS / Sugiyama
// ============================================================================

/// BBKS fitting formula with the Sugiyama shape parameter.
///
/// ```text
/// q = k Θ² / (Ωm h) · exp(Ωb + √(2h) Ωb / Ωm)
/// T = ln(1 + 2.34q) / (2.34q) · [1 + 3.89q + (16.1q)² + (5.46q)³ + (6.71q)⁴]^{−1/4}
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Sugiyama96 {
    /// q / k
    q_per_k: f64,
}

impl Sugiyama96 {
    pub fn new(params: &CosmologyParams) -> Result<Self, TransferError> {
        params.validate()?;
        let (h, om0, ob0) = (params.h, params.om0, params.ob0);
        let theta = theta_cmb(params);
        let shape = (ob0 + (2.0 * h).sqrt() * ob0 / om0).exp();
        Ok(Self {
            q_per_k: theta * theta / (om0 * h) * shape,
        })
    }
}

impl TransferFunction for Sugiyama96 {
    fn transfer(&self, k: f64, _z: f64) -> f64 {
        let q = k * self.q_per_k;
        if q == 0.0 {
            return 1.0;
        }
        let log_term = (2.34 * q).ln_1p() / (2.34 * q);
        let poly = 1.0 + 3.89 * q + (16.1 * q).powi(2) + (5.46 * q).powi(3) + (6.71 * q).powi(4);
        log_term * poly.powf(-0.25)
    }
}

// ============================================================================
// Eisenstein & Hu, zero baryon
// ============================================================================

/// Eisenstein & Hu (1998) shape fit without acoustic oscillations.
#[derive(Debug, Clone, PartialEq)]
pub struct EisensteinHuZeroBaryon {
    h: f64,
    theta2: f64,
    /// Ωm h
    gamma: f64,
    alpha_gamma: f64,
    /// Approximate sound horizon in Mpc, eq. 26.
    sound_horizon: f64,
}

impl EisensteinHuZeroBaryon {
    pub fn new(params: &CosmologyParams) -> Result<Self, TransferError> {
        params.validate()?;
        let (h, om0, ob0) = (params.h, params.om0, params.ob0);
        let theta = theta_cmb(params);
        let omh2 = om0 * h * h;
        let obh2 = ob0 * h * h;
        let fb = ob0 / om0;

        let sound_horizon = 44.5 * (9.83 / omh2).ln() / (1.0 + 10.0 * obh2.powf(0.75)).sqrt();
        let alpha_gamma =
            1.0 - 0.328 * (431.0 * omh2).ln() * fb + 0.38 * (22.3 * omh2).ln() * fb * fb;

        Ok(Self {
            h,
            theta2: theta * theta,
            gamma: om0 * h,
            alpha_gamma,
            sound_horizon,
        })
    }

    pub fn sound_horizon(&self) -> f64 {
        self.sound_horizon
    }
}

impl TransferFunction for EisensteinHuZeroBaryon {
    fn transfer(&self, k: f64, _z: f64) -> f64 {
        // The sound-horizon term takes k in 1/Mpc
        let ks = 0.43 * k * self.h * self.sound_horizon;
        let gamma_eff =
            self.gamma * (self.alpha_gamma + (1.0 - self.alpha_gamma) / (1.0 + ks.powi(4)));
        let q = k * self.theta2 / gamma_eff;
        let l = (2.0 * E + 1.8 * q).ln();
        let c = 14.2 + 731.0 / (1.0 + 62.5 * q);
        l / (l + c * q * q)
    }
}

// ============================================================================
// Eisenstein & Hu, with baryon oscillations
// ============================================================================

/// Full Eisenstein & Hu (1998) transfer function with baryon acoustic
/// oscillations and Silk damping.
#[derive(Debug, Clone, PartialEq)]
pub struct EisensteinHuWithBaryon {
    h: f64,
    fb: f64,
    fc: f64,
    k_eq: f64,
    sound_horizon: f64,
    k_silk: f64,
    alpha_c: f64,
    beta_c: f64,
    alpha_b: f64,
    beta_b: f64,
    beta_node: f64,
}

impl EisensteinHuWithBaryon {
    pub fn new(params: &CosmologyParams) -> Result<Self, TransferError> {
        params.validate()?;
        let (h, om0, ob0) = (params.h, params.om0, params.ob0);
        let theta = theta_cmb(params);
        let theta2 = theta * theta;
        let omh2 = om0 * h * h;
        let obh2 = ob0 * h * h;
        let fb = ob0 / om0;
        let fc = 1.0 - fb;

        // Equality (eqs. 2, 3)
        let zp1_eq = 2.50e4 * omh2 / (theta2 * theta2);
        let k_eq = 7.46e-2 * omh2 / theta2;

        // Drag epoch (eq. 4)
        let c1 = 0.313 * (1.0 + 0.607 * omh2.powf(0.674)) / omh2.powf(0.419);
        let c2 = 0.238 * omh2.powf(0.223);
        let z_d = 1291.0 * omh2.powf(0.251) * (1.0 + c1 * obh2.powf(c2))
            / (1.0 + 0.659 * omh2.powf(0.828));

        // Baryon-photon momentum ratio (eq. 5)
        let r_const = 31.5 * obh2 / (theta2 * theta2) * 1000.0;
        let r_eq = r_const / zp1_eq;
        let r_d = r_const / (1.0 + z_d);

        // Sound horizon and Silk scale (eqs. 6, 7)
        let sound_horizon = 2.0 / (3.0 * k_eq)
            * (6.0 / r_eq).sqrt()
            * (((1.0 + r_d).sqrt() + (r_eq + r_d).sqrt()) / (1.0 + r_eq.sqrt())).ln();
        let k_silk = 1.6 * obh2.powf(0.52) * omh2.powf(0.73) * (1.0 + (10.4 * omh2).powf(-0.95));

        // CDM suppression (eqs. 11, 12)
        let a1 = (1.0 + (32.1 * omh2).powf(-0.532)) * (46.9 * omh2).powf(0.670);
        let a2 = (1.0 + (45.0 * omh2).powf(-0.582)) * (12.0 * omh2).powf(0.424);
        let alpha_c = a1.powf(-fb) * a2.powf(-fb.powi(3));
        let b1 = 0.944 / (1.0 + (458.0 * omh2).powf(-0.708));
        let b2 = (0.395 * omh2).powf(-0.0266);
        let beta_c = 1.0 / (1.0 + b1 * (fc.powf(b2) - 1.0));

        // Baryon amplitude (eqs. 14, 15, 23, 24)
        let y = zp1_eq / (1.0 + z_d);
        let y1 = (1.0 + y).sqrt();
        let g_y = y * (-6.0 * y1 + (2.0 + 3.0 * y) * ((y1 + 1.0) / (y1 - 1.0)).ln());
        let alpha_b = 2.07 * k_eq * sound_horizon * g_y * (1.0 + r_d).powf(-0.75);
        let beta_b = 0.5 + fb + (3.0 - 2.0 * fb) * ((17.2 * omh2).powi(2) + 1.0).sqrt();
        let beta_node = 8.41 * omh2.powf(0.435);

        Ok(Self {
            h,
            fb,
            fc,
            k_eq,
            sound_horizon,
            k_silk,
            alpha_c,
            beta_c,
            alpha_b,
            beta_b,
            beta_node,
        })
    }

    /// Sound horizon at the drag epoch, in Mpc.
    pub fn sound_horizon(&self) -> f64 {
        self.sound_horizon
    }

    /// Eqs. 19, 20: T̃₀(k, α, β) with q = k / (13.41 k_eq).
    fn t0_tilde(q: f64, alpha: f64, beta: f64) -> f64 {
        let l = (E + 1.8 * beta * q).ln();
        let c = 14.2 / alpha + 386.0 / (1.0 + 69.9 * q.powf(1.08));
        l / (l + c * q * q)
    }
}

impl TransferFunction for EisensteinHuWithBaryon {
    fn transfer(&self, k: f64, _z: f64) -> f64 {
        let k = k * self.h;
        let q = k / (13.41 * self.k_eq);
        let x = k * self.sound_horizon;

        // Cold dark matter (eqs. 17, 18)
        let f = 1.0 / (1.0 + (x / 5.4).powi(4));
        let tc = f * Self::t0_tilde(q, 1.0, self.beta_c)
            + (1.0 - f) * Self::t0_tilde(q, self.alpha_c, self.beta_c);

        // Baryons (eqs. 21, 22)
        let s_tilde = self.sound_horizon / (1.0 + (self.beta_node / x).powi(3)).cbrt();
        let x_tilde = k * s_tilde;
        let tb = (Self::t0_tilde(q, 1.0, 1.0) / (1.0 + (x / 5.2).powi(2))
            + self.alpha_b / (1.0 + (self.beta_b / x).powi(3)) * (-(k / self.k_silk).powf(1.4)).exp())
            * spherical_bessel_j0(x_tilde);

        self.fb * tb + self.fc * tc
    }
}

// ============================================================================
// Tabulated
// ============================================================================

/// Transfer function interpolated from `(ln k, ln T)` samples by a natural
/// cubic spline, extended linearly in log space beyond the table.
///
/// # Examples
/// ```
/// use u_cosmo::transfer::{TabulatedTransfer, TransferFunction};
///
/// // T ∝ k⁻² sampled on a log grid is reproduced exactly
/// let ln_k: Vec<f64> = (0..8).map(|i| -3.0 + 0.5 * i as f64).collect();
/// let ln_t: Vec<f64> = ln_k.iter().map(|lk| -2.0 * lk).collect();
/// let table = TabulatedTransfer::new(&ln_k, &ln_t).unwrap();
/// assert!((table.transfer(0.1, 0.0) - 100.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TabulatedTransfer {
    ln_k: Vec<f64>,
    ln_t: Vec<f64>,
    /// Second derivatives of the spline at the knots.
    curvature: Vec<f64>,
}

impl TabulatedTransfer {
    /// Builds the spline.
    ///
    /// # Errors
    /// [`TransferError::InvalidTable`] if the columns differ in length,
    /// hold fewer than two points, contain non-finite values, or `ln k`
    /// is not strictly increasing.
    pub fn new(ln_k: &[f64], ln_t: &[f64]) -> Result<Self, TransferError> {
        if ln_k.len() != ln_t.len() {
            return Err(TransferError::InvalidTable(format!(
                "ln k has {} samples but ln T has {}",
                ln_k.len(),
                ln_t.len()
            )));
        }
        if ln_k.len() < 2 {
            return Err(TransferError::InvalidTable(
                "at least two samples are required".into(),
            ));
        }
        if ln_k.iter().chain(ln_t).any(|v| !v.is_finite()) {
            return Err(TransferError::InvalidTable("non-finite sample".into()));
        }
        if ln_k.windows(2).any(|w| w[1] <= w[0]) {
            return Err(TransferError::InvalidTable(
                "ln k must be strictly increasing".into(),
            ));
        }

        Ok(Self {
            curvature: natural_spline_curvature(ln_k, ln_t),
            ln_k: ln_k.to_vec(),
            ln_t: ln_t.to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.ln_k.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ln_k.is_empty()
    }

    /// Spline value of ln T at `x = ln k`; NaN when `x` is NaN.
    pub fn ln_transfer(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let n = self.ln_k.len();
        let (xs, ys, m) = (&self.ln_k, &self.ln_t, &self.curvature);

        if x <= xs[0] {
            let h = xs[1] - xs[0];
            let slope = (ys[1] - ys[0]) / h - h * m[1] / 6.0;
            return ys[0] + slope * (x - xs[0]);
        }
        if x >= xs[n - 1] {
            let h = xs[n - 1] - xs[n - 2];
            let slope = (ys[n - 1] - ys[n - 2]) / h + h * m[n - 2] / 6.0;
            return ys[n - 1] + slope * (x - xs[n - 1]);
        }

        // Interval [xs[i], xs[i+1]] containing x
        let i = xs.partition_point(|&v| v <= x) - 1;
        let h = xs[i + 1] - xs[i];
        let a = (xs[i + 1] - x) / h;
        let b = (x - xs[i]) / h;
        a * ys[i] + b * ys[i + 1] + ((a * a * a - a) * m[i] + (b * b * b - b) * m[i + 1]) * h * h / 6.0
    }
}

impl TransferFunction for TabulatedTransfer {
    fn transfer(&self, k: f64, _z: f64) -> f64 {
        self.ln_transfer(k.ln()).exp()
    }
}

/// Second derivatives of the natural cubic spline through `(x, y)`,
/// by the Thomas algorithm on the tridiagonal system.
fn natural_spline_curvature(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut m = vec![0.0; n];
    if n < 3 {
        return m;
    }

    // Forward sweep over the interior knots
    let mut c_prime = vec![0.0; n];
    let mut d_prime = vec![0.0; n];
    for i in 1..n - 1 {
        let h_lo = x[i] - x[i - 1];
        let h_hi = x[i + 1] - x[i];
        let diag = 2.0 * (h_lo + h_hi);
        let rhs = 6.0 * ((y[i + 1] - y[i]) / h_hi - (y[i] - y[i - 1]) / h_lo);
        let denom = diag - h_lo * c_prime[i - 1];
        c_prime[i] = h_hi / denom;
        d_prime[i] = (rhs - h_lo * d_prime[i - 1]) / denom;
    }

    // Back substitution; m[0] = m[n-1] = 0
    for i in (1..n - 1).rev() {
        m[i] = d_prime[i] - c_prime[i] * m[i + 1];
    }
    m
}

// ============================================================================
// Registry
// ============================================================================

/// Names of the analytic transfer models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferKind {
    #[serde(rename = "sugiyama96", alias = "bbks")]
    Sugiyama96,
    #[serde(rename = "eisenstein98_zb")]
    EisensteinHuZeroBaryon,
    #[serde(rename = "eisenstein98_wb")]
    EisensteinHuWithBaryon,
}

impl TransferKind {
    pub const ALL: [TransferKind; 3] = [
        TransferKind::Sugiyama96,
        TransferKind::EisensteinHuZeroBaryon,
        TransferKind::EisensteinHuWithBaryon,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TransferKind::Sugiyama96 => "sugiyama96",
            TransferKind::EisensteinHuZeroBaryon => "eisenstein98_zb",
            TransferKind::EisensteinHuWithBaryon => "eisenstein98_wb",
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransferKind {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sugiyama96" | "bbks" => Ok(TransferKind::Sugiyama96),
            "eisenstein98_zb" => Ok(TransferKind::EisensteinHuZeroBaryon),
            "eisenstein98_wb" => Ok(TransferKind::EisensteinHuWithBaryon),
            _ => Err(TransferError::UnknownModel(s.to_string())),
        }
    }
}

/// Any registered transfer model behind one type.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferModel {
    Sugiyama96(Sugiyama96),
    EisensteinHuZeroBaryon(EisensteinHuZeroBaryon),
    EisensteinHuWithBaryon(EisensteinHuWithBaryon),
    Tabulated(TabulatedTransfer),
}

impl TransferModel {
    /// Builds the analytic model `kind` for the given parameters.
    pub fn new(kind: TransferKind, params: &CosmologyParams) -> Result<Self, TransferError> {
        Ok(match kind {
            TransferKind::Sugiyama96 => TransferModel::Sugiyama96(Sugiyama96::new(params)?),
            TransferKind::EisensteinHuZeroBaryon => {
                TransferModel::EisensteinHuZeroBaryon(EisensteinHuZeroBaryon::new(params)?)
            }
            TransferKind::EisensteinHuWithBaryon => {
                TransferModel::EisensteinHuWithBaryon(EisensteinHuWithBaryon::new(params)?)
            }
        })
    }

    /// Parses a model name and builds it.
    pub fn from_name(name: &str, params: &CosmologyParams) -> Result<Self, TransferError> {
        Self::new(name.parse()?, params)
    }

    /// Registry name, `"tabulated"` for spline tables.
    pub fn name(&self) -> &'static str {
        match self {
            TransferModel::Sugiyama96(_) => TransferKind::Sugiyama96.name(),
            TransferModel::EisensteinHuZeroBaryon(_) => TransferKind::EisensteinHuZeroBaryon.name(),
            TransferModel::EisensteinHuWithBaryon(_) => TransferKind::EisensteinHuWithBaryon.name(),
            TransferModel::Tabulated(_) => "tabulated",
        }
    }
}

impl TransferFunction for TransferModel {
    fn transfer(&self, k: f64, z: f64) -> f64 {
        match self {
            TransferModel::Sugiyama96(m) => m.transfer(k, z),
            TransferModel::EisensteinHuZeroBaryon(m) => m.transfer(k, z),
            TransferModel::EisensteinHuWithBaryon(m) => m.transfer(k, z),
            TransferModel::Tabulated(m) => m.transfer(k, z),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn transfer_finite_and_non_negative(
            lnk in -10.0_f64..5.0,
            om0 in 0.1_f64..0.9,
            fb in 0.0_f64..0.3,
            h in 0.5_f64..0.9,
        ) {
            let params = CosmologyParams::flat(h, om0, fb * om0, 0.8, 1.0);
            let k = lnk.exp();
            for kind in [TransferKind::Sugiyama96, TransferKind::EisensteinHuZeroBaryon] {
                let t = TransferModel::new(kind, &params).unwrap().transfer(k, 0.0);
                prop_assert!(t.is_finite() && t >= 0.0, "{kind}: T({k}) = {t}");
            }
        }
    }
}
