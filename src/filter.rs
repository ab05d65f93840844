//! Smoothing filters and the integral transforms built on them.
//!
//! A filter smooths the density field on a radius `r`. Its Fourier
//! window `W(kr)` enters the moments of the power spectrum
//!
//! ```text
//! σ²ⱼ(r) = ∫ Δ²(k) k^{2j} W²(kr) d ln k,    Δ²(k) = k³ P(k) / (2π²)
//! ```
//!
//! and their radius derivative `dσ²ⱼ/dr`. The order-zero spherical
//! Bessel transform, which gives the correlation function, is
//! [`j0_convolution`].
//!
//! All transforms integrate in `x = kr` from `k_min r` up to the
//! filter's cutoff [`Filter::x_max`]: in `ln x` below x = 1 and in
//! linear `x` above it, where the top-hat window oscillates.

use crate::numeric::{Integrator, NumericError};
use crate::special::{
    gaussian_window, gaussian_window_derivative, sharp_k_window, spherical_bessel_j0,
    tophat_window, tophat_window_derivative,
};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// x = kr below which integrals run in ln x.
const LOG_LINEAR_SPLIT: f64 = 1.0;

/// Panel width in x above the split; W² has period π there.
const OSCILLATORY_PANEL_WIDTH: f64 = PI / 4.0;

/// 2π², the Fourier normalization of Δ².
const TWO_PI_SQUARED: f64 = 2.0 * PI * PI;

/// A filter name that matches no registered window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown filter '{0}' (expected one of: tophat, gauss, sharpk)")]
pub struct UnknownFilter(pub String);

// ============================================================================
// Filter
// ============================================================================

/// Registered smoothing windows.
///
/// # Examples
/// ```
/// use u_cosmo::filter::Filter;
///
/// let filter: Filter = "top-hat".parse().unwrap();
/// assert_eq!(filter, Filter::TopHat);
/// assert_eq!(filter.window(0.0), 1.0);
/// assert!("boxcar".parse::<Filter>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    /// Spherical top-hat in real space.
    #[default]
    #[serde(alias = "top-hat", alias = "top_hat")]
    TopHat,
    /// Gaussian in real and Fourier space.
    #[serde(alias = "gaussian")]
    Gauss,
    /// Top-hat in Fourier space.
    #[serde(alias = "sharp-k", alias = "sharp_k")]
    SharpK,
}

impl Filter {
    pub const ALL: [Filter; 3] = [Filter::TopHat, Filter::Gauss, Filter::SharpK];

    /// Canonical registry name.
    pub fn name(&self) -> &'static str {
        match self {
            Filter::TopHat => "tophat",
            Filter::Gauss => "gauss",
            Filter::SharpK => "sharpk",
        }
    }

    /// Fourier window W(x) at x = kr.
    pub fn window(&self, x: f64) -> f64 {
        match self {
            Filter::TopHat => tophat_window(x),
            Filter::Gauss => gaussian_window(x),
            Filter::SharpK => sharp_k_window(x),
        }
    }

    /// dW/dx. Zero for the sharp-k window away from its edge; the edge
    /// contribution is handled inside [`Filter::dcdr`].
    pub fn window_derivative(&self, x: f64) -> f64 {
        match self {
            Filter::TopHat => tophat_window_derivative(x),
            Filter::Gauss => gaussian_window_derivative(x),
            Filter::SharpK => 0.0,
        }
    }

    /// Upper cutoff of the integrals in x = kr.
    pub fn x_max(&self) -> f64 {
        match self {
            Filter::TopHat => 1e3,
            // W² = exp(−144) beyond this
            Filter::Gauss => 12.0,
            Filter::SharpK => 1.0,
        }
    }

    /// Moment of order `j` of the power spectrum `pk` smoothed on radius `r`,
    /// `∫ Δ²(k) k^{2j} W²(kr) d ln k`.
    ///
    /// # Examples
    /// ```
    /// use u_cosmo::filter::Filter;
    /// use u_cosmo::numeric::Integrator;
    /// use std::f64::consts::PI;
    ///
    /// // Gaussian spectrum and window: σ²(r) = √π / (8π²) (1 + r²)^{-3/2}
    /// let integrator = Integrator::new(16, 0.1);
    /// let sigma2 = Filter::Gauss
    ///     .convolution(|k| (-k * k).exp(), 1.0, 0, &integrator, 1e-8)
    ///     .unwrap();
    /// let expected = PI.sqrt() / (8.0 * PI * PI) * 2.0_f64.powf(-1.5);
    /// assert!((sigma2 / expected - 1.0).abs() < 1e-8);
    /// ```
    pub fn convolution<P: Fn(f64) -> f64>(
        &self,
        pk: P,
        r: f64,
        j: u32,
        integrator: &Integrator,
        k_min: f64,
    ) -> Result<f64, NumericError> {
        let power = 3 + 2 * j as i32;
        let density = |x: f64| {
            let k = x / r;
            let w = self.window(x);
            pk(k) * k.powi(power) * w * w / TWO_PI_SQUARED
        };
        self.integrate_in_x(density, r, integrator, k_min)
    }

    /// Radius derivative of [`Filter::convolution`].
    ///
    /// Smooth windows differentiate under the integral,
    /// `∫ Δ²(k) k^{2j} 2 W(kr) W'(kr) k d ln k`. The sharp-k moment only
    /// depends on r through its upper limit k = 1/r, giving
    /// `−Δ²(1/r) r^{−2j} / r`.
    pub fn dcdr<P: Fn(f64) -> f64>(
        &self,
        pk: P,
        r: f64,
        j: u32,
        integrator: &Integrator,
        k_min: f64,
    ) -> Result<f64, NumericError> {
        let power = 3 + 2 * j as i32;
        if let Filter::SharpK = self {
            let k = 1.0 / r;
            if k <= k_min {
                return Ok(0.0);
            }
            let value = -pk(k) * k.powi(power) / TWO_PI_SQUARED / r;
            return if value.is_finite() {
                Ok(value)
            } else {
                Err(NumericError::NonFinite("sharp-k radius derivative"))
            };
        }

        let density = |x: f64| {
            let k = x / r;
            pk(k) * k.powi(power) * 2.0 * self.window(x) * self.window_derivative(x) * k
                / TWO_PI_SQUARED
        };
        self.integrate_in_x(density, r, integrator, k_min)
    }

    /// ∫ density(x) d ln x from `k_min r` to the cutoff.
    fn integrate_in_x<G: Fn(f64) -> f64>(
        &self,
        density: G,
        r: f64,
        integrator: &Integrator,
        k_min: f64,
    ) -> Result<f64, NumericError> {
        let x_lo = k_min * r;
        let x_max = self.x_max();
        if x_lo >= x_max {
            return Ok(0.0);
        }
        let split = LOG_LINEAR_SPLIT.max(x_lo).min(x_max);

        let log_part = integrator.integrate(|u| density(u.exp()), x_lo.ln(), split.ln())?;
        let linear_part = integrator.integrate_panels(
            |x| density(x) / x,
            split,
            x_max,
            OSCILLATORY_PANEL_WIDTH,
        )?;
        Ok(log_part + linear_part)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Filter {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tophat" | "top-hat" | "top_hat" => Ok(Filter::TopHat),
            "gauss" | "gaussian" => Ok(Filter::Gauss),
            "sharpk" | "sharp-k" | "sharp_k" => Ok(Filter::SharpK),
            _ => Err(UnknownFilter(s.to_string())),
        }
    }
}

// ============================================================================
// Spherical Bessel Transform
// ============================================================================

/// Order-zero spherical Bessel transform of a power spectrum,
/// `ξ(r) = ∫ Δ²(k) j₀(kr) d ln k`.
///
/// # Algorithm
/// Up to the first zero of j₀ (x = π) the integral runs in ln x. The
/// oscillating remainder is summed over half periods of j₀ in linear x
/// with Euler-accelerated partial sums until `reltol` is met.
///
/// # Errors
/// [`NumericError::IntegralNotConverged`] if the tail has not settled
/// after `max_half_periods` half periods.
pub fn j0_convolution<P: Fn(f64) -> f64>(
    pk: P,
    r: f64,
    integrator: &Integrator,
    k_min: f64,
    reltol: f64,
    max_half_periods: usize,
) -> Result<f64, NumericError> {
    let delta = |x: f64| {
        let k = x / r;
        pk(k) * k * k * k / TWO_PI_SQUARED
    };

    let x_lo = k_min * r;
    let log_part = if x_lo < PI {
        integrator.integrate(
            |u| {
                let x = u.exp();
                delta(x) * spherical_bessel_j0(x)
            },
            x_lo.ln(),
            PI.ln(),
        )?
    } else {
        0.0
    };

    let tail = integrator.integrate_half_periods(
        |x| delta(x) * spherical_bessel_j0(x) / x,
        x_lo.max(PI),
        PI,
        log_part,
        reltol,
        max_half_periods,
    )?;
    Ok(log_part + tail)
}

// ============================================================================
// Tests
// ============================================================================


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn moments_positive_and_decreasing(r in 0.05_f64..50.0, filter_index in 0usize..3) {
            let filter = Filter::ALL[filter_index];
            let integrator = Integrator::new(16, 0.1);
            let pk = |k: f64| k / (1.0 + (k / 0.02).powi(4));
            let small = filter.convolution(pk, r, 0, &integrator, 1e-8).unwrap();
            let large = filter.convolution(pk, 1.5 * r, 0, &integrator, 1e-8).unwrap();
            prop_assert!(small > 0.0);
            prop_assert!(large < small, "σ²({}) = {large} ≥ σ²({r}) = {small}", 1.5 * r);
        }
    }
}
