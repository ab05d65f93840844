//! Linear matter power spectrum and its derived statistics.
//!
//! [`PowerSpectrum`] combines a background [`Cosmology`], a
//! [`TransferFunction`] and a smoothing [`Filter`]:
//!
//! ```text
//! P(k, z) = A kⁿˢ T²(k, z) D₊²(z)
//! ```
//!
//! The amplitude `A` is fixed at construction so that the variance in
//! spheres of 8 Mpc/h at z = 0 equals σ₈². Every statistic is then a pure
//! function of its arguments:
//!
//! | Statistic | Definition |
//! |-----------|------------|
//! | variance σ²(r) | `∫ Δ²(k) W²(kr) d ln k` |
//! | spectral moment σ²ⱼ(r) | `∫ Δ²(k) k^{2j} W²(kr) d ln k` |
//! | correlation ξ(r) | `∫ Δ²(k) j₀(kr) d ln k` |
//! | d ln σ / d ln r | `r σ²'(r) / (2 σ²(r))` |
//! | d² ln σ / d ln r² | five-point stencil in ln r |
//! | effective index n_eff(k) | five-point stencil of ln P in ln k |
//!
//! with `Δ²(k) = k³ P(k) / (2π²)`.
//!
//! Every redshift argument must be a scalar with z ≥ −1. Only the linear
//! spectrum is modelled; asking for the nonlinear one fails with
//! [`PowerSpectrumError::NotImplemented`].

use crate::config::{ConfigError, NumericSettings, SpectrumConfig};
use crate::cosmology::{Cosmology, CosmologyError, CosmologyParams, LambdaCdm};
use crate::filter::{j0_convolution, Filter, UnknownFilter};
use crate::numeric::{five_point_derivative, solve, Integrator, NumericError};
use crate::transfer::{TransferError, TransferFunction, TransferKind, TransferModel};
use log::debug;
use std::f64::consts::PI;
use thiserror::Error;

/// Radius of the spheres defining σ₈, in Mpc/h.
pub const SIGMA8_RADIUS: f64 = 8.0;

/// Errors raised by power spectrum construction and queries.
#[derive(Debug, Error)]
pub enum PowerSpectrumError {
    #[error("invalid cosmology: {0}")]
    InvalidCosmology(#[from] CosmologyError),

    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] UnknownFilter),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error(transparent)]
    InvalidTransfer(#[from] TransferError),

    /// The unnormalized variance at 8 Mpc/h is zero, negative or not finite.
    #[error("cannot normalize: variance at r = 8 is {0}")]
    DegenerateNormalization(f64),

    #[error("z must be a scalar")]
    NonScalarRedshift,

    #[error("redshift cannot be less than -1, got {0}")]
    RedshiftOutOfRange(f64),

    /// A wavenumber or radius that is zero, negative or not finite.
    #[error("{name} must be positive and finite, got {value}")]
    InvalidArgument { name: &'static str, value: f64 },

    #[error("{0} is not implemented for a linear power spectrum model")]
    NotImplemented(&'static str),

    #[error(transparent)]
    Numeric(#[from] NumericError),
}

// ============================================================================
// Redshift Argument
// ============================================================================

/// Redshift argument of a query.
///
/// Queries accept anything convertible into `Redshift`; only a scalar
/// z ≥ −1 is valid.
///
/// # Examples
/// ```
/// use u_cosmo::power::{PowerSpectrumError, Redshift};
///
/// assert_eq!(Redshift::from(0.5).scalar().unwrap(), 0.5);
/// assert!(matches!(
///     Redshift::from(vec![0.0, 1.0]).scalar(),
///     Err(PowerSpectrumError::NonScalarRedshift)
/// ));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Redshift {
    Scalar(f64),
    Array(Vec<f64>),
}

impl Redshift {
    /// The validated scalar value.
    ///
    /// # Errors
    /// - [`PowerSpectrumError::NonScalarRedshift`] for an array.
    /// - [`PowerSpectrumError::RedshiftOutOfRange`] for z < −1 or NaN.
    pub fn scalar(&self) -> Result<f64, PowerSpectrumError> {
        match *self {
            Redshift::Array(_) => Err(PowerSpectrumError::NonScalarRedshift),
            Redshift::Scalar(z) if !(z >= -1.0) => Err(PowerSpectrumError::RedshiftOutOfRange(z)),
            Redshift::Scalar(z) => Ok(z),
        }
    }
}

impl From<f64> for Redshift {
    fn from(z: f64) -> Self {
        Redshift::Scalar(z)
    }
}

impl From<Vec<f64>> for Redshift {
    fn from(z: Vec<f64>) -> Self {
        Redshift::Array(z)
    }
}

impl From<&[f64]> for Redshift {
    fn from(z: &[f64]) -> Self {
        Redshift::Array(z.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for Redshift {
    fn from(z: [f64; N]) -> Self {
        Redshift::Array(z.to_vec())
    }
}

// ============================================================================
// Power Spectrum
// ============================================================================

/// Normalized linear matter power spectrum.
///
/// # Examples
/// ```
/// use u_cosmo::config::SpectrumConfig;
/// use u_cosmo::cosmology::CosmologyParams;
/// use u_cosmo::power::PowerSpectrum;
/// use u_cosmo::transfer::TransferKind;
///
/// let params = CosmologyParams::flat(0.7, 0.3, 0.05, 0.8, 0.96);
/// let spectrum = PowerSpectrum::from_params(
///     params,
///     TransferKind::EisensteinHuZeroBaryon,
///     SpectrumConfig::default(),
/// )
/// .unwrap();
///
/// let sigma2 = spectrum.variance(8.0, 0.0, true).unwrap();
/// assert!((sigma2 - 0.64).abs() < 1e-10);
/// assert!(spectrum.linear_power_spectrum(0.1, 0.0, false).unwrap() > 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct PowerSpectrum<C, T> {
    cosmology: C,
    transfer: T,
    filter: Filter,
    exact_growth: bool,
    settings: NumericSettings,
    integrator: Integrator,
    norm: f64,
}

/// The normalized linear spectrum under its conventional name.
pub type LinearPowerSpectrum<C, T> = PowerSpectrum<C, T>;

impl PowerSpectrum<LambdaCdm, TransferModel> {
    /// ΛCDM spectrum with one of the registered analytic transfer models.
    pub fn from_params(
        params: CosmologyParams,
        kind: TransferKind,
        config: SpectrumConfig,
    ) -> Result<Self, PowerSpectrumError> {
        let transfer = TransferModel::new(kind, &params)?;
        let cosmology = LambdaCdm::new(params)?;
        Self::with_config(cosmology, transfer, config)
    }
}

impl<C: Cosmology, T: TransferFunction> PowerSpectrum<C, T> {
    /// Builds and normalizes a spectrum with default numerical settings.
    ///
    /// # Errors
    /// - [`PowerSpectrumError::InvalidCosmology`] if the cosmology fails validation.
    /// - [`PowerSpectrumError::DegenerateNormalization`] if σ²(8) cannot be normalized.
    /// - Numerical errors from the normalization integral.
    pub fn new(cosmology: C, transfer: T, filter: Filter) -> Result<Self, PowerSpectrumError> {
        Self::with_config(cosmology, transfer, SpectrumConfig::with_filter(filter))
    }

    /// Like [`PowerSpectrum::new`], with the filter given by name.
    ///
    /// # Errors
    /// [`PowerSpectrumError::InvalidFilter`] for an unregistered name.
    pub fn from_filter_name(
        cosmology: C,
        transfer: T,
        filter: &str,
    ) -> Result<Self, PowerSpectrumError> {
        let filter: Filter = filter.parse()?;
        Self::new(cosmology, transfer, filter)
    }

    /// Builds and normalizes a spectrum from a full configuration.
    pub fn with_config(
        cosmology: C,
        transfer: T,
        config: SpectrumConfig,
    ) -> Result<Self, PowerSpectrumError> {
        cosmology.validate()?;
        config.validate()?;
        debug!(
            "building power spectrum: filter={}, exact_growth={}",
            config.filter, config.exact_growth
        );

        let mut spectrum = Self {
            cosmology,
            transfer,
            filter: config.filter,
            exact_growth: config.exact_growth,
            integrator: Integrator::from_settings(&config.numeric),
            settings: config.numeric,
            norm: 1.0,
        };
        spectrum.normalize()?;
        Ok(spectrum)
    }

    /// Sets `A = σ₈² / σ²(8, z = 0)`, the variance taken at unit amplitude.
    ///
    /// On error the previous amplitude is kept.
    pub fn normalize(&mut self) -> Result<(), PowerSpectrumError> {
        let variance = {
            let unit = self.power_kernel(1.0, 0.0);
            self.filter.convolution(
                &unit,
                SIGMA8_RADIUS,
                0,
                &self.integrator,
                self.settings.k_min,
            )?
        };
        if !(variance.is_finite() && variance > 0.0) {
            return Err(PowerSpectrumError::DegenerateNormalization(variance));
        }

        let sigma8 = self.cosmology.sigma8();
        self.norm = sigma8 * sigma8 / variance;
        debug!(
            "normalized power spectrum: A = {:e} (unit variance at r = 8: {:e})",
            self.norm, variance
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Normalization amplitude `A`.
    pub fn normalization(&self) -> f64 {
        self.norm
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn uses_exact_growth(&self) -> bool {
        self.exact_growth
    }

    pub fn settings(&self) -> &NumericSettings {
        &self.settings
    }

    pub fn cosmology(&self) -> &C {
        &self.cosmology
    }

    pub fn transfer(&self) -> &T {
        &self.transfer
    }

    pub fn ns(&self) -> f64 {
        self.cosmology.ns()
    }

    pub fn sigma8(&self) -> f64 {
        self.cosmology.sigma8()
    }

    /// Linear growth factor with this spectrum's growth mode.
    pub fn dplus(&self, z: impl Into<Redshift>) -> Result<f64, PowerSpectrumError> {
        let z = z.into().scalar()?;
        Ok(self.cosmology.dplus(z, self.exact_growth))
    }

    // ------------------------------------------------------------------------
    // Power spectra
    // ------------------------------------------------------------------------

    /// `P(k, z)`, or `Δ²(k, z) = k³ P / (2π²)` when `dimensionless`.
    pub fn linear_power_spectrum(
        &self,
        k: f64,
        z: impl Into<Redshift>,
        dimensionless: bool,
    ) -> Result<f64, PowerSpectrumError> {
        let z = z.into().scalar()?;
        let k = positive_argument("k", k)?;
        let pk = self.power_kernel(self.norm, z)(k);
        Ok(if dimensionless {
            k * k * k * pk / (2.0 * PI * PI)
        } else {
            pk
        })
    }

    /// Always fails: nonlinear modelling belongs to dedicated models.
    pub fn nonlinear_power_spectrum(
        &self,
        _k: f64,
        _z: impl Into<Redshift>,
        _dimensionless: bool,
    ) -> Result<f64, PowerSpectrumError> {
        Err(PowerSpectrumError::NotImplemented("nonlinear power spectrum"))
    }

    /// Always fails, see [`PowerSpectrum::nonlinear_power_spectrum`].
    pub fn nonlinear_k(&self, _k: f64, _z: impl Into<Redshift>) -> Result<f64, PowerSpectrumError> {
        Err(PowerSpectrumError::NotImplemented("nonlinear wavenumber"))
    }

    /// Routes to the linear or nonlinear spectrum.
    pub fn matter_power_spectrum(
        &self,
        k: f64,
        z: impl Into<Redshift>,
        dimensionless: bool,
        linear: bool,
    ) -> Result<f64, PowerSpectrumError> {
        if linear {
            self.linear_power_spectrum(k, z, dimensionless)
        } else {
            self.nonlinear_power_spectrum(k, z, dimensionless)
        }
    }

    // ------------------------------------------------------------------------
    // Derived statistics
    // ------------------------------------------------------------------------

    /// Two-point correlation function ξ(r).
    pub fn matter_correlation(
        &self,
        r: f64,
        z: impl Into<Redshift>,
        linear: bool,
    ) -> Result<f64, PowerSpectrumError> {
        let pk = self.query_kernel(("r", r), z, linear)?;
        Ok(j0_convolution(
            pk,
            r,
            &self.integrator,
            self.settings.k_min,
            self.settings.reltol,
            self.settings.max_half_periods,
        )?)
    }

    /// Mass variance σ²(r) smoothed with the spectrum's filter.
    pub fn variance(
        &self,
        r: f64,
        z: impl Into<Redshift>,
        linear: bool,
    ) -> Result<f64, PowerSpectrumError> {
        self.spectral_moment(r, 0, z, linear)
    }

    /// Spectral moment σ²ⱼ(r); the variance is j = 0.
    pub fn spectral_moment(
        &self,
        r: f64,
        j: u32,
        z: impl Into<Redshift>,
        linear: bool,
    ) -> Result<f64, PowerSpectrumError> {
        let pk = self.query_kernel(("r", r), z, linear)?;
        Ok(self
            .filter
            .convolution(pk, r, j, &self.integrator, self.settings.k_min)?)
    }

    /// d ln σ / d ln r from the filter's analytic radius derivative.
    pub fn dlnsdlnr(
        &self,
        r: f64,
        z: impl Into<Redshift>,
        linear: bool,
    ) -> Result<f64, PowerSpectrumError> {
        let pk = self.query_kernel(("r", r), z, linear)?;
        self.log_slope(&pk, r)
    }

    /// d ln σ / d ln M for M ∝ r³; see [`LambdaCdm::lagrangian_radius`]
    /// for the radius of a given mass.
    pub fn dlnsdlnm(
        &self,
        r: f64,
        z: impl Into<Redshift>,
        linear: bool,
    ) -> Result<f64, PowerSpectrumError> {
        Ok(self.dlnsdlnr(r, z, linear)? / 3.0)
    }

    /// d² ln σ / d ln r², by the five-point stencil on
    /// [`PowerSpectrum::dlnsdlnr`] with step `settings.step` in ln r.
    pub fn d2lnsdlnr2(
        &self,
        r: f64,
        z: impl Into<Redshift>,
        linear: bool,
    ) -> Result<f64, PowerSpectrumError> {
        let pk = self.query_kernel(("r", r), z, linear)?;
        five_point_derivative(|lnr| self.log_slope(&pk, lnr.exp()), r.ln(), self.settings.step)
    }

    /// Radius whose variance equals `variance`.
    ///
    /// Solves `σ²(e^{ln r}) − variance = 0` for ln r inside
    /// `settings.radius_bracket`, to `settings.reltol` in ln r.
    ///
    /// # Errors
    /// [`NumericError::NoSignChange`] (wrapped) if the variance lies
    /// outside the range spanned by the bracket.
    pub fn radius(
        &self,
        variance: f64,
        z: impl Into<Redshift>,
        linear: bool,
    ) -> Result<f64, PowerSpectrumError> {
        let pk = self.query_kernel(("variance", variance), z, linear)?;
        let (lo, hi) = self.settings.radius_bracket;
        let lnr = solve(
            |lnr| {
                let sigma2 = self.filter.convolution(
                    &pk,
                    lnr.exp(),
                    0,
                    &self.integrator,
                    self.settings.k_min,
                )?;
                Ok::<_, PowerSpectrumError>(sigma2 - variance)
            },
            lo.ln(),
            hi.ln(),
            self.settings.reltol,
            self.settings.max_iterations,
        )?;
        Ok(lnr.exp())
    }

    /// Radius whose rms fluctuation equals `sigma`.
    pub fn radius_from_sigma(
        &self,
        sigma: f64,
        z: impl Into<Redshift>,
        linear: bool,
    ) -> Result<f64, PowerSpectrumError> {
        self.radius(sigma * sigma, z, linear)
    }

    /// Effective spectral index d ln P / d ln k, by the five-point stencil
    /// with step `settings.step` in ln k.
    pub fn effective_index(
        &self,
        k: f64,
        z: impl Into<Redshift>,
        linear: bool,
    ) -> Result<f64, PowerSpectrumError> {
        let pk = self.query_kernel(("k", k), z, linear)?;
        let index = five_point_derivative(
            |lnk| Ok::<_, PowerSpectrumError>(pk(lnk.exp()).ln()),
            k.ln(),
            self.settings.step,
        )?;
        if !index.is_finite() {
            return Err(NumericError::NonFinite("effective index").into());
        }
        Ok(index)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// `k ↦ amplitude · kⁿˢ T²(k, z) D₊²(z)`, with the growth factor
    /// evaluated once.
    fn power_kernel(&self, amplitude: f64, z: f64) -> impl Fn(f64) -> f64 + '_ {
        let growth = self.cosmology.dplus(z, self.exact_growth);
        let scale = amplitude * growth * growth;
        let ns = self.cosmology.ns();
        move |k| {
            let t = self.transfer.transfer(k, z);
            scale * k.powf(ns) * t * t
        }
    }

    /// Validates the query arguments and returns the normalized kernel.
    ///
    /// `argument` is the named wavenumber, radius or variance of the query.
    fn query_kernel(
        &self,
        argument: (&'static str, f64),
        z: impl Into<Redshift>,
        linear: bool,
    ) -> Result<impl Fn(f64) -> f64 + '_, PowerSpectrumError> {
        let z = z.into().scalar()?;
        positive_argument(argument.0, argument.1)?;
        if !linear {
            return Err(PowerSpectrumError::NotImplemented("nonlinear power spectrum"));
        }
        Ok(self.power_kernel(self.norm, z))
    }

    fn log_slope<P: Fn(f64) -> f64>(&self, pk: &P, r: f64) -> Result<f64, PowerSpectrumError> {
        let k_min = self.settings.k_min;
        let sigma2 = self.filter.convolution(pk, r, 0, &self.integrator, k_min)?;
        let dsigma2 = self.filter.dcdr(pk, r, 0, &self.integrator, k_min)?;
        let slope = 0.5 * r * dsigma2 / sigma2;
        if !slope.is_finite() {
            return Err(NumericError::NonFinite("log slope").into());
        }
        Ok(slope)
    }
}

fn positive_argument(name: &'static str, value: f64) -> Result<f64, PowerSpectrumError> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(PowerSpectrumError::InvalidArgument { name, value })
    }
}

// ============================================================================
// Tests
// ============================================================================


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn spectrum() -> PowerSpectrum<LambdaCdm, TransferModel> {
        let params = CosmologyParams::flat(0.7, 0.3, 0.05, 0.8, 0.96);
        PowerSpectrum::from_params(
            params,
            TransferKind::EisensteinHuZeroBaryon,
            SpectrumConfig::default(),
        )
        .unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn radius_inverts_variance(log_r in -3.0_f64..3.0, z in 0.0_f64..3.0) {
            let spectrum = spectrum();
            let r0 = 10f64.powf(log_r);
            let sigma2 = spectrum.variance(r0, z, true).unwrap();
            let r = spectrum.radius(sigma2, z, true).unwrap();
            prop_assert!(((r - r0) / r0).abs() < 1e-5, "r0 = {r0}, recovered {r}");
        }

        #[test]
        fn dimensionless_matches_definition(log_k in -4.0_f64..2.0, z in -1.0_f64..5.0) {
            let spectrum = spectrum();
            let k = 10f64.powf(log_k);
            let p = spectrum.linear_power_spectrum(k, z, false).unwrap();
            let delta2 = spectrum.linear_power_spectrum(k, z, true).unwrap();
            let expected = k * k * k * p / (2.0 * PI * PI);
            prop_assert!((delta2 - expected).abs() <= 1e-14 * expected.abs());
        }
    }
}
