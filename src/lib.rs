//! # u-cosmo
//!
//! Linear matter power spectra for structure-formation analysis.
//!
//! A [`power::PowerSpectrum`] combines a background cosmology, a transfer
//! function and a smoothing filter, normalizes itself to σ₈, and answers
//! queries for the power spectrum, mass variance, correlation function,
//! logarithmic slopes, effective spectral index and the radius enclosing a
//! given variance.
//!
//! ## Modules
//!
//! - [`special`]: window functions and the spherical Bessel function j₀
//! - [`numeric`]: Gauss–Legendre quadrature, oscillatory integrals,
//!   Ridders root finding, finite differences
//! - [`config`]: numerical settings and spectrum configuration (JSON)
//! - [`cosmology`]: growth-factor capability and the ΛCDM background
//! - [`filter`]: smoothing windows and their convolutions
//! - [`transfer`]: BBKS/Sugiyama, Eisenstein–Hu and tabulated transfer functions
//! - [`power`]: the normalized spectrum and its derived statistics
//!
//! ## Design Philosophy
//!
//! - **Numerical stability first**: series expansions near cancellation,
//!   compensated summation of quadrature panels
//! - **No hidden state**: every tolerance is threaded through
//!   [`config::NumericSettings`]
//! - **Property-based testing**: closed-form spectra and inversion
//!   invariants verified via proptest
//!
//! ## Example
//!
//! ```
//! use u_cosmo::config::SpectrumConfig;
//! use u_cosmo::cosmology::CosmologyParams;
//! use u_cosmo::power::PowerSpectrum;
//! use u_cosmo::transfer::TransferKind;
//!
//! let params = CosmologyParams::flat(0.7, 0.3, 0.05, 0.8, 0.96);
//! let spectrum =
//!     PowerSpectrum::from_params(params, TransferKind::Sugiyama96, SpectrumConfig::default())
//!         .unwrap();
//!
//! let r = spectrum.radius_from_sigma(1.0, 0.0, true).unwrap();
//! assert!(r < 8.0);
//! ```

pub mod config;
pub mod cosmology;
pub mod filter;
pub mod numeric;
pub mod power;
pub mod special;
pub mod transfer;
