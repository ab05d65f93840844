//! Numerical settings and spectrum configuration.
//!
//! Every tolerance, cutoff and step used by the integrals, the root finder
//! and the finite differences lives in [`NumericSettings`]. A spectrum is
//! built from a [`SpectrumConfig`], which can be loaded from JSON with
//! missing fields taking their defaults:
//!
//! ```
//! use u_cosmo::config::SpectrumConfig;
//! use u_cosmo::filter::Filter;
//!
//! let config = SpectrumConfig::from_json_str(r#"{ "filter": "gauss", "numeric": { "reltol": 1e-8 } }"#).unwrap();
//! assert_eq!(config.filter, Filter::Gauss);
//! assert_eq!(config.numeric.reltol, 1e-8);
//! assert_eq!(config.numeric.step, 1e-2);
//! ```

use crate::filter::Filter;
use serde::{Deserialize, Serialize};
use std::io::Read;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Numeric Settings
// ============================================================================

/// Controls for quadrature, root finding and finite differences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericSettings {
    /// Finite-difference step in ln r or ln k.
    pub step: f64,
    /// Relative tolerance for root finding and oscillatory sums.
    pub reltol: f64,
    /// Lower wavenumber cutoff of every k-integral, in h/Mpc.
    pub k_min: f64,
    /// Gauss–Legendre points per panel.
    pub quad_order: usize,
    /// Maximum panel width in ln k.
    pub panel_width: f64,
    /// Root-finder iteration cap.
    pub max_iterations: usize,
    /// Half-period cap for the j0 transform.
    pub max_half_periods: usize,
    /// Radius bracket (Mpc/h) searched by the radius inversion.
    pub radius_bracket: (f64, f64),
}

impl Default for NumericSettings {
    fn default() -> Self {
        Self {
            step: 1e-2,
            reltol: 1e-6,
            k_min: 1e-8,
            quad_order: 16,
            panel_width: 0.1,
            max_iterations: 200,
            max_half_periods: 20_000,
            radius_bracket: (1e-4, 1e4),
        }
    }
}

impl NumericSettings {
    /// Checks every field for a usable value.
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!(
                    "{name} must be positive and finite, got {value}"
                )))
            }
        }

        positive("step", self.step)?;
        positive("reltol", self.reltol)?;
        if self.reltol >= 1.0 {
            return Err(ConfigError::Invalid(format!(
                "reltol must be below 1, got {}",
                self.reltol
            )));
        }
        positive("k_min", self.k_min)?;
        positive("panel_width", self.panel_width)?;
        if self.quad_order < 2 {
            return Err(ConfigError::Invalid(format!(
                "quad_order must be at least 2, got {}",
                self.quad_order
            )));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid("max_iterations must be nonzero".into()));
        }
        if self.max_half_periods == 0 {
            return Err(ConfigError::Invalid(
                "max_half_periods must be nonzero".into(),
            ));
        }

        let (lo, hi) = self.radius_bracket;
        positive("radius_bracket lower bound", lo)?;
        positive("radius_bracket upper bound", hi)?;
        if lo >= hi {
            return Err(ConfigError::Invalid(format!(
                "radius_bracket must be increasing, got ({lo}, {hi})"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Spectrum Configuration
// ============================================================================

/// Construction-time options of a power spectrum.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    /// Smoothing window used by variances and their derivatives.
    pub filter: Filter,
    /// Integrate the growth equation instead of using the fitting formula.
    pub exact_growth: bool,
    pub numeric: NumericSettings,
}

impl SpectrumConfig {
    /// Default settings with the given filter.
    pub fn with_filter(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.numeric.validate()
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    /// - [`ConfigError::Parse`] on malformed JSON or an unknown filter name.
    /// - [`ConfigError::Invalid`] if a setting is out of range.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON document.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = NumericSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.step, 1e-2);
        assert_eq!(settings.reltol, 1e-6);
        assert_eq!(settings.radius_bracket, (1e-4, 1e4));
    }

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = SpectrumConfig::from_json_str("{}").unwrap();
        assert_eq!(config, SpectrumConfig::default());
        assert_eq!(config.filter, Filter::TopHat);
        assert!(!config.exact_growth);
    }

    #[test]
    fn test_partial_numeric_section() {
        let json = r#"{ "exact_growth": true, "numeric": { "step": 0.005, "radius_bracket": [0.01, 100.0] } }"#;
        let config = SpectrumConfig::from_json_str(json).unwrap();
        assert!(config.exact_growth);
        assert_eq!(config.numeric.step, 0.005);
        assert_eq!(config.numeric.radius_bracket, (0.01, 100.0));
        assert_eq!(config.numeric.quad_order, 16);
    }

    #[test]
    fn test_filter_alias_in_json() {
        let config = SpectrumConfig::from_json_str(r#"{ "filter": "sharp-k" }"#).unwrap();
        assert_eq!(config.filter, Filter::SharpK);
    }

    #[test]
    fn test_unknown_filter_is_parse_error() {
        let result = SpectrumConfig::from_json_str(r#"{ "filter": "boxcar" }"#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            r#"{ "numeric": { "step": 0.0 } }"#,
            r#"{ "numeric": { "reltol": 1.5 } }"#,
            r#"{ "numeric": { "k_min": -1.0 } }"#,
            r#"{ "numeric": { "quad_order": 1 } }"#,
            r#"{ "numeric": { "max_iterations": 0 } }"#,
            r#"{ "numeric": { "radius_bracket": [10.0, 1.0] } }"#,
        ];
        for json in cases {
            let result = SpectrumConfig::from_json_str(json);
            assert!(
                matches!(result, Err(ConfigError::Invalid(_))),
                "{json} should be rejected"
            );
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = SpectrumConfig::with_filter(Filter::Gauss);
        config.numeric.reltol = 1e-9;
        let json = config.to_json_string().unwrap();
        let back = SpectrumConfig::from_json_reader(json.as_bytes()).unwrap();
        assert_eq!(back, config);
    }
}
