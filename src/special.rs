//! Special functions used by the smoothing filters and the correlation
//! transform.
//!
//! Closed forms lose all significant digits for small arguments through
//! cancellation (`sin x − x cos x ~ x³/3`), so every function below
//! switches to its Taylor series near the origin.

/// Below this argument the top-hat window and its derivative use the
/// Taylor series. The truncation error of the series here is < 1e-17.
const TOPHAT_SERIES_CUTOFF: f64 = 0.05;

/// Below this argument `j0` uses its Taylor series.
const J0_SERIES_CUTOFF: f64 = 1e-3;

// ============================================================================
// Spherical Bessel Function
// ============================================================================

/// Spherical Bessel function of order zero, j₀(x) = sin(x)/x.
///
/// # Algorithm
/// Closed form for |x| ≥ 10⁻³, otherwise the series
/// `1 − x²/6 + x⁴/120`.
///
/// # Examples
/// ```
/// use u_cosmo::special::spherical_bessel_j0;
/// assert_eq!(spherical_bessel_j0(0.0), 1.0);
/// assert!(spherical_bessel_j0(std::f64::consts::PI).abs() < 1e-15);
/// ```
pub fn spherical_bessel_j0(x: f64) -> f64 {
    if x.abs() < J0_SERIES_CUTOFF {
        let x2 = x * x;
        return 1.0 - x2 / 6.0 * (1.0 - x2 / 20.0);
    }
    x.sin() / x
}

// ============================================================================
// Window Functions
// ============================================================================

/// Fourier transform of the spherical top-hat window,
/// `W(x) = 3 (sin x − x cos x) / x³`.
///
/// # Algorithm
/// Closed form for x ≥ 0.05. Below that, the series
///
/// ```text
/// W(x) = 1 − x²/10 + x⁴/280 − x⁶/15120
/// ```
///
/// # Examples
/// ```
/// use u_cosmo::special::tophat_window;
/// assert_eq!(tophat_window(0.0), 1.0);
/// // First zero of the window is at x ≈ 4.4934
/// assert!(tophat_window(4.493409457909064).abs() < 1e-12);
/// ```
pub fn tophat_window(x: f64) -> f64 {
    if x.abs() < TOPHAT_SERIES_CUTOFF {
        let x2 = x * x;
        return 1.0 + x2 * (-1.0 / 10.0 + x2 * (1.0 / 280.0 - x2 / 15120.0));
    }
    3.0 * (x.sin() - x * x.cos()) / (x * x * x)
}

/// Derivative of the top-hat window with respect to its argument.
///
/// ```text
/// W'(x) = 3 [(x² − 3) sin x + 3x cos x] / x⁴
/// ```
///
/// Series below x = 0.05: `−x/5 + x³/70 − x⁵/2520`.
pub fn tophat_window_derivative(x: f64) -> f64 {
    if x.abs() < TOPHAT_SERIES_CUTOFF {
        let x2 = x * x;
        return x * (-1.0 / 5.0 + x2 * (1.0 / 70.0 - x2 / 2520.0));
    }
    let x2 = x * x;
    3.0 * ((x2 - 3.0) * x.sin() + 3.0 * x * x.cos()) / (x2 * x2)
}

/// Fourier transform of the Gaussian window, `W(x) = exp(−x²/2)`.
///
/// # Examples
/// ```
/// use u_cosmo::special::gaussian_window;
/// assert_eq!(gaussian_window(0.0), 1.0);
/// assert!((gaussian_window(2.0) - (-2.0_f64).exp()).abs() < 1e-15);
/// ```
pub fn gaussian_window(x: f64) -> f64 {
    (-0.5 * x * x).exp()
}

/// Derivative of the Gaussian window, `W'(x) = −x exp(−x²/2)`.
pub fn gaussian_window_derivative(x: f64) -> f64 {
    -x * gaussian_window(x)
}

/// Sharp-k window: 1 for x ≤ 1, 0 beyond.
///
/// Its derivative is a Dirac delta at x = 1, so callers handle the
/// radius derivative of a sharp-k convolution analytically.
pub fn sharp_k_window(x: f64) -> f64 {
    if x <= 1.0 {
        1.0
    } else {
        0.0
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tophat_closed_form(x: f64) -> f64 {
        3.0 * (x.sin() - x * x.cos()) / (x * x * x)
    }

    #[test]
    fn test_j0_known_values() {
        assert_eq!(spherical_bessel_j0(0.0), 1.0);
        assert!((spherical_bessel_j0(1.0) - 1.0_f64.sin()).abs() < 1e-15);
        // j0 is even
        assert!((spherical_bessel_j0(-2.5) - spherical_bessel_j0(2.5)).abs() < 1e-15);
    }

    #[test]
    fn test_j0_series_matches_closed_form_at_cutoff() {
        let x = J0_SERIES_CUTOFF * 0.999_999;
        let closed = x.sin() / x;
        assert!((spherical_bessel_j0(x) - closed).abs() < 1e-14);
    }

    #[test]
    fn test_tophat_window_at_origin() {
        assert_eq!(tophat_window(0.0), 1.0);
        assert_eq!(tophat_window_derivative(0.0), 0.0);
    }

    #[test]
    fn test_tophat_series_continuous_at_cutoff() {
        let x = TOPHAT_SERIES_CUTOFF * (1.0 - 1e-12);
        let below = tophat_window(x);
        let above = tophat_closed_form(x);
        assert!(
            (below - above).abs() < 1e-11,
            "series {below} vs closed form {above}"
        );
    }

    #[test]
    fn test_tophat_large_argument_decay() {
        // |W(x)| ≤ 3/x² + 3/x³ for large x
        for &x in &[10.0, 50.0, 200.0] {
            let bound = 3.0 / (x * x) + 3.0 / (x * x * x);
            assert!(tophat_window(x).abs() <= bound);
        }
    }

    #[test]
    fn test_tophat_derivative_matches_finite_difference() {
        let h = 1e-6;
        for &x in &[0.01, 0.3, 1.0, 4.0, 12.0] {
            let fd = (tophat_window(x + h) - tophat_window(x - h)) / (2.0 * h);
            let analytic = tophat_window_derivative(x);
            assert!(
                (fd - analytic).abs() < 1e-8,
                "W'({x}): fd={fd}, analytic={analytic}"
            );
        }
    }

    #[test]
    fn test_gaussian_window_derivative() {
        let h = 1e-6;
        for &x in &[0.1, 1.0, 3.0] {
            let fd = (gaussian_window(x + h) - gaussian_window(x - h)) / (2.0 * h);
            assert!((fd - gaussian_window_derivative(x)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sharp_k_window() {
        assert_eq!(sharp_k_window(0.5), 1.0);
        assert_eq!(sharp_k_window(1.0), 1.0);
        assert_eq!(sharp_k_window(1.0 + 1e-12), 0.0);
    }
}
