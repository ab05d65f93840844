//! Quadrature, root finding and finite differences.
//!
//! # Algorithms
//!
//! - **Summation**: Neumaier's compensated summation for panel sums.
//! - **Quadrature**: composite Gauss–Legendre with a fixed maximum panel
//!   width. Nodes are computed once by Newton iteration on Pₙ(x).
//!   Reference: Press et al. (2007), *Numerical Recipes*, 3rd ed., §4.6.
//! - **Oscillatory tails**: integration over consecutive half periods of
//!   the kernel, with the alternating partial sums accelerated by an
//!   Euler transform (Press et al. §5.3).
//! - **Root finding**: Ridders' method.
//!   Reference: Ridders (1979), "A new algorithm for computing a single
//!   root of a real continuous function", *IEEE Trans. Circuits Syst.* 26(11).
//! - **Derivatives**: centered five-point stencil, O(h⁴).

use crate::config::NumericSettings;
use log::trace;
use thiserror::Error;

/// Errors raised by the numerical routines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericError {
    /// The root-finding bracket has no sign change.
    #[error("interval [{a}, {b}] does not bracket a root: f(a) = {fa}, f(b) = {fb}")]
    NoSignChange { a: f64, b: f64, fa: f64, fb: f64 },

    /// The root finder exhausted its iteration budget.
    #[error("root does not converge after {0} iterations")]
    SolverNotConverged(usize),

    /// An oscillatory integral did not settle within the half-period budget.
    #[error("oscillatory integral does not converge after {0} half periods")]
    IntegralNotConverged(usize),

    /// A NaN or infinity appeared in an integral or derivative.
    #[error("non-finite value encountered in {0}")]
    NonFinite(&'static str),
}

// ---------------------------------------------------------------------------
// Compensated summation
// ---------------------------------------------------------------------------

/// Neumaier's improved Kahan–Babuška summation.
///
/// Handles the case where the addend is larger in magnitude than the
/// running sum, which plain Kahan summation does not.
///
/// Reference: Neumaier (1974), "Rundungsfehleranalyse einiger Verfahren
/// zur Summation endlicher Summen", *ZAMM* 54(1), pp. 39–51.
///
/// # Examples
/// ```
/// use u_cosmo::numeric::kahan_sum;
/// assert_eq!(kahan_sum(&[1.0, 1e100, 1.0, -1e100]), 2.0);
/// ```
pub fn kahan_sum(data: &[f64]) -> f64 {
    let mut sum = 0.0_f64;
    let mut c = 0.0_f64;
    for &x in data {
        let t = sum + x;
        if sum.abs() >= x.abs() {
            c += (sum - t) + x;
        } else {
            c += (x - t) + sum;
        }
        sum = t;
    }
    sum + c
}

// ---------------------------------------------------------------------------
// Gauss–Legendre rule
// ---------------------------------------------------------------------------

/// n-point Gauss–Legendre rule on [−1, 1].
///
/// Exact for polynomials of degree ≤ 2n − 1.
///
/// # Examples
/// ```
/// use u_cosmo::numeric::GaussLegendre;
/// let rule = GaussLegendre::new(4);
/// // ∫₀² x⁷ dx = 2⁸/8 = 32
/// let value = rule.integrate(|x| x.powi(7), 0.0, 2.0);
/// assert!((value - 32.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct GaussLegendre {
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

impl GaussLegendre {
    /// Builds the rule with `order` points (at least one).
    pub fn new(order: usize) -> Self {
        const MAX_NEWTON: usize = 100;
        const EPS: f64 = 1e-15;

        let n = order.max(1);
        let nf = n as f64;
        let mut nodes = vec![0.0; n];
        let mut weights = vec![0.0; n];

        // Roots are symmetric; only the upper half is searched.
        for i in 0..n.div_ceil(2) {
            let mut z = (std::f64::consts::PI * (i as f64 + 0.75) / (nf + 0.5)).cos();
            let mut dp = 1.0;
            for _ in 0..MAX_NEWTON {
                // Recurrence for P_n(z) and P_{n-1}(z)
                let mut p1 = 1.0;
                let mut p2 = 0.0;
                for j in 1..=n {
                    let jf = j as f64;
                    let p3 = p2;
                    p2 = p1;
                    p1 = ((2.0 * jf - 1.0) * z * p2 - (jf - 1.0) * p3) / jf;
                }
                dp = nf * (z * p1 - p2) / (z * z - 1.0);
                let z_prev = z;
                z = z_prev - p1 / dp;
                if (z - z_prev).abs() <= EPS {
                    break;
                }
            }
            let w = 2.0 / ((1.0 - z * z) * dp * dp);
            nodes[i] = -z;
            nodes[n - 1 - i] = z;
            weights[i] = w;
            weights[n - 1 - i] = w;
        }

        Self { nodes, weights }
    }

    pub fn order(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Applies the rule on `[a, b]`.
    pub fn integrate<F: FnMut(f64) -> f64>(&self, mut f: F, a: f64, b: f64) -> f64 {
        let half = 0.5 * (b - a);
        let mid = 0.5 * (a + b);
        let mut sum = 0.0;
        for (&x, &w) in self.nodes.iter().zip(&self.weights) {
            sum += w * f(mid + half * x);
        }
        sum * half
    }
}

// ---------------------------------------------------------------------------
// Composite integrator
// ---------------------------------------------------------------------------

/// Composite Gauss–Legendre integrator with a bounded panel width.
///
/// Integrals over `[0, ∞)` in wavenumber are handled by the callers
/// through the substitution `u = ln k` with finite cutoffs, and through
/// [`Integrator::integrate_half_periods`] for oscillatory tails.
#[derive(Debug, Clone)]
pub struct Integrator {
    rule: GaussLegendre,
    panel_width: f64,
}

impl Integrator {
    pub fn new(order: usize, panel_width: f64) -> Self {
        Self {
            rule: GaussLegendre::new(order),
            panel_width,
        }
    }

    pub fn from_settings(settings: &NumericSettings) -> Self {
        Self::new(settings.quad_order, settings.panel_width)
    }

    pub fn rule(&self) -> &GaussLegendre {
        &self.rule
    }

    pub fn panel_width(&self) -> f64 {
        self.panel_width
    }

    /// ∫ₐᵇ f(x) dx over equal panels no wider than the panel width.
    ///
    /// # Errors
    /// [`NumericError::NonFinite`] if the result is NaN or infinite.
    pub fn integrate<F: FnMut(f64) -> f64>(
        &self,
        f: F,
        a: f64,
        b: f64,
    ) -> Result<f64, NumericError> {
        self.integrate_panels(f, a, b, self.panel_width)
    }

    /// ∫ₐᵇ f(x) dx over equal panels no wider than `max_width`.
    ///
    /// # Errors
    /// [`NumericError::NonFinite`] if a bound or the result is NaN or infinite.
    pub fn integrate_panels<F: FnMut(f64) -> f64>(
        &self,
        mut f: F,
        a: f64,
        b: f64,
        max_width: f64,
    ) -> Result<f64, NumericError> {
        if !a.is_finite() || !b.is_finite() {
            return Err(NumericError::NonFinite("integration bounds"));
        }
        if a == b {
            return Ok(0.0);
        }
        let panels = ((b - a).abs() / max_width).ceil().max(1.0) as usize;
        let width = (b - a) / panels as f64;

        let contributions: Vec<f64> = (0..panels)
            .map(|i| {
                let lo = a + i as f64 * width;
                let hi = if i + 1 == panels { b } else { lo + width };
                self.rule.integrate(&mut f, lo, hi)
            })
            .collect();

        let total = kahan_sum(&contributions);
        if !total.is_finite() {
            return Err(NumericError::NonFinite("integral"));
        }
        Ok(total)
    }

    /// ∫ f(x) dx from `start` to ∞ for a kernel with zeros spaced by
    /// `half_period`, summed one half period at a time.
    ///
    /// Contributions of an oscillating kernel alternate in sign and may
    /// decay slowly, so the partial sums are accelerated by an Euler
    /// transform (binomial average of the last few partial sums). The sum
    /// stops once two consecutive accelerated estimates agree to `reltol`
    /// relative to the larger of the estimate and the largest
    /// contribution seen (`scale` seeds the latter).
    ///
    /// # Errors
    /// - [`NumericError::IntegralNotConverged`] after `max_terms` half periods.
    /// - [`NumericError::NonFinite`] if a contribution is NaN or infinite.
    pub fn integrate_half_periods<F: FnMut(f64) -> f64>(
        &self,
        mut f: F,
        start: f64,
        half_period: f64,
        scale: f64,
        reltol: f64,
        max_terms: usize,
    ) -> Result<f64, NumericError> {
        if !start.is_finite() || !half_period.is_finite() {
            return Err(NumericError::NonFinite("integration bounds"));
        }
        let mut partial_sums = Vec::new();
        let mut running = 0.0;
        let mut peak = scale.abs();
        let mut previous = f64::NAN;
        let mut quiet = 0;

        for n in 0..max_terms {
            let lo = start + n as f64 * half_period;
            let term = self.rule.integrate(&mut f, lo, lo + half_period);
            if !term.is_finite() {
                return Err(NumericError::NonFinite("oscillatory integral"));
            }
            running += term;
            partial_sums.push(running);
            peak = peak.max(term.abs());

            if partial_sums.len() <= EULER_ORDER {
                continue;
            }
            let estimate = euler_average(&partial_sums[partial_sums.len() - EULER_ORDER - 1..]);
            if (estimate - previous).abs() <= reltol * estimate.abs().max(peak) {
                quiet += 1;
                if quiet == 2 {
                    trace!("oscillatory integral settled after {} half periods", n + 1);
                    return Ok(estimate);
                }
            } else {
                quiet = 0;
            }
            previous = estimate;
        }
        Err(NumericError::IntegralNotConverged(max_terms))
    }
}

/// Order of the Euler transform applied to oscillatory partial sums.
const EULER_ORDER: usize = 10;

/// Binomially weighted mean of consecutive partial sums,
/// `Σ C(m, i) Sᵢ / 2^m` with `m = sums.len() − 1`.
fn euler_average(sums: &[f64]) -> f64 {
    let m = sums.len().saturating_sub(1);
    let mut weight = 1.0;
    let mut total = 0.0;
    for (i, &s) in sums.iter().enumerate() {
        total += weight * s;
        weight = weight * (m - i) as f64 / (i + 1) as f64;
    }
    total / 2f64.powi(m as i32)
}

// ---------------------------------------------------------------------------
// Root finding
// ---------------------------------------------------------------------------

/// Finds a root of `f` in the bracket `[a, b]` with Ridders' method.
///
/// `tol` is an absolute tolerance on the abscissa. The closure may fail;
/// its error is propagated unchanged.
///
/// # Errors
/// - [`NumericError::NoSignChange`] if `f(a)` and `f(b)` share a sign.
/// - [`NumericError::SolverNotConverged`] after `max_iter` iterations.
///
/// # Examples
/// ```
/// use u_cosmo::numeric::{solve, NumericError};
/// let root = solve(|x| Ok::<_, NumericError>(x * x - 2.0), 0.0, 2.0, 1e-12, 100).unwrap();
/// assert!((root - 2.0_f64.sqrt()).abs() < 1e-10);
/// ```
pub fn solve<F, E>(mut f: F, a: f64, b: f64, tol: f64, max_iter: usize) -> Result<f64, E>
where
    F: FnMut(f64) -> Result<f64, E>,
    E: From<NumericError>,
{
    let (mut lo, mut hi) = (a, b);
    let mut f_lo = f(lo)?;
    let mut f_hi = f(hi)?;

    if f_lo == 0.0 {
        return Ok(lo);
    }
    if f_hi == 0.0 {
        return Ok(hi);
    }
    // Written negated so NaN also fails the bracket test.
    if !(f_lo * f_hi < 0.0) {
        return Err(NumericError::NoSignChange {
            a,
            b,
            fa: f_lo,
            fb: f_hi,
        }
        .into());
    }

    let mut ans = f64::NAN;
    for iter in 0..max_iter {
        let mid = 0.5 * (lo + hi);
        let f_mid = f(mid)?;
        let s = (f_mid * f_mid - f_lo * f_hi).sqrt();
        if s == 0.0 {
            return Ok(mid);
        }

        let sign = if f_lo >= f_hi { 1.0 } else { -1.0 };
        let next = mid + (mid - lo) * sign * f_mid / s;
        if (next - ans).abs() <= tol {
            trace!("ridders converged in {} iterations", iter + 1);
            return Ok(next);
        }
        ans = next;

        let f_next = f(next)?;
        if f_next == 0.0 {
            return Ok(next);
        }
        if f_mid * f_next < 0.0 {
            lo = mid;
            f_lo = f_mid;
            hi = next;
            f_hi = f_next;
        } else if f_lo * f_next < 0.0 {
            hi = next;
            f_hi = f_next;
        } else {
            lo = next;
            f_lo = f_next;
        }

        if (hi - lo).abs() <= tol {
            trace!("ridders bracket closed in {} iterations", iter + 1);
            return Ok(ans);
        }
    }
    Err(NumericError::SolverNotConverged(max_iter).into())
}

// ---------------------------------------------------------------------------
// Finite differences
// ---------------------------------------------------------------------------

/// Centered five-point derivative f'(x) with step `h`:
///
/// ```text
/// f'(x) ≈ [−f(x+2h) + 8f(x+h) − 8f(x−h) + f(x−2h)] / (12h)
/// ```
///
/// Truncation error is O(h⁴).
///
/// # Examples
/// ```
/// use u_cosmo::numeric::{five_point_derivative, NumericError};
/// let d = five_point_derivative(|x| Ok::<_, NumericError>(x.powi(3)), 2.0, 1e-2).unwrap();
/// assert!((d - 12.0).abs() < 1e-10);
/// ```
pub fn five_point_derivative<F, E>(mut f: F, x: f64, h: f64) -> Result<f64, E>
where
    F: FnMut(f64) -> Result<f64, E>,
{
    let f_p2 = f(x + 2.0 * h)?;
    let f_p1 = f(x + h)?;
    let f_m1 = f(x - h)?;
    let f_m2 = f(x - 2.0 * h)?;
    Ok((-f_p2 + 8.0 * f_p1 - 8.0 * f_m1 + f_m2) / (12.0 * h))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_kahan_sum_precision() {
        // 0.1 summed 10 million times; naive summation drifts
        let data = vec![0.1; 10_000_000];
        let result = kahan_sum(&data);
        assert!((result - 1_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_kahan_sum_large_addend() {
        assert_eq!(kahan_sum(&[1.0, 1e100, 1.0, -1e100]), 2.0);
    }

    #[test]
    fn test_gauss_legendre_weights_sum_to_two() {
        for order in [1, 2, 5, 16, 32] {
            let rule = GaussLegendre::new(order);
            let total: f64 = rule.weights().iter().sum();
            assert!((total - 2.0).abs() < 1e-13, "order {order}: {total}");
        }
    }

    #[test]
    fn test_gauss_legendre_nodes_symmetric() {
        let rule = GaussLegendre::new(7);
        let n = rule.order();
        for i in 0..n {
            assert!((rule.nodes()[i] + rule.nodes()[n - 1 - i]).abs() < 1e-15);
        }
        // Odd order has the origin as a node
        assert!(rule.nodes()[3].abs() < 1e-15);
    }

    #[test]
    fn test_gauss_legendre_polynomial_exactness() {
        let rule = GaussLegendre::new(8);
        // ∫₋₁¹ x¹⁴ dx = 2/15, degree 14 ≤ 2·8 − 1
        let value = rule.integrate(|x| x.powi(14), -1.0, 1.0);
        assert!((value - 2.0 / 15.0).abs() < 1e-14);
    }

    #[test]
    fn test_integrator_sine() {
        let integrator = Integrator::new(16, 0.1);
        let value = integrator.integrate(f64::sin, 0.0, PI).unwrap();
        assert!((value - 2.0).abs() < 1e-13);
    }

    #[test]
    fn test_integrator_reversed_bounds() {
        let integrator = Integrator::new(16, 0.5);
        let forward = integrator.integrate(f64::exp, 0.0, 1.0).unwrap();
        let backward = integrator.integrate(f64::exp, 1.0, 0.0).unwrap();
        assert!((forward - (1.0_f64.exp() - 1.0)).abs() < 1e-13);
        assert!((forward + backward).abs() < 1e-13);
    }

    #[test]
    fn test_integrator_empty_interval() {
        let integrator = Integrator::new(16, 0.1);
        assert_eq!(integrator.integrate(|_| 1.0, 3.0, 3.0).unwrap(), 0.0);
    }

    #[test]
    fn test_integrator_non_finite() {
        let integrator = Integrator::new(4, 0.1);
        let result = integrator.integrate(|_| f64::NAN, 0.0, 1.0);
        assert_eq!(result, Err(NumericError::NonFinite("integral")));
    }

    #[test]
    fn test_integrator_infinite_bounds() {
        let integrator = Integrator::new(16, 0.1);
        let bounds = Err(NumericError::NonFinite("integration bounds"));
        assert_eq!(integrator.integrate(|_| 1.0, f64::NEG_INFINITY, 0.0), bounds);
        assert_eq!(integrator.integrate_panels(|_| 1.0, 0.0, f64::INFINITY, 1.0), bounds);
        assert_eq!(integrator.integrate(|_| 1.0, f64::NAN, 1.0), bounds);
        assert_eq!(
            integrator.integrate_half_periods(|x| x.sin(), f64::NAN, PI, 0.0, 1e-8, 100),
            bounds
        );
    }

    #[test]
    fn test_half_periods_damped_sine() {
        // ∫₀^∞ e^{−ax} sin x dx = 1 / (1 + a²)
        let a = 0.1;
        let integrator = Integrator::new(16, 0.1);
        let value = integrator
            .integrate_half_periods(|x| (-a * x).exp() * x.sin(), 0.0, PI, 0.0, 1e-10, 10_000)
            .unwrap();
        let expected = 1.0 / (1.0 + a * a);
        assert!(
            (value - expected).abs() < 1e-9,
            "value {value}, expected {expected}"
        );
    }

    #[test]
    fn test_half_periods_sinc() {
        // ∫₀^∞ sin x / x dx = π/2; contributions decay only like 1/n
        let integrator = Integrator::new(16, 0.1);
        let sinc = |x: f64| if x == 0.0 { 1.0 } else { x.sin() / x };
        let value = integrator
            .integrate_half_periods(sinc, 0.0, PI, 0.0, 1e-10, 10_000)
            .unwrap();
        assert!((value - PI / 2.0).abs() < 1e-7, "value {value}");
    }

    #[test]
    fn test_half_periods_divergent() {
        let integrator = Integrator::new(8, 0.1);
        let result = integrator.integrate_half_periods(|x| x, 0.0, PI, 0.0, 1e-6, 50);
        assert_eq!(result, Err(NumericError::IntegralNotConverged(50)));
    }

    #[test]
    fn test_euler_average_weights() {
        // Weights of order 2 are 1/4, 1/2, 1/4
        assert_eq!(euler_average(&[4.0, 8.0, 16.0]), 9.0);
        assert_eq!(euler_average(&[3.0]), 3.0);
    }

    #[test]
    fn test_integrate_panels_narrow_width() {
        // cos(40x) needs narrow panels to resolve
        let integrator = Integrator::new(16, 10.0);
        let value = integrator
            .integrate_panels(|x| (40.0 * x).cos(), 0.0, 5.0, 0.1)
            .unwrap();
        let expected = (200.0_f64).sin() / 40.0;
        assert!((value - expected).abs() < 1e-12);
    }

    #[test]
    fn test_solve_cosine_root() {
        let root = solve(|x| Ok::<_, NumericError>((PI * x).cos()), 0.0, 1.0, 1e-12, 100).unwrap();
        assert!((root - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_solve_steep_exponential() {
        // Spans many orders of magnitude across the bracket
        let target = 1e-5;
        let root = solve(
            |x| Ok::<_, NumericError>((-x).exp() - target),
            -10.0,
            20.0,
            1e-10,
            200,
        )
        .unwrap();
        assert!((root - (1.0 / target).ln()).abs() < 1e-8);
    }

    #[test]
    fn test_solve_no_sign_change() {
        let result = solve(|x| Ok::<_, NumericError>(x * x + 1.0), -1.0, 1.0, 1e-8, 100);
        assert!(matches!(result, Err(NumericError::NoSignChange { .. })));
    }

    #[test]
    fn test_solve_propagates_closure_error() {
        let result: Result<f64, NumericError> =
            solve(|_| Err(NumericError::NonFinite("probe")), 0.0, 1.0, 1e-8, 100);
        assert_eq!(result, Err(NumericError::NonFinite("probe")));
    }

    #[test]
    fn test_five_point_derivative_exp() {
        let d = five_point_derivative(|x| Ok::<_, NumericError>(x.exp()), 1.0, 1e-2).unwrap();
        assert!((d - 1.0_f64.exp()).abs() < 1e-9);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn integrator_polynomial_exact(
            c0 in -10.0_f64..10.0,
            c1 in -10.0_f64..10.0,
            c2 in -10.0_f64..10.0,
            a in -5.0_f64..0.0,
            b in 0.0_f64..5.0,
        ) {
            let integrator = Integrator::new(4, 0.7);
            let value = integrator.integrate(|x| c0 + c1 * x + c2 * x * x, a, b).unwrap();
            let antiderivative = |x: f64| c0 * x + c1 * x * x / 2.0 + c2 * x * x * x / 3.0;
            let expected = antiderivative(b) - antiderivative(a);
            prop_assert!(
                (value - expected).abs() < 1e-10 * expected.abs().max(1.0),
                "value {value}, expected {expected}"
            );
        }

        #[test]
        fn solve_finds_linear_root(root in -50.0_f64..50.0, slope in 0.1_f64..10.0) {
            let found = solve(
                |x| Ok::<_, NumericError>(slope * (x - root)),
                -100.0,
                100.0,
                1e-10,
                200,
            ).unwrap();
            prop_assert!((found - root).abs() < 1e-8, "found {found}, root {root}");
        }
    }
}
