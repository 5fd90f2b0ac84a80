//! # Parameter Converters
//!
//! Pure conversions between pairs of life table parameters for a single age
//! interval of length `n`. Every scalar function has an elementwise `_vec`
//! counterpart over equal-length slices; a single bad element fails the whole call.
//!
//! An infinite `n` marks the terminal (open-ended) interval, where everybody
//! eventually dies: qx is then 1 regardless of mx or ax.

use crate::error::{LTResult, LifeTableError};

/// Slack allowed when checking derived values against their bounds.
const BOUND_EPS: f64 = 1e-10;

/// Below this `n·mx` the constant-hazard ax uses its Taylor series.
const SERIES_HAZARD: f64 = 1e-4;

// ================================================
// PUBLIC FUNCTIONS
// ================================================

/// Convert mortality rate to probability of death assuming constant hazard.
///
/// # Formula
/// ```text
/// ₙqₓ = 1 - exp(-n·ₙmₓ)
/// ```
/// For the terminal interval (`n = ∞`) qx is 1.
///
/// # Example
/// ```rust
/// # use rslifetable::prelude::*;
/// let qx = mx_to_qx(0.01, 5.0)?;
/// assert!((qx - 0.048771).abs() < 1e-6);
/// # LTResult::Ok(())
/// ```
pub fn mx_to_qx(mx: f64, age_length: f64) -> LTResult<f64> {
    check_rate("mx", mx)?;
    check_age_length(age_length)?;
    if age_length.is_infinite() {
        return Ok(1.0);
    }
    Ok(-(-age_length * mx).exp_m1())
}

/// Convert mortality rate and average years lived to probability of death.
///
/// # Formula
/// ```text
/// ₙqₓ = n·ₙmₓ / (1 + (n - ₙaₓ)·ₙmₓ)
/// ```
/// For the terminal interval qx is forced to 1 and ax is not checked.
///
/// # Example
/// ```rust
/// # use rslifetable::prelude::*;
/// let qx = mx_ax_to_qx(0.2, 0.5, 1.0)?;
/// assert!((qx - 0.2 / 1.1).abs() < 1e-12);
/// # LTResult::Ok(())
/// ```
pub fn mx_ax_to_qx(mx: f64, ax: f64, age_length: f64) -> LTResult<f64> {
    check_rate("mx", mx)?;
    check_age_length(age_length)?;
    if age_length.is_infinite() {
        return Ok(1.0);
    }
    check_ax(ax, age_length)?;

    let qx = (age_length * mx) / (1.0 + (age_length - ax) * mx);
    if !(0.0..=1.0 + BOUND_EPS).contains(&qx) {
        return Err(LifeTableError::domain(format!(
            "mx = {mx} and ax = {ax} give qx = {qx} outside [0, 1] for interval length {age_length}"
        )));
    }
    Ok(qx.min(1.0))
}

/// Convert probability of death to mortality rate assuming constant hazard.
///
/// # Formula
/// ```text
/// ₙmₓ = -ln(1 - ₙqₓ) / n
/// ```
/// qx = 1 gives an infinite rate. The terminal interval is rejected: its rate
/// cannot be recovered from qx alone.
pub fn qx_to_mx(qx: f64, age_length: f64) -> LTResult<f64> {
    check_probability("qx", qx)?;
    check_finite_age_length(age_length)?;
    Ok(-(-qx).ln_1p() / age_length)
}

/// Solve the mx/ax/qx relationship for ax.
///
/// # Formula
/// ```text
/// ₙaₓ = (ₙqₓ + n·ₙmₓ·(ₙqₓ - 1)) / (ₙmₓ·ₙqₓ)
/// ```
pub fn mx_qx_to_ax(mx: f64, qx: f64, age_length: f64) -> LTResult<f64> {
    check_rate("mx", mx)?;
    check_probability("qx", qx)?;
    check_finite_age_length(age_length)?;
    if mx == 0.0 || qx == 0.0 {
        return Err(LifeTableError::domain(format!(
            "ax is undefined when mx = {mx} or qx = {qx} is zero"
        )));
    }

    let ax = (qx + age_length * mx * (qx - 1.0)) / (mx * qx);
    clamp_ax(ax, age_length)
}

/// Solve the mx/ax/qx relationship for mx.
///
/// # Formula
/// ```text
/// ₙmₓ = ₙqₓ / (n - (n - ₙaₓ)·ₙqₓ)
/// ```
pub fn qx_ax_to_mx(qx: f64, ax: f64, age_length: f64) -> LTResult<f64> {
    check_probability("qx", qx)?;
    check_finite_age_length(age_length)?;
    check_ax(ax, age_length)?;

    let denominator = age_length - (age_length - ax) * qx;
    if denominator <= 0.0 {
        return Err(LifeTableError::domain(format!(
            "qx = {qx} and ax = {ax} give an unbounded mx for interval length {age_length}"
        )));
    }
    Ok(qx / denominator)
}

/// Average years lived by those dying in the interval under constant hazard.
///
/// # Formula
/// ```text
/// ₙaₓ = n + 1/ₙmₓ - n / (1 - exp(-n·ₙmₓ))
/// ```
/// For the terminal interval this reduces to `1/mx`. When `n·mx` is tiny the
/// series `n/2 - n²·mx/12` is used instead. Zero mortality is undefined; its
/// limit `n/2` is left to the caller.
///
/// # Example
/// ```rust
/// # use rslifetable::prelude::*;
/// let ax = mx_to_ax(0.05, 5.0)?;
/// assert!(ax > 2.4 && ax < 2.5);
/// # LTResult::Ok(())
/// ```
pub fn mx_to_ax(mx: f64, age_length: f64) -> LTResult<f64> {
    check_rate("mx", mx)?;
    check_age_length(age_length)?;
    if mx == 0.0 {
        return Err(LifeTableError::domain(
            "ax is undefined for mx = 0 under constant hazard",
        ));
    }
    if age_length.is_infinite() {
        return Ok(1.0 / mx);
    }
    let hazard = age_length * mx;
    if hazard < SERIES_HAZARD {
        // n·(1/2 - x/12 + x³/720), the closed form cancels to noise here
        return Ok(age_length * (0.5 - hazard / 12.0 + hazard.powi(3) / 720.0));
    }
    Ok(age_length + 1.0 / mx - age_length / -(-hazard).exp_m1())
}

// ---------- elementwise ----------

/// Elementwise [`mx_to_qx`].
pub fn mx_to_qx_vec(mx: &[f64], age_length: &[f64]) -> LTResult<Vec<f64>> {
    zip2("mx_to_qx", mx, age_length, mx_to_qx)
}

/// Elementwise [`mx_ax_to_qx`].
pub fn mx_ax_to_qx_vec(mx: &[f64], ax: &[f64], age_length: &[f64]) -> LTResult<Vec<f64>> {
    zip3("mx_ax_to_qx", mx, ax, age_length, mx_ax_to_qx)
}

/// Elementwise [`qx_to_mx`].
pub fn qx_to_mx_vec(qx: &[f64], age_length: &[f64]) -> LTResult<Vec<f64>> {
    zip2("qx_to_mx", qx, age_length, qx_to_mx)
}

/// Elementwise [`mx_qx_to_ax`].
pub fn mx_qx_to_ax_vec(mx: &[f64], qx: &[f64], age_length: &[f64]) -> LTResult<Vec<f64>> {
    zip3("mx_qx_to_ax", mx, qx, age_length, mx_qx_to_ax)
}

/// Elementwise [`qx_ax_to_mx`].
pub fn qx_ax_to_mx_vec(qx: &[f64], ax: &[f64], age_length: &[f64]) -> LTResult<Vec<f64>> {
    zip3("qx_ax_to_mx", qx, ax, age_length, qx_ax_to_mx)
}

/// Elementwise [`mx_to_ax`]; fails on the first element that does.
pub fn mx_to_ax_vec(mx: &[f64], age_length: &[f64]) -> LTResult<Vec<f64>> {
    zip2("mx_to_ax", mx, age_length, mx_to_ax)
}

// ================================================
// PRIVATE FUNCTIONS
// ================================================

fn check_rate(name: &str, value: f64) -> LTResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(LifeTableError::domain(format!(
            "{name} must be finite and non-negative, got {value}"
        )));
    }
    Ok(())
}

fn check_probability(name: &str, value: f64) -> LTResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(LifeTableError::domain(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

fn check_age_length(age_length: f64) -> LTResult<()> {
    if age_length.is_nan() || age_length <= 0.0 {
        return Err(LifeTableError::domain(format!(
            "age interval length must be positive, got {age_length}"
        )));
    }
    Ok(())
}

fn check_finite_age_length(age_length: f64) -> LTResult<()> {
    check_age_length(age_length)?;
    if age_length.is_infinite() {
        return Err(LifeTableError::domain(
            "relationship is undefined for the open-ended terminal interval",
        ));
    }
    Ok(())
}

fn check_ax(ax: f64, age_length: f64) -> LTResult<()> {
    if !(0.0..=age_length).contains(&ax) {
        return Err(LifeTableError::domain(format!(
            "ax must be within [0, {age_length}], got {ax}"
        )));
    }
    Ok(())
}

// Derived ax may land a rounding error outside its bounds
fn clamp_ax(ax: f64, age_length: f64) -> LTResult<f64> {
    if ax < -BOUND_EPS || ax > age_length + BOUND_EPS || ax.is_nan() {
        return Err(LifeTableError::domain(format!(
            "derived ax = {ax} outside [0, {age_length}]"
        )));
    }
    Ok(ax.clamp(0.0, age_length))
}

fn zip2(
    name: &str,
    a: &[f64],
    b: &[f64],
    f: impl Fn(f64, f64) -> LTResult<f64>,
) -> LTResult<Vec<f64>> {
    if a.len() != b.len() {
        return Err(LifeTableError::config(format!(
            "{name}: inputs have different lengths ({} and {})",
            a.len(),
            b.len()
        )));
    }
    a.iter()
        .zip(b)
        .enumerate()
        .map(|(i, (&x, &y))| f(x, y).map_err(|e| e.with_context(format!("element {i}"))))
        .collect()
}

fn zip3(
    name: &str,
    a: &[f64],
    b: &[f64],
    c: &[f64],
    f: impl Fn(f64, f64, f64) -> LTResult<f64>,
) -> LTResult<Vec<f64>> {
    if a.len() != b.len() || a.len() != c.len() {
        return Err(LifeTableError::config(format!(
            "{name}: inputs have different lengths ({}, {} and {})",
            a.len(),
            b.len(),
            c.len()
        )));
    }
    a.iter()
        .zip(b)
        .zip(c)
        .enumerate()
        .map(|(i, ((&x, &y), &z))| {
            f(x, y, z).map_err(|e| e.with_context(format!("element {i}")))
        })
        .collect()
}
