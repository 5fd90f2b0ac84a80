//! # Life Table Builder
//!
//! Derive a complete life table from mortality rates. Each group is processed
//! independently (in parallel by default); within a group the derivation runs in
//! strict age order:
//!
//! ```text
//! mx ─► ax ─► qx ─► px ─► lx ─► dx ─► nLx ─► Tx ─► ex ─► terminal ax = ex
//! ```
//!
//! The `gen_*` step functions are the same derivations exposed one at a time.
//! They fill columns in place on rows the caller owns; [`lifetable`] runs them on
//! its own copy and never touches the input table.
//!
//! ## Quick Start
//! ```rust
//! # use rslifetable::prelude::*;
//! let input = ltdf! {
//!     id_cols: ["sex"];
//!     "sex" => ["female"; 4],
//!     "age_start" => [0.0, 1.0, 5.0, 10.0],
//!     "age_end" => [1.0, 5.0, 10.0, f64::INFINITY],
//!     "mx" => [0.01, 0.001, 0.0005, 0.02],
//! }?;
//! let table = lifetable().table(&input).sex_col("sex").call()?;
//! let rows = &table.groups()[0].rows;
//! assert_eq!(rows[3].qx, Some(1.0));
//! assert_eq!(rows[3].ax, rows[3].ex);
//! # LTResult::Ok(())
//! ```

#![allow(non_snake_case)]

use crate::ax::{apply_u5_ax, closed_form_ax, iterate_group_ax};
use crate::convert::mx_ax_to_qx;
use crate::error::{LTResult, LifeTableError};
use crate::params::{IterateAxParams, LifeTableParams, ValidationParams};
use crate::table::interval::interval_issues;
use crate::table::{LifeTable, LifeTableGroup, LifeTableRow, Param};
use crate::validate::validate_lifetable;
use bon::builder;
use log::{debug, warn};
use rayon::prelude::*;

// ================================================
// PUBLIC FUNCTIONS
// ================================================

/// Build a complete life table from mx (and optionally ax).
///
/// # Steps
/// 1. mx is required on every row.
/// 2. Unless every closed row carries ax, ax is estimated: closed form from mx,
///    Coale-Demeny for ages 0-1 and 1-5 when `sex_col` is given, then the
///    iterative refinement (ages under 5 held when Coale-Demeny ran).
/// 3. ```text
///    ₙqₓ = n·ₙmₓ / (1 + (n - ₙaₓ)·ₙmₓ)        terminal qx = 1
///    ₙpₓ = 1 - ₙqₓ
///    lₓ₊ₙ = lₓ · ₙpₓ                          l₀ = radix
///    ₙdₓ = lₓ - lₓ₊ₙ                          terminal dx = lx
///    ₙLₓ = n·lₓ₊ₙ + ₙaₓ·ₙdₓ                    terminal nLx = lx / mx
///    Tₓ = Σ nLx from x upwards
///    eₓ = Tₓ / lₓ                             terminal ax = ex
///    ```
///
/// # Errors
/// - `ConfigError`: missing mx, ages not contiguous/ascending or not ending
///   open-ended, `sex_col` not an identifying column
/// - `DomainError`: a conversion fails, or terminal mx is 0 (tagged with the group
///   and age)
/// - `UnsupportedCategoryError`: sex other than male/female with `sex_col`
/// - `ValidationError`: the result breaks a life table invariant (`validate`)
#[builder]
pub fn lifetable(
    table: &LifeTable,
    #[builder(default = 1.0)] radix: f64,
    sex_col: Option<&str>,
    #[builder(default)] iteration: IterateAxParams,
    #[builder(default = true)] parallel: bool,
    #[builder(default = true)] validate: bool,
) -> LTResult<LifeTable> {
    let params = LifeTableParams {
        id_cols: table.id_cols().to_vec(),
        radix,
        sex_col: sex_col.map(str::to_string),
        iteration,
    };
    params.validate_all()?;

    let sex_index = params.sex_col.as_ref().and_then(|c| table.id_index(c));
    let build = |group: &LifeTableGroup| {
        let label = table.group_label(group);
        debug!("building life table for {label}");
        build_group(group, sex_index, &params, &label).map_err(|e| e.with_context(&label))
    };

    let groups: Vec<LifeTableGroup> = if parallel {
        table
            .groups()
            .par_iter()
            .map(build)
            .collect::<LTResult<_>>()?
    } else {
        table.groups().iter().map(build).collect::<LTResult<_>>()?
    };

    let result = table.with_groups(groups)?;
    if validate {
        let params = ValidationParams::builder()
            .required(Param::ALL.to_vec())
            .build();
        validate_lifetable().table(&result).params(params).call()?;
    }
    Ok(result)
}

/// qx from mx and ax; the terminal row gets 1.
pub fn gen_qx_from_mx_ax(rows: &mut [LifeTableRow]) -> LTResult<()> {
    for row in rows.iter_mut() {
        let qx = if row.is_terminal() {
            1.0
        } else {
            let mx = row.require(Param::Mx)?;
            let ax = row.require(Param::Ax)?;
            mx_ax_to_qx(mx, ax, row.age_length()).map_err(|e| e.with_context(row.interval))?
        };
        row.qx = Some(qx);
    }
    Ok(())
}

/// px = 1 - qx.
pub fn gen_px_from_qx(rows: &mut [LifeTableRow]) -> LTResult<()> {
    for row in rows.iter_mut() {
        row.px = Some(1.0 - row.require(Param::Qx)?);
    }
    Ok(())
}

/// lx by chaining survival from `radix` at the first age.
///
/// # Formula
/// ```text
/// lₓ₊ₙ = lₓ · (1 - ₙqₓ)
/// ```
pub fn gen_lx_from_qx(rows: &mut [LifeTableRow], radix: f64) -> LTResult<()> {
    let mut lx = radix;
    for row in rows.iter_mut() {
        let qx = row.require(Param::Qx)?;
        row.lx = Some(lx);
        lx *= 1.0 - qx;
    }
    Ok(())
}

/// qx from consecutive lx, the reverse of [`gen_lx_from_qx`]. The last row gets 1.
///
/// # Formula
/// ```text
/// ₙqₓ = 1 - lₓ₊ₙ / lₓ
/// ```
pub fn gen_qx_from_lx(rows: &mut [LifeTableRow]) -> LTResult<()> {
    let lx = rows
        .iter()
        .map(|r| r.require(Param::Lx))
        .collect::<LTResult<Vec<_>>>()?;
    for (i, row) in rows.iter_mut().enumerate() {
        row.qx = Some(match lx.get(i + 1) {
            Some(_) if lx[i] == 0.0 => 1.0,
            Some(next) => 1.0 - next / lx[i],
            None => 1.0,
        });
    }
    Ok(())
}

/// dx = lx - lx₊ₙ, with every survivor dying in the last row.
pub fn gen_dx_from_lx(rows: &mut [LifeTableRow]) -> LTResult<()> {
    let lx = rows
        .iter()
        .map(|r| r.require(Param::Lx))
        .collect::<LTResult<Vec<_>>>()?;
    for (i, row) in rows.iter_mut().enumerate() {
        row.dx = Some(match lx.get(i + 1) {
            Some(next) => lx[i] - next,
            None => lx[i],
        });
    }
    Ok(())
}

/// Person-years lived in each interval.
///
/// # Formula
/// ```text
/// ₙLₓ = n·(lₓ - ₙdₓ) + ₙaₓ·ₙdₓ      closed intervals
/// ₙLₓ = lₓ / ₙmₓ                     terminal interval
/// ```
///
/// # Errors
/// - `DomainError` when the terminal mx is 0 (infinite life expectancy)
pub fn gen_nLx(rows: &mut [LifeTableRow]) -> LTResult<()> {
    for row in rows.iter_mut() {
        let lx = row.require(Param::Lx)?;
        let nlx = if row.is_terminal() {
            let mx = row.require(Param::Mx)?;
            if mx <= 0.0 {
                return Err(LifeTableError::domain(
                    "terminal mx must be positive, zero means infinite life expectancy",
                )
                .with_context(row.interval));
            }
            lx / mx
        } else {
            let dx = row.require(Param::Dx)?;
            let ax = row.require(Param::Ax)?;
            row.age_length() * (lx - dx) + ax * dx
        };
        row.nLx = Some(nlx);
    }
    Ok(())
}

/// Tx as the reverse cumulative sum of nLx.
pub fn gen_Tx(rows: &mut [LifeTableRow]) -> LTResult<()> {
    let mut total = 0.0;
    for row in rows.iter_mut().rev() {
        total += row.require(Param::NLx)?;
        row.Tx = Some(total);
    }
    Ok(())
}

/// ex = Tx / lx, 0 once nobody is left.
pub fn gen_ex(rows: &mut [LifeTableRow]) -> LTResult<()> {
    for row in rows.iter_mut() {
        let lx = row.require(Param::Lx)?;
        let tx = row.require(Param::Tx)?;
        row.ex = Some(if lx > 0.0 { tx / lx } else { 0.0 });
    }
    Ok(())
}

// ================================================
// PRIVATE FUNCTIONS
// ================================================

fn build_group(
    group: &LifeTableGroup,
    sex_index: Option<usize>,
    params: &LifeTableParams,
    label: &str,
) -> LTResult<LifeTableGroup> {
    let issues = interval_issues(&group.intervals());
    if !issues.is_empty() {
        return Err(LifeTableError::config(format!(
            "{label}: {}",
            issues.join("; ")
        )));
    }
    if !group.has(Param::Mx) {
        return Err(LifeTableError::config(format!(
            "{label}: 'mx' is required on every row"
        )));
    }

    let mut rows = group.rows.clone();
    let ax_supplied = rows.iter().all(|r| r.is_terminal() || r.ax.is_some());
    if !ax_supplied {
        estimate_ax(&mut rows, group, sex_index, params, label)?;
    }

    gen_qx_from_mx_ax(&mut rows)?;
    gen_px_from_qx(&mut rows)?;
    gen_lx_from_qx(&mut rows, params.radix)?;
    gen_dx_from_lx(&mut rows)?;
    gen_nLx(&mut rows)?;
    gen_Tx(&mut rows)?;
    gen_ex(&mut rows)?;

    if let Some(last) = rows.last_mut().filter(|r| r.is_terminal()) {
        last.ax = last.ex;
    }

    Ok(LifeTableGroup::new(group.key.clone(), rows))
}

fn estimate_ax(
    rows: &mut [LifeTableRow],
    group: &LifeTableGroup,
    sex_index: Option<usize>,
    params: &LifeTableParams,
    label: &str,
) -> LTResult<()> {
    for row in rows.iter_mut() {
        row.ax = None;
    }
    closed_form_ax(rows)?;

    let mut iteration = params.iteration;
    if let Some(index) = sex_index {
        let has_u5 = rows.iter().any(|r| r.age_start() < 5.0);
        if has_u5 {
            apply_u5_ax(rows, &group.key[index])?;
            iteration.hold_below = iteration.hold_below.max(5.0);
        }
    }

    let start: Vec<f64> = rows.iter().map(|r| r.ax.unwrap_or(0.0)).collect();
    let refined = iterate_group_ax(rows, start, &iteration)?;
    if !refined.converged {
        warn!(
            "{label}: ax did not converge within {} iterations (last change {:e})",
            iteration.max_iter,
            refined.history.last().copied().unwrap_or(f64::NAN)
        );
    }
    rows.copy_from_slice(&refined.rows);
    Ok(())
}

// ================================================
// UNIT TESTS
// ================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ltdf;
    use approx::assert_abs_diff_eq;

    fn abridged_input() -> LifeTable {
        ltdf! {
            id_cols: ["sex"];
            "sex" => ["male"; 6],
            "age_start" => [0.0, 1.0, 5.0, 10.0, 15.0, 20.0],
            "age_end" => [1.0, 5.0, 10.0, 15.0, 20.0, f64::INFINITY],
            "mx" => [0.09, 0.0192, 0.004, 0.003, 0.005, 0.05],
        }
        .unwrap()
    }

    #[test]
    fn test_lifetable_with_supplied_ax() {
        // single-year table with hand-checkable numbers
        let input = ltdf! {
            "age_start" => [0.0, 1.0, 2.0],
            "age_end" => [1.0, 2.0, f64::INFINITY],
            "mx" => [0.2, 0.2, 0.5],
            "ax" => [0.5, 0.5, 2.0],
        }
        .unwrap();
        let table = lifetable().table(&input).call().unwrap();
        let rows = &table.groups()[0].rows;

        let q = 0.2 / 1.1;
        assert_abs_diff_eq!(rows[0].qx.unwrap(), q, epsilon = 1e-12);
        assert_abs_diff_eq!(rows[1].lx.unwrap(), 1.0 - q, epsilon = 1e-12);
        assert_abs_diff_eq!(rows[2].lx.unwrap(), (1.0 - q).powi(2), epsilon = 1e-12);
        assert_abs_diff_eq!(rows[0].nLx.unwrap(), (1.0 - q) + 0.5 * q, epsilon = 1e-12);
        // terminal: nLx = lx / mx
        assert_abs_diff_eq!(rows[2].nLx.unwrap(), (1.0 - q).powi(2) / 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(rows[2].ex.unwrap(), 2.0, epsilon = 1e-12);
        assert_eq!(rows[2].ax, rows[2].ex);

        let t0 = rows.iter().map(|r| r.nLx.unwrap()).sum::<f64>();
        assert_abs_diff_eq!(rows[0].Tx.unwrap(), t0, epsilon = 1e-12);
        assert_abs_diff_eq!(rows[0].ex.unwrap(), t0, epsilon = 1e-12);

        // input untouched
        assert!(input.groups()[0].rows[0].qx.is_none());
    }

    #[test]
    fn test_lifetable_invariants() {
        let input = abridged_input();
        let table = lifetable()
            .table(&input)
            .radix(100_000.0)
            .sex_col("sex")
            .call()
            .unwrap();
        let rows = &table.groups()[0].rows;

        let total_dx: f64 = rows.iter().map(|r| r.dx.unwrap()).sum();
        assert_abs_diff_eq!(total_dx, 100_000.0, epsilon = 1e-6);
        assert_eq!(rows[0].lx, Some(100_000.0));
        for pair in rows.windows(2) {
            assert!(pair[1].lx.unwrap() <= pair[0].lx.unwrap());
            assert!(pair[1].Tx.unwrap() <= pair[0].Tx.unwrap());
        }
        let last = rows.last().unwrap();
        assert_eq!(last.qx, Some(1.0));
        assert_eq!(last.ax, last.ex);
    }

    #[test]
    fn test_lifetable_uses_u5_ax() {
        let input = abridged_input();
        let table = lifetable().table(&input).sex_col("sex").call().unwrap();
        let rows = &table.groups()[0].rows;
        assert_abs_diff_eq!(rows[0].ax.unwrap(), 0.28656, epsilon = 1e-12);
        assert_abs_diff_eq!(rows[1].ax.unwrap(), 1.39756, epsilon = 1e-12);

        // without a sex column the closed form is used for infants
        let table = lifetable().table(&input).call().unwrap();
        let a0 = table.groups()[0].rows[0].ax.unwrap();
        assert_abs_diff_eq!(a0, crate::convert::mx_to_ax(0.09, 1.0).unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn test_lifetable_sequential_matches_parallel() {
        let input = ltdf! {
            id_cols: ["sex"];
            "sex" => ["male", "male", "male", "female", "female", "female"],
            "age_start" => [0.0, 5.0, 10.0, 0.0, 5.0, 10.0],
            "age_end" => [5.0, 10.0, f64::INFINITY, 5.0, 10.0, f64::INFINITY],
            "mx" => [0.01, 0.002, 0.1, 0.008, 0.001, 0.09],
        }
        .unwrap();
        let parallel = lifetable().table(&input).call().unwrap();
        let sequential = lifetable().table(&input).parallel(false).call().unwrap();
        assert_eq!(parallel, sequential);
        assert_eq!(parallel.groups()[1].key, vec!["female"]);
    }

    #[test]
    fn test_lifetable_rejects_bad_ages() {
        let unordered = ltdf! {
            "age_start" => [0.0, 10.0, 5.0],
            "age_end" => [5.0, f64::INFINITY, 10.0],
            "mx" => [0.01, 0.1, 0.002],
        }
        .unwrap();
        let err = lifetable().table(&unordered).call().unwrap_err();
        assert!(err.is_config());

        let gap = ltdf! {
            "age_start" => [0.0, 6.0],
            "age_end" => [5.0, f64::INFINITY],
            "mx" => [0.01, 0.1],
        }
        .unwrap();
        assert!(lifetable().table(&gap).call().unwrap_err().is_config());
    }

    #[test]
    fn test_lifetable_requires_mx() {
        let input = ltdf! {
            "age_start" => [0.0, 5.0],
            "age_end" => [5.0, f64::INFINITY],
            "qx" => [0.1, 1.0],
        }
        .unwrap();
        assert!(lifetable().table(&input).call().unwrap_err().is_config());
    }

    #[test]
    fn test_lifetable_zero_terminal_mx() {
        let input = ltdf! {
            id_cols: ["location"];
            "location" => ["X", "X"],
            "age_start" => [0.0, 5.0],
            "age_end" => [5.0, f64::INFINITY],
            "mx" => [0.01, 0.0],
        }
        .unwrap();
        let err = lifetable().table(&input).call().unwrap_err();
        assert!(err.is_domain());
        let message = err.to_string();
        assert!(message.contains("location=X"));
        assert!(message.contains("age 5+"));
    }

    #[test]
    fn test_lifetable_domain_error_tagged() {
        // ax late in the interval with a very high rate gives qx > 1
        let input = ltdf! {
            id_cols: ["sex"];
            "sex" => ["female", "female"],
            "age_start" => [0.0, 1.0],
            "age_end" => [1.0, f64::INFINITY],
            "mx" => [3.0, 0.5],
            "ax" => [0.9, 2.0],
        }
        .unwrap();
        let err = lifetable().table(&input).call().unwrap_err();
        assert!(err.is_domain());
        assert!(err.to_string().contains("[sex=female, age 0-1]"));
    }

    #[test]
    fn test_lifetable_negligible_mortality() {
        let input = ltdf! {
            "age_start" => [0.0, 5.0, 10.0, 15.0],
            "age_end" => [5.0, 10.0, 15.0, f64::INFINITY],
            "mx" => [0.01, 1e-17, 0.002, 0.2],
        }
        .unwrap();
        let table = lifetable().table(&input).call().unwrap();
        for row in &table.groups()[0].rows[..3] {
            let ax = row.ax.unwrap();
            assert!((0.0..=5.0).contains(&ax), "ax = {ax} at {}", row.interval);
        }
    }

    #[test]
    fn test_lifetable_high_mortality() {
        let starts: Vec<f64> = (0..=8).map(f64::from).collect();
        let mut ends: Vec<f64> = starts[1..].to_vec();
        ends.push(f64::INFINITY);
        let input = ltdf! {
            "age_start" => starts,
            "age_end" => ends,
            "mx" => vec![3.0; 9],
        }
        .unwrap();
        let table = lifetable().table(&input).call().unwrap();
        let rows = &table.groups()[0].rows;
        for row in &rows[..8] {
            assert!(row.qx.unwrap() < 1.0, "qx = 1 at {}", row.interval);
            assert!(row.lx.unwrap() > 0.0);
        }
        assert_eq!(rows[8].qx, Some(1.0));
    }

    #[test]
    fn test_lifetable_unsupported_sex() {
        let input = ltdf! {
            id_cols: ["sex"];
            "sex" => ["both", "both"],
            "age_start" => [0.0, 1.0],
            "age_end" => [1.0, f64::INFINITY],
            "mx" => [0.05, 0.1],
        }
        .unwrap();
        let err = lifetable().table(&input).sex_col("sex").call().unwrap_err();
        assert!(err.is_unsupported_category());
    }

    #[test]
    fn test_gen_qx_from_lx_reverses_lx() {
        let input = ltdf! {
            "age_start" => [0.0, 1.0, 5.0],
            "age_end" => [1.0, 5.0, f64::INFINITY],
            "qx" => [0.05, 0.02, 1.0],
        }
        .unwrap();
        let mut rows = input.groups()[0].rows.clone();
        gen_lx_from_qx(&mut rows, 1000.0).unwrap();
        for row in rows.iter_mut() {
            row.qx = None;
        }
        gen_qx_from_lx(&mut rows).unwrap();
        assert_abs_diff_eq!(rows[0].qx.unwrap(), 0.05, epsilon = 1e-12);
        assert_abs_diff_eq!(rows[1].qx.unwrap(), 0.02, epsilon = 1e-12);
        assert_eq!(rows[2].qx, Some(1.0));
    }
}
