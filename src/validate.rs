//! # Life Table Validation
//!
//! Structural and numeric invariant checks. The validator never stops at the first
//! problem: every violated check of every group ends up in one
//! [`ValidationReport`](crate::error::ValidationReport).
//!
//! Numeric checks only look at the parameters a table actually carries, so a
//! qx-only table passes as long as its qx values are sound.

use crate::error::{LTResult, ValidationReport};
use crate::params::ValidationParams;
use crate::table::interval::interval_issues;
use crate::table::{LifeTable, LifeTableGroup, LifeTableRow, Param};
use bon::builder;
use garde::Validate;

// ================================================
// PUBLIC FUNCTIONS
// ================================================

/// Check a life table's structural and numeric invariants.
///
/// # Structural checks
/// - every parameter in `params.required` present on every row
/// - intervals contiguous, ascending, without duplicates, ending open-ended
///
/// # Numeric checks
/// ```text
/// 0 ≤ qx ≤ 1        0 ≤ px ≤ 1        terminal qx = 1
/// 0 ≤ lx ≤ l₀       lx non-increasing Σdx = l₀, dx ≥ 0
/// nLx ≥ 0           Tx non-increasing ex ≥ 0
/// ```
/// Tolerances are `params.tol`, scaled by the radix where the value is.
///
/// # Errors
/// - `ValidationError` listing every violation
/// - `Params` when `params` itself is invalid
///
/// # Example
/// ```rust
/// # use rslifetable::prelude::*;
/// let table = ltdf! {
///     "age_start" => [0.0, 5.0],
///     "age_end" => [5.0, f64::INFINITY],
///     "qx" => [1.2, 0.9],
/// }?;
/// let err = validate_lifetable().table(&table).call().unwrap_err();
/// // both the out-of-range qx and the terminal qx are reported
/// assert!(err.to_string().contains("2 issue(s)"));
/// # LTResult::Ok(())
/// ```
#[builder]
pub fn validate_lifetable(
    table: &LifeTable,
    #[builder(default)] params: ValidationParams,
) -> LTResult<()> {
    params.validate()?;

    let mut report = ValidationReport::new();
    if table.groups().is_empty() {
        report.push("table has no rows");
    }
    for group in table.groups() {
        let label = table.group_label(group);
        for issue in group_issues(group, &params) {
            report.push(format!("{label}: {issue}"));
        }
    }
    report.into_result()
}

// ================================================
// CRATE FUNCTIONS
// ================================================

pub(crate) fn group_issues(group: &LifeTableGroup, params: &ValidationParams) -> Vec<String> {
    let mut issues = Vec::new();
    let rows = &group.rows;

    for param in &params.required {
        let missing = rows.iter().filter(|r| r.get(*param).is_none()).count();
        if missing > 0 {
            issues.push(format!(
                "'{}' missing in {missing} row(s)",
                param.name()
            ));
        }
    }
    issues.extend(interval_issues(&group.intervals()));

    // Scale for tolerances on level quantities
    let radix = rows.first().and_then(|r| r.lx).unwrap_or(1.0).abs().max(1.0);
    let tol = params.tol;
    let level_tol = tol * radix;

    for row in rows {
        check_nan(row, &mut issues);
        if let Some(qx) = row.qx {
            if !(-tol..=1.0 + tol).contains(&qx) {
                issues.push(format!("qx = {qx} outside [0, 1] at {}", row.interval));
            }
            if row.is_terminal() && (qx - 1.0).abs() > tol {
                issues.push(format!("terminal qx = {qx} is not 1 at {}", row.interval));
            }
        }
        if let Some(px) = row.px {
            if !(-tol..=1.0 + tol).contains(&px) {
                issues.push(format!("px = {px} outside [0, 1] at {}", row.interval));
            }
        }
        if let Some(lx) = row.lx {
            if lx < -level_tol || lx > radix + level_tol {
                issues.push(format!("lx = {lx} outside [0, {radix}] at {}", row.interval));
            }
        }
        if let Some(dx) = row.dx {
            if dx < -level_tol {
                issues.push(format!("dx = {dx} negative at {}", row.interval));
            }
        }
        if let Some(nlx) = row.nLx {
            if nlx < -level_tol {
                issues.push(format!("nLx = {nlx} negative at {}", row.interval));
            }
        }
        if let Some(ex) = row.ex {
            if ex < -tol {
                issues.push(format!("ex = {ex} negative at {}", row.interval));
            }
        }
    }

    check_non_increasing(rows, Param::Lx, level_tol, &mut issues);
    check_non_increasing(rows, Param::Tx, level_tol, &mut issues);

    if group.has(Param::Dx) {
        if let Some(l0) = rows.first().and_then(|r| r.lx) {
            let total: f64 = rows.iter().filter_map(|r| r.dx).sum();
            if (total - l0).abs() > level_tol {
                issues.push(format!("dx sums to {total}, expected the radix {l0}"));
            }
        }
    }

    issues
}

// ================================================
// PRIVATE FUNCTIONS
// ================================================

fn check_nan(row: &LifeTableRow, issues: &mut Vec<String>) {
    for param in Param::ALL {
        if row.get(param).is_some_and(f64::is_nan) {
            issues.push(format!("{} is NaN at {}", param.name(), row.interval));
        }
    }
}

fn check_non_increasing(rows: &[LifeTableRow], param: Param, tol: f64, issues: &mut Vec<String>) {
    for pair in rows.windows(2) {
        if let (Some(a), Some(b)) = (pair[0].get(param), pair[1].get(param)) {
            if b > a + tol {
                issues.push(format!(
                    "{} increases from {a} at {} to {b} at {}",
                    param.name(),
                    pair[0].interval,
                    pair[1].interval
                ));
            }
        }
    }
}

// ================================================
// UNIT TESTS
// ================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ltdf;

    #[test]
    fn test_valid_qx_only_table() {
        let table = ltdf! {
            id_cols: ["sex"];
            "sex" => ["male", "male", "male"],
            "age_start" => [0.0, 1.0, 5.0],
            "age_end" => [1.0, 5.0, f64::INFINITY],
            "qx" => [0.02, 0.01, 1.0],
        }
        .unwrap();
        assert!(validate_lifetable().table(&table).call().is_ok());
    }

    #[test]
    fn test_collects_every_issue() {
        let table = ltdf! {
            "age_start" => [0.0, 1.0, 6.0, 10.0],
            "age_end" => [1.0, 5.0, 10.0, 15.0],
            "qx" => [-0.1, 0.2, 0.3, 0.5],
            "lx" => [1.0, 1.1, 0.5, 0.4],
        }
        .unwrap();

        let err = validate_lifetable().table(&table).call().unwrap_err();
        assert!(err.is_validation());
        let message = err.to_string();
        assert!(message.contains("qx = -0.1 outside [0, 1]"));
        assert!(message.contains("gap between age 1-5 and age 6-10"));
        assert!(message.contains("last interval age 10-15 is not open-ended"));
        assert!(message.contains("lx increases from 1 at age 0-1 to 1.1 at age 1-5"));
        assert!(message.contains("lx = 1.1 outside [0, 1]"));
        assert!(message.contains("5 issue(s)"));
    }

    #[test]
    fn test_required_columns() {
        let table = ltdf! {
            "age_start" => [0.0, 5.0],
            "age_end" => [5.0, f64::INFINITY],
            "qx" => [0.1, 1.0],
        }
        .unwrap();
        let params = ValidationParams::builder()
            .required(vec![Param::Qx, Param::Lx, Param::Ex])
            .build();
        let err = validate_lifetable()
            .table(&table)
            .params(params)
            .call()
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'lx' missing in 2 row(s)"));
        assert!(message.contains("'ex' missing in 2 row(s)"));
    }

    #[test]
    fn test_dx_must_sum_to_radix() {
        let table = ltdf! {
            "age_start" => [0.0, 5.0],
            "age_end" => [5.0, f64::INFINITY],
            "lx" => [1.0, 0.9],
            "dx" => [0.1, 0.8],
        }
        .unwrap();
        let err = validate_lifetable().table(&table).call().unwrap_err();
        assert!(err.to_string().contains("dx sums to 0.9"));
    }

    #[test]
    fn test_rejects_invalid_params() {
        let table = ltdf! {
            "age_start" => [0.0],
            "age_end" => [f64::INFINITY],
            "qx" => [1.0],
        }
        .unwrap();
        let params = ValidationParams::builder().tol(-1.0).build();
        let err = validate_lifetable().table(&table).params(params).call();
        assert!(matches!(err, Err(crate::error::LifeTableError::Params(_))));
    }
}
