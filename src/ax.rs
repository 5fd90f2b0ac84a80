//! # Average-Years-Lived Estimator
//!
//! Three ways to get ₙaₓ, the average number of years lived in an interval by
//! those who die in it:
//!
//! - [`crate::convert::mx_to_ax`]: closed form under constant hazard
//! - [`gen_u5_ax`]: the Coale-Demeny regression on infant mortality for the
//!   `0-1` and `1-5` age groups
//! - [`iterate_ax`]: fixed-point refinement from the neighbouring death
//!   distribution (Keyfitz)
//!
//! ## Example
//! ```rust
//! # use rslifetable::prelude::*;
//! let table = ltdf! {
//!     id_cols: ["sex"];
//!     "sex" => ["male", "male", "male"],
//!     "age_start" => [0.0, 1.0, 5.0],
//!     "age_end" => [1.0, 5.0, f64::INFINITY],
//!     "mx" => [0.09, 0.0192, 0.15],
//! }?;
//! let table = gen_u5_ax().table(&table).call()?;
//! let a0 = table.groups()[0].rows[0].ax.unwrap();
//! assert!((a0 - (0.045 + 2.684 * 0.09)).abs() < 1e-12);
//! # LTResult::Ok(())
//! ```

use crate::convert::{mx_ax_to_qx, mx_to_ax};
use crate::error::{ConvergenceWarning, LTResult, LifeTableError};
use crate::params::IterateAxParams;
use crate::table::interval::AgeInterval;
use crate::table::{LifeTable, LifeTableGroup, LifeTableRow, Param};
use bon::builder;
use garde::Validate;
use log::{debug, warn};
use rayon::prelude::*;
use std::str::FromStr;

/// Infant mortality rate above which the Coale-Demeny constants apply.
pub const U5_MX_THRESHOLD: f64 = 0.107;

// ===============================================
// SEX CATEGORY
// ===============================================

/// Sex categories with published under-5 ax coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
}

impl FromStr for Sex {
    type Err = LifeTableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" | "1" => Ok(Sex::Male),
            "female" | "f" | "2" => Ok(Sex::Female),
            other => Err(LifeTableError::UnsupportedCategory(format!(
                "sex '{other}' has no under-5 ax coefficients (expected male or female)"
            ))),
        }
    }
}

// ===============================================
// PUBLIC FUNCTIONS
// ===============================================

/// Coale-Demeny ax for ages 0-1 and 1-5 from the infant mortality rate.
///
/// # Formula
/// ```text
///            1a0 (m0 ≥ 0.107)  1a0 (m0 < 0.107)   4a1 (m0 ≥ 0.107)  4a1 (m0 < 0.107)
/// male       0.330             0.045 + 2.684·m0   1.352             1.651 - 2.816·m0
/// female     0.350             0.053 + 2.800·m0   1.361             1.522 - 1.518·m0
/// ```
/// Returns `(1a0, 4a1)`.
pub fn coale_demeny_u5_ax(m0: f64, sex: Sex) -> (f64, f64) {
    let high = m0 >= U5_MX_THRESHOLD;
    match (sex, high) {
        (Sex::Male, true) => (0.330, 1.352),
        (Sex::Male, false) => (0.045 + 2.684 * m0, 1.651 - 2.816 * m0),
        (Sex::Female, true) => (0.350, 1.361),
        (Sex::Female, false) => (0.053 + 2.800 * m0, 1.522 - 1.518 * m0),
    }
}

/// Replace ax for the `0-1` and `1-5` age groups with Coale-Demeny estimates.
///
/// Every other row is returned untouched. Groups without a `0-1` row are left
/// alone unless they have a `1-5` row, whose estimate depends on infant mortality.
///
/// # Errors
/// - `ConfigError` when `sex_col` is not an identifying column, when a group has a
///   `1-5` row but no `0-1` row, or when the `0-1` row has no mx
/// - `UnsupportedCategoryError` when a group's sex is not male or female
#[builder]
pub fn gen_u5_ax(table: &LifeTable, #[builder(default = "sex")] sex_col: &str) -> LTResult<LifeTable> {
    let sex_index = table.id_index(sex_col).ok_or_else(|| {
        LifeTableError::config(format!(
            "under-5 ax needs a sex column, '{sex_col}' is not among the identifying columns {:?}",
            table.id_cols()
        ))
    })?;

    let groups = table
        .groups()
        .iter()
        .map(|group| {
            let mut rows = group.rows.clone();
            apply_u5_ax(&mut rows, &group.key[sex_index])
                .map_err(|e| e.with_context(table.group_label(group)))?;
            Ok(LifeTableGroup::new(group.key.clone(), rows))
        })
        .collect::<LTResult<Vec<_>>>()?;

    table.with_groups(groups)
}

/// Outcome of [`iterate_ax`].
#[derive(Debug, Clone)]
pub struct IterateAxOutcome {
    /// Input table with refined ax.
    pub table: LifeTable,
    /// Rounds run by the slowest group.
    pub iterations: u32,
    /// Largest ax change in the final round.
    pub max_change: f64,
    /// Largest ax change across groups, per round.
    pub history: Vec<f64>,
    /// Set when some group hit the iteration cap first.
    pub warning: Option<ConvergenceWarning>,
}

impl IterateAxOutcome {
    pub fn converged(&self) -> bool {
        self.warning.is_none()
    }
}

/// Refine ax by fixed-point iteration on the distribution of deaths.
///
/// # Formula
/// ```text
/// ₙaₓ = (-n/24 · ₙdₓ₋ₙ + n/2 · ₙdₓ + n/24 · ₙdₓ₊ₙ) / ₙdₓ
/// ```
/// dx is re-derived every round from mx and the current ax. Each round updates
/// every eligible row; iteration stops once the largest absolute change falls
/// below `params.tol`, or after `params.max_iter` rounds with a
/// [`ConvergenceWarning`] and the last iterate.
///
/// Rows without ax start from `n/2`. The first row of a group, the terminal row
/// and the row just before it (no closed neighbour on one side), rows starting
/// below `params.hold_below`, and rows with no deaths keep their ax. Refined
/// values are clamped to `[0, n]`; one at or above `1/mx` would push qx to 1 and
/// is dropped in favour of the previous iterate.
///
/// # Errors
/// - `ConfigError` when a row has no mx
/// - `DomainError` when mx and the current ax give qx outside [0, 1]
///
/// # Example
/// ```rust
/// # use rslifetable::prelude::*;
/// let table = ltdf! {
///     "age_start" => [0.0, 5.0, 10.0, 15.0, 20.0],
///     "age_end" => [5.0, 10.0, 15.0, 20.0, f64::INFINITY],
///     "mx" => [0.01, 0.002, 0.003, 0.006, 0.2],
/// }?;
/// let outcome = iterate_ax().table(&table).call()?;
/// assert!(outcome.converged());
/// # LTResult::Ok(())
/// ```
#[builder]
pub fn iterate_ax(
    table: &LifeTable,
    #[builder(default)] params: IterateAxParams,
) -> LTResult<IterateAxOutcome> {
    params.validate()?;

    let results = table
        .groups()
        .par_iter()
        .map(|group| {
            let start = starting_ax(&group.rows);
            iterate_group_ax(&group.rows, start, &params)
                .map_err(|e| e.with_context(table.group_label(group)))
        })
        .collect::<LTResult<Vec<_>>>()?;

    let mut history: Vec<f64> = Vec::new();
    let mut groups = Vec::with_capacity(results.len());
    let mut all_converged = true;
    for (group, result) in table.groups().iter().zip(results) {
        for (round, change) in result.history.iter().enumerate() {
            match history.get_mut(round) {
                Some(h) => *h = h.max(*change),
                None => history.push(*change),
            }
        }
        all_converged &= result.converged;
        groups.push(LifeTableGroup::new(group.key.clone(), result.rows));
    }

    let iterations = history.len() as u32;
    let max_change = history.last().copied().unwrap_or(0.0);
    let warning = if all_converged {
        None
    } else {
        let warning = ConvergenceWarning {
            iterations,
            max_change,
            tol: params.tol,
        };
        warn!("{warning}");
        Some(warning)
    };
    debug!("iterate_ax finished after {iterations} rounds, max change {max_change:e}");

    Ok(IterateAxOutcome {
        table: table.with_groups(groups)?,
        iterations,
        max_change,
        history,
        warning,
    })
}

// ================================================
// CRATE FUNCTIONS
// ================================================

/// Per-group result of the ax iteration.
pub(crate) struct GroupAxIteration {
    pub rows: Vec<LifeTableRow>,
    pub history: Vec<f64>,
    pub converged: bool,
}

/// Apply the under-5 estimates in place on one group's own rows.
pub(crate) fn apply_u5_ax(rows: &mut [LifeTableRow], sex: &str) -> LTResult<()> {
    let infant = AgeInterval { start: 0.0, end: 1.0 };
    let child = AgeInterval { start: 1.0, end: 5.0 };
    let i0 = rows.iter().position(|r| r.interval == infant);
    let i1 = rows.iter().position(|r| r.interval == child);

    let i0 = match (i0, i1) {
        (None, None) => return Ok(()),
        (None, Some(_)) => {
            return Err(LifeTableError::config(
                "age 1-5 ax depends on the age 0-1 row, which is missing",
            ));
        }
        (Some(i0), _) => i0,
    };

    let sex: Sex = sex.parse()?;
    let m0 = rows[i0].require(Param::Mx)?;
    let (a0, a1) = coale_demeny_u5_ax(m0, sex);
    rows[i0].ax = Some(a0);
    if let Some(i1) = i1 {
        rows[i1].ax = Some(a1);
    }
    Ok(())
}

/// Closed-form starting ax for rows that have none.
///
/// Zero mortality gets the midpoint; the terminal row gets `1/mx`.
pub(crate) fn closed_form_ax(rows: &mut [LifeTableRow]) -> LTResult<()> {
    for row in rows.iter_mut().filter(|r| r.ax.is_none()) {
        let mx = row.require(Param::Mx)?;
        let n = row.age_length();
        row.ax = if mx == 0.0 {
            (!row.is_terminal()).then_some(n / 2.0)
        } else {
            Some(mx_to_ax(mx, n).map_err(|e| e.with_context(row.interval))?)
        };
    }
    Ok(())
}

/// Run the fixed-point ax iteration over one group's rows.
pub(crate) fn iterate_group_ax(
    rows: &[LifeTableRow],
    mut ax: Vec<f64>,
    params: &IterateAxParams,
) -> LTResult<GroupAxIteration> {
    let n_rows = rows.len();
    let mx = rows
        .iter()
        .map(|r| r.require(Param::Mx))
        .collect::<LTResult<Vec<_>>>()?;

    let eligible: Vec<usize> = (1..n_rows.saturating_sub(1))
        .filter(|&i| {
            !rows[i].is_terminal()
                && !rows[i + 1].is_terminal()
                && rows[i].age_start() >= params.hold_below
        })
        .collect();

    let mut history = Vec::new();
    let mut converged = eligible.is_empty();
    while !converged && (history.len() as u32) < params.max_iter {
        let dx = deaths_distribution(rows, &mx, &ax)?;

        let mut max_change: f64 = 0.0;
        let mut next = ax.clone();
        for &i in &eligible {
            if dx[i] <= 0.0 {
                continue;
            }
            let n = rows[i].age_length();
            let refined = (-n / 24.0 * dx[i - 1] + n / 2.0 * dx[i] + n / 24.0 * dx[i + 1]) / dx[i];
            let refined = refined.clamp(0.0, n);
            // ax ≥ 1/mx would kill the whole cohort inside a closed interval
            if refined * mx[i] >= 1.0 {
                continue;
            }
            next[i] = refined;
            max_change = max_change.max((next[i] - ax[i]).abs());
        }

        ax = next;
        history.push(max_change);
        converged = max_change < params.tol;
    }

    let rows = rows
        .iter()
        .zip(&ax)
        .map(|(row, &a)| {
            let mut row = *row;
            if !row.is_terminal() {
                row.ax = Some(a);
            }
            row
        })
        .collect();

    Ok(GroupAxIteration {
        rows,
        history,
        converged,
    })
}

// ================================================
// PRIVATE FUNCTIONS
// ================================================

/// Input ax where present, `n/2` elsewhere. Terminal slots are never read.
fn starting_ax(rows: &[LifeTableRow]) -> Vec<f64> {
    rows.iter()
        .map(|r| match r.ax {
            Some(ax) => ax,
            None if r.is_terminal() => 0.0,
            None => r.age_length() / 2.0,
        })
        .collect()
}

/// dx on a unit radix from mx and ax, all remaining deaths in the terminal row.
fn deaths_distribution(rows: &[LifeTableRow], mx: &[f64], ax: &[f64]) -> LTResult<Vec<f64>> {
    let mut lx = 1.0;
    let mut dx = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let qx = if row.is_terminal() {
            1.0
        } else {
            mx_ax_to_qx(mx[i], ax[i], row.age_length()).map_err(|e| e.with_context(row.interval))?
        };
        dx.push(lx * qx);
        lx *= 1.0 - qx;
    }
    Ok(dx)
}
