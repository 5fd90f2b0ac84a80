//! # Age Aggregation
//!
//! Move life tables between age structures:
//!
//! - [`agg_lt`]: collapse fine intervals into coarser ones (e.g. single-year to
//!   abridged), compounding survival and re-deriving ax
//! - [`split_qx`]: spread coarse qx over finer intervals under constant hazard
//! - [`scale_qx`]: rescale a fine qx schedule so it reproduces a coarse one
//!
//! Inputs are never mutated; every function returns a new table that has been
//! through [`validate_lifetable`](crate::validate::validate_lifetable).
//!
//! ## Quick Start
//! ```rust
//! # use rslifetable::prelude::*;
//! let single = ltdf! {
//!     "age_start" => [0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
//!     "age_end" => [1.0, 2.0, 3.0, 4.0, 5.0, f64::INFINITY],
//!     "qx" => [0.02, 0.01, 0.01, 0.01, 0.01, 1.0],
//! }?;
//! let mapping = AgeMapping::from_starts(&[0.0, 1.0, 5.0])?;
//! let abridged = agg_lt().table(&single).mapping(&mapping).call()?;
//! let q1 = abridged.groups()[0].rows[1].qx.unwrap();
//! assert!((q1 - (1.0 - 0.99_f64.powi(4))).abs() < 1e-12);
//! # LTResult::Ok(())
//! ```

#![allow(non_snake_case)]

use crate::error::{LTResult, LifeTableError};
use crate::table::interval::{interval_issues, AgeInterval, AgeMapping};
use crate::table::{LifeTable, LifeTableGroup, LifeTableRow, Param};
use crate::validate::validate_lifetable;
use bon::builder;
use log::debug;
use rayon::prelude::*;

// ================================================
// PUBLIC FUNCTIONS
// ================================================

/// Aggregate a life table onto coarser age intervals.
///
/// # Formula
/// For each target interval `[A, A+N)` made of fine rows `i`:
/// ```text
/// qx_agg = 1 - ∏ (1 - qx_i)
/// ax_agg = (Σ nLx_i - N·l(A+N)) / dx_agg        closed target
/// ax_agg = Σ nLx_i / l(A)                        terminal target
/// ```
/// lx, dx and nLx are chained from qx and ax inside each group, with the
/// terminal fine row contributing `nLx = ax·dx`. A target with no deaths gets
/// `ax = N/2`.
///
/// ax is only produced when every input row carries it; a qx-only table gives a
/// qx-only result.
///
/// # Errors
/// - `ConfigError` when a group lacks qx, its ages are not a valid sequence, or
///   the mapping's boundaries do not partition the group's age range
/// - `ValidationError` when the aggregated table breaks an invariant
#[builder]
pub fn agg_lt(table: &LifeTable, mapping: &AgeMapping) -> LTResult<LifeTable> {
    debug!(
        "aggregating {} group(s) onto {} age intervals",
        table.groups().len(),
        mapping.len()
    );
    let groups = table
        .groups()
        .par_iter()
        .map(|group| {
            let label = table.group_label(group);
            aggregate_group(group, mapping, &label).map_err(|e| e.with_context(&label))
        })
        .collect::<LTResult<Vec<_>>>()?;

    let result = table.with_groups(groups)?;
    validate_lifetable().table(&result).call()?;
    Ok(result)
}

/// Split each coarse qx over the finer intervals of `mapping`.
///
/// # Formula
/// Under a constant hazard within the coarse interval of length `N`:
/// ```text
/// pᵢ = p_agg^(nᵢ/N)
/// ```
/// The coarse terminal interval has no finite length; closed targets inside it
/// take `qᵢ = 1 - e^(-nᵢ·mx)` from the coarse row's mx, and the last target gets
/// qx = 1.
///
/// # Errors
/// - `ConfigError` when the mapping does not refine the table's intervals, when
///   a group lacks qx, or when the open-ended interval is split without mx
/// - `ValidationError` when the result breaks an invariant
#[builder]
pub fn split_qx(table: &LifeTable, mapping: &AgeMapping) -> LTResult<LifeTable> {
    let groups = table
        .groups()
        .iter()
        .map(|group| {
            let label = table.group_label(group);
            split_group(group, mapping, &label).map_err(|e| e.with_context(&label))
        })
        .collect::<LTResult<Vec<_>>>()?;

    let result = table.with_groups(groups)?;
    validate_lifetable().table(&result).call()?;
    Ok(result)
}

/// Rescale the fine table's qx to reproduce the coarse table's qx.
///
/// # Formula
/// For each coarse interval with fine rows `i`:
/// ```text
/// k   = ln p_agg / Σ ln pᵢ
/// pᵢ' = pᵢ^k
/// ```
/// which keeps the shape of the fine schedule while matching compound survival.
/// Where the fine schedule has no mortality at all over the interval, the coarse
/// survival is spread under a constant hazard instead. Fine rows inside the
/// coarse terminal interval keep their qx.
///
/// Groups are matched on their identifying values; ax is carried over, every
/// other derived column is dropped.
///
/// # Errors
/// - `ConfigError` when the two tables have different identifying columns, a
///   fine group has no coarse counterpart, or the boundaries misalign
/// - `DomainError` when a fine row already has qx = 1 inside a coarse interval
///   whose survival is positive
/// - `ValidationError` when the result breaks an invariant
#[builder]
pub fn scale_qx(fine: &LifeTable, coarse: &LifeTable) -> LTResult<LifeTable> {
    if fine.id_cols() != coarse.id_cols() {
        return Err(LifeTableError::config(format!(
            "identifying columns differ: {:?} vs {:?}",
            fine.id_cols(),
            coarse.id_cols()
        )));
    }

    let groups = fine
        .groups()
        .iter()
        .map(|group| {
            let label = fine.group_label(group);
            let key: Vec<&str> = group.key.iter().map(String::as_str).collect();
            let target = coarse.group(&key).ok_or_else(|| {
                LifeTableError::config(format!("{label}: no matching group in the coarse table"))
            })?;
            scale_group(group, target, &label).map_err(|e| e.with_context(&label))
        })
        .collect::<LTResult<Vec<_>>>()?;

    let result = fine.with_groups(groups)?;
    validate_lifetable().table(&result).call()?;
    Ok(result)
}

// ================================================
// PRIVATE FUNCTIONS
// ================================================

/// For every fine interval, the index of the coarse interval that holds it.
///
/// Both sequences are contiguous and end open-ended, so it is enough that every
/// fine interval sits in one coarse interval and no coarse interval is empty.
fn nest(fine: &[AgeInterval], coarse: &[AgeInterval], label: &str) -> LTResult<Vec<usize>> {
    let mut owner = Vec::with_capacity(fine.len());
    let mut used = vec![false; coarse.len()];
    for interval in fine {
        let j = coarse
            .iter()
            .position(|c| c.covers(interval))
            .ok_or_else(|| {
                LifeTableError::config(format!(
                    "{label}: missing intervals, {interval} crosses a boundary of the target ages"
                ))
            })?;
        used[j] = true;
        owner.push(j);
    }
    if let Some(j) = used.iter().position(|u| !u) {
        return Err(LifeTableError::config(format!(
            "{label}: missing intervals, nothing maps onto {}",
            coarse[j]
        )));
    }
    Ok(owner)
}

fn check_intervals(group: &LifeTableGroup, label: &str) -> LTResult<()> {
    let issues = interval_issues(&group.intervals());
    if issues.is_empty() {
        Ok(())
    } else {
        Err(LifeTableError::config(format!("{label}: {}", issues.join("; "))))
    }
}

fn aggregate_group(group: &LifeTableGroup, mapping: &AgeMapping, label: &str) -> LTResult<LifeTableGroup> {
    check_intervals(group, label)?;
    let qx = group.values(Param::Qx)?;
    let owner = nest(&group.intervals(), mapping.intervals(), label)?;
    let with_ax = group.has(Param::Ax);

    // lx on a unit radix, dx and nLx per fine row
    let mut lx = Vec::with_capacity(qx.len() + 1);
    lx.push(1.0);
    let mut nLx = Vec::with_capacity(qx.len());
    for (i, row) in group.rows.iter().enumerate() {
        let dx = lx[i] * qx[i];
        lx.push(lx[i] - dx);
        if let Some(ax) = row.ax.filter(|_| with_ax) {
            let survivors = if row.is_terminal() { 0.0 } else { row.age_length() * lx[i + 1] };
            nLx.push(survivors + ax * dx);
        }
    }

    let rows = mapping
        .intervals()
        .iter()
        .enumerate()
        .map(|(j, &target)| {
            let members: Vec<usize> = (0..owner.len()).filter(|&i| owner[i] == j).collect();
            let first = members[0];
            let last = members[members.len() - 1];

            let survival: f64 = members.iter().map(|&i| 1.0 - qx[i]).product();
            let mut row = LifeTableRow::new(target);
            row.qx = Some(if target.is_terminal() { 1.0 } else { 1.0 - survival });

            if with_ax {
                let l_start = lx[first];
                let l_end = lx[last + 1];
                let person_years: f64 = members.iter().map(|&i| nLx[i]).sum();
                let dx_agg = l_start - l_end;
                row.ax = Some(if target.is_terminal() {
                    if l_start > 0.0 { person_years / l_start } else { 0.0 }
                } else if dx_agg > 0.0 {
                    ((person_years - target.length() * l_end) / dx_agg).clamp(0.0, target.length())
                } else {
                    target.length() / 2.0
                });
            }
            row
        })
        .collect();

    Ok(LifeTableGroup::new(group.key.clone(), rows))
}

fn split_group(group: &LifeTableGroup, mapping: &AgeMapping, label: &str) -> LTResult<LifeTableGroup> {
    check_intervals(group, label)?;
    let qx = group.values(Param::Qx)?;
    let owner = nest(mapping.intervals(), &group.intervals(), label)?;

    let rows = mapping
        .intervals()
        .iter()
        .zip(&owner)
        .map(|(&target, &j)| {
            let coarse = &group.rows[j];
            let mut row = LifeTableRow::new(target);
            row.qx = Some(if target.is_terminal() {
                1.0
            } else if coarse.is_terminal() {
                let mx = coarse.mx.ok_or_else(|| {
                    LifeTableError::config(format!(
                        "{label}: splitting {} needs mx for a constant hazard",
                        coarse.interval
                    ))
                })?;
                -(-mx * target.length()).exp_m1()
            } else {
                let share = target.length() / coarse.age_length();
                1.0 - (1.0 - qx[j]).powf(share)
            });
            Ok(row)
        })
        .collect::<LTResult<Vec<_>>>()?;

    Ok(LifeTableGroup::new(group.key.clone(), rows))
}

fn scale_group(fine: &LifeTableGroup, coarse: &LifeTableGroup, label: &str) -> LTResult<LifeTableGroup> {
    check_intervals(fine, label)?;
    check_intervals(coarse, label)?;
    let qx = fine.values(Param::Qx)?;
    let coarse_qx = coarse.values(Param::Qx)?;
    let owner = nest(&fine.intervals(), &coarse.intervals(), label)?;

    let mut scaled = qx.clone();
    for (j, target) in coarse.rows.iter().enumerate() {
        if target.is_terminal() {
            continue;
        }
        let members: Vec<usize> = (0..owner.len()).filter(|&i| owner[i] == j).collect();
        let p_agg = 1.0 - coarse_qx[j];
        let log_sum: f64 = members.iter().map(|&i| (1.0 - qx[i]).ln()).sum();

        if log_sum == 0.0 {
            for &i in &members {
                let share = fine.rows[i].age_length() / target.age_length();
                scaled[i] = 1.0 - p_agg.powf(share);
            }
        } else if log_sum.is_infinite() {
            if p_agg > 0.0 {
                return Err(LifeTableError::domain(format!(
                    "qx = 1 inside a coarse interval with survival {p_agg}"
                ))
                .with_context(target.interval));
            }
        } else {
            let k = p_agg.ln() / log_sum;
            for &i in &members {
                scaled[i] = 1.0 - (1.0 - qx[i]).powf(k);
            }
        }
    }

    let rows = fine
        .rows
        .iter()
        .zip(scaled)
        .map(|(source, q)| {
            let mut row = LifeTableRow::new(source.interval);
            row.qx = Some(q);
            row.ax = source.ax;
            row
        })
        .collect();

    Ok(LifeTableGroup::new(fine.key.clone(), rows))
}
