//! # Integration Tests for the Life Table Pipeline
//!
//! Builds complete tables from mortality rates, checks the identities that tie
//! the columns together, and runs them through aggregation and validation.

use approx::assert_abs_diff_eq;
use rslifetable::prelude::*;

/// Gompertz-Makeham rates for single years 0..=100, two sexes.
fn single_year_input() -> LifeTable {
    let mut sex = Vec::new();
    let mut starts = Vec::new();
    let mut ends = Vec::new();
    let mut mx = Vec::new();
    for (label, level) in [("male", 1.2), ("female", 1.0)] {
        for age in 0..=100 {
            let x = f64::from(age);
            sex.push(label);
            starts.push(x);
            ends.push(if age == 100 { f64::INFINITY } else { x + 1.0 });
            let infant = if age == 0 { 0.01 } else { 0.0 };
            mx.push(level * (0.0005 + 0.00003 * (0.095 * x).exp()) + infant);
        }
    }
    ltdf! {
        id_cols: ["sex"];
        "sex" => sex,
        "age_start" => starts,
        "age_end" => ends,
        "mx" => mx,
    }
    .unwrap()
}

#[test]
fn test_built_table_identities() {
    let _ = env_logger::builder().is_test(true).try_init();
    let input = single_year_input();
    let table = lifetable()
        .table(&input)
        .radix(100_000.0)
        .sex_col("sex")
        .call()
        .unwrap();

    assert_eq!(table.groups().len(), 2);
    for group in table.groups() {
        let rows = &group.rows;
        assert_eq!(rows[0].lx, Some(100_000.0));

        for (i, row) in rows.iter().enumerate() {
            let n = row.age_length();
            let (mx, ax, qx) = (row.mx.unwrap(), row.ax.unwrap(), row.qx.unwrap());
            let (lx, dx, nlx) = (row.lx.unwrap(), row.dx.unwrap(), row.nLx.unwrap());

            assert_abs_diff_eq!(row.px.unwrap(), 1.0 - qx, epsilon = 1e-15);
            assert_abs_diff_eq!(row.ex.unwrap(), row.Tx.unwrap() / lx, epsilon = 1e-9);
            // mx is recovered as deaths over exposure
            assert_abs_diff_eq!(dx / nlx, mx, epsilon = 1e-12);
            if !row.is_terminal() {
                assert!((0.0..=n).contains(&ax));
                assert_abs_diff_eq!(rows[i + 1].lx.unwrap(), lx - dx, epsilon = 1e-8);
            }
        }

        let last = rows.last().unwrap();
        assert_eq!(last.qx, Some(1.0));
        assert_eq!(last.ax, last.ex);
        assert_eq!(last.Tx, last.nLx);
    }

    let male_e0 = table.group(&["male"]).unwrap().rows[0].ex.unwrap();
    let female_e0 = table.group(&["female"]).unwrap().rows[0].ex.unwrap();
    assert!(female_e0 > male_e0);
}

#[test]
fn test_built_table_survives_dataframe_round_trip() {
    let input = single_year_input();
    let table = lifetable().table(&input).call().unwrap();
    let df = table.to_df().unwrap();
    assert_eq!(df.height(), 202);

    let back = LifeTable::from_df(&df, &["sex"]).unwrap();
    assert_eq!(back, table);
    validate_lifetable()
        .table(&back)
        .params(ValidationParams::builder().required(Param::ALL.to_vec()).build())
        .call()
        .unwrap();
}

#[test]
fn test_aggregate_built_table() {
    let input = single_year_input();
    let table = lifetable().table(&input).sex_col("sex").call().unwrap();
    let mapping = AgeMapping::abridged(100).unwrap();
    let abridged = agg_lt().table(&table).mapping(&mapping).call().unwrap();

    for (fine, coarse) in table.groups().iter().zip(abridged.groups()) {
        assert_eq!(fine.key, coarse.key);
        assert_eq!(coarse.rows.len(), 22);

        // compound survival over 1-5 matches the fine lx
        let l1 = fine.row_at(1.0).unwrap().lx.unwrap();
        let l5 = fine.row_at(5.0).unwrap().lx.unwrap();
        assert_abs_diff_eq!(coarse.rows[1].qx.unwrap(), 1.0 - l5 / l1, epsilon = 1e-12);

        // person-years are preserved: ax reproduces the fine nLx sum
        let fine_nlx: f64 = fine.rows[1..5].iter().map(|r| r.nLx.unwrap()).sum();
        let d = l1 - l5;
        let ax = coarse.rows[1].ax.unwrap();
        assert_abs_diff_eq!(4.0 * l5 + ax * d, fine_nlx, epsilon = 1e-10);
    }

    // rebuilding from the aggregated ax and compound rates stays a valid table
    let terminal_ax = abridged.groups()[0].rows[21].ax.unwrap();
    assert!(terminal_ax > 0.0);
}

#[test]
fn test_sequential_build_matches_parallel() {
    let input = single_year_input();
    let parallel = lifetable().table(&input).call().unwrap();
    let sequential = lifetable().table(&input).parallel(false).call().unwrap();
    assert_eq!(parallel, sequential);
}

#[test]
fn test_iterate_ax_on_built_input() {
    let input = single_year_input();
    let outcome = iterate_ax().table(&input).call().unwrap();
    assert!(outcome.converged());
    assert!(outcome.warning.is_none());
    assert!(!outcome.history.is_empty());
    assert_eq!(outcome.table.n_rows(), input.n_rows());
}
