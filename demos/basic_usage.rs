//! # RSLifeTable Basic Usage Example
//!
//! This example demonstrates the basic usage of the rslifetable crate:
//! building abridged life tables from mortality rates, converting single
//! parameters, and aggregating a single-year table.

use rslifetable::prelude::*;

fn main() -> LTResult<()> {
    env_logger::init();

    println!("RSLifeTable Basic Usage Example");
    println!("===============================");
    println!();

    // Abridged mortality rates for two sexes
    println!("Building abridged life tables...");
    let starts = [0.0, 1.0, 5.0, 10.0, 15.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0];
    let male_mx = [0.025, 0.0012, 0.0004, 0.0003, 0.0009, 0.0015, 0.002, 0.0035, 0.008, 0.02, 0.05, 0.15];
    let female_mx = [0.02, 0.001, 0.0003, 0.0002, 0.0004, 0.0006, 0.0009, 0.002, 0.005, 0.012, 0.035, 0.12];

    let ends = gen_age_end(&starts)?;
    let input = ltdf! {
        id_cols: ["sex"];
        "sex" => [vec!["male"; starts.len()], vec!["female"; starts.len()]].concat(),
        "age_start" => [starts.to_vec(), starts.to_vec()].concat(),
        "age_end" => [ends.clone(), ends].concat(),
        "mx" => [male_mx.to_vec(), female_mx.to_vec()].concat(),
    }?;

    let table = lifetable()
        .table(&input)
        .radix(100_000.0)
        .sex_col("sex")
        .call()?;

    for group in table.groups() {
        let e0 = group.rows[0].ex.unwrap_or(f64::NAN);
        println!("  {}: e0 = {e0:.2}", table.group_label(group));
    }
    println!();
    println!("{}", table.to_df()?);
    println!();

    // Single conversions
    println!("Parameter conversions for a 5-year interval with mx = 0.01:");
    let ax = mx_to_ax(0.01, 5.0)?;
    let qx = mx_ax_to_qx(0.01, ax, 5.0)?;
    println!("  ax = {ax:.6}, qx = {qx:.6}, qx (constant hazard) = {:.6}", mx_to_qx(0.01, 5.0)?);
    println!();

    // Single-year table collapsed to abridged ages
    println!("Aggregating a single-year table to abridged ages...");
    let single_starts: Vec<f64> = (0..=90).map(f64::from).collect();
    let single_ends = gen_age_end(&single_starts)?;
    let single_mx: Vec<f64> = single_starts
        .iter()
        .map(|x| 0.0003 + 0.00004 * (0.09 * x).exp())
        .collect();
    let single = ltdf! {
        "age_start" => single_starts,
        "age_end" => single_ends,
        "mx" => single_mx,
    }?;
    let single_table = lifetable().table(&single).call()?;
    let abridged = agg_lt()
        .table(&single_table)
        .mapping(&AgeMapping::abridged(90)?)
        .call()?;
    println!("{}", abridged.to_df()?);

    // Iterative ax refinement on its own
    let outcome = iterate_ax().table(&single).call()?;
    println!(
        "ax iteration: {} rounds, converged = {}",
        outcome.iterations,
        outcome.converged()
    );

    Ok(())
}
