use super::interval::AgeInterval;
use super::{LifeTable, LifeTableGroup, LifeTableRow, Param};
use crate::error::{LTResult, LifeTableError};
use polars::prelude::*;
use std::collections::HashMap;

// ================================================
// PUBLIC FUNCTIONS
// ================================================

pub(super) fn table_from_df(df: &DataFrame, id_cols: &[&str]) -> LTResult<LifeTable> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let has = |name: &str| names.iter().any(|n| n == name);

    if !has("age_start") {
        return Err(LifeTableError::config("missing required column 'age_start'"));
    }
    if let Some(missing) = id_cols.iter().find(|c| !has(c)) {
        return Err(LifeTableError::config(format!(
            "missing identifying column '{missing}'"
        )));
    }

    let age_start = f64_column(df, "age_start")?;
    let age_end: Vec<Option<f64>> = if has("age_end") {
        f64_column(df, "age_end")?
    } else if has("age_length") {
        // start + length, with a null length meaning an open interval
        f64_column(df, "age_length")?
            .into_iter()
            .zip(&age_start)
            .map(|(length, start)| Some(start.unwrap_or(f64::NAN) + length.unwrap_or(f64::INFINITY)))
            .collect()
    } else {
        return Err(LifeTableError::config(
            "missing column 'age_end' (or 'age_length')",
        ));
    };

    let mut params: Vec<(Param, Vec<Option<f64>>)> = Vec::new();
    for param in Param::ALL {
        if has(param.name()) {
            params.push((param, f64_column(df, param.name())?));
        }
    }

    let mut keys: Vec<Vec<String>> = vec![Vec::with_capacity(id_cols.len()); df.height()];
    let mut id_dtypes = Vec::with_capacity(id_cols.len());
    for id_col in id_cols {
        let (values, dtype) = key_column(df, id_col)?;
        for (key, value) in keys.iter_mut().zip(values) {
            key.push(value);
        }
        id_dtypes.push(dtype);
    }

    // Group rows in order of first appearance
    let mut index: HashMap<Vec<String>, usize> = HashMap::new();
    let mut groups: Vec<LifeTableGroup> = Vec::new();
    for (i, key) in keys.into_iter().enumerate() {
        let start = age_start[i].ok_or_else(|| {
            LifeTableError::config(format!("null 'age_start' at row {i}"))
        })?;
        let end = age_end[i].unwrap_or(f64::INFINITY);
        let mut row = LifeTableRow::new(AgeInterval::new(start, end)?);
        for (param, values) in &params {
            row.set(*param, values[i]);
        }

        let position = *index.entry(key.clone()).or_insert_with(|| {
            groups.push(LifeTableGroup::new(key, Vec::new()));
            groups.len() - 1
        });
        groups[position].rows.push(row);
    }

    let id_cols = id_cols.iter().map(|c| c.to_string()).collect();
    LifeTable::with_dtypes(id_cols, id_dtypes, groups)
}

pub(super) fn table_to_df(table: &LifeTable) -> LTResult<DataFrame> {
    let rows: Vec<(&LifeTableGroup, &LifeTableRow)> = table
        .groups()
        .iter()
        .flat_map(|g| g.rows.iter().map(move |r| (g, r)))
        .collect();

    let mut columns: Vec<Column> = Vec::new();
    for (j, (name, dtype)) in table.id_cols().iter().zip(table.id_dtypes()).enumerate() {
        let values: Vec<&str> = rows.iter().map(|(g, _)| g.key[j].as_str()).collect();
        let series = Series::new(name.as_str().into(), values).cast(dtype)?;
        columns.push(series.into_column());
    }

    let age_start: Vec<f64> = rows.iter().map(|(_, r)| r.interval.start).collect();
    let age_end: Vec<f64> = rows.iter().map(|(_, r)| r.interval.end).collect();
    columns.push(Series::new("age_start".into(), age_start).into_column());
    columns.push(Series::new("age_end".into(), age_end).into_column());

    for param in Param::ALL {
        let values: Vec<Option<f64>> = rows.iter().map(|(_, r)| r.get(param)).collect();
        if values.iter().any(Option::is_some) {
            columns.push(Series::new(param.name().into(), values).into_column());
        }
    }

    Ok(DataFrame::new(columns)?)
}

// ================================================
// PRIVATE FUNCTIONS
// ================================================

fn f64_column(df: &DataFrame, name: &str) -> LTResult<Vec<Option<f64>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    let values = series.f64()?.into_iter().collect();
    Ok(values)
}

fn key_column(df: &DataFrame, name: &str) -> LTResult<(Vec<String>, DataType)> {
    let series = df.column(name)?.as_materialized_series();
    let dtype = series.dtype().clone();
    let as_string = series.cast(&DataType::String)?;
    let values = as_string
        .str()?
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            value.map(str::to_string).ok_or_else(|| {
                LifeTableError::config(format!("null in identifying column '{name}' at row {i}"))
            })
        })
        .collect::<LTResult<Vec<_>>>()?;
    Ok((values, dtype))
}
