//! # Life Table Data
//!
//! In-memory life tables: rows of age intervals carrying any subset of the life
//! table parameters, grouped by caller-chosen identifying columns (`id_cols`).
//!
//! Tables travel in and out of the crate as polars [`DataFrame`]s using the column
//! names `age_start`, `age_end` (or `age_length`), `mx`, `ax`, `qx`, `px`, `lx`,
//! `dx`, `nLx`, `Tx` and `ex`, next to the identifying columns.
//!
//! ## Quick Start
//! ```rust
//! # use rslifetable::prelude::*;
//! use polars::prelude::*;
//! let df = df! {
//!     "sex" => ["male", "male", "male"],
//!     "age_start" => [0.0, 1.0, 5.0],
//!     "age_end" => [1.0, 5.0, f64::INFINITY],
//!     "mx" => [0.02, 0.002, 0.1],
//! }?;
//! let table = LifeTable::from_df(&df, &["sex"])?;
//! assert_eq!(table.groups().len(), 1);
//! assert_eq!(table.groups()[0].rows.len(), 3);
//! let back = table.to_df()?;
//! assert_eq!(back.height(), 3);
//! # LTResult::Ok(())
//! ```

#![allow(non_snake_case)]

mod frame;
pub mod interval;

use self::interval::AgeInterval;
use crate::error::{LTResult, LifeTableError};
use polars::prelude::{DataFrame, DataType};

// ===============================================
// LIFE TABLE PARAMETERS
// ===============================================

/// Life table parameters, in derivation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    /// Mortality rate ₙmₓ.
    Mx,
    /// Average years lived in the interval by those dying in it, ₙaₓ.
    Ax,
    /// Probability of death ₙqₓ.
    Qx,
    /// Probability of survival ₙpₓ.
    Px,
    /// Survivorship lₓ.
    Lx,
    /// Proportion dying ₙdₓ.
    Dx,
    /// Person-years lived in the interval ₙLₓ.
    NLx,
    /// Person-years lived above age x, Tₓ.
    Tx,
    /// Life expectancy eₓ.
    Ex,
}

impl Param {
    pub const ALL: [Param; 9] = [
        Param::Mx,
        Param::Ax,
        Param::Qx,
        Param::Px,
        Param::Lx,
        Param::Dx,
        Param::NLx,
        Param::Tx,
        Param::Ex,
    ];

    /// Column name in the DataFrame representation.
    pub fn name(&self) -> &'static str {
        match self {
            Param::Mx => "mx",
            Param::Ax => "ax",
            Param::Qx => "qx",
            Param::Px => "px",
            Param::Lx => "lx",
            Param::Dx => "dx",
            Param::NLx => "nLx",
            Param::Tx => "Tx",
            Param::Ex => "ex",
        }
    }
}

// ===============================================
// ROWS AND GROUPS
// ===============================================

/// One age interval and whichever parameters are known for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifeTableRow {
    pub interval: AgeInterval,
    pub mx: Option<f64>,
    pub ax: Option<f64>,
    pub qx: Option<f64>,
    pub px: Option<f64>,
    pub lx: Option<f64>,
    pub dx: Option<f64>,
    pub nLx: Option<f64>,
    pub Tx: Option<f64>,
    pub ex: Option<f64>,
}

impl LifeTableRow {
    pub fn new(interval: AgeInterval) -> Self {
        Self {
            interval,
            mx: None,
            ax: None,
            qx: None,
            px: None,
            lx: None,
            dx: None,
            nLx: None,
            Tx: None,
            ex: None,
        }
    }

    pub fn age_start(&self) -> f64 {
        self.interval.start
    }

    pub fn age_length(&self) -> f64 {
        self.interval.length()
    }

    pub fn is_terminal(&self) -> bool {
        self.interval.is_terminal()
    }

    pub fn get(&self, param: Param) -> Option<f64> {
        match param {
            Param::Mx => self.mx,
            Param::Ax => self.ax,
            Param::Qx => self.qx,
            Param::Px => self.px,
            Param::Lx => self.lx,
            Param::Dx => self.dx,
            Param::NLx => self.nLx,
            Param::Tx => self.Tx,
            Param::Ex => self.ex,
        }
    }

    pub fn set(&mut self, param: Param, value: Option<f64>) {
        let slot = match param {
            Param::Mx => &mut self.mx,
            Param::Ax => &mut self.ax,
            Param::Qx => &mut self.qx,
            Param::Px => &mut self.px,
            Param::Lx => &mut self.lx,
            Param::Dx => &mut self.dx,
            Param::NLx => &mut self.nLx,
            Param::Tx => &mut self.Tx,
            Param::Ex => &mut self.ex,
        };
        *slot = value;
    }

    /// Value of a parameter that must be present.
    pub fn require(&self, param: Param) -> LTResult<f64> {
        self.get(param).ok_or_else(|| {
            LifeTableError::config(format!(
                "missing '{}' for {}",
                param.name(),
                self.interval
            ))
        })
    }
}

/// Rows sharing one combination of identifying values, in age order.
#[derive(Debug, Clone, PartialEq)]
pub struct LifeTableGroup {
    /// One value per identifying column, in `id_cols` order.
    pub key: Vec<String>,
    pub rows: Vec<LifeTableRow>,
}

impl LifeTableGroup {
    pub fn new(key: Vec<String>, rows: Vec<LifeTableRow>) -> Self {
        Self { key, rows }
    }

    pub fn intervals(&self) -> Vec<AgeInterval> {
        self.rows.iter().map(|r| r.interval).collect()
    }

    /// Whether every row carries the parameter.
    pub fn has(&self, param: Param) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|r| r.get(param).is_some())
    }

    /// Values of a parameter for every row, failing on the first gap.
    pub fn values(&self, param: Param) -> LTResult<Vec<f64>> {
        self.rows.iter().map(|r| r.require(param)).collect()
    }

    /// Row whose interval starts at `age_start`.
    pub fn row_at(&self, age_start: f64) -> Option<&LifeTableRow> {
        self.rows.iter().find(|r| r.age_start() == age_start)
    }
}

// ===============================================
// LIFE TABLE
// ===============================================

/// A set of life table groups sharing the same identifying columns.
#[derive(Debug, Clone, PartialEq)]
pub struct LifeTable {
    id_cols: Vec<String>,
    id_dtypes: Vec<DataType>,
    groups: Vec<LifeTableGroup>,
}

impl LifeTable {
    /// Assemble a table from groups. Identifying values are kept as strings.
    pub fn new(id_cols: Vec<String>, groups: Vec<LifeTableGroup>) -> LTResult<Self> {
        let id_dtypes = vec![DataType::String; id_cols.len()];
        Self::with_dtypes(id_cols, id_dtypes, groups)
    }

    pub(crate) fn with_dtypes(
        id_cols: Vec<String>,
        id_dtypes: Vec<DataType>,
        groups: Vec<LifeTableGroup>,
    ) -> LTResult<Self> {
        if let Some(group) = groups.iter().find(|g| g.key.len() != id_cols.len()) {
            return Err(LifeTableError::config(format!(
                "group key {:?} does not match id columns {:?}",
                group.key, id_cols
            )));
        }
        Ok(Self {
            id_cols,
            id_dtypes,
            groups,
        })
    }

    /// Read a table from a DataFrame, grouping rows by `id_cols`.
    ///
    /// Groups keep the order in which they first appear and rows keep their input
    /// order. A null `age_end` marks an open-ended interval.
    ///
    /// # Errors
    /// - `age_start` missing, or both `age_end` and `age_length` missing
    /// - an identifying column missing or containing nulls
    /// - a parameter column that cannot be read as floating point
    pub fn from_df(df: &DataFrame, id_cols: &[&str]) -> LTResult<Self> {
        frame::table_from_df(df, id_cols)
    }

    /// Write the table back to a DataFrame, one row per group and interval.
    ///
    /// Identifying columns get their input dtype back; parameters absent from
    /// every row are left out.
    pub fn to_df(&self) -> LTResult<DataFrame> {
        frame::table_to_df(self)
    }

    pub fn id_cols(&self) -> &[String] {
        &self.id_cols
    }

    pub fn groups(&self) -> &[LifeTableGroup] {
        &self.groups
    }

    pub fn into_groups(self) -> Vec<LifeTableGroup> {
        self.groups
    }

    /// Group with the given identifying values.
    pub fn group(&self, key: &[&str]) -> Option<&LifeTableGroup> {
        self.groups
            .iter()
            .find(|g| g.key.iter().map(String::as_str).eq(key.iter().copied()))
    }

    pub fn n_rows(&self) -> usize {
        self.groups.iter().map(|g| g.rows.len()).sum()
    }

    /// Whether every row of every group carries the parameter.
    pub fn has(&self, param: Param) -> bool {
        !self.groups.is_empty() && self.groups.iter().all(|g| g.has(param))
    }

    /// Position of an identifying column.
    pub fn id_index(&self, id_col: &str) -> Option<usize> {
        self.id_cols.iter().position(|c| c == id_col)
    }

    /// Same identifying columns, new groups.
    pub fn with_groups(&self, groups: Vec<LifeTableGroup>) -> LTResult<Self> {
        Self::with_dtypes(self.id_cols.clone(), self.id_dtypes.clone(), groups)
    }

    /// Human readable group key, e.g. `sex=male, year=2000`.
    pub fn group_label(&self, group: &LifeTableGroup) -> String {
        if self.id_cols.is_empty() {
            return "all rows".to_string();
        }
        self.id_cols
            .iter()
            .zip(&group.key)
            .map(|(col, value)| format!("{col}={value}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub(crate) fn id_dtypes(&self) -> &[DataType] {
        &self.id_dtypes
    }
}

// ================================================
// UNIT TESTS
// ================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn row(start: f64, end: f64, qx: f64) -> LifeTableRow {
        let mut row = LifeTableRow::new(AgeInterval::new(start, end).unwrap());
        row.qx = Some(qx);
        row
    }

    #[test]
    fn test_row_get_set() {
        let mut r = row(0.0, 1.0, 0.01);
        assert_eq!(r.get(Param::Qx), Some(0.01));
        r.set(Param::NLx, Some(0.99));
        assert_eq!(r.nLx, Some(0.99));
        assert!(r.require(Param::Mx).unwrap_err().is_config());
    }

    #[test]
    fn test_group_values() {
        let group = LifeTableGroup::new(
            vec!["female".into()],
            vec![row(0.0, 5.0, 0.01), row(5.0, f64::INFINITY, 1.0)],
        );
        assert!(group.has(Param::Qx));
        assert!(!group.has(Param::Ax));
        assert_eq!(group.values(Param::Qx).unwrap(), vec![0.01, 1.0]);
        assert!(group.row_at(5.0).unwrap().is_terminal());
    }

    #[test]
    fn test_table_lookup_and_label() {
        let groups = vec![
            LifeTableGroup::new(
                vec!["male".into(), "2000".into()],
                vec![row(0.0, f64::INFINITY, 1.0)],
            ),
            LifeTableGroup::new(
                vec!["female".into(), "2000".into()],
                vec![row(0.0, f64::INFINITY, 1.0)],
            ),
        ];
        let table = LifeTable::new(vec!["sex".into(), "year".into()], groups).unwrap();
        let female = table.group(&["female", "2000"]).unwrap();
        assert_eq!(table.group_label(female), "sex=female, year=2000");
        assert_eq!(table.id_index("year"), Some(1));
        assert_eq!(table.n_rows(), 2);
        assert!(table.group(&["both", "2000"]).is_none());
    }

    #[test]
    fn test_table_rejects_mismatched_key() {
        let groups = vec![LifeTableGroup::new(
            vec!["male".into()],
            vec![row(0.0, f64::INFINITY, 1.0)],
        )];
        let err = LifeTable::new(vec!["sex".into(), "year".into()], groups).unwrap_err();
        assert!(err.is_config());
    }
}
