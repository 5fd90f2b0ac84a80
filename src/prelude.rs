//! # RSLifeTable Prelude
//!
//! Conveniently re-exports the most common types and functions for life table work.
//! Import this module to access all primary features with a single `use` statement.
//!
//! ## Example
//!
//! ```rust
//! # use rslifetable::prelude::*;
//! use polars::prelude::*;
//! let df = df! {
//!     "age_start" => [0.0, 1.0, 2.0],
//!     "age_end" => [1.0, 2.0, f64::INFINITY],
//!     "mx" => [0.02, 0.001, 0.3],
//!     "ax" => [0.2, 0.5, 3.0],
//! }?;
//! let input = LifeTable::from_df(&df, &[])?;
//! let table = lifetable().table(&input).radix(100_000.0).call()?;
//! validate_lifetable().table(&table).call()?;
//! println!("{}", table.to_df()?);
//! # LTResult::Ok(())
//! ```

// Package Result and error types
pub use crate::error::{ConvergenceWarning, LTResult, LifeTableError, ValidationReport};

// DataFrame construction macro
pub use crate::ltdf;

// Parameter converters
pub use crate::convert::*;

// ax estimation
pub use crate::ax::{IterateAxOutcome, Sex, coale_demeny_u5_ax, gen_u5_ax, iterate_ax};

// Life table builder and its steps
pub use crate::lifetable::*;

// Aggregation and disaggregation
pub use crate::aggregate::{agg_lt, scale_qx, split_qx};

// Validation
pub use crate::validate::validate_lifetable;

// Core life table types and parameter structs
pub use crate::params::{IterateAxParams, LifeTableParams, ValidationParams};
pub use crate::table::interval::{AgeInterval, AgeMapping, gen_age_end, gen_age_length};
pub use crate::table::{LifeTable, LifeTableGroup, LifeTableRow, Param};

// Most commonly used Polars types for working with life tables
pub use polars::prelude::{DataFrame, LazyFrame, PolarsError, PolarsResult, Series};
