//! # RSLifeTable
//!
//! Demographic life tables in Rust: derive complete period life tables from
//! age-specific mortality rates, convert between life table parameters, estimate
//! the average years lived by those dying in each interval, and move tables
//! between single-year and abridged age structures.
//!
//! ## Features
//! - **Parameter Converters**: closed-form `mx`, `qx` and `ax` conversions, scalar and elementwise
//! - **ax Estimation**: constant-hazard closed form, Coale-Demeny under-5 regression, Keyfitz iteration
//! - **Life Table Builder**: `mx → ax → qx → px → lx → dx → nLx → Tx → ex`, group by group
//! - **Aggregation**: collapse fine ages into coarse ones, split or rescale qx the other way
//! - **Validation**: every structural and numeric invariant checked and reported at once
//! - **Builder Pattern**: all entry points use builder-style calls with parameter validation
//! - **Polars Interop**: tables go in and out as `DataFrame`s grouped by identifying columns
//!
//! ## Quick Start
//!
//! ```rust
//! use rslifetable::prelude::*;
//!
//! let input = ltdf! {
//!     id_cols: ["sex"];
//!     "sex" => ["male"; 5],
//!     "age_start" => [0.0, 1.0, 5.0, 10.0, 15.0],
//!     "age_end" => [1.0, 5.0, 10.0, 15.0, f64::INFINITY],
//!     "mx" => [0.03, 0.004, 0.001, 0.0012, 0.08],
//! }?;
//!
//! // Coale-Demeny for infants, iteration elsewhere, radix 100,000
//! let table = lifetable()
//!     .table(&input)
//!     .radix(100_000.0)
//!     .sex_col("sex")
//!     .call()?;
//!
//! let e0 = table.groups()[0].rows[0].ex.unwrap();
//! println!("Life expectancy at birth: {e0:.2}");
//!
//! // Back to a DataFrame with every column filled in
//! let df = table.to_df()?;
//! assert_eq!(df.height(), 5);
//! # LTResult::Ok(())
//! ```
//!
//! ## Supported Functions
//!
//! - **Converters**: `mx_to_qx`, `mx_ax_to_qx`, `qx_to_mx`, `mx_qx_to_ax`, `qx_ax_to_mx`, `mx_to_ax` (and `_vec` forms)
//! - **ax**: `gen_u5_ax`, `iterate_ax`
//! - **Builder**: `lifetable`, plus the steps `gen_qx_from_mx_ax`, `gen_px_from_qx`, `gen_lx_from_qx`, `gen_dx_from_lx`, `gen_nLx`, `gen_Tx`, `gen_ex`, `gen_qx_from_lx`
//! - **Aggregation**: `agg_lt`, `split_qx`, `scale_qx`
//! - **Validation**: `validate_lifetable`
//!
//! ## Notes
//! - Intervals are half-open `[age_start, age_end)`; the last one of every group is open-ended
//! - Groups are independent and processed in parallel with rayon
//! - Failures carry the group key and age where the computation broke

#[macro_use]
mod macros;

pub mod aggregate;
pub mod ax;
pub mod convert;
pub mod error;
pub mod lifetable;
pub mod params;
pub mod prelude;
pub mod table;
pub mod validate;

pub use error::{LTResult, LifeTableError};
