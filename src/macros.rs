/// Macro to create a LifeTable from column vectors, optionally grouped by id columns.
/// Usage:
/// ```rust
/// # use rslifetable::prelude::*;
/// let table = ltdf! {
///     id_cols: ["sex"];
///     "sex" => ["female", "female"],
///     "age_start" => [0.0, 1.0],
///     "age_end" => [1.0, f64::INFINITY],
///     "mx" => [0.004_f64, 0.05],
/// }?;
/// assert_eq!(table.id_cols(), ["sex"]);
///
/// let ungrouped = ltdf! {
///     "age_start" => [0.0, 5.0],
///     "age_end" => [5.0, f64::INFINITY],
///     "qx" => [0.01_f64, 1.0],
/// }?;
/// assert!(ungrouped.id_cols().is_empty());
/// # LTResult::Ok(())
/// ```
#[macro_export]
macro_rules! ltdf {
    (id_cols: [$($id:expr),* $(,)?]; $($name:expr => $val:expr),+ $(,)?) => {{
        use $crate::table::LifeTable;
        use polars::prelude::df;
        let df_result = df! { $($name => $val),+ };
        match df_result {
            Ok(df) => LifeTable::from_df(&df, &[$($id),*]),
            Err(e) => Err(e.into()),
        }
    }};
    ($($name:expr => $val:expr),+ $(,)?) => {
        $crate::ltdf!(id_cols: []; $($name => $val),+)
    };
}
