use crate::table::Param;
use bon::Builder;
use garde::Validate;

// =======================================
// ITERATIVE AX PARAMETER STRUCT
// =======================================
#[derive(Debug, Clone, Copy, PartialEq, Validate, Builder)]
#[garde(allow_unvalidated)]
pub struct IterateAxParams {
    // Stop once the largest absolute ax change in a round falls below this
    #[garde(custom(validate_positive_finite))]
    #[builder(default = 1e-9)]
    pub tol: f64,

    // Rounds allowed before giving up with a convergence warning
    #[garde(range(min = 1, max = 100_000))]
    #[builder(default = 100)]
    pub max_iter: u32,

    // Rows starting below this age keep their ax (e.g. 5.0 after under-5 ax)
    #[garde(range(min = 0.0))]
    #[builder(default = 0.0)]
    pub hold_below: f64,
}

impl Default for IterateAxParams {
    fn default() -> Self {
        Self {
            tol: 1e-9,
            max_iter: 100,
            hold_below: 0.0,
        }
    }
}

// =======================================
// LIFE TABLE BUILDER PARAMETER STRUCT
// =======================================
#[derive(Debug, Clone, Validate, Builder)]
#[garde(allow_unvalidated)]
pub struct LifeTableParams {
    // Identifying columns of the table being built
    pub id_cols: Vec<String>,

    // lx at the first age
    #[garde(custom(validate_positive_finite))]
    pub radix: f64,

    // Identifying column holding sex, enables Coale-Demeny under-5 ax
    pub sex_col: Option<String>,

    #[garde(dive)]
    pub iteration: IterateAxParams,
}

impl LifeTableParams {
    /// Validate with cross-field validation using Result<(), garde::Report>
    pub fn validate_all(&self) -> Result<(), garde::Report> {
        self.validate()?;

        let mut report = garde::Report::new();
        if let Some(sex_col) = &self.sex_col {
            if !self.id_cols.contains(sex_col) {
                report.append(
                    garde::Path::new("sex_col"),
                    garde::Error::new(format!(
                        "sex column '{sex_col}' must be one of the identifying columns {:?}",
                        self.id_cols
                    )),
                );
            }
        }

        if report.is_empty() {
            Ok(())
        } else {
            Err(report)
        }
    }
}

// =======================================
// VALIDATOR PARAMETER STRUCT
// =======================================
#[derive(Debug, Clone, Validate, Builder)]
#[garde(allow_unvalidated)]
pub struct ValidationParams {
    // Parameters every row must carry
    #[builder(default)]
    pub required: Vec<Param>,

    // Absolute tolerance for sums and monotonicity
    #[garde(custom(validate_positive_finite))]
    #[builder(default = 1e-8)]
    pub tol: f64,
}

impl Default for ValidationParams {
    fn default() -> Self {
        Self {
            required: Vec::new(),
            tol: 1e-8,
        }
    }
}

// =======================================
// PRIVATE FUNCTIONS
// =======================================

fn validate_positive_finite(value: &f64, _context: &()) -> garde::Result {
    if !value.is_finite() || *value <= 0.0 {
        return Err(garde::Error::new(format!(
            "value must be positive and finite, got {value}"
        )));
    }
    Ok(())
}
