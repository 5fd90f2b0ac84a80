//! # Errors
//!
//! Every fallible operation in the crate returns [`LTResult`], whose error side is
//! [`LifeTableError`]. Converters and estimators fail fast on the first bad row;
//! the builder and aggregator attach the offending group and age to
//! [`LifeTableError::Domain`] before passing it on; the validator gathers every
//! violated check into a single [`ValidationReport`].
//!
//! Non-convergence of the iterative ax estimator is not an error: it is reported
//! as a [`ConvergenceWarning`] alongside the last iterate.

use polars::prelude::PolarsError;
use std::fmt;

/// Result type used throughout the crate.
pub type LTResult<T> = Result<T, LifeTableError>;

/// Errors produced by life table operations.
#[derive(Debug, thiserror::Error)]
pub enum LifeTableError {
    /// Malformed or missing columns, bad grouping, age mapping mismatch.
    #[error("configuration error: {0}")]
    Config(String),

    /// Out-of-range numeric input or output of a single-row formula.
    ///
    /// `context` is empty when raised by a converter and gains the age and group
    /// key, outermost first, as the builder or aggregator re-raises it.
    #[error("domain error{}: {message}", fmt_context(.context))]
    Domain {
        message: String,
        context: Vec<String>,
    },

    /// Post-hoc invariant violations, all of them.
    #[error("{0}")]
    Validation(ValidationReport),

    /// A categorical value with no matching branch, e.g. sex = "both" for under-5 ax.
    #[error("unsupported category: {0}")]
    UnsupportedCategory(String),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    /// Builder parameters rejected by `garde`.
    #[error("invalid parameters: {0}")]
    Params(#[from] garde::Report),
}

impl LifeTableError {
    pub fn config(message: impl Into<String>) -> Self {
        LifeTableError::Config(message.into())
    }

    pub fn domain(message: impl Into<String>) -> Self {
        LifeTableError::Domain {
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Tag a domain error with where it happened. Other variants pass through.
    pub fn with_context(self, context: impl fmt::Display) -> Self {
        match self {
            LifeTableError::Domain {
                message,
                context: mut stack,
            } => {
                stack.insert(0, context.to_string());
                LifeTableError::Domain {
                    message,
                    context: stack,
                }
            }
            other => other,
        }
    }

    pub fn is_domain(&self) -> bool {
        matches!(self, LifeTableError::Domain { .. })
    }

    pub fn is_config(&self) -> bool {
        matches!(self, LifeTableError::Config(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, LifeTableError::Validation(_))
    }

    pub fn is_unsupported_category(&self) -> bool {
        matches!(self, LifeTableError::UnsupportedCategory(_))
    }
}

fn fmt_context(context: &[String]) -> String {
    if context.is_empty() {
        String::new()
    } else {
        format!(" [{}]", context.join(", "))
    }
}

/// Every invariant violation found in one validation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub issues: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: impl Into<String>) {
        self.issues.push(issue.into());
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// `Ok(())` when nothing was found, otherwise the whole report as an error.
    pub fn into_result(self) -> LTResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(LifeTableError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "life table validation failed with {} issue(s)", self.len())?;
        for issue in &self.issues {
            write!(f, "\n  - {issue}")?;
        }
        Ok(())
    }
}

/// Iterative ax refinement hit its iteration cap before reaching tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceWarning {
    pub iterations: u32,
    pub max_change: f64,
    pub tol: f64,
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ax did not converge after {} iterations (max change {:e} > tolerance {:e})",
            self.iterations, self.max_change, self.tol
        )
    }
}
