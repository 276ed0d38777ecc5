pub mod qeskf;
pub mod qint;
pub mod vekf;

pub use qeskf::QuaternionEskf;
pub use qint::QuaternionIntegrator;
pub use vekf::VectorEkf;

use thiserror::Error;

/// Recoverable numerical failures inside a filter step.
///
/// A failed step leaves the filter state untouched; the driver decides
/// whether to keep feeding samples or reset the estimator.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterError {
    #[error("innovation covariance is singular")]
    SingularInnovation,

    #[error("non-finite {0} after step")]
    NonFinite(&'static str),
}

pub type FilterResult<T> = Result<T, FilterError>;
