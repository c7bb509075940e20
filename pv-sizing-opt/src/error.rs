use pv_model::sizing::InfeasibilityReport;
use thiserror::Error;

/// Failures of a sizing run
#[derive(Debug, Error)]
pub enum SizingError {
    /// The data source could not deliver a series
    #[error("time series unavailable: {0}")]
    DataUnavailable(String),

    /// A series is malformed or does not line up with the reference series
    #[error("series mismatch: {0}")]
    SeriesMismatch(String),

    #[error("invalid tariff: {0}")]
    InvalidTariff(String),

    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),

    /// Catalog, search bounds or other parameters are inconsistent
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no feasible configuration ({}): {} evaluated, {} over the area limit, {} below the self-sufficiency minimum, {} failed", .0.reason.label(), .0.evaluated, .0.violating_area, .0.violating_self_sufficiency, .0.failed)]
    Infeasible(InfeasibilityReport),
}

pub type Result<T, E = SizingError> = std::result::Result<T, E>;
