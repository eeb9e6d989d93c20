use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("cycle detected in fragment graph at major fragment {major_id}")]
    Cycle { major_id: u32 },

    #[error("width constraints unsatisfiable for major fragment {major_id}: {detail}")]
    WidthUnsatisfiable { major_id: u32, detail: String },

    #[error("major fragment {major_id} is pinned to endpoint {endpoint} which is not active")]
    UnavailablePinnedEndpoint { major_id: u32, endpoint: String },

    #[error("materialized root of major fragment {major_id} is not a fragment root operator")]
    RootTypeMismatch { major_id: u32 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("root fragment must have width 1, got {width}")]
    RootWidth { width: usize },

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("unknown function: {name}")]
    UnknownFunction { name: String },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PlannerError>;
