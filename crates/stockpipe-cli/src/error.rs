use stockpipe_core::{ExtractError, PipelineError, ValidationError, WarehouseError};
use stockpipe_warehouse::TransformError;
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Extract(ExtractError::Validation(_)) => 2,
            Self::Warehouse(WarehouseError::QueryRejected(_)) => 2,
            Self::Warehouse(WarehouseError::InvalidIdentifier { .. }) => 2,
            Self::Pipeline(_) | Self::Extract(_) | Self::Transform(_) | Self::Warehouse(_) => 3,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}
