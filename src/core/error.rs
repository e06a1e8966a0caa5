//! Per-instrument failure types.

use thiserror::Error;

use crate::core::validation::DataIntegrityError;
use crate::db::StoreError;
use crate::models::{FailureKind, Stage};
use crate::services::FetchError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    DataIntegrity(#[from] DataIntegrityError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("indicator computation failed: {0}")]
    Compute(String),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Fetch(_) => FailureKind::Fetch,
            Self::DataIntegrity(_) => FailureKind::DataIntegrity,
            Self::Store(_) => FailureKind::Write,
            Self::Compute(_) => FailureKind::Compute,
        }
    }
}

/// A `PipelineError` tagged with the stage it interrupted.
#[derive(Debug, Error)]
#[error("{source} (during {stage:?})")]
pub struct UnitError {
    pub stage: Stage,
    #[source]
    pub source: PipelineError,
}

pub trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, UnitError>;
}

impl<T, E> AtStage<T> for Result<T, E>
where
    E: Into<PipelineError>,
{
    fn at(self, stage: Stage) -> Result<T, UnitError> {
        self.map_err(|e| UnitError {
            stage,
            source: e.into(),
        })
    }
}
