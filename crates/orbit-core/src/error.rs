use thiserror::Error;

use crate::domain::{ApiError, BuildId, BuildStatus, PlanError};

#[derive(Debug, Error)]
pub enum OrbitError {
    /// The build service refused to start a build.
    #[error("failed to start build: {0}")]
    Executor(#[source] ApiError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("build {build_id} finished with status {status}")]
    BuildFailed {
        build_id: BuildId,
        status: BuildStatus,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("configuration: {0}")]
    Config(String),

    #[error("serialization: {0}")]
    Serialization(String),

    #[error("worker task failed to join: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl OrbitError {
    /// The provider error underneath, if any.
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            OrbitError::Api(e) | OrbitError::Executor(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PlanError> for OrbitError {
    fn from(e: PlanError) -> Self {
        match e {
            PlanError::MissingOutput(_) => OrbitError::NotFound(e.to_string()),
            other => OrbitError::Config(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for OrbitError {
    fn from(e: serde_json::Error) -> Self {
        OrbitError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for OrbitError {
    fn from(e: serde_yaml::Error) -> Self {
        OrbitError::Serialization(e.to_string())
    }
}

impl From<figment::Error> for OrbitError {
    fn from(e: figment::Error) -> Self {
        OrbitError::Config(e.to_string())
    }
}
