//! ParameterStore port - 小さな JSON レコードの保存先

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{ApiError, Service};
use crate::error::OrbitError;

#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Create or overwrite.
    async fn put(&self, name: &str, value: &str) -> Result<(), ApiError>;

    /// `ParameterNotFound` when absent.
    async fn get(&self, name: &str) -> Result<String, ApiError>;
}

pub fn parameter_not_found(name: &str) -> ApiError {
    ApiError::new(
        Service::Ssm,
        "ParameterNotFound",
        format!("Parameter {name} not found."),
    )
}

/// `None` when the parameter does not exist.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn ParameterStore,
    name: &str,
) -> Result<Option<T>, OrbitError> {
    match store.get(name).await {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(e) if e.code == "ParameterNotFound" => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn put_json<T: Serialize + Sync>(
    store: &dyn ParameterStore,
    name: &str,
    value: &T,
) -> Result<(), OrbitError> {
    let raw = serde_json::to_string(value)?;
    store.put(name, &raw).await?;
    Ok(())
}
