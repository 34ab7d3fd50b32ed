//! In-memory parameter store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::ApiError;
use crate::ports::ParameterStore;
use crate::ports::parameter_store::parameter_not_found;

#[derive(Default)]
pub struct InMemoryParameterStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl InMemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn names(&self) -> Vec<String> {
        self.values.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ParameterStore for InMemoryParameterStore {
    async fn put(&self, name: &str, value: &str) -> Result<(), ApiError> {
        self.values
            .lock()
            .await
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<String, ApiError> {
        self.values
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| parameter_not_found(name))
    }
}
