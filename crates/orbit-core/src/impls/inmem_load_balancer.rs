//! In-memory load balancers, tagged by environment name.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::ApiError;
use crate::ports::LoadBalancerApi;

#[derive(Default)]
struct InMemoryLoadBalancerState {
    /// `(name, env tag)`
    balancers: Vec<(String, String)>,
    failures: VecDeque<ApiError>,
    calls: usize,
}

#[derive(Default)]
pub struct InMemoryLoadBalancers {
    state: Mutex<InMemoryLoadBalancerState>,
}

impl InMemoryLoadBalancers {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, name: impl Into<String>, env_name: impl Into<String>) {
        let mut st = self.state.lock().await;
        st.balancers.push((name.into(), env_name.into()));
    }

    pub async fn fail_next(&self, err: ApiError) {
        self.state.lock().await.failures.push_back(err);
    }

    pub async fn remaining(&self) -> usize {
        self.state.lock().await.balancers.len()
    }

    pub async fn calls(&self) -> usize {
        self.state.lock().await.calls
    }
}

#[async_trait]
impl LoadBalancerApi for InMemoryLoadBalancers {
    async fn delete_environment_load_balancers(&self, env_name: &str) -> Result<usize, ApiError> {
        let mut st = self.state.lock().await;
        st.calls += 1;
        if let Some(err) = st.failures.pop_front() {
            return Err(err);
        }
        let before = st.balancers.len();
        st.balancers.retain(|(_, env)| env != env_name);
        Ok(before - st.balancers.len())
    }
}
