//! LoadBalancerApi port.

use async_trait::async_trait;

use crate::domain::ApiError;

#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    /// Delete every load balancer tagged with `env_name`; returns how many went away.
    async fn delete_environment_load_balancers(&self, env_name: &str) -> Result<usize, ApiError>;
}
