//! Team - チームスタックのデプロイ
//!
//! 環境コンテキストを読み、プランを作り、スタックエンジンに渡し、
//! 返ってきた出力をパラメータレコードとして保存します。

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::OrbitConfig;
use crate::domain::team::{
    environment_context_parameter_name, team_parameter_name, user_profiles_parameter_name,
};
use crate::domain::{ApiError, EnvironmentContext, StackOutputs, TeamParameters, TeamStackPlan};
use crate::error::OrbitError;
use crate::ports::parameter_store::{get_json, put_json};
use crate::ports::{Clock, ParameterStore, StackEngine};
use crate::retry::RetryPolicy;

const EMPTY_PROFILES: &str = "[]";

/// Read the context record the environment deploy left behind.
pub(crate) async fn load_environment_context(
    parameters: &dyn ParameterStore,
    env_name: &str,
) -> Result<EnvironmentContext, OrbitError> {
    let name = environment_context_parameter_name(env_name);
    get_json(parameters, &name)
        .await?
        .ok_or_else(|| OrbitError::Config(format!("environment context {name} not found")))
}

pub struct TeamDeployer {
    engine: Arc<dyn StackEngine>,
    parameters: Arc<dyn ParameterStore>,
    clock: Arc<dyn Clock>,
    config: Arc<OrbitConfig>,
}

impl TeamDeployer {
    pub fn new(
        engine: Arc<dyn StackEngine>,
        parameters: Arc<dyn ParameterStore>,
        clock: Arc<dyn Clock>,
        config: Arc<OrbitConfig>,
    ) -> Self {
        Self {
            engine,
            parameters,
            clock,
            config,
        }
    }

    pub async fn load_context(&self) -> Result<EnvironmentContext, OrbitError> {
        load_environment_context(self.parameters.as_ref(), &self.config.environment.name).await
    }

    /// Deploy one team of the environment recorded in the parameter store.
    pub async fn deploy(&self, team_name: &str) -> Result<TeamParameters, OrbitError> {
        let context = self.load_context().await?;
        self.deploy_with(&context, team_name).await
    }

    pub async fn deploy_with(
        &self,
        context: &EnvironmentContext,
        team_name: &str,
    ) -> Result<TeamParameters, OrbitError> {
        let plan = TeamStackPlan::build(context, team_name)?;
        info!(
            stack = %plan.stack_name,
            resources = plan.resources.len(),
            "deploying team stack"
        );

        let policy = RetryPolicy::from_config(&self.config.retry);
        let outputs: StackOutputs = policy
            .run_if(
                self.clock.as_ref(),
                "deploy_team_stack",
                || self.engine.deploy(&plan),
                ApiError::is_retryable,
            )
            .await?;
        let params = TeamParameters::from_outputs(&outputs)?;

        let team_param = team_parameter_name(&context.name, team_name);
        put_json(self.parameters.as_ref(), &team_param, &params).await?;
        debug!(parameter = %team_param, "team parameters written");

        let profiles = user_profiles_parameter_name(&context.name, team_name);
        if get_json::<serde_json::Value>(self.parameters.as_ref(), &profiles)
            .await?
            .is_none()
        {
            self.parameters.put(&profiles, EMPTY_PROFILES).await?;
            debug!(parameter = %profiles, "user profiles initialised");
        }

        info!(stack = %plan.stack_name, "team stack deployed");
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::team::{fixtures, logical};
    use crate::domain::Service;
    use crate::impls::{FixedClock, InMemoryParameterStore, InMemoryStackEngine};
    use chrono::Utc;

    struct Harness {
        engine: Arc<InMemoryStackEngine>,
        params: Arc<InMemoryParameterStore>,
        deployer: TeamDeployer,
    }

    fn harness() -> Harness {
        let engine = Arc::new(InMemoryStackEngine::new());
        let params = Arc::new(InMemoryParameterStore::new());
        let deployer = TeamDeployer::new(
            engine.clone(),
            params.clone(),
            Arc::new(FixedClock::new(Utc::now())),
            Arc::new(OrbitConfig::default()),
        );
        Harness {
            engine,
            params,
            deployer,
        }
    }

    #[tokio::test]
    async fn deploy_persists_team_record_and_empty_profiles() {
        let h = harness();
        let params = h.deployer.deploy_with(&fixtures::context(), "lake-creator").await.unwrap();

        assert_eq!(params.efs_id, "fs-0123");
        assert_eq!(params.scratch_bucket, "orbit-dev-scratch");
        assert_eq!(params.ecs_cluster_name, "orbit-dev-lake-creator-cluster");

        let raw = h.params.get("/orbit/dev/teams/lake-creator/team").await.unwrap();
        let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored["EfsId"], "fs-0123");
        assert_eq!(
            h.params.get("/orbit/dev/teams/lake-creator/user/profiles").await.unwrap(),
            "[]"
        );
        assert_eq!(h.engine.deployed().await[0].stack_name, "orbit-dev-lake-creator");
    }

    #[tokio::test]
    async fn redeploy_keeps_existing_user_profiles() {
        let h = harness();
        let profiles = r#"[{"slug":"big","description":"8 cpu"}]"#;
        h.params
            .put("/orbit/dev/teams/lake-creator/user/profiles", profiles)
            .await
            .unwrap();

        h.deployer.deploy_with(&fixtures::context(), "lake-creator").await.unwrap();
        h.deployer.deploy_with(&fixtures::context(), "lake-creator").await.unwrap();

        assert_eq!(
            h.params.get("/orbit/dev/teams/lake-creator/user/profiles").await.unwrap(),
            profiles
        );
        assert_eq!(h.engine.deployed().await.len(), 2);
    }

    #[tokio::test]
    async fn missing_context_field_fails_before_deploying() {
        let h = harness();
        let mut ctx = fixtures::context();
        ctx.shared_efs_sg_id = None;

        let err = h.deployer.deploy_with(&ctx, "lake-creator").await.unwrap_err();

        assert!(matches!(err, OrbitError::Config(ref m) if m.contains("SharedEfsSgId")));
        assert!(h.engine.deployed().await.is_empty());
        assert!(h.params.names().await.is_empty());
    }

    #[tokio::test]
    async fn missing_stack_output_is_an_error() {
        let h = harness();
        h.engine.omit_output(logical::ACCESS_POINT).await;
        let err = h
            .deployer
            .deploy_with(&fixtures::context(), "lake-creator")
            .await
            .unwrap_err();
        assert!(matches!(err, OrbitError::NotFound(ref m) if m.contains("efs-ap")));
    }

    #[tokio::test]
    async fn throttled_engine_is_retried() {
        let h = harness();
        h.engine
            .fail_next(ApiError::new(Service::CloudFormation, "Throttling", "Rate exceeded"))
            .await;
        assert!(h.deployer.deploy_with(&fixtures::context(), "lake-creator").await.is_ok());
    }

    #[tokio::test]
    async fn deploy_reads_context_from_parameter_store() {
        let h = harness();
        assert!(matches!(h.deployer.deploy("lake-creator").await, Err(OrbitError::Config(_))));

        put_json(h.params.as_ref(), "/orbit/dev/context", &fixtures::context())
            .await
            .unwrap();
        let params = h.deployer.deploy("lake-creator").await.unwrap();
        assert_eq!(params.team_security_group_id, "orbit-dev-lake-creator-team-sg");
    }
}
