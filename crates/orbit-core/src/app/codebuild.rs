//! CodeBuild - リモートビルドの起動と追跡
//!
//! [`CodeBuild::watch`] は pull 型の [`BuildWatcher`] を返します。
//!
//! # フロー
//! 1. 最初の `next()` は即座に fetch してスナップショットを返す
//! 2. 以降の `next()` はポーリング間隔だけ待ってから fetch
//! 3. 終端スナップショットの次に、SUCCEEDED なら `None`、
//!    それ以外なら `BuildFailed` を 1 回だけ返す

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{ImageSource, OrbitConfig};
use crate::domain::{BuildId, BuildInfo, BuildSpec};
use crate::error::OrbitError;
use crate::ports::build_service::{PULL_CREDENTIALS_SERVICE_ROLE, SOURCE_TYPE_S3};
use crate::ports::{BuildService, Clock, LogsConfig, StartBuildRequest};
use crate::retry::RetryPolicy;

/// What to run remotely and where its logs go.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildJob {
    pub stream_name: String,
    pub bundle_location: String,
    pub buildspec: BuildSpec,
    pub timeout_minutes: u32,
}

#[derive(Clone)]
pub struct CodeBuild {
    service: Arc<dyn BuildService>,
    clock: Arc<dyn Clock>,
    config: Arc<OrbitConfig>,
}

impl CodeBuild {
    pub fn new(
        service: Arc<dyn BuildService>,
        clock: Arc<dyn Clock>,
        config: Arc<OrbitConfig>,
    ) -> Self {
        Self {
            service,
            clock,
            config,
        }
    }

    pub fn log_group(&self) -> String {
        format!("/aws/codebuild/{}", self.config.codebuild.project_name)
    }

    /// Build image override, if the project image is not the service default.
    pub fn image_override(&self) -> Option<String> {
        match &self.config.codebuild.image {
            ImageSource::Codebuild => None,
            ImageSource::Ecr { repository } if repository.contains(".amazonaws.com/") => {
                Some(repository.clone())
            }
            ImageSource::Ecr { repository } => {
                let env = &self.config.environment;
                Some(format!(
                    "{}.dkr.ecr.{}.amazonaws.com/{repository}",
                    env.account_id, env.region
                ))
            }
        }
    }

    pub fn request(&self, job: &BuildJob) -> Result<StartBuildRequest, OrbitError> {
        let image = self.image_override();
        Ok(StartBuildRequest {
            project_name: self.config.codebuild.project_name.clone(),
            source_type_override: SOURCE_TYPE_S3.to_string(),
            source_location_override: job.bundle_location.clone(),
            buildspec_override: job.buildspec.to_yaml()?,
            timeout_in_minutes_override: job.timeout_minutes,
            privileged_mode_override: true,
            logs_config_override: LogsConfig::cloud_watch(self.log_group(), &job.stream_name),
            image_pull_credentials_type_override: image
                .as_ref()
                .map(|_| PULL_CREDENTIALS_SERVICE_ROLE.to_string()),
            image_override: image,
        })
    }

    pub async fn start(&self, job: &BuildJob) -> Result<BuildId, OrbitError> {
        let request = self.request(job)?;
        debug!(
            image = request.image_override.as_deref().unwrap_or("default"),
            stream = %job.stream_name,
            "starting build"
        );
        let policy = RetryPolicy::from_config(&self.config.retry);
        let id = policy
            .run_if(
                self.clock.as_ref(),
                "start_build",
                || self.service.start_build(request.clone()),
                |e| e.is_retryable(),
            )
            .await
            .map_err(OrbitError::Executor)?;
        info!(build_id = %id, project = %request.project_name, "build started");
        Ok(id)
    }

    pub async fn fetch_status(&self, id: &BuildId) -> Result<BuildInfo, OrbitError> {
        let policy = RetryPolicy::from_config(&self.config.retry)
            .with_max_attempts(self.config.polling.fetch_attempts);
        let ids = [id.clone()];
        let builds = policy
            .run_if(
                self.clock.as_ref(),
                "batch_get_builds",
                || self.service.batch_get_builds(&ids),
                |e| e.is_retryable(),
            )
            .await?;
        let raw = builds
            .into_iter()
            .find(|b| &b.id == id)
            .ok_or_else(|| OrbitError::NotFound(format!("build {id}")))?;
        Ok(BuildInfo::from_raw(raw, self.clock.now()))
    }

    pub fn watch(&self, id: BuildId) -> BuildWatcher {
        BuildWatcher {
            client: self.clone(),
            build_id: id,
            state: WatchState::Initial,
        }
    }
}

enum WatchState {
    Initial,
    InProgress { last: BuildInfo },
    Terminal { last: BuildInfo },
    Finished,
}

impl WatchState {
    fn after(info: BuildInfo) -> Self {
        if info.status.is_in_progress() {
            WatchState::InProgress { last: info }
        } else {
            WatchState::Terminal { last: info }
        }
    }
}

/// Snapshots of one build until it ends.
pub struct BuildWatcher {
    client: CodeBuild,
    build_id: BuildId,
    state: WatchState,
}

impl BuildWatcher {
    pub fn build_id(&self) -> &BuildId {
        &self.build_id
    }

    pub async fn next(&mut self) -> Option<Result<BuildInfo, OrbitError>> {
        match std::mem::replace(&mut self.state, WatchState::Finished) {
            WatchState::Initial => Some(self.fetch(None).await),
            WatchState::InProgress { last } => {
                let interval = self.client.config.polling.interval();
                self.client.clock.sleep(interval).await;
                Some(self.fetch(Some(&last)).await)
            }
            WatchState::Terminal { last } if last.status.is_success() => {
                info!(
                    build_id = %self.build_id,
                    start = %last.start_time,
                    end = %last.end_time,
                    elapsed_secs = last.duration_in_seconds,
                    "build succeeded"
                );
                None
            }
            WatchState::Terminal { last } => Some(Err(OrbitError::BuildFailed {
                build_id: self.build_id.clone(),
                status: last.status,
            })),
            WatchState::Finished => None,
        }
    }

    /// Drain the stream; the last snapshot on success.
    pub async fn wait(mut self) -> Result<BuildInfo, OrbitError> {
        let mut last = None;
        while let Some(item) = self.next().await {
            last = Some(item?);
        }
        last.ok_or_else(|| OrbitError::NotFound(format!("build {}", self.build_id)))
    }

    async fn fetch(&mut self, previous: Option<&BuildInfo>) -> Result<BuildInfo, OrbitError> {
        let info = self.client.fetch_status(&self.build_id).await?;
        if previous.is_none_or(|p| info.differs_from(p)) {
            debug!(
                build_id = %self.build_id,
                phase = %info.current_phase,
                status = %info.status,
                "build progressed"
            );
        }
        self.state = WatchState::after(info.clone());
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ApiError, BuildPhaseType, BuildSpecBuilder, BuildStatus, CliSource, Service};
    use crate::impls::inmem_build::snapshot;
    use crate::impls::{FixedClock, InMemoryBuildService};
    use chrono::Utc;
    use rstest::rstest;
    use std::time::Duration;

    use BuildPhaseType::*;

    struct Harness {
        service: Arc<InMemoryBuildService>,
        clock: Arc<FixedClock>,
        client: CodeBuild,
    }

    fn harness(config: OrbitConfig) -> Harness {
        let service = Arc::new(InMemoryBuildService::new());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let client = CodeBuild::new(service.clone(), clock.clone(), Arc::new(config));
        Harness {
            service,
            clock,
            client,
        }
    }

    fn job() -> BuildJob {
        BuildJob {
            stream_name: "deploy_image-01HX".into(),
            bundle_location: "orbit-dev-toolkit/cli/remote/deploy_image/bundle.zip".into(),
            buildspec: BuildSpecBuilder::new(CliSource::PackageIndex).finish(),
            timeout_minutes: 30,
        }
    }

    fn throttled() -> ApiError {
        ApiError::new(Service::CodeBuild, "ThrottlingException", "Rate exceeded")
    }

    async fn collect(watcher: &mut BuildWatcher) -> Vec<Result<BuildInfo, OrbitError>> {
        let mut items = Vec::new();
        while let Some(item) = watcher.next().await {
            items.push(item);
        }
        items
    }

    async fn scripted(h: &Harness, final_status: BuildStatus) -> BuildId {
        let id = BuildId::new("orbit-dev:0042");
        let t0 = h.clock.now();
        let end_phase = if final_status.is_success() { Completed } else { Build };
        h.service
            .script_build(
                &id,
                vec![
                    snapshot(&id, BuildStatus::InProgress, &[Submitted, Provisioning], t0),
                    snapshot(&id, BuildStatus::InProgress, &[Submitted, Provisioning, Install], t0),
                    snapshot(&id, final_status, &[Submitted, Provisioning, Install, end_phase], t0),
                ],
            )
            .await;
        id
    }

    #[tokio::test]
    async fn succeeded_build_yields_each_snapshot_then_ends() {
        let h = harness(OrbitConfig::default());
        let id = scripted(&h, BuildStatus::Succeeded).await;

        let mut watcher = h.client.watch(id);
        let items = collect(&mut watcher).await;

        let statuses: Vec<_> = items.iter().map(|i| i.as_ref().unwrap().status).collect();
        assert_eq!(
            statuses,
            vec![BuildStatus::InProgress, BuildStatus::InProgress, BuildStatus::Succeeded]
        );
        let phases: Vec<_> = items
            .iter()
            .map(|i| i.as_ref().unwrap().current_phase)
            .collect();
        assert_eq!(phases, vec![Provisioning, Install, Completed]);
        assert_eq!(h.clock.count_of(Duration::from_secs(5)), 2);
        assert!(watcher.next().await.is_none());
    }

    #[tokio::test]
    async fn failed_build_yields_snapshots_then_failure() {
        let h = harness(OrbitConfig::default());
        let id = scripted(&h, BuildStatus::Failed).await;

        let mut watcher = h.client.watch(id.clone());
        let mut items = collect(&mut watcher).await;

        assert_eq!(items.len(), 4);
        let last = items.pop().unwrap().unwrap_err();
        match last {
            OrbitError::BuildFailed { build_id, status } => {
                assert_eq!(build_id, id);
                assert_eq!(status, BuildStatus::Failed);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(items.iter().all(Result::is_ok));
        assert_eq!(
            items.last().unwrap().as_ref().unwrap().status,
            BuildStatus::Failed
        );
        assert!(watcher.next().await.is_none());
    }

    #[tokio::test]
    async fn wait_returns_final_snapshot() {
        let h = harness(OrbitConfig::default());
        let id = scripted(&h, BuildStatus::Succeeded).await;
        let info = h.client.watch(id).wait().await.unwrap();
        assert_eq!(info.status, BuildStatus::Succeeded);
        assert!(info.is_consistent());
    }

    #[tokio::test]
    async fn wait_surfaces_timed_out_build() {
        let h = harness(OrbitConfig::default());
        let id = scripted(&h, BuildStatus::TimedOut).await;
        let err = h.client.watch(id).wait().await.unwrap_err();
        assert!(matches!(
            err,
            OrbitError::BuildFailed {
                status: BuildStatus::TimedOut,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn fetch_error_mid_stream_ends_the_stream() {
        let h = harness(OrbitConfig::default());
        let id = scripted(&h, BuildStatus::Succeeded).await;
        let mut watcher = h.client.watch(id);

        assert!(watcher.next().await.unwrap().is_ok());
        h.service
            .fail_next_fetch(ApiError::new(Service::CodeBuild, "AccessDeniedException", "no"))
            .await;
        assert!(matches!(watcher.next().await, Some(Err(OrbitError::Api(_)))));
        assert!(watcher.next().await.is_none());
    }

    #[tokio::test]
    async fn fetch_status_retries_throttling() {
        let h = harness(OrbitConfig::default());
        let id = scripted(&h, BuildStatus::Succeeded).await;
        h.service.fail_next_fetch(throttled()).await;
        h.service.fail_next_fetch(throttled()).await;

        let info = h.client.fetch_status(&id).await.unwrap();
        assert_eq!(info.status, BuildStatus::InProgress);
        assert_eq!(h.service.fetch_calls().await, 3);
        assert_eq!(h.clock.sleep_count(), 2);
    }

    #[tokio::test]
    async fn unknown_build_is_not_found() {
        let h = harness(OrbitConfig::default());
        let err = h
            .client
            .fetch_status(&BuildId::new("orbit-dev:missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrbitError::NotFound(_)));
    }

    #[tokio::test]
    async fn start_failure_after_retries_is_executor_error() {
        let h = harness(OrbitConfig::default());
        for _ in 0..3 {
            h.service.fail_next_start(throttled()).await;
        }
        let err = h.client.start(&job()).await.unwrap_err();
        assert!(matches!(err, OrbitError::Executor(ref e) if e.code == "ThrottlingException"));
        assert_eq!(h.clock.sleep_count(), 2);
        assert!(h.service.started().await.is_empty());
    }

    #[tokio::test]
    async fn start_renders_request() {
        let h = harness(OrbitConfig::default());
        h.client.start(&job()).await.unwrap();

        let started = h.service.started().await;
        let req = &started[0];
        assert_eq!(req.source_type_override, "S3");
        assert!(req.privileged_mode_override);
        assert_eq!(req.timeout_in_minutes_override, 30);
        assert_eq!(req.logs_config_override.cloud_watch_logs.group_name, "/aws/codebuild/orbit-dev");
        assert_eq!(req.logs_config_override.cloud_watch_logs.stream_name, "deploy_image-01HX");
        assert_eq!(req.logs_config_override.s3_logs.status, "DISABLED");
        assert!(req.buildspec_override.starts_with("version: 0.2"));
        assert_eq!(req.image_override, None);
        assert_eq!(req.image_pull_credentials_type_override, None);

        let wire = serde_json::to_value(req).unwrap();
        assert!(wire.get("imageOverride").is_none());
        assert_eq!(wire["logsConfigOverride"]["cloudWatchLogs"]["status"], "ENABLED");
    }

    #[rstest]
    #[case::short_name("orbit-builder", "123456789012.dkr.ecr.us-east-1.amazonaws.com/orbit-builder")]
    #[case::full_uri(
        "999999999999.dkr.ecr.eu-west-1.amazonaws.com/shared-builder",
        "999999999999.dkr.ecr.eu-west-1.amazonaws.com/shared-builder"
    )]
    fn private_images_use_service_role(#[case] repository: &str, #[case] expected: &str) {
        let mut config = OrbitConfig::default();
        config.environment.account_id = "123456789012".into();
        config.codebuild.image = ImageSource::Ecr {
            repository: repository.into(),
        };
        let h = harness(config);

        let req = h.client.request(&job()).unwrap();
        assert_eq!(req.image_override.as_deref(), Some(expected));
        assert_eq!(req.image_pull_credentials_type_override.as_deref(), Some("SERVICE_ROLE"));
    }
}
