//! Remote - ビルドサービス上でのコマンド実行
//!
//! リモートコマンドは「buildspec + アップロード済み bundle」の組です。
//! Runner はビルドを起動し、終了まで追跡して各スナップショットを通知します。
//!
//! # コマンド
//! - **deploy / destroy**: チームの plugin をインストールしてから実行
//! - **deploy_image-{name}**: dev 環境のみ、3 イメージを並列ビルド
//! - **destroy_image-{name}**: ECR からイメージを削除
//!
//! イメージビルド以外は環境がデプロイ済みであることが前提で、
//! 起動前に環境コンテキストのレコードを読みます。

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::OrbitConfig;
use crate::domain::{BuildInfo, BuildSpec, BuildSpecBuilder, EnvironmentContext};
use crate::error::OrbitError;
use crate::ports::{IdGenerator, ParameterStore};

use super::codebuild::{BuildJob, CodeBuild};
use super::dispatch::{Job, WorkerPool};
use super::team::load_environment_context;

/// Workbench images built on dev environments, with their optional build script.
pub const WORKBENCH_IMAGES: &[(&str, Option<&str>)] = &[
    ("jupyter-hub", None),
    ("jupyter-user", None),
    ("landing-page", Some("build.sh")),
];

pub const IMAGE_BUILD_TIMEOUT_MINUTES: u32 = 10;

#[derive(Clone)]
pub struct RemoteRunner {
    codebuild: CodeBuild,
    ids: Arc<dyn IdGenerator>,
    parameters: Arc<dyn ParameterStore>,
    config: Arc<OrbitConfig>,
}

impl RemoteRunner {
    pub fn new(
        codebuild: CodeBuild,
        ids: Arc<dyn IdGenerator>,
        parameters: Arc<dyn ParameterStore>,
        config: Arc<OrbitConfig>,
    ) -> Self {
        Self {
            codebuild,
            ids,
            parameters,
            config,
        }
    }

    async fn deployed_context(&self) -> Result<EnvironmentContext, OrbitError> {
        load_environment_context(self.parameters.as_ref(), &self.config.environment.name)
            .await
            .map_err(|e| match e {
                OrbitError::Config(msg) => OrbitError::Config(format!(
                    "{msg}: deploy the environment before running remote commands"
                )),
                other => other,
            })
    }

    pub fn bundle_location(&self, command_name: &str) -> String {
        format!(
            "{}/cli/remote/{command_name}/bundle.zip",
            self.config.environment.toolkit_bucket
        )
    }

    /// Start `buildspec` and follow it; `on_update` sees every snapshot.
    pub async fn run<F>(
        &self,
        command_name: &str,
        buildspec: BuildSpec,
        timeout_minutes: u32,
        mut on_update: F,
    ) -> Result<BuildInfo, OrbitError>
    where
        F: FnMut(&BuildInfo) + Send,
    {
        let job = BuildJob {
            stream_name: format!("{command_name}-{}", self.ids.generate()),
            bundle_location: self.bundle_location(command_name),
            buildspec,
            timeout_minutes,
        };
        let build_id = self.codebuild.start(&job).await?;
        info!(command = command_name, build_id = %build_id, stream = %job.stream_name, "remote command started");

        let mut watcher = self.codebuild.watch(build_id.clone());
        let mut last = None;
        while let Some(item) = watcher.next().await {
            let info = item?;
            on_update(&info);
            last = Some(info);
        }
        last.ok_or_else(|| OrbitError::NotFound(format!("build {build_id}")))
    }

    fn buildspec(&self, command: String) -> BuildSpec {
        BuildSpecBuilder::new(self.config.cli_source())
            .build([command])
            .finish()
    }

    /// Build the workbench images concurrently. Only dev environments do this.
    pub async fn deploy_images_remotely(&self) -> Result<Vec<BuildInfo>, OrbitError> {
        if !self.config.environment.dev {
            debug!("not a dev environment, images come prebuilt");
            return Ok(Vec::new());
        }

        let jobs = WORKBENCH_IMAGES
            .iter()
            .map(|&(name, script)| {
                let runner = self.clone();
                let command_name = format!("deploy_image-{name}");
                let buildspec = self.buildspec(format!(
                    "orbit remote --command deploy_image cdk=false {name} {}",
                    script.unwrap_or("")
                ));
                Job::new(command_name.clone(), async move {
                    let info = runner
                        .run(&command_name, buildspec, IMAGE_BUILD_TIMEOUT_MINUTES, |_| {})
                        .await?;
                    debug!(image = name, "image deployed");
                    Ok(info)
                })
            })
            .collect();

        WorkerPool::new(WORKBENCH_IMAGES.len()).run_all(jobs).await
    }

    /// Run `orbit remote --command {command}` with every team plugin installed.
    async fn run_with_plugins<F>(&self, command: &str, on_update: F) -> Result<BuildInfo, OrbitError>
    where
        F: FnMut(&BuildInfo) + Send,
    {
        let context = self.deployed_context().await?;
        let plugins = context.bundled_plugins();
        debug!(command, plugins = plugins.len(), "bundling team plugins");
        let buildspec = BuildSpecBuilder::new(self.config.cli_source())
            .plugins(plugins)
            .build([format!("orbit remote --command {command}")])
            .finish();
        self.run(command, buildspec, self.config.codebuild.timeout_minutes, on_update)
            .await
    }

    /// Redeploy the environment and its teams on the build service.
    pub async fn deploy_remotely<F>(&self, on_update: F) -> Result<BuildInfo, OrbitError>
    where
        F: FnMut(&BuildInfo) + Send,
    {
        let info = self.run_with_plugins("deploy", on_update).await?;
        info!(env = %self.config.environment.name, "environment deployed remotely");
        Ok(info)
    }

    pub async fn destroy_remotely<F>(&self, on_update: F) -> Result<BuildInfo, OrbitError>
    where
        F: FnMut(&BuildInfo) + Send,
    {
        let info = self.run_with_plugins("destroy", on_update).await?;
        info!(env = %self.config.environment.name, "environment destroyed remotely");
        Ok(info)
    }

    pub async fn destroy_image<F>(&self, name: &str, on_update: F) -> Result<BuildInfo, OrbitError>
    where
        F: FnMut(&BuildInfo) + Send,
    {
        self.deployed_context().await?;
        let buildspec = self.buildspec(format!("orbit remote --command destroy_image {name}"));
        let info = self
            .run(
                &format!("destroy_image-{name}"),
                buildspec,
                IMAGE_BUILD_TIMEOUT_MINUTES,
                on_update,
            )
            .await?;
        info!(image = name, "docker image destroyed");
        Ok(info)
    }
}
