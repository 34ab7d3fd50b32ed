//! BuildService port - マネージドビルドサービス
//!
//! 呼び出しは 2 つだけ。ビルドの投入と、id によるビルドの取得。
//! リクエスト型はサービスが受け付ける camelCase のドキュメントそのものです。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ApiError, BuildId, RawBuild};

pub const SOURCE_TYPE_S3: &str = "S3";
pub const PULL_CREDENTIALS_SERVICE_ROLE: &str = "SERVICE_ROLE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBuildRequest {
    pub project_name: String,
    pub source_type_override: String,
    pub source_location_override: String,
    pub buildspec_override: String,
    pub timeout_in_minutes_override: u32,
    pub privileged_mode_override: bool,
    pub logs_config_override: LogsConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_override: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_credentials_type_override: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsConfig {
    pub cloud_watch_logs: CloudWatchLogsConfig,
    pub s3_logs: S3LogsConfig,
}

impl LogsConfig {
    /// CloudWatch on, S3 off.
    pub fn cloud_watch(group_name: impl Into<String>, stream_name: impl Into<String>) -> Self {
        Self {
            cloud_watch_logs: CloudWatchLogsConfig {
                status: "ENABLED".to_string(),
                group_name: group_name.into(),
                stream_name: stream_name.into(),
            },
            s3_logs: S3LogsConfig {
                status: "DISABLED".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudWatchLogsConfig {
    pub status: String,
    pub group_name: String,
    pub stream_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3LogsConfig {
    pub status: String,
}

#[async_trait]
pub trait BuildService: Send + Sync {
    async fn start_build(&self, request: StartBuildRequest) -> Result<BuildId, ApiError>;

    /// Unknown ids are simply absent from the result.
    async fn batch_get_builds(&self, ids: &[BuildId]) -> Result<Vec<RawBuild>, ApiError>;
}
