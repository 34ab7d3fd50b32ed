//! Build snapshots: the shape of one remote build as seen at one poll.
//!
//! [`RawBuild`] mirrors the document the build service returns. [`BuildInfo`] is
//! what the rest of the crate works with; it is rebuilt from a fresh `RawBuild`
//! on every fetch and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::BuildId;

/// Overall build status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    Failed,
    Fault,
    InProgress,
    Stopped,
    Succeeded,
    TimedOut,
}

impl BuildStatus {
    pub fn is_in_progress(self) -> bool {
        self == BuildStatus::InProgress
    }

    pub fn is_success(self) -> bool {
        self == BuildStatus::Succeeded
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Failed => "FAILED",
            BuildStatus::Fault => "FAULT",
            BuildStatus::InProgress => "IN_PROGRESS",
            BuildStatus::Stopped => "STOPPED",
            BuildStatus::Succeeded => "SUCCEEDED",
            BuildStatus::TimedOut => "TIMED_OUT",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build phase, in the order the service runs them after submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildPhaseType {
    Submitted,
    Queued,
    Provisioning,
    DownloadSource,
    Install,
    PreBuild,
    Build,
    PostBuild,
    UploadArtifacts,
    Finalizing,
    Completed,
}

impl BuildPhaseType {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildPhaseType::Submitted => "SUBMITTED",
            BuildPhaseType::Queued => "QUEUED",
            BuildPhaseType::Provisioning => "PROVISIONING",
            BuildPhaseType::DownloadSource => "DOWNLOAD_SOURCE",
            BuildPhaseType::Install => "INSTALL",
            BuildPhaseType::PreBuild => "PRE_BUILD",
            BuildPhaseType::Build => "BUILD",
            BuildPhaseType::PostBuild => "POST_BUILD",
            BuildPhaseType::UploadArtifacts => "UPLOAD_ARTIFACTS",
            BuildPhaseType::Finalizing => "FINALIZING",
            BuildPhaseType::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for BuildPhaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-phase status. Same as [`BuildStatus`] plus `QUEUED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildPhaseStatus {
    Failed,
    Fault,
    Queued,
    InProgress,
    Stopped,
    Succeeded,
    TimedOut,
}

/// Why a phase transitioned or failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPhaseContext {
    #[serde(default)]
    pub status_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildPhase {
    pub phase_type: BuildPhaseType,
    pub status: Option<BuildPhaseStatus>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_in_seconds: Option<f64>,
    pub contexts: Vec<BuildPhaseContext>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildLogs {
    pub enabled: bool,
    pub group_name: Option<String>,
    pub stream_name: Option<String>,
}

/// Immutable snapshot of a remote build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub build_id: BuildId,
    pub status: BuildStatus,
    pub current_phase: BuildPhaseType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_in_seconds: f64,
    pub phases: Vec<BuildPhase>,
    pub logs: BuildLogs,
}

impl BuildInfo {
    /// Build a snapshot from the service record.
    ///
    /// `now` stands in for any end time the service has not reported yet.
    pub fn from_raw(raw: RawBuild, now: DateTime<Utc>) -> Self {
        let end_time = raw.end_time.unwrap_or(now);
        let cloud_watch = raw.logs.and_then(|l| l.cloud_watch_logs);
        let enabled = cloud_watch
            .as_ref()
            .is_some_and(|c| c.status.as_deref() == Some("ENABLED"));
        let (group_name, stream_name) = match cloud_watch {
            Some(c) if enabled => (c.group_name, c.stream_name),
            _ => (None, None),
        };

        Self {
            build_id: raw.id,
            status: raw.build_status,
            current_phase: raw.current_phase,
            start_time: raw.start_time,
            end_time,
            duration_in_seconds: seconds_between(raw.start_time, end_time),
            phases: raw
                .phases
                .into_iter()
                .map(|p| BuildPhase {
                    phase_type: p.phase_type,
                    status: p.phase_status,
                    start_time: p.start_time,
                    end_time: p.end_time.unwrap_or(now),
                    duration_in_seconds: p.duration_in_seconds,
                    contexts: p.contexts,
                })
                .collect(),
            logs: BuildLogs {
                enabled,
                group_name,
                stream_name,
            },
        }
    }

    pub fn last_phase(&self) -> Option<&BuildPhase> {
        self.phases.last()
    }

    /// Phases are ordered by start time and the last one is `current_phase`.
    pub fn is_consistent(&self) -> bool {
        let ordered = self
            .phases
            .windows(2)
            .all(|w| w[0].start_time <= w[1].start_time);
        let current = self
            .last_phase()
            .is_none_or(|p| p.phase_type == self.current_phase);
        ordered && current
    }

    /// Has the phase or status moved since `previous`?
    pub fn differs_from(&self, previous: &BuildInfo) -> bool {
        self.current_phase != previous.current_phase || self.status != previous.status
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}

// ========================================
// Wire format (service response)
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBuild {
    pub id: BuildId,
    pub build_status: BuildStatus,
    pub current_phase: BuildPhaseType,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub phases: Vec<RawBuildPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<RawLogs>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBuildPhase {
    pub phase_type: BuildPhaseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_status: Option<BuildPhaseStatus>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_in_seconds: Option<f64>,
    #[serde(default)]
    pub contexts: Vec<BuildPhaseContext>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLogs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_watch_logs: Option<RawCloudWatchLogs>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCloudWatchLogs {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub stream_name: Option<String>,
}
