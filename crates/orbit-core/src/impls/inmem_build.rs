//! In-memory build service.
//!
//! Each build replays a scripted list of snapshots, one per `batch_get_builds`
//! call, repeating the last one once the script runs out.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::domain::build::{RawBuildPhase, RawCloudWatchLogs, RawLogs};
use crate::domain::{ApiError, BuildId, BuildPhaseStatus, BuildPhaseType, BuildStatus, RawBuild};
use crate::ports::{BuildService, StartBuildRequest};

#[derive(Default)]
struct InMemoryBuildState {
    next_build: u32,
    started: Vec<StartBuildRequest>,
    /// Snapshots handed to the next started builds, in start order.
    pending_scripts: VecDeque<Vec<RawBuild>>,
    scripts: HashMap<BuildId, VecDeque<RawBuild>>,
    start_errors: VecDeque<ApiError>,
    fetch_errors: VecDeque<ApiError>,
    fetch_calls: usize,
}

#[derive(Default)]
pub struct InMemoryBuildService {
    state: Mutex<InMemoryBuildState>,
}

impl InMemoryBuildService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots for an already known build id.
    pub async fn script_build(&self, id: &BuildId, snapshots: Vec<RawBuild>) {
        let mut st = self.state.lock().await;
        st.scripts.insert(id.clone(), snapshots.into());
    }

    /// Snapshots for the next build that gets started; ids are rewritten.
    pub async fn script_next_build(&self, snapshots: Vec<RawBuild>) {
        self.state.lock().await.pending_scripts.push_back(snapshots);
    }

    pub async fn fail_next_start(&self, err: ApiError) {
        self.state.lock().await.start_errors.push_back(err);
    }

    pub async fn fail_next_fetch(&self, err: ApiError) {
        self.state.lock().await.fetch_errors.push_back(err);
    }

    pub async fn started(&self) -> Vec<StartBuildRequest> {
        self.state.lock().await.started.clone()
    }

    pub async fn fetch_calls(&self) -> usize {
        self.state.lock().await.fetch_calls
    }
}

#[async_trait]
impl BuildService for InMemoryBuildService {
    async fn start_build(&self, request: StartBuildRequest) -> Result<BuildId, ApiError> {
        let mut st = self.state.lock().await;
        if let Some(err) = st.start_errors.pop_front() {
            return Err(err);
        }
        st.next_build += 1;
        let id = BuildId::new(format!("{}:{:04}", request.project_name, st.next_build));
        let snapshots = match st.pending_scripts.pop_front() {
            Some(script) => script
                .into_iter()
                .map(|mut raw| {
                    raw.id = id.clone();
                    raw
                })
                .collect(),
            None => succeeding_build(&id, Utc::now()),
        };
        st.scripts.insert(id.clone(), snapshots.into());
        st.started.push(request);
        Ok(id)
    }

    async fn batch_get_builds(&self, ids: &[BuildId]) -> Result<Vec<RawBuild>, ApiError> {
        let mut st = self.state.lock().await;
        st.fetch_calls += 1;
        if let Some(err) = st.fetch_errors.pop_front() {
            return Err(err);
        }
        let mut found = Vec::new();
        for id in ids {
            let Some(script) = st.scripts.get_mut(id) else {
                continue;
            };
            let snapshot = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            };
            found.extend(snapshot);
        }
        Ok(found)
    }
}

/// Snapshot whose phases start one second apart from `start`.
///
/// Every phase but the last is SUCCEEDED; the last one carries `status`
/// unless the build is still running.
pub fn snapshot(
    id: &BuildId,
    status: BuildStatus,
    phases: &[BuildPhaseType],
    start: DateTime<Utc>,
) -> RawBuild {
    let at = |i: usize| start + Duration::seconds(i as i64);
    let last = phases.len().saturating_sub(1);
    let raw_phases = phases
        .iter()
        .enumerate()
        .map(|(i, &phase_type)| {
            let open = i == last && status.is_in_progress();
            RawBuildPhase {
                phase_type,
                phase_status: if open {
                    None
                } else if i == last {
                    Some(phase_status_for(status))
                } else {
                    Some(BuildPhaseStatus::Succeeded)
                },
                start_time: at(i),
                end_time: (!open).then(|| at(i + 1)),
                duration_in_seconds: (!open).then_some(1.0),
                contexts: Vec::new(),
            }
        })
        .collect();

    RawBuild {
        id: id.clone(),
        build_status: status,
        current_phase: phases.last().copied().unwrap_or(BuildPhaseType::Submitted),
        start_time: start,
        end_time: (!status.is_in_progress()).then(|| at(phases.len())),
        phases: raw_phases,
        logs: Some(RawLogs {
            cloud_watch_logs: Some(RawCloudWatchLogs {
                status: Some("ENABLED".to_string()),
                group_name: Some("/aws/codebuild/orbit".to_string()),
                stream_name: Some(id.to_string()),
            }),
        }),
    }
}

fn phase_status_for(status: BuildStatus) -> BuildPhaseStatus {
    match status {
        BuildStatus::Failed => BuildPhaseStatus::Failed,
        BuildStatus::Fault => BuildPhaseStatus::Fault,
        BuildStatus::InProgress => BuildPhaseStatus::InProgress,
        BuildStatus::Stopped => BuildPhaseStatus::Stopped,
        BuildStatus::Succeeded => BuildPhaseStatus::Succeeded,
        BuildStatus::TimedOut => BuildPhaseStatus::TimedOut,
    }
}

/// Default script: running in BUILD, then done.
fn succeeding_build(id: &BuildId, start: DateTime<Utc>) -> Vec<RawBuild> {
    use BuildPhaseType::*;
    let running = [Submitted, Queued, Provisioning, DownloadSource, Install, PreBuild, Build];
    let mut done = running.to_vec();
    done.extend([PostBuild, UploadArtifacts, Finalizing, Completed]);
    vec![
        snapshot(id, BuildStatus::InProgress, &running, start),
        snapshot(id, BuildStatus::Succeeded, &done, start),
    ]
}
