//! In-memory stack engine.
//!
//! Imports resolve to the id they import; everything else gets a stable
//! made-up physical id derived from the stack name and logical id.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::team::ResourceDescriptor;
use crate::domain::{ApiError, StackOutputs, TeamStackPlan};
use crate::ports::StackEngine;

#[derive(Default)]
struct InMemoryStackState {
    deployed: Vec<TeamStackPlan>,
    failures: VecDeque<ApiError>,
    /// Logical ids to leave out of the outputs.
    omit: Vec<String>,
}

#[derive(Default)]
pub struct InMemoryStackEngine {
    state: Mutex<InMemoryStackState>,
}

impl InMemoryStackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_next(&self, err: ApiError) {
        self.state.lock().await.failures.push_back(err);
    }

    pub async fn omit_output(&self, logical_id: impl Into<String>) {
        self.state.lock().await.omit.push(logical_id.into());
    }

    pub async fn deployed(&self) -> Vec<TeamStackPlan> {
        self.state.lock().await.deployed.clone()
    }
}

fn physical_id(plan: &TeamStackPlan, logical_id: &str, descriptor: &ResourceDescriptor) -> String {
    match descriptor {
        ResourceDescriptor::VpcImport { vpc_id, .. } => vpc_id.to_string(),
        ResourceDescriptor::SubnetImport { subnet_id, .. } => subnet_id.clone(),
        ResourceDescriptor::BucketImport { bucket_name, .. } => bucket_name.clone(),
        ResourceDescriptor::FileSystemImport { file_system_id, .. } => file_system_id.clone(),
        ResourceDescriptor::EcsCluster { cluster_name } => cluster_name.clone(),
        ResourceDescriptor::IamRole { role_name, .. } => {
            format!("arn:aws:iam::000000000000:role/{role_name}")
        }
        ResourceDescriptor::StateMachine { name, .. } => {
            format!("arn:aws:states:::stateMachine:{name}")
        }
        ResourceDescriptor::Function { function_name } => {
            format!("arn:aws:lambda:::function:{function_name}")
        }
        ResourceDescriptor::KmsKey { .. } => {
            format!("arn:aws:kms:::key/{}-{logical_id}", plan.stack_name)
        }
        _ => format!("{}-{logical_id}", plan.stack_name),
    }
}

#[async_trait]
impl StackEngine for InMemoryStackEngine {
    async fn deploy(&self, plan: &TeamStackPlan) -> Result<StackOutputs, ApiError> {
        let mut st = self.state.lock().await;
        if let Some(err) = st.failures.pop_front() {
            return Err(err);
        }
        let outputs: BTreeMap<String, String> = plan
            .resources
            .iter()
            .filter(|r| !st.omit.contains(&r.logical_id))
            .map(|r| {
                (
                    r.logical_id.clone(),
                    physical_id(plan, &r.logical_id, &r.descriptor),
                )
            })
            .collect();
        st.deployed.push(plan.clone());
        Ok(StackOutputs(outputs))
    }
}
