//! In-memory vpc network state.
//!
//! Behaves like the provider for the calls cleanup makes: deleting an attached
//! interface fails with "in use", missing resources fail with `*.NotFound`.
//! Failures can be scripted per operation and resource id.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::network::{AttachmentStatus, IpPermission};
use crate::domain::{
    ApiError, NetworkInterface, NetworkInterfaceId, Page, SecurityGroup, SecurityGroupId, Service,
    VpcEndpoint, VpcEndpointId, VpcId,
};
use crate::ports::NetworkApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkOp {
    DescribeNetworkInterfaces,
    DetachNetworkInterface,
    DeleteNetworkInterface,
    ReloadSecurityGroup,
    RevokeIngress,
    DeleteSecurityGroup,
    DescribeVpcEndpoints,
    DeleteVpcEndpoints,
}

#[derive(Default)]
struct InMemoryNetworkState {
    interfaces: BTreeMap<NetworkInterfaceId, NetworkInterface>,
    /// Interfaces whose detach requests never take effect.
    stuck: HashSet<NetworkInterfaceId>,
    security_groups: BTreeMap<SecurityGroupId, SecurityGroup>,
    endpoints: Vec<VpcEndpoint>,
    /// Keyed by operation and resource id (the vpc id for listing calls).
    failures: HashMap<(NetworkOp, String), VecDeque<ApiError>>,
    calls: Vec<(NetworkOp, String)>,
    endpoint_batches: Vec<usize>,
}

impl InMemoryNetworkState {
    fn record(&mut self, op: NetworkOp, id: &str) -> Result<(), ApiError> {
        self.calls.push((op, id.to_string()));
        match self.failures.get_mut(&(op, id.to_string())) {
            Some(queue) => queue.pop_front().map_or(Ok(()), Err),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct InMemoryNetwork {
    state: Mutex<InMemoryNetworkState>,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_interface(&self, eni: NetworkInterface) {
        let mut st = self.state.lock().await;
        st.interfaces.insert(eni.id.clone(), eni);
    }

    /// Detach calls on this interface are accepted but it stays attached.
    pub async fn keep_attached(&self, id: &NetworkInterfaceId) {
        self.state.lock().await.stuck.insert(id.clone());
    }

    pub async fn add_security_group(&self, sg: SecurityGroup) {
        let mut st = self.state.lock().await;
        st.security_groups.insert(sg.id.clone(), sg);
    }

    pub async fn add_endpoint(&self, endpoint: VpcEndpoint) {
        self.state.lock().await.endpoints.push(endpoint);
    }

    pub async fn fail_next(&self, op: NetworkOp, id: impl Into<String>, err: ApiError) {
        let mut st = self.state.lock().await;
        st.failures.entry((op, id.into())).or_default().push_back(err);
    }

    pub async fn calls(&self, op: NetworkOp) -> Vec<String> {
        let st = self.state.lock().await;
        st.calls
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, id)| id.clone())
            .collect()
    }

    pub async fn interface(&self, id: &NetworkInterfaceId) -> Option<NetworkInterface> {
        self.state.lock().await.interfaces.get(id).cloned()
    }

    pub async fn security_group(&self, id: &SecurityGroupId) -> Option<SecurityGroup> {
        self.state.lock().await.security_groups.get(id).cloned()
    }

    pub async fn endpoint_count(&self) -> usize {
        self.state.lock().await.endpoints.len()
    }

    /// Size of every endpoint delete batch, in call order.
    pub async fn endpoint_batches(&self) -> Vec<usize> {
        self.state.lock().await.endpoint_batches.clone()
    }
}

fn ec2(code: &str, message: String) -> ApiError {
    ApiError::new(Service::Ec2, code, message)
}

fn eni_not_found(id: &NetworkInterfaceId) -> ApiError {
    ec2(
        "InvalidNetworkInterfaceID.NotFound",
        format!("The networkInterface ID '{id}' does not exist"),
    )
}

fn sg_not_found(id: &SecurityGroupId) -> ApiError {
    ec2(
        "InvalidGroup.NotFound",
        format!("The security group '{id}' does not exist"),
    )
}

#[async_trait]
impl NetworkApi for InMemoryNetwork {
    async fn describe_network_interfaces(
        &self,
        vpc_id: &VpcId,
    ) -> Result<Vec<NetworkInterface>, ApiError> {
        let mut st = self.state.lock().await;
        st.record(NetworkOp::DescribeNetworkInterfaces, vpc_id.as_str())?;
        Ok(st
            .interfaces
            .values()
            .filter(|eni| &eni.vpc_id == vpc_id)
            .cloned()
            .collect())
    }

    async fn reload_network_interface(
        &self,
        id: &NetworkInterfaceId,
    ) -> Result<NetworkInterface, ApiError> {
        let st = self.state.lock().await;
        st.interfaces.get(id).cloned().ok_or_else(|| eni_not_found(id))
    }

    async fn detach_network_interface(&self, attachment_id: &str) -> Result<(), ApiError> {
        let mut st = self.state.lock().await;
        st.record(NetworkOp::DetachNetworkInterface, attachment_id)?;
        let InMemoryNetworkState {
            interfaces, stuck, ..
        } = &mut *st;
        let eni = interfaces
            .values_mut()
            .find(|eni| {
                eni.attachment
                    .as_ref()
                    .is_some_and(|a| a.attachment_id == attachment_id)
            })
            .ok_or_else(|| {
                ec2(
                    "InvalidAttachmentID.NotFound",
                    format!("The attachment ID '{attachment_id}' does not exist"),
                )
            })?;
        if !stuck.contains(&eni.id) {
            if let Some(a) = eni.attachment.as_mut() {
                a.status = AttachmentStatus::Detached;
            }
        }
        Ok(())
    }

    async fn delete_network_interface(&self, id: &NetworkInterfaceId) -> Result<(), ApiError> {
        let mut st = self.state.lock().await;
        st.record(NetworkOp::DeleteNetworkInterface, id.as_str())?;
        let eni = st.interfaces.get(id).ok_or_else(|| eni_not_found(id))?;
        if !eni.is_detached() {
            return Err(ec2(
                "InvalidNetworkInterface.InUse",
                format!("Interface: [{id}] in use. The network interface is currently in use."),
            ));
        }
        st.interfaces.remove(id);
        Ok(())
    }

    async fn describe_security_groups(
        &self,
        vpc_id: &VpcId,
    ) -> Result<Vec<SecurityGroup>, ApiError> {
        let st = self.state.lock().await;
        Ok(st
            .security_groups
            .values()
            .filter(|sg| &sg.vpc_id == vpc_id)
            .cloned()
            .collect())
    }

    async fn reload_security_group(
        &self,
        id: &SecurityGroupId,
    ) -> Result<SecurityGroup, ApiError> {
        let mut st = self.state.lock().await;
        st.record(NetworkOp::ReloadSecurityGroup, id.as_str())?;
        st.security_groups
            .get(id)
            .cloned()
            .ok_or_else(|| sg_not_found(id))
    }

    async fn revoke_ingress(
        &self,
        id: &SecurityGroupId,
        permissions: &[IpPermission],
    ) -> Result<(), ApiError> {
        let mut st = self.state.lock().await;
        st.record(NetworkOp::RevokeIngress, id.as_str())?;
        let sg = st
            .security_groups
            .get_mut(id)
            .ok_or_else(|| sg_not_found(id))?;
        sg.ingress.retain(|p| !permissions.contains(p));
        Ok(())
    }

    async fn delete_security_group(&self, id: &SecurityGroupId) -> Result<(), ApiError> {
        let mut st = self.state.lock().await;
        st.record(NetworkOp::DeleteSecurityGroup, id.as_str())?;
        st.security_groups
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| sg_not_found(id))
    }

    async fn describe_vpc_endpoints(
        &self,
        vpc_id: &VpcId,
        page_size: usize,
        next_token: Option<String>,
    ) -> Result<Page<VpcEndpoint>, ApiError> {
        let mut st = self.state.lock().await;
        st.record(NetworkOp::DescribeVpcEndpoints, vpc_id.as_str())?;
        let matching: Vec<_> = st
            .endpoints
            .iter()
            .filter(|e| &e.vpc_id == vpc_id)
            .cloned()
            .collect();
        // token は次ページ先頭の endpoint id
        let start = match next_token {
            Some(token) => matching
                .iter()
                .position(|e| e.id.as_str() == token)
                .ok_or_else(|| ec2("InvalidNextToken", format!("bad token '{token}'")))?,
            None => 0,
        };
        let size = page_size.max(1);
        let items: Vec<_> = matching.iter().skip(start).take(size).cloned().collect();
        let next_token = matching
            .get(start + items.len())
            .map(|e| e.id.to_string());
        Ok(Page { items, next_token })
    }

    async fn delete_vpc_endpoints(&self, ids: &[VpcEndpointId]) -> Result<(), ApiError> {
        let mut st = self.state.lock().await;
        let joined = ids
            .iter()
            .map(VpcEndpointId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        st.record(NetworkOp::DeleteVpcEndpoints, &joined)?;
        st.endpoint_batches.push(ids.len());
        st.endpoints.retain(|e| !ids.contains(&e.id));
        Ok(())
    }
}
