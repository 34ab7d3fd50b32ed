//! NetworkApi port - VPC 内のネットワークリソース
//!
//! 一覧系の呼び出しはプロバイダ側で vpc によるフィルタがかかりますが、
//! 呼び出し側でも返ってきた `vpc_id` を確認します。

use async_trait::async_trait;

use crate::domain::network::IpPermission;
use crate::domain::{
    ApiError, NetworkInterface, NetworkInterfaceId, Page, SecurityGroup, SecurityGroupId,
    VpcEndpoint, VpcEndpointId, VpcId,
};

#[async_trait]
pub trait NetworkApi: Send + Sync {
    async fn describe_network_interfaces(
        &self,
        vpc_id: &VpcId,
    ) -> Result<Vec<NetworkInterface>, ApiError>;

    /// Fresh view of one interface, used to observe detach progress.
    async fn reload_network_interface(
        &self,
        id: &NetworkInterfaceId,
    ) -> Result<NetworkInterface, ApiError>;

    async fn detach_network_interface(&self, attachment_id: &str) -> Result<(), ApiError>;

    async fn delete_network_interface(&self, id: &NetworkInterfaceId) -> Result<(), ApiError>;

    async fn describe_security_groups(&self, vpc_id: &VpcId)
    -> Result<Vec<SecurityGroup>, ApiError>;

    async fn reload_security_group(&self, id: &SecurityGroupId)
    -> Result<SecurityGroup, ApiError>;

    async fn revoke_ingress(
        &self,
        id: &SecurityGroupId,
        permissions: &[IpPermission],
    ) -> Result<(), ApiError>;

    async fn delete_security_group(&self, id: &SecurityGroupId) -> Result<(), ApiError>;

    async fn describe_vpc_endpoints(
        &self,
        vpc_id: &VpcId,
        page_size: usize,
        next_token: Option<String>,
    ) -> Result<Page<VpcEndpoint>, ApiError>;

    async fn delete_vpc_endpoints(&self, ids: &[VpcEndpointId]) -> Result<(), ApiError>;
}
