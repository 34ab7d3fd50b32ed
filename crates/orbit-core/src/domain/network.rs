//! Network resources that cleanup discovers and removes.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::BenignReason;
use super::ids::{NetworkInterfaceId, SecurityGroupId, VpcEndpointId, VpcId};

/// Description the provider gives to NAT gateway interfaces. Those are owned by
/// the gateway and go away with it.
pub const NAT_GATEWAY_DESCRIPTION: &str = "Interface for NAT Gateway";

/// Name of the security group every vpc carries and that cannot be deleted.
pub const DEFAULT_SECURITY_GROUP: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentStatus {
    Attaching,
    Attached,
    Detaching,
    Detached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub attachment_id: String,
    pub status: AttachmentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub id: NetworkInterfaceId,
    pub vpc_id: VpcId,
    pub description: String,
    pub attachment: Option<Attachment>,
}

impl NetworkInterface {
    pub fn is_nat_gateway(&self) -> bool {
        self.description.contains(NAT_GATEWAY_DESCRIPTION)
    }

    /// No attachment at all counts as detached.
    pub fn is_detached(&self) -> bool {
        self.attachment
            .as_ref()
            .is_none_or(|a| a.status == AttachmentStatus::Detached)
    }

    pub fn is_attached(&self) -> bool {
        self.attachment
            .as_ref()
            .is_some_and(|a| a.status == AttachmentStatus::Attached)
    }
}

/// One ingress rule, kept opaque: we only ever revoke what we read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpPermission {
    pub protocol: String,
    pub from_port: Option<i32>,
    pub to_port: Option<i32>,
    pub cidr_ranges: Vec<String>,
    pub source_groups: Vec<SecurityGroupId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: SecurityGroupId,
    pub name: String,
    pub vpc_id: VpcId,
    pub ingress: Vec<IpPermission>,
}

impl SecurityGroup {
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_SECURITY_GROUP
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcEndpoint {
    pub id: VpcEndpointId,
    pub vpc_id: VpcId,
    pub service_name: String,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    LoadBalancer,
    VpcEndpoint,
    NetworkInterface,
    SecurityGroup,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetKind::LoadBalancer => "load balancer",
            TargetKind::VpcEndpoint => "vpc endpoint",
            TargetKind::NetworkInterface => "network interface",
            TargetKind::SecurityGroup => "security group",
        };
        f.write_str(s)
    }
}

/// A resource cleanup visited, scoped to one vpc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupTarget {
    pub kind: TargetKind,
    pub id: String,
    pub vpc_id: VpcId,
}

impl CleanupTarget {
    pub fn new(kind: TargetKind, id: impl fmt::Display, vpc_id: &VpcId) -> Self {
        Self {
            kind,
            id: id.to_string(),
            vpc_id: vpc_id.clone(),
        }
    }
}

/// Why a target was left in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Benign(BenignReason),
    /// Still not detached after the attempt budget.
    DetachTimeout { attempts: u32 },
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::Benign(reason) => reason.fmt(f),
            IgnoreReason::DetachTimeout { attempts } => {
                write!(f, "it is still attached after {attempts} detach attempts")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOutcome {
    Removed,
    Ignored(IgnoreReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eni(description: &str, attachment: Option<AttachmentStatus>) -> NetworkInterface {
        NetworkInterface {
            id: NetworkInterfaceId::new("eni-1"),
            vpc_id: VpcId::new("vpc-1"),
            description: description.to_string(),
            attachment: attachment.map(|status| Attachment {
                attachment_id: "eni-attach-1".into(),
                status,
            }),
        }
    }

    #[test]
    fn nat_gateway_interfaces_are_recognised() {
        assert!(eni("Interface for NAT Gateway nat-0abc", None).is_nat_gateway());
        assert!(!eni("aws-K8S-i-0123", None).is_nat_gateway());
    }

    #[test]
    fn missing_attachment_counts_as_detached() {
        assert!(eni("", None).is_detached());
        assert!(eni("", Some(AttachmentStatus::Detached)).is_detached());
        assert!(!eni("", Some(AttachmentStatus::Detaching)).is_detached());
        assert!(eni("", Some(AttachmentStatus::Attached)).is_attached());
    }

    #[test]
    fn ignore_reason_reads_naturally() {
        let r = IgnoreReason::DetachTimeout { attempts: 10 };
        assert_eq!(r.to_string(), "it is still attached after 10 detach attempts");
        let r = IgnoreReason::Benign(BenignReason::AlreadyGone);
        assert_eq!(r.to_string(), "it does not exist anymore");
    }
}
