//! Cleanup - 環境削除後に残ったネットワークリソースの掃除
//!
//! # 順序
//! 1. ロードバランサ（インターフェースを掴んでいる）
//! 2. VPC エンドポイント（同上、ページ単位でまとめて削除）
//! 3. ネットワークインターフェース（attached のものだけ detach → 削除）
//! 4. セキュリティグループ（並列、dependent object なら 1 回だけ待って再試行）
//!
//! 各ステージは想定内のプロバイダエラーを warn して吸収し、それ以外で中断します。
//! 何度実行しても安全です。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::OrbitConfig;
use crate::domain::team::environment_context_parameter_name;
use crate::domain::{
    ApiError, BenignReason, CleanupTarget, EnvironmentContext, ErrorClass, IgnoreReason,
    NetworkInterface, SecurityGroupId, TargetKind, TargetOutcome, VpcEndpointId, VpcId,
};
use crate::error::OrbitError;
use crate::ports::parameter_store::get_json;
use crate::ports::{Clock, LoadBalancerApi, NetworkApi, ParameterStore};
use crate::retry::RetryPolicy;

use super::dispatch::{Job, WorkerPool};

/// Interface errors that leave the interface in place without failing the run.
const INTERFACE_BENIGN: &[BenignReason] = &[
    BenignReason::InUse,
    BenignReason::AlreadyGone,
    BenignReason::PermissionDenied,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub removed: usize,
    pub ignored: usize,
}

/// What one cleanup run did, per resource kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub load_balancers: KindCounts,
    pub vpc_endpoints: KindCounts,
    pub network_interfaces: KindCounts,
    pub security_groups: KindCounts,
    pub ignored: Vec<(CleanupTarget, IgnoreReason)>,
}

impl CleanupReport {
    pub fn counts(&self, kind: TargetKind) -> KindCounts {
        match kind {
            TargetKind::LoadBalancer => self.load_balancers,
            TargetKind::VpcEndpoint => self.vpc_endpoints,
            TargetKind::NetworkInterface => self.network_interfaces,
            TargetKind::SecurityGroup => self.security_groups,
        }
    }

    fn counts_mut(&mut self, kind: TargetKind) -> &mut KindCounts {
        match kind {
            TargetKind::LoadBalancer => &mut self.load_balancers,
            TargetKind::VpcEndpoint => &mut self.vpc_endpoints,
            TargetKind::NetworkInterface => &mut self.network_interfaces,
            TargetKind::SecurityGroup => &mut self.security_groups,
        }
    }

    pub fn record(&mut self, target: CleanupTarget, outcome: TargetOutcome) {
        match outcome {
            TargetOutcome::Removed => self.counts_mut(target.kind).removed += 1,
            TargetOutcome::Ignored(reason) => {
                warn!(
                    kind = %target.kind,
                    id = %target.id,
                    vpc = %target.vpc_id,
                    "ignoring {} {} because {reason}",
                    target.kind,
                    target.id
                );
                self.counts_mut(target.kind).ignored += 1;
                self.ignored.push((target, reason));
            }
        }
    }

    pub fn removed(&self) -> usize {
        self.load_balancers.removed
            + self.vpc_endpoints.removed
            + self.network_interfaces.removed
            + self.security_groups.removed
    }

    /// Nothing removed and nothing ignored.
    pub fn is_empty(&self) -> bool {
        self.removed() == 0 && self.ignored.is_empty()
    }
}

async fn retried<T, F, Fut>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    label: &str,
    op: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    policy.run_if(clock, label, op, ApiError::is_retryable).await
}

pub struct CleanupSequencer {
    network: Arc<dyn NetworkApi>,
    load_balancers: Arc<dyn LoadBalancerApi>,
    parameters: Arc<dyn ParameterStore>,
    clock: Arc<dyn Clock>,
    config: Arc<OrbitConfig>,
    retry: RetryPolicy,
}

impl CleanupSequencer {
    pub fn new(
        network: Arc<dyn NetworkApi>,
        load_balancers: Arc<dyn LoadBalancerApi>,
        parameters: Arc<dyn ParameterStore>,
        clock: Arc<dyn Clock>,
        config: Arc<OrbitConfig>,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        Self {
            network,
            load_balancers,
            parameters,
            clock,
            config,
            retry,
        }
    }

    /// Clean the vpc recorded in the environment context, if there is one.
    pub async fn run_for_environment(&self) -> Result<CleanupReport, OrbitError> {
        let env = &self.config.environment.name;
        let name = environment_context_parameter_name(env);
        let context: Option<EnvironmentContext> = get_json(self.parameters.as_ref(), &name).await?;
        match context.and_then(|c| c.networking.vpc_id) {
            Some(vpc_id) => self.run(&vpc_id).await,
            None => {
                info!(env = %env, "no vpc recorded for environment, skipping cleanup");
                Ok(CleanupReport::default())
            }
        }
    }

    pub async fn run(&self, vpc_id: &VpcId) -> Result<CleanupReport, OrbitError> {
        info!(vpc = %vpc_id, "cleaning up remaining dependencies");
        let mut report = CleanupReport::default();
        self.load_balancers(&mut report).await?;
        self.vpc_endpoints(vpc_id, &mut report).await?;
        self.network_interfaces(vpc_id, &mut report).await?;
        self.security_groups(vpc_id, &mut report).await?;
        info!(
            vpc = %vpc_id,
            removed = report.removed(),
            ignored = report.ignored.len(),
            "cleanup finished"
        );
        Ok(report)
    }

    async fn load_balancers(&self, report: &mut CleanupReport) -> Result<(), OrbitError> {
        let env = self.config.environment.name.as_str();
        let removed = retried(&self.retry, self.clock.as_ref(), "delete_load_balancers", || {
            self.load_balancers.delete_environment_load_balancers(env)
        })
        .await?;
        debug!(env, removed, "load balancers deleted");
        report.load_balancers.removed += removed;
        Ok(())
    }

    async fn vpc_endpoints(
        &self,
        vpc_id: &VpcId,
        report: &mut CleanupReport,
    ) -> Result<(), OrbitError> {
        let page_size = self.config.cleanup.endpoint_page_size;
        let mut token: Option<String> = None;
        loop {
            let page = retried(&self.retry, self.clock.as_ref(), "describe_vpc_endpoints", || {
                self.network
                    .describe_vpc_endpoints(vpc_id, page_size, token.clone())
            })
            .await?;
            let ids: Vec<VpcEndpointId> = page
                .items
                .into_iter()
                .filter(|e| &e.vpc_id == vpc_id)
                .map(|e| e.id)
                .collect();
            if !ids.is_empty() {
                debug!(vpc = %vpc_id, count = ids.len(), "deleting vpc endpoints");
                retried(&self.retry, self.clock.as_ref(), "delete_vpc_endpoints", || {
                    self.network.delete_vpc_endpoints(&ids)
                })
                .await?;
                report.vpc_endpoints.removed += ids.len();
            }
            match page.next_token {
                Some(next) => token = Some(next),
                None => return Ok(()),
            }
        }
    }

    async fn network_interfaces(
        &self,
        vpc_id: &VpcId,
        report: &mut CleanupReport,
    ) -> Result<(), OrbitError> {
        let interfaces = retried(
            &self.retry,
            self.clock.as_ref(),
            "describe_network_interfaces",
            || self.network.describe_network_interfaces(vpc_id),
        )
        .await?;

        for eni in interfaces.into_iter().filter(|e| &e.vpc_id == vpc_id) {
            if eni.is_nat_gateway() {
                debug!(eni = %eni.id, "skipping NAT gateway interface");
                continue;
            }
            if !eni.is_attached() {
                debug!(eni = %eni.id, "network interface is not attached, leaving it");
                continue;
            }
            debug!(eni = %eni.id, "forgotten network interface");
            let target = CleanupTarget::new(TargetKind::NetworkInterface, &eni.id, vpc_id);
            let outcome = match self.remove_interface(eni).await {
                Ok(outcome) => outcome,
                Err(e) => match e.class() {
                    ErrorClass::Benign(reason) if INTERFACE_BENIGN.contains(&reason) => {
                        TargetOutcome::Ignored(IgnoreReason::Benign(reason))
                    }
                    _ => return Err(e.into()),
                },
            };
            report.record(target, outcome);
        }
        Ok(())
    }

    /// Detach an attached interface, then delete it once it reports detached.
    async fn remove_interface(&self, mut eni: NetworkInterface) -> Result<TargetOutcome, ApiError> {
        let clock = self.clock.as_ref();
        let max_attempts = self.config.cleanup.detach_attempts;
        let mut attempts = 0;
        while !eni.is_detached() {
            if attempts >= max_attempts {
                return Ok(TargetOutcome::Ignored(IgnoreReason::DetachTimeout { attempts }));
            }
            if let Some(attachment) = &eni.attachment {
                debug!(eni = %eni.id, "detaching network interface");
                let attachment_id = attachment.attachment_id.as_str();
                retried(&self.retry, clock, "detach_network_interface", || {
                    self.network.detach_network_interface(attachment_id)
                })
                .await?;
            }
            let id = eni.id.clone();
            eni = retried(&self.retry, clock, "reload_network_interface", || {
                self.network.reload_network_interface(&id)
            })
            .await?;
            attempts += 1;
            clock.sleep(self.config.cleanup.detach_pause()).await;
        }
        retried(&self.retry, clock, "delete_network_interface", || {
            self.network.delete_network_interface(&eni.id)
        })
        .await?;
        debug!(eni = %eni.id, "network interface deleted");
        Ok(TargetOutcome::Removed)
    }

    async fn security_groups(
        &self,
        vpc_id: &VpcId,
        report: &mut CleanupReport,
    ) -> Result<(), OrbitError> {
        let groups = retried(
            &self.retry,
            self.clock.as_ref(),
            "describe_security_groups",
            || self.network.describe_security_groups(vpc_id),
        )
        .await?;
        let ids: Vec<SecurityGroupId> = groups
            .into_iter()
            .filter(|sg| &sg.vpc_id == vpc_id && !sg.is_default())
            .map(|sg| sg.id)
            .collect();
        if ids.is_empty() {
            return Ok(());
        }

        let remover = SecurityGroupRemover {
            network: Arc::clone(&self.network),
            clock: Arc::clone(&self.clock),
            retry: self.retry.clone(),
            dependent_wait: self.config.cleanup.dependent_object_wait(),
        };
        let jobs = ids
            .iter()
            .map(|id| {
                let remover = remover.clone();
                let target = CleanupTarget::new(TargetKind::SecurityGroup, id, vpc_id);
                let id = id.clone();
                Job::new(id.to_string(), async move {
                    let outcome = remover.remove(&id).await?;
                    Ok((target, outcome))
                })
            })
            .collect();

        let outcomes = WorkerPool::sized_to(ids.len()).run_all(jobs).await?;
        for (target, outcome) in outcomes {
            report.record(target, outcome);
        }
        Ok(())
    }
}

/// Owned handles for one security group worker.
#[derive(Clone)]
struct SecurityGroupRemover {
    network: Arc<dyn NetworkApi>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    dependent_wait: Duration,
}

impl SecurityGroupRemover {
    async fn remove(&self, id: &SecurityGroupId) -> Result<TargetOutcome, OrbitError> {
        match self.try_remove(id).await {
            Ok(()) => {
                debug!(sg = %id, "security group deleted");
                Ok(TargetOutcome::Removed)
            }
            Err(e) => match e.class() {
                ErrorClass::Benign(
                    reason @ (BenignReason::AlreadyGone | BenignReason::DependentObject),
                ) => Ok(TargetOutcome::Ignored(IgnoreReason::Benign(reason))),
                _ => Err(e.into()),
            },
        }
    }

    async fn try_remove(&self, id: &SecurityGroupId) -> Result<(), ApiError> {
        let clock = self.clock.as_ref();
        let group = retried(&self.retry, clock, "reload_security_group", || {
            self.network.reload_security_group(id)
        })
        .await?;
        if !group.ingress.is_empty() {
            retried(&self.retry, clock, "revoke_ingress", || {
                self.network.revoke_ingress(id, &group.ingress)
            })
            .await?;
        }

        let delete = || self.network.delete_security_group(id);
        match retried(&self.retry, clock, "delete_security_group", delete).await {
            Err(e) if e.class() == ErrorClass::Benign(BenignReason::DependentObject) => {
                warn!(
                    sg = %id,
                    wait_secs = self.dependent_wait.as_secs(),
                    "waiting to have security group free of dependents"
                );
                clock.sleep(self.dependent_wait).await;
                retried(&self.retry, clock, "delete_security_group", delete).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::network::{Attachment, AttachmentStatus, IpPermission};
    use crate::domain::team::fixtures;
    use crate::domain::{SecurityGroup, Service, VpcEndpoint};
    use crate::impls::{
        FixedClock, InMemoryLoadBalancers, InMemoryNetwork, InMemoryParameterStore, NetworkOp,
    };
    use crate::ports::parameter_store::put_json;
    use chrono::Utc;

    const VPC: &str = "vpc-0abc";
    const OTHER_VPC: &str = "vpc-other";

    struct Harness {
        network: Arc<InMemoryNetwork>,
        lbs: Arc<InMemoryLoadBalancers>,
        params: Arc<InMemoryParameterStore>,
        clock: Arc<FixedClock>,
        sequencer: CleanupSequencer,
    }

    fn harness() -> Harness {
        let network = Arc::new(InMemoryNetwork::new());
        let lbs = Arc::new(InMemoryLoadBalancers::new());
        let params = Arc::new(InMemoryParameterStore::new());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let sequencer = CleanupSequencer::new(
            network.clone(),
            lbs.clone(),
            params.clone(),
            clock.clone(),
            Arc::new(OrbitConfig::default()),
        );
        Harness {
            network,
            lbs,
            params,
            clock,
            sequencer,
        }
    }

    fn vpc() -> VpcId {
        VpcId::new(VPC)
    }

    fn eni(id: &str, vpc: &str, description: &str, status: Option<AttachmentStatus>) -> NetworkInterface {
        NetworkInterface {
            id: id.into(),
            vpc_id: vpc.into(),
            description: description.into(),
            attachment: status.map(|status| Attachment {
                attachment_id: format!("{id}-attach"),
                status,
            }),
        }
    }

    fn sg(id: &str, name: &str, vpc: &str, with_ingress: bool) -> SecurityGroup {
        SecurityGroup {
            id: id.into(),
            name: name.into(),
            vpc_id: vpc.into(),
            ingress: if with_ingress {
                vec![IpPermission {
                    protocol: "tcp".into(),
                    from_port: Some(443),
                    to_port: Some(443),
                    cidr_ranges: vec!["10.0.0.0/16".into()],
                    source_groups: vec![],
                }]
            } else {
                vec![]
            },
        }
    }

    fn dependency_violation(id: &str) -> ApiError {
        ApiError::new(
            Service::Ec2,
            "DependencyViolation",
            format!("resource {id} has a dependent object"),
        )
    }

    async fn populate(h: &Harness) {
        h.lbs.add("orbit-dev-lb-1", "dev").await;
        h.lbs.add("orbit-dev-lb-2", "dev").await;
        h.lbs.add("orbit-prod-lb", "prod").await;

        for i in 0..30 {
            h.network
                .add_endpoint(VpcEndpoint {
                    id: format!("vpce-{i:02}").as_str().into(),
                    vpc_id: vpc(),
                    service_name: "com.amazonaws.us-east-1.s3".into(),
                })
                .await;
        }
        h.network
            .add_endpoint(VpcEndpoint {
                id: "vpce-foreign".into(),
                vpc_id: OTHER_VPC.into(),
                service_name: "com.amazonaws.us-east-1.s3".into(),
            })
            .await;

        h.network
            .add_interface(eni("eni-nat", VPC, "Interface for NAT Gateway nat-1", Some(AttachmentStatus::Attached)))
            .await;
        h.network
            .add_interface(eni("eni-lambda", VPC, "AWS Lambda VPC ENI", Some(AttachmentStatus::Attached)))
            .await;
        h.network.add_interface(eni("eni-loose", VPC, "", None)).await;
        h.network
            .add_interface(eni("eni-foreign", OTHER_VPC, "", None))
            .await;

        h.network.add_security_group(sg("sg-default", "default", VPC, false)).await;
        h.network.add_security_group(sg("sg-users", "orbit-dev-users", VPC, true)).await;
        h.network.add_security_group(sg("sg-efs", "orbit-dev-efs", VPC, false)).await;
        h.network
            .add_security_group(sg("sg-foreign", "orbit-prod-users", OTHER_VPC, false))
            .await;
    }

    #[tokio::test]
    async fn removes_everything_in_scope_and_second_run_is_empty() {
        let h = harness();
        populate(&h).await;

        let report = h.sequencer.run(&vpc()).await.unwrap();

        assert_eq!(report.load_balancers.removed, 2);
        assert_eq!(report.vpc_endpoints.removed, 30);
        assert_eq!(report.network_interfaces.removed, 1);
        assert_eq!(report.security_groups.removed, 2);
        assert!(report.ignored.is_empty());
        assert_eq!(h.network.endpoint_batches().await, vec![25, 5]);

        // 対象外の vpc / NAT / default は残る
        assert_eq!(h.lbs.remaining().await, 1);
        assert_eq!(h.network.endpoint_count().await, 1);
        assert!(h.network.interface(&"eni-nat".into()).await.is_some());
        assert!(h.network.interface(&"eni-loose".into()).await.is_some());
        assert!(h.network.interface(&"eni-foreign".into()).await.is_some());
        assert!(h.network.security_group(&"sg-default".into()).await.is_some());
        assert!(h.network.security_group(&"sg-foreign".into()).await.is_some());

        let again = h.sequencer.run(&vpc()).await.unwrap();
        assert!(again.is_empty(), "{again:?}");
    }

    #[tokio::test]
    async fn ingress_is_revoked_before_delete() {
        let h = harness();
        h.network.add_security_group(sg("sg-users", "orbit-dev-users", VPC, true)).await;
        h.network.add_security_group(sg("sg-bare", "orbit-dev-bare", VPC, false)).await;

        h.sequencer.run(&vpc()).await.unwrap();

        assert_eq!(h.network.calls(NetworkOp::RevokeIngress).await, vec!["sg-users"]);
        let mut deleted = h.network.calls(NetworkOp::DeleteSecurityGroup).await;
        deleted.sort();
        assert_eq!(deleted, vec!["sg-bare", "sg-users"]);
    }

    #[tokio::test]
    async fn dependent_security_group_waits_once_then_deletes() {
        let h = harness();
        h.network.add_security_group(sg("sg-users", "orbit-dev-users", VPC, false)).await;
        h.network
            .fail_next(NetworkOp::DeleteSecurityGroup, "sg-users", dependency_violation("sg-users"))
            .await;

        let report = h.sequencer.run(&vpc()).await.unwrap();

        assert_eq!(h.clock.count_of(Duration::from_secs(60)), 1);
        assert_eq!(report.security_groups.removed, 1);
        assert!(h.network.security_group(&"sg-users".into()).await.is_none());
    }

    #[tokio::test]
    async fn security_group_still_dependent_after_wait_is_ignored() {
        let h = harness();
        h.network.add_security_group(sg("sg-users", "orbit-dev-users", VPC, false)).await;
        for _ in 0..2 {
            h.network
                .fail_next(NetworkOp::DeleteSecurityGroup, "sg-users", dependency_violation("sg-users"))
                .await;
        }

        let report = h.sequencer.run(&vpc()).await.unwrap();

        assert_eq!(report.security_groups.ignored, 1);
        assert_eq!(
            report.ignored[0].1,
            IgnoreReason::Benign(BenignReason::DependentObject)
        );
        assert_eq!(h.clock.count_of(Duration::from_secs(60)), 1);
    }

    #[tokio::test]
    async fn security_group_gone_mid_run_is_ignored() {
        let h = harness();
        h.network.add_security_group(sg("sg-users", "orbit-dev-users", VPC, false)).await;
        h.network
            .fail_next(
                NetworkOp::ReloadSecurityGroup,
                "sg-users",
                ApiError::new(Service::Ec2, "InvalidGroup.NotFound", "The security group 'sg-users' does not exist"),
            )
            .await;

        let report = h.sequencer.run(&vpc()).await.unwrap();
        assert_eq!(report.security_groups.ignored, 1);
    }

    #[tokio::test]
    async fn unexpected_security_group_error_propagates() {
        let h = harness();
        h.network.add_security_group(sg("sg-a", "a", VPC, false)).await;
        h.network.add_security_group(sg("sg-b", "b", VPC, false)).await;
        h.network
            .fail_next(
                NetworkOp::DeleteSecurityGroup,
                "sg-a",
                ApiError::new(Service::Ec2, "InvalidParameterValue", "bad group"),
            )
            .await;

        let err = h.sequencer.run(&vpc()).await.unwrap_err();
        assert!(matches!(err, OrbitError::Api(ref e) if e.code == "InvalidParameterValue"));
        // 他のワーカーは最後まで走る
        assert!(h.network.security_group(&"sg-b".into()).await.is_none());
    }

    #[tokio::test]
    async fn interface_that_never_detaches_is_left_after_ten_attempts() {
        let h = harness();
        h.network
            .add_interface(eni("eni-stuck", VPC, "aws-K8S-i-0123", Some(AttachmentStatus::Attached)))
            .await;
        h.network.keep_attached(&"eni-stuck".into()).await;

        let report = h.sequencer.run(&vpc()).await.unwrap();

        assert_eq!(h.network.calls(NetworkOp::DetachNetworkInterface).await.len(), 10);
        assert_eq!(h.clock.count_of(Duration::from_secs(3)), 10);
        assert!(h.network.calls(NetworkOp::DeleteNetworkInterface).await.is_empty());
        assert_eq!(report.network_interfaces.ignored, 1);
        assert_eq!(
            report.ignored[0].1,
            IgnoreReason::DetachTimeout { attempts: 10 }
        );
    }

    #[tokio::test]
    async fn unattached_and_transitioning_interfaces_are_left_alone() {
        let h = harness();
        h.network
            .add_interface(eni("eni-available", VPC, "EFS mount target", None))
            .await;
        h.network
            .add_interface(eni("eni-detaching", VPC, "", Some(AttachmentStatus::Detaching)))
            .await;
        h.network
            .add_interface(eni("eni-attaching", VPC, "", Some(AttachmentStatus::Attaching)))
            .await;

        let report = h.sequencer.run(&vpc()).await.unwrap();

        assert!(report.is_empty(), "{report:?}");
        assert!(h.network.calls(NetworkOp::DetachNetworkInterface).await.is_empty());
        assert!(h.network.calls(NetworkOp::DeleteNetworkInterface).await.is_empty());
        assert!(h.network.interface(&"eni-available".into()).await.is_some());
        assert_eq!(h.clock.sleep_count(), 0);
    }

    #[tokio::test]
    async fn benign_interface_errors_do_not_stop_the_stage() {
        let h = harness();
        h.network
            .add_interface(eni("eni-a", VPC, "", Some(AttachmentStatus::Attached)))
            .await;
        h.network
            .add_interface(eni("eni-b", VPC, "", Some(AttachmentStatus::Attached)))
            .await;
        h.network
            .fail_next(
                NetworkOp::DeleteNetworkInterface,
                "eni-a",
                ApiError::new(
                    Service::Ec2,
                    "OperationNotPermitted",
                    "You are not allowed to manage 'ela-attach' attachments.",
                ),
            )
            .await;

        let report = h.sequencer.run(&vpc()).await.unwrap();

        assert_eq!(report.network_interfaces.removed, 1);
        assert_eq!(
            report.ignored[0].1,
            IgnoreReason::Benign(BenignReason::PermissionDenied)
        );
        assert!(h.network.interface(&"eni-b".into()).await.is_none());
    }

    #[tokio::test]
    async fn fatal_interface_error_aborts_before_security_groups() {
        let h = harness();
        h.network
            .add_interface(eni("eni-a", VPC, "", Some(AttachmentStatus::Attached)))
            .await;
        h.network.add_security_group(sg("sg-users", "orbit-dev-users", VPC, false)).await;
        h.network
            .fail_next(
                NetworkOp::DeleteNetworkInterface,
                "eni-a",
                ApiError::new(Service::Ec2, "InvalidParameterValue", "boom"),
            )
            .await;

        assert!(h.sequencer.run(&vpc()).await.is_err());
        assert!(h.network.security_group(&"sg-users".into()).await.is_some());
    }

    #[tokio::test]
    async fn throttled_listing_is_retried() {
        let h = harness();
        h.network
            .add_interface(eni("eni-a", VPC, "", Some(AttachmentStatus::Attached)))
            .await;
        h.network
            .fail_next(
                NetworkOp::DescribeNetworkInterfaces,
                VPC,
                ApiError::new(Service::Ec2, "RequestLimitExceeded", "Request limit exceeded."),
            )
            .await;

        let report = h.sequencer.run(&vpc()).await.unwrap();
        assert_eq!(report.network_interfaces.removed, 1);
        assert_eq!(h.network.calls(NetworkOp::DescribeNetworkInterfaces).await.len(), 2);
        // backoff plus one detach pause
        assert_eq!(h.clock.sleep_count(), 2);
    }

    #[tokio::test]
    async fn environment_without_vpc_is_skipped() {
        let h = harness();
        let report = h.sequencer.run_for_environment().await.unwrap();
        assert!(report.is_empty());
        assert_eq!(h.lbs.calls().await, 0);
    }

    #[tokio::test]
    async fn environment_vpc_comes_from_context_record() {
        let h = harness();
        populate(&h).await;
        put_json(h.params.as_ref(), "/orbit/dev/context", &fixtures::context())
            .await
            .unwrap();

        let report = h.sequencer.run_for_environment().await.unwrap();
        assert_eq!(report.security_groups.removed, 2);
    }
}
