use std::sync::Arc;

use orbit_core::app::{CleanupSequencer, CodeBuild, RemoteRunner, TeamDeployer};
use orbit_core::domain::network::{Attachment, AttachmentStatus};
use orbit_core::domain::team::{
    Networking, PluginContext, Subnet, TeamContext, environment_context_parameter_name,
};
use orbit_core::domain::{EnvironmentContext, NetworkInterface, SecurityGroup, VpcId};
use orbit_core::impls::{
    InMemoryBuildService, InMemoryLoadBalancers, InMemoryNetwork, InMemoryParameterStore,
    InMemoryStackEngine, SystemClock,
};
use orbit_core::observability::init_tracing;
use orbit_core::ports::parameter_store::put_json;
use orbit_core::ports::{Clock, UlidGenerator};
use orbit_core::{OrbitConfig, OrbitError};
use tracing::{error, info};

const TEAM: &str = "lake-creator";

/// 環境コンテキスト（本来は環境デプロイが書き込む）
fn seed_context(config: &OrbitConfig) -> EnvironmentContext {
    let env = &config.environment;
    EnvironmentContext {
        name: env.name.clone(),
        account_id: env.account_id.clone(),
        region: env.region.clone(),
        networking: Networking {
            vpc_id: Some(VpcId::new("vpc-0demo")),
            availability_zones: vec![format!("{}a", env.region)],
            private_subnets: vec![Subnet {
                subnet_id: "subnet-0demo".to_string(),
                availability_zone: format!("{}a", env.region),
                route_table_id: "rtb-0demo".to_string(),
            }],
            isolated_subnets: vec![],
            internet_accessible: true,
        },
        scratch_bucket_arn: Some(format!("arn:aws:s3:::orbit-{}-scratch", env.name)),
        shared_efs_fs_id: Some("fs-0demo".to_string()),
        shared_efs_sg_id: Some("sg-0efs".to_string()),
        teams: vec![TeamContext {
            name: TEAM.to_string(),
            policies: vec![],
            image: None,
            plugins: vec![PluginContext {
                name: "hello".to_string(),
                module: Some("hello".to_string()),
                path: Some("plugins/hello".to_string()),
            }],
        }],
    }
}

/// Leftovers a torn-down environment typically has.
async fn seed_leftovers(network: &InMemoryNetwork, lbs: &InMemoryLoadBalancers, env_name: &str) {
    let vpc = VpcId::new("vpc-0demo");
    lbs.add(format!("orbit-{env_name}-jupyterhub"), env_name).await;
    network
        .add_interface(NetworkInterface {
            id: "eni-0demo".into(),
            vpc_id: vpc.clone(),
            description: "aws-K8S-i-0demo".to_string(),
            attachment: Some(Attachment {
                attachment_id: "eni-attach-0demo".to_string(),
                status: AttachmentStatus::Attached,
            }),
        })
        .await;
    for (id, name) in [("sg-0default", "default"), ("sg-0users", "orbit-users")] {
        network
            .add_security_group(SecurityGroup {
                id: id.into(),
                name: name.to_string(),
                vpc_id: vpc.clone(),
                ingress: vec![],
            })
            .await;
    }
}

async fn run(config: Arc<OrbitConfig>) -> Result<(), OrbitError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let builds = Arc::new(InMemoryBuildService::new());
    let network = Arc::new(InMemoryNetwork::new());
    let lbs = Arc::new(InMemoryLoadBalancers::new());
    let params = Arc::new(InMemoryParameterStore::new());
    let engine = Arc::new(InMemoryStackEngine::new());

    let context = seed_context(&config);
    let context_param = environment_context_parameter_name(&config.environment.name);
    put_json(params.as_ref(), &context_param, &context).await?;
    seed_leftovers(&network, &lbs, &config.environment.name).await;

    let codebuild = CodeBuild::new(builds.clone(), clock.clone(), config.clone());
    let runner = RemoteRunner::new(
        codebuild,
        Arc::new(UlidGenerator::new(clock.clone())),
        params.clone(),
        config.clone(),
    );
    let deployed = runner
        .deploy_remotely(|b| info!(phase = %b.current_phase, status = %b.status, "deploy progress"))
        .await?;
    info!(build_id = %deployed.build_id, "environment deployed");
    let images = runner.deploy_images_remotely().await?;
    info!(images = images.len(), "workbench images ready");

    let deployer = TeamDeployer::new(engine, params.clone(), clock.clone(), config.clone());
    let team = deployer.deploy(TEAM).await?;
    info!(team = TEAM, cluster = %team.ecs_cluster_name, "team deployed");

    let destroyed = runner
        .destroy_image("jupyter-user", |b| {
            info!(phase = %b.current_phase, status = %b.status, "destroy_image progress")
        })
        .await?;
    info!(build_id = %destroyed.build_id, "image destroyed");

    let sequencer = CleanupSequencer::new(network, lbs, params, clock, config);
    let report = sequencer.run_for_environment().await?;
    info!(
        removed = report.removed(),
        ignored = report.ignored.len(),
        "environment cleaned up"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), OrbitError> {
    let config = Arc::new(OrbitConfig::load()?);
    init_tracing(&config.logging);
    info!(env = %config.environment.name, region = %config.environment.region, "orbit starting");

    let result = run(config).await;
    if let Err(e) = &result {
        error!(error = %e, "orbit failed");
    }
    result
}
