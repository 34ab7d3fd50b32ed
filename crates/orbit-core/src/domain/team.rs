//! Team stack model: environment context in, resource plan out, parameter record back.
//!
//! The provisioning engine owns the actual resource graph. What we own is
//! handing it correctly-shaped descriptors and turning the identifiers it
//! assigns into the flat record other components read at runtime.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::buildspec::PluginSource;
use super::ids::VpcId;

/// Environment-wide context, as persisted in the parameter store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentContext {
    pub name: String,
    pub account_id: String,
    pub region: String,
    #[serde(default)]
    pub networking: Networking,
    #[serde(default)]
    pub scratch_bucket_arn: Option<String>,
    #[serde(default)]
    pub shared_efs_fs_id: Option<String>,
    #[serde(default)]
    pub shared_efs_sg_id: Option<String>,
    #[serde(default)]
    pub teams: Vec<TeamContext>,
}

impl EnvironmentContext {
    pub fn team(&self, name: &str) -> Option<&TeamContext> {
        self.teams.iter().find(|t| t.name == name)
    }

    /// Plugins that ship sources, across all teams.
    pub fn bundled_plugins(&self) -> Vec<PluginSource> {
        self.teams
            .iter()
            .flat_map(|team| {
                team.plugins.iter().filter_map(move |p| {
                    p.path.as_ref()?;
                    Some(PluginSource {
                        team: team.name.clone(),
                        module: p.module.clone()?,
                    })
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Networking {
    #[serde(default)]
    pub vpc_id: Option<VpcId>,
    #[serde(default)]
    pub availability_zones: Vec<String>,
    #[serde(default)]
    pub private_subnets: Vec<Subnet>,
    #[serde(default)]
    pub isolated_subnets: Vec<Subnet>,
    #[serde(default)]
    pub internet_accessible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Subnet {
    pub subnet_id: String,
    pub availability_zone: String,
    pub route_table_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TeamContext {
    pub name: String,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub plugins: Vec<PluginContext>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PluginContext {
    pub name: String,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("team '{0}' not found in the environment context")]
    UnknownTeam(String),

    #[error("networking vpc id was not provided in the environment context")]
    MissingVpc,

    #[error("scratch bucket was not provided in the environment context ('ScratchBucketArn')")]
    MissingScratchBucket,

    #[error("scratch bucket ARN '{0}' is malformed")]
    MalformedBucketArn(String),

    #[error("shared EFS file system ID was not provided in the environment context ('SharedEfsFsId')")]
    MissingSharedFileSystem,

    #[error(
        "shared EFS file system security group ID was not provided in the environment context ('SharedEfsSgId')"
    )]
    MissingSharedFileSystemSecurityGroup,

    #[error("stack output '{0}' is missing")]
    MissingOutput(String),
}

/// Which runtime a container runner state machine targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunnerKind {
    EcsFargate,
    EksK8sApi,
    EksFargate,
    EksEc2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum ResourceDescriptor {
    VpcImport {
        vpc_id: VpcId,
        availability_zones: Vec<String>,
    },
    SubnetImport {
        subnet_id: String,
        availability_zone: String,
        route_table_id: String,
    },
    KmsKey {
        enable_key_rotation: bool,
        retain: bool,
        admin_principals: Vec<String>,
    },
    SecurityGroup {
        name: String,
    },
    EcrRepository {
        repository_name: String,
    },
    BucketImport {
        bucket_arn: String,
        bucket_name: String,
    },
    IamRole {
        role_name: String,
        managed_policies: Vec<String>,
    },
    FileSystemImport {
        file_system_id: String,
        security_group_id: String,
    },
    AccessPoint {
        path: String,
    },
    EcsCluster {
        cluster_name: String,
    },
    TaskDefinition {
        family: String,
        image: String,
    },
    StateMachine {
        name: String,
        runner: RunnerKind,
    },
    Function {
        function_name: String,
    },
    Parameter {
        parameter_name: String,
        description: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedResource {
    pub logical_id: String,
    pub descriptor: ResourceDescriptor,
}

/// Logical ids whose physical ids make up [`TeamParameters`].
pub mod logical {
    pub const SHARED_FS: &str = "shared-fs";
    pub const ACCESS_POINT: &str = "efs-ap";
    pub const EKS_POD_ROLE: &str = "eks-pod-role";
    pub const SCRATCH_BUCKET: &str = "scratch-bucket";
    pub const ECS_CLUSTER: &str = "ecs-cluster";
    pub const CONTAINER_RUNNER: &str = "container-runner";
    pub const EKS_K8S_API: &str = "eks-k8s-api";
    pub const KMS_KEY: &str = "kms-key";
    pub const TEAM_SECURITY_GROUP: &str = "team-sg";
}

/// Declared resources for one team stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStackPlan {
    pub stack_name: String,
    pub env_name: String,
    pub team_name: String,
    pub tags: BTreeMap<String, String>,
    pub resources: Vec<PlannedResource>,
}

impl TeamStackPlan {
    pub fn build(ctx: &EnvironmentContext, team_name: &str) -> Result<Self, PlanError> {
        let team = ctx
            .team(team_name)
            .ok_or_else(|| PlanError::UnknownTeam(team_name.to_string()))?;
        let vpc_id = ctx.networking.vpc_id.clone().ok_or(PlanError::MissingVpc)?;
        let bucket_arn = ctx
            .scratch_bucket_arn
            .clone()
            .ok_or(PlanError::MissingScratchBucket)?;
        let bucket_name = bucket_name_from_arn(&bucket_arn)?;
        let fs_id = ctx
            .shared_efs_fs_id
            .clone()
            .ok_or(PlanError::MissingSharedFileSystem)?;
        let fs_sg_id = ctx
            .shared_efs_sg_id
            .clone()
            .ok_or(PlanError::MissingSharedFileSystemSecurityGroup)?;

        let env = ctx.name.as_str();
        let prefix = format!("orbit-{env}-{team_name}");
        let mut resources = Vec::new();
        let mut add = |logical_id: &str, descriptor: ResourceDescriptor| {
            resources.push(PlannedResource {
                logical_id: logical_id.to_string(),
                descriptor,
            });
        };

        add(
            "vpc",
            ResourceDescriptor::VpcImport {
                vpc_id,
                availability_zones: ctx.networking.availability_zones.clone(),
            },
        );
        // 外部に出られる環境なら private、そうでなければ isolated
        let subnets = if ctx.networking.internet_accessible {
            &ctx.networking.private_subnets
        } else {
            &ctx.networking.isolated_subnets
        };
        for s in subnets {
            add(
                &s.subnet_id,
                ResourceDescriptor::SubnetImport {
                    subnet_id: s.subnet_id.clone(),
                    availability_zone: s.availability_zone.clone(),
                    route_table_id: s.route_table_id.clone(),
                },
            );
        }
        add(
            logical::KMS_KEY,
            ResourceDescriptor::KmsKey {
                enable_key_rotation: true,
                retain: true,
                admin_principals: vec![format!("arn:aws:iam::{}:root", ctx.account_id)],
            },
        );
        add(
            logical::TEAM_SECURITY_GROUP,
            ResourceDescriptor::SecurityGroup {
                name: format!("{prefix}-users"),
            },
        );
        add(
            "repo",
            ResourceDescriptor::EcrRepository {
                repository_name: prefix.clone(),
            },
        );
        add(
            "repo-spark",
            ResourceDescriptor::EcrRepository {
                repository_name: format!("{prefix}-spark"),
            },
        );
        add(
            logical::SCRATCH_BUCKET,
            ResourceDescriptor::BucketImport {
                bucket_arn,
                bucket_name,
            },
        );
        add(
            logical::EKS_POD_ROLE,
            ResourceDescriptor::IamRole {
                role_name: format!("{prefix}-role"),
                managed_policies: team.policies.clone(),
            },
        );
        add(
            logical::SHARED_FS,
            ResourceDescriptor::FileSystemImport {
                file_system_id: fs_id,
                security_group_id: fs_sg_id,
            },
        );
        add(
            logical::ACCESS_POINT,
            ResourceDescriptor::AccessPoint {
                path: format!("/{team_name}"),
            },
        );
        add(
            logical::ECS_CLUSTER,
            ResourceDescriptor::EcsCluster {
                cluster_name: format!("{prefix}-cluster"),
            },
        );
        add(
            "ecs-execution-role",
            ResourceDescriptor::IamRole {
                role_name: format!("{prefix}-ecs-execution-role"),
                managed_policies: vec![
                    "service-role/AmazonECSTaskExecutionRolePolicy".to_string(),
                ],
            },
        );
        add(
            "ecs-task-definition",
            ResourceDescriptor::TaskDefinition {
                family: format!("{prefix}-task"),
                image: team
                    .image
                    .clone()
                    .unwrap_or_else(|| format!("orbit-{env}-jupyter-user")),
            },
        );
        add(
            "container-runner-role",
            ResourceDescriptor::IamRole {
                role_name: format!("{prefix}-runner"),
                managed_policies: vec![],
            },
        );
        for (logical_id, runner) in [
            ("ecs-fargate-runner", RunnerKind::EcsFargate),
            (logical::EKS_K8S_API, RunnerKind::EksK8sApi),
            ("eks-fargate-runner", RunnerKind::EksFargate),
            ("eks-ec2-runner", RunnerKind::EksEc2),
        ] {
            add(
                logical_id,
                ResourceDescriptor::StateMachine {
                    name: format!("{prefix}-{logical_id}"),
                    runner,
                },
            );
        }
        add(
            logical::CONTAINER_RUNNER,
            ResourceDescriptor::Function {
                function_name: format!("{prefix}-container-runner"),
            },
        );
        add(
            "team-parameter",
            ResourceDescriptor::Parameter {
                parameter_name: team_parameter_name(env, team_name),
                description: "Orbit Workbench Team Context.".to_string(),
            },
        );
        add(
            "user-profiles-parameter",
            ResourceDescriptor::Parameter {
                parameter_name: user_profiles_parameter_name(env, team_name),
                description: "Team additional profiles created by the team users".to_string(),
            },
        );

        let tags = BTreeMap::from([
            ("Env".to_string(), format!("orbit-{env}")),
            ("TeamSpace".to_string(), team_name.to_string()),
        ]);

        Ok(Self {
            stack_name: prefix,
            env_name: env.to_string(),
            team_name: team_name.to_string(),
            tags,
            resources,
        })
    }

    pub fn resource(&self, logical_id: &str) -> Option<&ResourceDescriptor> {
        self.resources
            .iter()
            .find(|r| r.logical_id == logical_id)
            .map(|r| &r.descriptor)
    }
}

fn bucket_name_from_arn(arn: &str) -> Result<String, PlanError> {
    arn.split_once(":::")
        .map(|(_, name)| name.to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| PlanError::MalformedBucketArn(arn.to_string()))
}

pub fn team_parameter_name(env: &str, team: &str) -> String {
    format!("/orbit/{env}/teams/{team}/team")
}

pub fn user_profiles_parameter_name(env: &str, team: &str) -> String {
    format!("/orbit/{env}/teams/{team}/user/profiles")
}

pub fn environment_context_parameter_name(env: &str) -> String {
    format!("/orbit/{env}/context")
}

/// Physical ids the engine assigned, keyed by logical id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutputs(pub BTreeMap<String, String>);

impl StackOutputs {
    pub fn get(&self, logical_id: &str) -> Option<&str> {
        self.0.get(logical_id).map(String::as_str)
    }

    pub fn require(&self, logical_id: &str) -> Result<String, PlanError> {
        self.get(logical_id)
            .map(str::to_string)
            .ok_or_else(|| PlanError::MissingOutput(logical_id.to_string()))
    }
}

/// Flat record other components read to find a team's resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TeamParameters {
    pub efs_id: String,
    pub efs_ap_id: String,
    pub eks_pod_role_arn: String,
    pub scratch_bucket: String,
    pub ecs_cluster_name: String,
    pub container_runner_arn: String,
    pub eks_k8s_api_arn: String,
    pub team_kms_key_arn: String,
    pub team_security_group_id: String,
}

impl TeamParameters {
    pub fn from_outputs(outputs: &StackOutputs) -> Result<Self, PlanError> {
        Ok(Self {
            efs_id: outputs.require(logical::SHARED_FS)?,
            efs_ap_id: outputs.require(logical::ACCESS_POINT)?,
            eks_pod_role_arn: outputs.require(logical::EKS_POD_ROLE)?,
            scratch_bucket: outputs.require(logical::SCRATCH_BUCKET)?,
            ecs_cluster_name: outputs.require(logical::ECS_CLUSTER)?,
            container_runner_arn: outputs.require(logical::CONTAINER_RUNNER)?,
            eks_k8s_api_arn: outputs.require(logical::EKS_K8S_API)?,
            team_kms_key_arn: outputs.require(logical::KMS_KEY)?,
            team_security_group_id: outputs.require(logical::TEAM_SECURITY_GROUP)?,
        })
    }
}
