//! Domain model (IDs, build snapshots, network resources, team stacks, error classes).
//!
//! I/O を持たない純粋な型だけを置く。

pub mod build;
pub mod buildspec;
pub mod errors;
pub mod ids;
pub mod network;
pub mod team;

pub use build::{
    BuildInfo, BuildLogs, BuildPhase, BuildPhaseContext, BuildPhaseStatus, BuildPhaseType,
    BuildStatus, RawBuild,
};
pub use buildspec::{BuildSpec, BuildSpecBuilder, CliSource, PluginSource};
pub use errors::{ApiError, BenignReason, ErrorClass, Service, classify};
pub use ids::{BuildId, Id, NetworkInterfaceId, SecurityGroupId, VpcEndpointId, VpcId};
pub use network::{
    CleanupTarget, IgnoreReason, NetworkInterface, Page, SecurityGroup, TargetKind,
    TargetOutcome, VpcEndpoint,
};
pub use team::{EnvironmentContext, PlanError, StackOutputs, TeamParameters, TeamStackPlan};
