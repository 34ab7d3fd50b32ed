//! Configuration, loaded once and passed into every component.

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};

use crate::domain::CliSource;
use crate::error::OrbitError;

pub const DEFAULT_CONFIG_FILE: &str = "orbit.toml";
pub const ENV_PREFIX: &str = "ORBIT_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitConfig {
    pub environment: EnvironmentConfig,
    pub codebuild: CodeBuildConfig,
    pub polling: PollingConfig,
    pub retry: RetryConfig,
    pub cleanup: CleanupConfig,
    pub logging: LoggingConfig,
}

impl OrbitConfig {
    /// Defaults, then `orbit.toml`, then `ORBIT_*` variables (`__` separates sections).
    pub fn load() -> Result<Self, OrbitError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: &str) -> Result<Self, OrbitError> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self, OrbitError> {
        Ok(figment.extract()?)
    }

    /// How the remote executor installs the CLI for this environment.
    pub fn cli_source(&self) -> CliSource {
        let env = &self.environment;
        if env.dev {
            return CliSource::Bundled;
        }
        match (&env.codeartifact_domain, &env.codeartifact_repository) {
            (Some(domain), Some(repository)) => CliSource::CodeArtifact {
                domain: domain.clone(),
                repository: repository.clone(),
            },
            _ => CliSource::PackageIndex,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub name: String,
    pub region: String,
    pub account_id: String,
    /// Dev environments build workbench images remotely from bundled sources.
    pub dev: bool,
    pub toolkit_bucket: String,
    pub codeartifact_domain: Option<String>,
    pub codeartifact_repository: Option<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            name: "dev".to_string(),
            region: "us-east-1".to_string(),
            account_id: "000000000000".to_string(),
            dev: false,
            toolkit_bucket: "orbit-dev-toolkit".to_string(),
            codeartifact_domain: None,
            codeartifact_repository: None,
        }
    }
}

/// Where the build container image comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum ImageSource {
    /// The project's own managed image.
    #[default]
    Codebuild,
    /// A private registry repository, pulled with the service role.
    Ecr { repository: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeBuildConfig {
    pub project_name: String,
    pub image: ImageSource,
    pub timeout_minutes: u32,
}

impl Default for CodeBuildConfig {
    fn default() -> Self {
        Self {
            project_name: "orbit-dev".to_string(),
            image: ImageSource::default(),
            timeout_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub fetch_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            fetch_attempts: 5,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_attempts: 3,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub detach_attempts: u32,
    pub detach_pause_secs: u64,
    pub dependent_object_wait_secs: u64,
    pub endpoint_page_size: usize,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            detach_attempts: 10,
            detach_pause_secs: 3,
            dependent_object_wait_secs: 60,
            endpoint_page_size: 25,
        }
    }
}

impl CleanupConfig {
    pub fn detach_pause(&self) -> Duration {
        Duration::from_secs(self.detach_pause_secs)
    }

    pub fn dependent_object_wait(&self) -> Duration {
        Duration::from_secs(self.dependent_object_wait_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One JSON object per line instead of the human format.
    pub json: bool,
}
