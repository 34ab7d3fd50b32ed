//! BuildSpec: what the remote executor runs, rendered to the YAML it accepts.

use serde::{Deserialize, Serialize};

const IAC_VERSION: &str = "~=1.67.0";
const IAC_CLI_VERSION: &str = "1.67.0";
const IAC_MODULES: &[&str] = &[
    "aws_cdk.core",
    "aws-cdk.aws-ec2",
    "aws-cdk.aws-s3",
    "aws-cdk.aws-iam",
    "aws-cdk.aws-efs",
    "aws-cdk.aws-ecr",
    "aws-cdk.aws-ecs",
    "aws-cdk.aws-ssm",
    "aws-cdk.aws-kms",
    "aws-cdk.aws-cognito",
    "aws-cdk.aws-lambda",
    "aws-cdk.aws-lambda-python",
    "aws-cdk.aws-stepfunctions",
    "aws-cdk.aws-stepfunctions-tasks",
];

/// Declarative build document. Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub version: f64,
    pub phases: BuildSpecPhases,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSpecPhases {
    pub install: InstallPhase,
    pub pre_build: CommandPhase,
    pub build: CommandPhase,
    pub post_build: CommandPhase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallPhase {
    #[serde(rename = "runtime-versions")]
    pub runtime_versions: RuntimeVersions,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeVersions {
    pub python: f64,
    pub nodejs: u32,
    pub docker: u32,
}

impl Default for RuntimeVersions {
    fn default() -> Self {
        Self {
            python: 3.7,
            nodejs: 12,
            docker: 19,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandPhase {
    pub commands: Vec<String>,
}

impl BuildSpec {
    /// Render to the YAML string the build service takes as an override.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Where the remote executor gets the orbit CLI from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliSource {
    /// Editable install from the bundled sources (dev environments).
    Bundled,
    /// Public package index.
    PackageIndex,
    /// Private CodeArtifact repository, logged in before installing.
    CodeArtifact { domain: String, repository: String },
}

/// A team plugin that ships its own sources in the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSource {
    pub team: String,
    pub module: String,
}

/// Builds a [`BuildSpec`] with the standard install phase.
#[derive(Debug, Clone)]
pub struct BuildSpecBuilder {
    cli: CliSource,
    plugins: Vec<PluginSource>,
    install: Vec<String>,
    pre_build: Vec<String>,
    build: Vec<String>,
    post_build: Vec<String>,
}

impl BuildSpecBuilder {
    pub fn new(cli: CliSource) -> Self {
        Self {
            cli,
            plugins: Vec::new(),
            install: Vec::new(),
            pre_build: Vec::new(),
            build: Vec::new(),
            post_build: Vec::new(),
        }
    }

    pub fn plugins(mut self, plugins: impl IntoIterator<Item = PluginSource>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    /// Extra install commands, appended after the standard ones.
    pub fn install(mut self, commands: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.install.extend(commands.into_iter().map(Into::into));
        self
    }

    pub fn pre_build(mut self, commands: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.pre_build.extend(commands.into_iter().map(Into::into));
        self
    }

    pub fn build(mut self, commands: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.build.extend(commands.into_iter().map(Into::into));
        self
    }

    pub fn post_build(mut self, commands: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.post_build.extend(commands.into_iter().map(Into::into));
        self
    }

    pub fn finish(self) -> BuildSpec {
        let modules = IAC_MODULES
            .iter()
            .map(|m| format!("{m}{IAC_VERSION}"))
            .collect::<Vec<_>>()
            .join(" ");

        let mut install = vec![
            "nohup /usr/sbin/dockerd --host=unix:///var/run/docker.sock \
             --host=tcp://0.0.0.0:2375 --storage-driver=overlay&"
                .to_string(),
            "timeout 15 sh -c \"until docker info; do echo .; sleep 1; done\"".to_string(),
            "ls -la".to_string(),
            "cd bundle".to_string(),
            "ls -la".to_string(),
            format!("pip install kubernetes~=11.0.0 {modules}"),
            "npm -g install yarn".to_string(),
            format!("npm install -g aws-cdk@{IAC_CLI_VERSION}"),
            "curl --silent --location \"https://github.com/weaveworks/eksctl/releases/latest/download/eksctl_$(uname -s)_amd64.tar.gz\" | tar xz -C /tmp".to_string(),
            "mv /tmp/eksctl /usr/local/bin".to_string(),
            "eksctl version".to_string(),
        ];

        match &self.cli {
            CliSource::Bundled => install.push("pip install -e cli/".to_string()),
            CliSource::PackageIndex => install.push("pip install aws-orbit".to_string()),
            CliSource::CodeArtifact { domain, repository } => {
                install.push(format!(
                    "aws codeartifact login --tool pip --domain {domain} --repository {repository}"
                ));
                install.push("pip install aws-orbit".to_string());
            }
        }

        for plugin in &self.plugins {
            install.push(format!("ls -la ./{}/{}/", plugin.team, plugin.module));
            install.push(format!("pip install -e ./{}/{}/", plugin.team, plugin.module));
        }

        install.extend(self.install);

        BuildSpec {
            version: 0.2,
            phases: BuildSpecPhases {
                install: InstallPhase {
                    runtime_versions: RuntimeVersions::default(),
                    commands: install,
                },
                pre_build: CommandPhase {
                    commands: self.pre_build,
                },
                build: CommandPhase {
                    commands: self.build,
                },
                post_build: CommandPhase {
                    commands: self.post_build,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_keeps_phase_order() {
        let spec = BuildSpecBuilder::new(CliSource::PackageIndex)
            .build(["orbit remote --command deploy_image cdk=false jupyter-hub "])
            .finish();
        let yaml = spec.to_yaml().unwrap();

        let positions: Vec<usize> = ["version:", "install:", "pre_build:", "build:", "post_build:"]
            .iter()
            .map(|k| yaml.find(k).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{yaml}");
        assert!(yaml.contains("runtime-versions:"));
        assert!(yaml.starts_with("version: 0.2"));
    }

    #[test]
    fn cli_source_picks_install_commands() {
        let bundled = BuildSpecBuilder::new(CliSource::Bundled).finish();
        assert!(bundled
            .phases
            .install
            .commands
            .contains(&"pip install -e cli/".to_string()));

        let private = BuildSpecBuilder::new(CliSource::CodeArtifact {
            domain: "orbit".into(),
            repository: "python".into(),
        })
        .finish();
        let cmds = &private.phases.install.commands;
        let login = cmds.iter().position(|c| c.starts_with("aws codeartifact login")).unwrap();
        let install = cmds.iter().position(|c| c == "pip install aws-orbit").unwrap();
        assert!(login < install);
    }

    #[test]
    fn plugins_and_extra_commands_follow_standard_install() {
        let spec = BuildSpecBuilder::new(CliSource::PackageIndex)
            .plugins([PluginSource {
                team: "lake-creator".into(),
                module: "hello".into(),
            }])
            .install(["echo done"])
            .finish();
        let cmds = &spec.phases.install.commands;
        assert_eq!(cmds.last().map(String::as_str), Some("echo done"));
        assert!(cmds.contains(&"pip install -e ./lake-creator/hello/".to_string()));
        assert!(spec.phases.pre_build.commands.is_empty());
    }

    #[test]
    fn yaml_parses_back() {
        let spec = BuildSpecBuilder::new(CliSource::Bundled)
            .post_build(["echo bye"])
            .finish();
        let back: BuildSpec = serde_yaml::from_str(&spec.to_yaml().unwrap()).unwrap();
        assert_eq!(back, spec);
    }
}
