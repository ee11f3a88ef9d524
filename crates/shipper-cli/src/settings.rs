//! Flag and config-file merging.
//!
//! Precedence: flags, then the config file, then `AWS_*` environment
//! variables for whatever `[aws]` values are still unset.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Args;
use shipper_core::config::AwsConfig;
use shipper_core::{ContainerImage, ShipperConfig};
use shipper_rollout::DeployRequest;

#[derive(Debug, Clone, Default, Args)]
pub struct DeployArgs {
    /// Config file (default: config/config.toml, optional)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Container images to update, e.g. --containers web=repo/web:v2 --containers worker=repo/worker:v2
    #[arg(long = "containers", value_name = "NAME=IMAGE")]
    pub containers: Vec<String>,

    /// ECS task definition family
    #[arg(long)]
    pub task: Option<String>,

    /// ECS service name or ARN
    #[arg(long)]
    pub service: Option<String>,

    /// ECS cluster name or ARN
    #[arg(long)]
    pub cluster: Option<String>,

    /// AWS region
    #[arg(long)]
    pub region: Option<String>,

    /// Deregister the previous task definition revision (default)
    #[arg(short, long, conflicts_with = "keep_previous")]
    pub deregister: bool,

    /// Leave the previous task definition revision active
    #[arg(long)]
    pub keep_previous: bool,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Run against an in-memory orchestrator seeded from a JSON fixture
    #[arg(long, value_name = "FIXTURE")]
    pub dry_run: Option<PathBuf>,
}

/// Everything needed to run one rollout.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub request: DeployRequest,
    pub aws: AwsConfig,
    pub timeout: Option<Duration>,
    pub dry_run: Option<PathBuf>,
}

impl DeployArgs {
    /// Merge flags over `config`, then fill AWS settings from `env`.
    pub fn resolve(
        &self,
        mut config: ShipperConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Resolved> {
        if let Some(region) = &self.region {
            config.aws.region = Some(region.clone());
        }
        config.apply_env(env);

        let ecs = &mut config.ecs;
        for (slot, flag) in [
            (&mut ecs.task, &self.task),
            (&mut ecs.service, &self.service),
            (&mut ecs.cluster, &self.cluster),
        ] {
            if flag.is_some() {
                slot.clone_from(flag);
            }
        }
        if !self.containers.is_empty() {
            ecs.containers = self.containers.clone();
        }
        if self.deregister {
            ecs.deregister = Some(true);
        } else if self.keep_previous {
            ecs.deregister = Some(false);
        }

        let Some(task) = non_empty(&config.ecs.task) else {
            bail!("no ECS Task Definition family specified");
        };
        let Some(service) = non_empty(&config.ecs.service) else {
            bail!("no ECS Service specified");
        };
        let Some(cluster) = non_empty(&config.ecs.cluster) else {
            bail!("no ECS Cluster specified");
        };
        if config.ecs.containers.is_empty() {
            bail!("no containers specified");
        }
        let images: Vec<ContainerImage> = config
            .containers()
            .context("invalid --containers value")?;

        let mut request = DeployRequest::new(task, images, cluster, service);
        request.retire_previous = config.deregister();

        Ok(Resolved {
            request,
            aws: config.aws,
            timeout: self
                .timeout
                .or(config.deploy.timeout_secs)
                .map(Duration::from_secs),
            dry_run: self.dry_run.clone(),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: DeployArgs,
    }

    fn parse(argv: &[&str]) -> DeployArgs {
        TestCli::parse_from(std::iter::once("shipper").chain(argv.iter().copied())).args
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn file_config() -> ShipperConfig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[aws]
region = "eu-west-1"

[ecs]
task = "api"
service = "svc"
cluster = "prod"
containers = ["web=img:v1"]
deregister = false

[deploy]
timeout_secs = 300
"#,
        )
        .unwrap();
        ShipperConfig::load(Some(path.as_path())).unwrap().0
    }

    #[test]
    fn flags_override_config() {
        let args = parse(&[
            "--containers", "web=img:v2",
            "--containers", "sidecar=img:s2",
            "--service", "svc-blue",
            "--region", "us-east-1",
            "-d",
            "--timeout", "60",
        ]);
        let resolved = args.resolve(file_config(), no_env).unwrap();

        assert_eq!(resolved.request.family, "api");
        assert_eq!(resolved.request.service, "svc-blue");
        assert_eq!(resolved.request.images.len(), 2);
        assert_eq!(resolved.request.images[1], ContainerImage::new("sidecar", "img:s2"));
        assert!(resolved.request.retire_previous);
        assert_eq!(resolved.aws.region.as_deref(), Some("us-east-1"));
        assert_eq!(resolved.timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn config_values_used_without_flags() {
        let resolved = parse(&[]).resolve(file_config(), no_env).unwrap();
        assert_eq!(resolved.request.cluster, "prod");
        assert!(!resolved.request.retire_previous);
        assert_eq!(resolved.timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn env_fills_unset_aws_values_only() {
        let env = |key: &str| match key {
            "AWS_REGION" => Some("ap-south-1".to_string()),
            "AWS_ACCESS_KEY_ID" => Some("AKID".to_string()),
            _ => None,
        };
        let resolved = parse(&[]).resolve(file_config(), env).unwrap();
        assert_eq!(resolved.aws.region.as_deref(), Some("eu-west-1"));
        assert_eq!(resolved.aws.access_key_id.as_deref(), Some("AKID"));
    }

    #[test]
    fn missing_values_are_reported() {
        let err = parse(&[]).resolve(ShipperConfig::default(), no_env).unwrap_err();
        assert_eq!(err.to_string(), "no ECS Task Definition family specified");

        let err = parse(&["--task", "api", "--service", "svc", "--cluster", "prod"])
            .resolve(ShipperConfig::default(), no_env)
            .unwrap_err();
        assert_eq!(err.to_string(), "no containers specified");
    }

    #[test]
    fn malformed_container_pair_is_rejected() {
        let err = parse(&["--containers", "web"])
            .resolve(file_config(), no_env)
            .unwrap_err();
        assert!(err.to_string().contains("invalid --containers value"));
    }

    #[test]
    fn keep_previous_and_deregister_conflict() {
        let result = TestCli::try_parse_from(["shipper", "-d", "--keep-previous"]);
        assert!(result.is_err());
    }

    #[test]
    fn deregister_defaults_to_true() {
        let mut config = file_config();
        config.ecs.deregister = None;
        let resolved = parse(&[]).resolve(config, no_env).unwrap();
        assert!(resolved.request.retire_previous);
    }
}
