use crate::config::{load_config, Config, ConfigError};
use crate::exec::{ExecContext, KubectlExec};
use crate::harness::{builtin_registry, CollectorContext, Harness, HarnessError, HarnessReport};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("harness error: {0}")]
    Harness(#[from] HarnessError),

    #[error("collectors failed: {}", .0.join(", "))]
    CollectorsFailed(Vec<String>),
}

/// Command-line values that take precedence over the config file
#[derive(Debug, Default, Clone)]
pub struct RunOverrides {
    pub collectors: Vec<String>,
    pub poll_count: Option<u64>,
    pub output: Option<PathBuf>,
}

impl RunOverrides {
    fn apply(self, config: &mut Config) {
        if !self.collectors.is_empty() {
            config.collectors = self.collectors;
        }
        if self.poll_count.is_some() {
            config.poll_count = self.poll_count;
        }
        if let Some(output) = self.output {
            config.logs.output = output;
        }
    }
}

pub async fn run(
    config_path: Option<PathBuf>,
    overrides: RunOverrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path.ok_or(
        "config not found\n\
         Searched locations:\n  ~/.config/synclog/config.yml\n  /etc/synclog/config.yml\n\n\
         Use --config <path> to specify a config file, or run 'synclog config init' to generate one.",
    )?;

    info!(config_path = %config_path.display(), "Loading configuration");
    let mut config = load_config(&config_path)?;
    overrides.apply(&mut config);

    let exec: Arc<dyn ExecContext> = Arc::new(KubectlExec::new(
        config.exec.kubectl.clone(),
        config.exec.kubeconfig.clone(),
    ));

    info!("Collection started, press Ctrl+C to shutdown");
    let report = collect(Arc::new(config), exec, ctrl_c()).await?;
    if !report.failed.is_empty() {
        return Err(RunError::CollectorsFailed(report.failed).into());
    }
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C, only the poll count can stop collection");
        std::future::pending::<()>().await;
    }
}

/// Build the configured collectors and run them until `signal` resolves or
/// every collector has used up its poll count.
pub async fn collect<F>(
    config: Arc<Config>,
    exec: Arc<dyn ExecContext>,
    signal: F,
) -> Result<HarnessReport, RunError>
where
    F: Future<Output = ()> + Send,
{
    let registry = builtin_registry();
    let selected = registry.select(&config.collectors)?;
    info!(collectors = ?selected, poll_count = ?config.poll_count, "Selected collectors");

    let shutdown = CancellationToken::new();
    let context = CollectorContext {
        config: config.clone(),
        exec,
        shutdown: shutdown.clone(),
    };

    let collectors = selected
        .iter()
        .map(|name| registry.build(name, &context))
        .collect::<Result<Vec<_>, _>>()?;

    let harness = Harness::new(collectors, config.poll_count, config.results_buffer, shutdown);
    let report = harness.run_until(signal).await?;

    info!(
        polls = report.total_polls(),
        errors = report.total_errors(),
        "Collection finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ContainerRef;

    fn config() -> Config {
        Config::with_target(ContainerRef {
            namespace: "ns".to_string(),
            pod_prefix: "daemon-".to_string(),
            container: "c".to_string(),
        })
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let mut config = config();
        RunOverrides {
            collectors: vec!["all".to_string()],
            poll_count: Some(4),
            output: Some(PathBuf::from("/tmp/out.txt")),
        }
        .apply(&mut config);

        assert_eq!(config.collectors, vec!["all"]);
        assert_eq!(config.poll_count, Some(4));
        assert_eq!(config.logs.output, PathBuf::from("/tmp/out.txt"));
    }

    #[test]
    fn test_empty_overrides_keep_config() {
        let mut config = config();
        config.poll_count = Some(2);
        RunOverrides::default().apply(&mut config);
        assert_eq!(config.collectors, vec!["logs"]);
        assert_eq!(config.poll_count, Some(2));
    }

    #[tokio::test]
    async fn test_unknown_collector_fails_before_running() {
        let mut config = config();
        config.collectors = vec!["phc2sys".to_string()];
        let exec: Arc<dyn ExecContext> = Arc::new(KubectlExec::new("kubectl", None));

        let result = collect(Arc::new(config), exec, std::future::ready(())).await;
        assert!(matches!(
            result,
            Err(RunError::Harness(HarnessError::UnknownCollector(_)))
        ));
    }
}
