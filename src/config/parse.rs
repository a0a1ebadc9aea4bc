use super::types::*;
use crate::config::{env_var_pattern, expand_env_vars, expand_tilde};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })
}

/// Parse and validate a config from YAML text.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    // Expand environment variables in the YAML string before parsing
    let yaml_string = expand_env_vars(yaml)?;
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string)?;
    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = env_var_pattern()?;
    let mut unexpanded_vars: Vec<String> = re
        .captures_iter(yaml_string)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=value\n\
             2. Replace $env{{{0}}} in the config file with an actual value",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables\n\
             2. Replace the variables in the config file with actual values",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

fn expand_paths(config: &mut Config) {
    config.logs.output = expand_tilde(&config.logs.output);
    config.exec.kubectl = expand_tilde(&config.exec.kubectl);
    if let Some(kubeconfig) = &config.exec.kubeconfig {
        config.exec.kubeconfig = Some(expand_tilde(kubeconfig));
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.collectors.is_empty() {
        errors.push("collectors: at least one collector must be selected".to_string());
    }
    for (i, name) in config.collectors.iter().enumerate() {
        if name.trim().is_empty() {
            errors.push(format!("collectors[{}]: name cannot be empty", i));
        }
    }
    if config.poll_count == Some(0) {
        errors.push("poll_count: must be at least 1 (omit it to run until interrupted)".to_string());
    }
    if config.results_buffer == 0 {
        errors.push("results_buffer: must be at least 1".to_string());
    }

    validate_logs(&config.logs, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_logs(logs: &LogsConfig, errors: &mut Vec<String>) {
    let target = &logs.target;
    for (field, value) in [
        ("namespace", &target.namespace),
        ("pod_prefix", &target.pod_prefix),
        ("container", &target.container),
    ] {
        if value.trim().is_empty() {
            errors.push(format!("logs.target.{}: cannot be empty", field));
        }
    }

    if logs.output.as_os_str().is_empty() {
        errors.push("logs.output: cannot be empty".to_string());
    }

    for (field, value) in [
        ("poll_interval", logs.poll_interval),
        ("follow_duration", logs.follow_duration),
        ("follow_timeout", logs.follow_timeout),
    ] {
        if value == Duration::ZERO {
            errors.push(format!("logs.{}: must be greater than zero", field));
        }
    }

    if logs.keep_generations == 0 {
        errors.push("logs.keep_generations: must be at least 1".to_string());
    }

    for (field, value) in [
        ("slice_buffer", logs.slice_buffer),
        ("line_buffer", logs.line_buffer),
        ("fault_buffer", logs.fault_buffer),
    ] {
        if value == 0 {
            errors.push(format!("logs.{}: must be at least 1", field));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
logs:
  target:
    namespace: openshift-ptp
    pod_prefix: linuxptp-daemon-
    container: linuxptp-daemon-container
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.collectors, vec!["logs"]);
        assert_eq!(config.poll_count, None);
        assert_eq!(config.logs.poll_interval, Duration::from_secs(2));
        assert_eq!(config.logs.follow_timeout, Duration::from_secs(60));
        assert_eq!(config.logs.keep_generations, 5);
        assert_eq!(config.logs.line_buffer, 1000);
        assert!(config.logs.include_timestamps);
    }

    #[test]
    fn test_humantime_durations() {
        let yaml = format!("{}  follow_duration: 500ms\n  overlap: 2s\n", MINIMAL);
        let config = parse_config(&yaml).unwrap();
        assert_eq!(config.logs.follow_duration, Duration::from_millis(500));
        assert_eq!(config.logs.overlap, Duration::from_secs(2));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let yaml = r#"
poll_count: 0
logs:
  target:
    namespace: ""
    pod_prefix: daemon-
    container: ""
  keep_generations: 0
  poll_interval: 0s
"#;
        match parse_config(yaml) {
            Err(ConfigError::ValidationList(errors)) => {
                assert_eq!(errors.len(), 5, "{:?}", errors);
                assert!(errors.iter().any(|e| e.contains("logs.target.namespace")));
                assert!(errors.iter().any(|e| e.contains("poll_count")));
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_target_is_parse_error() {
        let result = parse_config("logs:\n  output: x.txt\n");
        assert!(matches!(result, Err(ConfigError::YamlParse(_))));
    }

    #[test]
    fn test_unexpanded_env_var_reported() {
        let yaml = format!(
            "{}  output: $env{{SYNCLOG_SURELY_UNSET_VAR}}/logs.txt\n",
            MINIMAL
        );
        match parse_config(&yaml) {
            Err(ConfigError::Validation(msg)) => {
                assert!(msg.contains("SYNCLOG_SURELY_UNSET_VAR"))
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
