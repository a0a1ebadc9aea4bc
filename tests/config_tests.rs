use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use synclog::config::{generate::generate_starter_config, load_config, ConfigError};
use tempfile::TempDir;

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("config.yml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_generated_config_is_valid() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(&temp_dir, &generate_starter_config());

    let config = load_config(&config_path).expect("Generated config should be valid");

    assert_eq!(config.collectors, vec!["logs"]);
    assert_eq!(config.logs.target.pod_prefix, "linuxptp-daemon-");
    assert_eq!(config.logs.target.container, "linuxptp-daemon-container");
    assert_eq!(config.logs.poll_interval, Duration::from_secs(2));
    assert_eq!(config.logs.keep_generations, 5);
    assert_eq!(config.exec.kubectl, PathBuf::from("kubectl"));
    assert!(config.exec.kubeconfig.is_none());
}

#[test]
fn test_full_config_overrides_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(
        &temp_dir,
        r#"
collectors: [all]
poll_count: 30
results_buffer: 8
exec:
  kubectl: /usr/local/bin/oc
  kubeconfig: /etc/kube/config
logs:
  target:
    namespace: ptp
    pod_prefix: ptp-operator-
    container: daemon
  output: /var/log/synclog/ptp.txt
  include_timestamps: false
  poll_interval: 1s
  follow_duration: 1500ms
  follow_timeout: 10s
  overlap: 3s
  keep_generations: 2
  rollover_cycles: 0
  shutdown_grace: 250ms
  slice_buffer: 4
  line_buffer: 16
  fault_buffer: 2
"#,
    );

    let config = load_config(&config_path).unwrap();
    assert_eq!(config.collectors, vec!["all"]);
    assert_eq!(config.poll_count, Some(30));
    assert_eq!(config.results_buffer, 8);
    assert_eq!(config.exec.kubectl, PathBuf::from("/usr/local/bin/oc"));
    assert_eq!(config.exec.kubeconfig, Some(PathBuf::from("/etc/kube/config")));

    let logs = &config.logs;
    assert_eq!(logs.output, PathBuf::from("/var/log/synclog/ptp.txt"));
    assert!(!logs.include_timestamps);
    assert_eq!(logs.follow_duration, Duration::from_millis(1500));
    assert_eq!(logs.overlap, Duration::from_secs(3));
    assert_eq!(logs.rollover_cycles, 0);
    assert_eq!(logs.shutdown_grace, Duration::from_millis(250));

    let settings = logs.poll_settings();
    assert_eq!(settings.follow_timeout, Duration::from_secs(10));
    assert_eq!(settings.rollover_cycles, 0);
}

#[test]
fn test_env_var_expansion_in_file() {
    std::env::set_var("SYNCLOG_TEST_NAMESPACE", "openshift-ptp-test");

    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(
        &temp_dir,
        r#"
logs:
  target:
    namespace: $env{SYNCLOG_TEST_NAMESPACE}
    pod_prefix: linuxptp-daemon-
    container: linuxptp-daemon-container
"#,
    );

    let config = load_config(&config_path).unwrap();
    assert_eq!(config.logs.target.namespace, "openshift-ptp-test");
}

#[test]
fn test_unset_env_var_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(
        &temp_dir,
        r#"
logs:
  target:
    namespace: $env{SYNCLOG_TEST_DEFINITELY_UNSET}
    pod_prefix: linuxptp-daemon-
    container: linuxptp-daemon-container
"#,
    );

    let err = load_config(&config_path).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
    assert!(err.to_string().contains("SYNCLOG_TEST_DEFINITELY_UNSET"));
}

#[test]
fn test_validation_collects_every_problem() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(
        &temp_dir,
        r#"
poll_count: 0
logs:
  target:
    namespace: ""
    pod_prefix: linuxptp-daemon-
    container: linuxptp-daemon-container
  poll_interval: 0s
  keep_generations: 0
  line_buffer: 0
"#,
    );

    let err = load_config(&config_path).unwrap_err();
    let ConfigError::ValidationList(errors) = err else {
        panic!("expected a validation list, got {:?}", err);
    };
    assert_eq!(errors.len(), 5);
    assert!(errors.iter().any(|e| e.starts_with("poll_count")));
    assert!(errors.iter().any(|e| e.starts_with("logs.target.namespace")));
    assert!(errors.iter().any(|e| e.starts_with("logs.poll_interval")));
    assert!(errors.iter().any(|e| e.starts_with("logs.keep_generations")));
    assert!(errors.iter().any(|e| e.starts_with("logs.line_buffer")));
}

#[test]
fn test_missing_target_is_a_parse_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(&temp_dir, "collectors: [logs]\n");

    let err = load_config(&config_path).unwrap_err();
    assert!(err.to_string().contains(&config_path.display().to_string()));
}

#[test]
fn test_missing_file_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let err = load_config(&temp_dir.path().join("absent.yml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}
