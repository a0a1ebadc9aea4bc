use crate::collector::poller::PollSettings;
use crate::exec::ContainerRef;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Collectors to run, by registry name, or `all`
    #[serde(default = "default_collectors")]
    pub collectors: Vec<String>,
    /// Polls per collector before stopping; unset runs until interrupted
    #[serde(default)]
    pub poll_count: Option<u64>,
    #[serde(default = "default_results_buffer")]
    pub results_buffer: usize,
    #[serde(default)]
    pub exec: ExecConfig,
    pub logs: LogsConfig,
}

fn default_collectors() -> Vec<String> {
    vec!["logs".to_string()]
}

fn default_results_buffer() -> usize {
    64
}

impl Config {
    /// Config with defaults everywhere except the log target.
    pub fn with_target(target: ContainerRef) -> Self {
        Self {
            collectors: default_collectors(),
            poll_count: None,
            results_buffer: default_results_buffer(),
            exec: ExecConfig::default(),
            logs: LogsConfig::with_target(target),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    #[serde(default = "default_kubectl")]
    pub kubectl: PathBuf,
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
}

fn default_kubectl() -> PathBuf {
    PathBuf::from("kubectl")
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            kubectl: default_kubectl(),
            kubeconfig: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    pub target: ContainerRef,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Write raw lines when true, timestamp-stripped content otherwise
    #[serde(default = "default_include_timestamps")]
    pub include_timestamps: bool,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_follow_duration", with = "humantime_serde")]
    pub follow_duration: Duration,
    #[serde(default = "default_follow_timeout", with = "humantime_serde")]
    pub follow_timeout: Duration,
    #[serde(default = "default_overlap", with = "humantime_serde")]
    pub overlap: Duration,
    #[serde(default = "default_keep_generations")]
    pub keep_generations: u32,
    #[serde(default = "default_rollover_cycles")]
    pub rollover_cycles: u32,
    #[serde(default = "default_shutdown_grace", with = "humantime_serde")]
    pub shutdown_grace: Duration,
    #[serde(default = "default_slice_buffer")]
    pub slice_buffer: usize,
    #[serde(default = "default_line_buffer")]
    pub line_buffer: usize,
    #[serde(default = "default_fault_buffer")]
    pub fault_buffer: usize,
}

fn default_output() -> PathBuf {
    PathBuf::from("./logs.txt")
}

fn default_include_timestamps() -> bool {
    true
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_follow_duration() -> Duration {
    Duration::from_secs(2)
}

fn default_follow_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_overlap() -> Duration {
    Duration::from_secs(1)
}

fn default_keep_generations() -> u32 {
    5
}

fn default_rollover_cycles() -> u32 {
    10
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_slice_buffer() -> usize {
    100
}

fn default_line_buffer() -> usize {
    1000
}

fn default_fault_buffer() -> usize {
    64
}

impl LogsConfig {
    pub fn with_target(target: ContainerRef) -> Self {
        Self {
            target,
            output: default_output(),
            include_timestamps: default_include_timestamps(),
            poll_interval: default_poll_interval(),
            follow_duration: default_follow_duration(),
            follow_timeout: default_follow_timeout(),
            overlap: default_overlap(),
            keep_generations: default_keep_generations(),
            rollover_cycles: default_rollover_cycles(),
            shutdown_grace: default_shutdown_grace(),
            slice_buffer: default_slice_buffer(),
            line_buffer: default_line_buffer(),
            fault_buffer: default_fault_buffer(),
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            follow_duration: self.follow_duration,
            follow_timeout: self.follow_timeout,
            overlap: self.overlap,
            rollover_cycles: self.rollover_cycles,
            shutdown_grace: self.shutdown_grace,
        }
    }
}
