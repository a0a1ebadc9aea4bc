pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# SYNCLOG CONFIGURATION
# =============================================================================
# This file configures which collectors run and how the container log of the
# timing-sync daemon is followed, deduplicated and written out.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/synclog/config.yml
#   3. /etc/synclog/config.yml
#
# Any value may reference an environment variable as $env{...}.

# Collectors to run. Use "all" to run every registered collector.
collectors: [logs]

# Stop after this many polls per collector. Omit to run until Ctrl+C.
# poll_count: 100

# Capacity of the channel carrying poll results back to the harness
results_buffer: 64

# =============================================================================
# REMOTE EXECUTION
# =============================================================================

exec:
  # kubectl binary used to list pods and follow container logs
  kubectl: kubectl
  # Optional kubeconfig; the kubectl default is used when omitted
  # kubeconfig: ~/.kube/config

# =============================================================================
# LOG COLLECTOR
# =============================================================================

logs:
  target:
    namespace: openshift-ptp
    # The first pod whose name starts with this prefix is followed
    pod_prefix: linuxptp-daemon-
    container: linuxptp-daemon-container

  # Output file, opened for append
  output: ./logs.txt
  # true: write lines as received; false: strip the leading timestamp
  include_timestamps: true

  # How often a new log request is issued
  poll_interval: 2s
  # How long each request keeps the stream open
  follow_duration: 2s
  # Give up on a request that has not returned within this time
  follow_timeout: 60s
  # Extra look-back so consecutive requests overlap
  overlap: 1s

  # Generations kept in memory before the oldest are flushed to the output
  keep_generations: 5
  # Completed polls before a new generation starts (0 = only on rotation)
  rollover_cycles: 10
  # Longest an in-flight request keeps streaming after Ctrl+C
  shutdown_grace: 5s

  # Channel capacities between poller, flusher and writer
  slice_buffer: 100
  line_buffer: 1000
  fault_buffer: 64
"#
    .to_string()
}
