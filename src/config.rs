//! Operator settings, read from the environment.

use std::time::Duration;

pub const DEFAULT_RESYNC_SECS: u64 = 300;
pub const DEFAULT_ERROR_REQUEUE_SECS: u64 = 60;
pub const DEFAULT_FIELD_MANAGER: &str = "s3-operator";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
  /// kubeconfig context to fall back on when not running in a cluster
  pub kube_context: Option<String>,
  /// Only watch this namespace, all namespaces when unset
  pub watch_namespace: Option<String>,
  /// Requeue interval for converged resources
  pub resync_interval: Duration,
  /// Requeue interval after an ordinary failure
  pub error_requeue: Duration,
  /// Field manager and event reporter name
  pub field_manager: String,
}

impl Default for OperatorConfig {
  fn default() -> Self {
    Self {
      kube_context: None,
      watch_namespace: None,
      resync_interval: Duration::from_secs(DEFAULT_RESYNC_SECS),
      error_requeue: Duration::from_secs(DEFAULT_ERROR_REQUEUE_SECS),
      field_manager: DEFAULT_FIELD_MANAGER.to_string(),
    }
  }
}

impl OperatorConfig {
  pub fn from_env() -> Self {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
    let secs = |key: &str, default: u64| {
      Duration::from_secs(non_empty(key).and_then(|v| v.parse().ok()).unwrap_or(default))
    };
    Self {
      kube_context: non_empty("KUBE_CTX"),
      watch_namespace: non_empty("WATCH_NAMESPACE"),
      resync_interval: secs("RESYNC_INTERVAL_SECS", DEFAULT_RESYNC_SECS),
      error_requeue: secs("ERROR_REQUEUE_SECS", DEFAULT_ERROR_REQUEUE_SECS),
      field_manager: non_empty("FIELD_MANAGER").unwrap_or_else(|| DEFAULT_FIELD_MANAGER.to_string()),
    }
  }
}
