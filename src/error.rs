use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum Error {
  #[error("Kube error: {0}")]
  Kube(#[from] kube::Error),
  #[error("Cloud error: {0}")]
  Cloud(#[from] GatewayError),
  #[error("Policy document error: {0}")]
  Policy(#[from] serde_json::Error),
  #[error("Invalid spec: {0}")]
  InvalidSpec(String),
  #[error("Store error: {0}")]
  Store(String),
}

impl Error {
  /// Errors that will recur identically until the resource itself changes
  pub fn is_fatal(&self) -> bool {
    matches!(self, Error::Policy(_) | Error::InvalidSpec(_))
  }
}
