//! The boundary to the cloud provider.
//!
//! Every method issues exactly one provider call. Retry and convergence live in the
//! reconcilers; implementations only translate payloads and classify failures.

use async_trait::async_trait;
use thiserror::Error;

use crate::desired::{
  Acceleration, BucketAcl, BucketPolicy, BucketTarget, CreateBucket, InlinePolicy, Versioning,
};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("{0} not found")]
  NotFound(String),
  #[error("{0} already exists")]
  AlreadyExists(String),
  #[error("{op} failed: {source}")]
  Api {
    op: &'static str,
    #[source]
    source: BoxError,
  },
}

impl GatewayError {
  pub fn api(op: &'static str, source: impl Into<BoxError>) -> Self {
    GatewayError::Api {
      op,
      source: source.into(),
    }
  }
}

/// Turn an expected absence into success
pub fn ignore_not_found(res: Result<(), GatewayError>) -> Result<(), GatewayError> {
  match res {
    Err(GatewayError::NotFound(_)) => Ok(()),
    other => other,
  }
}

/// A live access key attached to an IAM user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKey {
  pub access_key_id: String,
}

/// A freshly created access key, the only time the secret half is visible
#[derive(Clone, PartialEq, Eq)]
pub struct NewAccessKey {
  pub access_key_id: String,
  pub secret_access_key: String,
}

impl std::fmt::Debug for NewAccessKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("NewAccessKey")
      .field("access_key_id", &self.access_key_id)
      .finish_non_exhaustive()
  }
}

#[async_trait]
pub trait CloudGateway: Send + Sync {
  async fn bucket_exists(&self, bucket: &BucketTarget) -> Result<bool, GatewayError>;
  async fn create_bucket(&self, input: &CreateBucket) -> Result<(), GatewayError>;
  async fn put_bucket_acl(&self, input: &BucketAcl) -> Result<(), GatewayError>;
  async fn put_bucket_versioning(&self, input: &Versioning) -> Result<(), GatewayError>;
  async fn put_bucket_acceleration(&self, input: &Acceleration) -> Result<(), GatewayError>;
  async fn put_bucket_policy(&self, input: &BucketPolicy) -> Result<(), GatewayError>;
  async fn delete_bucket_policy(&self, bucket: &BucketTarget) -> Result<(), GatewayError>;
  async fn delete_bucket(&self, bucket: &BucketTarget) -> Result<(), GatewayError>;

  async fn create_user(&self, user_name: &str) -> Result<(), GatewayError>;
  async fn delete_user(&self, user_name: &str) -> Result<(), GatewayError>;
  async fn put_user_policy(&self, input: &InlinePolicy) -> Result<(), GatewayError>;
  async fn delete_user_policy(&self, user_name: &str, policy_name: &str) -> Result<(), GatewayError>;
  /// Names of every inline policy on the user
  async fn list_user_policies(&self, user_name: &str) -> Result<Vec<String>, GatewayError>;
  async fn list_access_keys(&self, user_name: &str) -> Result<Vec<AccessKey>, GatewayError>;
  async fn create_access_key(&self, user_name: &str) -> Result<NewAccessKey, GatewayError>;
  async fn delete_access_key(&self, user_name: &str, access_key_id: &str) -> Result<(), GatewayError>;
}
