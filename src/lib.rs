use kube::{CustomResource, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod access_keys;
pub mod aws;
pub mod bucket;
pub mod config;
pub mod controller;
pub mod desired;
mod error;
pub mod events;
pub mod finalizer;
pub mod gateway;
pub mod identity;
pub mod store;

pub use error::Error;

/// An S3 bucket plus the IAM user allowed to use it
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
  group = "s3.controlant.com",
  version = "v1",
  kind = "S3Bucket",
  shortname = "s3b",
  status = "S3BucketStatus",
  namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct S3BucketSpec {
  /// Name of the bucket in AWS
  pub bucket_name: String,
  /// Region the bucket lives in
  #[serde(default = "default_region")]
  pub region: String,
  /// Canned ACL applied to the bucket
  #[serde(rename = "bucketACL", default = "default_acl")]
  pub bucket_acl: String,
  #[serde(default)]
  pub enable_object_lock: bool,
  #[serde(default)]
  pub enable_versioning: bool,
  #[serde(default)]
  pub enable_transfer_acceleration: bool,
  /// Bucket policy document, empty means the bucket carries no policy
  #[serde(default)]
  pub bucket_policy: String,
  /// IAM user that gets access to the bucket
  pub iam_user: IamUserSpec,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct IamUserSpec {
  pub username: String,
}

fn default_region() -> String {
  desired::DEFAULT_REGION.to_string()
}

fn default_acl() -> String {
  "private".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct S3BucketStatus {
  pub phase: Phase,
  /// Last failure reason, cleared by the next successful status write
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum Phase {
  #[default]
  Initializing,
  Deleting,
  Ready,
}

impl S3BucketStatus {
  pub fn new(phase: Phase, condition: Option<String>) -> Self {
    Self { phase, condition }
  }
}

/// Identity of one managed resource: the namespaced name of its `S3Bucket` record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
  pub namespace: String,
  pub name: String,
}

impl ResourceId {
  pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      namespace: namespace.into(),
      name: name.into(),
    }
  }

  pub fn from_resource(bucket: &S3Bucket) -> Result<Self, Error> {
    let namespace = bucket
      .namespace()
      .ok_or_else(|| Error::Store(format!("S3Bucket {} has no namespace", bucket.name_any())))?;
    Ok(Self::new(namespace, bucket.name_any()))
  }

  /// Name of the secret holding this resource's IAM credentials
  pub fn secret_name(&self) -> String {
    format!("{}-iam-secret", self.name)
  }

  /// Name of the ExternalName service pointing at the bucket endpoint
  pub fn service_name(&self) -> String {
    format!("{}-s3", self.name)
  }
}

impl std::fmt::Display for ResourceId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}/{}", self.namespace, self.name)
  }
}

impl S3Bucket {
  pub fn is_deleting(&self) -> bool {
    self.meta().deletion_timestamp.is_some()
  }
}
