//! Pure translation of an [`S3BucketSpec`] into the payloads the cloud gateway consumes.
//!
//! Nothing here talks to AWS or Kubernetes, so the same spec always produces the same
//! inputs, including a byte-identical IAM policy document.

use serde::Serialize;

use crate::{Error, S3BucketSpec};

/// Region where S3 rejects an explicit location constraint
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketTarget {
  pub name: String,
  pub region: String,
}

impl BucketTarget {
  /// Bucket named by a spec, with an unset region meaning the default one
  pub fn from_spec(spec: &S3BucketSpec) -> Self {
    let region = if spec.region.is_empty() {
      DEFAULT_REGION.to_string()
    } else {
      spec.region.clone()
    };
    Self {
      name: spec.bucket_name.clone(),
      region,
    }
  }

  /// Virtual-hosted endpoint of the bucket
  pub fn endpoint(&self) -> String {
    format!("{}.s3.{}.amazonaws.com", self.name, self.region)
  }

  pub fn arn(&self) -> String {
    format!("arn:aws:s3:::{}", self.name)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBucket {
  pub bucket: BucketTarget,
  pub location_constraint: Option<String>,
  pub object_lock: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketAcl {
  pub bucket: BucketTarget,
  pub acl: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
  Enabled,
  Suspended,
}

impl Toggle {
  pub fn as_str(&self) -> &'static str {
    match self {
      Toggle::Enabled => "Enabled",
      Toggle::Suspended => "Suspended",
    }
  }
}

impl From<bool> for Toggle {
  fn from(enabled: bool) -> Self {
    if enabled {
      Toggle::Enabled
    } else {
      Toggle::Suspended
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioning {
  pub bucket: BucketTarget,
  pub status: Toggle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acceleration {
  pub bucket: BucketTarget,
  pub status: Toggle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPolicy {
  pub bucket: BucketTarget,
  pub document: String,
}

/// What to do with the bucket policy. An empty `bucketPolicy` removes the live one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyIntent {
  Put(BucketPolicy),
  Delete(BucketTarget),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePolicy {
  pub user_name: String,
  pub policy_name: String,
  pub document: String,
}

#[derive(Serialize)]
struct PolicyDocument<'a> {
  #[serde(rename = "Version")]
  version: &'a str,
  #[serde(rename = "Id")]
  id: &'a str,
  #[serde(rename = "Statement")]
  statements: Vec<PolicyStatement<'a>>,
}

#[derive(Serialize)]
struct PolicyStatement<'a> {
  #[serde(rename = "Sid")]
  sid: &'a str,
  #[serde(rename = "Effect")]
  effect: &'a str,
  #[serde(rename = "Action")]
  action: Vec<&'a str>,
  #[serde(rename = "Resource")]
  resource: Vec<String>,
}

/// Name of the inline policy attached to the IAM user
pub fn inline_policy_name(user_name: &str, bucket_name: &str) -> String {
  format!("{}-{}-s3-restricted", user_name, bucket_name)
}

/// Policy granting `s3:*` on the bucket and every object in it, nothing else
pub fn restricted_policy_document(policy_name: &str, bucket: &BucketTarget) -> Result<String, Error> {
  let bucket_arn = bucket.arn();
  let doc = PolicyDocument {
    version: "2012-10-17",
    id: policy_name,
    statements: vec![
      PolicyStatement {
        sid: "1",
        effect: "Allow",
        action: vec!["s3:*"],
        resource: vec![bucket_arn.clone()],
      },
      PolicyStatement {
        sid: "2",
        effect: "Allow",
        action: vec!["s3:*"],
        resource: vec![format!("{}/*", bucket_arn)],
      },
    ],
  };
  Ok(serde_json::to_string(&doc)?)
}

/// Everything one pass needs to push to the cloud for a spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
  pub bucket: BucketTarget,
  pub user_name: String,
  pub create: CreateBucket,
  pub acl: BucketAcl,
  pub versioning: Versioning,
  pub acceleration: Acceleration,
  pub policy: PolicyIntent,
  pub inline_policy: InlinePolicy,
}

impl DesiredState {
  pub fn from_spec(spec: &S3BucketSpec) -> Result<Self, Error> {
    if spec.bucket_name.trim().is_empty() {
      return Err(Error::InvalidSpec("bucketName must not be empty".into()));
    }
    if spec.iam_user.username.trim().is_empty() {
      return Err(Error::InvalidSpec("iamUser.username must not be empty".into()));
    }
    if !spec.bucket_policy.is_empty() {
      serde_json::from_str::<serde_json::Value>(&spec.bucket_policy)
        .map_err(|e| Error::InvalidSpec(format!("bucketPolicy is not valid JSON: {}", e)))?;
    }

    let bucket = BucketTarget::from_spec(spec);

    let create = CreateBucket {
      bucket: bucket.clone(),
      location_constraint: (bucket.region != DEFAULT_REGION).then(|| bucket.region.clone()),
      object_lock: spec.enable_object_lock.then_some(true),
    };

    let policy = if spec.bucket_policy.is_empty() {
      PolicyIntent::Delete(bucket.clone())
    } else {
      PolicyIntent::Put(BucketPolicy {
        bucket: bucket.clone(),
        document: spec.bucket_policy.clone(),
      })
    };

    let user_name = spec.iam_user.username.clone();
    let policy_name = inline_policy_name(&user_name, &bucket.name);
    let inline_policy = InlinePolicy {
      document: restricted_policy_document(&policy_name, &bucket)?,
      user_name: user_name.clone(),
      policy_name,
    };

    Ok(Self {
      acl: BucketAcl {
        bucket: bucket.clone(),
        acl: spec.bucket_acl.clone(),
      },
      versioning: Versioning {
        bucket: bucket.clone(),
        status: spec.enable_versioning.into(),
      },
      acceleration: Acceleration {
        bucket: bucket.clone(),
        status: spec.enable_transfer_acceleration.into(),
      },
      bucket,
      user_name,
      create,
      policy,
      inline_policy,
    })
  }
}
