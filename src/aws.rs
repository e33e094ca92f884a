//! [`CloudGateway`] backed by the AWS SDK.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::{
  config::Region,
  error::{ProvideErrorMetadata, SdkError},
  operation::head_bucket::HeadBucketError,
  types::{
    AccelerateConfiguration, BucketAccelerateStatus, BucketCannedAcl, BucketLocationConstraint,
    BucketVersioningStatus, CreateBucketConfiguration, VersioningConfiguration,
  },
};
use log::debug;

use crate::{
  desired::{
    Acceleration, BucketAcl, BucketPolicy, BucketTarget, CreateBucket, InlinePolicy, Toggle, Versioning,
  },
  gateway::{AccessKey, CloudGateway, GatewayError, NewAccessKey},
};

const NOT_FOUND_CODES: &[&str] = &["NoSuchBucket", "NoSuchEntity", "NoSuchBucketPolicy", "NotFound"];
const ALREADY_EXISTS_CODES: &[&str] = &["BucketAlreadyOwnedByYou", "EntityAlreadyExists"];

/// Sort an SDK failure into the gateway's error classes
fn classify<E, R>(op: &'static str, subject: &str, err: SdkError<E, R>) -> GatewayError
where
  E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
  R: std::fmt::Debug + Send + Sync + 'static,
{
  match err.as_service_error().and_then(|e| e.code()) {
    Some(code) if NOT_FOUND_CODES.contains(&code) => GatewayError::NotFound(subject.to_string()),
    Some(code) if ALREADY_EXISTS_CODES.contains(&code) => GatewayError::AlreadyExists(subject.to_string()),
    _ => GatewayError::api(op, err),
  }
}

/// S3 clients are built per bucket region from one shared config; IAM is global
pub struct AwsGateway {
  config: SdkConfig,
  iam: aws_sdk_iam::Client,
}

impl AwsGateway {
  pub fn new(config: &SdkConfig) -> Self {
    Self {
      config: config.clone(),
      iam: aws_sdk_iam::Client::new(config),
    }
  }

  fn s3(&self, bucket: &BucketTarget) -> aws_sdk_s3::Client {
    let conf = aws_sdk_s3::config::Builder::from(&self.config)
      .region(Region::new(bucket.region.clone()))
      .build();
    aws_sdk_s3::Client::from_conf(conf)
  }
}

fn versioning_status(t: Toggle) -> BucketVersioningStatus {
  match t {
    Toggle::Enabled => BucketVersioningStatus::Enabled,
    Toggle::Suspended => BucketVersioningStatus::Suspended,
  }
}

fn accelerate_status(t: Toggle) -> BucketAccelerateStatus {
  match t {
    Toggle::Enabled => BucketAccelerateStatus::Enabled,
    Toggle::Suspended => BucketAccelerateStatus::Suspended,
  }
}

#[async_trait]
impl CloudGateway for AwsGateway {
  async fn bucket_exists(&self, bucket: &BucketTarget) -> Result<bool, GatewayError> {
    match self.s3(bucket).head_bucket().bucket(&bucket.name).send().await {
      Ok(_) => Ok(true),
      Err(e) if e.as_service_error().is_some_and(HeadBucketError::is_not_found) => Ok(false),
      Err(e) => Err(GatewayError::api("HeadBucket", e)),
    }
  }

  async fn create_bucket(&self, input: &CreateBucket) -> Result<(), GatewayError> {
    debug!("CreateBucket {:?}", input);
    let location = input.location_constraint.as_ref().map(|region| {
      CreateBucketConfiguration::builder()
        .location_constraint(BucketLocationConstraint::from(region.as_str()))
        .build()
    });
    self
      .s3(&input.bucket)
      .create_bucket()
      .bucket(&input.bucket.name)
      .set_create_bucket_configuration(location)
      .set_object_lock_enabled_for_bucket(input.object_lock)
      .send()
      .await
      .map_err(|e| classify("CreateBucket", &input.bucket.name, e))?;
    Ok(())
  }

  async fn put_bucket_acl(&self, input: &BucketAcl) -> Result<(), GatewayError> {
    self
      .s3(&input.bucket)
      .put_bucket_acl()
      .bucket(&input.bucket.name)
      .acl(BucketCannedAcl::from(input.acl.as_str()))
      .send()
      .await
      .map_err(|e| classify("PutBucketAcl", &input.bucket.name, e))?;
    Ok(())
  }

  async fn put_bucket_versioning(&self, input: &Versioning) -> Result<(), GatewayError> {
    let conf = VersioningConfiguration::builder()
      .status(versioning_status(input.status))
      .build();
    self
      .s3(&input.bucket)
      .put_bucket_versioning()
      .bucket(&input.bucket.name)
      .versioning_configuration(conf)
      .send()
      .await
      .map_err(|e| classify("PutBucketVersioning", &input.bucket.name, e))?;
    Ok(())
  }

  async fn put_bucket_acceleration(&self, input: &Acceleration) -> Result<(), GatewayError> {
    let conf = AccelerateConfiguration::builder()
      .status(accelerate_status(input.status))
      .build();
    self
      .s3(&input.bucket)
      .put_bucket_accelerate_configuration()
      .bucket(&input.bucket.name)
      .accelerate_configuration(conf)
      .send()
      .await
      .map_err(|e| classify("PutBucketAccelerateConfiguration", &input.bucket.name, e))?;
    Ok(())
  }

  async fn put_bucket_policy(&self, input: &BucketPolicy) -> Result<(), GatewayError> {
    self
      .s3(&input.bucket)
      .put_bucket_policy()
      .bucket(&input.bucket.name)
      .policy(&input.document)
      .send()
      .await
      .map_err(|e| classify("PutBucketPolicy", &input.bucket.name, e))?;
    Ok(())
  }

  async fn delete_bucket_policy(&self, bucket: &BucketTarget) -> Result<(), GatewayError> {
    self
      .s3(bucket)
      .delete_bucket_policy()
      .bucket(&bucket.name)
      .send()
      .await
      .map_err(|e| classify("DeleteBucketPolicy", &bucket.name, e))?;
    Ok(())
  }

  async fn delete_bucket(&self, bucket: &BucketTarget) -> Result<(), GatewayError> {
    self
      .s3(bucket)
      .delete_bucket()
      .bucket(&bucket.name)
      .send()
      .await
      .map_err(|e| classify("DeleteBucket", &bucket.name, e))?;
    Ok(())
  }

  async fn create_user(&self, user_name: &str) -> Result<(), GatewayError> {
    self
      .iam
      .create_user()
      .user_name(user_name)
      .send()
      .await
      .map_err(|e| classify("CreateUser", user_name, e))?;
    Ok(())
  }

  async fn delete_user(&self, user_name: &str) -> Result<(), GatewayError> {
    self
      .iam
      .delete_user()
      .user_name(user_name)
      .send()
      .await
      .map_err(|e| classify("DeleteUser", user_name, e))?;
    Ok(())
  }

  async fn put_user_policy(&self, input: &InlinePolicy) -> Result<(), GatewayError> {
    self
      .iam
      .put_user_policy()
      .user_name(&input.user_name)
      .policy_name(&input.policy_name)
      .policy_document(&input.document)
      .send()
      .await
      .map_err(|e| classify("PutUserPolicy", &input.user_name, e))?;
    Ok(())
  }

  async fn delete_user_policy(&self, user_name: &str, policy_name: &str) -> Result<(), GatewayError> {
    self
      .iam
      .delete_user_policy()
      .user_name(user_name)
      .policy_name(policy_name)
      .send()
      .await
      .map_err(|e| classify("DeleteUserPolicy", policy_name, e))?;
    Ok(())
  }

  async fn list_user_policies(&self, user_name: &str) -> Result<Vec<String>, GatewayError> {
    let out = self
      .iam
      .list_user_policies()
      .user_name(user_name)
      .send()
      .await
      .map_err(|e| classify("ListUserPolicies", user_name, e))?;
    Ok(out.policy_names().to_vec())
  }

  async fn list_access_keys(&self, user_name: &str) -> Result<Vec<AccessKey>, GatewayError> {
    let out = self
      .iam
      .list_access_keys()
      .user_name(user_name)
      .send()
      .await
      .map_err(|e| classify("ListAccessKeys", user_name, e))?;
    Ok(
      out
        .access_key_metadata()
        .iter()
        .filter_map(|k| k.access_key_id())
        .map(|id| AccessKey {
          access_key_id: id.to_string(),
        })
        .collect(),
    )
  }

  async fn create_access_key(&self, user_name: &str) -> Result<NewAccessKey, GatewayError> {
    let out = self
      .iam
      .create_access_key()
      .user_name(user_name)
      .send()
      .await
      .map_err(|e| classify("CreateAccessKey", user_name, e))?;
    let key = out
      .access_key()
      .ok_or_else(|| GatewayError::api("CreateAccessKey", "response carried no access key"))?;
    Ok(NewAccessKey {
      access_key_id: key.access_key_id().to_string(),
      secret_access_key: key.secret_access_key().to_string(),
    })
  }

  async fn delete_access_key(&self, user_name: &str, access_key_id: &str) -> Result<(), GatewayError> {
    self
      .iam
      .delete_access_key()
      .user_name(user_name)
      .access_key_id(access_key_id)
      .send()
      .await
      .map_err(|e| classify("DeleteAccessKey", access_key_id, e))?;
    Ok(())
  }
}
