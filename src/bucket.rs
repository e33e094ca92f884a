use log::{debug, info};

use crate::{
  controller::Context,
  desired::{BucketTarget, DesiredState, PolicyIntent},
  events::EventKind,
  gateway::{ignore_not_found, CloudGateway, GatewayError},
  Error, S3Bucket,
};

/// Bring one bucket to its desired configuration.
///
/// Only creation is conditional. Every other call is re-issued each pass, so a pass that
/// fails midway is finished by simply running the next one.
pub async fn converge_bucket(ctx: &Context, record: &S3Bucket, desired: &DesiredState) -> Result<(), Error> {
  let gateway = ctx.gateway.as_ref();

  if gateway.bucket_exists(&desired.bucket).await? {
    debug!("Bucket {} exists", desired.bucket.name);
  } else {
    match gateway.create_bucket(&desired.create).await {
      Ok(()) => {
        info!("Created bucket {} in {}", desired.bucket.name, desired.bucket.region);
        ctx
          .recorder
          .publish(
            record,
            EventKind::Normal,
            "BucketCreated",
            format!("Created bucket {}", desired.bucket.name),
          )
          .await;
      }
      Err(GatewayError::AlreadyExists(_)) => debug!("Bucket {} appeared concurrently", desired.bucket.name),
      Err(e) => return Err(e.into()),
    }
  }

  gateway.put_bucket_acl(&desired.acl).await?;
  gateway.put_bucket_versioning(&desired.versioning).await?;
  gateway.put_bucket_acceleration(&desired.acceleration).await?;
  apply_policy(gateway, &desired.policy).await
}

async fn apply_policy(gateway: &dyn CloudGateway, policy: &PolicyIntent) -> Result<(), Error> {
  match policy {
    PolicyIntent::Put(p) => gateway.put_bucket_policy(p).await?,
    PolicyIntent::Delete(bucket) => ignore_not_found(gateway.delete_bucket_policy(bucket).await)?,
  }
  Ok(())
}

pub async fn teardown_bucket(gateway: &dyn CloudGateway, bucket: &BucketTarget) -> Result<(), Error> {
  ignore_not_found(gateway.delete_bucket(bucket).await)?;
  info!("Deleted bucket {}", bucket.name);
  Ok(())
}
