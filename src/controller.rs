//! The lifecycle state machine for one `S3Bucket`.
//!
//! Every pass re-reads the record and the live cloud state, then either converges the IAM
//! user, its access key and the bucket, or tears them down behind the deletion guard.
//! Nothing is cached between passes.

use std::{sync::Arc, time::Duration};

use kube::{runtime::controller::Action, Resource};
use log::{debug, error, info, warn};

use crate::{
  access_keys::{self, KeyState},
  bucket,
  desired::{BucketTarget, DesiredState},
  events::{EventKind, EventRecorder},
  finalizer, identity,
  gateway::CloudGateway,
  store::{CredentialSecretStore, ResourceStore},
  Error, Phase, ResourceId, S3Bucket, S3BucketStatus,
};

/// Collaborators a pass runs against
#[derive(Clone)]
pub struct Context {
  pub gateway: Arc<dyn CloudGateway>,
  pub resources: Arc<dyn ResourceStore>,
  pub secrets: Arc<dyn CredentialSecretStore>,
  pub recorder: Arc<dyn EventRecorder>,
}

/// Result of one reconciliation pass
#[derive(Debug)]
pub enum Outcome {
  /// Nothing left to do until something changes
  Converged,
  /// State was repaired in a way the very next pass completes
  RetryNow,
  RetryAfterBackoff(Error),
  /// Retrying the same input would fail the same way
  Fatal(Error),
}

impl Outcome {
  fn from_error(e: Error) -> Self {
    if e.is_fatal() {
      Outcome::Fatal(e)
    } else {
      Outcome::RetryAfterBackoff(e)
    }
  }

  /// Map onto the controller runtime. Backoff errors go to the error policy.
  pub fn into_action(self, resync: Duration) -> Result<Action, Error> {
    match self {
      Outcome::Converged => Ok(Action::requeue(resync)),
      Outcome::RetryNow => Ok(Action::requeue(Duration::ZERO)),
      Outcome::RetryAfterBackoff(e) => Err(e),
      Outcome::Fatal(e) => {
        error!("Giving up until the resource changes: {}", e);
        Ok(Action::await_change())
      }
    }
  }
}

pub async fn reconcile(id: &ResourceId, ctx: &Context) -> Outcome {
  let record = match ctx.resources.get(id).await {
    Ok(Some(record)) => record,
    Ok(None) => {
      debug!("{} no longer exists", id);
      return Outcome::Converged;
    }
    Err(e) => return Outcome::RetryAfterBackoff(e),
  };

  if record.is_deleting() {
    cleanup(id, &record, ctx).await
  } else {
    apply(id, &record, ctx).await
  }
}

async fn apply(id: &ResourceId, record: &S3Bucket, ctx: &Context) -> Outcome {
  match converge(id, record, ctx).await {
    Ok(KeyState::Discarded) => {
      let status = S3BucketStatus::new(
        Phase::Initializing,
        Some("Credential secret out of sync, re-provisioning".to_string()),
      );
      if let Err(e) = ctx.resources.set_status(id, &status).await {
        warn!("Failed to update status of {}: {}", id, e);
      }
      Outcome::RetryNow
    }
    Ok(_) => match ctx.resources.set_status(id, &S3BucketStatus::new(Phase::Ready, None)).await {
      Ok(()) => {
        info!("{} is ready", id);
        Outcome::Converged
      }
      Err(e) => Outcome::RetryAfterBackoff(e),
    },
    Err(e) => fail(id, record, ctx, Phase::Initializing, e).await,
  }
}

async fn converge(id: &ResourceId, record: &S3Bucket, ctx: &Context) -> Result<KeyState, Error> {
  // the guard goes on before anything exists in the cloud
  if ctx.resources.attach_guard(record).await? {
    info!("Attached deletion guard to {}", id);
    ctx
      .resources
      .set_status(id, &S3BucketStatus::new(Phase::Initializing, None))
      .await?;
  }

  let desired = DesiredState::from_spec(&record.spec)?;

  identity::ensure_identity(ctx.gateway.as_ref(), &desired.inline_policy).await?;
  let keys = access_keys::reconcile_access_keys(ctx, record, id, &desired.user_name).await?;
  if keys == KeyState::Discarded {
    return Ok(keys);
  }

  bucket::converge_bucket(ctx, record, &desired).await?;
  ctx.resources.publish_endpoint(record, &desired.bucket.endpoint()).await?;
  Ok(keys)
}

async fn cleanup(id: &ResourceId, record: &S3Bucket, ctx: &Context) -> Outcome {
  if !finalizer::is_attached(record.meta()) {
    debug!("{} is being deleted without our guard, nothing to tear down", id);
    return Outcome::Converged;
  }
  match teardown(id, record, ctx).await {
    Ok(()) => {
      info!("Tore down {}", id);
      Outcome::Converged
    }
    Err(e) => fail(id, record, ctx, Phase::Deleting, e).await,
  }
}

async fn teardown(id: &ResourceId, record: &S3Bucket, ctx: &Context) -> Result<(), Error> {
  ctx
    .resources
    .set_status(id, &S3BucketStatus::new(Phase::Deleting, None))
    .await?;

  let spec = &record.spec;
  if !spec.bucket_name.is_empty() {
    bucket::teardown_bucket(ctx.gateway.as_ref(), &BucketTarget::from_spec(spec)).await?;
  }
  let user_name = &spec.iam_user.username;
  if !user_name.is_empty() {
    identity::teardown_identity(ctx.gateway.as_ref(), user_name).await?;
  }

  ctx.resources.release_guard(record).await?;
  ctx
    .recorder
    .publish(
      record,
      EventKind::Normal,
      "TeardownComplete",
      format!("Deleted bucket {} and IAM user {}", spec.bucket_name, user_name),
    )
    .await;
  Ok(())
}

async fn fail(id: &ResourceId, record: &S3Bucket, ctx: &Context, phase: Phase, e: Error) -> Outcome {
  error!("Reconcile of {} failed: {}", id, e);
  let status = S3BucketStatus::new(phase, Some(e.to_string()));
  if let Err(status_err) = ctx.resources.set_status(id, &status).await {
    warn!("Failed to record failure on {}: {}", id, status_err);
  }
  ctx
    .recorder
    .publish(record, EventKind::Warning, "ReconcileFailed", e.to_string())
    .await;
  Outcome::from_error(e)
}
