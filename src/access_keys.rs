//! Keeps the credential secret and the IAM user's live access keys in lockstep.
//!
//! The secret, when present, must name the one and only live key on the user. Repair is
//! re-entrant: a pass that finds drift only discards the secret and asks to run again, and
//! the next pass takes the provisioning path which clears every key before minting one.

use log::{debug, info, warn};

use crate::{
  controller::Context,
  events::EventKind,
  gateway::ignore_not_found,
  store::CredentialSecret,
  Error, ResourceId, S3Bucket,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyState {
  /// Secret matches the single live key
  InSync,
  /// A fresh key was minted and stored, carrying its id
  Provisioned(String),
  /// Secret no longer matched the live keys and was deleted; run again now
  Discarded,
}

pub async fn reconcile_access_keys(
  ctx: &Context,
  record: &S3Bucket,
  id: &ResourceId,
  user_name: &str,
) -> Result<KeyState, Error> {
  match ctx.secrets.get_secret(id).await? {
    None => provision(ctx, record, user_name).await,
    Some(secret) => verify(ctx, record, id, user_name, &secret).await,
  }
}

async fn provision(ctx: &Context, record: &S3Bucket, user_name: &str) -> Result<KeyState, Error> {
  // leftovers from a pass that died between minting a key and storing it
  for key in ctx.gateway.list_access_keys(user_name).await? {
    debug!("Deleting stale access key {} of {}", key.access_key_id, user_name);
    ignore_not_found(ctx.gateway.delete_access_key(user_name, &key.access_key_id).await)?;
  }

  let key = ctx.gateway.create_access_key(user_name).await?;
  let secret = CredentialSecret {
    access_key_id: key.access_key_id,
    secret_access_key: key.secret_access_key,
  };
  ctx.secrets.create_secret(record, &secret).await?;

  info!("Provisioned access key {} for {}", secret.access_key_id, user_name);
  ctx
    .recorder
    .publish(
      record,
      EventKind::Normal,
      "AccessKeyProvisioned",
      format!("Stored access key {} for IAM user {}", secret.access_key_id, user_name),
    )
    .await;
  Ok(KeyState::Provisioned(secret.access_key_id))
}

async fn verify(
  ctx: &Context,
  record: &S3Bucket,
  id: &ResourceId,
  user_name: &str,
  secret: &CredentialSecret,
) -> Result<KeyState, Error> {
  let live = ctx.gateway.list_access_keys(user_name).await?;
  let matches = live.iter().any(|k| k.access_key_id == secret.access_key_id);
  if matches && live.len() == 1 {
    return Ok(KeyState::InSync);
  }

  warn!(
    "Secret {} holds key {:?} but {} has {} live key(s), discarding secret",
    id.secret_name(),
    secret.access_key_id,
    user_name,
    live.len()
  );
  // cloud keys are cleared by the provisioning path on the next pass
  ctx.secrets.delete_secret(id).await?;
  ctx
    .recorder
    .publish(
      record,
      EventKind::Warning,
      "CredentialDrift",
      format!("Access key in {} no longer matches IAM user {}", id.secret_name(), user_name),
    )
    .await;
  Ok(KeyState::Discarded)
}
