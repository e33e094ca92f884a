//! The IAM user paired with a bucket and its inline policy.

use log::{debug, info};

use crate::{
  desired::InlinePolicy,
  gateway::{ignore_not_found, CloudGateway, GatewayError},
  Error,
};

/// Create the user if needed, (re)apply its restricted inline policy and drop any other inline policy
pub async fn ensure_identity(gateway: &dyn CloudGateway, policy: &InlinePolicy) -> Result<(), Error> {
  match gateway.create_user(&policy.user_name).await {
    Ok(()) => info!("Created IAM user {}", policy.user_name),
    Err(GatewayError::AlreadyExists(_)) => debug!("IAM user {} already exists", policy.user_name),
    Err(e) => return Err(e.into()),
  }
  gateway.put_user_policy(policy).await?;

  // a renamed bucket leaves the policy for the old name behind
  for stale in gateway.list_user_policies(&policy.user_name).await? {
    if stale != policy.policy_name {
      ignore_not_found(gateway.delete_user_policy(&policy.user_name, &stale).await)?;
      info!("Removed stale inline policy {} from IAM user {}", stale, policy.user_name);
    }
  }
  Ok(())
}

/// Remove every inline policy, every access key and finally the user. Absence at any step is success.
pub async fn teardown_identity(gateway: &dyn CloudGateway, user_name: &str) -> Result<(), Error> {
  let policies = match gateway.list_user_policies(user_name).await {
    Ok(policies) => policies,
    Err(GatewayError::NotFound(_)) => {
      debug!("IAM user {} already gone", user_name);
      return Ok(());
    }
    Err(e) => return Err(e.into()),
  };
  for policy_name in &policies {
    ignore_not_found(gateway.delete_user_policy(user_name, policy_name).await)?;
  }
  let keys = match gateway.list_access_keys(user_name).await {
    Ok(keys) => keys,
    Err(GatewayError::NotFound(_)) => Vec::new(),
    Err(e) => return Err(e.into()),
  };
  for key in &keys {
    ignore_not_found(gateway.delete_access_key(user_name, &key.access_key_id).await)?;
  }
  ignore_not_found(gateway.delete_user(user_name).await)?;
  info!(
    "Deleted IAM user {} with {} inline policy(ies) and {} access key(s)",
    user_name,
    policies.len(),
    keys.len()
  );
  Ok(())
}
