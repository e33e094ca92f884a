//! The control-plane boundary: `S3Bucket` records and their credential secrets.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::{
  api::core::v1::{Secret, Service, ServiceSpec},
  apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference},
  ByteString,
};
use kube::{
  api::{Api, DeleteParams, Patch, PatchParams, PostParams},
  Client, Resource,
};
use log::{debug, warn};
use serde_json::json;

use crate::{finalizer, Error, ResourceId, S3Bucket, S3BucketStatus};

pub const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";

/// The access key pair handed to bucket consumers
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSecret {
  pub access_key_id: String,
  pub secret_access_key: String,
}

impl std::fmt::Debug for CredentialSecret {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CredentialSecret")
      .field("access_key_id", &self.access_key_id)
      .finish_non_exhaustive()
  }
}

impl CredentialSecret {
  /// Read the pair out of a core/v1 secret. Missing keys decode as empty strings, which
  /// never match a live access key and so get the secret replaced.
  pub fn from_secret(secret: &Secret) -> Self {
    let field = |key: &str| -> String {
      let value = secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .map(|b| String::from_utf8_lossy(&b.0).into_owned())
        .or_else(|| secret.string_data.as_ref().and_then(|d| d.get(key).cloned()));
      value.unwrap_or_else(|| {
        warn!(
          "Secret {} has no {} entry",
          secret.metadata.name.as_deref().unwrap_or_default(),
          key
        );
        String::new()
      })
    };
    Self {
      access_key_id: field(ACCESS_KEY_ID),
      secret_access_key: field(SECRET_ACCESS_KEY),
    }
  }

  pub fn to_secret(&self, id: &ResourceId, owner: OwnerReference) -> Secret {
    let data = BTreeMap::from([
      (ACCESS_KEY_ID.to_string(), ByteString(self.access_key_id.clone().into_bytes())),
      (
        SECRET_ACCESS_KEY.to_string(),
        ByteString(self.secret_access_key.clone().into_bytes()),
      ),
    ]);
    Secret {
      metadata: ObjectMeta {
        name: Some(id.secret_name()),
        namespace: Some(id.namespace.clone()),
        owner_references: Some(vec![owner]),
        ..ObjectMeta::default()
      },
      data: Some(data),
      type_: Some("Opaque".to_string()),
      ..Secret::default()
    }
  }
}

/// The `S3Bucket` records themselves
#[async_trait]
pub trait ResourceStore: Send + Sync {
  async fn get(&self, id: &ResourceId) -> Result<Option<S3Bucket>, Error>;
  /// Attach the deletion guard. Returns true when this call attached it.
  async fn attach_guard(&self, record: &S3Bucket) -> Result<bool, Error>;
  async fn release_guard(&self, record: &S3Bucket) -> Result<(), Error>;
  async fn set_status(&self, id: &ResourceId, status: &S3BucketStatus) -> Result<(), Error>;
  /// Point an ExternalName service, owned by the record, at the bucket endpoint
  async fn publish_endpoint(&self, record: &S3Bucket, host: &str) -> Result<(), Error>;
}

/// Merge patch replacing the whole status. An absent condition is sent as null so the
/// server drops the previous one instead of keeping it.
pub fn status_patch(status: &S3BucketStatus) -> serde_json::Value {
  json!({
    "status": {
      "phase": status.phase,
      "condition": status.condition,
    }
  })
}

#[async_trait]
pub trait CredentialSecretStore: Send + Sync {
  async fn get_secret(&self, id: &ResourceId) -> Result<Option<CredentialSecret>, Error>;
  async fn create_secret(&self, owner: &S3Bucket, secret: &CredentialSecret) -> Result<(), Error>;
  /// Delete the secret, succeeding when it is already gone
  async fn delete_secret(&self, id: &ResourceId) -> Result<(), Error>;
}

pub struct KubeStore {
  client: Client,
  field_manager: String,
}

impl KubeStore {
  pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
    Self {
      client,
      field_manager: field_manager.into(),
    }
  }

  fn buckets(&self, namespace: &str) -> Api<S3Bucket> {
    Api::namespaced(self.client.clone(), namespace)
  }

  fn secrets(&self, namespace: &str) -> Api<Secret> {
    Api::namespaced(self.client.clone(), namespace)
  }

  fn owner_ref(record: &S3Bucket) -> Result<OwnerReference, Error> {
    record
      .controller_owner_ref(&())
      .ok_or_else(|| Error::Store("S3Bucket has no uid yet".to_string()))
  }

  async fn patch_finalizers(&self, record: &S3Bucket, patch: json_patch::Patch) -> Result<(), Error> {
    let id = ResourceId::from_resource(record)?;
    self
      .buckets(&id.namespace)
      .patch(&id.name, &PatchParams::default(), &Patch::<()>::Json(patch))
      .await?;
    Ok(())
  }
}

#[async_trait]
impl ResourceStore for KubeStore {
  async fn get(&self, id: &ResourceId) -> Result<Option<S3Bucket>, Error> {
    Ok(self.buckets(&id.namespace).get_opt(&id.name).await?)
  }

  async fn attach_guard(&self, record: &S3Bucket) -> Result<bool, Error> {
    match finalizer::attach_patch(record.meta()) {
      Some(patch) => {
        self.patch_finalizers(record, patch).await?;
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn release_guard(&self, record: &S3Bucket) -> Result<(), Error> {
    if let Some(patch) = finalizer::release_patch(record.meta()) {
      self.patch_finalizers(record, patch).await?;
    }
    Ok(())
  }

  async fn set_status(&self, id: &ResourceId, status: &S3BucketStatus) -> Result<(), Error> {
    debug!("Setting status of {} to {:?}", id, status);
    self
      .buckets(&id.namespace)
      .patch_status(
        &id.name,
        &PatchParams::default(),
        &Patch::Merge(status_patch(status)),
      )
      .await?;
    Ok(())
  }

  async fn publish_endpoint(&self, record: &S3Bucket, host: &str) -> Result<(), Error> {
    let id = ResourceId::from_resource(record)?;
    let svc = Service {
      metadata: ObjectMeta {
        name: Some(id.service_name()),
        namespace: Some(id.namespace.clone()),
        owner_references: Some(vec![Self::owner_ref(record)?]),
        ..ObjectMeta::default()
      },
      spec: Some(ServiceSpec {
        type_: Some("ExternalName".to_string()),
        external_name: Some(host.to_string()),
        ..ServiceSpec::default()
      }),
      ..Service::default()
    };
    Api::<Service>::namespaced(self.client.clone(), &id.namespace)
      .patch(
        &id.service_name(),
        &PatchParams::apply(&self.field_manager).force(),
        &Patch::Apply(&svc),
      )
      .await?;
    Ok(())
  }
}

#[async_trait]
impl CredentialSecretStore for KubeStore {
  async fn get_secret(&self, id: &ResourceId) -> Result<Option<CredentialSecret>, Error> {
    let secret = self.secrets(&id.namespace).get_opt(&id.secret_name()).await?;
    Ok(secret.as_ref().map(CredentialSecret::from_secret))
  }

  async fn create_secret(&self, owner: &S3Bucket, secret: &CredentialSecret) -> Result<(), Error> {
    let id = ResourceId::from_resource(owner)?;
    let obj = secret.to_secret(&id, Self::owner_ref(owner)?);
    self.secrets(&id.namespace).create(&PostParams::default(), &obj).await?;
    Ok(())
  }

  async fn delete_secret(&self, id: &ResourceId) -> Result<(), Error> {
    match self
      .secrets(&id.namespace)
      .delete(&id.secret_name(), &DeleteParams::default())
      .await
    {
      Ok(_) => Ok(()),
      Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
      Err(e) => Err(e.into()),
    }
  }
}
