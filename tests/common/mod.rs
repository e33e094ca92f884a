//! In-memory stand-ins for AWS, the Kubernetes API and the event recorder.
//!
//! Every call lands in one journal so tests can assert on ordering across boundaries.

#![allow(dead_code)]

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use k8s_openapi::{apimachinery::pkg::apis::meta::v1::Time, chrono::Utc};
use kube::Resource;

use operator::{
  controller::{reconcile, Context, Outcome},
  desired::{
    Acceleration, BucketAcl, BucketPolicy, BucketTarget, CreateBucket, InlinePolicy, Toggle, Versioning,
  },
  events::{EventKind, EventRecorder},
  finalizer,
  gateway::{AccessKey, CloudGateway, GatewayError, NewAccessKey},
  store::{status_patch, CredentialSecret, CredentialSecretStore, ResourceStore},
  Error, IamUserSpec, ResourceId, S3Bucket, S3BucketSpec, S3BucketStatus,
};

pub const NAMESPACE: &str = "apps";
pub const NAME: &str = "media";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeBucket {
  pub region: String,
  pub acl: Option<String>,
  pub versioning: Option<Toggle>,
  pub acceleration: Option<Toggle>,
  pub policy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeUser {
  pub policies: BTreeMap<String, String>,
  pub keys: Vec<String>,
}

#[derive(Default)]
pub struct World {
  pub journal: Vec<String>,
  pub buckets: BTreeMap<String, FakeBucket>,
  pub users: BTreeMap<String, FakeUser>,
  pub record: Option<S3Bucket>,
  pub secret: Option<CredentialSecret>,
  pub statuses: Vec<S3BucketStatus>,
  pub endpoint: Option<String>,
  pub events: Vec<String>,
  pub failing: BTreeSet<&'static str>,
  next_key: u32,
}

impl World {
  fn call(&mut self, op: &'static str, detail: impl AsRef<str>) -> bool {
    let detail = detail.as_ref();
    if detail.is_empty() {
      self.journal.push(op.to_string());
    } else {
      self.journal.push(format!("{} {}", op, detail));
    }
    self.failing.contains(op)
  }

  fn bucket_mut(&mut self, name: &str) -> Result<&mut FakeBucket, GatewayError> {
    self
      .buckets
      .get_mut(name)
      .ok_or_else(|| GatewayError::NotFound(format!("bucket {}", name)))
  }

  fn user_mut(&mut self, name: &str) -> Result<&mut FakeUser, GatewayError> {
    self
      .users
      .get_mut(name)
      .ok_or_else(|| GatewayError::NotFound(format!("user {}", name)))
  }
}

fn injected(op: &'static str) -> GatewayError {
  GatewayError::api(op, "injected failure")
}

fn store_injected(op: &'static str) -> Error {
  Error::Store(format!("{}: injected failure", op))
}

#[derive(Clone, Default)]
pub struct Fake(Arc<Mutex<World>>);

impl Fake {
  pub fn world(&self) -> MutexGuard<'_, World> {
    self.0.lock().unwrap()
  }

  pub fn context(&self) -> Context {
    let fake = Arc::new(self.clone());
    Context {
      gateway: fake.clone(),
      resources: fake.clone(),
      secrets: fake.clone(),
      recorder: fake,
    }
  }

  pub fn with_record(spec: S3BucketSpec) -> Self {
    let fake = Fake::default();
    fake.world().record = Some(record(spec));
    fake
  }

  pub async fn pass(&self) -> Outcome {
    reconcile(&ResourceId::new(NAMESPACE, NAME), &self.context()).await
  }

  pub fn fail(&self, op: &'static str) {
    self.world().failing.insert(op);
  }

  pub fn heal(&self, op: &'static str) {
    self.world().failing.remove(op);
  }

  pub fn take_journal(&self) -> Vec<String> {
    std::mem::take(&mut self.world().journal)
  }

  pub fn mark_deleting(&self) {
    let mut world = self.world();
    let record = world.record.as_mut().expect("record exists");
    record.meta_mut().deletion_timestamp = Some(Time(Utc::now()));
  }

  pub fn guard_attached(&self) -> bool {
    self
      .world()
      .record
      .as_ref()
      .map(|r| finalizer::is_attached(r.meta()))
      .unwrap_or(false)
  }

  pub fn last_status(&self) -> Option<S3BucketStatus> {
    self.world().statuses.last().cloned()
  }

  /// Status as stored on the record, after every merge patch so far
  pub fn record_status(&self) -> Option<S3BucketStatus> {
    self.world().record.as_ref().and_then(|r| r.status.clone())
  }

  pub fn keys_of(&self, user: &str) -> Vec<String> {
    self.world().users.get(user).map(|u| u.keys.clone()).unwrap_or_default()
  }

  pub fn secret_key_id(&self) -> Option<String> {
    self.world().secret.as_ref().map(|s| s.access_key_id.clone())
  }
}

pub fn spec(bucket: &str, user: &str) -> S3BucketSpec {
  S3BucketSpec {
    bucket_name: bucket.to_string(),
    region: "us-east-1".to_string(),
    bucket_acl: "private".to_string(),
    iam_user: IamUserSpec {
      username: user.to_string(),
    },
    ..S3BucketSpec::default()
  }
}

pub fn record(spec: S3BucketSpec) -> S3Bucket {
  let mut record = S3Bucket::new(NAME, spec);
  record.meta_mut().namespace = Some(NAMESPACE.to_string());
  record.meta_mut().uid = Some("0b3c5b1e-uid".to_string());
  record
}

pub fn position(journal: &[String], prefix: &str) -> Option<usize> {
  journal.iter().position(|c| c.starts_with(prefix))
}

pub fn count(journal: &[String], prefix: &str) -> usize {
  journal.iter().filter(|c| c.starts_with(prefix)).count()
}

#[async_trait]
impl CloudGateway for Fake {
  async fn bucket_exists(&self, bucket: &BucketTarget) -> Result<bool, GatewayError> {
    let mut w = self.world();
    if w.call("bucket_exists", &bucket.name) {
      return Err(injected("bucket_exists"));
    }
    Ok(w.buckets.contains_key(&bucket.name))
  }

  async fn create_bucket(&self, input: &CreateBucket) -> Result<(), GatewayError> {
    let mut w = self.world();
    if w.call("create_bucket", &input.bucket.name) {
      return Err(injected("create_bucket"));
    }
    if w.buckets.contains_key(&input.bucket.name) {
      return Err(GatewayError::AlreadyExists(input.bucket.name.clone()));
    }
    w.buckets.insert(
      input.bucket.name.clone(),
      FakeBucket {
        region: input.bucket.region.clone(),
        acl: None,
        versioning: None,
        acceleration: None,
        policy: None,
      },
    );
    Ok(())
  }

  async fn put_bucket_acl(&self, input: &BucketAcl) -> Result<(), GatewayError> {
    let mut w = self.world();
    if w.call("put_bucket_acl", format!("{} {}", input.bucket.name, input.acl)) {
      return Err(injected("put_bucket_acl"));
    }
    w.bucket_mut(&input.bucket.name)?.acl = Some(input.acl.clone());
    Ok(())
  }

  async fn put_bucket_versioning(&self, input: &Versioning) -> Result<(), GatewayError> {
    let mut w = self.world();
    if w.call(
      "put_bucket_versioning",
      format!("{} {}", input.bucket.name, input.status.as_str()),
    ) {
      return Err(injected("put_bucket_versioning"));
    }
    w.bucket_mut(&input.bucket.name)?.versioning = Some(input.status);
    Ok(())
  }

  async fn put_bucket_acceleration(&self, input: &Acceleration) -> Result<(), GatewayError> {
    let mut w = self.world();
    if w.call(
      "put_bucket_acceleration",
      format!("{} {}", input.bucket.name, input.status.as_str()),
    ) {
      return Err(injected("put_bucket_acceleration"));
    }
    w.bucket_mut(&input.bucket.name)?.acceleration = Some(input.status);
    Ok(())
  }

  async fn put_bucket_policy(&self, input: &BucketPolicy) -> Result<(), GatewayError> {
    let mut w = self.world();
    if w.call("put_bucket_policy", &input.bucket.name) {
      return Err(injected("put_bucket_policy"));
    }
    w.bucket_mut(&input.bucket.name)?.policy = Some(input.document.clone());
    Ok(())
  }

  async fn delete_bucket_policy(&self, bucket: &BucketTarget) -> Result<(), GatewayError> {
    let mut w = self.world();
    if w.call("delete_bucket_policy", &bucket.name) {
      return Err(injected("delete_bucket_policy"));
    }
    match w.bucket_mut(&bucket.name)?.policy.take() {
      Some(_) => Ok(()),
      None => Err(GatewayError::NotFound(format!("policy of {}", bucket.name))),
    }
  }

  async fn delete_bucket(&self, bucket: &BucketTarget) -> Result<(), GatewayError> {
    let mut w = self.world();
    if w.call("delete_bucket", &bucket.name) {
      return Err(injected("delete_bucket"));
    }
    w.buckets
      .remove(&bucket.name)
      .map(|_| ())
      .ok_or_else(|| GatewayError::NotFound(format!("bucket {}", bucket.name)))
  }

  async fn create_user(&self, user_name: &str) -> Result<(), GatewayError> {
    let mut w = self.world();
    if w.call("create_user", user_name) {
      return Err(injected("create_user"));
    }
    if w.users.contains_key(user_name) {
      return Err(GatewayError::AlreadyExists(user_name.to_string()));
    }
    w.users.insert(user_name.to_string(), FakeUser::default());
    Ok(())
  }

  async fn delete_user(&self, user_name: &str) -> Result<(), GatewayError> {
    let mut w = self.world();
    if w.call("delete_user", user_name) {
      return Err(injected("delete_user"));
    }
    let user = w.user_mut(user_name)?;
    if !user.keys.is_empty() || !user.policies.is_empty() {
      return Err(GatewayError::api("DeleteUser", "DeleteConflict: user still has keys or policies"));
    }
    w.users.remove(user_name);
    Ok(())
  }

  async fn put_user_policy(&self, input: &InlinePolicy) -> Result<(), GatewayError> {
    let mut w = self.world();
    if w.call("put_user_policy", format!("{} {}", input.user_name, input.policy_name)) {
      return Err(injected("put_user_policy"));
    }
    w.user_mut(&input.user_name)?
      .policies
      .insert(input.policy_name.clone(), input.document.clone());
    Ok(())
  }

  async fn delete_user_policy(&self, user_name: &str, policy_name: &str) -> Result<(), GatewayError> {
    let mut w = self.world();
    if w.call("delete_user_policy", format!("{} {}", user_name, policy_name)) {
      return Err(injected("delete_user_policy"));
    }
    w.user_mut(user_name)?
      .policies
      .remove(policy_name)
      .map(|_| ())
      .ok_or_else(|| GatewayError::NotFound(policy_name.to_string()))
  }

  async fn list_user_policies(&self, user_name: &str) -> Result<Vec<String>, GatewayError> {
    let mut w = self.world();
    if w.call("list_user_policies", user_name) {
      return Err(injected("list_user_policies"));
    }
    Ok(w.user_mut(user_name)?.policies.keys().cloned().collect())
  }

  async fn list_access_keys(&self, user_name: &str) -> Result<Vec<AccessKey>, GatewayError> {
    let mut w = self.world();
    if w.call("list_access_keys", user_name) {
      return Err(injected("list_access_keys"));
    }
    Ok(
      w.user_mut(user_name)?
        .keys
        .iter()
        .map(|id| AccessKey {
          access_key_id: id.clone(),
        })
        .collect(),
    )
  }

  async fn create_access_key(&self, user_name: &str) -> Result<NewAccessKey, GatewayError> {
    let mut w = self.world();
    if w.call("create_access_key", user_name) {
      return Err(injected("create_access_key"));
    }
    w.next_key += 1;
    let n = w.next_key;
    let key = NewAccessKey {
      access_key_id: format!("AKIA{:04}", n),
      secret_access_key: format!("secret-{}", n),
    };
    w.user_mut(user_name)?.keys.push(key.access_key_id.clone());
    Ok(key)
  }

  async fn delete_access_key(&self, user_name: &str, access_key_id: &str) -> Result<(), GatewayError> {
    let mut w = self.world();
    if w.call("delete_access_key", format!("{} {}", user_name, access_key_id)) {
      return Err(injected("delete_access_key"));
    }
    let user = w.user_mut(user_name)?;
    let before = user.keys.len();
    user.keys.retain(|k| k != access_key_id);
    if user.keys.len() == before {
      return Err(GatewayError::NotFound(access_key_id.to_string()));
    }
    Ok(())
  }
}

#[async_trait]
impl ResourceStore for Fake {
  async fn get(&self, id: &ResourceId) -> Result<Option<S3Bucket>, Error> {
    let mut w = self.world();
    if w.call("get", id.to_string()) {
      return Err(store_injected("get"));
    }
    Ok(w.record.clone())
  }

  async fn attach_guard(&self, _record: &S3Bucket) -> Result<bool, Error> {
    let mut w = self.world();
    if w.call("attach_guard", "") {
      return Err(store_injected("attach_guard"));
    }
    let record = w.record.as_mut().ok_or_else(|| Error::Store("record is gone".into()))?;
    if finalizer::is_attached(record.meta()) {
      return Ok(false);
    }
    record
      .meta_mut()
      .finalizers
      .get_or_insert_with(Vec::new)
      .push(finalizer::GUARD.to_string());
    Ok(true)
  }

  async fn release_guard(&self, _record: &S3Bucket) -> Result<(), Error> {
    let mut w = self.world();
    if w.call("release_guard", "") {
      return Err(store_injected("release_guard"));
    }
    let Some(record) = w.record.as_mut() else {
      return Ok(());
    };
    let finalizers = record.meta_mut().finalizers.get_or_insert_with(Vec::new);
    finalizers.retain(|f| f != finalizer::GUARD);
    // the API server drops the record and garbage collects what it owns
    if finalizers.is_empty() && record.meta().deletion_timestamp.is_some() {
      w.record = None;
      w.secret = None;
      w.endpoint = None;
    }
    Ok(())
  }

  async fn set_status(&self, _id: &ResourceId, status: &S3BucketStatus) -> Result<(), Error> {
    let mut w = self.world();
    if w.call("set_status", format!("{:?}", status.phase)) {
      return Err(store_injected("set_status"));
    }
    // apply the same merge patch the API server receives
    if let Some(record) = w.record.as_mut() {
      let mut live = serde_json::json!({ "status": record.status });
      json_patch::merge(&mut live, &status_patch(status));
      record.status = serde_json::from_value(live["status"].clone()).ok();
    }
    w.statuses.push(status.clone());
    Ok(())
  }

  async fn publish_endpoint(&self, _record: &S3Bucket, host: &str) -> Result<(), Error> {
    let mut w = self.world();
    if w.call("publish_endpoint", host) {
      return Err(store_injected("publish_endpoint"));
    }
    w.endpoint = Some(host.to_string());
    Ok(())
  }
}

#[async_trait]
impl CredentialSecretStore for Fake {
  async fn get_secret(&self, _id: &ResourceId) -> Result<Option<CredentialSecret>, Error> {
    let mut w = self.world();
    if w.call("get_secret", "") {
      return Err(store_injected("get_secret"));
    }
    Ok(w.secret.clone())
  }

  async fn create_secret(&self, _owner: &S3Bucket, secret: &CredentialSecret) -> Result<(), Error> {
    let mut w = self.world();
    if w.call("create_secret", &secret.access_key_id) {
      return Err(store_injected("create_secret"));
    }
    if w.secret.is_some() {
      return Err(Error::Store("secret already exists".into()));
    }
    w.secret = Some(secret.clone());
    Ok(())
  }

  async fn delete_secret(&self, _id: &ResourceId) -> Result<(), Error> {
    let mut w = self.world();
    if w.call("delete_secret", "") {
      return Err(store_injected("delete_secret"));
    }
    w.secret = None;
    Ok(())
  }
}

#[async_trait]
impl EventRecorder for Fake {
  async fn publish(&self, _on: &S3Bucket, kind: EventKind, reason: &str, _note: String) {
    self.world().events.push(format!("{:?} {}", kind, reason));
  }
}
